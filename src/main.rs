use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rapier3d::prelude::Isometry;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant, MissedTickBehavior, interval};
use tracing_subscriber::EnvFilter;

use vehicle_dynamics::config::cache::CurveCache;
use vehicle_dynamics::config::{CarConfig, presets};
use vehicle_dynamics::net::{Session, serve};
use vehicle_dynamics::physics::PhysicsWorld;
use vehicle_dynamics::physics::track::{Track, TrackConfig};
use vehicle_dynamics::Car;

/// Fixed-rate vehicle dynamics loop with an optional websocket feed.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Car configuration (JSON). Without it a built-in preset is used.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Built-in car when no --config is given: coupe | pickup.
    #[arg(long, default_value = "coupe")]
    preset: String,

    /// Directory holding named curves as <name>.json.
    #[arg(long)]
    curves: Option<PathBuf>,

    /// Physics rate.
    #[arg(long, default_value_t = 240)]
    hz: u32,

    /// Stop after this many simulated seconds. Runs until Ctrl-C otherwise.
    #[arg(long)]
    seconds: Option<f32>,

    /// Websocket address, e.g. 0.0.0.0:9001.
    #[arg(long)]
    listen: Option<String>,

    /// State frames per second sent to clients.
    #[arg(long, default_value_t = 30)]
    broadcast_hz: u32,
}

fn load_config(args: &Args) -> anyhow::Result<CarConfig> {
    if let Some(path) = &args.config {
        return CarConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()));
    }
    match args.preset.as_str() {
        "coupe" => Ok(presets::coupe()),
        "pickup" => Ok(presets::pickup()),
        other => anyhow::bail!("unknown preset '{other}' (expected coupe or pickup)"),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    anyhow::ensure!(args.hz >= 30, "--hz must be at least 30");
    let config = load_config(&args)?;

    let mut cache = match &args.curves {
        Some(root) => CurveCache::with_root(root),
        None => CurveCache::new(),
    };
    let mut world = PhysicsWorld::new();
    let track = Track::flat(&mut world, &TrackConfig::default())?;
    let spawn = Isometry::translation(0.0, config.rest_height(), 0.0);
    let mut car = Car::spawn(&config, &mut cache, &mut world, &track, spawn)?;

    let session = Arc::new(Mutex::new(Session::new()));
    if let Some(addr) = args.listen.clone() {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            if let Err(err) = serve(addr, session).await {
                tracing::error!(%err, "websocket feed stopped");
            }
        });
    }

    let dt = 1.0 / args.hz as f32;
    let step = Duration::from_secs_f32(dt);
    let broadcast_every = (args.hz / args.broadcast_hz.max(1)).max(1) as u64;
    let max_ticks = args.seconds.map(|s| (s * args.hz as f32).ceil() as u64);

    tracing::info!(car = %config.name, hz = args.hz, "🚀 simulation running");

    let mut ticker = interval(step);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = Instant::now();
    let mut hitches: u64 = 0;
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
        }

        let now = Instant::now();
        let gap = now - last;
        last = now;
        if tick > 0 && gap > step * 2 {
            hitches += 1;
            tracing::warn!(gap_ms = gap.as_secs_f32() * 1_000.0, hitches, "physics hitch");
        }

        let (controls, reset) = {
            let mut s = session.lock().await;
            s.tick = tick;
            (s.controls(), s.take_reset())
        };
        if reset {
            car.teleport(&mut world, spawn, rapier3d::prelude::Vector::zeros())?;
        }

        let state = car.tick(dt, &controls, &mut world, &track)?;
        if tick % broadcast_every == 0 {
            session.lock().await.broadcast_state(state);
        }
        world.step(dt);
        tick += 1;

        if tick % (args.hz as u64 * 5) == 0 {
            let s = car.state();
            tracing::info!(
                tick,
                speed = s.speed,
                rpm = s.engine_rpm,
                gear = s.gear,
                "status"
            );
        }
        if max_ticks.is_some_and(|max| tick >= max) {
            break;
        }
    }

    tracing::info!(tick, hitches, "simulation stopped");
    Ok(())
}
