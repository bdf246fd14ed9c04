// ==============================================================================
// net.rs — LIVE FEED OVER WEBSOCKETS
// ------------------------------------------------------------------------------
// Clients send JSON: {"type":"controls", ...CarControls} | {"type":"ping"} |
// {"type":"reset"}. The first connected client drives; everyone receives
// {"type":"state", ...CarState} at the broadcast rate.
//
// Network tasks only touch the Session. The physics loop polls it once per
// tick, so the PhysicsWorld never leaves its thread.
// ==============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use uuid::Uuid;

use crate::car::controls::CarControls;
use crate::car::state::CarState;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Controls(CarControls),
    Ping,
    Reset,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage<'a> {
    Welcome { client_id: Uuid, driver: bool },
    Pong,
    State(&'a CarState),
}

#[derive(Debug, Default)]
pub struct Session {
    pub tick: u64,
    clients: HashMap<Uuid, mpsc::UnboundedSender<String>>,
    driver: Option<Uuid>,
    controls: CarControls,
    reset_requested: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the new client's id and whether it drives.
    pub fn register_client(&mut self, tx: mpsc::UnboundedSender<String>) -> (Uuid, bool) {
        let id = Uuid::new_v4();
        self.clients.insert(id, tx);
        let driver = self.driver.is_none();
        if driver {
            self.driver = Some(id);
        }
        (id, driver)
    }

    pub fn remove_client(&mut self, id: &Uuid) {
        self.clients.remove(id);
        if self.driver == Some(*id) {
            // hand the car to whoever is left, with the pedals released
            self.driver = self.clients.keys().next().copied();
            self.controls = CarControls::default();
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn update_controls(&mut self, id: &Uuid, controls: CarControls) -> bool {
        if self.driver != Some(*id) {
            return false;
        }
        self.controls = controls;
        true
    }

    pub fn controls(&self) -> CarControls {
        self.controls
    }

    pub fn request_reset(&mut self, id: &Uuid) {
        if self.driver == Some(*id) {
            self.reset_requested = true;
        }
    }

    pub fn take_reset(&mut self) -> bool {
        std::mem::take(&mut self.reset_requested)
    }

    /// Send one state frame to every client. Closed channels are dropped.
    pub fn broadcast_state(&mut self, state: &CarState) {
        if self.clients.is_empty() {
            return;
        }
        let json = match serde_json::to_string(&ServerMessage::State(state)) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(%err, "state frame not serializable");
                return;
            }
        };
        self.clients.retain(|_, tx| tx.send(json.clone()).is_ok());
    }
}

pub async fn serve(addr: String, session: Arc<Mutex<Session>>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "websocket feed listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            if let Err(err) = handle_client(stream, session).await {
                tracing::warn!(%peer, %err, "client connection failed");
            }
        });
    }
}

async fn handle_client(stream: TcpStream, session: Arc<Mutex<Session>>) -> anyhow::Result<()> {
    let ws = accept_async(stream).await?;
    let (mut write, mut read) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let (client_id, driver) = session.lock().await.register_client(tx.clone());
    tracing::info!(%client_id, driver, "client connected");

    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if write.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    let welcome = serde_json::to_string(&ServerMessage::Welcome { client_id, driver })?;
    let _ = tx.send(welcome);

    while let Some(msg) = read.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(err) => {
                tracing::debug!(%client_id, %err, "read error");
                break;
            }
        };
        if !msg.is_text() {
            continue;
        }
        let Ok(text) = msg.to_text() else {
            continue;
        };
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Controls(controls)) => {
                session.lock().await.update_controls(&client_id, controls);
            }
            Ok(ClientMessage::Ping) => {
                let _ = tx.send(serde_json::to_string(&ServerMessage::Pong)?);
            }
            Ok(ClientMessage::Reset) => session.lock().await.request_reset(&client_id),
            Err(err) => tracing::debug!(%client_id, %err, "ignoring malformed message"),
        }
    }

    tracing::info!(%client_id, "client disconnected");
    session.lock().await.remove_client(&client_id);
    Ok(())
}
