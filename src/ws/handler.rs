//! WebSocket upgrade handler and per-connection session

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{GameManager, InputEvent, InputState};
use crate::matchmaking::PlayerIdentity;
use crate::util::rate_limit::PlayerRateLimiter;
use crate::ws::channel::{ClientConnection, ConnectionHandle};
use crate::ws::protocol::{translate_key, ClientMsg, InfoPlayer, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = Uuid::new_v4();
    info!(connection_id = %conn_id, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();
    let (channel, outbound_rx) = ClientConnection::new(conn_id);

    // Writer task: outbound channel -> WebSocket
    let writer_handle = tokio::spawn(write_loop(conn_id, ws_sink, outbound_rx));

    let mut session = Session::new(conn_id, ConnectionHandle::new(channel), state);
    read_loop(&mut session, ws_stream).await;

    // Cleanup on disconnect
    session.disconnect();
    writer_handle.abort();

    info!(connection_id = %conn_id, "WebSocket connection closed");
}

/// Reader loop: WebSocket -> session
async fn read_loop(session: &mut Session, mut ws_stream: SplitStream<WebSocket>) {
    let rate_limiter = PlayerRateLimiter::new();
    let conn_id = session.conn_id;

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(connection_id = %conn_id, "Rate limited input message");
                    continue;
                }
                session.handle_text(&text).await;
            }
            Ok(Message::Binary(_)) => {
                warn!(connection_id = %conn_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(connection_id = %conn_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(connection_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
        }
    }
}

async fn write_loop(
    conn_id: Uuid,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::UnboundedReceiver<ServerMsg>,
) {
    while let Some(msg) = outbound_rx.recv().await {
        if let Err(e) = send_msg(&mut ws_sink, &msg).await {
            debug!(connection_id = %conn_id, error = %e, "WebSocket send failed");
            break;
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}

/// Routes one connection's decoded messages to matchmaking and its match
struct Session {
    conn_id: Uuid,
    handle: ConnectionHandle,
    /// Set by the first join
    player_id: Option<String>,
    state: AppState,
}

impl Session {
    fn new(conn_id: Uuid, handle: ConnectionHandle, state: AppState) -> Self {
        Self {
            conn_id,
            handle,
            player_id: None,
            state,
        }
    }

    /// Decode and dispatch one text frame. Malformed frames are dropped.
    async fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<ClientMsg>(text) {
            Ok(ClientMsg::Join { info_player, token }) => self.join(info_player, token).await,
            Ok(ClientMsg::Input { key, pressed }) => self.input(&key, pressed),
            Ok(ClientMsg::Ready) => self.ready(),
            Err(e) => {
                warn!(connection_id = %self.conn_id, error = %e, "Failed to parse client message");
            }
        }
    }

    async fn join(&mut self, info_player: InfoPlayer, token: Option<String>) {
        if self.current_game().is_some() {
            warn!(connection_id = %self.conn_id, "Join ignored, connection already in a match");
            return;
        }

        let identity = self.resolve_identity(info_player, token).await;
        let outcome = self.state.matchmaking.add_player(
            Some(self.handle.clone()),
            identity,
            InputState::default(),
        );
        if outcome.owned {
            self.player_id = Some(outcome.player.id.clone());
        }

        match outcome.game {
            Some(game) if !self.state.config.game.require_ready => game.start_game(),
            Some(_) => {}
            None => {
                self.handle.send(ServerMsg::Wait);
            }
        }
    }

    /// Prefer the account backend's view of the caller over client claims
    async fn resolve_identity(&self, info_player: InfoPlayer, token: Option<String>) -> PlayerIdentity {
        let claimed = PlayerIdentity::from(info_player);
        let Some(token) = token.filter(|_| self.state.config.account_api_url.is_some()) else {
            return claimed;
        };

        match self.state.identity.resolve(&token).await {
            Ok(Some(identity)) => identity.into(),
            Ok(None) => {
                warn!(connection_id = %self.conn_id, "Unknown token, joining as guest");
                PlayerIdentity { id: None, ..claimed }
            }
            Err(e) => {
                error!(connection_id = %self.conn_id, error = %e, "Identity lookup failed, joining as guest");
                PlayerIdentity { id: None, ..claimed }
            }
        }
    }

    fn input(&self, code: &str, pressed: bool) {
        let Some(key) = translate_key(code) else {
            debug!(connection_id = %self.conn_id, key = %code, "Ignoring unknown key");
            return;
        };
        if let (Some(player_id), Some(game)) = (&self.player_id, self.current_game()) {
            game.handle_player_input(player_id, InputEvent { key, pressed });
        }
    }

    fn ready(&self) {
        if let (Some(player_id), Some(game)) = (&self.player_id, self.current_game()) {
            game.mark_ready(player_id);
        }
    }

    /// Leave the waiting pool or end the running match
    fn disconnect(&self) {
        self.state.matchmaking.remove_connection(&self.conn_id);

        if let (Some(player_id), Some(game)) = (&self.player_id, self.current_game()) {
            game.remove_player(player_id);
        }
    }

    fn current_game(&self) -> Option<GameManager> {
        self.state.match_registry.game_for_connection(&self.conn_id)
    }
}
