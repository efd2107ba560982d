//! # WebSocket Relay Endpoint
//!
//! Clients connect to `/ws` and exchange JSON text frames (see
//! [`crate::protocol`]). Each connection is an independent actix actor that
//! registers itself with the [`RelayHub`] when it starts and unregisters when
//! it stops.
//!
//! ## Connection Lifecycle:
//! 1. **Upgrade**: the HTTP request is upgraded and a `RelayConnection` starts,
//!    accepting frames up to `relay.max_frame_bytes`
//! 2. **Register**: the actor hands its mailbox to the hub as a frame sink
//! 3. **Stream**: audio frames are stamped and forwarded to the hub in order
//! 4. **Heartbeat**: the server pings periodically and drops silent clients
//! 5. **Close**: the hub forgets the connection; in-flight broadcasts that
//!    already captured it fail harmlessly. A connection the hub prunes after a
//!    failed delivery is told to close so the client can reconnect.

use crate::protocol::{ClientFrame, ServerFrame};
use crate::relay::{Connect, ConnectionId, Disconnect, IngestAudio, OutboundFrame, RelayHub};
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// WebSocket actor for one client connection.
pub struct RelayConnection {
    id: ConnectionId,

    /// The hub that owns the trigger and the connection registry
    hub: Addr<RelayHub>,

    state: AppState,

    /// Last time anything was heard from the client
    last_heartbeat: Instant,

    heartbeat_interval: Duration,
    client_timeout: Duration,
}

impl RelayConnection {
    pub fn new(hub: Addr<RelayHub>, state: AppState) -> Self {
        let relay = state.get_config().relay;
        Self {
            id: ConnectionId::new(),
            hub,
            state,
            last_heartbeat: Instant::now(),
            heartbeat_interval: relay.heartbeat_interval(),
            client_timeout: relay.client_timeout(),
        }
    }

    /// Handle one inbound text frame.
    ///
    /// Malformed frames are logged and dropped without a reply; unknown frame
    /// types are ignored.
    fn handle_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let received_at = Instant::now();

        match ClientFrame::parse(text) {
            Ok(ClientFrame::Audio { data }) => {
                debug!(connection = %self.id, len = data.len(), "Received audio frame");
                self.hub.do_send(IngestAudio {
                    from: self.id,
                    data,
                    received_at,
                });
            }
            Ok(ClientFrame::Ping) => {
                ctx.text(ServerFrame::Pong.to_json());
            }
            Ok(ClientFrame::Unknown) => {}
            Err(err) => {
                self.state.record_protocol_error();
                warn!(connection = %self.id, error = %err, "Dropping malformed frame");
            }
        }
    }

    /// Ping the client on every interval; stop if it has gone quiet.
    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(self.heartbeat_interval, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > act.client_timeout {
                warn!(connection = %act.id, "WebSocket heartbeat timeout, closing connection");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for RelayConnection {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.start_heartbeat(ctx);
        self.hub.do_send(Connect {
            id: self.id,
            sink: ctx.address().recipient(),
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.hub.do_send(Disconnect { id: self.id });
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for RelayConnection {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                self.handle_text(&text, ctx);
            }
            Ok(ws::Message::Binary(data)) => {
                self.last_heartbeat = Instant::now();
                debug!(connection = %self.id, len = data.len(), "Ignoring binary frame");
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(connection = %self.id, "WebSocket closed: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!(connection = %self.id, "Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                warn!(connection = %self.id, error = %err, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}

/// Frames fanned out by the hub are written straight to the socket. A close
/// request means the hub has already dropped this connection.
impl Handler<OutboundFrame> for RelayConnection {
    type Result = ();

    fn handle(&mut self, msg: OutboundFrame, ctx: &mut Self::Context) {
        match msg {
            OutboundFrame::Text(text) => ctx.text(text.to_string()),
            OutboundFrame::Close => {
                warn!(connection = %self.id, "Hub dropped connection after failed delivery, closing");
                ctx.close(Some(ws::CloseReason {
                    code: ws::CloseCode::Again,
                    description: Some("delivery timed out, reconnect".to_string()),
                }));
                ctx.stop();
            }
        }
    }
}

/// Upgrade `GET /ws` to a relay connection.
pub async fn relay_websocket(
    req: HttpRequest,
    stream: web::Payload,
    hub: web::Data<Addr<RelayHub>>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!("New WebSocket connection request from: {:?}", req.connection_info().peer_addr());

    let max_frame_bytes = state.get_config().relay.max_frame_bytes;
    let connection = RelayConnection::new(hub.get_ref().clone(), state.get_ref().clone());

    ws::WsResponseBuilder::new(connection, &req, stream)
        .frame_size(max_frame_bytes)
        .start()
}
