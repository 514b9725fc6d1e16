use std::time::{Duration, Instant};

use actix::{
    fut,
    Actor,
    ActorContext,
    ActorFutureExt,
    Addr,
    AsyncContext,
    ContextFutureSpawner,
    Handler,
    Running,
    StreamHandler,
    WrapFuture,
};
use actix_web_actors::ws;
use shared::Message;
use tracing::*;

pub use messages as SessionMessage;

use crate::manager::{ManagerActor, ManagerMessage};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(15);

/// One websocket peer, miner or client alike. Keeps the connection alive with
/// pings and reports it to the manager once it stops answering.
pub struct SessionActor {
    id: u64,
    heart_beat: Instant,
    manager: Addr<ManagerActor>,
}

impl SessionActor {
    pub fn new(manager: Addr<ManagerActor>) -> Self {
        Self { id: 0, heart_beat: Instant::now(), manager }
    }

    fn heart_beat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.heart_beat) > CLIENT_TIMEOUT {
                warn!("session {} heartbeat failed, disconnecting", act.id);
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn join(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        self.heart_beat(ctx);
        let addr = ctx.address();
        self.manager
            .send(ManagerMessage::Connect { addr: addr.recipient() })
            .into_actor(self)
            .then(|res, act, ctx| {
                match res {
                    Ok(id) => act.id = id,
                    Err(err) => {
                        error!("manager unavailable: {err}");
                        ctx.stop()
                    }
                }
                fut::ready(())
            })
            .wait(ctx);
    }

    fn receive(&self, frame: &[u8]) {
        match Message::decode(frame) {
            Ok(message) => {
                trace!("session {}: {message}", self.id);
                self.manager.do_send(ManagerMessage::Inbound { id: self.id, message });
            }
            Err(err) => warn!("session {}: dropped frame, {err}", self.id),
        }
    }
}

impl Actor for SessionActor {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.join(ctx);
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        if self.id != 0 {
            self.manager.do_send(ManagerMessage::Disconnect { id: self.id });
        }
        Running::Stop
    }
}

impl Handler<SessionMessage::Outbound> for SessionActor {
    type Result = ();

    fn handle(&mut self, msg: SessionMessage::Outbound, ctx: &mut Self::Context) {
        match std::str::from_utf8(&msg.0) {
            Ok(text) => ctx.text(text),
            Err(_) => ctx.binary(msg.0),
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for SessionActor {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        let msg = match msg {
            Err(err) => {
                warn!("session {} protocol error: {err}", self.id);
                ctx.stop();
                return;
            }
            Ok(msg) => msg,
        };

        match msg {
            ws::Message::Ping(msg) => {
                self.heart_beat = Instant::now();
                ctx.pong(&msg);
            }
            ws::Message::Pong(_) => {
                self.heart_beat = Instant::now();
            }
            ws::Message::Text(text) => {
                self.heart_beat = Instant::now();
                self.receive(text.as_bytes());
            }
            ws::Message::Binary(bin) => {
                self.heart_beat = Instant::now();
                self.receive(&bin);
            }
            ws::Message::Close(reason) => {
                ctx.close(reason);
                ctx.stop();
            }
            ws::Message::Continuation(_) => {
                ctx.stop();
            }
            ws::Message::Nop => (),
        }
    }
}

pub mod messages {
    use actix::Message;
    use bytes::Bytes;

    /// Encoded frame for the peer.
    #[derive(Message)]
    #[rtype(result = "()")]
    pub struct Outbound(pub Bytes);
}
