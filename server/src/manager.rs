use std::{collections::HashMap, time::Duration};

use actix::{Actor, AsyncContext, Context, Handler, Recipient};
use shared::Message;
use tracing::{debug, info, trace};

pub use messages as ManagerMessage;

use crate::{
    scheduler::{ConnId, Coordinator, Event, Transport, TransportError},
    session::SessionMessage,
};

const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// Routes coordinator output to the live websocket sessions.
struct Sessions<'a>(&'a HashMap<ConnId, Recipient<SessionMessage::Outbound>>);

impl Transport for Sessions<'_> {
    fn write(&mut self, id: ConnId, msg: &Message) -> Result<(), TransportError> {
        let session = self.0.get(&id).ok_or(TransportError::Gone(id))?;
        let frame = msg.encode()?;
        session.try_send(SessionMessage::Outbound(frame)).map_err(|_| TransportError::Gone(id))
    }
}

/// Owns the scheduler. The mailbox is the event loop: each connect, frame and
/// disconnect is handled to completion before the next one is looked at.
pub struct ManagerActor {
    coordinator: Coordinator,
    sessions: HashMap<ConnId, Recipient<SessionMessage::Outbound>>,
    next_id: u64,
}

impl ManagerActor {
    pub fn new(max_chunk_size: u64) -> Self {
        Self { coordinator: Coordinator::new(max_chunk_size), sessions: Default::default(), next_id: 0 }
    }

    fn dispatch(&mut self, event: Event) {
        let mut transport = Sessions(&self.sessions);
        self.coordinator.handle(event, &mut transport);
    }
}

impl Actor for ManagerActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("manager started, chunk size: {}", self.coordinator.max_chunk_size());
        ctx.run_interval(STATS_INTERVAL, |act, _| {
            let stats = act.coordinator.stats();
            debug!(
                "connections: {}, workers: {} ({} busy), requests: {}, pending: {}, idle units: {}",
                act.sessions.len(),
                stats.workers,
                stats.busy_workers,
                stats.requests,
                stats.pending_clients,
                stats.idle_units
            );
        });
    }
}

impl Handler<ManagerMessage::Connect> for ManagerActor {
    type Result = u64;

    fn handle(&mut self, msg: ManagerMessage::Connect, _: &mut Self::Context) -> Self::Result {
        trace!("manager: connect");
        self.next_id += 1;
        let id = ConnId(self.next_id);
        self.sessions.insert(id, msg.addr);
        info!("connection {id} opened, connections: {}", self.sessions.len());
        id.0
    }
}

impl Handler<ManagerMessage::Inbound> for ManagerActor {
    type Result = ();

    fn handle(&mut self, msg: ManagerMessage::Inbound, _: &mut Self::Context) -> Self::Result {
        trace!("manager: inbound {}", msg.message);
        let id = ConnId(msg.id);
        if !self.sessions.contains_key(&id) {
            debug!("frame from closed connection {id} dropped");
            return;
        }
        self.dispatch(Event::Message(id, msg.message));
    }
}

impl Handler<ManagerMessage::Disconnect> for ManagerActor {
    type Result = ();

    fn handle(&mut self, msg: ManagerMessage::Disconnect, _: &mut Self::Context) -> Self::Result {
        trace!("manager: disconnect");
        let id = ConnId(msg.id);
        if self.sessions.remove(&id).is_some() {
            info!("connection {id} closed, connections: {}", self.sessions.len());
            self.dispatch(Event::Disconnected(id));
        }
    }
}

pub mod messages {
    use actix::{Message, Recipient};

    use crate::session::SessionMessage;

    #[derive(Message)]
    #[rtype(result = "u64")]
    pub struct Connect {
        pub addr: Recipient<SessionMessage::Outbound>,
    }

    #[derive(Message)]
    #[rtype(result = "()")]
    pub struct Inbound {
        pub id: u64,
        pub message: shared::Message,
    }

    #[derive(Message)]
    #[rtype(result = "()")]
    pub struct Disconnect {
        pub id: u64,
    }
}
