//! Work scheduling for the nonce search.
//!
//! [`Coordinator`] owns every piece of scheduling state and is driven one
//! [`Event`] at a time. It never touches sockets itself, outbound frames go
//! through the [`Transport`] passed into [`Coordinator::handle`].

use std::collections::{BTreeMap, HashMap, VecDeque};

use shared::{errors::CodecError, Message, MessageType};
use tracing::{debug, info, trace, warn};

pub use pending::PendingQueue;
pub use work::{BestResult, ClientRequest, ConnId, ConnRole, WorkUnit};

mod pending;
mod work;

#[cfg(test)]
mod tests;

pub const DEFAULT_CHUNK_SIZE: u64 = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection {0} is gone")]
    Gone(ConnId),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Outbound half of the transport.
pub trait Transport {
    fn write(&mut self, id: ConnId, msg: &Message) -> Result<(), TransportError>;
}

#[derive(Debug, Clone)]
pub enum Event {
    Message(ConnId, Message),
    /// The transport gave up on this connection.
    Disconnected(ConnId),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub workers: usize,
    pub busy_workers: usize,
    pub requests: usize,
    pub pending_clients: usize,
    pub idle_units: usize,
}

pub struct Coordinator {
    max_chunk_size: u64,
    /// active client requests
    requests: HashMap<ConnId, ClientRequest>,
    /// best result per active request
    best: HashMap<ConnId, BestResult>,
    /// clients with uncarved range left
    pending: PendingQueue,
    /// worker -> unit in flight
    workers: BTreeMap<ConnId, Option<WorkUnit>>,
    /// units recovered from lost workers, served before new chunks
    idle_work: VecDeque<WorkUnit>,
    roles: HashMap<ConnId, ConnRole>,
}

impl Coordinator {
    /// `max_chunk_size` must be positive, configuration rejects zero before
    /// this point.
    pub fn new(max_chunk_size: u64) -> Self {
        debug_assert!(max_chunk_size > 0, "chunk size must be greater than zero");
        Self {
            max_chunk_size: max_chunk_size.max(1),
            requests: Default::default(),
            best: Default::default(),
            pending: Default::default(),
            workers: Default::default(),
            idle_work: Default::default(),
            roles: Default::default(),
        }
    }

    pub fn max_chunk_size(&self) -> u64 {
        self.max_chunk_size
    }

    pub fn stats(&self) -> Stats {
        Stats {
            workers: self.workers.len(),
            busy_workers: self.workers.values().filter(|unit| unit.is_some()).count(),
            requests: self.requests.len(),
            pending_clients: self.pending.len(),
            idle_units: self.idle_work.len(),
        }
    }

    pub fn handle<T: Transport>(&mut self, event: Event, transport: &mut T) {
        match event {
            Event::Message(id, msg) => match msg.kind {
                MessageType::Join => self.on_join(id, transport),
                MessageType::Request => {
                    self.on_request(id, msg.data, msg.lower, msg.upper, transport)
                }
                MessageType::Result => self.on_result(id, msg.hash, msg.nonce, transport),
            },
            Event::Disconnected(id) => self.on_disconnect(id, transport),
        }
    }

    fn on_join<T: Transport>(&mut self, id: ConnId, transport: &mut T) {
        match self.roles.get(&id) {
            Some(ConnRole::Client) => {
                warn!("join from client {id} ignored");
            }
            Some(ConnRole::Worker) => {
                debug!("worker {id} joined twice");
            }
            None => {
                self.register_worker(id);
                info!("worker {id} joined, workers: {}", self.workers.len());
                self.dispatch(id, transport);
            }
        }
    }

    fn on_request<T: Transport>(
        &mut self,
        id: ConnId,
        data: String,
        lower: u64,
        upper: u64,
        transport: &mut T,
    ) {
        match self.roles.get(&id) {
            Some(ConnRole::Worker) => {
                warn!("request from worker {id} ignored");
                return;
            }
            Some(ConnRole::Client) => {
                warn!("client {id} already has a request in progress");
                return;
            }
            None => {}
        }

        if lower > upper {
            warn!("request from {id} has inverted range {lower}..{upper}, dropped");
            return;
        }

        if lower == upper {
            info!("request from {id} has an empty range, answering at once");
            if let Err(err) = transport.write(id, &BestResult::default().to_message()) {
                warn!("failed to answer client {id}: {err}");
            }
            return;
        }

        info!("client {id} requested `{data}` over {lower}..{upper}");
        self.roles.insert(id, ConnRole::Client);
        self.requests.insert(id, ClientRequest::new(data, lower, upper));
        self.best.insert(id, BestResult::default());
        self.pending.push_back(id);
        self.fill_idle_workers(transport);
    }

    fn on_result<T: Transport>(&mut self, id: ConnId, hash: u64, nonce: u64, transport: &mut T) {
        match self.roles.get(&id) {
            Some(ConnRole::Client) => {
                warn!("result from client {id} ignored");
                return;
            }
            Some(ConnRole::Worker) => {}
            None => {
                debug!("result from unknown connection {id}, registering it as a worker");
                self.register_worker(id);
            }
        }

        let unit = self.workers.get_mut(&id).and_then(Option::take);
        // keep the worker busy before doing any bookkeeping
        self.dispatch(id, transport);

        match unit {
            Some(unit) => self.fold(unit, hash, nonce, transport),
            None => debug!("worker {id} reported without an assignment, discarded"),
        }
    }

    fn on_disconnect<T: Transport>(&mut self, id: ConnId, transport: &mut T) {
        match self.roles.remove(&id) {
            Some(ConnRole::Worker) => self.worker_lost(id, transport),
            Some(ConnRole::Client) => self.client_lost(id),
            None => debug!("connection {id} lost before identifying itself"),
        }
    }

    fn register_worker(&mut self, id: ConnId) {
        self.roles.insert(id, ConnRole::Worker);
        self.workers.insert(id, None);
    }

    fn worker_lost<T: Transport>(&mut self, id: ConnId, transport: &mut T) {
        match self.workers.remove(&id).flatten() {
            Some(unit) if self.requests.contains_key(&unit.owner) => {
                warn!(
                    "worker {id} lost holding {}..{} of client {}, requeued",
                    unit.range.start, unit.range.end, unit.owner
                );
                self.idle_work.push_front(unit);
            }
            Some(unit) => {
                debug!("worker {id} lost, its unit belongs to departed client {}", unit.owner);
            }
            None => info!("idle worker {id} lost"),
        }
        self.fill_idle_workers(transport);
    }

    fn client_lost(&mut self, id: ConnId) {
        self.requests.remove(&id);
        self.best.remove(&id);
        self.pending.remove(id);
        let before = self.idle_work.len();
        self.idle_work.retain(|unit| unit.owner != id);
        info!("client {id} lost, purged {} idle units", before - self.idle_work.len());
    }

    /// Gives `worker` its next unit: recovered work first, then a fresh chunk.
    /// With nothing to hand out the worker stays idle.
    fn dispatch<T: Transport>(&mut self, worker: ConnId, transport: &mut T) {
        if !matches!(self.workers.get(&worker), Some(None)) {
            return;
        }

        let Some(unit) = self.idle_work.pop_front().or_else(|| self.next_chunk()) else {
            trace!("no work for worker {worker}");
            return;
        };

        debug!(
            "assign {}..{} of client {} to worker {worker}",
            unit.range.start, unit.range.end, unit.owner
        );
        if let Err(err) = transport.write(worker, &unit.to_message()) {
            // the unit stays with the worker, its disconnect will requeue it
            warn!("failed to send work to worker {worker}: {err}");
        }
        self.workers.insert(worker, Some(unit));
    }

    /// Carves the next chunk, round robin across pending clients.
    fn next_chunk(&mut self) -> Option<WorkUnit> {
        loop {
            let owner = self.pending.back()?;
            let Some(request) = self.requests.get_mut(&owner) else {
                self.pending.pop_back();
                continue;
            };
            match request.carve(owner, self.max_chunk_size) {
                Some(unit) => {
                    if request.fully_carved() {
                        self.pending.pop_back();
                    } else {
                        self.pending.rotate_back_to_front();
                    }
                    return Some(unit);
                }
                None => {
                    self.pending.pop_back();
                }
            }
        }
    }

    fn fill_idle_workers<T: Transport>(&mut self, transport: &mut T) {
        let idle: Vec<ConnId> = self
            .workers
            .iter()
            .filter_map(|(id, unit)| unit.is_none().then_some(*id))
            .collect();
        for id in idle {
            if self.idle_work.is_empty() && self.pending.is_empty() {
                break;
            }
            self.dispatch(id, transport);
        }
    }

    fn fold<T: Transport>(&mut self, unit: WorkUnit, hash: u64, nonce: u64, transport: &mut T) {
        let owner = unit.owner;
        let Some(request) = self.requests.get_mut(&owner) else {
            debug!("result for departed client {owner} discarded");
            return;
        };
        request.outstanding = request.outstanding.saturating_sub(1);
        let done = request.outstanding == 0 && request.fully_carved();

        let best = self.best.entry(owner).or_default();
        if best.fold(hash, nonce) {
            debug!("client {owner} best hash -> {hash} (nonce {nonce})");
        }
        let best = *best;

        if done {
            self.requests.remove(&owner);
            self.best.remove(&owner);
            self.roles.remove(&owner);
            self.pending.remove(owner);
            info!("client {owner} done, hash: {} nonce: {}", best.hash, best.nonce);
            if let Err(err) = transport.write(owner, &best.to_message()) {
                warn!("failed to deliver result to client {owner}: {err}");
            }
        }
    }
}
