use std::collections::HashSet;

use super::*;

#[derive(Default)]
struct Recorder {
    sent: Vec<(ConnId, Message)>,
    broken: HashSet<ConnId>,
}

impl Recorder {
    fn take(&mut self) -> Vec<(ConnId, Message)> {
        std::mem::take(&mut self.sent)
    }

    fn to(&self, id: u64) -> Vec<&Message> {
        self.sent.iter().filter(|(to, _)| to.0 == id).map(|(_, m)| m).collect()
    }
}

impl Transport for Recorder {
    fn write(&mut self, id: ConnId, msg: &Message) -> Result<(), TransportError> {
        if self.broken.contains(&id) {
            return Err(TransportError::Gone(id));
        }
        self.sent.push((id, msg.clone()));
        Ok(())
    }
}

fn join(c: &mut Coordinator, t: &mut Recorder, id: u64) {
    c.handle(Event::Message(ConnId(id), Message::join()), t);
}

fn request(c: &mut Coordinator, t: &mut Recorder, id: u64, lower: u64, upper: u64) {
    c.handle(Event::Message(ConnId(id), Message::request("bitcoin", lower, upper)), t);
}

fn result(c: &mut Coordinator, t: &mut Recorder, id: u64, hash: u64, nonce: u64) {
    c.handle(Event::Message(ConnId(id), Message::result(hash, nonce)), t);
}

fn lost(c: &mut Coordinator, t: &mut Recorder, id: u64) {
    c.handle(Event::Disconnected(ConnId(id)), t);
}

fn assigned(c: &Coordinator, worker: u64) -> Option<std::ops::Range<u64>> {
    c.workers.get(&ConnId(worker)).cloned().flatten().map(|unit| unit.range)
}

/// No unit is held by two workers, or by a worker and the idle queue at once.
fn assert_single_owner(c: &Coordinator) {
    let mut seen = HashSet::new();
    let held = c.workers.values().flatten();
    for unit in held.chain(c.idle_work.iter()) {
        assert!(seen.insert((unit.owner, unit.range.start)), "unit referenced twice: {unit:?}");
    }
}

#[test]
#[should_panic(expected = "chunk size must be greater than zero")]
fn zero_chunk_size_is_a_caller_bug() {
    Coordinator::new(0);
}

#[test]
fn two_workers_three_chunks() {
    let mut c = Coordinator::new(10_000);
    let mut t = Recorder::default();
    join(&mut c, &mut t, 2);
    join(&mut c, &mut t, 3);
    assert!(t.take().is_empty());

    request(&mut c, &mut t, 1, 0, 25_000);
    assert_eq!(t.take(), vec![
        (ConnId(2), Message::request("bitcoin", 0, 10_000)),
        (ConnId(3), Message::request("bitcoin", 10_000, 20_000)),
    ]);

    result(&mut c, &mut t, 3, 300, 15_000);
    assert_eq!(t.take(), vec![(ConnId(3), Message::request("bitcoin", 20_000, 25_000))]);

    result(&mut c, &mut t, 2, 500, 7);
    assert!(t.take().is_empty());

    result(&mut c, &mut t, 3, 400, 20_001);
    assert_eq!(t.take(), vec![(ConnId(1), Message::result(300, 15_000))]);
    assert_eq!(c.stats(), Stats { workers: 2, ..Default::default() });
}

#[test]
fn last_carved_chunk_returning_early_does_not_complete() {
    let mut c = Coordinator::new(10);
    let mut t = Recorder::default();
    join(&mut c, &mut t, 2);
    join(&mut c, &mut t, 3);
    request(&mut c, &mut t, 1, 0, 20);
    assert_eq!(assigned(&c, 3), Some(10..20));

    result(&mut c, &mut t, 3, 9, 11);
    assert!(t.to(1).is_empty());
    assert_eq!(c.stats().requests, 1);

    result(&mut c, &mut t, 2, 4, 3);
    assert_eq!(t.to(1), vec![&Message::result(4, 3)]);
}

#[test]
fn chunks_alternate_between_pending_clients() {
    let mut c = Coordinator::new(10);
    let mut t = Recorder::default();
    request(&mut c, &mut t, 1, 0, 30);
    request(&mut c, &mut t, 2, 100, 130);
    join(&mut c, &mut t, 9);

    let mut owners = vec![];
    while let Some(range) = assigned(&c, 9) {
        owners.push(if range.start < 100 { 'A' } else { 'B' });
        result(&mut c, &mut t, 9, range.start, range.start);
    }
    assert_eq!(owners, vec!['B', 'A', 'B', 'A', 'B', 'A']);
    assert_eq!(t.to(1), vec![&Message::result(0, 0)]);
    assert_eq!(t.to(2), vec![&Message::result(100, 100)]);
}

#[test]
fn carved_units_tile_the_request() {
    for (lower, upper, cap) in [(0, 1, 1), (0, 25_000, 10_000), (7, 107, 10), (5, 6, 100), (0, 99, 7)]
    {
        let mut c = Coordinator::new(cap);
        let mut t = Recorder::default();
        join(&mut c, &mut t, 2);
        request(&mut c, &mut t, 1, lower, upper);

        let mut next = lower;
        while let Some(range) = assigned(&c, 2) {
            assert_eq!(range.start, next);
            assert!(range.end > range.start && range.end - range.start <= cap);
            next = range.end;
            result(&mut c, &mut t, 2, 1, range.start);
        }
        assert_eq!(next, upper);
        assert_eq!(t.to(1).len(), 1);
    }
}

#[test]
fn lost_worker_unit_goes_to_next_worker_verbatim() {
    let mut c = Coordinator::new(10);
    let mut t = Recorder::default();
    join(&mut c, &mut t, 2);
    join(&mut c, &mut t, 3);
    request(&mut c, &mut t, 1, 0, 20);
    t.take();

    lost(&mut c, &mut t, 2);
    assert_eq!(c.stats().idle_units, 1);
    assert_single_owner(&c);

    join(&mut c, &mut t, 4);
    assert_eq!(t.take(), vec![(ConnId(4), Message::request("bitcoin", 0, 10))]);
    assert_eq!(c.stats().idle_units, 0);

    result(&mut c, &mut t, 3, 8, 12);
    result(&mut c, &mut t, 4, 6, 1);
    assert_eq!(t.to(1), vec![&Message::result(6, 1)]);
}

#[test]
fn recovered_work_is_served_before_new_chunks() {
    let mut c = Coordinator::new(10);
    let mut t = Recorder::default();
    join(&mut c, &mut t, 2);
    join(&mut c, &mut t, 3);
    request(&mut c, &mut t, 1, 0, 30);

    lost(&mut c, &mut t, 2);
    result(&mut c, &mut t, 3, 5, 15);
    assert_eq!(assigned(&c, 3), Some(0..10));

    result(&mut c, &mut t, 3, 7, 3);
    assert_eq!(assigned(&c, 3), Some(20..30));
}

#[test]
fn idle_worker_picks_up_requeued_unit() {
    let mut c = Coordinator::new(10);
    let mut t = Recorder::default();
    join(&mut c, &mut t, 2);
    request(&mut c, &mut t, 1, 0, 10);
    join(&mut c, &mut t, 3);
    assert_eq!(assigned(&c, 3), None);
    t.take();

    lost(&mut c, &mut t, 2);
    assert_eq!(t.take(), vec![(ConnId(3), Message::request("bitcoin", 0, 10))]);
    assert_single_owner(&c);
}

#[test]
fn orphaned_result_is_discarded() {
    let mut c = Coordinator::new(10);
    let mut t = Recorder::default();
    join(&mut c, &mut t, 2);
    request(&mut c, &mut t, 1, 0, 30);
    t.take();

    lost(&mut c, &mut t, 1);
    result(&mut c, &mut t, 2, 1, 1);
    assert!(t.take().is_empty());
    assert_eq!(c.stats(), Stats { workers: 1, ..Default::default() });
}

#[test]
fn departed_client_units_are_purged() {
    let mut c = Coordinator::new(10);
    let mut t = Recorder::default();
    join(&mut c, &mut t, 2);
    join(&mut c, &mut t, 3);
    request(&mut c, &mut t, 1, 0, 100);
    lost(&mut c, &mut t, 2);
    assert_eq!(c.stats().idle_units, 1);

    lost(&mut c, &mut t, 1);
    let stats = c.stats();
    assert_eq!((stats.idle_units, stats.pending_clients, stats.requests), (0, 0, 0));

    // worker 3 still computes for the departed client, its unit is not requeued
    lost(&mut c, &mut t, 3);
    assert_eq!(c.stats(), Stats::default());
}

#[test]
fn other_clients_are_unaffected_by_a_departure() {
    let mut c = Coordinator::new(10);
    let mut t = Recorder::default();
    request(&mut c, &mut t, 1, 0, 20);
    request(&mut c, &mut t, 5, 0, 20);
    join(&mut c, &mut t, 2);
    lost(&mut c, &mut t, 1);

    while assigned(&c, 2).is_some() {
        result(&mut c, &mut t, 2, 42, 0);
    }
    assert!(t.to(1).is_empty());
    assert_eq!(t.to(5), vec![&Message::result(42, 0)]);
}

#[test]
fn best_result_is_the_minimum_of_all_units() {
    let mut c = Coordinator::new(1);
    let mut t = Recorder::default();
    join(&mut c, &mut t, 2);
    request(&mut c, &mut t, 1, 0, 5);

    let mut observed = vec![];
    for (hash, nonce) in [(90, 0), (30, 1), (60, 2), (30, 3), (10, 4)] {
        result(&mut c, &mut t, 2, hash, nonce);
        if let Some(best) = c.best.get(&ConnId(1)) {
            observed.push(best.hash);
        }
    }
    assert!(observed.windows(2).all(|w| w[0] >= w[1]));
    assert_eq!(t.to(1), vec![&Message::result(10, 4)]);
}

#[test]
fn empty_range_is_answered_immediately() {
    let mut c = Coordinator::new(10);
    let mut t = Recorder::default();
    join(&mut c, &mut t, 2);
    request(&mut c, &mut t, 1, 7, 7);
    assert_eq!(t.take(), vec![(ConnId(1), Message::result(u64::MAX, u64::MAX))]);
    assert_eq!(c.stats(), Stats { workers: 1, ..Default::default() });
}

#[test]
fn inverted_range_is_dropped() {
    let mut c = Coordinator::new(10);
    let mut t = Recorder::default();
    request(&mut c, &mut t, 1, 9, 3);
    assert!(t.take().is_empty());
    assert_eq!(c.stats(), Stats::default());
}

#[test]
fn messages_out_of_role_are_ignored() {
    let mut c = Coordinator::new(10);
    let mut t = Recorder::default();
    join(&mut c, &mut t, 2);
    request(&mut c, &mut t, 1, 0, 20);
    t.take();

    join(&mut c, &mut t, 1);
    result(&mut c, &mut t, 1, 0, 0);
    request(&mut c, &mut t, 1, 0, 1000);
    request(&mut c, &mut t, 2, 0, 1000);
    join(&mut c, &mut t, 2);

    assert!(t.take().is_empty());
    assert_eq!(c.stats(), Stats {
        workers: 1,
        busy_workers: 1,
        requests: 1,
        pending_clients: 1,
        idle_units: 0,
    });
    assert_eq!(assigned(&c, 2), Some(0..10));
}

#[test]
fn result_from_unknown_connection_makes_it_a_worker() {
    let mut c = Coordinator::new(10);
    let mut t = Recorder::default();
    request(&mut c, &mut t, 1, 0, 20);

    result(&mut c, &mut t, 4, 0, 0);
    assert_eq!(assigned(&c, 4), Some(0..10));

    lost(&mut c, &mut t, 4);
    assert_eq!(c.stats().idle_units, 1);
}

#[test]
fn failed_send_is_recovered_on_disconnect() {
    let mut c = Coordinator::new(10);
    let mut t = Recorder::default();
    t.broken.insert(ConnId(2));
    join(&mut c, &mut t, 2);
    request(&mut c, &mut t, 1, 0, 10);
    assert_eq!(assigned(&c, 2), Some(0..10));

    lost(&mut c, &mut t, 2);
    join(&mut c, &mut t, 3);
    assert_eq!(t.to(3), vec![&Message::request("bitcoin", 0, 10)]);
}

#[test]
fn churn_never_duplicates_units() {
    let mut c = Coordinator::new(3);
    let mut t = Recorder::default();
    request(&mut c, &mut t, 1, 0, 40);
    request(&mut c, &mut t, 2, 0, 40);
    for worker in 10..14 {
        join(&mut c, &mut t, worker);
    }

    let mut next_worker = 14;
    for round in 0..200_u64 {
        assert_single_owner(&c);
        let busy: Vec<u64> = c.workers.iter().filter(|(_, u)| u.is_some()).map(|(id, _)| id.0).collect();
        let Some(&worker) = busy.get(round as usize % busy.len().max(1)) else {
            break;
        };
        if round % 5 == 0 {
            lost(&mut c, &mut t, worker);
            join(&mut c, &mut t, next_worker);
            next_worker += 1;
        } else {
            result(&mut c, &mut t, worker, round, round);
        }
    }
    assert_single_owner(&c);
    assert_eq!(t.to(1).len(), 1);
    assert_eq!(t.to(2).len(), 1);
    assert_eq!(c.stats().requests, 0);
}
