use std::{ops::Range, thread, time::Instant};

use shared::hash;
use tracing::*;

/// Splits `range` into `cores` contiguous slices and searches them on
/// separate threads. Returns the minimum `(hash, nonce)`.
pub fn parallel_search(data: &str, range: Range<u64>, cores: usize) -> Option<(u64, u64)> {
    let start = Instant::now();
    let total = range.end.saturating_sub(range.start);
    let step = total.div_ceil(cores.max(1) as u64).max(1);

    let best = thread::scope(|scope| {
        let handles: Vec<_> = (range.start..range.end)
            .step_by(step as usize)
            .map(|lower| {
                let slice = lower..lower.saturating_add(step).min(range.end);
                scope.spawn(move || hash::search(data, slice))
            })
            .collect();
        handles.into_iter().filter_map(|h| h.join().ok().flatten()).min()
    });

    let elapsed = start.elapsed().as_millis().max(1);
    debug!("searched {total} nonces in {elapsed} ms, {} H/s", 1000 * total as u128 / elapsed);
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_single_threaded_search() {
        for cores in [1, 3, 8] {
            assert_eq!(parallel_search("abc", 10..1010, cores), hash::search("abc", 10..1010));
        }
    }

    #[test]
    fn more_cores_than_nonces() {
        assert_eq!(parallel_search("abc", 5..7, 16), hash::search("abc", 5..7));
    }

    #[test]
    fn empty_range() {
        assert_eq!(parallel_search("abc", 9..9, 4), None);
    }
}
