//! Ranged-loop adapter over [`Pool::submit`], for the common case of
//! partitioning a flat index range across workers.

use super::error::TaskError;
use super::pool::Pool;

/// Run `body` over `[begin, end)`, split into blocks of at most `block_size` elements, one call
/// to `body` per block and one work unit per call. Blocks are dispatched the same way any other
/// multi-unit task is: workers pull them off the ready queue in no particular order, and may run
/// more than one concurrently.
///
/// `body` receives the inclusive start and exclusive end of its block. Blocks onto the calling
/// thread until every block has run, returning the first captured failure if any block panicked.
///
/// Panics if `block_size` is `0`.
pub fn parallel_for<F>(pool: &Pool, begin: usize, end: usize, block_size: usize, body: F) -> Result<(), TaskError>
where
    F: Fn(usize, usize) + Send + Sync + 'static,
{
    assert!(block_size > 0, "block_size must be at least 1");

    if begin >= end {
        return Ok(());
    }

    let total = end - begin;
    let units = (total + block_size - 1) / block_size;

    pool.submit(
        units,
        move |unit| {
            let block_begin = begin + unit * block_size;
            let block_end = (block_begin + block_size).min(end);
            body(block_begin, block_end);
        },
        &[],
        false,
    )
    .wait()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolSize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn covers_every_index_exactly_once() {
        let pool = Pool::new(PoolSize::Fixed(4)).unwrap();
        let hits = Arc::new((0..100).map(|_| AtomicUsize::new(0)).collect::<Vec<_>>());
        let cloned = hits.clone();
        parallel_for(&pool, 0, 100, 7, move |start, end| {
            for i in start..end {
                cloned[i].fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();

        for h in hits.iter() {
            assert_eq!(h.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn empty_range_is_a_no_op() {
        let pool = Pool::new(PoolSize::Fixed(1)).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        let cloned = ran.clone();
        parallel_for(&pool, 5, 5, 3, move |_, _| {
            cloned.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn propagates_a_block_failure() {
        let pool = Pool::new(PoolSize::Fixed(2)).unwrap();
        let result = parallel_for(&pool, 0, 10, 2, |start, _end| {
            if start == 4 {
                panic!("boom at {start}");
            }
        });
        assert!(result.is_err());
    }
}
