// `Cursor` contract and cooperative cancellation.
//
// Pull-based iteration over a snapshot, narrowed to three operations:
// advance, read, close.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::error::TransactionResult;

/// A shared, cheaply-cloned flag an `AbstractTx` (or its owning query)
/// sets to ask every `Cursor` reading through it to stop early. Checked
/// at strand boundaries, not on every row, so cancellation is cooperative
/// rather than preemptive.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull-based iteration contract every `EntityTx`/`IndexTx` scan and
/// runtime `Operator` source implements.
///
/// Protocol: call `move_next` before the first `key`/`value`; once it
/// returns `false` no further `key`/`value` call is valid until the
/// cursor is re-opened. `close` may be called at any time, including
/// before exhaustion, and is idempotent — closing twice is a no-op.
pub trait Cursor<T> {
    /// Advances to the next element. Returns `false` on exhaustion or
    /// cancellation.
    fn move_next(&mut self) -> TransactionResult<bool>;

    /// The current element's key, e.g. a `TupleId`. Only valid
    /// immediately after `move_next` returned `true`.
    fn key(&self) -> u64;

    /// The current element's value. Only valid immediately after
    /// `move_next` returned `true`.
    fn value(&self) -> &T;

    /// Releases any resources (locks, file handles) this cursor holds.
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecCursor {
        items: Vec<(u64, i32)>,
        pos: usize,
        started: bool,
        cancellation: CancellationToken,
        closed: bool,
    }

    impl Cursor<i32> for VecCursor {
        fn move_next(&mut self) -> TransactionResult<bool> {
            if self.closed || self.cancellation.is_cancelled() {
                return Ok(false);
            }
            if self.started {
                self.pos += 1;
            }
            self.started = true;
            Ok(self.pos < self.items.len())
        }

        fn key(&self) -> u64 {
            self.items[self.pos].0
        }

        fn value(&self) -> &i32 {
            &self.items[self.pos].1
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    #[test]
    fn iterates_all_elements_then_stops() {
        let mut c = VecCursor {
            items: vec![(1, 10), (2, 20)],
            pos: 0,
            started: false,
            cancellation: CancellationToken::new(),
            closed: false,
        };
        assert!(c.move_next().unwrap());
        assert_eq!(*c.value(), 10);
        assert!(c.move_next().unwrap());
        assert_eq!(*c.value(), 20);
        assert!(!c.move_next().unwrap());
    }

    #[test]
    fn cancellation_stops_iteration_early() {
        let token = CancellationToken::new();
        let mut c = VecCursor {
            items: vec![(1, 10), (2, 20), (3, 30)],
            pos: 0,
            started: false,
            cancellation: token.clone(),
            closed: false,
        };
        assert!(c.move_next().unwrap());
        token.cancel();
        assert!(!c.move_next().unwrap());
    }

    #[test]
    fn close_is_idempotent() {
        let mut c = VecCursor {
            items: vec![(1, 10)],
            pos: 0,
            started: false,
            cancellation: CancellationToken::new(),
            closed: false,
        };
        c.close();
        c.close();
        assert!(!c.move_next().unwrap());
    }
}
