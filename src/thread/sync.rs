// Worker synchronization - WAIT/DONE guarded condition pairs
//
// Each pair starts as WAIT|DONE.
//
// wait:    if WAIT is set, clear DONE and sleep while WAIT && !DONE;
//          then re-arm to WAIT|DONE
// signal:  clear WAIT; notify only if a waiter cleared DONE
//
// A signal that arrives before the wait clears WAIT, so the later wait does
// not sleep: no lost wakeup. Two signals before a wait collapse into one.
// Flags change only under the pair's mutex.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::{Condvar, Mutex};

pub const STATUS_WAIT: u32 = 1;
pub const STATUS_DONE: u32 = 1 << 1;

/// One mutex + condvar guarded by WAIT/DONE
#[derive(Debug)]
pub struct SyncPair {
    flags: AtomicU32,
    mutex: Mutex<()>,
    cond: Condvar,
}

impl SyncPair {
    pub fn new() -> Self {
        Self {
            flags: AtomicU32::new(STATUS_WAIT | STATUS_DONE),
            mutex: Mutex::new(()),
            cond: Condvar::new(),
        }
    }

    pub fn flags(&self) -> u32 {
        self.flags.load(Ordering::Acquire)
    }

    fn is_set(&self, bit: u32) -> bool {
        self.flags() & bit != 0
    }

    /// Block until the counterpart signals (returns at once if it already did)
    pub fn wait(&self) {
        let mut guard = self.mutex.lock();

        if self.is_set(STATUS_WAIT) {
            self.flags.fetch_and(!STATUS_DONE, Ordering::AcqRel);

            while self.is_set(STATUS_WAIT) && !self.is_set(STATUS_DONE) {
                self.cond.wait(&mut guard);
            }
        }

        self.flags
            .fetch_or(STATUS_WAIT | STATUS_DONE, Ordering::AcqRel);
    }

    /// Wake the waiter, or let its next wait pass
    pub fn signal(&self) {
        let _guard = self.mutex.lock();

        self.flags.fetch_and(!STATUS_WAIT, Ordering::AcqRel);
        if !self.is_set(STATUS_DONE) {
            self.cond.notify_one();
        }
    }

    /// Unconditional release used on shutdown
    pub fn release(&self) {
        let _guard = self.mutex.lock();

        self.flags.fetch_and(!STATUS_WAIT, Ordering::AcqRel);
        self.cond.notify_all();
    }

    /// Back to WAIT|DONE, dropping any pending signal
    pub fn reset(&self) {
        let _guard = self.mutex.lock();
        self.flags
            .store(STATUS_WAIT | STATUS_DONE, Ordering::Release);
    }
}

impl Default for SyncPair {
    fn default() -> Self {
        Self::new()
    }
}

/// Wakeup (owner → worker) and done (worker → owner) pairs of one worker
#[derive(Debug, Default)]
pub struct WorkerSync {
    pub wakeup: SyncPair,
    pub done: SyncPair,
}

impl WorkerSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self) {
        self.wakeup.reset();
        self.done.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_signal_before_wait_is_not_lost() {
        let pair = SyncPair::new();

        pair.signal();
        assert_eq!(pair.flags(), STATUS_DONE);

        // Returns immediately and re-arms
        pair.wait();
        assert_eq!(pair.flags(), STATUS_WAIT | STATUS_DONE);
    }

    #[test]
    fn test_signal_wakes_waiter() {
        let pair = Arc::new(SyncPair::new());
        let (tx, rx) = mpsc::channel();

        let waiter = {
            let pair = pair.clone();
            thread::spawn(move || {
                pair.wait();
                tx.send(()).unwrap();
            })
        };

        // Give the waiter time to park
        thread::sleep(Duration::from_millis(20));
        assert!(rx.try_recv().is_err());

        pair.signal();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        waiter.join().unwrap();
    }

    #[test]
    fn test_double_signal_collapses() {
        let pair = SyncPair::new();
        pair.signal();
        pair.signal();

        pair.wait();
        // The second signal did not leave a pending wakeup behind
        assert_eq!(pair.flags(), STATUS_WAIT | STATUS_DONE);
    }

    #[test]
    fn test_release_unblocks_waiter() {
        let pair = Arc::new(SyncPair::new());
        let (tx, rx) = mpsc::channel();

        let waiter = {
            let pair = pair.clone();
            thread::spawn(move || {
                pair.wait();
                tx.send(()).unwrap();
            })
        };

        thread::sleep(Duration::from_millis(20));
        pair.release();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        waiter.join().unwrap();
    }

    #[test]
    fn test_ping_pong() {
        let sync = Arc::new(WorkerSync::new());
        let rounds = 500;

        let worker = {
            let sync = sync.clone();
            thread::spawn(move || {
                for _ in 0..rounds {
                    sync.wakeup.wait();
                    sync.done.signal();
                }
            })
        };

        for _ in 0..rounds {
            sync.wakeup.signal();
            sync.done.wait();
        }

        worker.join().unwrap();
    }

    #[test]
    fn test_reset_drops_pending_signal() {
        let pair = SyncPair::new();
        pair.signal();
        pair.reset();
        assert_eq!(pair.flags(), STATUS_WAIT | STATUS_DONE);
    }
}
