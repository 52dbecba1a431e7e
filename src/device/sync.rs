//! Rendezvous flags for the start/stop handshakes.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Lock a mutex, continuing with the inner value if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A boolean flag one thread can block on until another thread flips it.
///
/// Used for the `loop_running` handshake (a stop is never issued before
/// the worker is listening) and the `still_capture` fence (a stop never
/// truncates an in-flight still picture).
#[derive(Debug, Default)]
pub(crate) struct Rendezvous {
    flag: Mutex<bool>,
    cond: Condvar,
}

impl Rendezvous {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        *lock(&self.flag) = true;
        self.cond.notify_all();
    }

    pub fn clear(&self) {
        *lock(&self.flag) = false;
        self.cond.notify_all();
    }

    /// Set the flag if it is clear; returns whether this call set it.
    pub fn try_set(&self) -> bool {
        let mut flag = lock(&self.flag);
        if *flag {
            false
        } else {
            *flag = true;
            self.cond.notify_all();
            true
        }
    }

    pub fn is_set(&self) -> bool {
        *lock(&self.flag)
    }

    pub fn wait_until_set(&self) {
        let mut flag = lock(&self.flag);
        while !*flag {
            flag = self
                .cond
                .wait(flag)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn wait_until_clear(&self) {
        let mut flag = lock(&self.flag);
        while *flag {
            flag = self
                .cond
                .wait(flag)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn wait_until_set_blocks_until_peer_sets() {
        let flag = Arc::new(Rendezvous::new());
        let peer = Arc::clone(&flag);
        let setter = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            peer.set();
        });
        flag.wait_until_set();
        assert!(flag.is_set());
        setter.join().expect("setter thread");
    }

    #[test]
    fn wait_until_clear_blocks_until_peer_clears() {
        let flag = Arc::new(Rendezvous::new());
        flag.set();
        let peer = Arc::clone(&flag);
        let clearer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            peer.clear();
        });
        flag.wait_until_clear();
        assert!(!flag.is_set());
        clearer.join().expect("clearer thread");
    }

    #[test]
    fn try_set_is_exclusive() {
        let flag = Rendezvous::new();
        assert!(flag.try_set());
        assert!(!flag.try_set());
        flag.clear();
        assert!(flag.try_set());
    }
}
