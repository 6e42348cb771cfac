use parking_lot::{Condvar, Mutex};
use rao_core::Network;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::debug;

/// Fixed set of network copies shared by the leaves of one depth.
///
/// A checked-out copy is exclusively owned by one leaf. When the lease is
/// dropped, a fresh copy of the base network takes its place, so the next
/// leaf always starts from the pre-perimeter state.
pub struct NetworkPool<N: Network> {
    base: N,
    available: Mutex<Vec<N>>,
    returned: Condvar,
    size: usize,
}

impl<N: Network> NetworkPool<N> {
    pub fn new(base: &N, size: usize) -> Arc<Self> {
        let size = size.max(1);
        debug!(network = base.id(), size, "creating network pool");
        Arc::new(Self {
            base: base.clone(),
            available: Mutex::new((0..size).map(|_| base.clone()).collect()),
            returned: Condvar::new(),
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Copies not currently leased.
    pub fn available(&self) -> usize {
        self.available.lock().len()
    }

    /// Take a copy, waiting for one to be released if all are in use.
    pub fn checkout(self: &Arc<Self>) -> NetworkLease<N> {
        let mut available = self.available.lock();
        let network = loop {
            match available.pop() {
                Some(network) => break network,
                None => self.returned.wait(&mut available),
            }
        };
        NetworkLease {
            pool: Arc::clone(self),
            network,
        }
    }

    fn restore(&self) {
        self.available.lock().push(self.base.clone());
        self.returned.notify_one();
    }
}

/// Exclusive use of one network copy of a [`NetworkPool`].
pub struct NetworkLease<N: Network> {
    pool: Arc<NetworkPool<N>>,
    network: N,
}

impl<N: Network> Deref for NetworkLease<N> {
    type Target = N;

    fn deref(&self) -> &N {
        &self.network
    }
}

impl<N: Network> DerefMut for NetworkLease<N> {
    fn deref_mut(&mut self) -> &mut N {
        &mut self.network
    }
}

impl<N: Network> Drop for NetworkLease<N> {
    fn drop(&mut self) {
        self.pool.restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rao_core::LinearNetwork;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_released_copy_is_reset() {
        let base = LinearNetwork::new("net").with_switchable("line");
        let pool = NetworkPool::new(&base, 1);
        {
            let mut lease = pool.checkout();
            lease.set_connected("line", false);
            assert_eq!(pool.available(), 0);
        }
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.checkout().is_connected("line"), Some(true));
    }

    #[test]
    fn test_checkout_waits_for_release() {
        let pool = NetworkPool::new(&LinearNetwork::new("net"), 1);
        let lease = pool.checkout();

        let waiting = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.checkout().id().to_string())
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!waiting.is_finished());

        drop(lease);
        assert_eq!(waiting.join().unwrap(), "net");
        assert_eq!(pool.available(), 1);
    }
}
