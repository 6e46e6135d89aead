use std::{
    collections::HashSet,
    sync::{Mutex, MutexGuard, PoisonError},
};

use alloy::primitives::Address;
use log::debug;
use tokio::sync::mpsc;

/// Set of pool addresses the listener subscribes to.
///
/// Every `add`/`remove` call posts a change notification on a channel of
/// capacity one. Notifications coalesce: while one is pending, further
/// changes do not queue another, so consumers must re-read [`snapshot`]
/// after each notification instead of counting them.
///
/// [`snapshot`]: WatchedAddresses::snapshot
pub struct WatchedAddresses {
    addresses: Mutex<HashSet<Address>>,
    notify_tx: mpsc::Sender<()>,
    notify_rx: tokio::sync::Mutex<mpsc::Receiver<()>>,
}

impl Default for WatchedAddresses {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchedAddresses {
    pub fn new() -> Self {
        let (notify_tx, notify_rx) = mpsc::channel(1);
        Self {
            addresses: Mutex::new(HashSet::new()),
            notify_tx,
            notify_rx: tokio::sync::Mutex::new(notify_rx),
        }
    }

    pub fn add<I>(&self, addresses: I)
    where
        I: IntoIterator<Item = Address>,
    {
        let mut set = self.lock();
        set.extend(addresses);
        debug!("Watched addresses after add: {}", set.len());
        self.notify_change();
    }

    pub fn remove<I>(&self, addresses: I)
    where
        I: IntoIterator<Item = Address>,
    {
        let mut set = self.lock();
        for address in addresses {
            set.remove(&address);
        }
        debug!("Watched addresses after remove: {}", set.len());
        self.notify_change();
    }

    /// Consistent copy of the current set.
    pub fn snapshot(&self) -> HashSet<Address> {
        self.lock().clone()
    }

    /// Wait until the set has changed since the last consumed notification.
    ///
    /// Intended for a single consumer (the listener).
    pub async fn changed(&self) {
        // The sender lives as long as `self`, so `recv` never yields `None` here.
        let _ = self.notify_rx.lock().await.recv().await;
    }

    /// Consume a pending notification without waiting. Returns whether one was pending.
    pub fn take_pending_change(&self) -> bool {
        match self.notify_rx.try_lock() {
            Ok(mut rx) => rx.try_recv().is_ok(),
            Err(_) => false,
        }
    }

    fn notify_change(&self) {
        // Full means a notification is already pending; drop this one.
        let _ = self.notify_tx.try_send(());
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<Address>> {
        self.addresses.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use alloy::primitives::address;

    use super::*;

    const A: Address = address!("00000000000000000000000000000000000000a1");
    const B: Address = address!("00000000000000000000000000000000000000b2");
    const C: Address = address!("00000000000000000000000000000000000000c3");

    #[test]
    fn test_add_is_idempotent() {
        let registry = WatchedAddresses::new();
        registry.add([A]);
        registry.add([A]);

        assert_eq!(registry.snapshot(), HashSet::from([A]));
    }

    #[test]
    fn test_remove_non_member_is_noop() {
        let registry = WatchedAddresses::new();
        registry.add([A, B]);
        registry.remove([C]);

        assert_eq!(registry.snapshot(), HashSet::from([A, B]));
    }

    #[test]
    fn test_snapshot_is_set_difference() {
        let registry = WatchedAddresses::new();
        registry.add([A, B, C]);
        registry.remove([B]);

        assert_eq!(registry.snapshot(), HashSet::from([A, C]));

        // Same operations on disjoint addresses in another order
        let other = WatchedAddresses::new();
        other.add([C]);
        other.remove([B]);
        other.add([A]);

        assert_eq!(other.snapshot(), registry.snapshot());
    }

    #[test]
    fn test_notifications_coalesce() {
        let registry = WatchedAddresses::new();
        registry.add([A]);
        registry.add([B]);
        registry.remove([A]);

        assert!(registry.take_pending_change());
        assert!(!registry.take_pending_change());
    }

    #[tokio::test]
    async fn test_changed_wakes_waiter() {
        let registry = std::sync::Arc::new(WatchedAddresses::new());

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.changed().await })
        };

        registry.add([A]);

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("expected a change notification")
            .unwrap();
    }
}
