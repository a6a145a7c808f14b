//! Observable cross-tab key-value store.
//!
//! Stands in for browser localStorage plus its change events: two JSON slots
//! shared by every tab of the same user, with a notification fanned out to
//! all subscribers on each write. Tabs reload slot values on notification
//! instead of keeping divergent copies, so one tab's expiry timer clears a
//! ring everywhere.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreSlot {
    OutgoingCall,
    IncomingCall,
}

impl StoreSlot {
    pub fn key(&self) -> &'static str {
        match self {
            StoreSlot::OutgoingCall => "aerosonix_outgoing_call",
            StoreSlot::IncomingCall => "aerosonix_incoming_call",
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    slots: HashMap<StoreSlot, serde_json::Value>,
    watchers: Vec<flume::Sender<StoreSlot>>,
}

#[derive(Debug, Clone, Default)]
pub struct TabStore {
    inner: Arc<Mutex<Inner>>,
}

impl TabStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self, slot: StoreSlot) -> Option<serde_json::Value> {
        let inner = self.lock();
        inner.slots.get(&slot).cloned()
    }

    /// Write (`Some`) or clear (`None`) a slot and notify every subscriber,
    /// the writing tab included; reloading one's own write is idempotent.
    pub fn write(&self, slot: StoreSlot, value: Option<serde_json::Value>) {
        let mut inner = self.lock();
        match value {
            Some(v) => {
                inner.slots.insert(slot, v);
            }
            None => {
                inner.slots.remove(&slot);
            }
        }
        inner.watchers.retain(|w| w.send(slot).is_ok());
    }

    pub fn subscribe(&self) -> flume::Receiver<StoreSlot> {
        let (tx, rx) = flume::unbounded();
        self.lock().watchers.push(tx);
        rx
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_notifies_all_subscribers() {
        let store = TabStore::new();
        let rx_a = store.subscribe();
        let rx_b = store.subscribe();

        store.write(StoreSlot::IncomingCall, Some(serde_json::json!({"x": 1})));

        assert_eq!(rx_a.recv().unwrap(), StoreSlot::IncomingCall);
        assert_eq!(rx_b.recv().unwrap(), StoreSlot::IncomingCall);
        assert_eq!(
            store.read(StoreSlot::IncomingCall),
            Some(serde_json::json!({"x": 1}))
        );
    }

    #[test]
    fn clear_removes_the_slot_and_still_notifies() {
        let store = TabStore::new();
        store.write(StoreSlot::OutgoingCall, Some(serde_json::json!("t")));
        let rx = store.subscribe();

        store.write(StoreSlot::OutgoingCall, None);

        assert_eq!(rx.recv().unwrap(), StoreSlot::OutgoingCall);
        assert_eq!(store.read(StoreSlot::OutgoingCall), None);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let store = TabStore::new();
        drop(store.subscribe());
        // Must not error or leak; a later write simply prunes the dead watcher.
        store.write(StoreSlot::IncomingCall, None);
        let rx = store.subscribe();
        store.write(StoreSlot::IncomingCall, Some(serde_json::json!(1)));
        assert_eq!(rx.recv().unwrap(), StoreSlot::IncomingCall);
    }
}
