//! Process-local bus used by the POS in every deployment mode.
//!
//! Sales, voids and payment settlements are published here after commit. The
//! API relays them to server-sent events; tests subscribe directly.

use std::sync::{Mutex, mpsc};

use thiserror::Error;

use crate::bus::{EventBus, Subscription};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InMemoryBusError {
    /// A subscriber panicked while the subscriber list was locked.
    #[error("event bus subscriber list is poisoned")]
    Poisoned,
}

/// Fan-out over one std channel per subscriber.
///
/// Publishing never blocks: channels are unbounded and a subscriber that was
/// dropped is removed on the next publish. Nothing is buffered for
/// subscribers that attach later, so consumers that need history read the
/// store instead.
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    subscribers: Mutex<Vec<mpsc::Sender<M>>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live subscribers as of the last publish.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|subs| subs.len()).unwrap_or(0)
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut subs = self.subscribers.lock().map_err(|_| InMemoryBusError::Poisoned)?;
        subs.retain(|tx| tx.send(message.clone()).is_ok());
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();
        // Poisoned: the subscription stays silent rather than failing the caller.
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }
        Subscription::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_sees_events_published_after_it_attached() {
        let bus: InMemoryEventBus<&'static str> = InMemoryEventBus::new();
        bus.publish("sale.recorded").unwrap();

        let dashboard = bus.subscribe();
        let audit = bus.subscribe();
        bus.publish("sale.voided").unwrap();

        assert_eq!(dashboard.try_recv().unwrap(), "sale.voided");
        assert_eq!(audit.try_recv().unwrap(), "sale.voided");
        assert!(dashboard.try_recv().is_err());
    }

    #[test]
    fn dropped_subscribers_are_pruned_on_publish() {
        let bus: InMemoryEventBus<u32> = InMemoryEventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(1).unwrap();
        bus.publish(2).unwrap();

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.try_recv().unwrap(), 1);
        assert_eq!(kept.try_recv().unwrap(), 2);
    }
}
