//! Block event listeners
//!
//! A small synchronous observer registry: handlers are keyed by event tag
//! and invoked in registration order after the owning state transition
//! commits. The engine fires `BeforeBlockAccept` under the chain-tip lock
//! just before linking and `BlockPushed` once the block is committed.

use parking_lot::Mutex;
use std::collections::HashMap;

use crate::block::Block;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockEvent {
    BeforeBlockAccept,
    BlockPushed,
}

pub type BlockListener = Box<dyn Fn(&Block) + Send + Sync>;

#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<HashMap<BlockEvent, Vec<BlockListener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `event`. Handlers run synchronously in
    /// registration order and must not call back into the engine.
    pub fn on<F>(&self, event: BlockEvent, listener: F)
    where
        F: Fn(&Block) + Send + Sync + 'static,
    {
        self.listeners
            .lock()
            .entry(event)
            .or_default()
            .push(Box::new(listener));
    }

    pub fn notify(&self, event: BlockEvent, block: &Block) {
        let listeners = self.listeners.lock();
        if let Some(handlers) = listeners.get(&event) {
            for handler in handlers {
                handler(block);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn sample_block() -> Block {
        Block::new(3, 240, 1, [0u8; 32], [0u8; 32], [0u8; 32], 0, 1, vec![])
    }

    #[test]
    fn test_listeners_fire_in_registration_order() {
        let registry = ListenerRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in 0..3 {
            let order = Arc::clone(&order);
            registry.on(BlockEvent::BlockPushed, move |_| order.lock().push(tag));
        }

        registry.notify(BlockEvent::BlockPushed, &sample_block());
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_events_are_independent() {
        let registry = ListenerRegistry::new();
        let pushed = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&pushed);
        registry.on(BlockEvent::BlockPushed, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        registry.notify(BlockEvent::BeforeBlockAccept, &sample_block());
        assert_eq!(pushed.load(Ordering::SeqCst), 0);

        registry.notify(BlockEvent::BlockPushed, &sample_block());
        assert_eq!(pushed.load(Ordering::SeqCst), 1);
    }
}
