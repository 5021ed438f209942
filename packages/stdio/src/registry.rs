//! Registry of open streams.
//!
//! Slots live in a vector and are chained into a doubly linked list by
//! index, newest first, so registration and removal from anywhere in the
//! list are constant time. The registry lock covers only the slot table;
//! stream state has its own lock and is never touched while this one is
//! held.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Result, StdioError};
use crate::handle::StreamHandle;
use crate::stream::StreamState;

pub(crate) type SharedStream = Arc<Mutex<StreamState>>;

#[derive(Default)]
struct Slot {
    generation: u16,
    stream: Option<SharedStream>,
    prev: Option<u32>,
    next: Option<u32>,
}

#[derive(Default)]
struct Slots {
    slots: Vec<Slot>,
    head: Option<u32>,
    free: Vec<u32>,
    live: usize,
    /// Set by teardown; no registration succeeds afterwards.
    closed: bool,
}

impl Slots {
    fn link_front(&mut self, index: u32) {
        let old_head = self.head;
        {
            let slot = &mut self.slots[index as usize];
            slot.prev = None;
            slot.next = old_head;
        }
        if let Some(old) = old_head {
            self.slots[old as usize].prev = Some(index);
        }
        self.head = Some(index);
    }

    fn unlink(&mut self, index: u32) {
        let (prev, next) = {
            let slot = &mut self.slots[index as usize];
            (slot.prev.take(), slot.next.take())
        };
        match prev {
            Some(prev) => self.slots[prev as usize].next = next,
            None => self.head = next,
        }
        if let Some(next) = next {
            self.slots[next as usize].prev = prev;
        }
    }

    /// Detach the stream in `index`, retiring the slot's generation.
    fn retire(&mut self, index: u32) -> Option<SharedStream> {
        let stream = self.slots[index as usize].stream.take()?;
        self.unlink(index);
        let slot = &mut self.slots[index as usize];
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        self.live -= 1;
        Some(stream)
    }

    fn indices(&self) -> Vec<u32> {
        let mut indices = Vec::with_capacity(self.live);
        let mut cursor = self.head;
        while let Some(index) = cursor {
            indices.push(index);
            cursor = self.slots[index as usize].next;
        }
        indices
    }
}

pub(crate) struct Registry {
    inner: Mutex<Slots>,
    capacity: usize,
}

impl Registry {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Slots::default()),
            capacity,
        }
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn register(&self, stream: StreamState) -> Result<StreamHandle> {
        let mut slots = self.slots();
        if slots.closed {
            return Err(StdioError::ShutDown);
        }
        if slots.live >= self.capacity {
            return Err(StdioError::TooManyStreams);
        }

        let index = match slots.free.pop() {
            Some(index) => index,
            None => {
                let index =
                    u32::try_from(slots.slots.len()).map_err(|_| StdioError::TooManyStreams)?;
                slots.slots.push(Slot::default());
                index
            }
        };

        slots.slots[index as usize].stream = Some(Arc::new(Mutex::new(stream)));
        slots.link_front(index);
        slots.live += 1;

        Ok(StreamHandle::new(
            index,
            slots.slots[index as usize].generation,
        ))
    }

    pub(crate) fn lookup(&self, handle: StreamHandle) -> Option<SharedStream> {
        let slots = self.slots();
        let slot = slots.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.stream.clone()
    }

    /// Remove a stream from the registry. Only one caller ever gets the
    /// stream back for a given registration.
    pub(crate) fn unregister(&self, handle: StreamHandle) -> Option<SharedStream> {
        let mut slots = self.slots();
        let slot = slots.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slots.retire(handle.index)
    }

    /// Close the registry and hand back every stream, newest first.
    pub(crate) fn drain_all(&self) -> Vec<SharedStream> {
        let mut slots = self.slots();
        slots.closed = true;
        slots
            .indices()
            .into_iter()
            .filter_map(|index| slots.retire(index))
            .collect()
    }

    /// Every registered stream, newest first.
    pub(crate) fn snapshot(&self) -> Vec<SharedStream> {
        let slots = self.slots();
        slots
            .indices()
            .into_iter()
            .filter_map(|index| slots.slots[index as usize].stream.clone())
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots().live
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.slots().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StdioConfig;
    use crate::mode::{Access, BufferRequest, FlushPolicy, StreamTarget};
    use hostlibc_sys::DescriptorTable;

    fn memory_stream() -> StreamState {
        StreamState::open(
            StreamTarget::Memory,
            Access::WRITE,
            FlushPolicy::Full,
            BufferRequest::Owned(4),
            &StdioConfig::default(),
            &DescriptorTable::empty(),
        )
        .unwrap()
    }

    #[test]
    fn newest_first_order() {
        let registry = Registry::new(8);
        let a = registry.register(memory_stream()).unwrap();
        let b = registry.register(memory_stream()).unwrap();
        let c = registry.register(memory_stream()).unwrap();

        let order: Vec<_> = registry.snapshot();
        assert_eq!(order.len(), 3);
        assert!(Arc::ptr_eq(&order[0], &registry.lookup(c).unwrap()));
        assert!(Arc::ptr_eq(&order[2], &registry.lookup(a).unwrap()));

        // removal from the middle keeps the chain intact
        registry.unregister(b).unwrap();
        let order = registry.snapshot();
        assert_eq!(order.len(), 2);
        assert!(Arc::ptr_eq(&order[0], &registry.lookup(c).unwrap()));
        assert!(Arc::ptr_eq(&order[1], &registry.lookup(a).unwrap()));
    }

    #[test]
    fn stale_handle_misses_reused_slot() {
        let registry = Registry::new(8);
        let old = registry.register(memory_stream()).unwrap();
        registry.unregister(old).unwrap();

        let new = registry.register(memory_stream()).unwrap();
        assert_eq!(new.index, old.index);
        assert!(registry.lookup(old).is_none());
        assert!(registry.unregister(old).is_none());
        assert!(registry.lookup(new).is_some());
    }

    #[test]
    fn capacity_is_enforced() {
        let registry = Registry::new(1);
        registry.register(memory_stream()).unwrap();
        assert!(matches!(
            registry.register(memory_stream()),
            Err(StdioError::TooManyStreams)
        ));
    }

    #[test]
    fn drain_closes_registry() {
        let registry = Registry::new(8);
        let handle = registry.register(memory_stream()).unwrap();
        registry.register(memory_stream()).unwrap();

        assert_eq!(registry.drain_all().len(), 2);
        assert_eq!(registry.len(), 0);
        assert!(registry.is_closed());
        assert!(registry.lookup(handle).is_none());
        assert!(matches!(
            registry.register(memory_stream()),
            Err(StdioError::ShutDown)
        ));
    }
}
