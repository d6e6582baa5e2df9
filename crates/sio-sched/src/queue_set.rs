//! Four FIFO queues, one per request class.
//!
//! Requests live in a slot arena; each class queue is a doubly linked list
//! threaded through the slots by index. That keeps enqueue, head removal,
//! out-of-band removal and neighbor lookup O(1) without raw pointers.
//! Order within a queue is arrival order and is never rearranged.

use tracing::trace;

use crate::error::{SchedError, SchedResult};
use crate::request::{Direction, RequestClass, RequestHandle, RequestRecord};

#[derive(Debug)]
struct Node<T> {
    record: RequestRecord<T>,
    prev: Option<u32>,
    next: Option<u32>,
}

#[derive(Debug)]
enum SlotState<T> {
    Occupied(Node<T>),
    Vacant { next_free: Option<u32> },
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    state: SlotState<T>,
}

#[derive(Debug, Clone, Copy, Default)]
struct ListEnds {
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

/// The four class queues and the arena backing them.
#[derive(Debug)]
pub struct ClassifiedQueueSet<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    lists: [ListEnds; 4],
    len: usize,
}

impl<T> Default for ClassifiedQueueSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ClassifiedQueueSet<T> {
    /// Creates four empty queues.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            lists: [ListEnds::default(); 4],
            len: 0,
        }
    }

    /// Creates four empty queues with room for `capacity` requests.
    pub fn with_capacity(capacity: usize) -> SchedResult<Self> {
        let mut set = Self::new();
        set.slots
            .try_reserve(capacity)
            .map_err(|_| SchedError::AllocationFailed {
                requested: capacity,
            })?;
        Ok(set)
    }

    /// Appends `record` to the tail of its class queue.
    pub fn enqueue(&mut self, record: RequestRecord<T>) -> RequestHandle {
        let class = record.class();
        let ends = self.lists[class.as_index()];
        let node = Node {
            record,
            prev: ends.tail,
            next: None,
        };
        let slot = self.alloc_slot(node);

        match ends.tail {
            Some(tail) => self.node_mut(tail).next = Some(slot),
            None => self.lists[class.as_index()].head = Some(slot),
        }
        let list = &mut self.lists[class.as_index()];
        list.tail = Some(slot);
        list.len += 1;
        self.len += 1;

        let handle = RequestHandle {
            slot,
            generation: self.slots[slot as usize].generation,
        };
        trace!("Queued {} as {}", class, handle);
        handle
    }

    /// Returns the head of a class queue without removing it.
    pub fn peek_head(&self, sync: bool, direction: Direction) -> Option<&RequestRecord<T>> {
        let head = self.lists[RequestClass::new(sync, direction).as_index()].head?;
        Some(&self.node(head).record)
    }

    /// Returns a handle to the head of a class queue.
    pub fn head_handle(&self, sync: bool, direction: Direction) -> Option<RequestHandle> {
        let head = self.lists[RequestClass::new(sync, direction).as_index()].head?;
        Some(self.handle_for(head))
    }

    /// Removes and returns the head of a class queue.
    pub fn pop_head(&mut self, sync: bool, direction: Direction) -> Option<RequestRecord<T>> {
        let head = self.lists[RequestClass::new(sync, direction).as_index()].head?;
        Some(self.unlink(head))
    }

    /// Removes a resident request from wherever it sits in its queue.
    pub fn remove(&mut self, handle: RequestHandle) -> Option<RequestRecord<T>> {
        let slot = self.resident(handle)?;
        Some(self.unlink(slot))
    }

    /// Returns a resident request.
    pub fn get(&self, handle: RequestHandle) -> Option<&RequestRecord<T>> {
        let slot = self.resident(handle)?;
        Some(&self.node(slot).record)
    }

    /// Returns true if `handle` refers to a queued request.
    pub fn contains(&self, handle: RequestHandle) -> bool {
        self.resident(handle).is_some()
    }

    /// Returns the request queued just before `handle` in the same class.
    ///
    /// `None` if `handle` is at the head or not resident.
    pub fn neighbor_before(&self, handle: RequestHandle) -> Option<RequestHandle> {
        let slot = self.resident(handle)?;
        let prev = self.node(slot).prev?;
        Some(self.handle_for(prev))
    }

    /// Returns the request queued just after `handle` in the same class.
    ///
    /// `None` if `handle` is at the tail or not resident.
    pub fn neighbor_after(&self, handle: RequestHandle) -> Option<RequestHandle> {
        let slot = self.resident(handle)?;
        let next = self.node(slot).next?;
        Some(self.handle_for(next))
    }

    /// Returns true iff all four queues are empty.
    #[inline]
    pub fn is_empty_all(&self) -> bool {
        self.len == 0
    }

    /// Total number of queued requests.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true iff all four queues are empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.is_empty_all()
    }

    /// Number of requests queued in one class.
    #[inline]
    pub fn class_len(&self, class: RequestClass) -> usize {
        self.lists[class.as_index()].len
    }

    /// Iterates a class queue from head to tail.
    pub fn iter_class(&self, class: RequestClass) -> ClassIter<'_, T> {
        ClassIter {
            set: self,
            cursor: self.lists[class.as_index()].head,
        }
    }

    fn resident(&self, handle: RequestHandle) -> Option<u32> {
        let slot = self.slots.get(handle.slot as usize)?;
        match slot.state {
            SlotState::Occupied(_) if slot.generation == handle.generation => Some(handle.slot),
            _ => None,
        }
    }

    fn handle_for(&self, slot: u32) -> RequestHandle {
        RequestHandle {
            slot,
            generation: self.slots[slot as usize].generation,
        }
    }

    fn node(&self, slot: u32) -> &Node<T> {
        match &self.slots[slot as usize].state {
            SlotState::Occupied(node) => node,
            SlotState::Vacant { .. } => unreachable!("queue link to vacant slot {}", slot),
        }
    }

    fn node_mut(&mut self, slot: u32) -> &mut Node<T> {
        match &mut self.slots[slot as usize].state {
            SlotState::Occupied(node) => node,
            SlotState::Vacant { .. } => unreachable!("queue link to vacant slot {}", slot),
        }
    }

    fn alloc_slot(&mut self, node: Node<T>) -> u32 {
        match self.free_head {
            Some(free) => {
                let slot = &mut self.slots[free as usize];
                self.free_head = match slot.state {
                    SlotState::Vacant { next_free } => next_free,
                    SlotState::Occupied(_) => unreachable!("free list points at occupied slot"),
                };
                slot.state = SlotState::Occupied(node);
                free
            }
            None => {
                let index = u32::try_from(self.slots.len())
                    .unwrap_or_else(|_| panic!("request arena exceeds {} slots", u32::MAX));
                self.slots.push(Slot {
                    generation: 0,
                    state: SlotState::Occupied(node),
                });
                index
            }
        }
    }

    fn unlink(&mut self, slot: u32) -> RequestRecord<T> {
        let entry = &mut self.slots[slot as usize];
        let state = std::mem::replace(
            &mut entry.state,
            SlotState::Vacant {
                next_free: self.free_head,
            },
        );
        entry.generation = entry.generation.wrapping_add(1);
        self.free_head = Some(slot);

        let node = match state {
            SlotState::Occupied(node) => node,
            SlotState::Vacant { .. } => unreachable!("unlink of vacant slot {}", slot),
        };
        let class = node.record.class();

        match node.prev {
            Some(prev) => self.node_mut(prev).next = node.next,
            None => self.lists[class.as_index()].head = node.next,
        }
        match node.next {
            Some(next) => self.node_mut(next).prev = node.prev,
            None => self.lists[class.as_index()].tail = node.prev,
        }
        self.lists[class.as_index()].len -= 1;
        self.len -= 1;

        node.record
    }
}

/// Iterator over one class queue, head first.
pub struct ClassIter<'a, T> {
    set: &'a ClassifiedQueueSet<T>,
    cursor: Option<u32>,
}

impl<'a, T> Iterator for ClassIter<'a, T> {
    type Item = &'a RequestRecord<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.cursor?;
        let node = self.set.node(slot);
        self.cursor = node.next;
        Some(&node.record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payloads(set: &ClassifiedQueueSet<u32>, class: RequestClass) -> Vec<u32> {
        set.iter_class(class).map(|r| r.payload).collect()
    }

    #[test]
    fn test_new_set_is_empty() {
        let set: ClassifiedQueueSet<u32> = ClassifiedQueueSet::new();
        assert!(set.is_empty_all());
        assert_eq!(set.len(), 0);
        for class in RequestClass::ALL {
            assert!(set.peek_head(class.sync, class.direction).is_none());
        }
    }

    #[test]
    fn test_fifo_within_class() {
        let mut set = ClassifiedQueueSet::new();
        set.enqueue(RequestRecord::sync_read(1));
        set.enqueue(RequestRecord::sync_read(2));
        set.enqueue(RequestRecord::sync_read(3));

        assert_eq!(set.peek_head(true, Direction::Read).unwrap().payload, 1);
        assert_eq!(set.pop_head(true, Direction::Read).unwrap().payload, 1);
        assert_eq!(set.pop_head(true, Direction::Read).unwrap().payload, 2);
        assert_eq!(set.pop_head(true, Direction::Read).unwrap().payload, 3);
        assert!(set.pop_head(true, Direction::Read).is_none());
    }

    #[test]
    fn test_classes_are_disjoint() {
        let mut set = ClassifiedQueueSet::new();
        set.enqueue(RequestRecord::sync_read(1));
        set.enqueue(RequestRecord::async_write(2));
        set.enqueue(RequestRecord::sync_write(3));
        set.enqueue(RequestRecord::async_read(4));

        assert_eq!(set.len(), 4);
        assert_eq!(payloads(&set, RequestClass::SYNC_READ), vec![1]);
        assert_eq!(payloads(&set, RequestClass::ASYNC_WRITE), vec![2]);
        assert_eq!(payloads(&set, RequestClass::SYNC_WRITE), vec![3]);
        assert_eq!(payloads(&set, RequestClass::ASYNC_READ), vec![4]);
    }

    #[test]
    fn test_neighbors() {
        let mut set = ClassifiedQueueSet::new();
        let a = set.enqueue(RequestRecord::async_write(1));
        let b = set.enqueue(RequestRecord::async_write(2));
        let c = set.enqueue(RequestRecord::async_write(3));
        let other = set.enqueue(RequestRecord::sync_write(4));

        assert_eq!(set.neighbor_before(a), None);
        assert_eq!(set.neighbor_after(a), Some(b));
        assert_eq!(set.neighbor_before(b), Some(a));
        assert_eq!(set.neighbor_after(b), Some(c));
        assert_eq!(set.neighbor_after(c), None);
        assert_eq!(set.neighbor_before(other), None);
        assert_eq!(set.neighbor_after(other), None);
    }

    #[test]
    fn test_remove_middle_relinks() {
        let mut set = ClassifiedQueueSet::new();
        let a = set.enqueue(RequestRecord::sync_read(1));
        let b = set.enqueue(RequestRecord::sync_read(2));
        let c = set.enqueue(RequestRecord::sync_read(3));

        assert_eq!(set.remove(b).unwrap().payload, 2);
        assert_eq!(set.neighbor_after(a), Some(c));
        assert_eq!(set.neighbor_before(c), Some(a));
        assert_eq!(payloads(&set, RequestClass::SYNC_READ), vec![1, 3]);
        assert_eq!(set.class_len(RequestClass::SYNC_READ), 2);
    }

    #[test]
    fn test_remove_tail_then_enqueue() {
        let mut set = ClassifiedQueueSet::new();
        set.enqueue(RequestRecord::sync_read(1));
        let b = set.enqueue(RequestRecord::sync_read(2));
        set.remove(b).unwrap();
        set.enqueue(RequestRecord::sync_read(3));

        assert_eq!(payloads(&set, RequestClass::SYNC_READ), vec![1, 3]);
    }

    #[test]
    fn test_stale_handle_is_rejected() {
        let mut set = ClassifiedQueueSet::new();
        let a = set.enqueue(RequestRecord::sync_read(1));
        set.pop_head(true, Direction::Read).unwrap();

        // Slot is reused, but the old handle must not alias the new request
        let b = set.enqueue(RequestRecord::sync_read(2));
        assert_eq!(a.slot, b.slot);
        assert!(!set.contains(a));
        assert!(set.get(a).is_none());
        assert!(set.remove(a).is_none());
        assert!(set.neighbor_after(a).is_none());
        assert_eq!(set.get(b).unwrap().payload, 2);
    }

    #[test]
    fn test_head_handle_tracks_pop() {
        let mut set = ClassifiedQueueSet::new();
        let a = set.enqueue(RequestRecord::async_read(1));
        let b = set.enqueue(RequestRecord::async_read(2));

        assert_eq!(set.head_handle(false, Direction::Read), Some(a));
        set.pop_head(false, Direction::Read);
        assert_eq!(set.head_handle(false, Direction::Read), Some(b));
        assert_eq!(set.neighbor_before(b), None);
    }

    #[test]
    fn test_with_capacity() {
        let set: ClassifiedQueueSet<u8> = ClassifiedQueueSet::with_capacity(64).unwrap();
        assert!(set.is_empty_all());
    }

    #[test]
    fn test_with_capacity_overflow_fails() {
        let result: SchedResult<ClassifiedQueueSet<u64>> =
            ClassifiedQueueSet::with_capacity(usize::MAX);
        assert!(matches!(result, Err(SchedError::AllocationFailed { .. })));
    }
}
