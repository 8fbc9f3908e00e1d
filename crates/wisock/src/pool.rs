//! The endpoint pool
//!
//! A fixed arena of `N` slots, partitioned by two index-linked singly-linked
//! lists: the free list and the active list. A slot taken with
//! [`EndpointPool::allocate`] sits on neither list ("reserved") until the
//! caller either [activates] it or [releases] it, so a lookup never sees a
//! socket whose open/connect/bind hasn't succeeded yet.
//!
//! Handles carry the slot's generation. Releasing a slot bumps it, so a handle
//! kept past its release no longer resolves to anything.
//!
//! [activates]: EndpointPool::activate
//! [releases]: EndpointPool::release

use crate::{SocketId, endpoint::Endpoint, logging::warn};

/// A generation-checked reference to one pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointHandle {
    index: u16,
    generation: u32,
}

impl EndpointHandle {
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    Free,
    Reserved,
    Active,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    endpoint: Endpoint,
    next: Option<u16>,
    link: Link,
    generation: u32,
}

pub struct EndpointPool<const N: usize> {
    slots: [Slot; N],
    free_head: Option<u16>,
    active_head: Option<u16>,
    active_tail: Option<u16>,
    free_len: usize,
    active_len: usize,
}

impl<const N: usize> EndpointPool<N> {
    pub fn new() -> Self {
        let _: () = const {
            assert!(N < u16::MAX as usize, "pool capacity must fit a u16 index");
        };

        let mut pool = Self {
            slots: [Slot {
                endpoint: Endpoint::ZERO,
                next: None,
                link: Link::Free,
                generation: 0,
            }; N],
            free_head: None,
            active_head: None,
            active_tail: None,
            free_len: 0,
            active_len: 0,
        };
        // Pushed in reverse so slot 0 is handed out first
        for idx in (0..N as u16).rev() {
            pool.push_free(idx);
        }
        pool
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of endpoints on the active list.
    pub fn len(&self) -> usize {
        self.active_len
    }

    pub fn is_empty(&self) -> bool {
        self.active_len == 0
    }

    /// Number of slots that can still be allocated.
    pub fn available(&self) -> usize {
        self.free_len
    }

    /// Take a zeroed slot off the free list.
    ///
    /// Returns `None` when every slot is in use. Nothing is modified in that
    /// case.
    pub fn allocate(&mut self) -> Option<EndpointHandle> {
        let idx = self.free_head?;
        let slot = &mut self.slots[idx as usize];
        self.free_head = slot.next;
        self.free_len -= 1;

        slot.next = None;
        slot.link = Link::Reserved;
        slot.endpoint = Endpoint::ZERO;

        Some(EndpointHandle {
            index: idx,
            generation: slot.generation,
        })
    }

    /// Put a reserved slot at the tail of the active list.
    ///
    /// Returns false (and does nothing) if the handle is stale or the slot is
    /// not reserved.
    pub fn activate(&mut self, hdl: EndpointHandle) -> bool {
        match self.checked(hdl) {
            Some(Link::Reserved) => {}
            other => {
                warn!("refusing to activate slot {} ({other:?})", hdl.index);
                return false;
            }
        }

        self.slots[hdl.index()].link = Link::Active;
        match self.active_tail {
            Some(tail) => self.slots[tail as usize].next = Some(hdl.index),
            None => self.active_head = Some(hdl.index),
        }
        self.active_tail = Some(hdl.index);
        self.active_len += 1;
        true
    }

    /// Give a slot back to the free list, unlinking it from the active list
    /// first if needed.
    ///
    /// Returns false if the handle is stale.
    pub fn release(&mut self, hdl: EndpointHandle) -> bool {
        match self.checked(hdl) {
            Some(Link::Active) => self.unlink_active(hdl.index),
            Some(Link::Reserved) => {}
            other => {
                warn!("refusing to release slot {} ({other:?})", hdl.index);
                return false;
            }
        }

        let slot = &mut self.slots[hdl.index()];
        slot.endpoint = Endpoint::ZERO;
        slot.generation = slot.generation.wrapping_add(1);
        self.push_free(hdl.index);
        true
    }

    /// Find an active endpoint by its stack identifier.
    pub fn lookup(&self, id: SocketId) -> Option<EndpointHandle> {
        if id == SocketId::INVALID {
            return None;
        }
        self.iter_active()
            .find(|(_, ep)| ep.id == id)
            .map(|(hdl, _)| hdl)
    }

    pub fn get(&self, hdl: EndpointHandle) -> Option<&Endpoint> {
        match self.checked(hdl) {
            Some(Link::Reserved | Link::Active) => Some(&self.slots[hdl.index()].endpoint),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, hdl: EndpointHandle) -> Option<&mut Endpoint> {
        match self.checked(hdl) {
            Some(Link::Reserved | Link::Active) => Some(&mut self.slots[hdl.index()].endpoint),
            _ => None,
        }
    }

    pub fn is_active(&self, hdl: EndpointHandle) -> bool {
        self.checked(hdl) == Some(Link::Active)
    }

    /// Active endpoints, in activation order.
    pub fn iter_active(&self) -> impl Iterator<Item = (EndpointHandle, &Endpoint)> + '_ {
        let mut cursor = self.active_head;
        core::iter::from_fn(move || {
            let idx = cursor?;
            let slot = &self.slots[idx as usize];
            cursor = slot.next;
            Some((
                EndpointHandle {
                    index: idx,
                    generation: slot.generation,
                },
                &slot.endpoint,
            ))
        })
    }

    fn checked(&self, hdl: EndpointHandle) -> Option<Link> {
        let slot = self.slots.get(hdl.index())?;
        (slot.generation == hdl.generation).then_some(slot.link)
    }

    fn push_free(&mut self, idx: u16) {
        let slot = &mut self.slots[idx as usize];
        slot.link = Link::Free;
        slot.next = self.free_head;
        self.free_head = Some(idx);
        self.free_len += 1;
    }

    fn unlink_active(&mut self, idx: u16) {
        let next = self.slots[idx as usize].next;

        let mut prev: Option<u16> = None;
        let mut cursor = self.active_head;
        while let Some(cur) = cursor {
            if cur == idx {
                break;
            }
            prev = Some(cur);
            cursor = self.slots[cur as usize].next;
        }
        if cursor.is_none() {
            // Link says Active, so this can't happen
            warn!("slot {idx} marked active but not on the active list");
            return;
        }

        match prev {
            Some(p) => self.slots[p as usize].next = next,
            None => self.active_head = next,
        }
        if self.active_tail == Some(idx) {
            self.active_tail = prev;
        }

        let slot = &mut self.slots[idx as usize];
        slot.next = None;
        slot.link = Link::Reserved;
        self.active_len -= 1;
    }
}

impl<const N: usize> Default for EndpointPool<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use crate::{
        SocketId,
        endpoint::{Endpoint, SocketKind, SocketState},
    };

    use super::EndpointPool;

    fn activate_with_id<const N: usize>(pool: &mut EndpointPool<N>, id: u32) -> super::EndpointHandle {
        let hdl = pool.allocate().unwrap();
        pool.get_mut(hdl).unwrap().id = SocketId(id);
        assert!(pool.activate(hdl));
        hdl
    }

    #[test]
    fn capacity_bound() {
        let mut pool = EndpointPool::<3>::new();
        let a = activate_with_id(&mut pool, 10);
        let b = activate_with_id(&mut pool, 11);
        let c = pool.allocate().unwrap();
        assert_eq!(pool.available(), 0);

        let before: Vec<Endpoint> = [a, b, c].iter().map(|h| *pool.get(*h).unwrap()).collect();
        assert!(pool.allocate().is_none());
        let after: Vec<Endpoint> = [a, b, c].iter().map(|h| *pool.get(*h).unwrap()).collect();
        assert_eq!(before, after);
        assert_eq!(pool.len(), 2);

        assert!(pool.release(c));
        assert!(pool.allocate().is_some());
    }

    #[test]
    fn alloc_release_accounting() {
        // Pseudo-random interleaving, checked against a simple model
        let mut pool = EndpointPool::<4>::new();
        let mut held = Vec::new();
        let mut seed: u32 = 0x1234_5678;
        for step in 0..500u32 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            if seed % 3 != 0 {
                match pool.allocate() {
                    Some(hdl) => {
                        assert!(held.len() < 4);
                        pool.get_mut(hdl).unwrap().id = SocketId(step);
                        if seed % 2 == 0 {
                            assert!(pool.activate(hdl));
                        }
                        held.push(hdl);
                    }
                    None => assert_eq!(held.len(), 4),
                }
            } else if !held.is_empty() {
                let hdl = held.swap_remove(seed as usize % held.len());
                assert!(pool.release(hdl));
            }
            assert_eq!(pool.available() + held.len(), 4);
            assert!(pool.len() <= held.len());
        }
    }

    #[test]
    fn lookup_and_stale_ids() {
        let mut pool = EndpointPool::<2>::new();
        let a = activate_with_id(&mut pool, 7);
        assert_eq!(pool.lookup(SocketId(7)), Some(a));
        assert_eq!(pool.lookup(SocketId(8)), None);
        assert_eq!(pool.lookup(SocketId::INVALID), None);

        assert!(pool.release(a));
        assert_eq!(pool.lookup(SocketId(7)), None);
        assert!(pool.get(a).is_none());
        // second release with the same handle is stale
        assert!(!pool.release(a));

        // same slot, new id
        let again = activate_with_id(&mut pool, 9);
        assert_eq!(again.index(), a.index());
        assert_ne!(again, a);
        assert_eq!(pool.lookup(SocketId(7)), None);
        assert_eq!(pool.lookup(SocketId(9)), Some(again));
    }

    #[test]
    fn reserved_is_invisible() {
        let mut pool = EndpointPool::<2>::new();
        let hdl = pool.allocate().unwrap();
        pool.get_mut(hdl).unwrap().id = SocketId(3);
        assert_eq!(pool.lookup(SocketId(3)), None);
        assert_eq!(pool.iter_active().count(), 0);
        assert!(!pool.is_active(hdl));

        assert!(pool.activate(hdl));
        assert_eq!(pool.lookup(SocketId(3)), Some(hdl));
        // already active
        assert!(!pool.activate(hdl));
    }

    #[test]
    fn round_trip_to_zero() {
        let mut pool = EndpointPool::<1>::new();
        let hdl = pool.allocate().unwrap();
        assert_eq!(*pool.get(hdl).unwrap(), Endpoint::ZERO);
        {
            let ep = pool.get_mut(hdl).unwrap();
            ep.id = SocketId(42);
            ep.kind = SocketKind::TcpServer;
            ep.state = SocketState::Listening;
            ep.remote_port = 5002;
        }
        assert!(pool.activate(hdl));
        assert!(pool.release(hdl));

        let hdl = pool.allocate().unwrap();
        assert_eq!(*pool.get(hdl).unwrap(), Endpoint::ZERO);
        assert_eq!(pool.get(hdl).unwrap().id, SocketId::INVALID);
    }

    #[test]
    fn activation_order_survives_removal() {
        let mut pool = EndpointPool::<4>::new();
        let a = activate_with_id(&mut pool, 1);
        let b = activate_with_id(&mut pool, 2);
        let c = activate_with_id(&mut pool, 3);

        let ids = |pool: &EndpointPool<4>| -> Vec<u32> {
            pool.iter_active().map(|(_, ep)| ep.id.0).collect()
        };
        assert_eq!(ids(&pool), [1, 2, 3]);

        // middle
        assert!(pool.release(b));
        assert_eq!(ids(&pool), [1, 3]);
        // tail, then append again
        assert!(pool.release(c));
        activate_with_id(&mut pool, 4);
        assert_eq!(ids(&pool), [1, 4]);
        // head
        assert!(pool.release(a));
        assert_eq!(ids(&pool), [4]);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.available(), 3);
    }
}
