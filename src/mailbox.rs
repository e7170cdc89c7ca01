//! # Mailbox Directory
//!
//! A fixed array of mailboxes. Unowned mailboxes are threaded through a
//! circular doubly-linked free list so that "bind any" pops in O(1) and a
//! specific mailbox can be unlinked in O(1) when bound by id.
//!
//! A mailbox is either on the free list or owned, never both. Queued
//! messages are a singly-linked FIFO of pool records.

use crate::config::MAILBOX_COUNT;
use crate::message::{MessageHandle, MessagePool};
use crate::process::ProcessHandle;

/// Mailbox identifier as seen by processes.
pub type MailboxId = usize;

/// Raw BIND argument selecting any free mailbox.
pub const ANY_MAILBOX: usize = usize::MAX;

/// Which mailbox a BIND asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxSelector {
    Any,
    Id(MailboxId),
}

impl MailboxSelector {
    /// Decode the raw BIND argument.
    pub const fn from_raw(raw: usize) -> Self {
        if raw == ANY_MAILBOX {
            MailboxSelector::Any
        } else {
            MailboxSelector::Id(raw)
        }
    }

    pub const fn into_raw(self) -> usize {
        match self {
            MailboxSelector::Any => ANY_MAILBOX,
            MailboxSelector::Id(id) => id,
        }
    }
}

/// One mailbox slot.
#[derive(Debug, Clone, Copy)]
pub struct Mailbox {
    pub owner: Option<ProcessHandle>,
    pub head: Option<MessageHandle>,
    pub tail: Option<MessageHandle>,
    next_free: Option<MailboxId>,
    prev_free: Option<MailboxId>,
}

impl Mailbox {
    const EMPTY: Self = Self {
        owner: None,
        head: None,
        tail: None,
        next_free: None,
        prev_free: None,
    };

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}

/// The mailbox table plus its free list.
pub struct MailboxDirectory {
    boxes: [Mailbox; MAILBOX_COUNT],
    free: Option<MailboxId>,
}

impl MailboxDirectory {
    /// All mailboxes unowned and linked, in id order, into the free list.
    pub const fn new() -> Self {
        let mut boxes = [Mailbox::EMPTY; MAILBOX_COUNT];
        let mut i = 0;
        while i < MAILBOX_COUNT {
            boxes[i].next_free = Some((i + 1) % MAILBOX_COUNT);
            boxes[i].prev_free = Some((i + MAILBOX_COUNT - 1) % MAILBOX_COUNT);
            i += 1;
        }
        Self {
            boxes,
            free: if MAILBOX_COUNT > 0 { Some(0) } else { None },
        }
    }

    #[inline]
    pub fn get(&self, id: MailboxId) -> Option<&Mailbox> {
        self.boxes.get(id)
    }

    /// Owner of `id`, if it is in range and bound.
    #[inline]
    pub fn owner(&self, id: MailboxId) -> Option<ProcessHandle> {
        self.boxes.get(id).and_then(|mb| mb.owner)
    }

    /// Whether `id` is currently linked into the free list.
    pub fn is_free(&self, id: MailboxId) -> bool {
        self.boxes
            .get(id)
            .map_or(false, |mb| mb.next_free.is_some())
    }

    /// Number of mailboxes on the free list.
    pub fn free_count(&self) -> usize {
        self.boxes.iter().filter(|mb| mb.next_free.is_some()).count()
    }

    /// Bind a mailbox to `owner`. Returns the bound id, or `None` if no
    /// mailbox is free or the requested one is owned or out of range.
    pub fn bind(&mut self, selector: MailboxSelector, owner: ProcessHandle) -> Option<MailboxId> {
        let id = match selector {
            MailboxSelector::Any => self.free?,
            MailboxSelector::Id(id) => {
                let mb = self.boxes.get(id)?;
                if mb.owner.is_some() {
                    return None;
                }
                id
            }
        };
        self.unlink_free(id);
        let mb = &mut self.boxes[id];
        mb.owner = Some(owner);
        mb.head = None;
        mb.tail = None;
        Some(id)
    }

    /// Release `id` if `owner` holds it. Queued messages go back to `pool`.
    pub fn unbind(&mut self, id: MailboxId, owner: ProcessHandle, pool: &mut MessagePool) -> bool {
        match self.boxes.get(id) {
            Some(mb) if mb.owner == Some(owner) => {}
            _ => return false,
        }
        while let Some(msg) = self.pop_front(id, pool) {
            pool.release(msg);
        }
        self.boxes[id].owner = None;
        self.link_free(id);
        true
    }

    /// Release every mailbox held by `owner`. Returns how many were freed.
    pub fn unbind_all(&mut self, owner: ProcessHandle, pool: &mut MessagePool) -> usize {
        let mut released = 0;
        for id in 0..MAILBOX_COUNT {
            if self.unbind(id, owner, pool) {
                released += 1;
            }
        }
        released
    }

    /// Append a pool record to the FIFO of `id`.
    pub fn push_back(&mut self, id: MailboxId, msg: MessageHandle, pool: &mut MessagePool) {
        pool.get_mut(msg).next = None;
        let mb = &mut self.boxes[id];
        match mb.tail {
            Some(tail) => pool.get_mut(tail).next = Some(msg),
            None => mb.head = Some(msg),
        }
        mb.tail = Some(msg);
    }

    /// Detach the oldest record from the FIFO of `id`.
    pub fn pop_front(&mut self, id: MailboxId, pool: &mut MessagePool) -> Option<MessageHandle> {
        let mb = &mut self.boxes[id];
        let head = mb.head?;
        let record = pool.get_mut(head);
        mb.head = record.next.take();
        if mb.head.is_none() {
            mb.tail = None;
        }
        Some(head)
    }

    /// Number of queued records on `id`.
    pub fn queue_len(&self, id: MailboxId, pool: &MessagePool) -> usize {
        let mut len = 0;
        let mut cursor = self.boxes[id].head;
        while let Some(msg) = cursor {
            len += 1;
            cursor = pool.get(msg).next;
        }
        len
    }

    fn unlink_free(&mut self, id: MailboxId) {
        let (next, prev) = {
            let mb = &mut self.boxes[id];
            (mb.next_free.take(), mb.prev_free.take())
        };
        let (Some(next), Some(prev)) = (next, prev) else {
            return;
        };
        if next == id {
            self.free = None;
            return;
        }
        self.boxes[prev].next_free = Some(next);
        self.boxes[next].prev_free = Some(prev);
        if self.free == Some(id) {
            self.free = Some(next);
        }
    }

    /// Reinsert `id` at the head of the free list.
    fn link_free(&mut self, id: MailboxId) {
        match self.free {
            None => {
                self.boxes[id].next_free = Some(id);
                self.boxes[id].prev_free = Some(id);
            }
            Some(head) => {
                let tail = self.boxes[head].prev_free.unwrap_or(head);
                self.boxes[id].next_free = Some(head);
                self.boxes[id].prev_free = Some(tail);
                self.boxes[tail].next_free = Some(id);
                self.boxes[head].prev_free = Some(id);
            }
        }
        self.free = Some(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageBody, QueuedMessage};

    fn owner(i: usize) -> ProcessHandle {
        ProcessHandle::new(i)
    }

    #[test]
    fn test_all_mailboxes_start_free() {
        let dir = MailboxDirectory::new();
        assert_eq!(dir.free_count(), MAILBOX_COUNT);
        for id in 0..MAILBOX_COUNT {
            assert!(dir.is_free(id));
            assert_eq!(dir.owner(id), None);
        }
    }

    #[test]
    fn test_bind_any_exhausts_directory() {
        let mut dir = MailboxDirectory::new();
        for expected in 0..MAILBOX_COUNT {
            assert_eq!(dir.bind(MailboxSelector::Any, owner(1)), Some(expected));
            assert!(!dir.is_free(expected));
        }
        assert_eq!(dir.free_count(), 0);
        assert_eq!(dir.bind(MailboxSelector::Any, owner(1)), None);
    }

    #[test]
    fn test_bind_specific_unlinks_from_free_list() {
        let mut dir = MailboxDirectory::new();
        assert_eq!(dir.bind(MailboxSelector::Id(5), owner(1)), Some(5));
        assert!(!dir.is_free(5));
        assert_eq!(dir.free_count(), MAILBOX_COUNT - 1);

        // Already owned, by anyone
        assert_eq!(dir.bind(MailboxSelector::Id(5), owner(2)), None);
        assert_eq!(dir.bind(MailboxSelector::Id(5), owner(1)), None);
        // Out of range
        assert_eq!(dir.bind(MailboxSelector::Id(MAILBOX_COUNT), owner(1)), None);

        // Bind-any never hands out the specific one
        for _ in 0..MAILBOX_COUNT - 1 {
            let id = dir.bind(MailboxSelector::Any, owner(2)).unwrap();
            assert_ne!(id, 5);
        }
        assert_eq!(dir.bind(MailboxSelector::Any, owner(2)), None);
    }

    #[test]
    fn test_unbind_requires_owner() {
        let mut dir = MailboxDirectory::new();
        let mut pool = MessagePool::new();
        let id = dir.bind(MailboxSelector::Any, owner(1)).unwrap();

        assert!(!dir.unbind(id, owner(2), &mut pool));
        assert_eq!(dir.owner(id), Some(owner(1)));

        assert!(dir.unbind(id, owner(1), &mut pool));
        assert_eq!(dir.owner(id), None);
        assert!(dir.is_free(id));
        assert!(!dir.unbind(id, owner(1), &mut pool));
    }

    #[test]
    fn test_unbind_after_exhaustion_rebuilds_free_list() {
        let mut dir = MailboxDirectory::new();
        let mut pool = MessagePool::new();
        for _ in 0..MAILBOX_COUNT {
            dir.bind(MailboxSelector::Any, owner(1)).unwrap();
        }
        assert!(dir.unbind(3, owner(1), &mut pool));
        assert!(dir.unbind(9, owner(1), &mut pool));
        assert_eq!(dir.free_count(), 2);

        let a = dir.bind(MailboxSelector::Any, owner(2)).unwrap();
        let b = dir.bind(MailboxSelector::Any, owner(2)).unwrap();
        assert_eq!((a.min(b), a.max(b)), (3, 9));
        assert_eq!(dir.bind(MailboxSelector::Any, owner(2)), None);
    }

    #[test]
    fn test_fifo_and_unbind_drains_queue() {
        let mut dir = MailboxDirectory::new();
        let mut pool = MessagePool::new();
        let id = dir.bind(MailboxSelector::Any, owner(1)).unwrap();

        let first = pool
            .acquire(MessageBody::Queued(QueuedMessage::new(0, b"one")))
            .unwrap();
        let second = pool
            .acquire(MessageBody::Queued(QueuedMessage::new(0, b"two")))
            .unwrap();
        dir.push_back(id, first, &mut pool);
        dir.push_back(id, second, &mut pool);
        assert_eq!(dir.queue_len(id, &pool), 2);

        assert_eq!(dir.pop_front(id, &mut pool), Some(first));
        pool.release(first);
        assert_eq!(dir.queue_len(id, &pool), 1);

        let before = pool.available();
        assert!(dir.unbind(id, owner(1), &mut pool));
        assert_eq!(pool.available(), before + 1);
        assert!(dir.get(id).unwrap().is_empty());
    }

    #[test]
    fn test_unbind_all_releases_only_owned() {
        let mut dir = MailboxDirectory::new();
        let mut pool = MessagePool::new();
        dir.bind(MailboxSelector::Id(1), owner(1)).unwrap();
        dir.bind(MailboxSelector::Id(2), owner(2)).unwrap();
        dir.bind(MailboxSelector::Id(4), owner(1)).unwrap();

        assert_eq!(dir.unbind_all(owner(1), &mut pool), 2);
        assert_eq!(dir.owner(2), Some(owner(2)));
        assert_eq!(dir.free_count(), MAILBOX_COUNT - 1);
    }

    #[test]
    fn test_selector_encoding() {
        assert_eq!(MailboxSelector::from_raw(ANY_MAILBOX), MailboxSelector::Any);
        assert_eq!(MailboxSelector::from_raw(3), MailboxSelector::Id(3));
        assert_eq!(MailboxSelector::Any.into_raw(), ANY_MAILBOX);
    }
}
