//! # Message Pool
//!
//! A single global free list of preallocated message records. A record is
//! drawn from the pool when a SEND finds no waiting receiver, or when a
//! RECEIVE has to leave a pending-receive placeholder behind, and goes
//! back as soon as its data is consumed or its handoff completes.
//!
//! The `next` link of a record is either a mailbox-queue link or a pool
//! free-list link, never both: a record is on exactly one list at a time.

use crate::config::{MAX_MESSAGE_SIZE, MESSAGE_POOL_CAPACITY};
use crate::mailbox::MailboxId;

/// Index of a record in the [`MessagePool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHandle(usize);

impl MessageHandle {
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// A payload copied out of the sender, waiting in a mailbox FIFO.
#[derive(Clone, Copy)]
pub struct QueuedMessage {
    /// Mailbox the message was sent from.
    pub sender: MailboxId,
    /// Valid bytes in `bytes`.
    pub size: usize,
    pub bytes: [u8; MAX_MESSAGE_SIZE],
}

impl QueuedMessage {
    pub fn new(sender: MailboxId, payload: &[u8]) -> Self {
        let mut bytes = [0u8; MAX_MESSAGE_SIZE];
        bytes[..payload.len()].copy_from_slice(payload);
        Self {
            sender,
            size: payload.len(),
            bytes,
        }
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.bytes[..self.size]
    }
}

/// Where a blocked receiver wants its message delivered.
///
/// These are addresses, not values: the receiver does not run again until
/// the handoff has written through them.
#[derive(Debug, Clone, Copy)]
pub struct ReceiveRequest {
    /// Mailbox the receiver is waiting on.
    pub mailbox: MailboxId,
    /// Destination buffer.
    pub buffer: *mut u8,
    /// Capacity of `buffer` in bytes (already validated).
    pub capacity: usize,
    /// Receives the number of bytes copied.
    pub size_out: *mut i32,
    /// Receives the sender's mailbox id.
    pub sender_out: *mut i32,
    /// The receiver's kernel-call result slot.
    pub result_out: *mut i32,
}

impl ReceiveRequest {
    /// Copy `payload` (truncated to capacity) and write the outputs.
    ///
    /// Returns the number of bytes copied.
    ///
    /// # Safety
    /// Every address must be valid for writes, and `buffer` for `capacity`
    /// bytes. They point into the receiver's stack, which stays untouched
    /// while the receiver is blocked or trapped.
    pub unsafe fn deliver(&self, sender: MailboxId, payload: &[u8]) -> usize {
        let copied = payload.len().min(self.capacity);
        core::ptr::copy_nonoverlapping(payload.as_ptr(), self.buffer, copied);
        self.size_out.write_volatile(copied as i32);
        self.sender_out.write_volatile(sender as i32);
        if !self.result_out.is_null() {
            self.result_out.write_volatile(copied as i32);
        }
        copied
    }
}

/// The two mutually exclusive interpretations of a record.
#[derive(Clone, Copy)]
pub enum MessageBody {
    /// On the pool free list.
    Free,
    /// Data in a mailbox FIFO.
    Queued(QueuedMessage),
    /// Placeholder attached to a blocked receiver.
    PendingReceive(ReceiveRequest),
}

/// One pool record.
#[derive(Clone, Copy)]
pub struct MessageRecord {
    pub next: Option<MessageHandle>,
    pub body: MessageBody,
}

impl MessageRecord {
    const EMPTY: Self = Self {
        next: None,
        body: MessageBody::Free,
    };
}

/// Fixed-capacity free-list allocator of message records.
pub struct MessagePool {
    records: [MessageRecord; MESSAGE_POOL_CAPACITY],
    free: Option<MessageHandle>,
    available: usize,
}

impl MessagePool {
    pub const fn new() -> Self {
        let mut records = [MessageRecord::EMPTY; MESSAGE_POOL_CAPACITY];
        let mut i = 0;
        while i + 1 < MESSAGE_POOL_CAPACITY {
            records[i].next = Some(MessageHandle(i + 1));
            i += 1;
        }
        Self {
            records,
            free: if MESSAGE_POOL_CAPACITY > 0 { Some(MessageHandle(0)) } else { None },
            available: MESSAGE_POOL_CAPACITY,
        }
    }

    /// Take a record off the free list and give it `body`.
    ///
    /// Returns `None` when the pool is exhausted.
    pub fn acquire(&mut self, body: MessageBody) -> Option<MessageHandle> {
        let handle = self.free?;
        let record = &mut self.records[handle.index()];
        self.free = record.next;
        record.next = None;
        record.body = body;
        self.available -= 1;
        Some(handle)
    }

    /// Put a record back on the free list, returning what it held.
    pub fn release(&mut self, handle: MessageHandle) -> MessageBody {
        let record = &mut self.records[handle.index()];
        let body = core::mem::replace(&mut record.body, MessageBody::Free);
        if matches!(body, MessageBody::Free) {
            return body;
        }
        record.next = self.free;
        self.free = Some(handle);
        self.available += 1;
        body
    }

    #[inline]
    pub fn get(&self, handle: MessageHandle) -> &MessageRecord {
        &self.records[handle.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, handle: MessageHandle) -> &mut MessageRecord {
        &mut self.records[handle.index()]
    }

    /// Records currently on the free list.
    #[inline]
    pub fn available(&self) -> usize {
        self.available
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_starts_full() {
        let pool = MessagePool::new();
        assert_eq!(pool.available(), MESSAGE_POOL_CAPACITY);
    }

    #[test]
    fn test_acquire_until_exhausted() {
        let mut pool = MessagePool::new();
        for _ in 0..MESSAGE_POOL_CAPACITY {
            let body = MessageBody::Queued(QueuedMessage::new(1, b"x"));
            assert!(pool.acquire(body).is_some());
        }
        assert_eq!(pool.available(), 0);
        assert!(pool.acquire(MessageBody::Queued(QueuedMessage::new(1, b"y"))).is_none());
    }

    #[test]
    fn test_release_returns_body_and_recycles() {
        let mut pool = MessagePool::new();
        let h = pool
            .acquire(MessageBody::Queued(QueuedMessage::new(3, b"abc")))
            .unwrap();
        assert_eq!(pool.available(), MESSAGE_POOL_CAPACITY - 1);

        match pool.release(h) {
            MessageBody::Queued(msg) => {
                assert_eq!(msg.sender, 3);
                assert_eq!(msg.payload(), b"abc");
            }
            _ => panic!("expected queued body"),
        }
        assert_eq!(pool.available(), MESSAGE_POOL_CAPACITY);
        assert!(matches!(pool.get(h).body, MessageBody::Free));

        // Releasing a free record is a no-op
        pool.release(h);
        assert_eq!(pool.available(), MESSAGE_POOL_CAPACITY);

        // LIFO free list hands the same record back
        let again = pool
            .acquire(MessageBody::Queued(QueuedMessage::new(4, b"d")))
            .unwrap();
        assert_eq!(again, h);
    }

    #[test]
    fn test_deliver_truncates_to_capacity() {
        let mut buffer = [0u8; 4];
        let mut size = 0i32;
        let mut sender = -1i32;
        let mut result = 0i32;
        let request = ReceiveRequest {
            mailbox: 2,
            buffer: buffer.as_mut_ptr(),
            capacity: 3,
            size_out: &mut size,
            sender_out: &mut sender,
            result_out: &mut result,
        };

        let copied = unsafe { request.deliver(9, b"hello") };
        assert_eq!(copied, 3);
        assert_eq!(&buffer, b"hel\0");
        assert_eq!(size, 3);
        assert_eq!(sender, 9);
        assert_eq!(result, 3);
    }
}
