//! # Mailbox / Message IPC
//!
//! Synchronous message passing between processes through owned mailboxes.
//!
//! - **SEND** never blocks. If the owner of the destination is blocked in
//!   RECEIVE on that mailbox, the payload is copied straight into the
//!   receiver's buffer (handoff) and the receiver is made ready again.
//!   Otherwise the payload is copied into a pool record and appended to the
//!   destination FIFO.
//! - **RECEIVE** takes the oldest queued message, or, when the FIFO is
//!   empty, parks a pending-receive record on the caller and blocks it.
//!
//! A receiver can only be waiting while its FIFO is empty, so a handoff
//! never overtakes queued messages.

use log::{debug, trace, warn};

use crate::config::MAX_MESSAGE_SIZE;
use crate::error::{IpcFault, KernelError};
use crate::kernel::Kernel;
use crate::mailbox::{MailboxId, MailboxSelector};
use crate::message::{MessageBody, MessageHandle, QueuedMessage, ReceiveRequest};
use crate::process::ProcessState;

/// Result of a successful RECEIVE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// A queued message was copied out.
    Delivered { size: usize, sender: MailboxId },
    /// The caller is blocked until a SEND hands a message over.
    Blocked,
}

impl Kernel {
    /// Bind a mailbox to the running process.
    pub fn bind(&mut self, selector: MailboxSelector) -> Result<MailboxId, KernelError> {
        let caller = self.scheduler.running().ok_or(KernelError::BindFailure)?;
        let id = self
            .mailboxes
            .bind(selector, caller)
            .ok_or(KernelError::BindFailure)?;
        debug!("mailbox {} bound to pid {:?}", id, self.current_pid());
        Ok(id)
    }

    /// Release a mailbox held by the running process. Messages still
    /// queued on it are returned to the pool.
    pub fn unbind(&mut self, id: MailboxId) -> Result<(), KernelError> {
        let caller = self.scheduler.running().ok_or(KernelError::UnbindFailure)?;
        if !self.mailboxes.unbind(id, caller, &mut self.pool) {
            return Err(KernelError::UnbindFailure);
        }
        debug!("mailbox {} unbound", id);
        Ok(())
    }

    /// Send `payload` from mailbox `src` (owned by the caller) to `dest`.
    ///
    /// Returns the number of bytes accepted, which is always the full
    /// payload; a receiver with a smaller buffer gets it truncated.
    pub fn send(
        &mut self,
        dest: MailboxId,
        src: MailboxId,
        payload: &[u8],
    ) -> Result<usize, KernelError> {
        let fail = KernelError::SendFailure;
        let caller = self.scheduler.running().ok_or(fail(IpcFault::NotOwner))?;

        let src_box = self.mailboxes.get(src).ok_or(fail(IpcFault::InvalidMailbox))?;
        if src_box.owner != Some(caller) {
            return Err(fail(IpcFault::NotOwner));
        }
        let dest_box = self.mailboxes.get(dest).ok_or(fail(IpcFault::InvalidMailbox))?;
        let receiver = dest_box.owner.ok_or(fail(IpcFault::Unbound))?;
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(fail(IpcFault::Oversize));
        }

        // Direct handoff to a receiver blocked on this mailbox
        if let Some((pending, request)) = self.waiting_request(dest) {
            self.pool.release(pending);
            // Safety: the request was registered by `receive`, whose caller
            // guaranteed the addresses stay valid until now.
            let copied = unsafe { request.deliver(src, payload) };

            let pcb = self.scheduler.processes.get_mut(receiver);
            pcb.pending = None;
            let priority = pcb.priority;
            self.scheduler.enqueue(receiver, priority);

            trace!("handoff {} -> {}: {} bytes", src, dest, copied);
            return Ok(payload.len());
        }

        let record = self
            .pool
            .acquire(MessageBody::Queued(QueuedMessage::new(src, payload)))
            .ok_or(fail(IpcFault::PoolExhausted))?;
        self.mailboxes.push_back(dest, record, &mut self.pool);
        trace!("queued {} -> {}: {} bytes", src, dest, payload.len());
        Ok(payload.len())
    }

    /// Receive on `request.mailbox` (owned by the caller).
    ///
    /// # Safety
    /// The addresses in `request` must be valid for writes (`buffer` for
    /// `capacity` bytes). If the call blocks they must remain valid, and
    /// untouched by anyone else, until a SEND delivers into them.
    pub unsafe fn receive(&mut self, request: ReceiveRequest) -> Result<ReceiveOutcome, KernelError> {
        let fail = KernelError::ReceiveFailure;
        let caller = self.scheduler.running().ok_or(fail(IpcFault::NotOwner))?;
        let id = request.mailbox;

        let mailbox = self.mailboxes.get(id).ok_or(fail(IpcFault::InvalidMailbox))?;
        if mailbox.owner != Some(caller) {
            return Err(fail(IpcFault::NotOwner));
        }
        if request.capacity > MAX_MESSAGE_SIZE {
            return Err(fail(IpcFault::Oversize));
        }

        if let Some(record) = self.mailboxes.pop_front(id, &mut self.pool) {
            if let MessageBody::Queued(msg) = self.pool.release(record) {
                let size = request.deliver(msg.sender, msg.payload());
                trace!("mailbox {} delivered {} bytes from {}", id, size, msg.sender);
                return Ok(ReceiveOutcome::Delivered {
                    size,
                    sender: msg.sender,
                });
            }
            warn!("mailbox {} held a non-data record", id);
        }

        // Empty: park a placeholder and block
        let pending = self
            .pool
            .acquire(MessageBody::PendingReceive(request))
            .ok_or(fail(IpcFault::PoolExhausted))?;
        let blocked = self.scheduler.dequeue_running();
        debug_assert_eq!(blocked, Some(caller));

        let pcb = self.scheduler.processes.get_mut(caller);
        pcb.pending = Some(pending);
        pcb.state = ProcessState::Blocked;
        trace!("pid {} blocked on mailbox {}", pcb.pid, id);
        Ok(ReceiveOutcome::Blocked)
    }

    /// Whether the owner of `id` is blocked receiving on it.
    pub fn has_waiting_receiver(&self, id: MailboxId) -> bool {
        self.waiting_request(id).is_some()
    }

    /// Pending-receive record of the owner of `id`, if it waits on `id`.
    fn waiting_request(&self, id: MailboxId) -> Option<(MessageHandle, ReceiveRequest)> {
        let owner = self.mailboxes.owner(id)?;
        let pending = self.scheduler.processes.get(owner).pending?;
        match self.pool.get(pending).body {
            MessageBody::PendingReceive(request) if request.mailbox == id => Some((pending, request)),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MAILBOX_COUNT, MESSAGE_POOL_CAPACITY};

    const ENTRY: usize = 0x1001;
    const EXIT: usize = 0x2001;

    /// Receive slots owned by a test, standing in for a process stack.
    struct Slots {
        buffer: [u8; MAX_MESSAGE_SIZE],
        size: i32,
        sender: i32,
        result: i32,
    }

    impl Slots {
        fn new() -> Self {
            Self {
                buffer: [0; MAX_MESSAGE_SIZE],
                size: 0,
                sender: -1,
                result: 0,
            }
        }

        fn request(&mut self, mailbox: MailboxId, capacity: usize) -> ReceiveRequest {
            ReceiveRequest {
                mailbox,
                buffer: self.buffer.as_mut_ptr(),
                capacity,
                size_out: &mut self.size,
                sender_out: &mut self.sender,
                result_out: &mut self.result,
            }
        }
    }

    fn kernel(procs: &[(u32, usize)]) -> Kernel {
        let mut k = Kernel::new();
        for &(pid, prio) in procs {
            k.register(ENTRY, EXIT, pid, prio).unwrap();
        }
        k
    }

    /// Rotate the current queue until `pid` is at its head.
    fn run_as(k: &mut Kernel, pid: u32) {
        let h = k.scheduler.processes.find(pid).unwrap();
        assert_eq!(k.scheduler.processes.get(h).priority, k.scheduler.current_priority());
        while k.scheduler.running() != Some(h) {
            k.scheduler.rotate();
        }
    }

    fn assert_no_waiting_with_queue(k: &Kernel) {
        for id in 0..MAILBOX_COUNT {
            if k.has_waiting_receiver(id) {
                assert_eq!(k.mailboxes.queue_len(id, &k.pool), 0);
            }
        }
    }

    #[test]
    fn test_fifo_order() {
        let mut k = kernel(&[(0, 0), (1, 2)]);
        k.bind(MailboxSelector::Id(1)).unwrap();
        k.bind(MailboxSelector::Id(2)).unwrap();

        assert_eq!(k.send(2, 1, b"M1"), Ok(2));
        assert_eq!(k.send(2, 1, b"M2!"), Ok(3));
        assert_eq!(k.mailboxes.queue_len(2, &k.pool), 2);

        let mut first = Slots::new();
        let out = unsafe { k.receive(first.request(2, 8)) }.unwrap();
        assert_eq!(out, ReceiveOutcome::Delivered { size: 2, sender: 1 });
        assert_eq!(&first.buffer[..2], b"M1");

        let mut second = Slots::new();
        let out = unsafe { k.receive(second.request(2, 8)) }.unwrap();
        assert_eq!(out, ReceiveOutcome::Delivered { size: 3, sender: 1 });
        assert_eq!(&second.buffer[..3], b"M2!");
        assert_eq!(k.pool.available(), MESSAGE_POOL_CAPACITY);
    }

    #[test]
    fn test_send_validation_leaves_state_unchanged() {
        let mut k = kernel(&[(0, 0), (1, 2), (2, 2)]);
        k.bind(MailboxSelector::Id(1)).unwrap();

        // Unowned destination
        assert_eq!(k.send(7, 1, b"x"), Err(KernelError::SendFailure(IpcFault::Unbound)));
        // Source not owned by caller
        assert_eq!(k.send(1, 3, b"x"), Err(KernelError::SendFailure(IpcFault::NotOwner)));
        // Out of range
        assert_eq!(
            k.send(MAILBOX_COUNT, 1, b"x"),
            Err(KernelError::SendFailure(IpcFault::InvalidMailbox))
        );
        // Oversize
        let big = [0u8; MAX_MESSAGE_SIZE + 1];
        assert_eq!(k.send(1, 1, &big), Err(KernelError::SendFailure(IpcFault::Oversize)));

        assert_eq!(k.pool.available(), MESSAGE_POOL_CAPACITY);
        assert_eq!(k.mailboxes.queue_len(1, &k.pool), 0);
    }

    #[test]
    fn test_receive_requires_ownership() {
        let mut k = kernel(&[(0, 0), (1, 2), (2, 2)]);
        k.bind(MailboxSelector::Id(4)).unwrap();
        run_as(&mut k, 2);

        let mut slots = Slots::new();
        assert_eq!(
            unsafe { k.receive(slots.request(4, 8)) },
            Err(KernelError::ReceiveFailure(IpcFault::NotOwner))
        );
        assert_eq!(k.pool.available(), MESSAGE_POOL_CAPACITY);
        assert_eq!(k.current_pid(), Some(2));
    }

    #[test]
    fn test_handoff_hi_to_blocked_receiver() {
        // B (pid 2) owns mailbox 2 and blocks with max = 4; A (pid 1) sends "hi".
        let mut k = kernel(&[(0, 0), (1, 1), (2, 1)]);
        run_as(&mut k, 2);
        k.bind(MailboxSelector::Id(2)).unwrap();

        let mut slots = Slots::new();
        assert_eq!(unsafe { k.receive(slots.request(2, 4)) }, Ok(ReceiveOutcome::Blocked));
        let b = k.mailboxes.owner(2).unwrap();
        assert_eq!(k.scheduler.processes.get(b).state, ProcessState::Blocked);
        assert_eq!(k.scheduler.queue_len(1), 1);
        assert!(k.has_waiting_receiver(2));
        assert_eq!(k.current_pid(), Some(1));

        let a_box = k.bind(MailboxSelector::Any).unwrap();
        let available = k.pool.available();
        assert_eq!(k.send(2, a_box, b"hi"), Ok(2));

        assert_eq!(slots.size, 2);
        assert_eq!(slots.result, 2);
        assert_eq!(slots.sender, a_box as i32);
        assert_eq!(&slots.buffer[..2], b"hi");
        // Placeholder released, nothing queued
        assert_eq!(k.pool.available(), available + 1);
        assert_eq!(k.pool.available(), MESSAGE_POOL_CAPACITY);
        assert_eq!(k.mailboxes.queue_len(2, &k.pool), 0);
        assert!(!k.has_waiting_receiver(2));
        assert_eq!(k.scheduler.processes.get(b).state, ProcessState::Ready);
        assert_eq!(k.scheduler.queue_len(1), 2);
    }

    #[test]
    fn test_handoff_truncates_to_receiver_capacity() {
        let mut k = kernel(&[(0, 0), (1, 1), (2, 3)]);
        k.bind(MailboxSelector::Id(0)).unwrap();
        let mut slots = Slots::new();
        assert_eq!(unsafe { k.receive(slots.request(0, 3)) }, Ok(ReceiveOutcome::Blocked));

        k.bind(MailboxSelector::Id(1)).unwrap();
        assert_eq!(k.send(0, 1, b"abcdef"), Ok(6));
        assert_eq!(slots.size, 3);
        assert_eq!(&slots.buffer[..4], b"abc\0");
        // Woken receiver outranks the sender
        assert_eq!(k.current_pid(), Some(2));
    }

    #[test]
    fn test_send_to_other_mailbox_of_blocked_owner_is_queued() {
        let mut k = kernel(&[(0, 0), (1, 1), (2, 3)]);
        k.bind(MailboxSelector::Id(0)).unwrap();
        k.bind(MailboxSelector::Id(1)).unwrap();
        let mut slots = Slots::new();
        assert_eq!(unsafe { k.receive(slots.request(0, 8)) }, Ok(ReceiveOutcome::Blocked));

        k.bind(MailboxSelector::Id(5)).unwrap();
        assert_eq!(k.send(1, 5, b"zz"), Ok(2));
        assert_eq!(k.mailboxes.queue_len(1, &k.pool), 1);
        assert!(k.has_waiting_receiver(0));
        assert_eq!(slots.sender, -1);
        assert_eq!(k.current_pid(), Some(1));
        assert_no_waiting_with_queue(&k);
    }

    #[test]
    fn test_pool_exhaustion_is_clean() {
        let mut k = kernel(&[(0, 0), (1, 2)]);
        k.bind(MailboxSelector::Id(1)).unwrap();
        k.bind(MailboxSelector::Id(2)).unwrap();

        for i in 0..MESSAGE_POOL_CAPACITY {
            assert_eq!(k.send(2, 1, &[i as u8]), Ok(1));
        }
        assert_eq!(k.pool.available(), 0);
        assert_eq!(
            k.send(2, 1, b"late"),
            Err(KernelError::SendFailure(IpcFault::PoolExhausted))
        );
        assert_eq!(k.mailboxes.queue_len(2, &k.pool), MESSAGE_POOL_CAPACITY);

        // Receiving on an empty mailbox needs a placeholder too
        let mut slots = Slots::new();
        assert_eq!(
            unsafe { k.receive(slots.request(1, 8)) },
            Err(KernelError::ReceiveFailure(IpcFault::PoolExhausted))
        );
        assert_eq!(k.current_pid(), Some(1));

        // Existing queue is intact and drains in order
        for i in 0..MESSAGE_POOL_CAPACITY {
            let mut s = Slots::new();
            let out = unsafe { k.receive(s.request(2, 8)) }.unwrap();
            assert_eq!(out, ReceiveOutcome::Delivered { size: 1, sender: 1 });
            assert_eq!(s.buffer[0], i as u8);
        }
        assert_eq!(k.pool.available(), MESSAGE_POOL_CAPACITY);
    }

    #[test]
    fn test_receive_then_send_never_leaves_waiting_with_queue() {
        let mut k = kernel(&[(0, 0), (1, 1), (2, 3)]);
        k.bind(MailboxSelector::Id(3)).unwrap();
        let mut slots = Slots::new();
        unsafe { k.receive(slots.request(3, 8)) }.unwrap();
        assert_no_waiting_with_queue(&k);

        k.bind(MailboxSelector::Id(4)).unwrap();
        k.send(3, 4, b"one").unwrap();
        assert_no_waiting_with_queue(&k);

        // Receiver is running again; a message to itself queues
        assert_eq!(k.current_pid(), Some(2));
        k.send(3, 3, b"two").unwrap();
        assert_eq!(k.mailboxes.queue_len(3, &k.pool), 1);
        assert_no_waiting_with_queue(&k);
    }
}
