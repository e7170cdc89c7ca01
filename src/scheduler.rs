//! # Scheduler
//!
//! Fixed-priority, round-robin scheduling for LMK.
//!
//! ## Scheduling Algorithm
//!
//! Each priority level owns a circular doubly-linked list of process
//! handles. The running process is implicit: it is always the head of the
//! list at `current_priority`, which in turn is always the highest level
//! with a non-empty list.
//!
//! - **enqueue**: append at the tail (just before the head), raise
//!   `current_priority` if needed
//! - **dequeue_running**: unlink the head; the successor becomes head, or
//!   the level empties and `current_priority` drops to the next
//!   non-empty level (never below the idle level)
//! - **rotate**: on a SysTick-driven switch, advance the head by one
//!
//! The idle process lives at `IDLE_PRIORITY` and must keep that level
//! non-empty once the kernel is running.

use crate::config::{IDLE_PRIORITY, PRIORITY_LEVELS};
use crate::error::KernelError;
use crate::process::{Pid, ProcessHandle, ProcessState, ProcessTable};

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// Process arena plus the per-priority ready queues.
pub struct Scheduler {
    /// Fixed-size arena of process records.
    pub processes: ProcessTable,

    /// Head of the ready queue at each priority.
    heads: [Option<ProcessHandle>; PRIORITY_LEVELS],

    /// Highest priority with a non-empty queue.
    current_priority: usize,

    /// Process last handed to the CPU by `settle()`.
    dispatched: Option<ProcessHandle>,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            processes: ProcessTable::new(),
            heads: [None; PRIORITY_LEVELS],
            current_priority: IDLE_PRIORITY,
            dispatched: None,
        }
    }

    /// Register a new process and make it ready at `priority`.
    ///
    /// `entry` and `exit` are code addresses placed in the crafted frame.
    pub fn create_process(
        &mut self,
        pid: Pid,
        priority: usize,
        entry: usize,
        exit: usize,
    ) -> Result<ProcessHandle, KernelError> {
        if priority >= PRIORITY_LEVELS {
            return Err(KernelError::InvalidPriority);
        }
        let handle = self.processes.allocate(pid, entry, exit)?;
        self.enqueue(handle, priority);
        Ok(handle)
    }

    /// Append `handle` to the tail of the queue at `priority`.
    pub fn enqueue(&mut self, handle: ProcessHandle, priority: usize) {
        debug_assert!(priority < PRIORITY_LEVELS);

        match self.heads[priority] {
            Some(head) => {
                let tail = self.processes.get(head).prev.unwrap_or(head);
                {
                    let pcb = self.processes.get_mut(handle);
                    pcb.next = Some(head);
                    pcb.prev = Some(tail);
                }
                self.processes.get_mut(tail).next = Some(handle);
                self.processes.get_mut(head).prev = Some(handle);
            }
            None => {
                let pcb = self.processes.get_mut(handle);
                pcb.next = Some(handle);
                pcb.prev = Some(handle);
                self.heads[priority] = Some(handle);
            }
        }

        let pcb = self.processes.get_mut(handle);
        pcb.priority = priority;
        pcb.state = ProcessState::Ready;

        if priority > self.current_priority {
            self.current_priority = priority;
        }
    }

    /// Unlink the running process (head at `current_priority`) and return it.
    ///
    /// The caller decides its fate: re-enqueue, block, or release.
    pub fn dequeue_running(&mut self) -> Option<ProcessHandle> {
        let level = self.current_priority;
        let head = self.heads[level]?;

        let (next, prev) = {
            let pcb = self.processes.get_mut(head);
            (pcb.next.take(), pcb.prev.take())
        };

        match (next, prev) {
            (Some(next), Some(prev)) if next != head => {
                self.processes.get_mut(prev).next = Some(next);
                self.processes.get_mut(next).prev = Some(prev);
                self.heads[level] = Some(next);
            }
            _ => {
                self.heads[level] = None;
                self.lower_priority();
            }
        }

        Some(head)
    }

    /// Round-robin step at the current priority.
    pub fn rotate(&mut self) {
        let level = self.current_priority;
        if let Some(head) = self.heads[level] {
            self.heads[level] = self.processes.get(head).next;
        }
    }

    /// Drop `current_priority` until it names a non-empty queue or reaches
    /// the idle level.
    fn lower_priority(&mut self) {
        while self.current_priority > IDLE_PRIORITY && self.heads[self.current_priority].is_none() {
            self.current_priority -= 1;
        }
    }

    /// The running process: head of the queue at `current_priority`.
    #[inline]
    pub fn running(&self) -> Option<ProcessHandle> {
        self.heads[self.current_priority]
    }

    #[inline]
    pub fn current_priority(&self) -> usize {
        self.current_priority
    }

    /// Number of processes queued at `priority`.
    pub fn queue_len(&self, priority: usize) -> usize {
        let Some(head) = self.heads[priority] else {
            return 0;
        };
        let mut len = 1;
        let mut cursor = self.processes.get(head).next;
        while let Some(h) = cursor {
            if h == head {
                break;
            }
            len += 1;
            cursor = self.processes.get(h).next;
        }
        len
    }

    /// Highest priority with a non-empty queue.
    pub fn highest_ready(&self) -> Option<usize> {
        (0..PRIORITY_LEVELS).rev().find(|&p| self.heads[p].is_some())
    }

    /// Bring process states in line with the queues after a trap or tick.
    ///
    /// The head at `current_priority` becomes `Running`; the process that
    /// ran before becomes `Ready` if it is still queued.
    pub fn settle(&mut self) -> Option<ProcessHandle> {
        let next = self.running();
        if next != self.dispatched {
            if let Some(prev) = self.dispatched {
                let pcb = self.processes.get_mut(prev);
                if pcb.state == ProcessState::Running {
                    pcb.state = ProcessState::Ready;
                }
            }
        }
        if let Some(handle) = next {
            self.processes.get_mut(handle).state = ProcessState::Running;
        }
        self.dispatched = next;
        next
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
