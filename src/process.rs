//! # Process Control Block
//!
//! Defines the process model for LMK. Each process owns a fixed stack
//! region inside its record, a fixed priority chosen at registration (and
//! changed only through SET-PRIORITY), and the intrusive links that thread
//! it through exactly one ready queue while it is runnable.
//!
//! Records live in a fixed-capacity [`ProcessTable`] addressed by
//! [`ProcessHandle`]. Free slots are chained through their `next` link, so
//! registration and termination are O(1) and never touch an allocator.

use crate::config::{MAX_PROCESSES, STACK_SIZE};
use crate::error::KernelError;
use crate::message::MessageHandle;

/// Process identifier supplied at registration and returned by GET-ID.
pub type Pid = u32;

/// Process entry point. Returning from it traps TERMINATE.
pub type ProcessEntry = extern "C" fn();

/// Words in a process stack.
pub const STACK_WORDS: usize = STACK_SIZE / core::mem::size_of::<usize>();

/// Words in a crafted or saved context: R4–R11 pushed by software followed
/// by the eight-word hardware exception frame.
pub const CONTEXT_WORDS: usize = 16;

/// Word offset of R7 inside a saved context (R4, R5, R6, R7, ...).
pub const SAVED_R7: usize = 3;

/// Initial xPSR: only the Thumb bit set.
const INITIAL_XPSR: usize = 0x0100_0000;

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Index of a record in the [`ProcessTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle(usize);

impl ProcessHandle {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Process state machine
// ---------------------------------------------------------------------------

/// Execution state of a process.
///
/// ```text
///                 head of current queue
///   ┌──────────┐ ────────────────────► ┌─────────┐
///   │  Ready   │                       │ Running │
///   └──────────┘ ◄──────────────────── └─────────┘
///        ▲        tick / SET-PRIORITY     │     │
///        │                                │     │ TERMINATE
///        │ SEND handoff    RECEIVE (empty)│     ▼
///        │            ┌─────────┐         │ ┌────────────┐
///        └─────────── │ Blocked │ ◄───────┘ │ Terminated │
///                     └─────────┘           └────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Linked into a ready queue, not at the head of the current one.
    Ready,
    /// Head of the ready queue at the current priority.
    Running,
    /// Detached from the ready queues, waiting on RECEIVE.
    Blocked,
    /// Slot is unused: never registered, or the process has terminated.
    Terminated,
}

// ---------------------------------------------------------------------------
// Stack
// ---------------------------------------------------------------------------

/// Per-process stack memory, 8-byte aligned as required by AAPCS.
#[repr(C, align(8))]
pub struct ProcessStack(pub [usize; STACK_WORDS]);

impl ProcessStack {
    pub const EMPTY: Self = Self([0; STACK_WORDS]);

    /// Stack pointer value for the first dispatch: the bottom of a crafted
    /// context sitting at the very top of the stack.
    fn initial_frame_index() -> usize {
        STACK_WORDS - CONTEXT_WORDS
    }
}

// ---------------------------------------------------------------------------
// Process Control Block
// ---------------------------------------------------------------------------

/// Process Control Block (PCB): scheduling and IPC state of one process.
pub struct ProcessControlBlock {
    /// Identifier supplied at registration.
    pub pid: Pid,

    /// Current execution state.
    pub state: ProcessState,

    /// Current priority, `0..PRIORITY_LEVELS`.
    pub priority: usize,

    /// Saved stack pointer (PSP). Points into `self.stack` and is updated
    /// on every context switch.
    pub stack_pointer: *mut usize,

    /// Per-process stack memory.
    pub stack: ProcessStack,

    /// Ready-queue successor while runnable; free-list successor while the
    /// slot is unused.
    pub next: Option<ProcessHandle>,

    /// Ready-queue predecessor while runnable.
    pub prev: Option<ProcessHandle>,

    /// Pending-receive record, attached only while `Blocked`.
    pub pending: Option<MessageHandle>,
}

impl ProcessControlBlock {
    /// An unused slot. Used to initialize the static arena.
    pub const EMPTY: Self = Self {
        pid: 0,
        state: ProcessState::Terminated,
        priority: 0,
        stack_pointer: core::ptr::null_mut(),
        stack: ProcessStack::EMPTY,
        next: None,
        prev: None,
        pending: None,
    };

    #[inline]
    pub fn is_live(&self) -> bool {
        self.state != ProcessState::Terminated
    }

    /// Craft the initial context so that the first restore starts `entry`
    /// with `exit` as its return address.
    ///
    /// ## Stack Layout (top = high address, growing down)
    ///
    /// ```text
    /// [Hardware stacked frame]
    ///   xPSR  (Thumb bit set)
    ///   PC    (entry point)
    ///   LR    (exit trampoline)
    ///   R12, R3, R2, R1, R0   (0)
    /// [Software saved context]
    ///   R11 … R4              (0)   <- stack_pointer after init
    /// ```
    pub fn init_stack(&mut self, entry: usize, exit: usize) {
        let base = ProcessStack::initial_frame_index();
        let frame = &mut self.stack.0[base..];
        frame.fill(0);

        // Hardware-stacked frame (R0–R3, R12, LR, PC, xPSR)
        frame[13] = exit;
        frame[14] = entry & !1;
        frame[15] = INITIAL_XPSR;

        self.stack_pointer = self.stack.0[base..].as_mut_ptr();
    }

    /// Detach from every structure and return the slot to its unused state.
    fn reset(&mut self) {
        self.pid = 0;
        self.state = ProcessState::Terminated;
        self.priority = 0;
        self.stack_pointer = core::ptr::null_mut();
        self.next = None;
        self.prev = None;
        self.pending = None;
    }
}

// ---------------------------------------------------------------------------
// Process arena
// ---------------------------------------------------------------------------

/// Fixed-capacity arena of process records with an intrusive free list.
pub struct ProcessTable {
    slots: [ProcessControlBlock; MAX_PROCESSES],
    free: Option<ProcessHandle>,
    live: usize,
}

impl ProcessTable {
    pub const fn new() -> Self {
        let mut slots = [ProcessControlBlock::EMPTY; MAX_PROCESSES];
        let mut i = 0;
        while i + 1 < MAX_PROCESSES {
            slots[i].next = Some(ProcessHandle::new(i + 1));
            i += 1;
        }
        Self {
            slots,
            free: if MAX_PROCESSES > 0 { Some(ProcessHandle::new(0)) } else { None },
            live: 0,
        }
    }

    /// Claim a free slot for `pid` and craft its initial context.
    ///
    /// The returned record is detached: the caller links it into a ready
    /// queue.
    pub fn allocate(
        &mut self,
        pid: Pid,
        entry: usize,
        exit: usize,
    ) -> Result<ProcessHandle, KernelError> {
        if self.find(pid).is_some() {
            return Err(KernelError::DuplicatePid);
        }
        let handle = self.free.ok_or(KernelError::ProcessTableFull)?;
        let pcb = &mut self.slots[handle.index()];
        self.free = pcb.next;

        pcb.reset();
        pcb.pid = pid;
        pcb.state = ProcessState::Ready;
        pcb.init_stack(entry, exit);

        self.live += 1;
        Ok(handle)
    }

    /// Return a slot to the free list. Its stack becomes reusable.
    pub fn release(&mut self, handle: ProcessHandle) {
        let pcb = &mut self.slots[handle.index()];
        if !pcb.is_live() {
            return;
        }
        pcb.reset();
        pcb.next = self.free;
        self.free = Some(handle);
        self.live -= 1;
    }

    /// Handle of the live process with the given id.
    pub fn find(&self, pid: Pid) -> Option<ProcessHandle> {
        self.slots
            .iter()
            .position(|pcb| pcb.is_live() && pcb.pid == pid)
            .map(ProcessHandle::new)
    }

    #[inline]
    pub fn get(&self, handle: ProcessHandle) -> &ProcessControlBlock {
        &self.slots[handle.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, handle: ProcessHandle) -> &mut ProcessControlBlock {
        &mut self.slots[handle.index()]
    }

    /// Number of live (registered, not terminated) processes.
    #[inline]
    pub fn live(&self) -> usize {
        self.live
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_crafts_initial_frame() {
        let mut table = ProcessTable::new();
        let h = table.allocate(7, 0x0000_1235, 0x0000_2001).unwrap();
        let pcb = table.get(h);

        assert_eq!(pcb.pid, 7);
        assert_eq!(pcb.state, ProcessState::Ready);
        assert!(pcb.pending.is_none());

        let base = STACK_WORDS - CONTEXT_WORDS;
        assert_eq!(pcb.stack_pointer as *const usize, pcb.stack.0[base..].as_ptr());
        // R4–R11 and R0–R3, R12 start zeroed
        assert!(pcb.stack.0[base..base + 13].iter().all(|&w| w == 0));
        assert_eq!(pcb.stack.0[base + 13], 0x0000_2001); // LR
        assert_eq!(pcb.stack.0[base + 14], 0x0000_1234); // PC, Thumb bit cleared
        assert_eq!(pcb.stack.0[base + 15], INITIAL_XPSR);
    }

    #[test]
    fn test_stack_alignment() {
        let table = ProcessTable::new();
        let addr = table.get(ProcessHandle::new(0)).stack.0.as_ptr() as usize;
        assert_eq!(addr % 8, 0);
    }

    #[test]
    fn test_duplicate_pid_rejected() {
        let mut table = ProcessTable::new();
        table.allocate(1, 0x100, 0x200).unwrap();
        assert_eq!(table.allocate(1, 0x100, 0x200), Err(KernelError::DuplicatePid));
        assert_eq!(table.live(), 1);
    }

    #[test]
    fn test_table_full_and_slot_reuse() {
        let mut table = ProcessTable::new();
        let mut handles = [ProcessHandle::new(0); MAX_PROCESSES];
        for (i, h) in handles.iter_mut().enumerate() {
            *h = table.allocate(i as Pid + 1, 0x100, 0x200).unwrap();
        }
        assert_eq!(table.allocate(99, 0x100, 0x200), Err(KernelError::ProcessTableFull));

        table.release(handles[3]);
        assert_eq!(table.get(handles[3]).state, ProcessState::Terminated);
        assert_eq!(table.find(4), None);

        let reused = table.allocate(99, 0x100, 0x200).unwrap();
        assert_eq!(reused, handles[3]);
        assert_eq!(table.find(99), Some(reused));
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut table = ProcessTable::new();
        let h = table.allocate(5, 0x100, 0x200).unwrap();
        table.release(h);
        table.release(h);
        assert_eq!(table.live(), 0);
    }
}
