//! # Context Switcher
//!
//! The arch-neutral half of the context switch. The exception handlers in
//! `arch::cortex_m4` push R4–R11 onto the process stack, hand the resulting
//! stack pointer to one of the functions here, and restore R4–R11 from
//! whatever stack pointer comes back:
//!
//! - [`Kernel::service_call`] (SVCall): save the caller, dispatch its trap,
//!   resume the process that should now run, inline.
//! - [`Kernel::preempt`] (PendSV, pended by SysTick): save the running
//!   process, advance the round-robin at the current priority, resume the
//!   new head.
//!
//! `None` means no process is runnable; the port parks the core.

use log::trace;

use crate::kernel::Kernel;
use crate::process::SAVED_R7;
use crate::trap::{KernelCallArgs, TrapOutcome, TrapState};

impl Kernel {
    /// Trap path.
    ///
    /// `saved_sp` points at the caller's saved R4 with the hardware frame
    /// above it; it is ignored on the first trap, which comes from the main
    /// stack.
    ///
    /// # Safety
    /// In steady state `saved_sp` must be the running process's stack
    /// pointer after R4–R11 were pushed, and its saved R7 must hold the
    /// address of a valid [`KernelCallArgs`].
    pub unsafe fn service_call(&mut self, saved_sp: *mut usize) -> Option<*mut usize> {
        let args = match self.trap_state {
            TrapState::Uninitialized => core::ptr::null_mut(),
            TrapState::Steady => {
                self.save_context(saved_sp);
                *saved_sp.add(SAVED_R7) as *mut KernelCallArgs
            }
        };

        match self.trap(args) {
            TrapOutcome::Halted => None,
            _ => self.resume_point(),
        }
    }

    /// Tick path: round-robin among the processes at the current priority.
    ///
    /// # Safety
    /// `saved_sp` must be the running process's stack pointer after R4–R11
    /// were pushed.
    pub unsafe fn preempt(&mut self, saved_sp: *mut usize) -> Option<*mut usize> {
        if self.trap_state == TrapState::Uninitialized {
            return Some(saved_sp);
        }
        self.save_context(saved_sp);
        self.scheduler.rotate();
        let next = self.scheduler.settle()?;
        trace!("tick: pid {}", self.scheduler.processes.get(next).pid);
        self.resume_point()
    }

    /// Persist the running process's stack pointer.
    fn save_context(&mut self, saved_sp: *mut usize) {
        if let Some(running) = self.scheduler.running() {
            self.scheduler.processes.get_mut(running).stack_pointer = saved_sp;
        }
    }

    /// Stack pointer to restore: that of the head at the current priority.
    fn resume_point(&self) -> Option<*mut usize> {
        self.scheduler
            .running()
            .map(|h| self.scheduler.processes.get(h).stack_pointer)
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
