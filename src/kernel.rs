//! # Kernel
//!
//! The single kernel context object and the boot-time API.
//!
//! All mutable kernel state (process arena, ready queues, mailbox
//! directory, message pool, trap state) lives in one [`Kernel`] value. The
//! exception handlers reach the global instance through `KERNEL_PTR`; host
//! tests build their own `Kernel` and drive it directly.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::init()              ← Reset state, register idle process
//!         ├─► kernel::register_process()  ← Register processes (×N)
//!         └─► kernel::start()             ← No return
//!               ├─► Configure SysTick (counter stopped)
//!               ├─► Set exception priorities
//!               └─► svc #0  → first trap starts the highest-priority process
//! ```

use log::{debug, info};

use crate::config::{IDLE_PID, IDLE_PRIORITY, PRIORITY_LEVELS};
use crate::error::KernelError;
use crate::mailbox::MailboxDirectory;
use crate::message::MessagePool;
use crate::process::{Pid, ProcessEntry, ProcessHandle};
use crate::scheduler::Scheduler;
use crate::sync;
use crate::trap::TrapState;

// ---------------------------------------------------------------------------
// Kernel context
// ---------------------------------------------------------------------------

/// All shared kernel state. Mutated only from the trap dispatcher and the
/// context switcher.
pub struct Kernel {
    pub(crate) scheduler: Scheduler,
    pub(crate) mailboxes: MailboxDirectory,
    pub(crate) pool: MessagePool,
    pub(crate) trap_state: TrapState,
}

impl Kernel {
    pub const fn new() -> Self {
        Self {
            scheduler: Scheduler::new(),
            mailboxes: MailboxDirectory::new(),
            pool: MessagePool::new(),
            trap_state: TrapState::Uninitialized,
        }
    }

    /// Register a process at boot.
    ///
    /// `exit` is the address the process returns to if `entry` returns;
    /// on the target it is [`crate::syscall::process_exit`].
    pub fn register(
        &mut self,
        entry: usize,
        exit: usize,
        pid: Pid,
        priority: usize,
    ) -> Result<ProcessHandle, KernelError> {
        if self.trap_state == TrapState::Steady {
            return Err(KernelError::AlreadyStarted);
        }
        let handle = self.scheduler.create_process(pid, priority, entry, exit)?;
        debug!("registered pid {} at priority {}", pid, priority);
        Ok(handle)
    }

    /// Id of the running process.
    pub fn current_pid(&self) -> Option<Pid> {
        self.scheduler
            .running()
            .map(|h| self.scheduler.processes.get(h).pid)
    }

    /// Move the running process to the tail of the queue at `priority`.
    ///
    /// Returns the caller's new priority.
    pub fn set_priority(&mut self, priority: usize) -> Result<usize, KernelError> {
        if priority >= PRIORITY_LEVELS {
            return Err(KernelError::InvalidPriority);
        }
        let caller = self
            .scheduler
            .dequeue_running()
            .ok_or(KernelError::InvalidPriority)?;
        self.scheduler.enqueue(caller, priority);
        debug!(
            "pid {} now at priority {}",
            self.scheduler.processes.get(caller).pid,
            priority
        );
        Ok(priority)
    }

    /// Remove the running process for good: unlink it, release its
    /// mailboxes, and return its slot and stack to the arena.
    pub fn terminate_running(&mut self) -> Option<Pid> {
        let caller = self.scheduler.dequeue_running()?;
        let pid = self.scheduler.processes.get(caller).pid;
        let released = self.mailboxes.unbind_all(caller, &mut self.pool);
        self.scheduler.processes.release(caller);
        info!("pid {} terminated, {} mailbox(es) released", pid, released);
        Some(pid)
    }

    #[inline]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    #[inline]
    pub fn mailboxes(&self) -> &MailboxDirectory {
        &self.mailboxes
    }

    #[inline]
    pub fn pool(&self) -> &MessagePool {
        &self.pool
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.trap_state == TrapState::Steady
    }
}

// ---------------------------------------------------------------------------
// Global kernel instance
// ---------------------------------------------------------------------------

/// Global kernel instance.
///
/// # Safety
/// Accessed via `KERNEL_PTR`, set during `init()`. Boot-time access runs
/// inside critical sections; afterwards only SVCall and PendSV touch it,
/// and they never run concurrently.
static mut KERNEL: Kernel = Kernel::new();

/// Raw pointer to the global kernel, used by the exception handlers.
#[no_mangle]
pub static mut KERNEL_PTR: *mut Kernel = core::ptr::null_mut();

/// Built-in idle process. Keeps the idle queue non-empty.
extern "C" fn idle_process() {
    loop {
        sync::wait_for_interrupt();
    }
}

/// Initialize the kernel and register the idle process.
///
/// Must be called exactly once, from the main thread, before any other
/// kernel function.
pub fn init() -> Result<(), KernelError> {
    sync::critical_section(|_cs| unsafe {
        let kernel = core::ptr::addr_of_mut!(KERNEL);
        kernel.write(Kernel::new());
        KERNEL_PTR = kernel;
        (*kernel).register(
            idle_process as usize,
            crate::syscall::process_exit as usize,
            IDLE_PID,
            IDLE_PRIORITY,
        )
    })?;
    Ok(())
}

/// Register a process with the kernel. Boot-time only.
///
/// # Returns
/// - `Ok(handle)`: the process's arena slot
/// - `Err(_)`: bad priority, duplicate pid, full table, or already started
///
/// # Example
/// ```ignore
/// kernel::register_process(worker, 1, 3)?;
/// ```
pub fn register_process(
    entry: ProcessEntry,
    pid: Pid,
    priority: usize,
) -> Result<ProcessHandle, KernelError> {
    sync::critical_section(|_cs| unsafe {
        (*KERNEL_PTR).register(
            entry as usize,
            crate::syscall::process_exit as usize,
            pid,
            priority,
        )
    })
}

/// Start LMK. **Does not return.**
///
/// Configures SysTick (its counter is enabled by the first trap), sets the
/// exception priorities and traps into the kernel, which launches the
/// highest-priority registered process.
///
/// # Safety
/// - `init()` must have been called.
/// - Must be called from the main thread (not from an ISR).
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub fn start(mut core_peripherals: cortex_m::Peripherals) -> ! {
    use crate::arch::cortex_m4;

    cortex_m4::configure_systick(&mut core_peripherals.SYST);
    cortex_m4::set_interrupt_priorities(&mut core_peripherals.SCB);

    crate::syscall::boot();

    // The first trap never returns to the main stack.
    loop {
        sync::wait_for_interrupt();
    }
}
