//! # Kernel Calls
//!
//! Process-side interface to the trap dispatcher. Each call builds a
//! [`KernelCallArgs`] block on the caller's stack, loads its address into
//! R7 and executes `svc #0`. When the process resumes, the kernel has
//! written the result into the block.
//!
//! These functions must only be called from a running process (Thread
//! mode on the process stack), never from an exception handler.

use crate::error::KernelError;
use crate::mailbox::{MailboxId, MailboxSelector};
use crate::process::Pid;
use crate::trap::{KernelCall, KernelCallArgs, MessageArgs};

/// Raise the trap for `args`.
#[cfg(all(target_arch = "arm", target_os = "none"))]
fn raise(args: &mut KernelCallArgs) {
    // R7 is reserved by LLVM as the frame pointer, so it is swapped by hand.
    unsafe {
        core::arch::asm!(
            "mov {saved}, r7",
            "mov r7, {args}",
            "svc #0",
            "mov r7, {saved}",
            args = in(reg) args as *mut KernelCallArgs,
            saved = out(reg) _,
        );
    }
}

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
fn raise(_args: &mut KernelCallArgs) {
    unimplemented!("kernel calls require a Cortex-M target")
}

fn call(op: KernelCall, arg1: usize) -> i32 {
    let mut args = KernelCallArgs::new(op, arg1, 0);
    raise(&mut args);
    // The kernel wrote the slot behind the compiler's back.
    unsafe { core::ptr::read_volatile(&args.rtnvalue) }
}

fn check(rtn: i32) -> Result<i32, KernelError> {
    match KernelError::from_code(rtn) {
        Some(err) if rtn < 0 => Err(err),
        _ => Ok(rtn),
    }
}

/// First trap, issued by `kernel::start()` from the main stack.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub(crate) fn boot() {
    unsafe {
        core::arch::asm!("svc #0");
    }
}

/// Id of the calling process.
pub fn get_id() -> Pid {
    call(KernelCall::GetId, 0) as Pid
}

/// Move the calling process to `priority`. Returns its new priority.
pub fn set_priority(priority: usize) -> Result<usize, KernelError> {
    match call(KernelCall::SetPriority, priority) {
        rtn if rtn < 0 => Err(KernelError::InvalidPriority),
        rtn => Ok(rtn as usize),
    }
}

/// Terminate the calling process. Never returns.
pub fn terminate() -> ! {
    call(KernelCall::Terminate, 0);
    // The kernel never resumes a terminated process.
    loop {
        crate::sync::wait_for_interrupt();
    }
}

/// Return address of every process entry point.
pub extern "C" fn process_exit() -> ! {
    terminate()
}

/// Bind a mailbox to the calling process.
pub fn bind(selector: MailboxSelector) -> Result<MailboxId, KernelError> {
    check(call(KernelCall::Bind, selector.into_raw())).map(|id| id as MailboxId)
}

/// Release a mailbox owned by the calling process.
pub fn unbind(id: MailboxId) -> Result<(), KernelError> {
    check(call(KernelCall::Unbind, id)).map(|_| ())
}

/// Send `payload` from `from` (owned by the caller) to `to`.
///
/// Returns the number of bytes accepted.
pub fn send(to: MailboxId, from: MailboxId, payload: &[u8]) -> Result<usize, KernelError> {
    let mut msg = MessageArgs {
        to: to as i32,
        from: from as i32,
        buffer: payload.as_ptr() as *mut u8,
        size: payload.len() as i32,
    };
    check(call(KernelCall::Send, &mut msg as *mut MessageArgs as usize)).map(|n| n as usize)
}

/// Receive on `mailbox` into `buffer`, blocking while it is empty.
///
/// Returns the number of bytes copied and the sender's mailbox.
pub fn receive(mailbox: MailboxId, buffer: &mut [u8]) -> Result<(usize, MailboxId), KernelError> {
    let mut msg = MessageArgs {
        to: mailbox as i32,
        from: -1,
        buffer: buffer.as_mut_ptr(),
        size: buffer.len() as i32,
    };
    let size = check(call(KernelCall::Receive, &mut msg as *mut MessageArgs as usize))?;
    let sender = unsafe { core::ptr::read_volatile(&msg.from) };
    Ok((size as usize, sender as MailboxId))
}
