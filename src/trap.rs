//! # Trap Dispatcher
//!
//! The single synchronous entry point through which processes request
//! kernel operations.
//!
//! A process fills a [`KernelCallArgs`] block on its own stack, puts the
//! block's address in R7 and executes `svc #0`. The SVCall handler saves the
//! caller's context and hands the block to [`Kernel::trap`], which decodes
//! the call code, performs the operation and writes the result back into
//! the block before the (possibly different) running process is resumed.
//!
//! The very first trap comes from `kernel::start()` on the main stack. It
//! carries no call; it only launches the initial process.

use core::ptr::addr_of_mut;

use log::{debug, warn};

use crate::error::{IpcFault, KernelError};
use crate::ipc::ReceiveOutcome;
use crate::kernel::Kernel;
use crate::mailbox::{MailboxId, MailboxSelector};
use crate::message::ReceiveRequest;

// ---------------------------------------------------------------------------
// Call ABI
// ---------------------------------------------------------------------------

/// Kernel call codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum KernelCall {
    GetId = 0,
    SetPriority = 1,
    Terminate = 2,
    Bind = 3,
    Unbind = 4,
    Send = 5,
    Receive = 6,
}

impl KernelCall {
    pub const fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => KernelCall::GetId,
            1 => KernelCall::SetPriority,
            2 => KernelCall::Terminate,
            3 => KernelCall::Bind,
            4 => KernelCall::Unbind,
            5 => KernelCall::Send,
            6 => KernelCall::Receive,
            _ => return None,
        })
    }
}

/// Argument block of a kernel call. Lives on the caller's stack.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct KernelCallArgs {
    pub code: u32,
    /// Result slot, written by the kernel.
    pub rtnvalue: i32,
    pub arg1: usize,
    pub arg2: usize,
}

impl KernelCallArgs {
    pub const fn new(call: KernelCall, arg1: usize, arg2: usize) -> Self {
        Self {
            code: call as u32,
            rtnvalue: 0,
            arg1,
            arg2,
        }
    }
}

/// Further arguments of SEND and RECEIVE, passed by address in `arg1`.
///
/// | field    | SEND                 | RECEIVE                            |
/// |----------|----------------------|------------------------------------|
/// | `to`     | destination mailbox  | mailbox to receive on              |
/// | `from`   | source mailbox       | out: sender's mailbox              |
/// | `buffer` | payload              | destination buffer                 |
/// | `size`   | payload length       | in: capacity, out: bytes copied    |
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct MessageArgs {
    pub to: i32,
    pub from: i32,
    pub buffer: *mut u8,
    pub size: i32,
}

/// Dispatcher state. Leaves `Uninitialized` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapState {
    Uninitialized,
    Steady,
}

/// What the context switcher has to do after a trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapOutcome {
    /// First trap: launch the initial process.
    Started,
    /// The caller keeps the CPU.
    Resumed,
    /// A different process runs next.
    Switched,
    /// Nothing is runnable.
    Halted,
}

/// Result slot action after a call.
enum Reply {
    Value(i32),
    /// The caller terminated or blocked; its block is left alone.
    Deferred,
}

fn mailbox_arg(raw: i32) -> Option<MailboxId> {
    usize::try_from(raw).ok()
}

fn size_arg(raw: i32) -> Result<usize, IpcFault> {
    usize::try_from(raw).map_err(|_| IpcFault::Oversize)
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

impl Kernel {
    /// Handle one trap.
    ///
    /// In the uninitialized state `args` is ignored and the dispatcher
    /// transitions to steady state. Afterwards the call in `args` is
    /// performed on behalf of the running process.
    ///
    /// # Safety
    /// In steady state `args` must point to the running process's argument
    /// block, and any addresses inside it (SEND/RECEIVE) must be valid for
    /// the lengths given. For a RECEIVE that blocks they must stay valid
    /// until the matching SEND delivers.
    pub unsafe fn trap(&mut self, args: *mut KernelCallArgs) -> TrapOutcome {
        if self.trap_state == TrapState::Uninitialized {
            self.trap_state = TrapState::Steady;
            return match self.scheduler.settle() {
                Some(_) => {
                    debug!("first trap: launching pid {:?}", self.current_pid());
                    TrapOutcome::Started
                }
                None => {
                    warn!("first trap with no registered process");
                    TrapOutcome::Halted
                }
            };
        }

        let Some(caller) = self.scheduler.running() else {
            return TrapOutcome::Halted;
        };

        match self.dispatch(args) {
            Ok(Reply::Value(value)) => (*args).rtnvalue = value,
            Ok(Reply::Deferred) => {}
            Err(err) => {
                warn!("kernel call {} failed: {}", (*args).code, err);
                (*args).rtnvalue = err.code();
            }
        }

        match self.scheduler.settle() {
            None => {
                warn!("no runnable process");
                TrapOutcome::Halted
            }
            Some(next) if next == caller => TrapOutcome::Resumed,
            Some(_) => TrapOutcome::Switched,
        }
    }

    unsafe fn dispatch(&mut self, args: *mut KernelCallArgs) -> Result<Reply, KernelError> {
        let call = KernelCall::from_code((*args).code).ok_or(KernelError::UnknownOperation)?;
        let arg1 = (*args).arg1;

        match call {
            KernelCall::GetId => {
                let pid = self.current_pid().ok_or(KernelError::UnknownOperation)?;
                Ok(Reply::Value(pid as i32))
            }
            KernelCall::SetPriority => {
                let priority = self.set_priority(arg1)?;
                Ok(Reply::Value(priority as i32))
            }
            KernelCall::Terminate => {
                self.terminate_running();
                Ok(Reply::Deferred)
            }
            KernelCall::Bind => {
                let id = self.bind(MailboxSelector::from_raw(arg1))?;
                Ok(Reply::Value(id as i32))
            }
            KernelCall::Unbind => {
                self.unbind(arg1)?;
                Ok(Reply::Value(1))
            }
            KernelCall::Send => {
                let msg = &*(arg1 as *const MessageArgs);
                let fail = KernelError::SendFailure;
                let dest = mailbox_arg(msg.to).ok_or(fail(IpcFault::InvalidMailbox))?;
                let src = mailbox_arg(msg.from).ok_or(fail(IpcFault::InvalidMailbox))?;
                let size = size_arg(msg.size).map_err(fail)?;
                if size > crate::config::MAX_MESSAGE_SIZE {
                    return Err(fail(IpcFault::Oversize));
                }
                let payload: &[u8] = if size == 0 {
                    &[]
                } else {
                    core::slice::from_raw_parts(msg.buffer, size)
                };
                let sent = self.send(dest, src, payload)?;
                Ok(Reply::Value(sent as i32))
            }
            KernelCall::Receive => {
                let msg = arg1 as *mut MessageArgs;
                let fail = KernelError::ReceiveFailure;
                let mailbox = mailbox_arg((*msg).to).ok_or(fail(IpcFault::InvalidMailbox))?;
                let capacity = size_arg((*msg).size).map_err(fail)?;
                let request = ReceiveRequest {
                    mailbox,
                    buffer: (*msg).buffer,
                    capacity,
                    size_out: addr_of_mut!((*msg).size),
                    sender_out: addr_of_mut!((*msg).from),
                    result_out: addr_of_mut!((*args).rtnvalue),
                };
                match self.receive(request)? {
                    ReceiveOutcome::Delivered { size, .. } => Ok(Reply::Value(size as i32)),
                    ReceiveOutcome::Blocked => Ok(Reply::Deferred),
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
