//! # Kernel Errors
//!
//! Every failure the kernel reports is synchronous and local: the operation
//! leaves all shared structures untouched and the caller receives a
//! negative sentinel in its argument block. Inside the kernel failures are
//! carried as [`KernelError`]; the sentinel encoding only exists at the trap
//! boundary.

use core::fmt;

/// Why a send or receive was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcFault {
    /// The calling process does not own the mailbox it named as its own.
    NotOwner,
    /// The destination mailbox has no owner.
    Unbound,
    /// The mailbox id is outside the directory.
    InvalidMailbox,
    /// Payload size (or receive capacity) is negative or exceeds
    /// `MAX_MESSAGE_SIZE`.
    Oversize,
    /// The message pool has no free record.
    PoolExhausted,
}

/// Failure taxonomy of the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// SET-PRIORITY with a level outside `0..PRIORITY_LEVELS`.
    InvalidPriority,
    /// No free mailbox, the requested mailbox is already owned, or the id
    /// is out of range.
    BindFailure,
    /// The caller does not own the mailbox it tried to release.
    UnbindFailure,
    /// SEND was refused.
    SendFailure(IpcFault),
    /// RECEIVE was refused.
    ReceiveFailure(IpcFault),
    /// The operation code is not recognised.
    UnknownOperation,
    /// Registration found no free process slot.
    ProcessTableFull,
    /// Registration reused a live process id.
    DuplicatePid,
    /// Registration attempted after the first trap.
    AlreadyStarted,
}

impl KernelError {
    /// Sentinel written to the caller's result slot.
    pub const fn code(self) -> i32 {
        match self {
            KernelError::InvalidPriority | KernelError::UnknownOperation => -1,
            KernelError::BindFailure => -2,
            KernelError::UnbindFailure => -3,
            KernelError::SendFailure(_) => -4,
            KernelError::ReceiveFailure(_) => -5,
            KernelError::ProcessTableFull
            | KernelError::DuplicatePid
            | KernelError::AlreadyStarted => -6,
        }
    }

    /// Recover a coarse error from a sentinel returned by a kernel call.
    ///
    /// The fault detail of SEND/RECEIVE does not cross the trap boundary,
    /// so it comes back as the most general cause.
    pub const fn from_code(code: i32) -> Option<KernelError> {
        match code {
            -1 => Some(KernelError::UnknownOperation),
            -2 => Some(KernelError::BindFailure),
            -3 => Some(KernelError::UnbindFailure),
            -4 => Some(KernelError::SendFailure(IpcFault::Unbound)),
            -5 => Some(KernelError::ReceiveFailure(IpcFault::NotOwner)),
            -6 => Some(KernelError::AlreadyStarted),
            _ => None,
        }
    }
}

impl fmt::Display for IpcFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            IpcFault::NotOwner => "mailbox not owned by caller",
            IpcFault::Unbound => "destination mailbox unbound",
            IpcFault::InvalidMailbox => "mailbox id out of range",
            IpcFault::Oversize => "size exceeds message limit",
            IpcFault::PoolExhausted => "message pool exhausted",
        };
        f.write_str(reason)
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::InvalidPriority => f.write_str("priority out of range"),
            KernelError::BindFailure => f.write_str("bind failed"),
            KernelError::UnbindFailure => f.write_str("unbind failed: not owner"),
            KernelError::SendFailure(fault) => write!(f, "send failed: {}", fault),
            KernelError::ReceiveFailure(fault) => write!(f, "receive failed: {}", fault),
            KernelError::UnknownOperation => f.write_str("unknown kernel call"),
            KernelError::ProcessTableFull => f.write_str("process table full"),
            KernelError::DuplicatePid => f.write_str("process id already registered"),
            KernelError::AlreadyStarted => f.write_str("kernel already started"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels_are_negative() {
        let all = [
            KernelError::InvalidPriority,
            KernelError::BindFailure,
            KernelError::UnbindFailure,
            KernelError::SendFailure(IpcFault::Oversize),
            KernelError::ReceiveFailure(IpcFault::PoolExhausted),
            KernelError::UnknownOperation,
            KernelError::ProcessTableFull,
        ];
        for err in all {
            assert!(err.code() < 0);
        }
        assert_eq!(KernelError::InvalidPriority.code(), -1);
        assert_eq!(KernelError::UnknownOperation.code(), -1);
    }

    #[test]
    fn test_from_code() {
        assert_eq!(KernelError::from_code(-2), Some(KernelError::BindFailure));
        assert_eq!(KernelError::from_code(-3), Some(KernelError::UnbindFailure));
        assert!(matches!(
            KernelError::from_code(-4),
            Some(KernelError::SendFailure(_))
        ));
        assert_eq!(KernelError::from_code(0), None);
        assert_eq!(KernelError::from_code(7), None);
    }
}
