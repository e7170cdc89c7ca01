//! # LMK Configuration
//!
//! Compile-time constants governing the scheduler, the mailbox directory
//! and the message pool. All limits are fixed at compile time; there is no dynamic
//! allocation.

/// Number of distinct process priorities. Priority `0` is the lowest
/// (idle) level, `PRIORITY_LEVELS - 1` the highest.
pub const PRIORITY_LEVELS: usize = 5;

/// Priority of the idle process. The ready queue at this level must
/// never be empty once the kernel is running.
pub const IDLE_PRIORITY: usize = 0;

/// Process id of the built-in idle process registered by `kernel::init()`.
pub const IDLE_PID: u32 = 0;

/// Maximum number of processes the system can hold simultaneously,
/// including the idle process. Bounds the static process arena.
pub const MAX_PROCESSES: usize = 8;

/// Per-process stack size in bytes. Must be large enough for the
/// deepest call chain plus the hardware exception frame (32 bytes)
/// and the software-saved context (32 bytes for R4–R11).
pub const STACK_SIZE: usize = 1024;

/// Number of mailboxes in the mailbox directory.
pub const MAILBOX_COUNT: usize = 16;

/// Number of message records in the global message pool. Each queued
/// message and each blocked receiver holds one record.
pub const MESSAGE_POOL_CAPACITY: usize = 32;

/// Largest payload, in bytes, a single message may carry.
/// Independent of `MESSAGE_POOL_CAPACITY`.
pub const MAX_MESSAGE_SIZE: usize = 64;

/// SysTick frequency in Hz. Each tick requests a round-robin switch
/// among the processes at the current priority.
pub const TICK_HZ: u32 = 100;

/// System clock frequency in Hz (TM4C123 precision internal oscillator).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;
