//! # LMK: Light-weight Messaging Kernel
//!
//! A preemptive multitasking kernel for single-core ARM Cortex-M4
//! microcontrollers, built around fixed-priority round-robin scheduling and
//! mailbox message passing.
//!
//! ## Overview
//!
//! - Processes are registered at boot and each gets its own stack.
//! - The highest non-empty priority queue runs; processes at the same
//!   priority share the CPU round-robin on every SysTick.
//! - Processes talk to the kernel only through traps (`svc #0`) carrying an
//!   argument block: GET-ID, SET-PRIORITY, TERMINATE, BIND, UNBIND, SEND
//!   and RECEIVE.
//! - Messages travel between mailboxes. A message sent to a mailbox whose
//!   owner is blocked on it is copied straight into the receiver's buffer;
//!   otherwise it waits in a fixed-capacity pool.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                  Application Processes                  │
//! ├────────────────────────────────────────────────────────┤
//! │              Kernel Calls (syscall.rs)                  │
//! │    get_id · set_priority · bind · send · receive · …    │
//! ├────────────────────────────────────────────────────────┤
//! │   Trap Dispatcher (trap.rs) · Switcher (context.rs)    │
//! ├──────────────┬────────────────────┬───────────────────┤
//! │  Scheduler   │   Message IPC      │  Kernel Context   │
//! │  scheduler.rs│   ipc.rs           │  kernel.rs        │
//! │  ─ enqueue() │   mailbox.rs       │  ─ init()         │
//! │  ─ rotate()  │   message.rs       │  ─ register()     │
//! │  ─ settle()  │                    │  ─ start()        │
//! ├──────────────┴────────────────────┴───────────────────┤
//! │            Process Model (process.rs)                   │
//! │      PCB · ProcessTable · Stack · Initial Frame         │
//! ├────────────────────────────────────────────────────────┤
//! │            Arch Port (arch/cortex_m4.rs)                │
//! │         SVCall · PendSV · SysTick · Priorities          │
//! ├────────────────────────────────────────────────────────┤
//! │         ARM Cortex-M4 Hardware (Thumb-2)                │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: all state is statically allocated in one `Kernel` value
//! - **No `alloc`**: pure `core` only
//! - **Index arenas**: processes, mailboxes and pool records link to each
//!   other by index, never by pointer
//! - **Per-process stack**: `[usize; STACK_WORDS]` inline in each PCB
//!
//! Everything above the arch port builds and tests on the host.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod error;
pub mod process;
pub mod message;
pub mod mailbox;
pub mod scheduler;
pub mod ipc;
pub mod trap;
pub mod context;
pub mod kernel;
pub mod syscall;
pub mod sync;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod arch;
