//! # LMK Example Firmware
//!
//! Demonstrates message passing and priority scheduling with three
//! processes:
//!
//! | Process | Pid | Priority | Mailbox | Behavior |
//! |---------|-----|----------|---------|----------|
//! | `ponger` | 2 | 3 | 2 | Blocks on its mailbox, echoes every message back |
//! | `pinger` | 1 | 2 | 1 | Sends numbered pings, waits for each echo |
//! | `worker` | 3 | 2 | none | Counts, drops to priority 1, then exits |
//!
//! ## Expected Sequence
//!
//! 1. `ponger` runs first, binds mailbox 2 and blocks in RECEIVE.
//! 2. `pinger` and `worker` share priority 2 round-robin on every tick.
//! 3. Each ping is copied straight into `ponger`'s buffer; `ponger` wakes,
//!    preempts, and queues its echo in `pinger`'s mailbox.
//! 4. `worker` lowers itself to priority 1, where it only runs while
//!    `pinger` is blocked, then returns and is terminated.
//! 5. The idle process (pid 0) runs when everything else is blocked.

#![cfg_attr(all(target_arch = "arm", target_os = "none"), no_std, no_main)]

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod firmware {
    use cortex_m_rt::entry;
    use panic_halt as _;

    use lmk::kernel;
    use lmk::mailbox::MailboxSelector;
    use lmk::syscall;

    const PING_BOX: usize = 1;
    const PONG_BOX: usize = 2;

    // -----------------------------------------------------------------------
    // Process entry points
    // -----------------------------------------------------------------------

    /// **Echo server** (priority 3)
    ///
    /// Owns mailbox 2 and returns every message to the mailbox it came from.
    extern "C" fn ponger() {
        if syscall::bind(MailboxSelector::Id(PONG_BOX)).is_err() {
            return;
        }
        let mut buf = [0u8; 16];
        loop {
            match syscall::receive(PONG_BOX, &mut buf) {
                Ok((len, from)) => {
                    let _ = syscall::send(from, PONG_BOX, &buf[..len]);
                }
                Err(_) => return,
            }
        }
    }

    /// **Client** (priority 2)
    ///
    /// Owns mailbox 1 and pings the echo server ten times, checking every
    /// echo against what it sent.
    extern "C" fn pinger() {
        let Ok(own) = syscall::bind(MailboxSelector::Id(PING_BOX)) else {
            return;
        };
        let mut msg = *b"ping 0";
        let mut reply = [0u8; 16];
        for round in 0..10u8 {
            msg[5] = b'0' + round;
            if syscall::send(PONG_BOX, own, &msg).is_err() {
                break;
            }
            match syscall::receive(own, &mut reply) {
                Ok((len, _)) if reply[..len] == msg => {}
                _ => break,
            }
        }
        let _ = syscall::unbind(own);
    }

    /// **Background worker** (priority 2, then 1)
    ///
    /// Burns some cycles, steps down a priority, and returns into
    /// `process_exit`.
    extern "C" fn worker() {
        let pid = syscall::get_id();
        let mut acc: u32 = pid;
        for _ in 0..50_000 {
            acc = acc.wrapping_mul(31).wrapping_add(1);
        }
        if syscall::set_priority(1).is_err() {
            syscall::terminate();
        }
        for _ in 0..50_000 {
            acc = acc.wrapping_mul(31).wrapping_add(1);
        }
        core::hint::black_box(acc);
    }

    // -----------------------------------------------------------------------
    // Main entry point
    // -----------------------------------------------------------------------

    /// Firmware entry point. Initializes the kernel, registers the
    /// processes, and starts scheduling. Does not return.
    #[entry]
    fn main() -> ! {
        // Take ownership of core peripherals
        let cp = cortex_m::Peripherals::take().expect("core peripherals taken twice");

        kernel::init().expect("kernel init failed");

        kernel::register_process(ponger, 2, 3).expect("failed to register ponger");
        kernel::register_process(pinger, 1, 2).expect("failed to register pinger");
        kernel::register_process(worker, 3, 2).expect("failed to register worker");

        // Start the kernel. Does not return
        kernel::start(cp)
    }
}

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
fn main() {}
