//! # Synchronization Primitives
//!
//! Interrupt-safe critical sections and the low-power wait for the
//! Cortex-M4. Boot-time kernel calls (`init`, `register_process`) run inside
//! a critical section; after `start()` the kernel is only touched from
//! SVCall and PendSV, which never preempt each other.
//!
//! Host builds get inert stand-ins so the kernel core can be unit tested.

use cortex_m::interrupt::CriticalSection;

/// Execute a closure within a critical section (interrupts disabled).
///
/// Interrupts are disabled on entry and restored on exit.
///
/// # Usage
/// ```ignore
/// sync::critical_section(|_cs| {
///     // Access shared state safely
/// });
/// ```
#[cfg(all(target_arch = "arm", target_os = "none"))]
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&CriticalSection) -> R,
{
    cortex_m::interrupt::free(f)
}

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&CriticalSection) -> R,
{
    // Single-threaded host: there is nothing to mask.
    f(&unsafe { CriticalSection::new() })
}

/// Sleep until the next interrupt.
#[cfg(all(target_arch = "arm", target_os = "none"))]
#[inline]
pub fn wait_for_interrupt() {
    cortex_m::asm::wfi();
}

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
#[inline]
pub fn wait_for_interrupt() {
    core::hint::spin_loop();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critical_section_returns_closure_value() {
        let mut counter = 0;
        let out = critical_section(|_cs| {
            counter += 1;
            counter * 10
        });
        assert_eq!(out, 10);
        assert_eq!(counter, 1);
    }
}
