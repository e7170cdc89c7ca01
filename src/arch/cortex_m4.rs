//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor:
//! the SVCall trap entry, the PendSV context switch, SysTick setup and
//! exception priorities.
//!
//! ## Context Switch Mechanism
//!
//! Processes run in Thread mode on the PSP; the kernel runs in Handler
//! mode on the MSP. On exception entry the hardware stacks R0–R3, R12, LR,
//! PC and xPSR onto the process stack. Both SVCall and PendSV push R4–R11
//! below that frame, pass the resulting PSP to the kernel, and restore
//! R4–R11 from whichever stack pointer the kernel hands back. The kernel
//! never touches CPU registers itself.
//!
//! ## Interrupt Priorities
//!
//! - SVCall: priority 0 (highest); a trap is never preempted by a switch
//! - PendSV: priority 0xFF (lowest)
//! - SysTick: priority 0xFF (lowest); only pends PendSV
//!
//! Floating-point state is not saved: processes must not use the FPU.

use core::arch::naked_asm;

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{SCB, SYST};

use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure SysTick to fire at `TICK_HZ` from the processor clock.
///
/// The counter stays stopped; the first trap starts it once a process
/// stack exists to preempt.
pub fn configure_systick(syst: &mut SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.disable_counter();
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_interrupt();
}

/// Start the SysTick counter.
fn enable_systick() {
    // Safety: only the counter-enable bit is touched, from the first trap,
    // after `configure_systick` has run.
    let mut syst = unsafe { cortex_m::Peripherals::steal() }.SYST;
    syst.enable_counter();
}

// ---------------------------------------------------------------------------
// Interrupt priority configuration
// ---------------------------------------------------------------------------

/// Set PendSV and SysTick to the lowest priority, SVCall to the highest.
pub fn set_interrupt_priorities(scb: &mut SCB) {
    unsafe {
        scb.set_priority(SystemHandler::SVCall, 0x00);
        scb.set_priority(SystemHandler::PendSV, 0xFF);
        scb.set_priority(SystemHandler::SysTick, 0xFF);
    }
}

// ---------------------------------------------------------------------------
// SVCall handler (trap entry)
// ---------------------------------------------------------------------------

/// SVCall exception handler: the kernel's single trap entry point.
///
/// A trap from Thread/PSP saves R4–R11 and passes the PSP; the first trap
/// (from `kernel::start()` on the MSP) passes a null pointer. Either way
/// the handler resumes the stack pointer returned by the kernel and
/// returns to Thread mode on the PSP.
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn SVCall() {
    naked_asm!(
        "tst    lr, #4",
        "ite    ne",
        "mrsne  r0, psp",
        "moveq  r0, #0",
        "cbz    r0, 1f",
        "stmdb  r0!, {{r4-r11}}",
        "1:",
        "bl     {dispatch}",
        "ldmia  r0!, {{r4-r11}}",
        "msr    psp, r0",
        "ldr    lr, =0xFFFFFFFD",
        "bx     lr",
        dispatch = sym lmk_service_call,
    );
}

/// Run the trap dispatcher and return the PSP to resume.
///
/// # Safety
/// Called from `SVCall` only, with R4–R11 already stacked.
unsafe extern "C" fn lmk_service_call(saved_sp: *mut usize) -> *mut usize {
    let kernel = &mut *crate::kernel::KERNEL_PTR;
    let first = !kernel.is_started();
    match kernel.service_call(saved_sp) {
        Some(sp) => {
            if first {
                enable_systick();
            }
            sp
        }
        None => halt(),
    }
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

/// PendSV exception handler: round-robin context switch.
///
/// ## Sequence
/// 1. Save R4–R11 onto the running process's stack (PSP)
/// 2. Hand the PSP to the kernel, which stores it and picks the next head
/// 3. Restore R4–R11 from the returned stack
/// 4. Return from exception on the PSP (hardware restores the rest)
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "mrs    r0, psp",
        "stmdb  r0!, {{r4-r11}}",
        "bl     {switch}",
        "ldmia  r0!, {{r4-r11}}",
        "msr    psp, r0",
        "ldr    lr, =0xFFFFFFFD",
        "bx     lr",
        switch = sym lmk_preempt,
    );
}

/// Perform the tick-driven switch and return the new PSP.
///
/// # Safety
/// Called from `PendSV` only, with R4–R11 already stacked.
unsafe extern "C" fn lmk_preempt(saved_sp: *mut usize) -> *mut usize {
    let kernel = &mut *crate::kernel::KERNEL_PTR;
    match kernel.preempt(saved_sp) {
        Some(sp) => sp,
        None => halt(),
    }
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// SysTick exception handler. Requests a switch; touches no kernel state.
#[no_mangle]
pub unsafe extern "C" fn SysTick() {
    SCB::set_pendsv();
}

/// Nothing is runnable: park the core for good.
fn halt() -> ! {
    log::warn!("no runnable process, halting");
    loop {
        cortex_m::asm::wfi();
    }
}
