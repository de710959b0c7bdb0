//! STM32H7B0 (Cortex-M7) retention words and image handoff.
//!
//! Only the pieces the power core drives directly live here. LCD, audio,
//! SD card and settings drivers are provided by the board support code and
//! plugged into [`crate::hal::Peripherals`] next to these.

use core::ptr::{read_volatile, write_volatile};

use crate::boot::{ImageHandoff, MagicStore, VectorTable};

// System control block
const SCB_AIRCR: *mut u32 = 0xE000_ED0C as *mut u32;
const SCB_CCSIDR: *const u32 = 0xE000_ED80 as *const u32;
const SCB_CSSELR: *mut u32 = 0xE000_ED84 as *mut u32;
const SCB_ICIALLU: *mut u32 = 0xE000_EF50 as *mut u32;
const SCB_DCISW: *mut u32 = 0xE000_EF60 as *mut u32;
const MPU_CTRL: *mut u32 = 0xE000_ED94 as *mut u32;

const AIRCR_VECTKEY: u32 = 0x05FA << 16;
const AIRCR_SYSRESETREQ: u32 = 1 << 2;

// Backup domain
const PWR_CR1: *mut u32 = 0x5802_4800 as *mut u32;
const PWR_CR1_DBP: u32 = 1 << 8;
const RTC_BKP0R: *mut u32 = 0x5800_4100 as *mut u32;

/// Data synchronization barrier.
#[inline]
fn dsb() {
    unsafe {
        core::arch::asm!("dsb", options(nostack));
    }
}

/// Instruction synchronization barrier.
#[inline]
fn isb() {
    unsafe {
        core::arch::asm!("isb", options(nostack));
    }
}

/// Request a reset through AIRCR.
pub fn system_reset() {
    dsb();
    unsafe {
        write_volatile(SCB_AIRCR, AIRCR_VECTKEY | AIRCR_SYSRESETREQ);
    }
    dsb();
}

/// Boot magic kept in a RAM word the startup code leaves untouched.
pub struct RamMagic {
    word: *mut u32,
}

impl RamMagic {
    /// # Safety
    ///
    /// `addr` must be a word-aligned RAM location that no other code uses
    /// and that is excluded from `.bss`/`.data` initialization.
    pub const unsafe fn new(addr: usize) -> Self {
        Self {
            word: addr as *mut u32,
        }
    }
}

impl MagicStore for RamMagic {
    fn read_raw(&self) -> u32 {
        unsafe { read_volatile(self.word) }
    }

    fn write_raw(&mut self, value: u32) {
        unsafe { write_volatile(self.word, value) }
        dsb();
    }
}

/// RTC backup register 0, read by the original firmware's bootloader.
pub struct BackupRegister;

impl MagicStore for BackupRegister {
    fn read_raw(&self) -> u32 {
        unsafe { read_volatile(RTC_BKP0R) }
    }

    fn write_raw(&mut self, value: u32) {
        unsafe {
            // Backup domain is write protected out of reset
            let cr1 = read_volatile(PWR_CR1);
            write_volatile(PWR_CR1, cr1 | PWR_CR1_DBP);
            write_volatile(RTC_BKP0R, value);
        }
        dsb();
    }
}

/// Direct control transfer on the Cortex-M7.
pub struct CortexM7Handoff;

impl CortexM7Handoff {
    fn invalidate_icache() {
        dsb();
        isb();
        unsafe { write_volatile(SCB_ICIALLU, 0) };
        dsb();
        isb();
    }

    fn invalidate_dcache() {
        unsafe {
            // Level 1 data cache
            write_volatile(SCB_CSSELR, 0);
            dsb();

            let ccsidr = read_volatile(SCB_CCSIDR);
            let sets = (ccsidr >> 13) & 0x7FFF;
            let ways = (ccsidr >> 3) & 0x3FF;

            for set in 0..=sets {
                for way in 0..=ways {
                    write_volatile(SCB_DCISW, (set << 5) | (way << 30));
                }
            }
        }
        dsb();
        isb();
    }
}

impl ImageHandoff for CortexM7Handoff {
    fn read_vector_table(&self, base: u32) -> VectorTable {
        let table = base as *const u32;
        unsafe {
            VectorTable {
                initial_sp: read_volatile(table),
                entry: read_volatile(table.add(1)),
            }
        }
    }

    fn disable_mpu(&mut self) {
        dsb();
        unsafe { write_volatile(MPU_CTRL, 0) };
        dsb();
        isb();
    }

    fn invalidate_caches(&mut self) {
        Self::invalidate_dcache();
        Self::invalidate_icache();
    }

    fn write_word(&mut self, addr: u32, value: u32) {
        unsafe { write_volatile(addr as *mut u32, value) };
        dsb();
    }

    fn jump(&mut self, target: VectorTable) {
        unsafe {
            core::arch::asm!(
                "msr msp, {sp}",
                "msr psp, {sp}",
                "bx {pc}",
                sp = in(reg) target.initial_sp,
                pc = in(reg) target.entry,
                options(noreturn)
            );
        }
    }
}
