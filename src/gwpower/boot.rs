//! Boot Handoff Protocol
//!
//! Two things survive a warm reset on this board: a word at a fixed RAM
//! address (the boot magic) and the RTC backup registers. Whatever is in the
//! boot magic at cold start picks the resume path, so it is always the last
//! durable write before a path that does not return.
//!
//! Leaving the image is done either by jumping straight into another image's
//! vector table, or by leaving a marker in low RAM and resetting so the
//! bootloader can pick the target.

use log::{error, info, warn};

use crate::config::BootLayout;
use crate::hal::system::reset_loop;
use crate::hal::Peripherals;

/// Resume intent left for the next boot stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootMagic {
    /// Nothing to resume; also what an undefined value decodes to
    None,
    /// Device went to standby
    Standby,
    /// Boot straight back into the emulator image
    EmulatorResume,
    /// Next reset should land in the original firmware
    OriginalFirmware,
}

impl BootMagic {
    const RAW_STANDBY: u32 = 0x5354_4E42;
    const RAW_EMULATOR: u32 = 0x454D_554C;
    const RAW_OFW: u32 = 0x4F46_5721;

    /// Encoded value written to the retention domain
    pub const fn raw(self) -> u32 {
        match self {
            BootMagic::None => 0,
            BootMagic::Standby => Self::RAW_STANDBY,
            BootMagic::EmulatorResume => Self::RAW_EMULATOR,
            BootMagic::OriginalFirmware => Self::RAW_OFW,
        }
    }

    /// Decode a retained word; garbage after a power cycle reads as `None`
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            Self::RAW_STANDBY => BootMagic::Standby,
            Self::RAW_EMULATOR => BootMagic::EmulatorResume,
            Self::RAW_OFW => BootMagic::OriginalFirmware,
            _ => BootMagic::None,
        }
    }
}

/// A word that keeps its value across a warm reset.
pub trait MagicStore {
    fn read_raw(&self) -> u32;

    fn write_raw(&mut self, value: u32);

    fn get(&self) -> BootMagic {
        BootMagic::from_raw(self.read_raw())
    }

    fn set(&mut self, magic: BootMagic) {
        self.write_raw(magic.raw());
    }

    fn clear(&mut self) {
        self.write_raw(0);
    }
}

/// First two words of a Cortex-M vector table.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorTable {
    /// Initial main stack pointer
    pub initial_sp: u32,
    /// Reset handler
    pub entry: u32,
}

/// Low-level control transfer primitives.
pub trait ImageHandoff {
    /// Read the stack pointer and entry point at an image base
    fn read_vector_table(&self, base: u32) -> VectorTable;

    /// Turn off any active MPU regions
    fn disable_mpu(&mut self);

    /// Invalidate instruction and data caches
    fn invalidate_caches(&mut self);

    /// Store a word at an absolute RAM address
    fn write_word(&mut self, addr: u32, value: u32);

    /// Load the stack pointer and branch to the entry point.
    ///
    /// Never returns on hardware.
    fn jump(&mut self, target: VectorTable);
}

/// How the current boot was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootMode {
    /// Power-on or standby wake
    Cold,
    /// Soft reset within the same image
    Warm,
    /// Resumed directly into an emulator, skipping the menu
    Hot,
}

impl BootMode {
    /// Boot mode implied by the magic found at startup
    pub const fn from_magic(magic: BootMagic) -> Self {
        match magic {
            BootMagic::EmulatorResume => BootMode::Hot,
            BootMagic::OriginalFirmware => BootMode::Warm,
            BootMagic::None | BootMagic::Standby => BootMode::Cold,
        }
    }
}

/// Decides when and how the retention words and image transfers are used.
#[derive(Debug, Clone, Copy)]
pub struct BootHandoff {
    layout: BootLayout,
}

impl BootHandoff {
    pub const fn new(layout: BootLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &BootLayout {
        &self.layout
    }

    pub fn request_standby_resume(&self, p: &mut Peripherals<'_>) {
        p.magic.set(BootMagic::Standby);
    }

    pub fn request_emulator_resume(&self, p: &mut Peripherals<'_>) {
        p.magic.set(BootMagic::EmulatorResume);
    }

    /// Tell the original firmware's bootloader to stay there on next reset.
    ///
    /// Uses the backup register, which survives the standby path too.
    pub fn request_original_firmware_boot(&self, p: &mut Peripherals<'_>) {
        p.backup.set(BootMagic::OriginalFirmware);
    }

    /// Read and clear the magic left by the previous image.
    ///
    /// The RAM word wins. An original-firmware request still sitting in the
    /// backup register means the reset came back to this image instead.
    pub fn take_boot_mode(&self, p: &mut Peripherals<'_>) -> BootMode {
        let mut magic = p.magic.get();
        p.magic.clear();
        if magic == BootMagic::None && p.backup.get() == BootMagic::OriginalFirmware {
            p.backup.clear();
            magic = BootMagic::OriginalFirmware;
        }
        let mode = BootMode::from_magic(magic);
        info!("[Boot] magic {:?} -> {:?} boot", magic, mode);
        mode
    }

    /// Jump into the image whose vector table sits at `base`.
    pub fn handoff_to_image(&self, p: &mut Peripherals<'_>, base: u32) -> ! {
        let target = p.handoff.read_vector_table(base);
        info!(
            "[Boot] handoff to {:#010x}: sp={:#010x} pc={:#010x}",
            base, target.initial_sp, target.entry
        );

        p.handoff.disable_mpu();
        p.handoff.invalidate_caches();
        p.handoff.jump(target);

        error!("[Boot] handoff to {:#010x} returned, resetting", base);
        reset_loop(p.system)
    }

    /// Leave a marker for the bootloader and reset into `vector_table`.
    pub fn reboot_to_address(&self, p: &mut Peripherals<'_>, vector_table: u32) -> ! {
        warn!("[Boot] rebooting to vector table {:#010x}", vector_table);

        p.handoff.write_word(self.layout.reboot_tag_addr, self.layout.reboot_tag);
        p.handoff.write_word(self.layout.reboot_vtor_addr, vector_table);

        reset_loop(p.system)
    }
}
