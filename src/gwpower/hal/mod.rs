//! Hardware Abstraction Layer
//!
//! Narrow traits for everything the power core touches: the MCU itself,
//! the LCD, the audio path, the SD card, the settings store, the external
//! flash store and the launcher UI. Board support code implements them on
//! the Cortex-M7 (with the retention words and handoff from
//! `platform::stm32h7`); the host tests use [`crate::platform::sim`].

pub mod audio;
pub mod display;
pub mod flash_alloc;
pub mod settings;
pub mod storage;
pub mod system;
pub mod ui;

pub use audio::Audio;
pub use display::Display;
pub use flash_alloc::FlashAlloc;
pub use settings::Settings;
pub use storage::{FileStat, Storage};
pub use system::{System, WakePin};
pub use ui::Ui;

use crate::boot::{ImageHandoff, MagicStore};

/// Borrowed view of every device, handed to each operation.
///
/// Fields are split borrows so a sequence can drive the display and the
/// storage in the same statement.
pub struct Peripherals<'a> {
    pub system: &'a mut dyn System,
    pub display: &'a mut dyn Display,
    pub audio: &'a mut dyn Audio,
    pub storage: &'a mut dyn Storage,
    pub settings: &'a mut dyn Settings,
    pub ui: &'a mut dyn Ui,
    pub flash_alloc: &'a mut dyn FlashAlloc,
    /// RAM word that survives a warm reset
    pub magic: &'a mut dyn MagicStore,
    /// Backup-domain register read by the original firmware's bootloader
    pub backup: &'a mut dyn MagicStore,
    pub handoff: &'a mut dyn ImageHandoff,
}

/// Board initialization trait
pub trait Platform {
    /// Split the board into per-device borrows
    fn peripherals(&mut self) -> Peripherals<'_>;
}
