//! Session Persistence
//!
//! Records what to resume (ROM, launcher tab, overclock) in the settings
//! store. [`checkpoint`] is the durability barrier every irreversible power
//! transition waits on; [`plan_startup`] reads the same values back on the
//! next boot.

use alloc::string::String;
use log::info;

use crate::app::AppContext;
use crate::boot::BootMode;
use crate::hal::{Peripherals, Settings};

/// Persist the active ROM and the current tab, then commit.
pub fn checkpoint(ctx: &AppContext, p: &mut Peripherals<'_>) {
    let rom = ctx.active().rom_path.as_deref();
    let tab = p.ui.current_tab();

    p.settings.set_startup_file(rom);
    p.settings.set_selected_tab(tab);
    p.settings.commit();

    info!("[Session] checkpoint rom={:?} tab={}", rom, tab);
}

/// Persist only the tab the launcher is showing
pub fn save_current_tab(p: &mut Peripherals<'_>) {
    let tab = p.ui.current_tab();
    p.settings.set_selected_tab(tab);
    p.settings.commit();
}

/// Forget the ROM so the next boot lands in the launcher
pub fn clear_startup_file(p: &mut Peripherals<'_>) {
    p.settings.set_startup_file(None);
    p.settings.commit();
}

/// Session values as persisted by the last checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeTarget {
    pub rom_path: Option<String>,
    pub tab: u16,
    pub overclock: u8,
}

/// Read the persisted session back.
pub fn restore(settings: &dyn Settings) -> ResumeTarget {
    ResumeTarget {
        rom_path: settings.startup_file().filter(|path| !path.is_empty()),
        tab: settings.selected_tab(),
        overclock: settings.cpu_overclock(),
    }
}

/// What the firmware should do after boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupPlan {
    pub mode: BootMode,
    /// Coming back from an emulator: show the logo and fade it in
    pub fade_in_logo: bool,
    /// Full splash sequence before the launcher
    pub show_splash: bool,
    /// ROM to start directly, skipping the launcher
    pub resume_rom: Option<String>,
    /// Launcher tab to open
    pub tab: u16,
    /// Overclock level to apply once boot is done
    pub overclock: u8,
}

/// Decide the startup path.
///
/// Holding TIME during boot is the escape hatch into the launcher when the
/// persisted ROM keeps crashing.
pub fn plan_startup(mode: BootMode, settings: &dyn Settings, time_button_held: bool) -> StartupPlan {
    let target = restore(settings);
    let resume_rom = target.rom_path.filter(|_| !time_button_held);
    let show_splash = resume_rom.is_none() && mode == BootMode::Cold;

    StartupPlan {
        mode,
        fade_in_logo: mode == BootMode::Hot,
        show_splash,
        resume_rom,
        tab: target.tab,
        overclock: target.overclock,
    }
}
