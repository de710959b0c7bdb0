//! Application Runtime Context
//!
//! The single active application (launcher or emulator core), the state
//! handlers it installed, and the frame counters behind the FPS overlay.
//! One [`AppContext`] exists per firmware image and is passed by reference
//! to every operation that needs it.

use alloc::boxed::Box;
use alloc::string::{String, ToString};
use log::{debug, info};

use crate::hal::{Peripherals, Storage, System};

/// Application id of the launcher
pub const APP_LAUNCHER: u32 = 0;

/// Capabilities an emulator core installs when it starts.
///
/// Installing a core means providing all of them at once; there is no way to
/// install a partial set.
pub trait StateHandlers {
    /// Restore a state file. `None` means "resume from the core's own
    /// backing" (battery RAM) without any state file.
    fn load_state(&mut self, storage: &mut dyn Storage, path: Option<&str>) -> bool;

    /// Write a state file
    fn save_state(&mut self, storage: &mut dyn Storage, path: &str) -> bool;

    /// Clean framebuffer for slot previews, if the core can produce one
    fn screenshot(&mut self) -> Option<&[u8]> {
        None
    }

    /// Tear down before the firmware leaves the core
    fn shutdown(&mut self);

    /// Called once the device is fully awake again
    fn on_resume_from_sleep(&mut self);
}

/// The active session.
pub struct AppDescriptor {
    /// Application / emulator identity
    pub id: u32,
    /// ROM the session is built around, mirrored from the startup-file setting
    pub rom_path: Option<String>,
    /// Content fingerprint; not computed yet and always zero
    pub game_id: u32,
    handlers: Option<Box<dyn StateHandlers>>,
}

impl AppDescriptor {
    const fn empty() -> Self {
        Self {
            id: APP_LAUNCHER,
            rom_path: None,
            game_id: 0,
            handlers: None,
        }
    }

    /// Installed handlers, if a core is active
    pub fn handlers(&mut self) -> Option<&mut (dyn StateHandlers + 'static)> {
        self.handlers.as_deref_mut()
    }

    pub fn has_handlers(&self) -> bool {
        self.handlers.is_some()
    }
}

/// Monotonic counters since the last stats reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeCounters {
    pub total_frames: u32,
    pub full_frames: u32,
    pub skipped_frames: u32,
    pub busy_time_ms: u64,
    pub reset_time_ms: u64,
}

/// Rates derived from [`RuntimeCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stats {
    pub total_frames: u32,
    pub full_frames: u32,
    pub skipped_frames: u32,
    pub busy_percent: f32,
    pub total_fps: f32,
    pub skipped_fps: f32,
    pub battery: u8,
    pub last_tick_ms: u64,
}

/// Process-wide runtime state.
pub struct AppContext {
    app: AppDescriptor,
    counters: RuntimeCounters,
    /// The first sample after a reset is not counted as busy time
    skip_next_sample: bool,
    last_tick_ms: u64,
}

impl AppContext {
    pub const fn new() -> Self {
        Self {
            app: AppDescriptor::empty(),
            counters: RuntimeCounters {
                total_frames: 0,
                full_frames: 0,
                skipped_frames: 0,
                busy_time_ms: 0,
                reset_time_ms: 0,
            },
            skip_next_sample: false,
            last_tick_ms: 0,
        }
    }

    /// (Re)initialize settings, audio and display for an application and
    /// restart the stats clock.
    pub fn init(&mut self, app_id: u32, sample_rate: u32, p: &mut Peripherals<'_>) {
        self.app.id = app_id;

        p.settings.load();
        self.app.rom_path = p.settings.startup_file();
        p.audio.init(sample_rate);
        p.display.init();

        self.counters.reset_time_ms = p.system.uptime_ms();

        info!("[System] app {} ready, rom={:?}", app_id, self.app.rom_path);
    }

    /// Install a core's handlers, replacing whatever was installed before
    pub fn activate(&mut self, handlers: Box<dyn StateHandlers>) {
        self.app.game_id = 0;
        self.app.handlers = Some(handlers);

        info!("[System] emulator handlers installed, game_id={:08X}", self.app.game_id);
    }

    /// Drop the installed handlers (back to the launcher)
    pub fn deactivate(&mut self) {
        self.app.handlers = None;
    }

    /// Select the ROM for the session
    pub fn set_rom(&mut self, rom_path: Option<&str>) {
        self.app.rom_path = rom_path.map(|p| p.to_string());
    }

    pub fn active(&self) -> &AppDescriptor {
        &self.app
    }

    pub fn active_mut(&mut self) -> &mut AppDescriptor {
        &mut self.app
    }

    /// Forward a shutdown request to the active core
    pub fn shutdown(&mut self) {
        if let Some(handlers) = self.app.handlers() {
            handlers.shutdown();
        }
    }

    /// Account one emulated frame
    pub fn tick(&mut self, skipped: bool, full: bool, busy_ms: u64, system: &dyn System) {
        if skipped {
            self.counters.skipped_frames += 1;
        } else if full {
            self.counters.full_frames += 1;
        }
        self.counters.total_frames += 1;

        // The core's notion of time is off right after a reset
        if self.skip_next_sample {
            self.skip_next_sample = false;
        } else {
            self.counters.busy_time_ms += busy_ms;
        }

        self.last_tick_ms = system.uptime_ms();
    }

    pub fn counters(&self) -> RuntimeCounters {
        self.counters
    }

    /// Compute rates since the last reset, then optionally reset
    pub fn stats(&mut self, reset_after: bool, system: &dyn System) -> Stats {
        let now = system.uptime_ms();
        let elapsed_ms = now.saturating_sub(self.counters.reset_time_ms);

        let (busy_percent, total_fps, skipped_fps) = if elapsed_ms == 0 {
            (0.0, 0.0, 0.0)
        } else {
            let elapsed = elapsed_ms as f32;
            let seconds = elapsed / 1000.0;
            (
                self.counters.busy_time_ms as f32 / elapsed * 100.0,
                self.counters.total_frames as f32 / seconds,
                self.counters.skipped_frames as f32 / seconds,
            )
        };

        let stats = Stats {
            total_frames: self.counters.total_frames,
            full_frames: self.counters.full_frames,
            skipped_frames: self.counters.skipped_frames,
            busy_percent,
            total_fps,
            skipped_fps,
            battery: system.battery_percent(),
            last_tick_ms: self.last_tick_ms,
        };

        if reset_after {
            debug!("[System] stats reset after {} ms", elapsed_ms);
            self.counters = RuntimeCounters {
                reset_time_ms: now,
                ..RuntimeCounters::default()
            };
            self.skip_next_sample = true;
        }

        stats
    }
}
