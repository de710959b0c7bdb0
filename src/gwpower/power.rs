//! Power Controller
//!
//! Sequences the peripherals around the CPU's low-power instructions and
//! around image handoff.
//!
//! ```text
//!            request(ENTER_SLEEP)              wake interrupt
//! Running ──────────────────────▶ EnteringSleep ──▶ Sleeping ──▶ Resuming ──▶ Running
//!    │
//!    ├── request(ENTER_STANDBY) ─▶ EnteringStandby ──▶ Standby   (next boot is cold)
//!    │
//!    └── switch_app ─────────────▶ Handoff                        (never returns)
//! ```
//!
//! The session checkpoint always commits before the first step that could be
//! followed by a power cut with no further code running.

use alloc::boxed::Box;
use bitflags::bitflags;
use log::{error, info, warn};

use crate::app::AppContext;
use crate::boot::BootHandoff;
use crate::config::{BootLayout, PowerConfig};
use crate::hal::system::reset_loop;
use crate::hal::{Peripherals, System};
use crate::session;

bitflags! {
    /// What a sleep request should do.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SleepFlags: u8 {
        /// Stop mode, resumes in place
        const ENTER_SLEEP = 1 << 0;
        /// Standby, exits through a cold boot
        const ENTER_STANDBY = 1 << 1;
        /// Fade the backlight out before going down
        const SHOW_ANIMATION = 1 << 2;
        /// Draw the logo first
        const SHOW_LOGO = 1 << 3;
        /// Hold the logo and fade slowly
        const SLOW_ANIMATION = 1 << 4;

        const ENTER_SLEEP_WITH_ANIMATION = Self::ENTER_SLEEP.bits() | Self::SHOW_ANIMATION.bits();
        /// Power-off menu entry
        const POWER_OFF = Self::ENTER_STANDBY.bits()
            | Self::SHOW_ANIMATION.bits()
            | Self::SHOW_LOGO.bits()
            | Self::SLOW_ANIMATION.bits();
    }
}

/// One sleep request, built per call.
pub struct SleepRequest<'h> {
    pub flags: SleepFlags,
    pre_wake: Option<Box<dyn FnOnce(&mut Peripherals<'_>) + 'h>>,
}

impl<'h> SleepRequest<'h> {
    pub fn new(flags: SleepFlags) -> Self {
        Self {
            flags,
            pre_wake: None,
        }
    }

    /// Run `hook` right after the display is back, before the fade-in.
    ///
    /// Meant for a quick redraw; everything else is still down.
    pub fn with_pre_wake(mut self, hook: impl FnOnce(&mut Peripherals<'_>) + 'h) -> Self {
        self.pre_wake = Some(Box::new(hook));
        self
    }
}

/// Power state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Running,
    EnteringSleep,
    Sleeping,
    Resuming,
    EnteringStandby,
    Standby,
    Handoff,
}

/// Where [`PowerController::switch_app`] sends the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppSwitch {
    /// Application image in flash bank 2, entered by a direct jump
    Launcher,
    /// Original firmware, entered through a tagged reset
    OriginalFirmware,
}

type PreSleepHook = Box<dyn FnMut(&mut Peripherals<'_>)>;

/// Drives every power transition.
pub struct PowerController {
    config: PowerConfig,
    boot: BootHandoff,
    state: PowerState,
    pre_sleep_hook: Option<PreSleepHook>,
    idle_start_ms: u64,
}

impl PowerController {
    pub fn new(config: PowerConfig, layout: BootLayout) -> Self {
        Self {
            config,
            boot: BootHandoff::new(layout),
            state: PowerState::Running,
            pre_sleep_hook: None,
            idle_start_ms: 0,
        }
    }

    pub fn state(&self) -> PowerState {
        self.state
    }

    pub fn config(&self) -> &PowerConfig {
        &self.config
    }

    pub fn boot(&self) -> &BootHandoff {
        &self.boot
    }

    /// Install a hook that runs first on every sleep request
    pub fn set_pre_sleep_hook(&mut self, hook: impl FnMut(&mut Peripherals<'_>) + 'static) {
        self.pre_sleep_hook = Some(Box::new(hook));
    }

    // =========================================================================
    // Sleep and standby
    // =========================================================================

    /// Carry out a sleep request.
    ///
    /// Returns after wake for `ENTER_SLEEP`. Never returns for
    /// `ENTER_STANDBY`. With neither flag only the checkpoint and the
    /// animation run.
    ///
    /// # Panics
    ///
    /// If both `ENTER_SLEEP` and `ENTER_STANDBY` are set.
    pub fn request(&mut self, ctx: &mut AppContext, p: &mut Peripherals<'_>, request: SleepRequest<'_>) {
        let flags = request.flags;
        assert!(
            !flags.contains(SleepFlags::ENTER_SLEEP | SleepFlags::ENTER_STANDBY),
            "sleep and standby requested together: {:?}",
            flags
        );

        self.prepare(ctx, p, flags);

        if flags.contains(SleepFlags::ENTER_STANDBY) {
            self.enter_standby(p)
        } else if flags.contains(SleepFlags::ENTER_SLEEP) {
            self.enter_sleep(ctx, p, request.pre_wake);
        } else {
            self.state = PowerState::Running;
        }
    }

    /// Sleep with the default animation
    pub fn sleep(&mut self, ctx: &mut AppContext, p: &mut Peripherals<'_>) {
        self.request(ctx, p, SleepRequest::new(SleepFlags::ENTER_SLEEP_WITH_ANIMATION));
    }

    /// Power-off menu action: logo, slow fade, standby
    pub fn power_off(&mut self, ctx: &mut AppContext, p: &mut Peripherals<'_>) -> ! {
        ctx.shutdown();
        self.prepare(ctx, p, SleepFlags::POWER_OFF);
        self.enter_standby(p)
    }

    /// Everything that must be durable or visible before the peripherals go.
    fn prepare(&mut self, ctx: &AppContext, p: &mut Peripherals<'_>, flags: SleepFlags) {
        self.state = if flags.contains(SleepFlags::ENTER_STANDBY) {
            PowerState::EnteringStandby
        } else {
            PowerState::EnteringSleep
        };

        if let Some(hook) = self.pre_sleep_hook.as_mut() {
            hook(&mut *p);
        }

        session::checkpoint(ctx, p);

        if flags.contains(SleepFlags::SHOW_ANIMATION) {
            self.sleep_transition(
                p,
                flags.contains(SleepFlags::SHOW_LOGO),
                flags.contains(SleepFlags::SLOW_ANIMATION),
            );
        }

        session::save_current_tab(p);
    }

    fn sleep_transition(&self, p: &mut Peripherals<'_>, show_logo: bool, slow: bool) {
        if show_logo {
            p.ui.draw_sleep_logo();
        }

        // Keep the logo up for more than a split second
        if slow {
            p.system
                .delay_with_watchdog(self.config.slow_hold_iterations, self.config.slow_hold_step_ms);
        }

        let step = if slow {
            self.config.slow_sleep_fade_step
        } else {
            self.config.sleep_fade_step
        };
        let level = p.display.configured_brightness();
        self.fade_backlight(p, level, 0, step);
    }

    /// Common shutdown path for stop and standby.
    fn shutdown_peripherals(&self, p: &mut Peripherals<'_>) {
        p.audio.set_speaker(false);
        p.audio.stop_playing();

        p.display.backlight_off();
        p.display.deinit();

        p.system.configure_wake_source(self.config.wake_pin);

        #[cfg(feature = "sd_card")]
        p.storage.unmount();

        // Window for a debugger to catch a device stuck in a suspend loop
        p.system
            .delay_with_watchdog(self.config.drain_iterations, self.config.drain_step_ms);
    }

    fn enter_standby(&mut self, p: &mut Peripherals<'_>) -> ! {
        self.shutdown_peripherals(p);

        // Last write before the CPU goes away
        self.boot.request_standby_resume(p);

        p.system.clear_wake_flag();
        self.state = PowerState::Standby;
        info!("[Sleep] entering standby");
        p.system.enter_standby_mode();

        error!("[Sleep] standby returned, resetting");
        reset_loop(p.system)
    }

    fn enter_sleep(
        &mut self,
        ctx: &mut AppContext,
        p: &mut Peripherals<'_>,
        pre_wake: Option<Box<dyn FnOnce(&mut Peripherals<'_>) + '_>>,
    ) {
        self.shutdown_peripherals(p);

        self.state = PowerState::Sleeping;
        info!("[Sleep] entering stop mode");
        p.system.clear_wake_flag();
        p.system.enter_stop_mode();

        self.state = PowerState::Resuming;
        p.system.refresh_watchdog();
        info!("[Sleep] waking up");

        p.system.clear_wake_flag();
        let overclock = p.settings.cpu_overclock();
        p.system.restore_clocks(overclock);
        p.system.resume_tick();
        p.system.debounce_power_button();

        p.display.backlight_off();
        p.display.reinit();

        if let Some(hook) = pre_wake {
            hook(&mut *p);
        }

        p.display.swap();

        // Short on purpose: audio and storage stay down until it is done
        let level = p.display.configured_brightness();
        self.fade_backlight(p, 0, level, self.config.resume_fade_step);

        #[cfg(feature = "sd_card")]
        self.remount_storage(p);

        let rate = p.audio.sample_rate();
        p.audio.init(rate);
        p.audio.start_playing();
        p.audio.set_speaker(true);

        self.idle_start_ms = p.system.uptime_ms();
        if let Some(handlers) = ctx.active_mut().handlers() {
            handlers.on_resume_from_sleep();
        }

        self.state = PowerState::Running;
        info!("[Sleep] finished waking up");
    }

    #[cfg(feature = "sd_card")]
    fn remount_storage(&self, p: &mut Peripherals<'_>) {
        if let Err(err) = p.storage.mount() {
            warn!("[Sleep] remount failed: {}", err);
        }
        if !p.storage.is_mounted() {
            p.ui.storage_error_screen();
        }

        // Checked here rather than at boot to keep the usual resume short
        if p.storage.stat(self.config.update_archive_path).exists {
            warn!("[Sleep] update archive found, resetting into the updater");
            p.storage.unmount();
            reset_loop(p.system);
        }
    }

    /// Ramp the backlight from `initial` to `target`.
    ///
    /// Levels below the minimum visible brightness are skipped: a ramp
    /// starts or stops there, and ending at or below it switches the
    /// backlight off.
    pub fn fade_backlight(&self, p: &mut Peripherals<'_>, initial: u8, target: u8, step: u8) {
        let min = self.config.min_brightness as i32;
        let step = step.max(1) as i32;
        let mut current = initial as i32;
        let mut target = target as i32;

        if target > current && current < min {
            current = min;
        } else if current > target && target < min {
            target = min;
        }

        p.display.backlight_set(current as u8);
        let falling = current > target;
        loop {
            if falling {
                current -= step;
                if current <= target {
                    current = target;
                    break;
                }
            } else {
                current += step;
                if current >= target {
                    current = target;
                    break;
                }
            }

            p.display.backlight_set(current as u8);
            p.system.refresh_watchdog();
            p.system.delay_ms(self.config.fade_step_delay_ms);
        }

        p.system.refresh_watchdog();
        if current <= min {
            p.display.backlight_off();
        } else {
            p.display.backlight_set(current as u8);
        }
    }

    // =========================================================================
    // Frame-loop events
    // =========================================================================

    /// Power button pressed. With a d-pad direction held, leave for the
    /// launcher image instead of sleeping.
    pub fn on_power_button(&mut self, ctx: &mut AppContext, p: &mut Peripherals<'_>, dpad_held: bool) {
        if dpad_held {
            self.switch_app(ctx, p, AppSwitch::Launcher)
        }
        self.sleep(ctx, p);
    }

    pub fn reset_idle_timer(&mut self, system: &dyn System) {
        self.idle_start_ms = system.uptime_ms();
    }

    /// Track inactivity; sleeps once the configured timeout has passed.
    ///
    /// Returns true if the device slept (and has woken up again).
    pub fn poll_idle(&mut self, ctx: &mut AppContext, p: &mut Peripherals<'_>, input_active: bool) -> bool {
        let now = p.system.uptime_ms();
        if input_active {
            self.idle_start_ms = now;
            return false;
        }

        let timeout_s = p.settings.idle_timeout_s();
        if timeout_s == 0 {
            return false;
        }

        let idle_s = now.saturating_sub(self.idle_start_ms) / 1000;
        if idle_s <= timeout_s as u64 {
            return false;
        }

        info!("[Sleep] idle timeout expired after {} s", idle_s);
        self.sleep(ctx, p);
        true
    }

    // =========================================================================
    // Image handoff
    // =========================================================================

    /// Wipe the settings and the external flash store, then restart into
    /// the launcher.
    pub fn factory_reset(&mut self, ctx: &mut AppContext, p: &mut Peripherals<'_>) -> ! {
        warn!("[System] resetting settings");
        p.settings.reset();
        p.settings.commit();

        #[cfg(feature = "sd_card")]
        p.flash_alloc.reset();

        self.switch_app(ctx, p, AppSwitch::Launcher)
    }

    /// Leave this image for good.
    pub fn switch_app(&mut self, _ctx: &mut AppContext, p: &mut Peripherals<'_>, target: AppSwitch) -> ! {
        info!("[System] switching to {:?}", target);
        self.state = PowerState::Handoff;

        match target {
            AppSwitch::Launcher => {
                session::clear_startup_file(p);

                #[cfg(feature = "sd_card")]
                if p.storage.is_mounted() {
                    p.storage.unmount();
                }

                self.boot.request_emulator_resume(p);

                let level = p.display.configured_brightness();
                self.fade_backlight(p, level, 0, self.config.handoff_fade_step);

                p.system.deinit();

                let base = self.boot.layout().bank2_base;
                self.boot.handoff_to_image(p, base)
            }
            AppSwitch::OriginalFirmware => {
                self.boot.request_original_firmware_boot(p);

                let vector_table = self.boot.layout().intflash_base;
                self.boot.reboot_to_address(p, vector_table)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot::{BootMagic, MagicStore, VectorTable};
    use crate::hal::{Platform, WakePin};
    use crate::platform::sim::{
        expect_halt, Halt, ScriptedCore, SettingsValues, SimBoard, SimEvent,
    };
    use alloc::vec;
    use pretty_assertions::assert_eq;

    const MARIO: &str = "/roms/nes/mario.nes";

    fn controller() -> PowerController {
        PowerController::new(PowerConfig::default(), BootLayout::default())
    }

    fn mario() -> AppContext {
        let mut ctx = AppContext::new();
        ctx.set_rom(Some(MARIO));
        ctx
    }

    /// `expected` must appear in `events` in this order, other events may
    /// sit in between.
    fn assert_in_order(events: &[SimEvent], expected: &[SimEvent]) {
        let mut rest = events.iter();
        for want in expected {
            assert!(rest.any(|e| e == want), "{:?} missing or out of order in {:?}", want, events);
        }
    }

    #[cfg(feature = "sd_card")]
    #[test]
    fn test_sleep_and_resume_sequence() {
        let mut board = SimBoard::new();
        board.settings.seed(|v| v.cpu_overclock = 2);
        let log = board.log().clone();
        let mut power = controller();
        let mut ctx = mario();
        let (handlers, core_log) = ScriptedCore::default().boxed();
        ctx.activate(handlers);

        let request = SleepRequest::new(SleepFlags::ENTER_SLEEP_WITH_ANIMATION)
            .with_pre_wake(move |_| log.record(SimEvent::Hook("pre-wake")));
        power.request(&mut ctx, &mut board.peripherals(), request);

        assert_in_order(
            &board.events(),
            &[
                SimEvent::SettingsCommit,
                SimEvent::Speaker(false),
                SimEvent::AudioStop,
                SimEvent::BacklightOff,
                SimEvent::DisplayDeinit,
                SimEvent::WakeSourceArmed(WakePin::PowerButton),
                SimEvent::Unmounted,
                SimEvent::WakeFlagCleared,
                SimEvent::StopModeEntered,
                SimEvent::WakeFlagCleared,
                SimEvent::ClocksRestored(2),
                SimEvent::TickResumed,
                SimEvent::PowerButtonDebounced,
                SimEvent::BacklightOff,
                SimEvent::DisplayReinit,
                SimEvent::Hook("pre-wake"),
                SimEvent::Swap,
                SimEvent::Backlight(200),
                SimEvent::Mounted,
                SimEvent::AudioInit(32_000),
                SimEvent::AudioStart,
                SimEvent::Speaker(true),
            ],
        );

        assert_eq!(power.state(), PowerState::Running);
        assert_eq!(core_log.borrow().resumes, 1);
        assert_eq!(board.display.backlight, 200);
        assert!(board.audio.playing);
        assert!(board.audio.speaker);
        assert!(board.system.watchdog_refreshes >= 10);
    }

    #[test]
    fn test_sleep_checkpoints_session_first() {
        let mut board = SimBoard::new();
        board.ui.tab = 3;
        let mut power = controller();
        let mut ctx = mario();

        power.sleep(&mut ctx, &mut board.peripherals());

        let commit = board.log().position(&SimEvent::SettingsCommit).unwrap();
        let speaker = board.log().position(&SimEvent::Speaker(false)).unwrap();
        assert!(commit < speaker);
        assert_eq!(board.settings.durable().startup_file.as_deref(), Some(MARIO));
        assert_eq!(board.settings.durable().selected_tab, 3);
    }

    #[test]
    fn test_power_cut_after_standby_magic_keeps_checkpoint() {
        let mut board = SimBoard::new();
        board.ui.tab = 3;
        board.cut_power_after(SimEvent::MagicWritten(BootMagic::Standby));
        let mut power = controller();
        let mut ctx = mario();

        let halt = expect_halt(|| {
            power.request(
                &mut ctx,
                &mut board.peripherals(),
                SleepRequest::new(SleepFlags::ENTER_STANDBY),
            )
        });

        assert_eq!(halt, Halt::PowerLoss);
        assert!(!board.log().contains(&SimEvent::StandbyEntered));

        board.power_loss();
        let target = session::restore(&board.settings);
        assert_eq!(target.rom_path.as_deref(), Some(MARIO));
        assert_eq!(target.tab, 3);
    }

    #[test]
    fn test_standby_does_not_return() {
        let mut board = SimBoard::new();
        let mut power = controller();
        let mut ctx = mario();

        let halt = expect_halt(|| {
            power.request(
                &mut ctx,
                &mut board.peripherals(),
                SleepRequest::new(SleepFlags::ENTER_STANDBY),
            )
        });

        assert_eq!(halt, Halt::Standby);
        assert_eq!(power.state(), PowerState::Standby);
        assert_eq!(board.magic.get(), BootMagic::Standby);

        let magic = board.log().position(&SimEvent::MagicWritten(BootMagic::Standby)).unwrap();
        let standby = board.log().position(&SimEvent::StandbyEntered).unwrap();
        assert!(magic < standby);
    }

    #[test]
    fn test_power_off_shuts_down_core() {
        let mut board = SimBoard::new();
        let mut power = controller();
        let mut ctx = mario();
        let (handlers, core_log) = ScriptedCore::default().boxed();
        ctx.activate(handlers);

        let halt = expect_halt(|| power.power_off(&mut ctx, &mut board.peripherals()));

        assert_eq!(halt, Halt::Standby);
        assert_eq!(core_log.borrow().shutdowns, 1);
        assert_eq!(board.settings.durable().startup_file.as_deref(), Some(MARIO));
    }

    #[test]
    fn test_returning_standby_resets() {
        let mut board = SimBoard::new();
        board.system.standby_returns = true;
        let mut power = controller();
        let mut ctx = mario();

        let halt = expect_halt(|| power.power_off(&mut ctx, &mut board.peripherals()));

        assert_eq!(halt, Halt::Reset);
        assert_in_order(&board.events(), &[SimEvent::StandbyEntered, SimEvent::Reset]);
    }

    #[test]
    fn test_power_off_shows_logo_before_shutdown() {
        let mut board = SimBoard::new();
        let mut power = controller();
        let mut ctx = mario();

        let halt = expect_halt(|| power.power_off(&mut ctx, &mut board.peripherals()));

        assert_eq!(halt, Halt::Standby);
        assert_in_order(
            &board.events(),
            &[
                SimEvent::SettingsCommit,
                SimEvent::SleepLogo,
                SimEvent::BacklightOff,
                SimEvent::Speaker(false),
                SimEvent::MagicWritten(BootMagic::Standby),
                SimEvent::StandbyEntered,
            ],
        );
    }

    #[test]
    #[should_panic(expected = "sleep and standby requested together")]
    fn test_contradictory_flags_are_fatal() {
        let mut board = SimBoard::new();
        let mut power = controller();
        let mut ctx = mario();

        power.request(
            &mut ctx,
            &mut board.peripherals(),
            SleepRequest::new(SleepFlags::ENTER_SLEEP | SleepFlags::ENTER_STANDBY),
        );
    }

    #[test]
    fn test_pre_sleep_hook_runs_before_checkpoint() {
        let mut board = SimBoard::new();
        let log = board.log().clone();
        let mut power = controller();
        power.set_pre_sleep_hook(move |_| log.record(SimEvent::Hook("pre-sleep")));
        let mut ctx = mario();

        power.sleep(&mut ctx, &mut board.peripherals());

        assert_in_order(
            &board.events(),
            &[SimEvent::Hook("pre-sleep"), SimEvent::SettingsCommit, SimEvent::StopModeEntered],
        );
    }

    #[test]
    fn test_checkpoint_only_request_returns_running() {
        let mut board = SimBoard::new();
        let mut power = controller();
        let mut ctx = mario();

        power.request(&mut ctx, &mut board.peripherals(), SleepRequest::new(SleepFlags::empty()));

        assert_eq!(power.state(), PowerState::Running);
        assert!(!board.log().contains(&SimEvent::StopModeEntered));
        assert_eq!(board.settings.durable().startup_file.as_deref(), Some(MARIO));
    }

    #[cfg(feature = "sd_card")]
    #[test]
    fn test_update_archive_forces_reset_on_resume() {
        let mut board = SimBoard::new();
        board.storage.seed("/retro-go_update.bin", &[0x55; 4], 1);
        let mut power = controller();
        let mut ctx = mario();

        let halt = expect_halt(|| power.sleep(&mut ctx, &mut board.peripherals()));

        assert_eq!(halt, Halt::Reset);
        assert_in_order(
            &board.events(),
            &[SimEvent::StopModeEntered, SimEvent::Mounted, SimEvent::Unmounted, SimEvent::Reset],
        );
        assert!(!board.log().contains(&SimEvent::AudioStart));
    }

    #[cfg(feature = "sd_card")]
    #[test]
    fn test_mount_failure_shows_error_screen() {
        let mut board = SimBoard::new();
        board.storage.fail_mount = true;
        let mut power = controller();
        let mut ctx = mario();

        power.sleep(&mut ctx, &mut board.peripherals());

        assert_in_order(
            &board.events(),
            &[SimEvent::StopModeEntered, SimEvent::StorageErrorScreen, SimEvent::AudioStart],
        );
        assert_eq!(power.state(), PowerState::Running);
    }

    #[test]
    fn test_idle_timeout() {
        let mut board = SimBoard::new();
        board.settings.seed(|v| v.idle_timeout_s = 60);
        let mut power = controller();
        let mut ctx = mario();
        power.reset_idle_timer(&board.system);

        board.system.advance(30_000);
        assert!(!power.poll_idle(&mut ctx, &mut board.peripherals(), false));
        assert!(!power.poll_idle(&mut ctx, &mut board.peripherals(), true));

        board.system.advance(60_000);
        assert!(!power.poll_idle(&mut ctx, &mut board.peripherals(), false));
        assert!(!board.log().contains(&SimEvent::StopModeEntered));

        board.system.advance(1_000);
        assert!(power.poll_idle(&mut ctx, &mut board.peripherals(), false));
        assert!(board.log().contains(&SimEvent::StopModeEntered));

        // Waking restarts the idle clock
        assert!(!power.poll_idle(&mut ctx, &mut board.peripherals(), false));
    }

    #[test]
    fn test_idle_timeout_disabled() {
        let mut board = SimBoard::new();
        let mut power = controller();
        let mut ctx = mario();

        board.system.advance(10_000_000);
        assert!(!power.poll_idle(&mut ctx, &mut board.peripherals(), false));
    }

    #[test]
    fn test_fade_skips_invisible_levels() {
        let mut board = SimBoard::new();
        let power = controller();

        power.fade_backlight(&mut board.peripherals(), 0, 200, 50);
        assert_eq!(
            board.events(),
            [SimEvent::Backlight(120), SimEvent::Backlight(170), SimEvent::Backlight(200)]
        );

        board.log().clear();
        power.fade_backlight(&mut board.peripherals(), 200, 0, 50);
        assert_eq!(
            board.events(),
            [SimEvent::Backlight(200), SimEvent::Backlight(150), SimEvent::BacklightOff]
        );
    }

    #[test]
    fn test_launcher_switch_jumps_to_bank2() {
        let mut board = SimBoard::new();
        let layout = BootLayout::default();
        board.handoff.install_image(layout.bank2_base, 0x2402_0000, 0x0810_0199);
        board.settings.seed(|v| v.startup_file = Some(MARIO.into()));
        let mut power = controller();
        let mut ctx = mario();

        let halt = expect_halt(|| power.switch_app(&mut ctx, &mut board.peripherals(), AppSwitch::Launcher));

        assert_eq!(
            halt,
            Halt::Jumped(VectorTable { initial_sp: 0x2402_0000, entry: 0x0810_0199 })
        );
        assert_eq!(power.state(), PowerState::Handoff);
        assert_eq!(board.settings.durable().startup_file, None);
        assert_eq!(board.magic.get(), BootMagic::EmulatorResume);
        assert_in_order(
            &board.events(),
            &[
                SimEvent::SettingsCommit,
                SimEvent::MagicWritten(BootMagic::EmulatorResume),
                SimEvent::BacklightOff,
                SimEvent::SystemDeinit,
                SimEvent::MpuDisabled,
                SimEvent::CachesInvalidated,
            ],
        );
    }

    #[test]
    fn test_factory_reset_wipes_before_handoff() {
        let mut board = SimBoard::new();
        let layout = BootLayout::default();
        board.handoff.install_image(layout.bank2_base, 0x2402_0000, 0x0810_0199);
        board.settings.seed(|v| {
            v.startup_file = Some(MARIO.into());
            v.selected_tab = 3;
            v.cpu_overclock = 2;
        });
        board.flash_alloc.cached.insert(MARIO.into());
        let mut power = controller();
        let mut ctx = mario();

        let halt = expect_halt(|| power.factory_reset(&mut ctx, &mut board.peripherals()));

        assert!(matches!(halt, Halt::Jumped(_)));
        assert_eq!(board.settings.durable(), &SettingsValues::default());

        let mut expected = vec![SimEvent::SettingsReset, SimEvent::SettingsCommit];
        #[cfg(feature = "sd_card")]
        expected.push(SimEvent::FlashAllocReset);
        expected.extend([
            SimEvent::MagicWritten(BootMagic::EmulatorResume),
            SimEvent::SystemDeinit,
            SimEvent::Jumped(VectorTable { initial_sp: 0x2402_0000, entry: 0x0810_0199 }),
        ]);
        assert_in_order(&board.events(), &expected);

        #[cfg(feature = "sd_card")]
        assert!(board.flash_alloc.cached.is_empty());
    }

    #[test]
    fn test_original_firmware_switch_reboots() {
        let mut board = SimBoard::new();
        let layout = BootLayout::default();
        let mut power = controller();
        let mut ctx = mario();

        let halt = expect_halt(|| {
            power.switch_app(&mut ctx, &mut board.peripherals(), AppSwitch::OriginalFirmware)
        });

        assert_eq!(halt, Halt::Reset);
        assert_eq!(board.backup.get(), BootMagic::OriginalFirmware);
        assert_eq!(board.handoff.word(layout.reboot_tag_addr), Some(layout.reboot_tag));
        assert_eq!(board.handoff.word(layout.reboot_vtor_addr), Some(layout.intflash_base));
    }

    #[test]
    fn test_power_button() {
        let mut board = SimBoard::new();
        let mut power = controller();
        let mut ctx = mario();

        power.on_power_button(&mut ctx, &mut board.peripherals(), false);
        assert!(board.log().contains(&SimEvent::StopModeEntered));
        assert_eq!(power.state(), PowerState::Running);

        let halt = expect_halt(|| power.on_power_button(&mut ctx, &mut board.peripherals(), true));
        assert!(matches!(halt, Halt::Jumped(_)));
    }
}
