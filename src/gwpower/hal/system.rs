//! MCU Control Abstraction
//!
//! Clocks, low-power modes, the watchdog and the reset line.

/// Wake-up sources that can bring the CPU out of stop or standby.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakePin {
    /// WKUP1, the power button, active low
    PowerButton,
}

/// Core MCU services.
pub trait System {
    /// Milliseconds since boot
    fn uptime_ms(&self) -> u64;

    /// Busy-wait for the given number of milliseconds
    fn delay_ms(&mut self, ms: u32);

    /// Kick the independent watchdog
    fn refresh_watchdog(&mut self);

    /// Arm a pin so it can wake the CPU from stop or standby
    fn configure_wake_source(&mut self, pin: WakePin);

    /// Clear the latched wake-up flag
    fn clear_wake_flag(&mut self);

    /// Enter the stoppable low-power mode.
    ///
    /// Returns once a wake interrupt fires.
    fn enter_stop_mode(&mut self);

    /// Enter the deepest low-power mode.
    ///
    /// On hardware this never returns; leaving standby is a fresh boot.
    fn enter_standby_mode(&mut self);

    /// Reprogram the PLLs for the given overclock level after stop mode
    fn restore_clocks(&mut self, overclock: u8);

    /// Restart the millisecond time base
    fn resume_tick(&mut self);

    /// Ignore the power button for a short window
    fn debounce_power_button(&mut self);

    /// Battery charge in percent
    fn battery_percent(&self) -> u8;

    /// Return peripherals and clocks to their reset state
    fn deinit(&mut self);

    /// Request a system reset.
    ///
    /// On hardware this never returns.
    fn system_reset(&mut self);

    /// Wait `iterations * step_ms`, refreshing the watchdog every step
    fn delay_with_watchdog(&mut self, iterations: u32, step_ms: u32) {
        for _ in 0..iterations {
            self.refresh_watchdog();
            self.delay_ms(step_ms);
        }
    }
}

/// Reset until the hardware takes over.
///
/// Used where execution must not continue, e.g. after a standby entry that
/// returned.
pub fn reset_loop(system: &mut dyn System) -> ! {
    loop {
        system.system_reset();
        core::hint::spin_loop();
    }
}
