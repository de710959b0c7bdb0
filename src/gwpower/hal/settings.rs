//! Settings store abstraction.
//!
//! Typed accessors over the persistent key-value store. Setters only stage
//! a value; nothing is durable until [`Settings::commit`].

use alloc::string::String;

/// Persistent user settings
pub trait Settings {
    /// Load the store from flash, falling back to defaults
    fn load(&mut self);

    /// ROM that should be resumed on the next boot
    fn startup_file(&self) -> Option<String>;

    fn set_startup_file(&mut self, path: Option<&str>);

    /// Launcher tab shown on the next boot
    fn selected_tab(&self) -> u16;

    fn set_selected_tab(&mut self, tab: u16);

    /// CPU overclock level (0 = stock)
    fn cpu_overclock(&self) -> u8;

    fn set_cpu_overclock(&mut self, level: u8);

    /// Seconds of inactivity before the device sleeps (0 = never)
    fn idle_timeout_s(&self) -> u32;

    fn set_idle_timeout_s(&mut self, seconds: u32);

    /// Stage factory defaults for every value
    fn reset(&mut self);

    /// Persist every staged value
    fn commit(&mut self);
}
