//! Launcher UI seam.
//!
//! Rendering lives outside this crate; the power core only needs these
//! three entry points.

/// Launcher UI as seen from the power core.
pub trait Ui {
    /// Index of the tab currently shown
    fn current_tab(&self) -> u16;

    /// Draw the power-off logo into the back buffer and present it
    fn draw_sleep_logo(&mut self);

    /// Blocking "insert SD card" screen
    fn storage_error_screen(&mut self);
}
