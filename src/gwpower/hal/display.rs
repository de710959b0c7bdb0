//! LCD and backlight abstraction.

/// LCD controller plus backlight.
pub trait Display {
    /// Bring the LCD up from reset
    fn init(&mut self);

    /// Power the panel down
    fn deinit(&mut self);

    /// Re-initialize after stop mode, restoring the last refresh rate
    fn reinit(&mut self);

    /// Present the back buffer
    fn swap(&mut self);

    /// Block until the next vertical blank
    fn wait_for_vblank(&mut self);

    /// Framebuffer that is not currently being scanned out
    fn inactive_framebuffer(&self) -> &[u8];

    /// Switch the backlight off
    fn backlight_off(&mut self);

    /// Set the raw backlight level
    fn backlight_set(&mut self, level: u8);

    /// Raw backlight level chosen by the user
    fn configured_brightness(&self) -> u8;
}
