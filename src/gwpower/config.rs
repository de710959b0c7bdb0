//! Board constants and transition timing.
//!
//! Anything the user can change at runtime (idle timeout, overclock, tab)
//! lives in the settings store instead.

use crate::hal::WakePin;

/// Timing and policy for sleep, resume and handoff sequences.
#[derive(Debug, Clone, Copy)]
pub struct PowerConfig {
    /// Number of watchdog-refreshed waits before the CPU is stopped
    pub drain_iterations: u32,
    /// Length of each drain wait in milliseconds
    pub drain_step_ms: u32,
    /// Delay between backlight ramp steps in milliseconds
    pub fade_step_delay_ms: u32,
    /// Lowest backlight level that is still visible; ramps start or end here
    pub min_brightness: u8,
    /// Ramp step used when fading in after wake
    pub resume_fade_step: u8,
    /// Ramp step used when fading out before an image handoff
    pub handoff_fade_step: u8,
    /// Ramp step for the sleep transition
    pub sleep_fade_step: u8,
    /// Ramp step for the slow (power-off) sleep transition
    pub slow_sleep_fade_step: u8,
    /// Hold iterations that keep the logo on screen for a slow transition
    pub slow_hold_iterations: u32,
    /// Length of each hold iteration in milliseconds
    pub slow_hold_step_ms: u32,
    /// Pin that is armed to wake the CPU
    pub wake_pin: WakePin,
    /// An update archive at this path forces a reset on resume
    pub update_archive_path: &'static str,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            drain_iterations: 10,
            drain_step_ms: 50,
            fade_step_delay_ms: 5,
            min_brightness: 120,
            resume_fade_step: 3,
            handoff_fade_step: 10,
            sleep_fade_step: 2,
            slow_sleep_fade_step: 1,
            slow_hold_iterations: 30,
            slow_hold_step_ms: 10,
            wake_pin: WakePin::PowerButton,
            update_archive_path: "/retro-go_update.bin",
        }
    }
}

/// Flash and RAM addresses used to hand the CPU to another image.
#[derive(Debug, Clone, Copy)]
pub struct BootLayout {
    /// Base of the sibling application image (flash bank 2)
    pub bank2_base: u32,
    /// Base of internal flash, where the original firmware vector table lives
    pub intflash_base: u32,
    /// Low-RAM word that receives the reboot tag
    pub reboot_tag_addr: u32,
    /// Low-RAM word that receives the target vector table
    pub reboot_vtor_addr: u32,
    /// Tag value the bootloader looks for ("BOOT")
    pub reboot_tag: u32,
}

impl Default for BootLayout {
    fn default() -> Self {
        Self {
            bank2_base: 0x0810_0000,
            intflash_base: 0x0800_0000,
            // Last 8 bytes of the 128KB DTCM
            reboot_tag_addr: 0x2001_FFF8,
            reboot_vtor_addr: 0x2001_FFFC,
            reboot_tag: 0x544F_4F42,
        }
    }
}

/// LCD framebuffer geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferLayout {
    pub width: usize,
    pub height: usize,
    pub bytes_per_pixel: usize,
}

impl FramebufferLayout {
    /// Size of one framebuffer and of every preview file
    pub const fn size(&self) -> usize {
        self.width * self.height * self.bytes_per_pixel
    }
}

impl Default for FramebufferLayout {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            bytes_per_pixel: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framebuffer_size() {
        assert_eq!(FramebufferLayout::default().size(), 153_600);
    }

    #[test]
    fn test_reboot_tag_spells_boot() {
        let tag = BootLayout::default().reboot_tag;
        assert_eq!(&tag.to_le_bytes(), b"BOOT");
    }
}
