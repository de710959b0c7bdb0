//! Board implementations of the [`crate::hal`] traits.

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod stm32h7;

#[cfg(any(test, feature = "sim"))]
pub mod sim;
