//! # gwpower - Power Transitions and Session Persistence
//!
//! The part of the handheld firmware that moves the device between running,
//! sleep, standby and cross-image handoff, and makes sure the session (active
//! ROM, launcher tab, save slots) survives every one of those transitions.
//!
//! All hardware is reached through the traits in [`hal`]. The STM32H7 board
//! implementation lives in `platform::stm32h7` (target builds only);
//! `platform::sim` is an in-memory board used by the host tests.
//!
//! ## Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  PowerController                     │
//! │          sleep / standby / app switch               │
//! ├──────────────────────────┬──────────────────────────┤
//! │   SessionPersistence     │   BootHandoffProtocol    │
//! │   checkpoint, restore    │   boot magic, handoff    │
//! ├──────────────────────────┴──────────────────────────┤
//! │   SaveSlotManager  (independent of the power path)   │
//! ├─────────────────────────────────────────────────────┤
//! │                AppRuntimeContext                     │
//! ├─────────────────────────────────────────────────────┤
//! │                      HAL                             │
//! │   system, display, audio, storage, settings, ui     │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use gwpower::{AppContext, BootLayout, PowerConfig, PowerController};
//!
//! let mut ctx = AppContext::new();
//! let mut power = PowerController::new(PowerConfig::default(), BootLayout::default());
//! ctx.init(APP_LAUNCHER, 32_000, &mut board.peripherals());
//!
//! loop {
//!     if power_button_pressed {
//!         power.on_power_button(&mut ctx, &mut board.peripherals(), dpad_held);
//!     }
//! }
//! ```

#![no_std]
#![allow(clippy::new_without_default)]

extern crate alloc;

#[cfg(any(test, feature = "sim"))]
extern crate std;

pub mod app;
pub mod boot;
pub mod config;
pub mod error;
pub mod hal;
pub mod paths;
pub mod platform;
pub mod power;
pub mod session;
pub mod slots;

pub use app::{AppContext, AppDescriptor, RuntimeCounters, StateHandlers, Stats};
pub use boot::{BootHandoff, BootMagic, BootMode, ImageHandoff, MagicStore, VectorTable};
pub use config::{BootLayout, FramebufferLayout, PowerConfig};
pub use error::{Error, Result};
pub use hal::{Peripherals, Platform};
pub use paths::PathKind;
pub use power::{AppSwitch, PowerController, PowerState, SleepFlags, SleepRequest};
pub use session::{ResumeTarget, StartupPlan};
pub use slots::{SaveSlot, SaveSlotSet, SlotIndex};
