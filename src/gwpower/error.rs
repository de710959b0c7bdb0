//! Error type shared by every layer of the crate.

use alloc::string::String;

/// Result type for power and persistence operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Failures surfaced to the caller.
///
/// Contradictory power requests are not represented here: they are
/// programming errors and abort instead of returning.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// No ROM is attached to the active application
    #[error("no ROM is active")]
    NoActiveRom,
    /// The active application did not install state handlers
    #[error("no load handler installed")]
    NoLoadHandler,
    /// The active application did not install state handlers
    #[error("no save handler installed")]
    NoSaveHandler,
    /// ROM path is too short to derive any file name from
    #[error("invalid ROM path {0:?}")]
    InvalidRomPath(String),
    /// Slot selector is not valid for the requested operation
    #[error("slot selector not valid here")]
    InvalidSlot,
    /// Storage is not mounted
    #[error("storage not mounted")]
    NotMounted,
    /// File could not be opened
    #[error("failed to open {path}")]
    Open { path: String },
    /// Fewer bytes reached storage than were handed to it
    #[error("short write to {path}: {written} of {expected} bytes")]
    ShortWrite {
        path: String,
        written: usize,
        expected: usize,
    },
    /// Directory could not be created
    #[error("failed to create directory {path}")]
    Mkdir { path: String },
}
