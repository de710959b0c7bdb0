//! Flash allocation store.
//!
//! ROMs copied from the SD card into external flash are tracked by a small
//! metadata table. The power core only ever wipes it.

/// Metadata of the external-flash content store
pub trait FlashAlloc {
    /// Forget every cached file; the next load copies from the card again
    fn reset(&mut self);
}
