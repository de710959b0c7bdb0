//! Audio output abstraction.

/// SAI output plus the speaker amplifier enable line.
pub trait Audio {
    /// Configure the output for a sample rate
    fn init(&mut self, sample_rate: u32);

    /// Sample rate the output was last configured for
    fn sample_rate(&self) -> u32;

    /// Start DMA playback of the full ring buffer
    fn start_playing(&mut self);

    /// Stop DMA playback
    fn stop_playing(&mut self);

    /// Drive the speaker enable line
    fn set_speaker(&mut self, enabled: bool);
}
