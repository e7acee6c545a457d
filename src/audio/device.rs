//! Local audio capabilities the session controller drives.

use crate::error::DeviceError;
use crate::events::{ChunkId, EventSender};

/// Capture-rate context: a microphone that pushes mono f32 reads.
pub trait Microphone: Send {
    /// Acquire the device and start pushing samples through `events.samples()`.
    fn open(&mut self, sample_rate: u32, events: EventSender) -> Result<(), DeviceError>;

    /// Stop capturing and give the device back. Must tolerate repeated calls.
    fn release(&mut self);
}

/// Playback-rate context with its own clock.
///
/// Implementations report natural completion of a chunk through
/// `events.chunk_ended(id)`; a chunk stopped with [`AudioOutput::stop`] is not
/// reported.
pub trait AudioOutput: Send {
    /// Bring the context into the running state.
    fn resume(&mut self, sample_rate: u32, channels: u16, events: EventSender)
        -> Result<(), DeviceError>;

    /// Output clock in seconds.
    fn current_time(&self) -> f64;

    /// Play one channel-separated buffer starting at `start_at` on the output clock.
    fn schedule(&mut self, id: ChunkId, channels: Vec<Vec<f32>>, start_at: f64);

    /// Stop a chunk now. Unknown or already finished ids are ignored.
    fn stop(&mut self, id: ChunkId);

    fn suspend(&mut self);
}
