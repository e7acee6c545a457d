//! audio - Capture pipeline, playback scheduling and the PCM wire codec
//!
//! The session controller only sees the `Microphone` / `AudioOutput` traits.
//! With the `alsa` feature, `alsa_backend` provides real devices driven by
//! dedicated OS threads.

mod capture;
mod device;
mod mixer;
mod playback;
pub mod transport_codec;

#[cfg(feature = "alsa")]
mod alsa_backend;
#[cfg(feature = "alsa")]
mod alsa_device;

pub use capture::CapturePipeline;
pub use device::{AudioOutput, Microphone};
pub use mixer::Mixer;
pub use playback::{PlaybackScheduler, ScheduledChunk};

#[cfg(feature = "alsa")]
pub use alsa_backend::{AlsaMicrophone, AlsaOutput};
