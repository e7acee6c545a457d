//! trainer_voice_relay - realtime voice relay between a microphone, the Gemini
//! Live service and a speaker, plus the text coach used by the trainer.

pub mod audio;
pub mod chat;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod net_link;
pub mod prompt;
pub mod protocol;
pub mod state_machine;

pub use controller::{ProgressPolicy, SessionCommand, SessionConfig, SessionController, SessionHandle};
pub use error::{DeviceError, SessionError};
pub use events::{EventSender, LinkEvent, Notice, SessionEvent, SessionEventKind};
pub use net_link::{Connector, LiveConnector, RemoteLink};
pub use state_machine::SessionState;
