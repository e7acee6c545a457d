//! The single event timeline a session runs on.
//!
//! Microphone threads, the network task, the audio output and the connect task all
//! push into one channel; the controller drains it on one task.

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::SessionError;
use crate::net_link::RemoteLink;
use crate::protocol::ServerMessage;

pub type ChunkId = u64;

#[derive(Debug)]
pub enum LinkEvent {
    /// Handshake acknowledged, frames may flow.
    Open,
    Message(ServerMessage),
    Closed(String),
    Error(String),
}

pub enum SessionEventKind {
    /// A raw microphone read, any length.
    Samples(Vec<f32>),
    /// A scheduled chunk finished playing on its own.
    ChunkEnded(ChunkId),
    Link(LinkEvent),
    /// The connect call returned a usable handle.
    LinkResolved(Box<dyn RemoteLink>),
}

pub struct SessionEvent {
    pub session: Uuid,
    pub kind: SessionEventKind,
}

/// Session-tagged producer side of the event channel.
///
/// `send` never blocks, so it is safe to call from real-time audio threads.
#[derive(Clone)]
pub struct EventSender {
    session: Uuid,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSender {
    pub(crate) fn new(session: Uuid, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> Uuid {
        self.session
    }

    /// Returns false once the controller is gone.
    fn send(&self, kind: SessionEventKind) -> bool {
        self.tx
            .send(SessionEvent {
                session: self.session,
                kind,
            })
            .is_ok()
    }

    pub fn samples(&self, samples: Vec<f32>) -> bool {
        self.send(SessionEventKind::Samples(samples))
    }

    pub fn chunk_ended(&self, id: ChunkId) -> bool {
        self.send(SessionEventKind::ChunkEnded(id))
    }

    pub fn link(&self, event: LinkEvent) -> bool {
        self.send(SessionEventKind::Link(event))
    }

    pub fn link_resolved(&self, link: Box<dyn RemoteLink>) -> bool {
        self.send(SessionEventKind::LinkResolved(link))
    }
}

/// Notifications for the surrounding application.
#[derive(Debug)]
pub enum Notice {
    /// The externally observable "voice active" flag changed.
    Active(bool),
    /// Fire-and-forget lesson progress signal.
    Progress,
    /// The session could not start or died; it is now closed.
    Failed(SessionError),
}
