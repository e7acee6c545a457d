#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;

use trainer_voice_relay::audio::transport_codec;
use trainer_voice_relay::audio::{AudioOutput, Microphone};
use trainer_voice_relay::events::ChunkId;
use trainer_voice_relay::protocol::{ServerMessage, SetupMessage, TransportPacket};
use trainer_voice_relay::{
    Connector, DeviceError, EventSender, LinkEvent, Notice, RemoteLink, SessionConfig,
    SessionController, SessionEvent, SessionEventKind,
};

// ======================== Connector ========================

#[derive(Debug, Clone)]
pub enum ConnectMode {
    /// Hand back a link; the test decides when the handshake completes.
    Resolve,
    /// Report the handshake before the handle resolves.
    OpenThenResolve,
    Fail(String),
}

#[derive(Clone)]
pub struct FakeConnector {
    pub mode: ConnectMode,
    pub sent: Arc<Mutex<Vec<TransportPacket>>>,
    pub setups: Arc<Mutex<Vec<SetupMessage>>>,
    pub connects: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn new(mode: ConnectMode) -> Self {
        Self {
            mode,
            sent: Arc::default(),
            setups: Arc::default(),
            connects: Arc::default(),
            closes: Arc::default(),
        }
    }

    pub fn sent(&self) -> Vec<TransportPacket> {
        self.sent.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        setup: SetupMessage,
        events: EventSender,
    ) -> anyhow::Result<Box<dyn RemoteLink>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.setups.lock().unwrap().push(setup);
        match &self.mode {
            ConnectMode::Fail(reason) => anyhow::bail!("{}", reason),
            ConnectMode::OpenThenResolve => {
                events.link(LinkEvent::Open);
            }
            ConnectMode::Resolve => {}
        }
        Ok(Box::new(FakeLink {
            sent: Arc::clone(&self.sent),
            closes: Arc::clone(&self.closes),
            closed: false,
        }))
    }
}

pub struct FakeLink {
    sent: Arc<Mutex<Vec<TransportPacket>>>,
    closes: Arc<AtomicUsize>,
    closed: bool,
}

impl RemoteLink for FakeLink {
    fn send(&mut self, packet: &TransportPacket) -> anyhow::Result<()> {
        if self.closed {
            anyhow::bail!("link closed");
        }
        self.sent.lock().unwrap().push(packet.clone());
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// ======================== Microphone ========================

#[derive(Clone, Default)]
pub struct FakeMic {
    pub deny: bool,
    pub opens: Arc<AtomicUsize>,
    pub releases: Arc<AtomicUsize>,
}

impl Microphone for FakeMic {
    fn open(&mut self, _sample_rate: u32, _events: EventSender) -> Result<(), DeviceError> {
        if self.deny {
            return Err(DeviceError::Microphone("permission denied".into()));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

// ======================== Output ========================

#[derive(Debug, Clone, PartialEq)]
pub struct Scheduled {
    pub id: ChunkId,
    pub frames: usize,
    pub start_at: f64,
}

#[derive(Clone, Default)]
pub struct FakeOutput {
    pub clock: Arc<Mutex<f64>>,
    pub scheduled: Arc<Mutex<Vec<Scheduled>>>,
    pub stopped: Arc<Mutex<Vec<ChunkId>>>,
    pub resumes: Arc<AtomicUsize>,
    pub suspends: Arc<AtomicUsize>,
}

impl FakeOutput {
    pub fn set_clock(&self, seconds: f64) {
        *self.clock.lock().unwrap() = seconds;
    }

    pub fn scheduled(&self) -> Vec<Scheduled> {
        self.scheduled.lock().unwrap().clone()
    }

    pub fn stopped(&self) -> Vec<ChunkId> {
        self.stopped.lock().unwrap().clone()
    }
}

impl AudioOutput for FakeOutput {
    fn resume(&mut self, _sample_rate: u32, _channels: u16, _events: EventSender) -> Result<(), DeviceError> {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn current_time(&self) -> f64 {
        *self.clock.lock().unwrap()
    }

    fn schedule(&mut self, id: ChunkId, channels: Vec<Vec<f32>>, start_at: f64) {
        let frames = channels.first().map_or(0, Vec::len);
        self.scheduled.lock().unwrap().push(Scheduled { id, frames, start_at });
    }

    fn stop(&mut self, id: ChunkId) {
        self.stopped.lock().unwrap().push(id);
    }

    fn suspend(&mut self) {
        self.suspends.fetch_add(1, Ordering::SeqCst);
    }
}

// ======================== Harness ========================

pub struct Harness {
    pub controller: SessionController,
    pub notices: mpsc::UnboundedReceiver<Notice>,
    pub connector: FakeConnector,
    pub mic: FakeMic,
    pub output: FakeOutput,
}

impl Harness {
    pub fn new(config: SessionConfig, mode: ConnectMode) -> Self {
        Self::with_mic(config, mode, FakeMic::default())
    }

    pub fn with_mic(config: SessionConfig, mode: ConnectMode, mic: FakeMic) -> Self {
        let connector = FakeConnector::new(mode);
        let output = FakeOutput::default();
        let (tx, notices) = mpsc::unbounded_channel();
        let controller = SessionController::new(
            config,
            Arc::new(connector.clone()),
            Box::new(mic.clone()),
            Box::new(output.clone()),
            tx,
        );
        Self {
            controller,
            notices,
            connector,
            mic,
            output,
        }
    }

    /// Wait for the next session event and handle it.
    pub async fn pump(&mut self) {
        let event = tokio::time::timeout(Duration::from_secs(1), self.controller.next_event())
            .await
            .expect("timed out waiting for a session event")
            .expect("event channel closed");
        self.controller.handle_event(event);
    }

    /// Handle an event for the current session directly, ahead of anything queued.
    pub fn deliver(&mut self, event: LinkEvent) {
        self.inject(SessionEventKind::Link(event));
    }

    pub fn feed(&mut self, samples: Vec<f32>) {
        self.inject(SessionEventKind::Samples(samples));
    }

    fn inject(&mut self, kind: SessionEventKind) {
        let session = self.controller.session_id();
        self.controller.handle_event(SessionEvent { session, kind });
    }

    pub fn notices(&mut self) -> Vec<Notice> {
        let mut out = Vec::new();
        while let Ok(n) = self.notices.try_recv() {
            out.push(n);
        }
        out
    }
}

/// Small frames keep the capture tests readable.
pub fn test_config() -> SessionConfig {
    SessionConfig {
        frame_size: 4,
        ..SessionConfig::default()
    }
}

/// A model turn carrying `seconds` of mono audio at `rate`.
pub fn audio_message(seconds: f64, rate: u32) -> LinkEvent {
    let frames = (seconds * f64::from(rate)).round() as usize;
    let samples = vec![0.25f32; frames];
    let data = transport_codec::encode(&transport_codec::samples_to_wire(&samples));
    server_message(json!({
        "serverContent": {
            "modelTurn": {
                "parts": [{ "inlineData": { "mimeType": format!("audio/pcm;rate={}", rate), "data": data } }]
            }
        }
    }))
}

pub fn interrupted_message() -> LinkEvent {
    server_message(json!({ "serverContent": { "interrupted": true } }))
}

pub fn turn_complete_message() -> LinkEvent {
    server_message(json!({ "serverContent": { "turnComplete": true } }))
}

pub fn server_message(value: serde_json::Value) -> LinkEvent {
    LinkEvent::Message(ServerMessage::parse(&value.to_string()).expect("valid server message"))
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}
