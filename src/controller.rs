use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::audio::{AudioOutput, CapturePipeline, Microphone, PlaybackScheduler, ScheduledChunk};
use crate::error::SessionError;
use crate::events::{EventSender, LinkEvent, Notice, SessionEvent, SessionEventKind};
use crate::net_link::{Connector, RemoteLink};
use crate::prompt::{self, PromptContext};
use crate::protocol::{ServerMessage, SetupMessage};
use crate::state_machine::SessionState;

/// When the application is told the learner made progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressPolicy {
    /// Every scheduled chunk of model audio.
    #[default]
    EveryChunk,
    /// Once per completed model turn that produced audio.
    TurnComplete,
}

impl FromStr for ProgressPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "every_chunk" => Ok(ProgressPolicy::EveryChunk),
            "turn_complete" => Ok(ProgressPolicy::TurnComplete),
            other => Err(format!("Unknown progress policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    /// Samples per outbound frame
    pub frame_size: usize,
    pub output_channels: u16,
    pub live_model: String,
    pub voice_name: String,
    pub progress_policy: ProgressPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16000,
            output_sample_rate: 24000,
            frame_size: 4096,
            output_channels: 1,
            live_model: "gemini-2.5-flash-native-audio-preview-12-2025".to_string(),
            voice_name: "Zephyr".to_string(),
            progress_policy: ProgressPolicy::EveryChunk,
        }
    }
}

#[derive(Debug)]
pub enum SessionCommand {
    Start(PromptContext),
    Stop,
}

/// Owns one voice session end to end: devices, link, scheduler and cursor.
///
/// Everything runs on the task that drains the event channel, so the chunk set
/// and cursor are never touched concurrently.
pub struct SessionController {
    config: SessionConfig,
    state: SessionState,
    session_id: Uuid,
    connector: Arc<dyn Connector>,
    output: Box<dyn AudioOutput>,
    capture: CapturePipeline,
    playback: PlaybackScheduler,
    link: Option<Box<dyn RemoteLink>>,
    turn_had_audio: bool,
    active: Arc<AtomicBool>,
    notices: mpsc::UnboundedSender<Notice>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl SessionController {
    pub fn new(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        microphone: Box<dyn Microphone>,
        output: Box<dyn AudioOutput>,
        notices: mpsc::UnboundedSender<Notice>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let capture = CapturePipeline::new(microphone, config.input_sample_rate, config.frame_size);
        let playback = PlaybackScheduler::new(config.output_sample_rate, config.output_channels);
        Self {
            config,
            state: SessionState::Idle,
            session_id: Uuid::nil(),
            connector,
            output,
            capture,
            playback,
            link: None,
            turn_had_audio: false,
            active: Arc::new(AtomicBool::new(false)),
            notices,
            events_tx,
            events_rx,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Shared view of the "voice active" flag.
    pub fn active_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.active)
    }

    pub fn cursor(&self) -> f64 {
        self.playback.cursor()
    }

    pub fn active_chunks(&self) -> Vec<ScheduledChunk> {
        self.playback.active_chunks().copied().collect()
    }

    pub fn pending_frames(&self) -> usize {
        self.capture.pending_len()
    }

    pub fn holds_microphone(&self) -> bool {
        self.capture.is_holding()
    }

    pub fn has_link(&self) -> bool {
        self.link.is_some()
    }

    /// Producer handle for the current session.
    pub fn event_sender(&self) -> EventSender {
        EventSender::new(self.session_id, self.events_tx.clone())
    }

    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events_rx.recv().await
    }

    /// Handle everything already queued without waiting. Returns how many events ran.
    pub fn drain_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Begin a session for `context`. Failures arrive as a single [`Notice::Failed`].
    ///
    /// Must be called inside a tokio runtime; the connect runs on its own task.
    pub fn start(&mut self, context: &PromptContext) {
        if !self.state.can_start() {
            log::warn!("Start ignored, session already {:?}", self.state);
            return;
        }

        self.session_id = Uuid::new_v4();
        self.transition(SessionState::Connecting);
        let events = self.event_sender();

        // 两个音频上下文都必须处于运行状态
        if let Err(e) = self.output.resume(
            self.config.output_sample_rate,
            self.config.output_channels,
            events.clone(),
        ) {
            self.fail(e.into());
            return;
        }
        if let Err(e) = self.capture.acquire(events.clone()) {
            self.fail(e.into());
            return;
        }
        // 握手期间采到的帧先排队，连接就绪后按顺序发出
        self.capture.arm();

        let setup = SetupMessage::audio(
            &self.config.live_model,
            &self.config.voice_name,
            prompt::system_prompt(context),
        );
        let connector = Arc::clone(&self.connector);
        tokio::spawn(async move {
            match connector.connect(setup, events.clone()).await {
                Ok(link) => {
                    events.link_resolved(link);
                }
                Err(e) => {
                    events.link(LinkEvent::Error(format!("{:#}", e)));
                }
            }
        });
    }

    /// Tear the session down. Safe to call in any state, any number of times.
    pub fn stop(&mut self) {
        if !self.state.is_live() {
            log::debug!("Stop ignored, session {:?}", self.state);
            return;
        }
        self.transition(SessionState::Closing);
        self.teardown();
        self.transition(SessionState::Closed);
    }

    pub fn handle_event(&mut self, event: SessionEvent) {
        if event.session != self.session_id || !self.state.is_live() {
            if let SessionEventKind::LinkResolved(mut link) = event.kind {
                log::info!("Closing link that resolved after its session ended");
                link.close();
            } else {
                log::debug!("Dropping stale event for session {}", event.session);
            }
            return;
        }

        match event.kind {
            SessionEventKind::Samples(samples) => {
                if self.capture.push_samples(&samples) > 0 {
                    self.flush_frames();
                }
            }
            SessionEventKind::ChunkEnded(id) => {
                self.playback.chunk_ended(id);
            }
            SessionEventKind::LinkResolved(link) => {
                self.link = Some(link);
                self.flush_frames();
            }
            SessionEventKind::Link(LinkEvent::Open) => self.on_open(),
            SessionEventKind::Link(LinkEvent::Message(msg)) => self.on_message(msg),
            SessionEventKind::Link(LinkEvent::Closed(reason)) => {
                if self.state == SessionState::Connecting {
                    self.fail(SessionError::Closed(reason));
                } else {
                    log::info!("Remote closed the session: {}", reason);
                    self.stop();
                }
            }
            SessionEventKind::Link(LinkEvent::Error(e)) => {
                self.fail(SessionError::Connection(e));
            }
        }
    }

    /// Drive the controller until the command channel closes.
    pub async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        loop {
            tokio::select! {
                cmd = commands.recv() => {
                    match cmd {
                        Some(SessionCommand::Start(context)) => self.start(&context),
                        Some(SessionCommand::Stop) => self.stop(),
                        None => {
                            self.stop();
                            break;
                        }
                    }
                }
                Some(event) = self.events_rx.recv() => self.handle_event(event),
            }
        }
    }

    /// Run on a new task and hand back the command side.
    pub fn spawn(self) -> (SessionHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(16);
        let active = self.active_flag();
        let task = tokio::spawn(self.run(rx));
        (SessionHandle { commands: tx, active }, task)
    }

    fn on_open(&mut self) {
        if self.state != SessionState::Connecting {
            return;
        }
        self.transition(SessionState::Open);
        self.active.store(true, Ordering::SeqCst);
        self.notify(Notice::Active(true));
        self.flush_frames();
    }

    fn on_message(&mut self, msg: ServerMessage) {
        if self.state != SessionState::Open {
            log::debug!("Ignoring server message before open");
            return;
        }

        if let Some(payload) = msg.audio_payload() {
            match self.playback.schedule_payload(payload, self.output.as_mut()) {
                Ok(Some(_)) => {
                    self.turn_had_audio = true;
                    if self.config.progress_policy == ProgressPolicy::EveryChunk {
                        self.notify(Notice::Progress);
                    }
                }
                Ok(None) => {}
                Err(e) => log::warn!("Dropping malformed audio payload: {}", e),
            }
        }

        if msg.is_interrupted() {
            let flushed = self.playback.interrupt(self.output.as_mut());
            log::info!("Interrupted by user speech, flushed {} chunks", flushed);
        }

        if msg.is_turn_complete() {
            if self.turn_had_audio && self.config.progress_policy == ProgressPolicy::TurnComplete {
                self.notify(Notice::Progress);
            }
            self.turn_had_audio = false;
        }
    }

    /// Frames go out only once the handshake is done and the handle has resolved.
    fn flush_frames(&mut self) {
        if self.state != SessionState::Open {
            return;
        }
        let Some(link) = self.link.as_mut() else {
            return;
        };
        if let Err(e) = self.capture.flush(link.as_mut()) {
            self.fail(SessionError::Connection(format!("{:#}", e)));
        }
    }

    fn teardown(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close();
        }
        let stopped = self.playback.interrupt(self.output.as_mut());
        if stopped > 0 {
            log::debug!("Stopped {} pending chunks", stopped);
        }
        self.capture.release();
        self.output.suspend();
        self.turn_had_audio = false;
        if self.active.swap(false, Ordering::SeqCst) {
            self.notify(Notice::Active(false));
        }
    }

    /// Report the failure, then tear down. `Failed` always precedes `Active(false)`.
    fn fail(&mut self, err: SessionError) {
        log::error!("Voice session {} failed: {}", self.session_id, err);
        self.notify(Notice::Failed(err));
        if self.state.is_live() {
            self.transition(SessionState::Closing);
            self.teardown();
            self.transition(SessionState::Closed);
        }
    }

    fn notify(&self, notice: Notice) {
        // 应用层可能已经不再监听，忽略即可
        let _ = self.notices.send(notice);
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        log::info!("Session {}: {:?} -> {:?}", self.session_id, self.state, next);
        self.state = next;
    }
}

/// Command side of a spawned [`SessionController`].
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    active: Arc<AtomicBool>,
}

impl SessionHandle {
    pub async fn start(&self, context: PromptContext) -> anyhow::Result<()> {
        self.commands.send(SessionCommand::Start(context)).await?;
        Ok(())
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        self.commands.send(SessionCommand::Stop).await?;
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_policy_parses() {
        assert_eq!("every_chunk".parse(), Ok(ProgressPolicy::EveryChunk));
        assert_eq!("turn_complete".parse(), Ok(ProgressPolicy::TurnComplete));
        assert!("sometimes".parse::<ProgressPolicy>().is_err());
    }
}
