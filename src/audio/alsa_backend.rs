//! ALSA-backed microphone and clocked speaker output.
//!
//! Uses std::thread (NOT tokio tasks) for real-time audio I/O; both threads only
//! talk to the controller through the non-blocking session event channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::thread::{self, JoinHandle};

use super::alsa_device;
use super::device::{AudioOutput, Microphone};
use super::mixer::Mixer;
use crate::error::DeviceError;
use crate::events::{ChunkId, EventSender};

// ======================== Microphone ========================

pub struct AlsaMicrophone {
    device: String,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AlsaMicrophone {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }
}

impl Microphone for AlsaMicrophone {
    fn open(&mut self, sample_rate: u32, events: EventSender) -> Result<(), DeviceError> {
        if self.handle.is_some() {
            return Ok(());
        }
        self.running.store(true, Ordering::SeqCst);

        // 设备在录音线程里打开，打开结果通过 ready 通道回传
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<(), String>>(1);
        let running = self.running.clone();
        let device = self.device.clone();
        let handle = thread::Builder::new()
            .name("mic-capture".into())
            .spawn(move || record_thread(&device, sample_rate, events, &running, ready_tx))
            .map_err(|e| DeviceError::Microphone(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.handle = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(DeviceError::Microphone(e))
            }
            Err(_) => {
                let _ = handle.join();
                Err(DeviceError::Microphone("capture thread exited".into()))
            }
        }
    }

    fn release(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for AlsaMicrophone {
    fn drop(&mut self) {
        self.release();
    }
}

fn record_thread(
    device: &str,
    sample_rate: u32,
    events: EventSender,
    running: &AtomicBool,
    ready: std_mpsc::SyncSender<Result<(), String>>,
) {
    let (pcm, params) = match alsa_device::open_capture(device, sample_rate, 1) {
        Ok(v) => v,
        Err(e) => {
            let _ = ready.send(Err(format!("{:#}", e)));
            return;
        }
    };
    let io = match pcm.io_i16() {
        Ok(io) => io,
        Err(e) => {
            let _ = ready.send(Err(e.to_string()));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    let channels = params.channels as usize;
    let mut read_buf = vec![0i16; params.period_size * channels];

    log::info!("Recording started: rate={}, period={}", params.sample_rate, params.period_size);

    while running.load(Ordering::Relaxed) {
        match io.readi(&mut read_buf) {
            Ok(frames) => {
                // 只取第一个声道
                let samples: Vec<f32> = read_buf[..frames * channels]
                    .iter()
                    .step_by(channels)
                    .map(|&s| f32::from(s) / 32768.0)
                    .collect();
                if !events.samples(samples) {
                    log::warn!("Session event channel closed, stopping capture");
                    break;
                }
            }
            Err(e) => {
                log::warn!("ALSA capture error: {}, recovering...", e);
                if let Err(e2) = pcm.prepare() {
                    log::error!("Failed to recover PCM capture: {}", e2);
                    break;
                }
            }
        }
    }

    log::info!("Recording stopped");
}

// ======================== Output ========================

enum MixerCommand {
    Play {
        id: ChunkId,
        channels: Vec<Vec<f32>>,
        start_frame: u64,
    },
    Stop(ChunkId),
}

/// Speaker output whose clock is the first frame not yet mixed.
///
/// Silence is written while nothing is scheduled, so the clock advances in real
/// time like a running audio context.
pub struct AlsaOutput {
    device: String,
    period_size: usize,
    sample_rate: u32,
    mixed_until: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    cmd_tx: Option<std_mpsc::Sender<MixerCommand>>,
    handle: Option<JoinHandle<()>>,
}

impl AlsaOutput {
    pub fn new(device: impl Into<String>, period_size: usize) -> Self {
        Self {
            device: device.into(),
            period_size: period_size.max(64),
            sample_rate: 24000,
            mixed_until: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            cmd_tx: None,
            handle: None,
        }
    }
}

impl AudioOutput for AlsaOutput {
    fn resume(
        &mut self,
        sample_rate: u32,
        channels: u16,
        events: EventSender,
    ) -> Result<(), DeviceError> {
        if self.handle.is_some() {
            return Ok(());
        }
        self.sample_rate = sample_rate;
        self.mixed_until.store(0, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);

        let (cmd_tx, cmd_rx) = std_mpsc::channel();
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<(), String>>(1);
        let setup = PlaySetup {
            device: self.device.clone(),
            sample_rate,
            channels: u32::from(channels.max(1)),
            period_size: self.period_size,
        };
        let running = self.running.clone();
        let clock = self.mixed_until.clone();

        let handle = thread::Builder::new()
            .name("audio-play".into())
            .spawn(move || play_thread(setup, cmd_rx, events, &running, &clock, ready_tx))
            .map_err(|e| DeviceError::Output(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.cmd_tx = Some(cmd_tx);
                self.handle = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(DeviceError::Output(e))
            }
            Err(_) => {
                let _ = handle.join();
                Err(DeviceError::Output("playback thread exited".into()))
            }
        }
    }

    fn current_time(&self) -> f64 {
        self.mixed_until.load(Ordering::SeqCst) as f64 / f64::from(self.sample_rate)
    }

    fn schedule(&mut self, id: ChunkId, channels: Vec<Vec<f32>>, start_at: f64) {
        let start_frame = (start_at * f64::from(self.sample_rate)).round() as u64;
        if let Some(tx) = &self.cmd_tx {
            let _ = tx.send(MixerCommand::Play {
                id,
                channels,
                start_frame,
            });
        }
    }

    fn stop(&mut self, id: ChunkId) {
        if let Some(tx) = &self.cmd_tx {
            let _ = tx.send(MixerCommand::Stop(id));
        }
    }

    fn suspend(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.cmd_tx = None;
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for AlsaOutput {
    fn drop(&mut self) {
        self.suspend();
    }
}

struct PlaySetup {
    device: String,
    sample_rate: u32,
    channels: u32,
    period_size: usize,
}

fn play_thread(
    setup: PlaySetup,
    cmd_rx: std_mpsc::Receiver<MixerCommand>,
    events: EventSender,
    running: &AtomicBool,
    clock: &AtomicU64,
    ready: std_mpsc::SyncSender<Result<(), String>>,
) {
    let (pcm, params) = match alsa_device::open_playback(
        &setup.device,
        setup.sample_rate,
        setup.channels,
        Some(setup.period_size),
    ) {
        Ok(v) => v,
        Err(e) => {
            let _ = ready.send(Err(format!("{:#}", e)));
            return;
        }
    };
    let io = match pcm.io_i16() {
        Ok(io) => io,
        Err(e) => {
            let _ = ready.send(Err(e.to_string()));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    let channels = params.channels as usize;
    let period = params.period_size;
    let mut mixer = Mixer::new();
    let mut mix = vec![0f32; period * channels];
    let mut out = vec![0i16; period * channels];

    log::info!("Playback started: rate={}, ch={}, period={}", params.sample_rate, channels, period);

    while running.load(Ordering::Relaxed) {
        let now = clock.load(Ordering::SeqCst);
        while let Ok(cmd) = cmd_rx.try_recv() {
            match cmd {
                MixerCommand::Play { id, channels, start_frame } => {
                    mixer.play(id, channels, start_frame, now);
                }
                MixerCommand::Stop(id) => mixer.stop(id),
            }
        }

        let ended = mixer.mix_period(now, period, channels, &mut mix);
        for (o, m) in out.iter_mut().zip(&mix) {
            *o = (m.clamp(-1.0, 1.0) * 32767.0) as i16;
        }

        // 写入前先推进时钟：阻塞期间排进来的块从下一个周期开始
        clock.store(now + period as u64, Ordering::SeqCst);

        // Write with retry loop to handle short writes and XRUN recovery
        let mut frames_written = 0;
        let mut retry_count = 0u32;
        while frames_written < period {
            match io.writei(&out[frames_written * channels..]) {
                Ok(n) => {
                    frames_written += n;
                    retry_count = 0;
                }
                Err(e) => {
                    log::warn!("ALSA XRUN or error: {}, recovering...", e);
                    retry_count += 1;
                    if let Err(e2) = pcm.prepare() {
                        log::error!("Failed to recover PCM playback: {}", e2);
                        return;
                    }
                    if retry_count >= 3 {
                        log::error!("Max recovery retries reached, dropping {} frames", period - frames_written);
                        break;
                    }
                }
            }
        }

        for id in ended {
            events.chunk_ended(id);
        }
    }

    log::info!("Playback stopped");
}
