use std::collections::VecDeque;

use super::device::Microphone;
use super::transport_codec;
use crate::error::DeviceError;
use crate::events::EventSender;
use crate::net_link::RemoteLink;
use crate::protocol::TransportPacket;

/// Microphone → fixed-size frames → transport packets.
///
/// Packets wait in `pending` only while the connection is not ready; `flush`
/// drains them in capture order.
pub struct CapturePipeline {
    microphone: Box<dyn Microphone>,
    holding: bool,
    armed: bool,
    sample_rate: u32,
    frame_size: usize,
    // Accumulation buffer for the frame in progress
    accum: Vec<f32>,
    pending: VecDeque<TransportPacket>,
}

impl CapturePipeline {
    pub fn new(microphone: Box<dyn Microphone>, sample_rate: u32, frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            microphone,
            holding: false,
            armed: false,
            sample_rate,
            frame_size,
            accum: Vec::with_capacity(frame_size * 2),
            pending: VecDeque::new(),
        }
    }

    pub fn acquire(&mut self, events: EventSender) -> Result<(), DeviceError> {
        if self.holding {
            return Ok(());
        }
        self.microphone.open(self.sample_rate, events)?;
        self.holding = true;
        log::info!(
            "Microphone acquired: rate={}, frame_size={}",
            self.sample_rate,
            self.frame_size
        );
        Ok(())
    }

    /// Start turning samples into frames. Reads before this are discarded.
    pub fn arm(&mut self) {
        self.armed = true;
    }

    pub fn release(&mut self) {
        if self.holding {
            self.microphone.release();
            self.holding = false;
            log::info!("Microphone released");
        }
        self.armed = false;
        self.accum.clear();
        if !self.pending.is_empty() {
            log::debug!("Discarding {} unsent frames", self.pending.len());
            self.pending.clear();
        }
    }

    pub fn is_holding(&self) -> bool {
        self.holding
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Feed one microphone read. Returns the number of frames completed.
    pub fn push_samples(&mut self, samples: &[f32]) -> usize {
        if !self.armed {
            return 0;
        }
        self.accum.extend_from_slice(samples);

        let mut completed = 0;
        while self.accum.len() >= self.frame_size {
            let frame = &self.accum[..self.frame_size];
            let data = transport_codec::encode(&transport_codec::samples_to_wire(frame));
            self.pending
                .push_back(TransportPacket::pcm(data, self.sample_rate));
            // Remove the consumed frame from the accumulation buffer
            self.accum.drain(..self.frame_size);
            completed += 1;
        }
        completed
    }

    /// Send queued packets in order. On a send failure the packet stays at the head.
    pub fn flush(&mut self, link: &mut dyn RemoteLink) -> anyhow::Result<usize> {
        let mut sent = 0;
        while let Some(packet) = self.pending.pop_front() {
            if let Err(e) = link.send(&packet) {
                self.pending.push_front(packet);
                return Err(e);
            }
            sent += 1;
        }
        Ok(sent)
    }
}
