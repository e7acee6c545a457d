use std::collections::BTreeMap;

use super::device::AudioOutput;
use super::transport_codec::{self, DecodeError};
use crate::events::ChunkId;

/// A chunk handed to the output, tracked until it finishes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledChunk {
    pub id: ChunkId,
    pub start: f64,
    pub duration: f64,
}

impl ScheduledChunk {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Gapless scheduler for inbound model audio.
///
/// Each chunk starts at `max(cursor, output clock)` and pushes the cursor forward
/// by its duration, so chunks queue back-to-back and a late chunk plays at once.
pub struct PlaybackScheduler {
    sample_rate: u32,
    channels: usize,
    cursor: f64,
    // BTreeMap keeps interruption order deterministic (oldest first)
    active: BTreeMap<ChunkId, ScheduledChunk>,
    next_id: ChunkId,
}

impl PlaybackScheduler {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            channels: usize::from(channels.max(1)),
            cursor: 0.0,
            active: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn active_chunks(&self) -> impl Iterator<Item = &ScheduledChunk> {
        self.active.values()
    }

    /// Decode a base64 PCM16 payload and schedule it.
    ///
    /// Returns `Ok(None)` when the payload carries no whole frame.
    pub fn schedule_payload(
        &mut self,
        payload: &str,
        output: &mut dyn AudioOutput,
    ) -> Result<Option<ScheduledChunk>, DecodeError> {
        let bytes = transport_codec::decode(payload)?;
        let channels = transport_codec::wire_to_samples(&bytes, self.channels);
        Ok(self.schedule_samples(channels, output))
    }

    pub fn schedule_samples(
        &mut self,
        channels: Vec<Vec<f32>>,
        output: &mut dyn AudioOutput,
    ) -> Option<ScheduledChunk> {
        let frame_count = channels.first().map_or(0, Vec::len);
        if frame_count == 0 {
            return None;
        }

        let duration = frame_count as f64 / f64::from(self.sample_rate);
        let start = self.cursor.max(output.current_time());
        let chunk = ScheduledChunk {
            id: self.next_id,
            start,
            duration,
        };
        self.next_id += 1;

        output.schedule(chunk.id, channels, start);
        self.cursor = start + duration;
        self.active.insert(chunk.id, chunk);

        log::debug!(
            "Scheduled chunk {}: start={:.3}s, duration={:.3}s, cursor={:.3}s",
            chunk.id,
            chunk.start,
            chunk.duration,
            self.cursor,
        );
        Some(chunk)
    }

    /// Natural end of a chunk. Returns false for ids no longer tracked.
    pub fn chunk_ended(&mut self, id: ChunkId) -> bool {
        self.active.remove(&id).is_some()
    }

    /// Barge-in: stop everything that is still queued or playing and rewind the cursor.
    ///
    /// Returns how many chunks were force-stopped.
    pub fn interrupt(&mut self, output: &mut dyn AudioOutput) -> usize {
        let stopped = self.active.len();
        for id in self.active.keys() {
            output.stop(*id);
        }
        self.active.clear();
        self.cursor = 0.0;
        stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeviceError;
    use crate::events::EventSender;

    #[derive(Default)]
    struct ClockOutput {
        now: f64,
        scheduled: Vec<(ChunkId, f64, usize)>,
        stopped: Vec<ChunkId>,
    }

    impl AudioOutput for ClockOutput {
        fn resume(&mut self, _: u32, _: u16, _: EventSender) -> Result<(), DeviceError> {
            Ok(())
        }
        fn current_time(&self) -> f64 {
            self.now
        }
        fn schedule(&mut self, id: ChunkId, channels: Vec<Vec<f32>>, start_at: f64) {
            self.scheduled.push((id, start_at, channels[0].len()));
        }
        fn stop(&mut self, id: ChunkId) {
            self.stopped.push(id);
        }
        fn suspend(&mut self) {}
    }

    fn silence(seconds: f64, rate: u32) -> Vec<Vec<f32>> {
        vec![vec![0.0; (seconds * f64::from(rate)) as usize]]
    }

    #[test]
    fn chunks_queue_back_to_back() {
        let mut out = ClockOutput { now: 10.0, ..Default::default() };
        let mut sched = PlaybackScheduler::new(24000, 1);

        let durations = [0.5, 0.25, 0.125, 1.0];
        let mut prev_end = None;
        for d in durations {
            let chunk = sched.schedule_samples(silence(d, 24000), &mut out).unwrap();
            if let Some(end) = prev_end {
                assert_eq!(chunk.start, end);
            }
            prev_end = Some(chunk.end());
        }
        assert_eq!(sched.cursor(), 10.0 + durations.iter().sum::<f64>());
        assert_eq!(sched.active_len(), 4);
    }

    #[test]
    fn late_chunk_plays_immediately() {
        let mut out = ClockOutput::default();
        let mut sched = PlaybackScheduler::new(24000, 1);

        sched.schedule_samples(silence(0.5, 24000), &mut out).unwrap();
        out.now = 3.0;
        let chunk = sched.schedule_samples(silence(0.5, 24000), &mut out).unwrap();
        assert_eq!(chunk.start, 3.0);
        assert_eq!(sched.cursor(), 3.5);
    }

    #[test]
    fn natural_end_removes_once() {
        let mut out = ClockOutput::default();
        let mut sched = PlaybackScheduler::new(24000, 1);
        let chunk = sched.schedule_samples(silence(0.1, 24000), &mut out).unwrap();

        assert!(sched.chunk_ended(chunk.id));
        assert!(!sched.chunk_ended(chunk.id));
        assert_eq!(sched.active_len(), 0);
        // cursor is untouched by natural completion
        assert!(sched.cursor() > 0.0);
    }

    #[test]
    fn interrupt_stops_all_and_resets_cursor() {
        let mut out = ClockOutput { now: 1.0, ..Default::default() };
        let mut sched = PlaybackScheduler::new(24000, 1);
        let a = sched.schedule_samples(silence(0.5, 24000), &mut out).unwrap();
        let b = sched.schedule_samples(silence(0.5, 24000), &mut out).unwrap();

        assert_eq!(sched.interrupt(&mut out), 2);
        assert_eq!(out.stopped, vec![a.id, b.id]);
        assert_eq!(sched.active_len(), 0);
        assert_eq!(sched.cursor(), 0.0);

        out.now = 1.2;
        let c = sched.schedule_samples(silence(0.5, 24000), &mut out).unwrap();
        assert_eq!(c.start, 1.2);

        // a late natural-end report for a flushed chunk is ignored
        assert!(!sched.chunk_ended(a.id));
        assert_eq!(sched.active_len(), 1);
    }

    #[test]
    fn payload_duration_uses_output_rate() {
        let mut out = ClockOutput::default();
        let mut sched = PlaybackScheduler::new(24000, 1);
        let pcm = vec![0u8; 24000 * 2 / 4];
        let payload = transport_codec::encode(&pcm);

        let chunk = sched.schedule_payload(&payload, &mut out).unwrap().unwrap();
        assert_eq!(chunk.duration, 0.25);
        assert_eq!(out.scheduled, vec![(chunk.id, 0.0, 6000)]);
    }

    #[test]
    fn empty_and_malformed_payloads() {
        let mut out = ClockOutput::default();
        let mut sched = PlaybackScheduler::new(24000, 1);

        assert_eq!(sched.schedule_payload("", &mut out).unwrap(), None);
        assert!(sched.schedule_payload("not base64!", &mut out).is_err());
        assert_eq!(sched.active_len(), 0);
        assert_eq!(sched.cursor(), 0.0);
    }
}
