//! Software mixer for clocked outputs.
//!
//! The clock is a frame counter owned by the output thread. Voices are placed
//! on it by start frame and summed one period at a time.

use crate::events::ChunkId;

struct Voice {
    id: ChunkId,
    channels: Vec<Vec<f32>>,
    start_frame: u64,
}

impl Voice {
    fn len(&self) -> u64 {
        self.channels.first().map_or(0, |c| c.len() as u64)
    }

    fn end_frame(&self) -> u64 {
        self.start_frame + self.len()
    }
}

// 最近一个排队的声部：请求的结束帧和实际的结束帧
struct ChainTail {
    id: ChunkId,
    requested_end: u64,
    actual_end: u64,
}

#[derive(Default)]
pub struct Mixer {
    voices: Vec<Voice>,
    tail: Option<ChainTail>,
}

impl Mixer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Place a voice at `start_frame`. `now` is the first frame not yet mixed.
    ///
    /// A start already in the past is moved to `now`, so nothing is cut off. A
    /// voice requested back-to-back with the previous one follows that voice's
    /// actual end, so a shifted chain stays gapless.
    pub fn play(&mut self, id: ChunkId, channels: Vec<Vec<f32>>, start_frame: u64, now: u64) {
        let mut start = start_frame;
        if let Some(tail) = &self.tail {
            // 秒到帧的换算有舍入，允许一帧误差
            if start_frame.abs_diff(tail.requested_end) <= 1 {
                start = tail.actual_end;
            }
        }
        let start = start.max(now);
        if start != start_frame {
            log::debug!("Chunk {} moved from frame {} to {}", id, start_frame, start);
        }

        let voice = Voice {
            id,
            channels,
            start_frame: start,
        };
        self.tail = Some(ChainTail {
            id,
            requested_end: start_frame + voice.len(),
            actual_end: voice.end_frame(),
        });
        self.voices.push(voice);
    }

    pub fn stop(&mut self, id: ChunkId) {
        self.voices.retain(|v| v.id != id);
        if self.tail.as_ref().is_some_and(|t| t.id == id) {
            self.tail = None;
        }
    }

    /// Mix frames `[now, now + period)` into `mix` (interleaved, `channels` wide).
    ///
    /// Returns the ids of voices that finished within this period; they are
    /// dropped and never reported again.
    pub fn mix_period(&mut self, now: u64, period: usize, channels: usize, mix: &mut [f32]) -> Vec<ChunkId> {
        let end = now + period as u64;
        mix.iter_mut().for_each(|s| *s = 0.0);

        for voice in &self.voices {
            if voice.channels.is_empty() || voice.start_frame >= end || voice.end_frame() <= now {
                continue;
            }
            let from = voice.start_frame.max(now);
            let to = voice.end_frame().min(end);
            for t in from..to {
                let f = (t - now) as usize;
                let idx = (t - voice.start_frame) as usize;
                for ch in 0..channels {
                    // 单声道数据铺到所有输出声道
                    let src = &voice.channels[ch.min(voice.channels.len() - 1)];
                    mix[f * channels + ch] += src[idx];
                }
            }
        }

        let mut ended = Vec::new();
        self.voices.retain(|v| {
            if v.end_frame() <= end {
                ended.push(v.id);
                false
            } else {
                true
            }
        });
        ended
    }
}
