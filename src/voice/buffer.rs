//! Client-submitted playback buffers.
//!
//! A source voice consumes its queue head-first; a buffer is dropped exactly
//! once, when its last sample has been produced (or its final loop expired
//! and the end-of-stream path ran).

use crate::common::errors::VoiceError;
use crate::format::WaveFormat;

/// `loop_count` value encoding an infinite loop.
pub const LOOP_INFINITE: u8 = 0xFF;

/// One immutable encoded audio region queued on a source voice.
#[derive(Debug, Clone)]
pub struct PlayBuffer {
    /// Encoded bytes in the voice's input format, little-endian wire order.
    pub data: Vec<u8>,
    /// First source sample to play.
    pub play_begin: u32,
    /// Source samples to play; 0 means "the whole buffer" and is resolved
    /// at submission.
    pub play_length: u32,
    /// First sample of the loop region.
    pub loop_begin: u32,
    /// Length of the loop region in source samples.
    pub loop_length: u32,
    /// Remaining loop passes: 0 = none, `LOOP_INFINITE` = forever,
    /// otherwise decremented on each completion.
    pub loop_count: u8,
    /// Marks the final buffer of the logical stream.
    pub end_of_stream: bool,
    /// Opaque token echoed back through buffer callbacks.
    pub context: u64,
    /// Seek table for stream-codec buffers (WMA/XMA).
    pub packets: Option<PacketTable>,
}

impl Default for PlayBuffer {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            play_begin: 0,
            play_length: 0,
            loop_begin: 0,
            loop_length: 0,
            loop_count: 0,
            end_of_stream: false,
            context: 0,
            packets: None,
        }
    }
}

impl PlayBuffer {
    /// Resolve defaults and sanity-check the buffer against the voice
    /// format before it is queued.
    pub(crate) fn prepare(&mut self, format: &WaveFormat, is_stream: bool) -> Result<(), VoiceError> {
        if self.data.is_empty() {
            return Err(VoiceError::InvalidBuffer {
                reason: "empty audio data".into(),
            });
        }

        let total = if let Some(packets) = &self.packets {
            packets.validate()?;
            // The cumulative table counts decoded bytes in f32 units, the
            // same normalization the stream adaptor seeks in.
            packets.total_decoded_bytes() / (format.channels * 4).max(1)
        } else if is_stream {
            return Err(VoiceError::InvalidBuffer {
                reason: "stream-codec buffer is missing its packet table".into(),
            });
        } else {
            format.samples_in(self.data.len())
        };

        if self.play_length == 0 {
            if self.play_begin >= total {
                return Err(VoiceError::InvalidBuffer {
                    reason: format!("play_begin {} past end of data ({total} samples)", self.play_begin),
                });
            }
            self.play_length = total - self.play_begin;
        }
        Ok(())
    }
}

/// Per-buffer seek table for packet-framed codecs: entry `i` is the total
/// decoded byte count of packets `0..=i`.
#[derive(Debug, Clone)]
pub struct PacketTable {
    pub cumulative_bytes: Vec<u32>,
}

impl PacketTable {
    pub fn packet_count(&self) -> usize {
        self.cumulative_bytes.len()
    }

    pub fn total_decoded_bytes(&self) -> u32 {
        *self.cumulative_bytes.last().unwrap_or(&0)
    }

    fn validate(&self) -> Result<(), VoiceError> {
        if self.cumulative_bytes.is_empty() {
            return Err(VoiceError::InvalidBuffer {
                reason: "packet table is empty".into(),
            });
        }
        if self.cumulative_bytes.windows(2).any(|w| w[1] < w[0]) {
            return Err(VoiceError::InvalidBuffer {
                reason: "packet table is not monotonically non-decreasing".into(),
            });
        }
        Ok(())
    }
}
