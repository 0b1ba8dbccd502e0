//! Decoders: one buffer slice in, 16-bit interleaved samples out.
//!
//! The codec set is closed, so the "decode function pointer" is a tagged
//! variant dispatched at the single call site in the decode driver. Variants
//! that need scratch state own it.

pub mod adpcm;
pub mod pcm;
pub mod stream;

use crate::common::errors::VoiceError;
use crate::format::{CodecKind, WaveFormat};
use crate::voice::buffer::PlayBuffer;
use stream::{PacketDecoder, StreamState};

/// A source voice's decode path, selected once at voice creation.
#[derive(Debug)]
pub enum Decoder {
    MonoPcm8,
    StereoPcm8,
    MonoPcm16,
    StereoPcm16,
    MonoMsAdpcm { block_cache: Vec<i16> },
    StereoMsAdpcm { block_cache: Vec<i16> },
    Stream(StreamState),
}

impl Decoder {
    /// Build the decoder for a classified format. Stream codecs require the
    /// opened packet decoder; without one the format is unsupported.
    pub(crate) fn new(
        kind: CodecKind,
        format: &WaveFormat,
        codec: Option<Box<dyn PacketDecoder>>,
    ) -> Result<Self, VoiceError> {
        let block_samples = ((format.block_align + 16) * 2) as usize;
        Ok(match kind {
            CodecKind::MonoPcm8 => Decoder::MonoPcm8,
            CodecKind::StereoPcm8 => Decoder::StereoPcm8,
            CodecKind::MonoPcm16 => Decoder::MonoPcm16,
            CodecKind::StereoPcm16 => Decoder::StereoPcm16,
            CodecKind::MonoMsAdpcm => Decoder::MonoMsAdpcm {
                block_cache: vec![0; block_samples],
            },
            CodecKind::StereoMsAdpcm => Decoder::StereoMsAdpcm {
                block_cache: vec![0; block_samples * 2],
            },
            CodecKind::Stream(_) => match codec {
                Some(codec) => Decoder::Stream(StreamState::new(codec)),
                None => {
                    return Err(VoiceError::UnsupportedFormat {
                        tag: format.format_tag,
                        channels: format.channels,
                        bits: format.bits_per_sample,
                    })
                }
            },
        })
    }

    pub(crate) fn is_stream(&self) -> bool {
        matches!(self, Decoder::Stream(_))
    }

    /// Decode `out.len() / channels` frames of the buffer starting at
    /// `cur_offset` source samples.
    pub(crate) fn decode(&mut self, buffer: &PlayBuffer, cur_offset: u32, out: &mut [i16], format: &WaveFormat) {
        match self {
            Decoder::MonoPcm8 => pcm::decode_mono_pcm8(buffer, cur_offset, out),
            Decoder::StereoPcm8 => pcm::decode_stereo_pcm8(buffer, cur_offset, out),
            Decoder::MonoPcm16 => pcm::decode_mono_pcm16(buffer, cur_offset, out),
            Decoder::StereoPcm16 => pcm::decode_stereo_pcm16(buffer, cur_offset, out),
            Decoder::MonoMsAdpcm { block_cache } => {
                adpcm::decode_mono(buffer, cur_offset, out, format.block_align, block_cache)
            }
            Decoder::StereoMsAdpcm { block_cache } => {
                adpcm::decode_stereo(buffer, cur_offset, out, format.block_align, block_cache)
            }
            Decoder::Stream(state) => state.decode(buffer, cur_offset, out, format),
        }
    }
}
