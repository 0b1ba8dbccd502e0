//! Source wave formats and codec selection.
//!
//! The codec set is closed: a voice's decoder is chosen here once, at
//! creation time, from the format tag plus channel count. Unknown tags are
//! rejected so no partial voice state ever exists for an undecodable format.

use crate::common::errors::VoiceError;

// ── Wave format tags ─────────────────────────────────────────────────────────

pub const WAVE_FORMAT_PCM: u16 = 0x0001;
pub const WAVE_FORMAT_MSADPCM: u16 = 0x0002;
pub const WAVE_FORMAT_WMAUDIO2: u16 = 0x0161;
pub const WAVE_FORMAT_WMAUDIO3: u16 = 0x0162;
pub const WAVE_FORMAT_XMAUDIO2: u16 = 0x0166;

/// Input format of a source voice, as submitted by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveFormat {
    pub format_tag: u16,
    pub channels: u32,
    pub sample_rate: u32,
    pub bits_per_sample: u32,
    /// For MSADPCM this is the per-channel nibble alignment; for stream
    /// codecs the encoded packet size in bytes.
    pub block_align: u32,
    /// Trailing codec-specific bytes (`cbSize` region of the wire format).
    pub extra: Vec<u8>,
}

impl WaveFormat {
    pub fn pcm(sample_rate: u32, channels: u32, bits_per_sample: u32) -> Self {
        Self {
            format_tag: WAVE_FORMAT_PCM,
            channels,
            sample_rate,
            bits_per_sample,
            block_align: channels * bits_per_sample / 8,
            extra: Vec::new(),
        }
    }

    pub fn msadpcm(sample_rate: u32, channels: u32, block_align: u32) -> Self {
        Self {
            format_tag: WAVE_FORMAT_MSADPCM,
            channels,
            sample_rate,
            bits_per_sample: 4,
            block_align,
            extra: Vec::new(),
        }
    }

    /// Source samples represented by `byte_len` bytes of encoded data.
    pub fn samples_in(&self, byte_len: usize) -> u32 {
        match self.format_tag {
            WAVE_FORMAT_MSADPCM => {
                let block_bytes = (self.block_align + 22) * self.channels;
                let blocks = byte_len as u32 / block_bytes.max(1);
                blocks * (self.block_align + 16) * 2
            }
            _ => {
                let frame = (self.channels * self.bits_per_sample / 8).max(1);
                byte_len as u32 / frame
            }
        }
    }
}

// ── Codec selection ──────────────────────────────────────────────────────────

/// Stream codecs that decode through the packet adaptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamCodec {
    WmaV2,
    WmaPro,
    Xma2,
}

/// The closed set of decode paths a source voice can be created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    MonoPcm8,
    StereoPcm8,
    MonoPcm16,
    StereoPcm16,
    MonoMsAdpcm,
    StereoMsAdpcm,
    Stream(StreamCodec),
}

impl WaveFormat {
    fn unsupported(&self) -> VoiceError {
        VoiceError::UnsupportedFormat {
            tag: self.format_tag,
            channels: self.channels,
            bits: self.bits_per_sample,
        }
    }

    /// Map the format onto a decode path, rejecting anything outside the
    /// supported set.
    pub fn codec(&self) -> Result<CodecKind, VoiceError> {
        match (self.format_tag, self.channels) {
            (WAVE_FORMAT_PCM, 1) if self.bits_per_sample == 8 => Ok(CodecKind::MonoPcm8),
            (WAVE_FORMAT_PCM, 2) if self.bits_per_sample == 8 => Ok(CodecKind::StereoPcm8),
            (WAVE_FORMAT_PCM, 1) if self.bits_per_sample == 16 => Ok(CodecKind::MonoPcm16),
            (WAVE_FORMAT_PCM, 2) if self.bits_per_sample == 16 => Ok(CodecKind::StereoPcm16),
            (WAVE_FORMAT_MSADPCM, 1) => Ok(CodecKind::MonoMsAdpcm),
            (WAVE_FORMAT_MSADPCM, 2) => Ok(CodecKind::StereoMsAdpcm),
            (WAVE_FORMAT_WMAUDIO2, 1..=2) => Ok(CodecKind::Stream(StreamCodec::WmaV2)),
            (WAVE_FORMAT_WMAUDIO3, 1..=2) => Ok(CodecKind::Stream(StreamCodec::WmaPro)),
            (WAVE_FORMAT_XMAUDIO2, 1..=2) => Ok(CodecKind::Stream(StreamCodec::Xma2)),
            _ => Err(self.unsupported()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_pcm() {
        assert_eq!(
            WaveFormat::pcm(44_100, 1, 16).codec().unwrap(),
            CodecKind::MonoPcm16
        );
        assert_eq!(
            WaveFormat::pcm(44_100, 2, 8).codec().unwrap(),
            CodecKind::StereoPcm8
        );
    }

    #[test]
    fn select_msadpcm() {
        assert_eq!(
            WaveFormat::msadpcm(22_050, 2, 128).codec().unwrap(),
            CodecKind::StereoMsAdpcm
        );
    }

    #[test]
    fn select_stream() {
        let mut format = WaveFormat::pcm(44_100, 2, 16);
        format.format_tag = WAVE_FORMAT_WMAUDIO3;
        assert_eq!(
            format.codec().unwrap(),
            CodecKind::Stream(StreamCodec::WmaPro)
        );
    }

    #[test]
    fn reject_unknown() {
        let mut format = WaveFormat::pcm(44_100, 2, 16);
        format.format_tag = 0x0003; // IEEE float
        assert!(matches!(
            format.codec(),
            Err(VoiceError::UnsupportedFormat { tag: 0x0003, .. })
        ));

        // 24-bit PCM is outside the set
        let format = WaveFormat::pcm(44_100, 2, 24);
        assert!(format.codec().is_err());

        // as is anything above stereo
        let format = WaveFormat::pcm(44_100, 6, 16);
        assert!(format.codec().is_err());
    }

    #[test]
    fn samples_in_encoded_data() {
        let format = WaveFormat::pcm(44_100, 2, 16);
        assert_eq!(format.samples_in(400), 100);

        let format = WaveFormat::msadpcm(44_100, 1, 128);
        // one 150-byte block decodes to (128 + 16) * 2 samples
        assert_eq!(format.samples_in(150), 288);
    }
}
