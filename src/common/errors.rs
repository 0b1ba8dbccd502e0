//! Error types for voice configuration and stream decoding.

use thiserror::Error;

/// Errors raised while creating or reconfiguring a voice.
///
/// None of these leave partial state behind: a failed creation does not
/// register a voice, a failed reconfiguration keeps the previous settings.
#[derive(Error, Debug)]
pub enum VoiceError {
    /// The wave format tag / channel / bit-depth combination is outside the
    /// supported set, or the stream codec could not be opened.
    #[error("unsupported source format: tag {tag:#06x}, {channels} channel(s), {bits} bits per sample")]
    UnsupportedFormat { tag: u16, channels: u32, bits: u32 },

    /// A send references a voice that does not exist or cannot accept input.
    #[error("invalid send target: voice #{target}")]
    InvalidSend { target: usize },

    /// A send coefficient matrix does not match `out_channels * in_channels`.
    #[error("send coefficient matrix has {got} entries, expected {expected}")]
    BadCoefficients { got: usize, expected: usize },

    /// A submix may only send to destinations in a strictly later stage.
    #[error("processing stage {stage} must be lower than the send target's stage {target_stage}")]
    StageOrdering { stage: u32, target_stage: u32 },

    /// A submitted buffer failed validation.
    #[error("buffer rejected: {reason}")]
    InvalidBuffer { reason: String },
}

/// Errors crossing the packet-decoder boundary of the stream codec path.
#[derive(Error, Debug)]
pub enum StreamError {
    /// The codec wants another encoded packet before it can emit a frame.
    /// This is the only retryable variant; it drives packet feeding.
    #[error("decoder needs more input data")]
    NeedsData,

    /// Packet submission or frame reception failed. Fatal for the current
    /// serve; the remainder of the request is zero-filled.
    #[error("packet decode failed: {0}")]
    Decode(String),

    /// The codec could not be opened for this format.
    #[error("stream codec unavailable: {0}")]
    Unsupported(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = VoiceError::UnsupportedFormat {
            tag: 0x0163,
            channels: 4,
            bits: 24,
        };
        assert!(err.to_string().contains("0x0163"));
        assert!(err.to_string().contains("4 channel"));

        let err = VoiceError::BadCoefficients { got: 3, expected: 4 };
        assert_eq!(
            err.to_string(),
            "send coefficient matrix has 3 entries, expected 4"
        );
    }
}
