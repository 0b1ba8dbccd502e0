//! Voice records.
//!
//! The three voice variants share a small common record (channels, volumes,
//! sends); variant-specific state hangs off a tagged union. Voices live in
//! the engine's arena and reference each other by id, never by pointer.

pub mod buffer;
pub mod callback;
pub mod source;
pub mod submix;

use source::SourceState;
use submix::SubmixState;

/// Handle to a voice in its engine's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId(pub(crate) usize);

/// One routing edge: destination voice plus a channel coefficient matrix
/// laid out `[out_channel * in_channels + in_channel]`.
#[derive(Debug, Clone)]
pub struct VoiceSend {
    pub target: VoiceId,
    pub coefficients: Vec<f32>,
}

/// Send description accepted by the public API; a missing matrix gets the
/// default up/down-mix for the channel pair.
#[derive(Debug, Clone)]
pub struct SendDesc {
    pub target: VoiceId,
    pub coefficients: Option<Vec<f32>>,
}

impl SendDesc {
    pub fn to(target: VoiceId) -> Self {
        Self {
            target,
            coefficients: None,
        }
    }
}

/// Default coefficient matrix for an `in_channels` -> `out_channels` send.
pub(crate) fn default_matrix(in_channels: u32, out_channels: u32) -> Vec<f32> {
    let (inc, outc) = (in_channels as usize, out_channels as usize);
    let mut matrix = vec![0.0f32; inc * outc];
    match (inc, outc) {
        (1, _) => matrix.fill(1.0),
        (2, 1) => {
            matrix[0] = 0.5;
            matrix[1] = 0.5;
        }
        _ => {
            for c in 0..inc.min(outc) {
                matrix[c * inc + c] = 1.0;
            }
        }
    }
    matrix
}

pub(crate) enum VoiceKind {
    Source(SourceState),
    Submix(SubmixState),
    Master(MasterState),
}

pub(crate) struct MasterState {
    pub(crate) input_sample_rate: u32,
}

pub(crate) struct Voice {
    /// Input channel count of this voice's stream.
    pub(crate) channels: u32,
    pub(crate) volume: f32,
    pub(crate) channel_volume: Vec<f32>,
    pub(crate) sends: Vec<VoiceSend>,
    pub(crate) kind: VoiceKind,
}

impl Voice {
    /// Sample rate this voice consumes input at. Source voices pull rather
    /// than accept sends, so they have no input rate.
    pub(crate) fn input_rate(&self) -> Option<u32> {
        match &self.kind {
            VoiceKind::Source(_) => None,
            VoiceKind::Submix(mix) => Some(mix.input_sample_rate),
            VoiceKind::Master(master) => Some(master.input_sample_rate),
        }
    }

    pub(crate) fn as_source_mut(&mut self) -> Option<&mut SourceState> {
        match &mut self.kind {
            VoiceKind::Source(src) => Some(src),
            _ => None,
        }
    }
}
