//! The engine: voice arena, client-facing mutation API, and the tick.
//!
//! One tick = one `update()` call on the caller's thread: sources decode and
//! resample into their float caches and fan out into submix accumulators or
//! the master output, then submixes run in ascending stage order. All voice
//! state is owned here and mutated only inside the tick; the driving layer
//! serializes its own mutations against `update()`.

use tracing::{debug, warn};

use crate::common::errors::{StreamError, VoiceError};
use crate::config::EngineConfig;
use crate::constants::{MAX_FREQ_RATIO, MAX_VOLUME_LEVEL, MIN_FREQ_RATIO};
use crate::decode::stream::PacketDecoder;
use crate::decode::Decoder;
use crate::format::{CodecKind, StreamCodec, WaveFormat};
use crate::voice::buffer::PlayBuffer;
use crate::voice::callback::{EngineCallbacks, SourceCallbacks};
use crate::voice::source::SourceState;
use crate::voice::submix::{LinearResampler, SubmixState};
use crate::voice::{default_matrix, MasterState, SendDesc, Voice, VoiceId, VoiceKind, VoiceSend};

/// Opens a packet decoder for a stream-codec voice. The codec itself is an
/// external collaborator; without a registered factory the stream format
/// tags are rejected at voice creation.
pub type StreamCodecFactory =
    Box<dyn Fn(&WaveFormat, StreamCodec) -> Result<Box<dyn PacketDecoder>, StreamError>>;

pub struct Engine {
    config: EngineConfig,
    tick_frames: u32,
    voices: Vec<Voice>,
    master: VoiceId,
    callbacks: Vec<(u64, EngineCallbacks)>,
    next_callback_id: u64,
    submix_stages: u32,
    active: bool,
    stream_factory: Option<StreamCodecFactory>,
}

/// Disjoint mutable borrows of two arena slots.
fn voice_pair_mut(voices: &mut [Voice], a: usize, b: usize) -> (&mut Voice, &mut Voice) {
    debug_assert_ne!(a, b);
    if a < b {
        let (left, right) = voices.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = voices.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

/// Accumulate a source's float cache into a destination stream through the
/// send matrix, with the source's volumes applied. Each accumulation is
/// individually clipped; the running sum is not re-clipped afterwards.
fn accumulate_scaled(
    src: &[f32],
    frames: usize,
    in_ch: usize,
    channel_volume: &[f32],
    volume: f32,
    coefficients: &[f32],
    dst: &mut [f32],
    out_ch: usize,
) {
    let frames = frames.min(dst.len() / out_ch);
    for j in 0..frames {
        for co in 0..out_ch {
            for ci in 0..in_ch {
                let value = src[j * in_ch + ci]
                    * channel_volume[ci]
                    * volume
                    * coefficients[co * in_ch + ci];
                dst[j * out_ch + co] =
                    (dst[j * out_ch + co] + value).clamp(-MAX_VOLUME_LEVEL, MAX_VOLUME_LEVEL);
            }
        }
    }
}

/// Submix fan-out: volumes are already baked into the cache, only the send
/// matrix applies.
fn accumulate(src: &[f32], frames: usize, in_ch: usize, coefficients: &[f32], dst: &mut [f32], out_ch: usize) {
    let frames = frames.min(dst.len() / out_ch);
    for j in 0..frames {
        for co in 0..out_ch {
            for ci in 0..in_ch {
                let value = src[j * in_ch + ci] * coefficients[co * in_ch + ci];
                dst[j * out_ch + co] =
                    (dst[j * out_ch + co] + value).clamp(-MAX_VOLUME_LEVEL, MAX_VOLUME_LEVEL);
            }
        }
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let tick_frames = config.tick_frames();
        let master_voice = Voice {
            channels: config.channels,
            volume: 1.0,
            channel_volume: vec![1.0; config.channels as usize],
            sends: Vec::new(),
            kind: VoiceKind::Master(MasterState {
                input_sample_rate: config.sample_rate,
            }),
        };
        debug!(
            sample_rate = config.sample_rate,
            channels = config.channels,
            tick_frames,
            "engine created"
        );
        Self {
            config,
            tick_frames,
            voices: vec![master_voice],
            master: VoiceId(0),
            callbacks: Vec::new(),
            next_callback_id: 0,
            submix_stages: 0,
            active: true,
            stream_factory: None,
        }
    }

    pub fn master(&self) -> VoiceId {
        self.master
    }

    /// Frames written to the output buffer per tick.
    pub fn tick_frames(&self) -> u32 {
        self.tick_frames
    }

    pub fn start(&mut self) {
        self.active = true;
    }

    pub fn stop(&mut self) {
        self.active = false;
    }

    /// Register the codec opener used by WMA/XMA voice creation.
    pub fn set_stream_codec_factory(&mut self, factory: StreamCodecFactory) {
        self.stream_factory = Some(factory);
    }

    pub fn register_callbacks(&mut self, callbacks: EngineCallbacks) -> u64 {
        let id = self.next_callback_id;
        self.next_callback_id += 1;
        self.callbacks.push((id, callbacks));
        id
    }

    pub fn unregister_callbacks(&mut self, id: u64) {
        self.callbacks.retain(|(cb_id, _)| *cb_id != id);
    }

    // ── Voice creation ───────────────────────────────────────────────────────

    pub fn create_source_voice(
        &mut self,
        format: WaveFormat,
        callbacks: SourceCallbacks,
        sends: Option<Vec<SendDesc>>,
    ) -> Result<VoiceId, VoiceError> {
        let kind = format.codec()?;

        let codec = match kind {
            CodecKind::Stream(stream_codec) => {
                let Some(factory) = &self.stream_factory else {
                    warn!(tag = format.format_tag, "stream format without a codec factory");
                    return Err(VoiceError::UnsupportedFormat {
                        tag: format.format_tag,
                        channels: format.channels,
                        bits: format.bits_per_sample,
                    });
                };
                match factory(&format, stream_codec) {
                    Ok(codec) => Some(codec),
                    Err(err) => {
                        warn!(%err, tag = format.format_tag, "stream codec open failed");
                        return Err(VoiceError::UnsupportedFormat {
                            tag: format.format_tag,
                            channels: format.channels,
                            bits: format.bits_per_sample,
                        });
                    }
                }
            }
            _ => None,
        };
        let decoder = Decoder::new(kind, &format, codec)?;

        let descs = sends.unwrap_or_else(|| vec![SendDesc::to(self.master)]);
        let resolved = self.resolve_sends(format.channels, None, &descs)?;
        let output_rate = self.first_send_rate(&resolved);

        let mut state = SourceState::new(format, decoder, callbacks);
        state.configure(
            self.tick_frames,
            self.config.sample_rate,
            output_rate,
            self.config.max_frequency_ratio,
        );

        let channels = state.format.channels;
        self.voices.push(Voice {
            channels,
            volume: 1.0,
            channel_volume: vec![1.0; channels as usize],
            sends: resolved,
            kind: VoiceKind::Source(state),
        });
        let id = VoiceId(self.voices.len() - 1);
        debug!(voice = id.0, "source voice created");
        Ok(id)
    }

    pub fn create_submix_voice(
        &mut self,
        input_channels: u32,
        input_sample_rate: u32,
        processing_stage: u32,
        sends: Option<Vec<SendDesc>>,
    ) -> Result<VoiceId, VoiceError> {
        let descs = sends.unwrap_or_else(|| vec![SendDesc::to(self.master)]);
        let resolved = self.resolve_sends(input_channels, Some(processing_stage), &descs)?;
        let output_rate = self.first_send_rate(&resolved);

        let input_frames = Self::scaled_frames(self.tick_frames, input_sample_rate, self.config.sample_rate);
        let output_frames =
            Self::scaled_frames(self.tick_frames, output_rate, self.config.sample_rate) + 1;

        self.voices.push(Voice {
            channels: input_channels,
            volume: 1.0,
            channel_volume: vec![1.0; input_channels as usize],
            sends: resolved,
            kind: VoiceKind::Submix(SubmixState {
                input_sample_rate,
                processing_stage,
                input_cache: vec![0.0; input_frames as usize * input_channels as usize],
                resample_cache: vec![0.0; output_frames as usize * input_channels as usize],
                output_rate,
                resampler: Box::new(LinearResampler::new(
                    input_sample_rate,
                    output_rate,
                    input_channels as usize,
                )),
            }),
        });
        self.submix_stages = self.submix_stages.max(processing_stage + 1);
        let id = VoiceId(self.voices.len() - 1);
        debug!(voice = id.0, stage = processing_stage, "submix voice created");
        Ok(id)
    }

    // ── Voice mutation ───────────────────────────────────────────────────────

    pub fn set_sends(&mut self, voice: VoiceId, sends: Vec<SendDesc>) -> Result<(), VoiceError> {
        let (in_channels, own_stage) = {
            let v = self.voices.get(voice.0).ok_or(VoiceError::InvalidSend { target: voice.0 })?;
            let stage = match &v.kind {
                VoiceKind::Submix(mix) => Some(mix.processing_stage),
                _ => None,
            };
            (v.channels, stage)
        };
        let resolved = self.resolve_sends(in_channels, own_stage, &sends)?;
        let output_rate = self.first_send_rate(&resolved);

        let tick_frames = self.tick_frames;
        let master_rate = self.config.sample_rate;
        let max_ratio = self.config.max_frequency_ratio;
        let v = &mut self.voices[voice.0];
        match &mut v.kind {
            VoiceKind::Source(src) => {
                src.configure(tick_frames, master_rate, output_rate, max_ratio);
            }
            VoiceKind::Submix(mix) => {
                let output_frames = Self::scaled_frames(tick_frames, output_rate, master_rate) + 1;
                mix.output_rate = output_rate;
                mix.resample_cache = vec![0.0; output_frames as usize * in_channels as usize];
                mix.resampler = Box::new(LinearResampler::new(
                    mix.input_sample_rate,
                    output_rate,
                    in_channels as usize,
                ));
            }
            VoiceKind::Master(_) => return Err(VoiceError::InvalidSend { target: voice.0 }),
        }
        v.sends = resolved;
        Ok(())
    }

    pub fn set_volume(&mut self, voice: VoiceId, volume: f32) {
        if let Some(v) = self.voices.get_mut(voice.0) {
            v.volume = volume;
        }
    }

    pub fn set_channel_volumes(&mut self, voice: VoiceId, volumes: &[f32]) -> Result<(), VoiceError> {
        let Some(v) = self.voices.get_mut(voice.0) else {
            return Err(VoiceError::InvalidSend { target: voice.0 });
        };
        if volumes.len() != v.channels as usize {
            return Err(VoiceError::BadCoefficients {
                got: volumes.len(),
                expected: v.channels as usize,
            });
        }
        v.channel_volume.copy_from_slice(volumes);
        Ok(())
    }

    /// Set a source voice's pitch ratio, clamped to the engine's configured
    /// range. The stride is recomputed lazily at the next tick.
    pub fn set_frequency_ratio(&mut self, voice: VoiceId, ratio: f64) {
        let max = self.config.max_frequency_ratio.min(MAX_FREQ_RATIO);
        if let Some(src) = self.voices.get_mut(voice.0).and_then(|v| v.as_source_mut()) {
            src.freq_ratio = ratio.clamp(MIN_FREQ_RATIO, max);
        } else {
            warn!(voice = voice.0, "set_frequency_ratio on a non-source voice");
        }
    }

    pub fn frequency_ratio(&self, voice: VoiceId) -> Option<f64> {
        match &self.voices.get(voice.0)?.kind {
            VoiceKind::Source(src) => Some(src.freq_ratio),
            _ => None,
        }
    }

    pub fn start_voice(&mut self, voice: VoiceId) {
        if let Some(src) = self.voices.get_mut(voice.0).and_then(|v| v.as_source_mut()) {
            src.active = true;
        }
    }

    pub fn stop_voice(&mut self, voice: VoiceId) {
        if let Some(src) = self.voices.get_mut(voice.0).and_then(|v| v.as_source_mut()) {
            src.active = false;
        }
    }

    /// Queue a buffer on a source voice.
    pub fn submit_buffer(&mut self, voice: VoiceId, mut buffer: PlayBuffer) -> Result<(), VoiceError> {
        let Some(src) = self.voices.get_mut(voice.0).and_then(|v| v.as_source_mut()) else {
            return Err(VoiceError::InvalidBuffer {
                reason: format!("voice #{} is not a source voice", voice.0),
            });
        };
        buffer.prepare(&src.format, src.decoder.is_stream())?;
        if src.buffers.is_empty() {
            src.cur_offset = buffer.play_begin;
        }
        src.buffers.push_back(buffer);
        Ok(())
    }

    pub fn queued_buffers(&self, voice: VoiceId) -> usize {
        match self.voices.get(voice.0).map(|v| &v.kind) {
            Some(VoiceKind::Source(src)) => src.buffers.len(),
            _ => 0,
        }
    }

    // ── The tick ─────────────────────────────────────────────────────────────

    /// Produce one tick of audio into `output`, which must hold
    /// `tick_frames * master_channels` interleaved floats. Accumulations are
    /// clipped individually; the final sum is the caller's to tame.
    pub fn update(&mut self, output: &mut [f32]) {
        if !self.active {
            return;
        }

        for (_, cb) in self.callbacks.iter_mut() {
            if let Some(f) = &mut cb.on_processing_pass_start {
                f();
            }
        }

        let master_channels = self.voices[self.master.0].channels;
        let expected = (self.tick_frames * master_channels) as usize;
        if output.len() != expected {
            warn!(got = output.len(), expected, "output buffer length mismatch, skipping tick");
        } else {
            output.fill(0.0);

            for idx in 0..self.voices.len() {
                let runs = matches!(&self.voices[idx].kind, VoiceKind::Source(src) if src.active);
                if runs {
                    self.mix_source(idx, output);
                }
            }

            for stage in 0..self.submix_stages {
                for idx in 0..self.voices.len() {
                    let runs = matches!(&self.voices[idx].kind,
                        VoiceKind::Submix(mix) if mix.processing_stage == stage);
                    if runs {
                        self.mix_submix(idx, output);
                    }
                }
            }
        }

        for (_, cb) in self.callbacks.iter_mut() {
            if let Some(f) = &mut cb.on_processing_pass_end {
                f();
            }
        }
    }

    fn mix_source(&mut self, idx: usize, output: &mut [f32]) {
        let mixed = {
            let Some(src) = self.voices[idx].as_source_mut() else { return };
            src.run_tick() as usize
        };

        if mixed > 0 {
            for s in 0..self.voices[idx].sends.len() {
                let target = self.voices[idx].sends[s].target;
                if target == self.master {
                    let voice = &self.voices[idx];
                    let VoiceKind::Source(src) = &voice.kind else { return };
                    let master_channels = self.voices[self.master.0].channels as usize;
                    accumulate_scaled(
                        &src.resample_cache,
                        mixed,
                        voice.channels as usize,
                        &voice.channel_volume,
                        voice.volume,
                        &voice.sends[s].coefficients,
                        output,
                        master_channels,
                    );
                } else {
                    let (voice, dest) = voice_pair_mut(&mut self.voices, idx, target.0);
                    let VoiceKind::Source(src) = &voice.kind else { return };
                    let VoiceKind::Submix(mix) = &mut dest.kind else { continue };
                    accumulate_scaled(
                        &src.resample_cache,
                        mixed,
                        voice.channels as usize,
                        &voice.channel_volume,
                        voice.volume,
                        &voice.sends[s].coefficients,
                        &mut mix.input_cache,
                        dest.channels as usize,
                    );
                }
            }
        }

        if let Some(src) = self.voices[idx].as_source_mut() {
            if let Some(cb) = &mut src.callbacks.on_voice_processing_pass_end {
                cb();
            }
        }
    }

    fn mix_submix(&mut self, idx: usize, output: &mut [f32]) {
        let resampled = {
            let voice = &mut self.voices[idx];
            let has_sends = !voice.sends.is_empty();
            let channels = voice.channels as usize;
            let VoiceKind::Submix(mix) = &mut voice.kind else { return };
            if !has_sends {
                mix.clear_input();
                return;
            }
            mix.run_resample(channels, &voice.channel_volume, voice.volume)
        };

        for s in 0..self.voices[idx].sends.len() {
            let target = self.voices[idx].sends[s].target;
            if target == self.master {
                let voice = &self.voices[idx];
                let VoiceKind::Submix(mix) = &voice.kind else { return };
                let master_channels = self.voices[self.master.0].channels as usize;
                accumulate(
                    &mix.resample_cache,
                    resampled,
                    voice.channels as usize,
                    &voice.sends[s].coefficients,
                    output,
                    master_channels,
                );
            } else {
                let (voice, dest) = voice_pair_mut(&mut self.voices, idx, target.0);
                let VoiceKind::Submix(mix) = &voice.kind else { return };
                let VoiceKind::Submix(dst_mix) = &mut dest.kind else { continue };
                accumulate(
                    &mix.resample_cache,
                    resampled,
                    voice.channels as usize,
                    &voice.sends[s].coefficients,
                    &mut dst_mix.input_cache,
                    dest.channels as usize,
                );
            }
        }

        // Zero the accumulator for the next tick.
        if let VoiceKind::Submix(mix) = &mut self.voices[idx].kind {
            mix.clear_input();
        }
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn scaled_frames(tick_frames: u32, rate: u32, master_rate: u32) -> u32 {
        ((tick_frames as u64 * rate as u64 + master_rate as u64 - 1) / master_rate as u64) as u32
    }

    fn input_rate_of(&self, id: VoiceId) -> Option<u32> {
        self.voices.get(id.0).and_then(|v| v.input_rate())
    }

    fn first_send_rate(&self, sends: &[VoiceSend]) -> u32 {
        sends
            .first()
            .and_then(|s| self.input_rate_of(s.target))
            .unwrap_or(self.config.sample_rate)
    }

    fn resolve_sends(
        &self,
        in_channels: u32,
        own_stage: Option<u32>,
        descs: &[SendDesc],
    ) -> Result<Vec<VoiceSend>, VoiceError> {
        let mut resolved = Vec::with_capacity(descs.len());
        for desc in descs {
            let Some(target) = self.voices.get(desc.target.0) else {
                return Err(VoiceError::InvalidSend { target: desc.target.0 });
            };
            if target.input_rate().is_none() {
                // Source voices pull from buffers; they cannot be sent to.
                return Err(VoiceError::InvalidSend { target: desc.target.0 });
            }
            if let (Some(stage), VoiceKind::Submix(dst)) = (own_stage, &target.kind) {
                if dst.processing_stage <= stage {
                    return Err(VoiceError::StageOrdering {
                        stage,
                        target_stage: dst.processing_stage,
                    });
                }
            }

            let expected = (in_channels * target.channels) as usize;
            let coefficients = match &desc.coefficients {
                Some(matrix) if matrix.len() == expected => matrix.clone(),
                Some(matrix) => {
                    return Err(VoiceError::BadCoefficients {
                        got: matrix.len(),
                        expected,
                    })
                }
                None => default_matrix(in_channels, target.channels),
            };
            resolved.push(VoiceSend {
                target: desc.target,
                coefficients,
            });
        }
        Ok(resolved)
    }
}
