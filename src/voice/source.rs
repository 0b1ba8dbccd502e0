//! Source voices: the decode-resample half of the per-tick pipeline.
//!
//! Each tick a source voice works out how many source frames its output
//! quota needs at the current stride, drives its decoder across the buffer
//! queue (firing loop and end-of-stream callbacks on the way), then
//! resamples the decoded window into the float cache the engine fans out.
//! All cursor arithmetic is 32.32 fixed point so repeated ticks never drift.

use std::collections::VecDeque;

use tracing::debug;

use crate::constants::{EXTRA_DECODE_PADDING, FIXED_FRACTION_MASK, FIXED_PRECISION};
use crate::decode::Decoder;
use crate::format::WaveFormat;
use crate::resample;
use crate::voice::buffer::{PlayBuffer, LOOP_INFINITE};
use crate::voice::callback::SourceCallbacks;

/// Variant state of a source voice.
pub(crate) struct SourceState {
    pub(crate) format: WaveFormat,
    pub(crate) decoder: Decoder,
    pub(crate) callbacks: SourceCallbacks,
    pub(crate) active: bool,

    /// Client-visible pitch ratio.
    pub(crate) freq_ratio: f64,
    /// Cached fixed-point stride and the ratio it was derived from; the
    /// sentinel 0.0 forces a recompute (valid ratios are never 0).
    pub(crate) step: u64,
    pub(crate) step_freq_ratio: f64,

    /// Persistent resampler phase accumulator.
    pub(crate) resample_offset: u64,
    /// Integer play cursor within the head buffer, in source samples.
    pub(crate) cur_offset: u32,
    /// Fractional part of the play cursor, always below `2^32`.
    pub(crate) cur_offset_frac: u64,

    pub(crate) buffers: VecDeque<PlayBuffer>,

    /// 16-bit decode scratch, sized for a worst-case tick plus padding.
    pub(crate) decode_cache: Vec<i16>,
    /// Float output of the resampler, consumed by the engine's fan-out.
    pub(crate) resample_cache: Vec<f32>,
    /// Frame capacity of the decode cache (padding included).
    pub(crate) decode_frames: u32,
    /// Frames this voice must produce per tick at `output_rate`.
    pub(crate) output_samples: u32,
    /// Input rate of the first send destination.
    pub(crate) output_rate: u32,
}

impl SourceState {
    pub(crate) fn new(format: WaveFormat, decoder: Decoder, callbacks: SourceCallbacks) -> Self {
        Self {
            format,
            decoder,
            callbacks,
            active: false,
            freq_ratio: 1.0,
            step: 0,
            step_freq_ratio: 0.0,
            resample_offset: 0,
            cur_offset: 0,
            cur_offset_frac: 0,
            buffers: VecDeque::new(),
            decode_cache: Vec::new(),
            resample_cache: Vec::new(),
            decode_frames: 0,
            output_samples: 0,
            output_rate: 0,
        }
    }

    /// Resize scratch caches for the current routing. Worst-case sizing
    /// against `max_freq_ratio` keeps the tick allocation-free.
    pub(crate) fn configure(&mut self, tick_frames: u32, master_rate: u32, output_rate: u32, max_freq_ratio: f64) {
        let channels = self.format.channels as usize;
        self.output_rate = output_rate;
        self.output_samples =
            ((tick_frames as u64 * output_rate as u64 + master_rate as u64 - 1) / master_rate as u64) as u32;
        self.decode_frames = (self.output_samples as f64 * max_freq_ratio * self.format.sample_rate as f64
            / output_rate as f64)
            .ceil() as u32
            + 1
            + EXTRA_DECODE_PADDING;
        self.decode_cache = vec![0; self.decode_frames as usize * channels];
        self.resample_cache = vec![0.0; self.output_samples as usize * channels];
        self.step_freq_ratio = 0.0;
        debug!(
            output_samples = self.output_samples,
            decode_frames = self.decode_frames,
            "source voice caches sized"
        );
    }

    /// One tick of decode + resample. Returns frames written to the
    /// resample cache; the engine applies volumes during the fan-out.
    pub(crate) fn run_tick(&mut self) -> u32 {
        // Recompute the stride only when the ratio moved.
        if self.step_freq_ratio != self.freq_ratio {
            self.step = resample::step_for(self.freq_ratio, self.format.sample_rate, self.output_rate);
            self.step_freq_ratio = self.freq_ratio;
        }

        // Last call for buffer data!
        if let Some(cb) = &mut self.callbacks.on_voice_processing_pass_start {
            cb(self.decode_cache.len() as u32 * 2);
        }

        let channels = self.format.channels as usize;
        let mut mixed: u32 = 0;
        while mixed < self.output_samples && !self.buffers.is_empty() {
            let remaining = (self.output_samples - mixed) as u64;

            // Source frames needed to cover the remaining output quota,
            // rounded up across the fractional carry.
            let mut to_decode = resample::frames_to_decode(remaining, self.step, self.cur_offset_frac);
            let reset_offset = self.decode_buffers(&mut to_decode);

            // Output frames the decoded window can satisfy, rounded back
            // down; never more than the quota.
            let to_resample =
                resample::frames_to_resample(to_decode, self.step, self.cur_offset_frac).min(remaining) as u32;

            let out =
                &mut self.resample_cache[mixed as usize * channels..(mixed + to_resample) as usize * channels];
            if resample::is_unity(self.step) {
                resample::convert(&self.decode_cache[..to_resample as usize * channels], out);
            } else if channels == 2 {
                resample::resample_stereo(
                    &self.decode_cache,
                    out,
                    to_resample as usize,
                    self.step,
                    &mut self.resample_offset,
                );
            } else {
                resample::resample_mono(
                    &self.decode_cache,
                    out,
                    to_resample as usize,
                    self.step,
                    &mut self.resample_offset,
                );
            }

            if !self.buffers.is_empty() {
                // Fold the consumed stride into the integer cursor, minus
                // whatever the decode pass already rewound.
                self.cur_offset_frac += to_resample as u64 * self.step;
                self.cur_offset = self
                    .cur_offset
                    .wrapping_add((self.cur_offset_frac >> FIXED_PRECISION) as u32)
                    .wrapping_sub(reset_offset);
                self.cur_offset_frac &= FIXED_FRACTION_MASK;
            } else {
                self.cur_offset = 0;
                self.cur_offset_frac = 0;
            }

            mixed += to_resample;
        }
        mixed
    }

    /// Drive the decoder across the (possibly looping) buffer queue until
    /// `to_decode` frames are in the decode cache. Returns the samples the
    /// caller must subtract from the integer cursor to account for loop
    /// rewinds; `to_decode` is adjusted to what was actually produced.
    fn decode_buffers(&mut self, to_decode: &mut u64) -> u32 {
        let channels = self.format.channels as usize;

        // Over-decode so the resampler's lookahead always has data.
        let request = *to_decode + EXTRA_DECODE_PADDING as u64;
        debug_assert!(request <= self.decode_frames as u64);

        let mut decoded: u32 = 0;
        let mut reset_offset: u32 = 0;

        while (decoded as u64) < request && !self.buffers.is_empty() {
            let decoding = (request - decoded as u64) as u32;
            let buffer = self.buffers.front().unwrap();

            // Start-of-buffer behavior
            if self.cur_offset == buffer.play_begin {
                if let Some(cb) = &mut self.callbacks.on_buffer_start {
                    cb(buffer.context);
                }
            }

            // While loop passes remain the window ends at the loop region's
            // end, otherwise at the play region's.
            let buffer = self.buffers.front().unwrap();
            let end = if buffer.loop_count > 0 && buffer.loop_length > 0 {
                buffer.loop_begin + buffer.loop_length
            } else {
                buffer.play_length
            };
            let end_read = end.saturating_sub(self.cur_offset).min(decoding);

            let out_start = decoded as usize * channels;
            self.decoder.decode(
                buffer,
                self.cur_offset,
                &mut self.decode_cache[out_start..out_start + end_read as usize * channels],
                &self.format,
            );

            // End-of-buffer behavior
            if end_read < decoding {
                reset_offset += end_read;
                let buffer = self.buffers.front_mut().unwrap();
                if buffer.loop_count > 0 && buffer.loop_begin < end {
                    self.cur_offset = buffer.loop_begin;
                    if buffer.loop_count < LOOP_INFINITE {
                        buffer.loop_count -= 1;
                    }
                    let context = buffer.context;
                    if let Some(cb) = &mut self.callbacks.on_loop_end {
                        cb(context);
                    }
                } else {
                    let context = buffer.context;
                    let end_of_stream = buffer.end_of_stream;

                    // For end-of-stream we can stop tracking the fraction.
                    if end_of_stream {
                        self.cur_offset_frac = 0;
                    }
                    if let Some(cb) = &mut self.callbacks.on_buffer_end {
                        cb(context);
                    }
                    if end_of_stream {
                        if let Some(cb) = &mut self.callbacks.on_stream_end {
                            cb();
                        }
                    }

                    // Consume the finished buffer.
                    self.buffers.pop_front();
                    if let Some(next) = self.buffers.front() {
                        self.cur_offset = next.play_begin;
                    } else {
                        // Zero the rest of the request; the count is i16
                        // elements, not frames, which consumers rely on.
                        let start = (decoded as usize + end_read as usize) * channels;
                        let count = (decoding - end_read) as usize;
                        let stop = (start + count).min(self.decode_cache.len());
                        if start < stop {
                            self.decode_cache[start..stop].fill(0);
                        }
                    }
                }
            }

            decoded += end_read;
        }

        // Mid-stream the padding is pure lookahead and is not part of the
        // served window; once the queue has drained, everything decoded is
        // real and gets served so streams end on their exact last sample.
        *to_decode = if self.buffers.is_empty() {
            decoded as u64
        } else {
            decoded as u64 - EXTRA_DECODE_PADDING as u64
        };
        reset_offset
    }
}
