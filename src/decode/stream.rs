//! Packet-framed stream decoding (WMA / XMA).
//!
//! Stream codecs are stateful and packet-framed, but the decode driver asks
//! for arbitrary sample windows. This adaptor owns the only reference to the
//! codec, keeps an encoded-packet cursor plus a decoded-frame staging cache,
//! and reconciles the driver's random-access cursor against the codec's
//! forward-only position: small backwards deltas rewind inside the staged
//! frame, anything else becomes a packet-level seek through the buffer's
//! cumulative table.

use tracing::error;

use crate::common::errors::StreamError;
use crate::constants::{INT16_MAX_F, INT16_MIN_F, INT16_SCALE};
use crate::format::WaveFormat;
use crate::voice::buffer::PlayBuffer;

/// One decoded frame handed over by a codec.
#[derive(Default)]
pub struct StreamFrame {
    /// Frames (samples per channel) in `data`.
    pub frames: usize,
    /// When set, `data` is channel-major planes; otherwise interleaved.
    pub planar: bool,
    pub data: Vec<f32>,
}

/// The codec surface of the stream path: push encoded packets, pull decoded
/// float frames. [`StreamError::NeedsData`] from `receive_frame` requests
/// another packet; everything else is fatal for the current serve.
pub trait PacketDecoder {
    /// Trailing readable bytes the codec requires past each packet.
    fn input_padding(&self) -> usize;
    fn send_packet(&mut self, packet: &[u8]) -> Result<(), StreamError>;
    fn receive_frame(&mut self, frame: &mut StreamFrame) -> Result<(), StreamError>;
    /// Drop internal codec state ahead of a packet-level seek.
    fn flush(&mut self);
}

/// Per-voice stream decode state.
pub struct StreamState {
    codec: Box<dyn PacketDecoder>,
    /// Byte position of the next encoded packet in the current buffer.
    enc_offset: usize,
    /// Samples the driver believes this codec has produced so far.
    dec_offset: u64,
    /// Staging copy used when the client buffer lacks trailing padding;
    /// grown, never shrunk.
    padding: Vec<u8>,
    frame: StreamFrame,
    convert_cache: Vec<f32>,
    /// Frames staged in `convert_cache`.
    convert_samples: usize,
    /// First unread frame in `convert_cache`.
    convert_offset: usize,
}

/// First packet whose cumulative decoded-byte count covers `byte_offset`,
/// and the cumulative count before it.
fn locate_packet(cumulative_bytes: &[u32], byte_offset: u64) -> (usize, u64) {
    let packet_idx = cumulative_bytes
        .iter()
        .position(|&c| c as u64 > byte_offset)
        .unwrap_or(cumulative_bytes.len().saturating_sub(1));
    let cumulative = if packet_idx == 0 {
        0
    } else {
        cumulative_bytes[packet_idx - 1] as u64
    };
    (packet_idx, cumulative)
}

impl StreamState {
    pub fn new(codec: Box<dyn PacketDecoder>) -> Self {
        Self {
            codec,
            enc_offset: 0,
            dec_offset: 0,
            padding: Vec::new(),
            frame: StreamFrame::default(),
            convert_cache: Vec::new(),
            convert_samples: 0,
            convert_offset: 0,
        }
    }

    /// Pull the next frame out of the codec, feeding packets from `data` as
    /// requested. `Ok(false)` means the buffer has no packets left.
    fn fill_convert_cache(&mut self, data: &[u8], block_align: usize, channels: usize) -> Result<bool, StreamError> {
        loop {
            match self.codec.receive_frame(&mut self.frame) {
                Ok(()) => break,
                Err(StreamError::NeedsData) => {
                    if self.enc_offset >= data.len() {
                        self.convert_samples = 0;
                        self.convert_offset = 0;
                        return Ok(false);
                    }

                    let pad = self.codec.input_padding();
                    if self.enc_offset + block_align + pad > data.len() {
                        // The client buffer does not guarantee readable bytes
                        // past its end; stage the tail with zeroed padding.
                        let remain = data.len() - self.enc_offset;
                        let staged = (remain + pad).max(block_align);
                        if self.padding.len() < staged {
                            self.padding.resize(staged, 0);
                        }
                        self.padding[..remain].copy_from_slice(&data[self.enc_offset..]);
                        self.padding[remain..].fill(0);
                        self.codec.send_packet(&self.padding[..block_align])?;
                    } else {
                        self.codec
                            .send_packet(&data[self.enc_offset..self.enc_offset + block_align])?;
                    }
                    self.enc_offset += block_align;
                }
                Err(err) => return Err(err),
            }
        }

        // Stage the frame interleaved, transposing planar layouts.
        let total = self.frame.frames * channels;
        if self.convert_cache.len() < total {
            self.convert_cache.resize(total, 0.0);
        }
        if self.frame.planar {
            for s in 0..self.frame.frames {
                for c in 0..channels {
                    self.convert_cache[s * channels + c] = self.frame.data[c * self.frame.frames + s];
                }
            }
        } else {
            self.convert_cache[..total].copy_from_slice(&self.frame.data[..total]);
        }
        self.convert_samples = self.frame.frames;
        self.convert_offset = 0;
        Ok(true)
    }

    /// Reposition so the next served sample is `cur_offset`.
    fn reseek(&mut self, buffer: &PlayBuffer, cur_offset: u32, format: &WaveFormat) -> Result<(), StreamError> {
        let Some(packets) = &buffer.packets else {
            return Err(StreamError::Decode(
                "seek requested on a buffer without a packet table".into(),
            ));
        };

        let channels = format.channels as usize;
        let out_sample_size = channels * std::mem::size_of::<f32>();
        let byte_offset = cur_offset as u64 * out_sample_size as u64;
        let (packet_idx, cumulative) = locate_packet(&packets.cumulative_bytes, byte_offset);

        self.enc_offset = packet_idx * format.block_align as usize;
        self.codec.flush();
        self.convert_samples = 0;
        self.convert_offset = 0;
        self.fill_convert_cache(&buffer.data, format.block_align as usize, channels)?;
        self.convert_offset = ((byte_offset - cumulative) / out_sample_size as u64) as usize;
        self.dec_offset = cur_offset as u64;
        Ok(())
    }

    /// Serve `out.len() / channels` frames starting at `cur_offset`,
    /// converted into the shared 16-bit decode cache. Decode failures
    /// zero-fill the remainder; the cursor keeps advancing either way.
    pub fn decode(&mut self, buffer: &PlayBuffer, cur_offset: u32, out: &mut [i16], format: &WaveFormat) {
        let channels = format.channels as usize;
        let samples = out.len() / channels;
        let block_align = format.block_align as usize;

        // Reconcile the driver's cursor with the codec position.
        let mut need_seek = false;
        if (cur_offset as u64) < self.dec_offset {
            // A small backwards delta is the resampler re-reading after a
            // fractional-position correction; rewind inside the staged frame
            // when it still covers the target.
            let delta = self.dec_offset - cur_offset as u64;
            if self.convert_offset as u64 >= delta {
                self.convert_offset -= delta as usize;
                self.dec_offset = cur_offset as u64;
            } else {
                need_seek = true;
            }
        } else if (cur_offset as u64) > self.dec_offset {
            need_seek = true;
        }

        if need_seek {
            if let Err(err) = self.reseek(buffer, cur_offset, format) {
                error!(%err, cur_offset, "stream seek failed");
                out.fill(0);
                self.dec_offset += samples as u64;
                return;
            }
        }

        let mut done = 0usize;
        while done < samples {
            if self.convert_offset >= self.convert_samples {
                match self.fill_convert_cache(&buffer.data, block_align, channels) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(err) => {
                        error!(%err, "stream decode failed, serving silence");
                        break;
                    }
                }
            }

            let available = self.convert_samples - self.convert_offset;
            if available == 0 {
                break;
            }

            let todo = available.min(samples - done);
            let src = &self.convert_cache[self.convert_offset * channels..];
            let dst = &mut out[done * channels..(done + todo) * channels];
            for (d, s) in dst.iter_mut().zip(src) {
                *d = (s * INT16_SCALE).clamp(INT16_MIN_F, INT16_MAX_F) as i16;
            }
            done += todo;
            self.convert_offset += todo;
        }

        if done < samples {
            out[done * channels..].fill(0);
        }
        self.dec_offset += samples as u64;
    }
}

impl std::fmt::Debug for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamState")
            .field("enc_offset", &self.enc_offset)
            .field("dec_offset", &self.dec_offset)
            .field("convert_samples", &self.convert_samples)
            .field("convert_offset", &self.convert_offset)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::buffer::PacketTable;

    const ALIGN: usize = 16;

    /// Scripted codec: every packet becomes one frame of `frames_per_packet`
    /// mono samples whose value is the packet's first byte (normalized).
    struct FakeCodec {
        queued: Vec<Vec<u8>>,
        frames_per_packet: usize,
        fail_after: Option<usize>,
        packets_seen: usize,
        flushed: usize,
    }

    impl FakeCodec {
        fn new(frames_per_packet: usize) -> Self {
            Self {
                queued: Vec::new(),
                frames_per_packet,
                fail_after: None,
                packets_seen: 0,
                flushed: 0,
            }
        }
    }

    impl PacketDecoder for FakeCodec {
        fn input_padding(&self) -> usize {
            8
        }

        fn send_packet(&mut self, packet: &[u8]) -> Result<(), StreamError> {
            self.packets_seen += 1;
            if let Some(limit) = self.fail_after {
                if self.packets_seen > limit {
                    return Err(StreamError::Decode("scripted failure".into()));
                }
            }
            self.queued.push(packet.to_vec());
            Ok(())
        }

        fn receive_frame(&mut self, frame: &mut StreamFrame) -> Result<(), StreamError> {
            let Some(packet) = self.queued.pop() else {
                return Err(StreamError::NeedsData);
            };
            frame.frames = self.frames_per_packet;
            frame.planar = false;
            frame.data = vec![packet[0] as f32 / 256.0; self.frames_per_packet];
            Ok(())
        }

        fn flush(&mut self) {
            self.flushed += 1;
            self.queued.clear();
        }
    }

    fn stream_buffer(packet_count: usize, frames_per_packet: usize) -> PlayBuffer {
        // Packet i is ALIGN bytes of the value i + 1.
        let mut data = Vec::new();
        for i in 0..packet_count {
            data.extend(std::iter::repeat((i + 1) as u8).take(ALIGN));
        }
        let cumulative = (1..=packet_count)
            .map(|i| (i * frames_per_packet * 4) as u32)
            .collect();
        PlayBuffer {
            data,
            play_length: (packet_count * frames_per_packet) as u32,
            packets: Some(PacketTable {
                cumulative_bytes: cumulative,
            }),
            ..PlayBuffer::default()
        }
    }

    fn wma_format() -> WaveFormat {
        let mut format = WaveFormat::pcm(44_100, 1, 16);
        format.format_tag = crate::format::WAVE_FORMAT_WMAUDIO2;
        format.block_align = ALIGN as u32;
        format
    }

    #[test]
    fn locate_packet_first_covering() {
        // Cumulative table [100, 200, 300]: byte 250 lives in packet 2 and
        // 200 bytes precede it.
        assert_eq!(locate_packet(&[100, 200, 300], 250), (2, 200));
        assert_eq!(locate_packet(&[100, 200, 300], 0), (0, 0));
        assert_eq!(locate_packet(&[100, 200, 300], 100), (1, 100));
        // Past-the-end falls back to the last packet.
        assert_eq!(locate_packet(&[100, 200, 300], 400), (2, 200));
    }

    #[test]
    fn sequential_serve_feeds_packets_in_order() {
        let buffer = stream_buffer(3, 32);
        let format = wma_format();
        let mut state = StreamState::new(Box::new(FakeCodec::new(32)));

        let mut out = vec![0i16; 64];
        state.decode(&buffer, 0, &mut out, &format);
        // First 32 samples from packet 1, next 32 from packet 2.
        let one = (1.0 / 256.0 * 32_768.0) as i16;
        let two = (2.0 / 256.0 * 32_768.0) as i16;
        assert_eq!(out[0], one);
        assert_eq!(out[31], one);
        assert_eq!(out[32], two);
        assert_eq!(state.dec_offset, 64);
    }

    #[test]
    fn seek_lands_on_covering_packet() {
        let buffer = stream_buffer(3, 32);
        let format = wma_format();
        let mut state = StreamState::new(Box::new(FakeCodec::new(32)));

        // Sample 70 is byte 280; cumulative [128, 256, 384] puts it in
        // packet 2 with 256 bytes before it.
        let mut out = vec![0i16; 16];
        state.decode(&buffer, 70, &mut out, &format);
        assert_eq!(state.enc_offset, 3 * ALIGN);
        assert_eq!(state.dec_offset, 70 + 16);
        let three = (3.0 / 256.0 * 32_768.0) as i16;
        assert_eq!(out[0], three);
        // (280 - 256) / 4 = 6 frames skipped, 10 served before this call's
        // advance of the staging cursor.
        assert_eq!(state.convert_offset, 6 + 16);
    }

    #[test]
    fn small_rewind_stays_local() {
        let buffer = stream_buffer(3, 32);
        let format = wma_format();
        let mut state = StreamState::new(Box::new(FakeCodec::new(32)));

        let mut out = vec![0i16; 16];
        state.decode(&buffer, 0, &mut out, &format);
        assert_eq!(state.dec_offset, 16);

        // Two samples back: served from the staged frame, no reseek.
        let mut out = vec![0i16; 4];
        state.decode(&buffer, 14, &mut out, &format);
        assert_eq!(state.dec_offset, 18);
        let one = (1.0 / 256.0 * 32_768.0) as i16;
        assert_eq!(out[0], one);
    }

    #[test]
    fn tail_packet_is_padded() {
        // 24 bytes of data with 16-byte packets: the second packet is short
        // and must arrive zero-extended.
        let mut buffer = stream_buffer(2, 32);
        buffer.data.truncate(24);
        let format = wma_format();

        struct Probe {
            inner: FakeCodec,
        }
        impl PacketDecoder for Probe {
            fn input_padding(&self) -> usize {
                self.inner.input_padding()
            }
            fn send_packet(&mut self, packet: &[u8]) -> Result<(), StreamError> {
                assert_eq!(packet.len(), ALIGN);
                if self.inner.packets_seen == 1 {
                    // 8 real bytes, 8 zeroed
                    assert!(packet[..8].iter().all(|&b| b == 2));
                    assert!(packet[8..].iter().all(|&b| b == 0));
                }
                self.inner.send_packet(packet)
            }
            fn receive_frame(&mut self, frame: &mut StreamFrame) -> Result<(), StreamError> {
                self.inner.receive_frame(frame)
            }
            fn flush(&mut self) {
                self.inner.flush()
            }
        }

        let mut state = StreamState::new(Box::new(Probe {
            inner: FakeCodec::new(32),
        }));
        let mut out = vec![0i16; 64];
        state.decode(&buffer, 0, &mut out, &format);
        assert_ne!(out[40], 0);
    }

    #[test]
    fn decode_failure_serves_silence() {
        let buffer = stream_buffer(3, 32);
        let format = wma_format();
        let mut codec = FakeCodec::new(32);
        codec.fail_after = Some(1);
        let mut state = StreamState::new(Box::new(codec));

        let mut out = vec![0x11i16; 64];
        state.decode(&buffer, 0, &mut out, &format);
        // First packet decoded, second failed: tail is zeroed and the
        // cursor still advanced by the full request.
        assert_ne!(out[0], 0);
        assert!(out[32..].iter().all(|&s| s == 0));
        assert_eq!(state.dec_offset, 64);
    }

    #[test]
    fn planar_frames_are_transposed() {
        struct Planar;
        impl PacketDecoder for Planar {
            fn input_padding(&self) -> usize {
                0
            }
            fn send_packet(&mut self, _packet: &[u8]) -> Result<(), StreamError> {
                Ok(())
            }
            fn receive_frame(&mut self, frame: &mut StreamFrame) -> Result<(), StreamError> {
                frame.frames = 3;
                frame.planar = true;
                // L plane then R plane
                frame.data = vec![0.1, 0.2, 0.3, -0.1, -0.2, -0.3];
                Ok(())
            }
            fn flush(&mut self) {}
        }

        let mut state = StreamState::new(Box::new(Planar));
        let produced = state.fill_convert_cache(&[0u8; 16], 16, 2).unwrap();
        assert!(produced);
        let cache = &state.convert_cache[..6];
        assert_eq!(cache, &[0.1, -0.1, 0.2, -0.2, 0.3, -0.3]);
    }
}
