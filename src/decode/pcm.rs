//! PCM window decoders.
//!
//! 8-bit samples are signed and promoted by a left shift; 16-bit samples are
//! copied as-is from little-endian wire order. A window that runs past the
//! client's data is zero-filled rather than trusted.

use crate::voice::buffer::PlayBuffer;

fn copy_pcm16(data: &[u8], start_byte: usize, out: &mut [i16]) {
    for (i, dst) in out.iter_mut().enumerate() {
        let off = start_byte + i * 2;
        *dst = match data.get(off..off + 2) {
            Some(bytes) => i16::from_le_bytes([bytes[0], bytes[1]]),
            None => 0,
        };
    }
}

fn copy_pcm8(data: &[u8], start_byte: usize, out: &mut [i16]) {
    for (i, dst) in out.iter_mut().enumerate() {
        *dst = match data.get(start_byte + i) {
            Some(&byte) => ((byte as i8) as i16) << 8,
            None => 0,
        };
    }
}

pub fn decode_mono_pcm8(buffer: &PlayBuffer, cur_offset: u32, out: &mut [i16]) {
    let start = (buffer.play_begin + cur_offset) as usize;
    copy_pcm8(&buffer.data, start, out);
}

pub fn decode_stereo_pcm8(buffer: &PlayBuffer, cur_offset: u32, out: &mut [i16]) {
    let start = ((buffer.play_begin + cur_offset) as usize) * 2;
    copy_pcm8(&buffer.data, start, out);
}

pub fn decode_mono_pcm16(buffer: &PlayBuffer, cur_offset: u32, out: &mut [i16]) {
    let start = ((buffer.play_begin + cur_offset) as usize) * 2;
    copy_pcm16(&buffer.data, start, out);
}

pub fn decode_stereo_pcm16(buffer: &PlayBuffer, cur_offset: u32, out: &mut [i16]) {
    let start = ((buffer.play_begin + cur_offset) as usize) * 4;
    copy_pcm16(&buffer.data, start, out);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm16_buffer(samples: &[i16]) -> PlayBuffer {
        PlayBuffer {
            data: samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
            play_length: samples.len() as u32,
            ..PlayBuffer::default()
        }
    }

    #[test]
    fn mono_pcm16_copies_window() {
        let buffer = pcm16_buffer(&[0, 16_384, -16_384, 32_767, -32_768, 0, 8_192, -8_192]);
        let mut out = [0i16; 4];
        decode_mono_pcm16(&buffer, 2, &mut out);
        assert_eq!(out, [-16_384, 32_767, -32_768, 0]);
    }

    #[test]
    fn mono_pcm16_honors_play_begin() {
        let mut buffer = pcm16_buffer(&[111, 222, 333, 444]);
        buffer.play_begin = 1;
        let mut out = [0i16; 2];
        decode_mono_pcm16(&buffer, 1, &mut out);
        assert_eq!(out, [333, 444]);
    }

    #[test]
    fn pcm8_promotes_by_shift() {
        let buffer = PlayBuffer {
            data: vec![0x00, 0x7F, 0x80, 0xFF],
            play_length: 4,
            ..PlayBuffer::default()
        };
        let mut out = [0i16; 4];
        decode_mono_pcm8(&buffer, 0, &mut out);
        assert_eq!(out, [0, 127 << 8, -128 << 8, -1 << 8]);
    }

    #[test]
    fn stereo_pcm16_interleaves() {
        let buffer = pcm16_buffer(&[10, -10, 20, -20, 30, -30]);
        let mut out = [0i16; 4];
        decode_stereo_pcm16(&buffer, 1, &mut out);
        assert_eq!(out, [20, -20, 30, -30]);
    }

    #[test]
    fn short_buffer_zero_fills() {
        let buffer = pcm16_buffer(&[1, 2]);
        let mut out = [99i16; 4];
        decode_mono_pcm16(&buffer, 0, &mut out);
        assert_eq!(out, [1, 2, 0, 0]);
    }
}
