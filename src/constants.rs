//! Central constants for the mixing core.
//!
//! All magic numbers in `src/**` live here so they can be tuned in one
//! place and remain consistent across modules.

// ── Fixed-point stride ───────────────────────────────────────────────────────

/// Bits reserved for the fractional part of a stride/phase value.
pub const FIXED_PRECISION: u32 = 32;

/// 1.0 in 32.32 fixed point.
pub const FIXED_ONE: u64 = 1 << FIXED_PRECISION;

/// Masks the fractional block of a 32.32 value.
pub const FIXED_FRACTION_MASK: u64 = FIXED_ONE - 1;

// ── Volume / frequency ratio ─────────────────────────────────────────────────

/// Per-accumulation clip boundary for send mixing (2^24).
pub const MAX_VOLUME_LEVEL: f32 = 16_777_216.0;

/// Lowest frequency ratio a source voice accepts.
pub const MIN_FREQ_RATIO: f64 = 1.0 / 1024.0;

/// Hard ceiling for the configurable maximum frequency ratio.
pub const MAX_FREQ_RATIO: f64 = 1024.0;

/// Default maximum frequency ratio when the config does not set one.
pub const DEFAULT_MAX_FREQ_RATIO: f64 = 2.0;

// ── Decode scratch ───────────────────────────────────────────────────────────

/// Source frames the decode driver reads past the requested window.
/// The decode cache is allocated with this padding included and the
/// end-of-buffer zero fill counts i16 elements, not frames; consumers may
/// rely on the padded region, so both are part of the decode contract.
pub const EXTRA_DECODE_PADDING: u32 = 2;

// ── i16 PCM clip boundaries ──────────────────────────────────────────────────

pub const INT16_MAX_F: f32 = 32_767.0;
pub const INT16_MIN_F: f32 = -32_768.0;

/// Scale factor between normalized float and 16-bit samples.
pub const INT16_SCALE: f32 = 32_768.0;

// ── Engine tick ──────────────────────────────────────────────────────────────

/// Tick length as a divisor of the master sample rate (10 ms quantum).
pub const TICK_RATE_DIVISOR: u32 = 100;
