//! Per-tick audio mixing core following the XAudio2 processing model.
//!
//! Source voices decode client-submitted buffers (PCM8/16, MSADPCM, or a
//! packet-framed stream codec), resample them with a drift-free fixed-point
//! stride, and fan out through send matrices into submix accumulators and
//! the master output. One [`Engine::update`] call produces one tick of
//! interleaved float audio on the caller's thread.

pub mod common;
pub mod config;
pub mod constants;
pub mod decode;
pub mod engine;
pub mod format;
pub mod resample;
pub mod voice;

pub use common::errors::{StreamError, VoiceError};
pub use config::{EngineConfig, LoggingConfig};
pub use decode::stream::{PacketDecoder, StreamFrame};
pub use engine::{Engine, StreamCodecFactory};
pub use format::{StreamCodec, WaveFormat};
pub use voice::buffer::{PacketTable, PlayBuffer, LOOP_INFINITE};
pub use voice::callback::{EngineCallbacks, SourceCallbacks};
pub use voice::submix::{LinearResampler, PlatformResampler};
pub use voice::{SendDesc, VoiceId};
