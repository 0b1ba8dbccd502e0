//! Callback records fired at fixed points inside a tick.
//!
//! Every slot is optional; absent slots cost an `is_some` check and nothing
//! else. Callbacks are never invoked from outside a tick.

/// Per-source-voice callbacks. Buffer-scoped slots receive the submitting
/// client's opaque context token.
#[derive(Default)]
pub struct SourceCallbacks {
    /// Start of this voice's mix pass; the argument is the worst-case byte
    /// count the decode pass may consume this tick.
    pub on_voice_processing_pass_start: Option<Box<dyn FnMut(u32)>>,
    /// End of this voice's mix pass.
    pub on_voice_processing_pass_end: Option<Box<dyn FnMut()>>,
    /// The head buffer's play cursor sits at its first sample.
    pub on_buffer_start: Option<Box<dyn FnMut(u64)>>,
    /// The head buffer was consumed and unlinked.
    pub on_buffer_end: Option<Box<dyn FnMut(u64)>>,
    /// One loop pass of the head buffer completed.
    pub on_loop_end: Option<Box<dyn FnMut(u64)>>,
    /// The buffer flagged end-of-stream finished.
    pub on_stream_end: Option<Box<dyn FnMut()>>,
}

impl std::fmt::Debug for SourceCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceCallbacks")
            .field("on_buffer_start", &self.on_buffer_start.is_some())
            .field("on_buffer_end", &self.on_buffer_end.is_some())
            .field("on_loop_end", &self.on_loop_end.is_some())
            .field("on_stream_end", &self.on_stream_end.is_some())
            .finish_non_exhaustive()
    }
}

/// Engine-level callbacks bracketing the whole tick.
#[derive(Default)]
pub struct EngineCallbacks {
    pub on_processing_pass_start: Option<Box<dyn FnMut()>>,
    pub on_processing_pass_end: Option<Box<dyn FnMut()>>,
}
