//! Public streaming session API.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::engine::EngineInner;
use crate::error::LynxError;
use crate::resources;

/// Text produced by a single engine call.
#[derive(Debug, Clone)]
pub struct Transcript {
    /// Newly transcribed text; empty when nothing new was decoded.
    pub text: String,
    /// True when the engine detected a speech endpoint. Always false for
    /// transcripts returned by [`Lynx::flush`].
    pub is_endpoint: bool,
}

/// Configures and initializes a [`Lynx`] session.
pub struct LynxBuilder {
    access_key: String,
    model_path: PathBuf,
    library_path: PathBuf,
    endpoint_duration_sec: f32,
    enable_automatic_punctuation: bool,
}

impl LynxBuilder {
    const DEFAULT_ENDPOINT_DURATION_SEC: f32 = 1.0;

    pub fn new() -> Self {
        Self {
            access_key: String::new(),
            model_path: resources::default_model_path(),
            library_path: resources::default_library_path(),
            endpoint_duration_sec: Self::DEFAULT_ENDPOINT_DURATION_SEC,
            enable_automatic_punctuation: false,
        }
    }

    /// Access key issued with the engine license.
    pub fn access_key(mut self, access_key: impl Into<String>) -> Self {
        self.access_key = access_key.into();
        self
    }

    /// Path to the acoustic model file.
    pub fn model_path(mut self, model_path: impl Into<PathBuf>) -> Self {
        self.model_path = model_path.into();
        self
    }

    /// Path to the engine's shared library.
    pub fn library_path(mut self, library_path: impl Into<PathBuf>) -> Self {
        self.library_path = library_path.into();
        self
    }

    /// Silence duration, in seconds, after an utterance before the engine
    /// reports an endpoint. Zero disables endpoint detection.
    pub fn endpoint_duration_sec(mut self, endpoint_duration_sec: f32) -> Self {
        self.endpoint_duration_sec = endpoint_duration_sec;
        self
    }

    /// Insert punctuation into transcripts.
    pub fn enable_automatic_punctuation(mut self, enable: bool) -> Self {
        self.enable_automatic_punctuation = enable;
        self
    }

    /// Validates the configuration and initializes the engine.
    ///
    /// All argument validation happens before the dynamic loader is touched,
    /// so a bad configuration never dlopens anything.
    pub fn init(self) -> Result<Lynx, LynxError> {
        if self.access_key.is_empty() {
            return Err(LynxError::InvalidArgument(
                "access key is empty".to_string(),
            ));
        }
        if !self.endpoint_duration_sec.is_finite() || self.endpoint_duration_sec < 0.0 {
            return Err(LynxError::InvalidArgument(format!(
                "endpoint duration must be non-negative, got {}",
                self.endpoint_duration_sec
            )));
        }
        check_exists(&self.model_path, "model file")?;
        check_exists(&self.library_path, "engine library")?;

        let inner = EngineInner::init(
            &self.access_key,
            &self.model_path,
            &self.library_path,
            self.endpoint_duration_sec,
            self.enable_automatic_punctuation,
        )?;
        Ok(Lynx {
            inner: Arc::new(inner),
        })
    }
}

impl Default for LynxBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn check_exists(path: &Path, what: &str) -> Result<(), LynxError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(LynxError::Resource(format!(
            "{} not found at {}",
            what,
            path.display()
        )))
    }
}

/// A streaming transcription session.
///
/// Cheap to clone; clones share the underlying engine handle, which is
/// released when the last clone drops.
#[derive(Clone)]
pub struct Lynx {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for Lynx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lynx")
            .field("version", &self.inner.version())
            .field("sample_rate", &self.inner.sample_rate())
            .field("frame_length", &self.inner.frame_length())
            .finish()
    }
}

impl Lynx {
    /// Processes one frame of 16-bit mono PCM and returns any newly
    /// transcribed text. The frame must hold exactly [`Lynx::frame_length`]
    /// samples at [`Lynx::sample_rate`]. When `is_endpoint` is set on the
    /// result, call [`Lynx::flush`] to finalize the utterance.
    pub fn process(&self, pcm: &[i16]) -> Result<Transcript, LynxError> {
        let (text, is_endpoint) = self.inner.process(pcm)?;
        Ok(Transcript { text, is_endpoint })
    }

    /// Marks the end of the audio stream and returns any remaining text.
    pub fn flush(&self) -> Result<Transcript, LynxError> {
        let text = self.inner.flush()?;
        Ok(Transcript {
            text,
            is_endpoint: false,
        })
    }

    /// Samples per frame expected by [`Lynx::process`].
    pub fn frame_length(&self) -> u32 {
        self.inner.frame_length() as u32
    }

    /// Sample rate, in Hz, expected by [`Lynx::process`].
    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate() as u32
    }

    /// Version string reported by the engine.
    pub fn version(&self) -> &str {
        self.inner.version()
    }
}
