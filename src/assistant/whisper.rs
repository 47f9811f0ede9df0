//! Speech-to-text with a local Whisper model.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::assistant::audio;

/// Whisper transcription engine. Cheap to clone.
#[derive(Clone)]
pub struct Whisper {
    ctx: Arc<WhisperContext>,
    language: Option<String>,
}

impl Whisper {
    /// Load a model from a .bin file. `language` of `None` means auto-detect.
    pub fn new(model_path: &Path, language: Option<String>) -> Result<Self, String> {
        info!("Loading Whisper model from {:?}", model_path);

        if !model_path.exists() {
            return Err(format!("Model file not found: {:?}", model_path));
        }

        let ctx = WhisperContext::new_with_params(
            model_path.to_str().ok_or("Invalid model path")?,
            WhisperContextParameters::default(),
        )
        .map_err(|e| format!("Failed to load Whisper model: {e}"))?;

        info!("Whisper model loaded (language: {})", language.as_deref().unwrap_or("auto"));
        Ok(Self { ctx: Arc::new(ctx), language })
    }

    /// Transcribe a Telegram voice note. Blocks; call from `spawn_blocking`.
    pub fn transcribe(&self, ogg_data: &[u8]) -> Result<String, String> {
        debug!("Transcribing {} bytes of audio", ogg_data.len());
        let samples = audio::ogg_to_pcm(ogg_data)?;

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| format!("Failed to create Whisper state: {e}"))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some(self.language.as_deref().unwrap_or("auto")));
        params.set_translate(false);
        params.set_no_timestamps(true);

        state
            .full(params, &samples)
            .map_err(|e| format!("Whisper transcription failed: {e}"))?;

        let segments: Vec<String> = state
            .as_iter()
            .filter_map(|segment| segment.to_str().ok().map(|s| s.trim().to_string()))
            .filter(|s| !s.is_empty())
            .collect();
        let text = segments.join(" ");

        info!("Transcribed: \"{}\"", preview(&text, 100));
        Ok(text)
    }

    /// Transcribe on the blocking pool.
    pub async fn transcribe_async(&self, ogg_data: Vec<u8>) -> Result<String, String> {
        let whisper = self.clone();
        tokio::task::spawn_blocking(move || whisper.transcribe(&ogg_data))
            .await
            .map_err(|e| format!("Transcription task failed: {e}"))?
    }
}

/// First `max` characters, with an ellipsis if cut.
fn preview(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
