//! Text-to-speech through an OpenAI-style `/v1/audio/speech` endpoint.

use tracing::{debug, info};

use crate::assistant::audio;

const TTS_MODEL: &str = "tts-1";

pub struct TtsClient {
    endpoint: String,
    api_key: String,
    voice: String,
    client: reqwest::Client,
}

impl TtsClient {
    /// `endpoint` is the API base URL, e.g. "https://api.openai.com".
    pub fn new(endpoint: String, api_key: String, voice: String) -> Self {
        Self {
            endpoint,
            api_key,
            voice,
            client: reqwest::Client::new(),
        }
    }

    /// Speak `text`. Returns OGG Opus audio ready to send as a voice note.
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>, String> {
        let preview: String = text.chars().take(50).collect();
        info!("TTS ({}): \"{}\"", self.voice, preview);

        let response = self
            .client
            .post(self.speech_url())
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": TTS_MODEL,
                "input": text,
                "voice": self.voice,
                "response_format": "wav"
            }))
            .send()
            .await
            .map_err(|e| format!("TTS request failed: {e}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("TTS error {status}: {body}"));
        }

        let wav = response
            .bytes()
            .await
            .map_err(|e| format!("Failed to read TTS response: {e}"))?;
        debug!("Got {} bytes of WAV audio", wav.len());

        let ogg = tokio::task::spawn_blocking(move || audio::wav_to_ogg(&wav))
            .await
            .map_err(|e| format!("TTS conversion task failed: {e}"))??;

        info!("Generated {} bytes of voice audio", ogg.len());
        Ok(ogg)
    }

    fn speech_url(&self) -> String {
        format!("{}/v1/audio/speech", self.endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speech_url() {
        let client = TtsClient::new("http://localhost:8880".into(), "key".into(), "nova".into());
        assert_eq!(client.speech_url(), "http://localhost:8880/v1/audio/speech");
        assert_eq!(client.voice, "nova");
    }
}
