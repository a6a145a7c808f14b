//! External service boundaries.
//!
//! The core treats the messaging channel, presence service, and the three
//! media services as opaque collaborators behind dyn-compatible traits
//! (boxed-future methods). HTTP-backed implementations are provided for the
//! network services; the messaging transport and the media output sink are
//! platform concerns and are injected by the embedding layer.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::state::PresenceDelta;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outbound half of the pub/sub messaging channel. Inbound messages are
/// injected by the platform via `App::deliver_chat_message`.
pub trait ChatTransport: Send + Sync {
    fn publish(&self, conversation_id: String, text: String) -> BoxFuture<'_, anyhow::Result<()>>;
}

pub trait PresenceService: Send + Sync {
    /// Batched lookup, at most 25 ids per call.
    fn query(&self, ids: Vec<String>) -> BoxFuture<'_, anyhow::Result<PresenceDelta>>;
}

pub trait SpeechToText: Send + Sync {
    /// Audio blob in, transcript out (may be empty for silence).
    fn transcribe(&self, audio: Vec<u8>, speaker_id: String)
        -> BoxFuture<'_, anyhow::Result<String>>;
}

pub trait Translator: Send + Sync {
    fn translate(
        &self,
        text: String,
        target_language: String,
        speaker_id: String,
    ) -> BoxFuture<'_, anyhow::Result<String>>;
}

#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("no voice configured for this speaker")]
    VoiceNotConfigured,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub trait SpeechSynthesis: Send + Sync {
    fn synthesize(
        &self,
        text: String,
        voice_id: String,
    ) -> BoxFuture<'_, Result<Vec<u8>, SynthesisError>>;
}

/// Playback-layer sink. Volume changes address the participant's original
/// audio; `None` restores the platform default rather than any stored value.
pub trait MediaOutput: Send + Sync {
    fn set_participant_volume(&self, session_id: &str, volume: Option<f32>);
    fn play_translated_audio(&self, audio: Vec<u8>);
}

/// Explicitly constructed context object holding every external collaborator;
/// passed to `App::new` and torn down with the session.
#[derive(Clone)]
pub struct Services {
    pub chat: Arc<dyn ChatTransport>,
    pub presence: Arc<dyn PresenceService>,
    pub stt: Arc<dyn SpeechToText>,
    pub translator: Arc<dyn Translator>,
    pub tts: Arc<dyn SpeechSynthesis>,
    pub media: Arc<dyn MediaOutput>,
}

impl Services {
    /// HTTP-backed network services against the app's API base; transport and
    /// media sink remain platform-provided.
    pub fn over_http(
        api_base_url: &str,
        api_key: Option<&str>,
        chat: Arc<dyn ChatTransport>,
        media: Arc<dyn MediaOutput>,
    ) -> Self {
        let client = reqwest::Client::new();
        let base = api_base_url.trim_end_matches('/').to_string();
        let key = api_key.map(str::to_string);
        Self {
            chat,
            presence: Arc::new(HttpPresenceService {
                client: client.clone(),
                url: format!("{base}/presence/query"),
                api_key: key.clone(),
            }),
            stt: Arc::new(HttpSpeechToText {
                client: client.clone(),
                url: format!("{base}/call/stt"),
                api_key: key.clone(),
            }),
            translator: Arc::new(HttpTranslator {
                client: client.clone(),
                url: format!("{base}/call/translate"),
                api_key: key.clone(),
            }),
            tts: Arc::new(HttpSpeechSynthesis {
                client,
                url: format!("{base}/call/tts"),
                api_key: key,
            }),
            media,
        }
    }
}

fn with_auth(
    req: reqwest::RequestBuilder,
    api_key: &Option<String>,
) -> reqwest::RequestBuilder {
    match api_key {
        Some(key) => req.bearer_auth(key),
        None => req,
    }
}

struct HttpPresenceService {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl PresenceService for HttpPresenceService {
    fn query(&self, ids: Vec<String>) -> BoxFuture<'_, anyhow::Result<PresenceDelta>> {
        Box::pin(async move {
            let req = with_auth(self.client.post(&self.url), &self.api_key)
                .json(&serde_json::json!({ "ids": ids }));
            let resp = req.send().await?;
            if !resp.status().is_success() {
                anyhow::bail!("presence query failed: {}", resp.status());
            }
            let body: serde_json::Value = resp.json().await?;
            let mut delta = PresenceDelta::new();
            if let Some(map) = body.get("online").and_then(|v| v.as_object()) {
                for (id, v) in map {
                    if let Some(online) = v.as_bool() {
                        delta.insert(id.clone(), online);
                    }
                }
            }
            Ok(delta)
        })
    }
}

struct HttpSpeechToText {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl SpeechToText for HttpSpeechToText {
    fn transcribe(
        &self,
        audio: Vec<u8>,
        speaker_id: String,
    ) -> BoxFuture<'_, anyhow::Result<String>> {
        Box::pin(async move {
            tracing::debug!(bytes = audio.len(), %speaker_id, "stt request");
            let part = reqwest::multipart::Part::bytes(audio)
                .file_name("segment.webm")
                .mime_str("audio/webm")?;
            let form = reqwest::multipart::Form::new()
                .text("speakerUserId", speaker_id)
                .part("audio", part);
            let req = with_auth(self.client.post(&self.url), &self.api_key).multipart(form);
            let resp = req.send().await?;
            if !resp.status().is_success() {
                anyhow::bail!("stt failed: {}", resp.status());
            }
            let body: serde_json::Value = resp.json().await?;
            Ok(body
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string())
        })
    }
}

struct HttpTranslator {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl Translator for HttpTranslator {
    fn translate(
        &self,
        text: String,
        target_language: String,
        speaker_id: String,
    ) -> BoxFuture<'_, anyhow::Result<String>> {
        Box::pin(async move {
            let req = with_auth(self.client.post(&self.url), &self.api_key).json(
                &serde_json::json!({
                    "text": text,
                    "targetLanguage": target_language,
                    "speakerUserId": speaker_id,
                }),
            );
            let resp = req.send().await?;
            if !resp.status().is_success() {
                anyhow::bail!("translate failed: {}", resp.status());
            }
            let body: serde_json::Value = resp.json().await?;
            Ok(body
                .get("translatedText")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string())
        })
    }
}

struct HttpSpeechSynthesis {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl SpeechSynthesis for HttpSpeechSynthesis {
    fn synthesize(
        &self,
        text: String,
        voice_id: String,
    ) -> BoxFuture<'_, Result<Vec<u8>, SynthesisError>> {
        Box::pin(async move {
            let req = with_auth(self.client.post(&self.url), &self.api_key).json(
                &serde_json::json!({
                    "text": text,
                    "voiceId": voice_id,
                }),
            );
            let resp = req
                .send()
                .await
                .map_err(|e| SynthesisError::Other(e.into()))?;
            // The synthesis backend answers 400 when the speaker has no
            // usable voice; that is a configuration gap, not a transport
            // failure.
            if resp.status() == reqwest::StatusCode::BAD_REQUEST {
                return Err(SynthesisError::VoiceNotConfigured);
            }
            if !resp.status().is_success() {
                return Err(SynthesisError::Other(anyhow::anyhow!(
                    "tts failed: {}",
                    resp.status()
                )));
            }
            let bytes = resp
                .bytes()
                .await
                .map_err(|e| SynthesisError::Other(e.into()))?;
            Ok(bytes.to_vec())
        })
    }
}

/// Voice reference resolution is the caller's responsibility, not the
/// synthesis service's: a per-participant mapping with a caller-indifferent
/// default fallback.
pub(crate) fn resolve_voice(
    participant_voices: &HashMap<String, String>,
    default_voice_id: Option<&str>,
    user_id: &str,
) -> Option<String> {
    participant_voices
        .get(user_id)
        .cloned()
        .or_else(|| default_voice_id.map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_resolution_prefers_participant_mapping_then_default() {
        let mut voices = HashMap::new();
        voices.insert("alice".to_string(), "va".to_string());

        assert_eq!(
            resolve_voice(&voices, Some("vd"), "alice").as_deref(),
            Some("va")
        );
        assert_eq!(
            resolve_voice(&voices, Some("vd"), "bob").as_deref(),
            Some("vd")
        );
        assert_eq!(resolve_voice(&voices, None, "bob"), None);
    }
}
