//! Per-participant streaming translation: capture -> STT -> translate -> TTS
//! -> playback, one cycle in flight per participant.
//!
//! The pipeline stages run on the core's runtime and report back as a single
//! [`CycleOutcome`]; all state transitions happen on the actor thread.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::AppCore;
use crate::core::services::{
    resolve_voice, SpeechSynthesis, SpeechToText, SynthesisError, Translator,
};
use crate::state::Screen;
use crate::updates::{CoreMsg, CycleOutcome, InternalEvent};

#[derive(Debug)]
struct ParticipantPipeline {
    user_id: String,
    has_audio: bool,
    /// At most one STT->translate->TTS cycle per participant; segments that
    /// arrive while one runs are dropped, never queued.
    in_flight: bool,
}

#[derive(Debug, Default)]
pub(super) struct TranslationRuntime {
    participants: HashMap<String, ParticipantPipeline>,
    /// Session ids whose original audio we set to zero; exactly this set is
    /// restored on teardown.
    muted: HashSet<String>,
    /// Speakers already warned about a missing voice, once per session.
    warned_no_voice: HashSet<String>,
}

impl AppCore {
    pub(super) fn handle_set_translation_enabled(&mut self, enabled: bool) {
        if self.state.translation.enabled == enabled {
            return;
        }
        if enabled {
            let has_voice = self
                .config
                .my_voice_id
                .as_deref()
                .map(str::trim)
                .is_some_and(|v| !v.is_empty());
            if !has_voice {
                self.toast("Add your voice in your profile before enabling translation");
                self.navigate_to(Screen::Profile);
                return;
            }
            self.state.translation.enabled = true;
            self.emit_translation();
            self.mute_audible_participants();
        } else {
            self.state.translation.enabled = false;
            self.emit_translation();
            self.restore_muted_participants();
        }
    }

    pub(super) fn handle_set_target_language(&mut self, language: String) {
        let language = language.trim().to_lowercase();
        if language.is_empty() || self.state.translation.target_language == language {
            return;
        }
        self.state.translation.target_language = language;
        self.emit_translation();
    }

    pub(super) fn handle_participant_joined(
        &mut self,
        session_id: String,
        user_id: String,
        has_audio: bool,
    ) {
        tracing::debug!(%session_id, %user_id, has_audio, "participant joined");
        let enabled = self.state.translation.enabled;
        self.pipelines.participants.insert(
            session_id.clone(),
            ParticipantPipeline {
                user_id,
                has_audio,
                in_flight: false,
            },
        );
        if enabled && has_audio {
            self.mute_participant(&session_id);
        }
    }

    pub(super) fn handle_participant_left(&mut self, session_id: &str) {
        tracing::debug!(%session_id, "participant left");
        self.pipelines.participants.remove(session_id);
        if self.pipelines.muted.remove(session_id) {
            self.services.media.set_participant_volume(session_id, None);
        }
    }

    pub(super) fn handle_audio_segment(
        &mut self,
        session_id: String,
        user_id: String,
        audio: Vec<u8>,
    ) {
        if !self.state.translation.enabled {
            return;
        }
        let entry = self
            .pipelines
            .participants
            .entry(session_id.clone())
            .or_insert_with(|| ParticipantPipeline {
                user_id: user_id.clone(),
                has_audio: true,
                in_flight: false,
            });
        entry.has_audio = true;
        if entry.in_flight {
            tracing::debug!(%session_id, "segment dropped, cycle already in flight");
            return;
        }
        entry.in_flight = true;
        self.mute_participant(&session_id);

        let voice_id = resolve_voice(
            self.config.participant_voices.as_ref().unwrap_or(&HashMap::new()),
            self.config.default_voice_id.as_deref(),
            &user_id,
        );
        let target_language = self.state.translation.target_language.clone();
        let stt = self.services.stt.clone();
        let translator = self.services.translator.clone();
        let tts = self.services.tts.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let outcome = run_translation_cycle(
                stt,
                translator,
                tts,
                audio,
                user_id.clone(),
                target_language,
                voice_id,
            )
            .await;
            // Always reported, even on failure, so the in-flight gate reopens.
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::TranslationCycleDone {
                    session_id,
                    user_id,
                    outcome,
                },
            )));
        });
    }

    pub(super) fn handle_cycle_done(
        &mut self,
        session_id: &str,
        user_id: &str,
        outcome: CycleOutcome,
    ) {
        if let Some(p) = self.pipelines.participants.get_mut(session_id) {
            p.in_flight = false;
        }
        match outcome {
            CycleOutcome::Synthesized { audio } => {
                // The enable check lives here, at the point of use: a cycle
                // that completes after translation was switched off is
                // discarded, not played.
                if self.state.translation.enabled {
                    self.services.media.play_translated_audio(audio);
                }
            }
            CycleOutcome::EmptyTranscript => {
                tracing::debug!(%session_id, "cycle aborted, transcript empty");
            }
            CycleOutcome::EmptyTranslation => {
                tracing::debug!(%session_id, "cycle aborted, translation empty");
            }
            CycleOutcome::VoiceNotConfigured => {
                if self.pipelines.warned_no_voice.insert(user_id.to_string()) {
                    self.toast(
                        "This participant has no voice configured; \
                         ask them to add one in their profile",
                    );
                }
            }
            CycleOutcome::Failed { stage, error } => {
                tracing::warn!(%session_id, stage, error, "translation cycle failed");
            }
        }
    }

    /// Back out of the call screen and tear the pipeline down. Every session
    /// we muted is restored to the platform default.
    pub(super) fn handle_leave_call(&mut self) {
        self.restore_muted_participants();
        self.pipelines.participants.clear();
        self.pipelines.warned_no_voice.clear();
        if self.state.translation.enabled {
            self.state.translation.enabled = false;
            self.emit_translation();
        }
        let back = match self.last_chat_peer.clone() {
            Some(peer_id) => Screen::Chat { peer_id },
            None => Screen::Home,
        };
        self.navigate_to(back);
    }

    fn mute_participant(&mut self, session_id: &str) {
        if self.pipelines.muted.insert(session_id.to_string()) {
            self.services
                .media
                .set_participant_volume(session_id, Some(0.0));
        }
    }

    fn mute_audible_participants(&mut self) {
        let audible: Vec<String> = self
            .pipelines
            .participants
            .iter()
            .filter(|(_, p)| p.has_audio)
            .map(|(sid, _)| sid.clone())
            .collect();
        for sid in audible {
            self.mute_participant(&sid);
        }
    }

    fn restore_muted_participants(&mut self) {
        for sid in std::mem::take(&mut self.pipelines.muted) {
            self.services.media.set_participant_volume(&sid, None);
        }
    }
}

async fn run_translation_cycle(
    stt: Arc<dyn SpeechToText>,
    translator: Arc<dyn Translator>,
    tts: Arc<dyn SpeechSynthesis>,
    audio: Vec<u8>,
    speaker_id: String,
    target_language: String,
    voice_id: Option<String>,
) -> CycleOutcome {
    let transcript = match stt.transcribe(audio, speaker_id.clone()).await {
        Ok(t) => t,
        Err(err) => {
            return CycleOutcome::Failed {
                stage: "stt",
                error: err.to_string(),
            }
        }
    };
    if transcript.trim().is_empty() {
        return CycleOutcome::EmptyTranscript;
    }

    let translated = match translator
        .translate(transcript, target_language, speaker_id)
        .await
    {
        Ok(t) => t,
        Err(err) => {
            return CycleOutcome::Failed {
                stage: "translate",
                error: err.to_string(),
            }
        }
    };
    if translated.trim().is_empty() {
        return CycleOutcome::EmptyTranslation;
    }

    let Some(voice_id) = voice_id else {
        return CycleOutcome::VoiceNotConfigured;
    };
    match tts.synthesize(translated, voice_id).await {
        Ok(audio) => CycleOutcome::Synthesized { audio },
        Err(SynthesisError::VoiceNotConfigured) => CycleOutcome::VoiceNotConfigured,
        Err(SynthesisError::Other(err)) => CycleOutcome::Failed {
            stage: "tts",
            error: err.to_string(),
        },
    }
}
