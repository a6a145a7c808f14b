use std::sync::{Arc, RwLock};
use std::time::Duration;

use flume::Sender;

use crate::actions::AppAction;
use crate::state::{now_millis, AppState, CallInvite, PresenceDelta, Screen, UserRef};
use crate::updates::{AppUpdate, CallRole, CoreMsg, InternalEvent};

mod calls;
mod config;
mod notify;
mod presence;
pub mod services;
pub mod signal;
pub mod tab_store;
mod translation;

use config::{load_app_config, AppConfig};
use notify::NotifyGate;
use presence::{EnsureOutcome, PresenceCache};
use services::Services;
use tab_store::TabStore;
use translation::TranslationRuntime;

/// How long a presence-gated alert waits for a usable presence value before
/// being suppressed outright.
const ALERT_GATE_WINDOW_MS: i64 = 30_000;

/// Work parked until the originating user's presence resolves.
#[derive(Debug)]
enum PresenceGated {
    Ring {
        invite: CallInvite,
    },
    MessageAlert {
        sender: UserRef,
        text: String,
        created_at: i64,
    },
    FriendAlert {
        sender: UserRef,
        created_at: i64,
    },
}

impl PresenceGated {
    fn user_id(&self) -> &str {
        match self {
            PresenceGated::Ring { invite } => &invite.from_user.id,
            PresenceGated::MessageAlert { sender, .. } => &sender.id,
            PresenceGated::FriendAlert { sender, .. } => &sender.id,
        }
    }

    fn deadline(&self, ring_window_ms: i64) -> i64 {
        match self {
            PresenceGated::Ring { invite } => invite.created_at + ring_window_ms,
            PresenceGated::MessageAlert { created_at, .. } => created_at + ALERT_GATE_WINDOW_MS,
            PresenceGated::FriendAlert { created_at, .. } => created_at + ALERT_GATE_WINDOW_MS,
        }
    }
}

pub(crate) struct AppCore {
    pub state: AppState,
    rev: u64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    local_user: UserRef,
    config: AppConfig,
    runtime: tokio::runtime::Runtime,
    services: Services,
    store: TabStore,

    presence: PresenceCache,
    presence_waiters: Vec<PresenceGated>,
    pipelines: TranslationRuntime,
    notify: NotifyGate,

    // Remembered for the call screen's back action.
    last_chat_peer: Option<String>,
}

impl AppCore {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        local_user: UserRef,
        services: Services,
        store: TabStore,
        shared_state: Arc<RwLock<AppState>>,
    ) -> Self {
        let config = load_app_config(&data_dir);
        let mut state = AppState::empty();
        if let Some(lang) = config
            .target_language
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            state.translation.target_language = lang.to_string();
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .enable_io()
            .build()
            .expect("tokio runtime");

        let mut this = Self {
            state,
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            local_user,
            config,
            runtime,
            services,
            store,
            presence: PresenceCache::new(),
            presence_waiters: Vec::new(),
            pipelines: TranslationRuntime::default(),
            notify: NotifyGate::default(),
            last_chat_peer: None,
        };

        // Another tab may already be ringing; hydrate both slots and let
        // expiry timers re-arm locally.
        this.restore_call_slots_from_store();
        this.next_rev();
        let snapshot = this.state.clone();
        this.emit(AppUpdate::FullState(snapshot));
        this
    }

    pub(crate) fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(action) => {
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action);
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            AppAction::PushScreen { screen } => self.navigate_to(screen),
            AppAction::OpenChat { peer_id } => {
                self.last_chat_peer = Some(peer_id.clone());
                self.navigate_to(Screen::Chat { peer_id });
            }
            AppAction::StartCall { to_user } => self.handle_start_call(to_user),
            AppAction::AcceptIncomingCall => self.handle_accept_incoming(),
            AppAction::DeclineIncomingCall => self.handle_decline_incoming(),
            AppAction::LeaveCall => self.handle_leave_call(),
            AppAction::SetTranslationEnabled { enabled } => {
                self.handle_set_translation_enabled(enabled)
            }
            AppAction::SetTargetLanguage { language } => self.handle_set_target_language(language),
            AppAction::ClearToast => {
                if self.state.toast.take().is_some() {
                    self.emit_toast();
                }
            }
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::ChatMessageReceived {
                conversation_id,
                message_id,
                sender,
                text,
            } => self.handle_inbound_chat(&conversation_id, message_id, sender, text),
            InternalEvent::PresencePushed { user_id, online } => {
                self.presence.push(&user_id, online);
                self.evaluate_presence_waiters();
                self.check_ringing_caller_presence();
            }
            InternalEvent::PresenceBatchResolved { resolved } => {
                self.presence.resolve(&resolved, now_millis());
                self.evaluate_presence_waiters();
                self.check_ringing_caller_presence();
            }
            InternalEvent::RingTimerFired {
                role,
                call_id,
                created_at,
            } => self.handle_ring_timer(role, &call_id, created_at),
            InternalEvent::StorageChanged { slot } => self.handle_storage_changed(slot),
            InternalEvent::ParticipantJoined {
                session_id,
                user_id,
                has_audio,
            } => self.handle_participant_joined(session_id, user_id, has_audio),
            InternalEvent::ParticipantLeft { session_id } => {
                self.handle_participant_left(&session_id)
            }
            InternalEvent::AudioSegmentCaptured {
                session_id,
                user_id,
                audio,
            } => self.handle_audio_segment(session_id, user_id, audio),
            InternalEvent::TranslationCycleDone {
                session_id,
                user_id,
                outcome,
            } => self.handle_cycle_done(&session_id, &user_id, outcome),
            InternalEvent::FriendRequestsFetched { requests } => {
                self.handle_friend_requests(requests)
            }
            InternalEvent::Toast(msg) => {
                tracing::info!(msg, "toast");
                self.toast(msg);
            }
        }
    }

    // --- presence gating -------------------------------------------------

    /// Run `waiter` once the originating user's presence is usable; unknown
    /// presence suppresses rather than guesses.
    fn gate_on_presence(&mut self, user_id: &str, waiter: PresenceGated) {
        let now = now_millis();
        match self.presence.ensure([user_id], now) {
            EnsureOutcome::Fresh => self.decide_presence_waiter(waiter),
            EnsureOutcome::Batch(ids) => {
                self.spawn_presence_query(ids);
                self.presence_waiters.push(waiter);
            }
            EnsureOutcome::Busy => self.presence_waiters.push(waiter),
        }
    }

    fn evaluate_presence_waiters(&mut self) {
        let now = now_millis();
        let ring_window = self.ring_window_ms();
        let waiters = std::mem::take(&mut self.presence_waiters);
        for waiter in waiters {
            if now >= waiter.deadline(ring_window) {
                tracing::debug!(user = waiter.user_id(), "presence wait expired");
                continue;
            }
            if self.presence.known(waiter.user_id()).is_some() {
                self.decide_presence_waiter(waiter);
            } else if self.presence.awaiting(waiter.user_id()) {
                // A lookup that may still answer for this id is pending;
                // kick the next batch if one can start and keep waiting.
                let id = waiter.user_id().to_string();
                if let EnsureOutcome::Batch(ids) = self.presence.ensure([id.as_str()], now) {
                    self.spawn_presence_query(ids);
                }
                self.presence_waiters.push(waiter);
            } else {
                // The lookup concluded without a value. One round, then
                // decide; unknown presence suppresses.
                self.decide_presence_waiter(waiter);
            }
        }
    }

    fn decide_presence_waiter(&mut self, waiter: PresenceGated) {
        let online = self.presence.known(waiter.user_id()) == Some(true);
        if !online {
            tracing::debug!(user = waiter.user_id(), "suppressed: originator not online");
            return;
        }
        match waiter {
            PresenceGated::Ring { invite } => self.ring_incoming(invite),
            PresenceGated::MessageAlert { sender, text, .. } => {
                let title = if sender.display_name.is_empty() {
                    "New message".to_string()
                } else {
                    sender.display_name
                };
                self.post_notification(title, text, sender.avatar_url);
            }
            PresenceGated::FriendAlert { sender, .. } => {
                let name = if sender.display_name.is_empty() {
                    "Someone".to_string()
                } else {
                    sender.display_name
                };
                self.post_notification(
                    "Friend Request".to_string(),
                    format!("{name} sent you a friend request"),
                    sender.avatar_url,
                );
            }
        }
    }

    fn spawn_presence_query(&self, ids: Vec<String>) {
        let tx = self.core_sender.clone();
        if !self.network_enabled() {
            // Resolve the in-flight batch with nothing so the gate reopens.
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::PresenceBatchResolved {
                    resolved: PresenceDelta::new(),
                },
            )));
            return;
        }
        let svc = self.services.presence.clone();
        self.runtime.spawn(async move {
            let resolved = match svc.query(ids).await {
                Ok(map) => map,
                Err(err) => {
                    // Swallowed: callers must treat an unresolved id as
                    // "unknown, do not act".
                    tracing::debug!(%err, "presence lookup failed");
                    PresenceDelta::new()
                }
            };
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::PresenceBatchResolved { resolved },
            )));
        });
    }

    // --- outbound plumbing ------------------------------------------------

    fn publish_chat(&self, conversation_id: String, text: String, failure_context: &'static str) {
        if !self.network_enabled() {
            return;
        }
        let chat = self.services.chat.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            if let Err(err) = chat.publish(conversation_id, text).await {
                let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::Toast(format!(
                    "{failure_context}: {err}"
                )))));
            }
        });
    }

    fn arm_ring_timer(&self, role: CallRole, call_id: String, created_at: i64, fire_at: i64) {
        let tx = self.core_sender.clone();
        let delay = (fire_at - now_millis()).max(0) as u64;
        self.runtime.spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::RingTimerFired {
                role,
                call_id,
                created_at,
            })));
        });
    }

    // --- state emission ---------------------------------------------------

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn emit(&mut self, update: AppUpdate) {
        self.commit_state();
        let _ = self.update_sender.send(update);
    }

    fn commit_state(&self) {
        let snapshot = self.state.clone();
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot,
            Err(poison) => *poison.into_inner() = snapshot,
        }
    }

    fn emit_router(&mut self) {
        let rev = self.next_rev();
        self.emit(AppUpdate::RouterChanged {
            rev,
            router: self.state.router.clone(),
        });
    }

    fn emit_outgoing_call(&mut self) {
        let rev = self.next_rev();
        self.emit(AppUpdate::OutgoingCallChanged {
            rev,
            ticket: self.state.outgoing_call.clone(),
        });
    }

    fn emit_incoming_call(&mut self) {
        let rev = self.next_rev();
        self.emit(AppUpdate::IncomingCallChanged {
            rev,
            invite: self.state.incoming_call.clone(),
        });
    }

    fn emit_translation(&mut self) {
        let rev = self.next_rev();
        self.emit(AppUpdate::TranslationChanged {
            rev,
            translation: self.state.translation.clone(),
        });
    }

    fn emit_toast(&mut self) {
        let rev = self.next_rev();
        self.emit(AppUpdate::ToastChanged {
            rev,
            toast: self.state.toast.clone(),
        });
    }

    fn toast(&mut self, msg: impl Into<String>) {
        // Kept in state until the UI explicitly clears it, so a snapshot
        // resync still shows it.
        self.state.toast = Some(msg.into());
        self.emit_toast();
    }

    fn post_notification(&mut self, title: String, subtitle: String, image: String) {
        let rev = self.next_rev();
        self.emit(AppUpdate::NotificationPosted {
            rev,
            title,
            subtitle,
            image,
        });
    }

    fn navigate_to(&mut self, screen: Screen) {
        if self.state.router.current() == &screen {
            return;
        }
        self.state.router.screen_stack.push(screen);
        self.emit_router();
    }
}
