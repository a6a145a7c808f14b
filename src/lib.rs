//! Core engine for a two-party calling and live-translation client.
//!
//! All state lives in a single-threaded actor ([`core::AppCore`]) fed through
//! a channel; the embedding layer dispatches [`AppAction`]s, injects inbound
//! platform events (chat messages, presence pushes, call-session audio), and
//! observes rev-stamped [`AppUpdate`]s through a reconciler callback.

mod actions;
mod core;
mod logging;
mod state;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender, TrySendError};

pub use actions::AppAction;
pub use crate::core::services::{
    BoxFuture, ChatTransport, MediaOutput, PresenceService, Services, SpeechSynthesis,
    SpeechToText, SynthesisError, Translator,
};
pub use crate::core::signal;
pub use crate::core::tab_store::{StoreSlot, TabStore};
pub use state::*;
pub use updates::*;

/// Callback surface the embedding UI implements to receive state updates.
pub trait AppReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

pub struct App {
    core_sender: Sender<CoreMsg>,
    update_receiver: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
}

impl App {
    /// Boot the actor for one tab. `store` is shared between the tabs of the
    /// same user; pass a fresh [`TabStore`] for a standalone instance.
    pub fn new(data_dir: String, local_user: UserRef, services: Services, store: TabStore) -> Arc<Self> {
        logging::init_logging();
        tracing::info!(%data_dir, user = %local_user.id, "starting app core");

        let (update_sender, update_receiver) = flume::unbounded();
        let (core_sender, core_receiver) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty()));

        // Forward cross-tab store notifications into the actor.
        let store_watcher = store.subscribe();
        let store_sender = core_sender.clone();
        thread::spawn(move || {
            while let Ok(slot) = store_watcher.recv() {
                let event = CoreMsg::Internal(Box::new(InternalEvent::StorageChanged { slot }));
                if store_sender.send(event).is_err() {
                    break;
                }
            }
        });

        let actor_sender = core_sender.clone();
        let actor_state = shared_state.clone();
        thread::spawn(move || {
            let mut core = crate::core::AppCore::new(
                update_sender,
                actor_sender,
                data_dir,
                local_user,
                services,
                store,
                actor_state,
            );
            while let Ok(msg) = core_receiver.recv() {
                core.handle_message(msg);
            }
            tracing::debug!("core channel closed, actor exiting");
        });

        Arc::new(Self {
            core_sender,
            update_receiver,
            listening: AtomicBool::new(false),
            shared_state,
        })
    }

    /// Latest committed state snapshot.
    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        self.send(CoreMsg::Action(action));
    }

    /// Drain updates to `reconciler` on a dedicated thread. Only one listener
    /// per instance; later calls are ignored.
    pub fn listen_for_updates(&self, reconciler: Box<dyn AppReconciler>) {
        if self.listening.swap(true, Ordering::SeqCst) {
            tracing::warn!("listen_for_updates called twice, ignoring");
            return;
        }
        let receiver = self.update_receiver.clone();
        thread::spawn(move || {
            while let Ok(update) = receiver.recv() {
                reconciler.reconcile(update);
            }
        });
    }

    // --- platform event injection ----------------------------------------

    pub fn deliver_chat_message(
        &self,
        conversation_id: String,
        message_id: String,
        sender: UserRef,
        text: String,
    ) {
        self.internal(InternalEvent::ChatMessageReceived {
            conversation_id,
            message_id,
            sender,
            text,
        });
    }

    pub fn deliver_presence_update(&self, user_id: String, online: bool) {
        self.internal(InternalEvent::PresencePushed { user_id, online });
    }

    pub fn deliver_participant_joined(&self, session_id: String, user_id: String, has_audio: bool) {
        self.internal(InternalEvent::ParticipantJoined {
            session_id,
            user_id,
            has_audio,
        });
    }

    pub fn deliver_participant_left(&self, session_id: String) {
        self.internal(InternalEvent::ParticipantLeft { session_id });
    }

    pub fn deliver_audio_segment(&self, session_id: String, user_id: String, audio: Vec<u8>) {
        self.internal(InternalEvent::AudioSegmentCaptured {
            session_id,
            user_id,
            audio,
        });
    }

    pub fn deliver_friend_requests(&self, requests: Vec<FriendRequestEvent>) {
        self.internal(InternalEvent::FriendRequestsFetched { requests });
    }

    fn internal(&self, event: InternalEvent) {
        self.send(CoreMsg::Internal(Box::new(event)));
    }

    fn send(&self, msg: CoreMsg) {
        match self.core_sender.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                tracing::error!("app core is gone, dropping message");
            }
        }
    }
}
