use crate::state::{
    AppState, CallInvite, OutgoingCallTicket, PresenceDelta, Router, TranslationView, UserRef,
};
use crate::AppAction;

#[derive(Debug, Clone)]
pub enum AppUpdate {
    FullState(AppState),
    RouterChanged {
        rev: u64,
        router: Router,
    },
    OutgoingCallChanged {
        rev: u64,
        ticket: Option<OutgoingCallTicket>,
    },
    IncomingCallChanged {
        rev: u64,
        invite: Option<CallInvite>,
    },
    TranslationChanged {
        rev: u64,
        translation: TranslationView,
    },
    ToastChanged {
        rev: u64,
        toast: Option<String>,
    },
    /// Fire-and-forget user-visible alert card (message / friend request).
    NotificationPosted {
        rev: u64,
        title: String,
        subtitle: String,
        image: String,
    },
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
            AppUpdate::RouterChanged { rev, .. } => *rev,
            AppUpdate::OutgoingCallChanged { rev, .. } => *rev,
            AppUpdate::IncomingCallChanged { rev, .. } => *rev,
            AppUpdate::TranslationChanged { rev, .. } => *rev,
            AppUpdate::ToastChanged { rev, .. } => *rev,
            AppUpdate::NotificationPosted { rev, .. } => *rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallRole {
    Caller,
    Callee,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendRequestEvent {
    pub id: String,
    pub sender: UserRef,
}

/// Outcome of one translation round-trip. Always reported, even on failure,
/// so the actor can release the participant's in-flight gate.
#[derive(Debug)]
pub enum CycleOutcome {
    Synthesized { audio: Vec<u8> },
    EmptyTranscript,
    EmptyTranslation,
    VoiceNotConfigured,
    Failed { stage: &'static str, error: String },
}

#[derive(Debug)]
pub enum InternalEvent {
    // Messaging channel receive path (injected by the platform layer).
    ChatMessageReceived {
        conversation_id: String,
        message_id: String,
        sender: UserRef,
        text: String,
    },

    // Presence
    PresencePushed {
        user_id: String,
        online: bool,
    },
    PresenceBatchResolved {
        resolved: PresenceDelta,
    },

    // Call lifecycle timers
    RingTimerFired {
        role: CallRole,
        call_id: String,
        created_at: i64,
    },

    // Cross-tab store change notification
    StorageChanged {
        slot: crate::core::tab_store::StoreSlot,
    },

    // Call-session roster + captured audio (injected by the platform layer).
    ParticipantJoined {
        session_id: String,
        user_id: String,
        has_audio: bool,
    },
    ParticipantLeft {
        session_id: String,
    },
    AudioSegmentCaptured {
        session_id: String,
        user_id: String,
        audio: Vec<u8>,
    },
    TranslationCycleDone {
        session_id: String,
        user_id: String,
        outcome: CycleOutcome,
    },

    // Friend-request polling snapshot (injected by the platform layer).
    FriendRequestsFetched {
        requests: Vec<FriendRequestEvent>,
    },

    Toast(String),
}
