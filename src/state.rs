use std::collections::HashMap;

/// How long an unanswered call keeps ringing on either side.
pub const RING_WINDOW_MS: i64 = 15_000;

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UserRef {
    pub id: String,
    pub display_name: String,
    pub avatar_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PeerRef {
    pub id: String,
    pub display_name: String,
}

/// Incoming-ring payload, persisted to the shared tab store so every tab of
/// the same user renders (and clears) the same ring.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CallInvite {
    pub call_url: String,
    pub call_id: String,
    pub from_user: UserRef,
    pub created_at: i64,
}

impl CallInvite {
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.created_at + RING_WINDOW_MS
    }
}

/// Outgoing-ring payload held by the caller while awaiting an accept signal.
///
/// Cleared exactly once, by whichever of the matching accept or the expiry
/// timer runs first; the loser of that race is a no-op.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OutgoingCallTicket {
    pub call_url: String,
    pub call_id: String,
    pub to_user: PeerRef,
    pub created_at: i64,
    pub expires_at: i64,
}

impl OutgoingCallTicket {
    pub fn new(call_url: String, call_id: String, to_user: PeerRef, now: i64) -> Self {
        Self {
            call_url,
            call_id,
            to_user,
            created_at: now,
            expires_at: now + RING_WINDOW_MS,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Screen {
    Home,
    Chat { peer_id: String },
    Call { call_id: String },
    Profile,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Router {
    pub default_screen: Screen,
    pub screen_stack: Vec<Screen>,
}

impl Router {
    pub fn current(&self) -> &Screen {
        self.screen_stack.last().unwrap_or(&self.default_screen)
    }
}

/// Translation settings the UI renders; per-participant pipeline bookkeeping
/// stays actor-internal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranslationView {
    pub enabled: bool,
    pub target_language: String,
}

#[derive(Clone, Debug)]
pub struct AppState {
    pub rev: u64,
    pub router: Router,
    pub outgoing_call: Option<OutgoingCallTicket>,
    pub incoming_call: Option<CallInvite>,
    pub translation: TranslationView,
    pub toast: Option<String>,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            router: Router {
                default_screen: Screen::Home,
                screen_stack: vec![],
            },
            outgoing_call: None,
            incoming_call: None,
            translation: TranslationView {
                enabled: false,
                target_language: "english".to_string(),
            },
            toast: None,
        }
    }
}

pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Presence values fetched in one batch, keyed by user id.
pub type PresenceDelta = HashMap<String, bool>;
