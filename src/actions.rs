use crate::state::{PeerRef, Screen};

#[derive(Debug, Clone)]
pub enum AppAction {
    // Navigation
    PushScreen { screen: Screen },
    OpenChat { peer_id: String },

    // Call signaling
    StartCall { to_user: PeerRef },
    AcceptIncomingCall,
    DeclineIncomingCall,
    LeaveCall,

    // Translation
    SetTranslationEnabled { enabled: bool },
    SetTargetLanguage { language: String },

    // UI
    ClearToast,
}

impl AppAction {
    /// Log-safe action tag.
    pub fn tag(&self) -> &'static str {
        match self {
            AppAction::PushScreen { .. } => "PushScreen",
            AppAction::OpenChat { .. } => "OpenChat",
            AppAction::StartCall { .. } => "StartCall",
            AppAction::AcceptIncomingCall => "AcceptIncomingCall",
            AppAction::DeclineIncomingCall => "DeclineIncomingCall",
            AppAction::LeaveCall => "LeaveCall",
            AppAction::SetTranslationEnabled { .. } => "SetTranslationEnabled",
            AppAction::SetTargetLanguage { .. } => "SetTargetLanguage",
            AppAction::ClearToast => "ClearToast",
        }
    }
}
