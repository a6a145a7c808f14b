//! Notification gate for chat messages and friend requests.
//!
//! Alerts are deduplicated by stable id and presence-gated: nothing is shown
//! for a sender who is offline or whose presence cannot be determined.

use std::collections::HashSet;

use super::{AppCore, PresenceGated};
use crate::state::{now_millis, UserRef};
use crate::updates::FriendRequestEvent;

#[derive(Debug, Default)]
pub(super) struct NotifyGate {
    seen_messages: HashSet<String>,
    seen_friend_requests: HashSet<String>,
    /// The first friend-request snapshot after startup is backlog, not news.
    hydrated_friend_requests: bool,
}

impl AppCore {
    pub(super) fn handle_chat_alert(&mut self, message_id: String, sender: UserRef, text: String) {
        if sender.id == self.local_user.id {
            return;
        }
        // Messages without a server id fall back to sender+content identity.
        let identity = if message_id.is_empty() {
            format!("{}:{}", sender.id, text)
        } else {
            message_id
        };
        if !self.notify.seen_messages.insert(identity) {
            return;
        }
        let user_id = sender.id.clone();
        self.gate_on_presence(
            &user_id,
            PresenceGated::MessageAlert {
                sender,
                text,
                created_at: now_millis(),
            },
        );
    }

    pub(super) fn handle_friend_requests(&mut self, requests: Vec<FriendRequestEvent>) {
        if !self.notify.hydrated_friend_requests {
            for req in &requests {
                self.notify.seen_friend_requests.insert(req.id.clone());
            }
            self.notify.hydrated_friend_requests = true;
            tracing::debug!(count = requests.len(), "friend requests hydrated silently");
            return;
        }
        for req in requests {
            if !self.notify.seen_friend_requests.insert(req.id.clone()) {
                continue;
            }
            let user_id = req.sender.id.clone();
            self.gate_on_presence(
                &user_id,
                PresenceGated::FriendAlert {
                    sender: req.sender,
                    created_at: now_millis(),
                },
            );
        }
    }
}
