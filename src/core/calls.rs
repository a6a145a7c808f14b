//! Call lifecycle: caller ticket, callee ring, and the signaling that moves
//! both through the shared chat channel.
//!
//! Signals ride the ordinary message stream, so every handler here must
//! tolerate duplicates, reordering against presence, and a second tab racing
//! it through the shared store. Clears are idempotent by construction: the
//! accept path and the expiry timer may both fire and the loser is a no-op.

use super::{AppCore, PresenceGated};
use crate::core::signal;
use crate::core::tab_store::StoreSlot;
use crate::state::{now_millis, CallInvite, OutgoingCallTicket, PeerRef, Screen, UserRef};
use crate::updates::CallRole;

impl AppCore {
    // --- caller side ------------------------------------------------------

    pub(super) fn handle_start_call(&mut self, to_user: PeerRef) {
        let now = now_millis();
        if self
            .state
            .outgoing_call
            .as_ref()
            .is_some_and(|t| now < t.expires_at)
        {
            self.toast("Already ringing");
            return;
        }

        // One deterministic id per pair: the call session is addressed by the
        // same id as the conversation it was announced in.
        let call_id = signal::conversation_id(&self.local_user.id, &to_user.id);
        let call_url = format!("{}/call/{}", self.app_origin(), call_id);

        self.publish_chat(
            call_id.clone(),
            signal::encode_invite(&call_url),
            "Failed to send call invite",
        );

        let ticket = OutgoingCallTicket {
            call_url,
            call_id: call_id.clone(),
            to_user,
            created_at: now,
            expires_at: now + self.ring_window_ms(),
        };
        self.arm_ring_timer(CallRole::Caller, call_id, now, ticket.expires_at);
        self.set_outgoing_ticket(Some(ticket));
        self.toast("Video call link sent");
    }

    /// Accept arrived (or the ring window lapsed first; see the timer path).
    fn handle_call_accepted(&mut self, url: &str) {
        let Some(call_id) = signal::extract_call_id(url) else {
            tracing::warn!(url, "accept signal without a call id");
            return;
        };
        let Some(ticket) = self.state.outgoing_call.clone() else {
            // Already cleared by expiry or another tab. Stale accepts never
            // resurrect a ring.
            return;
        };
        if ticket.call_id != call_id {
            tracing::debug!(%call_id, current = %ticket.call_id, "accept for a different call");
            return;
        }
        tracing::info!(%call_id, "call accepted by peer");
        self.set_outgoing_ticket(None);
        self.last_chat_peer = Some(ticket.to_user.id);
        self.navigate_to(Screen::Call { call_id });
    }

    // --- callee side ------------------------------------------------------

    /// Route one inbound chat message: accept sentinel, then invite link,
    /// then the ordinary notification path.
    pub(super) fn handle_inbound_chat(
        &mut self,
        conversation_id: &str,
        message_id: String,
        sender: UserRef,
        text: String,
    ) {
        tracing::debug!(conversation_id, %sender.id, "inbound chat message");

        if let Some(url) = signal::decode_accepted_url(&text) {
            if sender.id != self.local_user.id {
                self.handle_call_accepted(&url);
            }
            return;
        }

        if let Some(url) = signal::decode_invite_url(&text) {
            if sender.id == self.local_user.id {
                // Our own invite echoed back through the channel.
                return;
            }
            let Some(call_id) = signal::extract_call_id(&url) else {
                return;
            };
            let invite = CallInvite {
                call_url: url,
                call_id,
                from_user: sender,
                created_at: now_millis(),
            };
            // Ring only once the sender is known to be online; a stale invite
            // from an offline caller must not ring.
            self.gate_on_presence(
                &invite.from_user.id.clone(),
                PresenceGated::Ring { invite },
            );
            return;
        }

        self.handle_chat_alert(message_id, sender, text);
    }

    pub(super) fn ring_incoming(&mut self, invite: CallInvite) {
        let now = now_millis();
        if now >= invite.created_at + self.ring_window_ms() {
            // Presence took longer than the ring window; too late to ring.
            return;
        }
        if self
            .state
            .incoming_call
            .as_ref()
            .is_some_and(|cur| now < cur.created_at + self.ring_window_ms())
        {
            // A live ring is never overwritten, even by a newer invite.
            return;
        }
        tracing::info!(call_id = %invite.call_id, from = %invite.from_user.id, "ringing");
        self.arm_ring_timer(
            CallRole::Callee,
            invite.call_id.clone(),
            invite.created_at,
            invite.created_at + self.ring_window_ms(),
        );
        self.set_incoming_invite(Some(invite));
    }

    pub(super) fn handle_accept_incoming(&mut self) {
        let Some(invite) = self.state.incoming_call.clone() else {
            return;
        };
        let conversation = signal::conversation_id(&self.local_user.id, &invite.from_user.id);
        self.publish_chat(
            conversation,
            signal::encode_accept(&invite.call_url),
            "Failed to send call acceptance",
        );
        self.set_incoming_invite(None);
        self.last_chat_peer = Some(invite.from_user.id);
        self.navigate_to(Screen::Call {
            call_id: invite.call_id,
        });
    }

    /// Declining sends nothing back; the caller's side simply times out.
    pub(super) fn handle_decline_incoming(&mut self) {
        if self.state.incoming_call.is_some() {
            tracing::info!("incoming call declined");
            self.set_incoming_invite(None);
        }
    }

    // --- timers and presence ----------------------------------------------

    /// Expiry timers identify their target by `(call_id, created_at)`; a slot
    /// replaced since the timer was armed is left alone.
    pub(super) fn handle_ring_timer(&mut self, role: CallRole, call_id: &str, created_at: i64) {
        match role {
            CallRole::Caller => {
                let matches = self
                    .state
                    .outgoing_call
                    .as_ref()
                    .is_some_and(|t| t.call_id == call_id && t.created_at == created_at);
                if matches {
                    tracing::info!(%call_id, "outgoing call expired unanswered");
                    self.set_outgoing_ticket(None);
                }
            }
            CallRole::Callee => {
                let matches = self
                    .state
                    .incoming_call
                    .as_ref()
                    .is_some_and(|i| i.call_id == call_id && i.created_at == created_at);
                if matches {
                    tracing::info!(%call_id, "incoming call expired unanswered");
                    self.set_incoming_invite(None);
                }
            }
        }
    }

    /// A ringing invite is torn down early if its caller goes offline.
    pub(super) fn check_ringing_caller_presence(&mut self) {
        let Some(invite) = self.state.incoming_call.as_ref() else {
            return;
        };
        if self.presence.known(&invite.from_user.id) == Some(false) {
            tracing::info!(from = %invite.from_user.id, "caller went offline, clearing ring");
            self.set_incoming_invite(None);
        }
    }

    // --- shared store -----------------------------------------------------

    pub(super) fn set_outgoing_ticket(&mut self, ticket: Option<OutgoingCallTicket>) {
        if self.state.outgoing_call == ticket {
            return;
        }
        let value = ticket.as_ref().and_then(|t| serde_json::to_value(t).ok());
        self.state.outgoing_call = ticket;
        self.store.write(StoreSlot::OutgoingCall, value);
        self.emit_outgoing_call();
    }

    pub(super) fn set_incoming_invite(&mut self, invite: Option<CallInvite>) {
        if self.state.incoming_call == invite {
            return;
        }
        let value = invite.as_ref().and_then(|i| serde_json::to_value(i).ok());
        self.state.incoming_call = invite;
        self.store.write(StoreSlot::IncomingCall, value);
        self.emit_incoming_call();
    }

    /// Another tab wrote a call slot; adopt its value as-is. Adopting does
    /// not write back, otherwise two tabs would ping-pong notifications.
    pub(super) fn handle_storage_changed(&mut self, slot: StoreSlot) {
        match slot {
            StoreSlot::OutgoingCall => {
                let ticket = self.read_slot::<OutgoingCallTicket>(slot);
                if self.state.outgoing_call != ticket {
                    self.state.outgoing_call = ticket.clone();
                    self.emit_outgoing_call();
                    if let Some(t) = ticket {
                        self.arm_ring_timer(CallRole::Caller, t.call_id, t.created_at, t.expires_at);
                    }
                }
            }
            StoreSlot::IncomingCall => {
                let invite = self.read_slot::<CallInvite>(slot);
                if self.state.incoming_call != invite {
                    self.state.incoming_call = invite.clone();
                    self.emit_incoming_call();
                    if let Some(i) = invite {
                        self.arm_ring_timer(
                            CallRole::Callee,
                            i.call_id.clone(),
                            i.created_at,
                            i.created_at + self.ring_window_ms(),
                        );
                    }
                }
            }
        }
    }

    /// On startup, adopt whatever rings a sibling tab left in the store and
    /// drop anything already past its window.
    pub(super) fn restore_call_slots_from_store(&mut self) {
        let now = now_millis();
        if let Some(ticket) = self.read_slot::<OutgoingCallTicket>(StoreSlot::OutgoingCall) {
            if now < ticket.expires_at {
                self.arm_ring_timer(
                    CallRole::Caller,
                    ticket.call_id.clone(),
                    ticket.created_at,
                    ticket.expires_at,
                );
                self.state.outgoing_call = Some(ticket);
            } else {
                self.store.write(StoreSlot::OutgoingCall, None);
            }
        }
        if let Some(invite) = self.read_slot::<CallInvite>(StoreSlot::IncomingCall) {
            if now < invite.created_at + self.ring_window_ms() {
                self.arm_ring_timer(
                    CallRole::Callee,
                    invite.call_id.clone(),
                    invite.created_at,
                    invite.created_at + self.ring_window_ms(),
                );
                self.state.incoming_call = Some(invite);
            } else {
                self.store.write(StoreSlot::IncomingCall, None);
            }
        }
    }

    fn read_slot<T: serde::de::DeserializeOwned>(&self, slot: StoreSlot) -> Option<T> {
        let value = self.store.read(slot)?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(err) => {
                tracing::warn!(key = slot.key(), %err, "unreadable call slot, ignoring");
                None
            }
        }
    }
}
