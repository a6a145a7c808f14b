//! Call-signaling text codec.
//!
//! The messaging channel carries plain chat text; two reserved shapes are
//! recognized: an invite line containing a `/call/<id>` URL and an accept
//! line with a fixed prefix. Everything call-related that parses or formats
//! message text lives here; other modules never re-derive these patterns.

use std::sync::OnceLock;

use regex::Regex;

const ACCEPT_PREFIX: &str = "CALL_ACCEPTED:";

fn absolute_call_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)https?://\S+/call/\S+").expect("static regex"))
}

fn relative_call_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)/call/\S+").expect("static regex"))
}

fn call_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)/call/([^\s/]+)").expect("static regex"))
}

/// Human-readable invite line embedding the call session URL.
pub fn encode_invite(session_url: &str) -> String {
    format!("I've started a video call. Join me here: {session_url}")
}

/// Accept sentinel line.
pub fn encode_accept(session_url: &str) -> String {
    format!("{ACCEPT_PREFIX} {session_url}")
}

/// Extract a call session URL (absolute preferred, else relative) from
/// arbitrary chat text. `None` means the text is ordinary chat.
pub fn decode_invite_url(text: &str) -> Option<String> {
    if let Some(m) = absolute_call_url_re().find(text) {
        return Some(m.as_str().to_string());
    }
    relative_call_url_re()
        .find(text)
        .map(|m| m.as_str().to_string())
}

/// Recognize an accept sentinel and return the embedded URL.
pub fn decode_accepted_url(text: &str) -> Option<String> {
    let rest = text.strip_prefix(ACCEPT_PREFIX)?;
    let url = rest.trim();
    if url.is_empty() {
        return None;
    }
    Some(url.to_string())
}

/// Path segment after `/call/`, with any query/fragment stripped first.
pub fn extract_call_id(session_url: &str) -> Option<String> {
    let path = session_url
        .split(|c| c == '?' || c == '#')
        .next()
        .unwrap_or(session_url);
    call_id_re()
        .captures(path)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Conversation id for a 1:1 channel: lexicographically sorted join.
pub fn conversation_id(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}-{hi}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invite_round_trips_through_its_own_encoding() {
        let url = "https://app.example.com/call/alice-bob";
        let text = encode_invite(url);
        assert_eq!(decode_invite_url(&text).as_deref(), Some(url));
        assert_eq!(extract_call_id(url).as_deref(), Some("alice-bob"));
    }

    #[test]
    fn accept_round_trips_and_preserves_call_id() {
        let url = "https://app.example.com/call/alice-bob";
        let accepted = decode_accepted_url(&encode_accept(url)).unwrap();
        assert_eq!(extract_call_id(&accepted), extract_call_id(url));
    }

    #[test]
    fn ordinary_chat_decodes_to_none() {
        assert_eq!(decode_invite_url("see you at the cafe"), None);
        assert_eq!(decode_accepted_url("see you at the cafe"), None);
        assert_eq!(decode_invite_url("https://example.com/profile/bob"), None);
        assert_eq!(extract_call_id("https://example.com/profile/bob"), None);
    }

    #[test]
    fn relative_call_paths_are_recognized() {
        let text = "join me: /call/a-b";
        assert_eq!(decode_invite_url(text).as_deref(), Some("/call/a-b"));
        assert_eq!(extract_call_id("/call/a-b").as_deref(), Some("a-b"));
    }

    #[test]
    fn call_id_ignores_query_and_fragment() {
        assert_eq!(
            extract_call_id("https://x.io/call/a-b?token=1#frag").as_deref(),
            Some("a-b")
        );
    }

    #[test]
    fn accept_sentinel_requires_the_prefix_at_start() {
        assert_eq!(decode_accepted_url("note: CALL_ACCEPTED: /call/x"), None);
        assert_eq!(decode_accepted_url("CALL_ACCEPTED:   "), None);
    }

    #[test]
    fn conversation_id_is_order_independent() {
        assert_eq!(conversation_id("bob", "alice"), "alice-bob");
        assert_eq!(conversation_id("alice", "bob"), "alice-bob");
    }
}
