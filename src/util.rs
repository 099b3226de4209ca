use std::time::{SystemTime, UNIX_EPOCH};

const HEX: &[u8; 16] = b"0123456789abcdef";

#[inline]
pub(crate) fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

/// Mint a tool-call id in the `call_<uuid>` form used on the OpenAI-facing wire.
#[inline]
pub(crate) fn next_call_id() -> String {
    let mut out = String::with_capacity(37);
    out.push_str("call_");
    push_uuid_simple(&mut out);
    out
}

/// Mint an Anthropic tool-use block id: `toolu_` + 12 random bytes as hex.
#[inline]
pub(crate) fn next_toolu_id() -> String {
    let mut out = String::with_capacity(30);
    out.push_str("toolu_");
    for _ in 0..12 {
        let byte = fastrand::u8(..);
        out.push(char::from(HEX[(byte >> 4) as usize]));
        out.push(char::from(HEX[(byte & 0x0f) as usize]));
    }
    out
}

/// Mint an Anthropic message id.
#[inline]
pub(crate) fn next_message_id() -> String {
    let mut out = String::with_capacity(36);
    out.push_str("msg_");
    push_uuid_simple(&mut out);
    out
}

/// Mint an OpenAI chat-completion id. Doubles as the upstream session id.
#[inline]
pub(crate) fn next_chat_id() -> String {
    let mut out = String::with_capacity(41);
    out.push_str("chatcmpl-");
    push_uuid_simple(&mut out);
    out
}

/// Mint a Responses API response id.
#[inline]
pub(crate) fn next_response_id() -> String {
    let mut out = String::with_capacity(37);
    out.push_str("resp_");
    push_uuid_simple(&mut out);
    out
}

#[inline]
fn push_uuid_simple(out: &mut String) {
    let mut buf = [0u8; uuid::fmt::Simple::LENGTH];
    out.push_str(uuid::Uuid::new_v4().as_simple().encode_lower(&mut buf));
}

/// Split a `data:<mime>;base64,<body>` URL into (mime, body).
///
/// Returns `None` for anything that is not a base64 data URL; callers drop
/// those images rather than forwarding an unreachable reference upstream.
#[must_use]
pub(crate) fn split_data_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (mime, body) = rest.split_once(";base64,")?;
    if mime.is_empty() || body.is_empty() {
        return None;
    }
    Some((mime, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_ids_are_unique_and_prefixed() {
        let a = next_call_id();
        let b = next_call_id();
        assert!(a.starts_with("call_"));
        assert_eq!(a.len(), 37);
        assert_ne!(a, b);
    }

    #[test]
    fn toolu_ids_are_12_byte_hex() {
        let id = next_toolu_id();
        assert!(id.starts_with("toolu_"));
        assert_eq!(id.len(), 6 + 24);
        assert!(id[6..].bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn split_data_url_accepts_base64_payloads() {
        let (mime, body) = split_data_url("data:image/png;base64,iVBORw0KGgo=").unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(body, "iVBORw0KGgo=");
    }

    #[test]
    fn split_data_url_rejects_plain_urls() {
        assert!(split_data_url("https://example.com/cat.png").is_none());
        assert!(split_data_url("data:text/plain,hello").is_none());
    }
}
