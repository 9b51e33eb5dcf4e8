//! Relay wire protocol (NIP-01).
//!
//! Frames are the `nostr` crate's [`ClientMessage`] and [`RelayMessage`];
//! this module only encodes, decodes and turns verified events into
//! [`RelayEvent`]s.

use nostr::{Event, JsonUtil};
pub use nostr::{ClientMessage, RelayMessage, SubscriptionId};
use tracing::trace;

use crate::core::RelayEvent;

/// Encodes a client frame as JSON text.
///
/// # Errors
///
/// Returns a serialization error if the payload cannot be encoded.
pub fn encode(message: &ClientMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

/// Parses one text frame. Unknown or malformed frames yield `None`.
///
/// Event signatures are not checked here; see [`verified_event`].
pub fn decode(text: &str) -> Option<RelayMessage> {
    RelayMessage::from_json(text)
        .inspect_err(|e| trace!(error = %e, "undecodable relay frame"))
        .ok()
}

/// Checks the id and signature of `event` and converts it.
///
/// # Errors
///
/// Returns the verification failure as text.
pub fn verified_event(event: &Event) -> Result<RelayEvent, String> {
    event.verify().map_err(|e| e.to_string())?;
    Ok(RelayEvent::from(event))
}

impl From<&Event> for RelayEvent {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id.to_hex(),
            author_key: event.pubkey.to_hex(),
            created_at: event.created_at.as_u64(),
            kind: event.kind.as_u16(),
            tags: event
                .tags
                .iter()
                .map(|tag| tag.as_slice().to_vec())
                .collect(),
            content: event.content.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SubscriptionFilter;
    use nostr::{EventBuilder, Keys, Kind, Tag, TagKind, Timestamp};
    use serde_json::{Value, json};
    use test_case::test_case;

    fn signed(content: &str) -> Event {
        EventBuilder::new(Kind::from(42), content)
            .tag(Tag::custom(
                TagKind::custom("e"),
                ["root-id", "wss://relay.example", "root"],
            ))
            .custom_created_at(Timestamp::from(1_700_000_000))
            .sign_with_keys(&Keys::generate())
            .unwrap_or_else(|_| unreachable!())
    }

    #[test]
    fn test_encode_req() {
        let filter = SubscriptionFilter::new("abc", 10, [42], 0).to_filter();
        let text = encode(&ClientMessage::req(SubscriptionId::new("sub"), filter))
            .unwrap_or_default();
        let decoded: Value = serde_json::from_str(&text).unwrap_or_default();
        assert_eq!(decoded, json!(["REQ", "sub", {"limit": 10, "kinds": [42], "#e": ["abc"]}]));
    }

    #[test]
    fn test_encode_event_and_close() {
        let event = signed("hello");
        let text = encode(&ClientMessage::event(event.clone())).unwrap_or_default();
        let decoded: Value = serde_json::from_str(&text).unwrap_or_default();
        assert_eq!(decoded[0], "EVENT");
        assert_eq!(decoded[1]["id"], event.id.to_hex());

        assert_eq!(
            encode(&ClientMessage::close(SubscriptionId::new("sub"))).unwrap_or_default(),
            r#"["CLOSE","sub"]"#
        );
    }

    #[test]
    fn test_decode_and_verify_event() {
        let event = signed("hello");
        let text = json!(["EVENT", "sub", event]).to_string();

        let Some(RelayMessage::Event {
            subscription_id,
            event,
        }) = decode(&text)
        else {
            unreachable!()
        };
        assert_eq!(subscription_id, SubscriptionId::new("sub"));

        let converted = verified_event(&event).unwrap_or_else(|_| unreachable!());
        assert_eq!(converted.id, event.id.to_hex());
        assert_eq!(converted.author_key, event.pubkey.to_hex());
        assert_eq!(converted.created_at, 1_700_000_000);
        assert_eq!(converted.kind, 42);
        assert_eq!(converted.content, "hello");
        assert!(converted.topic_refs().eq(["root-id"]));
    }

    #[test]
    fn test_tampered_event_fails_verification() {
        let mut wire = serde_json::to_value(signed("hello")).unwrap_or_default();
        wire["content"] = json!("edited");
        let text = json!(["EVENT", "sub", wire]).to_string();

        let Some(RelayMessage::Event { event, .. }) = decode(&text) else {
            unreachable!()
        };
        assert!(verified_event(&event).is_err());
    }

    #[test]
    fn test_decode_ok() {
        let id = signed("x").id;
        let rejected = json!(["OK", id.to_hex(), false, "blocked: spam"]).to_string();
        assert_eq!(
            decode(&rejected),
            Some(RelayMessage::Ok {
                event_id: id,
                status: false,
                message: "blocked: spam".to_string(),
            })
        );
    }

    #[test]
    fn test_decode_control_frames() {
        assert_eq!(
            decode(r#"["EOSE","sub"]"#),
            Some(RelayMessage::EndOfStoredEvents(SubscriptionId::new("sub")))
        );
        assert_eq!(
            decode(r#"["NOTICE","slow down"]"#),
            Some(RelayMessage::Notice("slow down".to_string()))
        );
        assert_eq!(
            decode(r#"["CLOSED","sub","error: shutting down"]"#),
            Some(RelayMessage::Closed {
                subscription_id: SubscriptionId::new("sub"),
                message: "error: shutting down".to_string(),
            })
        );
    }

    #[test_case("" ; "empty")]
    #[test_case("{}" ; "object frame")]
    #[test_case("[]" ; "empty array")]
    #[test_case(r#"["EVENT","sub",{"id":1}]"# ; "malformed event")]
    #[test_case(r#"["OK","e1",true,""]"# ; "non-hex event id")]
    fn test_decode_rejects(text: &str) {
        assert_eq!(decode(text), None);
    }
}
