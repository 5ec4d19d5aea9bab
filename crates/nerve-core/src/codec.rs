// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Event to JSON object conversion.
//!
//! An event becomes one flat JSON object: one string field per header, plus
//! the reserved fields below. Header names that collide with a reserved
//! field are shadowed by it.
//!
//! | Field | Content |
//! |---|---|
//! | `_id` | event id, decimal, as a string |
//! | `_name` | registered name of the id, when there is one |
//! | `_length` | body length in bytes, decimal, as a string (only with a body) |
//! | `_body` | body text (only with a body) |

use crate::error::{NerveError, NerveResult};
use crate::event::{Event, EventId, NULL_SOURCE_ID};
use crate::registry::TypeRegistry;
use serde_json::{Map, Value};

/// Reserved field holding the event id.
pub const FIELD_ID: &str = "_id";
/// Reserved field holding the registered event name.
pub const FIELD_NAME: &str = "_name";
/// Reserved field holding the body length.
pub const FIELD_LENGTH: &str = "_length";
/// Reserved field holding the body.
pub const FIELD_BODY: &str = "_body";

fn is_reserved(field: &str) -> bool {
    matches!(field, FIELD_ID | FIELD_NAME | FIELD_LENGTH | FIELD_BODY)
}

/// Converts `event` into a JSON object.
pub fn serialize(event: &Event, types: &TypeRegistry) -> Value {
    let mut object = Map::new();
    for (name, value) in event.headers() {
        object.insert(name.to_string(), Value::String(value.to_string()));
    }

    let id = event.event_id();
    object.insert(FIELD_ID.into(), Value::String(id.to_string()));
    if let Some(name) = types.get_name(id) {
        object.insert(FIELD_NAME.into(), Value::String(name));
    }
    if let Some(body) = event.body() {
        object.insert(FIELD_LENGTH.into(), Value::String(body.len().to_string()));
        object.insert(FIELD_BODY.into(), Value::String(body.to_string()));
    }
    Value::Object(object)
}

/// Rebuilds an event from a JSON object.
///
/// Every non-reserved field becomes a header; string values are taken as-is
/// and other values in their compact JSON form. The event id must be present
/// and registered, otherwise the payload is refused with
/// [`NerveError::Declined`]. The rebuilt event has no source id.
pub fn deserialize(value: &Value, types: &TypeRegistry) -> NerveResult<Event> {
    let object = value
        .as_object()
        .ok_or_else(|| NerveError::Declined("event payload is not a JSON object".into()))?;

    let id = parse_id(object.get(FIELD_ID))?;
    if !types.contains(id) {
        log::debug!("Refusing payload for unregistered event {id}.");
        return Err(NerveError::Declined(format!("event id {id} is not registered")));
    }

    let mut event = Event::new(id, NULL_SOURCE_ID);
    for (field, value) in object {
        if is_reserved(field) {
            continue;
        }
        match value {
            Value::String(s) => event.add_header(field.as_str(), s.as_str()),
            other => event.add_header(field.as_str(), other.to_string()),
        }
    }

    match object.get(FIELD_BODY) {
        Some(Value::String(body)) => event.set_body(body.as_str()),
        Some(Value::Null) | None => {}
        Some(other) => event.set_body(other.to_string()),
    }
    Ok(event)
}

fn parse_id(field: Option<&Value>) -> NerveResult<EventId> {
    let parsed = match field {
        Some(Value::String(s)) => s.trim().parse::<EventId>().ok(),
        Some(Value::Number(n)) => n.as_u64().and_then(|n| EventId::try_from(n).ok()),
        _ => None,
    };
    parsed.ok_or_else(|| {
        log::debug!("Refusing payload with missing or malformed '{FIELD_ID}'.");
        NerveError::Declined(format!("missing or malformed '{FIELD_ID}' field"))
    })
}

/// Serializes `event` to compact JSON text.
pub fn to_json_string(event: &Event, types: &TypeRegistry) -> NerveResult<String> {
    Ok(serde_json::to_string(&serialize(event, types))?)
}

/// Parses JSON text and rebuilds the event.
///
/// Malformed text fails with [`NerveError::Codec`].
pub fn from_json_str(text: &str, types: &TypeRegistry) -> NerveResult<Event> {
    let value: Value = serde_json::from_str(text).map_err(|e| {
        log::debug!("Dropping malformed event payload: {e}");
        NerveError::from(e)
    })?;
    deserialize(&value, types)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Status;
    use crate::pool::FastPool;
    use serde_json::json;
    use std::collections::HashMap;

    fn types() -> TypeRegistry {
        let types = TypeRegistry::new();
        types.register(21, "test_event").unwrap();
        types
    }

    fn header_map(event: &Event) -> HashMap<String, String> {
        event
            .headers()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn serialize_emits_reserved_fields() {
        let types = types();
        let mut event = Event::new(21, 3);
        event.add_header("k", "v");
        event.set_body("héllo");

        let value = serialize(&event, &types);
        assert_eq!(
            value,
            json!({
                "k": "v",
                "_id": "21",
                "_name": "test_event",
                "_length": "6",
                "_body": "héllo"
            })
        );
    }

    #[test]
    fn bodiless_unnamed_event_has_only_id() {
        let types = TypeRegistry::new();
        let value = serialize(&Event::new(99, 0), &types);
        assert_eq!(value, json!({ "_id": "99" }));
    }

    #[test]
    fn round_trip_keeps_id_body_and_headers() {
        let types = types();
        let mut event = Event::new(21, 0);
        event.add_header("alpha", "1");
        event.add_header("beta", "two");
        event.set_body("{\"nested\":true}");

        let back = from_json_str(&to_json_string(&event, &types).unwrap(), &types).unwrap();
        assert_eq!(back.event_id(), 21);
        assert_eq!(back.body(), event.body());
        assert_eq!(header_map(&back), header_map(&event));
    }

    #[test]
    fn fast_events_serialize_their_slots() {
        let types = types();
        let pool = FastPool::new(1, 1, 2, &[8, 8], 16).unwrap();
        let mut node = pool.alloc().unwrap();
        node.set_strheader(0, "kind", "ping").unwrap();
        node.set_uintheader(1, "seq", 42).unwrap();
        node.set_body("fast").unwrap();
        let event = Event::from_fast(21, 0, node);

        let back = deserialize(&serialize(&event, &types), &types).unwrap();
        assert_eq!(back.header("kind"), Some("ping"));
        assert_eq!(back.header("seq"), Some("42"));
        assert_eq!(back.body(), Some("fast"));
        assert!(!back.is_fast());
    }

    #[test]
    fn overwritten_fast_slot_round_trips_the_new_value() {
        let types = types();
        let pool = FastPool::new(1, 1, 1, &[8], 0).unwrap();
        let mut node = pool.alloc().unwrap();
        node.set_strheader(0, "k", "fast").unwrap();
        let mut event = Event::from_fast(21, 0, node);
        event.add_header("k", "owned");

        let value = serialize(&event, &types);
        assert_eq!(value["k"], json!("owned"));
        let back = deserialize(&value, &types).unwrap();
        assert_eq!(back.header("k"), Some("owned"));
        assert_eq!(header_map(&back), header_map(&event));
    }

    #[test]
    fn non_string_fields_become_text_headers() {
        let types = types();
        let event = deserialize(&json!({ "_id": 21, "n": 5, "flag": true }), &types).unwrap();
        assert_eq!(event.header("n"), Some("5"));
        assert_eq!(event.header("flag"), Some("true"));
        assert_eq!(event.body(), None);
    }

    #[test]
    fn missing_or_unregistered_id_is_declined() {
        let types = types();
        for payload in [
            json!({ "k": "v" }),
            json!({ "_id": "abc" }),
            json!({ "_id": "22" }),
            json!([1, 2]),
        ] {
            let err = deserialize(&payload, &types).unwrap_err();
            assert_eq!(err.status(), Status::False, "payload {payload}");
        }
    }

    #[test]
    fn malformed_text_is_a_codec_error() {
        let err = from_json_str("{\"_id\": ", &types()).unwrap_err();
        assert!(matches!(err, NerveError::Codec(_)));
        assert_eq!(err.status(), Status::False);
    }
}
