//! Client/relay wire messages (spec §6 "Relay Wire Protocol").
//!
//! Every message is a JSON array whose first element is a string tag.
//! `tokio-tungstenite` already frames individual WebSocket text messages for
//! us, so this module only has to (de)serialize one JSON array per message —
//! there is no additional length-prefixing layer the way a binary transport
//! would need.

use crate::error::{Error, Result};
use crate::types::{Event, EventId, Filter};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message sent from client to relay.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientMessage {
    /// `["REQ", <subscription_id>, <filter>...]`
    Req { sub_id: String, filters: Vec<Filter> },
    /// `["CLOSE", <subscription_id>]`
    Close { sub_id: String },
    /// `["EVENT", <event>]`
    Event { event: Event },
}

/// A message sent from relay to client.
#[derive(Clone, Debug, PartialEq)]
pub enum RelayMessage {
    /// `["EVENT", <subscription_id>, <event>]`
    Event { sub_id: String, event: Event },
    /// `["EOSE", <subscription_id>]`
    Eose { sub_id: String },
    /// `["OK", <event_id>, <accepted>, <message>]`
    Ok {
        event_id: EventId,
        accepted: bool,
        message: String,
    },
    /// `["NOTICE", <message>]`
    Notice { message: String },
    /// `["AUTH", <challenge>]`
    Auth { challenge: String },
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String> {
        let value = match self {
            ClientMessage::Req { sub_id, filters } => {
                let mut arr = vec![Value::String("REQ".into()), Value::String(sub_id.clone())];
                for filter in filters {
                    arr.push(serde_json::to_value(filter).map_err(|e| Error::BadFrame(e.to_string()))?);
                }
                Value::Array(arr)
            }
            ClientMessage::Close { sub_id } => {
                Value::Array(vec![Value::String("CLOSE".into()), Value::String(sub_id.clone())])
            }
            ClientMessage::Event { event } => Value::Array(vec![
                Value::String("EVENT".into()),
                serde_json::to_value(event).map_err(|e| Error::BadFrame(e.to_string()))?,
            ]),
        };
        serde_json::to_string(&value).map_err(|e| Error::BadFrame(e.to_string()))
    }

    pub fn from_json(s: &str) -> Result<Self> {
        let arr: Vec<Value> = serde_json::from_str(s).map_err(|e| Error::BadFrame(e.to_string()))?;
        let tag = arr
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| Error::BadFrame("missing message tag".into()))?;
        match tag {
            "REQ" => {
                let sub_id = arr
                    .get(1)
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::BadFrame("REQ missing subscription id".into()))?
                    .to_string();
                let filters = arr[2..]
                    .iter()
                    .map(|v| serde_json::from_value(v.clone()).map_err(|e| Error::BadFrame(e.to_string())))
                    .collect::<Result<Vec<Filter>>>()?;
                if filters.is_empty() {
                    return Err(Error::BadFrame("REQ requires at least one filter".into()));
                }
                Ok(ClientMessage::Req { sub_id, filters })
            }
            "CLOSE" => {
                let sub_id = arr
                    .get(1)
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::BadFrame("CLOSE missing subscription id".into()))?
                    .to_string();
                Ok(ClientMessage::Close { sub_id })
            }
            "EVENT" => {
                let event_value = arr
                    .get(1)
                    .ok_or_else(|| Error::BadFrame("EVENT missing body".into()))?;
                let event: Event = serde_json::from_value(event_value.clone())
                    .map_err(|e| Error::BadFrame(e.to_string()))?;
                Ok(ClientMessage::Event { event })
            }
            other => Err(Error::UnsupportedMessage(other.to_string())),
        }
    }
}

impl RelayMessage {
    pub fn to_json(&self) -> Result<String> {
        let value = match self {
            RelayMessage::Event { sub_id, event } => Value::Array(vec![
                Value::String("EVENT".into()),
                Value::String(sub_id.clone()),
                serde_json::to_value(event).map_err(|e| Error::BadFrame(e.to_string()))?,
            ]),
            RelayMessage::Eose { sub_id } => {
                Value::Array(vec![Value::String("EOSE".into()), Value::String(sub_id.clone())])
            }
            RelayMessage::Ok {
                event_id,
                accepted,
                message,
            } => Value::Array(vec![
                Value::String("OK".into()),
                Value::String(event_id.to_hex()),
                Value::Bool(*accepted),
                Value::String(message.clone()),
            ]),
            RelayMessage::Notice { message } => {
                Value::Array(vec![Value::String("NOTICE".into()), Value::String(message.clone())])
            }
            RelayMessage::Auth { challenge } => {
                Value::Array(vec![Value::String("AUTH".into()), Value::String(challenge.clone())])
            }
        };
        serde_json::to_string(&value).map_err(|e| Error::BadFrame(e.to_string()))
    }

    pub fn from_json(s: &str) -> Result<Self> {
        let arr: Vec<Value> = serde_json::from_str(s).map_err(|e| Error::BadFrame(e.to_string()))?;
        let tag = arr
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| Error::BadFrame("missing message tag".into()))?;
        match tag {
            "EVENT" => {
                let sub_id = arr
                    .get(1)
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::BadFrame("EVENT missing subscription id".into()))?
                    .to_string();
                let event_value = arr
                    .get(2)
                    .ok_or_else(|| Error::BadFrame("EVENT missing body".into()))?;
                let event: Event = serde_json::from_value(event_value.clone())
                    .map_err(|e| Error::BadFrame(e.to_string()))?;
                Ok(RelayMessage::Event { sub_id, event })
            }
            "EOSE" => {
                let sub_id = arr
                    .get(1)
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::BadFrame("EOSE missing subscription id".into()))?
                    .to_string();
                Ok(RelayMessage::Eose { sub_id })
            }
            "OK" => {
                let event_id = arr
                    .get(1)
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::BadFrame("OK missing event id".into()))
                    .and_then(|s| EventId::from_hex(s))?;
                let accepted = arr
                    .get(2)
                    .and_then(Value::as_bool)
                    .ok_or_else(|| Error::BadFrame("OK missing accepted flag".into()))?;
                let message = arr.get(3).and_then(Value::as_str).unwrap_or("").to_string();
                Ok(RelayMessage::Ok {
                    event_id,
                    accepted,
                    message,
                })
            }
            "NOTICE" => {
                let message = arr
                    .get(1)
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::BadFrame("NOTICE missing message".into()))?
                    .to_string();
                Ok(RelayMessage::Notice { message })
            }
            "AUTH" => {
                let challenge = arr
                    .get(1)
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::BadFrame("AUTH missing challenge".into()))?
                    .to_string();
                Ok(RelayMessage::Auth { challenge })
            }
            other => Err(Error::UnsupportedMessage(other.to_string())),
        }
    }
}

/// Classification of an `OK` rejection reason (spec §4.C, §7).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    Duplicate,
    Pow,
    Blocked,
    RateLimited,
    Invalid,
    Other,
}

impl RejectReason {
    /// Relays conventionally prefix `OK` failure messages with
    /// `"<reason>: "`, e.g. `"duplicate: already have this event"`.
    pub fn classify(message: &str) -> Self {
        let prefix = message.split(':').next().unwrap_or("").trim();
        match prefix {
            "duplicate" => RejectReason::Duplicate,
            "pow" => RejectReason::Pow,
            "blocked" => RejectReason::Blocked,
            "rate-limited" | "rate_limited" => RejectReason::RateLimited,
            "invalid" => RejectReason::Invalid,
            _ => RejectReason::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Kind;

    #[test]
    fn req_round_trips_through_json() {
        let filter = Filter::new().kinds([Kind::WORKOUT_RECORD]).limit(10);
        let msg = ClientMessage::Req {
            sub_id: "sub1".into(),
            filters: vec![filter],
        };
        let json = msg.to_json().unwrap();
        let parsed = ClientMessage::from_json(&json).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn close_round_trips_through_json() {
        let msg = ClientMessage::Close { sub_id: "sub1".into() };
        let json = msg.to_json().unwrap();
        assert_eq!(ClientMessage::from_json(&json).unwrap(), msg);
    }

    #[test]
    fn req_requires_at_least_one_filter() {
        let err = ClientMessage::from_json(r#"["REQ","sub1"]"#).unwrap_err();
        assert!(matches!(err, Error::BadFrame(_)));
    }

    #[test]
    fn unknown_tag_is_unsupported_message() {
        let err = ClientMessage::from_json(r#"["WHATEVER"]"#).unwrap_err();
        assert!(matches!(err, Error::UnsupportedMessage(_)));
    }

    #[test]
    fn reject_reason_classifies_known_prefixes() {
        assert_eq!(RejectReason::classify("duplicate: have it"), RejectReason::Duplicate);
        assert_eq!(RejectReason::classify("pow: difficulty too low"), RejectReason::Pow);
        assert_eq!(RejectReason::classify("blocked: banned pubkey"), RejectReason::Blocked);
        assert_eq!(
            RejectReason::classify("rate-limited: slow down"),
            RejectReason::RateLimited
        );
        assert_eq!(RejectReason::classify("invalid: bad sig"), RejectReason::Invalid);
        assert_eq!(RejectReason::classify("something else"), RejectReason::Other);
    }

    #[test]
    fn ok_message_round_trips() {
        let event_id = EventId([0x42; 32]);
        let msg = RelayMessage::Ok {
            event_id,
            accepted: false,
            message: "duplicate: already have this event".into(),
        };
        let json = msg.to_json().unwrap();
        assert_eq!(RelayMessage::from_json(&json).unwrap(), msg);
    }
}
