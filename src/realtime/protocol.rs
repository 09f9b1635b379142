//! Phoenix channel frames for row-change notifications

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

/// Topic every channel joins under.
pub fn topic(name: &str) -> String {
    format!("realtime:{}", name)
}

/// Refs are strings on the wire but some servers echo them as numbers.
fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<String>;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("string, number or null")
        }
        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }
        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }
        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
    }
    d.deserialize_any(Visitor)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(
        rename = "ref",
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub reference: Option<String>,
}

impl Frame {
    pub fn to_text(&self) -> String {
        // A struct of strings and a Value always serializes
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Row-change kinds a binding can listen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    Any,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
            ChangeKind::Any => "*",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }
}

/// One `postgres_changes` listener: a table, an event kind and at most one
/// column filter. Several filters on a table need several bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub kind: ChangeKind,
    pub table: String,
    pub filter: Option<String>,
}

impl Binding {
    pub fn new(kind: ChangeKind, table: &str) -> Self {
        Self {
            kind,
            table: table.to_string(),
            filter: None,
        }
    }

    /// Only rows where `column` equals `value`.
    pub fn eq(mut self, column: &str, value: &str) -> Self {
        self.filter = Some(format!("{}=eq.{}", column, value));
        self
    }

    fn to_json(&self) -> Value {
        let mut v = json!({
            "event": self.kind.as_str(),
            "schema": "public",
            "table": self.table,
        });
        if let Some(ref f) = self.filter {
            v["filter"] = json!(f);
        }
        v
    }
}

pub fn join_frame(topic: &str, bindings: &[Binding], access_token: &str, reference: String) -> Frame {
    Frame {
        topic: topic.to_string(),
        event: "phx_join".to_string(),
        payload: json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": bindings.iter().map(Binding::to_json).collect::<Vec<_>>(),
            },
            "access_token": access_token,
        }),
        reference: Some(reference),
    }
}

pub fn leave_frame(topic: &str, reference: String) -> Frame {
    Frame {
        topic: topic.to_string(),
        event: "phx_leave".to_string(),
        payload: json!({}),
        reference: Some(reference),
    }
}

/// Hand a joined channel a fresh access token.
pub fn access_token_frame(topic: &str, access_token: &str, reference: String) -> Frame {
    Frame {
        topic: topic.to_string(),
        event: "access_token".to_string(),
        payload: json!({ "access_token": access_token }),
        reference: Some(reference),
    }
}

pub fn heartbeat_frame(reference: String) -> Frame {
    Frame {
        topic: "phoenix".to_string(),
        event: "heartbeat".to_string(),
        payload: json!({}),
        reference: Some(reference),
    }
}

/// A row change delivered on a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub table: String,
    pub record: Value,
    pub old_record: Value,
}

impl ChangeEvent {
    /// Typed view of the new row.
    pub fn record_as<T: serde::de::DeserializeOwned>(&self) -> anyhow::Result<T> {
        crate::models::rows::parse_row(self.record.clone(), &self.table)
    }
}

/// What an inbound text frame means to the connection.
#[derive(Debug, PartialEq)]
pub enum Incoming {
    Change { topic: String, change: ChangeEvent },
    Reply { topic: String, reference: Option<String>, ok: bool, detail: Value },
    ChannelClosed { topic: String, reason: String },
    Other,
}

pub fn parse_incoming(text: &str) -> Incoming {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!("Unparseable realtime frame ({}): {}", e, text);
            return Incoming::Other;
        }
    };

    match frame.event.as_str() {
        "postgres_changes" => {
            let data = &frame.payload["data"];
            let kind = match data["type"].as_str().and_then(ChangeKind::parse) {
                Some(k) => k,
                None => return Incoming::Other,
            };
            Incoming::Change {
                topic: frame.topic,
                change: ChangeEvent {
                    kind,
                    table: data["table"].as_str().unwrap_or_default().to_string(),
                    record: data["record"].clone(),
                    old_record: data["old_record"].clone(),
                },
            }
        }
        "phx_reply" => Incoming::Reply {
            ok: frame.payload["status"] == "ok",
            detail: frame.payload["response"].clone(),
            topic: frame.topic,
            reference: frame.reference,
        },
        "phx_error" | "phx_close" => Incoming::ChannelClosed {
            reason: frame.event.clone(),
            topic: frame.topic,
        },
        "system" if frame.payload["status"] == "error" => Incoming::ChannelClosed {
            reason: frame.payload["message"]
                .as_str()
                .unwrap_or("system error")
                .to_string(),
            topic: frame.topic,
        },
        _ => Incoming::Other,
    }
}
