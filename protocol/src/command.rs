use crate::endpoint::Endpoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// The closed set of command tags a sender may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandTag {
    // NB: order matters here — it drives CommandTag::ALL and the
    // `get help` listing.
    Echo,
    Shutdown,
    Disconnect,
    Get,
    Set,
    Update,
    Msg,
}

impl CommandTag {
    pub const ALL: [CommandTag; 7] = [
        CommandTag::Echo,
        CommandTag::Shutdown,
        CommandTag::Disconnect,
        CommandTag::Get,
        CommandTag::Set,
        CommandTag::Update,
        CommandTag::Msg,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandTag::Echo => "echo",
            CommandTag::Shutdown => "shutdown",
            CommandTag::Disconnect => "disconnect",
            CommandTag::Get => "get",
            CommandTag::Set => "set",
            CommandTag::Update => "update",
            CommandTag::Msg => "msg",
        }
    }
}

impl fmt::Display for CommandTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A decoded command, tagged with the endpoint it arrived from.
///
/// `source` is never present on the wire — [`Serialize`] skips it, and the
/// ingest path fills it in right after a successful decode (see
/// `broker-protocol::Codec::decode`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub command: CommandTag,
    pub timestamp: DateTime<Utc>,
    #[serde(default = "empty_payload")]
    pub payload: Value,
    #[serde(skip)]
    pub source: Option<Endpoint>,
}

fn empty_payload() -> Value {
    json!({})
}

impl Command {
    /// Rewrites `timestamp` to now and stashes the previous value into
    /// `payload.orig_timestamp`, the way the original broker's
    /// `UpdateTimestamp` does.
    pub fn update_timestamp(&mut self) {
        let prior = self.timestamp;
        self.timestamp = Utc::now();
        if let Value::Object(map) = &mut self.payload {
            map.insert("orig_timestamp".to_string(), json!(prior));
        } else {
            self.payload = json!({ "orig_timestamp": prior });
        }
    }

    /// The `params` array of a `get` command, already reduced to strings;
    /// any non-string entries are silently ignored per spec.
    pub fn params(&self) -> Vec<String> {
        self.payload
            .get("params")
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_response(&mut self, response: Value) {
        if let Value::Object(map) = &mut self.payload {
            map.insert("response".to_string(), response);
        } else {
            self.payload = json!({ "response": response });
        }
    }
}
