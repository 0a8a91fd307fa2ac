// src/hardware/mock_protocol.rs - command and query stand-ins for virtual pins
//
// Host code that talks to an MCU looks up command and query objects by
// message format and sends through them. For virtual pins nothing goes on
// the wire: commands are dropped and queries answer with a canned response.

use serde_json::{Map, Value};

/// Handle returned by `alloc_command_queue`. Virtual pins have no queues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandQueue;

/// Canned query response: field name to synthesized value.
pub type QueryResponse = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct MockCommand {
    msgformat: String,
}

impl MockCommand {
    pub fn new(msgformat: &str) -> Self {
        Self {
            msgformat: msgformat.to_string(),
        }
    }

    pub fn msgformat(&self) -> &str {
        &self.msgformat
    }

    pub fn send(&self, data: &[i64], _minclock: u64, _reqclock: u64) {
        tracing::trace!("Dropping virtual command '{}' {:?}", self.msgformat, data);
    }

    pub fn get_command_tag(&self) -> Option<u32> {
        None
    }
}

/// Query stand-in. The response format (`"name field=%x field2=%y"`) is
/// parsed once: `oid` is answered with the query's object id, every other
/// field with `1`.
#[derive(Debug, Clone, PartialEq)]
pub struct MockCommandQuery {
    response: QueryResponse,
}

impl MockCommandQuery {
    pub fn new(respformat: &str, oid: Option<u32>) -> Self {
        let mut response = Map::new();
        for entry in respformat.split_whitespace().skip(1) {
            let Some((key, _)) = entry.split_once('=') else {
                tracing::debug!("Skipping response field without format: '{}'", entry);
                continue;
            };
            let value = if key == "oid" { Value::from(oid) } else { Value::from(1) };
            response.insert(key.to_string(), value);
        }
        Self { response }
    }

    pub fn send(&self, _data: &[i64], _minclock: u64, _reqclock: u64) -> QueryResponse {
        self.response.clone()
    }

    pub fn send_with_preface(
        &self,
        _preface: &MockCommand,
        _preface_data: &[i64],
        _data: &[i64],
        _minclock: u64,
        _reqclock: u64,
    ) -> QueryResponse {
        self.response.clone()
    }
}
