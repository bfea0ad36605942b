//! Deprecated attribute key renames
//!
//! Maps pre-1.38 semantic convention keys to their current names. The
//! table is built once at startup and shared read-only.

use std::collections::HashMap;

use serde_json::{Map, Value as JsonValue};

/// `(deprecated, current)` pairs
const RENAMES: &[(&str, &str)] = &[
    // HTTP
    ("http.method", "http.request.method"),
    ("http.url", "url.full"),
    ("http.target", "url.path"),
    ("http.host", "server.address"),
    ("http.scheme", "url.scheme"),
    ("http.status_code", "http.response.status_code"),
    ("http.flavor", "network.protocol.version"),
    ("http.user_agent", "user_agent.original"),
    ("http.request_content_length", "http.request.body.size"),
    ("http.response_content_length", "http.response.body.size"),
    ("http.server_name", "server.address"),
    ("http.client_ip", "client.address"),
    // Database
    ("db.system", "db.system.name"),
    ("db.statement", "db.query.text"),
    ("db.operation", "db.operation.name"),
    ("db.name", "db.namespace"),
    ("db.connection_string", "db.client.connection.string"),
    // Network
    ("net.peer.name", "server.address"),
    ("net.peer.port", "server.port"),
    ("net.host.name", "server.address"),
    ("net.host.port", "server.port"),
    ("net.transport", "network.transport"),
    ("net.protocol.name", "network.protocol.name"),
    ("net.protocol.version", "network.protocol.version"),
    ("net.sock.peer.addr", "network.peer.address"),
    ("net.sock.peer.port", "network.peer.port"),
    ("net.sock.host.addr", "network.local.address"),
    ("net.sock.host.port", "network.local.port"),
    // Messaging
    ("messaging.destination", "messaging.destination.name"),
    ("messaging.temp_destination", "messaging.destination.temporary"),
    ("messaging.protocol", "network.protocol.name"),
    ("messaging.protocol_version", "network.protocol.version"),
    ("messaging.url", "url.full"),
    ("messaging.message_id", "messaging.message.id"),
    ("messaging.conversation_id", "messaging.message.conversation_id"),
    ("messaging.message_payload_size_bytes", "messaging.message.body.size"),
    // GenAI
    ("gen_ai.system", "gen_ai.provider.name"),
    ("gen_ai.request.max_tokens", "gen_ai.request.max_output_tokens"),
    ("gen_ai.usage.prompt_tokens", "gen_ai.usage.input_tokens"),
    ("gen_ai.usage.completion_tokens", "gen_ai.usage.output_tokens"),
    // Code
    ("code.function", "code.function.name"),
    ("code.filepath", "code.file.path"),
    ("code.lineno", "code.line.number"),
];

/// Immutable deprecated-to-current key mapping
#[derive(Debug, Clone)]
pub struct SemconvTable {
    renames: HashMap<&'static str, &'static str>,
}

impl Default for SemconvTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SemconvTable {
    pub fn new() -> Self {
        Self {
            renames: RENAMES.iter().copied().collect(),
        }
    }

    /// Current name for `key`, or `None` if it is not deprecated
    pub fn current_name(&self, key: &str) -> Option<&'static str> {
        self.renames.get(key).copied()
    }

    /// Rewrite deprecated keys in place.
    ///
    /// When the current key is already present it wins and the deprecated
    /// entry is left under its old name.
    pub fn apply(&self, attrs: &mut Map<String, JsonValue>) {
        let deprecated: Vec<(String, &'static str)> = attrs
            .keys()
            .filter_map(|k| self.current_name(k).map(|new| (k.clone(), new)))
            .collect();
        for (old, new) in deprecated {
            if attrs.contains_key(new) {
                continue;
            }
            if let Some(value) = attrs.remove(&old) {
                attrs.insert(new.to_string(), value);
            }
        }
    }
}
