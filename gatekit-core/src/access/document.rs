//! The proxy's access document as an immutable snapshot.
//!
//! The document is kept as a JSON tree rather than a fully typed struct so
//! that everything the engine does not own (log settings, other inbounds,
//! outbounds, stream settings, extra client fields) round-trips untouched
//! and in its original key order. Mutations return a new snapshot.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{GateKitError, GateKitResult};

/// One permitted client inside the managed inbound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClientEntry {
    /// Client credential, mirrors `SubscriptionRecord::client_id`.
    pub id: String,
    /// Mirrors `SubscriptionRecord::label`. Stored as `email` on disk;
    /// hand-added clients may omit it.
    #[serde(rename = "email", default)]
    pub label: String,
}

/// Full proxy configuration document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessConfigDocument {
    root: Value,
}

impl AccessConfigDocument {
    /// The document materialized when none exists on disk: warning-level
    /// logging, one TLS inbound for `protocol` on `inbound_port` with an empty
    /// client list, one direct outbound.
    #[must_use]
    pub fn default_for(protocol: &str, inbound_port: u16) -> Self {
        Self {
            root: json!({
                "log": {
                    "loglevel": "warning"
                },
                "inbounds": [
                    {
                        "tag": format!("{protocol}-in"),
                        "port": inbound_port,
                        "listen": "0.0.0.0",
                        "protocol": protocol,
                        "settings": {
                            "clients": [],
                            "decryption": "none"
                        },
                        "streamSettings": {
                            "network": "tcp",
                            "security": "tls"
                        }
                    }
                ],
                "outbounds": [
                    {
                        "tag": "direct",
                        "protocol": "freedom",
                        "settings": {}
                    }
                ]
            }),
        }
    }

    /// Wraps a parsed JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`GateKitError::Config`] if the root is not a JSON object.
    pub fn from_value(root: Value) -> GateKitResult<Self> {
        if root.is_object() {
            Ok(Self { root })
        } else {
            Err(GateKitError::Config(
                "access document root must be a JSON object".to_string(),
            ))
        }
    }

    /// Parses a document from its on-disk text.
    ///
    /// # Errors
    ///
    /// Returns [`GateKitError::Config`] if the text is not a JSON object.
    pub fn from_json_str(raw: &str) -> GateKitResult<Self> {
        let root = serde_json::from_str(raw).map_err(|err| {
            GateKitError::Config(format!("access document is not valid JSON: {err}"))
        })?;
        Self::from_value(root)
    }

    /// Serializes deterministically: two-space indentation, original key
    /// order, trailing newline.
    ///
    /// # Errors
    ///
    /// Returns [`GateKitError::Config`] if serialization fails.
    pub fn to_json_pretty(&self) -> GateKitResult<String> {
        let mut text = serde_json::to_string_pretty(&self.root).map_err(|err| {
            GateKitError::Config(format!("cannot serialize access document: {err}"))
        })?;
        text.push('\n');
        Ok(text)
    }

    /// Returns the underlying JSON tree.
    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.root
    }

    /// Returns the position of the single inbound whose protocol is
    /// `protocol`.
    ///
    /// # Errors
    ///
    /// Returns [`GateKitError::Config`] when no inbound or more than one
    /// inbound matches. Ambiguity is never resolved by picking one.
    pub fn managed_inbound_index(&self, protocol: &str) -> GateKitResult<usize> {
        let inbounds = match self.root.get("inbounds") {
            None => &[][..],
            Some(Value::Array(items)) => items.as_slice(),
            Some(_) => {
                return Err(GateKitError::Config(
                    "access document `inbounds` must be an array".to_string(),
                ))
            }
        };
        let mut matches = inbounds.iter().enumerate().filter(|(_, inbound)| {
            inbound.get("protocol").and_then(Value::as_str) == Some(protocol)
        });
        match (matches.next(), matches.next()) {
            (Some((index, _)), None) => Ok(index),
            (None, _) => Err(GateKitError::Config(format!(
                "no `{protocol}` inbound found in access document"
            ))),
            (Some(_), Some(_)) => Err(GateKitError::Config(format!(
                "{} `{protocol}` inbounds found in access document, expected exactly one",
                2 + matches.count()
            ))),
        }
    }

    /// Returns the managed inbound's client list.
    ///
    /// Entries without a string `id` are not credentials this engine can
    /// match and are left out, the same way the mutation methods ignore
    /// them. A missing email reads as an empty label.
    ///
    /// # Errors
    ///
    /// Returns [`GateKitError::Config`] if the managed inbound cannot be
    /// located or its client list is not an array.
    pub fn managed_clients(&self, protocol: &str) -> GateKitResult<Vec<AccessClientEntry>> {
        let index = self.managed_inbound_index(protocol)?;
        let clients = self.root["inbounds"][index]
            .get("settings")
            .and_then(|settings| settings.get("clients"));
        match clients {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(entries)) => Ok(entries
                .iter()
                .filter_map(|entry| {
                    let Some(id) = entry_id(entry) else {
                        log::debug!("skipping client entry without a string id: {entry}");
                        return None;
                    };
                    Some(AccessClientEntry {
                        id: id.to_string(),
                        label: entry
                            .get("email")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    })
                })
                .collect()),
            Some(_) => Err(GateKitError::Config(
                "managed inbound `settings.clients` must be an array".to_string(),
            )),
        }
    }

    /// Whether an entry with `id` is present in the managed client list.
    ///
    /// # Errors
    ///
    /// Same as [`managed_clients`](Self::managed_clients).
    pub fn contains_client(&self, protocol: &str, id: &str) -> GateKitResult<bool> {
        Ok(self
            .managed_clients(protocol)?
            .iter()
            .any(|client| client.id == id))
    }

    /// Returns a snapshot with `{id, email: label}` appended to the managed
    /// client list, or an unchanged copy if `id` is already present.
    ///
    /// # Errors
    ///
    /// Returns [`GateKitError::Config`] if the managed inbound cannot be
    /// located.
    pub fn with_client(&self, protocol: &str, id: &str, label: &str) -> GateKitResult<Self> {
        let mut next = self.clone();
        let clients = next.managed_clients_mut(protocol)?;
        if !clients.iter().any(|client| entry_id(client) == Some(id)) {
            clients.push(json!({ "id": id, "email": label }));
        }
        Ok(next)
    }

    /// Returns a snapshot with every entry whose id is `id` removed.
    ///
    /// # Errors
    ///
    /// Returns [`GateKitError::Config`] if the managed inbound cannot be
    /// located.
    pub fn without_client(&self, protocol: &str, id: &str) -> GateKitResult<Self> {
        let mut next = self.clone();
        next.managed_clients_mut(protocol)?
            .retain(|client| entry_id(client) != Some(id));
        Ok(next)
    }

    fn managed_clients_mut(&mut self, protocol: &str) -> GateKitResult<&mut Vec<Value>> {
        let index = self.managed_inbound_index(protocol)?;
        let inbound = self.root["inbounds"][index]
            .as_object_mut()
            .ok_or_else(|| GateKitError::Config("managed inbound must be an object".to_string()))?;
        let settings = inbound
            .entry("settings")
            .or_insert_with(|| Value::Object(Map::new()));
        if settings.is_null() {
            *settings = Value::Object(Map::new());
        }
        let settings = settings.as_object_mut().ok_or_else(|| {
            GateKitError::Config("managed inbound `settings` must be an object".to_string())
        })?;
        let clients = settings
            .entry("clients")
            .or_insert_with(|| Value::Array(Vec::new()));
        if clients.is_null() {
            *clients = Value::Array(Vec::new());
        }
        clients.as_array_mut().ok_or_else(|| {
            GateKitError::Config("managed inbound `settings.clients` must be an array".to_string())
        })
    }
}

fn entry_id(client: &Value) -> Option<&str> {
    client.get("id").and_then(Value::as_str)
}
