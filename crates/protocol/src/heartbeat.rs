//! Heartbeat-Nachrichten (Broadcast)
//!
//! Jede online Partei sendet periodisch ein Heartbeat in den Standort-Kanal.
//! Heartbeats tragen keine Anruf-Semantik; sie dienen ausschliesslich der
//! Praesenz-Ableitung auf der Empfaengerseite.

use gegensprech_core::Identity;
use serde::{Deserialize, Serialize};

/// `type`-Feldwert eines Heartbeats auf dem Draht
pub const HEARTBEAT_TYP: &str = "heartbeat";

/// Ein periodisches Lebenszeichen
///
/// Wire-Format (JSON):
/// `{ "type": "heartbeat", "userId": "...", "timestamp": 1700000000000,
///    "siteName": "..." }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatMessage {
    /// Immer `"heartbeat"`
    #[serde(rename = "type")]
    pub typ: String,
    /// Identitaet des Senders
    #[serde(rename = "userId")]
    pub user_id: Identity,
    /// Sendezeitpunkt in Unix-Millisekunden
    pub timestamp: i64,
    /// Anzeigename des Standorts
    #[serde(rename = "siteName")]
    pub site_name: String,
}

impl HeartbeatMessage {
    /// Erstellt ein neues Heartbeat mit aktuellem Zeitstempel
    pub fn neu(user_id: Identity, site_name: impl Into<String>) -> Self {
        Self {
            typ: HEARTBEAT_TYP.to_string(),
            user_id,
            timestamp: crate::jetzt_millis(),
            site_name: site_name.into(),
        }
    }

    /// Serialisiert das Heartbeat als JSON-Payload fuer den Broadcast
    pub fn als_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
