//! Gemeinsame Identifikationstypen fuer Gegensprech
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! verschiedenen ID-Arten zur Compilezeit auszuschliessen. Auf dem Draht
//! (§ Wire-Format) erscheinen alle drei als nackte Strings, daher
//! `#[serde(transparent)]`.

use serde::{Deserialize, Serialize};

/// Adresse einer Partei auf dem Messaging-Transport (Site-/Tablet-Name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(pub String);

impl Identity {
    /// Erstellt eine neue Identity aus einem Site-Namen
    pub fn neu(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Gibt den inneren Namen zurueck
    pub fn als_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Name einer Broadcast-Gruppe auf dem Messaging-Transport
///
/// Alle Tablets eines physischen Standorts treten demselben Kanal bei
/// und tauschen darueber Heartbeats aus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub String);

impl ChannelId {
    /// Erstellt eine neue ChannelId
    pub fn neu(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Gibt den inneren Namen zurueck
    pub fn als_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaker Bezeichner eines einzelnen Anrufversuchs
///
/// Wird vom Initiator beim Senden von `INCOMING_CALL` vergeben und von
/// beiden Parteien bis zum Anrufende festgehalten. Eine ID wird nie
/// wiederverwendet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(pub String);

impl CallId {
    /// Vergibt eine frische CallId: Unix-Millis plus kurzes Zufallssuffix
    ///
    /// Eindeutig mit ueberwaeltigender Wahrscheinlichkeit innerhalb einer
    /// Prozesslebensdauer; globale Eindeutigkeit ist nicht erforderlich.
    pub fn vergeben() -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let suffix: u16 = rand::random();
        Self(format!("{}-{:04x}", millis, suffix))
    }

    /// Gibt den inneren String zurueck
    pub fn als_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_id_eindeutig() {
        let a = CallId::vergeben();
        let b = CallId::vergeben();
        assert_ne!(a, b, "Zwei frisch vergebene CallIds muessen verschieden sein");
    }

    #[test]
    fn call_id_format() {
        let id = CallId::vergeben();
        let (millis, suffix) = id.als_str().split_once('-').expect("Trennzeichen fehlt");
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(suffix.len(), 4);
    }

    #[test]
    fn identity_serialisiert_als_nackter_string() {
        let id = Identity::neu("tablet-eingang");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"tablet-eingang\"");
    }

    #[test]
    fn ids_sind_serde_kompatibel() {
        let kanal = ChannelId::neu("c1");
        let json = serde_json::to_string(&kanal).unwrap();
        let kanal2: ChannelId = serde_json::from_str(&json).unwrap();
        assert_eq!(kanal, kanal2);
    }
}
