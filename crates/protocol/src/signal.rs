//! Anruf-Signale (Punkt-zu-Punkt)
//!
//! Ein `CallSignal` ist nach dem Senden unveraenderlich. Jedes Signal
//! traegt die CallId des Anrufversuchs zu dem es gehoert.

use gegensprech_core::{CallId, ChannelId, Identity};
use serde::{Deserialize, Serialize};

/// Die vier Signaltypen des Anruf-Protokolls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallSignalTyp {
    IncomingCall,
    CallAccepted,
    CallDeclined,
    CallEnded,
}

impl std::fmt::Display for CallSignalTyp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CallSignalTyp::IncomingCall => "INCOMING_CALL",
            CallSignalTyp::CallAccepted => "CALL_ACCEPTED",
            CallSignalTyp::CallDeclined => "CALL_DECLINED",
            CallSignalTyp::CallEnded => "CALL_ENDED",
        };
        write!(f, "{}", s)
    }
}

/// Ein Signal der Anruf-Zustandsmaschine
///
/// Wire-Format (JSON):
/// `{ "type": "INCOMING_CALL", "from": "...", "to": "...",
///    "channel": "...", "timestamp": 1700000000000, "callId": "..." }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSignal {
    /// Signaltyp
    #[serde(rename = "type")]
    pub typ: CallSignalTyp,
    /// Absender-Identitaet
    pub from: Identity,
    /// Empfaenger-Identitaet
    pub to: Identity,
    /// Kanal des Standorts (fuer den Medien-Beitritt nach CALL_ACCEPTED)
    pub channel: ChannelId,
    /// Sendezeitpunkt in Unix-Millisekunden
    pub timestamp: i64,
    /// Anruf-Bezeichner, vom Initiator vergeben
    #[serde(rename = "callId")]
    pub call_id: CallId,
}

impl CallSignal {
    /// Erstellt ein neues Signal mit aktuellem Zeitstempel
    pub fn neu(
        typ: CallSignalTyp,
        from: Identity,
        to: Identity,
        channel: ChannelId,
        call_id: CallId,
    ) -> Self {
        Self {
            typ,
            from,
            to,
            channel,
            timestamp: crate::jetzt_millis(),
            call_id,
        }
    }

    /// Prueft ob das Signal an die lokale Identitaet adressiert ist
    ///
    /// Signale deren `to` nicht zur lokalen Identitaet passt werden von
    /// der Zustandsmaschine ignoriert.
    pub fn ist_adressiert_an(&self, lokal: &Identity) -> bool {
        &self.to == lokal
    }

    /// Serialisiert das Signal als JSON-Payload fuer den Transport
    pub fn als_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_signal(typ: CallSignalTyp) -> CallSignal {
        CallSignal::neu(
            typ,
            Identity::neu("tablet-a"),
            Identity::neu("tablet-b"),
            ChannelId::neu("c1"),
            CallId("1700000000000-abcd".into()),
        )
    }

    #[test]
    fn signal_typ_screaming_snake_auf_dem_draht() {
        let json = test_signal(CallSignalTyp::IncomingCall).als_json().unwrap();
        assert!(json.contains("\"type\":\"INCOMING_CALL\""));
        assert!(json.contains("\"callId\":\"1700000000000-abcd\""));
    }

    #[test]
    fn signal_roundtrip() {
        let signal = test_signal(CallSignalTyp::CallDeclined);
        let json = signal.als_json().unwrap();
        let zurueck: CallSignal = serde_json::from_str(&json).unwrap();
        assert_eq!(signal, zurueck);
    }

    #[test]
    fn adressierung() {
        let signal = test_signal(CallSignalTyp::CallAccepted);
        assert!(signal.ist_adressiert_an(&Identity::neu("tablet-b")));
        assert!(!signal.ist_adressiert_an(&Identity::neu("tablet-c")));
    }
}
