//! Payload-Routing – Unterscheidet eingehende Nachrichten am `type`-Feld
//!
//! Der Transport liefert opake Text-Payloads. Hier wird entschieden ob ein
//! Payload ein `CallSignal` oder ein `HeartbeatMessage` ist. Alles was sich
//! nicht zuordnen laesst wird als `None` gemeldet und vom Aufrufer
//! kommentarlos verworfen – ein fremdes Payload auf dem Kanal ist kein
//! Protokollfehler.

use crate::heartbeat::{HeartbeatMessage, HEARTBEAT_TYP};
use crate::signal::CallSignal;

/// Eine erfolgreich zugeordnete eingehende Nachricht
#[derive(Debug, Clone)]
pub enum EingehendeNachricht {
    /// Anruf-Signal, geht an die Zustandsmaschine
    Signal(CallSignal),
    /// Heartbeat, geht an den Praesenz-Tracker
    Heartbeat(HeartbeatMessage),
}

/// Parst ein rohes Transport-Payload
///
/// Gibt `None` zurueck wenn das Payload kein JSON ist, kein `type`-Feld
/// traegt oder die Felder des erkannten Typs nicht vollstaendig sind.
pub fn nachricht_parsen(payload: &str) -> Option<EingehendeNachricht> {
    let wert: serde_json::Value = serde_json::from_str(payload).ok()?;
    let typ = wert.get("type")?.as_str()?;

    match typ {
        HEARTBEAT_TYP => {
            let hb: HeartbeatMessage = serde_json::from_value(wert).ok()?;
            Some(EingehendeNachricht::Heartbeat(hb))
        }
        "INCOMING_CALL" | "CALL_ACCEPTED" | "CALL_DECLINED" | "CALL_ENDED" => {
            let signal: CallSignal = serde_json::from_value(wert).ok()?;
            Some(EingehendeNachricht::Signal(signal))
        }
        _ => None,
    }
}
