//! gegensprech-protocol – Wire-Format des Signalisierungs-Protokolls
//!
//! Definiert die beiden Nachrichtenarten die ueber den Messaging-Transport
//! laufen:
//! - `CallSignal` – Punkt-zu-Punkt-Signale die die Anruf-Zustandsmaschine
//!   treiben (INCOMING_CALL, CALL_ACCEPTED, CALL_DECLINED, CALL_ENDED)
//! - `HeartbeatMessage` – periodische Broadcast-Lebenszeichen ohne
//!   Anruf-Semantik
//!
//! ## Design
//! - JSON als opakes Text-Payload, unterschieden allein am `type`-Feld
//! - camelCase-Feldnamen auf dem Draht (`callId`, `userId`, `siteName`)
//! - Nicht parsebare Payloads sind kein Protokollfehler – der Empfaenger
//!   verwirft sie kommentarlos (siehe `wire::nachricht_parsen`)

pub mod heartbeat;
pub mod signal;
pub mod wire;

// Bequeme Re-Exporte
pub use heartbeat::HeartbeatMessage;
pub use signal::{CallSignal, CallSignalTyp};
pub use wire::{nachricht_parsen, EingehendeNachricht};

/// Aktueller Zeitstempel in Unix-Millisekunden, wie auf dem Draht verwendet
pub fn jetzt_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
