//! Fehlertypen der Transport-Capability

use thiserror::Error;

/// Fehler der Transport-Schicht
#[derive(Debug, Error)]
pub enum TransportError {
    /// Sende- oder Beitrittsversuch ohne bestehende Verbindung
    #[error("Nicht mit dem Transport verbunden")]
    NichtVerbunden,

    /// Anmeldung fehlgeschlagen (auch nach Fallback ohne Credential)
    #[error("Anmeldung fehlgeschlagen: {0}")]
    LoginFehlgeschlagen(String),

    /// Kanal-Beitritt fehlgeschlagen (nicht fatal fuer die Verbindung)
    #[error("Kanal-Beitritt fehlgeschlagen: {0}")]
    KanalBeitrittFehlgeschlagen(String),

    /// Zustellung an den Transport fehlgeschlagen
    #[error("Senden fehlgeschlagen: {0}")]
    SendeFehler(String),
}

impl TransportError {
    /// Gibt `true` zurueck wenn der Fehler die bestehende Verbindung
    /// unberuehrt laesst (nur kanalgebundene Funktionen degradieren)
    pub fn ist_kanal_gebunden(&self) -> bool {
        matches!(self, Self::KanalBeitrittFehlgeschlagen(_))
    }
}

/// Result-Typ der Transport-Schicht
pub type TransportResult<T> = Result<T, TransportError>;
