//! Fehlertypen des Signalisierungs-Kerns

use gegensprech_auth::AuthError;
use gegensprech_transport::TransportError;
use thiserror::Error;

use crate::call::CallState;

/// Fehlertyp des Signalisierungs-Kerns
#[derive(Debug, Error)]
pub enum SignalingError {
    /// Transportfehler (nicht verbunden, Login, Kanal-Beitritt)
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Credential-Fehler
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Lokaler Intent passt nicht zum aktuellen Anruf-Zustand
    #[error("Aktion '{aktion}' im Zustand {zustand:?} nicht erlaubt")]
    UngueltigerZustand {
        aktion: &'static str,
        zustand: CallState,
    },

    /// Ausgehendes Signal liess sich nicht serialisieren
    #[error("Serialisierung fehlgeschlagen: {0}")]
    Serialisierung(#[from] serde_json::Error),

    /// Interner Fehler
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

/// Result-Typ des Signalisierungs-Kerns
pub type SignalingResult<T> = Result<T, SignalingError>;
