//! Fehlertypen fuer den Credential-Lebenszyklus

use thiserror::Error;

/// Fehler der Auth-Schicht
#[derive(Debug, Error)]
pub enum AuthError {
    /// Token-Ausgabe fehlgeschlagen – wiederholbar, das vorherige
    /// Credential bleibt bis zum naechsten Zyklus in Gebrauch
    #[error("Token-Ausstellung fehlgeschlagen: {0}")]
    AusstellungFehlgeschlagen(String),

    /// Interner Fehler
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl AuthError {
    /// Erstellt einen Ausstellungsfehler aus einer beliebigen Nachricht
    pub fn ausstellung(msg: impl Into<String>) -> Self {
        Self::AusstellungFehlgeschlagen(msg.into())
    }
}

/// Result-Typ der Auth-Schicht
pub type AuthResult<T> = Result<T, AuthError>;
