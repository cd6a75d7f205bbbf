//! Credential-Typ und Aussteller-Capability
//!
//! Ein Credential gilt pro (Identitaet, Kanal)-Paar genau einmal und wird
//! bei Erneuerung in-place ersetzt – alte Credentials werden nie gesammelt.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gegensprech_core::Identity;
use rand::RngCore;
use std::time::Duration;

use crate::error::AuthResult;

/// Das kurzlebige Membership-Token fuer den Transport-Login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Der Token-String (opak gegenueber dem Kern)
    pub token: String,
    /// Ablaufzeitpunkt als Unix-Sekunden
    pub laeuft_ab_am: i64,
}

impl Credential {
    /// Erstellt ein neues Credential
    pub fn neu(token: impl Into<String>, laeuft_ab_am: i64) -> Self {
        Self {
            token: token.into(),
            laeuft_ab_am,
        }
    }

    /// Gibt `true` zurueck wenn das Credential zum Zeitpunkt `jetzt` noch gueltig ist
    pub fn ist_gueltig(&self, jetzt: DateTime<Utc>) -> bool {
        jetzt.timestamp() < self.laeuft_ab_am
    }

    /// Gibt `true` zurueck wenn das Credential innerhalb des
    /// Erneuerungsfensters liegt (oder bereits abgelaufen ist)
    pub fn laeuft_bald_ab(&self, jetzt: DateTime<Utc>, fenster_sekunden: i64) -> bool {
        self.laeuft_ab_am - jetzt.timestamp() < fenster_sekunden
    }
}

/// Capability-Trait der externen Token-Ausgabe
///
/// Die konkrete Implementierung (Token-Server, SDK-Aufruf) wird per
/// Konstruktor injiziert.
#[async_trait]
pub trait TokenAussteller: Send + Sync {
    /// Stellt ein frisches Token mit der gegebenen Lebensdauer aus
    async fn token_ausstellen(&self, identitaet: &Identity, ttl: Duration)
        -> AuthResult<Credential>;
}

/// Lokale Token-Generierung fuer Tests und Demo-Modus
///
/// Erzeugt kryptografisch zufaellige Tokens ohne externen Dienst.
pub struct StatischerAussteller;

#[async_trait]
impl TokenAussteller for StatischerAussteller {
    async fn token_ausstellen(
        &self,
        identitaet: &Identity,
        ttl: Duration,
    ) -> AuthResult<Credential> {
        let laeuft_ab_am = Utc::now().timestamp() + ttl.as_secs() as i64;
        let credential = Credential::neu(token_generieren(), laeuft_ab_am);
        tracing::debug!(
            identitaet = %identitaet,
            laeuft_ab_am = credential.laeuft_ab_am,
            "Lokales Token ausgestellt"
        );
        Ok(credential)
    }
}

/// Generiert einen kryptografisch sicheren Token (URL-sicheres Base64)
fn token_generieren() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}
