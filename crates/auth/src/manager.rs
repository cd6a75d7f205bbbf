//! Credential-Manager – Haelt das aktive Credential und erneuert proaktiv
//!
//! Ein periodischer Check (alle 60 Sekunden) prueft ob das Credential
//! innerhalb des Erneuerungsfensters (300 Sekunden vor Ablauf) liegt und
//! stoesst dann genau eine Neuausstellung an. Schlaegt die Ausgabe fehl,
//! bleibt das vorherige Credential in Gebrauch und der naechste Zyklus
//! versucht es erneut – es wird nie sofort nachgeschossen.
//!
//! Eine Erneuerung unterbricht nie einen laufenden Anruf; sie wirkt erst
//! beim naechsten Login/Kanal-Beitritt.

use chrono::{DateTime, Utc};
use gegensprech_core::Identity;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};

use crate::credential::{Credential, TokenAussteller};
use crate::error::AuthResult;

/// Intervall des periodischen Erneuerungs-Checks
pub const PRUEF_INTERVALL: Duration = Duration::from_secs(60);

/// Erneuerungsfenster: Restlaufzeit unter der neu ausgestellt wird
pub const ERNEUERUNGS_FENSTER_SEKUNDEN: i64 = 300;

/// Haelt das aktive Credential einer Identitaet
///
/// Thread-safe via Arc. Clone des Managers teilt den inneren Zustand.
#[derive(Clone)]
pub struct CredentialManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    identitaet: Identity,
    /// Lebensdauer neu ausgestellter Tokens
    ttl: Duration,
    aussteller: Arc<dyn TokenAussteller>,
    /// Das aktive Credential, in-place ersetzt bei Erneuerung
    aktuell: RwLock<Option<Credential>>,
}

impl CredentialManager {
    /// Erstellt einen neuen CredentialManager ohne Credential
    pub fn neu(identitaet: Identity, ttl: Duration, aussteller: Arc<dyn TokenAussteller>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                identitaet,
                ttl,
                aussteller,
                aktuell: RwLock::new(None),
            }),
        }
    }

    /// Gibt das aktuell gehaltene Credential zurueck (None vor der ersten Ausgabe)
    pub async fn aktuelles_credential(&self) -> Option<Credential> {
        self.inner.aktuell.read().await.clone()
    }

    /// Beschafft ein Credential beim ersten Bedarf
    ///
    /// Gibt das gehaltene Credential zurueck falls es noch gueltig ist,
    /// sonst wird eines ausgestellt und gespeichert.
    pub async fn beschaffen(&self) -> AuthResult<Credential> {
        if let Some(credential) = self.inner.aktuell.read().await.clone() {
            if credential.ist_gueltig(Utc::now()) {
                return Ok(credential);
            }
        }
        self.neu_ausstellen().await
    }

    /// Prueft ob zum Zeitpunkt `jetzt` eine Erneuerung noetig ist
    pub async fn erneuerung_noetig(&self, jetzt: DateTime<Utc>) -> bool {
        match self.inner.aktuell.read().await.as_ref() {
            Some(credential) => credential.laeuft_bald_ab(jetzt, ERNEUERUNGS_FENSTER_SEKUNDEN),
            None => true,
        }
    }

    /// Fuehrt einen Erneuerungs-Check aus
    ///
    /// Gibt `Ok(true)` zurueck wenn neu ausgestellt wurde, `Ok(false)` wenn
    /// keine Erneuerung noetig war. Bei Ausstellungsfehlern bleibt das
    /// vorherige Credential erhalten und der Fehler wird gemeldet.
    pub async fn pruefen_und_erneuern(&self, jetzt: DateTime<Utc>) -> AuthResult<bool> {
        if !self.erneuerung_noetig(jetzt).await {
            return Ok(false);
        }
        self.neu_ausstellen().await?;
        Ok(true)
    }

    /// Startet den periodischen Erneuerungs-Task
    ///
    /// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt.
    pub fn ueberwachung_starten(
        &self,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut intervall = tokio::time::interval(PRUEF_INTERVALL);
            intervall.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // Erster Tick feuert sofort – der Check selbst entscheidet
            loop {
                tokio::select! {
                    _ = intervall.tick() => {
                        match manager.pruefen_und_erneuern(Utc::now()).await {
                            Ok(true) => {
                                tracing::info!(
                                    identitaet = %manager.inner.identitaet,
                                    "Credential proaktiv erneuert"
                                );
                            }
                            Ok(false) => {}
                            Err(e) => {
                                // Wiederholbar: naechster Zyklus versucht es erneut
                                tracing::warn!(
                                    identitaet = %manager.inner.identitaet,
                                    fehler = %e,
                                    "Credential-Erneuerung fehlgeschlagen"
                                );
                            }
                        }
                    }
                    Ok(()) = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::debug!("Credential-Ueberwachung beendet");
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Stellt ein frisches Credential aus und ersetzt das gehaltene atomar
    async fn neu_ausstellen(&self) -> AuthResult<Credential> {
        let credential = self
            .inner
            .aussteller
            .token_ausstellen(&self.inner.identitaet, self.inner.ttl)
            .await?;
        *self.inner.aktuell.write().await = Some(credential.clone());
        Ok(credential)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Zaehlt Ausstellungen und kann auf Fehler geschaltet werden
    struct ZaehlAussteller {
        ausstellungen: AtomicUsize,
        fehlschlagen: AtomicBool,
        ttl_sekunden: i64,
    }

    impl ZaehlAussteller {
        fn neu(ttl_sekunden: i64) -> Arc<Self> {
            Arc::new(Self {
                ausstellungen: AtomicUsize::new(0),
                fehlschlagen: AtomicBool::new(false),
                ttl_sekunden,
            })
        }
    }

    #[async_trait]
    impl TokenAussteller for ZaehlAussteller {
        async fn token_ausstellen(
            &self,
            _identitaet: &Identity,
            _ttl: Duration,
        ) -> AuthResult<Credential> {
            if self.fehlschlagen.load(Ordering::Relaxed) {
                return Err(AuthError::ausstellung("Aussteller nicht erreichbar"));
            }
            let n = self.ausstellungen.fetch_add(1, Ordering::Relaxed);
            Ok(Credential::neu(
                format!("token-{}", n),
                Utc::now().timestamp() + self.ttl_sekunden,
            ))
        }
    }

    fn manager_mit(aussteller: Arc<ZaehlAussteller>) -> CredentialManager {
        CredentialManager::neu(
            Identity::neu("tablet-a"),
            Duration::from_secs(3600),
            aussteller,
        )
    }

    #[tokio::test]
    async fn beschaffen_stellt_beim_ersten_bedarf_aus() {
        let aussteller = ZaehlAussteller::neu(3600);
        let manager = manager_mit(Arc::clone(&aussteller));

        assert!(manager.aktuelles_credential().await.is_none());
        let credential = manager.beschaffen().await.unwrap();
        assert_eq!(credential.token, "token-0");
        assert_eq!(aussteller.ausstellungen.load(Ordering::Relaxed), 1);

        // Zweiter Bedarf nutzt das gehaltene Credential
        let _ = manager.beschaffen().await.unwrap();
        assert_eq!(aussteller.ausstellungen.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn erneuerung_innerhalb_des_fensters() {
        let aussteller = ZaehlAussteller::neu(200); // Restlaufzeit 200s < 300s Fenster
        let manager = manager_mit(Arc::clone(&aussteller));
        manager.beschaffen().await.unwrap();

        let erneuert = manager.pruefen_und_erneuern(Utc::now()).await.unwrap();
        assert!(erneuert, "200s Restlaufzeit muss erneuert werden");
        assert_eq!(aussteller.ausstellungen.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn keine_erneuerung_ausserhalb_des_fensters() {
        let aussteller = ZaehlAussteller::neu(3600);
        let manager = manager_mit(Arc::clone(&aussteller));
        manager.beschaffen().await.unwrap();

        let erneuert = manager.pruefen_und_erneuern(Utc::now()).await.unwrap();
        assert!(!erneuert, "3600s Restlaufzeit darf nicht erneuert werden");
        assert_eq!(aussteller.ausstellungen.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn fehlschlag_behaelt_altes_credential() {
        let aussteller = ZaehlAussteller::neu(200);
        let manager = manager_mit(Arc::clone(&aussteller));
        let altes = manager.beschaffen().await.unwrap();

        aussteller.fehlschlagen.store(true, Ordering::Relaxed);
        let ergebnis = manager.pruefen_und_erneuern(Utc::now()).await;
        assert!(matches!(
            ergebnis,
            Err(AuthError::AusstellungFehlgeschlagen(_))
        ));

        // Das alte (fast abgelaufene) Credential bleibt in Gebrauch
        assert_eq!(manager.aktuelles_credential().await, Some(altes));

        // Naechster Zyklus nach Behebung stellt neu aus
        aussteller.fehlschlagen.store(false, Ordering::Relaxed);
        assert!(manager.pruefen_und_erneuern(Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn erneuerung_noetig_ohne_credential() {
        let aussteller = ZaehlAussteller::neu(3600);
        let manager = manager_mit(aussteller);
        assert!(manager.erneuerung_noetig(Utc::now()).await);
    }
}
