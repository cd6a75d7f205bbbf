//! gegensprech-tablet – Bibliotheks-Root
//!
//! Verdrahtet Transport, Credential-Manager und Signalisierungs-Session
//! zu einem lauffaehigen Tablet-Endpunkt.

pub mod config;

use anyhow::Result;
use config::TabletConfig;
use gegensprech_auth::{CredentialManager, StatischerAussteller};
use gegensprech_core::{ChannelId, Identity};
use gegensprech_signaling::{CallEvent, SignalingSession};
use gegensprech_transport::{MemoryFabric, Transport};
use std::sync::Arc;
use std::time::Duration;

/// Haelt den laufenden Tablet-Zustand zusammen
pub struct Tablet {
    pub config: TabletConfig,
    session: SignalingSession,
}

impl Tablet {
    /// Erstellt ein neues Tablet auf dem gegebenen Transport
    pub fn neu(config: TabletConfig, transport: Arc<dyn Transport>) -> Self {
        let identitaet = Identity::neu(&config.tablet.identitaet);
        let credentials = CredentialManager::neu(
            identitaet.clone(),
            Duration::from_secs(config.fabric.credential_ttl_sekunden),
            Arc::new(StatischerAussteller),
        );
        let session = SignalingSession::neu(
            identitaet,
            config.tablet.standort_name.clone(),
            ChannelId::neu(&config.tablet.kanal),
            transport,
            credentials,
        );
        Self { config, session }
    }

    /// Erstellt ein Tablet auf einer eigenen In-Memory-Fabric (Demo-Modus)
    pub fn demo(config: TabletConfig) -> Self {
        let fabric = MemoryFabric::neu();
        Self::neu(config, Arc::new(fabric.transport()))
    }

    /// Zugriff auf die Signalisierungs-Session
    pub fn session(&self) -> &SignalingSession {
        &self.session
    }

    /// Startet die Session und laeuft bis zum Shutdown-Signal
    pub async fn starten(self) -> Result<()> {
        tracing::info!(
            identitaet = %self.config.tablet.identitaet,
            standort = %self.config.tablet.standort_name,
            kanal = %self.config.tablet.kanal,
            "Tablet startet"
        );

        self.session.starten().await?;

        // Anruf-Events auf das Log spiegeln; UI und Audio haengen sich
        // ueber events_abonnieren() an denselben Strom
        let mut events = self.session.events_abonnieren();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                match event {
                    CallEvent::ZustandGeaendert { zustand, anruf_id } => {
                        tracing::info!(zustand = %zustand, anruf_id = ?anruf_id, "Anruf-Zustand");
                    }
                    CallEvent::KlingelnStarten { von } => {
                        tracing::info!(von = %von, "Klingeln");
                    }
                    CallEvent::KlingelnStoppen => {
                        tracing::info!("Klingeln beendet");
                    }
                    CallEvent::MedienBeitreten { kanal, anruf_id } => {
                        tracing::info!(kanal = %kanal, anruf_id = %anruf_id, "Medien-Sitzung betreten");
                    }
                    CallEvent::MedienVerlassen => {
                        tracing::info!("Medien-Sitzung verlassen");
                    }
                    CallEvent::Abgelehnt { von } => {
                        tracing::info!(von = %von, "Anruf abgelehnt");
                    }
                }
            }
        });

        tracing::info!("Tablet laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown-Signal empfangen, Tablet wird beendet");

        self.session.stoppen().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tablet_verdrahtet_session_aus_config() {
        let mut config = TabletConfig::default();
        config.tablet.identitaet = "tablet-test".into();

        let fabric = MemoryFabric::neu();
        let tablet = Tablet::neu(config, Arc::new(fabric.transport()));

        tablet.session().starten().await.unwrap();
        assert!(tablet.session().letzter_fehler().await.is_none());
        tablet.session().stoppen().await;
    }
}
