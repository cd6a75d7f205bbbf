//! Signal-Adapter – Uebersetzt zwischen Kern und Transport
//!
//! Der Adapter kapselt die beiden logischen Pfade des Transports:
//! - adressierte Peer-Zustellung fuer alle `CallSignal`s
//! - der beigetretene Broadcast-Kanal fuer Heartbeats
//!
//! Senden schlaegt mit `TransportError::NichtVerbunden` fehl solange keine
//! Anmeldung besteht – es wird nichts eingereiht und nichts wiederholt.
//! Eingehende Payloads werden am `type`-Feld geroutet; was sich nicht
//! parsen laesst wird kommentarlos verworfen.

use gegensprech_auth::Credential;
use gegensprech_core::{ChannelId, Identity};
use gegensprech_protocol::{nachricht_parsen, CallSignal, EingehendeNachricht, HeartbeatMessage};
use gegensprech_transport::{Transport, TransportError, TransportEvent, TransportResult};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};

use crate::error::SignalingResult;

/// Groesse der Empfangs-Queues fuer Signale und Heartbeats
const EMPFANGS_QUEUE_GROESSE: usize = 64;

/// Adapter zwischen Zustandsmaschine und Messaging-Transport
pub struct SignalAdapter {
    transport: Arc<dyn Transport>,
    lokal: Identity,
    /// Aktuell beigetretener Kanal (None vor dem ersten Beitritt)
    aktueller_kanal: RwLock<Option<ChannelId>>,
}

impl SignalAdapter {
    /// Erstellt einen neuen Adapter fuer die lokale Identitaet
    pub fn neu(transport: Arc<dyn Transport>, lokal: Identity) -> Self {
        Self {
            transport,
            lokal,
            aktueller_kanal: RwLock::new(None),
        }
    }

    /// Prueft ob der Transport verbunden ist
    pub fn ist_verbunden(&self) -> bool {
        self.transport.ist_verbunden()
    }

    /// Meldet sich am Transport an
    ///
    /// Mit Credential; schlaegt der Versuch fehl, folgt genau ein Fallback
    /// ohne Credential bevor der Fehler nach oben gemeldet wird.
    pub async fn anmelden(&self, credential: Option<&Credential>) -> TransportResult<()> {
        let token = credential.map(|c| c.token.as_str());
        match self.transport.login(&self.lokal, token).await {
            Ok(()) => Ok(()),
            Err(TransportError::LoginFehlgeschlagen(grund)) if token.is_some() => {
                tracing::warn!(
                    identitaet = %self.lokal,
                    grund = %grund,
                    "Login mit Credential fehlgeschlagen – Fallback ohne Credential"
                );
                self.transport.login(&self.lokal, None).await
            }
            Err(e) => Err(e),
        }
    }

    /// Meldet sich vom Transport ab
    pub async fn abmelden(&self) {
        self.transport.abmelden().await;
        *self.aktueller_kanal.write().await = None;
    }

    /// Tritt einem Broadcast-Kanal bei
    ///
    /// Ein Beitritt zu einem anderen Kanal verlaesst zuerst den bisherigen.
    /// Ein Fehlschlag ist nicht fatal fuer die bestehende Verbindung.
    pub async fn kanal_beitreten(&self, kanal: &ChannelId) -> TransportResult<()> {
        let bisheriger = self.aktueller_kanal.read().await.clone();
        if let Some(bisheriger) = bisheriger {
            if &bisheriger != kanal {
                tracing::debug!(von = %bisheriger, nach = %kanal, "Kanalwechsel");
                self.transport.kanal_verlassen(&bisheriger).await?;
            }
        }

        self.transport.kanal_beitreten(kanal).await?;
        *self.aktueller_kanal.write().await = Some(kanal.clone());
        tracing::info!(kanal = %kanal, "Kanal beigetreten");
        Ok(())
    }

    /// Gibt den aktuell beigetretenen Kanal zurueck
    pub async fn aktueller_kanal(&self) -> Option<ChannelId> {
        self.aktueller_kanal.read().await.clone()
    }

    /// Sendet ein Anruf-Signal adressiert an seine `to`-Identitaet
    pub async fn signal_senden(&self, signal: &CallSignal) -> SignalingResult<()> {
        if !self.ist_verbunden() {
            return Err(TransportError::NichtVerbunden.into());
        }
        let payload = signal.als_json()?;
        self.transport.an_peer_senden(&signal.to, payload).await?;
        tracing::debug!(typ = %signal.typ, an = %signal.to, anruf_id = %signal.call_id, "Signal gesendet");
        Ok(())
    }

    /// Sendet ein Heartbeat in den beigetretenen Kanal
    pub async fn heartbeat_senden(&self, heartbeat: &HeartbeatMessage) -> SignalingResult<()> {
        if !self.ist_verbunden() {
            return Err(TransportError::NichtVerbunden.into());
        }
        let payload = heartbeat.als_json()?;
        self.transport.rundsenden(payload).await?;
        Ok(())
    }

    /// Startet den Empfangs-Task
    ///
    /// Liefert zwei Queues: Anruf-Signale und Heartbeats. Der Task liest den
    /// Ereignis-Stream des Transports, routet am `type`-Feld und endet beim
    /// Shutdown-Signal; danach werden keine Nachrichten mehr zugestellt.
    pub fn empfang_starten(
        &self,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> (
        mpsc::Receiver<CallSignal>,
        mpsc::Receiver<HeartbeatMessage>,
    ) {
        let (signal_tx, signal_rx) = mpsc::channel(EMPFANGS_QUEUE_GROESSE);
        let (heartbeat_tx, heartbeat_rx) = mpsc::channel(EMPFANGS_QUEUE_GROESSE);
        let mut ereignisse = self.transport.ereignisse();
        let lokal = self.lokal.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    ereignis = ereignisse.recv() => {
                        match ereignis {
                            Ok(TransportEvent::PeerNachricht { von, payload }) => {
                                payload_routen(&lokal, &von, &payload, &signal_tx, &heartbeat_tx).await;
                            }
                            Ok(TransportEvent::KanalNachricht { von, payload, .. }) => {
                                payload_routen(&lokal, &von, &payload, &signal_tx, &heartbeat_tx).await;
                            }
                            Ok(TransportEvent::VerbindungGeaendert(zustand)) => {
                                tracing::info!(identitaet = %lokal, zustand = ?zustand, "Verbindungszustand geaendert");
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                                tracing::warn!(identitaet = %lokal, verloren = n, "Ereignis-Stream hinkt – Nachrichten verloren");
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                                tracing::debug!(identitaet = %lokal, "Transport-Ereignisstrom geschlossen");
                                break;
                            }
                        }
                    }
                    Ok(()) = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::debug!(identitaet = %lokal, "Empfangs-Task beendet");
                            break;
                        }
                    }
                }
            }
        });

        (signal_rx, heartbeat_rx)
    }
}

/// Routet ein rohes Payload in die passende Queue
///
/// Nicht parsebare Payloads sind kein Protokollfehler und werden nur
/// auf Debug-Level protokolliert.
async fn payload_routen(
    lokal: &Identity,
    von: &Identity,
    payload: &str,
    signal_tx: &mpsc::Sender<CallSignal>,
    heartbeat_tx: &mpsc::Sender<HeartbeatMessage>,
) {
    match nachricht_parsen(payload) {
        Some(EingehendeNachricht::Signal(signal)) => {
            if signal_tx.send(signal).await.is_err() {
                tracing::debug!(identitaet = %lokal, "Signal-Queue geschlossen");
            }
        }
        Some(EingehendeNachricht::Heartbeat(heartbeat)) => {
            if heartbeat_tx.send(heartbeat).await.is_err() {
                tracing::debug!(identitaet = %lokal, "Heartbeat-Queue geschlossen");
            }
        }
        None => {
            tracing::debug!(
                identitaet = %lokal,
                von = %von,
                "Nicht zuordenbares Payload verworfen"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use gegensprech_core::CallId;
    use gegensprech_protocol::CallSignalTyp;
    use gegensprech_transport::{MemoryFabric, MemoryTransport};
    use std::time::Duration;

    async fn verbundener_adapter(fabric: &MemoryFabric, name: &str) -> SignalAdapter {
        let transport = Arc::new(fabric.transport());
        let adapter = SignalAdapter::neu(transport, Identity::neu(name));
        adapter.anmelden(None).await.unwrap();
        adapter
    }

    #[tokio::test]
    async fn senden_ohne_verbindung_schlaegt_sofort_fehl() {
        let fabric = MemoryFabric::neu();
        let adapter = SignalAdapter::neu(Arc::new(fabric.transport()), Identity::neu("a"));

        let signal = CallSignal::neu(
            CallSignalTyp::IncomingCall,
            Identity::neu("a"),
            Identity::neu("b"),
            ChannelId::neu("c1"),
            CallId("k1".into()),
        );
        let ergebnis = adapter.signal_senden(&signal).await;
        assert!(matches!(
            ergebnis,
            Err(crate::SignalingError::Transport(
                TransportError::NichtVerbunden
            ))
        ));
    }

    /// Transport-Double: Login mit Credential scheitert, ohne klappt er
    struct AbgelaufeneTokensTransport {
        innen: MemoryTransport,
    }

    #[async_trait::async_trait]
    impl Transport for AbgelaufeneTokensTransport {
        async fn login(
            &self,
            identitaet: &Identity,
            credential: Option<&str>,
        ) -> TransportResult<()> {
            if credential.is_some() {
                return Err(TransportError::LoginFehlgeschlagen(
                    "Token abgelaufen".into(),
                ));
            }
            self.innen.login(identitaet, None).await
        }
        async fn abmelden(&self) {
            self.innen.abmelden().await
        }
        async fn kanal_beitreten(&self, kanal: &ChannelId) -> TransportResult<()> {
            self.innen.kanal_beitreten(kanal).await
        }
        async fn kanal_verlassen(&self, kanal: &ChannelId) -> TransportResult<()> {
            self.innen.kanal_verlassen(kanal).await
        }
        async fn an_peer_senden(&self, ziel: &Identity, payload: String) -> TransportResult<()> {
            self.innen.an_peer_senden(ziel, payload).await
        }
        async fn rundsenden(&self, payload: String) -> TransportResult<()> {
            self.innen.rundsenden(payload).await
        }
        fn ist_verbunden(&self) -> bool {
            self.innen.ist_verbunden()
        }
        fn ereignisse(&self) -> tokio::sync::broadcast::Receiver<TransportEvent> {
            self.innen.ereignisse()
        }
    }

    #[tokio::test]
    async fn login_faellt_einmal_auf_credential_freien_versuch_zurueck() {
        let fabric = MemoryFabric::neu();
        let transport = Arc::new(AbgelaufeneTokensTransport {
            innen: fabric.transport(),
        });
        let adapter = SignalAdapter::neu(transport, Identity::neu("a"));

        // Der credentialed Versuch scheitert, der Fallback ohne Credential
        // stellt die Verbindung trotzdem her
        let credential = Credential::neu("abgelaufen", 0);
        adapter.anmelden(Some(&credential)).await.unwrap();
        assert!(adapter.ist_verbunden());
    }

    #[tokio::test]
    async fn kanalwechsel_verlaesst_bisherigen_kanal() {
        let fabric = MemoryFabric::neu();
        let adapter = verbundener_adapter(&fabric, "a").await;

        adapter.kanal_beitreten(&ChannelId::neu("c1")).await.unwrap();
        assert_eq!(adapter.aktueller_kanal().await, Some(ChannelId::neu("c1")));

        adapter.kanal_beitreten(&ChannelId::neu("c2")).await.unwrap();
        assert_eq!(adapter.aktueller_kanal().await, Some(ChannelId::neu("c2")));
    }

    #[tokio::test]
    async fn eingehende_payloads_werden_geroutet() {
        let fabric = MemoryFabric::neu();
        let a = verbundener_adapter(&fabric, "a").await;
        let b = verbundener_adapter(&fabric, "b").await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (mut signal_rx, mut heartbeat_rx) = b.empfang_starten(shutdown_rx);

        // Kanal fuer Heartbeat-Broadcast
        let kanal = ChannelId::neu("c1");
        a.kanal_beitreten(&kanal).await.unwrap();
        b.kanal_beitreten(&kanal).await.unwrap();

        let signal = CallSignal::neu(
            CallSignalTyp::IncomingCall,
            Identity::neu("a"),
            Identity::neu("b"),
            kanal.clone(),
            CallId("k1".into()),
        );
        a.signal_senden(&signal).await.unwrap();
        a.heartbeat_senden(&HeartbeatMessage::neu(Identity::neu("a"), "Eingang"))
            .await
            .unwrap();

        let empfangen = tokio::time::timeout(Duration::from_secs(1), signal_rx.recv())
            .await
            .expect("Zeitlimit")
            .expect("Signal muss ankommen");
        assert_eq!(empfangen.call_id, CallId("k1".into()));

        let heartbeat = tokio::time::timeout(Duration::from_secs(1), heartbeat_rx.recv())
            .await
            .expect("Zeitlimit")
            .expect("Heartbeat muss ankommen");
        assert_eq!(heartbeat.user_id, Identity::neu("a"));

        let _ = shutdown_tx.send(true);
    }

    #[tokio::test]
    async fn fremde_payloads_werden_verworfen() {
        let fabric = MemoryFabric::neu();
        let a = verbundener_adapter(&fabric, "a").await;
        let b = verbundener_adapter(&fabric, "b").await;

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (mut signal_rx, _heartbeat_rx) = b.empfang_starten(shutdown_rx);

        // Rohes, nicht zuordenbares Payload direkt ueber den Transport
        a.transport
            .an_peer_senden(&Identity::neu("b"), "{\"type\":\"CHAT\"}".into())
            .await
            .unwrap();

        let ergebnis =
            tokio::time::timeout(Duration::from_millis(100), signal_rx.recv()).await;
        assert!(ergebnis.is_err(), "Es darf kein Signal zugestellt werden");
    }
}
