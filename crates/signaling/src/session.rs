//! SignalingSession – Orchestriert Adapter, Zustandsmaschine und Praesenz
//!
//! Eine Session pro lokaler Identitaet. `starten()` beschafft das Credential,
//! meldet sich an, tritt dem Standort-Kanal bei und startet die
//! Hintergrund-Tasks (Empfang, Heartbeat, Sweep, Credential-Ueberwachung).
//! Seiteneffekte der Zustandsmaschine werden als `CallEvent`s an Beobachter
//! gemeldet; die Alarm-/Medien-Ausfuehrung selbst liegt beim Beobachter.

use chrono::Utc;
use gegensprech_auth::CredentialManager;
use gegensprech_core::{CallId, ChannelId, Identity};
use gegensprech_protocol::{CallSignal, HeartbeatMessage};
use gegensprech_transport::{Transport, TransportError};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex, RwLock};

use crate::adapter::SignalAdapter;
use crate::call::{Aktion, CallState, CallStateMachine, Eingabe};
use crate::error::SignalingResult;
use crate::presence::{PresenceTracker, HEARTBEAT_INTERVALL, SWEEP_INTERVALL};

/// Groesse des Broadcast-Kanals fuer Anruf-Events
const EVENT_KANAL_GROESSE: usize = 256;

// ---------------------------------------------------------------------------
// CallEvent
// ---------------------------------------------------------------------------

/// Events die die Session an Beobachter (UI, Audio) meldet
#[derive(Debug, Clone)]
pub enum CallEvent {
    /// Der Anruf-Zustand hat sich geaendert
    ///
    /// Beim Abbau eines Anrufs wird `CallState::Ended` gemeldet; der
    /// gespeicherte Zustand ist zu diesem Zeitpunkt bereits `Idle`.
    ZustandGeaendert {
        zustand: CallState,
        anruf_id: Option<CallId>,
    },
    /// Klingel-/Alarmton fuer einen eingehenden Anruf starten
    KlingelnStarten { von: Identity },
    /// Klingel-/Alarmton stoppen
    KlingelnStoppen,
    /// Medien-Sitzung im Kanal betreten
    MedienBeitreten { kanal: ChannelId, anruf_id: CallId },
    /// Medien-Sitzung verlassen
    MedienVerlassen,
    /// Die Gegenstelle hat den Anruf abgelehnt
    Abgelehnt { von: Identity },
}

// ---------------------------------------------------------------------------
// SignalingSession
// ---------------------------------------------------------------------------

/// Signalisierungs-Session einer lokalen Identitaet
///
/// Thread-safe via Arc. Clone der Session teilt den inneren Zustand.
#[derive(Clone)]
pub struct SignalingSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    lokal: Identity,
    site_name: String,
    /// Eigener Standort-Kanal fuer Heartbeats und Medien
    kanal: ChannelId,
    adapter: Arc<SignalAdapter>,
    praesenz: PresenceTracker,
    credentials: CredentialManager,
    /// Zustandsmaschine, serialisiert ueber alle Eingabepfade
    maschine: Mutex<CallStateMachine>,
    event_tx: broadcast::Sender<CallEvent>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    /// Letzter dem Benutzer zu meldender Fehler
    letzter_fehler: RwLock<Option<String>>,
}

impl SignalingSession {
    /// Erstellt eine neue, noch nicht gestartete Session
    pub fn neu(
        lokal: Identity,
        site_name: impl Into<String>,
        kanal: ChannelId,
        transport: Arc<dyn Transport>,
        credentials: CredentialManager,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_KANAL_GROESSE);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let adapter = Arc::new(SignalAdapter::neu(transport, lokal.clone()));
        let maschine = Mutex::new(CallStateMachine::neu(lokal.clone(), kanal.clone()));

        Self {
            inner: Arc::new(SessionInner {
                lokal,
                site_name: site_name.into(),
                kanal,
                adapter,
                praesenz: PresenceTracker::neu(),
                credentials,
                maschine,
                event_tx,
                shutdown_tx,
                shutdown_rx,
                letzter_fehler: RwLock::new(None),
            }),
        }
    }

    /// Startet die Session: Login, Kanal-Beitritt, Hintergrund-Tasks
    ///
    /// Scheitert die Credential-Beschaffung, faellt der Login auf einen
    /// credential-freien Versuch zurueck. Ein fehlgeschlagener
    /// Kanal-Beitritt ist nicht fatal; nur ein fehlgeschlagener Login
    /// bricht den Start ab.
    pub async fn starten(&self) -> SignalingResult<()> {
        let credential = match self.inner.credentials.beschaffen().await {
            Ok(credential) => Some(credential),
            Err(e) => {
                tracing::warn!(
                    identitaet = %self.inner.lokal,
                    fehler = %e,
                    "Credential-Beschaffung fehlgeschlagen – Login ohne Credential"
                );
                None
            }
        };

        self.inner.adapter.anmelden(credential.as_ref()).await?;
        tracing::info!(identitaet = %self.inner.lokal, "Angemeldet");

        if let Err(e) = self.inner.adapter.kanal_beitreten(&self.inner.kanal).await {
            // Kanalgebundene Fehler degradieren nur Heartbeats und Medien
            if !e.ist_kanal_gebunden() {
                return Err(e.into());
            }
            tracing::warn!(
                kanal = %self.inner.kanal,
                fehler = %e,
                "Kanal-Beitritt fehlgeschlagen – Anrufe bleiben moeglich"
            );
        }

        self.eingangs_task_starten();
        self.heartbeat_task_starten();
        self.sweep_task_starten();
        self.inner
            .credentials
            .ueberwachung_starten(self.inner.shutdown_rx.clone());

        Ok(())
    }

    /// Stoppt die Session und meldet sich vom Transport ab
    pub async fn stoppen(&self) {
        let _ = self.inner.shutdown_tx.send(true);
        self.inner.adapter.abmelden().await;
        tracing::info!(identitaet = %self.inner.lokal, "Session gestoppt");
    }

    // -----------------------------------------------------------------------
    // Lokale Intents
    // -----------------------------------------------------------------------

    /// Startet einen Anruf zu `ziel`
    ///
    /// Schlaegt ohne Verbindung sofort fehl; ein Sendefehler rollt den
    /// Zustand auf `Idle` zurueck statt in `Calling` haengen zu bleiben.
    pub async fn anruf_starten(&self, ziel: Identity) -> SignalingResult<()> {
        if !self.inner.adapter.ist_verbunden() {
            let fehler = TransportError::NichtVerbunden;
            self.fehler_setzen(fehler.to_string()).await;
            return Err(fehler.into());
        }

        let mut maschine = self.inner.maschine.lock().await;
        let vorher = maschine.zustand();
        let aktionen = maschine.verarbeiten(Eingabe::Starten { ziel })?;

        if let Err(e) = self.aktionen_anwenden(&mut maschine, vorher, aktionen).await {
            // Das CALLING-Event ist bereits raus: den Rueckzug nachmelden
            maschine.zuruecksetzen();
            self.ereignis_melden(CallEvent::ZustandGeaendert {
                zustand: CallState::Ended,
                anruf_id: None,
            });
            self.fehler_setzen(e.to_string()).await;
            return Err(e);
        }
        self.fehler_loeschen().await;
        Ok(())
    }

    /// Nimmt den klingelnden Anruf an
    pub async fn annehmen(&self) -> SignalingResult<()> {
        let mut maschine = self.inner.maschine.lock().await;
        let vorher = maschine.zustand();
        let aktionen = maschine.verarbeiten(Eingabe::Annehmen)?;

        if let Err(e) = self.aktionen_anwenden(&mut maschine, vorher, aktionen).await {
            // Annahme gescheitert: Anruf abraeumen statt halb-verbunden bleiben
            maschine.zuruecksetzen();
            self.ereignis_melden(CallEvent::ZustandGeaendert {
                zustand: CallState::Ended,
                anruf_id: None,
            });
            self.fehler_setzen(e.to_string()).await;
            return Err(e);
        }
        self.fehler_loeschen().await;
        Ok(())
    }

    /// Lehnt den klingelnden Anruf ab
    pub async fn ablehnen(&self) -> SignalingResult<()> {
        let mut maschine = self.inner.maschine.lock().await;
        let vorher = maschine.zustand();
        let aktionen = maschine.verarbeiten(Eingabe::Ablehnen)?;
        // Sendefehler sind hier nicht fatal: lokal ist der Anruf ohnehin weg
        if let Err(e) = self.aktionen_anwenden(&mut maschine, vorher, aktionen).await {
            tracing::warn!(fehler = %e, "Ablehnung konnte nicht zugestellt werden");
        }
        Ok(())
    }

    /// Beendet den aktiven Anruf (in jedem Zustand erlaubt)
    pub async fn beenden(&self) -> SignalingResult<()> {
        let mut maschine = self.inner.maschine.lock().await;
        let vorher = maschine.zustand();
        let aktionen = maschine.verarbeiten(Eingabe::Beenden)?;
        // Lokal wird immer aufgeraeumt, auch wenn die Zustellung scheitert
        if let Err(e) = self.aktionen_anwenden(&mut maschine, vorher, aktionen).await {
            tracing::warn!(fehler = %e, "CALL_ENDED konnte nicht zugestellt werden");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Beobachtung
    // -----------------------------------------------------------------------

    /// Aktueller Anruf-Zustand
    pub async fn zustand(&self) -> CallState {
        self.inner.maschine.lock().await.zustand()
    }

    /// CallId des aktiven Anrufs
    pub async fn anruf_id(&self) -> Option<CallId> {
        self.inner.maschine.lock().await.anruf_id().cloned()
    }

    /// Das empfangene INCOMING_CALL, falls gerade eines klingelt
    pub async fn aktueller_anruf(&self) -> Option<CallSignal> {
        self.inner.maschine.lock().await.aktueller_anruf().cloned()
    }

    /// Zugriff auf den Praesenz-Tracker
    pub fn praesenz(&self) -> &PresenceTracker {
        &self.inner.praesenz
    }

    /// Abonniert die Anruf-Events der Session
    pub fn events_abonnieren(&self) -> broadcast::Receiver<CallEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Letzter dem Benutzer zu meldender Fehler
    pub async fn letzter_fehler(&self) -> Option<String> {
        self.inner.letzter_fehler.read().await.clone()
    }

    // -----------------------------------------------------------------------
    // Hintergrund-Tasks
    // -----------------------------------------------------------------------

    /// Liest Signale und Heartbeats aus den Adapter-Queues
    fn eingangs_task_starten(&self) {
        let (mut signal_rx, mut heartbeat_rx) = self
            .inner
            .adapter
            .empfang_starten(self.inner.shutdown_rx.clone());
        let session = self.clone();
        let mut shutdown_rx = self.inner.shutdown_rx.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(signal) = signal_rx.recv() => {
                        session.signal_anwenden(signal).await;
                    }
                    Some(heartbeat) = heartbeat_rx.recv() => {
                        session.inner.praesenz.heartbeat_empfangen(&heartbeat, Utc::now());
                    }
                    Ok(()) = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    else => break,
                }
            }
        });
    }

    /// Sendet alle 10 Sekunden ein Heartbeat in den Standort-Kanal
    fn heartbeat_task_starten(&self) {
        let session = self.clone();
        let mut shutdown_rx = self.inner.shutdown_rx.clone();

        tokio::spawn(async move {
            let mut intervall = tokio::time::interval(HEARTBEAT_INTERVALL);
            intervall.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = intervall.tick() => {
                        // Heartbeats laufen auch waehrend eines Anrufs weiter
                        if !session.inner.adapter.ist_verbunden() {
                            continue;
                        }
                        if session.inner.adapter.aktueller_kanal().await.is_none() {
                            continue;
                        }
                        let heartbeat = HeartbeatMessage::neu(
                            session.inner.lokal.clone(),
                            session.inner.site_name.clone(),
                        );
                        if let Err(e) = session.inner.adapter.heartbeat_senden(&heartbeat).await {
                            tracing::debug!(fehler = %e, "Heartbeat nicht gesendet");
                        }
                    }
                    Ok(()) = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Fuehrt alle 5 Sekunden den Offline-Sweep aus
    fn sweep_task_starten(&self) {
        let praesenz = self.inner.praesenz.clone();
        let mut shutdown_rx = self.inner.shutdown_rx.clone();

        tokio::spawn(async move {
            let mut intervall = tokio::time::interval(SWEEP_INTERVALL);
            intervall.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = intervall.tick() => {
                        praesenz.sweep(Utc::now());
                    }
                    Ok(()) = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }

    // -----------------------------------------------------------------------
    // Intern
    // -----------------------------------------------------------------------

    /// Wendet ein eingehendes Signal auf die Zustandsmaschine an
    async fn signal_anwenden(&self, signal: CallSignal) {
        let mut maschine = self.inner.maschine.lock().await;
        let vorher = maschine.zustand();
        let aktionen = match maschine.verarbeiten(Eingabe::Signal(signal)) {
            Ok(aktionen) => aktionen,
            // Remote-Signale erzeugen keine Zustandsfehler; zur Sicherheit
            Err(e) => {
                tracing::warn!(fehler = %e, "Signal nicht anwendbar");
                return;
            }
        };
        if let Err(e) = self.aktionen_anwenden(&mut maschine, vorher, aktionen).await {
            tracing::warn!(fehler = %e, "Antwortsignal nicht zustellbar");
        }
    }

    /// Fuehrt die Aktionen der Maschine aus und meldet Events
    ///
    /// Sendet Antwortsignale ueber den Adapter und uebersetzt die uebrigen
    /// Aktionen in `CallEvent`s. Abschliessend wird ein Zustandswechsel
    /// gemeldet; der Abbau eines Anrufs erscheint als `Ended`.
    async fn aktionen_anwenden(
        &self,
        maschine: &mut CallStateMachine,
        vorher: CallState,
        aktionen: Vec<Aktion>,
    ) -> SignalingResult<()> {
        let mut sendefehler = None;

        for aktion in aktionen {
            match aktion {
                Aktion::Senden(signal) => {
                    if let Err(e) = self.inner.adapter.signal_senden(&signal).await {
                        // Erst alle lokalen Events melden, dann den Fehler heben
                        sendefehler.get_or_insert(e);
                    }
                }
                Aktion::AlarmStarten { von } => {
                    self.ereignis_melden(CallEvent::KlingelnStarten { von });
                }
                Aktion::AlarmStoppen => {
                    self.ereignis_melden(CallEvent::KlingelnStoppen);
                }
                Aktion::MedienBeitreten { kanal, anruf_id } => {
                    self.ereignis_melden(CallEvent::MedienBeitreten { kanal, anruf_id });
                }
                Aktion::MedienVerlassen => {
                    self.ereignis_melden(CallEvent::MedienVerlassen);
                }
                Aktion::AbgelehntVon { von } => {
                    self.fehler_setzen(format!("{} hat den Anruf abgelehnt", von))
                        .await;
                    self.ereignis_melden(CallEvent::Abgelehnt { von });
                }
            }
        }

        let nachher = maschine.zustand();
        if vorher != nachher {
            let zustand = if vorher != CallState::Idle && nachher == CallState::Idle {
                CallState::Ended
            } else {
                nachher
            };
            self.ereignis_melden(CallEvent::ZustandGeaendert {
                zustand,
                anruf_id: maschine.anruf_id().cloned(),
            });
        }

        match sendefehler {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn ereignis_melden(&self, event: CallEvent) {
        // Ohne Abonnenten verpufft das Event; das ist kein Fehler
        let _ = self.inner.event_tx.send(event);
    }

    async fn fehler_setzen(&self, meldung: String) {
        *self.inner.letzter_fehler.write().await = Some(meldung);
    }

    async fn fehler_loeschen(&self) {
        *self.inner.letzter_fehler.write().await = None;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use gegensprech_auth::StatischerAussteller;
    use gegensprech_transport::{
        MemoryFabric, MemoryTransport, TransportEvent, TransportResult,
    };
    use std::time::Duration;

    fn session_mit(transport: Arc<dyn Transport>, name: &str) -> SignalingSession {
        let credentials = CredentialManager::neu(
            Identity::neu(name),
            Duration::from_secs(3600),
            Arc::new(StatischerAussteller),
        );
        SignalingSession::neu(
            Identity::neu(name),
            name.to_string(),
            ChannelId::neu("standort"),
            transport,
            credentials,
        )
    }

    fn session_auf(fabric: &MemoryFabric, name: &str) -> SignalingSession {
        session_mit(Arc::new(fabric.transport()), name)
    }

    /// Transport-Double mit gezielt defekten Teilfunktionen
    struct DefekterTransport {
        innen: MemoryTransport,
        peer_senden_defekt: bool,
        kanal_defekt: bool,
    }

    #[async_trait::async_trait]
    impl Transport for DefekterTransport {
        async fn login(
            &self,
            identitaet: &Identity,
            credential: Option<&str>,
        ) -> TransportResult<()> {
            self.innen.login(identitaet, credential).await
        }
        async fn abmelden(&self) {
            self.innen.abmelden().await
        }
        async fn kanal_beitreten(&self, kanal: &ChannelId) -> TransportResult<()> {
            if self.kanal_defekt {
                return Err(TransportError::KanalBeitrittFehlgeschlagen(
                    "Kanal nicht verfuegbar".into(),
                ));
            }
            self.innen.kanal_beitreten(kanal).await
        }
        async fn kanal_verlassen(&self, kanal: &ChannelId) -> TransportResult<()> {
            self.innen.kanal_verlassen(kanal).await
        }
        async fn an_peer_senden(&self, ziel: &Identity, payload: String) -> TransportResult<()> {
            if self.peer_senden_defekt {
                return Err(TransportError::SendeFehler("Fabric ueberlastet".into()));
            }
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
    async fn anruf_ohne_verbindung_schlaegt_fehl() {
        let fabric = MemoryFabric::neu();
        let session = session_auf(&fabric, "a");

        let ergebnis = session.anruf_starten(Identity::neu("b")).await;
        assert!(ergebnis.is_err());
        assert_eq!(session.zustand().await, CallState::Idle);
        assert!(session.letzter_fehler().await.is_some());
    }

    #[tokio::test]
    async fn sendefehler_beim_starten_meldet_rueckzug() {
        let fabric = MemoryFabric::neu();
        let transport = Arc::new(DefekterTransport {
            innen: fabric.transport(),
            peer_senden_defekt: true,
            kanal_defekt: false,
        });
        let session = session_mit(transport, "a");
        session.starten().await.unwrap();

        let mut events = session.events_abonnieren();
        let ergebnis = session.anruf_starten(Identity::neu("b")).await;
        assert!(ergebnis.is_err());
        assert_eq!(session.zustand().await, CallState::Idle);
        assert!(session.letzter_fehler().await.is_some());

        // Beobachter sehen erst CALLING, dann den Rueckzug als ENDED
        let erstes = events.try_recv().expect("CALLING-Event muss kommen");
        assert!(matches!(
            erstes,
            CallEvent::ZustandGeaendert {
                zustand: CallState::Calling,
                ..
            }
        ));
        let zweites = events.try_recv().expect("Rueckzugs-Event muss kommen");
        assert!(matches!(
            zweites,
            CallEvent::ZustandGeaendert {
                zustand: CallState::Ended,
                anruf_id: None,
            }
        ));

        session.stoppen().await;
    }

    #[tokio::test]
    async fn kanal_beitritt_fehlschlag_ist_nicht_fatal() {
        let fabric = MemoryFabric::neu();
        let transport = Arc::new(DefekterTransport {
            innen: fabric.transport(),
            peer_senden_defekt: false,
            kanal_defekt: true,
        });
        let session = session_mit(transport, "a");

        // Der Start gelingt trotz fehlgeschlagenem Kanal-Beitritt
        session.starten().await.unwrap();
        assert!(session.letzter_fehler().await.is_none());

        // Anrufe bleiben moeglich, nur Heartbeats/Medien degradieren
        session.anruf_starten(Identity::neu("b")).await.unwrap();
        assert_eq!(session.zustand().await, CallState::Calling);

        session.stoppen().await;
    }

    #[tokio::test]
    async fn start_und_anruf_setzt_calling() {
        let fabric = MemoryFabric::neu();
        let a = session_auf(&fabric, "a");
        let b = session_auf(&fabric, "b");
        a.starten().await.unwrap();
        b.starten().await.unwrap();

        a.anruf_starten(Identity::neu("b")).await.unwrap();
        assert_eq!(a.zustand().await, CallState::Calling);
        assert!(a.anruf_id().await.is_some());
        assert!(a.letzter_fehler().await.is_none());

        a.stoppen().await;
        b.stoppen().await;
    }

    #[tokio::test]
    async fn zustandswechsel_werden_gemeldet() {
        let fabric = MemoryFabric::neu();
        let a = session_auf(&fabric, "a");
        let b = session_auf(&fabric, "b");
        a.starten().await.unwrap();
        b.starten().await.unwrap();

        let mut events = a.events_abonnieren();
        a.anruf_starten(Identity::neu("b")).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("Zeitlimit")
            .expect("Event muss kommen");
        assert!(matches!(
            event,
            CallEvent::ZustandGeaendert {
                zustand: CallState::Calling,
                anruf_id: Some(_)
            }
        ));

        // Lokales Beenden meldet den Abbau als ENDED
        a.beenden().await.unwrap();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
                .await
                .expect("Zeitlimit")
                .expect("Event muss kommen");
            if let CallEvent::ZustandGeaendert { zustand, anruf_id } = event {
                assert_eq!(zustand, CallState::Ended);
                assert!(anruf_id.is_none());
                break;
            }
        }
        assert_eq!(a.zustand().await, CallState::Idle);

        a.stoppen().await;
        b.stoppen().await;
    }
}
