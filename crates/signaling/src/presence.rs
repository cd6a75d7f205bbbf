//! Praesenz-Tracker – Leitet Online-Status aus Heartbeat-Broadcasts ab
//!
//! Jedes empfangene Heartbeat setzt die Identitaet sofort online. Offline
//! geht eine Identitaet ausschliesslich ueber den periodischen Sweep, wenn
//! laenger als das Liveness-Fenster kein Heartbeat beobachtet wurde – es
//! gibt kein "gehe offline"-Signal und keinen aktiven Probe.
//!
//! Eintraege werden nie entfernt, nur auf offline umgeschaltet.
//! Thread-safe via Arc + DashMap. Clone des Trackers teilt den inneren Zustand.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use gegensprech_core::Identity;
use gegensprech_protocol::HeartbeatMessage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Sendeintervall der eigenen Heartbeats
pub const HEARTBEAT_INTERVALL: Duration = Duration::from_secs(10);

/// Intervall des Offline-Sweeps
pub const SWEEP_INTERVALL: Duration = Duration::from_secs(5);

/// Liveness-Fenster: drei verpasste Heartbeats gelten als offline
pub const OFFLINE_SCHWELLE_SEKUNDEN: i64 = 30;

/// Groesse des Broadcast-Kanals fuer Praesenz-Events
const EVENT_KANAL_GROESSE: usize = 256;

// ---------------------------------------------------------------------------
// PresenceRecord & Events
// ---------------------------------------------------------------------------

/// Praesenz-Info einer beobachteten Identitaet
#[derive(Debug, Clone)]
pub struct PresenceRecord {
    pub user_id: Identity,
    /// Anzeigename des Standorts aus dem letzten Heartbeat
    pub site_name: String,
    /// Zeitpunkt des letzten beobachteten Heartbeats (Empfangszeit)
    pub zuletzt_gesehen: DateTime<Utc>,
    pub ist_online: bool,
}

/// Events die der PresenceTracker versendet
#[derive(Debug, Clone)]
pub enum PresenceEvent {
    /// Identitaet ist (wieder) online
    Online { user_id: Identity },
    /// Identitaet gilt nach Heartbeat-Stille als offline
    Offline { user_id: Identity },
}

// ---------------------------------------------------------------------------
// PresenceTracker
// ---------------------------------------------------------------------------

/// Verwaltet die Praesenz aller beobachteten Identitaeten
#[derive(Clone)]
pub struct PresenceTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    /// Alle je beobachteten Identitaeten, indiziert nach Identity
    eintraege: DashMap<Identity, PresenceRecord>,
    /// Broadcast-Sender fuer Praesenz-Events
    event_tx: broadcast::Sender<PresenceEvent>,
}

impl PresenceTracker {
    /// Erstellt einen neuen leeren PresenceTracker
    pub fn neu() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_KANAL_GROESSE);
        Self {
            inner: Arc::new(TrackerInner {
                eintraege: DashMap::new(),
                event_tx,
            }),
        }
    }

    /// Verarbeitet ein empfangenes Heartbeat
    ///
    /// Upsert mit `zuletzt_gesehen = jetzt` (Empfangszeit, nicht der
    /// Zeitstempel der Nachricht) und sofortigem Online-Status.
    pub fn heartbeat_empfangen(&self, heartbeat: &HeartbeatMessage, jetzt: DateTime<Utc>) {
        let war_online = self
            .inner
            .eintraege
            .get(&heartbeat.user_id)
            .map(|e| e.ist_online)
            .unwrap_or(false);

        self.inner.eintraege.insert(
            heartbeat.user_id.clone(),
            PresenceRecord {
                user_id: heartbeat.user_id.clone(),
                site_name: heartbeat.site_name.clone(),
                zuletzt_gesehen: jetzt,
                ist_online: true,
            },
        );

        if !war_online {
            tracing::info!(user_id = %heartbeat.user_id, site = %heartbeat.site_name, "Identitaet online");
            let _ = self.inner.event_tx.send(PresenceEvent::Online {
                user_id: heartbeat.user_id.clone(),
            });
        }
    }

    /// Offline-Sweep: der einzige Pfad auf den eine Identitaet offline geht
    ///
    /// Schaltet alle Eintraege offline deren letzter Heartbeat laenger als
    /// das Liveness-Fenster zurueckliegt. Gibt die Anzahl der
    /// umgeschalteten Eintraege zurueck.
    pub fn sweep(&self, jetzt: DateTime<Utc>) -> usize {
        let mut umgeschaltet = 0;
        for mut eintrag in self.inner.eintraege.iter_mut() {
            if !eintrag.ist_online {
                continue;
            }
            let stille = jetzt
                .signed_duration_since(eintrag.zuletzt_gesehen)
                .num_seconds();
            if stille >= OFFLINE_SCHWELLE_SEKUNDEN {
                eintrag.ist_online = false;
                umgeschaltet += 1;
                tracing::info!(
                    user_id = %eintrag.user_id,
                    stille_sekunden = stille,
                    "Identitaet offline (Heartbeat-Stille)"
                );
                let _ = self.inner.event_tx.send(PresenceEvent::Offline {
                    user_id: eintrag.user_id.clone(),
                });
            }
        }
        umgeschaltet
    }

    /// Prueft ob eine Identitaet aktuell online ist
    pub fn ist_online(&self, user_id: &Identity) -> bool {
        self.inner
            .eintraege
            .get(user_id)
            .map(|e| e.ist_online)
            .unwrap_or(false)
    }

    /// Gibt den Praesenz-Eintrag einer Identitaet zurueck
    pub fn eintrag(&self, user_id: &Identity) -> Option<PresenceRecord> {
        self.inner.eintraege.get(user_id).map(|e| e.clone())
    }

    /// Gibt alle je beobachteten Eintraege zurueck
    pub fn schnappschuss(&self) -> Vec<PresenceRecord> {
        self.inner
            .eintraege
            .iter()
            .map(|e| e.value().clone())
            .collect()
    }

    /// Gibt die Anzahl der aktuell online Identitaeten zurueck
    pub fn online_anzahl(&self) -> usize {
        self.inner
            .eintraege
            .iter()
            .filter(|e| e.ist_online)
            .count()
    }

    /// Abonniert Praesenz-Events
    pub fn events_abonnieren(&self) -> broadcast::Receiver<PresenceEvent> {
        self.inner.event_tx.subscribe()
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn heartbeat_von(name: &str) -> HeartbeatMessage {
        HeartbeatMessage::neu(Identity::neu(name), name.to_string())
    }

    fn t(sekunden: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + sekunden, 0).unwrap()
    }

    #[test]
    fn heartbeat_setzt_sofort_online() {
        let tracker = PresenceTracker::neu();
        let id = Identity::neu("site1");

        assert!(!tracker.ist_online(&id));
        tracker.heartbeat_empfangen(&heartbeat_von("site1"), t(0));
        assert!(tracker.ist_online(&id));
        assert_eq!(tracker.online_anzahl(), 1);
    }

    #[test]
    fn sweep_innerhalb_des_fensters_laesst_online() {
        let tracker = PresenceTracker::neu();
        let id = Identity::neu("site1");

        // Heartbeats bei t=0 und t=9, Sweep bei t=12
        tracker.heartbeat_empfangen(&heartbeat_von("site1"), t(0));
        tracker.heartbeat_empfangen(&heartbeat_von("site1"), t(9));
        let umgeschaltet = tracker.sweep(t(12));

        assert_eq!(umgeschaltet, 0);
        assert!(tracker.ist_online(&id));
    }

    #[test]
    fn sweep_nach_stille_schaltet_offline() {
        let tracker = PresenceTracker::neu();
        let id = Identity::neu("site1");

        // Letztes Heartbeat bei t=9, Sweep bei t=42: 33s Stille >= 30s
        tracker.heartbeat_empfangen(&heartbeat_von("site1"), t(9));
        let umgeschaltet = tracker.sweep(t(42));

        assert_eq!(umgeschaltet, 1);
        assert!(!tracker.ist_online(&id));

        // Der Eintrag bleibt erhalten, nur der Status kippt
        let eintrag = tracker.eintrag(&id).expect("Eintrag darf nie entfernt werden");
        assert_eq!(eintrag.zuletzt_gesehen, t(9));
    }

    #[test]
    fn naechstes_heartbeat_macht_sofort_wieder_online() {
        let tracker = PresenceTracker::neu();
        let id = Identity::neu("site1");

        tracker.heartbeat_empfangen(&heartbeat_von("site1"), t(0));
        tracker.sweep(t(40));
        assert!(!tracker.ist_online(&id));

        tracker.heartbeat_empfangen(&heartbeat_von("site1"), t(41));
        assert!(tracker.ist_online(&id));
    }

    #[test]
    fn sweep_ist_der_einzige_offline_pfad() {
        let tracker = PresenceTracker::neu();
        let id = Identity::neu("site1");

        tracker.heartbeat_empfangen(&heartbeat_von("site1"), t(0));
        // Ohne Sweep bleibt der Status online, egal wie alt der Heartbeat ist
        assert!(tracker.ist_online(&id));
        assert_eq!(tracker.eintrag(&id).unwrap().zuletzt_gesehen, t(0));
    }

    #[test]
    fn mehrere_identitaeten_unabhaengig() {
        let tracker = PresenceTracker::neu();

        tracker.heartbeat_empfangen(&heartbeat_von("site1"), t(0));
        tracker.heartbeat_empfangen(&heartbeat_von("site2"), t(25));
        let umgeschaltet = tracker.sweep(t(35));

        assert_eq!(umgeschaltet, 1);
        assert!(!tracker.ist_online(&Identity::neu("site1")));
        assert!(tracker.ist_online(&Identity::neu("site2")));
        assert_eq!(tracker.schnappschuss().len(), 2);
    }

    #[tokio::test]
    async fn events_bei_statuswechsel() {
        let tracker = PresenceTracker::neu();
        let mut rx = tracker.events_abonnieren();

        tracker.heartbeat_empfangen(&heartbeat_von("site1"), t(0));
        assert!(matches!(rx.try_recv(), Ok(PresenceEvent::Online { .. })));

        // Weitere Heartbeats ohne Statuswechsel senden kein Event
        tracker.heartbeat_empfangen(&heartbeat_von("site1"), t(5));
        assert!(rx.try_recv().is_err());

        tracker.sweep(t(60));
        assert!(matches!(rx.try_recv(), Ok(PresenceEvent::Offline { .. })));
    }
}
