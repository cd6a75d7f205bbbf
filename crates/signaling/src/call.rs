//! Anruf-Zustandsmaschine – reiner Uebergangskern ohne IO
//!
//! Die Maschine konsumiert lokale Intents und eingehende Signale und gibt
//! die auszufuehrenden Seiteneffekte als `Aktion`-Liste zurueck. Senden,
//! Klingeln und Medien-Sitzung fuehrt die `SignalingSession` aus – dadurch
//! laesst sich jeder Uebergang ohne Transport testen.
//!
//! ## Uebergangstabelle
//!
//! | Von       | Ausloeser                | Nach      |
//! |-----------|--------------------------|-----------|
//! | Idle      | lokal: starten(ziel)     | Calling   |
//! | Idle      | remote: INCOMING_CALL    | Ringing   |
//! | Calling   | remote: CALL_ACCEPTED    | Connected |
//! | Calling   | remote: CALL_DECLINED    | Idle      |
//! | Calling   | lokal: beenden           | Idle      |
//! | Ringing   | lokal: annehmen          | Connected |
//! | Ringing   | lokal: ablehnen          | Idle      |
//! | Connected | remote: CALL_ENDED       | Idle      |
//! | Connected | lokal: beenden           | Idle      |
//! | beliebig  | remote: CALL_ENDED       | Idle (idempotent) |
//!
//! Ein `INCOMING_CALL` waehrend eines aktiven Anrufs wird automatisch
//! abgelehnt (Besetzt-Politik); der aktive Anruf bleibt unberuehrt.

use gegensprech_core::{CallId, ChannelId, Identity};
use gegensprech_protocol::{CallSignal, CallSignalTyp};

use crate::error::{SignalingError, SignalingResult};

// ---------------------------------------------------------------------------
// Zustaende, Eingaben, Aktionen
// ---------------------------------------------------------------------------

/// Anruf-Zustand der lokalen Identitaet
///
/// `Ended` ist ein transientes UI-Label: es erscheint nur in
/// `CallEvent::ZustandGeaendert` beim Abbau eines Anrufs. Gespeichert wird
/// es nie – der gespeicherte Zustand kollabiert direkt auf `Idle`, wodurch
/// `anruf_id` genau dann gesetzt ist wenn der Zustand nicht `Idle` ist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    Calling,
    Ringing,
    Connected,
    Ended,
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CallState::Idle => "IDLE",
            CallState::Calling => "CALLING",
            CallState::Ringing => "RINGING",
            CallState::Connected => "CONNECTED",
            CallState::Ended => "ENDED",
        };
        write!(f, "{}", s)
    }
}

/// Eingaben der Zustandsmaschine: lokale Intents und eingehende Signale
#[derive(Debug, Clone)]
pub enum Eingabe {
    /// Lokal: Anruf zu `ziel` starten
    Starten { ziel: Identity },
    /// Lokal: klingelnden Anruf annehmen
    Annehmen,
    /// Lokal: klingelnden Anruf ablehnen
    Ablehnen,
    /// Lokal: aktiven Anruf beenden (in jedem Zustand erlaubt)
    Beenden,
    /// Remote: eingehendes Signal der Gegenstelle
    Signal(CallSignal),
}

/// Von der Maschine angeordnete Seiteneffekte
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aktion {
    /// Signal ueber den Adapter an die Gegenstelle senden
    Senden(CallSignal),
    /// Klingel-/Alarmton starten
    AlarmStarten { von: Identity },
    /// Klingel-/Alarmton stoppen
    AlarmStoppen,
    /// Medien-Sitzung im Kanal betreten
    MedienBeitreten { kanal: ChannelId, anruf_id: CallId },
    /// Medien-Sitzung verlassen
    MedienVerlassen,
    /// Gegenstelle hat abgelehnt – dem Benutzer melden
    AbgelehntVon { von: Identity },
}

// ---------------------------------------------------------------------------
// CallStateMachine
// ---------------------------------------------------------------------------

/// Zustandsmaschine eines Zwei-Parteien-Anrufs
///
/// Haelt hoechstens einen nicht-`Idle` Anruf zur Zeit. Signale deren
/// Adressierung oder CallId nicht zum aktuellen Anruf passt werden
/// kommentarlos ignoriert.
pub struct CallStateMachine {
    /// Lokale Identitaet
    lokal: Identity,
    /// Eigener Standort-Kanal (wird im INCOMING_CALL mitgesendet)
    kanal: ChannelId,
    zustand: CallState,
    /// CallId des aktiven Anrufversuchs
    anruf_id: Option<CallId>,
    /// Das empfangene INCOMING_CALL (nur auf der Empfaengerseite gesetzt)
    aktueller_anruf: Option<CallSignal>,
    /// Das lokal gewaehlte Ziel (nur auf der Anruferseite gesetzt)
    gewaehltes_ziel: Option<Identity>,
}

impl CallStateMachine {
    /// Erstellt eine neue Maschine im Zustand `Idle`
    pub fn neu(lokal: Identity, kanal: ChannelId) -> Self {
        Self {
            lokal,
            kanal,
            zustand: CallState::Idle,
            anruf_id: None,
            aktueller_anruf: None,
            gewaehltes_ziel: None,
        }
    }

    /// Aktueller Zustand
    pub fn zustand(&self) -> CallState {
        self.zustand
    }

    /// CallId des aktiven Anrufs (None in `Idle`)
    pub fn anruf_id(&self) -> Option<&CallId> {
        self.anruf_id.as_ref()
    }

    /// Das empfangene INCOMING_CALL, falls vorhanden
    pub fn aktueller_anruf(&self) -> Option<&CallSignal> {
        self.aktueller_anruf.as_ref()
    }

    /// Gegenstelle des aktiven Anrufs: Absender des empfangenen Anrufs,
    /// sonst das gewaehlte Ziel
    pub fn gegenstelle(&self) -> Option<Identity> {
        self.aktueller_anruf
            .as_ref()
            .map(|s| s.from.clone())
            .or_else(|| self.gewaehltes_ziel.clone())
    }

    /// Prueft die Kern-Konsistenz: `anruf_id` gesetzt gdw. nicht `Idle`
    pub fn ist_konsistent(&self) -> bool {
        (self.zustand == CallState::Idle) == self.anruf_id.is_none()
    }

    /// Setzt die Maschine auf `Idle` zurueck und verwirft den Anruf-Kontext
    pub fn zuruecksetzen(&mut self) {
        self.zustand = CallState::Idle;
        self.anruf_id = None;
        self.aktueller_anruf = None;
        self.gewaehltes_ziel = None;
    }

    /// Verarbeitet eine Eingabe und gibt die auszufuehrenden Aktionen zurueck
    ///
    /// Lokale Intents die nicht zum Zustand passen geben
    /// `SignalingError::UngueltigerZustand` zurueck; unpassende Remote-Signale
    /// sind nie ein Fehler – sie werden ignoriert.
    pub fn verarbeiten(&mut self, eingabe: Eingabe) -> SignalingResult<Vec<Aktion>> {
        match eingabe {
            Eingabe::Starten { ziel } => self.starten(ziel),
            Eingabe::Annehmen => self.annehmen(),
            Eingabe::Ablehnen => self.ablehnen(),
            Eingabe::Beenden => Ok(self.beenden()),
            Eingabe::Signal(signal) => Ok(self.signal_anwenden(signal)),
        }
    }

    // -----------------------------------------------------------------------
    // Lokale Intents
    // -----------------------------------------------------------------------

    fn starten(&mut self, ziel: Identity) -> SignalingResult<Vec<Aktion>> {
        if self.zustand != CallState::Idle {
            return Err(SignalingError::UngueltigerZustand {
                aktion: "starten",
                zustand: self.zustand,
            });
        }

        let anruf_id = CallId::vergeben();
        let signal = CallSignal::neu(
            CallSignalTyp::IncomingCall,
            self.lokal.clone(),
            ziel.clone(),
            self.kanal.clone(),
            anruf_id.clone(),
        );

        self.zustand = CallState::Calling;
        self.anruf_id = Some(anruf_id);
        self.gewaehltes_ziel = Some(ziel);

        tracing::info!(anruf_id = %signal.call_id, ziel = %signal.to, "Anruf gestartet");
        Ok(vec![Aktion::Senden(signal)])
    }

    fn annehmen(&mut self) -> SignalingResult<Vec<Aktion>> {
        if self.zustand != CallState::Ringing {
            return Err(SignalingError::UngueltigerZustand {
                aktion: "annehmen",
                zustand: self.zustand,
            });
        }
        let anruf = match &self.aktueller_anruf {
            Some(a) => a.clone(),
            None => return Err(SignalingError::Intern("Ringing ohne Anruf-Kontext".into())),
        };

        self.zustand = CallState::Connected;

        let antwort = CallSignal::neu(
            CallSignalTyp::CallAccepted,
            self.lokal.clone(),
            anruf.from.clone(),
            anruf.channel.clone(),
            anruf.call_id.clone(),
        );
        tracing::info!(anruf_id = %anruf.call_id, von = %anruf.from, "Anruf angenommen");
        Ok(vec![
            Aktion::AlarmStoppen,
            Aktion::Senden(antwort),
            Aktion::MedienBeitreten {
                kanal: anruf.channel,
                anruf_id: anruf.call_id,
            },
        ])
    }

    fn ablehnen(&mut self) -> SignalingResult<Vec<Aktion>> {
        if self.zustand != CallState::Ringing {
            return Err(SignalingError::UngueltigerZustand {
                aktion: "ablehnen",
                zustand: self.zustand,
            });
        }
        let anruf = match &self.aktueller_anruf {
            Some(a) => a.clone(),
            None => return Err(SignalingError::Intern("Ringing ohne Anruf-Kontext".into())),
        };

        let antwort = CallSignal::neu(
            CallSignalTyp::CallDeclined,
            self.lokal.clone(),
            anruf.from.clone(),
            anruf.channel.clone(),
            anruf.call_id.clone(),
        );
        tracing::info!(anruf_id = %anruf.call_id, von = %anruf.from, "Anruf abgelehnt");
        self.zuruecksetzen();
        Ok(vec![Aktion::AlarmStoppen, Aktion::Senden(antwort)])
    }

    /// Lokales Beenden – in jedem Zustand erlaubt
    ///
    /// Benachrichtigt wird die Gegenstelle des Anrufs; ist keine bekannt,
    /// bleibt es bei einem lokalen Reset.
    fn beenden(&mut self) -> Vec<Aktion> {
        if self.zustand == CallState::Idle {
            tracing::debug!("Beenden im Zustand IDLE – nichts zu tun");
            return Vec::new();
        }

        let mut aktionen = Vec::new();
        match self.zustand {
            CallState::Calling | CallState::Ringing => aktionen.push(Aktion::AlarmStoppen),
            CallState::Connected => aktionen.push(Aktion::MedienVerlassen),
            _ => {}
        }

        match (self.gegenstelle(), &self.anruf_id) {
            (Some(gegenstelle), Some(anruf_id)) => {
                let kanal = self
                    .aktueller_anruf
                    .as_ref()
                    .map(|a| a.channel.clone())
                    .unwrap_or_else(|| self.kanal.clone());
                let signal = CallSignal::neu(
                    CallSignalTyp::CallEnded,
                    self.lokal.clone(),
                    gegenstelle,
                    kanal,
                    anruf_id.clone(),
                );
                tracing::info!(anruf_id = %signal.call_id, ziel = %signal.to, "Anruf beendet");
                aktionen.push(Aktion::Senden(signal));
            }
            _ => {
                tracing::warn!("Beenden ohne bekannte Gegenstelle – nur lokaler Reset");
            }
        }

        self.zuruecksetzen();
        aktionen
    }

    // -----------------------------------------------------------------------
    // Remote-Signale
    // -----------------------------------------------------------------------

    fn signal_anwenden(&mut self, signal: CallSignal) -> Vec<Aktion> {
        if !signal.ist_adressiert_an(&self.lokal) {
            tracing::debug!(
                an = %signal.to,
                lokal = %self.lokal,
                "Fremdadressiertes Signal ignoriert"
            );
            return Vec::new();
        }

        match signal.typ {
            CallSignalTyp::IncomingCall => self.eingehender_anruf(signal),
            CallSignalTyp::CallAccepted => self.angenommen(signal),
            CallSignalTyp::CallDeclined => self.abgelehnt(signal),
            CallSignalTyp::CallEnded => self.beendet(signal),
        }
    }

    fn eingehender_anruf(&mut self, signal: CallSignal) -> Vec<Aktion> {
        if self.zustand != CallState::Idle {
            // Der Transport darf duplizieren: ein erneutes INCOMING_CALL des
            // laufenden Anrufs ist ein Retransmit, keine Besetzt-Situation
            if self.gehoert_zum_anruf(&signal) {
                tracing::debug!(
                    anruf_id = %signal.call_id,
                    von = %signal.from,
                    "INCOMING_CALL-Duplikat des laufenden Anrufs ignoriert"
                );
                return Vec::new();
            }
            // Besetzt-Politik: automatisch ablehnen, aktiver Anruf bleibt
            tracing::info!(
                anruf_id = %signal.call_id,
                von = %signal.from,
                zustand = %self.zustand,
                "Eingehender Anruf waehrend aktivem Anruf – automatisch abgelehnt"
            );
            let ablehnung = CallSignal::neu(
                CallSignalTyp::CallDeclined,
                self.lokal.clone(),
                signal.from,
                signal.channel,
                signal.call_id,
            );
            return vec![Aktion::Senden(ablehnung)];
        }

        tracing::info!(anruf_id = %signal.call_id, von = %signal.from, "Eingehender Anruf");
        let von = signal.from.clone();
        self.zustand = CallState::Ringing;
        self.anruf_id = Some(signal.call_id.clone());
        self.aktueller_anruf = Some(signal);
        vec![Aktion::AlarmStarten { von }]
    }

    fn angenommen(&mut self, signal: CallSignal) -> Vec<Aktion> {
        if self.zustand != CallState::Calling || !self.gehoert_zum_anruf(&signal) {
            tracing::debug!(
                anruf_id = %signal.call_id,
                zustand = %self.zustand,
                "CALL_ACCEPTED passt nicht zum aktuellen Anruf – ignoriert"
            );
            return Vec::new();
        }

        self.zustand = CallState::Connected;
        tracing::info!(anruf_id = %signal.call_id, von = %signal.from, "Gegenstelle hat angenommen");
        vec![
            Aktion::AlarmStoppen,
            Aktion::MedienBeitreten {
                kanal: signal.channel,
                anruf_id: signal.call_id,
            },
        ]
    }

    fn abgelehnt(&mut self, signal: CallSignal) -> Vec<Aktion> {
        if self.zustand != CallState::Calling || !self.gehoert_zum_anruf(&signal) {
            tracing::debug!(
                anruf_id = %signal.call_id,
                zustand = %self.zustand,
                "CALL_DECLINED passt nicht zum aktuellen Anruf – ignoriert"
            );
            return Vec::new();
        }

        tracing::info!(anruf_id = %signal.call_id, von = %signal.from, "Gegenstelle hat abgelehnt");
        self.zuruecksetzen();
        vec![Aktion::AlarmStoppen, Aktion::AbgelehntVon { von: signal.from }]
    }

    fn beendet(&mut self, signal: CallSignal) -> Vec<Aktion> {
        // Idempotent: im Idle-Zustand ist CALL_ENDED ein No-Op, nie ein Fehler
        if self.zustand == CallState::Idle {
            tracing::debug!(anruf_id = %signal.call_id, "CALL_ENDED im IDLE – No-Op");
            return Vec::new();
        }
        if !self.gehoert_zum_anruf(&signal) {
            tracing::debug!(
                anruf_id = %signal.call_id,
                "CALL_ENDED fuer fremden Anruf – ignoriert"
            );
            return Vec::new();
        }

        let mut aktionen = Vec::new();
        match self.zustand {
            CallState::Calling | CallState::Ringing => aktionen.push(Aktion::AlarmStoppen),
            CallState::Connected => aktionen.push(Aktion::MedienVerlassen),
            _ => {}
        }
        tracing::info!(anruf_id = %signal.call_id, von = %signal.from, "Gegenstelle hat beendet");
        self.zuruecksetzen();
        aktionen
    }

    /// Prueft ob CallId und Absender zum aktiven Anruf passen
    fn gehoert_zum_anruf(&self, signal: &CallSignal) -> bool {
        let id_passt = self.anruf_id.as_ref() == Some(&signal.call_id);
        let absender_passt = match self.gegenstelle() {
            Some(gegenstelle) => gegenstelle == signal.from,
            None => true,
        };
        id_passt && absender_passt
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
