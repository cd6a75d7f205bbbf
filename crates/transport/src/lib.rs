//! gegensprech-transport – Transport-Capability
//!
//! Der eigentliche Messaging-Transport (Verbindungsaufbau, Auth-Handshake,
//! Zustellgarantien) liegt ausserhalb dieses Systems. Dieses Crate definiert
//! die Schnittstelle die der Signalisierungs-Kern konsumiert:
//!
//! - `login` / `abmelden` – An- und Abmeldung einer Identitaet
//! - `kanal_beitreten` / `kanal_verlassen` – Broadcast-Gruppen
//! - `an_peer_senden` – adressierte Unicast-Zustellung (Anruf-Signale)
//! - `rundsenden` – Broadcast in die beigetretenen Kanaele (Heartbeats)
//! - `ereignisse` – eingehende Nachrichten und Verbindungswechsel als Stream
//!
//! Die Capability wird per Konstruktor injiziert (`Arc<dyn Transport>`) und
//! beim Start aufgeloest – keine Lazy-Load-Flags, keine globalen Handles.
//!
//! `memory` stellt eine In-Prozess-Fabric bereit, die Tests und der
//! Demo-Modus des Tablet-Binaries verwenden.

pub mod error;
pub mod memory;

use async_trait::async_trait;
use gegensprech_core::{ChannelId, Identity};
use tokio::sync::broadcast;

// Bequeme Re-Exporte
pub use error::{TransportError, TransportResult};
pub use memory::{MemoryFabric, MemoryTransport};

/// Verbindungszustand gegenueber dem Messaging-Transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbindungsZustand {
    Getrennt,
    Verbunden,
}

/// Ereignisse die der Transport an den Kern liefert
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Verbindungszustand hat sich geaendert
    VerbindungGeaendert(VerbindungsZustand),
    /// Adressierte Peer-Nachricht (opakes Text-Payload)
    PeerNachricht { von: Identity, payload: String },
    /// Broadcast-Nachricht aus einem beigetretenen Kanal
    KanalNachricht {
        kanal: ChannelId,
        von: Identity,
        payload: String,
    },
}

/// Die vom Kern konsumierte Transport-Schnittstelle
///
/// Sendeoperationen schlagen mit `TransportError::NichtVerbunden` fehl
/// solange keine Anmeldung erfolgt ist – es wird nichts gepuffert und
/// nichts wiederholt; der Aufrufer entscheidet ueber die Behandlung.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Meldet die Identitaet am Transport an
    ///
    /// `credential` ist das kurzlebige Membership-Token; `None` versucht
    /// eine anmeldungsfreie Verbindung (Fallback-Pfad).
    async fn login(&self, identitaet: &Identity, credential: Option<&str>) -> TransportResult<()>;

    /// Meldet die Identitaet ab und trennt die Verbindung
    async fn abmelden(&self);

    /// Tritt einem Broadcast-Kanal bei
    async fn kanal_beitreten(&self, kanal: &ChannelId) -> TransportResult<()>;

    /// Verlaesst einen Broadcast-Kanal
    async fn kanal_verlassen(&self, kanal: &ChannelId) -> TransportResult<()>;

    /// Sendet ein opakes Payload adressiert an eine Peer-Identitaet
    async fn an_peer_senden(&self, ziel: &Identity, payload: String) -> TransportResult<()>;

    /// Sendet ein opakes Payload in alle beigetretenen Kanaele
    async fn rundsenden(&self, payload: String) -> TransportResult<()>;

    /// Prueft ob aktuell eine Verbindung besteht
    fn ist_verbunden(&self) -> bool;

    /// Abonniert den Ereignis-Stream des Transports
    fn ereignisse(&self) -> broadcast::Receiver<TransportEvent>;
}
