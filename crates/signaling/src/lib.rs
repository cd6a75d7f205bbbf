//! gegensprech-signaling – Signalisierungs-Kern
//!
//! Dieses Crate implementiert den Kern des Zwei-Parteien-Anrufprotokolls
//! ueber eine unzuverlaessige, ordnungs-agnostische Messaging-Fabric.
//!
//! ## Architektur
//!
//! ```text
//! SignalingSession (eine pro lokaler Identitaet)
//!     |
//!     +-- SignalAdapter      – Unicast-Signale + Kanal-Broadcast,
//!     |                        Payload-Routing am type-Feld
//!     +-- CallStateMachine   – reiner Uebergangskern ohne IO
//!     |                        (IDLE/CALLING/RINGING/CONNECTED)
//!     +-- PresenceTracker    – Heartbeat-Auswertung, Liveness-Fenster
//!     +-- CredentialManager  – proaktive Token-Erneuerung (gegensprech-auth)
//!
//! Lokale Intents (starten/annehmen/ablehnen/beenden) und eingehende
//! Signale laufen durch die Zustandsmaschine; Seiteneffekte (Klingeln,
//! Medien-Sitzung, Fehler) werden als CallEvents an Beobachter gemeldet.
//! ```

pub mod adapter;
pub mod call;
pub mod error;
pub mod presence;
pub mod session;

// Bequeme Re-Exporte
pub use adapter::SignalAdapter;
pub use call::{Aktion, CallState, CallStateMachine, Eingabe};
pub use error::{SignalingError, SignalingResult};
pub use presence::{PresenceEvent, PresenceRecord, PresenceTracker};
pub use session::{CallEvent, SignalingSession};
