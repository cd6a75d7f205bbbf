//! gegensprech-auth – Credential-Lebenszyklus
//!
//! Dieses Crate implementiert:
//! - `Credential` – das kurzlebige Membership-Token fuer den Transport-Login
//! - `TokenAussteller` – Capability-Trait der externen Token-Ausgabe
//! - `CredentialManager` – haelt das aktive Credential und erneuert es
//!   proaktiv bevor es ablaeuft
//! - `StatischerAussteller` – lokale Token-Generierung fuer Tests und
//!   Demo-Modus

pub mod credential;
pub mod error;
pub mod manager;

// Bequeme Re-Exporte
pub use credential::{Credential, StatischerAussteller, TokenAussteller};
pub use error::{AuthError, AuthResult};
pub use manager::CredentialManager;
