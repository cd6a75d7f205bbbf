//! In-Memory-Fabric – Transport-Implementierung fuer Tests und Demo-Modus
//!
//! Die `MemoryFabric` stellt eine prozesslokale Messaging-Fabric dar:
//! Identitaeten melden sich an, erhalten eine Ereignis-Queue und koennen
//! adressiert (Unicast) oder in Kanaele (Broadcast) senden. Zustellung an
//! unbekannte Identitaeten verpufft kommentarlos – wie auf der echten,
//! unzuverlaessigen Fabric.
//!
//! Thread-safe via Arc + DashMap. Clone der Fabric teilt den inneren Zustand.

use dashmap::DashMap;
use gegensprech_core::{ChannelId, Identity};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use crate::error::{TransportError, TransportResult};
use crate::{Transport, TransportEvent, VerbindungsZustand};

/// Groesse der Ereignis-Queue pro Teilnehmer
const EREIGNIS_QUEUE_GROESSE: usize = 256;

// ---------------------------------------------------------------------------
// MemoryFabric
// ---------------------------------------------------------------------------

/// Prozesslokale Messaging-Fabric
#[derive(Clone)]
pub struct MemoryFabric {
    inner: Arc<FabricInner>,
}

struct FabricInner {
    /// Angemeldete Teilnehmer mit ihren Ereignis-Queues
    teilnehmer: DashMap<Identity, broadcast::Sender<TransportEvent>>,
    /// Kanal-Mitgliedschaft: kanal -> Identitaeten
    kanal_mitglieder: DashMap<ChannelId, Vec<Identity>>,
}

impl MemoryFabric {
    /// Erstellt eine neue leere Fabric
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(FabricInner {
                teilnehmer: DashMap::new(),
                kanal_mitglieder: DashMap::new(),
            }),
        }
    }

    /// Erstellt einen noch nicht angemeldeten Transport an dieser Fabric
    pub fn transport(&self) -> MemoryTransport {
        let (events_tx, _) = broadcast::channel(EREIGNIS_QUEUE_GROESSE);
        MemoryTransport {
            fabric: self.clone(),
            identitaet: RwLock::new(None),
            verbunden: AtomicBool::new(false),
            beigetreten: RwLock::new(Vec::new()),
            events_tx,
            credential_erforderlich: AtomicBool::new(false),
        }
    }

    /// Gibt die Anzahl der angemeldeten Teilnehmer zurueck
    pub fn teilnehmer_anzahl(&self) -> usize {
        self.inner.teilnehmer.len()
    }

    /// Stellt ein Ereignis an eine einzelne Identitaet zu
    ///
    /// Gibt `false` zurueck wenn die Identitaet nicht angemeldet ist.
    fn zustellen_an(&self, ziel: &Identity, ereignis: TransportEvent) -> bool {
        match self.inner.teilnehmer.get(ziel) {
            Some(tx) => {
                let _ = tx.send(ereignis);
                true
            }
            None => false,
        }
    }

    /// Stellt ein Ereignis an alle Kanal-Mitglieder ausser dem Absender zu
    fn kanal_zustellen(
        &self,
        kanal: &ChannelId,
        absender: &Identity,
        payload: &str,
    ) -> usize {
        let mitglieder = match self.inner.kanal_mitglieder.get(kanal) {
            Some(ids) => ids.clone(),
            None => return 0,
        };

        let mut zugestellt = 0;
        for mitglied in &mitglieder {
            if mitglied == absender {
                continue;
            }
            let ereignis = TransportEvent::KanalNachricht {
                kanal: kanal.clone(),
                von: absender.clone(),
                payload: payload.to_string(),
            };
            if self.zustellen_an(mitglied, ereignis) {
                zugestellt += 1;
            }
        }
        zugestellt
    }

    /// Entfernt eine Identitaet aus allen Kanaelen und der Teilnehmerliste
    fn teilnehmer_entfernen(&self, identitaet: &Identity) {
        self.inner.teilnehmer.remove(identitaet);
        self.inner.kanal_mitglieder.iter_mut().for_each(|mut entry| {
            entry.value_mut().retain(|id| id != identitaet);
        });
        self.inner
            .kanal_mitglieder
            .retain(|_, mitglieder| !mitglieder.is_empty());
    }
}

impl Default for MemoryFabric {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// MemoryTransport
// ---------------------------------------------------------------------------

/// Ein an die `MemoryFabric` gebundener Transport fuer eine Identitaet
pub struct MemoryTransport {
    fabric: MemoryFabric,
    /// Angemeldete Identitaet (None vor dem Login)
    identitaet: RwLock<Option<Identity>>,
    verbunden: AtomicBool,
    /// Aktuell beigetretene Kanaele
    beigetreten: RwLock<Vec<ChannelId>>,
    /// Ereignis-Queue dieses Transports
    events_tx: broadcast::Sender<TransportEvent>,
    /// Testschalter: Login ohne Credential ablehnen
    credential_erforderlich: AtomicBool,
}

impl MemoryTransport {
    /// Laesst Logins ohne Credential fehlschlagen (fuer Fallback-Tests)
    pub fn credential_erzwingen(&self, erzwingen: bool) {
        self.credential_erforderlich
            .store(erzwingen, Ordering::Relaxed);
    }

    async fn eigene_identitaet(&self) -> TransportResult<Identity> {
        self.identitaet
            .read()
            .await
            .clone()
            .ok_or(TransportError::NichtVerbunden)
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn login(&self, identitaet: &Identity, credential: Option<&str>) -> TransportResult<()> {
        if self.credential_erforderlich.load(Ordering::Relaxed) && credential.is_none() {
            return Err(TransportError::LoginFehlgeschlagen(
                "Fabric verlangt ein Credential".into(),
            ));
        }

        self.fabric
            .inner
            .teilnehmer
            .insert(identitaet.clone(), self.events_tx.clone());
        *self.identitaet.write().await = Some(identitaet.clone());
        self.verbunden.store(true, Ordering::Relaxed);

        tracing::debug!(identitaet = %identitaet, "An der Memory-Fabric angemeldet");
        let _ = self.events_tx.send(TransportEvent::VerbindungGeaendert(
            VerbindungsZustand::Verbunden,
        ));
        Ok(())
    }

    async fn abmelden(&self) {
        if let Some(identitaet) = self.identitaet.write().await.take() {
            self.fabric.teilnehmer_entfernen(&identitaet);
            tracing::debug!(identitaet = %identitaet, "Von der Memory-Fabric abgemeldet");
        }
        self.beigetreten.write().await.clear();
        self.verbunden.store(false, Ordering::Relaxed);
        let _ = self.events_tx.send(TransportEvent::VerbindungGeaendert(
            VerbindungsZustand::Getrennt,
        ));
    }

    async fn kanal_beitreten(&self, kanal: &ChannelId) -> TransportResult<()> {
        if !self.ist_verbunden() {
            return Err(TransportError::NichtVerbunden);
        }
        let identitaet = self.eigene_identitaet().await?;

        let mut mitglieder = self
            .fabric
            .inner
            .kanal_mitglieder
            .entry(kanal.clone())
            .or_default();
        if !mitglieder.contains(&identitaet) {
            mitglieder.push(identitaet);
        }
        drop(mitglieder);

        let mut beigetreten = self.beigetreten.write().await;
        if !beigetreten.contains(kanal) {
            beigetreten.push(kanal.clone());
        }
        Ok(())
    }

    async fn kanal_verlassen(&self, kanal: &ChannelId) -> TransportResult<()> {
        let identitaet = self.eigene_identitaet().await?;
        if let Some(mut mitglieder) = self.fabric.inner.kanal_mitglieder.get_mut(kanal) {
            mitglieder.retain(|id| id != &identitaet);
        }
        self.beigetreten.write().await.retain(|k| k != kanal);
        Ok(())
    }

    async fn an_peer_senden(&self, ziel: &Identity, payload: String) -> TransportResult<()> {
        if !self.ist_verbunden() {
            return Err(TransportError::NichtVerbunden);
        }
        let von = self.eigene_identitaet().await?;

        let zugestellt = self.fabric.zustellen_an(
            ziel,
            TransportEvent::PeerNachricht { von, payload },
        );
        if !zugestellt {
            // Unbekannte Ziele verpuffen – die Fabric garantiert keine Zustellung
            tracing::debug!(ziel = %ziel, "Peer-Nachricht an unbekannte Identitaet verpufft");
        }
        Ok(())
    }

    async fn rundsenden(&self, payload: String) -> TransportResult<()> {
        if !self.ist_verbunden() {
            return Err(TransportError::NichtVerbunden);
        }
        let von = self.eigene_identitaet().await?;

        let kanaele = self.beigetreten.read().await.clone();
        for kanal in &kanaele {
            self.fabric.kanal_zustellen(kanal, &von, &payload);
        }
        Ok(())
    }

    fn ist_verbunden(&self) -> bool {
        self.verbunden.load(Ordering::Relaxed)
    }

    fn ereignisse(&self) -> broadcast::Receiver<TransportEvent> {
        self.events_tx.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
