//! Tablet-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass das Tablet ohne Konfigurationsdatei
//! lauffaehig ist.

use serde::{Deserialize, Serialize};

/// Vollstaendige Tablet-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TabletConfig {
    /// Identitaet und Standort dieses Tablets
    pub tablet: TabletEinstellungen,
    /// Anbindung an die Messaging-Fabric
    pub fabric: FabricEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Identitaet und Standort dieses Tablets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TabletEinstellungen {
    /// Eindeutige Identitaet auf der Fabric
    pub identitaet: String,
    /// Anzeigename des Standorts (wird im Heartbeat mitgesendet)
    pub standort_name: String,
    /// Standort-Kanal fuer Heartbeats und Medien-Sitzungen
    pub kanal: String,
}

impl Default for TabletEinstellungen {
    fn default() -> Self {
        Self {
            identitaet: "tablet-1".into(),
            standort_name: "Eingang".into(),
            kanal: "standort".into(),
        }
    }
}

/// Anbindung an die Messaging-Fabric
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FabricEinstellungen {
    /// Lebensdauer ausgestellter Credentials in Sekunden
    pub credential_ttl_sekunden: u64,
}

impl Default for FabricEinstellungen {
    fn default() -> Self {
        Self {
            credential_ttl_sekunden: 3600,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl TabletConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = TabletConfig::default();
        assert_eq!(cfg.tablet.identitaet, "tablet-1");
        assert_eq!(cfg.tablet.kanal, "standort");
        assert_eq!(cfg.fabric.credential_ttl_sekunden, 3600);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [tablet]
            identitaet = "tablet-eingang"
            standort_name = "Haupteingang"

            [logging]
            level = "debug"
        "#;
        let cfg: TabletConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.tablet.identitaet, "tablet-eingang");
        assert_eq!(cfg.tablet.standort_name, "Haupteingang");
        assert_eq!(cfg.logging.level, "debug");
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.tablet.kanal, "standort");
        assert_eq!(cfg.logging.format, "text");
    }
}
