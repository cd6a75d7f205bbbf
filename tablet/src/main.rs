//! Gegensprech Tablet – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet das Tablet.

use anyhow::Result;
use gegensprech_tablet::{config::TabletConfig, Tablet};

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad =
        std::env::var("GEGENSPRECH_CONFIG").unwrap_or_else(|_| "config.toml".into());

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = TabletConfig::laden(&config_pfad)?;

    // Logging initialisieren (GS_LOG_LEVEL/GS_LOG_FORMAT uebersteuern die Config)
    let format = std::env::var("GS_LOG_FORMAT").unwrap_or_else(|_| config.logging.format.clone());
    logging_initialisieren(&config.logging.level, &format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Gegensprech Tablet wird initialisiert"
    );

    // Tablet starten (Demo-Modus auf einer In-Memory-Fabric)
    let tablet = Tablet::demo(config);
    tablet.starten().await?;

    Ok(())
}

/// Initialisiert tracing-subscriber mit dem konfigurierten Level und Format
fn logging_initialisieren(level: &str, format: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_env("GS_LOG_LEVEL")
        .unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}
