//! Load the device identity described by a properties file and build the
//! TLS client configuration for the broker connection.
//!
//! ```text
//! cargo run -p iot-credentials --example load_identity -- client.properties
//! ```
//!
//! Without an argument the bundled sample configuration is used. `IOT_*`
//! environment variables (or a `.env` file) override individual settings.

use iot_credentials::{ClientSettings, Properties, client_config};
use tracing::info;

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "iot_credentials=debug,load_identity=info".into()),
        )
        .with_target(false)
        .init();

    let props = match std::env::args().nth(1) {
        Some(path) => Properties::from_file(&path)?,
        None => Properties::bundled(),
    };

    let settings = ClientSettings::from_properties(&props)?.with_env_overrides()?;
    info!(
        endpoint = settings.client_endpoint.as_deref().unwrap_or("<unset>"),
        client_id = settings.client_id.as_deref().unwrap_or("<unset>"),
        "Loaded client settings"
    );

    let pair = settings.load_credentials()?;
    if let Some(cert) = pair.certificate() {
        info!(
            subject = cert.subject(),
            fingerprint = cert.fingerprint_sha256(),
            not_after = %cert.not_after(),
            "Device certificate"
        );
    }

    let roots = settings.root_store()?;
    let config = client_config(&pair, roots)?;
    info!(
        has_client_cert = config.client_auth_cert_resolver.has_certs(),
        "TLS client config ready"
    );

    Ok(())
}
