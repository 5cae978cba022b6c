//! System user ticket tool
//!
//! Acquires one ticket using environment configuration and prints it to
//! stdout. Logs go to stderr. Ctrl-C cancels the exchange.

use anyhow::Context;
use std::collections::HashMap;
use system_user_client::{CancellationToken, ClientConfig, SystemUserClient, SystemUserDescriptor};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "system_user_client=info,system_user_ticket=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let vars: HashMap<String, String> = std::env::vars().collect();

    let descriptor =
        SystemUserDescriptor::from_vars(&vars).context("Failed to load system user descriptor")?;
    let config = ClientConfig::from_env().context("Failed to load client configuration")?;

    info!(
        sub_domain = %descriptor.sub_domain(),
        endpoint = %config.endpoint.render(descriptor.sub_domain()),
        use_default_credentials = config.use_default_credentials,
        "Configuration loaded"
    );

    let client = SystemUserClient::new(descriptor, config)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let ticket = client
        .get_system_user_ticket_with_cancellation(&cancel)
        .await
        .map_err(|e| {
            error!(error = %e, retryable = e.is_retryable(), "Failed to acquire system user ticket");
            e
        })?;

    if let Some(identity) = client.last_claims_identity() {
        info!(claim_count = identity.len(), "System user ticket acquired");
    }

    println!("{}", ticket.expose_secret());
    Ok(())
}
