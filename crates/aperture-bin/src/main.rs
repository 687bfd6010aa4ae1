//! # Aperture Server Binary
//!
//! Main entrypoint for the Aperture gateway.

use std::sync::Arc;

use anyhow::Result;
use aperture_api::{telemetry::DiscardingSink, Server, ServerComponents};
use aperture_auth::GatewayHandle;
use aperture_bin::options_loader::{OptionsLoader, Overrides};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "aperture")]
#[command(about = "Aperture telemetry dashboard gateway", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "aperture.toml")]
    config: String,

    /// Interactive endpoint URLs, separated by ';' (overrides config)
    #[arg(long)]
    frontend_urls: Option<String>,

    /// OTLP/gRPC endpoint URL (overrides config)
    #[arg(long)]
    otlp_grpc_url: Option<String>,

    /// OTLP/HTTP endpoint URL (overrides config)
    #[arg(long)]
    otlp_http_url: Option<String>,

    /// Run both surfaces without authentication
    #[arg(long)]
    unsecured_allow_anonymous: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    // Initialize observability
    aperture_observe::init()?;

    // Another provider may already be installed by a dependency
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    tracing::info!("Starting Aperture gateway");

    // Load configuration
    let overrides = Overrides {
        frontend_urls: args.frontend_urls,
        otlp_grpc_url: args.otlp_grpc_url,
        otlp_http_url: args.otlp_http_url,
        unsecured_allow_anonymous: args.unsecured_allow_anonymous,
    };
    let loader = OptionsLoader::new(&args.config, overrides)?;

    // Validate configuration
    let options = match loader.build() {
        Ok(options) => options,
        Err(errors) => {
            eprintln!("Configuration validation failed:");
            for message in errors.messages() {
                eprintln!("  - {}", message);
            }
            std::process::exit(1);
        }
    };

    if loader.generated_browser_token().is_some() {
        tracing::info!("No browser token configured - generated one for this process");
    }

    let gateway = Arc::new(GatewayHandle::new(options));
    spawn_reload_task(loader, Arc::clone(&gateway));

    let components = ServerComponents {
        gateway,
        sink: Arc::new(DiscardingSink),
    };

    Server::bind(components)
        .await?
        .run(aperture_api::shutdown_signal())
        .await?;

    Ok(())
}

/// Reload options on SIGHUP
#[cfg(unix)]
fn spawn_reload_task(mut loader: OptionsLoader, gateway: Arc<GatewayHandle>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGHUP handler, live reload disabled");
            return;
        }
    };

    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            tracing::info!(path = %loader.path().display(), "Received SIGHUP, reloading configuration");
            match loader.reload(&gateway) {
                Ok(reloaded) => {
                    tracing::info!(version = reloaded.version, "Configuration reloaded");
                    if reloaded.endpoints_changed {
                        tracing::warn!("Endpoint addresses changed; restart to apply them");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %format!("{:#}", e), "Configuration reload rejected, keeping current options");
                }
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_task(_loader: OptionsLoader, _gateway: Arc<GatewayHandle>) {
    tracing::debug!("Live reload is only available on unix");
}
