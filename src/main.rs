//! Binary entry point for the cfsecurity gateway.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Configuration errors happen before logging exists.
#![allow(clippy::print_stderr)]
#![allow(clippy::multiple_crate_versions)]

use std::future::pending;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use axum::Router;
use cfsecurity::auth::{ClientCredentialsGrant, SessionVerifier, TokenGrant, TokenManager};
use cfsecurity::config::GatewayConfig;
use cfsecurity::observability;
use cfsecurity::server::{AppState, Proxy, build_router, liveness};
use cfsecurity::storage::{EntitlementBackend, SqliteEntitlementBackend};
use cfsecurity::upstream::{DiscoveringGrant, HttpCloudController, build_http_client};
use cfsecurity::{Error, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;

/// Entitlement-aware authorization gateway for Cloud Foundry security groups.
#[derive(Parser)]
#[command(name = "cfsecurity-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, env = "CFSECURITY_CONFIG_PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // a missing .env is normal
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match GatewayConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let observability = match observability::init_from_config(&config, cli.verbose) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    match run(config, observability.prometheus()).await {
        Ok(()) => {
            tracing::info!("Gateway stopped");
            ExitCode::SUCCESS
        },
        Err(e) => {
            tracing::error!(error = %e, "Gateway terminated");
            ExitCode::FAILURE
        },
    }
}

/// Wires every component and serves until a signal or a fatal error.
async fn run(config: GatewayConfig, prometheus: Option<PrometheusHandle>) -> Result<()> {
    let store: Arc<dyn EntitlementBackend> =
        Arc::new(SqliteEntitlementBackend::new(&config.sqlite_path)?);
    tracing::info!(path = %config.sqlite_path.display(), "Entitlement store opened");

    let cf = &config.cloud_foundry;
    let http = build_http_client(cf)?;

    let grant: Arc<dyn TokenGrant> = match &cf.uaa_endpoint {
        Some(uaa) => Arc::new(ClientCredentialsGrant::new(
            http.clone(),
            uaa,
            cf.client_id.clone(),
            cf.client_secret.clone(),
        )),
        None => Arc::new(DiscoveringGrant::new(
            http.clone(),
            cf.endpoint.clone(),
            cf.client_id.clone(),
            cf.client_secret.clone(),
        )),
    };
    let tokens = Arc::new(TokenManager::new(grant, config.tuning.token_refresh_margin));

    match tokens.ensure_fresh_token().await {
        Ok(_) => tracing::info!(endpoint = %cf.endpoint, "Service credential obtained"),
        Err(e) if config.keep_serving_degraded => {
            tracing::warn!(error = %e, "Serving degraded, service credential unavailable");
        },
        Err(e) => return Err(e),
    }

    let upstream = Arc::new(
        HttpCloudController::new(http.clone(), &cf.endpoint, Arc::clone(&tokens))
            .with_per_page(config.tuning.per_page)
            .with_read_retries(cf.read_retries, cf.retry_backoff),
    );
    let verifier = SessionVerifier::new(&config.jwt, config.admin_scope.clone())?;
    tracing::info!(family = ?verifier.family(), alg = %config.jwt.alg, "Session verifier ready");

    let state = AppState::new(
        verifier,
        tokens,
        Arc::clone(&store),
        upstream,
        Proxy::new(http, &cf.endpoint),
        &config.tuning,
    );
    let app = build_router(state, prometheus);

    let liveness = async {
        if config.not_exit_when_conn_failed {
            pending::<Result<()>>().await
        } else {
            liveness::run(
                store,
                config.liveness_interval,
                config.liveness_max_failures,
            )
            .await
        }
    };

    tokio::select! {
        result = serve(&config, app) => result,
        result = liveness => result,
        () = shutdown_signal() => Ok(()),
    }
}

async fn serve(config: &GatewayConfig, app: Router) -> Result<()> {
    let addr: SocketAddr = config.listen_addr;

    if let (Some(cert), Some(key)) = (&config.ssl_cert_file, &config.ssl_key_file) {
        let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert, key)
            .await
            .map_err(|e| Error::operation("load_tls_certificate", e))?;
        tracing::info!(%addr, "Listening with TLS");
        return axum_server::bind_rustls(addr, tls)
            .serve(app.into_make_service())
            .await
            .map_err(|e| Error::operation("serve", e));
    }

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::operation("bind", format!("{addr}: {e}")))?;
    tracing::info!(%addr, "Listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| Error::operation("serve", e))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Cannot listen for Ctrl-C");
            pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!(error = %e, "Cannot listen for SIGTERM");
                pending::<()>().await;
            },
        }
    };
    #[cfg(not(unix))]
    let terminate = pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
