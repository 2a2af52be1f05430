use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;

use stratum_proxy::control_client::ControlClient;
use stratum_proxy::hashrate::{run_reporter, HashrateRegistry};
use stratum_proxy::protocol;
use stratum_proxy::session::SessionStore;
use stratum_proxy::ProxyConfig;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ProxyConfig::parse();

    let listener = match TcpListener::bind((config.bind_host.as_str(), config.bind_port)).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, "failed to bind stratum listener");
            return std::process::ExitCode::FAILURE;
        }
    };

    tracing::info!(
        host = config.bind_host,
        port = config.bind_port,
        region = config.region,
        "stratum proxy listening"
    );

    let control = ControlClient::new(config.control_plane_url.clone());
    let sessions = SessionStore::new();
    let hashrate = HashrateRegistry::new();

    let reporter = tokio::spawn(run_reporter(
        hashrate.clone(),
        control.clone(),
        config.report_interval_secs,
    ));

    let accept_loop = async {
        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            };

            let control = control.clone();
            let sessions = sessions.clone();
            let hashrate = hashrate.clone();
            let peer_ip = addr.ip().to_string();

            tokio::spawn(async move {
                protocol::handle(stream, peer_ip, control, sessions, hashrate).await;
            });
        }
    };

    tokio::select! {
        _ = accept_loop => {}
        _ = signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    reporter.abort();
    std::process::ExitCode::SUCCESS
}
