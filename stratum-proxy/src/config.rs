use clap::Parser;

/// Launch parameters for the Stratum proxy (§6 "Proxy configuration").
#[derive(Parser, Debug, Clone)]
#[command(name = "stratum-proxy", version, about)]
pub struct ProxyConfig {
    #[arg(long, default_value = "0.0.0.0")]
    pub bind_host: String,

    #[arg(long, default_value = "3333")]
    pub bind_port: u16,

    #[arg(long, default_value = "http://127.0.0.1:8080")]
    pub control_plane_url: String,

    #[arg(long, default_value = "default")]
    pub region: String,

    /// Hashrate reporter cadence, in seconds (§4.5, default 300s).
    #[arg(long, default_value = "300")]
    pub report_interval_secs: u64,
}

pub const HANDSHAKE_TIMEOUT_SECS: u64 = 30;
pub const IDLE_TIMEOUT_SECS: u64 = 600;
pub const CALLBACK_TIMEOUT_SECS: u64 = 10;
pub const SUBMIT_STALE_SECS: u64 = 120;
pub const MAX_LINE_BYTES: usize = 64 * 1024;
