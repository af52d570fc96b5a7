// crates/server/src/config.rs
//! Command-line and environment configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use longrun_core::WorkerConfig;
use longrun_observability::{LogConfig, LogFormat};

/// Default port for the server.
pub const DEFAULT_PORT: u16 = 5080;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "longrun",
    version,
    about = "Queue string jobs and stream their processing over WebSocket"
)]
pub struct ServerConfig {
    /// Address to bind.
    #[arg(long, env = "LONGRUN_HOST", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,

    /// Port to bind. Falls back to `PORT`, then the built-in default.
    #[arg(long, env = "LONGRUN_PORT")]
    pub port: Option<u16>,

    /// Single allowed CORS origin; any origin when unset.
    #[arg(long, env = "LONGRUN_CORS_ORIGIN")]
    pub cors_origin: Option<String>,

    #[arg(long, env = "LONGRUN_LOG_FORMAT", default_value = "compact")]
    pub log_format: LogFormat,

    /// Directory for the daily-rolling log file.
    #[arg(long, env = "LONGRUN_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[arg(long, env = "LONGRUN_UNIT_DELAY_MIN_MS", default_value_t = 1000)]
    pub unit_delay_min_ms: u64,

    #[arg(long, env = "LONGRUN_UNIT_DELAY_MAX_MS", default_value_t = 5000)]
    pub unit_delay_max_ms: u64,

    #[arg(long, env = "LONGRUN_START_DELAY_MS", default_value_t = 1000)]
    pub start_delay_ms: u64,

    #[arg(long, env = "LONGRUN_CANCEL_GRACE_MS", default_value_t = 500)]
    pub cancel_grace_ms: u64,
}

impl ServerConfig {
    pub fn port(&self) -> u16 {
        self.port
            .or_else(|| std::env::var("PORT").ok().and_then(|p| p.parse().ok()))
            .unwrap_or(DEFAULT_PORT)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port())
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            unit_delay_min: Duration::from_millis(self.unit_delay_min_ms),
            unit_delay_max: Duration::from_millis(self.unit_delay_max_ms),
            start_delay: Duration::from_millis(self.start_delay_ms),
            cancel_grace: Duration::from_millis(self.cancel_grace_ms),
        }
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            format: self.log_format,
            log_dir: self.log_dir.clone(),
            ..LogConfig::default()
        }
    }
}
