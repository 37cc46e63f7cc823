use clap::Parser;

use crate::config::Config;

/// Library circulation service CLI arguments
#[derive(Debug, Parser)]
#[command(
    name = "library-circulation",
    version,
    about = "Loan lifecycle, overdue fines and member notifications for a small library"
)]
pub struct Cli {
    /// Overdue scan interval in seconds
    #[arg(long)]
    pub scan_interval: Option<u64>,

    /// Testing-mode watcher poll interval in milliseconds
    #[arg(long, allow_hyphen_values = true)]
    pub testing_poll_ms: Option<i64>,

    /// Operator HTTP port
    #[arg(long)]
    pub port: Option<u16>,
}

impl Cli {
    /// Apply command-line overrides on top of the environment config.
    pub fn apply(&self, config: &mut Config) -> Result<(), String> {
        if let Some(seconds) = self.scan_interval {
            if seconds == 0 {
                return Err("--scan-interval must be greater than zero".to_string());
            }
            config.scan_interval_seconds = seconds;
        }
        if let Some(ms) = self.testing_poll_ms {
            config.testing_poll_interval_ms = ms;
        }
        if let Some(port) = self.port {
            config.api_port = port;
        }
        Ok(())
    }
}
