use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use batch_ingest::config::Config;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(about, long_about = None, version)]
pub(crate) struct Args {
    /// Address to listen on.
    #[arg(short, long, default_value_t = IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)))]
    pub(crate) listen: IpAddr,
    /// (TCP) port to listen on.
    #[arg(short, long, default_value_t = 11311)]
    pub(crate) port: u16,
    /// YAML file to read settings from. Flags below override it.
    #[arg(short, long)]
    pub(crate) config: Option<PathBuf>,
    /// Sets the maximum number of identifiers per batch.
    #[arg(short, long)]
    pub(crate) batch_size: Option<usize>,
    /// Sets the minimum milliseconds between consecutive batches.
    #[arg(short, long)]
    pub(crate) rate_limit_ms: Option<u64>,
    /// Sets how long the simulated downstream call takes per identifier.
    #[arg(long)]
    pub(crate) process_delay_ms: Option<u64>,
    /// Sets the maximum allowed request line length.
    #[arg(short = 'z', long)]
    pub(crate) max_line_len: Option<usize>,
    /// Enables human-friendly logging.
    #[arg(short, long, default_value_t)]
    pub(crate) debug: bool,
}

impl Args {
    /// Loads the config file, if any, then applies flag overrides.
    pub(crate) fn config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_yaml_file(path)?,
            None => Config::default(),
        };

        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(rate_limit_ms) = self.rate_limit_ms {
            config.rate_limit_ms = rate_limit_ms;
        }
        if let Some(process_delay_ms) = self.process_delay_ms {
            config.process_delay_ms = process_delay_ms;
        }
        if let Some(max_line_len) = self.max_line_len {
            config.max_line_len = max_line_len;
        }

        Ok(config)
    }
}
