use std::{path::PathBuf, time::Duration};

use clap::Parser;

use crate::store::DiskStore;

#[derive(Debug, Clone, Parser)]
#[command(name = "positivity-tracker", version)]
#[command(about = "Tracks how positive (or negative) you feel")]
pub struct Config {
    /// Address to listen on
    #[arg(long, default_value = "localhost:9000")]
    pub host: String,

    /// Directory holding the counters
    #[arg(long, default_value = "data-dir")]
    pub data_dir: PathBuf,

    /// Bytes of counter values kept in memory
    #[arg(long, default_value_t = DiskStore::DEFAULT_CACHE_SIZE_MAX)]
    pub cache_size_max: usize,

    #[arg(long, default_value_t = 512)]
    pub max_threads: usize,

    /// Seconds an idle keep-alive connection is kept open
    #[arg(long = "idle-timeout", default_value_t = 5)]
    pub idle_timeout_secs: u64,

    /// Seconds to wait for open connections when shutting down
    #[arg(long = "shutdown-timeout", default_value_t = 20)]
    pub shutdown_timeout_secs: u64,

    #[arg(short, long, help = "Enable debug logging")]
    pub verbose: bool,
}

impl Config {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn open_store(&self) -> DiskStore {
        DiskStore::with_cache_size(&self.data_dir, self.cache_size_max)
    }
}
