//! Runtime configuration for the `wx-api` server.
//!
//! Modeled on `grid-processor::config::GridProcessorConfig`: a plain struct
//! with a `Default`, an env-var overlay, and a `validate`.

use serde::{Deserialize, Serialize};

/// Server-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Listen address for the HTTP server.
    pub listen_addr: String,

    /// Capacity (entries) of the process-wide column-file handle cache.
    pub column_cache_capacity: usize,

    /// Default chunk dimension (locations) used when a shard is written
    /// for the first time.
    pub default_chunk_loc: u32,

    /// Default chunk dimension (timesteps) used when a shard is written
    /// for the first time.
    pub default_chunk_time: u32,

    /// Default scalefactor applied to newly-written variables that don't
    /// specify their own.
    pub default_scalefactor: f32,

    /// Root directory holding one subdirectory per Domain.
    pub domain_root: String,

    /// Number of `spawn_blocking` worker threads available to the Tokio
    /// runtime for the synchronous core.
    pub worker_threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8090".to_string(),
            column_cache_capacity: 256,
            default_chunk_loc: 6000,
            default_chunk_time: 72,
            default_scalefactor: 20.0,
            domain_root: "data".to_string(),
            worker_threads: 4,
        }
    }
}

impl Config {
    /// Overlay environment variables onto [`Config::default`].
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("WX_LISTEN_ADDR") {
            config.listen_addr = val;
        }

        if let Ok(val) = std::env::var("WX_COLUMN_CACHE_CAPACITY") {
            if let Ok(cap) = val.parse() {
                config.column_cache_capacity = cap;
            }
        }

        if let Ok(val) = std::env::var("WX_DEFAULT_CHUNK_LOC") {
            if let Ok(n) = val.parse() {
                config.default_chunk_loc = n;
            }
        }

        if let Ok(val) = std::env::var("WX_DEFAULT_CHUNK_TIME") {
            if let Ok(n) = val.parse() {
                config.default_chunk_time = n;
            }
        }

        if let Ok(val) = std::env::var("WX_DEFAULT_SCALEFACTOR") {
            if let Ok(n) = val.parse() {
                config.default_scalefactor = n;
            }
        }

        if let Ok(val) = std::env::var("WX_DOMAIN_ROOT") {
            config.domain_root = val;
        }

        if let Ok(val) = std::env::var("WX_WORKER_THREADS") {
            if let Ok(n) = val.parse() {
                config.worker_threads = n;
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.column_cache_capacity == 0 {
            return Err("column_cache_capacity must be > 0".to_string());
        }
        if self.default_chunk_loc == 0 {
            return Err("default_chunk_loc must be > 0".to_string());
        }
        if self.default_chunk_time == 0 {
            return Err("default_chunk_time must be > 0".to_string());
        }
        if self.default_scalefactor <= 0.0 {
            return Err("default_scalefactor must be > 0".to_string());
        }
        if self.worker_threads == 0 {
            return Err("worker_threads must be > 0".to_string());
        }
        Ok(())
    }
}
