use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::domain::pool::{DEFAULT_BUFFER_SIZE, DEFAULT_POOL_CAPACITY};
use crate::domain::{JoinPolicy, ProxyError, Result};

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

#[derive(Parser, Debug, Default)]
#[clap(version = env!("DUOPROXY_VERSION"), about = "HTTP and SOCKS5 forward proxy")]
pub struct Opts {
    /// Serve HTTP and SOCKS5 on this address
    #[clap(long, short = 'b')]
    pub bind: Option<String>,

    /// Serve HTTP only on this address
    #[clap(long)]
    pub http: Option<String>,

    /// Serve SOCKS5 only on this address
    #[clap(long)]
    pub socks: Option<String>,

    /// Configuration file, created with defaults if missing
    #[clap(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Size in bytes of each relay buffer
    #[clap(long)]
    pub buffer_size: Option<usize>,

    /// Idle relay buffers kept for reuse
    #[clap(long)]
    pub pool_capacity: Option<usize>,

    /// symmetric or asymmetric
    #[clap(long)]
    pub join_policy: Option<JoinPolicy>,

    /// Drop Accept-Encoding from forwarded requests
    #[clap(long)]
    pub strip_accept_encoding: bool,

    /// Give up dialing a destination after this many milliseconds
    #[clap(long)]
    pub dial_timeout_ms: Option<u64>,
}

/// Which protocols a listener accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenMode {
    Mixed,
    Http,
    Socks5,
}

impl ListenMode {
    pub fn name(&self) -> &'static str {
        match self {
            ListenMode::Mixed => "HTTP+SOCKS5",
            ListenMode::Http => "HTTP",
            ListenMode::Socks5 => "SOCKS5",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub mode: ListenMode,
    pub addr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub bind: String,
    pub http: Option<String>,
    pub socks: Option<String>,
    pub buffer_size: usize,
    pub pool_capacity: usize,
    pub join_policy: JoinPolicy,
    pub strip_accept_encoding: bool,
    pub dial_timeout_ms: Option<u64>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            http: None,
            socks: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            join_policy: JoinPolicy::default(),
            strip_accept_encoding: false,
            dial_timeout_ms: None,
        }
    }
}

impl ProxyConfig {
    /// Load the file named by `--config` (if any) and apply the command line on top.
    pub fn load(opts: &Opts) -> Result<Self> {
        let mut config = match &opts.config {
            Some(path) => confy::load_path::<ProxyConfig>(path)
                .map_err(|e| ProxyError::Config(format!("{}: {}", path.display(), e)))?,
            None => ProxyConfig::default(),
        };
        config.apply(opts);
        Ok(config)
    }

    pub fn apply(&mut self, opts: &Opts) {
        if let Some(bind) = &opts.bind {
            self.bind = bind.clone();
        }
        if opts.http.is_some() {
            self.http = opts.http.clone();
        }
        if opts.socks.is_some() {
            self.socks = opts.socks.clone();
        }
        if let Some(size) = opts.buffer_size {
            self.buffer_size = size;
        }
        if let Some(capacity) = opts.pool_capacity {
            self.pool_capacity = capacity;
        }
        if let Some(policy) = opts.join_policy {
            self.join_policy = policy;
        }
        if opts.strip_accept_encoding {
            self.strip_accept_encoding = true;
        }
        if opts.dial_timeout_ms.is_some() {
            self.dial_timeout_ms = opts.dial_timeout_ms;
        }
    }

    pub fn dial_timeout(&self) -> Option<Duration> {
        self.dial_timeout_ms.map(Duration::from_millis)
    }

    /// Split listeners when `http` or `socks` is set, otherwise one mixed listener on `bind`.
    pub fn listeners(&self) -> Vec<Endpoint> {
        if self.http.is_none() && self.socks.is_none() {
            return vec![Endpoint {
                mode: ListenMode::Mixed,
                addr: self.bind.clone(),
            }];
        }

        let mut listeners = Vec::new();
        if let Some(addr) = &self.http {
            listeners.push(Endpoint {
                mode: ListenMode::Http,
                addr: addr.clone(),
            });
        }
        if let Some(addr) = &self.socks {
            listeners.push(Endpoint {
                mode: ListenMode::Socks5,
                addr: addr.clone(),
            });
        }
        listeners
    }
}
