use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use duoproxy::app;
use duoproxy::config::{Opts, ProxyConfig};

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let opts = Opts::parse();
    info!("duoproxy {}", env!("DUOPROXY_VERSION"));

    // Every tunnel holds two sockets.
    match rlimit::increase_nofile_limit(u64::MAX) {
        Ok(limit) => debug!("Open file limit is {}", limit),
        Err(e) => warn!("Could not raise open file limit: {}", e),
    }

    let config = match ProxyConfig::load(&opts) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = app::run(config).await {
        error!("{}", e);
        std::process::exit(1);
    }
}
