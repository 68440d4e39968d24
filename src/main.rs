// src/main.rs

//! A probe for connection URLs: builds the shared session for a URL, reports what
//! was reached, then releases it.

use anyhow::{Result, anyhow};
use clusterlink::config::Config;
use clusterlink::core::driver::TcpDriver;
use clusterlink::core::metrics;
use clusterlink::{SessionCache, SessionKey};
use std::env;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, prelude::*, reload};

const USAGE: &str = "Usage: clusterlink [--config path] [--set key=value]... <url>";

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().skip(1).collect();

    if args.contains(&"--version".to_string()) {
        println!("clusterlink version {VERSION}");
        return Ok(());
    }

    let mut config_path = None;
    let mut overrides = Vec::new();
    let mut url = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                config_path = Some(iter.next().ok_or_else(|| anyhow!("--config flag requires a value"))?)
            }
            "--set" => {
                let pair = iter.next().ok_or_else(|| anyhow!("--set flag requires key=value"))?;
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| anyhow!("Invalid override '{pair}', expected key=value"))?;
                overrides.push((key.to_string(), value.to_string()));
            }
            other if url.is_none() && !other.starts_with("--") => url = Some(other.to_string()),
            other => {
                eprintln!("Unexpected argument '{other}'\n{USAGE}");
                std::process::exit(1);
            }
        }
    }
    let Some(url) = url else {
        eprintln!("{USAGE}");
        std::process::exit(1);
    };

    let config = match config_path {
        Some(path) => match Config::from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load configuration from \"{path}\": {e:#}");
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    // RUST_LOG takes precedence over the configured level.
    let initial_log_level = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    let (filter, _reload_handle) = reload::Layer::new(EnvFilter::new(initial_log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact().with_ansi(true))
        .init();

    let cache = SessionCache::from_config(Arc::new(TcpDriver), &config);
    let key = SessionKey::new(url, overrides);

    match cache.connect(key).await {
        Ok(lease) => {
            let session = lease.session();
            info!(
                "Reached {}/{} contact points (keyspace {:?})",
                session.open_connections(),
                session.spec().contact_points().len(),
                session.keyspace()
            );
            if let Some(policy) = session.spec().load_balancing_policy() {
                info!("Load balancing policy: {}", policy);
            }
            let outcome = lease.release();
            info!("Released session: {:?}", outcome);
        }
        Err(e) => {
            error!("Failed to connect: {}", e);
            return Err(e.into());
        }
    }

    if config.metrics.enabled {
        print!("{}", metrics::gather_metrics());
    }
    Ok(())
}
