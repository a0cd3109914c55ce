//! # WEDOS IP Ranges CLI
//!
//! Fetches the WEDOS Global prefix list once, or keeps it refreshed and prints
//! every new snapshot until interrupted.
//!
//! Usage:
//!   wedos-ip --once
//!   wedos-ip [--config FILE] [--interval 1h] [--timeout 10s] [--url URL]

use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wedos_ip::{
    parse_duration, HttpFetcher, NetworkPrefix, PrefixFetcher, Provisioner, RefreshConfig,
    RefresherState, WedosIpRange, WEDOS_IPS_URL,
};

#[derive(Parser)]
#[command(name = "wedos-ip")]
#[command(about = "Fetch and track WEDOS Global IP ranges", long_about = None)]
struct Cli {
    /// Config file (JSON if it ends in .json, directive block otherwise)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Prefix list URL
    #[arg(long, default_value = WEDOS_IPS_URL)]
    url: String,

    /// Refresh interval, overrides the config file
    #[arg(long, value_parser = parse_duration)]
    interval: Option<Duration>,

    /// Per-fetch timeout, overrides the config file
    #[arg(long, value_parser = parse_duration)]
    timeout: Option<Duration>,

    /// Fetch once, print and exit
    #[arg(long)]
    once: bool,
}

fn print_prefixes(prefixes: &[NetworkPrefix]) {
    for prefix in prefixes {
        println!("{}", prefix);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RefreshConfig::load(path)?,
        None => RefreshConfig::default(),
    };
    if cli.interval.is_some() {
        config.interval = cli.interval;
    }
    if cli.timeout.is_some() {
        config.timeout = cli.timeout;
    }
    config.validate()?;

    if cli.once {
        let fetcher = HttpFetcher::new(cli.url, config.effective_timeout())?;
        let prefixes = fetcher.fetch(&CancellationToken::new()).await?;
        print_prefixes(&prefixes);
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let mut module = WedosIpRange::with_config(config).with_source_url(cli.url);
    module.provision(cancel.clone())?;

    if let Some(mut states) = module.subscribe() {
        states
            .wait_for(|state| {
                matches!(state, RefresherState::Steady | RefresherState::Terminated)
            })
            .await?;
    }

    let mut shown = module.prefixes();
    print_prefixes(&shown);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut poll = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = poll.tick() => {
                let current = module.prefixes();
                if !Arc::ptr_eq(&current, &shown) {
                    println!();
                    print_prefixes(&current);
                    shown = current;
                }
            }
        }
    }

    info!("Shutting down");
    cancel.cancel();
    module.wait_terminated().await;

    Ok(())
}
