#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;

mod node_config;

use anyhow::{anyhow, Context, Error};
use futures::Future;
use itertools::Itertools;
use tokio::runtime;
use onion::core::config::NetworkConfig;
use onion::core::net::client;
use onion::core::network::Network;
use onion::core::registry::Registry;
use onion::core::relay::Relay;
use onion::core::user::User;
use onion::packet::{Request, Response};
#[cfg(unix)]
use syslog::Facility;

use crate::node_config::*;

async fn run_network(config: NetworkConfig, relays: u32, users: u32) -> Result<(), Error> {
    let network = Network::launch(config, relays, users).await?;

    info!(
        "Network is up: registry on {}, relays [{}], users [{}]",
        config.registry_addr(),
        network.relays().iter().map(|relay| relay.node_id()).format(", "),
        network.users().iter().map(|user| user.user_id()).format(", "),
    );

    network.wait().await;
    Ok(())
}

async fn run_send(config: NetworkConfig, from: u32, to: u32, message: String) -> Result<(), Error> {
    let addr = config.user_addr(from)
        .ok_or_else(|| anyhow!("User id {} is out of range", from))?;

    let request = Request::SendMessage { message, destination_user_id: to };
    match client::request(addr, request, config.send_timeout()).await
        .with_context(|| format!("User {} failed to send the message", from))?
    {
        Response::Sent => {
            info!("User {} sent the message to user {}", from, to);
            Ok(())
        },
        response => Err(anyhow!("Unexpected response from user {}: {:?}", from, response)),
    }
}

async fn run_role(config: NodeConfig) -> Result<(), Error> {
    let network = config.network();
    network.validate()?;

    match config.role {
        Role::Registry => {
            info!("Running registry on {}", network.registry_addr());
            Registry::new().run(network.registry_addr(), network.hop_timeout).await?;
        },
        Role::Relay { node_id } => {
            info!("Running relay {}", node_id);
            Relay::new(node_id, network).run().await?;
        },
        Role::User { user_id } => {
            info!("Running user {}", user_id);
            User::new(user_id, network).run().await?;
        },
        Role::Network { relays, users } => run_network(network, relays, users).await?,
        Role::Send { from, to, message } => run_send(network, from, to, message).await?,
    }

    Ok(())
}

fn run<F>(future: F, threads: Threads) -> Result<(), Error>
    where F: Future<Output = Result<(), Error>> + 'static
{
    let mut builder = if threads == Threads::N(1) {
        runtime::Builder::new_current_thread()
    } else {
        let mut builder = runtime::Builder::new_multi_thread();
        match threads {
            Threads::N(n) => { builder.worker_threads(n as usize); },
            Threads::Auto => { }, // builder will detect number of cores automatically
        }
        builder
    };
    let runtime = builder
        .enable_all()
        .build()
        .context("Failed to create runtime")?;
    runtime.block_on(future)
}

fn init_logger(log_type: LogType) -> Result<(), Error> {
    match log_type {
        LogType::Stderr => {
            let env = env_logger::Env::default()
                .filter_or("RUST_LOG", "info");
            env_logger::Builder::from_env(env)
                .init();
        },
        LogType::Stdout => {
            let env = env_logger::Env::default()
                .filter_or("RUST_LOG", "info");
            env_logger::Builder::from_env(env)
                .target(env_logger::fmt::Target::Stdout)
                .init();
        },
        #[cfg(unix)]
        LogType::Syslog => {
            syslog::init(Facility::LOG_USER, log::LevelFilter::Info, None)
                .map_err(|e| anyhow!("Failed to initialize syslog backend: {}", e))?;
        },
        LogType::None => { },
    }
    Ok(())
}

fn main() {
    let config = match cli_parse() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{:#}", e);
            std::process::exit(1);
        },
    };

    if let Err(e) = init_logger(config.log_type) {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }

    for key in config.unused.keys() {
        warn!("Unused configuration key: {:?}", key);
    }

    let threads = config.threads;
    if let Err(e) = run(run_role(config), threads) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

