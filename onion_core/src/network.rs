/*! Whole network in one process: the registry, relays and users.
*/

use std::time::Duration;

use futures::future;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::*;
use crate::net::server::{self, ServeError, Service};
use crate::registry::Registry;
use crate::relay::{self, Relay};
use crate::user::{self, User};

/// Error that can happen when launching a network.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Network config is invalid.
    #[error("Invalid config: {0}")]
    Config(ConfigError),
    /// Requested more relays or users than there are ids.
    #[error("Can't launch {relays} relays and {users} users, at most {} of each", MAX_ID)]
    TooMany {
        /// Requested number of relays.
        relays: u32,
        /// Requested number of users.
        users: u32,
    },
    /// Registry failed to start.
    #[error("Start registry error: {0}")]
    Registry(ServeError),
    /// Relay failed to start.
    #[error("Start relay {node_id} error: {error}")]
    Relay {
        /// Node id of the relay.
        node_id: u32,
        /// Startup error.
        error: relay::StartError,
    },
    /// User failed to start.
    #[error("Start user {user_id} error: {error}")]
    User {
        /// User id.
        user_id: u32,
        /// Startup error.
        error: user::StartError,
    },
}

fn spawn_service<S: Service>(name: String, listener: TcpListener, service: S, read_timeout: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = server::serve(listener, service, read_timeout).await {
            error!("{} stopped: {}", name, e);
        }
    })
}

/// Running network. Services are stopped when it's dropped.
pub struct Network {
    registry: Registry,
    relays: Vec<Relay>,
    users: Vec<User>,
    tasks: Vec<JoinHandle<()>>,
}

impl Network {
    /** Start the registry, then `relays` relays registering themselves, then
    `users` users.

    Returns `Error` in case of failure:

    - config is invalid
    - too many relays or users requested
    - any service fails to start
    */
    pub async fn launch(config: NetworkConfig, relays: u32, users: u32) -> Result<Network, LaunchError> {
        config.validate().map_err(LaunchError::Config)?;
        if relays > MAX_ID || users > MAX_ID {
            return Err(LaunchError::TooMany { relays, users });
        }

        let mut network = Network {
            registry: Registry::new(),
            relays: Vec::with_capacity(relays as usize),
            users: Vec::with_capacity(users as usize),
            tasks: Vec::new(),
        };

        let registry_addr = config.registry_addr();
        let listener = server::bind(registry_addr).await
            .map_err(LaunchError::Registry)?;
        info!("Registry is listening on {}", registry_addr);
        network.tasks.push(spawn_service("Registry".to_owned(), listener, network.registry.clone(), config.hop_timeout));

        for node_id in 0..relays {
            let relay = Relay::new(node_id, config);
            let listener = relay.start().await
                .map_err(|error| LaunchError::Relay { node_id, error })?;
            network.tasks.push(spawn_service(format!("Relay {}", node_id), listener, relay.clone(), config.hop_timeout));
            network.relays.push(relay);
        }

        for user_id in 0..users {
            let user = User::new(user_id, config);
            let listener = user.start().await
                .map_err(|error| LaunchError::User { user_id, error })?;
            network.tasks.push(spawn_service(format!("User {}", user_id), listener, user.clone(), config.hop_timeout));
            network.users.push(user);
        }

        info!("Network is running with {} relays and {} users", relays, users);
        Ok(network)
    }

    /// The registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Relays ordered by node id.
    pub fn relays(&self) -> &[Relay] {
        &self.relays
    }

    /// Users ordered by user id.
    pub fn users(&self) -> &[User] {
        &self.users
    }

    /// Wait until every service stops.
    pub async fn wait(mut self) {
        let tasks = std::mem::take(&mut self.tasks);
        future::join_all(tasks).await;
    }
}

impl Drop for Network {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
