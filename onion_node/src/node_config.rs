use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::num::{NonZeroU16, ParseIntError};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Error};
use clap::{Arg, ArgMatches, builder::PossibleValue, Command, ValueEnum, value_parser};
use config::{Config, File as CfgFile, FileFormat as CfgFileFormat};
use serde::{de, Deserialize, Deserializer};
use serde_yaml::Value;
use onion::core::config::*;

/// Config for threading.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
pub enum Threads {
    /// Detect number of threads automatically by the number of CPU cores.
    Auto,
    /// Exact number of threads, never zero.
    N(u16)
}

impl FromStr for Threads {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "auto" {
            Ok(Threads::Auto)
        } else {
            NonZeroU16::from_str(s).map(|n| Threads::N(n.get()))
        }
    }
}

/// Specifies where to write logs.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
pub enum LogType {
    Stderr,
    Stdout,
    #[cfg(unix)]
    Syslog,
    None,
}

impl ValueEnum for LogType {
    fn value_variants<'a>() -> &'a [Self] {
        use self::LogType::*;
        #[cfg(unix)]
        return &[Stderr, Stdout, Syslog, None];
        #[cfg(not(unix))]
        return &[Stderr, Stdout, None];
    }

    fn to_possible_value(&self) -> Option<PossibleValue> {
        use self::LogType::*;
        Some(match self {
            Stderr => PossibleValue::new("Stderr"),
            Stdout => PossibleValue::new("Stdout"),
            #[cfg(unix)]
            Syslog => PossibleValue::new("Syslog"),
            None => PossibleValue::new("None")
        })
    }
}

/// What this process runs.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Registry of relays.
    Registry,
    /// Single relay.
    Relay {
        #[serde(rename = "node-id")]
        node_id: u32,
    },
    /// Single user.
    User {
        #[serde(rename = "user-id")]
        user_id: u32,
    },
    /// Registry, relays and users in one process.
    Network {
        relays: u32,
        users: u32,
    },
    /// Ask a running user to send a message and exit.
    Send {
        from: u32,
        to: u32,
        message: String,
    },
}

fn de_threads<'de, D>(deserializer: D) -> Result<Threads, D::Error> where D: Deserializer<'de> {
    let s = String::deserialize(deserializer)?;

    Threads::from_str(&s)
        .map_err(|e| de::Error::custom(format!("threads: {:?}", e)))
}

/// Config parsed from command line arguments or from a config file.
#[derive(Clone, Debug, Deserialize)]
pub struct NodeConfig {
    /// What to run
    pub role: Role,
    /// Host all services listen on
    pub host: IpAddr,
    /// Port of the registry
    #[serde(rename = "registry-port")]
    pub registry_port: u16,
    /// Port of relay `0`
    #[serde(rename = "base-relay-port")]
    pub base_relay_port: u16,
    /// Port of user `0`
    #[serde(rename = "base-user-port")]
    pub base_user_port: u16,
    /// Time to wait for the next hop in milliseconds
    #[serde(rename = "hop-timeout-ms")]
    pub hop_timeout_ms: u64,
    /// Number of threads for execution.
    #[serde(deserialize_with = "de_threads")]
    pub threads: Threads,
    /// Specifies where to write logs.
    #[serde(rename = "log-type")]
    pub log_type: LogType,
    /// Unused fields while parsing config file
    #[serde(flatten)]
    pub unused: HashMap<String, Value>,
}

impl NodeConfig {
    /// Addresses and timeout shared by every service.
    pub fn network(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.host,
            ports: PortLayout {
                registry_port: self.registry_port,
                base_relay_port: self.base_relay_port,
                base_user_port: self.base_user_port,
            },
            hop_timeout: Duration::from_millis(self.hop_timeout_ms),
        }
    }
}

fn create_id_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .help(help)
        .num_args(1)
        .value_parser(value_parser!(u32).range(0..i64::from(MAX_ID)))
        .required(true)
}

fn app() -> Command {
    Command::new(crate_name!())
        .version(crate_version!())
        .about(crate_description!())
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(Command::new("config")
            .about("Load all settings from a config file")
            .arg(Arg::new("cfg-file")
                .index(1)
                .help("Load settings from saved config file. \
                    Config file format is YAML")
                .num_args(1)
                .required(true)))
        .subcommand(Command::new("registry")
            .about("Run the registry"))
        .subcommand(Command::new("relay")
            .about("Run a relay")
            .arg(create_id_arg("node-id", "Id of the relay, it listens on base-relay-port + node-id")))
        .subcommand(Command::new("user")
            .about("Run a user")
            .arg(create_id_arg("user-id", "Id of the user, it listens on base-user-port + user-id")))
        .subcommand(Command::new("network")
            .about("Run the registry, relays and users in one process")
            .arg(Arg::new("relays")
                .long("relays")
                .help("Number of relays")
                .num_args(1)
                .value_parser(value_parser!(u32).range(0..=i64::from(MAX_ID)))
                .default_value("4"))
            .arg(Arg::new("users")
                .long("users")
                .help("Number of users")
                .num_args(1)
                .value_parser(value_parser!(u32).range(0..=i64::from(MAX_ID)))
                .default_value("2")))
        .subcommand(Command::new("send")
            .about("Ask a running user to send a message to another user")
            .arg(create_id_arg("from", "Id of the sending user"))
            .arg(create_id_arg("to", "Id of the recipient user"))
            .arg(Arg::new("message")
                .index(1)
                .help("Message to send")
                .num_args(1)
                .required(true)))
        // here go args shared by all subcommands
        .arg(Arg::new("host")
            .long("host")
            .help("Host all services listen on")
            .num_args(1)
            .global(true)
            .value_parser(value_parser!(IpAddr))
            .default_value("127.0.0.1"))
        .arg(Arg::new("registry-port")
            .long("registry-port")
            .help("Port of the registry")
            .num_args(1)
            .global(true)
            .value_parser(value_parser!(u16))
            .default_value("8080"))
        .arg(Arg::new("base-relay-port")
            .long("base-relay-port")
            .help("Port of relay 0")
            .num_args(1)
            .global(true)
            .value_parser(value_parser!(u16))
            .default_value("4000"))
        .arg(Arg::new("base-user-port")
            .long("base-user-port")
            .help("Port of user 0")
            .num_args(1)
            .global(true)
            .value_parser(value_parser!(u16))
            .default_value("3000"))
        .arg(Arg::new("hop-timeout-ms")
            .long("hop-timeout-ms")
            .help("Time to wait for the next hop in milliseconds")
            .num_args(1)
            .global(true)
            .env("ONION_HOP_TIMEOUT_MS")
            .value_parser(value_parser!(u64).range(1..))
            .default_value("5000"))
        .arg(Arg::new("threads")
            .short('j')
            .long("threads")
            .help("Number of threads to use. The value 'auto' means that the \
                   number of threads will be determined automatically by the \
                   number of CPU cores")
            .num_args(1)
            .global(true)
            .value_parser(value_parser!(Threads))
            .default_value("1"))
        .arg(Arg::new("log-type")
            .short('l')
            .long("log-type")
            .help("Where to write logs")
            .num_args(1)
            .global(true)
            .value_parser(value_parser!(LogType))
            .default_value("Stderr"))
}

/// Parse command line arguments.
pub fn cli_parse() -> Result<NodeConfig, Error> {
    let matches = app().get_matches();
    parse_matches(&matches)
}

fn parse_matches(matches: &ArgMatches) -> Result<NodeConfig, Error> {
    match matches.subcommand() {
        Some(("config", m)) => run_config(m),
        Some((name, m)) => Ok(run_args(parse_role(name, m)?, m)),
        None => bail!("Subcommand is required"),
    }
}

/// Parse settings from a saved file.
fn parse_config(config_path: &str) -> Result<NodeConfig, Error> {
    let config_file = Config::builder()
        .set_default("host", "127.0.0.1")?
        .set_default("registry-port", i64::from(DEFAULT_REGISTRY_PORT))?
        .set_default("base-relay-port", i64::from(DEFAULT_BASE_RELAY_PORT))?
        .set_default("base-user-port", i64::from(DEFAULT_BASE_USER_PORT))?
        .set_default("hop-timeout-ms", DEFAULT_HOP_TIMEOUT.as_millis() as i64)?
        .set_default("threads", "1")?
        .set_default("log-type", "Stderr")?
        .add_source(CfgFile::new(config_path, CfgFileFormat::Yaml))
        .build()
        .with_context(|| format!("Can't build config file {}", config_path))?;

    let config: NodeConfig = config_file.try_deserialize()
        .context("Can't deserialize config")?;

    if config.hop_timeout_ms == 0 {
        bail!("Can't deserialize config: 'hop-timeout-ms' must be positive");
    }

    Ok(config)
}

fn run_config(matches: &ArgMatches) -> Result<NodeConfig, Error> {
    let config_path = matches.get_one::<String>("cfg-file")
        .ok_or_else(|| anyhow!("Config file is required"))?;

    parse_config(config_path)
}

fn parse_role(name: &str, matches: &ArgMatches) -> Result<Role, Error> {
    let id = |arg: &str| matches.get_one::<u32>(arg).copied()
        .ok_or_else(|| anyhow!("Argument '--{}' is required", arg));

    let role = match name {
        "registry" => Role::Registry,
        "relay" => Role::Relay { node_id: id("node-id")? },
        "user" => Role::User { user_id: id("user-id")? },
        "network" => Role::Network { relays: id("relays")?, users: id("users")? },
        "send" => Role::Send {
            from: id("from")?,
            to: id("to")?,
            message: matches.get_one::<String>("message").cloned()
                .ok_or_else(|| anyhow!("Message is required"))?,
        },
        _ => bail!("Unknown subcommand '{}'", name),
    };
    Ok(role)
}

fn run_args(role: Role, matches: &ArgMatches) -> NodeConfig {
    let host = matches.get_one::<IpAddr>("host").copied()
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

    let registry_port = matches.get_one::<u16>("registry-port").copied()
        .unwrap_or(DEFAULT_REGISTRY_PORT);

    let base_relay_port = matches.get_one::<u16>("base-relay-port").copied()
        .unwrap_or(DEFAULT_BASE_RELAY_PORT);

    let base_user_port = matches.get_one::<u16>("base-user-port").copied()
        .unwrap_or(DEFAULT_BASE_USER_PORT);

    let hop_timeout_ms = matches.get_one::<u64>("hop-timeout-ms").copied()
        .unwrap_or(DEFAULT_HOP_TIMEOUT.as_millis() as u64);

    let threads = matches.get_one("threads").copied().unwrap_or(Threads::N(1));

    let log_type = matches.get_one("log-type").copied().unwrap_or(LogType::Stderr);

    NodeConfig {
        role,
        host,
        registry_port,
        base_relay_port,
        base_user_port,
        hop_timeout_ms,
        threads,
        log_type,
        unused: HashMap::new(),
    }
}
