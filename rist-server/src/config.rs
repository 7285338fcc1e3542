use std::fs::read_to_string;
use std::net::SocketAddr;

use clap::Parser;
use serde::Deserialize;
use service::config::PeerConfig;

#[derive(Deserialize, Debug)]
pub struct Rist {
    /// listen address
    ///
    /// the UDP socket this node binds. Data and control traffic for every
    /// configured peer share this one socket.
    #[serde(default = "Rist::listen")]
    pub listen: SocketAddr,

    /// which profile this node speaks: "simple" (bare RTP, no GRE envelope,
    /// no OOB/keep-alive/compression) or "main" (the full framing).
    #[serde(default)]
    pub profile: Profile,

    /// thread number
    ///
    /// the tokio runtime's worker count; defaults to the number of CPU
    /// cores, matching how the socket loop scales with them.
    #[serde(default = "num_cpus::get")]
    pub threads: usize,

    /// stats reporting interval, in milliseconds.
    #[serde(default = "Rist::stats_interval_ms")]
    pub stats_interval_ms: u64,
}

impl Rist {
    fn listen() -> SocketAddr {
        "0.0.0.0:5000".parse().unwrap()
    }

    fn stats_interval_ms() -> u64 {
        1000
    }
}

impl Default for Rist {
    fn default() -> Self {
        Self {
            listen: Self::listen(),
            profile: Profile::default(),
            threads: num_cpus::get(),
            stats_interval_ms: Self::stats_interval_ms(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Simple,
    #[default]
    Main,
}

impl From<Profile> for codec::header::Profile {
    fn from(value: Profile) -> Self {
        match value {
            Profile::Simple => codec::header::Profile::Simple,
            Profile::Main => codec::header::Profile::Main,
        }
    }
}

#[derive(Deserialize, Debug)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match *self {
            Self::Error => log::Level::Error,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct Log {
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(default)]
    pub rist: Rist,
    #[serde(default)]
    pub log: Log,

    /// one entry per remote peer this node connects to or accepts from.
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
}

#[derive(Parser)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
)]
struct Cli {
    /// specify the configuration file path.
    #[arg(long)]
    config: Option<String>,
}

impl Config {
    /// Loads command-line parameters; if a configuration file path is
    /// specified, configuration is read from it, otherwise defaults apply.
    pub fn load() -> anyhow::Result<Self> {
        let cfg_str = Cli::parse()
            .config
            .and_then(|path| read_to_string(path).ok())
            .unwrap_or_default();

        Ok(toml::from_str(&cfg_str)?)
    }
}
