//! Startup configuration: the closed set of environment variables, bound
//! via `clap`'s `env` attribute so each can equally be passed as a flag or
//! exported in the shell.

use clap::builder::BoolishValueParser;
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "vivesync-broker", about = "UDP pub/sub command broker for LAN telemetry and annotation routing")]
pub struct Args {
    /// UDP port to listen on, all IPv4 interfaces.
    #[arg(long, env = "BROKER_PORT")]
    pub port: u16,

    /// Disables gzip framing on the wire.
    #[arg(long, env = "PLAIN_MODE", default_value_t = false, value_parser = BoolishValueParser::new())]
    pub plain_mode: bool,

    /// Enables logging to `log_file`.
    #[arg(long, env = "LOG_MESSAGES", default_value_t = true, value_parser = BoolishValueParser::new())]
    pub log_messages: bool,

    /// Log file path; only consulted when `log_messages` is set.
    #[arg(long, env = "LOG_FILE_NAME")]
    pub log_file: Option<PathBuf>,

    /// Enables CSV persistence of set/update/msg commands.
    #[arg(long, env = "PERSIST_EVENTS", default_value_t = false, value_parser = BoolishValueParser::new())]
    pub persist_events: bool,

    /// Target directory for CSV persistence files.
    #[arg(long, env = "PERSIST_FOLDER", default_value = ".")]
    pub persist_folder: PathBuf,

    /// Prefix token for persistence filenames (see broker-server::persist).
    #[arg(long, env = "PERSIST_PREFIX", default_value = "study")]
    pub persist_prefix: String,

    #[command(flatten)]
    pub empatica: EmpaticaConfig,

    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,
}

/// The Empatica E4 streaming server stays an external collaborator: these
/// two fields round out the closed env-var set, but no TCP client is wired
/// to them yet.
#[derive(Debug, Clone, Parser)]
pub struct EmpaticaConfig {
    #[arg(long, env = "E4_SERVER_ADDRESS")]
    pub e4_server_address: Option<String>,

    #[arg(long, env = "E4_SERVER_PORT")]
    pub e4_server_port: Option<u16>,
}

impl Args {
    pub fn persist_config(&self) -> crate::persist::PersistConfig {
        crate::persist::PersistConfig {
            enabled: self.persist_events,
            folder: self.persist_folder.clone(),
            prefix: self.persist_prefix.clone(),
        }
    }
}
