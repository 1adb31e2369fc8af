//! Configuration for the agent.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

/// How guest interfaces get their host names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NamingMode {
    /// Names come from the `prefix.N` allocator.
    Allocated,
    /// Names come from the nic, or are derived from the guest id.
    Derived,
}

/// Log verbosity accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[value(alias = "warn")]
    Warning,
    Error,
    Critical,
    Fatal,
}

impl LogLevel {
    /// Equivalent `tracing` filter directive.
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error | Self::Critical | Self::Fatal => "error",
        }
    }
}

/// tapbridge agent - attach guest TAP interfaces to Open vSwitch bridges.
#[derive(Debug, Parser)]
#[command(name = "tapbridge-agent")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Listen port.
    #[arg(short, long, env = "TAPBRIDGE_PORT", default_value_t = 40001)]
    pub port: u16,

    /// Listen address.
    #[arg(long, env = "TAPBRIDGE_LISTEN_HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub listen_host: IpAddr,

    /// Bridge to join interfaces to when a nic does not name one.
    #[arg(short, long, env = "TAPBRIDGE_BRIDGE", default_value = "mistify0")]
    pub bridge: String,

    /// Log level (RUST_LOG takes precedence when set).
    #[arg(short, long, env = "TAPBRIDGE_LOG_LEVEL", value_enum, default_value = "warning")]
    pub log_level: LogLevel,

    /// Directory systemd-networkd reads netdev files from.
    #[arg(long, env = "TAPBRIDGE_NETDEV_DIR", default_value = "/etc/systemd/network")]
    pub netdev_dir: PathBuf,

    /// How interface names are chosen.
    #[arg(long, env = "TAPBRIDGE_NAMING", value_enum, default_value = "allocated")]
    pub naming: NamingMode,

    /// Prefix for allocated interface names.
    #[arg(long, env = "TAPBRIDGE_IFACE_PREFIX", default_value = "tap")]
    pub iface_prefix: String,

    /// Upper bound on any single external command, in seconds.
    #[arg(long, env = "TAPBRIDGE_COMMAND_TIMEOUT", default_value_t = 30)]
    pub command_timeout_secs: u64,

    /// Directory listing the host's live interfaces.
    #[arg(long, env = "TAPBRIDGE_SYSFS_NET_DIR", default_value = "/sys/class/net")]
    pub sysfs_net_dir: PathBuf,
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen address.
    pub listen_addr: SocketAddr,

    /// Default bridge.
    pub bridge: String,

    /// Log level.
    pub log_level: LogLevel,

    /// Netdev directory.
    pub netdev_dir: PathBuf,

    /// Interface naming mode.
    pub naming: NamingMode,

    /// Allocator prefix.
    pub iface_prefix: String,

    /// Per-command timeout.
    pub command_timeout: Duration,

    /// Live interface directory.
    pub sysfs_net_dir: PathBuf,
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        Self {
            listen_addr: SocketAddr::new(cli.listen_host, cli.port),
            bridge: cli.bridge,
            log_level: cli.log_level,
            netdev_dir: cli.netdev_dir,
            naming: cli.naming,
            iface_prefix: cli.iface_prefix,
            command_timeout: Duration::from_secs(cli.command_timeout_secs),
            sysfs_net_dir: cli.sysfs_net_dir,
        }
    }
}
