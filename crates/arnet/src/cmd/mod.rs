use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arnet_catalog::Catalog;
use arnet_peer::{NetworkConnector, DEFAULT_HOST, DEFAULT_PORT};
use clap::{Args, Subcommand};

use crate::exit::{catalog_error, io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod catalog;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect to a device and print what it reports.
    Listen(ListenArgs),
    /// Send one command and print its response.
    Send(SendArgs),
    /// Inspect the message catalog.
    #[command(subcommand)]
    Catalog(CatalogCommand),
    /// Show version information.
    Version(VersionArgs),
}

/// Settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Context {
    pub format: OutputFormat,
    /// Directory of catalog documents replacing the embedded catalog.
    pub catalog_dir: Option<PathBuf>,
}

impl Context {
    pub fn load_catalog(&self) -> CliResult<Catalog> {
        match &self.catalog_dir {
            Some(dir) => Catalog::from_directory(dir)
                .map_err(|err| catalog_error(&format!("loading {}", dir.display()), err)),
            None => Catalog::embedded().map_err(|err| catalog_error("embedded catalog", err)),
        }
    }
}

pub fn run(command: Command, context: &Context) -> CliResult<i32> {
    match command {
        Command::Listen(args) => listen::run(args, context),
        Command::Send(args) => send::run(args, context),
        Command::Catalog(command) => catalog::run(command, context),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct DeviceArgs {
    /// Device address, `host` or `host:port`.
    #[arg(default_value = DEFAULT_HOST)]
    pub device: String,
    /// Keepalive window (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub keepalive: String,
    /// Handshake timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
    /// Controller name announced in the handshake.
    #[arg(long, env = "ARNET_CONTROLLER_NAME")]
    pub controller_name: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Exit after printing N messages or property changes.
    #[arg(long)]
    pub count: Option<usize>,
    /// Print raw messages only, without property changes.
    #[arg(long)]
    pub messages_only: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Device address, `host` or `host:port`.
    pub device: String,
    /// Message path, e.g. `ardrone3.Piloting.TakeOff`.
    pub path: String,
    /// Arguments as JSON: an object by name, an array by position, or a scalar.
    #[arg(long)]
    pub json: Option<String>,
    /// Maximum time to wait for the response (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
    /// Handshake timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
}

#[derive(Subcommand, Debug)]
pub enum CatalogCommand {
    /// List catalog messages.
    List(CatalogListArgs),
    /// Show one message by path.
    Resolve(CatalogResolveArgs),
}

#[derive(Args, Debug)]
pub struct CatalogListArgs {
    /// Only messages of this feature.
    #[arg(long)]
    pub feature: Option<String>,
}

#[derive(Args, Debug)]
pub struct CatalogResolveArgs {
    /// Message path, e.g. `common.Common.AllStates`.
    pub path: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Build a connector for `host[:port]`.
pub fn connector(
    device: &str,
    catalog: Catalog,
    configure: impl FnOnce(NetworkConnector) -> NetworkConnector,
) -> CliResult<NetworkConnector> {
    let (host, port) = parse_device(device)?;
    Ok(configure(NetworkConnector::new(host, port, Arc::new(catalog))))
}

pub fn parse_device(input: &str) -> CliResult<(String, u16)> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "device address must not be empty"));
    }
    // Bracketed IPv6 with port, e.g. [fe80::1]:44444.
    if let Some(rest) = input.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| CliError::new(USAGE, format!("invalid device address: {input}")))?;
        let port = match tail.strip_prefix(':') {
            Some(port) => parse_port(port, input)?,
            None if tail.is_empty() => DEFAULT_PORT,
            None => return Err(CliError::new(USAGE, format!("invalid device address: {input}"))),
        };
        return Ok((host.to_string(), port));
    }
    match input.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => Ok((host.to_string(), parse_port(port, input)?)),
        _ => Ok((input.to_string(), DEFAULT_PORT)),
    }
}

fn parse_port(port: &str, input: &str) -> CliResult<u16> {
    port.parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid port in device address: {input}")))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

/// Multi-threaded runtime for the async subcommands.
pub fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))
}
