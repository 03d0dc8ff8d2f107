use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use commlink_client::{Endpoint, HeaderFormat, TransportConfig};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod connect;
pub mod send;
pub mod version;

/// Port the reference servers listen on.
pub const DEFAULT_PORT: u16 = 2021;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect and chat interactively over stdin.
    Connect(ConnectArgs),
    /// Send a single envelope.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Connect(args) => connect::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum HeaderArg {
    /// 4-byte little-endian length.
    Binary,
    /// 12-byte right-aligned decimal length.
    Decimal,
}

impl From<HeaderArg> for HeaderFormat {
    fn from(arg: HeaderArg) -> Self {
        match arg {
            HeaderArg::Binary => HeaderFormat::Binary,
            HeaderArg::Decimal => HeaderFormat::Decimal,
        }
    }
}

#[derive(Args, Debug)]
pub struct ServerArgs {
    /// Server host name or IP address.
    #[arg(env = "COMMLINK_HOST")]
    pub host: String,
    /// Server TCP port.
    #[arg(long, short = 'p', default_value_t = DEFAULT_PORT, env = "COMMLINK_PORT")]
    pub port: u16,
    /// Length header encoding the server expects.
    #[arg(long, value_enum, default_value = "binary", env = "COMMLINK_HEADER")]
    pub header: HeaderArg,
    /// Receive poll interval (e.g. 1s, 250ms).
    #[arg(long, default_value = "1000ms", env = "COMMLINK_POLL_INTERVAL")]
    pub poll_interval: String,
    /// TCP connect timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
}

impl ServerArgs {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }

    pub fn transport_config(&self) -> CliResult<TransportConfig> {
        let mut config = TransportConfig::default()
            .with_poll_interval(parse_duration(&self.poll_interval)?);
        config.frame.header_format = self.header.into();
        config.connect_timeout = Some(parse_duration(&self.connect_timeout)?);
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct ConnectArgs {
    #[command(flatten)]
    pub server: ServerArgs,
    /// Request a UDP channel right after connecting.
    #[arg(long)]
    pub udp: bool,
    /// User info JSON sent as `update_user` after connecting.
    #[arg(long, value_name = "JSON")]
    pub user: Option<String>,
    /// Status JSON sent as `update_status` after connecting.
    #[arg(long, value_name = "JSON")]
    pub status: Option<String>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub server: ServerArgs,
    /// Envelope data.
    #[arg(long)]
    pub data: String,
    /// Envelope action.
    #[arg(long, default_value = "data")]
    pub action: String,
    /// Wait for one inbound message and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Reject anything that is not a JSON document.
pub fn require_json(flag: &str, value: &str) -> CliResult<()> {
    serde_json::from_str::<serde_json::Value>(value)
        .map(|_| ())
        .map_err(|err| CliError::new(USAGE, format!("{flag} is not valid JSON: {err}")))
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

    Ok(match unit {
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    })
}
