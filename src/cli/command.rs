use std::collections::BTreeMap;
use std::time::Duration;

use bon::Builder;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::level_filters::LevelFilter;

use crate::cli::control::ControlArgs;
use crate::cli::offline::DecodeArgs;
use crate::cli::status::StatusArgs;
use crate::cli::watch::WatchArgs;
use crate::decode::CalStateMode;
use crate::engine::{EngineConfig, ZoneName};
use crate::error::{CliConfigError, FixtureError};
use crate::link::{ConnectorSpec, DEFAULT_BAUD_RATE, FakeFrames, FakeLinkConfig, LinkConfig};
use crate::protocol::ProtocolFamily;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Command-line options for the zone bridge.
#[derive(Debug, Parser)]
#[command(
    name = "zonelink",
    about = "Mirror and control lighting-bus and audio-matrix zones."
)]
pub struct Args {
    /// Controller protocol family (`lighting` or `audio`).
    #[arg(long, global = true, default_value_t = ProtocolFamily::Lighting)]
    family: ProtocolFamily,
    /// Serial device path, e.g. `/dev/ttyUSB0`.
    #[arg(long, global = true, conflicts_with_all = ["tcp", "fake"])]
    serial: Option<String>,
    /// Serial speed in baud.
    #[arg(long, global = true, requires = "serial")]
    baud: Option<u32>,
    /// TCP address of a serial-to-network adapter, e.g. `10.0.0.5:4001`.
    #[arg(long, global = true, conflicts_with = "fake")]
    tcp: Option<String>,
    /// Uses the in-memory fake link.
    #[arg(long, global = true)]
    fake: bool,
    /// Frames the fake device sends after every connect, separated by `;`.
    #[arg(long, global = true, requires = "fake")]
    fake_frames: Option<FakeFrames>,
    /// Delay before each fake device frame (e.g. `50ms`).
    #[arg(long, global = true, requires = "fake", value_parser = parse_duration)]
    fake_frame_delay: Option<Duration>,
    /// Number of configured zones. Defaults to the family maximum.
    #[arg(long, global = true)]
    zones: Option<u16>,
    /// Display name for one zone as `ZONE=LABEL`. May be repeated.
    #[arg(long = "zone-name", global = true)]
    zone_names: Vec<ZoneName>,
    /// How lighting on/off pairs other than `01` and `10` are read.
    #[arg(long, global = true, default_value_t = CalStateMode::Distinct)]
    cal_mode: CalStateMode,
    /// Upper bound for one outbound write (e.g. `500ms`).
    #[arg(long, global = true, value_parser = parse_duration)]
    send_timeout: Option<Duration>,
    /// How long to wait for the link to come up (e.g. `10s`).
    #[arg(long, global = true, value_parser = parse_duration)]
    connect_timeout: Option<Duration>,
    /// Overrides the `RUST_LOG` filter.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Output format. Defaults to `pretty` on a terminal and `json` otherwise.
    #[arg(long, global = true, value_enum)]
    output_format: Option<OutputFormat>,
    #[command(subcommand)]
    command: Command,
}

impl Args {
    /// Creates argument values directly without CLI parsing.
    ///
    /// ```
    /// use zonelink::{Args, CliCommand, ProtocolFamily, StatusArgs};
    ///
    /// let args = Args::new(ProtocolFamily::Audio, CliCommand::Status(StatusArgs::default()));
    /// let _ = args;
    /// ```
    #[must_use]
    pub fn new(family: ProtocolFamily, command: Command) -> Self {
        Self {
            family,
            serial: None,
            baud: None,
            tcp: None,
            fake: false,
            fake_frames: None,
            fake_frame_delay: None,
            zones: None,
            zone_names: Vec::new(),
            cal_mode: CalStateMode::default(),
            send_timeout: None,
            connect_timeout: None,
            log_level: None,
            output_format: None,
            command,
        }
    }

    /// Selects the fake link with pre-parsed fixtures.
    #[must_use]
    pub fn with_fake(mut self, fake: FakeArgs) -> Self {
        let FakeArgs {
            frames,
            frame_delay,
        } = fake;

        self.fake = true;
        self.fake_frames = frames;
        self.fake_frame_delay = Some(frame_delay);
        self
    }

    /// Limits the configured zones to the first `zones` of the family.
    #[must_use]
    pub fn with_zones(mut self, zones: u16) -> Self {
        self.zones = Some(zones);
        self
    }

    /// Adds a display name for one zone.
    #[must_use]
    pub fn with_zone_name(mut self, zone: u16, label: impl Into<String>) -> Self {
        self.zone_names.push(ZoneName {
            zone,
            label: label.into(),
        });
        self
    }

    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    #[must_use]
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.output_format
    }

    /// Splits parsed CLI arguments into the command and the bridge settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the zone configuration is inconsistent.
    pub fn into_command_and_settings(self) -> anyhow::Result<(Command, BridgeSettings)> {
        let Args {
            family,
            serial,
            baud,
            tcp,
            fake,
            fake_frames,
            fake_frame_delay,
            zones,
            zone_names,
            cal_mode,
            send_timeout,
            connect_timeout,
            log_level: _,
            output_format: _,
            command,
        } = self;

        let zone_names: BTreeMap<u16, String> = zone_names
            .into_iter()
            .map(|ZoneName { zone, label }| (zone, label))
            .collect();
        let engine = EngineConfig::builder()
            .family(family)
            .zone_count(zones.unwrap_or_else(|| family.metadata().max_zones()))
            .zone_names(zone_names)
            .cal_mode(cal_mode)
            .build();
        engine.validate()?;

        let link = match (serial, tcp, fake) {
            (Some(path), _, _) => Some(ConnectorSpec::Serial {
                path,
                baud_rate: baud.unwrap_or(DEFAULT_BAUD_RATE),
            }),
            (None, Some(address), _) => Some(ConnectorSpec::Tcp { address }),
            (None, None, true) => Some(ConnectorSpec::Fake(
                FakeLinkConfig::builder()
                    .maybe_frames(fake_frames)
                    .maybe_frame_delay(fake_frame_delay)
                    .build(),
            )),
            (None, None, false) => None,
        };
        let link_config = LinkConfig::builder()
            .maybe_send_timeout(send_timeout)
            .build();

        Ok((
            command,
            BridgeSettings {
                engine,
                link,
                link_config,
                connect_timeout: connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            },
        ))
    }
}

/// Everything needed to start a bridge, resolved from the command line.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    engine: EngineConfig,
    link: Option<ConnectorSpec>,
    link_config: LinkConfig,
    connect_timeout: Duration,
}

impl BridgeSettings {
    /// Creates settings for a validated engine configuration.
    ///
    /// ```
    /// use zonelink::{BridgeSettings, ConnectorSpec, EngineConfig, ProtocolFamily};
    ///
    /// let engine = EngineConfig::builder()
    ///     .family(ProtocolFamily::Audio)
    ///     .zone_count(6)
    ///     .build();
    /// let settings = BridgeSettings::new(engine)
    ///     .with_link(ConnectorSpec::Tcp { address: "127.0.0.1:4001".into() });
    /// assert!(settings.link().is_some());
    /// ```
    #[must_use]
    pub fn new(engine: EngineConfig) -> Self {
        Self {
            engine,
            link: None,
            link_config: LinkConfig::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_link(mut self, link: ConnectorSpec) -> Self {
        self.link = Some(link);
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    #[must_use]
    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    #[must_use]
    pub fn link(&self) -> Option<&ConnectorSpec> {
        self.link.as_ref()
    }

    #[must_use]
    pub fn link_config(&self) -> &LinkConfig {
        &self.link_config
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub(crate) fn require_link(&self) -> Result<ConnectorSpec, CliConfigError> {
        self.link.clone().ok_or(CliConfigError::MissingLink)
    }
}

/// Fake link arguments for programmatic runs.
#[derive(Debug, Default, Builder)]
pub struct FakeArgs {
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    frames: Option<FakeFrames>,
    #[builder(default)]
    frame_delay: Duration,
}

/// Supported CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect and print every zone change until the limit or Ctrl+C.
    Watch(WatchArgs),
    /// Connect, wait for every zone to report, then print the zone table.
    Status(StatusArgs),
    /// Connect and send one command.
    Control(ControlArgs),
    /// Print the frames a control action would send, without connecting.
    Encode(ControlArgs),
    /// Decode inbound frames without connecting.
    Decode(DecodeArgs),
}

impl Command {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Watch(_args) => "watch",
            Self::Status(_args) => "status",
            Self::Control(_args) => "control",
            Self::Encode(_args) => "encode",
            Self::Decode(_args) => "decode",
        }
    }
}

/// Log verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Converts to the equivalent tracing level filter.
    #[must_use]
    pub fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::OFF,
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

/// Output rendering selected by `--output-format`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Tables and coloured text for humans.
    Pretty,
    /// Machine-readable JSON.
    Json,
}

pub(crate) fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}
