//! CLI argument definitions for parcelport.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `carriers` | List configured carriers, capabilities and requirements |
//! | `track` | Track a parcel through one carrier |
//! | `ship` | Run the label workflow for a parcels file |
//! | `classify` | Show how a status or transport failure is classified |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--config` | none | JSON configuration file |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--verbose` | `false` | Debug logging on stderr |
//! | `--log-json` | `false` | Log as JSON lines |
//!
//! # Examples
//!
//! ```bash
//! parcelport --config parcelport.json carriers --pretty
//! parcelport --config parcelport.json track postnl 3SABCD1234567
//! parcelport --config parcelport.json ship postnl --input parcels.json --format zpl
//! parcelport classify --status 429 --header retry-after=30
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "parcelport",
    author,
    version,
    about = "Carrier-neutral shipping CLI",
    long_about = "parcelport talks to logistics carriers through one canonical set of \
operations. Carriers are declared in a JSON configuration file; credentials are read \
from the environment variables each carrier names."
)]
pub struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Log at debug level (overrides RUST_LOG).
    #[arg(long, short = 'v', global = true, default_value_t = false)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true, default_value_t = false)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List configured carriers with capabilities and requirements.
    Carriers,
    /// Track a parcel.
    Track(TrackArgs),
    /// Create shipment, parcels and labels for a parcels file.
    Ship(ShipArgs),
    /// Print the classified error for an HTTP status or transport failure.
    Classify(ClassifyArgs),
}

#[derive(Debug, Args)]
pub struct TrackArgs {
    /// Carrier id from the configuration.
    pub carrier: String,
    pub tracking_number: String,
}

#[derive(Debug, Args)]
pub struct ShipArgs {
    /// Carrier id from the configuration.
    pub carrier: String,

    /// JSON file with `sender`, optional `reference`, and `parcels`.
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long, value_enum, default_value_t = LabelFormatArg::Pdf)]
    pub format: LabelFormatArg,

    /// Record intermediate results in memory and print them with the outcome.
    #[arg(long, default_value_t = false)]
    pub dry_store: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LabelFormatArg {
    Pdf,
    Zpl,
    Png,
}

#[derive(Debug, Args)]
#[command(group(
    clap::ArgGroup::new("failure")
        .required(true)
        .args(["status", "transport"])
))]
pub struct ClassifyArgs {
    /// HTTP status returned by the carrier.
    #[arg(long)]
    pub status: Option<u16>,

    /// Response header as `name=value`; repeatable.
    #[arg(long = "header", requires = "status")]
    pub headers: Vec<String>,

    /// Response body.
    #[arg(long, requires = "status")]
    pub body: Option<String>,

    /// Transport failure kind.
    #[arg(long, value_enum)]
    pub transport: Option<TransportKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    Connect,
    Dns,
    Timeout,
    Interrupted,
    TokenExchange,
    Request,
}
