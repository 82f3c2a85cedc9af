use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use datamall_core::{BusDataset, Geospatial, PassengerVolume, ReportPeriod, RuntimeOverrides};

/// Top-level CLI entrypoint.
#[derive(Parser, Debug, Clone)]
#[command(name = "datamall", version, about = "Pull LTA DataMall transit datasets", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Defaults to `pull` when omitted.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Full monthly pull: bus CSVs, then last month's passenger-volume reports.
    Pull,
    /// Fetch one bus dataset and write it as CSV.
    Bus {
        /// service, stop or route.
        #[arg(value_parser = parse_bus_dataset)]
        dataset: BusDataset,
    },
    /// Open the download link of a passenger-volume report.
    #[command(alias = "pv")]
    PassengerVolume {
        /// bus_node, bus_od, train_node or train_od.
        #[arg(value_parser = parse_passenger_volume)]
        dataset: PassengerVolume,

        /// Reporting month as YYYYMM (defaults to the previous month).
        #[arg(long, value_parser = parse_period, value_name = "YYYYMM")]
        period: Option<ReportPeriod>,
    },
    /// Open the download link of a geospatial layer.
    Geospatial {
        /// train_station.
        #[arg(value_parser = parse_geospatial)]
        dataset: Geospatial,

        /// Reporting month as YYYYMM.
        #[arg(long, value_parser = parse_period, value_name = "YYYYMM")]
        period: Option<ReportPeriod>,
    },
    /// Manage the stored DataMall account key.
    #[command(subcommand)]
    Secret(SecretCommand),
}

#[derive(Debug, Clone, Subcommand, PartialEq, Eq)]
pub enum SecretCommand {
    /// Prompt for the account key and store it in the OS keyring.
    Set,
    /// Remove the stored account key.
    #[command(alias = "remove")]
    Clear,
}

/// Options shared by every subcommand.
#[derive(Debug, Clone, Args, Default)]
pub struct GlobalArgs {
    /// Directory the CSV files are written to.
    #[arg(long, global = true, value_hint = ValueHint::DirPath, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Per-request timeout in seconds.
    #[arg(
        long,
        global = true,
        value_name = "SECS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout_secs: Option<u64>,

    /// Override the API base URL.
    #[arg(long, global = true, value_hint = ValueHint::Url, value_name = "URL")]
    pub base_url: Option<String>,

    /// Run every step of a full pull even if some fail.
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub keep_going: bool,

    /// Print report links instead of opening a browser.
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub print_links: bool,
}

impl GlobalArgs {
    pub fn to_runtime_overrides(&self) -> RuntimeOverrides {
        RuntimeOverrides {
            base_url: self.base_url.clone(),
            output_dir: self.output_dir.clone(),
            timeout_secs: self.timeout_secs,
        }
    }
}

fn parse_bus_dataset(value: &str) -> Result<BusDataset, String> {
    value.parse().map_err(|err: datamall_core::DataMallError| err.to_string())
}

fn parse_passenger_volume(value: &str) -> Result<PassengerVolume, String> {
    value.parse().map_err(|err: datamall_core::DataMallError| err.to_string())
}

fn parse_geospatial(value: &str) -> Result<Geospatial, String> {
    value.parse().map_err(|err: datamall_core::DataMallError| err.to_string())
}

fn parse_period(value: &str) -> Result<ReportPeriod, String> {
    value.parse().map_err(|err: datamall_core::DataMallError| err.to_string())
}
