//! Core library for pulling LTA DataMall transit datasets into CSV files and report links.

pub mod browser;
pub mod client;
pub mod collector;
pub mod config;
pub mod dataset;
pub mod error;
pub mod export;
pub mod fetch;
pub mod logging;
pub mod period;
pub mod secret_store;

pub use browser::{LinkOpener, PrintLink, SystemBrowser};
pub use client::{ApiClient, ClientSettings, PageSource, Record};
pub use collector::{
    DataCollector, FailurePolicy, PullReport, PullStep, StepOutcome, StepReport, monthly_plan,
};
pub use config::{
    ConfigLoadResult, ConfigSource, EnvOverrides, FileConfig, ResolvedSettings, RuntimeOverrides,
    load_config, resolve_settings,
};
pub use dataset::{BusDataset, Geospatial, PassengerVolume};
pub use error::DataMallError;
pub use export::{csv_file_name, write_dataset_csv};
pub use fetch::{fetch_all, fetch_report_link};
pub use period::ReportPeriod;
pub use secret_store::{SecretReference, SecretStore};
