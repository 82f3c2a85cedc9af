pub mod cli_args;

use std::io::{self, Write};

use chrono::{Local, NaiveDate};
use cli_args::{Cli, Command, GlobalArgs, SecretCommand};
use datamall_core::config::{self, clear_account_key, store_account_key};
use datamall_core::logging::{LoggingDestination, init_logging};
use datamall_core::{
    ApiClient, BusDataset, DataCollector, EnvOverrides, FailurePolicy, LinkOpener, PageSource,
    PassengerVolume, PrintLink, ReportPeriod, StepOutcome, SystemBrowser, load_config,
    resolve_settings,
};
use rpassword::prompt_password;
use tracing::info;

type Collector = DataCollector<ApiClient, Box<dyn LinkOpener>>;

/// Run the parsed command line. Errors are rendered for the terminal.
pub fn run(cli: Cli) -> Result<(), String> {
    if let Err(err) = init_logging(LoggingDestination::FileAndStderr) {
        eprintln!("Warning: file logging unavailable ({err}); continuing without it.");
        let _ = init_logging(LoggingDestination::StderrOnly);
    }

    let today = Local::now().date_naive();
    let mut stdout = io::stdout().lock();
    match cli.command.unwrap_or(Command::Pull) {
        Command::Secret(cmd) => handle_secret_command(cmd),
        Command::Pull => run_pull(&build_collector(&cli.global)?, today, &mut stdout),
        Command::Bus { dataset } => {
            run_bus(&build_collector(&cli.global)?, dataset, today, &mut stdout)
        }
        Command::PassengerVolume { dataset, period } => {
            run_passenger_volume(&build_collector(&cli.global)?, dataset, period, today)
                .map(|_| ())
        }
        Command::Geospatial { dataset, period } => build_collector(&cli.global)?
            .open_geospatial(dataset, period)
            .map(|_| ())
            .map_err(|err| err.to_string()),
    }
}

fn build_collector(global: &GlobalArgs) -> Result<Collector, String> {
    let load = load_config();
    for warning in &load.warnings {
        eprintln!("Warning: {warning}");
    }

    let settings = resolve_settings(
        &load.config,
        &EnvOverrides::from_env(),
        &global.to_runtime_overrides(),
    )
    .map_err(|err| err.to_string())?;
    info!(
        base_url = %settings.client.base_url,
        output_dir = %settings.output_dir.display(),
        timeout_secs = settings.client.timeout.as_secs(),
        "configuration resolved"
    );

    let client = ApiClient::new(&settings.client).map_err(|err| err.to_string())?;
    let opener: Box<dyn LinkOpener> = if global.print_links {
        Box::new(PrintLink)
    } else {
        Box::new(SystemBrowser)
    };
    let policy = if global.keep_going {
        FailurePolicy::KeepGoing
    } else {
        FailurePolicy::FailFast
    };

    Ok(DataCollector::new(client, opener, settings.output_dir).with_policy(policy))
}

/// Full pull with a per-step summary. Any failed step makes the whole command fail.
pub fn run_pull<S: PageSource, O: LinkOpener>(
    collector: &DataCollector<S, O>,
    today: NaiveDate,
    out: &mut dyn Write,
) -> Result<(), String> {
    let report = collector
        .collect_transit_data(today)
        .map_err(|err| err.to_string())?;

    for step in &report.steps {
        let label = step.step.to_string();
        let line = match &step.outcome {
            StepOutcome::Written(path) => format!("ok      {label:<36} {}", path.display()),
            StepOutcome::Opened(link) => format!("ok      {label:<36} {link}"),
            StepOutcome::Failed(err) => format!("FAILED  {label:<36} {err}"),
        };
        writeln!(out, "{line}").map_err(|err| err.to_string())?;
    }

    report.into_result().map(|_| ()).map_err(|err| err.to_string())
}

pub fn run_bus<S: PageSource, O: LinkOpener>(
    collector: &DataCollector<S, O>,
    dataset: BusDataset,
    today: NaiveDate,
    out: &mut dyn Write,
) -> Result<(), String> {
    let path = collector
        .pull_bus_dataset(dataset, today)
        .map_err(|err| err.to_string())?;
    writeln!(out, "Wrote {}", path.display()).map_err(|err| err.to_string())
}

/// Open a passenger-volume report; without `period` the month before `today` is used.
pub fn run_passenger_volume<S: PageSource, O: LinkOpener>(
    collector: &DataCollector<S, O>,
    dataset: PassengerVolume,
    period: Option<ReportPeriod>,
    today: NaiveDate,
) -> Result<String, String> {
    let period = period.unwrap_or_else(|| ReportPeriod::previous_month(today));
    collector
        .open_passenger_volume(dataset, Some(period))
        .map_err(|err| err.to_string())
}

fn handle_secret_command(command: SecretCommand) -> Result<(), String> {
    let load = load_config();
    for warning in load.warnings {
        eprintln!("Warning: {warning}");
    }
    let mut file_config = load.config;

    match command {
        SecretCommand::Set => {
            let key = prompt_password("DataMall account key: ").map_err(|err| err.to_string())?;
            if key.trim().is_empty() {
                return Err("Account key cannot be empty.".into());
            }
            store_account_key(&mut file_config, &key).map_err(|err| err.to_string())?;
            println!(
                "Account key stored; reference saved to {}",
                config::config_path().display()
            );
            Ok(())
        }
        SecretCommand::Clear => {
            if clear_account_key(&mut file_config).map_err(|err| err.to_string())? {
                println!("Account key removed.");
            } else {
                println!("No account key was stored.");
            }
            Ok(())
        }
    }
}
