//! Sequencing of a full monthly pull.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::browser::LinkOpener;
use crate::client::PageSource;
use crate::dataset::{BusDataset, Geospatial, PassengerVolume};
use crate::error::DataMallError;
use crate::export::write_dataset_csv;
use crate::fetch::{fetch_all, fetch_report_link};
use crate::period::ReportPeriod;

/// What to do when one step of a full pull fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop at the first failing step and return its error.
    #[default]
    FailFast,
    /// Run every step and report the failures at the end.
    KeepGoing,
}

/// One unit of work in [`DataCollector::collect_transit_data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullStep {
    Bus(BusDataset),
    PassengerVolume(PassengerVolume, ReportPeriod),
}

impl fmt::Display for PullStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PullStep::Bus(dataset) => write!(f, "bus {}", dataset.key()),
            PullStep::PassengerVolume(dataset, period) => {
                write!(f, "passenger volume {} ({period})", dataset.key())
            }
        }
    }
}

#[derive(Debug)]
pub enum StepOutcome {
    Written(PathBuf),
    Opened(String),
    Failed(DataMallError),
}

#[derive(Debug)]
pub struct StepReport {
    pub step: PullStep,
    pub outcome: StepOutcome,
}

#[derive(Debug, Default)]
pub struct PullReport {
    pub steps: Vec<StepReport>,
}

impl PullReport {
    pub fn failures(&self) -> usize {
        self.steps
            .iter()
            .filter(|report| matches!(report.outcome, StepOutcome::Failed(_)))
            .count()
    }

    /// `PartialFailure` if any step failed, otherwise the report itself.
    pub fn into_result(self) -> Result<Self, DataMallError> {
        let failed = self.failures();
        if failed == 0 {
            Ok(self)
        } else {
            Err(DataMallError::PartialFailure {
                failed,
                total: self.steps.len(),
            })
        }
    }
}

/// The steps of a full pull for the given day: the three bus datasets, then the four
/// passenger-volume reports for the previous calendar month.
pub fn monthly_plan(today: NaiveDate) -> Vec<PullStep> {
    let period = ReportPeriod::previous_month(today);
    BusDataset::ALL
        .into_iter()
        .map(PullStep::Bus)
        .chain(
            PassengerVolume::ALL
                .into_iter()
                .map(|dataset| PullStep::PassengerVolume(dataset, period)),
        )
        .collect()
}

pub struct DataCollector<S, O> {
    source: S,
    opener: O,
    output_dir: PathBuf,
    policy: FailurePolicy,
}

impl<S: PageSource, O: LinkOpener> DataCollector<S, O> {
    pub fn new(source: S, opener: O, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            opener,
            output_dir: output_dir.into(),
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Fetch every page of a bus dataset and write it as `<label>_<YYYYMM>.csv`.
    pub fn pull_bus_dataset(
        &self,
        dataset: BusDataset,
        today: NaiveDate,
    ) -> Result<PathBuf, DataMallError> {
        let records = fetch_all(&self.source, dataset.sub_path(), &[])?;
        write_dataset_csv(&self.output_dir, dataset, &records, today)
    }

    /// Fetch the report link of a passenger-volume dataset and open it.
    pub fn open_passenger_volume(
        &self,
        dataset: PassengerVolume,
        period: Option<ReportPeriod>,
    ) -> Result<String, DataMallError> {
        let link = fetch_report_link(&self.source, dataset.sub_path(), dataset.key(), period)?;
        self.opener.open_link(&link)?;
        Ok(link)
    }

    /// Fetch the report link of a geospatial layer and open it.
    pub fn open_geospatial(
        &self,
        dataset: Geospatial,
        period: Option<ReportPeriod>,
    ) -> Result<String, DataMallError> {
        let link = fetch_report_link(&self.source, dataset.sub_path(), dataset.key(), period)?;
        self.opener.open_link(&link)?;
        Ok(link)
    }

    fn run_step(&self, step: PullStep, today: NaiveDate) -> Result<StepOutcome, DataMallError> {
        match step {
            PullStep::Bus(dataset) => self
                .pull_bus_dataset(dataset, today)
                .map(StepOutcome::Written),
            PullStep::PassengerVolume(dataset, period) => self
                .open_passenger_volume(dataset, Some(period))
                .map(StepOutcome::Opened),
        }
    }

    /// Run the full monthly pull as of `today`.
    pub fn collect_transit_data(&self, today: NaiveDate) -> Result<PullReport, DataMallError> {
        let plan = monthly_plan(today);
        info!(steps = plan.len(), policy = ?self.policy, "starting transit data pull");

        let mut report = PullReport::default();
        for step in plan {
            let outcome = match self.run_step(step, today) {
                Ok(outcome) => outcome,
                Err(err) => match self.policy {
                    FailurePolicy::FailFast => return Err(err),
                    FailurePolicy::KeepGoing => {
                        warn!(step = %step, error = %err, "step failed; continuing");
                        StepOutcome::Failed(err)
                    }
                },
            };
            report.steps.push(StepReport { step, outcome });
        }

        info!(
            steps = report.steps.len(),
            failed = report.failures(),
            "transit data pull finished"
        );
        Ok(report)
    }
}
