use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fs;

use chrono::NaiveDate;
use datamall_core::{
    BusDataset, DataCollector, DataMallError, FailurePolicy, LinkOpener, PageSource,
    PassengerVolume, Record, ReportPeriod, StepOutcome,
};
use serde_json::{Value, json};
use tempfile::tempdir;

/// Serves scripted pages per resource and records every request.
#[derive(Default)]
struct FakeDataMall {
    pages: RefCell<HashMap<String, VecDeque<Vec<Record>>>>,
    requests: RefCell<Vec<(String, Vec<(String, String)>)>>,
}

impl FakeDataMall {
    fn script(self, sub_path: &str, pages: Vec<Vec<Record>>) -> Self {
        self.pages
            .borrow_mut()
            .insert(sub_path.to_string(), pages.into_iter().collect());
        self
    }

    fn requests_for(&self, sub_path: &str) -> Vec<Vec<(String, String)>> {
        self.requests
            .borrow()
            .iter()
            .filter(|(path, _)| path == sub_path)
            .map(|(_, query)| query.clone())
            .collect()
    }
}

impl PageSource for FakeDataMall {
    fn fetch_page(
        &self,
        sub_path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<Record>, DataMallError> {
        self.requests.borrow_mut().push((
            sub_path.to_string(),
            query
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        ));
        let mut pages = self.pages.borrow_mut();
        let queue = pages.get_mut(sub_path).ok_or_else(|| DataMallError::HttpStatus {
            url: sub_path.to_string(),
            status: reqwest::StatusCode::NOT_FOUND,
        })?;
        Ok(queue.pop_front().unwrap_or_default())
    }
}

#[derive(Default)]
struct RecordingOpener {
    opened: RefCell<Vec<String>>,
}

impl LinkOpener for RecordingOpener {
    fn open_link(&self, url: &str) -> Result<(), DataMallError> {
        self.opened.borrow_mut().push(url.to_string());
        Ok(())
    }
}

fn object(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

fn bus_stop(i: usize) -> Record {
    object(json!({
        "BusStopCode": format!("{:05}", i),
        "RoadName": "Victoria St",
        "Description": format!("Stop {i}"),
        "Latitude": 1.3,
        "Longitude": 103.8,
    }))
}

fn bus_service(no: &str) -> Record {
    object(json!({
        "ServiceNo": no,
        "Operator": "SBST",
        "Direction": 1,
        "Category": "TRUNK",
        "OriginCode": "64009",
        "DestinationCode": "64009",
        "AM_Peak_Freq": "14-17",
        "AM_Offpeak_Freq": "10-16",
        "PM_Peak_Freq": "12-15",
        "PM_Offpeak_Freq": "12-15",
        "LoopDesc": "Marymount Rd",
    }))
}

fn bus_route(seq: u32) -> Record {
    object(json!({
        "ServiceNo": "10",
        "Operator": "SBST",
        "Direction": 1,
        "StopSequence": seq,
        "BusStopCode": "75009",
        "Distance": 0,
        "WD_FirstBus": "0500",
        "WD_LastBus": "2300",
        "SAT_FirstBus": "0500",
        "SAT_LastBus": "2300",
        "SUN_FirstBus": "0500",
        "SUN_LastBus": "2300",
    }))
}

fn link(url: &str) -> Vec<Record> {
    vec![object(json!({ "Link": url }))]
}

fn march_15() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
}

fn full_mall() -> FakeDataMall {
    FakeDataMall::default()
        .script("BusServices", vec![vec![bus_service("10"), bus_service("12")], vec![]])
        .script("BusStops", vec![(0..500).map(bus_stop).collect(), vec![]])
        .script("BusRoutes", vec![vec![bus_route(1), bus_route(2), bus_route(3)], vec![]])
        .script("PV/Bus", vec![link("http://example/bus_node.zip")])
        .script("PV/ODBus", vec![link("http://example/bus_od.zip")])
        .script("PV/Train", vec![link("http://example/train_node.zip")])
        .script("PV/ODTrain", vec![link("http://example/train_od.zip")])
}

#[test]
fn stop_dataset_with_one_full_page_makes_two_requests() {
    let dir = tempdir().expect("tempdir");
    let mall = FakeDataMall::default().script("BusStops", vec![(0..500).map(bus_stop).collect(), vec![]]);
    let opener = RecordingOpener::default();
    let collector = DataCollector::new(&mall, &opener, dir.path());

    let path = collector
        .pull_bus_dataset(BusDataset::Stops, march_15())
        .expect("pull succeeds");

    let requests = mall.requests_for("BusStops");
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0], vec![("$skip".to_string(), "0".to_string())]);
    assert_eq!(requests[1], vec![("$skip".to_string(), "500".to_string())]);

    let contents = fs::read_to_string(&path).expect("read csv");
    assert_eq!(contents.lines().count(), 501);
    assert_eq!(
        path.file_name().and_then(|n| n.to_str()),
        Some("bus_stops_202403.csv")
    );
}

#[test]
fn train_od_report_opens_link_without_writing_files() {
    let dir = tempdir().expect("tempdir");
    let mall = FakeDataMall::default().script("PV/ODTrain", vec![link("http://example/report.zip")]);
    let opener = RecordingOpener::default();
    let collector = DataCollector::new(&mall, &opener, dir.path());

    let period: ReportPeriod = "202401".parse().unwrap();
    let opened = collector
        .open_passenger_volume(PassengerVolume::TrainOd, Some(period))
        .expect("report opens");

    assert_eq!(opened, "http://example/report.zip");
    assert_eq!(*opener.opened.borrow(), vec!["http://example/report.zip"]);
    assert_eq!(
        mall.requests_for("PV/ODTrain"),
        vec![vec![
            ("$skip".to_string(), "0".to_string()),
            ("Date".to_string(), "202401".to_string()),
        ]]
    );
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn empty_report_is_reported_and_nothing_opens() {
    let dir = tempdir().expect("tempdir");
    let mall = FakeDataMall::default().script("PV/Bus", vec![vec![]]);
    let opener = RecordingOpener::default();
    let collector = DataCollector::new(&mall, &opener, dir.path());

    let err = collector
        .open_passenger_volume(PassengerVolume::BusNode, None)
        .unwrap_err();
    assert!(matches!(err, DataMallError::EmptyResult { dataset: "bus_node", period: None }));
    assert!(opener.opened.borrow().is_empty());
}

#[test]
fn full_pull_writes_bus_csvs_and_opens_previous_month_reports() {
    let dir = tempdir().expect("tempdir");
    let mall = full_mall();
    let opener = RecordingOpener::default();
    let collector = DataCollector::new(&mall, &opener, dir.path());

    let report = collector
        .collect_transit_data(march_15())
        .expect("full pull succeeds");
    assert_eq!(report.steps.len(), 7);
    assert_eq!(report.failures(), 0);

    for name in ["bus_services_202403.csv", "bus_stops_202403.csv", "bus_routes_202403.csv"] {
        assert!(dir.path().join(name).exists(), "{name} should be written");
    }

    let routes = fs::read_to_string(dir.path().join("bus_routes_202403.csv")).unwrap();
    let mut lines = routes.lines();
    assert_eq!(
        lines.next(),
        Some("ServiceNo,Operator,Direction,StopSequence,BusStopCode,Distance,WD_FirstBus,WD_LastBus,SAT_FirstBus,SAT_LastBus,SUN_FirstBus,SUN_LastBus")
    );
    assert_eq!(lines.next(), Some("10,SBST,1,1,75009,0,0500,2300,0500,2300,0500,2300"));

    assert_eq!(
        *opener.opened.borrow(),
        vec![
            "http://example/bus_node.zip",
            "http://example/bus_od.zip",
            "http://example/train_node.zip",
            "http://example/train_od.zip",
        ]
    );

    for sub_path in ["PV/Bus", "PV/ODBus", "PV/Train", "PV/ODTrain"] {
        let requests = mall.requests_for(sub_path);
        assert_eq!(requests.len(), 1);
        assert!(requests[0].contains(&("Date".to_string(), "202402".to_string())));
    }
}

#[test]
fn fail_fast_stops_at_first_failing_step() {
    let dir = tempdir().expect("tempdir");
    let mut broken = bus_service("10");
    broken.remove("LoopDesc");
    let mall = full_mall().script("BusServices", vec![vec![broken], vec![]]);
    let opener = RecordingOpener::default();
    let collector = DataCollector::new(&mall, &opener, dir.path());

    let err = collector.collect_transit_data(march_15()).unwrap_err();
    assert!(matches!(
        err,
        DataMallError::SchemaMismatch { column: "LoopDesc", row: 0, .. }
    ));
    assert!(mall.requests_for("BusStops").is_empty());
    assert!(opener.opened.borrow().is_empty());
}

#[test]
fn keep_going_runs_every_step_and_collects_failures() {
    let dir = tempdir().expect("tempdir");
    let mall = full_mall().script("PV/ODBus", vec![vec![]]);
    let opener = RecordingOpener::default();
    let collector =
        DataCollector::new(&mall, &opener, dir.path()).with_policy(FailurePolicy::KeepGoing);

    let report = collector
        .collect_transit_data(march_15())
        .expect("keep-going returns a report");
    assert_eq!(report.steps.len(), 7);
    assert_eq!(report.failures(), 1);
    assert!(matches!(
        report.steps[4].outcome,
        StepOutcome::Failed(DataMallError::EmptyResult { dataset: "bus_od", .. })
    ));
    assert_eq!(opener.opened.borrow().len(), 3);

    assert!(matches!(
        report.into_result(),
        Err(DataMallError::PartialFailure { failed: 1, total: 7 })
    ));
}

#[test]
fn january_run_reports_on_previous_december() {
    let dir = tempdir().expect("tempdir");
    let mall = full_mall();
    let opener = RecordingOpener::default();
    let collector = DataCollector::new(&mall, &opener, dir.path());

    collector
        .collect_transit_data(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap())
        .expect("pull succeeds");
    assert!(
        mall.requests_for("PV/Train")[0].contains(&("Date".to_string(), "202312".to_string()))
    );
    assert!(dir.path().join("bus_stops_202401.csv").exists());
}
