//! Catalogue of DataMall datasets: API sub-paths, output labels and CSV column order.

use std::fmt;
use std::str::FromStr;

use crate::error::DataMallError;

/// Bus reference datasets, fetched page by page and written to CSV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusDataset {
    Services,
    Stops,
    Routes,
}

/// Monthly passenger-volume reports, delivered as a download link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassengerVolume {
    BusNode,
    BusOd,
    TrainNode,
    TrainOd,
}

/// Geospatial layers, delivered as a download link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Geospatial {
    TrainStation,
}

const BUS_SERVICE_COLUMNS: &[&str] = &[
    "ServiceNo",
    "Operator",
    "Direction",
    "Category",
    "OriginCode",
    "DestinationCode",
    "AM_Peak_Freq",
    "AM_Offpeak_Freq",
    "PM_Peak_Freq",
    "PM_Offpeak_Freq",
    "LoopDesc",
];

const BUS_STOP_COLUMNS: &[&str] = &[
    "BusStopCode",
    "Description",
    "Latitude",
    "Longitude",
    "RoadName",
];

const BUS_ROUTE_COLUMNS: &[&str] = &[
    "ServiceNo",
    "Operator",
    "Direction",
    "StopSequence",
    "BusStopCode",
    "Distance",
    "WD_FirstBus",
    "WD_LastBus",
    "SAT_FirstBus",
    "SAT_LastBus",
    "SUN_FirstBus",
    "SUN_LastBus",
];

impl BusDataset {
    pub const ALL: [BusDataset; 3] = [BusDataset::Services, BusDataset::Stops, BusDataset::Routes];

    pub fn key(self) -> &'static str {
        match self {
            BusDataset::Services => "service",
            BusDataset::Stops => "stop",
            BusDataset::Routes => "route",
        }
    }

    /// Resource name appended to the API base URL.
    pub fn sub_path(self) -> &'static str {
        match self {
            BusDataset::Services => "BusServices",
            BusDataset::Stops => "BusStops",
            BusDataset::Routes => "BusRoutes",
        }
    }

    /// Prefix of the CSV file name.
    pub fn label(self) -> &'static str {
        match self {
            BusDataset::Services => "bus_services",
            BusDataset::Stops => "bus_stops",
            BusDataset::Routes => "bus_routes",
        }
    }

    /// Column order of the CSV output.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            BusDataset::Services => BUS_SERVICE_COLUMNS,
            BusDataset::Stops => BUS_STOP_COLUMNS,
            BusDataset::Routes => BUS_ROUTE_COLUMNS,
        }
    }
}

impl PassengerVolume {
    pub const ALL: [PassengerVolume; 4] = [
        PassengerVolume::BusNode,
        PassengerVolume::BusOd,
        PassengerVolume::TrainNode,
        PassengerVolume::TrainOd,
    ];

    pub fn key(self) -> &'static str {
        match self {
            PassengerVolume::BusNode => "bus_node",
            PassengerVolume::BusOd => "bus_od",
            PassengerVolume::TrainNode => "train_node",
            PassengerVolume::TrainOd => "train_od",
        }
    }

    pub fn sub_path(self) -> &'static str {
        match self {
            PassengerVolume::BusNode => "PV/Bus",
            PassengerVolume::BusOd => "PV/ODBus",
            PassengerVolume::TrainNode => "PV/Train",
            PassengerVolume::TrainOd => "PV/ODTrain",
        }
    }
}

impl Geospatial {
    pub const ALL: [Geospatial; 1] = [Geospatial::TrainStation];

    pub fn key(self) -> &'static str {
        match self {
            Geospatial::TrainStation => "train_station",
        }
    }

    pub fn sub_path(self) -> &'static str {
        match self {
            Geospatial::TrainStation => "TrainStation",
        }
    }
}

fn normalize_key(raw: &str) -> String {
    raw.trim().to_ascii_lowercase().replace('-', "_")
}

fn lookup<T: Copy>(
    group: &'static str,
    raw: &str,
    all: &[T],
    key: fn(T) -> &'static str,
) -> Result<T, DataMallError> {
    let normalized = normalize_key(raw);
    all.iter()
        .copied()
        .find(|candidate| key(*candidate) == normalized)
        .ok_or_else(|| DataMallError::UnknownDataset {
            group,
            key: raw.to_string(),
            expected: all
                .iter()
                .map(|candidate| key(*candidate))
                .collect::<Vec<_>>()
                .join(", "),
        })
}

impl FromStr for BusDataset {
    type Err = DataMallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lookup("bus", s, &BusDataset::ALL, BusDataset::key)
    }
}

impl FromStr for PassengerVolume {
    type Err = DataMallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lookup("passenger volume", s, &PassengerVolume::ALL, PassengerVolume::key)
    }
}

impl FromStr for Geospatial {
    type Err = DataMallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lookup("geospatial", s, &Geospatial::ALL, Geospatial::key)
    }
}

impl fmt::Display for BusDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sub_path())
    }
}

impl fmt::Display for PassengerVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sub_path())
    }
}

impl fmt::Display for Geospatial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sub_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_schemas_match_published_tables() {
        assert_eq!(BusDataset::Services.columns().len(), 11);
        assert_eq!(BusDataset::Stops.columns().len(), 5);
        assert_eq!(BusDataset::Routes.columns().len(), 12);
        assert_eq!(BusDataset::Stops.columns()[0], "BusStopCode");
        assert_eq!(BusDataset::Routes.columns()[11], "SUN_LastBus");
    }

    #[test]
    fn keys_round_trip_through_from_str() {
        for dataset in BusDataset::ALL {
            assert_eq!(dataset.key().parse::<BusDataset>().unwrap(), dataset);
        }
        for dataset in PassengerVolume::ALL {
            assert_eq!(dataset.key().parse::<PassengerVolume>().unwrap(), dataset);
        }
        assert_eq!(
            "train_station".parse::<Geospatial>().unwrap(),
            Geospatial::TrainStation
        );
    }

    #[test]
    fn keys_accept_dashes_and_case() {
        assert_eq!(
            "Train-OD".parse::<PassengerVolume>().unwrap(),
            PassengerVolume::TrainOd
        );
        assert_eq!(" STOP ".parse::<BusDataset>().unwrap(), BusDataset::Stops);
    }

    #[test]
    fn unknown_key_fails_loudly() {
        let err = "tram".parse::<BusDataset>().unwrap_err();
        match err {
            DataMallError::UnknownDataset {
                group,
                key,
                expected,
            } => {
                assert_eq!(group, "bus");
                assert_eq!(key, "tram");
                assert_eq!(expected, "service, stop, route");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!("bus_stop".parse::<PassengerVolume>().is_err());
        assert!("".parse::<Geospatial>().is_err());
    }

    #[test]
    fn sub_paths_follow_api_resource_names() {
        assert_eq!(PassengerVolume::BusOd.sub_path(), "PV/ODBus");
        assert_eq!(PassengerVolume::TrainNode.sub_path(), "PV/Train");
        assert_eq!(BusDataset::Routes.to_string(), "BusRoutes");
    }
}
