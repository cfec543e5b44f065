//! Data models for the query gateway.
//!
//! These are the strongly-typed shapes exposed to callers. The loosely
//! typed upstream envelopes live in `upstream::wire` and are converted
//! into these types by the fetchers.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Descriptive attributes of a competitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    /// Stable identifier used as the merge key across rounds.
    pub id: String,
    /// Permanent car number, when the driver has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    /// Three-letter code, when the driver has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub given_name: String,
    pub family_name: String,
    pub date_of_birth: String,
    pub nationality: String,
    pub url: String,
}

impl Driver {
    /// Returns "Given Family".
    pub fn full_name(&self) -> String {
        format!("{} {}", self.given_name, self.family_name)
    }
}

/// A team as reported upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constructor {
    pub id: String,
    pub name: String,
    pub nationality: String,
    pub url: String,
}

/// One driver's result in one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Round identifier as supplied upstream.
    pub round: String,
    /// Finishing position, or a status word such as "Retired" or
    /// "Disqualified" when not classified.
    pub position: String,
    /// Points scored; may be fractional or zero.
    pub points: f64,
    /// Upstream finishing status, e.g. "Finished", "+1 Lap", "Retired".
    pub status: String,
    /// Constructor the driver raced for in this round.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constructor: Option<String>,
}

/// A result row for one round: the full driver snapshot plus the record.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundResult {
    pub driver: Driver,
    pub record: Record,
}

/// A driver's season-long record sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverSeasonEntry {
    pub driver: Driver,
    pub records: Vec<Record>,
}

impl DriverSeasonEntry {
    /// Sum of points over every record.
    pub fn total_points(&self) -> f64 {
        self.records.iter().map(|r| r.points).sum()
    }
}

/// Season-long per-driver records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonReport {
    pub season: String,
    /// Entries ranked by total points; callers must not rely on the order
    /// beyond that.
    pub drivers: Vec<DriverSeasonEntry>,
}

impl SeasonReport {
    /// Look up an entry by driver identifier.
    #[cfg(test)]
    pub fn entry(&self, driver_id: &str) -> Option<&DriverSeasonEntry> {
        self.drivers.iter().find(|e| e.driver.id == driver_id)
    }
}

/// Where a round is held.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitSummary {
    pub id: String,
    pub name: String,
    pub locality: String,
    pub country: String,
}

/// One event in a season's schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub round: String,
    pub race_name: String,
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit: Option<CircuitSummary>,
}

impl Round {
    /// Shorthand for a schedule entry that only carries its identifier.
    #[cfg(test)]
    pub fn numbered(round: &str) -> Self {
        Self {
            round: round.to_string(),
            race_name: String::new(),
            date: String::new(),
            circuit: None,
        }
    }
}

/// A season's race calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleReport {
    pub season: String,
    pub races: Vec<Round>,
}

/// One line of the drivers' championship table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverStanding {
    pub position: String,
    pub points: f64,
    pub wins: u32,
    pub driver: Driver,
    pub constructors: Vec<String>,
}

/// Drivers' championship after a given round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverStandingsReport {
    pub season: String,
    pub round: String,
    pub standings: Vec<DriverStanding>,
}

/// One line of the constructors' championship table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructorStanding {
    pub position: String,
    pub points: f64,
    pub wins: u32,
    pub constructor: Constructor,
}

/// Constructors' championship after a given round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructorStandingsReport {
    pub season: String,
    pub round: String,
    pub standings: Vec<ConstructorStanding>,
}

/// Circuits used in a season.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitsReport {
    pub season: String,
    pub circuits: Vec<CircuitSummary>,
}

/// One driver's time on a given lap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapTiming {
    pub driver_id: String,
    pub position: String,
    /// Lap time as supplied upstream, e.g. "1:32.054".
    pub time: String,
}

/// Timings of every driver on one lap of one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapTimesReport {
    pub season: String,
    pub round: String,
    pub race_name: String,
    pub lap: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit: Option<CircuitSummary>,
    pub timings: Vec<LapTiming>,
}

/// A round that failed during aggregation, in a serializable form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradedRound {
    pub round: String,
    pub reason: String,
}

/// Calendar order of round identifiers: numeric when both parse, lexical
/// otherwise, with numeric identifiers first.
pub fn compare_rounds(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<u32>(), b.trim().parse::<u32>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
