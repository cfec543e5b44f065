//! Upstream JSON envelopes.
//!
//! Every response is wrapped in a top-level `MRData` object holding one
//! resource-specific table. Only the fields the gateway reads are modelled;
//! everything else in the payload is ignored.

use crate::error::{GatewayError, GatewayResult};
use serde::Deserialize;

/// Top-level wrapper shared by every resource.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(rename = "MRData")]
    pub data: Paged<T>,
}

/// One page of a resource table.
///
/// The upstream caps every response at `limit` rows starting at `offset`
/// and reports the full row count in `total`, all as decimal strings.
#[derive(Debug, Deserialize)]
pub struct Paged<T> {
    #[serde(default)]
    pub limit: Option<String>,
    #[serde(default)]
    pub offset: Option<String>,
    #[serde(default)]
    pub total: Option<String>,
    #[serde(flatten)]
    pub table: T,
}

impl<T> Paged<T> {
    /// Full row count across all pages, when the upstream reports one.
    pub fn total(&self, path: &str) -> GatewayResult<Option<usize>> {
        match self.total.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => text.parse().map(Some).map_err(|_| GatewayError::Decode {
                path: path.to_string(),
                detail: format!("invalid total value: {:?}", text),
            }),
        }
    }
}

/// A paged table that can legitimately come back empty.
pub trait ResourceTable {
    /// Human-readable name used in `NotFound` errors.
    const WHAT: &'static str;

    fn is_empty(&self) -> bool;

    /// Rows on this page, counted the way the upstream counts `total`.
    fn rows(&self) -> usize;

    /// Append the next page of the same query.
    fn append(&mut self, next: Self);
}

#[derive(Debug, Deserialize)]
pub struct RaceData {
    #[serde(rename = "RaceTable")]
    pub race_table: RaceTable,
}

impl ResourceTable for RaceData {
    const WHAT: &'static str = "schedule";

    fn is_empty(&self) -> bool {
        self.race_table.races.is_empty()
    }

    fn rows(&self) -> usize {
        self.race_table.rows()
    }

    fn append(&mut self, next: Self) {
        self.race_table.append(next.race_table);
    }
}

/// Lap timings share the race table shape.
#[derive(Debug, Deserialize)]
pub struct LapData {
    #[serde(rename = "RaceTable")]
    pub race_table: RaceTable,
}

impl ResourceTable for LapData {
    const WHAT: &'static str = "laps";

    fn is_empty(&self) -> bool {
        self.race_table
            .races
            .iter()
            .all(|race| race.laps.iter().all(|lap| lap.timings.is_empty()))
    }

    fn rows(&self) -> usize {
        self.race_table.rows()
    }

    fn append(&mut self, next: Self) {
        self.race_table.append(next.race_table);
    }
}

#[derive(Debug, Deserialize)]
pub struct RaceTable {
    #[serde(default)]
    pub season: String,
    #[serde(rename = "Races", default)]
    pub races: Vec<Race>,
}

impl RaceTable {
    /// A race counts once on its own, or once per result or lap timing it carries.
    fn rows(&self) -> usize {
        self.races
            .iter()
            .map(|race| {
                let timings: usize = race.laps.iter().map(|lap| lap.timings.len()).sum();
                match (race.results.len(), timings) {
                    (0, 0) => 1,
                    (results, timings) => results + timings,
                }
            })
            .sum()
    }

    /// A race split across two pages continues on the next one.
    fn append(&mut self, next: RaceTable) {
        for race in next.races {
            match self.races.last_mut() {
                Some(last) if last.round == race.round => {
                    last.results.extend(race.results);
                    for lap in race.laps {
                        match last.laps.last_mut() {
                            Some(open) if open.number == lap.number => {
                                open.timings.extend(lap.timings)
                            }
                            _ => last.laps.push(lap),
                        }
                    }
                }
                _ => self.races.push(race),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Race {
    pub round: String,
    #[serde(default)]
    pub race_name: String,
    #[serde(default)]
    pub date: String,
    #[serde(rename = "Circuit", default)]
    pub circuit: Option<Circuit>,
    #[serde(rename = "Results", default)]
    pub results: Vec<RaceResult>,
    #[serde(rename = "Laps", default)]
    pub laps: Vec<Lap>,
}

#[derive(Debug, Deserialize)]
pub struct Lap {
    #[serde(default)]
    pub number: String,
    #[serde(rename = "Timings", default)]
    pub timings: Vec<Timing>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    pub driver_id: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub time: String,
}

#[derive(Debug, Deserialize)]
pub struct CircuitData {
    #[serde(rename = "CircuitTable")]
    pub circuit_table: CircuitTable,
}

impl ResourceTable for CircuitData {
    const WHAT: &'static str = "circuits";

    fn is_empty(&self) -> bool {
        self.circuit_table.circuits.is_empty()
    }

    fn rows(&self) -> usize {
        self.circuit_table.circuits.len()
    }

    fn append(&mut self, next: Self) {
        self.circuit_table.circuits.extend(next.circuit_table.circuits);
    }
}

#[derive(Debug, Deserialize)]
pub struct CircuitTable {
    #[serde(default)]
    pub season: String,
    #[serde(rename = "Circuits", default)]
    pub circuits: Vec<Circuit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Circuit {
    pub circuit_id: String,
    #[serde(default)]
    pub circuit_name: String,
    #[serde(rename = "Location", default)]
    pub location: Option<Location>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub locality: String,
    #[serde(default)]
    pub country: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceResult {
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub position_text: String,
    #[serde(default)]
    pub points: String,
    #[serde(default)]
    pub status: String,
    #[serde(rename = "Driver")]
    pub driver: DriverInfo,
    #[serde(rename = "Constructor", default)]
    pub constructor: Option<ConstructorInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverInfo {
    pub driver_id: String,
    #[serde(default)]
    pub permanent_number: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub family_name: String,
    #[serde(default)]
    pub date_of_birth: String,
    #[serde(default)]
    pub nationality: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstructorInfo {
    pub constructor_id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nationality: String,
}

#[derive(Debug, Deserialize)]
pub struct StandingsData {
    #[serde(rename = "StandingsTable")]
    pub standings_table: StandingsTable,
}

impl ResourceTable for StandingsData {
    const WHAT: &'static str = "standings";

    fn is_empty(&self) -> bool {
        self.standings_table.standings_lists.is_empty()
    }

    fn rows(&self) -> usize {
        self.standings_table
            .standings_lists
            .iter()
            .map(|list| list.driver_standings.len() + list.constructor_standings.len())
            .sum()
    }

    fn append(&mut self, next: Self) {
        let lists = &mut self.standings_table.standings_lists;
        for list in next.standings_table.standings_lists {
            match lists.last_mut() {
                Some(last) if last.season == list.season && last.round == list.round => {
                    last.driver_standings.extend(list.driver_standings);
                    last.constructor_standings.extend(list.constructor_standings);
                }
                _ => lists.push(list),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StandingsTable {
    #[serde(default)]
    pub season: String,
    #[serde(rename = "StandingsLists", default)]
    pub standings_lists: Vec<StandingsList>,
}

#[derive(Debug, Deserialize)]
pub struct StandingsList {
    #[serde(default)]
    pub season: String,
    #[serde(default)]
    pub round: String,
    #[serde(rename = "DriverStandings", default)]
    pub driver_standings: Vec<DriverStandingRow>,
    #[serde(rename = "ConstructorStandings", default)]
    pub constructor_standings: Vec<ConstructorStandingRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverStandingRow {
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub position_text: String,
    #[serde(default)]
    pub points: String,
    #[serde(default)]
    pub wins: String,
    #[serde(rename = "Driver")]
    pub driver: DriverInfo,
    #[serde(rename = "Constructors", default)]
    pub constructors: Vec<ConstructorInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstructorStandingRow {
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub position_text: String,
    #[serde(default)]
    pub points: String,
    #[serde(default)]
    pub wins: String,
    #[serde(rename = "Constructor")]
    pub constructor: ConstructorInfo,
}
