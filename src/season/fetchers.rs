//! Single-call fetchers over the upstream client.
//!
//! Each fetcher composes a resource path, lets the client classify
//! transport/status/decode failures, and converts the envelope into the
//! exposed report types.

use crate::error::{GatewayError, GatewayResult};
use crate::models::{
    CircuitSummary, CircuitsReport, Constructor, ConstructorStanding, ConstructorStandingsReport,
    Driver, DriverStanding, DriverStandingsReport, LapTiming, LapTimesReport, Record, Round,
    RoundResult, ScheduleReport,
};
use crate::season::RoundSource;
use crate::upstream::wire::{
    Circuit, CircuitData, ConstructorInfo, DriverInfo, LapData, Race, RaceData, RaceResult,
    StandingsData, StandingsList,
};
use crate::upstream::UpstreamClient;
use async_trait::async_trait;
use tracing::debug;

/// Which championship table to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandingsKind {
    Drivers,
    Constructors,
}

impl StandingsKind {
    fn resource(&self) -> &'static str {
        match self {
            StandingsKind::Drivers => "driverStandings",
            StandingsKind::Constructors => "constructorStandings",
        }
    }
}

pub fn schedule_path(season: &str) -> String {
    format!("{}.json", season)
}

pub fn results_path(season: &str, round: &str) -> String {
    format!("{}/{}/results.json", season, round)
}

pub fn circuits_path(season: &str) -> String {
    format!("{}/circuits.json", season)
}

pub fn laps_path(season: &str, round: &str, lap: &str) -> String {
    format!("{}/{}/laps/{}.json", season, round, lap)
}

pub fn standings_path(season: &str, round: Option<&str>, kind: StandingsKind) -> String {
    match round {
        Some(round) => format!("{}/{}/{}.json", season, round, kind.resource()),
        None => format!("{}/{}.json", season, kind.resource()),
    }
}

/// Reject identifiers that would produce a malformed resource path.
fn check_segment(name: &str, value: &str) -> GatewayResult<()> {
    let value = value.trim();
    if value.is_empty() {
        return Err(GatewayError::InvalidRequest(format!(
            "{} must not be empty",
            name
        )));
    }
    if value.contains(['/', '?', '#']) {
        return Err(GatewayError::InvalidRequest(format!(
            "{} contains a reserved character: {}",
            name, value
        )));
    }
    Ok(())
}

#[async_trait]
impl RoundSource for UpstreamClient {
    async fn schedule(&self, season: &str) -> GatewayResult<Vec<Round>> {
        check_segment("season", season)?;
        let season = season.trim();
        let table: RaceData = self.fetch_table(&schedule_path(season)).await?;
        let rounds: Vec<Round> = table
            .race_table
            .races
            .into_iter()
            .map(Round::from)
            .collect();
        debug!("Season {} has {} scheduled rounds", season, rounds.len());
        Ok(rounds)
    }

    async fn results(&self, season: &str, round: &str) -> GatewayResult<Vec<RoundResult>> {
        check_segment("season", season)?;
        check_segment("round", round)?;
        let (season, round) = (season.trim(), round.trim());
        let path = results_path(season, round);
        let table: RaceData = self.fetch_all(&path).await?;

        let Some(race) = table.race_table.races.into_iter().next() else {
            debug!("No results yet for {} round {}", season, round);
            return Ok(Vec::new());
        };

        race.results
            .into_iter()
            .map(|row| round_result(round, row, &path))
            .collect()
    }
}

/// The season's calendar as a report.
pub async fn schedule_report(client: &UpstreamClient, season: &str) -> GatewayResult<ScheduleReport> {
    let races = client.schedule(season).await?;
    Ok(ScheduleReport {
        season: season.trim().to_string(),
        races,
    })
}

/// Circuits raced on in a season.
pub async fn circuits_report(client: &UpstreamClient, season: &str) -> GatewayResult<CircuitsReport> {
    check_segment("season", season)?;
    let season = season.trim();
    let data: CircuitData = client.fetch_table(&circuits_path(season)).await?;
    let table = data.circuit_table;

    Ok(CircuitsReport {
        season: if table.season.is_empty() {
            season.to_string()
        } else {
            table.season
        },
        circuits: table.circuits.into_iter().map(CircuitSummary::from).collect(),
    })
}

/// Every driver's timing on one lap of one round.
pub async fn lap_times(
    client: &UpstreamClient,
    season: &str,
    round: &str,
    lap: &str,
) -> GatewayResult<LapTimesReport> {
    check_segment("season", season)?;
    check_segment("round", round)?;
    check_segment("lap", lap)?;
    let (season, round, lap) = (season.trim(), round.trim(), lap.trim());

    let data: LapData = client.fetch_table(&laps_path(season, round, lap)).await?;
    let race = data
        .race_table
        .races
        .into_iter()
        .next()
        .ok_or_else(|| GatewayError::NotFound {
            what: "laps".to_string(),
        })?;
    let lap_number = race
        .laps
        .first()
        .map(|l| l.number.clone())
        .unwrap_or_else(|| lap.to_string());

    let timings = race
        .laps
        .into_iter()
        .flat_map(|l| l.timings)
        .map(|t| LapTiming {
            driver_id: t.driver_id,
            position: t.position,
            time: t.time,
        })
        .collect();

    Ok(LapTimesReport {
        season: season.to_string(),
        round: race.round,
        race_name: race.race_name,
        lap: lap_number,
        circuit: race.circuit.map(CircuitSummary::from),
        timings,
    })
}

/// Drivers' championship table, truncated to `top` entries when given.
pub async fn driver_standings(
    client: &UpstreamClient,
    season: &str,
    round: Option<&str>,
    top: Option<usize>,
) -> GatewayResult<DriverStandingsReport> {
    let (path, list) = fetch_standings(client, season, round, StandingsKind::Drivers).await?;

    let standings = list
        .driver_standings
        .into_iter()
        .take(cutoff(top))
        .map(|row| {
            Ok(DriverStanding {
                position: row.position.unwrap_or(row.position_text),
                points: parse_points(&row.points, &path)?,
                wins: parse_wins(&row.wins, &path)?,
                driver: row.driver.into(),
                constructors: row
                    .constructors
                    .into_iter()
                    .map(|c| c.constructor_id)
                    .collect(),
            })
        })
        .collect::<GatewayResult<Vec<_>>>()?;

    Ok(DriverStandingsReport {
        season: list.season,
        round: list.round,
        standings,
    })
}

/// Constructors' championship table, truncated to `top` entries when given.
pub async fn constructor_standings(
    client: &UpstreamClient,
    season: &str,
    round: Option<&str>,
    top: Option<usize>,
) -> GatewayResult<ConstructorStandingsReport> {
    let (path, list) =
        fetch_standings(client, season, round, StandingsKind::Constructors).await?;

    let standings = list
        .constructor_standings
        .into_iter()
        .take(cutoff(top))
        .map(|row| {
            Ok(ConstructorStanding {
                position: row.position.unwrap_or(row.position_text),
                points: parse_points(&row.points, &path)?,
                wins: parse_wins(&row.wins, &path)?,
                constructor: row.constructor.into(),
            })
        })
        .collect::<GatewayResult<Vec<_>>>()?;

    Ok(ConstructorStandingsReport {
        season: list.season,
        round: list.round,
        standings,
    })
}

async fn fetch_standings(
    client: &UpstreamClient,
    season: &str,
    round: Option<&str>,
    kind: StandingsKind,
) -> GatewayResult<(String, StandingsList)> {
    check_segment("season", season)?;
    if let Some(round) = round {
        check_segment("round", round)?;
    }

    let path = standings_path(season.trim(), round.map(str::trim), kind);
    let data: StandingsData = client.fetch_table(&path).await?;
    let table = data.standings_table;
    let fallback_season = table.season;

    let mut list = table
        .standings_lists
        .into_iter()
        .next()
        .ok_or_else(|| GatewayError::NotFound {
            what: "standings".to_string(),
        })?;
    if list.season.is_empty() {
        list.season = fallback_season;
    }
    Ok((path, list))
}

/// Zero means "no cutoff".
fn cutoff(top: Option<usize>) -> usize {
    match top {
        Some(n) if n > 0 => n,
        _ => usize::MAX,
    }
}

fn round_result(round: &str, row: RaceResult, path: &str) -> GatewayResult<RoundResult> {
    let points = parse_points(&row.points, path)?;
    let position = finishing_position(&row);
    Ok(RoundResult {
        record: Record {
            round: round.trim().to_string(),
            position,
            points,
            status: row.status,
            constructor: row.constructor.map(|c| c.constructor_id),
        },
        driver: row.driver.into(),
    })
}

/// The classified position, or a status token for unclassified finishers.
fn finishing_position(row: &RaceResult) -> String {
    let token = match row.position_text.as_str() {
        "R" => "Retired",
        "D" => "Disqualified",
        "E" => "Excluded",
        "W" => "Withdrawn",
        "F" => "Failed to qualify",
        "N" => "Not classified",
        _ => "",
    };
    if !token.is_empty() {
        token.to_string()
    } else if row.position.is_empty() {
        row.position_text.clone()
    } else {
        row.position.clone()
    }
}

fn parse_points(text: &str, path: &str) -> GatewayResult<f64> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(0.0);
    }
    text.parse::<f64>()
        .ok()
        .filter(|p| p.is_finite())
        .ok_or_else(|| GatewayError::Decode {
            path: path.to_string(),
            detail: format!("invalid points value: {:?}", text),
        })
}

fn parse_wins(text: &str, path: &str) -> GatewayResult<u32> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(0);
    }
    text.parse::<u32>().map_err(|_| GatewayError::Decode {
        path: path.to_string(),
        detail: format!("invalid wins value: {:?}", text),
    })
}

impl From<DriverInfo> for Driver {
    fn from(info: DriverInfo) -> Self {
        Self {
            id: info.driver_id,
            number: info.permanent_number.filter(|n| !n.is_empty()),
            code: info.code.filter(|c| !c.is_empty()),
            given_name: info.given_name,
            family_name: info.family_name,
            date_of_birth: info.date_of_birth,
            nationality: info.nationality,
            url: info.url,
        }
    }
}

impl From<ConstructorInfo> for Constructor {
    fn from(info: ConstructorInfo) -> Self {
        Self {
            id: info.constructor_id,
            name: info.name,
            nationality: info.nationality,
            url: info.url,
        }
    }
}

impl From<Race> for Round {
    fn from(race: Race) -> Self {
        Self {
            round: race.round,
            race_name: race.race_name,
            date: race.date,
            circuit: race.circuit.map(CircuitSummary::from),
        }
    }
}

impl From<Circuit> for CircuitSummary {
    fn from(circuit: Circuit) -> Self {
        let location = circuit.location.unwrap_or_default();
        Self {
            id: circuit.circuit_id,
            name: circuit.circuit_name,
            locality: location.locality,
            country: location.country,
        }
    }
}
