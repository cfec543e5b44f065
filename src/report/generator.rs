//! Report rendering.
//!
//! This module renders query results as Markdown or JSON documents.

use crate::error::PartialAggregationError;
use crate::models::{
    CircuitsReport, ConstructorStandingsReport, DegradedRound, DriverStandingsReport,
    LapTimesReport, ScheduleReport, SeasonReport,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Metadata about one query run.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    /// Season the query was scoped to.
    pub season: String,
    /// Upstream base URL the data came from.
    pub source: String,
    /// When the report was produced.
    pub generated_at: DateTime<Utc>,
    /// Wall-clock time spent on the query.
    pub duration_seconds: f64,
}

/// The payload of a document.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportBody {
    Seasonal(SeasonReport),
    DriverStandings(DriverStandingsReport),
    ConstructorStandings(ConstructorStandingsReport),
    Schedule(ScheduleReport),
    Circuits(CircuitsReport),
    LapTimes(LapTimesReport),
}

impl ReportBody {
    fn title(&self) -> &'static str {
        match self {
            ReportBody::Seasonal(_) => "Seasonal Driver Records",
            ReportBody::DriverStandings(_) => "Drivers' Standings",
            ReportBody::ConstructorStandings(_) => "Constructors' Standings",
            ReportBody::Schedule(_) => "Season Schedule",
            ReportBody::Circuits(_) => "Season Circuits",
            ReportBody::LapTimes(_) => "Lap Times",
        }
    }
}

/// A rendered query result with its metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub metadata: ReportMetadata,
    pub report: ReportBody,
    /// Rounds that could not be fetched; empty for complete reports.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub degraded_rounds: Vec<DegradedRound>,
}

impl Document {
    pub fn new(metadata: ReportMetadata, report: ReportBody) -> Self {
        Self {
            metadata,
            report,
            degraded_rounds: Vec::new(),
        }
    }

    /// Attach the rounds a partial aggregation lost.
    pub fn with_degraded(mut self, degraded: Option<&PartialAggregationError>) -> Self {
        if let Some(warning) = degraded {
            self.degraded_rounds = warning
                .failures
                .iter()
                .map(|f| DegradedRound {
                    round: f.round.clone(),
                    reason: f.error.to_string(),
                })
                .collect();
        }
        self
    }
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(document: &Document) -> String {
    let mut output = String::new();

    output.push_str(&format!("# {}\n\n", document.report.title()));
    output.push_str(&generate_metadata_section(&document.metadata));
    output.push_str(&generate_degraded_section(&document.degraded_rounds));

    match &document.report {
        ReportBody::Seasonal(report) => output.push_str(&generate_seasonal_section(report)),
        ReportBody::DriverStandings(report) => {
            output.push_str(&generate_driver_standings_section(report))
        }
        ReportBody::ConstructorStandings(report) => {
            output.push_str(&generate_constructor_standings_section(report))
        }
        ReportBody::Schedule(report) => output.push_str(&generate_schedule_section(report)),
        ReportBody::Circuits(report) => output.push_str(&generate_circuits_section(report)),
        ReportBody::LapTimes(report) => output.push_str(&generate_lap_times_section(report)),
    }

    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Season:** {}\n", metadata.season));
    section.push_str(&format!("- **Source:** {}\n", metadata.source));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Query Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// List rounds that were lost, so an incomplete report is never silent.
fn generate_degraded_section(degraded: &[DegradedRound]) -> String {
    if degraded.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Degraded Rounds\n\n");
    section.push_str(&format!(
        "{} round(s) could not be fetched and contribute no records:\n\n",
        degraded.len()
    ));
    section.push_str("| Round | Reason |\n");
    section.push_str("|:---:|:---|\n");
    for round in degraded {
        section.push_str(&format!(
            "| {} | {} |\n",
            escape_cell(&round.round),
            escape_cell(&round.reason)
        ));
    }
    section.push('\n');

    section
}

fn generate_seasonal_section(report: &SeasonReport) -> String {
    let mut section = String::new();

    section.push_str("## Drivers\n\n");

    if report.drivers.is_empty() {
        section.push_str("No results have been published for this season yet.\n\n");
        return section;
    }

    section.push_str("| # | Driver | Code | Nationality | Rounds | Points |\n");
    section.push_str("|:---:|:---|:---:|:---|:---:|---:|\n");
    for (i, entry) in report.drivers.iter().enumerate() {
        section.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            i + 1,
            entry.driver.full_name(),
            entry.driver.code.as_deref().unwrap_or("-"),
            entry.driver.nationality,
            entry.records.len(),
            format_points(entry.total_points()),
        ));
    }
    section.push('\n');

    section.push_str("## Round by Round\n\n");
    for entry in &report.drivers {
        section.push_str(&format!(
            "### {} (`{}`)\n\n",
            entry.driver.full_name(),
            entry.driver.id
        ));
        section.push_str("| Round | Position | Points | Status |\n");
        section.push_str("|:---:|:---:|---:|:---|\n");
        for record in &entry.records {
            section.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                record.round,
                record.position,
                format_points(record.points),
                record.status
            ));
        }
        section.push('\n');
    }

    section
}

fn generate_driver_standings_section(report: &DriverStandingsReport) -> String {
    let mut section = String::new();

    section.push_str(&format!("## After Round {}\n\n", report.round));
    section.push_str("| Pos | Driver | Teams | Wins | Points |\n");
    section.push_str("|:---:|:---|:---|:---:|---:|\n");
    for standing in &report.standings {
        section.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            standing.position,
            standing.driver.full_name(),
            standing.constructors.join(", "),
            standing.wins,
            format_points(standing.points),
        ));
    }
    section.push('\n');

    section
}

fn generate_constructor_standings_section(report: &ConstructorStandingsReport) -> String {
    let mut section = String::new();

    section.push_str(&format!("## After Round {}\n\n", report.round));
    section.push_str("| Pos | Team | Nationality | Wins | Points |\n");
    section.push_str("|:---:|:---|:---|:---:|---:|\n");
    for standing in &report.standings {
        section.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            standing.position,
            standing.constructor.name,
            standing.constructor.nationality,
            standing.wins,
            format_points(standing.points),
        ));
    }
    section.push('\n');

    section
}

fn generate_schedule_section(report: &ScheduleReport) -> String {
    let mut section = String::new();

    section.push_str("## Races\n\n");
    section.push_str("| Round | Race | Date | Circuit |\n");
    section.push_str("|:---:|:---|:---:|:---|\n");
    for race in &report.races {
        let circuit = race
            .circuit
            .as_ref()
            .map(|c| format!("{} ({}, {})", c.name, c.locality, c.country))
            .unwrap_or_default();
        section.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            race.round, race.race_name, race.date, circuit
        ));
    }
    section.push('\n');

    section
}

fn generate_circuits_section(report: &CircuitsReport) -> String {
    let mut section = String::new();

    section.push_str("## Circuits\n\n");
    section.push_str("| Circuit | Locality | Country |\n");
    section.push_str("|:---|:---|:---|\n");
    for circuit in &report.circuits {
        section.push_str(&format!(
            "| {} (`{}`) | {} | {} |\n",
            circuit.name, circuit.id, circuit.locality, circuit.country
        ));
    }
    section.push('\n');

    section
}

fn generate_lap_times_section(report: &LapTimesReport) -> String {
    let mut section = String::new();

    section.push_str(&format!(
        "## {} (Round {}), Lap {}\n\n",
        report.race_name, report.round, report.lap
    ));
    if let Some(ref circuit) = report.circuit {
        section.push_str(&format!("- **Circuit:** {}\n\n", circuit.name));
    }
    section.push_str("| Pos | Driver | Time |\n");
    section.push_str("|:---:|:---|---:|\n");
    for timing in &report.timings {
        section.push_str(&format!(
            "| {} | {} | {} |\n",
            timing.position, timing.driver_id, timing.time
        ));
    }
    section.push('\n');

    section
}

/// Keep free text from splitting a table row.
fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

/// Whole points without a trailing ".0".
fn format_points(points: f64) -> String {
    if points.fract() == 0.0 {
        format!("{:.0}", points)
    } else {
        format!("{}", points)
    }
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by pitwall v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(document: &Document) -> Result<String> {
    serde_json::to_string_pretty(document).map_err(Into::into)
}
