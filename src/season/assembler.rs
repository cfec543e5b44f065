//! Season report assembly.
//!
//! Pure transform from the aggregator's merge state to the exposed
//! [`SeasonReport`]. Runs after every round has been merged.

use crate::models::{compare_rounds, DriverSeasonEntry, SeasonReport};
use crate::season::aggregator::SeasonMerge;
use std::cmp::Ordering;

/// How the merged entries are shaped into a report.
#[derive(Debug, Clone, Default)]
pub struct AssemblyOptions {
    /// Sort each driver's records into calendar order.
    pub sort_records: bool,
    /// Keep only the best `top` drivers by points; zero or `None` keeps all.
    pub top: Option<usize>,
}

/// Build the season report from the merged entries.
pub fn assemble(season: &str, merge: SeasonMerge, options: &AssemblyOptions) -> SeasonReport {
    let mut drivers: Vec<DriverSeasonEntry> = merge.into_entries().into_values().collect();

    if options.sort_records {
        for entry in &mut drivers {
            entry
                .records
                .sort_by(|a, b| compare_rounds(&a.round, &b.round));
        }
    }

    drivers.sort_by(rank);

    if let Some(top) = options.top.filter(|n| *n > 0) {
        drivers.truncate(top);
    }

    SeasonReport {
        season: season.to_string(),
        drivers,
    }
}

/// Most points first, ties broken by driver identifier.
fn rank(a: &DriverSeasonEntry, b: &DriverSeasonEntry) -> Ordering {
    b.total_points()
        .partial_cmp(&a.total_points())
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.driver.id.cmp(&b.driver.id))
}
