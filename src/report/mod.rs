//! Read side of the ledger: event search, paging, CSV export and fuzzy
//! vehicle lookup.

pub mod similarity;

#[cfg(test)]
mod tests;

pub use similarity::similarity;

use crate::config::ReportsConfig;
use crate::db::models::{EntryExitEvent, Vehicle};
use crate::db::repositories::{EntryExitRepository, VehiclesRepository};
use crate::error::{Error, Result};
use crate::ledger::normalize_plate;
use chrono::{DateTime, Duration, Utc};
use log::info;
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;

/// Timestamp layout used in exports and listings
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Shown for the exit time and duration of a vehicle still inside
pub const UNAVAILABLE: &str = "N/A";

/// Filters for [`ReportQuery::search`]; every field is optional
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub plate: Option<String>,
    /// Inclusive lower bound on the entry time
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the entry time
    pub end: Option<DateTime<Utc>>,
}

/// One entry/exit event as listed in reports
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventView {
    pub plate: String,
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub duration: Option<Duration>,
}

impl EventView {
    pub fn duration_text(&self) -> String {
        format_duration(self.duration)
    }
}

impl From<EntryExitEvent> for EventView {
    fn from(event: EntryExitEvent) -> Self {
        Self {
            duration: event.duration(),
            plate: event.plate,
            entry_time: event.entry_time,
            exit_time: event.exit_time,
        }
    }
}

/// `HH:MM:SS` with hours counted past 24, or `N/A` when unknown
pub fn format_duration(duration: Option<Duration>) -> String {
    match duration {
        Some(duration) => {
            let secs = duration.num_seconds().max(0);
            format!(
                "{:02}:{:02}:{:02}",
                secs / 3600,
                (secs % 3600) / 60,
                secs % 60
            )
        }
        None => UNAVAILABLE.to_string(),
    }
}

pub fn format_time(time: &DateTime<Utc>) -> String {
    time.format(DISPLAY_FORMAT).to_string()
}

/// One page of a result list
#[derive(Debug, PartialEq)]
pub struct Page<'a, T> {
    pub items: &'a [T],
    /// 1-based page number that was requested
    pub page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

/// Slice `results` into pages of `page_size` and return page `page_number`.
///
/// Pages are numbered from 1; a page outside `1..=total_pages` is empty. A page
/// size of zero is treated as one.
pub fn page<T>(results: &[T], page_number: usize, page_size: usize) -> Page<'_, T> {
    let page_size = page_size.max(1);
    let total_items = results.len();
    let total_pages = total_items.div_ceil(page_size);

    let items = if page_number == 0 || page_number > total_pages {
        &results[..0]
    } else {
        let start = (page_number - 1) * page_size;
        let end = (start + page_size).min(total_items);
        &results[start..end]
    };

    Page {
        items,
        page: page_number,
        total_pages,
        total_items,
    }
}

/// A vehicle matched by free-text search with its best attribute score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredVehicle {
    pub vehicle: Vehicle,
    pub score: f64,
}

pub struct ReportQuery {
    events: EntryExitRepository,
    vehicles: VehiclesRepository,
    similarity_threshold: f64,
}

impl ReportQuery {
    pub fn new(pool: Arc<SqlitePool>, config: &ReportsConfig) -> Self {
        Self {
            events: EntryExitRepository::new(pool.clone()),
            vehicles: VehiclesRepository::new(pool),
            similarity_threshold: config.similarity_threshold,
        }
    }

    /// Events matching `filter`, most recent entry first
    pub async fn search(&self, filter: &SearchFilter) -> Result<Vec<EventView>> {
        if let (Some(start), Some(end)) = (filter.start, filter.end) {
            if start > end {
                return Err(Error::ConstraintViolation(format!(
                    "Start time {} is after end time {}",
                    format_time(&start),
                    format_time(&end)
                )));
            }
        }

        let plate = match filter.plate.as_deref().map(str::trim) {
            Some(plate) if !plate.is_empty() => Some(normalize_plate(plate)?),
            _ => None,
        };

        let events = self
            .events
            .search(plate.as_deref(), filter.start, filter.end)
            .await?;

        Ok(events.into_iter().map(EventView::from).collect())
    }

    /// Vehicles whose attributes resemble `text`, best match first.
    ///
    /// A blank query lists every vehicle with a full score.
    pub async fn search_vehicles(&self, text: &str) -> Result<Vec<ScoredVehicle>> {
        let query = text.trim();
        let vehicles = self.vehicles.get_all().await?;

        if query.is_empty() {
            return Ok(vehicles
                .into_iter()
                .map(|vehicle| ScoredVehicle {
                    vehicle,
                    score: 100.0,
                })
                .collect());
        }

        let mut matches: Vec<ScoredVehicle> = vehicles
            .into_iter()
            .filter_map(|vehicle| {
                let score = vehicle
                    .text_fields()
                    .iter()
                    .map(|field| similarity(query, field.trim()))
                    .fold(0.0, f64::max);

                (score >= self.similarity_threshold).then_some(ScoredVehicle { vehicle, score })
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.vehicle.plate.cmp(&b.vehicle.plate))
        });

        Ok(matches)
    }

    /// Write `results` as CSV, returns the number of data rows
    pub async fn export_csv(&self, results: &[EventView], path: &Path) -> Result<usize> {
        write_csv(path, &events_csv(results)).await?;
        info!("Exported {} events to {}", results.len(), path.display());
        Ok(results.len())
    }

    /// Write the vehicle registry as CSV, returns the number of data rows
    pub async fn export_vehicles_csv(&self, vehicles: &[Vehicle], path: &Path) -> Result<usize> {
        write_csv(path, &vehicles_csv(vehicles)).await?;
        info!("Exported {} vehicles to {}", vehicles.len(), path.display());
        Ok(vehicles.len())
    }
}

fn events_csv(results: &[EventView]) -> String {
    let mut out = String::from("plate,entry_time,exit_time,duration\n");
    for event in results {
        let exit_time = event
            .exit_time
            .as_ref()
            .map(format_time)
            .unwrap_or_else(|| UNAVAILABLE.to_string());

        push_row(
            &mut out,
            &[
                &event.plate,
                &format_time(&event.entry_time),
                &exit_time,
                &event.duration_text(),
            ],
        );
    }
    out
}

fn vehicles_csv(vehicles: &[Vehicle]) -> String {
    let mut out =
        String::from("plate,vehicle_type,color,owner_name,owner_id,affiliation,image_path\n");
    for vehicle in vehicles {
        push_row(
            &mut out,
            &[
                &vehicle.plate,
                &vehicle.vehicle_type,
                &vehicle.color,
                &vehicle.owner_name,
                &vehicle.owner_id,
                &vehicle.affiliation,
                vehicle.image_path.as_deref().unwrap_or(""),
            ],
        );
    }
    out
}

fn push_row(out: &mut String, fields: &[&str]) {
    let row: Vec<String> = fields.iter().map(|field| csv_field(field)).collect();
    out.push_str(&row.join(","));
    out.push('\n');
}

/// Quote a field when it contains a separator, a quote or a line break
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

async fn write_csv(path: &Path, contents: &str) -> Result<()> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| Error::Io(format!("Failed to write {}: {}", path.display(), e)))
}
