//! Vehicle registry and entry/exit ledger.
//!
//! Every confirmed sighting toggles a vehicle between "inside" (one open event)
//! and "outside" (no open event). Sightings of the same plate are serialized by
//! a per-plate lock around a single database transaction.

pub mod locks;
pub mod plate;


pub use locks::PlateLocks;
pub use plate::normalize_plate;

use crate::db::models::{EntryExitEvent, EntryKind, Vehicle, VehicleAttributes};
use crate::db::repositories::{EntryExitRepository, VehiclesRepository};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use log::info;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;

pub struct Ledger {
    vehicles: VehiclesRepository,
    events: EntryExitRepository,
    locks: PlateLocks,
}

impl Ledger {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self {
            vehicles: VehiclesRepository::new(pool.clone()),
            events: EntryExitRepository::new(pool),
            locks: PlateLocks::new(),
        }
    }

    pub async fn get_vehicle(&self, plate: &str) -> Result<Option<Vehicle>> {
        let plate = normalize_plate(plate)?;
        self.vehicles.get_by_plate(&plate).await
    }

    pub async fn list_vehicles(&self) -> Result<Vec<Vehicle>> {
        self.vehicles.get_all().await
    }

    /// Register a new vehicle. A plate that is already known is rejected.
    pub async fn add_vehicle(&self, plate: &str, attributes: VehicleAttributes) -> Result<Vehicle> {
        let plate = normalize_plate(plate)?;
        self.vehicles
            .create(&Vehicle::new(plate, attributes))
            .await
    }

    /// Create the vehicle or overwrite its attributes. History is kept.
    pub async fn upsert_vehicle(
        &self,
        plate: &str,
        attributes: VehicleAttributes,
    ) -> Result<Vehicle> {
        let plate = normalize_plate(plate)?;
        self.vehicles
            .upsert(&Vehicle::new(plate, attributes))
            .await
    }

    /// Edit the attributes of a known vehicle
    pub async fn update_vehicle(
        &self,
        plate: &str,
        attributes: VehicleAttributes,
    ) -> Result<Vehicle> {
        let plate = normalize_plate(plate)?;
        self.vehicles
            .update(&plate, &attributes)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Vehicle {}", plate)))
    }

    /// Remove a vehicle and its whole entry/exit history
    pub async fn delete_vehicle(&self, plate: &str) -> Result<()> {
        let plate = normalize_plate(plate)?;

        // Keep deletion from interleaving with a sighting of the same plate
        let _guard = self.locks.acquire(&plate).await;

        if self.vehicles.delete(&plate).await? {
            Ok(())
        } else {
            Err(Error::NotFound(format!("Vehicle {}", plate)))
        }
    }

    /// Record a confirmed sighting now. See [`Ledger::record_sighting_at`].
    pub async fn record_sighting(&self, plate: &str, image_path: Option<&Path>) -> Result<EntryKind> {
        self.record_sighting_at(plate, image_path, Utc::now())
            .await
            .map(|(kind, _)| kind)
    }

    /// Apply the toggle rule for `plate` at `at`.
    ///
    /// Closes the vehicle's open event and reports `Exit`, or opens a new one and
    /// reports `Entry`. Unknown plates are registered with placeholder
    /// attributes first, using `image_path` as their reference image.
    pub async fn record_sighting_at(
        &self,
        plate: &str,
        image_path: Option<&Path>,
        at: DateTime<Utc>,
    ) -> Result<(EntryKind, EntryExitEvent)> {
        let plate = normalize_plate(plate)?;
        let image_path = image_path.map(|p| p.to_string_lossy().into_owned());

        let _guard = self.locks.acquire(&plate).await;
        let (kind, event) = self
            .events
            .toggle(&plate, image_path.as_deref(), at)
            .await?;

        info!("{} logged for vehicle {}", kind, plate);
        Ok((kind, event))
    }

    /// The open event of a vehicle that is currently inside
    pub async fn open_event(&self, plate: &str) -> Result<Option<EntryExitEvent>> {
        let plate = normalize_plate(plate)?;
        self.events.get_open(&plate).await
    }

    /// Whole history of one vehicle, most recent entry first
    pub async fn history(&self, plate: &str) -> Result<Vec<EntryExitEvent>> {
        let plate = normalize_plate(plate)?;
        self.events.search(Some(&plate), None, None).await
    }

    /// Number of open events; zero or one for any plate
    pub async fn count_open(&self, plate: &str) -> Result<i64> {
        let plate = normalize_plate(plate)?;
        self.events.count_open(&plate).await
    }
}
