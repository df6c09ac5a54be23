use crate::db::models::{Vehicle, VehicleAttributes};
use crate::error::{Error, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

/// Vehicles repository for handling vehicle registry operations
#[derive(Clone)]
pub struct VehiclesRepository {
    pool: Arc<SqlitePool>,
}

impl VehiclesRepository {
    /// Create a new vehicles repository
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    /// Insert a new vehicle; an existing plate is a constraint violation
    pub async fn create(&self, vehicle: &Vehicle) -> Result<Vehicle> {
        info!("Creating new vehicle: {}", vehicle.plate);

        let result = sqlx::query_as::<_, Vehicle>(
            r#"
            INSERT INTO vehicles (plate, vehicle_type, color, owner_name, owner_id, affiliation, image_path)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            RETURNING plate, vehicle_type, color, owner_name, owner_id, affiliation, image_path
            "#,
        )
        .bind(&vehicle.plate)
        .bind(&vehicle.vehicle_type)
        .bind(&vehicle.color)
        .bind(&vehicle.owner_name)
        .bind(&vehicle.owner_id)
        .bind(&vehicle.affiliation)
        .bind(&vehicle.image_path)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::database(&format!("Failed to create vehicle {}", vehicle.plate), e))?;

        Ok(result)
    }

    /// Insert or update in place.
    ///
    /// Uses `ON CONFLICT DO UPDATE` rather than `INSERT OR REPLACE`: a replace
    /// deletes the old row first, which would cascade into the entry/exit history.
    pub async fn upsert(&self, vehicle: &Vehicle) -> Result<Vehicle> {
        let result = sqlx::query_as::<_, Vehicle>(
            r#"
            INSERT INTO vehicles (plate, vehicle_type, color, owner_name, owner_id, affiliation, image_path)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (plate) DO UPDATE SET
                vehicle_type = excluded.vehicle_type,
                color = excluded.color,
                owner_name = excluded.owner_name,
                owner_id = excluded.owner_id,
                affiliation = excluded.affiliation,
                image_path = excluded.image_path
            RETURNING plate, vehicle_type, color, owner_name, owner_id, affiliation, image_path
            "#,
        )
        .bind(&vehicle.plate)
        .bind(&vehicle.vehicle_type)
        .bind(&vehicle.color)
        .bind(&vehicle.owner_name)
        .bind(&vehicle.owner_id)
        .bind(&vehicle.affiliation)
        .bind(&vehicle.image_path)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::database(&format!("Failed to upsert vehicle {}", vehicle.plate), e))?;

        Ok(result)
    }

    /// Update attributes of an existing vehicle, `None` when the plate is unknown
    pub async fn update(
        &self,
        plate: &str,
        attributes: &VehicleAttributes,
    ) -> Result<Option<Vehicle>> {
        let result = sqlx::query_as::<_, Vehicle>(
            r#"
            UPDATE vehicles
            SET vehicle_type = ?1, color = ?2, owner_name = ?3, owner_id = ?4,
                affiliation = ?5, image_path = ?6
            WHERE plate = ?7
            RETURNING plate, vehicle_type, color, owner_name, owner_id, affiliation, image_path
            "#,
        )
        .bind(&attributes.vehicle_type)
        .bind(&attributes.color)
        .bind(&attributes.owner_name)
        .bind(&attributes.owner_id)
        .bind(&attributes.affiliation)
        .bind(&attributes.image_path)
        .bind(plate)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::database(&format!("Failed to update vehicle {}", plate), e))?;

        Ok(result)
    }

    /// Get vehicle by plate
    pub async fn get_by_plate(&self, plate: &str) -> Result<Option<Vehicle>> {
        let result = sqlx::query_as::<_, Vehicle>(
            r#"
            SELECT plate, vehicle_type, color, owner_name, owner_id, affiliation, image_path
            FROM vehicles
            WHERE plate = ?1
            "#,
        )
        .bind(plate)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::database("Failed to get vehicle by plate", e))?;

        Ok(result)
    }

    /// Get all vehicles ordered by plate
    pub async fn get_all(&self) -> Result<Vec<Vehicle>> {
        let result = sqlx::query_as::<_, Vehicle>(
            r#"
            SELECT plate, vehicle_type, color, owner_name, owner_id, affiliation, image_path
            FROM vehicles
            ORDER BY plate
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::database("Failed to get vehicles", e))?;

        Ok(result)
    }

    /// Delete a vehicle together with its entry/exit history.
    ///
    /// Returns false when no vehicle had this plate.
    pub async fn delete(&self, plate: &str) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::database("Failed to begin transaction", e))?;

        let events = sqlx::query("DELETE FROM entry_exit WHERE plate = ?1")
            .bind(plate)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::database("Failed to delete entry/exit history", e))?;

        let vehicles = sqlx::query("DELETE FROM vehicles WHERE plate = ?1")
            .bind(plate)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::database(&format!("Failed to delete vehicle {}", plate), e))?;

        if vehicles.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| Error::database("Failed to roll back transaction", e))?;
            return Ok(false);
        }

        tx.commit()
            .await
            .map_err(|e| Error::database("Failed to commit vehicle deletion", e))?;

        info!(
            "Deleted vehicle {} and {} entry/exit records",
            plate,
            events.rows_affected()
        );
        Ok(true)
    }
}
