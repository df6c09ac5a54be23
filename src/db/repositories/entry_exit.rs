use crate::db::models::entry_exit_models::format_timestamp;
use crate::db::models::{EntryExitEvent, EntryExitRow, EntryKind, VehicleAttributes};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info};

/// Entry/exit repository for the vehicle movement log
#[derive(Clone)]
pub struct EntryExitRepository {
    pool: Arc<SqlitePool>,
}

impl EntryExitRepository {
    /// Create a new entry/exit repository
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    /// Apply one sighting of `plate` at `at` inside a single transaction.
    ///
    /// Registers the vehicle with placeholder attributes when it is unknown, then
    /// closes its open event if there is one, or opens a new one.
    /// Callers must serialize sightings of the same plate.
    pub async fn toggle(
        &self,
        plate: &str,
        image_path: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<(EntryKind, EntryExitEvent)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::database("Failed to begin transaction", e))?;

        let placeholder = VehicleAttributes::placeholder(image_path.map(str::to_string));
        let created = sqlx::query(
            r#"
            INSERT INTO vehicles (plate, vehicle_type, color, owner_name, owner_id, affiliation, image_path)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (plate) DO NOTHING
            "#,
        )
        .bind(plate)
        .bind(&placeholder.vehicle_type)
        .bind(&placeholder.color)
        .bind(&placeholder.owner_name)
        .bind(&placeholder.owner_id)
        .bind(&placeholder.affiliation)
        .bind(&placeholder.image_path)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::database("Failed to register vehicle", e))?;

        if created.rows_affected() > 0 {
            info!("Registered unknown vehicle {} with placeholder attributes", plate);
        }

        // Look up by open state, not recency: imported sightings can predate
        // events that are already closed
        let open = sqlx::query_as::<_, EntryExitRow>(
            r#"
            SELECT id, plate, in_time, out_time
            FROM entry_exit
            WHERE plate = ?1 AND out_time IS NULL
            LIMIT 1
            "#,
        )
        .bind(plate)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| Error::database("Failed to read open entry/exit event", e))?
        .map(EntryExitEvent::try_from)
        .transpose()?;

        let (kind, row) = match open {
            Some(open) => {
                // Never close an event before it was opened
                let exit_time = at.max(open.entry_time);
                let row = sqlx::query_as::<_, EntryExitRow>(
                    r#"
                    UPDATE entry_exit SET out_time = ?1
                    WHERE id = ?2
                    RETURNING id, plate, in_time, out_time
                    "#,
                )
                .bind(format_timestamp(&exit_time))
                .bind(open.id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| Error::database("Failed to log exit", e))?;
                (EntryKind::Exit, row)
            }
            None => {
                let row = sqlx::query_as::<_, EntryExitRow>(
                    r#"
                    INSERT INTO entry_exit (plate, in_time)
                    VALUES (?1, ?2)
                    RETURNING id, plate, in_time, out_time
                    "#,
                )
                .bind(plate)
                .bind(format_timestamp(&at))
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| Error::database("Failed to log entry", e))?;
                (EntryKind::Entry, row)
            }
        };

        tx.commit()
            .await
            .map_err(|e| Error::database("Failed to commit sighting", e))?;

        debug!("Logged {} for vehicle {} (event {})", kind, plate, row.id);
        Ok((kind, EntryExitEvent::try_from(row)?))
    }

    /// The event of a vehicle currently inside, if any
    pub async fn get_open(&self, plate: &str) -> Result<Option<EntryExitEvent>> {
        sqlx::query_as::<_, EntryExitRow>(
            r#"
            SELECT id, plate, in_time, out_time
            FROM entry_exit
            WHERE plate = ?1 AND out_time IS NULL
            ORDER BY in_time DESC
            LIMIT 1
            "#,
        )
        .bind(plate)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::database("Failed to get open event", e))?
        .map(EntryExitEvent::try_from)
        .transpose()
    }

    /// Number of open events for a plate; the schema keeps this at zero or one
    pub async fn count_open(&self, plate: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM entry_exit WHERE plate = ?1 AND out_time IS NULL",
        )
        .bind(plate)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::database("Failed to count open events", e))?;

        Ok(count)
    }

    /// Search events with combined filters, most recent entry first.
    ///
    /// Time bounds apply to the entry timestamp and are inclusive.
    pub async fn search(
        &self,
        plate: Option<&str>,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<Vec<EntryExitEvent>> {
        let mut sql = String::from(
            r#"
            SELECT id, plate, in_time, out_time
            FROM entry_exit
            WHERE 1=1
            "#,
        );

        let mut params: Vec<String> = Vec::new();

        if let Some(plate) = plate {
            params.push(plate.to_string());
            sql.push_str(&format!(" AND plate = ?{}", params.len()));
        }

        if let Some(start_time) = start_time {
            params.push(format_timestamp(&start_time));
            sql.push_str(&format!(" AND in_time >= ?{}", params.len()));
        }

        if let Some(end_time) = end_time {
            params.push(format_timestamp(&end_time));
            sql.push_str(&format!(" AND in_time <= ?{}", params.len()));
        }

        sql.push_str(" ORDER BY in_time DESC, id DESC");

        let mut db_query = sqlx::query_as::<_, EntryExitRow>(&sql);

        for param in params {
            db_query = db_query.bind(param);
        }

        let rows = db_query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| Error::database("Failed to search entry/exit events", e))?;

        rows.into_iter().map(EntryExitEvent::try_from).collect()
    }
}
