use crate::error::{Error, Result};
use sqlx::{Executor, SqlitePool};
use tracing::debug;

/// Migration scripts compiled into the binary, keyed by file name
const MIGRATIONS: &[(&str, &str)] = &[
    ("add_indexes.sql", include_str!("sql/add_indexes.sql")),
    (
        "001_create_vehicles.sql",
        include_str!("sql/001_create_vehicles.sql"),
    ),
    (
        "002_create_entry_exit.sql",
        include_str!("sql/002_create_entry_exit.sql"),
    ),
];

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let mut entries: Vec<&(&str, &str)> = MIGRATIONS.iter().collect();

    // Numbered files first, then foreign keys, then indexes
    entries.sort_by_key(|(name, _)| order_value(name));

    for (name, sql) in entries {
        run_single_migration(pool, name, sql).await?;
    }

    Ok(())
}

fn order_value(name: &str) -> usize {
    if name.starts_with("add_foreign_keys") {
        1000
    } else if name.starts_with("add_indexes") {
        2000
    } else {
        name.split('_')
            .next()
            .and_then(|prefix| prefix.parse::<usize>().ok())
            .unwrap_or(usize::MAX)
    }
}

async fn run_single_migration(pool: &SqlitePool, name: &str, sql: &str) -> Result<()> {
    pool.execute(sql)
        .await
        .map_err(|e| Error::database(&format!("Failed to apply migration {}", name), e))?;

    debug!("Applied migration: {}", name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_order() {
        assert!(order_value("001_create_vehicles.sql") < order_value("002_create_entry_exit.sql"));
        assert!(order_value("002_create_entry_exit.sql") < order_value("add_indexes.sql"));
        assert_eq!(order_value("notes.sql"), usize::MAX);
    }
}
