use crate::error::Error;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Storage format for `in_time` / `out_time`.
///
/// Fixed width so that ordering the text column orders the timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Which side of the toggle a sighting landed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    Entry,
    Exit,
}

impl Display for EntryKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Entry => write!(f, "entry"),
            Self::Exit => write!(f, "exit"),
        }
    }
}

/// Entry/exit event model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryExitEvent {
    pub id: i64,
    pub plate: String,
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
}

impl EntryExitEvent {
    /// An open event means the vehicle is currently inside
    pub fn is_open(&self) -> bool {
        self.exit_time.is_none()
    }

    /// Time spent inside, unknown while the event is still open
    pub fn duration(&self) -> Option<Duration> {
        self.exit_time.map(|exit| exit - self.entry_time)
    }
}

/// Raw `entry_exit` row as stored in SQLite
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EntryExitRow {
    pub id: i64,
    pub plate: String,
    pub in_time: String,
    pub out_time: Option<String>,
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.naive_utc().format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, Error> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| Error::PersistenceFailure(format!("Malformed timestamp {:?}: {}", value, e)))
}

impl TryFrom<EntryExitRow> for EntryExitEvent {
    type Error = Error;

    fn try_from(row: EntryExitRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            entry_time: parse_timestamp(&row.in_time)?,
            exit_time: row.out_time.as_deref().map(parse_timestamp).transpose()?,
            plate: row.plate,
        })
    }
}
