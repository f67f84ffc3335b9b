//! RFC-3339 helpers. All timestamps written to the database are UTC with
//! millisecond precision and a `Z` suffix, the same shape the SQLite
//! `strftime('%Y-%m-%dT%H:%M:%fZ')` defaults produce.

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};

/// UTC -> `2025-09-01T12:00:00.000Z`.
pub fn to_rfc3339_millis(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// RFC-3339 with offset -> UTC.
pub fn parse_ts_to_utc(s: &str) -> anyhow::Result<DateTime<Utc>> {
    let dt = DateTime::parse_from_rfc3339(s).with_context(|| format!("bad rfc3339: {s}"))?;
    Ok(dt.with_timezone(&Utc))
}
