#![forbid(unsafe_code)]

pub(in crate::store) mod pending_tx;
pub(in crate::store) mod revision_tx;
pub(in crate::store) mod schema;
pub(in crate::store) mod tags_tx;
pub(in crate::store) mod views;

use super::StoreError;
use gv_core::Lookup;
use rusqlite::{Connection, Params, Row};

pub(in crate::store) fn query_lookup<T, P, F>(
    conn: &Connection,
    sql: &str,
    params: P,
    f: F,
) -> Result<Lookup<T>, StoreError>
where
    P: Params,
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare(sql)?;
    let rows: Vec<T> = stmt.query_map(params, f)?.collect::<Result<_, _>>()?;
    Ok(Lookup::from_rows(rows))
}

/// Resolves an at-most-one read. Extra rows mean the store's own invariants
/// were broken somewhere; that is logged and the first row wins.
pub(in crate::store) fn settle<T: std::fmt::Debug>(
    lookup: Lookup<T>,
    what: &'static str,
) -> Option<T> {
    if let Lookup::TooMany(rows) = &lookup {
        tracing::warn!(
            what,
            row_count = rows.len(),
            first = ?rows.first(),
            "data integrity: expected at most one row, keeping the first"
        );
    }
    lookup.into_first()
}
