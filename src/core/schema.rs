//! Rule table lifecycle
//!
//! `ensure_table` runs on every store construction and must stay idempotent.
//! `drop_table` is only used by a full save, right before the table is
//! recreated.

use crate::error::Result;
use crate::sql::{self, Table};
use crate::validation::index_name;
use rusqlite::Connection;
use tracing::{debug, info};

/// Create the table and its unique index if either is missing
pub fn ensure_table(conn: &Connection, table: &Table<'_>) -> Result<()> {
    sql::ensure_table_schema(conn, table)?;

    if !table.shape.unique_index {
        debug!("Unique index disabled for {}", table.name);
        return Ok(());
    }

    let index = index_name(table.name);
    if !sql::has_index(conn, &index)? {
        sql::create_unique_index(conn, table, &index)?;
        info!("Created unique index {} on {}", index, table.name);
    }

    Ok(())
}

pub fn drop_table(conn: &Connection, table: &Table<'_>) -> Result<()> {
    sql::drop_table(conn, table)?;
    info!("Dropped table {}", table.name);
    Ok(())
}
