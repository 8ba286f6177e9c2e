//! SQLite statements for the rule table
//!
//! The only module that produces SQL text. Every function takes a
//! `&Connection`, so callers can pass either a plain connection or a
//! `rusqlite::Transaction` (which derefs to one).

use crate::config::RecordShape;
use crate::error::Result;
use crate::predicate::{Column, Condition, Predicate};
use crate::record::{RuleRecord, FIELD_COUNT};
use crate::validation::Identifier;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use tracing::{debug, info};

const ID_COLUMN: &str = "id";

/// Bound parameters per rule row (policy type + fields)
const VALUES_PER_ROW: usize = FIELD_COUNT + 1;

/// SQLite's default `SQLITE_MAX_VARIABLE_NUMBER` (3.32+, as bundled)
const MAX_BOUND_PARAMETERS: usize = 32766;

/// Most rows one INSERT can carry without exceeding the parameter limit
pub const MAX_ROWS_PER_INSERT: usize = MAX_BOUND_PARAMETERS / VALUES_PER_ROW;

/// Table name plus column layout; enough to render any statement
#[derive(Debug, Clone, Copy)]
pub struct Table<'a> {
    pub name: &'a Identifier,
    pub shape: &'a RecordShape,
}

impl<'a> Table<'a> {
    fn column(&self, column: Column) -> String {
        self.shape.column_name(column).quoted()
    }

    fn rule_columns(&self) -> String {
        Column::ALL
            .iter()
            .map(|c| self.column(*c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn column_definition(&self, column: Column) -> String {
        format!(
            "{} VARCHAR({}) NOT NULL DEFAULT ''",
            self.column(column),
            self.shape.column_width(column)
        )
    }
}

/// Render `predicate` as a WHERE clause (empty string for no conditions)
pub fn render_where<'p>(table: &Table<'_>, predicate: &'p Predicate) -> (String, Vec<&'p str>) {
    if predicate.is_empty() {
        return (String::new(), Vec::new());
    }

    let clauses: Vec<String> = predicate
        .conditions()
        .iter()
        .map(|condition| match condition {
            Condition::Eq { column, .. } => format!("{} = ?", table.column(*column)),
            Condition::In { column, values } => {
                let marks = vec!["?"; values.len()].join(", ");
                format!("{} IN ({})", table.column(*column), marks)
            }
        })
        .collect();

    (format!(" WHERE {}", clauses.join(" AND ")), predicate.args())
}

/// Create the rule table if absent, adding any rule column an existing table lacks
pub fn ensure_table_schema(conn: &Connection, table: &Table<'_>) -> Result<()> {
    let columns: Vec<String> = Column::ALL
        .iter()
        .map(|c| table.column_definition(*c))
        .collect();

    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {} ({} INTEGER PRIMARY KEY AUTOINCREMENT, {})",
        table.name.quoted(),
        ID_COLUMN,
        columns.join(", ")
    );
    debug!("Ensuring table schema: {}", sql);
    conn.execute(&sql, [])?;

    let existing = existing_columns(conn, table.name)?;
    for column in Column::ALL {
        let name = table.shape.column_name(column).as_str().to_ascii_lowercase();
        if existing.contains(&name) {
            continue;
        }
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {}",
            table.name.quoted(),
            table.column_definition(column)
        );
        info!("Migrating table {}: adding column {}", table.name, name);
        conn.execute(&sql, [])?;
    }

    Ok(())
}

fn existing_columns(conn: &Connection, table: &Identifier) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table.quoted()))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .map(|name| name.map(|n| n.to_ascii_lowercase()))
        .collect::<rusqlite::Result<HashSet<_>>>()?;
    Ok(names)
}

pub fn drop_table(conn: &Connection, table: &Table<'_>) -> Result<()> {
    let sql = format!("DROP TABLE IF EXISTS {}", table.name.quoted());
    debug!("Dropping table: {}", sql);
    conn.execute(&sql, [])?;
    Ok(())
}

pub fn has_index(conn: &Connection, index: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?1",
            [index],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Unique index over every rule column
pub fn create_unique_index(conn: &Connection, table: &Table<'_>, index: &str) -> Result<()> {
    let sql = format!(
        "CREATE UNIQUE INDEX \"{}\" ON {} ({})",
        index,
        table.name.quoted(),
        table.rule_columns()
    );
    debug!("Creating unique index: {}", sql);
    conn.execute(&sql, [])?;
    Ok(())
}

/// Insert `records` with multi-row statements
///
/// Callers chunk large batches (see `StoreConfig::batch_size`); a chunk larger
/// than [`MAX_ROWS_PER_INSERT`] is split further here.
pub fn insert(conn: &Connection, table: &Table<'_>, records: &[RuleRecord]) -> Result<usize> {
    let mut inserted = 0;
    for chunk in records.chunks(MAX_ROWS_PER_INSERT) {
        inserted += insert_statement(conn, table, chunk)?;
    }
    Ok(inserted)
}

fn insert_statement(conn: &Connection, table: &Table<'_>, records: &[RuleRecord]) -> Result<usize> {
    let row = format!("({})", vec!["?"; VALUES_PER_ROW].join(", "));
    let sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        table.name.quoted(),
        table.rule_columns(),
        vec![row.as_str(); records.len()].join(", ")
    );

    let mut args: Vec<&str> = Vec::with_capacity(records.len() * VALUES_PER_ROW);
    for record in records {
        args.push(&record.ptype);
        args.extend(record.storage_fields());
    }

    debug!("Inserting {} rules into {}", records.len(), table.name);
    Ok(conn.execute(&sql, params_from_iter(args))?)
}

/// Insert one record and return its assigned id
pub fn insert_one(conn: &Connection, table: &Table<'_>, record: &RuleRecord) -> Result<i64> {
    insert(conn, table, std::slice::from_ref(record))?;
    Ok(conn.last_insert_rowid())
}

pub fn delete_where(conn: &Connection, table: &Table<'_>, predicate: &Predicate) -> Result<usize> {
    let (clause, args) = render_where(table, predicate);
    let sql = format!("DELETE FROM {}{}", table.name.quoted(), clause);
    debug!("Deleting rules: {} {:?}", sql, args);
    Ok(conn.execute(&sql, params_from_iter(args))?)
}

pub fn delete_ids(conn: &Connection, table: &Table<'_>, ids: &[i64]) -> Result<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    let sql = format!(
        "DELETE FROM {} WHERE {} IN ({})",
        table.name.quoted(),
        ID_COLUMN,
        vec!["?"; ids.len()].join(", ")
    );
    debug!("Deleting {} rules by id from {}", ids.len(), table.name);
    Ok(conn.execute(&sql, params_from_iter(ids))?)
}

/// Matching records in insertion order
pub fn select_where(
    conn: &Connection,
    table: &Table<'_>,
    predicate: &Predicate,
) -> Result<Vec<RuleRecord>> {
    let (clause, args) = render_where(table, predicate);
    let sql = format!(
        "SELECT {}, {} FROM {}{} ORDER BY {}",
        ID_COLUMN,
        table.rule_columns(),
        table.name.quoted(),
        clause,
        ID_COLUMN
    );
    debug!("Selecting rules: {} {:?}", sql, args);

    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map(params_from_iter(args), record_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

/// Overwrite every rule column of matching rows with `new`
pub fn update_where(
    conn: &Connection,
    table: &Table<'_>,
    predicate: &Predicate,
    new: &RuleRecord,
) -> Result<usize> {
    let assignments: Vec<String> = Column::ALL
        .iter()
        .map(|c| format!("{} = ?", table.column(*c)))
        .collect();
    let (clause, where_args) = render_where(table, predicate);
    let sql = format!(
        "UPDATE {} SET {}{}",
        table.name.quoted(),
        assignments.join(", "),
        clause
    );

    let mut args: Vec<&str> = Vec::with_capacity(VALUES_PER_ROW + where_args.len());
    args.push(&new.ptype);
    args.extend(new.storage_fields());
    args.extend(where_args);

    debug!("Updating rules: {} {:?}", sql, args);
    Ok(conn.execute(&sql, params_from_iter(args))?)
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<RuleRecord> {
    let mut record = RuleRecord::new(row.get::<_, String>(1)?);
    record.id = Some(row.get(0)?);
    for i in 0..FIELD_COUNT {
        let value: String = row.get(i + 2)?;
        record.set_field(i, &value);
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::filter::Filter;
    use crate::predicate::{equality_predicate, set_predicate};

    fn setup() -> (Connection, StoreConfig) {
        let conn = Connection::open_in_memory().unwrap();
        let config = StoreConfig::default();
        (conn, config)
    }

    fn table(config: &StoreConfig) -> Table<'_> {
        Table {
            name: &config.table_name,
            shape: &config.shape,
        }
    }

    #[test]
    fn test_render_where() {
        let (_conn, config) = setup();
        let record = RuleRecord::from_tuple(&["p", "alice", "", "read"]).unwrap();
        let predicate = equality_predicate(&record);

        let (clause, args) = render_where(&table(&config), &predicate);
        assert_eq!(clause, " WHERE \"ptype\" = ? AND \"v0\" = ? AND \"v2\" = ?");
        assert_eq!(args, vec!["p", "alice", "read"]);

        let filter = Filter::new().field(1, ["d1", "d2"]);
        let predicate = set_predicate(&filter);
        let (clause, args) = render_where(&table(&config), &predicate);
        assert_eq!(clause, " WHERE \"v1\" IN (?, ?)");
        assert_eq!(args, vec!["d1", "d2"]);

        let pred = Predicate::all();
        let (clause, args) = render_where(&table(&config), &pred);
        assert!(clause.is_empty());
        assert!(args.is_empty());
    }

    #[test]
    fn test_schema_and_index() {
        let (conn, config) = setup();
        let t = table(&config);

        ensure_table_schema(&conn, &t).unwrap();
        ensure_table_schema(&conn, &t).unwrap();
        assert!(!has_index(&conn, "idx_policy_rules").unwrap());

        create_unique_index(&conn, &t, "idx_policy_rules").unwrap();
        assert!(has_index(&conn, "idx_policy_rules").unwrap());

        drop_table(&conn, &t).unwrap();
        assert!(!has_index(&conn, "idx_policy_rules").unwrap());
    }

    #[test]
    fn test_migration_adds_missing_columns() {
        let (conn, config) = setup();
        conn.execute(
            "CREATE TABLE policy_rules (id INTEGER PRIMARY KEY AUTOINCREMENT, ptype TEXT NOT NULL DEFAULT '', v0 TEXT NOT NULL DEFAULT '')",
            [],
        )
        .unwrap();
        conn.execute("INSERT INTO policy_rules (ptype, v0) VALUES ('p', 'alice')", [])
            .unwrap();

        ensure_table_schema(&conn, &table(&config)).unwrap();

        let columns = existing_columns(&conn, &config.table_name).unwrap();
        for i in 0..FIELD_COUNT {
            assert!(columns.contains(&format!("v{}", i)));
        }

        let records = select_where(&conn, &table(&config), &Predicate::all()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].to_tuple(), vec!["p", "alice"]);
    }

    #[test]
    fn test_insert_select_update_delete() {
        let (conn, config) = setup();
        let t = table(&config);
        ensure_table_schema(&conn, &t).unwrap();

        let records = vec![
            RuleRecord::from_tuple(&["p", "alice", "data1", "read"]).unwrap(),
            RuleRecord::from_tuple(&["p", "bob", "data2", "write"]).unwrap(),
        ];
        assert_eq!(insert(&conn, &t, &records).unwrap(), 2);
        let id = insert_one(&conn, &t, &RuleRecord::from_tuple(&["g", "alice", "admin"]).unwrap())
            .unwrap();
        assert_eq!(id, 3);

        let loaded = select_where(&conn, &t, &Predicate::all()).unwrap();
        let ids: Vec<_> = loaded.iter().map(|r| r.id.unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let bob = equality_predicate(&RuleRecord::from_tuple(&["p", "bob"]).unwrap());
        let new = RuleRecord::from_tuple(&["p", "bob", "data3"]).unwrap();
        assert_eq!(update_where(&conn, &t, &bob, &new).unwrap(), 1);
        let updated = select_where(&conn, &t, &bob).unwrap();
        assert_eq!(updated[0].to_tuple(), vec!["p", "bob", "data3"]);

        assert_eq!(delete_ids(&conn, &t, &[1, 3]).unwrap(), 2);
        assert_eq!(delete_where(&conn, &t, &bob).unwrap(), 1);
        assert!(select_where(&conn, &t, &Predicate::all()).unwrap().is_empty());
    }

    #[test]
    fn test_insert_splits_oversized_batches() {
        let (conn, config) = setup();
        let t = table(&config);
        ensure_table_schema(&conn, &t).unwrap();

        let count = MAX_ROWS_PER_INSERT + 10;
        let records: Vec<RuleRecord> = (0..count)
            .map(|i| RuleRecord::from_tuple(&["p".to_string(), format!("user{}", i)]).unwrap())
            .collect();

        assert_eq!(insert(&conn, &t, &records).unwrap(), count);
        let loaded = select_where(&conn, &t, &Predicate::all()).unwrap();
        assert_eq!(loaded.len(), count);
        assert_eq!(loaded[count - 1].field(0), Some(format!("user{}", count - 1).as_str()));
    }
}
