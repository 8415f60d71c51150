//! SQLite side of the loader: table creation, upserts and deletions

use crate::records::Batch;
use crate::schema::{Column, Table, TABLES};
use crate::Error;
use itertools::Itertools;
use log::{debug, info};
use rusqlite::{params_from_iter, Connection};
use std::path::Path;

/// Upper bound of bound parameters in a single statement
///
/// This is the default of SQLite since 3.32.
const MAX_VARIABLES: usize = 32_766;

/// Opens (or creates) the database and its GTFS tables
pub fn open<P: AsRef<Path>>(path: P, foreign_keys: bool) -> Result<Connection, Error> {
    let conn = Connection::open(path)?;
    prepare(&conn, foreign_keys)?;
    Ok(conn)
}

/// Opens a database that lives as long as the connection
pub fn open_in_memory(foreign_keys: bool) -> Result<Connection, Error> {
    let conn = Connection::open_in_memory()?;
    prepare(&conn, foreign_keys)?;
    Ok(conn)
}

/// Sets the foreign key enforcement and creates the GTFS tables
pub(crate) fn prepare(conn: &Connection, foreign_keys: bool) -> Result<(), Error> {
    conn.pragma_update(None, "foreign_keys", foreign_keys)?;
    create_schema(conn)
}

/// Creates the GTFS tables that do not exist yet
pub fn create_schema(conn: &Connection) -> Result<(), Error> {
    for table in TABLES.iter() {
        conn.execute_batch(&table.create_sql())
            .map_err(Error::on_table(table.name))?;
    }
    Ok(())
}

/// `INSERT ... ON CONFLICT` statement for `rows` rows of `columns`
///
/// On a primary key conflict every non key column of the table is replaced by
/// the inserted value, columns absent from `columns` get their default.
pub fn upsert_sql(table: &Table, columns: &[&Column], rows: usize) -> String {
    let quote = |c: &Column| format!("\"{}\"", c.name);
    let placeholders = format!("({})", std::iter::repeat("?").take(columns.len()).join(", "));
    let values = std::iter::repeat(placeholders.as_str()).take(rows).join(", ");
    let conflict = table.primary_key().map(quote).join(", ");
    let updates = table
        .non_key_columns()
        .map(|c| format!("\"{0}\" = excluded.\"{0}\"", c.name))
        .join(", ");
    let action = if updates.is_empty() {
        "DO NOTHING".to_owned()
    } else {
        format!("DO UPDATE SET {}", updates)
    };

    format!(
        "INSERT INTO \"{}\" ({}) VALUES {} ON CONFLICT ({}) {}",
        table.name,
        columns.iter().map(|c| quote(*c)).join(", "),
        values,
        conflict,
        action
    )
}

/// Inserts or updates all the rows of the batch, returns the number of rows affected
///
/// Each statement holds at most `batch_size` rows.
pub fn upsert_batch(
    conn: &Connection,
    batch: &Batch,
    batch_size: usize,
) -> Result<usize, Error> {
    if batch.is_empty() || batch.columns.is_empty() {
        return Ok(0);
    }
    let table = batch.table;
    let rows_per_statement = batch_size
        .min(MAX_VARIABLES / batch.columns.len())
        .max(1);

    let mut affected = 0;
    for chunk in batch.rows.chunks(rows_per_statement) {
        let sql = upsert_sql(table, &batch.columns, chunk.len());
        let mut stmt = conn
            .prepare_cached(&sql)
            .map_err(Error::on_table(table.name))?;
        affected += stmt
            .execute(params_from_iter(chunk.iter().flatten()))
            .map_err(Error::on_table(table.name))?;
    }

    info!("Upserted {} records into {}", affected, table.name);
    Ok(affected)
}

/// Number of rows in the table
pub fn count_rows(conn: &Connection, table: &Table) -> Result<usize, Error> {
    conn.query_row(&format!("SELECT COUNT(*) FROM \"{}\"", table.name), [], |r| {
        r.get::<_, i64>(0)
    })
    .map(|count| count as usize)
    .map_err(Error::on_table(table.name))
}

/// Deletes every row of the table, returns the number of rows deleted
pub fn clear_table(conn: &Connection, table: &Table) -> Result<usize, Error> {
    let count = count_rows(conn, table)?;
    if count == 0 {
        debug!("{} is already empty", table.name);
        return Ok(0);
    }
    conn.execute(&format!("DELETE FROM \"{}\"", table.name), [])
        .map_err(Error::on_table(table.name))?;
    info!("Cleared {} records from {}", count, table.name);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::Value;
    use crate::schema::{ColumnType, AGENCY, CALENDAR_DATES};

    fn text(s: &str) -> Value {
        Value::Text(s.to_owned())
    }

    fn agency_batch(rows: Vec<Vec<Value>>) -> Batch {
        Batch {
            table: &AGENCY,
            columns: ["agency_id", "agency_name", "agency_url", "agency_timezone"]
                .iter()
                .map(|n| AGENCY.column(n).unwrap())
                .collect(),
            rows,
        }
    }

    fn agency(id: &str, name: &str) -> Vec<Value> {
        vec![
            text(id),
            text(name),
            text("http://example.com"),
            text("Europe/Paris"),
        ]
    }

    #[test]
    fn sql_of_an_upsert() {
        let columns: Vec<_> = CALENDAR_DATES.columns.iter().collect();
        assert_eq!(
            "INSERT INTO \"gtfs_calendar_dates\" (\"service_id\", \"date\", \"exception_type\") \
             VALUES (?, ?, ?), (?, ?, ?) \
             ON CONFLICT (\"service_id\", \"date\") \
             DO UPDATE SET \"exception_type\" = excluded.\"exception_type\"",
            upsert_sql(&CALENDAR_DATES, &columns, 2)
        );
    }

    #[test]
    fn sql_of_a_table_without_values() {
        static PAIRS: Table = Table {
            name: "pairs",
            file_name: "pairs.txt",
            required: false,
            columns: &[
                Column {
                    name: "left",
                    column_type: ColumnType::Text,
                    primary_key: true,
                    not_null: true,
                    default: None,
                    references: None,
                },
                Column {
                    name: "right",
                    column_type: ColumnType::Text,
                    primary_key: true,
                    not_null: true,
                    default: None,
                    references: None,
                },
            ],
        };
        let columns: Vec<_> = PAIRS.columns.iter().collect();
        let sql = upsert_sql(&PAIRS, &columns, 1);
        assert!(sql.ends_with("ON CONFLICT (\"left\", \"right\") DO NOTHING"));

        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(&PAIRS.create_sql()).unwrap();
        let batch = Batch {
            table: &PAIRS,
            columns: columns.clone(),
            rows: vec![vec![text("a"), text("b")], vec![text("a"), text("b")]],
        };
        assert_eq!(1, upsert_batch(&conn, &batch, 10).unwrap());
        assert_eq!(0, upsert_batch(&conn, &batch, 10).unwrap());
    }

    #[test]
    fn upsert_in_several_statements() {
        let conn = open_in_memory(true).unwrap();
        let batch = agency_batch(vec![
            agency("a", "A"),
            agency("b", "B"),
            agency("c", "C"),
        ]);
        assert_eq!(3, upsert_batch(&conn, &batch, 2).unwrap());
        assert_eq!(3, count_rows(&conn, &AGENCY).unwrap());

        let batch = agency_batch(vec![agency("b", "Bee"), agency("d", "D")]);
        assert_eq!(2, upsert_batch(&conn, &batch, 1).unwrap());
        assert_eq!(4, count_rows(&conn, &AGENCY).unwrap());
        let name: String = conn
            .query_row(
                "SELECT agency_name FROM gtfs_agency WHERE agency_id = 'b'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!("Bee", name);
    }

    #[test]
    fn constraint_violation_names_the_table() {
        let conn = open_in_memory(true).unwrap();
        let batch = agency_batch(vec![vec![
            text("a"),
            Value::Null,
            text("http://example.com"),
            text("Europe/Paris"),
        ]]);
        match upsert_batch(&conn, &batch, 10) {
            Err(Error::Database { table, .. }) => assert_eq!("gtfs_agency", table),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn clear() {
        let conn = open_in_memory(true).unwrap();
        assert_eq!(0, clear_table(&conn, &AGENCY).unwrap());
        upsert_batch(&conn, &agency_batch(vec![agency("a", "A")]), 10).unwrap();
        assert_eq!(1, clear_table(&conn, &AGENCY).unwrap());
        assert_eq!(0, count_rows(&conn, &AGENCY).unwrap());
    }

    #[test]
    fn schema_is_created_once() {
        let conn = open_in_memory(false).unwrap();
        create_schema(&conn).unwrap();
        for table in TABLES.iter() {
            assert_eq!(0, count_rows(&conn, table).unwrap());
        }
    }
}
