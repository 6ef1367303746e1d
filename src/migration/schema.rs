// ABOUTME: System catalog queries used by the PostgreSQL sessions
// ABOUTME: Column metadata, foreign keys, row counts, and serial sequence discovery

use super::graph::DependencyEdge;
use super::row::ColumnInfo;
use crate::utils::{qualified_table, quote_ident};
use tokio_postgres::{Client, Error};

/// Whether `schema.table` exists as a plain or partitioned table
pub async fn table_exists(client: &Client, schema: &str, table: &str) -> Result<bool, Error> {
    let row = client
        .query_one(
            "SELECT EXISTS (
                SELECT 1
                FROM pg_catalog.pg_class c
                JOIN pg_catalog.pg_namespace n ON c.relnamespace = n.oid
                WHERE n.nspname = $1
                  AND c.relname = $2
                  AND c.relkind IN ('r', 'p')
             )",
            &[&schema, &table],
        )
        .await?;
    Ok(row.get(0))
}

/// Insertable columns of a table in ordinal order, or `None` if the table is absent
///
/// Generated columns are left out since they cannot be inserted into.
/// Types are the full `format_type()` spelling, e.g. `character varying(120)`.
pub async fn table_columns(
    client: &Client,
    schema: &str,
    table: &str,
) -> Result<Option<Vec<ColumnInfo>>, Error> {
    if !table_exists(client, schema, table).await? {
        return Ok(None);
    }

    let rows = client
        .query(
            "SELECT
                a.attname,
                pg_catalog.format_type(a.atttypid, a.atttypmod)
             FROM pg_catalog.pg_attribute a
             JOIN pg_catalog.pg_class c ON a.attrelid = c.oid
             JOIN pg_catalog.pg_namespace n ON c.relnamespace = n.oid
             WHERE n.nspname = $1
               AND c.relname = $2
               AND a.attnum > 0
               AND NOT a.attisdropped
               AND a.attgenerated = ''
             ORDER BY a.attnum",
            &[&schema, &table],
        )
        .await?;

    let columns = rows
        .iter()
        .map(|row| ColumnInfo::new(row.get::<_, String>(0), row.get::<_, String>(1)))
        .collect();

    Ok(Some(columns))
}

/// Foreign keys whose both ends live in `schema`
pub async fn foreign_keys(client: &Client, schema: &str) -> Result<Vec<DependencyEdge>, Error> {
    let rows = client
        .query(
            "SELECT DISTINCT child.relname, parent.relname
             FROM pg_catalog.pg_constraint con
             JOIN pg_catalog.pg_class child ON con.conrelid = child.oid
             JOIN pg_catalog.pg_namespace cn ON child.relnamespace = cn.oid
             JOIN pg_catalog.pg_class parent ON con.confrelid = parent.oid
             JOIN pg_catalog.pg_namespace pn ON parent.relnamespace = pn.oid
             WHERE con.contype = 'f'
               AND cn.nspname = $1
               AND pn.nspname = $1
             ORDER BY 1, 2",
            &[&schema],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|row| DependencyEdge::new(row.get::<_, String>(0), row.get::<_, String>(1)))
        .collect())
}

/// Exact row count of `schema.table`
pub async fn count_rows(client: &Client, schema: &str, table: &str) -> Result<i64, Error> {
    let query = format!("SELECT COUNT(*) FROM {}", qualified_table(schema, table));
    let row = client.query_one(&query, &[]).await?;
    Ok(row.get(0))
}

/// Columns of `schema.table` backed by a serial or identity sequence
///
/// Returns `(column, sequence)` pairs; the sequence name is already qualified.
pub async fn serial_sequences(
    client: &Client,
    schema: &str,
    table: &str,
) -> Result<Vec<(String, String)>, Error> {
    let rows = client
        .query(
            "SELECT a.attname, seq
             FROM pg_catalog.pg_attribute a
             JOIN pg_catalog.pg_class c ON a.attrelid = c.oid
             JOIN pg_catalog.pg_namespace n ON c.relnamespace = n.oid
             CROSS JOIN LATERAL pg_catalog.pg_get_serial_sequence(
                 pg_catalog.format('%I.%I', n.nspname, c.relname),
                 a.attname
             ) AS seq
             WHERE n.nspname = $1
               AND c.relname = $2
               AND a.attnum > 0
               AND NOT a.attisdropped
               AND seq IS NOT NULL
             ORDER BY a.attnum",
            &[&schema, &table],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|row| (row.get::<_, String>(0), row.get::<_, String>(1)))
        .collect())
}

/// Move `sequence` so its next value is one past the column's current maximum
pub async fn reset_sequence(
    client: &Client,
    schema: &str,
    table: &str,
    column: &str,
    sequence: &str,
) -> Result<(), Error> {
    let query = format!(
        "SELECT pg_catalog.setval(\
             $1::text::regclass, COALESCE((SELECT MAX({}) FROM {}), 0) + 1, false)",
        quote_ident(column),
        qualified_table(schema, table)
    );
    client.execute(&query, &[&sequence]).await?;
    Ok(())
}
