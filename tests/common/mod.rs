// ABOUTME: In-memory source/target databases for exercising whole sync runs without PostgreSQL
// ABOUTME: Enforces primary keys, foreign keys, and delete restrictions like the real schema

#![allow(dead_code)]

use async_trait::async_trait;
use erp_table_sync::catalog::{Catalog, TableDecl};
use erp_table_sync::config::{EndpointConfig, RunOptions, SyncConfig, TargetConfig};
use erp_table_sync::error::{Side, SyncError};
use erp_table_sync::migration::{
    ClearMode, ColumnInfo, DependencyEdge, GeneratedStatement, Row, Value,
};
use erp_table_sync::session::{Connector, DbError, RowStream, SourceSession, TargetSession};
use futures::StreamExt;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    columns: Vec<ColumnInfo>,
    rows: Vec<Row>,
}

/// A foreign key: `child.column` must match an `id` of `parent`
#[derive(Debug, Clone)]
struct ForeignKey {
    child: String,
    column: String,
    parent: String,
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, MemoryTable>,
    foreign_keys: Vec<ForeignKey>,
    inserts: Vec<(String, Value)>,
    executed: Vec<GeneratedStatement>,
    clears: Vec<String>,
    sequence_resets: Vec<String>,
    /// Remaining successful inserts before the connection drops
    inserts_before_disconnect: Option<usize>,
    /// Remaining successful clears before the connection drops
    clears_before_disconnect: Option<usize>,
    disconnected: bool,
}

/// Shared handle to one in-memory database
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<State>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&self, name: &str, columns: &[(&str, &str)]) -> &Self {
        let columns = columns
            .iter()
            .map(|(column, sql_type)| ColumnInfo::new(*column, *sql_type))
            .collect();
        self.lock().tables.insert(
            name.to_string(),
            MemoryTable {
                columns,
                rows: Vec::new(),
            },
        );
        self
    }

    pub fn add_foreign_key(&self, child: &str, column: &str, parent: &str) -> &Self {
        self.lock().foreign_keys.push(ForeignKey {
            child: child.to_string(),
            column: column.to_string(),
            parent: parent.to_string(),
        });
        self
    }

    pub fn insert_row<I, K, V>(&self, table: &str, values: I) -> &Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let row: Row = values.into_iter().collect();
        if let Some(t) = self.lock().tables.get_mut(table) {
            t.rows.push(row);
        }
        self
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.rows(table).len()
    }

    /// Tables in the order their successful inserts arrived
    pub fn insert_log(&self) -> Vec<String> {
        self.lock().inserts.iter().map(|(t, _)| t.clone()).collect()
    }

    /// Every statement the target was asked to execute
    pub fn executed(&self) -> Vec<GeneratedStatement> {
        self.lock().executed.clone()
    }

    pub fn clear_log(&self) -> Vec<String> {
        self.lock().clears.clone()
    }

    pub fn sequence_resets(&self) -> Vec<String> {
        self.lock().sequence_resets.clone()
    }

    pub fn reset_logs(&self) {
        let mut state = self.lock();
        state.inserts.clear();
        state.executed.clear();
        state.clears.clear();
        state.sequence_resets.clear();
    }

    /// Drop the connection after `count` more successful inserts
    pub fn disconnect_after_inserts(&self, count: usize) {
        self.lock().inserts_before_disconnect = Some(count);
    }

    /// Drop the connection after `count` more successful clears
    pub fn disconnect_after_clears(&self, count: usize) {
        self.lock().clears_before_disconnect = Some(count);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

impl State {
    fn check_connected(&self) -> Result<(), DbError> {
        if self.disconnected {
            return Err(DbError::Connection("server closed the connection".into()));
        }
        Ok(())
    }

    fn table(&self, name: &str) -> Result<&MemoryTable, DbError> {
        self.tables
            .get(name)
            .ok_or_else(|| DbError::Missing(format!("relation \"{}\" does not exist", name)))
    }

    /// `table` plus every table referencing it, directly or transitively
    fn with_referencing(&self, table: &str) -> Vec<String> {
        let mut tables = vec![table.to_string()];
        let mut idx = 0;
        while idx < tables.len() {
            let parent = tables[idx].clone();
            for fk in self.foreign_keys.iter().filter(|fk| fk.parent == parent) {
                if !tables.contains(&fk.child) {
                    tables.push(fk.child.clone());
                }
            }
            idx += 1;
        }
        tables
    }
}

#[async_trait]
impl SourceSession for MemoryDatabase {
    async fn table_columns(&self, table: &str) -> Result<Option<Vec<ColumnInfo>>, DbError> {
        let state = self.lock();
        state.check_connected()?;
        Ok(state.tables.get(table).map(|t| t.columns.clone()))
    }

    async fn stream_rows(&self, table: &str, columns: &[ColumnInfo]) -> Result<RowStream, DbError> {
        let state = self.lock();
        state.check_connected()?;
        let rows: Vec<Result<Row, DbError>> = state
            .table(table)?
            .rows
            .iter()
            .map(|row| {
                Ok(columns
                    .iter()
                    .map(|c| (c.name.clone(), row.value_or_null(&c.name)))
                    .collect())
            })
            .collect();
        Ok(futures::stream::iter(rows).boxed())
    }

    async fn count_rows(&self, table: &str) -> Result<Option<i64>, DbError> {
        let state = self.lock();
        state.check_connected()?;
        Ok(state.tables.get(table).map(|t| t.rows.len() as i64))
    }

    async fn foreign_keys(&self) -> Result<Vec<DependencyEdge>, DbError> {
        let state = self.lock();
        state.check_connected()?;
        Ok(state
            .foreign_keys
            .iter()
            .map(|fk| DependencyEdge::new(fk.child.clone(), fk.parent.clone()))
            .collect())
    }
}

#[async_trait]
impl TargetSession for MemoryDatabase {
    async fn table_columns(&self, table: &str) -> Result<Option<Vec<ColumnInfo>>, DbError> {
        let state = self.lock();
        state.check_connected()?;
        Ok(state.tables.get(table).map(|t| t.columns.clone()))
    }

    async fn clear_table(&self, table: &str, mode: ClearMode) -> Result<(), DbError> {
        let mut state = self.lock();
        state.check_connected()?;
        if state.clears_before_disconnect == Some(0) {
            state.disconnected = true;
            return Err(DbError::Connection("server closed the connection".into()));
        }
        state.table(table)?;

        let emptied = match mode {
            ClearMode::Cascade => state.with_referencing(table),
            ClearMode::Delete => {
                let referenced_by = state
                    .foreign_keys
                    .iter()
                    .filter(|fk| fk.parent == table)
                    .find(|fk| {
                        state
                            .tables
                            .get(&fk.child)
                            .is_some_and(|t| !t.rows.is_empty())
                    });
                if let Some(fk) = referenced_by {
                    return Err(DbError::Statement(format!(
                        "update or delete on table \"{}\" violates foreign key constraint \
                         on table \"{}\"",
                        table, fk.child
                    )));
                }
                vec![table.to_string()]
            }
        };

        for name in &emptied {
            if let Some(t) = state.tables.get_mut(name) {
                t.rows.clear();
            }
        }
        state.clears.push(table.to_string());
        if let Some(remaining) = state.clears_before_disconnect.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }
        Ok(())
    }

    async fn execute(&self, statement: &GeneratedStatement) -> Result<u64, DbError> {
        let mut state = self.lock();
        state.check_connected()?;
        state.executed.push(statement.clone());
        if state.inserts_before_disconnect == Some(0) {
            state.disconnected = true;
            return Err(DbError::Connection("server closed the connection".into()));
        }

        let table = state.table(&statement.table)?;
        let known: BTreeSet<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
        if let Some(unknown) = statement.columns.iter().find(|c| !known.contains(c.as_str())) {
            return Err(DbError::Statement(format!(
                "column \"{}\" of relation \"{}\" does not exist",
                unknown, statement.table
            )));
        }

        let row: Row = statement
            .columns
            .iter()
            .cloned()
            .zip(statement.values.iter().cloned())
            .collect();
        let id = row.value_or_null("id");

        if !id.is_null() && table.rows.iter().any(|r| r.get("id") == Some(&id)) {
            // ON CONFLICT DO NOTHING
            return Ok(0);
        }

        for fk in state.foreign_keys.iter().filter(|fk| fk.child == statement.table) {
            let value = row.value_or_null(&fk.column);
            if value.is_null() {
                continue;
            }
            let parent_has_key = state
                .tables
                .get(&fk.parent)
                .is_some_and(|p| p.rows.iter().any(|r| r.get("id") == Some(&value)));
            if !parent_has_key {
                return Err(DbError::Statement(format!(
                    "insert or update on table \"{}\" violates foreign key constraint on \"{}\"",
                    statement.table, fk.column
                )));
            }
        }

        if let Some(t) = state.tables.get_mut(&statement.table) {
            t.rows.push(row);
        }
        state.inserts.push((statement.table.clone(), id));
        if let Some(remaining) = state.inserts_before_disconnect.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }
        Ok(1)
    }

    async fn count_rows(&self, table: &str) -> Result<Option<i64>, DbError> {
        let state = self.lock();
        state.check_connected()?;
        Ok(state.tables.get(table).map(|t| t.rows.len() as i64))
    }

    async fn reset_sequences(&self, table: &str) -> Result<usize, DbError> {
        let mut state = self.lock();
        state.check_connected()?;
        let has_id = state.table(table)?.columns.iter().any(|c| c.name == "id");
        if !has_id {
            return Ok(0);
        }
        state.sequence_resets.push(table.to_string());
        Ok(1)
    }
}

/// Hands out sessions on the two in-memory databases
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    pub source: MemoryDatabase,
    pub target: MemoryDatabase,
    pub refuse: Option<Side>,
}

impl MemoryConnector {
    pub fn new(source: MemoryDatabase, target: MemoryDatabase) -> Self {
        Self {
            source,
            target,
            refuse: None,
        }
    }

    pub fn refusing(mut self, side: Side) -> Self {
        self.refuse = Some(side);
        self
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect_source(
        &self,
        _endpoint: &EndpointConfig,
    ) -> Result<Box<dyn SourceSession>, SyncError> {
        if self.refuse == Some(Side::Source) {
            return Err(SyncError::connection(Side::Source, "Connection refused"));
        }
        Ok(Box::new(self.source.clone()))
    }

    async fn connect_target(
        &self,
        _endpoint: &EndpointConfig,
    ) -> Result<Box<dyn TargetSession>, SyncError> {
        if self.refuse == Some(Side::Target) {
            return Err(SyncError::connection(Side::Target, "Connection refused"));
        }
        Ok(Box::new(self.target.clone()))
    }
}

pub fn endpoint(host: &str) -> EndpointConfig {
    EndpointConfig {
        host: Some(host.to_string()),
        user: Some("erp".to_string()),
        password: Some("secret".to_string()),
        database: Some("erp".to_string()),
        ..Default::default()
    }
}

pub fn direct_config(options: RunOptions) -> SyncConfig {
    SyncConfig::new(
        endpoint("source.local"),
        TargetConfig::Direct(endpoint("target.local")),
    )
    .with_options(options)
}

/// customers <- vehicles <- orders, declared children first
pub fn workshop_catalog() -> Catalog {
    let mut catalog = Catalog::new();
    catalog
        .add_table(TableDecl::new("orders").references(["customers", "vehicles"]))
        .unwrap();
    catalog
        .add_table(TableDecl::new("vehicles").references(["customers"]))
        .unwrap();
    catalog.add_table(TableDecl::new("customers")).unwrap();
    catalog
}

/// Create the workshop tables and their foreign keys, without rows
pub fn create_workshop_schema(db: &MemoryDatabase) {
    db.create_table("customers", &[("id", "integer"), ("name", "text")])
        .create_table(
            "vehicles",
            &[("id", "integer"), ("customer_id", "integer"), ("plate", "text")],
        )
        .create_table(
            "orders",
            &[
                ("id", "integer"),
                ("customer_id", "integer"),
                ("vehicle_id", "integer"),
                ("total", "numeric(12,2)"),
            ],
        )
        .add_foreign_key("vehicles", "customer_id", "customers")
        .add_foreign_key("orders", "customer_id", "customers")
        .add_foreign_key("orders", "vehicle_id", "vehicles");
}

/// Source database with two customers, two vehicles, and three orders
pub fn workshop_source() -> MemoryDatabase {
    let db = MemoryDatabase::new();
    create_workshop_schema(&db);
    db.insert_row(
        "customers",
        [("id", Value::Integer(1)), ("name", Value::from("Anna Berg"))],
    )
    .insert_row(
        "customers",
        [("id", Value::Integer(2)), ("name", Value::from("O'Brien"))],
    )
    .insert_row(
        "vehicles",
        [
            ("id", Value::Integer(10)),
            ("customer_id", Value::Integer(1)),
            ("plate", Value::from("B-AB 123")),
        ],
    )
    .insert_row(
        "vehicles",
        [
            ("id", Value::Integer(11)),
            ("customer_id", Value::Integer(2)),
            ("plate", Value::from("M-XY 9")),
        ],
    );
    for (id, customer, vehicle, total) in [
        (100_i64, 1_i64, Some(10_i64), "120.50"),
        (101, 2, Some(11), "89.99"),
        (102, 2, None, "15.00"),
    ] {
        db.insert_row(
            "orders",
            [
                ("id", Value::Integer(id)),
                ("customer_id", Value::Integer(customer)),
                ("vehicle_id", Value::from(vehicle)),
                ("total", Value::Numeric(total.to_string())),
            ],
        );
    }
    db
}

pub fn workshop_target() -> MemoryDatabase {
    let db = MemoryDatabase::new();
    create_workshop_schema(&db);
    db
}
