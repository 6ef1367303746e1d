// ABOUTME: Declared table set for a sync run: names, foreign-key references, column denylists
// ABOUTME: Ships the default ERP catalog and turns a catalog into a dependency graph

use crate::error::SyncError;
use crate::filters::TableSelection;
use crate::migration::{ColumnDenylist, DependencyEdge, DependencyGraph};
use crate::utils;
use anyhow::{bail, Result};
use std::collections::BTreeSet;

/// One declared table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableDecl {
    pub name: String,
    /// Tables this table holds foreign keys to
    pub references: Vec<String>,
    /// Columns never sent to the target
    pub exclude_columns: Vec<String>,
}

impl TableDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn references<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.references.extend(parents.into_iter().map(Into::into));
        self
    }

    pub fn exclude_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_columns
            .extend(columns.into_iter().map(Into::into));
        self
    }
}

// Tables of the ERP schema and the tables each one references.
const ERP_TABLES: &[(&str, &[&str])] = &[
    ("users", &[]),
    ("customers", &[]),
    ("contact_persons", &["customers"]),
    ("vehicles", &["customers"]),
    ("suppliers", &[]),
    ("articles", &["suppliers"]),
    ("offers", &["customers", "vehicles", "users"]),
    ("offer_items", &["offers", "articles"]),
    ("orders", &["customers", "vehicles", "offers", "users"]),
    ("order_items", &["orders", "articles"]),
    ("invoices", &["customers", "orders", "users"]),
    ("invoice_items", &["invoices", "articles"]),
    ("payments", &["invoices"]),
];

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: Vec<TableDecl>,
    discover_foreign_keys: bool,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The ERP application's table set
    pub fn erp_default() -> Self {
        let tables = ERP_TABLES
            .iter()
            .map(|(name, parents)| TableDecl::new(*name).references(parents.iter().copied()))
            .collect();
        Self {
            tables,
            discover_foreign_keys: false,
        }
    }

    pub fn add_table(&mut self, decl: TableDecl) -> Result<()> {
        utils::validate_postgres_identifier(&decl.name)?;
        for parent in &decl.references {
            utils::validate_postgres_identifier(parent)?;
        }
        for column in &decl.exclude_columns {
            utils::validate_postgres_identifier(column)?;
        }
        if self.contains(&decl.name) {
            bail!("Table '{}' is declared more than once", decl.name);
        }
        self.tables.push(decl);
        Ok(())
    }

    pub fn tables(&self) -> &[TableDecl] {
        &self.tables
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.iter().any(|t| t.name == table)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn discover_foreign_keys(&self) -> bool {
        self.discover_foreign_keys
    }

    pub fn set_discover_foreign_keys(&mut self, enabled: bool) {
        self.discover_foreign_keys = enabled;
    }

    pub fn edges(&self) -> Vec<DependencyEdge> {
        self.tables
            .iter()
            .flat_map(|t| {
                t.references
                    .iter()
                    .map(move |parent| DependencyEdge::new(t.name.clone(), parent.clone()))
            })
            .collect()
    }

    pub fn denylist(&self) -> ColumnDenylist {
        self.tables
            .iter()
            .filter(|t| !t.exclude_columns.is_empty())
            .map(|t| {
                (
                    t.name.clone(),
                    t.exclude_columns.iter().cloned().collect::<BTreeSet<_>>(),
                )
            })
            .collect()
    }

    /// Add discovered foreign keys whose both ends are declared
    ///
    /// Returns how many new references were added.
    pub fn merge_foreign_keys(&mut self, discovered: &[DependencyEdge]) -> usize {
        let declared: BTreeSet<String> = self.table_names().into_iter().collect();
        let mut added = 0;
        for edge in discovered {
            if !declared.contains(&edge.child) || !declared.contains(&edge.parent) {
                continue;
            }
            if let Some(decl) = self.tables.iter_mut().find(|t| t.name == edge.child) {
                if !decl.references.contains(&edge.parent) {
                    decl.references.push(edge.parent.clone());
                    added += 1;
                }
            }
        }
        added
    }

    /// Keep only the tables the selection allows
    ///
    /// References to tables outside the selection are dropped: those parents
    /// are not part of the transfer set.
    pub fn select(&self, selection: &TableSelection) -> Catalog {
        let tables: Vec<TableDecl> = self
            .tables
            .iter()
            .filter(|t| selection.should_sync_table(&t.name))
            .cloned()
            .collect();
        let kept: BTreeSet<String> = tables.iter().map(|t| t.name.clone()).collect();
        let tables = tables
            .into_iter()
            .map(|mut t| {
                t.references.retain(|parent| kept.contains(parent));
                t
            })
            .collect();
        Catalog {
            tables,
            discover_foreign_keys: self.discover_foreign_keys,
        }
    }

    pub fn graph(&self) -> Result<DependencyGraph, SyncError> {
        DependencyGraph::new(self.table_names(), self.edges())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_erp_default_is_acyclic() {
        let graph = Catalog::erp_default().graph().unwrap();
        assert_eq!(graph.len(), ERP_TABLES.len());
        let apply: Vec<&str> = graph
            .order_for_apply()
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        let pos = |name: &str| apply.iter().position(|t| *t == name).unwrap();
        assert!(pos("customers") < pos("contact_persons"));
        assert!(pos("orders") < pos("invoices"));
        assert!(pos("invoices") < pos("payments"));
    }

    #[test]
    fn test_add_table_rejects_duplicates_and_bad_names() {
        let mut catalog = Catalog::new();
        catalog.add_table(TableDecl::new("customers")).unwrap();
        assert!(catalog.add_table(TableDecl::new("customers")).is_err());
        assert!(catalog.add_table(TableDecl::new("bad-name")).is_err());
        assert!(catalog
            .add_table(TableDecl::new("vehicles").exclude_columns(["x;y"]))
            .is_err());
    }

    #[test]
    fn test_denylist_from_declarations() {
        let mut catalog = Catalog::new();
        catalog
            .add_table(TableDecl::new("customers").exclude_columns(["legacy_flag"]))
            .unwrap();
        catalog.add_table(TableDecl::new("vehicles")).unwrap();

        let denylist = catalog.denylist();
        assert_eq!(denylist.len(), 1);
        assert!(denylist["customers"].contains("legacy_flag"));
    }

    #[test]
    fn test_merge_foreign_keys_ignores_undeclared_tables() {
        let mut catalog = Catalog::new();
        catalog.add_table(TableDecl::new("customers")).unwrap();
        catalog.add_table(TableDecl::new("vehicles")).unwrap();

        let added = catalog.merge_foreign_keys(&[
            DependencyEdge::new("vehicles", "customers"),
            DependencyEdge::new("vehicles", "customers"),
            DependencyEdge::new("audit_log", "customers"),
        ]);
        assert_eq!(added, 1);
        assert_eq!(catalog.edges(), vec![DependencyEdge::new("vehicles", "customers")]);
    }

    #[test]
    fn test_select_drops_references_outside_selection() {
        let selection =
            TableSelection::new(None, Some(vec!["customers".to_string()])).unwrap();
        let catalog = Catalog::erp_default().select(&selection);

        assert!(!catalog.contains("customers"));
        assert!(catalog.contains("contact_persons"));
        assert!(catalog.edges().iter().all(|e| e.parent != "customers"));
        assert!(catalog.graph().is_ok());
    }

    #[test]
    fn test_reference_to_undeclared_table_fails_graph() {
        let mut catalog = Catalog::new();
        catalog
            .add_table(TableDecl::new("contact_persons").references(["customers"]))
            .unwrap();
        assert!(matches!(
            catalog.graph(),
            Err(SyncError::UnknownTable { .. })
        ));
    }
}
