// ABOUTME: Foreign-key dependency graph over the declared table set
// ABOUTME: Derives parent-first apply order and child-first clear order, rejecting cycles

use crate::error::SyncError;
use std::collections::{BTreeMap, BTreeSet};

/// A table together with its position in the apply order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub position: usize,
}

/// `child` holds a foreign key referencing `parent`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DependencyEdge {
    pub child: String,
    pub parent: String,
}

impl DependencyEdge {
    pub fn new(child: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            child: child.into(),
            parent: parent.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    order: Vec<TableSpec>,
    edges: Vec<DependencyEdge>,
}

impl DependencyGraph {
    /// Build the graph and compute its apply order
    ///
    /// Ordering is Kahn's algorithm; among tables whose parents are all
    /// placed, the one declared first wins, so the result is deterministic.
    /// Self-references cannot be satisfied by table order and are ignored.
    ///
    /// # Errors
    ///
    /// - [`SyncError::UnknownTable`] if an edge names an undeclared table
    /// - [`SyncError::Cycle`] if the edges are not acyclic
    pub fn new(tables: Vec<String>, edges: Vec<DependencyEdge>) -> Result<Self, SyncError> {
        let declared: BTreeSet<&str> = tables.iter().map(String::as_str).collect();

        let mut unique = BTreeSet::new();
        for edge in edges {
            for name in [&edge.child, &edge.parent] {
                if !declared.contains(name.as_str()) {
                    return Err(SyncError::UnknownTable {
                        child: edge.child.clone(),
                        parent: edge.parent.clone(),
                        missing: name.clone(),
                    });
                }
            }
            if edge.child == edge.parent {
                tracing::debug!(
                    "Ignoring self-reference on '{}' for table ordering",
                    edge.child
                );
                continue;
            }
            unique.insert(edge);
        }
        let edges: Vec<DependencyEdge> = unique.into_iter().collect();

        let mut pending_parents: BTreeMap<&str, usize> =
            tables.iter().map(|t| (t.as_str(), 0)).collect();
        for edge in &edges {
            if let Some(count) = pending_parents.get_mut(edge.child.as_str()) {
                *count += 1;
            }
        }

        let mut placed: BTreeSet<&str> = BTreeSet::new();
        let mut order = Vec::with_capacity(tables.len());

        while order.len() < tables.len() {
            let next = tables.iter().find(|t| {
                !placed.contains(t.as_str()) && pending_parents.get(t.as_str()) == Some(&0)
            });

            let Some(next) = next else {
                let remaining: Vec<String> = tables
                    .iter()
                    .filter(|t| !placed.contains(t.as_str()))
                    .cloned()
                    .collect();
                return Err(SyncError::Cycle(remaining));
            };

            placed.insert(next.as_str());
            order.push(TableSpec {
                name: next.clone(),
                position: order.len(),
            });

            for edge in edges.iter().filter(|e| &e.parent == next) {
                if let Some(count) = pending_parents.get_mut(edge.child.as_str()) {
                    *count -= 1;
                }
            }
        }

        Ok(Self { order, edges })
    }

    /// Tables with every parent ahead of its children
    pub fn order_for_apply(&self) -> &[TableSpec] {
        &self.order
    }

    /// The apply order reversed: children are cleared before their parents
    pub fn order_for_clear(&self) -> Vec<TableSpec> {
        self.order.iter().rev().cloned().collect()
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, table: &str) -> bool {
        self.order.iter().any(|t| t.name == table)
    }

    /// Parents of `table` within this graph
    pub fn parents_of(&self, table: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.child == table)
            .map(|e| e.parent.as_str())
            .collect()
    }

    /// Restrict the graph to the tables for which `keep` returns true
    ///
    /// A subsequence of a topological order is still a valid order for the
    /// induced subgraph, so the relative order is kept and positions are
    /// renumbered.
    pub fn prune<F>(&self, keep: F) -> Self
    where
        F: Fn(&str) -> bool,
    {
        let order: Vec<TableSpec> = self
            .order
            .iter()
            .filter(|t| keep(&t.name))
            .enumerate()
            .map(|(position, t)| TableSpec {
                name: t.name.clone(),
                position,
            })
            .collect();

        let edges = self
            .edges
            .iter()
            .filter(|e| keep(&e.child) && keep(&e.parent))
            .cloned()
            .collect();

        Self { order, edges }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(specs: &[TableSpec]) -> Vec<&str> {
        specs.iter().map(|t| t.name.as_str()).collect()
    }

    fn position(specs: &[TableSpec], table: &str) -> usize {
        specs
            .iter()
            .position(|t| t.name == table)
            .unwrap_or_else(|| panic!("{} missing from order", table))
    }

    fn erp_graph() -> DependencyGraph {
        // Declared children-first on purpose: the order must not trust the list
        let tables = vec![
            "invoice_items".to_string(),
            "invoices".to_string(),
            "contact_persons".to_string(),
            "vehicles".to_string(),
            "articles".to_string(),
            "customers".to_string(),
        ];
        let edges = vec![
            DependencyEdge::new("invoice_items", "invoices"),
            DependencyEdge::new("invoice_items", "articles"),
            DependencyEdge::new("invoices", "customers"),
            DependencyEdge::new("contact_persons", "customers"),
            DependencyEdge::new("vehicles", "customers"),
        ];
        DependencyGraph::new(tables, edges).unwrap()
    }

    #[test]
    fn test_apply_order_puts_parents_first() {
        let graph = erp_graph();
        let apply = graph.order_for_apply();
        for edge in graph.edges() {
            assert!(
                position(apply, &edge.parent) < position(apply, &edge.child),
                "{} must precede {}",
                edge.parent,
                edge.child
            );
        }
    }

    #[test]
    fn test_clear_order_is_exact_reverse() {
        let graph = erp_graph();
        let clear = graph.order_for_clear();
        let mut apply = names(graph.order_for_apply());
        apply.reverse();
        assert_eq!(names(&clear), apply);
        for edge in graph.edges() {
            assert!(position(&clear, &edge.child) < position(&clear, &edge.parent));
        }
    }

    #[test]
    fn test_order_is_deterministic_by_declaration() {
        let graph = erp_graph();
        assert_eq!(
            names(graph.order_for_apply()),
            vec![
                "articles",
                "customers",
                "invoices",
                "invoice_items",
                "contact_persons",
                "vehicles"
            ]
        );
        let positions: Vec<usize> = graph.order_for_apply().iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let tables = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let edges = vec![
            DependencyEdge::new("b", "a"),
            DependencyEdge::new("c", "b"),
            DependencyEdge::new("b", "c"),
        ];
        match DependencyGraph::new(tables, edges) {
            Err(SyncError::Cycle(tables)) => assert_eq!(tables, vec!["b", "c"]),
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_parent_is_rejected() {
        let tables = vec!["contact_persons".to_string()];
        let edges = vec![DependencyEdge::new("contact_persons", "customers")];
        match DependencyGraph::new(tables, edges) {
            Err(SyncError::UnknownTable {
                child,
                parent,
                missing,
            }) => {
                assert_eq!(child, "contact_persons");
                assert_eq!(parent, "customers");
                assert_eq!(missing, "customers");
            }
            other => panic!("expected unknown table error, got {:?}", other),
        }
    }

    #[test]
    fn test_self_reference_does_not_block_ordering() {
        let tables = vec!["employees".to_string(), "departments".to_string()];
        let edges = vec![
            DependencyEdge::new("employees", "employees"),
            DependencyEdge::new("employees", "departments"),
        ];
        let graph = DependencyGraph::new(tables, edges).unwrap();
        assert_eq!(
            names(graph.order_for_apply()),
            vec!["departments", "employees"]
        );
        assert_eq!(graph.edges().len(), 1);
    }

    #[test]
    fn test_duplicate_edges_are_collapsed() {
        let tables = vec!["customers".to_string(), "vehicles".to_string()];
        let edges = vec![
            DependencyEdge::new("vehicles", "customers"),
            DependencyEdge::new("vehicles", "customers"),
        ];
        let graph = DependencyGraph::new(tables, edges).unwrap();
        assert_eq!(graph.edges().len(), 1);
        assert_eq!(names(graph.order_for_apply()), vec!["customers", "vehicles"]);
    }

    #[test]
    fn test_prune_keeps_relative_order() {
        let graph = erp_graph();
        let pruned = graph.prune(|t| t != "vehicles" && t != "articles");
        assert_eq!(
            names(pruned.order_for_apply()),
            vec!["customers", "invoices", "invoice_items", "contact_persons"]
        );
        assert_eq!(pruned.order_for_apply()[3].position, 3);
        assert!(!pruned.contains("vehicles"));
        assert!(pruned
            .edges()
            .iter()
            .all(|e| e.parent != "articles" && e.child != "vehicles"));
    }

    #[test]
    fn test_parents_of() {
        let graph = erp_graph();
        let mut parents = graph.parents_of("invoice_items");
        parents.sort();
        assert_eq!(parents, vec!["articles", "invoices"]);
        assert!(graph.parents_of("customers").is_empty());
    }
}
