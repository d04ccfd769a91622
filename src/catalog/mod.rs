// Catalog interface (consumed).
//
// Resolves `Name -> Entity`/`Index`, hands back per-column
// `ValueStatistics`, and lists candidate indices for a `(column,
// predicate)` pair. Catalog internals (DDL, persistence, schema
// migration) are out of scope — this is the narrow seam the planner's
// `KnnToIndexRule`/`CountPushdownRule` and the cost model read through,
// keyed by `value::Name`/`ColumnDef` rather than a SQL `Schema`/`Column`
// model.

use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{DbError, Result};
use crate::function::DistanceKind;
use crate::value::{ColumnDef, Name, ValueStatistics};

/// A named set of tuples with a fixed schema (the GLOSSARY's "Entity").
#[derive(Debug, Clone)]
pub struct EntityMeta {
    pub name: Name,
    pub columns: Vec<ColumnDef>,
    pub estimated_rows: u64,
}

/// A secondary structure accelerating predicates over an entity.
/// `distance` is set for a vector index usable by `KnnToIndexRule`;
/// `None` for a plain boolean-predicate index.
#[derive(Debug, Clone)]
pub struct IndexMeta {
    pub name: Name,
    pub entity: Name,
    pub column: ColumnDef,
    pub distance: Option<DistanceKind>,
}

/// Resolves names and hands out the statistics/candidate-index
/// information the planner's cost model and rewrite rules need.
/// Concurrent registration uses `dashmap` rather than a single
/// `RwLock<HashMap>` so a rule evaluating many nodes in parallel never
/// serializes on one lock.
#[derive(Default)]
pub struct Catalog {
    entities: DashMap<String, EntityMeta>,
    indices: DashMap<String, IndexMeta>,
    statistics: DashMap<String, ValueStatistics>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_entity(&self, meta: EntityMeta) {
        self.entities.insert(meta.name.to_string(), meta);
    }

    pub fn register_index(&self, meta: IndexMeta) {
        self.indices.insert(meta.name.to_string(), meta);
    }

    pub fn set_statistics(&self, column: &Name, stats: ValueStatistics) {
        self.statistics.insert(column.to_string(), stats);
    }

    pub fn entity(&self, name: &Name) -> Result<EntityMeta> {
        self.entities
            .get(&name.to_string())
            .map(|e| e.value().clone())
            .ok_or_else(|| DbError::catalog(format!("unknown entity '{name}'")))
    }

    pub fn index(&self, name: &Name) -> Result<IndexMeta> {
        self.indices
            .get(&name.to_string())
            .map(|i| i.value().clone())
            .ok_or_else(|| DbError::catalog(format!("unknown index '{name}'")))
    }

    pub fn statistics(&self, column: &Name) -> Option<ValueStatistics> {
        self.statistics.get(&column.to_string()).map(|s| s.value().copy())
    }

    /// Lists indices over `column`, optionally restricted to ones
    /// compatible with the given distance kind, for `KnnToIndexRule`.
    /// `distance = None` lists every index over the column regardless
    /// of kind (boolean-predicate pushdown).
    pub fn candidate_indices(&self, column: &ColumnDef, distance: Option<DistanceKind>) -> Vec<IndexMeta> {
        self.indices
            .iter()
            .filter(|entry| {
                let idx = entry.value();
                idx.column == *column
                    && match distance {
                        Some(d) => idx.distance == Some(d),
                        None => true,
                    }
            })
            .map(|entry| entry.value().clone())
            .collect()
    }
}

/// Shared handle planners/rules hold; cheap to clone.
pub type SharedCatalog = Arc<Catalog>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Type, TypeKind};

    fn col(name: &str) -> ColumnDef {
        ColumnDef::new(Name::parse(name), Type::vector(TypeKind::FloatVector, 512), false, false)
    }

    #[test]
    fn resolves_a_registered_entity() {
        let catalog = Catalog::new();
        catalog.register_entity(EntityMeta {
            name: Name::parse("s.e"),
            columns: vec![col("s.e.v")],
            estimated_rows: 1000,
        });
        let entity = catalog.entity(&Name::parse("s.e")).unwrap();
        assert_eq!(entity.estimated_rows, 1000);
    }

    #[test]
    fn unknown_entity_is_a_catalog_error() {
        let catalog = Catalog::new();
        assert!(matches!(
            catalog.entity(&Name::parse("s.missing")),
            Err(DbError::Catalog(_))
        ));
    }

    #[test]
    fn candidate_indices_filters_by_distance_kind() {
        let catalog = Catalog::new();
        catalog.register_index(IndexMeta {
            name: Name::parse("s.e.idx_v_l2"),
            entity: Name::parse("s.e"),
            column: col("s.e.v"),
            distance: Some(DistanceKind::L2),
        });
        catalog.register_index(IndexMeta {
            name: Name::parse("s.e.idx_v_cos"),
            entity: Name::parse("s.e"),
            column: col("s.e.v"),
            distance: Some(DistanceKind::Cosine),
        });
        let l2_only = catalog.candidate_indices(&col("s.e.v"), Some(DistanceKind::L2));
        assert_eq!(l2_only.len(), 1);
        assert_eq!(l2_only[0].name.to_string(), "s.e.idx_v_l2");

        let all = catalog.candidate_indices(&col("s.e.v"), None);
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn statistics_round_trip_through_copy() {
        let catalog = Catalog::new();
        let mut stats = ValueStatistics::new();
        stats.insert(None);
        catalog.set_statistics(&Name::parse("s.e.v"), stats);
        let fetched = catalog.statistics(&Name::parse("s.e.v")).unwrap();
        assert_eq!(fetched.null_count(), 1);
    }
}
