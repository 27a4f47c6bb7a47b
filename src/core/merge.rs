//! Reconciliation of a newly parsed table with its persisted record
//!
//! Merging only ever grows a record:
//! - a column with a concrete type is never demoted to `"unknown"`
//! - new columns are appended after the existing ones
//! - a relationship already known by `(related_table, relationship_type)` is kept as is
//!
//! Incoming entries are only compared against the existing record, never against
//! each other, so duplicate names inside a single incoming table pass through.

use crate::core::schema::{Column, Entity, Relationship, normalize_table_name};

/// Merge `incoming` on top of `existing`, producing the record to persist
pub fn merge_entity(existing: Option<&Entity>, incoming: &Entity) -> Entity {
    let table_name = normalize_table_name(&incoming.table_name);

    let Some(existing) = existing else {
        return Entity {
            table_name,
            ..incoming.clone()
        };
    };

    tracing::debug!(
        "Merging table '{}': {} existing / {} incoming columns",
        table_name,
        existing.columns.len(),
        incoming.columns.len()
    );

    Entity {
        table_name,
        gpt_suggested_name: incoming
            .gpt_suggested_name
            .clone()
            .or_else(|| existing.gpt_suggested_name.clone()),
        columns: merge_columns(&existing.columns, &incoming.columns),
        relationships: merge_relationships(&existing.relationships, &incoming.relationships),
    }
}

/// Known types win over `"unknown"`; the first known type for a name sticks
pub fn merge_columns(existing: &[Column], incoming: &[Column]) -> Vec<Column> {
    let mut merged = existing.to_vec();

    for column in incoming {
        match existing.iter().position(|c| c.same_name(column)) {
            Some(index) if existing[index].has_known_type() => {}
            Some(index) => merged[index] = column.clone(),
            None => merged.push(column.clone()),
        }
    }

    merged
}

/// Append relationships whose identity is not already present
pub fn merge_relationships(
    existing: &[Relationship],
    incoming: &[Relationship],
) -> Vec<Relationship> {
    let mut merged = existing.to_vec();

    for relationship in incoming {
        if !existing.iter().any(|r| r.same_identity(relationship)) {
            merged.push(relationship.clone());
        }
    }

    merged
}
