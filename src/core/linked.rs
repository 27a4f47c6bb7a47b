//! Detection of pure join (associative) tables
//!
//! A table is "linked" when every one of its columns also appears, by exact
//! name, in some table it is related to. Related means either direction: tables
//! it points at and tables pointing at it. Relationship targets resolve by
//! normalized table name, like everywhere else; column names are compared
//! case-sensitively.
//!
//! A table without columns is linked (the check over an empty column list holds).

use crate::core::schema::{Entity, Schema};

/// Tables `table` points at, followed by tables pointing at `table`
pub fn related_tables<'a>(table: &Entity, schema: &'a Schema) -> Vec<&'a Entity> {
    let mut related: Vec<&Entity> = table
        .relationships
        .iter()
        .filter_map(|r| schema.table(&r.related_table))
        .collect();

    related.extend(schema.tables.iter().filter(|other| {
        other
            .relationships
            .iter()
            .any(|r| r.points_at(&table.table_name))
    }));

    related
}

/// Whether `table` exists only to associate the tables around it
pub fn is_linked_table(table: &Entity, schema: &Schema) -> bool {
    let related = related_tables(table, schema);

    table.columns.iter().all(|column| {
        related
            .iter()
            .any(|other| other.find_column(&column.column_name).is_some())
    })
}
