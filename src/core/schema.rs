use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Placeholder data type the extractor emits when it cannot infer one
pub const UNKNOWN_DATA_TYPE: &str = "unknown";

/// Column of a table
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Column {
    pub column_name: String,
    pub data_type: String,
    /// Enum members: value -> description (or anything the extractor produced)
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Map<String, Value>>,
}

impl Column {
    pub fn new(column_name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            data_type: data_type.into(),
            enum_values: None,
        }
    }

    /// Column with the placeholder `"unknown"` type
    pub fn untyped(column_name: impl Into<String>) -> Self {
        Self::new(column_name, UNKNOWN_DATA_TYPE)
    }

    pub fn with_enum<K, V>(mut self, members: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.enum_values = Some(
            members
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// True unless the data type is the `"unknown"` placeholder
    pub fn has_known_type(&self) -> bool {
        self.data_type != UNKNOWN_DATA_TYPE
    }

    /// Number of enum members, zero when the column is not an enum
    pub fn enum_key_count(&self) -> usize {
        self.enum_values.as_ref().map_or(0, Map::len)
    }

    /// Case-insensitive name comparison used when merging
    pub fn same_name(&self, other: &Column) -> bool {
        self.column_name.to_lowercase() == other.column_name.to_lowercase()
    }
}

/// Directed link from the owning table to `related_table`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Relationship {
    pub related_table: String,
    pub relationship_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_table_column: Option<String>,
}

impl Relationship {
    pub fn new(related_table: impl Into<String>, relationship_type: impl Into<String>) -> Self {
        Self {
            related_table: related_table.into(),
            relationship_type: relationship_type.into(),
            related_table_column: None,
        }
    }

    pub fn on_column(mut self, column: impl Into<String>) -> Self {
        self.related_table_column = Some(column.into());
        self
    }

    /// Dedup identity: same target (case-insensitive) and same relationship type
    pub fn same_identity(&self, other: &Relationship) -> bool {
        self.related_table.to_lowercase() == other.related_table.to_lowercase()
            && self.relationship_type == other.relationship_type
    }

    /// Whether this relationship targets `table_name`, compared by normalized name
    pub fn points_at(&self, table_name: &str) -> bool {
        normalize_table_name(&self.related_table) == normalize_table_name(table_name)
    }
}

/// One table: the unit of persistence
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Entity {
    pub table_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpt_suggested_name: Option<String>,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl Entity {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            gpt_suggested_name: None,
            columns: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn suggested_name(mut self, name: impl Into<String>) -> Self {
        self.gpt_suggested_name = Some(name.into());
        self
    }

    pub fn add_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn add_relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// Find a column by exact name, returning its index and the column
    pub fn find_column(&self, name: &str) -> Option<(usize, &Column)> {
        self.columns
            .iter()
            .enumerate()
            .find(|(_, c)| c.column_name == name)
    }

    /// Storage key for this entity
    pub fn key(&self) -> String {
        normalize_table_name(&self.table_name)
    }
}

/// The full set of tables shown together
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct Schema {
    pub tables: Vec<Entity>,
}

impl Schema {
    pub fn new(tables: Vec<Entity>) -> Self {
        Self { tables }
    }

    /// Lookup by normalized table name
    pub fn table(&self, table_name: &str) -> Option<&Entity> {
        let key = normalize_table_name(table_name);
        self.tables.iter().find(|t| t.key() == key)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Persistent identity of a table name
pub fn normalize_table_name(name: &str) -> String {
    name.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_column_known_type() {
        assert!(Column::new("id", "int").has_known_type());
        assert!(!Column::untyped("id").has_known_type());
        // Only the exact placeholder is weak
        assert!(Column::new("id", "UNKNOWN").has_known_type());
    }

    #[test]
    fn test_enum_key_count() {
        let plain = Column::new("status", "varchar");
        assert_eq!(plain.enum_key_count(), 0);

        let status = plain.with_enum([("active", "Active"), ("banned", "Banned")]);
        assert_eq!(status.enum_key_count(), 2);
    }

    #[test]
    fn test_relationship_identity() {
        let a = Relationship::new("Users", "many-to-one");
        let b = Relationship::new("users", "many-to-one").on_column("id");
        let c = Relationship::new("users", "one-to-one");

        assert!(a.same_identity(&b));
        assert!(!a.same_identity(&c));
    }

    #[test]
    fn test_relationship_points_at() {
        let relationship = Relationship::new("Users", "many-to-one");

        assert!(relationship.points_at("users"));
        assert!(relationship.points_at("USERS"));
        assert!(!relationship.points_at("user"));
    }

    #[test]
    fn test_entity_deserialize_minimal() {
        let entity: Entity = serde_json::from_value(json!({ "table_name": "Orders" })).unwrap();

        assert_eq!(entity.table_name, "Orders");
        assert_eq!(entity.key(), "orders");
        assert!(entity.columns.is_empty());
        assert!(entity.relationships.is_empty());
        assert!(entity.gpt_suggested_name.is_none());
    }

    #[test]
    fn test_entity_wire_format() {
        let value = json!({
            "table_name": "orders",
            "gpt_suggested_name": "Customer orders",
            "columns": [
                { "column_name": "id", "data_type": "int" },
                { "column_name": "state", "data_type": "enum", "enum": { "new": "New", "paid": null } }
            ],
            "relationships": [
                { "related_table": "users", "relationship_type": "many-to-one", "related_table_column": null }
            ]
        });

        let entity: Entity = serde_json::from_value(value).unwrap();
        assert_eq!(entity.columns[1].enum_key_count(), 2);
        assert_eq!(entity.relationships[0].related_table_column, None);

        let out = serde_json::to_value(&entity).unwrap();
        assert!(out["columns"][0].get("enum").is_none());
        assert_eq!(out["columns"][1]["enum"]["paid"], Value::Null);
        assert!(out["relationships"][0].get("related_table_column").is_none());
    }

    #[test]
    fn test_find_column_is_exact() {
        let entity = Entity::new("users")
            .add_column(Column::new("id", "int"))
            .add_column(Column::new("Email", "varchar"));

        assert_eq!(entity.find_column("Email").map(|(i, _)| i), Some(1));
        assert!(entity.find_column("email").is_none());
    }

    #[test]
    fn test_schema_table_lookup() {
        let schema = Schema::new(vec![Entity::new("users"), Entity::new("posts")]);

        assert!(schema.table("posts").is_some());
        assert!(schema.table("Posts").is_some());
        assert!(schema.table("comments").is_none());
        assert!(!schema.is_empty());
        assert!(Schema::default().is_empty());
    }
}
