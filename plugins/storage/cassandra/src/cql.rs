use ingest_api::{ColumnType, StoreSchema, USER_FIELDS, field_names};

const CQL_CREATE_KEYSPACE: &str = include_str!("../cql/create_keyspace.cql");

/// Unquoted CQL identifier: letter first, then letters, digits or `_`.
/// Such names need no escaping when spliced into statements.
pub fn is_cql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.len() <= 48
}

fn cql_type(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Uuid => "UUID",
        ColumnType::Text => "TEXT",
    }
}

pub fn create_keyspace(schema: &StoreSchema) -> String {
    CQL_CREATE_KEYSPACE
        .replace("{keyspace}", &schema.keyspace)
        .replace("{replication_factor}", &schema.replication_factor.to_string())
}

/// Table DDL generated from `USER_FIELDS`, so columns cannot drift from the parser.
pub fn create_table(schema: &StoreSchema) -> String {
    let columns: Vec<String> = USER_FIELDS
        .iter()
        .map(|f| {
            let pk = if f.primary_key { " PRIMARY KEY" } else { "" };
            format!("    {} {}{}", f.name, cql_type(f.column_type), pk)
        })
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {}.{} (\n{}\n);",
        schema.keyspace,
        schema.table,
        columns.join(",\n"),
    )
}

/// `INSERT` in Cassandra is an upsert on the primary key.
pub fn insert(schema: &StoreSchema) -> String {
    let names: Vec<&str> = field_names().collect();
    let markers = vec!["?"; names.len()];
    format!(
        "INSERT INTO {}.{} ({}) VALUES ({})",
        schema.keyspace,
        schema.table,
        names.join(", "),
        markers.join(", "),
    )
}
