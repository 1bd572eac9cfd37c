use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::IngestError;

// ════════════════════════════════════════════════════════════════
//  Column Type
// ════════════════════════════════════════════════════════════════

/// Типы колонок, которые встречаются в схеме пользователя.
///
/// На стороне парсера оба приходят строкой JSON; store маппит
/// в нативный тип (CQL: `UUID`, `TEXT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// 128-bit UUID в каноническом текстовом виде.
    Uuid,
    Text,
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnType::Uuid => write!(f, "uuid"),
            ColumnType::Text => write!(f, "text"),
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  Field & USER_FIELDS
// ════════════════════════════════════════════════════════════════

/// Одно поле схемы.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub primary_key: bool,
}

impl Field {
    const fn key(name: &'static str) -> Self {
        Self { name, column_type: ColumnType::Uuid, primary_key: true }
    }

    const fn text(name: &'static str) -> Self {
        Self { name, column_type: ColumnType::Text, primary_key: false }
    }
}

/// The fixed user shape. Parser and store DDL both read this list, so
/// column order here is the bind order of the upsert statement.
pub static USER_FIELDS: [Field; 12] = [
    Field::key("id"),
    Field::text("first_name"),
    Field::text("last_name"),
    Field::text("gender"),
    Field::text("address"),
    Field::text("post_code"),
    Field::text("email"),
    Field::text("username"),
    Field::text("dob"),
    Field::text("registered_date"),
    Field::text("phone"),
    Field::text("picture"),
];

/// Names of all fields in schema order.
pub fn field_names() -> impl Iterator<Item = &'static str> {
    USER_FIELDS.iter().map(|f| f.name)
}

/// Where the users land: namespace, table and how the namespace is replicated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSchema {
    pub keyspace: String,
    pub table: String,
    pub replication_factor: u32,
}

/// Text field reader: strings as-is, `null` as `None`, any other JSON value
/// as its compact JSON text (`90210` → `"90210"`).
fn opaque_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

// ════════════════════════════════════════════════════════════════
//  UserRecord
// ════════════════════════════════════════════════════════════════

/// Одна запись пользователя в том виде, в каком она пришла из шины.
///
/// Каждый ключ обязан присутствовать в JSON (`deserialize_with` делает
/// `Option` обязательным), но значение может быть `null`. Не-строковые
/// значения сохраняются как их JSON-текст.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(deserialize_with = "opaque_text")]
    pub id: Option<String>,
    #[serde(deserialize_with = "opaque_text")]
    pub first_name: Option<String>,
    #[serde(deserialize_with = "opaque_text")]
    pub last_name: Option<String>,
    #[serde(deserialize_with = "opaque_text")]
    pub gender: Option<String>,
    #[serde(deserialize_with = "opaque_text")]
    pub address: Option<String>,
    #[serde(deserialize_with = "opaque_text")]
    pub post_code: Option<String>,
    #[serde(deserialize_with = "opaque_text")]
    pub email: Option<String>,
    #[serde(deserialize_with = "opaque_text")]
    pub username: Option<String>,
    #[serde(deserialize_with = "opaque_text")]
    pub dob: Option<String>,
    #[serde(deserialize_with = "opaque_text")]
    pub registered_date: Option<String>,
    #[serde(deserialize_with = "opaque_text")]
    pub phone: Option<String>,
    #[serde(deserialize_with = "opaque_text")]
    pub picture: Option<String>,
}

impl UserRecord {
    /// Text columns in `USER_FIELDS` order, id excluded.
    pub fn text_columns(&self) -> [Option<&str>; 11] {
        [
            self.first_name.as_deref(),
            self.last_name.as_deref(),
            self.gender.as_deref(),
            self.address.as_deref(),
            self.post_code.as_deref(),
            self.email.as_deref(),
            self.username.as_deref(),
            self.dob.as_deref(),
            self.registered_date.as_deref(),
            self.phone.as_deref(),
            self.picture.as_deref(),
        ]
    }

    /// Check the id contract and pair the record with its parsed key.
    pub fn validate(self) -> Result<ValidatedUser, IngestError> {
        let raw = match self.id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => return Err(IngestError::validation("id is missing from the provided data")),
        };
        let id = Uuid::parse_str(raw)
            .map_err(|e| IngestError::validation(format!("invalid UUID format for id '{raw}': {e}")))?;
        Ok(ValidatedUser { id, record: self })
    }
}

/// A record whose id has been checked. Only these reach a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUser {
    pub id: Uuid,
    pub record: UserRecord,
}
