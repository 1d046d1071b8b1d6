//! Entity schema definition
//!
//! Every persisted entity shares three server-assigned base columns
//! (`id`, `created_at`, `updated_at`) and declares its own columns on top.
//! The DAO validates every filter and write against this schema before
//! building SQL, so column names reaching a statement are always known
//! identifiers.

use std::fmt;

use sqlx::postgres::PgRow;
use sqlx::FromRow;

use crate::models::{FieldMap, ValidationError, Value};

/// Column storage type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    BigInt,
    Text,
    Bool,
    Timestamp,
}

impl ColumnKind {
    fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (Self::BigInt, Value::BigInt(_))
                | (Self::Text, Value::Text(_))
                | (Self::Bool, Value::Bool(_))
                | (Self::Timestamp, Value::Timestamp(_))
        )
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BigInt => "bigint",
            Self::Text => "text",
            Self::Bool => "boolean",
            Self::Timestamp => "timestamp",
        })
    }
}

/// A table column as seen by the DAO
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
    /// Server-assigned; usable in filters, never in writes.
    pub read_only: bool,
}

impl Column {
    pub const fn required(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            kind,
            nullable: false,
            read_only: false,
        }
    }

    pub const fn optional(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            kind,
            nullable: true,
            read_only: false,
        }
    }

    const fn server(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            kind,
            nullable: false,
            read_only: true,
        }
    }
}

pub const ID: &str = "id";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

/// Columns shared by every entity table.
pub static BASE_COLUMNS: [Column; 3] = [
    Column::server(ID, ColumnKind::BigInt),
    Column::server(CREATED_AT, ColumnKind::Timestamp),
    Column::server(UPDATED_AT, ColumnKind::Timestamp),
];

/// A persisted record type bound to one table.
///
/// Implementors list only their own columns; base columns are implied.
pub trait Entity: for<'r> FromRow<'r, PgRow> + Send + Unpin + 'static {
    /// Entity name, e.g. `"User"`.
    const NAME: &'static str;

    /// Entity-specific columns.
    const COLUMNS: &'static [Column];

    /// Column sets backed by a unique constraint or index.
    const UNIQUE_KEYS: &'static [&'static [&'static str]] = &[];

    /// Table name: lower-cased entity name plus a trailing "s".
    fn table_name() -> String {
        format!("{}s", Self::NAME.to_lowercase())
    }

    /// Identity assigned at insert; used to target a row found by lookup.
    fn id(&self) -> i64;

    fn all_columns() -> impl Iterator<Item = &'static Column> {
        BASE_COLUMNS.iter().chain(Self::COLUMNS.iter())
    }

    fn column(name: &str) -> Option<&'static Column> {
        Self::all_columns().find(|c| c.name == name)
    }
}

/// Check a filter: every key must be a column and every value must fit it.
/// NULL is always allowed (it matches `IS NULL`).
pub fn validate_filter<E: Entity>(filter: &FieldMap) -> Result<(), ValidationError> {
    for (field, value) in filter.iter() {
        let column = lookup::<E>(field)?;
        check_type(column, value)?;
    }
    Ok(())
}

/// Check values to be written: known, writable, well-typed columns.
pub fn validate_values<E: Entity>(values: &FieldMap) -> Result<(), ValidationError> {
    for (field, value) in values.iter() {
        let column = lookup::<E>(field)?;
        if column.read_only {
            return Err(ValidationError::ReadOnly {
                field: field.to_owned(),
            });
        }
        check_type(column, value)?;
        if value.is_null() && !column.nullable {
            return Err(ValidationError::NotNullable {
                field: field.to_owned(),
            });
        }
    }
    Ok(())
}

/// True when `fields` is exactly one of `E::UNIQUE_KEYS`, in any order.
pub fn is_unique_key<E: Entity>(fields: &[&str]) -> bool {
    E::UNIQUE_KEYS.iter().any(|key| {
        key.len() == fields.len()
            && key.iter().all(|k| fields.contains(k))
            && fields.iter().all(|f| key.iter().any(|k| k == f))
    })
}

/// Comma-separated, quoted list of every column for SELECT/RETURNING.
pub fn column_list<E: Entity>() -> String {
    E::all_columns()
        .map(|c| quote_ident(c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn lookup<E: Entity>(field: &str) -> Result<&'static Column, ValidationError> {
    E::column(field).ok_or_else(|| ValidationError::UnknownField {
        table: E::table_name(),
        field: field.to_owned(),
    })
}

fn check_type(column: &Column, value: &Value) -> Result<(), ValidationError> {
    if column.kind.accepts(value) {
        Ok(())
    } else {
        Err(ValidationError::TypeMismatch {
            field: column.name.to_owned(),
            expected: column.kind,
            found: value.type_name(),
        })
    }
}
