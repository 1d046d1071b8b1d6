//! Validation error types

use std::fmt;

use crate::schema::ColumnKind;

/// Input rejected before any statement was sent to the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Delete with an empty filter and no explicit `delete_all`
    UnboundedDelete { table: String },

    /// Field is not a column of the entity's table
    UnknownField { table: String, field: String },

    /// Field is server-assigned and cannot be written by callers
    ReadOnly { field: String },

    /// Value type does not match the column type
    TypeMismatch {
        field: String,
        expected: ColumnKind,
        found: &'static str,
    },

    /// NULL written to a NOT NULL column
    NotNullable { field: String },

    /// Write with nothing to write
    NoValues,

    /// Upsert called without any key fields
    NoUniqueKey,

    /// Upsert key field absent from the values
    MissingUniqueKey { field: String },

    /// Page or page size below 1
    InvalidPage { page: i64, page_size: i64 },

    /// Page or page size above `u32::MAX`
    PageOutOfRange { page: i64, page_size: i64 },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnboundedDelete { table } => write!(
                f,
                "refusing to delete from {} without a filter (set delete_all to confirm)",
                table
            ),
            Self::UnknownField { table, field } => {
                write!(f, "{} has no column '{}'", table, field)
            }
            Self::ReadOnly { field } => write!(f, "{} is assigned by the server", field),
            Self::TypeMismatch {
                field,
                expected,
                found,
            } => write!(f, "{} expects {} but got {}", field, expected, found),
            Self::NotNullable { field } => write!(f, "{} cannot be null", field),
            Self::NoValues => write!(f, "no values to write"),
            Self::NoUniqueKey => write!(f, "upsert needs at least one unique field"),
            Self::MissingUniqueKey { field } => {
                write!(f, "upsert key '{}' is missing from values", field)
            }
            Self::InvalidPage { page, page_size } => write!(
                f,
                "page and page_size must be positive (got page={}, page_size={})",
                page, page_size
            ),
            Self::PageOutOfRange { page, page_size } => write!(
                f,
                "page and page_size must not exceed {} (got page={}, page_size={})",
                u32::MAX,
                page,
                page_size
            ),
        }
    }
}

impl std::error::Error for ValidationError {}
