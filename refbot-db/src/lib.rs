//! refbot-db: generic data-access layer over PostgreSQL
//!
//! Provides a typed CRUD surface for any table-backed entity:
//! - `Entity` describes the table (name, columns, base columns)
//! - `FieldMap` carries filters and values, validated against the entity
//! - `Dao<E>` runs each call on a pooled connection in its own scope
//! - `Session<E>` runs calls on a caller-owned connection or transaction

pub mod dao;
pub mod error;
pub mod models;
pub mod pool;
pub mod schema;
pub mod users;

pub use dao::{Dao, Session};
pub use error::{DbError, Result};
pub use models::{FieldMap, IntoFields, Paginated, Pagination, ValidationError, Value};
pub use pool::{create_pool, create_pool_with_options, MIGRATOR};
pub use schema::{Column, ColumnKind, Entity};
pub use sqlx::PgPool;
pub use users::{NewUser, User, UserDao, UserFilter, UserUpdate};
