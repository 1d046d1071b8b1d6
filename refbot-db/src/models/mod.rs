//! Input models: field maps, pagination, and validation errors
//!
//! Invalid input returns ValidationError, not panic.

pub mod fields;
pub mod pagination;
pub mod validation;

pub use fields::{FieldMap, IntoFields, Value};
pub use pagination::{Paginated, Pagination};
pub use validation::ValidationError;
