//! Statement builders
//!
//! Each builder validates its input against the entity schema and returns
//! ready-to-run `QueryBuilder`s. Nothing here touches a connection, so every
//! validation error surfaces before storage is involved.

use sqlx::{Postgres, QueryBuilder};

use crate::models::{FieldMap, Pagination, ValidationError, Value};
use crate::schema::{
    self, column_list, quote_ident, validate_filter, validate_values, ColumnKind, Entity,
};

/// Postgres caps bind parameters per statement at u16::MAX.
const MAX_BIND_PARAMS: usize = u16::MAX as usize;

pub(crate) type Statement = QueryBuilder<'static, Postgres>;

/// `SELECT <cols> FROM <table> WHERE ... ORDER BY id [LIMIT/OFFSET]`
pub(crate) fn select<E: Entity>(
    filter: FieldMap,
    window: Window,
) -> Result<Statement, ValidationError> {
    validate_filter::<E>(&filter)?;

    let mut qb = select_head::<E>();
    push_where(&mut qb, filter);
    qb.push(" ORDER BY ").push(quote_ident(schema::ID));
    match window {
        Window::All => {}
        Window::Limit(limit) => {
            qb.push(" LIMIT ").push_bind(limit);
        }
        Window::Page(page) => {
            qb.push(" LIMIT ")
                .push_bind(page.limit())
                .push(" OFFSET ")
                .push_bind(page.offset());
        }
    }
    Ok(qb)
}

/// Row window applied to a select.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Window {
    All,
    Limit(i64),
    Page(Pagination),
}

pub(crate) fn select_by_id<E: Entity>(id: i64) -> Statement {
    let mut qb = select_head::<E>();
    qb.push(" WHERE ")
        .push(quote_ident(schema::ID))
        .push(" = ")
        .push_bind(id);
    qb
}

pub(crate) fn select_by_ids<E: Entity>(ids: Vec<i64>) -> Statement {
    let mut qb = select_head::<E>();
    qb.push(" WHERE ")
        .push(quote_ident(schema::ID))
        .push(" = ANY(")
        .push_bind(ids)
        .push(")");
    qb.push(" ORDER BY ").push(quote_ident(schema::ID));
    qb
}

pub(crate) fn count<E: Entity>(filter: FieldMap) -> Result<Statement, ValidationError> {
    validate_filter::<E>(&filter)?;

    let mut qb = QueryBuilder::new(format!(
        "SELECT COUNT(*) FROM {}",
        quote_ident(&E::table_name())
    ));
    push_where(&mut qb, filter);
    Ok(qb)
}

/// Single-row INSERT returning the stored row.
pub(crate) fn insert<E: Entity>(values: FieldMap) -> Result<Statement, ValidationError> {
    validate_values::<E>(&values)?;

    let mut qb = insert_head::<E>(values);
    push_returning::<E>(&mut qb);
    Ok(qb)
}

/// Multi-row INSERT, split into as many statements as the bind limit needs.
///
/// Rows may set different columns; a column a row leaves unset gets DEFAULT.
pub(crate) fn insert_many<E: Entity>(rows: Vec<FieldMap>) -> Result<Vec<Statement>, ValidationError> {
    for row in &rows {
        validate_values::<E>(row)?;
    }

    let mut columns: Vec<String> = Vec::new();
    for row in &rows {
        for key in row.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.to_owned());
            }
        }
    }

    if columns.is_empty() {
        return rows.into_iter().map(insert::<E>).collect();
    }

    let rows_per_statement = (MAX_BIND_PARAMS / columns.len()).max(1);
    let mut statements = Vec::new();
    let mut rows = rows.into_iter().peekable();
    while rows.peek().is_some() {
        let mut qb = QueryBuilder::new(format!("INSERT INTO {}", quote_ident(&E::table_name())));
        push_column_names(&mut qb, &columns);
        qb.push(" VALUES ");
        for (i, mut row) in rows.by_ref().take(rows_per_statement).enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            qb.push("(");
            for (j, column) in columns.iter().enumerate() {
                if j > 0 {
                    qb.push(", ");
                }
                match row.remove(column) {
                    Some(value) => push_value(&mut qb, value),
                    None => {
                        qb.push("DEFAULT");
                    }
                }
            }
            qb.push(")");
        }
        push_returning::<E>(&mut qb);
        statements.push(qb);
    }
    Ok(statements)
}

/// `UPDATE <table> SET ..., updated_at = NOW() WHERE ...`
pub(crate) fn update<E: Entity>(
    filter: FieldMap,
    values: FieldMap,
) -> Result<Statement, ValidationError> {
    validate_filter::<E>(&filter)?;
    validate_values::<E>(&values)?;
    if values.is_empty() {
        return Err(ValidationError::NoValues);
    }

    let mut qb = update_head::<E>(values);
    push_where(&mut qb, filter);
    Ok(qb)
}

/// `DELETE FROM <table> WHERE ...`; an empty filter needs `delete_all`.
pub(crate) fn delete<E: Entity>(
    filter: FieldMap,
    delete_all: bool,
) -> Result<Statement, ValidationError> {
    if filter.is_empty() && !delete_all {
        return Err(ValidationError::UnboundedDelete {
            table: E::table_name(),
        });
    }
    validate_filter::<E>(&filter)?;

    let mut qb = QueryBuilder::new(format!("DELETE FROM {}", quote_ident(&E::table_name())));
    push_where(&mut qb, filter);
    Ok(qb)
}

/// How an upsert is carried out.
pub(crate) enum Upsert {
    /// The key is a declared unique key: one `INSERT ... ON CONFLICT`.
    Conflict(Statement),
    /// Any other key: lock the matching row (if any), then update it by id
    /// or insert `values`, all in one write scope.
    Lookup { lookup: Statement, values: FieldMap },
}

/// Plan an upsert of `values` keyed by `unique_fields`.
///
/// Keys listed in `Entity::UNIQUE_KEYS` use `ON CONFLICT`, which is atomic
/// against concurrent writers. Other keys fall back to
/// `SELECT ... FOR UPDATE` followed by UPDATE or INSERT; without a unique
/// constraint two concurrent inserts of a new key can both succeed.
pub(crate) fn upsert<E: Entity>(
    unique_fields: &[&str],
    values: FieldMap,
) -> Result<Upsert, ValidationError> {
    if unique_fields.is_empty() {
        return Err(ValidationError::NoUniqueKey);
    }
    validate_values::<E>(&values)?;
    for field in unique_fields {
        if E::column(field).is_none() {
            return Err(ValidationError::UnknownField {
                table: E::table_name(),
                field: (*field).to_owned(),
            });
        }
        if !values.contains(field) {
            return Err(ValidationError::MissingUniqueKey {
                field: (*field).to_owned(),
            });
        }
    }

    if !schema::is_unique_key::<E>(unique_fields) {
        let filter: FieldMap = values
            .iter()
            .filter(|(k, _)| unique_fields.contains(k))
            .map(|(k, v)| (k.to_owned(), v.clone()))
            .collect();
        let mut lookup = select_head::<E>();
        push_where(&mut lookup, filter);
        lookup
            .push(" ORDER BY ")
            .push(quote_ident(schema::ID))
            .push(" LIMIT 2 FOR UPDATE");
        return Ok(Upsert::Lookup { lookup, values });
    }

    let overwrite: Vec<String> = values
        .keys()
        .filter(|k| !unique_fields.contains(k))
        .map(str::to_owned)
        .collect();

    let mut qb = insert_head::<E>(values);
    qb.push(" ON CONFLICT (");
    qb.push(
        unique_fields
            .iter()
            .map(|f| quote_ident(f))
            .collect::<Vec<_>>()
            .join(", "),
    );
    qb.push(") DO UPDATE SET ");
    for column in &overwrite {
        let ident = quote_ident(column);
        qb.push(format!("{} = EXCLUDED.{}, ", ident, ident));
    }
    qb.push(quote_ident(schema::UPDATED_AT)).push(" = NOW()");
    push_returning::<E>(&mut qb);
    Ok(Upsert::Conflict(qb))
}

/// `UPDATE ... WHERE id = $n RETURNING ...` for already validated values.
pub(crate) fn update_by_id<E: Entity>(id: i64, values: FieldMap) -> Statement {
    let mut qb = update_head::<E>(values);
    qb.push(" WHERE ")
        .push(quote_ident(schema::ID))
        .push(" = ")
        .push_bind(id);
    push_returning::<E>(&mut qb);
    qb
}

/// One UPDATE per record keyed by `id`.
///
/// Records without an id, or with nothing besides the id, are skipped.
pub(crate) fn bulk_update<E: Entity>(
    records: Vec<FieldMap>,
) -> Result<Vec<Statement>, ValidationError> {
    let mut statements = Vec::with_capacity(records.len());
    for mut record in records {
        let id = match record.remove(schema::ID) {
            None | Some(Value::Null) => continue,
            Some(value) => value.as_i64().ok_or_else(|| ValidationError::TypeMismatch {
                field: schema::ID.to_owned(),
                expected: ColumnKind::BigInt,
                found: value.type_name(),
            })?,
        };
        if record.is_empty() {
            continue;
        }
        validate_values::<E>(&record)?;

        let mut qb = update_head::<E>(record);
        qb.push(" WHERE ")
            .push(quote_ident(schema::ID))
            .push(" = ")
            .push_bind(id);
        statements.push(qb);
    }
    Ok(statements)
}

fn insert_head<E: Entity>(values: FieldMap) -> Statement {
    let mut qb = QueryBuilder::new(format!("INSERT INTO {}", quote_ident(&E::table_name())));
    if values.is_empty() {
        qb.push(" DEFAULT VALUES");
        return qb;
    }
    let (columns, row): (Vec<String>, Vec<Value>) = values.into_iter().unzip();
    push_column_names(&mut qb, &columns);
    qb.push(" VALUES (");
    for (i, value) in row.into_iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        push_value(&mut qb, value);
    }
    qb.push(")");
    qb
}

fn select_head<E: Entity>() -> Statement {
    QueryBuilder::new(format!(
        "SELECT {} FROM {}",
        column_list::<E>(),
        quote_ident(&E::table_name())
    ))
}

fn update_head<E: Entity>(values: FieldMap) -> Statement {
    let mut qb = QueryBuilder::new(format!("UPDATE {} SET ", quote_ident(&E::table_name())));
    for (field, value) in values {
        qb.push(quote_ident(&field)).push(" = ");
        push_value(&mut qb, value);
        qb.push(", ");
    }
    qb.push(quote_ident(schema::UPDATED_AT)).push(" = NOW()");
    qb
}

fn push_where(qb: &mut Statement, filter: FieldMap) {
    for (i, (field, value)) in filter.into_iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        qb.push(quote_ident(&field));
        if value.is_null() {
            qb.push(" IS NULL");
        } else {
            qb.push(" = ");
            push_value(qb, value);
        }
    }
}

fn push_column_names(qb: &mut Statement, columns: &[String]) {
    qb.push(" (");
    qb.push(
        columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", "),
    );
    qb.push(")");
}

fn push_returning<E: Entity>(qb: &mut Statement) {
    qb.push(" RETURNING ").push(column_list::<E>());
}

// NULL is written as a literal: a typed NULL parameter would not coerce
// into columns of a different type.
fn push_value(qb: &mut Statement, value: Value) {
    match value {
        Value::Null => {
            qb.push("NULL");
        }
        Value::Bool(v) => {
            qb.push_bind(v);
        }
        Value::BigInt(v) => {
            qb.push_bind(v);
        }
        Value::Text(v) => {
            qb.push_bind(v);
        }
        Value::Timestamp(v) => {
            qb.push_bind(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::User;

    const COLS: &str = r#""id", "created_at", "updated_at", "telegram_id", "username", "first_name", "last_name", "referral_id""#;

    #[test]
    fn select_with_null_filter_and_limit() {
        let filter = FieldMap::new()
            .with("telegram_id", 42i64)
            .with("referral_id", Value::Null);
        let qb = select::<User>(filter, Window::Limit(2)).unwrap();
        assert_eq!(
            qb.sql(),
            format!(
                r#"SELECT {COLS} FROM "users" WHERE "telegram_id" = $1 AND "referral_id" IS NULL ORDER BY "id" LIMIT $2"#
            )
        );
    }

    #[test]
    fn select_page_window() {
        let page = Pagination::try_new(2, 10).unwrap();
        let qb = select::<User>(FieldMap::new(), Window::Page(page)).unwrap();
        assert!(qb.sql().ends_with(r#"ORDER BY "id" LIMIT $1 OFFSET $2"#));
    }

    #[test]
    fn select_by_ids_uses_any() {
        let qb = select_by_ids::<User>(vec![1, 2, 3]);
        assert!(qb.sql().contains(r#"WHERE "id" = ANY($1)"#));
    }

    #[test]
    fn count_without_filter() {
        let qb = count::<User>(FieldMap::new()).unwrap();
        assert_eq!(qb.sql(), r#"SELECT COUNT(*) FROM "users""#);
    }

    #[test]
    fn insert_writes_null_literal() {
        let values = FieldMap::new()
            .with("telegram_id", 42i64)
            .with("referral_id", Value::Null);
        let qb = insert::<User>(values).unwrap();
        assert_eq!(
            qb.sql(),
            format!(
                r#"INSERT INTO "users" ("telegram_id", "referral_id") VALUES ($1, NULL) RETURNING {COLS}"#
            )
        );
    }

    #[test]
    fn insert_rejects_server_columns() {
        let values = FieldMap::new().with("telegram_id", 1i64).with("created_at", chrono::Utc::now());
        assert!(matches!(
            insert::<User>(values),
            Err(ValidationError::ReadOnly { .. })
        ));
    }

    #[test]
    fn insert_many_fills_missing_columns_with_default() {
        let rows = vec![
            FieldMap::new().with("telegram_id", 1i64),
            FieldMap::new().with("telegram_id", 2i64).with("username", "bob"),
        ];
        let statements = insert_many::<User>(rows).unwrap();
        assert_eq!(statements.len(), 1);
        assert_eq!(
            statements[0].sql(),
            format!(
                r#"INSERT INTO "users" ("telegram_id", "username") VALUES ($1, DEFAULT), ($2, $3) RETURNING {COLS}"#
            )
        );
    }

    #[test]
    fn insert_many_validates_every_row_first() {
        let rows = vec![
            FieldMap::new().with("telegram_id", 1i64),
            FieldMap::new().with("telegram_id", "two"),
        ];
        assert!(matches!(
            insert_many::<User>(rows),
            Err(ValidationError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn insert_many_splits_at_bind_limit() {
        let rows: Vec<_> = (0..(MAX_BIND_PARAMS as i64 + 5))
            .map(|i| FieldMap::new().with("telegram_id", i))
            .collect();
        let statements = insert_many::<User>(rows).unwrap();
        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn update_refreshes_updated_at() {
        let qb = update::<User>(
            FieldMap::new().with("telegram_id", 42i64),
            FieldMap::new().with("username", "ada"),
        )
        .unwrap();
        assert_eq!(
            qb.sql(),
            r#"UPDATE "users" SET "username" = $1, "updated_at" = NOW() WHERE "telegram_id" = $2"#
        );
    }

    #[test]
    fn update_requires_values() {
        let err = update::<User>(FieldMap::new().with("id", 1i64), FieldMap::new()).err();
        assert_eq!(err, Some(ValidationError::NoValues));
    }

    #[test]
    fn delete_requires_filter_or_delete_all() {
        let err = delete::<User>(FieldMap::new(), false).err();
        assert_eq!(
            err,
            Some(ValidationError::UnboundedDelete {
                table: "users".into()
            })
        );

        let qb = delete::<User>(FieldMap::new(), true).unwrap();
        assert_eq!(qb.sql(), r#"DELETE FROM "users""#);

        let qb = delete::<User>(FieldMap::new().with("id", 3i64), false).unwrap();
        assert_eq!(qb.sql(), r#"DELETE FROM "users" WHERE "id" = $1"#);
    }

    #[test]
    fn upsert_uses_conflict_target() {
        let values = FieldMap::new()
            .with("telegram_id", 42i64)
            .with("username", "ada");
        let Upsert::Conflict(qb) = upsert::<User>(&["telegram_id"], values).unwrap() else {
            panic!("telegram_id is a unique key");
        };
        assert_eq!(
            qb.sql(),
            format!(
                r#"INSERT INTO "users" ("telegram_id", "username") VALUES ($1, $2) ON CONFLICT ("telegram_id") DO UPDATE SET "username" = EXCLUDED."username", "updated_at" = NOW() RETURNING {COLS}"#
            )
        );
    }

    #[test]
    fn upsert_key_must_be_in_values() {
        let values = FieldMap::new().with("username", "ada");
        assert_eq!(
            upsert::<User>(&["telegram_id"], values.clone()).err(),
            Some(ValidationError::MissingUniqueKey {
                field: "telegram_id".into()
            })
        );
        assert_eq!(
            upsert::<User>(&[], values).err(),
            Some(ValidationError::NoUniqueKey)
        );
    }

    #[test]
    fn upsert_without_unique_key_locks_then_writes() {
        let values = FieldMap::new()
            .with("username", "ada")
            .with("first_name", "Ada");
        let Upsert::Lookup { lookup, values } = upsert::<User>(&["username"], values).unwrap()
        else {
            panic!("username has no unique constraint");
        };
        assert_eq!(
            lookup.sql(),
            format!(
                r#"SELECT {COLS} FROM "users" WHERE "username" = $1 ORDER BY "id" LIMIT 2 FOR UPDATE"#
            )
        );
        assert_eq!(values.len(), 2);

        let qb = update_by_id::<User>(7, values);
        assert_eq!(
            qb.sql(),
            format!(
                r#"UPDATE "users" SET "username" = $1, "first_name" = $2, "updated_at" = NOW() WHERE "id" = $3 RETURNING {COLS}"#
            )
        );
    }

    #[test]
    fn upsert_on_undeclared_composite_key_uses_lookup() {
        let values = FieldMap::new()
            .with("telegram_id", 1i64)
            .with("username", "ada");
        assert!(matches!(
            upsert::<User>(&["username", "telegram_id"], values),
            Ok(Upsert::Lookup { .. })
        ));
    }

    #[test]
    fn bulk_update_skips_records_without_id() {
        let records = vec![
            FieldMap::new().with("username", "no-id"),
            FieldMap::new().with("id", 1i64),
            FieldMap::new().with("id", Value::Null).with("username", "null-id"),
            FieldMap::new().with("id", 2i64).with("username", "kept"),
        ];
        let statements = bulk_update::<User>(records).unwrap();
        assert_eq!(statements.len(), 1);
        assert_eq!(
            statements[0].sql(),
            r#"UPDATE "users" SET "username" = $1, "updated_at" = NOW() WHERE "id" = $2"#
        );
    }

    #[test]
    fn bulk_update_rejects_non_integer_id() {
        let records = vec![FieldMap::new().with("id", "7").with("username", "x")];
        assert!(matches!(
            bulk_update::<User>(records),
            Err(ValidationError::TypeMismatch { .. })
        ));
    }
}
