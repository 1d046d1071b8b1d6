//! Operations on a caller-owned connection
//!
//! `Session` borrows a `PgConnection` (a pooled connection or an open
//! transaction) for the duration of each call. Reads run directly on it.
//! Writes open their own scope with `Connection::begin`, which is a plain
//! transaction on an idle connection and a savepoint inside the caller's
//! transaction, so the caller's scope is never committed or rolled back here.

use std::marker::PhantomData;

use sqlx::{Connection, PgConnection};
use tracing::{debug, error, info, warn};

use super::query::{self, Statement, Upsert, Window};
use crate::error::{DbError, Result};
use crate::models::{FieldMap, IntoFields, Paginated, Pagination};
use crate::schema::Entity;

/// Data access for entity `E` on a borrowed connection.
///
/// ```ignore
/// let mut tx = pool.begin().await?;
/// let mut users = Session::<User>::new(&mut tx);
/// let user = users.add(NewUser::new(42)).await?;
/// users.update([("id", user.id)], [("username", "ada")]).await?;
/// tx.commit().await?;
/// ```
pub struct Session<'c, E> {
    conn: &'c mut PgConnection,
    _entity: PhantomData<fn() -> E>,
}

impl<'c, E: Entity> Session<'c, E> {
    pub fn new(conn: &'c mut PgConnection) -> Self {
        Self {
            conn,
            _entity: PhantomData,
        }
    }

    pub async fn find_one_or_none_by_id(&mut self, id: i64) -> Result<Option<E>> {
        find_optional(self.conn, query::select_by_id::<E>(id)).await
    }

    pub async fn find_one_or_none(&mut self, filter: impl IntoFields) -> Result<Option<E>> {
        let stmt = query::select::<E>(filter.into_fields(), Window::Limit(2))?;
        find_single(self.conn, stmt).await
    }

    pub async fn find_all(&mut self, filter: impl IntoFields) -> Result<Vec<E>> {
        let stmt = query::select::<E>(filter.into_fields(), Window::All)?;
        find_many(self.conn, stmt).await
    }

    pub async fn find_by_ids(&mut self, ids: &[i64]) -> Result<Vec<E>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        find_many(self.conn, query::select_by_ids::<E>(ids.to_vec())).await
    }

    pub async fn count(&mut self, filter: impl IntoFields) -> Result<i64> {
        let stmt = query::count::<E>(filter.into_fields())?;
        count_rows::<E>(self.conn, stmt).await
    }

    pub async fn paginate(
        &mut self,
        page: i64,
        page_size: i64,
        filter: impl IntoFields,
    ) -> Result<Vec<E>> {
        let page = Pagination::try_new(page, page_size)?;
        let stmt = query::select::<E>(filter.into_fields(), Window::Page(page))?;
        find_many(self.conn, stmt).await
    }

    pub async fn paginate_counted(
        &mut self,
        page: Pagination,
        filter: impl IntoFields,
    ) -> Result<Paginated<E>> {
        let filter = filter.into_fields();
        let count_stmt = query::count::<E>(filter.clone())?;
        let page_stmt = query::select::<E>(filter, Window::Page(page))?;
        paged(self.conn, page, count_stmt, page_stmt).await
    }

    pub async fn add(&mut self, values: impl IntoFields) -> Result<E> {
        let stmt = query::insert::<E>(values.into_fields())?;
        write_one(self.conn, "add", stmt).await
    }

    pub async fn add_many<I>(&mut self, rows: I) -> Result<Vec<E>>
    where
        I: IntoIterator,
        I::Item: IntoFields,
    {
        let rows: Vec<_> = rows.into_iter().map(IntoFields::into_fields).collect();
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let stmts = query::insert_many::<E>(rows)?;
        write_returning(self.conn, "add_many", stmts).await
    }

    pub async fn update(
        &mut self,
        filter: impl IntoFields,
        values: impl IntoFields,
    ) -> Result<u64> {
        let stmt = query::update::<E>(filter.into_fields(), values.into_fields())?;
        write_counting::<E>(self.conn, "update", vec![stmt]).await
    }

    pub async fn delete(&mut self, filter: impl IntoFields, delete_all: bool) -> Result<u64> {
        let stmt = query::delete::<E>(filter.into_fields(), delete_all)?;
        write_counting::<E>(self.conn, "delete", vec![stmt]).await
    }

    pub async fn upsert(&mut self, unique_fields: &[&str], values: impl IntoFields) -> Result<E> {
        let plan = query::upsert::<E>(unique_fields, values.into_fields())?;
        run_upsert(self.conn, plan).await
    }

    pub async fn bulk_update<I>(&mut self, records: I) -> Result<u64>
    where
        I: IntoIterator,
        I::Item: IntoFields,
    {
        let records = records.into_iter().map(IntoFields::into_fields).collect();
        let stmts = query::bulk_update::<E>(records)?;
        if stmts.is_empty() {
            return Ok(0);
        }
        write_counting::<E>(self.conn, "bulk_update", stmts).await
    }
}

pub(crate) async fn find_optional<E: Entity>(
    conn: &mut PgConnection,
    mut stmt: Statement,
) -> Result<Option<E>> {
    debug!(table = %E::table_name(), sql = stmt.sql(), "fetch optional");
    match stmt.build_query_as::<E>().fetch_optional(conn).await {
        Ok(row) => {
            info!(table = %E::table_name(), found = row.is_some(), "lookup finished");
            Ok(row)
        }
        Err(err) => {
            error!(table = %E::table_name(), error = %err, "lookup failed");
            Err(err.into())
        }
    }
}

pub(crate) async fn find_single<E: Entity>(
    conn: &mut PgConnection,
    stmt: Statement,
) -> Result<Option<E>> {
    let mut rows = find_many::<E>(conn, stmt).await?;
    if rows.len() > 1 {
        return Err(DbError::MultipleRows {
            table: E::table_name(),
        });
    }
    Ok(rows.pop())
}

pub(crate) async fn find_many<E: Entity>(
    conn: &mut PgConnection,
    mut stmt: Statement,
) -> Result<Vec<E>> {
    debug!(table = %E::table_name(), sql = stmt.sql(), "fetch all");
    match stmt.build_query_as::<E>().fetch_all(conn).await {
        Ok(rows) => {
            info!(table = %E::table_name(), rows = rows.len(), "records found");
            Ok(rows)
        }
        Err(err) => {
            error!(table = %E::table_name(), error = %err, "query failed");
            Err(err.into())
        }
    }
}

pub(crate) async fn count_rows<E: Entity>(
    conn: &mut PgConnection,
    mut stmt: Statement,
) -> Result<i64> {
    debug!(table = %E::table_name(), sql = stmt.sql(), "count");
    match stmt.build_query_scalar::<i64>().fetch_one(conn).await {
        Ok(count) => {
            info!(table = %E::table_name(), count, "records counted");
            Ok(count)
        }
        Err(err) => {
            error!(table = %E::table_name(), error = %err, "count failed");
            Err(err.into())
        }
    }
}

pub(crate) async fn paged<E: Entity>(
    conn: &mut PgConnection,
    page: Pagination,
    count_stmt: Statement,
    page_stmt: Statement,
) -> Result<Paginated<E>> {
    let total = count_rows::<E>(conn, count_stmt).await?;
    let items = find_many::<E>(conn, page_stmt).await?;
    Ok(Paginated {
        items,
        total,
        page: page.page(),
        per_page: page.per_page(),
    })
}

pub(crate) async fn write_one<E: Entity>(
    conn: &mut PgConnection,
    op: &'static str,
    stmt: Statement,
) -> Result<E> {
    write_returning::<E>(conn, op, vec![stmt])
        .await?
        .pop()
        .ok_or_else(|| sqlx::Error::RowNotFound.into())
}

pub(crate) async fn run_upsert<E: Entity>(conn: &mut PgConnection, plan: Upsert) -> Result<E> {
    match plan {
        Upsert::Conflict(stmt) => write_one(conn, "upsert", stmt).await,
        Upsert::Lookup { lookup, values } => upsert_by_lookup(conn, lookup, values).await,
    }
}

/// Lock the row matching the key, then update it or insert a new one.
async fn upsert_by_lookup<E: Entity>(
    conn: &mut PgConnection,
    lookup: Statement,
    values: FieldMap,
) -> Result<E> {
    info!(table = %E::table_name(), op = "upsert", "write by lookup");
    let mut tx = conn.begin().await?;
    match lookup_then_write::<E>(&mut tx, lookup, values).await {
        Ok(row) => {
            tx.commit().await?;
            info!(table = %E::table_name(), op = "upsert", id = row.id(), "write committed");
            Ok(row)
        }
        Err(err) => {
            error!(table = %E::table_name(), op = "upsert", error = %err, "write failed, rolling back");
            if let Err(rollback_err) = tx.rollback().await {
                warn!(op = "upsert", error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}

async fn lookup_then_write<E: Entity>(
    conn: &mut PgConnection,
    lookup: Statement,
    values: FieldMap,
) -> Result<E> {
    let mut stmt = match find_single::<E>(conn, lookup).await? {
        Some(existing) => query::update_by_id::<E>(existing.id(), values),
        None => query::insert::<E>(values)?,
    };
    debug!(table = %E::table_name(), op = "upsert", sql = stmt.sql(), "execute");
    let row = stmt.build_query_as::<E>().fetch_one(conn).await?;
    Ok(row)
}

/// Run statements in one scope, collecting the rows they return.
pub(crate) async fn write_returning<E: Entity>(
    conn: &mut PgConnection,
    op: &'static str,
    stmts: Vec<Statement>,
) -> Result<Vec<E>> {
    info!(table = %E::table_name(), op, statements = stmts.len(), "write");
    let mut tx = conn.begin().await?;
    let mut rows = Vec::new();
    for mut stmt in stmts {
        debug!(table = %E::table_name(), op, sql = stmt.sql(), "execute");
        match stmt.build_query_as::<E>().fetch_all(&mut *tx).await {
            Ok(batch) => rows.extend(batch),
            Err(err) => {
                error!(table = %E::table_name(), op, error = %err, "write failed, rolling back");
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(op, error = %rollback_err, "rollback failed");
                }
                return Err(err.into());
            }
        }
    }
    tx.commit().await?;
    info!(table = %E::table_name(), op, rows = rows.len(), "write committed");
    Ok(rows)
}

/// Run statements in one scope, summing affected row counts.
pub(crate) async fn write_counting<E: Entity>(
    conn: &mut PgConnection,
    op: &'static str,
    stmts: Vec<Statement>,
) -> Result<u64> {
    info!(table = %E::table_name(), op, statements = stmts.len(), "write");
    let mut tx = conn.begin().await?;
    let mut affected = 0u64;
    for mut stmt in stmts {
        debug!(table = %E::table_name(), op, sql = stmt.sql(), "execute");
        match stmt.build().execute(&mut *tx).await {
            Ok(result) => affected += result.rows_affected(),
            Err(err) => {
                error!(table = %E::table_name(), op, error = %err, "write failed, rolling back");
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(op, error = %rollback_err, "rollback failed");
                }
                return Err(err.into());
            }
        }
    }
    tx.commit().await?;
    info!(table = %E::table_name(), op, rows = affected, "write committed");
    Ok(affected)
}
