//! Pool-backed data access
//!
//! `Dao<E>` manages its own scope per call: it validates and builds the
//! statement, then acquires a pooled connection and runs it. Validation
//! errors therefore never cost a connection.

use std::fmt;
use std::marker::PhantomData;

use sqlx::PgPool;

use super::query::{self, Window};
use super::session::{
    count_rows, find_many, find_optional, find_single, paged, run_upsert, write_counting,
    write_one, write_returning, Session,
};
use crate::error::Result;
use crate::models::{IntoFields, Paginated, Pagination};
use crate::schema::Entity;

/// Generic CRUD over entity `E`, one pooled connection per call.
///
/// Cloning is cheap (the pool is reference counted).
pub struct Dao<E> {
    pool: PgPool,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Dao<E> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> fmt::Debug for Dao<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dao").field("table", &E::table_name()).finish()
    }
}

impl<E: Entity> Dao<E> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _entity: PhantomData,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Bind this DAO's entity to a caller-owned connection or transaction.
    pub fn session<'c>(&self, conn: &'c mut sqlx::PgConnection) -> Session<'c, E> {
        Session::new(conn)
    }

    pub async fn find_one_or_none_by_id(&self, id: i64) -> Result<Option<E>> {
        let stmt = query::select_by_id::<E>(id);
        let mut conn = self.pool.acquire().await?;
        find_optional(&mut conn, stmt).await
    }

    /// At most one match; several matches is `DbError::MultipleRows`.
    pub async fn find_one_or_none(&self, filter: impl IntoFields) -> Result<Option<E>> {
        let stmt = query::select::<E>(filter.into_fields(), Window::Limit(2))?;
        let mut conn = self.pool.acquire().await?;
        find_single(&mut conn, stmt).await
    }

    /// Every match, ordered by id.
    pub async fn find_all(&self, filter: impl IntoFields) -> Result<Vec<E>> {
        let stmt = query::select::<E>(filter.into_fields(), Window::All)?;
        let mut conn = self.pool.acquire().await?;
        find_many(&mut conn, stmt).await
    }

    pub async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<E>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let stmt = query::select_by_ids::<E>(ids.to_vec());
        let mut conn = self.pool.acquire().await?;
        find_many(&mut conn, stmt).await
    }

    pub async fn count(&self, filter: impl IntoFields) -> Result<i64> {
        let stmt = query::count::<E>(filter.into_fields())?;
        let mut conn = self.pool.acquire().await?;
        count_rows::<E>(&mut conn, stmt).await
    }

    /// One 1-indexed page of matches ordered by id.
    pub async fn paginate(
        &self,
        page: i64,
        page_size: i64,
        filter: impl IntoFields,
    ) -> Result<Vec<E>> {
        let page = Pagination::try_new(page, page_size)?;
        let stmt = query::select::<E>(filter.into_fields(), Window::Page(page))?;
        let mut conn = self.pool.acquire().await?;
        find_many(&mut conn, stmt).await
    }

    /// Like `paginate`, with the total match count alongside the page.
    pub async fn paginate_counted(
        &self,
        page: Pagination,
        filter: impl IntoFields,
    ) -> Result<Paginated<E>> {
        let filter = filter.into_fields();
        let count_stmt = query::count::<E>(filter.clone())?;
        let page_stmt = query::select::<E>(filter, Window::Page(page))?;
        let mut conn = self.pool.acquire().await?;
        paged(&mut conn, page, count_stmt, page_stmt).await
    }

    /// Insert one row and return it with its server-assigned columns.
    pub async fn add(&self, values: impl IntoFields) -> Result<E> {
        let stmt = query::insert::<E>(values.into_fields())?;
        let mut conn = self.pool.acquire().await?;
        write_one(&mut conn, "add", stmt).await
    }

    /// Insert every row or none of them.
    pub async fn add_many<I>(&self, rows: I) -> Result<Vec<E>>
    where
        I: IntoIterator,
        I::Item: IntoFields,
    {
        let rows: Vec<_> = rows.into_iter().map(IntoFields::into_fields).collect();
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let stmts = query::insert_many::<E>(rows)?;
        let mut conn = self.pool.acquire().await?;
        write_returning(&mut conn, "add_many", stmts).await
    }

    /// Returns the number of rows changed; no match is `Ok(0)`.
    pub async fn update(&self, filter: impl IntoFields, values: impl IntoFields) -> Result<u64> {
        let stmt = query::update::<E>(filter.into_fields(), values.into_fields())?;
        let mut conn = self.pool.acquire().await?;
        write_counting::<E>(&mut conn, "update", vec![stmt]).await
    }

    /// An empty filter is refused unless `delete_all` is set.
    pub async fn delete(&self, filter: impl IntoFields, delete_all: bool) -> Result<u64> {
        let stmt = query::delete::<E>(filter.into_fields(), delete_all)?;
        let mut conn = self.pool.acquire().await?;
        write_counting::<E>(&mut conn, "delete", vec![stmt]).await
    }

    /// Insert, or overwrite the fields in `values` on the row whose
    /// `unique_fields` match.
    ///
    /// A key declared in `Entity::UNIQUE_KEYS` runs as one
    /// `INSERT ... ON CONFLICT`. Any other key locks the matching row with
    /// `SELECT ... FOR UPDATE` and then updates or inserts in the same scope;
    /// several matching rows is `DbError::MultipleRows`.
    pub async fn upsert(&self, unique_fields: &[&str], values: impl IntoFields) -> Result<E> {
        let plan = query::upsert::<E>(unique_fields, values.into_fields())?;
        let mut conn = self.pool.acquire().await?;
        run_upsert(&mut conn, plan).await
    }

    /// Apply per-record updates keyed by `id` in a single scope.
    pub async fn bulk_update<I>(&self, records: I) -> Result<u64>
    where
        I: IntoIterator,
        I::Item: IntoFields,
    {
        let records = records.into_iter().map(IntoFields::into_fields).collect();
        let stmts = query::bulk_update::<E>(records)?;
        if stmts.is_empty() {
            return Ok(0);
        }
        let mut conn = self.pool.acquire().await?;
        write_counting::<E>(&mut conn, "bulk_update", stmts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::models::{FieldMap, ValidationError};
    use crate::users::User;
    use sqlx::postgres::PgPoolOptions;

    // Nothing listens on this address; any attempt to connect would fail
    // with a storage error rather than a validation error.
    fn unreachable_dao() -> Dao<User> {
        let pool = PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(200))
            .connect_lazy("postgres://refbot@127.0.0.1:1/refbot")
            .expect("lazy pool");
        Dao::new(pool)
    }

    #[tokio::test]
    async fn delete_without_filter_fails_before_storage() {
        let dao = unreachable_dao();
        let err = dao.delete(FieldMap::new(), false).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Validation(ValidationError::UnboundedDelete { .. })
        ));
    }

    #[tokio::test]
    async fn invalid_page_fails_before_storage() {
        let dao = unreachable_dao();
        let err = dao.paginate(0, 10, FieldMap::new()).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn oversized_page_fails_before_storage() {
        let dao = unreachable_dao();
        let err = dao
            .paginate(1, i64::from(u32::MAX) + 1, FieldMap::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Validation(ValidationError::PageOutOfRange { .. })
        ));
    }

    #[tokio::test]
    async fn upsert_validates_before_storage() {
        let dao = unreachable_dao();
        let err = dao
            .upsert(&["username"], [("first_name", "Ada")])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Validation(ValidationError::MissingUniqueKey { .. })
        ));
    }

    #[tokio::test]
    async fn empty_batches_skip_storage() {
        let dao = unreachable_dao();
        assert!(dao.add_many(Vec::<FieldMap>::new()).await.unwrap().is_empty());
        assert!(dao.find_by_ids(&[]).await.unwrap().is_empty());
        let skipped = vec![FieldMap::new().with("username", "no id")];
        assert_eq!(dao.bulk_update(skipped).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn storage_errors_surface_as_sqlx() {
        let dao = unreachable_dao();
        let err = dao.count(FieldMap::new()).await.unwrap_err();
        assert!(matches!(err, DbError::Sqlx(_)));
    }
}
