//! SurrealDB implementation of [`ResourceRepository`].

use chrono::{DateTime, Utc};
use shortlink_core::error::{ShortlinkError, ShortlinkResult};
use shortlink_core::models::resource::{
    CreateResource, Resource, ResourceFilter, UpdateResource, validate_key,
};
use shortlink_core::repository::{PaginatedResult, Pagination, ResourceRepository};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;
use uuid::Uuid;

use crate::error::{DbError, parse_uuid, violates_index};
use crate::repository::{BUMP_VERSION, CountRow, IdRow, write_retrying};

const KEY_INDEX: &str = "idx_resource_key";

#[derive(Debug, SurrealValue)]
struct ResourceRow {
    record_id: String,
    key: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ResourceRow {
    fn try_into_resource(self) -> Result<Resource, DbError> {
        Ok(Resource {
            id: parse_uuid("resource", &self.record_id)?,
            key: self.key,
            description: self.description,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn duplicate_key(key: String) -> ShortlinkError {
    ShortlinkError::DuplicateKey {
        entity: "resource".into(),
        key,
    }
}

/// SurrealDB implementation of the Resource repository.
#[derive(Clone)]
pub struct SurrealResourceRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealResourceRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// Id of the resource currently owning `key`, if any.
    async fn key_owner(&self, key: &str) -> ShortlinkResult<Option<Uuid>> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id FROM resource WHERE key = $key LIMIT 1")
            .bind(("key", key.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<IdRow> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .next()
            .map(|row| parse_uuid("resource", &row.record_id))
            .transpose()
            .map_err(Into::into)
    }
}

impl<C: Connection> ResourceRepository for SurrealResourceRepository<C> {
    async fn create(&self, input: CreateResource) -> ShortlinkResult<Resource> {
        validate_key(&input.key)?;
        if self.key_owner(&input.key).await?.is_some() {
            return Err(duplicate_key(input.key));
        }

        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let query = format!(
            "BEGIN TRANSACTION; \
             CREATE type::record('resource', $id) SET \
             key = $key, description = $description; \
             {BUMP_VERSION} \
             COMMIT TRANSACTION;"
        );
        let outcome = write_retrying(|| {
            let builder = self
                .db
                .query(query.as_str())
                .bind(("id", id_str.clone()))
                .bind(("key", input.key.clone()))
                .bind(("description", input.description.clone()));
            async move { builder.await?.check() }
        })
        .await;
        match outcome {
            Ok(_) => {}
            Err(e) if violates_index(&e, KEY_INDEX) => return Err(duplicate_key(input.key)),
            Err(e) => return Err(DbError::from(e).into()),
        }

        let row = self.get_by_id(id).await?;
        info!(resource_id = %id, key = %row.key, "Resource created");
        Ok(row)
    }

    async fn get_by_id(&self, id: Uuid) -> ShortlinkResult<Resource> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('resource', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ResourceRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("resource", id_str))?;

        row.try_into_resource().map_err(Into::into)
    }

    async fn find_by_key(&self, key: &str) -> ShortlinkResult<Resource> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM resource WHERE key = $key LIMIT 1")
            .bind(("key", key.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ResourceRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("resource", key))?;

        row.try_into_resource().map_err(Into::into)
    }

    async fn update(&self, id: Uuid, input: UpdateResource) -> ShortlinkResult<Resource> {
        let id_str = id.to_string();

        // Existence first, so an unknown id is NotFound rather than a no-op.
        self.get_by_id(id).await?;

        if let Some(key) = &input.key {
            validate_key(key)?;
            if let Some(owner) = self.key_owner(key).await?
                && owner != id
            {
                return Err(duplicate_key(key.clone()));
            }
        }

        let mut sets = Vec::new();
        if input.key.is_some() {
            sets.push("key = $key");
        }
        if input.description.is_some() {
            sets.push("description = $description");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "BEGIN TRANSACTION; \
             UPDATE type::record('resource', $id) SET {}; \
             {BUMP_VERSION} \
             COMMIT TRANSACTION;",
            sets.join(", ")
        );

        let outcome = write_retrying(|| {
            let mut builder = self.db.query(query.as_str()).bind(("id", id_str.clone()));
            if let Some(key) = input.key.clone() {
                builder = builder.bind(("key", key));
            }
            // `Some(None)` clears the description.
            if let Some(description) = input.description.clone() {
                builder = builder.bind(("description", description));
            }
            async move { builder.await?.check() }
        })
        .await;
        match outcome {
            Ok(_) => {}
            Err(e) if violates_index(&e, KEY_INDEX) => {
                return Err(duplicate_key(input.key.unwrap_or_default()));
            }
            Err(e) => return Err(DbError::from(e).into()),
        }

        let row = self.get_by_id(id).await?;
        info!(resource_id = %id, key = %row.key, "Resource updated");
        Ok(row)
    }

    async fn delete(&self, id: Uuid) -> ShortlinkResult<()> {
        let id_str = id.to_string();
        let resource = self.get_by_id(id).await?;

        let mut count_result = self
            .db
            .query("SELECT count() AS total FROM permission WHERE resource_id = $id GROUP ALL")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;
        let counts: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let permissions = counts.first().map(|r| r.total).unwrap_or(0);

        // Permission rows go with the resource, in one transaction.
        let query = format!(
            "BEGIN TRANSACTION; \
             DELETE permission WHERE resource_id = $id; \
             DELETE type::record('resource', $id); \
             {BUMP_VERSION} \
             COMMIT TRANSACTION;"
        );
        write_retrying(|| {
            let builder = self.db.query(query.as_str()).bind(("id", id_str.clone()));
            async move { builder.await?.check() }
        })
        .await
        .map_err(DbError::from)?;

        info!(resource_id = %id, key = %resource.key, permissions, "Resource deleted");
        Ok(())
    }

    async fn list(
        &self,
        filter: ResourceFilter,
        pagination: Pagination,
    ) -> ShortlinkResult<PaginatedResult<Resource>> {
        let condition = if filter.key.is_some() {
            "WHERE string::contains(key, $needle)"
        } else {
            ""
        };

        let mut count_builder = self.db.query(format!(
            "SELECT count() AS total FROM resource {condition} GROUP ALL"
        ));
        let mut page_builder = self.db.query(format!(
            "SELECT meta::id(id) AS record_id, * FROM resource {condition} \
             ORDER BY key ASC \
             LIMIT $limit START $offset"
        ));
        if let Some(needle) = filter.key {
            count_builder = count_builder.bind(("needle", needle.clone()));
            page_builder = page_builder.bind(("needle", needle));
        }

        let mut count_result = count_builder.await.map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = page_builder
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ResourceRow> = result.take(0).map_err(DbError::from)?;

        let items = rows
            .into_iter()
            .map(|row| row.try_into_resource())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn list_all(&self) -> ShortlinkResult<Vec<Resource>> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM resource ORDER BY key ASC")
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ResourceRow> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .map(|row| row.try_into_resource())
            .collect::<Result<Vec<_>, DbError>>()
            .map_err(Into::into)
    }
}
