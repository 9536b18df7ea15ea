//! Typed RBAC endpoints.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use shortlink_core::authz::{AccessDecision, RbacSnapshot};
use shortlink_core::envelope::{ApiResponse, PaginationMeta};
use shortlink_core::error::{ShortlinkError, ShortlinkResult};
use shortlink_core::models::permission::{Permission, SetPermission};
use shortlink_core::models::resource::{CreateResource, Resource, ResourceFilter, UpdateResource};
use shortlink_core::models::role::{CreateRole, Role, UpdateRole};
use shortlink_core::models::scope::{Operation, Scopes};
use tracing::debug;
use uuid::Uuid;

use crate::http::HttpClient;

/// Page size used when walking every resource page.
const SNAPSHOT_PAGE_SIZE: u64 = 100;

/// One page of a paginated listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Body of a single-pair upsert.
#[derive(Debug, Clone, Serialize)]
struct PermissionBody {
    scopes: Scopes,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

#[derive(Clone)]
pub struct RbacApi {
    http: HttpClient,
}

impl RbacApi {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    // -----------------------------------------------------------------------
    // Resources
    // -----------------------------------------------------------------------

    pub async fn list_resources(
        &self,
        filter: &ResourceFilter,
        page: u64,
        page_size: u64,
    ) -> ShortlinkResult<Page<Resource>> {
        let mut query = vec![
            ("page", page.to_string()),
            ("page_size", page_size.to_string()),
        ];
        if let Some(key) = &filter.key {
            query.push(("key", key.clone()));
        }
        let response = self.http.get_with_query("/resources", &query).await?;
        into_page(response)
    }

    pub async fn create_resource(&self, input: &CreateResource) -> ShortlinkResult<Resource> {
        data(self.http.post("/resources", input).await?)
    }

    pub async fn get_resource(&self, id: Uuid) -> ShortlinkResult<Resource> {
        data(self.http.get(&format!("/resources/{id}")).await?)
    }

    pub async fn update_resource(
        &self,
        id: Uuid,
        input: &UpdateResource,
    ) -> ShortlinkResult<Resource> {
        data(self.http.put(&format!("/resources/{id}"), input).await?)
    }

    pub async fn delete_resource(&self, id: Uuid) -> ShortlinkResult<()> {
        self.http
            .delete::<Value>(&format!("/resources/{id}"))
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Roles
    // -----------------------------------------------------------------------

    /// Every role, ordered by position in the hierarchy.
    pub async fn list_roles(&self) -> ShortlinkResult<Vec<Role>> {
        data(self.http.get("/roles").await?)
    }

    pub async fn create_role(&self, input: &CreateRole) -> ShortlinkResult<Role> {
        data(self.http.post("/roles", input).await?)
    }

    pub async fn get_role(&self, id: Uuid) -> ShortlinkResult<Role> {
        data(self.http.get(&format!("/roles/{id}")).await?)
    }

    pub async fn update_role(&self, id: Uuid, input: &UpdateRole) -> ShortlinkResult<Role> {
        data(self.http.put(&format!("/roles/{id}"), input).await?)
    }

    pub async fn delete_role(&self, id: Uuid) -> ShortlinkResult<()> {
        self.http.delete::<Value>(&format!("/roles/{id}")).await?;
        Ok(())
    }

    pub async fn ancestors_of(&self, id: Uuid) -> ShortlinkResult<Vec<Role>> {
        data(self.http.get(&format!("/roles/{id}/ancestors")).await?)
    }

    pub async fn descendants_of(&self, id: Uuid) -> ShortlinkResult<Vec<Role>> {
        data(self.http.get(&format!("/roles/{id}/descendants")).await?)
    }

    // -----------------------------------------------------------------------
    // Permissions
    // -----------------------------------------------------------------------

    pub async fn list_permissions(&self) -> ShortlinkResult<Vec<Permission>> {
        data(self.http.get("/permissions").await?)
    }

    pub async fn set_permission(
        &self,
        role_id: Uuid,
        resource_id: Uuid,
        scopes: Scopes,
        description: Option<String>,
    ) -> ShortlinkResult<Permission> {
        let body = PermissionBody {
            scopes,
            description,
        };
        data(
            self.http
                .put(&format!("/permissions/{role_id}/{resource_id}"), &body)
                .await?,
        )
    }

    /// Flip one operation on the stored row, server-side.
    pub async fn toggle_permission(
        &self,
        role_id: Uuid,
        resource_id: Uuid,
        operation: Operation,
    ) -> ShortlinkResult<Permission> {
        let body = json!({ "operation": operation });
        data(
            self.http
                .post(&format!("/permissions/{role_id}/{resource_id}/toggle"), &body)
                .await?,
        )
    }

    /// Replace the whole matrix with `entries` in one request.
    pub async fn save_permissions(
        &self,
        entries: &[SetPermission],
    ) -> ShortlinkResult<Vec<Permission>> {
        debug!(rows = entries.len(), "Saving permission matrix");
        data(self.http.put("/permissions", entries).await?)
    }

    // -----------------------------------------------------------------------
    // Authorization
    // -----------------------------------------------------------------------

    pub async fn check(
        &self,
        role_id: Uuid,
        resource_key: &str,
        operation: Operation,
    ) -> ShortlinkResult<bool> {
        let query = [
            ("role_id", role_id.to_string()),
            ("resource", resource_key.to_string()),
            ("operation", operation.as_str().to_string()),
        ];
        let decision: AccessDecision =
            data(self.http.get_with_query("/authz/check", &query).await?)?;
        Ok(decision.allowed)
    }

    /// Fetch resources, roles and permissions for local evaluation.
    pub async fn load_snapshot(&self) -> ShortlinkResult<RbacSnapshot> {
        let filter = ResourceFilter::default();
        let mut resources = Vec::new();
        let mut page = 1;
        loop {
            let batch = self
                .list_resources(&filter, page, SNAPSHOT_PAGE_SIZE)
                .await?;
            resources.extend(batch.items);
            if page >= batch.pagination.total_pages {
                break;
            }
            page += 1;
        }

        let roles = self.list_roles().await?;
        let permissions = self.list_permissions().await?;
        RbacSnapshot::new(resources, roles, permissions)
    }
}

fn data<T: DeserializeOwned>(response: ApiResponse<T>) -> ShortlinkResult<T> {
    response
        .data
        .ok_or_else(|| ShortlinkError::Internal("response envelope carries no data".into()))
}

fn into_page<T: DeserializeOwned>(response: ApiResponse<Vec<T>>) -> ShortlinkResult<Page<T>> {
    let pagination = response.pagination.ok_or_else(|| {
        ShortlinkError::Internal("paginated response carries no pagination block".into())
    })?;
    Ok(Page {
        items: response.data.unwrap_or_default(),
        pagination,
    })
}
