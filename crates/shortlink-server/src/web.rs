//! HTTP routes.

use std::sync::Arc;

use axum::extract::{Path, Query, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use shortlink_core::authz::{AccessDecision, AuthorizationService};
use shortlink_core::envelope::ApiResponse;
use shortlink_core::error::ShortlinkError;
use shortlink_core::models::permission::{Permission, SetPermission};
use shortlink_core::models::resource::{CreateResource, Resource, ResourceFilter, UpdateResource};
use shortlink_core::models::role::{CreateRole, Role, UpdateRole};
use shortlink_core::models::scope::{Operation, Scopes};
use shortlink_core::repository::{
    Pagination, PermissionRepository, ResourceRepository, RoleRepository,
};
use shortlink_db::repository::{
    SurrealPermissionRepository, SurrealResourceRepository, SurrealRoleRepository,
};
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use tracing::debug;
use uuid::Uuid;

use crate::error::ApiError;
use crate::settings::AuthSettings;

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

type Authz = AuthorizationService<
    SurrealResourceRepository<Any>,
    SurrealRoleRepository<Any>,
    SurrealPermissionRepository<Any>,
>;

#[derive(Clone)]
pub struct AppState {
    pub resources: SurrealResourceRepository<Any>,
    pub roles: SurrealRoleRepository<Any>,
    pub permissions: SurrealPermissionRepository<Any>,
    pub authz: Arc<Authz>,
    pub auth: Arc<AuthSettings>,
}

impl AppState {
    pub fn new(db: Surreal<Any>, auth: AuthSettings) -> Self {
        let resources = SurrealResourceRepository::new(db.clone());
        let roles = SurrealRoleRepository::new(db.clone());
        let permissions = SurrealPermissionRepository::new(db);
        let authz = AuthorizationService::new(resources.clone(), roles.clone(), permissions.clone());
        Self {
            resources,
            roles,
            permissions,
            authz: Arc::new(authz),
            auth: Arc::new(auth),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/resources", get(list_resources).post(create_resource))
        .route(
            "/resources/{id}",
            get(get_resource).put(update_resource).delete(delete_resource),
        )
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/rebuild", post(rebuild_roles))
        .route(
            "/roles/{id}",
            get(get_role).put(update_role).delete(delete_role),
        )
        .route("/roles/{id}/ancestors", get(role_ancestors))
        .route("/roles/{id}/descendants", get(role_descendants))
        .route("/permissions", get(list_permissions).put(save_permissions))
        .route("/permissions/{role_id}/{resource_id}", put(set_permission))
        .route(
            "/permissions/{role_id}/{resource_id}/toggle",
            post(toggle_permission),
        )
        .route("/authz/check", get(check_access))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    api.route("/health", get(health)).with_state(state)
}

/// Reject requests without an accepted `Authorization: Bearer` token.
async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.auth.is_enabled() {
        return Ok(next.run(request).await);
    }
    let authorized = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| state.auth.accepts(token));
    if !authorized {
        debug!(path = %request.uri().path(), "Rejected request without valid bearer token");
        return Err(ShortlinkError::Unauthorized.into());
    }
    Ok(next.run(request).await)
}

async fn health() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::ok("ok"))
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ListResourcesQuery {
    key: Option<String>,
    page: Option<u64>,
    page_size: Option<u64>,
}

async fn list_resources(
    State(state): State<AppState>,
    Query(query): Query<ListResourcesQuery>,
) -> ApiResult<Vec<Resource>> {
    let defaults = Pagination::default();
    let pagination = Pagination::from_page(
        query.page.unwrap_or(1),
        query.page_size.unwrap_or(defaults.limit),
    );
    let filter = ResourceFilter { key: query.key };
    let result = state.resources.list(filter, pagination).await?;
    Ok(Json(ApiResponse::paginated(result)))
}

async fn create_resource(
    State(state): State<AppState>,
    Json(input): Json<CreateResource>,
) -> ApiResult<Resource> {
    Ok(Json(ApiResponse::ok(state.resources.create(input).await?)))
}

async fn get_resource(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Resource> {
    Ok(Json(ApiResponse::ok(state.resources.get_by_id(id).await?)))
}

async fn update_resource(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateResource>,
) -> ApiResult<Resource> {
    Ok(Json(ApiResponse::ok(state.resources.update(id, input).await?)))
}

async fn delete_resource(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<()> {
    state.resources.delete(id).await?;
    Ok(Json(ApiResponse::ok(())))
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

async fn list_roles(State(state): State<AppState>) -> ApiResult<Vec<Role>> {
    Ok(Json(ApiResponse::ok(state.roles.list().await?)))
}

async fn create_role(
    State(state): State<AppState>,
    Json(input): Json<CreateRole>,
) -> ApiResult<Role> {
    Ok(Json(ApiResponse::ok(state.roles.create(input).await?)))
}

async fn get_role(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Role> {
    Ok(Json(ApiResponse::ok(state.roles.get_by_id(id).await?)))
}

async fn update_role(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateRole>,
) -> ApiResult<Role> {
    Ok(Json(ApiResponse::ok(state.roles.update(id, input).await?)))
}

async fn delete_role(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<()> {
    state.roles.delete(id).await?;
    Ok(Json(ApiResponse::ok(())))
}

async fn role_ancestors(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Vec<Role>> {
    Ok(Json(ApiResponse::ok(state.roles.ancestors_of(id).await?)))
}

async fn role_descendants(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<Role>> {
    Ok(Json(ApiResponse::ok(state.roles.descendants_of(id).await?)))
}

async fn rebuild_roles(State(state): State<AppState>) -> ApiResult<usize> {
    Ok(Json(ApiResponse::ok(state.roles.rebuild().await?)))
}

// ---------------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PermissionBody {
    scopes: Scopes,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ToggleBody {
    operation: Operation,
}

async fn list_permissions(State(state): State<AppState>) -> ApiResult<Vec<Permission>> {
    Ok(Json(ApiResponse::ok(state.permissions.snapshot().await?)))
}

async fn save_permissions(
    State(state): State<AppState>,
    Json(entries): Json<Vec<SetPermission>>,
) -> ApiResult<Vec<Permission>> {
    Ok(Json(ApiResponse::ok(state.permissions.save(entries).await?)))
}

async fn set_permission(
    State(state): State<AppState>,
    Path((role_id, resource_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<PermissionBody>,
) -> ApiResult<Permission> {
    let input = SetPermission {
        role_id,
        resource_id,
        scopes: body.scopes,
        description: body.description,
    };
    Ok(Json(ApiResponse::ok(state.permissions.set(input).await?)))
}

async fn toggle_permission(
    State(state): State<AppState>,
    Path((role_id, resource_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<ToggleBody>,
) -> ApiResult<Permission> {
    let permission = state
        .permissions
        .toggle(role_id, resource_id, body.operation.scope())
        .await?;
    Ok(Json(ApiResponse::ok(permission)))
}

// ---------------------------------------------------------------------------
// Authorization
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CheckQuery {
    role_id: Uuid,
    resource: String,
    operation: Operation,
}

async fn check_access(
    State(state): State<AppState>,
    Query(query): Query<CheckQuery>,
) -> ApiResult<AccessDecision> {
    let allowed = state
        .authz
        .can(query.role_id, &query.resource, query.operation)
        .await?;
    Ok(Json(ApiResponse::ok(AccessDecision {
        role_id: query.role_id,
        resource: query.resource,
        operation: query.operation,
        allowed,
    })))
}
