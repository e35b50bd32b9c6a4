use std::collections::HashMap;

use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::activity::ActivityEntry;
use crate::auth::{AuthenticatedUser, ClientInfo};
use crate::error::{AppError, AppResult};
use crate::models::{Company, NewRoleAssignment, RoleAssignment, User};
use crate::policy::Role;
use crate::routes::auth::{STATUS_ACTIVE, STATUS_DELETED, STATUS_PENDING, STATUS_SUSPENDED};
use crate::schema::{companies, role_assignments, users};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UserListQuery {
    pub status: Option<String>,
}

#[derive(Serialize)]
pub struct RoleResponse {
    pub role: String,
    pub company_id: Option<Uuid>,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub status: String,
    pub roles: Vec<RoleResponse>,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Deserialize)]
pub struct AssignRoleRequest {
    pub role: String,
    pub company_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct RemoveRoleQuery {
    pub company_id: Option<Uuid>,
}

const STATUSES: &[&str] = &[STATUS_PENDING, STATUS_ACTIVE, STATUS_SUSPENDED, STATUS_DELETED];

fn require_platform_admin(user: &AuthenticatedUser) -> AppResult<()> {
    if user.role != Role::PlatformAdmin {
        return Err(AppError::insufficient_permissions());
    }
    Ok(())
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<UserListQuery>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<UserResponse>>> {
    require_platform_admin(&user)?;

    if let Some(status) = params.status.as_deref() {
        if !STATUSES.contains(&status) {
            return Err(AppError::validation("status", "invalid status filter"));
        }
    }

    let mut conn = state.db()?;

    let mut query = users::table.into_boxed();
    if let Some(status) = params.status.as_deref() {
        query = query.filter(users::status.eq(status.to_string()));
    }
    let rows: Vec<User> = query.order(users::created_at.asc()).load(&mut conn)?;

    let assignments: Vec<RoleAssignment> = role_assignments::table
        .filter(role_assignments::user_id.eq_any(rows.iter().map(|u| u.id).collect::<Vec<_>>()))
        .load(&mut conn)?;

    let mut roles_by_user: HashMap<Uuid, Vec<RoleResponse>> = HashMap::new();
    for assignment in assignments {
        roles_by_user
            .entry(assignment.user_id)
            .or_default()
            .push(RoleResponse {
                role: assignment.role,
                company_id: assignment.company_id,
            });
    }

    let response = rows
        .into_iter()
        .map(|user| UserResponse {
            roles: roles_by_user.remove(&user.id).unwrap_or_default(),
            id: user.id,
            email: user.email,
            status: user.status,
            created_at: user.created_at,
        })
        .collect();

    Ok(Json(response))
}

pub async fn update_user_status(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    user: AuthenticatedUser,
    client: ClientInfo,
    Json(payload): Json<UpdateStatusRequest>,
) -> AppResult<Json<UserResponse>> {
    require_platform_admin(&user)?;

    if !STATUSES.contains(&payload.status.as_str()) {
        return Err(AppError::validation(
            "status",
            "status must be one of pending, active, suspended, deleted",
        ));
    }

    let mut conn = state.db()?;
    let target: User = users::table.find(user_id).first(&mut conn)?;

    diesel::update(users::table.find(user_id))
        .set((
            users::status.eq(&payload.status),
            users::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

    state.activity.record(
        ActivityEntry::new("user_status_changed", "user")
            .user(user.user_id)
            .entity(user_id)
            .old_values(serde_json::json!({ "status": target.status }))
            .new_values(serde_json::json!({ "status": payload.status }))
            .request_meta(client.ip_address, client.user_agent),
    );

    let updated: User = users::table.find(user_id).first(&mut conn)?;
    let assignments: Vec<RoleAssignment> = role_assignments::table
        .filter(role_assignments::user_id.eq(user_id))
        .load(&mut conn)?;

    Ok(Json(UserResponse {
        id: updated.id,
        email: updated.email,
        status: updated.status,
        roles: assignments
            .into_iter()
            .map(|a| RoleResponse {
                role: a.role,
                company_id: a.company_id,
            })
            .collect(),
        created_at: updated.created_at,
    }))
}

pub async fn assign_role(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    user: AuthenticatedUser,
    client: ClientInfo,
    Json(payload): Json<AssignRoleRequest>,
) -> AppResult<(StatusCode, Json<RoleResponse>)> {
    require_platform_admin(&user)?;

    let role: Role = payload
        .role
        .parse()
        .map_err(|_| AppError::validation("role", "unknown role"))?;

    // AGENT and COMPANY_ADMIN are company-scoped; PLATFORM_ADMIN and USER
    // must not carry a company.
    match (role.requires_company(), payload.company_id) {
        (true, None) => {
            return Err(AppError::validation(
                "company_id",
                format!("{} requires a company_id", role.as_str()),
            ))
        }
        (false, Some(_)) => {
            return Err(AppError::validation(
                "company_id",
                format!("{} must not carry a company_id", role.as_str()),
            ))
        }
        _ => {}
    }

    let mut conn = state.db()?;
    users::table.find(user_id).first::<User>(&mut conn)?;

    if let Some(company_id) = payload.company_id {
        companies::table
            .find(company_id)
            .first::<Company>(&mut conn)
            .optional()?
            .ok_or_else(|| AppError::validation("company_id", "company does not exist"))?;
    }

    let duplicate: Option<RoleAssignment> = role_assignments::table
        .filter(role_assignments::user_id.eq(user_id))
        .filter(role_assignments::role.eq(role.as_str()))
        .filter(role_assignments::company_id.is_not_distinct_from(payload.company_id))
        .first(&mut conn)
        .optional()?;
    if duplicate.is_some() {
        return Err(AppError::validation("role", "role is already assigned"));
    }

    diesel::insert_into(role_assignments::table)
        .values(&NewRoleAssignment {
            id: Uuid::new_v4(),
            user_id,
            role: role.as_str().to_string(),
            company_id: payload.company_id,
        })
        .execute(&mut conn)?;

    state.activity.record(
        ActivityEntry::new("role_granted", "user")
            .user(user.user_id)
            .entity(user_id)
            .new_values(serde_json::json!({
                "role": role.as_str(),
                "company_id": payload.company_id,
            }))
            .request_meta(client.ip_address, client.user_agent),
    );

    Ok((
        StatusCode::CREATED,
        Json(RoleResponse {
            role: role.as_str().to_string(),
            company_id: payload.company_id,
        }),
    ))
}

pub async fn remove_role(
    State(state): State<AppState>,
    Path((user_id, role)): Path<(Uuid, String)>,
    Query(params): Query<RemoveRoleQuery>,
    user: AuthenticatedUser,
    client: ClientInfo,
) -> AppResult<impl IntoResponse> {
    require_platform_admin(&user)?;

    let role: Role = role
        .parse()
        .map_err(|_| AppError::validation("role", "unknown role"))?;

    let mut conn = state.db()?;

    // A user must always retain at least one role.
    let held: i64 = role_assignments::table
        .filter(role_assignments::user_id.eq(user_id))
        .count()
        .get_result(&mut conn)?;
    if held <= 1 {
        return Err(AppError::conflict("Cannot remove a user's last role"));
    }

    let deleted = diesel::delete(
        role_assignments::table
            .filter(role_assignments::user_id.eq(user_id))
            .filter(role_assignments::role.eq(role.as_str()))
            .filter(role_assignments::company_id.is_not_distinct_from(params.company_id)),
    )
    .execute(&mut conn)?;

    if deleted == 0 {
        return Err(AppError::not_found());
    }

    state.activity.record(
        ActivityEntry::new("role_revoked", "user")
            .user(user.user_id)
            .entity(user_id)
            .old_values(serde_json::json!({
                "role": role.as_str(),
                "company_id": params.company_id,
            }))
            .request_meta(client.ip_address, client.user_agent),
    );

    Ok(StatusCode::NO_CONTENT)
}
