use std::collections::HashSet;

use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::activity::ActivityEntry;
use crate::auth::{AuthenticatedUser, ClientInfo};
use crate::error::{AppError, AppResult};
use crate::models::{Company, NewCompany, NewCompanyFollower, NewRoleAssignment, User};
use crate::policy::Role;
use crate::schema::{companies, company_followers, role_assignments, users};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateCompanyRequest {
    pub name: String,
    pub admin_user_id: Uuid,
    #[serde(default)]
    pub areas_enabled: bool,
}

#[derive(Serialize)]
pub struct CompanyResponse {
    pub id: Uuid,
    pub name: String,
    pub admin_user_id: Uuid,
    pub areas_enabled: bool,
    pub followed: bool,
    pub created_at: DateTime<Utc>,
}

pub async fn list_companies(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<CompanyResponse>>> {
    let mut conn = state.db()?;

    let rows: Vec<Company> = companies::table
        .order(companies::name.asc())
        .load(&mut conn)?;

    let followed: HashSet<Uuid> = company_followers::table
        .filter(company_followers::user_id.eq(user.user_id))
        .select(company_followers::company_id)
        .load::<Uuid>(&mut conn)?
        .into_iter()
        .collect();

    let response = rows
        .into_iter()
        .map(|company| CompanyResponse {
            followed: followed.contains(&company.id),
            id: company.id,
            name: company.name,
            admin_user_id: company.admin_user_id,
            areas_enabled: company.areas_enabled,
            created_at: company.created_at,
        })
        .collect();

    Ok(Json(response))
}

pub async fn create_company(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    client: ClientInfo,
    Json(payload): Json<CreateCompanyRequest>,
) -> AppResult<(StatusCode, Json<CompanyResponse>)> {
    if user.role != Role::PlatformAdmin {
        return Err(AppError::insufficient_permissions());
    }

    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::validation("name", "name must not be empty"));
    }

    let mut conn = state.db()?;

    let admin: Option<User> = users::table
        .find(payload.admin_user_id)
        .first(&mut conn)
        .optional()?;
    if admin.is_none() {
        return Err(AppError::validation(
            "admin_user_id",
            "admin user does not exist",
        ));
    }

    let new_company = NewCompany {
        id: Uuid::new_v4(),
        name,
        admin_user_id: payload.admin_user_id,
        areas_enabled: payload.areas_enabled,
    };

    conn.transaction::<(), diesel::result::Error, _>(|conn| {
        diesel::insert_into(companies::table)
            .values(&new_company)
            .execute(conn)?;
        diesel::insert_into(role_assignments::table)
            .values(&NewRoleAssignment {
                id: Uuid::new_v4(),
                user_id: new_company.admin_user_id,
                role: Role::CompanyAdmin.as_str().to_string(),
                company_id: Some(new_company.id),
            })
            .on_conflict_do_nothing()
            .execute(conn)?;
        Ok(())
    })?;

    let company: Company = companies::table.find(new_company.id).first(&mut conn)?;

    state.activity.record(
        ActivityEntry::new("company_created", "company")
            .user(user.user_id)
            .entity(company.id)
            .new_values(serde_json::json!({ "name": company.name }))
            .request_meta(client.ip_address, client.user_agent),
    );

    Ok((
        StatusCode::CREATED,
        Json(CompanyResponse {
            id: company.id,
            name: company.name,
            admin_user_id: company.admin_user_id,
            areas_enabled: company.areas_enabled,
            followed: false,
            created_at: company.created_at,
        }),
    ))
}

pub async fn follow_company(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
    user: AuthenticatedUser,
    client: ClientInfo,
) -> AppResult<impl IntoResponse> {
    let mut conn = state.db()?;

    // 404 before touching the join table
    companies::table
        .find(company_id)
        .first::<Company>(&mut conn)?;

    diesel::insert_into(company_followers::table)
        .values(&NewCompanyFollower {
            user_id: user.user_id,
            company_id,
        })
        .on_conflict_do_nothing()
        .execute(&mut conn)?;

    state.activity.record(
        ActivityEntry::new("company_followed", "company")
            .user(user.user_id)
            .entity(company_id)
            .request_meta(client.ip_address, client.user_agent),
    );

    Ok(StatusCode::NO_CONTENT)
}

pub async fn unfollow_company(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
    user: AuthenticatedUser,
    client: ClientInfo,
) -> AppResult<impl IntoResponse> {
    let mut conn = state.db()?;

    companies::table
        .find(company_id)
        .first::<Company>(&mut conn)?;

    diesel::delete(
        company_followers::table
            .filter(company_followers::user_id.eq(user.user_id))
            .filter(company_followers::company_id.eq(company_id)),
    )
    .execute(&mut conn)?;

    state.activity.record(
        ActivityEntry::new("company_unfollowed", "company")
            .user(user.user_id)
            .entity(company_id)
            .request_meta(client.ip_address, client.user_agent),
    );

    Ok(StatusCode::NO_CONTENT)
}
