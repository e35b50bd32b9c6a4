use axum::extract::{Json, Query, State};
use chrono::{DateTime, Utc};
use diesel::expression::BoxableExpression;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::sql_types::Bool;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::activity::category_patterns;
use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::ActivityLog;
use crate::policy::Role;
use crate::schema::activity_logs;
use crate::state::AppState;

use super::PageMeta;

const MAX_PAGE_SIZE: i64 = 100;

#[derive(Deserialize)]
pub struct ActivityLogQuery {
    pub user_id: Option<Uuid>,
    pub action: Option<String>,
    pub category: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Serialize)]
pub struct ActivityLogResponse {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
    pub metadata: Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<ActivityLog> for ActivityLogResponse {
    fn from(log: ActivityLog) -> Self {
        Self {
            id: log.id,
            user_id: log.user_id,
            action: log.action,
            entity_type: log.entity_type,
            entity_id: log.entity_id,
            old_values: log.old_values,
            new_values: log.new_values,
            metadata: log.metadata,
            ip_address: log.ip_address,
            user_agent: log.user_agent,
            created_at: log.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct ActivityLogListResponse {
    pub data: Vec<ActivityLogResponse>,
    pub meta: PageMeta,
}

type LogPredicate = Box<dyn BoxableExpression<activity_logs::table, Pg, SqlType = Bool>>;

fn category_predicate(category: &str) -> AppResult<LogPredicate> {
    let patterns = category_patterns(category)
        .ok_or_else(|| AppError::validation("category", "unknown category"))?;

    let mut iter = patterns.iter();
    let first = iter
        .next()
        .ok_or_else(|| AppError::internal("category has no action patterns"))?;
    let mut predicate: LogPredicate = Box::new(activity_logs::action.like(*first));
    for pattern in iter {
        predicate = Box::new(predicate.or(activity_logs::action.like(*pattern)));
    }
    Ok(predicate)
}

fn build_log_query(
    scope_user: Option<Uuid>,
    params: &ActivityLogQuery,
) -> AppResult<activity_logs::BoxedQuery<'static, Pg>> {
    let mut query = activity_logs::table.into_boxed();

    if let Some(user_id) = scope_user {
        query = query.filter(activity_logs::user_id.eq(user_id));
    }
    if let Some(action) = params.action.as_ref().filter(|s| !s.trim().is_empty()) {
        query = query.filter(activity_logs::action.eq(action.trim().to_string()));
    }
    if let Some(category) = params.category.as_deref() {
        query = query.filter(category_predicate(category)?);
    }
    if let Some(from) = params.from {
        query = query.filter(activity_logs::created_at.ge(from));
    }
    if let Some(to) = params.to {
        query = query.filter(activity_logs::created_at.le(to));
    }

    Ok(query)
}

async fn list_scoped(
    state: AppState,
    params: ActivityLogQuery,
    scope_user: Option<Uuid>,
) -> AppResult<Json<ActivityLogListResponse>> {
    let mut conn = state.db()?;

    let per_page = params
        .per_page
        .unwrap_or(state.config.default_page_size)
        .clamp(1, MAX_PAGE_SIZE);
    let page = params.page.unwrap_or(1).max(1);

    let total: i64 = build_log_query(scope_user, &params)?
        .count()
        .get_result(&mut conn)?;

    let rows: Vec<ActivityLog> = build_log_query(scope_user, &params)?
        .order(activity_logs::created_at.desc())
        .limit(per_page)
        .offset((page - 1) * per_page)
        .load(&mut conn)?;

    Ok(Json(ActivityLogListResponse {
        data: rows.into_iter().map(ActivityLogResponse::from).collect(),
        meta: PageMeta::new(page, per_page, total),
    }))
}

pub async fn list_activity_logs(
    State(state): State<AppState>,
    Query(params): Query<ActivityLogQuery>,
    user: AuthenticatedUser,
) -> AppResult<Json<ActivityLogListResponse>> {
    let is_privileged = user.role == Role::PlatformAdmin;

    // Non-privileged callers may only query their own trail.
    let scope_user = match params.user_id {
        Some(target) if target != user.user_id && !is_privileged => {
            return Err(AppError::insufficient_permissions());
        }
        Some(target) => Some(target),
        None if is_privileged => None,
        None => Some(user.user_id),
    };

    list_scoped(state, params, scope_user).await
}

pub async fn my_activity_logs(
    State(state): State<AppState>,
    Query(mut params): Query<ActivityLogQuery>,
    user: AuthenticatedUser,
) -> AppResult<Json<ActivityLogListResponse>> {
    params.user_id = None;
    list_scoped(state, params, Some(user.user_id)).await
}
