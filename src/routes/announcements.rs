use std::collections::BTreeMap;

use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use diesel::dsl::exists;
use diesel::{prelude::*, select, PgConnection};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::activity::ActivityEntry;
use crate::auth::{AuthenticatedUser, ClientInfo};
use crate::error::{AppError, AppResult};
use crate::jobs::{cancel_publish_jobs, enqueue_job, JOB_PUBLISH_ANNOUNCEMENT};
use crate::metadata::{
    schema_for, AnnouncementKind, AnnouncementMetadata, MetadataError, MetadataSchema,
    PublicationStatus,
};
use crate::models::{Announcement, NewAnnouncement};
use crate::policy::{self, Actor};
use crate::schema::{announcements, company_followers};
use crate::state::AppState;

use super::PageMeta;

const MAX_PAGE_SIZE: i64 = 100;

#[derive(Deserialize)]
pub struct AnnouncementListQuery {
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub published_after: Option<DateTime<Utc>>,
    pub published_before: Option<DateTime<Utc>>,
    pub company_id: Option<Uuid>,
}

#[derive(Serialize)]
pub struct AnnouncementResponse {
    pub id: Uuid,
    pub company_id: Uuid,
    pub author_id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub content: String,
    pub status: String,
    pub metadata: Value,
    pub published_at: Option<DateTime<Utc>>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Announcement> for AnnouncementResponse {
    fn from(announcement: Announcement) -> Self {
        Self {
            id: announcement.id,
            company_id: announcement.company_id,
            author_id: announcement.author_id,
            kind: announcement.kind,
            title: announcement.title,
            content: announcement.content,
            status: announcement.status,
            metadata: announcement.metadata,
            published_at: announcement.published_at,
            scheduled_for: announcement.scheduled_for,
            created_at: announcement.created_at,
            updated_at: announcement.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct AnnouncementListResponse {
    pub data: Vec<AnnouncementResponse>,
    pub meta: PageMeta,
}

#[derive(Deserialize)]
pub struct CreateAnnouncementRequest {
    pub title: String,
    pub content: String,
    pub metadata: Value,
    pub action: Option<String>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub company_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct UpdateAnnouncementRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub metadata: Option<serde_json::Map<String, Value>>,
    // `type` and `company_id` are immutable; unknown keys in the payload are
    // ignored by deserialization, which is exactly the contract.
}

#[derive(Deserialize)]
pub struct ScheduleRequest {
    pub scheduled_for: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct ResolveIncidentRequest {
    pub resolution_content: String,
    pub resolved_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub title: Option<String>,
}

fn metadata_error(err: MetadataError) -> AppError {
    AppError::validation(err.field, err.message)
}

fn parse_status(raw: &str) -> AppResult<PublicationStatus> {
    raw.parse()
        .map_err(|_| AppError::internal(format!("announcement has invalid status '{raw}'")))
}

fn parse_kind(raw: &str) -> AppResult<AnnouncementKind> {
    raw.parse()
        .map_err(|_| AppError::internal(format!("announcement has invalid kind '{raw}'")))
}

fn find_announcement(conn: &mut PgConnection, id: Uuid) -> AppResult<Announcement> {
    announcements::table
        .find(id)
        .first(conn)
        .map_err(AppError::from)
}

fn follows_company(conn: &mut PgConnection, user_id: Uuid, company_id: Uuid) -> AppResult<bool> {
    let follows: bool = select(exists(
        company_followers::table
            .filter(company_followers::user_id.eq(user_id))
            .filter(company_followers::company_id.eq(company_id)),
    ))
    .get_result(conn)?;
    Ok(follows)
}

fn ensure_can_manage(actor: &Actor, announcement: &Announcement) -> AppResult<()> {
    if !policy::can_manage_announcement(actor, announcement.company_id) {
        return Err(AppError::insufficient_permissions());
    }
    Ok(())
}

struct ListScope {
    company: Option<Uuid>,
    published_only_in: Option<Vec<Uuid>>,
}

fn build_list_query<'a>(
    scope: &'a ListScope,
    params: &'a AnnouncementListQuery,
    status_filter: Option<PublicationStatus>,
    kind_filter: Option<AnnouncementKind>,
) -> announcements::BoxedQuery<'a, diesel::pg::Pg> {
    let mut query = announcements::table.into_boxed();

    if let Some(company) = scope.company {
        query = query.filter(announcements::company_id.eq(company));
    }
    if let Some(followed) = scope.published_only_in.as_ref() {
        query = query
            .filter(announcements::status.eq(PublicationStatus::Published.as_str()))
            .filter(announcements::company_id.eq_any(followed.clone()));
    }

    if let Some(status) = status_filter {
        query = query.filter(announcements::status.eq(status.as_str()));
    }
    if let Some(kind) = kind_filter {
        query = query.filter(announcements::kind.eq(kind.as_str()));
    }
    if let Some(search) = params.search.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search.replace('%', "\\%").replace('_', "\\_"));
        query = query.filter(
            announcements::title
                .ilike(pattern.clone())
                .or(announcements::content.ilike(pattern)),
        );
    }
    if let Some(after) = params.published_after {
        query = query.filter(announcements::published_at.ge(after));
    }
    if let Some(before) = params.published_before {
        query = query.filter(announcements::published_at.le(before));
    }

    query
}

pub async fn list_announcements(
    State(state): State<AppState>,
    Query(params): Query<AnnouncementListQuery>,
    user: AuthenticatedUser,
) -> AppResult<Json<AnnouncementListResponse>> {
    let actor = user.actor();
    let mut conn = state.db()?;

    let scope = match actor.role {
        policy::Role::PlatformAdmin => ListScope {
            company: params.company_id,
            published_only_in: None,
        },
        policy::Role::CompanyAdmin => {
            let company = actor
                .company_id
                .ok_or_else(AppError::insufficient_permissions)?;
            ListScope {
                company: Some(company),
                published_only_in: None,
            }
        }
        policy::Role::Agent | policy::Role::User => {
            let followed: Vec<Uuid> = company_followers::table
                .filter(company_followers::user_id.eq(actor.user_id))
                .select(company_followers::company_id)
                .load(&mut conn)?;
            ListScope {
                company: None,
                published_only_in: Some(followed),
            }
        }
    };

    let status_filter = match params.status.as_deref() {
        None => None,
        Some(raw) => Some(
            raw.to_uppercase()
                .parse::<PublicationStatus>()
                .map_err(|_| AppError::validation("status", "invalid status filter"))?,
        ),
    };
    let kind_filter = match params.kind.as_deref() {
        None => None,
        Some(raw) => Some(
            raw.parse::<AnnouncementKind>()
                .map_err(|_| AppError::validation("type", "invalid type filter"))?,
        ),
    };

    let per_page = params
        .per_page
        .unwrap_or(state.config.default_page_size)
        .clamp(1, MAX_PAGE_SIZE);
    let page = params.page.unwrap_or(1).max(1);

    let total: i64 = build_list_query(&scope, &params, status_filter, kind_filter)
        .count()
        .get_result(&mut conn)?;

    let mut query = build_list_query(&scope, &params, status_filter, kind_filter);
    query = match params.sort.as_deref() {
        None | Some("-published_at") => query.order((
            announcements::published_at.desc().nulls_last(),
            announcements::created_at.desc(),
        )),
        Some("-created_at") => query.order(announcements::created_at.desc()),
        Some("title") => query.order(announcements::title.asc()),
        Some(_) => return Err(AppError::validation("sort", "invalid sort key")),
    };

    let rows: Vec<Announcement> = query
        .limit(per_page)
        .offset((page - 1) * per_page)
        .load(&mut conn)?;

    Ok(Json(AnnouncementListResponse {
        data: rows.into_iter().map(AnnouncementResponse::from).collect(),
        meta: PageMeta::new(page, per_page, total),
    }))
}

pub async fn get_announcement(
    State(state): State<AppState>,
    Path(announcement_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<AnnouncementResponse>> {
    let actor = user.actor();
    let mut conn = state.db()?;

    let announcement = find_announcement(&mut conn, announcement_id)?;
    let status = parse_status(&announcement.status)?;

    let follows = match actor.role {
        policy::Role::Agent | policy::Role::User => {
            follows_company(&mut conn, actor.user_id, announcement.company_id)?
        }
        _ => false,
    };

    if !policy::announcement_visible(&actor, announcement.company_id, status, follows) {
        return Err(AppError::insufficient_permissions());
    }

    Ok(Json(AnnouncementResponse::from(announcement)))
}

pub async fn metadata_schemas(
    user: AuthenticatedUser,
) -> AppResult<Json<BTreeMap<&'static str, MetadataSchema>>> {
    if !policy::can_author_announcements(&user.actor()) {
        return Err(AppError::insufficient_permissions());
    }

    let schemas = AnnouncementKind::ALL
        .iter()
        .map(|kind| (kind.as_str(), schema_for(*kind)))
        .collect();
    Ok(Json(schemas))
}

pub async fn create_maintenance(
    state: State<AppState>,
    user: AuthenticatedUser,
    client: ClientInfo,
    payload: Json<CreateAnnouncementRequest>,
) -> AppResult<(StatusCode, Json<AnnouncementResponse>)> {
    create_typed(AnnouncementKind::Maintenance, state, user, client, payload).await
}

pub async fn create_incident(
    state: State<AppState>,
    user: AuthenticatedUser,
    client: ClientInfo,
    payload: Json<CreateAnnouncementRequest>,
) -> AppResult<(StatusCode, Json<AnnouncementResponse>)> {
    create_typed(AnnouncementKind::Incident, state, user, client, payload).await
}

pub async fn create_news(
    state: State<AppState>,
    user: AuthenticatedUser,
    client: ClientInfo,
    payload: Json<CreateAnnouncementRequest>,
) -> AppResult<(StatusCode, Json<AnnouncementResponse>)> {
    create_typed(AnnouncementKind::News, state, user, client, payload).await
}

pub async fn create_alert(
    state: State<AppState>,
    user: AuthenticatedUser,
    client: ClientInfo,
    payload: Json<CreateAnnouncementRequest>,
) -> AppResult<(StatusCode, Json<AnnouncementResponse>)> {
    create_typed(AnnouncementKind::Alert, state, user, client, payload).await
}

async fn create_typed(
    kind: AnnouncementKind,
    State(state): State<AppState>,
    user: AuthenticatedUser,
    client: ClientInfo,
    Json(payload): Json<CreateAnnouncementRequest>,
) -> AppResult<(StatusCode, Json<AnnouncementResponse>)> {
    let actor = user.actor();
    if !policy::can_author_announcements(&actor) {
        return Err(AppError::insufficient_permissions());
    }

    let company_id = match actor.role {
        policy::Role::CompanyAdmin => actor
            .company_id
            .ok_or_else(AppError::insufficient_permissions)?,
        policy::Role::PlatformAdmin => payload
            .company_id
            .ok_or_else(|| AppError::validation("company_id", "company_id is required"))?,
        _ => return Err(AppError::insufficient_permissions()),
    };

    let title = payload.title.trim().to_string();
    if title.is_empty() {
        return Err(AppError::validation("title", "title must not be empty"));
    }

    let metadata =
        AnnouncementMetadata::parse(kind, &payload.metadata).map_err(metadata_error)?;

    let now = Utc::now();
    let (status, published_at, scheduled_for) = match payload.action.as_deref() {
        None | Some("draft") => (PublicationStatus::Draft, None, None),
        Some("publish") => (PublicationStatus::Published, Some(now), None),
        Some("schedule") => {
            let scheduled_for = payload.scheduled_for.ok_or_else(|| {
                AppError::validation("scheduled_for", "scheduled_for is required when scheduling")
            })?;
            if scheduled_for <= now {
                return Err(AppError::validation(
                    "scheduled_for",
                    "scheduled_for must be in the future",
                ));
            }
            (PublicationStatus::Scheduled, None, Some(scheduled_for))
        }
        Some(other) => {
            return Err(AppError::validation(
                "action",
                format!("unknown action '{other}'"),
            ))
        }
    };

    let new_announcement = NewAnnouncement {
        id: Uuid::new_v4(),
        company_id,
        author_id: actor.user_id,
        kind: kind.as_str().to_string(),
        title,
        content: payload.content,
        status: status.as_str().to_string(),
        metadata: metadata.to_value(),
        published_at,
        scheduled_for,
    };

    let mut conn = state.db()?;
    diesel::insert_into(announcements::table)
        .values(&new_announcement)
        .execute(&mut conn)?;

    if status == PublicationStatus::Scheduled {
        enqueue_job(
            &mut conn,
            JOB_PUBLISH_ANNOUNCEMENT,
            serde_json::json!({ "announcement_id": new_announcement.id }),
            scheduled_for,
        )
        .map_err(|err| AppError::internal(format!("failed to enqueue publish job: {err}")))?;
    }

    let announcement = find_announcement(&mut conn, new_announcement.id)?;

    info!(
        announcement_id = %announcement.id,
        kind = %announcement.kind,
        status = %announcement.status,
        "announcement created"
    );
    state.activity.record(
        ActivityEntry::new("announcement_created", "announcement")
            .user(actor.user_id)
            .entity(announcement.id)
            .new_values(serde_json::json!({
                "title": announcement.title,
                "status": announcement.status,
            }))
            .request_meta(client.ip_address, client.user_agent),
    );

    Ok((StatusCode::CREATED, Json(AnnouncementResponse::from(announcement))))
}

pub async fn update_announcement(
    State(state): State<AppState>,
    Path(announcement_id): Path<Uuid>,
    user: AuthenticatedUser,
    client: ClientInfo,
    Json(payload): Json<UpdateAnnouncementRequest>,
) -> AppResult<Json<AnnouncementResponse>> {
    let actor = user.actor();
    let mut conn = state.db()?;

    let announcement = find_announcement(&mut conn, announcement_id)?;
    ensure_can_manage(&actor, &announcement)?;

    let status = parse_status(&announcement.status)?;
    if !status.editable() {
        let message = match status {
            PublicationStatus::Published => "Cannot edit published announcement",
            _ => "Cannot edit archived announcement",
        };
        return Err(AppError::forbidden(message));
    }

    let kind = parse_kind(&announcement.kind)?;
    let new_metadata = match payload.metadata.as_ref() {
        Some(patch) => {
            let existing = AnnouncementMetadata::parse(kind, &announcement.metadata)
                .map_err(metadata_error)?;
            Some(existing.merge_update(patch).map_err(metadata_error)?)
        }
        None => None,
    };

    let new_title = match payload.title.as_deref().map(str::trim) {
        Some("") => {
            return Err(AppError::validation("title", "title must not be empty"));
        }
        Some(title) => Some(title.to_string()),
        None => None,
    };

    let old_title = announcement.title.clone();
    let now = Utc::now();

    conn.transaction::<(), AppError, _>(|conn| {
        if let Some(title) = new_title.as_ref() {
            diesel::update(announcements::table.find(announcement_id))
                .set(announcements::title.eq(title))
                .execute(conn)?;
        }
        if let Some(content) = payload.content.as_ref() {
            diesel::update(announcements::table.find(announcement_id))
                .set(announcements::content.eq(content))
                .execute(conn)?;
        }
        if let Some(metadata) = new_metadata.as_ref() {
            diesel::update(announcements::table.find(announcement_id))
                .set(announcements::metadata.eq(metadata.to_value()))
                .execute(conn)?;
        }
        diesel::update(announcements::table.find(announcement_id))
            .set(announcements::updated_at.eq(now))
            .execute(conn)?;
        Ok(())
    })?;

    let updated = find_announcement(&mut conn, announcement_id)?;

    state.activity.record(
        ActivityEntry::new("announcement_updated", "announcement")
            .user(actor.user_id)
            .entity(announcement_id)
            .old_values(serde_json::json!({ "title": old_title }))
            .new_values(serde_json::json!({ "title": updated.title }))
            .request_meta(client.ip_address, client.user_agent),
    );

    Ok(Json(AnnouncementResponse::from(updated)))
}

pub async fn delete_announcement(
    State(state): State<AppState>,
    Path(announcement_id): Path<Uuid>,
    user: AuthenticatedUser,
    client: ClientInfo,
) -> AppResult<impl IntoResponse> {
    let actor = user.actor();
    let mut conn = state.db()?;

    let announcement = find_announcement(&mut conn, announcement_id)?;
    ensure_can_manage(&actor, &announcement)?;

    match parse_status(&announcement.status)? {
        PublicationStatus::Published => {
            return Err(AppError::conflict("Cannot delete published announcement"))
        }
        PublicationStatus::Scheduled => {
            return Err(AppError::conflict("Cannot delete scheduled announcement"))
        }
        PublicationStatus::Draft | PublicationStatus::Archived => {}
    }

    diesel::delete(announcements::table.find(announcement_id)).execute(&mut conn)?;

    state.activity.record(
        ActivityEntry::new("announcement_deleted", "announcement")
            .user(actor.user_id)
            .entity(announcement_id)
            .old_values(serde_json::json!({ "title": announcement.title }))
            .request_meta(client.ip_address, client.user_agent),
    );

    Ok(StatusCode::NO_CONTENT)
}

pub async fn publish_announcement(
    State(state): State<AppState>,
    Path(announcement_id): Path<Uuid>,
    user: AuthenticatedUser,
    client: ClientInfo,
) -> AppResult<Json<AnnouncementResponse>> {
    let actor = user.actor();
    let mut conn = state.db()?;

    let announcement = find_announcement(&mut conn, announcement_id)?;
    ensure_can_manage(&actor, &announcement)?;

    let status = parse_status(&announcement.status)?;
    let was_scheduled = match status {
        PublicationStatus::Draft => false,
        PublicationStatus::Scheduled => true,
        PublicationStatus::Published => {
            return Err(AppError::conflict("Announcement is already published"))
        }
        PublicationStatus::Archived => {
            return Err(AppError::conflict("Cannot publish archived announcement"))
        }
    };

    let now = Utc::now();
    diesel::update(announcements::table.find(announcement_id))
        .set((
            announcements::status.eq(PublicationStatus::Published.as_str()),
            announcements::published_at.eq(Some(now)),
            announcements::scheduled_for.eq(None::<DateTime<Utc>>),
            announcements::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    if was_scheduled {
        cancel_publish_jobs(&mut conn, announcement_id)
            .map_err(|err| AppError::internal(format!("failed to cancel publish job: {err}")))?;
    }

    let updated = find_announcement(&mut conn, announcement_id)?;
    state.activity.record(
        ActivityEntry::new("announcement_published", "announcement")
            .user(actor.user_id)
            .entity(announcement_id)
            .request_meta(client.ip_address, client.user_agent),
    );

    Ok(Json(AnnouncementResponse::from(updated)))
}

pub async fn schedule_announcement(
    State(state): State<AppState>,
    Path(announcement_id): Path<Uuid>,
    user: AuthenticatedUser,
    client: ClientInfo,
    Json(payload): Json<ScheduleRequest>,
) -> AppResult<Json<AnnouncementResponse>> {
    let actor = user.actor();
    let mut conn = state.db()?;

    let announcement = find_announcement(&mut conn, announcement_id)?;
    ensure_can_manage(&actor, &announcement)?;

    if parse_status(&announcement.status)? != PublicationStatus::Draft {
        return Err(AppError::conflict(
            "Only draft announcements can be scheduled",
        ));
    }

    let now = Utc::now();
    if payload.scheduled_for <= now {
        return Err(AppError::validation(
            "scheduled_for",
            "scheduled_for must be in the future",
        ));
    }

    diesel::update(announcements::table.find(announcement_id))
        .set((
            announcements::status.eq(PublicationStatus::Scheduled.as_str()),
            announcements::scheduled_for.eq(Some(payload.scheduled_for)),
            announcements::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    enqueue_job(
        &mut conn,
        JOB_PUBLISH_ANNOUNCEMENT,
        serde_json::json!({ "announcement_id": announcement_id }),
        Some(payload.scheduled_for),
    )
    .map_err(|err| AppError::internal(format!("failed to enqueue publish job: {err}")))?;

    let updated = find_announcement(&mut conn, announcement_id)?;
    state.activity.record(
        ActivityEntry::new("announcement_scheduled", "announcement")
            .user(actor.user_id)
            .entity(announcement_id)
            .new_values(serde_json::json!({ "scheduled_for": payload.scheduled_for }))
            .request_meta(client.ip_address, client.user_agent),
    );

    Ok(Json(AnnouncementResponse::from(updated)))
}

pub async fn unschedule_announcement(
    State(state): State<AppState>,
    Path(announcement_id): Path<Uuid>,
    user: AuthenticatedUser,
    client: ClientInfo,
) -> AppResult<Json<AnnouncementResponse>> {
    let actor = user.actor();
    let mut conn = state.db()?;

    let announcement = find_announcement(&mut conn, announcement_id)?;
    ensure_can_manage(&actor, &announcement)?;

    if parse_status(&announcement.status)? != PublicationStatus::Scheduled {
        return Err(AppError::conflict("Announcement is not scheduled"));
    }

    diesel::update(announcements::table.find(announcement_id))
        .set((
            announcements::status.eq(PublicationStatus::Draft.as_str()),
            announcements::scheduled_for.eq(None::<DateTime<Utc>>),
            announcements::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

    cancel_publish_jobs(&mut conn, announcement_id)
        .map_err(|err| AppError::internal(format!("failed to cancel publish job: {err}")))?;

    let updated = find_announcement(&mut conn, announcement_id)?;
    state.activity.record(
        ActivityEntry::new("announcement_unscheduled", "announcement")
            .user(actor.user_id)
            .entity(announcement_id)
            .request_meta(client.ip_address, client.user_agent),
    );

    Ok(Json(AnnouncementResponse::from(updated)))
}

pub async fn archive_announcement(
    State(state): State<AppState>,
    Path(announcement_id): Path<Uuid>,
    user: AuthenticatedUser,
    client: ClientInfo,
) -> AppResult<Json<AnnouncementResponse>> {
    let actor = user.actor();
    let mut conn = state.db()?;

    let announcement = find_announcement(&mut conn, announcement_id)?;
    ensure_can_manage(&actor, &announcement)?;

    if parse_status(&announcement.status)? != PublicationStatus::Published {
        return Err(AppError::conflict(
            "Only published announcements can be archived",
        ));
    }

    diesel::update(announcements::table.find(announcement_id))
        .set((
            announcements::status.eq(PublicationStatus::Archived.as_str()),
            announcements::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

    let updated = find_announcement(&mut conn, announcement_id)?;
    state.activity.record(
        ActivityEntry::new("announcement_archived", "announcement")
            .user(actor.user_id)
            .entity(announcement_id)
            .request_meta(client.ip_address, client.user_agent),
    );

    Ok(Json(AnnouncementResponse::from(updated)))
}

pub async fn restore_announcement(
    State(state): State<AppState>,
    Path(announcement_id): Path<Uuid>,
    user: AuthenticatedUser,
    client: ClientInfo,
) -> AppResult<Json<AnnouncementResponse>> {
    let actor = user.actor();
    let mut conn = state.db()?;

    let announcement = find_announcement(&mut conn, announcement_id)?;
    ensure_can_manage(&actor, &announcement)?;

    if parse_status(&announcement.status)? != PublicationStatus::Archived {
        return Err(AppError::conflict(
            "Only archived announcements can be restored",
        ));
    }

    diesel::update(announcements::table.find(announcement_id))
        .set((
            announcements::status.eq(PublicationStatus::Draft.as_str()),
            announcements::published_at.eq(None::<DateTime<Utc>>),
            announcements::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

    let updated = find_announcement(&mut conn, announcement_id)?;
    state.activity.record(
        ActivityEntry::new("announcement_restored", "announcement")
            .user(actor.user_id)
            .entity(announcement_id)
            .request_meta(client.ip_address, client.user_agent),
    );

    Ok(Json(AnnouncementResponse::from(updated)))
}

pub async fn resolve_incident(
    State(state): State<AppState>,
    Path(announcement_id): Path<Uuid>,
    user: AuthenticatedUser,
    client: ClientInfo,
    Json(payload): Json<ResolveIncidentRequest>,
) -> AppResult<Json<AnnouncementResponse>> {
    let actor = user.actor();

    if payload.resolution_content.trim().is_empty() {
        return Err(AppError::validation(
            "resolution_content",
            "resolution_content is required",
        ));
    }

    let mut conn = state.db()?;

    // The read and the write share one transaction so two concurrent resolve
    // calls cannot both observe an unresolved incident on this connection's
    // snapshot.
    let updated = conn.transaction::<Announcement, AppError, _>(|conn| {
        let announcement: Announcement = announcements::table
            .find(announcement_id)
            .for_update()
            .first(conn)
            .map_err(AppError::from)?;
        ensure_can_manage(&actor, &announcement)?;

        if parse_kind(&announcement.kind)? != AnnouncementKind::Incident {
            return Err(AppError::conflict("Announcement is not an incident"));
        }

        let existing =
            AnnouncementMetadata::parse(AnnouncementKind::Incident, &announcement.metadata)
                .map_err(metadata_error)?;
        let mut incident = match existing {
            AnnouncementMetadata::Incident(incident) => incident,
            _ => return Err(AppError::internal("incident metadata mismatch")),
        };

        if incident.is_resolved {
            return Err(AppError::conflict("Incident is already resolved"));
        }

        let now = Utc::now();
        incident.is_resolved = true;
        incident.resolved_at = Some(payload.resolved_at.unwrap_or(now));
        incident.resolution_content = Some(payload.resolution_content.trim().to_string());
        if let Some(ended_at) = payload.ended_at {
            incident.ended_at = Some(ended_at);
        }

        // Re-validate through the boundary parser so ended_at ordering and
        // the resolved-field requirements hold.
        let resolved = AnnouncementMetadata::parse(
            AnnouncementKind::Incident,
            &AnnouncementMetadata::Incident(incident).to_value(),
        )
        .map_err(metadata_error)?;

        if let Some(title) = payload.title.as_deref().map(str::trim) {
            if title.is_empty() {
                return Err(AppError::validation("title", "title must not be empty"));
            }
            diesel::update(announcements::table.find(announcement_id))
                .set(announcements::title.eq(title))
                .execute(conn)?;
        }

        diesel::update(announcements::table.find(announcement_id))
            .set((
                announcements::metadata.eq(resolved.to_value()),
                announcements::updated_at.eq(now),
            ))
            .execute(conn)?;

        announcements::table
            .find(announcement_id)
            .first(conn)
            .map_err(AppError::from)
    })?;

    info!(announcement_id = %announcement_id, "incident resolved");
    state.activity.record(
        ActivityEntry::new("announcement_resolved", "announcement")
            .user(actor.user_id)
            .entity(announcement_id)
            .request_meta(client.ip_address, client.user_agent),
    );

    Ok(Json(AnnouncementResponse::from(updated)))
}
