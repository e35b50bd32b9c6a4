use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Datelike, Duration, Utc};
use diesel::dsl::exists;
use diesel::{prelude::*, select, PgConnection};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::activity::ActivityEntry;
use crate::auth::{AuthenticatedUser, ClientInfo};
use crate::error::{AppError, AppResult};
use crate::models::{NewTicket, NewTicketResponse, Ticket, TicketCategory, TicketResponse};
use crate::policy::{self, Actor, Role};
use crate::schema::{
    companies, company_followers, role_assignments, ticket_areas, ticket_categories,
    ticket_responses, tickets,
};
use crate::state::AppState;

use super::PageMeta;

pub const STATUS_OPEN: &str = "open";
pub const STATUS_PENDING: &str = "pending";
pub const STATUS_RESOLVED: &str = "resolved";
pub const STATUS_CLOSED: &str = "closed";

pub const PRIORITIES: &[&str] = &["low", "medium", "high"];

/// Closed and resolved tickets can be reopened for this long, measured from
/// the last update.
pub const REOPEN_WINDOW_DAYS: i64 = 30;

const MAX_PAGE_SIZE: i64 = 100;

#[derive(Deserialize)]
pub struct CreateTicketRequest {
    pub company_id: Uuid,
    pub category_id: Uuid,
    pub area_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub priority: Option<String>,
}

#[derive(Deserialize)]
pub struct TicketListQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub category_id: Option<Uuid>,
    pub search: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Deserialize)]
pub struct UpdateTicketRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub category_id: Option<Uuid>,
    // absent = keep, null = clear, value = replace
    #[serde(default, deserialize_with = "deserialize_present")]
    pub area_id: Option<Option<Uuid>>,
}

fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Serialize)]
pub struct TicketResponseBody {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl From<TicketResponse> for TicketResponseBody {
    fn from(response: TicketResponse) -> Self {
        Self {
            id: response.id,
            ticket_id: response.ticket_id,
            author_id: response.author_id,
            body: response.body,
            created_at: response.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct TicketDetail {
    pub id: Uuid,
    pub ticket_code: String,
    pub company_id: Uuid,
    pub category_id: Uuid,
    pub area_id: Option<Uuid>,
    pub created_by_user_id: Uuid,
    pub owner_agent_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub priority: String,
    pub status: String,
    pub resolved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Ticket> for TicketDetail {
    fn from(ticket: Ticket) -> Self {
        Self {
            id: ticket.id,
            ticket_code: ticket.ticket_code,
            company_id: ticket.company_id,
            category_id: ticket.category_id,
            area_id: ticket.area_id,
            created_by_user_id: ticket.created_by_user_id,
            owner_agent_id: ticket.owner_agent_id,
            title: ticket.title,
            description: ticket.description,
            priority: ticket.priority,
            status: ticket.status,
            resolved_at: ticket.resolved_at,
            closed_at: ticket.closed_at,
            created_at: ticket.created_at,
            updated_at: ticket.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct TicketListResponse {
    pub data: Vec<TicketDetail>,
    pub meta: PageMeta,
}

#[derive(Deserialize)]
pub struct CreateResponseRequest {
    pub body: String,
}

#[derive(Deserialize)]
pub struct AssignTicketRequest {
    pub agent_id: Uuid,
}

pub(crate) fn find_ticket_by_code(conn: &mut PgConnection, code: &str) -> AppResult<Ticket> {
    tickets::table
        .filter(tickets::ticket_code.eq(code))
        .first(conn)
        .map_err(AppError::from)
}

pub(crate) fn ensure_ticket_visible(actor: &Actor, ticket: &Ticket) -> AppResult<()> {
    if !policy::ticket_visible(actor, ticket.company_id, ticket.created_by_user_id) {
        return Err(AppError::insufficient_permissions());
    }
    Ok(())
}

fn can_drive_lifecycle(actor: &Actor, ticket: &Ticket) -> bool {
    actor.user_id == ticket.created_by_user_id || policy::can_work_ticket(actor, ticket.company_id)
}

fn validate_priority(raw: &str) -> AppResult<String> {
    if PRIORITIES.contains(&raw) {
        Ok(raw.to_string())
    } else {
        Err(AppError::validation(
            "priority",
            "priority must be one of low, medium, high",
        ))
    }
}

fn next_ticket_code(conn: &mut PgConnection, now: DateTime<Utc>) -> AppResult<String> {
    let prefix = format!("TKT-{}-%", now.year());
    let issued: i64 = tickets::table
        .filter(tickets::ticket_code.like(prefix))
        .count()
        .get_result(conn)?;
    Ok(format!("TKT-{}-{:05}", now.year(), issued + 1))
}

pub async fn create_ticket(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    client: ClientInfo,
    Json(payload): Json<CreateTicketRequest>,
) -> AppResult<(StatusCode, Json<TicketDetail>)> {
    let actor = user.actor();
    let mut conn = state.db()?;

    let company_exists: bool = select(exists(
        companies::table.filter(companies::id.eq(payload.company_id)),
    ))
    .get_result(&mut conn)?;
    if !company_exists {
        return Err(AppError::validation("company_id", "company does not exist"));
    }

    // Ticket creation is gated the same way announcement visibility is:
    // the creator must follow the target company.
    let follows: bool = select(exists(
        company_followers::table
            .filter(company_followers::user_id.eq(actor.user_id))
            .filter(company_followers::company_id.eq(payload.company_id)),
    ))
    .get_result(&mut conn)?;
    if !follows && !actor.is_platform_admin() {
        return Err(AppError::forbidden(
            "You must follow this company to open tickets",
        ));
    }

    let category: Option<TicketCategory> = ticket_categories::table
        .find(payload.category_id)
        .first(&mut conn)
        .optional()?;
    let category = match category {
        Some(category) if category.company_id == payload.company_id && category.is_active => {
            category
        }
        _ => {
            return Err(AppError::validation(
                "category_id",
                "category does not exist or is not active for this company",
            ))
        }
    };

    if let Some(area_id) = payload.area_id {
        let area_ok: bool = select(exists(
            ticket_areas::table
                .filter(ticket_areas::id.eq(area_id))
                .filter(ticket_areas::company_id.eq(payload.company_id)),
        ))
        .get_result(&mut conn)?;
        if !area_ok {
            return Err(AppError::validation(
                "area_id",
                "area does not exist for this company",
            ));
        }
    }

    let title = payload.title.trim().to_string();
    if title.is_empty() {
        return Err(AppError::validation("title", "title must not be empty"));
    }

    let priority = match payload.priority.as_deref() {
        None => "medium".to_string(),
        Some(raw) => validate_priority(raw)?,
    };

    let now = Utc::now();
    let ticket = conn.transaction::<Ticket, AppError, _>(|conn| {
        let ticket_code = next_ticket_code(conn, now)?;
        let new_ticket = NewTicket {
            id: Uuid::new_v4(),
            ticket_code,
            company_id: payload.company_id,
            category_id: category.id,
            area_id: payload.area_id,
            created_by_user_id: actor.user_id,
            owner_agent_id: None,
            title,
            description: payload.description,
            priority,
            status: STATUS_OPEN.to_string(),
        };
        diesel::insert_into(tickets::table)
            .values(&new_ticket)
            .execute(conn)?;
        tickets::table
            .find(new_ticket.id)
            .first(conn)
            .map_err(AppError::from)
    })?;

    info!(ticket_code = %ticket.ticket_code, company_id = %ticket.company_id, "ticket created");
    state.activity.record(
        ActivityEntry::new("ticket_created", "ticket")
            .user(actor.user_id)
            .entity(ticket.id)
            .new_values(serde_json::json!({ "status": ticket.status, "title": ticket.title }))
            .request_meta(client.ip_address, client.user_agent),
    );

    Ok((StatusCode::CREATED, Json(TicketDetail::from(ticket))))
}

fn build_ticket_query<'a>(
    actor: &Actor,
    params: &'a TicketListQuery,
) -> tickets::BoxedQuery<'a, diesel::pg::Pg> {
    let mut query = tickets::table.into_boxed();

    match actor.role {
        Role::PlatformAdmin => {}
        Role::CompanyAdmin | Role::Agent => {
            // company-scoped roles always carry a company id in their claims
            if let Some(company) = actor.company_id {
                query = query.filter(tickets::company_id.eq(company));
            } else {
                query = query.filter(tickets::id.eq(Uuid::nil()));
            }
        }
        Role::User => {
            query = query.filter(tickets::created_by_user_id.eq(actor.user_id));
        }
    }

    if let Some(status) = params.status.as_deref() {
        query = query.filter(tickets::status.eq(status.to_string()));
    }
    if let Some(priority) = params.priority.as_deref() {
        query = query.filter(tickets::priority.eq(priority.to_string()));
    }
    if let Some(category_id) = params.category_id {
        query = query.filter(tickets::category_id.eq(category_id));
    }
    if let Some(search) = params.search.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search.replace('%', "\\%").replace('_', "\\_"));
        query = query.filter(
            tickets::title
                .ilike(pattern.clone())
                .or(tickets::description.ilike(pattern)),
        );
    }
    if let Some(after) = params.created_after {
        query = query.filter(tickets::created_at.ge(after));
    }
    if let Some(before) = params.created_before {
        query = query.filter(tickets::created_at.le(before));
    }

    query
}

pub async fn list_tickets(
    State(state): State<AppState>,
    Query(params): Query<TicketListQuery>,
    user: AuthenticatedUser,
) -> AppResult<Json<TicketListResponse>> {
    let actor = user.actor();
    let mut conn = state.db()?;

    if let Some(status) = params.status.as_deref() {
        if ![STATUS_OPEN, STATUS_PENDING, STATUS_RESOLVED, STATUS_CLOSED].contains(&status) {
            return Err(AppError::validation("status", "invalid status filter"));
        }
    }
    if let Some(priority) = params.priority.as_deref() {
        if !PRIORITIES.contains(&priority) {
            return Err(AppError::validation("priority", "invalid priority filter"));
        }
    }

    let per_page = params
        .per_page
        .unwrap_or(state.config.default_page_size)
        .clamp(1, MAX_PAGE_SIZE);
    let page = params.page.unwrap_or(1).max(1);

    let total: i64 = build_ticket_query(&actor, &params)
        .count()
        .get_result(&mut conn)?;

    let rows: Vec<Ticket> = build_ticket_query(&actor, &params)
        .order(tickets::created_at.desc())
        .limit(per_page)
        .offset((page - 1) * per_page)
        .load(&mut conn)?;

    Ok(Json(TicketListResponse {
        data: rows.into_iter().map(TicketDetail::from).collect(),
        meta: PageMeta::new(page, per_page, total),
    }))
}

pub async fn get_ticket(
    State(state): State<AppState>,
    Path(code): Path<String>,
    user: AuthenticatedUser,
) -> AppResult<Json<TicketDetail>> {
    let actor = user.actor();
    let mut conn = state.db()?;

    let ticket = find_ticket_by_code(&mut conn, &code)?;
    ensure_ticket_visible(&actor, &ticket)?;

    Ok(Json(TicketDetail::from(ticket)))
}

pub async fn update_ticket(
    State(state): State<AppState>,
    Path(code): Path<String>,
    user: AuthenticatedUser,
    client: ClientInfo,
    Json(payload): Json<UpdateTicketRequest>,
) -> AppResult<Json<TicketDetail>> {
    let actor = user.actor();
    let mut conn = state.db()?;

    let ticket = find_ticket_by_code(&mut conn, &code)?;
    ensure_ticket_visible(&actor, &ticket)?;
    if !can_drive_lifecycle(&actor, &ticket) {
        return Err(AppError::insufficient_permissions());
    }

    if ticket.status == STATUS_CLOSED {
        return Err(AppError::conflict("Ticket is closed"));
    }

    let new_title = match payload.title.as_deref().map(str::trim) {
        Some("") => return Err(AppError::validation("title", "title must not be empty")),
        Some(title) => Some(title.to_string()),
        None => None,
    };
    let new_priority = match payload.priority.as_deref() {
        None => None,
        Some(raw) => Some(validate_priority(raw)?),
    };
    if let Some(category_id) = payload.category_id {
        let category_ok: bool = select(exists(
            ticket_categories::table
                .filter(ticket_categories::id.eq(category_id))
                .filter(ticket_categories::company_id.eq(ticket.company_id))
                .filter(ticket_categories::is_active.eq(true)),
        ))
        .get_result(&mut conn)?;
        if !category_ok {
            return Err(AppError::validation(
                "category_id",
                "category does not exist or is not active for this company",
            ));
        }
    }
    if let Some(Some(area_id)) = payload.area_id {
        let area_ok: bool = select(exists(
            ticket_areas::table
                .filter(ticket_areas::id.eq(area_id))
                .filter(ticket_areas::company_id.eq(ticket.company_id)),
        ))
        .get_result(&mut conn)?;
        if !area_ok {
            return Err(AppError::validation(
                "area_id",
                "area does not exist for this company",
            ));
        }
    }

    let old_title = ticket.title.clone();
    let now = Utc::now();

    conn.transaction::<(), AppError, _>(|conn| {
        if let Some(title) = new_title.as_ref() {
            diesel::update(tickets::table.find(ticket.id))
                .set(tickets::title.eq(title))
                .execute(conn)?;
        }
        if let Some(description) = payload.description.as_ref() {
            diesel::update(tickets::table.find(ticket.id))
                .set(tickets::description.eq(description))
                .execute(conn)?;
        }
        if let Some(priority) = new_priority.as_ref() {
            diesel::update(tickets::table.find(ticket.id))
                .set(tickets::priority.eq(priority))
                .execute(conn)?;
        }
        if let Some(category_id) = payload.category_id {
            diesel::update(tickets::table.find(ticket.id))
                .set(tickets::category_id.eq(category_id))
                .execute(conn)?;
        }
        if let Some(area_change) = payload.area_id {
            diesel::update(tickets::table.find(ticket.id))
                .set(tickets::area_id.eq(area_change))
                .execute(conn)?;
        }
        diesel::update(tickets::table.find(ticket.id))
            .set(tickets::updated_at.eq(now))
            .execute(conn)?;
        Ok(())
    })?;

    let updated: Ticket = tickets::table.find(ticket.id).first(&mut conn)?;
    state.activity.record(
        ActivityEntry::new("ticket_updated", "ticket")
            .user(actor.user_id)
            .entity(ticket.id)
            .old_values(serde_json::json!({ "title": old_title }))
            .new_values(serde_json::json!({ "title": updated.title }))
            .request_meta(client.ip_address, client.user_agent),
    );

    Ok(Json(TicketDetail::from(updated)))
}

pub async fn close_ticket(
    State(state): State<AppState>,
    Path(code): Path<String>,
    user: AuthenticatedUser,
    client: ClientInfo,
) -> AppResult<Json<TicketDetail>> {
    let actor = user.actor();
    let mut conn = state.db()?;

    let ticket = find_ticket_by_code(&mut conn, &code)?;
    ensure_ticket_visible(&actor, &ticket)?;
    if !can_drive_lifecycle(&actor, &ticket) {
        return Err(AppError::insufficient_permissions());
    }

    if ticket.status == STATUS_CLOSED {
        return Err(AppError::conflict("Ticket is already closed"));
    }

    let now = Utc::now();
    diesel::update(tickets::table.find(ticket.id))
        .set((
            tickets::status.eq(STATUS_CLOSED),
            tickets::closed_at.eq(Some(now)),
            tickets::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    let updated: Ticket = tickets::table.find(ticket.id).first(&mut conn)?;
    state.activity.record(
        ActivityEntry::new("ticket_closed", "ticket")
            .user(actor.user_id)
            .entity(ticket.id)
            .old_values(serde_json::json!({ "status": ticket.status }))
            .new_values(serde_json::json!({ "status": STATUS_CLOSED }))
            .request_meta(client.ip_address, client.user_agent),
    );

    Ok(Json(TicketDetail::from(updated)))
}

pub async fn reopen_ticket(
    State(state): State<AppState>,
    Path(code): Path<String>,
    user: AuthenticatedUser,
    client: ClientInfo,
) -> AppResult<Json<TicketDetail>> {
    let actor = user.actor();
    let mut conn = state.db()?;

    let ticket = find_ticket_by_code(&mut conn, &code)?;
    ensure_ticket_visible(&actor, &ticket)?;
    if !can_drive_lifecycle(&actor, &ticket) {
        return Err(AppError::insufficient_permissions());
    }

    if ticket.status != STATUS_RESOLVED && ticket.status != STATUS_CLOSED {
        return Err(AppError::conflict(
            "Only resolved or closed tickets can be reopened",
        ));
    }

    let now = Utc::now();
    if now - ticket.updated_at > Duration::days(REOPEN_WINDOW_DAYS) {
        return Err(AppError::conflict("Reopen window has expired"));
    }

    diesel::update(tickets::table.find(ticket.id))
        .set((
            tickets::status.eq(STATUS_OPEN),
            tickets::resolved_at.eq(None::<DateTime<Utc>>),
            tickets::closed_at.eq(None::<DateTime<Utc>>),
            tickets::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    let updated: Ticket = tickets::table.find(ticket.id).first(&mut conn)?;
    state.activity.record(
        ActivityEntry::new("ticket_reopened", "ticket")
            .user(actor.user_id)
            .entity(ticket.id)
            .old_values(serde_json::json!({ "status": ticket.status }))
            .new_values(serde_json::json!({ "status": STATUS_OPEN }))
            .request_meta(client.ip_address, client.user_agent),
    );

    Ok(Json(TicketDetail::from(updated)))
}

pub async fn resolve_ticket(
    State(state): State<AppState>,
    Path(code): Path<String>,
    user: AuthenticatedUser,
    client: ClientInfo,
) -> AppResult<Json<TicketDetail>> {
    let actor = user.actor();
    let mut conn = state.db()?;

    let ticket = find_ticket_by_code(&mut conn, &code)?;
    ensure_ticket_visible(&actor, &ticket)?;
    if !policy::can_work_ticket(&actor, ticket.company_id) {
        return Err(AppError::insufficient_permissions());
    }

    if ticket.status == STATUS_RESOLVED {
        return Err(AppError::conflict("Ticket is already resolved"));
    }
    if ticket.status == STATUS_CLOSED {
        return Err(AppError::conflict("Ticket is already closed"));
    }

    let now = Utc::now();
    diesel::update(tickets::table.find(ticket.id))
        .set((
            tickets::status.eq(STATUS_RESOLVED),
            tickets::resolved_at.eq(Some(now)),
            tickets::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    let updated: Ticket = tickets::table.find(ticket.id).first(&mut conn)?;
    state.activity.record(
        ActivityEntry::new("ticket_resolved", "ticket")
            .user(actor.user_id)
            .entity(ticket.id)
            .old_values(serde_json::json!({ "status": ticket.status }))
            .new_values(serde_json::json!({ "status": STATUS_RESOLVED }))
            .request_meta(client.ip_address, client.user_agent),
    );

    Ok(Json(TicketDetail::from(updated)))
}

pub async fn assign_ticket(
    State(state): State<AppState>,
    Path(code): Path<String>,
    user: AuthenticatedUser,
    client: ClientInfo,
    Json(payload): Json<AssignTicketRequest>,
) -> AppResult<Json<TicketDetail>> {
    let actor = user.actor();
    let mut conn = state.db()?;

    let ticket = find_ticket_by_code(&mut conn, &code)?;
    if !policy::can_work_ticket(&actor, ticket.company_id) {
        return Err(AppError::insufficient_permissions());
    }

    if ticket.status == STATUS_CLOSED {
        return Err(AppError::conflict("Ticket is closed"));
    }

    let is_agent: bool = select(exists(
        role_assignments::table
            .filter(role_assignments::user_id.eq(payload.agent_id))
            .filter(role_assignments::role.eq(Role::Agent.as_str()))
            .filter(role_assignments::company_id.eq(Some(ticket.company_id))),
    ))
    .get_result(&mut conn)?;
    if !is_agent {
        return Err(AppError::validation(
            "agent_id",
            "agent must hold the AGENT role in the ticket's company",
        ));
    }

    let now = Utc::now();
    let new_status = if ticket.status == STATUS_OPEN {
        STATUS_PENDING
    } else {
        ticket.status.as_str()
    };
    diesel::update(tickets::table.find(ticket.id))
        .set((
            tickets::owner_agent_id.eq(Some(payload.agent_id)),
            tickets::status.eq(new_status),
            tickets::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    let updated: Ticket = tickets::table.find(ticket.id).first(&mut conn)?;
    state.activity.record(
        ActivityEntry::new("ticket_assigned", "ticket")
            .user(actor.user_id)
            .entity(ticket.id)
            .new_values(serde_json::json!({ "owner_agent_id": payload.agent_id }))
            .request_meta(client.ip_address, client.user_agent),
    );

    Ok(Json(TicketDetail::from(updated)))
}

pub async fn create_response(
    State(state): State<AppState>,
    Path(code): Path<String>,
    user: AuthenticatedUser,
    client: ClientInfo,
    Json(payload): Json<CreateResponseRequest>,
) -> AppResult<(StatusCode, Json<TicketResponseBody>)> {
    let actor = user.actor();
    let mut conn = state.db()?;

    let ticket = find_ticket_by_code(&mut conn, &code)?;
    ensure_ticket_visible(&actor, &ticket)?;

    if ticket.status == STATUS_CLOSED {
        return Err(AppError::forbidden("Cannot respond to a closed ticket."));
    }

    let body = payload.body.trim().to_string();
    if body.is_empty() {
        return Err(AppError::validation("body", "body must not be empty"));
    }

    let new_response = NewTicketResponse {
        id: Uuid::new_v4(),
        ticket_id: ticket.id,
        author_id: actor.user_id,
        body,
    };
    diesel::insert_into(ticket_responses::table)
        .values(&new_response)
        .execute(&mut conn)?;

    // First agent engagement moves the ticket from open to pending.
    let now = Utc::now();
    let agent_engaged =
        ticket.status == STATUS_OPEN && policy::can_work_ticket(&actor, ticket.company_id);
    if agent_engaged {
        diesel::update(tickets::table.find(ticket.id))
            .set((
                tickets::status.eq(STATUS_PENDING),
                tickets::updated_at.eq(now),
            ))
            .execute(&mut conn)?;
    } else {
        diesel::update(tickets::table.find(ticket.id))
            .set(tickets::updated_at.eq(now))
            .execute(&mut conn)?;
    }

    let response: TicketResponse = ticket_responses::table
        .find(new_response.id)
        .first(&mut conn)?;

    state.activity.record(
        ActivityEntry::new("ticket_responded", "ticket")
            .user(actor.user_id)
            .entity(ticket.id)
            .request_meta(client.ip_address, client.user_agent),
    );

    Ok((StatusCode::CREATED, Json(TicketResponseBody::from(response))))
}

pub async fn list_responses(
    State(state): State<AppState>,
    Path(code): Path<String>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<TicketResponseBody>>> {
    let actor = user.actor();
    let mut conn = state.db()?;

    let ticket = find_ticket_by_code(&mut conn, &code)?;
    ensure_ticket_visible(&actor, &ticket)?;

    let responses: Vec<TicketResponse> = ticket_responses::table
        .filter(ticket_responses::ticket_id.eq(ticket.id))
        .order(ticket_responses::created_at.asc())
        .load(&mut conn)?;

    Ok(Json(
        responses.into_iter().map(TicketResponseBody::from).collect(),
    ))
}
