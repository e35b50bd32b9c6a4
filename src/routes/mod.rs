use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod activity;
pub mod announcements;
pub mod attachments;
pub mod auth;
pub mod companies;
pub mod health;
pub mod tickets;
pub mod users;

/// Pagination envelope shared by every list endpoint.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PageMeta {
    pub current_page: i64,
    pub last_page: i64,
    pub per_page: i64,
    pub total: i64,
}

impl PageMeta {
    pub fn new(current_page: i64, per_page: i64, total: i64) -> Self {
        let last_page = if total == 0 {
            1
        } else {
            (total + per_page - 1) / per_page
        };
        Self {
            current_page,
            last_page,
            per_page,
            total,
        }
    }
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|value| {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    trimmed.parse::<HeaderValue>().ok()
                }
            })
            .collect();

        let allow_origin = AllowOrigin::list(headers);

        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me));

    let announcements_routes = Router::new()
        .route("/", get(announcements::list_announcements))
        .route("/schemas", get(announcements::metadata_schemas))
        .route("/maintenance", post(announcements::create_maintenance))
        .route("/incidents", post(announcements::create_incident))
        .route("/news", post(announcements::create_news))
        .route("/alerts", post(announcements::create_alert))
        .route(
            "/incidents/:id/resolve",
            post(announcements::resolve_incident),
        )
        .route(
            "/:id",
            get(announcements::get_announcement)
                .put(announcements::update_announcement)
                .delete(announcements::delete_announcement),
        )
        .route("/:id/publish", post(announcements::publish_announcement))
        .route("/:id/schedule", post(announcements::schedule_announcement))
        .route(
            "/:id/unschedule",
            post(announcements::unschedule_announcement),
        )
        .route("/:id/archive", post(announcements::archive_announcement))
        .route("/:id/restore", post(announcements::restore_announcement));

    let tickets_routes = Router::new()
        .route(
            "/",
            get(tickets::list_tickets).post(tickets::create_ticket),
        )
        .route(
            "/:code",
            get(tickets::get_ticket).put(tickets::update_ticket),
        )
        .route("/:code/close", post(tickets::close_ticket))
        .route("/:code/reopen", post(tickets::reopen_ticket))
        .route("/:code/resolve", post(tickets::resolve_ticket))
        .route("/:code/assign", post(tickets::assign_ticket))
        .route(
            "/:code/responses",
            get(tickets::list_responses).post(tickets::create_response),
        )
        .route(
            "/:code/attachments",
            get(attachments::list_attachments).post(attachments::upload_attachment),
        )
        .route(
            "/:code/attachments/:id",
            delete(attachments::delete_attachment),
        )
        .route(
            "/:code/attachments/:id/download",
            get(attachments::download_attachment),
        );

    let companies_routes = Router::new()
        .route(
            "/",
            get(companies::list_companies).post(companies::create_company),
        )
        .route(
            "/:id/follow",
            post(companies::follow_company).delete(companies::unfollow_company),
        );

    let users_routes = Router::new()
        .route("/", get(users::list_users))
        .route("/:id/status", put(users::update_user_status))
        .route("/:id/roles", post(users::assign_role))
        .route("/:id/roles/:role", delete(users::remove_role));

    let activity_routes = Router::new()
        .route("/", get(activity::list_activity_logs))
        .route("/my", get(activity::my_activity_logs));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/announcements", announcements_routes)
        .nest("/api/tickets", tickets_routes)
        .nest("/api/companies", companies_routes)
        .nest("/api/users", users_routes)
        .nest("/api/activity-logs", activity_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        // leave room above the 10 MiB attachment rule so oversize uploads
        // reach our own 413 handling instead of the transport limit
        .layer(DefaultBodyLimit::max(12 * 1024 * 1024))
}
