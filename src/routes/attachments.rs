use axum::extract::{Json, Multipart, Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use diesel::{prelude::*, PgConnection};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::activity::ActivityEntry;
use crate::auth::{AuthenticatedUser, ClientInfo};
use crate::error::{AppError, AppResult};
use crate::models::{NewTicketAttachment, Ticket, TicketAttachment, TicketResponse};
use crate::policy::{self, Actor};
use crate::schema::{ticket_attachments, ticket_responses};
use crate::state::AppState;

use super::tickets::{ensure_ticket_visible, find_ticket_by_code, STATUS_CLOSED};

pub const MAX_ATTACHMENT_SIZE_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_ATTACHMENTS_PER_TICKET: i64 = 5;

pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "pdf", "jpg", "jpeg", "png", "gif", "doc", "docx", "xls", "xlsx", "txt", "zip",
];

#[derive(Serialize)]
pub struct AttachmentResponse {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub response_id: Option<Uuid>,
    pub uploaded_by_user_id: Uuid,
    pub file_name: String,
    pub file_url: String,
    pub file_type: String,
    pub file_size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

impl From<TicketAttachment> for AttachmentResponse {
    fn from(attachment: TicketAttachment) -> Self {
        Self {
            id: attachment.id,
            ticket_id: attachment.ticket_id,
            response_id: attachment.response_id,
            uploaded_by_user_id: attachment.uploaded_by_user_id,
            file_name: attachment.file_name,
            file_url: attachment.storage_key,
            file_type: attachment.file_type,
            file_size_bytes: attachment.file_size_bytes,
            created_at: attachment.created_at,
        }
    }
}

fn can_attach(actor: &Actor, ticket: &Ticket) -> bool {
    actor.user_id == ticket.created_by_user_id || policy::can_work_ticket(actor, ticket.company_id)
}

fn file_extension(file_name: &str) -> Option<String> {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty())
}

fn attachment_count(conn: &mut PgConnection, ticket_id: Uuid) -> AppResult<i64> {
    ticket_attachments::table
        .filter(ticket_attachments::ticket_id.eq(ticket_id))
        .count()
        .get_result(conn)
        .map_err(AppError::from)
}

fn attachment_content_disposition(file_name: &str) -> Option<HeaderValue> {
    if file_name.is_empty() {
        return None;
    }

    let sanitized: String = file_name
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            _ => ch,
        })
        .collect();

    let encoded =
        percent_encoding::utf8_percent_encode(&sanitized, percent_encoding::NON_ALPHANUMERIC);
    HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        sanitized, encoded
    ))
    .ok()
}

pub async fn upload_attachment(
    State(state): State<AppState>,
    Path(code): Path<String>,
    user: AuthenticatedUser,
    client: ClientInfo,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<AttachmentResponse>)> {
    let actor = user.actor();
    let mut conn = state.db()?;

    let ticket = find_ticket_by_code(&mut conn, &code)?;
    if !can_attach(&actor, &ticket) {
        return Err(AppError::insufficient_permissions());
    }
    if ticket.status == STATUS_CLOSED {
        return Err(AppError::forbidden(
            "Cannot upload attachments to a closed ticket.",
        ));
    }

    let mut file_bytes: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut response_id: Option<Uuid> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("file") => {
                file_name = field.file_name().map(|n| n.to_string());
                content_type = field.content_type().map(|mime| mime.to_string());
                let data = field.bytes().await.map_err(|err| {
                    error!(error = %err, "failed to read file bytes");
                    AppError::bad_request(format!("failed to read file bytes: {err}"))
                })?;
                file_bytes = Some(data.to_vec());
            }
            Some("response_id") => {
                let value = field.text().await.map_err(|err| {
                    AppError::bad_request(format!("invalid response id: {err}"))
                })?;
                if !value.trim().is_empty() {
                    let parsed = Uuid::parse_str(value.trim()).map_err(|_| {
                        AppError::validation("response_id", "response_id must be a valid UUID")
                    })?;
                    response_id = Some(parsed);
                }
            }
            _ => {}
        }
    }

    let file_bytes =
        file_bytes.ok_or_else(|| AppError::validation("file", "file is required"))?;
    if file_bytes.is_empty() {
        return Err(AppError::validation("file", "file must not be empty"));
    }
    let file_name =
        file_name.ok_or_else(|| AppError::validation("file", "filename is required"))?;

    let extension = file_extension(&file_name)
        .filter(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .ok_or_else(|| AppError::validation("file", "Invalid file type."))?;

    if file_bytes.len() > MAX_ATTACHMENT_SIZE_BYTES {
        return Err(AppError::payload_too_large(
            "file",
            "File size must not exceed 10 MB.",
        ));
    }

    if let Some(response_id) = response_id {
        let response: TicketResponse = ticket_responses::table
            .find(response_id)
            .first(&mut conn)
            .map_err(AppError::from)?;
        if response.ticket_id != ticket.id {
            return Err(AppError::validation(
                "response_id",
                "The selected response does not belong to this ticket.",
            ));
        }
    }

    if attachment_count(&mut conn, ticket.id)? >= MAX_ATTACHMENTS_PER_TICKET {
        return Err(AppError::validation(
            "file",
            "Maximum 5 attachments per ticket.",
        ));
    }

    let attachment_id = Uuid::new_v4();
    let storage_key = format!(
        "tickets/attachments/{}/{}/{}",
        ticket.id, attachment_id, file_name
    );
    let content_type = content_type.or_else(|| {
        mime_guess::from_ext(&extension)
            .first()
            .map(|mime| mime.to_string())
    });

    state
        .storage
        .put_object(&storage_key, file_bytes.clone(), content_type)
        .await
        .map_err(|err| {
            error!(error = %err, key = %storage_key, "failed to store attachment");
            AppError::internal(format!("failed to store attachment: {err}"))
        })?;

    // The cap is re-checked inside the transaction so the count and the
    // insert observe the same snapshot.
    let new_attachment = NewTicketAttachment {
        id: attachment_id,
        ticket_id: ticket.id,
        response_id,
        uploaded_by_user_id: actor.user_id,
        file_name: file_name.clone(),
        storage_key: storage_key.clone(),
        file_type: extension,
        file_size_bytes: file_bytes.len() as i64,
    };

    let insert_result = conn.transaction::<(), AppError, _>(|conn| {
        let count: i64 = ticket_attachments::table
            .filter(ticket_attachments::ticket_id.eq(ticket.id))
            .count()
            .get_result(conn)?;
        if count >= MAX_ATTACHMENTS_PER_TICKET {
            return Err(AppError::validation(
                "file",
                "Maximum 5 attachments per ticket.",
            ));
        }
        diesel::insert_into(ticket_attachments::table)
            .values(&new_attachment)
            .execute(conn)?;
        Ok(())
    });

    if let Err(err) = insert_result {
        if let Err(cleanup_err) = state.storage.delete_object(&storage_key).await {
            error!(error = %cleanup_err, key = %storage_key, "failed to clean up rejected attachment");
        }
        return Err(err);
    }

    let attachment: TicketAttachment = ticket_attachments::table
        .find(attachment_id)
        .first(&mut conn)?;

    info!(
        attachment_id = %attachment.id,
        ticket_code = %ticket.ticket_code,
        size_bytes = attachment.file_size_bytes,
        "attachment uploaded"
    );
    state.activity.record(
        ActivityEntry::new("ticket_attachment_uploaded", "ticket_attachment")
            .user(actor.user_id)
            .entity(attachment.id)
            .new_values(serde_json::json!({ "file_name": attachment.file_name }))
            .request_meta(client.ip_address, client.user_agent),
    );

    Ok((StatusCode::CREATED, Json(AttachmentResponse::from(attachment))))
}

pub async fn list_attachments(
    State(state): State<AppState>,
    Path(code): Path<String>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<AttachmentResponse>>> {
    let actor = user.actor();
    let mut conn = state.db()?;

    let ticket = find_ticket_by_code(&mut conn, &code)?;
    ensure_ticket_visible(&actor, &ticket)?;

    let attachments: Vec<TicketAttachment> = ticket_attachments::table
        .filter(ticket_attachments::ticket_id.eq(ticket.id))
        .order(ticket_attachments::created_at.asc())
        .load(&mut conn)?;

    Ok(Json(
        attachments
            .into_iter()
            .map(AttachmentResponse::from)
            .collect(),
    ))
}

pub async fn delete_attachment(
    State(state): State<AppState>,
    Path((code, attachment_id)): Path<(String, Uuid)>,
    user: AuthenticatedUser,
    client: ClientInfo,
) -> AppResult<impl IntoResponse> {
    let actor = user.actor();
    let mut conn = state.db()?;

    let ticket = find_ticket_by_code(&mut conn, &code)?;

    let attachment: TicketAttachment = ticket_attachments::table
        .find(attachment_id)
        .first(&mut conn)
        .map_err(AppError::from)?;
    if attachment.ticket_id != ticket.id {
        return Err(AppError::not_found());
    }

    policy::attachment_deletable(
        actor.user_id,
        attachment.uploaded_by_user_id,
        attachment.created_at,
        Utc::now(),
        ticket.status == STATUS_CLOSED,
    )
    .map_err(|denial| AppError::forbidden(denial.message()))?;

    diesel::delete(ticket_attachments::table.find(attachment_id)).execute(&mut conn)?;

    if let Err(err) = state.storage.delete_object(&attachment.storage_key).await {
        // The row is gone; a dangling object is logged rather than surfaced.
        error!(error = %err, key = %attachment.storage_key, "failed to delete attachment object");
    }

    state.activity.record(
        ActivityEntry::new("ticket_attachment_deleted", "ticket_attachment")
            .user(actor.user_id)
            .entity(attachment_id)
            .old_values(serde_json::json!({ "file_name": attachment.file_name }))
            .request_meta(client.ip_address, client.user_agent),
    );

    Ok(StatusCode::NO_CONTENT)
}

pub async fn download_attachment(
    State(state): State<AppState>,
    Path((code, attachment_id)): Path<(String, Uuid)>,
    user: AuthenticatedUser,
) -> AppResult<impl IntoResponse> {
    let actor = user.actor();
    let mut conn = state.db()?;

    let ticket = find_ticket_by_code(&mut conn, &code)?;
    ensure_ticket_visible(&actor, &ticket)?;

    let attachment: TicketAttachment = ticket_attachments::table
        .find(attachment_id)
        .first(&mut conn)
        .map_err(AppError::from)?;
    if attachment.ticket_id != ticket.id {
        return Err(AppError::not_found());
    }
    drop(conn);

    let bytes = state
        .storage
        .get_object(&attachment.storage_key)
        .await
        .map_err(|_| AppError::not_found())?;

    let mime = mime_guess::from_ext(&attachment.file_type)
        .first_or_octet_stream()
        .to_string();

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&mime) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Some(value) = attachment_content_disposition(&attachment.file_name) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    Ok((headers, bytes))
}
