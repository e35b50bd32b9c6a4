use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = role_assignments)]
#[diesel(belongs_to(User))]
pub struct RoleAssignment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub company_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = role_assignments)]
pub struct NewRoleAssignment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub company_id: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = companies)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub admin_user_id: Uuid,
    pub areas_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = companies)]
pub struct NewCompany {
    pub id: Uuid,
    pub name: String,
    pub admin_user_id: Uuid,
    pub areas_enabled: bool,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Queryable, Associations)]
#[diesel(table_name = company_followers)]
#[diesel(belongs_to(User))]
#[diesel(belongs_to(Company))]
#[diesel(primary_key(user_id, company_id))]
pub struct CompanyFollower {
    pub user_id: Uuid,
    pub company_id: Uuid,
    pub followed_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = company_followers)]
pub struct NewCompanyFollower {
    pub user_id: Uuid,
    pub company_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = announcements)]
#[diesel(belongs_to(Company))]
pub struct Announcement {
    pub id: Uuid,
    pub company_id: Uuid,
    pub author_id: Uuid,
    pub kind: String,
    pub title: String,
    pub content: String,
    pub status: String,
    pub metadata: serde_json::Value,
    pub published_at: Option<DateTime<Utc>>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = announcements)]
pub struct NewAnnouncement {
    pub id: Uuid,
    pub company_id: Uuid,
    pub author_id: Uuid,
    pub kind: String,
    pub title: String,
    pub content: String,
    pub status: String,
    pub metadata: serde_json::Value,
    pub published_at: Option<DateTime<Utc>>,
    pub scheduled_for: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = ticket_categories)]
#[diesel(belongs_to(Company))]
pub struct TicketCategory {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = ticket_categories)]
pub struct NewTicketCategory {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = ticket_areas)]
#[diesel(belongs_to(Company))]
pub struct TicketArea {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = ticket_areas)]
pub struct NewTicketArea {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = tickets)]
#[diesel(belongs_to(Company))]
pub struct Ticket {
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

#[derive(Debug, Insertable)]
#[diesel(table_name = tickets)]
pub struct NewTicket {
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
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = ticket_responses)]
#[diesel(belongs_to(Ticket))]
pub struct TicketResponse {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = ticket_responses)]
pub struct NewTicketResponse {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = ticket_attachments)]
#[diesel(belongs_to(Ticket))]
pub struct TicketAttachment {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub response_id: Option<Uuid>,
    pub uploaded_by_user_id: Uuid,
    pub file_name: String,
    pub storage_key: String,
    pub file_type: String,
    pub file_size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = ticket_attachments)]
pub struct NewTicketAttachment {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub response_id: Option<Uuid>,
    pub uploaded_by_user_id: Uuid,
    pub file_name: String,
    pub storage_key: String,
    pub file_type: String,
    pub file_size_bytes: i64,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = activity_logs)]
pub struct ActivityLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub metadata: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = activity_logs)]
pub struct NewActivityLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub metadata: serde_json::Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = jobs)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub run_after: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = jobs)]
pub struct NewJob {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub run_after: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = refresh_tokens)]
#[diesel(belongs_to(User))]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = refresh_tokens)]
pub struct NewRefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
