use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metadata::PublicationStatus;

/// Role precedence mirrors the token issuance rule: a user holding several
/// assignments authenticates with the highest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "USER")]
    User,
    #[serde(rename = "AGENT")]
    Agent,
    #[serde(rename = "COMPANY_ADMIN")]
    CompanyAdmin,
    #[serde(rename = "PLATFORM_ADMIN")]
    PlatformAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::PlatformAdmin => "PLATFORM_ADMIN",
            Role::CompanyAdmin => "COMPANY_ADMIN",
            Role::Agent => "AGENT",
            Role::User => "USER",
        }
    }

    /// AGENT and COMPANY_ADMIN assignments are scoped to a company;
    /// PLATFORM_ADMIN and USER are not.
    pub fn requires_company(&self) -> bool {
        matches!(self, Role::CompanyAdmin | Role::Agent)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "PLATFORM_ADMIN" => Ok(Role::PlatformAdmin),
            "COMPANY_ADMIN" => Ok(Role::CompanyAdmin),
            "AGENT" => Ok(Role::Agent),
            "USER" => Ok(Role::User),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// The authenticated caller as seen by every policy decision: the active
/// role and, for company-scoped roles, the company it applies to.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
    pub company_id: Option<Uuid>,
}

impl Actor {
    pub fn is_platform_admin(&self) -> bool {
        self.role == Role::PlatformAdmin
    }

    fn administers(&self, company_id: Uuid) -> bool {
        self.role == Role::CompanyAdmin && self.company_id == Some(company_id)
    }
}

/// Read access to a single announcement.
///
/// `follows` is whether a company_followers row exists for
/// (actor, announcement company); callers resolve it before deciding.
pub fn announcement_visible(
    actor: &Actor,
    announcement_company: Uuid,
    status: PublicationStatus,
    follows: bool,
) -> bool {
    match actor.role {
        Role::PlatformAdmin => true,
        Role::CompanyAdmin => actor.company_id == Some(announcement_company),
        Role::Agent | Role::User => status == PublicationStatus::Published && follows,
    }
}

/// Write access (update/delete/state actions) to an announcement. Status is
/// deliberately not consulted: editability-by-status is a separate check
/// with its own error message.
pub fn can_manage_announcement(actor: &Actor, announcement_company: Uuid) -> bool {
    actor.is_platform_admin() || actor.administers(announcement_company)
}

/// Only admins may create announcements or inspect the metadata schemas.
pub fn can_author_announcements(actor: &Actor) -> bool {
    matches!(actor.role, Role::PlatformAdmin | Role::CompanyAdmin)
}

/// Read access to a ticket: platform admins see everything, company admins
/// and agents see their company's tickets, users see their own.
pub fn ticket_visible(actor: &Actor, ticket_company: Uuid, created_by: Uuid) -> bool {
    match actor.role {
        Role::PlatformAdmin => true,
        Role::CompanyAdmin | Role::Agent => actor.company_id == Some(ticket_company),
        Role::User => actor.user_id == created_by,
    }
}

/// Agents of the ticket's company plus its admins may work the ticket
/// (status changes, assignment); the creator keeps close/reopen rights.
pub fn can_work_ticket(actor: &Actor, ticket_company: Uuid) -> bool {
    match actor.role {
        Role::PlatformAdmin => true,
        Role::CompanyAdmin | Role::Agent => actor.company_id == Some(ticket_company),
        Role::User => false,
    }
}

pub const ATTACHMENT_DELETE_WINDOW_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentDeleteDenial {
    NotUploader,
    WindowExpired,
    TicketClosed,
}

impl AttachmentDeleteDenial {
    pub fn message(&self) -> &'static str {
        match self {
            AttachmentDeleteDenial::NotUploader => {
                "Only the uploader can delete this attachment"
            }
            AttachmentDeleteDenial::WindowExpired => {
                "Attachments can only be deleted within 30 minutes of upload"
            }
            AttachmentDeleteDenial::TicketClosed => {
                "Cannot delete attachments from a closed ticket."
            }
        }
    }
}

/// Deletion is permitted iff the caller uploaded the file, the 30-minute
/// window has not elapsed, and the parent ticket is not closed.
pub fn attachment_deletable(
    caller: Uuid,
    uploader: Uuid,
    uploaded_at: DateTime<Utc>,
    now: DateTime<Utc>,
    ticket_closed: bool,
) -> Result<(), AttachmentDeleteDenial> {
    if caller != uploader {
        return Err(AttachmentDeleteDenial::NotUploader);
    }
    if now - uploaded_at > Duration::minutes(ATTACHMENT_DELETE_WINDOW_MINUTES) {
        return Err(AttachmentDeleteDenial::WindowExpired);
    }
    if ticket_closed {
        return Err(AttachmentDeleteDenial::TicketClosed);
    }
    Ok(())
}
