use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::{
    jobs::JOB_PUBLISH_ANNOUNCEMENT,
    metadata::PublicationStatus,
    models::{Announcement, Job},
    schema::announcements,
    state::AppState,
    workers::{JobExecution, JobHandler},
};

#[derive(Deserialize)]
struct PublishPayload {
    announcement_id: Uuid,
}

/// Publishes a scheduled announcement when its `scheduled_for` time comes
/// up. The announcement may have been unscheduled, edited, or published by
/// hand since the job was enqueued; anything not SCHEDULED anymore is a
/// successful no-op.
pub struct PublishAnnouncementJob;

impl PublishAnnouncementJob {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PublishAnnouncementJob {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobHandler for PublishAnnouncementJob {
    fn job_type(&self) -> &'static str {
        JOB_PUBLISH_ANNOUNCEMENT
    }

    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution {
        let payload: PublishPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid publish payload: {err}"),
                }
            }
        };

        let mut conn = match state.db() {
            Ok(conn) => conn,
            Err(err) => {
                return JobExecution::Retry {
                    delay: Duration::from_secs(10),
                    error: format!("database pool error: {err:?}"),
                }
            }
        };

        let announcement: Option<Announcement> = match announcements::table
            .find(payload.announcement_id)
            .first(&mut conn)
            .optional()
        {
            Ok(announcement) => announcement,
            Err(err) => {
                return JobExecution::Retry {
                    delay: Duration::from_secs(10),
                    error: format!("failed to load announcement: {err}"),
                }
            }
        };

        let Some(announcement) = announcement else {
            // Deleted since scheduling; nothing left to publish.
            return JobExecution::Success;
        };

        if announcement.status != PublicationStatus::Scheduled.as_str() {
            info!(
                announcement_id = %announcement.id,
                status = %announcement.status,
                "skipping publication of non-scheduled announcement"
            );
            return JobExecution::Success;
        }

        let now = Utc::now();
        let result = diesel::update(announcements::table.find(announcement.id))
            .set((
                announcements::status.eq(PublicationStatus::Published.as_str()),
                announcements::published_at.eq(Some(now)),
                announcements::scheduled_for.eq(None::<chrono::DateTime<Utc>>),
                announcements::updated_at.eq(now),
            ))
            .execute(&mut conn);

        match result {
            Ok(_) => {
                info!(announcement_id = %announcement.id, "published scheduled announcement");
                JobExecution::Success
            }
            Err(err) => JobExecution::Retry {
                delay: Duration::from_secs(30),
                error: format!("failed to publish announcement: {err}"),
            },
        }
    }
}
