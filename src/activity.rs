use std::sync::Mutex;

use diesel::prelude::*;
use serde_json::Value;
use tracing::{debug, error};
use uuid::Uuid;

use crate::db::PgPool;
use crate::models::NewActivityLog;
use crate::schema::activity_logs;

/// Buffer size at which a flush is forced even in asynchronous mode.
const FLUSH_CAPACITY: usize = 64;

/// One audit event: who did what to which entity, with before/after
/// snapshots and request metadata.
#[derive(Debug, Clone)]
pub struct ActivityEntry {
    pub user_id: Option<Uuid>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
    pub metadata: Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ActivityEntry {
    pub fn new(action: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            user_id: None,
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id: None,
            old_values: None,
            new_values: None,
            metadata: Value::Object(Default::default()),
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn entity(mut self, entity_id: Uuid) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    pub fn old_values(mut self, values: Value) -> Self {
        self.old_values = Some(values);
        self
    }

    pub fn new_values(mut self, values: Value) -> Self {
        self.new_values = Some(values);
        self
    }

    pub fn request_meta(mut self, ip: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip;
        self.user_agent = user_agent;
        self
    }
}

/// Append-only audit writer. Entries accumulate in an in-memory buffer and
/// are batch-inserted on flush. Synchronous mode (tests) flushes on every
/// record; otherwise a periodic task and the capacity threshold drive
/// flushing. Recording never fails the surrounding request: flush errors
/// are logged and the entries are retained for the next flush.
pub struct ActivityRecorder {
    pool: PgPool,
    buffer: Mutex<Vec<NewActivityLog>>,
    synchronous: bool,
}

impl ActivityRecorder {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            buffer: Mutex::new(Vec::new()),
            synchronous: false,
        }
    }

    pub fn synchronous(pool: PgPool) -> Self {
        Self {
            pool,
            buffer: Mutex::new(Vec::new()),
            synchronous: true,
        }
    }

    pub fn record(&self, entry: ActivityEntry) {
        let row = NewActivityLog {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            action: entry.action,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            old_values: entry.old_values,
            new_values: entry.new_values,
            metadata: entry.metadata,
            ip_address: entry.ip_address,
            user_agent: entry.user_agent,
        };

        let should_flush = {
            let mut buffer = match self.buffer.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            buffer.push(row);
            self.synchronous || buffer.len() >= FLUSH_CAPACITY
        };

        if should_flush {
            if let Err(err) = self.flush() {
                error!(error = %err, "failed to flush activity log buffer");
            }
        }
    }

    /// Drain the buffer into the database in one batch insert. Returns how
    /// many rows were written. On failure the drained entries are put back.
    pub fn flush(&self) -> anyhow::Result<usize> {
        let rows: Vec<NewActivityLog> = {
            let mut buffer = match self.buffer.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            std::mem::take(&mut *buffer)
        };

        if rows.is_empty() {
            return Ok(0);
        }

        let count = rows.len();
        let mut conn = self.pool.get()?;
        match diesel::insert_into(activity_logs::table)
            .values(&rows)
            .execute(&mut conn)
        {
            Ok(written) => {
                debug!(written, "flushed activity log buffer");
                Ok(written)
            }
            Err(err) => {
                let mut buffer = match self.buffer.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                let mut restored = rows;
                restored.extend(buffer.drain(..));
                *buffer = restored;
                Err(anyhow::anyhow!("activity log insert failed ({count} rows): {err}"))
            }
        }
    }

    pub fn pending(&self) -> usize {
        match self.buffer.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

pub const CATEGORIES: &[&str] = &["authentication", "tickets", "users", "companies", "content"];

/// Static action→category mapping used by the query endpoint. Exact names
/// and prefix patterns are expressed as SQL LIKE patterns.
pub fn category_patterns(category: &str) -> Option<&'static [&'static str]> {
    match category {
        "authentication" => Some(&["login", "logout", "register", "token_refreshed"]),
        "tickets" => Some(&["ticket\\_%"]),
        "users" => Some(&["user\\_%", "role\\_%"]),
        "companies" => Some(&["company\\_%"]),
        "content" => Some(&["announcement\\_%"]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::category_patterns;

    #[test]
    fn authentication_actions_are_exact_names() {
        let patterns = category_patterns("authentication").unwrap();
        assert!(patterns.contains(&"login"));
        assert!(patterns.contains(&"logout"));
        assert!(patterns.contains(&"register"));
    }

    #[test]
    fn entity_categories_use_prefixes() {
        assert_eq!(category_patterns("tickets"), Some(&["ticket\\_%"][..]));
        assert_eq!(
            category_patterns("users"),
            Some(&["user\\_%", "role\\_%"][..])
        );
    }

    #[test]
    fn unknown_category_is_rejected() {
        assert_eq!(category_patterns("everything"), None);
    }
}
