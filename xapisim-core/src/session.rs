//! Session Manager - credential check, session lifecycle and idle expiry.
//!
//! Session records live in the `session` class's store like any other
//! entity, so the generic accessors and `get_record` work on them. This
//! module owns the rules around them:
//! - a single `root` credential, replaceable through `change_password`
//! - `last_active` refreshed under the session lock on every call
//! - a background sweep that drops sessions idle past the threshold

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::api::XenApi;
use crate::class::ApiClass;
use crate::error::{ApiError, ErrorKind, Result};
use crate::schema::FieldTable;
use crate::value::{Record, Value, NULL_REF};

/// The only user the simulator knows.
pub const ROOT_USER: &str = "root";

/// Credential store and session expiry policy.
#[derive(Debug)]
pub struct SessionManager {
    root_password: RwLock<String>,
    this_host: String,
    idle_timeout: Duration,
}

impl SessionManager {
    pub fn new(root_password: &str, this_host: &str, idle_timeout: Duration) -> Self {
        Self {
            root_password: RwLock::new(root_password.to_string()),
            this_host: this_host.to_string(),
            idle_timeout,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Authenticate and create a session record; returns its reference.
    pub fn login(
        &self,
        sessions: &ApiClass,
        user_name: &str,
        password: &str,
        originator: &str,
    ) -> Result<String> {
        let authenticated = {
            let root_password = self
                .root_password
                .read()
                .map_err(|_| ApiError::internal("Lock poisoned"))?;
            user_name == ROOT_USER && password == root_password.as_str()
        };
        if !authenticated {
            info!(user = %user_name, "Login rejected");
            return Err(ApiError::authentication_failed());
        }

        let now = Utc::now();
        let mut record = sessions.fields().default_record();
        record.insert("auth_user_name".into(), Value::from(ROOT_USER));
        record.insert("is_local_superuser".into(), Value::Bool(true));
        record.insert("last_active".into(), Value::DateTime(now));
        record.insert("validation_time".into(), Value::DateTime(now));
        record.insert("originator".into(), Value::from(originator));
        record.insert("this_host".into(), Value::from(self.this_host.as_str()));

        let session_ref = sessions.insert(record)?;
        info!(session = %session_ref, originator = %originator, "Session created");
        Ok(session_ref)
    }

    /// Delete a session. A session that vanished after validation is a no-op.
    pub fn logout(&self, sessions: &ApiClass, session_ref: &str) -> Result<()> {
        match sessions.destroy(session_ref) {
            Ok(_) => {
                info!(session = %session_ref, "Session closed");
                Ok(())
            }
            Err(e) if e.kind == ErrorKind::HandleInvalid => {
                debug!(session = %session_ref, "Session already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Replace the root password. The old password is not verified.
    pub fn change_password(&self, new_password: &str) -> Result<()> {
        if new_password.is_empty() {
            return Err(ApiError::new(
                ErrorKind::ChangePasswordRejected,
                ["Authentication information cannot be recovered"],
            ));
        }
        let mut root_password = self
            .root_password
            .write()
            .map_err(|_| ApiError::internal("Lock poisoned"))?;
        *root_password = new_password.to_string();
        info!("Root password changed");
        Ok(())
    }

    /// Validate a session token and refresh its `last_active`, in one
    /// write-locked step.
    pub fn authenticate(&self, sessions: &ApiClass, token: &Value) -> Result<()> {
        let session_ref = token
            .as_str()
            .ok_or_else(|| ApiError::field_type("session_id"))?;
        let mut store = sessions.write()?;
        let record = store
            .get_mut(session_ref)
            .map_err(|_| ApiError::session_invalid(session_ref))?;
        record.insert("last_active".into(), Value::DateTime(Utc::now()));
        Ok(())
    }

    /// Drop every session idle for longer than the timeout, as seen at `now`.
    /// Returns the expired references.
    pub fn expire_idle(&self, sessions: &ApiClass, now: DateTime<Utc>) -> Result<Vec<String>> {
        let timeout = chrono::Duration::from_std(self.idle_timeout)
            .map_err(|e| ApiError::internal(e.to_string()))?;
        let mut store = sessions.write()?;
        let expired = store.retain(|_, record| !is_idle(record, now, timeout));
        Ok(expired)
    }
}

fn is_idle(record: &Record, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
    match record.get("last_active") {
        Some(Value::DateTime(last_active)) => now.signed_duration_since(*last_active) > timeout,
        _ => false,
    }
}

/// Field table of the `session` class.
pub fn session_fields() -> FieldTable {
    FieldTable::new()
        .field("auth_user_name", "")
        .field("auth_user_sid", "")
        .field("is_local_superuser", false)
        .field("last_active", Value::epoch())
        .field("originator", "")
        .field("parent", NULL_REF)
        .field("pool", false)
        .field("rbac_permissions", Value::empty_list())
        .field("subject", NULL_REF)
        .field("tasks", Value::empty_list())
        .field("this_host", NULL_REF)
        .field("this_user", NULL_REF)
        .field("validation_time", Value::epoch())
}

/// Spawn the periodic expiry sweep.
///
/// The first pass runs immediately, then once per `period`. The task runs
/// until the runtime shuts down or the handle is aborted.
pub fn spawn_expiry_sweep(api: Arc<XenApi>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(period_secs = period.as_secs(), "Starting session expiry sweep");
        let mut timer = interval(period);
        loop {
            timer.tick().await;
            match api.expire_sessions(Utc::now()) {
                Ok(expired) if !expired.is_empty() => {
                    info!(count = expired.len(), "Expired idle sessions");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Session sweep failed"),
            }
        }
    })
}
