//! Domain services.
//!
//! Services own the read-modify-write cycles against the record stores and
//! the best-effort side effects (audit, mentions, search) around them.

mod audit;
mod candidates;
mod mentions;
mod pipeline;
mod reminders;
mod users;

pub use audit::*;
pub use candidates::*;
pub use mentions::*;
pub use pipeline::*;
pub use reminders::*;
pub use users::*;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::errors::AppError;
use crate::store::StoreError;

/// Wire timestamp: RFC 3339, UTC, millisecond precision.
pub fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Map a store error for a record of `kind`, naming it in not-found messages.
fn store_error(kind: &str, err: StoreError) -> AppError {
    match err {
        StoreError::RecordNotFound { id } => AppError::NotFound(format!("{} {} not found", kind, id)),
        other => other.into(),
    }
}

/// Reject blank required text fields.
fn require(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(())
}
