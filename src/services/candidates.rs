//! Candidate records, their comment threads and reminder sets.
//!
//! Each mutation is one read-modify-write cycle on the candidate store.
//! Audit, mention and search updates follow the write and never fail it.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};

use super::{apply_status_change, new_id, require, timestamp};
use super::{AuditEvent, AuditLogService, MentionService};
use crate::auth::Actor;
use crate::errors::AppError;
use crate::models::{
    AuditAction, Candidate, CandidateFilter, CandidateStatus, Comment, CommentRequest, CommentType,
    CreateCandidateRequest, CreateReminderRequest, Reminder, Severity, StatusChangeRequest,
    UpdateCandidateRequest, UpdateReminderRequest,
};
use crate::search::SearchIndex;
use crate::store::{LocalCache, RecordStore, StoreError};

pub const CANDIDATES_DOCUMENT: &str = "candidates.json";

const CANDIDATE_LIST_KEY: &str = "candidates";

pub struct CandidateService {
    store: Arc<dyn RecordStore<Candidate>>,
    cache: Arc<LocalCache>,
    audit: Arc<AuditLogService>,
    mentions: Arc<MentionService>,
    search: Arc<SearchIndex>,
}

impl CandidateService {
    pub fn new(
        store: Arc<dyn RecordStore<Candidate>>,
        cache: Arc<LocalCache>,
        audit: Arc<AuditLogService>,
        mentions: Arc<MentionService>,
        search: Arc<SearchIndex>,
    ) -> Self {
        Self {
            store,
            cache,
            audit,
            mentions,
            search,
        }
    }

    /// Candidates matching `filter`.
    ///
    /// A fresh result is cached; when the stores are unreachable a cached
    /// list younger than the TTL is served instead.
    pub async fn list(&self, filter: &CandidateFilter) -> Result<Vec<Candidate>, AppError> {
        let all = match self.store.list().await {
            Ok(all) => {
                self.cache.put(CANDIDATE_LIST_KEY, &all).await;
                all
            }
            Err(e) if e.allows_fallback() => {
                match self.cache.get::<Vec<Candidate>>(CANDIDATE_LIST_KEY).await {
                    Some(cached) => {
                        tracing::warn!(
                            backend = self.store.backend(),
                            "Candidate store unavailable, serving cached list: {}",
                            e
                        );
                        cached
                    }
                    None => return Err(e.into()),
                }
            }
            Err(e) => return Err(e.into()),
        };

        Ok(all.into_iter().filter(|c| filter.matches(c)).collect())
    }

    pub async fn get(&self, id: &str) -> Result<Candidate, AppError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Candidate {} not found", id)))
    }

    pub async fn create(
        &self,
        actor: &Actor,
        request: &CreateCandidateRequest,
    ) -> Result<Candidate, AppError> {
        require("Full name", &request.full_name)?;
        if let Some(status) = &request.status {
            ensure_known_status(status)?;
        }
        if let Some(applied_at) = &request.applied_at {
            DateTime::parse_from_rfc3339(applied_at).map_err(|_| {
                AppError::Validation(format!("appliedAt {} is not an RFC 3339 time", applied_at))
            })?;
        }

        let now = timestamp(Utc::now());
        let candidate = Candidate {
            id: new_id(),
            full_name: request.full_name.trim().to_string(),
            email: request.email.trim().to_string(),
            phone: non_blank(&request.phone),
            position: non_blank(&request.position),
            location: non_blank(&request.location),
            source: non_blank(&request.source),
            status: request.status.clone().unwrap_or(CandidateStatus::Received),
            applied_at: request.applied_at.clone().unwrap_or_else(|| now.clone()),
            start_date: None,
            notes: non_blank(&request.notes),
            comments: Vec::new(),
            reminders: Vec::new(),
            last_update: now,
            updated_by: actor.username.clone(),
            extra: serde_json::Map::new(),
        };

        self.store.insert(&candidate).await?;
        self.cache.invalidate(CANDIDATE_LIST_KEY).await;
        self.reindex(&candidate).await;
        self.audit
            .log(
                actor,
                AuditEvent::new(
                    AuditAction::CandidateCreated,
                    format!("Created candidate {}", candidate.full_name),
                )
                .after(&candidate),
            )
            .await;

        tracing::info!(candidate_id = %candidate.id, "Candidate created");
        Ok(candidate)
    }

    pub async fn update(
        &self,
        actor: &Actor,
        id: &str,
        patch: &UpdateCandidateRequest,
    ) -> Result<Candidate, AppError> {
        if let Some(full_name) = &patch.full_name {
            require("Full name", full_name)?;
        }

        let (before, after) = self
            .mutate(actor, id, |c| {
                if let Some(full_name) = &patch.full_name {
                    c.full_name = full_name.trim().to_string();
                }
                if let Some(email) = &patch.email {
                    c.email = email.trim().to_string();
                }
                if patch.phone.is_some() {
                    c.phone = non_blank(&patch.phone);
                }
                if patch.position.is_some() {
                    c.position = non_blank(&patch.position);
                }
                if patch.location.is_some() {
                    c.location = non_blank(&patch.location);
                }
                if patch.source.is_some() {
                    c.source = non_blank(&patch.source);
                }
                if let Some(date) = patch.start_date {
                    c.start_date = Some(date.format("%Y-%m-%d").to_string());
                }
                if patch.notes.is_some() {
                    c.notes = non_blank(&patch.notes);
                }
                Ok(())
            })
            .await?;

        self.audit
            .log(
                actor,
                AuditEvent::new(
                    AuditAction::CandidateUpdated,
                    format!("Updated candidate {}", after.full_name),
                )
                .before(&before)
                .after(&after),
            )
            .await;

        Ok(after)
    }

    pub async fn delete(&self, actor: &Actor, id: &str) -> Result<(), AppError> {
        let before = self.get(id).await?;
        if !self.store.remove(id).await? {
            return Err(AppError::NotFound(format!("Candidate {} not found", id)));
        }

        self.cache.invalidate(CANDIDATE_LIST_KEY).await;
        if let Err(e) = self.search.remove_candidate(id).await {
            tracing::warn!(candidate_id = %id, "Failed to remove candidate from index: {}", e);
        }
        self.audit
            .log(
                actor,
                AuditEvent::new(
                    AuditAction::CandidateDeleted,
                    format!("Deleted candidate {}", before.full_name),
                )
                .before(&before)
                .severity(Severity::Warning),
            )
            .await;

        tracing::info!(candidate_id = %id, "Candidate deleted");
        Ok(())
    }

    pub async fn change_status(
        &self,
        actor: &Actor,
        id: &str,
        request: &StatusChangeRequest,
    ) -> Result<Candidate, AppError> {
        ensure_known_status(&request.status)?;
        let now = Utc::now();
        let (before, after) = self
            .mutate(actor, id, |c| {
                apply_status_change(
                    c,
                    request.status.clone(),
                    request.reason.as_deref(),
                    request.start_date,
                    actor,
                    now,
                );
                Ok(())
            })
            .await?;

        self.audit
            .log(
                actor,
                AuditEvent::new(
                    AuditAction::StatusChanged,
                    format!(
                        "Status of {} changed from {} to {}",
                        after.full_name,
                        before.status.as_str(),
                        after.status.as_str()
                    ),
                )
                .before(serde_json::json!({ "status": before.status, "startDate": before.start_date }))
                .after(serde_json::json!({ "status": after.status, "startDate": after.start_date })),
            )
            .await;

        Ok(after)
    }

    // ==================== COMMENTS ====================

    pub async fn add_comment(
        &self,
        actor: &Actor,
        id: &str,
        request: &CommentRequest,
    ) -> Result<Comment, AppError> {
        require("Comment text", &request.text)?;

        let comment = Comment {
            id: new_id(),
            text: request.text.trim().to_string(),
            author: actor.username.clone(),
            comment_type: request.comment_type.unwrap_or(CommentType::General),
            created_at: timestamp(Utc::now()),
            edited_at: None,
        };

        let (_, after) = self
            .mutate(actor, id, |c| {
                c.comments.push(comment.clone());
                Ok(())
            })
            .await?;

        if let Err(e) = self.mentions.record_for_comment(id, &comment, actor).await {
            tracing::warn!(candidate_id = %id, "Failed to record mentions: {}", e);
        }
        self.audit
            .log(
                actor,
                AuditEvent::new(
                    AuditAction::CommentAdded,
                    format!("Commented on {}", after.full_name),
                )
                .after(&comment),
            )
            .await;

        Ok(comment)
    }

    pub async fn edit_comment(
        &self,
        actor: &Actor,
        id: &str,
        comment_id: &str,
        request: &CommentRequest,
    ) -> Result<Comment, AppError> {
        require("Comment text", &request.text)?;
        let edited_at = timestamp(Utc::now());

        let (_, after) = self
            .mutate(actor, id, |c| {
                let comment = find_comment(c, comment_id)?;
                comment.text = request.text.trim().to_string();
                if let Some(comment_type) = request.comment_type {
                    comment.comment_type = comment_type;
                }
                comment.edited_at = Some(edited_at.clone());
                Ok(())
            })
            .await?;

        let comment = after
            .comments
            .iter()
            .find(|c| c.id == comment_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Comment {} not found", comment_id)))?;

        self.audit
            .log(
                actor,
                AuditEvent::new(
                    AuditAction::CandidateUpdated,
                    format!("Edited comment on {}", after.full_name),
                )
                .after(&comment),
            )
            .await;

        Ok(comment)
    }

    pub async fn delete_comment(
        &self,
        actor: &Actor,
        id: &str,
        comment_id: &str,
    ) -> Result<(), AppError> {
        let (before, after) = self
            .mutate(actor, id, |c| {
                find_comment(c, comment_id)?;
                c.comments.retain(|comment| comment.id != comment_id);
                Ok(())
            })
            .await?;

        let removed = before.comments.iter().find(|c| c.id == comment_id);
        self.audit
            .log(
                actor,
                AuditEvent::new(
                    AuditAction::CandidateUpdated,
                    format!("Deleted comment on {}", after.full_name),
                )
                .before(removed),
            )
            .await;

        Ok(())
    }

    // ==================== REMINDERS ====================

    pub async fn add_reminder(
        &self,
        actor: &Actor,
        id: &str,
        request: &CreateReminderRequest,
    ) -> Result<Reminder, AppError> {
        require("Reminder title", &request.title)?;
        validate_due_date(&request.due_date)?;

        let reminder = Reminder {
            id: new_id(),
            title: request.title.trim().to_string(),
            description: non_blank(&request.description),
            due_date: request.due_date.clone(),
            priority: request.priority.unwrap_or_default(),
            completed: false,
            created_by: actor.username.clone(),
            created_at: timestamp(Utc::now()),
            automatic: false,
        };

        let (_, after) = self
            .mutate(actor, id, |c| {
                c.reminders.push(reminder.clone());
                Ok(())
            })
            .await?;

        self.audit
            .log(
                actor,
                AuditEvent::new(
                    AuditAction::CandidateUpdated,
                    format!("Added reminder for {}", after.full_name),
                )
                .after(&reminder),
            )
            .await;

        Ok(reminder)
    }

    pub async fn update_reminder(
        &self,
        actor: &Actor,
        id: &str,
        reminder_id: &str,
        patch: &UpdateReminderRequest,
    ) -> Result<Reminder, AppError> {
        if let Some(title) = &patch.title {
            require("Reminder title", title)?;
        }
        if let Some(due_date) = &patch.due_date {
            validate_due_date(due_date)?;
        }

        let (_, after) = self
            .mutate(actor, id, |c| {
                let reminder = find_reminder(c, reminder_id)?;
                if let Some(title) = &patch.title {
                    reminder.title = title.trim().to_string();
                }
                if patch.description.is_some() {
                    reminder.description = non_blank(&patch.description);
                }
                if let Some(due_date) = &patch.due_date {
                    reminder.due_date = due_date.clone();
                }
                if let Some(priority) = patch.priority {
                    reminder.priority = priority;
                }
                if let Some(completed) = patch.completed {
                    reminder.completed = completed;
                }
                Ok(())
            })
            .await?;

        let reminder = after
            .reminders
            .iter()
            .find(|r| r.id == reminder_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Reminder {} not found", reminder_id)))?;

        self.audit
            .log(
                actor,
                AuditEvent::new(
                    AuditAction::CandidateUpdated,
                    format!("Updated reminder for {}", after.full_name),
                )
                .after(&reminder),
            )
            .await;

        Ok(reminder)
    }

    pub async fn delete_reminder(
        &self,
        actor: &Actor,
        id: &str,
        reminder_id: &str,
    ) -> Result<(), AppError> {
        let (_, after) = self
            .mutate(actor, id, |c| {
                find_reminder(c, reminder_id)?;
                c.reminders.retain(|r| r.id != reminder_id);
                Ok(())
            })
            .await?;

        self.audit
            .log(
                actor,
                AuditEvent::new(
                    AuditAction::CandidateUpdated,
                    format!("Deleted reminder for {}", after.full_name),
                ),
            )
            .await;

        Ok(())
    }

    // ==================== BULK ====================

    /// All candidates, for export. The export itself is audited.
    pub async fn export(&self, actor: &Actor) -> Result<Vec<Candidate>, AppError> {
        let candidates = self.list(&CandidateFilter::default()).await?;
        self.audit
            .log(
                actor,
                AuditEvent::new(
                    AuditAction::DataExported,
                    format!("Exported {} candidates", candidates.len()),
                )
                .severity(Severity::Warning),
            )
            .await;
        Ok(candidates)
    }

    /// Re-read the candidate list, rebuild the index and drop stale cache entries.
    pub async fn refresh(&self) -> Result<usize, AppError> {
        let candidates = self.list(&CandidateFilter::default()).await?;
        self.search.rebuild(&candidates).await?;
        let evicted = self.cache.evict_expired().await;
        tracing::debug!(
            count = candidates.len(),
            evicted,
            "Candidate list refreshed"
        );
        Ok(candidates.len())
    }

    /// Bring the index and cache in line with the stored state of one candidate.
    pub async fn reconcile(&self, id: &str) {
        self.cache.invalidate(CANDIDATE_LIST_KEY).await;
        match self.store.get(id).await {
            Ok(Some(candidate)) => self.reindex(&candidate).await,
            Ok(None) => {
                if let Err(e) = self.search.remove_candidate(id).await {
                    tracing::warn!(candidate_id = %id, "Failed to remove candidate from index: {}", e);
                }
            }
            Err(e) => tracing::warn!(candidate_id = %id, "Failed to reconcile candidate: {}", e),
        }
    }

    /// Apply `apply` to candidate `id`, stamping `lastUpdate`/`updatedBy`.
    /// Returns the record as read and as written.
    async fn mutate<F>(
        &self,
        actor: &Actor,
        id: &str,
        apply: F,
    ) -> Result<(Candidate, Candidate), AppError>
    where
        F: Fn(&mut Candidate) -> Result<(), StoreError> + Send + Sync,
    {
        let before: Mutex<Option<Candidate>> = Mutex::new(None);
        let stamp = timestamp(Utc::now());

        let mutation = |c: &mut Candidate| -> Result<(), StoreError> {
            if let Ok(mut slot) = before.lock() {
                *slot = Some(c.clone());
            }
            apply(c)?;
            c.last_update = stamp.clone();
            c.updated_by = actor.username.clone();
            Ok(())
        };

        let after = self
            .store
            .update(id, &mutation)
            .await
            .map_err(|e| match e {
                StoreError::RecordNotFound { id: missing } if missing == id => {
                    AppError::NotFound(format!("Candidate {} not found", id))
                }
                other => other.into(),
            })?;

        let before = before
            .into_inner()
            .ok()
            .flatten()
            .unwrap_or_else(|| after.clone());

        self.cache.invalidate(CANDIDATE_LIST_KEY).await;
        self.reindex(&after).await;
        Ok((before, after))
    }

    async fn reindex(&self, candidate: &Candidate) {
        if let Err(e) = self.search.index_candidate(candidate).await {
            tracing::warn!(candidate_id = %candidate.id, "Failed to index candidate: {}", e);
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn find_comment<'a>(candidate: &'a mut Candidate, comment_id: &str) -> Result<&'a mut Comment, StoreError> {
    candidate
        .comments
        .iter_mut()
        .find(|c| c.id == comment_id)
        .ok_or_else(|| StoreError::RecordNotFound {
            id: format!("comment {}", comment_id),
        })
}

fn find_reminder<'a>(
    candidate: &'a mut Candidate,
    reminder_id: &str,
) -> Result<&'a mut Reminder, StoreError> {
    candidate
        .reminders
        .iter_mut()
        .find(|r| r.id == reminder_id)
        .ok_or_else(|| StoreError::RecordNotFound {
            id: format!("reminder {}", reminder_id),
        })
}

/// Due dates are calendar dates or RFC 3339 times.
pub(crate) fn parse_due_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|d| d.date_naive()))
}

fn validate_due_date(value: &str) -> Result<(), AppError> {
    parse_due_date(value)
        .map(|_| ())
        .ok_or_else(|| AppError::Validation(format!("dueDate {} is not a date", value)))
}

/// New writes only use the known pipeline states.
fn ensure_known_status(status: &CandidateStatus) -> Result<(), AppError> {
    if status.is_recognized() {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Unknown candidate status {}",
            status.as_str()
        )))
    }
}
