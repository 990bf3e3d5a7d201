//! Candidate Tracker Backend
//!
//! REST backend for the recruiting dashboard. Candidates and users live in a
//! GitHub-hosted JSON document store with a SQLite fallback; audit log and
//! mentions are documents only. Tantivy provides candidate search.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod jobs;
mod models;
mod search;
mod services;
mod store;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::{Backend, Config, LogFormat};
use db::RelationalStore;
use models::{Candidate, User};
use search::SearchIndex;
use services::{
    AuditLogService, CandidateService, MentionService, ReminderService, UserService,
    CANDIDATES_DOCUMENT, USERS_DOCUMENT,
};
use store::{
    DocumentRecordStore, DocumentStore, GitHubFileStore, InMemoryFileStore, LocalCache,
    PreferredThenFallback, Record, RecordStore,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub candidates: Arc<CandidateService>,
    pub users: Arc<UserService>,
    pub audit: Arc<AuditLogService>,
    pub mentions: Arc<MentionService>,
    pub reminders: Arc<ReminderService>,
    pub search: Arc<SearchIndex>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let (pretty, json) = match config.log_format {
        LogFormat::Pretty => (Some(fmt::layer()), None),
        LogFormat::Json => (None, Some(fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(pretty)
        .with(json)
        .init();

    tracing::info!("Starting Candidate Tracker Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Index path: {:?}", config.index_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    // Warn if PSK is not configured
    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (HR_API_PSK). Authentication is disabled!");
    }

    let documents: Arc<dyn DocumentStore> = match &config.github {
        Some(github) => {
            tracing::info!(
                owner = %github.owner,
                repo = %github.repo,
                branch = %github.branch,
                "Using GitHub document store"
            );
            Arc::new(GitHubFileStore::new(github.clone())?)
        }
        None => {
            tracing::warn!(
                "No GitHub repository configured (HR_GITHUB_OWNER/HR_GITHUB_REPO). \
                 Documents are kept in memory and lost on restart!"
            );
            Arc::new(InMemoryFileStore::new())
        }
    };

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let relational = Arc::new(RelationalStore::new(pool));

    // Initialize search index
    let search = Arc::new(SearchIndex::open(&config.index_path)?);

    let state = build_state(config.clone(), documents, Arc::clone(&relational), search);

    if let Some(password) = &config.bootstrap_admin_password {
        state.users.ensure_bootstrap_admin(password).await?;
    }

    // Build initial search index
    tracing::info!("Building search index...");
    match state.candidates.refresh().await {
        Ok(count) => tracing::info!("Search index built with {} candidates", count),
        Err(e) => tracing::warn!("Initial candidate load failed, index is empty: {}", e),
    }

    jobs::spawn_candidate_poll(Arc::clone(&state.candidates), config.poll_interval);
    jobs::spawn_reminder_check(Arc::clone(&state.reminders), config.reminder_interval);
    jobs::spawn_change_listener(relational.changes(), Arc::clone(&state.candidates));

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Wire services over the document store and the relational store.
pub fn build_state(
    config: Config,
    documents: Arc<dyn DocumentStore>,
    relational: Arc<RelationalStore>,
    search: Arc<SearchIndex>,
) -> AppState {
    let user_store = record_store::<User>(
        &config,
        Arc::new(DocumentRecordStore::new(Arc::clone(&documents), USERS_DOCUMENT)),
        relational.clone(),
    );
    let candidate_store = record_store::<Candidate>(
        &config,
        Arc::new(DocumentRecordStore::new(
            Arc::clone(&documents),
            CANDIDATES_DOCUMENT,
        )),
        relational,
    );

    let audit = Arc::new(AuditLogService::new(
        Arc::clone(&documents),
        config.audit_reader_role,
        config.audit_retention,
    ));
    let mentions = Arc::new(MentionService::new(
        Arc::clone(&documents),
        Arc::clone(&user_store),
    ));
    let users = Arc::new(UserService::new(user_store, Arc::clone(&audit)));
    let candidates = Arc::new(CandidateService::new(
        candidate_store,
        Arc::new(LocalCache::new(config.cache_ttl)),
        Arc::clone(&audit),
        Arc::clone(&mentions),
        Arc::clone(&search),
    ));
    let reminders = Arc::new(ReminderService::new(Arc::clone(&candidates)));

    AppState {
        config: Arc::new(config),
        candidates,
        users,
        audit,
        mentions,
        reminders,
        search,
    }
}

/// The preferred store for `T`, wrapped with the other one as fallback when enabled.
fn record_store<T: Record>(
    config: &Config,
    documents: Arc<dyn RecordStore<T>>,
    relational: Arc<dyn RecordStore<T>>,
) -> Arc<dyn RecordStore<T>> {
    let (preferred, fallback) = match config.primary_backend {
        Backend::GitHub => (documents, relational),
        Backend::Relational => (relational, documents),
    };

    if config.fallback_enabled {
        Arc::new(PreferredThenFallback::new(preferred, fallback))
    } else {
        preferred
    }
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone PSK for the auth layer
    let psk = state.config.api_psk.clone();

    // API routes
    let api_routes = Router::new()
        // Auth
        .route("/auth/login", post(api::login))
        // Candidates
        .route(
            "/candidates",
            get(api::list_candidates).post(api::create_candidate),
        )
        .route(
            "/candidates/{id}",
            get(api::get_candidate)
                .put(api::update_candidate)
                .delete(api::delete_candidate),
        )
        .route("/candidates/{id}/status", put(api::change_candidate_status))
        .route("/candidates/{id}/comments", post(api::add_comment))
        .route(
            "/candidates/{id}/comments/{comment_id}",
            put(api::edit_comment).delete(api::delete_comment),
        )
        .route("/candidates/{id}/reminders", post(api::add_reminder))
        .route(
            "/candidates/{id}/reminders/{reminder_id}",
            put(api::update_reminder).delete(api::delete_reminder),
        )
        // Pipeline and reminders
        .route("/pipeline", get(api::get_pipeline))
        .route("/reminders", get(api::list_reminders))
        .route("/reminders/due", get(api::list_due_reminders))
        // Users
        .route("/users", get(api::list_users).post(api::create_user))
        .route(
            "/users/{id}",
            get(api::get_user)
                .put(api::update_user)
                .delete(api::delete_user),
        )
        // Audit log
        .route("/audit-logs", get(api::list_audit_logs))
        // Mentions
        .route("/mentions", get(api::list_mentions))
        .route("/mentions/{id}/read", put(api::mark_mention_read))
        // Search and export
        .route("/search", get(api::search_candidates))
        .route("/export", get(api::export_candidates))
        // Apply PSK auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
