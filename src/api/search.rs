//! Candidate search endpoint.

use std::collections::HashMap;

use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use super::{success, ApiResult};
use crate::models::{Candidate, CandidateFilter};
use crate::AppState;

/// `?q=` text plus optional paging.
#[derive(Debug, Deserialize)]
pub struct CandidateSearchParams {
    pub q: String,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchResultItem>,
    /// Matches across all pages, as of the last index refresh.
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultItem {
    pub candidate: Candidate,
    pub score: f32,
}

const DEFAULT_PAGE: usize = 20;
const MAX_PAGE: usize = 100;

/// GET /api/search - Full-text search over candidates.
pub async fn search_candidates(
    State(state): State<AppState>,
    Query(params): Query<CandidateSearchParams>,
) -> ApiResult<SearchResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_PAGE).min(MAX_PAGE);
    let offset = params.offset.unwrap_or(0);
    let page = state.search.search(&params.q, limit, offset)?;

    // Hits for candidates deleted since the last refresh are dropped.
    let mut by_id: HashMap<String, Candidate> = HashMap::new();
    if !page.hits.is_empty() {
        by_id = state
            .candidates
            .list(&CandidateFilter::default())
            .await?
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();
    }

    let results: Vec<SearchResultItem> = page
        .hits
        .into_iter()
        .filter_map(|hit| {
            by_id.remove(&hit.candidate_id).map(|candidate| SearchResultItem {
                candidate,
                score: hit.score,
            })
        })
        .collect();

    success(SearchResponse {
        results,
        total: page.total,
        limit,
        offset,
    })
}
