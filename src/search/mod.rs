//! Tantivy-based candidate search.
//!
//! Name and position weigh most; comment text least.

use std::path::Path;
use std::sync::Arc;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{BooleanQuery, BoostQuery, Occur, Query, QueryParser};
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::models::Candidate;

const BOOST_NAME: f32 = 10.0;
const BOOST_POSITION: f32 = 6.0;
const BOOST_EMAIL: f32 = 5.0;
const BOOST_NOTES: f32 = 3.0;
const BOOST_COMMENTS: f32 = 1.5;

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub candidate_id: String,
    pub score: f32,
}

/// One page of hits plus the number of documents matching the query.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub hits: Vec<SearchHit>,
    pub total: usize,
}

struct SearchFields {
    candidate_id: Field,
    full_name: Field,
    position: Field,
    email: Field,
    notes: Field,
    comments: Field,
}

impl SearchFields {
    fn boosted(&self) -> [(Field, f32); 5] {
        [
            (self.full_name, BOOST_NAME),
            (self.position, BOOST_POSITION),
            (self.email, BOOST_EMAIL),
            (self.notes, BOOST_NOTES),
            (self.comments, BOOST_COMMENTS),
        ]
    }
}

/// Full-text index over candidates.
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    writer: Arc<RwLock<IndexWriter>>,
    fields: SearchFields,
}

impl SearchIndex {
    /// Open the on-disk index at `index_path`, creating it on first start.
    pub fn open(index_path: &Path) -> Result<Self, AppError> {
        std::fs::create_dir_all(index_path).map_err(index_error("index directory"))?;

        let mut schema_builder = Schema::builder();
        // STRING so the id is a single term usable for deletes.
        let candidate_id = schema_builder.add_text_field("candidate_id", STRING | STORED);
        let full_name = schema_builder.add_text_field("full_name", TEXT);
        let position = schema_builder.add_text_field("position", TEXT);
        let email = schema_builder.add_text_field("email", TEXT);
        let notes = schema_builder.add_text_field("notes", TEXT);
        let comments = schema_builder.add_text_field("comments", TEXT);
        let schema = schema_builder.build();

        let fields = SearchFields {
            candidate_id,
            full_name,
            position,
            email,
            notes,
            comments,
        };

        let index = Index::open_in_dir(index_path)
            .or_else(|_| Index::create_in_dir(index_path, schema.clone()))
            .map_err(index_error("open index"))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(index_error("index reader"))?;

        let writer = index
            .writer(50_000_000)
            .map_err(index_error("index writer"))?;

        Ok(Self {
            index,
            reader,
            writer: Arc::new(RwLock::new(writer)),
            fields,
        })
    }

    /// Replace the whole index with `candidates`.
    pub async fn rebuild(&self, candidates: &[Candidate]) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        writer.delete_all_documents()?;
        for candidate in candidates {
            writer.add_document(self.create_document(candidate))?;
        }
        writer.commit()?;

        self.reader.reload()?;

        tracing::debug!("Search index rebuilt with {} candidates", candidates.len());
        Ok(())
    }

    /// Index or re-index one candidate.
    pub async fn index_candidate(&self, candidate: &Candidate) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        writer.delete_term(Term::from_field_text(
            self.fields.candidate_id,
            &candidate.id,
        ));
        writer.add_document(self.create_document(candidate))?;
        writer.commit()?;

        self.reader.reload()?;
        Ok(())
    }

    pub async fn remove_candidate(&self, candidate_id: &str) -> Result<(), AppError> {
        let mut writer = self.writer.write().await;

        writer.delete_term(Term::from_field_text(self.fields.candidate_id, candidate_id));
        writer.commit()?;

        self.reader.reload()?;
        Ok(())
    }

    /// Search candidates. Hits are ordered by relevance.
    pub fn search(
        &self,
        query_str: &str,
        limit: usize,
        offset: usize,
    ) -> Result<SearchPage, AppError> {
        if query_str.trim().is_empty() {
            return Ok(SearchPage::default());
        }

        let searcher = self.reader.searcher();

        let all_fields = self.fields.boosted().map(|(field, _)| field).to_vec();
        let base_query = QueryParser::for_index(&self.index, all_fields)
            .parse_query(query_str)
            .map_err(|e| AppError::BadRequest(format!("invalid search query: {e}")))?;

        let mut subqueries: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for (field, boost) in self.fields.boosted() {
            let field_parser = QueryParser::for_index(&self.index, vec![field]);
            if let Ok(field_query) = field_parser.parse_query(query_str) {
                subqueries.push((Occur::Should, Box::new(BoostQuery::new(field_query, boost))));
            }
        }

        let query = if subqueries.is_empty() {
            base_query
        } else {
            Box::new(BooleanQuery::new(subqueries))
        };

        let (top_docs, total) = searcher
            .search(&query, &(TopDocs::with_limit((limit + offset).max(1)), Count))
            .map_err(index_error("query"))?;

        let hits = top_docs
            .into_iter()
            .skip(offset)
            .take(limit)
            .filter_map(|(score, address)| {
                let doc: TantivyDocument = searcher.doc(address).ok()?;
                let candidate_id = doc
                    .get_first(self.fields.candidate_id)?
                    .as_str()?
                    .to_string();
                Some(SearchHit {
                    candidate_id,
                    score,
                })
            })
            .collect();

        Ok(SearchPage { hits, total })
    }

    fn create_document(&self, candidate: &Candidate) -> TantivyDocument {
        let comments = candidate
            .comments
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        doc!(
            self.fields.candidate_id => candidate.id.clone(),
            self.fields.full_name => candidate.full_name.clone(),
            self.fields.position => candidate.position.clone().unwrap_or_default(),
            self.fields.email => candidate.email.clone(),
            self.fields.notes => candidate.notes.clone().unwrap_or_default(),
            self.fields.comments => comments
        )
    }
}

fn index_error<E: std::fmt::Display>(context: &'static str) -> impl Fn(E) -> AppError {
    move |e| AppError::Search(format!("{context}: {e}"))
}
