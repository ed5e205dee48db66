// Retrieval engine module
// Owns the record store and vector index and routes queries between them


use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::cancellation::CancellationToken;
use crate::config::{Config, RetrievalConfig};
use crate::embeddings::EmbeddingProvider;
use crate::filter::{FilterEngine, PredicateSet};
use crate::index::{ScoredId, VectorIndex};
use crate::intent::IntentParser;
use crate::records::{Record, RecordStore, TicketPreview};
use crate::synth::ResponseSynthesizer;
use crate::{Result, TicketError};

/// Retrieval path taken for a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Filter,
    Semantic,
}

impl fmt::Display for Strategy {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filter => write!(f, "filter"),
            Self::Semantic => write!(f, "semantic"),
        }
    }
}

/// A retrieved record id. `score` is only present on the semantic path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchResult {
    pub record_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl From<ScoredId> for SearchResult {
    #[inline]
    fn from(hit: ScoredId) -> Self {
        Self {
            record_id: hit.record_id,
            score: Some(hit.score),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutcome {
    pub strategy: Strategy,
    pub predicates_used: PredicateSet,
    pub result_count: usize,
    pub results: Vec<SearchResult>,
    pub preview: Vec<TicketPreview>,
    pub summary: String,
}

/// The hybrid retrieval engine.
///
/// Built once at startup and shared behind an `Arc`; every query method takes
/// `&self`, so independent queries run concurrently without locking.
pub struct Engine {
    store: RecordStore,
    index: VectorIndex,
    filter: FilterEngine,
    parser: IntentParser,
    synthesizer: ResponseSynthesizer,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    settings: RetrievalConfig,
}

impl fmt::Debug for Engine {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("records", &self.store.len())
            .field("dimension", &self.index.dimension())
            .field("has_provider", &self.provider.is_some())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Build the engine over `store`.
    ///
    /// # Errors
    ///
    /// Fails if `settings` are out of range, if the provider's dimension
    /// differs from `dimension`, or if any record embedding cannot be indexed.
    #[instrument(skip_all, fields(records = store.len(), dimension = dimension))]
    pub fn new(
        store: RecordStore,
        dimension: usize,
        provider: Option<Arc<dyn EmbeddingProvider>>,
        settings: RetrievalConfig,
    ) -> Result<Self> {
        settings
            .validate()
            .map_err(|e| TicketError::Config(e.to_string()))?;

        if let Some(actual) = provider.as_ref().map(|p| p.dimension()) {
            if actual != dimension {
                return Err(TicketError::DimensionMismatch {
                    expected: dimension,
                    actual,
                });
            }
        }

        let index = VectorIndex::build(
            dimension,
            store.iter().map(|record| (record.id, record.embedding.as_slice())),
        )?;

        if provider.is_none() {
            warn!("No embedding provider configured; semantic queries will be unavailable");
        }
        info!("Engine ready with {} records", store.len());

        Ok(Self {
            filter: FilterEngine::new(settings.filter_limit),
            parser: IntentParser::new(),
            synthesizer: ResponseSynthesizer::new(
                settings.recent_window_days,
                settings.title_preview_chars,
            ),
            store,
            index,
            provider,
            settings,
        })
    }

    /// Load the configured dataset and build the engine.
    ///
    /// Any load failure aborts startup; no partial engine is returned.
    #[inline]
    pub fn load(config: &Config, provider: Option<Arc<dyn EmbeddingProvider>>) -> Result<Self> {
        let store = RecordStore::load(config.dataset_path())?;
        Self::new(
            store,
            config.ollama.embedding_dimension as usize,
            provider,
            config.retrieval,
        )
    }

    /// Answer a free-text query using whichever strategy its intent selects
    #[inline]
    pub async fn route(&self, query: &str) -> Result<QueryOutcome> {
        self.route_cancellable(query, &CancellationToken::new())
            .await
    }

    /// Same as [`route`](Self::route), but gives up with `Cancelled` once
    /// `token` is cancelled.
    #[instrument(skip(self, token))]
    pub async fn route_cancellable(
        &self,
        query: &str,
        token: &CancellationToken,
    ) -> Result<QueryOutcome> {
        let predicates = self.parser.parse(query);

        if !predicates.is_empty() {
            debug!("Structured intent detected: {:?}", predicates);
            let results = self.filter_results(&predicates);
            return Ok(self.package(query, Strategy::Filter, predicates, results));
        }

        debug!("No structured intent, using semantic search");
        let results = self
            .semantic_results(query, self.settings.top_k, token)
            .await?;
        Ok(self.package(query, Strategy::Semantic, predicates, results))
    }

    /// Semantic search with an explicit `top_k`, bypassing intent parsing
    #[instrument(skip(self))]
    pub async fn semantic_search(&self, query: &str, top_k: usize) -> Result<QueryOutcome> {
        if top_k == 0 {
            return Err(TicketError::InvalidTopK(top_k));
        }

        let results = self
            .semantic_results(query, top_k, &CancellationToken::new())
            .await?;
        Ok(self.package(query, Strategy::Semantic, PredicateSet::default(), results))
    }

    /// Apply caller-supplied predicates directly.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPredicate` for a date range whose start is after its end.
    #[instrument(skip(self))]
    pub fn filter(&self, predicates: PredicateSet) -> Result<QueryOutcome> {
        predicates.validate()?;

        let results = self.filter_results(&predicates);
        let label = describe_predicates(&predicates);
        Ok(self.package(&label, Strategy::Filter, predicates, results))
    }

    /// Every record in store order
    #[inline]
    pub fn records(&self) -> &[Record] {
        self.store.records()
    }

    #[inline]
    pub const fn store(&self) -> &RecordStore {
        &self.store
    }

    #[inline]
    pub const fn index(&self) -> &VectorIndex {
        &self.index
    }

    #[inline]
    pub const fn settings(&self) -> &RetrievalConfig {
        &self.settings
    }

    #[inline]
    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    fn filter_results(&self, predicates: &PredicateSet) -> Vec<SearchResult> {
        self.filter
            .apply(&self.store, predicates)
            .into_iter()
            .map(|record_id| SearchResult {
                record_id,
                score: None,
            })
            .collect()
    }

    async fn semantic_results(
        &self,
        query: &str,
        top_k: usize,
        token: &CancellationToken,
    ) -> Result<Vec<SearchResult>> {
        let provider = self.provider.as_ref().ok_or_else(|| {
            TicketError::RetrievalUnavailable("no embedding provider configured".to_string())
        })?;

        if token.is_cancelled() {
            return Err(TicketError::Cancelled);
        }

        let embedding = provider.embed(query).await.map_err(|e| {
            warn!("Embedding provider failed: {}", e);
            TicketError::RetrievalUnavailable(e.to_string())
        })?;

        // an empty index has no scan block to observe the token
        if token.is_cancelled() {
            return Err(TicketError::Cancelled);
        }

        let hits = self.index.search_cancellable(&embedding, top_k, token)?;
        Ok(hits.into_iter().map(SearchResult::from).collect())
    }

    fn package(
        &self,
        query: &str,
        strategy: Strategy,
        predicates: PredicateSet,
        results: Vec<SearchResult>,
    ) -> QueryOutcome {
        let records: Vec<&Record> = results
            .iter()
            .filter_map(|result| self.store.get(result.record_id))
            .collect();

        let summary = self.synthesizer.summarize(query, &records);
        let preview = records
            .iter()
            .take(self.settings.preview_count)
            .map(|record| record.preview())
            .collect();

        info!(
            "Query answered via {} with {} results",
            strategy,
            results.len()
        );

        QueryOutcome {
            strategy,
            predicates_used: predicates,
            result_count: results.len(),
            results,
            preview,
            summary,
        }
    }
}

/// Human-readable label for an explicit predicate query, used in its summary
fn describe_predicates(predicates: &PredicateSet) -> String {
    let mut parts = Vec::new();
    if let Some(category) = &predicates.category {
        parts.push(format!("category={}", category));
    }
    if let Some(priority) = &predicates.priority {
        parts.push(format!("priority={}", priority));
    }
    if let Some(status) = &predicates.status {
        parts.push(format!("status={}", status));
    }
    if let Some(start) = predicates.start_date {
        parts.push(format!("from={}", start.date_naive()));
    }
    if let Some(end) = predicates.end_date {
        parts.push(format!("to={}", end.date_naive()));
    }

    if parts.is_empty() {
        "all tickets".to_string()
    } else {
        parts.join(", ")
    }
}
