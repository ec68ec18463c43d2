//! Local wikipedia dataset strategies (offline corpus, chunked + embedded).
//!
//! `DatasetWikipediaEnStrategy` runs a pure vector chunk search.
//! `DatasetWikipediaEnHybridStrategy` additionally runs a title-focused
//! full-text search concurrently and fuses the two score spaces per chunk.
//! Both reconstruct article text as the ordered concatenation of the
//! retrieved chunks.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use chronicle_common::SourceArticle;

use crate::embedder::TextEmbedder;

use super::strategy::{
    AcquisitionQuery, ArticleStrategy, SearchMode, STRATEGY_DATASET_WIKIPEDIA_EN,
};

/// Chunks retrieved per search leg, before article aggregation.
const CHUNK_FETCH_LIMIT: i64 = 60;

#[derive(Debug, Clone)]
struct ChunkHit {
    article_title: String,
    article_url: String,
    chunk_index: i32,
    chunk_text: String,
    score: f64,
}

// ---------------------------------------------------------------------------
// Pure vector strategy
// ---------------------------------------------------------------------------

pub struct DatasetWikipediaEnStrategy {
    pool: PgPool,
    embedder: Arc<dyn TextEmbedder>,
}

impl DatasetWikipediaEnStrategy {
    pub fn new(pool: PgPool, embedder: Arc<dyn TextEmbedder>) -> Self {
        Self { pool, embedder }
    }
}

#[async_trait]
impl ArticleStrategy for DatasetWikipediaEnStrategy {
    fn name(&self) -> &str {
        STRATEGY_DATASET_WIKIPEDIA_EN
    }

    async fn get_articles(&self, query: &AcquisitionQuery) -> Result<Vec<SourceArticle>> {
        let query_text = query.dataset_query_text();
        let embedding = self.embedder.encode(&query_text, true, true).await;
        let hits = vector_chunk_search(&self.pool, &embedding, CHUNK_FETCH_LIMIT).await?;
        Ok(aggregate_articles(hits, query.config.article_limit))
    }
}

// ---------------------------------------------------------------------------
// Hybrid strategy (vector ∥ title BM25, weighted fusion)
// ---------------------------------------------------------------------------

pub struct DatasetWikipediaEnHybridStrategy {
    pool: PgPool,
    embedder: Arc<dyn TextEmbedder>,
}

impl DatasetWikipediaEnHybridStrategy {
    pub fn new(pool: PgPool, embedder: Arc<dyn TextEmbedder>) -> Self {
        Self { pool, embedder }
    }
}

#[async_trait]
impl ArticleStrategy for DatasetWikipediaEnHybridStrategy {
    fn name(&self) -> &str {
        STRATEGY_DATASET_WIKIPEDIA_EN
    }

    async fn get_articles(&self, query: &AcquisitionQuery) -> Result<Vec<SourceArticle>> {
        debug_assert_eq!(query.config.search_mode, SearchMode::HybridTitleSearch);
        let w_vector = query.config.vector_weight;
        let w_bm25 = query.config.bm25_weight;
        if w_vector == 0.0 && w_bm25 == 0.0 {
            anyhow::bail!("hybrid search requires a non-zero weight");
        }

        let query_text = query.dataset_query_text();

        // Pure single-leg modes skip the other leg entirely.
        let (vector_hits, bm25_hits) = if w_bm25 == 0.0 {
            let embedding = self.embedder.encode(&query_text, true, true).await;
            (vector_chunk_search(&self.pool, &embedding, CHUNK_FETCH_LIMIT).await?, Vec::new())
        } else if w_vector == 0.0 {
            (Vec::new(), title_search(&self.pool, &query_text, CHUNK_FETCH_LIMIT).await?)
        } else {
            let embedding = self.embedder.encode(&query_text, true, true).await;
            let (vector_result, bm25_result) = tokio::join!(
                vector_chunk_search(&self.pool, &embedding, CHUNK_FETCH_LIMIT),
                title_search(&self.pool, &query_text, CHUNK_FETCH_LIMIT),
            );
            (vector_result?, bm25_result?)
        };

        let fused = fuse_scores(vector_hits, bm25_hits, w_vector, w_bm25);
        info!(chunks = fused.len(), "hybrid search fused");
        Ok(aggregate_articles(fused, query.config.article_limit))
    }
}

// ---------------------------------------------------------------------------
// Per-task dispatcher
// ---------------------------------------------------------------------------

/// Registered under the dataset source name; picks the semantic or hybrid
/// implementation from the task's `search_mode`, resolved once per task.
pub struct DatasetWikipediaStrategy {
    semantic: DatasetWikipediaEnStrategy,
    hybrid: DatasetWikipediaEnHybridStrategy,
}

impl DatasetWikipediaStrategy {
    pub fn new(pool: PgPool, embedder: Arc<dyn TextEmbedder>) -> Self {
        Self {
            semantic: DatasetWikipediaEnStrategy::new(pool.clone(), Arc::clone(&embedder)),
            hybrid: DatasetWikipediaEnHybridStrategy::new(pool, embedder),
        }
    }
}

#[async_trait]
impl ArticleStrategy for DatasetWikipediaStrategy {
    fn name(&self) -> &str {
        STRATEGY_DATASET_WIKIPEDIA_EN
    }

    async fn get_articles(&self, query: &AcquisitionQuery) -> Result<Vec<SourceArticle>> {
        match query.config.search_mode {
            SearchMode::Semantic => self.semantic.get_articles(query).await,
            SearchMode::HybridTitleSearch => self.hybrid.get_articles(query).await,
        }
    }
}

// ---------------------------------------------------------------------------
// Search legs
// ---------------------------------------------------------------------------

async fn vector_chunk_search(
    pool: &PgPool,
    embedding: &[f32],
    limit: i64,
) -> Result<Vec<ChunkHit>> {
    let vector = pgvector::Vector::from(embedding.to_vec());
    let rows = sqlx::query(
        r#"
        SELECT article_title, article_url, chunk_index, chunk_text,
               1 - (embedding <=> $1) AS similarity
        FROM wiki_chunks
        ORDER BY embedding <=> $1
        LIMIT $2
        "#,
    )
    .bind(vector)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("vector chunk search")?;

    rows.iter()
        .map(|row| {
            Ok(ChunkHit {
                article_title: row.try_get("article_title")?,
                article_url: row.try_get("article_url")?,
                chunk_index: row.try_get("chunk_index")?,
                chunk_text: row.try_get("chunk_text")?,
                score: row.try_get::<f64, _>("similarity")?,
            })
        })
        .collect()
}

async fn title_search(pool: &PgPool, query_text: &str, limit: i64) -> Result<Vec<ChunkHit>> {
    let rows = sqlx::query(
        r#"
        SELECT article_title, article_url, chunk_index, chunk_text,
               ts_rank_cd(to_tsvector('english', article_title),
                          plainto_tsquery('english', $1)) AS rank
        FROM wiki_chunks
        WHERE to_tsvector('english', article_title) @@ plainto_tsquery('english', $1)
        ORDER BY rank DESC
        LIMIT $2
        "#,
    )
    .bind(query_text)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("title search")?;

    rows.iter()
        .map(|row| {
            Ok(ChunkHit {
                article_title: row.try_get("article_title")?,
                article_url: row.try_get("article_url")?,
                chunk_index: row.try_get("chunk_index")?,
                chunk_text: row.try_get("chunk_text")?,
                score: row.try_get::<f32, _>("rank")? as f64,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Fusion + aggregation
// ---------------------------------------------------------------------------

/// Per chunk: score = w_v·cosine + w_b·(bm25 / max_bm25). Vector scores are
/// already in [0,1]; BM25 ranks are normalized by the leg's maximum.
fn fuse_scores(
    vector_hits: Vec<ChunkHit>,
    bm25_hits: Vec<ChunkHit>,
    w_vector: f64,
    w_bm25: f64,
) -> Vec<ChunkHit> {
    let max_bm25 = bm25_hits.iter().map(|h| h.score).fold(0.0_f64, f64::max);

    let mut fused: HashMap<(String, i32), ChunkHit> = HashMap::new();
    for hit in vector_hits {
        let key = (hit.article_title.clone(), hit.chunk_index);
        let weighted = hit.score * w_vector;
        fused
            .entry(key)
            .and_modify(|existing| existing.score += weighted)
            .or_insert_with(|| ChunkHit { score: weighted, ..hit });
    }
    for hit in bm25_hits {
        let normalized = if max_bm25 > 0.0 { hit.score / max_bm25 } else { 0.0 };
        let weighted = normalized * w_bm25;
        let key = (hit.article_title.clone(), hit.chunk_index);
        fused
            .entry(key)
            .and_modify(|existing| existing.score += weighted)
            .or_insert_with(|| ChunkHit { score: weighted, ..hit });
    }

    let mut out: Vec<ChunkHit> = fused.into_values().collect();
    out.sort_by(|a, b| b.score.total_cmp(&a.score));
    out
}

/// Group chunks by article, rank articles by their best chunk, keep the top
/// N, and rebuild each article's text from its chunks in corpus order.
fn aggregate_articles(hits: Vec<ChunkHit>, article_limit: usize) -> Vec<SourceArticle> {
    let mut by_article: HashMap<String, Vec<ChunkHit>> = HashMap::new();
    for hit in hits {
        by_article.entry(hit.article_title.clone()).or_default().push(hit);
    }

    let mut ranked: Vec<(f64, String)> = by_article
        .iter()
        .map(|(title, chunks)| {
            let best = chunks.iter().map(|c| c.score).fold(f64::MIN, f64::max);
            (best, title.clone())
        })
        .collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

    ranked
        .into_iter()
        .take(article_limit)
        .filter_map(|(_, title)| {
            let mut chunks = by_article.remove(&title)?;
            chunks.sort_by_key(|c| c.chunk_index);
            chunks.dedup_by_key(|c| c.chunk_index);
            let url = chunks.first().map(|c| c.article_url.clone()).unwrap_or_default();
            let text: String = chunks
                .iter()
                .map(|c| c.chunk_text.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            if text.trim().is_empty() {
                debug!(title, "dataset article had no text, dropping");
                return None;
            }
            Some(SourceArticle {
                source_name: STRATEGY_DATASET_WIKIPEDIA_EN.to_string(),
                source_identifier: format!("en:{title}"),
                title,
                source_url: url,
                language: "en".to_string(),
                source_type: "dataset".to_string(),
                text_content: text,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(title: &str, index: i32, score: f64) -> ChunkHit {
        ChunkHit {
            article_title: title.to_string(),
            article_url: format!("https://example.org/{title}"),
            chunk_index: index,
            chunk_text: format!("{title} chunk {index}"),
            score,
        }
    }

    #[test]
    fn fusion_sums_weighted_legs() {
        let fused = fuse_scores(
            vec![hit("A", 0, 0.9)],
            vec![hit("A", 0, 4.0), hit("B", 0, 2.0)],
            0.7,
            0.3,
        );
        let a = fused.iter().find(|h| h.article_title == "A").unwrap();
        // 0.9·0.7 + (4/4)·0.3
        assert!((a.score - (0.63 + 0.3)).abs() < 1e-9);
        let b = fused.iter().find(|h| h.article_title == "B").unwrap();
        assert!((b.score - 0.15).abs() < 1e-9);
    }

    #[test]
    fn fusion_with_empty_bm25_leg() {
        let fused = fuse_scores(vec![hit("A", 0, 0.8)], Vec::new(), 1.0, 0.0);
        assert_eq!(fused.len(), 1);
        assert!((fused[0].score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn aggregation_ranks_articles_by_best_chunk_and_orders_text() {
        let hits = vec![
            hit("B", 1, 0.5),
            hit("A", 2, 0.9),
            hit("A", 0, 0.4),
            hit("C", 0, 0.3),
        ];
        let articles = aggregate_articles(hits, 2);
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].title, "A");
        assert_eq!(articles[1].title, "B");
        // Chunks concatenate in corpus order, not score order.
        assert!(articles[0].text_content.starts_with("A chunk 0"));
        assert!(articles[0].text_content.ends_with("A chunk 2"));
    }

    #[test]
    fn aggregation_dedups_chunk_indexes() {
        let hits = vec![hit("A", 0, 0.5), hit("A", 0, 0.4)];
        let articles = aggregate_articles(hits, 5);
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].text_content, "A chunk 0");
    }
}
