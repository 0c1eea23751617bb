//! In-memory vector store over segmented knowledge documents.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::Settings;
use crate::errors::EngineError;
use crate::llm::provider::LlmProvider;

use super::segmenter::Segmenter;
use super::similarity::rank_descending_by_cosine;

/// One stored segment together with its embedding.
#[derive(Debug, Clone)]
pub struct KnowledgeEntry {
    pub segment: String,
    pub vector: Vec<f32>,
}

/// Embedded knowledge segments with cosine retrieval.
///
/// Segments and vectors live in one entry list behind a single lock, so
/// they cannot drift out of alignment. Document loading tolerates partial
/// failure: an unreadable file or a failed embedding batch is logged and
/// skipped while the rest of the corpus still loads.
pub struct KnowledgeBase {
    provider: Arc<dyn LlmProvider>,
    entries: RwLock<Vec<KnowledgeEntry>>,
    segmenter: Segmenter,
    batch_size: usize,
}

impl KnowledgeBase {
    pub fn new(provider: Arc<dyn LlmProvider>, settings: &Settings) -> Self {
        Self {
            provider,
            entries: RwLock::new(Vec::new()),
            segmenter: Segmenter::new(settings.max_segment_chars),
            batch_size: settings.embed_batch_size.max(1),
        }
    }

    /// Load every `.txt` and `.md` file in `dir`, in file-name order.
    ///
    /// Returns the number of entries actually stored. A missing or
    /// unreadable directory is treated as an empty corpus.
    pub async fn load_from_dir(&self, dir: &Path) -> usize {
        let mut read_dir = match tokio::fs::read_dir(dir).await {
            Ok(read_dir) => read_dir,
            Err(err) => {
                tracing::warn!(
                    "Knowledge directory {} is not readable, starting empty: {}",
                    dir.display(),
                    err
                );
                return 0;
            }
        };

        let mut paths = Vec::new();
        loop {
            match read_dir.next_entry().await {
                Ok(Some(dir_entry)) => {
                    let path = dir_entry.path();
                    let is_text = path
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .map(|ext| {
                            ext.eq_ignore_ascii_case("txt") || ext.eq_ignore_ascii_case("md")
                        })
                        .unwrap_or(false);
                    if is_text {
                        paths.push(path);
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(
                        "Listing {} ended early, loading what was found: {}",
                        dir.display(),
                        err
                    );
                    break;
                }
            }
        }

        // Directory order is platform-dependent; sorting keeps entry
        // insertion (and therefore tie-breaking) reproducible.
        paths.sort();

        let mut candidates = Vec::new();
        let mut files = 0usize;
        for path in paths {
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(err) => {
                    tracing::error!("Failed to read {}: {}", path.display(), err);
                    continue;
                }
            };

            let segments = self.segmenter.segment(&content);
            if segments.is_empty() {
                continue;
            }

            tracing::debug!("{}: {} segments", path.display(), segments.len());
            files += 1;
            candidates.extend(segments);
        }

        // One candidate list across all files, so embedding batches can
        // span file boundaries.
        let loaded = self.ingest_segments(&candidates).await;
        tracing::info!("Loaded {} knowledge segments from {} files", loaded, files);
        loaded
    }

    /// Segment and store `text`, returning how many segments were added.
    pub async fn add_knowledge(&self, text: &str) -> Result<usize, EngineError> {
        let segments = self.segmenter.segment(text);
        if segments.is_empty() {
            return Ok(0);
        }

        let vectors = self.provider.embed_batch(&segments).await.map_err(|err| {
            tracing::warn!("Embedding for added knowledge failed: {}", err);
            EngineError::from(err)
        })?;

        let added = segments.len();
        let mut entries = self.entries.write().await;
        for (segment, vector) in segments.into_iter().zip(vectors) {
            entries.push(KnowledgeEntry { segment, vector });
        }
        tracing::info!("Added {} knowledge segments", added);

        Ok(added)
    }

    /// Return the `top_k` most similar segments joined by blank lines.
    ///
    /// Degrades to an empty string when the store is empty or the query
    /// embedding cannot be produced.
    pub async fn retrieve_context(&self, query: &str, top_k: usize) -> String {
        let query_input = query.to_string();
        let vectors = match self
            .provider
            .embed_batch(std::slice::from_ref(&query_input))
            .await
        {
            Ok(vectors) => vectors,
            Err(err) => {
                tracing::warn!("Query embedding failed, answering without context: {}", err);
                return String::new();
            }
        };
        let Some(query_vector) = vectors.first() else {
            return String::new();
        };

        let entries = self.entries.read().await;
        if entries.is_empty() {
            return String::new();
        }

        let views: Vec<&[f32]> = entries.iter().map(|entry| entry.vector.as_slice()).collect();
        let mut ranked = rank_descending_by_cosine(query_vector, &views);
        ranked.truncate(top_k);

        ranked
            .iter()
            .map(|(idx, _)| entries[*idx].segment.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Embed `segments` batch by batch and store the successful batches.
    async fn ingest_segments(&self, segments: &[String]) -> usize {
        let mut stored = 0usize;
        for (batch_index, batch) in segments.chunks(self.batch_size).enumerate() {
            let start = batch_index * self.batch_size;
            let vectors = match self.provider.embed_batch(batch).await {
                Ok(vectors) => vectors,
                Err(err) => {
                    tracing::error!(
                        "Embedding batch {}..{} failed, skipping: {}",
                        start,
                        start + batch.len(),
                        err
                    );
                    continue;
                }
            };

            let mut entries = self.entries.write().await;
            for (segment, vector) in batch.iter().zip(vectors) {
                entries.push(KnowledgeEntry {
                    segment: segment.clone(),
                    vector,
                });
            }
            stored += batch.len();
        }

        stored
    }
}
