/// Batch embedding of corpus passages for building the dense index
use super::{EmbeddingError, EmbeddingProvider};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Result of batch processing
#[derive(Debug)]
pub struct BatchResult {
    /// Embeddings in input order
    pub vectors: Vec<Vec<f32>>,
    pub processed: usize,
    pub duration_ms: u64,
}

/// Embeds passage texts in fixed-size batches with bounded concurrency.
///
/// Every batch must succeed: a dense index with holes would silently shift
/// rows, so the first failing batch aborts the whole run.
pub struct BatchProcessor {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    max_concurrent: usize,
}

impl BatchProcessor {
    /// * `batch_size` - Number of texts sent to the provider in one call
    /// * `max_concurrent` - Maximum batches in flight on the blocking pool
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize, max_concurrent: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub async fn process(&self, texts: Vec<String>) -> Result<BatchResult> {
        let start = std::time::Instant::now();
        let total = texts.len();

        info!(
            "Embedding {} passages with {} (batch size {})",
            total,
            self.provider.model_name(),
            self.batch_size
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        for (batch_no, chunk) in texts.chunks(self.batch_size).enumerate() {
            let permit = semaphore.clone().acquire_owned().await?;
            let provider = self.provider.clone();
            let chunk = chunk.to_vec();

            tasks.spawn_blocking(move || {
                let _permit = permit;
                let embeddings = embed_chunk(provider.as_ref(), &chunk);
                (batch_no, embeddings)
            });
        }

        let mut batches: Vec<(usize, Vec<Vec<f32>>)> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (batch_no, embeddings) = joined.context("Embedding task panicked")?;
            let embeddings =
                embeddings.with_context(|| format!("Failed to embed batch {}", batch_no))?;
            debug!("Embedded batch {} ({} passages)", batch_no, embeddings.len());
            batches.push((batch_no, embeddings));
        }

        batches.sort_by_key(|(batch_no, _)| *batch_no);
        let vectors: Vec<Vec<f32>> = batches.into_iter().flat_map(|(_, v)| v).collect();

        let duration_ms = start.elapsed().as_millis() as u64;
        info!("Embedded {} passages in {}ms", vectors.len(), duration_ms);

        Ok(BatchResult {
            processed: vectors.len(),
            vectors,
            duration_ms,
        })
    }
}

fn embed_chunk(
    provider: &dyn EmbeddingProvider,
    chunk: &[String],
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let embeddings = provider.embed_batch(chunk)?;

    if embeddings.len() != chunk.len() {
        return Err(EmbeddingError::GenerationError(format!(
            "Embedding count mismatch: expected {}, got {}",
            chunk.len(),
            embeddings.len()
        )));
    }

    Ok(embeddings)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Encodes the text length and first byte so order can be checked
    struct LengthProvider;

    impl EmbeddingProvider for LengthProvider {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![text.len() as f32, text.as_bytes()[0] as f32])
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "length"
        }
    }

    struct FailingProvider;

    impl EmbeddingProvider for FailingProvider {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Err(EmbeddingError::GenerationError("offline".to_string()))
        }

        fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::GenerationError("offline".to_string()))
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_batches_keep_input_order() {
        let processor = BatchProcessor::new(Arc::new(LengthProvider), 2, 3);
        let texts: Vec<String> = (1..=7).map(|i| "x".repeat(i)).collect();

        let result = processor.process(texts).await.unwrap();

        assert_eq!(result.processed, 7);
        let lengths: Vec<f32> = result.vectors.iter().map(|v| v[0]).collect();
        assert_eq!(lengths, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let processor = BatchProcessor::new(Arc::new(LengthProvider), 32, 4);
        let result = processor.process(Vec::new()).await.unwrap();
        assert_eq!(result.processed, 0);
        assert!(result.vectors.is_empty());
    }

    #[tokio::test]
    async fn test_failure_aborts() {
        let processor = BatchProcessor::new(Arc::new(FailingProvider), 2, 1);
        let result = processor.process(vec!["a".to_string(), "b".to_string()]).await;
        assert!(result.is_err());
    }
}
