// src/exec/batch/chunk.rs

//! Splitting descriptors into submission chunks.

use tracing::debug;

use crate::errors::{JobdagError, Result};
use crate::exec::batch::descriptor::JobDescriptor;

/// Split `descriptors` into chunks of at most `chunk_size` items.
///
/// Every chunk is then measured as the JSON array it is sent as. A chunk
/// above `max_chunk_bytes` is an error; it is never split further.
pub fn chunk_descriptors(
    descriptors: Vec<JobDescriptor>,
    chunk_size: usize,
    max_chunk_bytes: usize,
) -> Result<Vec<Vec<JobDescriptor>>> {
    if chunk_size == 0 {
        return Err(JobdagError::ConfigError(
            "chunk size must be at least 1".to_string(),
        ));
    }

    let mut chunks = Vec::with_capacity(descriptors.len().div_ceil(chunk_size));
    let mut iter = descriptors.into_iter().peekable();
    while iter.peek().is_some() {
        let chunk: Vec<JobDescriptor> = iter.by_ref().take(chunk_size).collect();
        let bytes = serde_json::to_vec(&chunk)?.len();
        if bytes > max_chunk_bytes {
            return Err(JobdagError::PayloadTooLarge {
                chunk: chunks.len(),
                bytes,
                limit: max_chunk_bytes,
            });
        }
        debug!(chunk = chunks.len(), items = chunk.len(), bytes, "built submission chunk");
        chunks.push(chunk);
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceDefaults;
    use serde_json::json;

    fn descriptors(n: usize) -> Vec<JobDescriptor> {
        (0..n)
            .map(|i| JobDescriptor::new("f", vec![json!(i)], &ResourceDefaults::default()))
            .collect()
    }

    #[test]
    fn splits_by_count() {
        let chunks = chunk_descriptors(descriptors(7), 3, 1_000_000).unwrap();
        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunk_descriptors(Vec::new(), 3, 1024).unwrap().is_empty());
    }

    #[test]
    fn oversized_chunk_is_rejected_not_split() {
        let mut big = descriptors(2);
        big[1].args = vec![json!("x".repeat(4096))];

        let err = chunk_descriptors(big, 2, 1024).unwrap_err();
        match err {
            JobdagError::PayloadTooLarge { chunk, bytes, limit } => {
                assert_eq!(chunk, 0);
                assert!(bytes > limit);
                assert_eq!(limit, 1024);
            }
            other => panic!("expected PayloadTooLarge, got {other:?}"),
        }
    }
}
