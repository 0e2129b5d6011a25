//! Small sequence helpers shared across the workspace.

/// Split a slice into consecutive chunks of at most `chunk_size` elements.
///
/// Chunking is eager: the whole input is materialized into owned chunks.
/// Concatenating the chunks reproduces the input order. A sequence no longer
/// than `chunk_size` comes back as a single chunk (an empty input yields one
/// empty chunk). A `chunk_size` of zero yields no chunks at all rather than
/// panicking; callers that must make progress should validate their
/// configured size upstream.
pub fn chunked<T: Clone>(items: &[T], chunk_size: usize) -> Vec<Vec<T>> {
    if chunk_size == 0 {
        return Vec::new();
    }
    if items.len() <= chunk_size {
        return vec![items.to_vec()];
    }
    items.chunks(chunk_size).map(<[T]>::to_vec).collect()
}
