//! Splitting GUID filter lists into upstream-sized batches.

use std::collections::HashSet;

/// Splits `items` into consecutive chunks of at most `size` elements.
///
/// A `size` of zero is treated as one. An empty input yields no chunks.
#[must_use]
pub fn chunk<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    items.chunks(size.max(1)).map(<[T]>::to_vec).collect()
}

/// Returns the distinct values in first-seen order.
#[must_use]
pub fn dedup<'a, I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|value| !value.is_empty() && seen.insert(*value))
        .map(str::to_string)
        .collect()
}
