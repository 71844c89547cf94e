//! Deterministic candidate selection.

use std::collections::BTreeSet;

/// Pick one tip from a set of candidates.
///
/// Exact duplicates collapse. The shortest candidate (in chars) wins; equal
/// lengths fall back to lexicographic order. `None` for an empty set.
pub fn select<I>(candidates: I) -> Option<String>
where
    I: IntoIterator<Item = String>,
{
    let unique: BTreeSet<String> = candidates.into_iter().collect();
    unique.into_iter().min_by(|a, b| {
        a.chars()
            .count()
            .cmp(&b.chars().count())
            .then_with(|| a.cmp(b))
    })
}
