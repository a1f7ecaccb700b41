//! Near-duplicate removal over time buckets.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::model::StandardDanmaku;

/// Drop comments whose content already appeared in the same or the previous
/// time bucket. `bucket_ms <= 0` disables merging. `duration_ms` only sizes
/// the bucket map up front and never affects the result. Relative order of
/// kept items equals their order in the input.
pub fn merge(
    items: Vec<StandardDanmaku>,
    bucket_ms: i64,
    duration_ms: i64,
) -> Vec<StandardDanmaku> {
    if bucket_ms <= 0 {
        return items;
    }

    let estimated_buckets = if duration_ms > 0 {
        (duration_ms / bucket_ms + 1) as usize
    } else {
        7200
    };
    let per_bucket = items.len() / estimated_buckets + 1;

    let mut buckets: FxHashMap<i64, FxHashSet<String>> =
        FxHashMap::with_capacity_and_hasher(estimated_buckets, Default::default());
    let mut kept = Vec::with_capacity(items.len());
    let input_len = items.len();

    for item in items {
        let bucket = item.offset_ms / bucket_ms;

        // Duplicates straddling a bucket boundary land in adjacent buckets.
        let seen = buckets
            .get(&bucket)
            .is_some_and(|contents| contents.contains(&item.content))
            || buckets
                .get(&(bucket - 1))
                .is_some_and(|contents| contents.contains(&item.content));
        if seen {
            continue;
        }

        buckets
            .entry(bucket)
            .or_insert_with(|| {
                FxHashSet::with_capacity_and_hasher(per_bucket, Default::default())
            })
            .insert(item.content.clone());
        kept.push(item);
    }

    debug!(input = input_len, kept = kept.len(), "danmaku merge done");

    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(offset_ms: i64, content: &str) -> StandardDanmaku {
        StandardDanmaku::new(offset_ms, content)
    }

    #[test]
    fn test_disabled_when_window_not_positive() {
        let items = vec![item(0, "a"), item(1, "a")];
        assert_eq!(merge(items.clone(), 0, 0), items);
        assert_eq!(merge(items.clone(), -5, 0), items);
    }

    #[test]
    fn test_bucket_boundary() {
        // 999 and 1000 fall into adjacent buckets; the straddle check drops
        // the second.
        let merged = merge(vec![item(999, "同款"), item(1000, "同款")], 1000, 0);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].offset_ms, 999);

        // Two buckets apart survive.
        let merged = merge(vec![item(0, "同款"), item(2500, "同款")], 1000, 0);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_order_preserved() {
        let merged = merge(
            vec![item(10, "a"), item(20, "b"), item(30, "a"), item(40, "c")],
            1000,
            60_000,
        );
        let contents: Vec<&str> = merged.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(contents, ["a", "b", "c"]);
    }

    #[test]
    fn test_idempotent() {
        let items = vec![
            item(0, "a"),
            item(500, "a"),
            item(999, "b"),
            item(1000, "b"),
            item(2500, "a"),
            item(3000, "c"),
        ];
        let once = merge(items, 1000, 10_000);
        let twice = merge(once.clone(), 1000, 10_000);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_different_content_same_bucket_kept() {
        let merged = merge(vec![item(100, "a"), item(200, "b")], 1000, 0);
        assert_eq!(merged.len(), 2);
    }
}
