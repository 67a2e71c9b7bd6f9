use rand::seq::SliceRandom;

/// Picks `count` distinct entries from `pool` uniformly at random, fewer if
/// `pool` is smaller than `count` (spec.md §4.2 placement policy). Each
/// call draws a fresh `rand::thread_rng()`, so repeated calls are
/// independent rather than replaying one seeded sequence.
pub fn pick_distinct<T: Clone>(pool: &[T], count: usize) -> Vec<T> {
    let mut rng = rand::thread_rng();
    let mut shuffled: Vec<&T> = pool.iter().collect();
    shuffled.shuffle(&mut rng);
    shuffled.into_iter().take(count).cloned().collect()
}

/// Picks a single entry uniformly at random, or `None` if `pool` is empty.
pub fn pick_one<T: Clone>(pool: &[T]) -> Option<T> {
    let mut rng = rand::thread_rng();
    pool.choose(&mut rng).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_distinct_never_exceeds_pool() {
        let pool = vec!["a".to_string(), "b".to_string()];
        let picked = pick_distinct(&pool, 5);
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn pick_distinct_respects_count() {
        let pool: Vec<u32> = (0..10).collect();
        let picked = pick_distinct(&pool, 3);
        assert_eq!(picked.len(), 3);
        let unique: std::collections::HashSet<_> = picked.iter().collect();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn pick_one_empty_pool() {
        let pool: Vec<u32> = vec![];
        assert_eq!(pick_one(&pool), None);
    }
}
