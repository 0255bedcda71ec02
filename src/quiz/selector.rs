use rand::Rng;

use super::performance::PerformanceRecord;

/// Items not asked within this window get a one-draw boost.
pub const RECENCY_WINDOW_MS: i64 = 60_000;
pub const STALE_BOOST: f64 = 1.5;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SelectError {
    #[error("cannot select from an empty pool")]
    EmptyPool,
}

pub fn effective_weight(record: &PerformanceRecord, now: i64) -> f64 {
    if now - record.last_asked > RECENCY_WINDOW_MS {
        record.weight * STALE_BOOST
    } else {
        record.weight
    }
}

/// Draws an index with probability proportional to its weight.
pub fn pick_weighted<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Result<usize, SelectError> {
    if weights.is_empty() {
        return Err(SelectError::EmptyPool);
    }

    let total: f64 = weights.iter().sum();
    let mut remaining = rng.gen::<f64>() * total;

    for (i, weight) in weights.iter().enumerate() {
        remaining -= weight;
        if remaining <= 0.0 {
            return Ok(i);
        }
    }

    // Only reachable through float drift.
    Ok(0)
}

/// Picks the next record to drill. Never mutates the records.
pub fn select<R: Rng + ?Sized>(
    records: &[PerformanceRecord],
    now: i64,
    rng: &mut R,
) -> Result<usize, SelectError> {
    let weights = records
        .iter()
        .map(|r| effective_weight(r, now))
        .collect::<Vec<_>>();
    pick_weighted(&weights, rng)
}

/// Fallback for an empty filtered pool: the item nearest the target
/// difficulty. The earliest item wins a tie.
pub fn closest_by_difficulty<T, F>(items: &[T], target: i64, difficulty: F) -> Option<&T>
where
    F: Fn(&T) -> i64,
{
    items
        .iter()
        .fold(None, |best: Option<&T>, item| match best {
            Some(prev) if (difficulty(prev) - target).abs() <= (difficulty(item) - target).abs() => {
                Some(prev)
            }
            _ => Some(item),
        })
}
