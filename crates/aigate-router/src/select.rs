use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use aigate_common::attempt::Candidate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Deterministic seed derived from the request identifier so the same
/// request reproduces the same ordering on every retry and across test
/// runs (§4.2, §8 weighted-shuffle-determinism).
fn seed_from_request_id(request_id: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    request_id.hash(&mut hasher);
    hasher.finish()
}

/// Orders candidates for one request: ascending priority tiers, weighted
/// shuffle within a tier seeded by `request_id`, with candidates whose
/// breaker is currently open moved to the end (not removed) so they're
/// only tried once every healthy candidate has been exhausted.
pub fn order_candidates(candidates: &[Candidate], request_id: &str, mut is_open: impl FnMut(&str) -> bool) -> Vec<Candidate> {
    let mut priorities: Vec<i32> = candidates.iter().map(|c| c.priority).collect();
    priorities.sort_unstable();
    priorities.dedup();

    let mut rng = StdRng::seed_from_u64(seed_from_request_id(request_id));
    let mut healthy = Vec::with_capacity(candidates.len());
    let mut open = Vec::new();

    for priority in priorities {
        let tier: Vec<Candidate> = candidates.iter().filter(|c| c.priority == priority).cloned().collect();
        for candidate in weighted_shuffle(tier, &mut rng) {
            if is_open(&candidate.provider) {
                open.push(candidate);
            } else {
                healthy.push(candidate);
            }
        }
    }

    healthy.extend(open);
    healthy
}

/// Weighted sampling without replacement: at each step, picks among the
/// remaining candidates with probability proportional to `weight` (floored
/// at 1 so a zero-weight candidate can still be tried as a last resort).
fn weighted_shuffle(mut remaining: Vec<Candidate>, rng: &mut StdRng) -> Vec<Candidate> {
    let mut ordered = Vec::with_capacity(remaining.len());
    while !remaining.is_empty() {
        let total: u64 = remaining.iter().map(|c| c.weight.max(1) as u64).sum();
        let mut pick = rng.random_range(0..total);
        let mut index = remaining.len() - 1;
        for (i, candidate) in remaining.iter().enumerate() {
            let w = candidate.weight.max(1) as u64;
            if pick < w {
                index = i;
                break;
            }
            pick -= w;
        }
        ordered.push(remaining.remove(index));
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<Candidate> {
        vec![
            Candidate::new("a", "m", 100, 0),
            Candidate::new("b", "m", 20, 0),
            Candidate::new("c", "m", 5, 1),
        ]
    }

    #[test]
    fn same_request_id_produces_identical_ordering() {
        let cands = candidates();
        let first = order_candidates(&cands, "req-1", |_| false);
        let second = order_candidates(&cands, "req-1", |_| false);
        assert_eq!(first, second);
    }

    #[test]
    fn lower_priority_tier_always_sorts_first() {
        let cands = candidates();
        let ordered = order_candidates(&cands, "req-1", |_| false);
        assert_eq!(ordered[2].provider, "c");
    }

    #[test]
    fn open_breaker_candidates_move_to_the_end_without_being_dropped() {
        let cands = candidates();
        let ordered = order_candidates(&cands, "req-1", |provider| provider == "a");
        assert_eq!(ordered.len(), 3);
        assert_eq!(ordered.last().unwrap().provider, "a");
    }
}
