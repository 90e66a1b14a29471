//! Contribution-percentage allocation across pinned and unpinned publishers.
//!
//! The normalizer resolves user pins and attention scores into an integer
//! percentage split that sums to exactly 100 whenever at least one eligible
//! publisher exists, and to 0 otherwise. Three branches, in priority order:
//! over-pinned (pins sum past 100), pinned-only (nothing unpinned left to
//! absorb the remainder), and the normal case where pins are preserved
//! verbatim and unpinned publishers split what is left by score.

use std::collections::HashSet;

use crate::synopsis::Synopsis;

/// One publisher's assigned share after normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Share {
    pub key: String,
    pub percentage: u32,
    /// Pre-rounding proportional share.
    pub weight: f64,
}

/// Full assignment produced by [`normalize`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Allocation {
    pub pinned: Vec<Share>,
    pub unpinned: Vec<Share>,
    /// Keys forced to zero by exclusion (record flag or rule-driven).
    pub excluded: Vec<String>,
}

impl Allocation {
    /// Sum of every assigned percentage.
    pub fn total(&self) -> u32 {
        self.pinned
            .iter()
            .chain(self.unpinned.iter())
            .map(|s| s.percentage)
            .sum()
    }
}

/// Run the allocation and write `weight`/`percentage`/`pin_percentage`
/// back into the synopsis.
///
/// `changed_publisher` names a pin the user just edited; in the
/// over-pinned branch that pin is honored verbatim (or clamped) and only
/// the *other* pins are rescaled. Pure for a given synopsis state: two
/// calls with no intervening mutation yield identical output.
pub fn normalize(
    synopsis: &mut Synopsis,
    extra_excluded: &HashSet<String>,
    changed_publisher: Option<&str>,
) -> Allocation {
    let mut excluded_keys: Vec<String> = Vec::new();
    let mut pinned: Vec<(String, u8)> = Vec::new();
    for rec in synopsis.publishers() {
        if rec.excluded || extra_excluded.contains(&rec.key) {
            excluded_keys.push(rec.key.clone());
        } else if rec.pinned() {
            pinned.push((rec.key.clone(), rec.pin_percentage.unwrap_or(0)));
        }
    }

    // Only eligible unpinned publishers with attention on record can absorb
    // the unpinned remainder.
    let unpinned: Vec<(String, f64)> = synopsis
        .enumerate_eligible(extra_excluded)
        .into_iter()
        .filter(|r| !r.pinned() && r.score > 0.0)
        .map(|r| (r.key.clone(), r.score))
        .collect();

    let pinned_total: i64 = pinned.iter().map(|(_, p)| i64::from(*p)).sum();

    let (pinned_shares, unpinned_shares) = if pinned.is_empty() && unpinned.is_empty() {
        (Vec::new(), Vec::new())
    } else if pinned_total > 100 {
        let zeroed = unpinned
            .iter()
            .map(|(k, _)| (k.clone(), 0.0, 0i64))
            .collect();
        (over_pinned(&pinned, pinned_total, changed_publisher), zeroed)
    } else if unpinned.is_empty() {
        // No unpinned pool to absorb the remainder: pins scale to fill 100.
        (scale_pinned(&pinned, pinned_total, 100), Vec::new())
    } else {
        let kept = pinned
            .iter()
            .map(|(k, p)| (k.clone(), f64::from(*p), i64::from(*p)))
            .collect();
        (kept, split_unpinned(&unpinned, 100 - pinned_total))
    };

    // Zero every derived field, then lay the computed shares back down.
    for rec in synopsis.publishers_mut() {
        rec.percentage = 0;
        rec.weight = 0.0;
    }
    for (key, weight, pct) in &pinned_shares {
        if let Some(rec) = synopsis.record_mut(key) {
            rec.weight = *weight;
            rec.percentage = (*pct).clamp(0, 100) as u32;
            rec.pin_percentage = (*pct > 0).then(|| (*pct).clamp(1, 100) as u8);
        }
    }
    for (key, weight, pct) in &unpinned_shares {
        if let Some(rec) = synopsis.record_mut(key) {
            rec.weight = *weight;
            rec.percentage = (*pct).clamp(0, 100) as u32;
        }
    }

    Allocation {
        pinned: to_shares(&pinned_shares),
        unpinned: to_shares(&unpinned_shares),
        excluded: excluded_keys,
    }
}

fn to_shares(raw: &[(String, f64, i64)]) -> Vec<Share> {
    raw.iter()
        .map(|(key, weight, pct)| Share {
            key: key.clone(),
            percentage: (*pct).clamp(0, 100) as u32,
            weight: *weight,
        })
        .collect()
}

/// Pins sum past 100. With a just-edited pin, honor it and rescale the
/// rest into the remaining budget; without one, rescale everything.
fn over_pinned(
    pinned: &[(String, u8)],
    pinned_total: i64,
    changed_publisher: Option<&str>,
) -> Vec<(String, f64, i64)> {
    let changed_pos =
        changed_publisher.and_then(|key| pinned.iter().position(|(k, _)| k.as_str() == key));
    let Some(pos) = changed_pos else {
        return scale_pinned(pinned, pinned_total, 100);
    };

    let requested = i64::from(pinned[pos].1);
    let others: Vec<(String, u8)> = pinned
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != pos)
        .map(|(_, share)| share.clone())
        .collect();
    let n_others = others.len() as i64;

    let mut out = Vec::with_capacity(pinned.len());
    if requested > 100 - n_others - 1 {
        // The request leaves less than 1% apiece for the rest: clamp it so
        // every other pin can hold exactly 1% and the total stays at 100.
        let clamped = 100 - n_others;
        out.push((pinned[pos].0.clone(), clamped as f64, clamped));
        out.extend(others.iter().map(|(k, _)| (k.clone(), 1.0, 1i64)));
    } else {
        let others_total: i64 = others.iter().map(|(_, p)| i64::from(*p)).sum();
        out.push((pinned[pos].0.clone(), requested as f64, requested));
        out.extend(scale_pinned(&others, others_total, 100 - requested));
    }
    out
}

/// Scale pinned shares proportionally so they sum to `target`, flooring
/// each real-valued share at 1% before the largest-remainder correction.
fn scale_pinned(shares: &[(String, u8)], total: i64, target: i64) -> Vec<(String, f64, i64)> {
    if shares.is_empty() || total <= 0 {
        return Vec::new();
    }
    let weights: Vec<f64> = shares
        .iter()
        .map(|(_, pct)| (f64::from(*pct) / total as f64 * target as f64).max(1.0))
        .collect();
    let corrected = round_to_target(&weights, target);
    shares
        .iter()
        .zip(weights)
        .zip(corrected)
        .map(|(((key, _), weight), pct)| (key.clone(), weight, pct))
        .collect()
}

/// Split `target` across unpinned publishers proportionally to score.
fn split_unpinned(shares: &[(String, f64)], target: i64) -> Vec<(String, f64, i64)> {
    let total: f64 = shares.iter().map(|(_, score)| score).sum();
    let weights: Vec<f64> = shares
        .iter()
        .map(|(_, score)| score / total * target as f64)
        .collect();
    let corrected = round_to_target(&weights, target);
    shares
        .iter()
        .zip(weights)
        .zip(corrected)
        .map(|(((key, _), weight), pct)| (key.clone(), weight, pct))
        .collect()
}

/// Largest-remainder correction: adjust rounded shares so they sum to
/// exactly `target`.
///
/// Each share rounds to the nearest integer. The shares that rounded down
/// the hardest absorb any shortfall (+1); the ones that rounded up the
/// hardest give back any excess (−1). Ties break on input order, so the
/// result is reproducible.
pub fn round_to_target(values: &[f64], target: i64) -> Vec<i64> {
    let mut shares: Vec<i64> = values.iter().map(|v| v.round() as i64).collect();
    let off = target - shares.iter().sum::<i64>();

    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = shares[a] as f64 - values[a];
        let rb = shares[b] as f64 - values[b];
        ra.partial_cmp(&rb)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let count = shares.len() as i64;
    for (rank, &idx) in order.iter().enumerate() {
        let rank = rank as i64;
        if off > rank {
            shares[idx] += 1;
        } else if rank >= count + off {
            shares[idx] -= 1;
        }
    }
    shares
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::Scorekeeper;

    fn no_extra() -> HashSet<String> {
        HashSet::new()
    }

    /// An eligible publisher: one qualifying visit of `duration_ms`.
    fn add_visited(syn: &mut Synopsis, key: &str, duration_ms: u64) {
        syn.upsert(key, duration_ms, false);
    }

    fn pct_of(allocation: &Allocation, key: &str) -> Option<u32> {
        allocation
            .pinned
            .iter()
            .chain(allocation.unpinned.iter())
            .find(|s| s.key == key)
            .map(|s| s.percentage)
    }

    #[test]
    fn test_empty_synopsis_allocates_nothing() {
        let mut syn = Synopsis::new();
        let allocation = normalize(&mut syn, &no_extra(), None);
        assert_eq!(allocation, Allocation::default());
        assert_eq!(allocation.total(), 0);
    }

    #[test]
    fn test_two_unpinned_split_by_score_exactly() {
        let mut syn = Synopsis::new();
        // Visits scorekeeper makes the scores exactly 3 and 7.
        syn.set_scorekeeper(Scorekeeper::Visits);
        add_visited(&mut syn, "small.com", 10_000);
        add_visited(&mut syn, "small.com", 0);
        add_visited(&mut syn, "small.com", 0);
        add_visited(&mut syn, "large.com", 10_000);
        for _ in 0..6 {
            add_visited(&mut syn, "large.com", 0);
        }

        let allocation = normalize(&mut syn, &no_extra(), None);
        assert_eq!(pct_of(&allocation, "small.com"), Some(30));
        assert_eq!(pct_of(&allocation, "large.com"), Some(70));
        assert_eq!(allocation.total(), 100);
    }

    #[test]
    fn test_pins_preserved_when_under_budget() {
        let mut syn = Synopsis::new();
        add_visited(&mut syn, "pinned-a.com", 20_000);
        add_visited(&mut syn, "pinned-b.com", 20_000);
        add_visited(&mut syn, "free.com", 20_000);
        syn.set_pin("pinned-a.com", 20);
        syn.set_pin("pinned-b.com", 30);

        let allocation = normalize(&mut syn, &no_extra(), None);
        assert_eq!(pct_of(&allocation, "pinned-a.com"), Some(20));
        assert_eq!(pct_of(&allocation, "pinned-b.com"), Some(30));
        assert_eq!(pct_of(&allocation, "free.com"), Some(50));
        assert_eq!(allocation.total(), 100);

        // Pins came through byte-identical.
        assert_eq!(syn.get("pinned-a.com").unwrap().pin_percentage, Some(20));
        assert_eq!(syn.get("pinned-b.com").unwrap().pin_percentage, Some(30));
    }

    #[test]
    fn test_over_pinned_with_changed_publisher() {
        // The §-style worked example: pins 50/40/20 and one unpinned
        // publisher; editing the 50 forces the others down into 50.
        let mut syn = Synopsis::new();
        add_visited(&mut syn, "alpha.com", 20_000);
        add_visited(&mut syn, "bravo.com", 20_000);
        add_visited(&mut syn, "charlie.com", 20_000);
        add_visited(&mut syn, "delta.com", 20_000);
        syn.set_pin("alpha.com", 50);
        syn.set_pin("bravo.com", 40);
        syn.set_pin("charlie.com", 20);

        let allocation = normalize(&mut syn, &no_extra(), Some("alpha.com"));
        assert_eq!(pct_of(&allocation, "alpha.com"), Some(50));
        assert_eq!(pct_of(&allocation, "bravo.com"), Some(33));
        assert_eq!(pct_of(&allocation, "charlie.com"), Some(17));
        assert_eq!(pct_of(&allocation, "delta.com"), Some(0));
        assert_eq!(allocation.total(), 100);

        // The rescale is written back into the pins themselves.
        assert_eq!(syn.get("bravo.com").unwrap().pin_percentage, Some(33));
        assert_eq!(syn.get("charlie.com").unwrap().pin_percentage, Some(17));
    }

    #[test]
    fn test_over_pinned_without_changed_publisher() {
        let mut syn = Synopsis::new();
        add_visited(&mut syn, "alpha.com", 20_000);
        add_visited(&mut syn, "bravo.com", 20_000);
        add_visited(&mut syn, "charlie.com", 20_000);
        syn.set_pin("alpha.com", 50);
        syn.set_pin("bravo.com", 40);
        syn.set_pin("charlie.com", 20);

        let allocation = normalize(&mut syn, &no_extra(), None);
        // 50/110, 40/110, 20/110 of 100, largest-remainder corrected.
        assert_eq!(pct_of(&allocation, "alpha.com"), Some(46));
        assert_eq!(pct_of(&allocation, "bravo.com"), Some(36));
        assert_eq!(pct_of(&allocation, "charlie.com"), Some(18));
        assert_eq!(allocation.total(), 100);
    }

    #[test]
    fn test_over_pinned_clamps_greedy_edit() {
        let mut syn = Synopsis::new();
        add_visited(&mut syn, "greedy.com", 20_000);
        add_visited(&mut syn, "one.com", 20_000);
        add_visited(&mut syn, "two.com", 20_000);
        syn.set_pin("greedy.com", 99);
        syn.set_pin("one.com", 40);
        syn.set_pin("two.com", 30);

        let allocation = normalize(&mut syn, &no_extra(), Some("greedy.com"));
        assert_eq!(pct_of(&allocation, "greedy.com"), Some(98));
        assert_eq!(pct_of(&allocation, "one.com"), Some(1));
        assert_eq!(pct_of(&allocation, "two.com"), Some(1));
        assert_eq!(allocation.total(), 100);
    }

    #[test]
    fn test_pinned_only_scale_up_to_100() {
        let mut syn = Synopsis::new();
        syn.set_pin("a.com", 20);
        syn.set_pin("b.com", 30);

        let allocation = normalize(&mut syn, &no_extra(), None);
        assert_eq!(pct_of(&allocation, "a.com"), Some(40));
        assert_eq!(pct_of(&allocation, "b.com"), Some(60));
        assert_eq!(allocation.total(), 100);
    }

    #[test]
    fn test_pinned_exactly_100_is_identity() {
        let mut syn = Synopsis::new();
        syn.set_pin("a.com", 60);
        syn.set_pin("b.com", 40);

        let allocation = normalize(&mut syn, &no_extra(), None);
        assert_eq!(pct_of(&allocation, "a.com"), Some(60));
        assert_eq!(pct_of(&allocation, "b.com"), Some(40));
    }

    #[test]
    fn test_ineligible_unpinned_cannot_absorb() {
        let mut syn = Synopsis::new();
        // Below the duration gate — not a real unpinned pool.
        syn.upsert("tiny.com", 500, false);
        syn.set_pin("pinned.com", 40);

        let allocation = normalize(&mut syn, &no_extra(), None);
        assert_eq!(pct_of(&allocation, "pinned.com"), Some(100));
        assert_eq!(syn.get("tiny.com").unwrap().percentage, 0);
        assert_eq!(allocation.total(), 100);
    }

    #[test]
    fn test_excluded_always_zero() {
        let mut syn = Synopsis::new();
        add_visited(&mut syn, "good.com", 20_000);
        add_visited(&mut syn, "bad.com", 200_000);
        syn.set_excluded("bad.com", true);

        let allocation = normalize(&mut syn, &no_extra(), None);
        assert_eq!(pct_of(&allocation, "good.com"), Some(100));
        assert!(allocation.excluded.contains(&"bad.com".to_string()));
        assert_eq!(syn.get("bad.com").unwrap().percentage, 0);
        assert_eq!(syn.get("bad.com").unwrap().weight, 0.0);
    }

    #[test]
    fn test_rule_excluded_via_extra_set() {
        let mut syn = Synopsis::new();
        add_visited(&mut syn, "good.com", 20_000);
        add_visited(&mut syn, "spam.com", 200_000);

        let extra: HashSet<String> = ["spam.com".to_string()].into();
        let allocation = normalize(&mut syn, &extra, None);
        assert_eq!(pct_of(&allocation, "good.com"), Some(100));
        assert!(allocation.excluded.contains(&"spam.com".to_string()));
    }

    #[test]
    fn test_only_excluded_publishers_allocates_zero() {
        let mut syn = Synopsis::new();
        add_visited(&mut syn, "bad.com", 200_000);
        syn.set_excluded("bad.com", true);

        let allocation = normalize(&mut syn, &no_extra(), None);
        assert_eq!(allocation.total(), 0);
        assert!(allocation.pinned.is_empty());
        assert!(allocation.unpinned.is_empty());
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let mut syn = Synopsis::new();
        add_visited(&mut syn, "a.com", 33_000);
        add_visited(&mut syn, "b.com", 41_000);
        add_visited(&mut syn, "c.com", 9_000);
        syn.set_pin("a.com", 15);

        let first = normalize(&mut syn, &no_extra(), None);
        let second = normalize(&mut syn, &no_extra(), None);
        assert_eq!(first, second);
    }

    #[test]
    fn test_weight_written_back() {
        let mut syn = Synopsis::new();
        add_visited(&mut syn, "a.com", 20_000);
        add_visited(&mut syn, "b.com", 20_000);

        normalize(&mut syn, &no_extra(), None);
        let a = syn.get("a.com").unwrap();
        assert!(a.weight > 0.0, "pre-rounding weight should be recorded");
        assert_eq!(a.percentage, 50);
    }

    #[test]
    fn test_round_to_target_examples() {
        assert_eq!(round_to_target(&[33.333, 16.667], 50), vec![33, 17]);
        assert_eq!(round_to_target(&[30.0, 70.0], 100), vec![30, 70]);
        // Shortfall lands on the hardest-rounded-down share.
        assert_eq!(
            round_to_target(&[45.4545, 36.3636, 18.1818], 100),
            vec![46, 36, 18]
        );
        assert_eq!(round_to_target(&[], 0), Vec::<i64>::new());
    }

    #[test]
    fn test_round_to_target_gives_back_excess() {
        // All three round up; the largest residuals give back.
        assert_eq!(round_to_target(&[0.5, 2.5, 1.5], 4), vec![1, 2, 1]);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn round_to_target_sums_exactly(
                raw in proptest::collection::vec(0.01f64..50.0, 1..12),
                target in 1i64..=100,
            ) {
                let total: f64 = raw.iter().sum();
                let values: Vec<f64> =
                    raw.iter().map(|v| v / total * target as f64).collect();

                let corrected = round_to_target(&values, target);
                prop_assert_eq!(corrected.iter().sum::<i64>(), target);
                for (c, v) in corrected.iter().zip(&values) {
                    prop_assert!((*c as f64 - v.round()).abs() <= 1.0);
                }
            }

            #[test]
            fn allocation_sums_to_100(
                publishers in proptest::collection::vec(
                    (any::<bool>(), 1u8..=60, 1u32..40, 8_000u64..10_000_000),
                    1..8,
                ),
            ) {
                let mut syn = Synopsis::new();
                for (i, (pin, pct, visits, duration)) in publishers.iter().enumerate() {
                    let key = format!("pub{i}.com");
                    syn.upsert(&key, *duration, false);
                    for _ in 1..*visits {
                        syn.upsert(&key, 0, false);
                    }
                    if *pin {
                        syn.set_pin(&key, *pct);
                    }
                }

                let allocation = normalize(&mut syn, &HashSet::new(), None);
                prop_assert_eq!(allocation.total(), 100);
            }
        }
    }
}
