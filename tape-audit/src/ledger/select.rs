//! Coverage selector.
//!
//! Picks the next dataset to audit: every record sharing the lowest audit
//! count forms the tie set, and one of them is drawn uniformly at random.

use super::{AuditLedger, DatasetRecord};
use crate::utils::{AuditError, Result};
use rand::seq::IndexedRandom;
use rand::Rng;

/// Select one record from the least-audited tier of `ledger`.
pub fn select<'a, R: Rng + ?Sized>(ledger: &'a AuditLedger, rng: &mut R) -> Result<&'a DatasetRecord> {
    let min = ledger
        .records()
        .iter()
        .map(|r| r.checked_count)
        .min()
        .ok_or(AuditError::EmptyLedger)?;

    let tie: Vec<&DatasetRecord> = ledger
        .records()
        .iter()
        .filter(|r| r.checked_count == min)
        .collect();

    if let [only] = tie.as_slice() {
        return Ok(only);
    }

    tie.choose(rng).copied().ok_or(AuditError::EmptyLedger)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn ledger(records: &[(&str, &str, u64)]) -> AuditLedger {
        AuditLedger::from_records(
            records
                .iter()
                .map(|(p, s, c)| DatasetRecord::new(*p, *s, *c))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_ledger_fails() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            select(&AuditLedger::new(), &mut rng),
            Err(AuditError::EmptyLedger)
        ));
    }

    #[test]
    fn test_single_minimum_is_returned() {
        let ledger = ledger(&[("A", "srv1", 4), ("B", "srv1", 2), ("C", "srv2", 3)]);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            assert_eq!(select(&ledger, &mut rng).unwrap().path, "B");
        }
    }

    #[test]
    fn test_never_picks_above_minimum() {
        let ledger = ledger(&[("A", "srv1", 0), ("B", "srv1", 0), ("C", "srv2", 1)]);
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            let chosen = select(&ledger, &mut rng).unwrap();
            assert!(chosen.path == "A" || chosen.path == "B");
        }
    }

    #[test]
    fn test_tie_set_is_uniform_beyond_first_two() {
        // Five records tied at the minimum, listed after a higher-count one so
        // that neither position nor sort order can favour a subset.
        let ledger = ledger(&[
            ("Z", "srv3", 9),
            ("A", "srv1", 2),
            ("B", "srv1", 2),
            ("C", "srv2", 2),
            ("D", "srv2", 2),
            ("E", "srv3", 2),
        ]);
        let mut rng = StdRng::seed_from_u64(2024);
        let trials = 10_000;
        let mut counts: HashMap<String, usize> = HashMap::new();

        for _ in 0..trials {
            let chosen = select(&ledger, &mut rng).unwrap();
            *counts.entry(chosen.path.clone()).or_default() += 1;
        }

        assert!(!counts.contains_key("Z"));
        assert_eq!(counts.len(), 5);
        let expected = trials / 5;
        for (path, count) in &counts {
            let deviation = (*count as i64 - expected as i64).abs();
            assert!(
                deviation < (expected as i64) / 10,
                "{path} picked {count} times, expected about {expected}"
            );
        }
    }

    proptest! {
        #[test]
        fn prop_selection_is_at_minimum(counts in prop::collection::vec(0u64..20, 1..40), seed in any::<u64>()) {
            let records = counts
                .iter()
                .enumerate()
                .map(|(i, c)| DatasetRecord::new(format!("/tank/ds{i}"), "srv1", *c))
                .collect();
            let ledger = AuditLedger::from_records(records).unwrap();
            let mut rng = StdRng::seed_from_u64(seed);

            let chosen = select(&ledger, &mut rng).unwrap();

            prop_assert_eq!(chosen.checked_count, *counts.iter().min().unwrap());
        }
    }
}
