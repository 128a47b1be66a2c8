//! Specificity scoring by repeated calls to an alignment [Oracle].
//!
//! Thresholds are tried from loosest to strictest. A target that aligns
//! uniquely in a pass is raised to that threshold, never lowered, so its
//! final score is the loosest threshold at which it was still unique. Once
//! all passes are done, scored targets are discounted by their weakness.

use std::io::{BufWriter, Write};

use eyre::{Result, WrapErr};
use itertools::Itertools;

use crate::{
    oracle::{write_reads, Alignment, Oracle, OracleError, ReadQualities},
    target::Catalogue,
};

pub const THRESHOLDS: [u32; 11] = [95, 90, 80, 70, 60, 50, 40, 30, 20, 11, 1];

#[derive(Debug, Clone)]
pub struct SpecificityOptions {
    thresholds: Vec<u32>,
    qualities: ReadQualities,
}

impl Default for SpecificityOptions {
    fn default() -> Self {
        Self {
            thresholds: THRESHOLDS.to_vec(),
            qualities: ReadQualities::default(),
        }
    }
}

impl SpecificityOptions {
    /// Passes always run in descending order, duplicates are dropped.
    pub fn thresholds(&mut self, thresholds: Vec<u32>) -> &mut Self {
        self.thresholds = thresholds
            .into_iter()
            .sorted_by(|a, b| b.cmp(a))
            .dedup()
            .collect();
        self
    }

    pub fn get_thresholds(&self) -> &[u32] {
        &self.thresholds
    }

    pub fn qualities(&mut self, qualities: ReadQualities) -> &mut Self {
        self.qualities = qualities;
        self
    }

    pub fn run<O: Oracle + ?Sized>(&self, catalogue: &mut Catalogue, oracle: &O) -> Result<()> {
        oracle.prepare()?;
        let mut reads = tempfile::Builder::new().suffix(".fq").tempfile()?;
        {
            let mut writer = BufWriter::new(reads.as_file_mut());
            write_reads(catalogue, &self.qualities, &mut writer)?;
            writer.flush()?;
        }
        for &threshold in self.thresholds.iter() {
            log::info!("Marking targets unique at threshold {threshold}");
            let hits = oracle
                .align(reads.path(), threshold)
                .wrap_err_with(|| format!("Alignment pass at threshold {threshold} failed"))?;
            let raised = mark_threshold(catalogue, &hits, threshold)?;
            log::info!("{raised} targets newly marked at {threshold}");
        }
        let adjusted = adjust_for_weakness(catalogue);
        log::info!("Discounted {adjusted} scored targets by their weakness");
        Ok(())
    }
}

/// Raise every uniquely aligned target to `threshold` if it is currently
/// lower, returning how many were raised.
pub fn mark_threshold(
    catalogue: &mut Catalogue,
    hits: &[(String, Alignment)],
    threshold: u32,
) -> Result<usize, OracleError> {
    let threshold = threshold as i32;
    let mut raised = 0;
    for (name, alignment) in hits {
        if *alignment != Alignment::Unique {
            continue;
        }
        let target = name
            .parse::<usize>()
            .ok()
            .and_then(|idx| catalogue.get_slot_mut(idx))
            .ok_or_else(|| OracleError::UnknownRead(name.clone()))?;
        if target.specificity < threshold {
            target.specificity = threshold;
            raised += 1;
        }
    }
    Ok(raised)
}

/// Subtract weakness from every target with a nonzero specificity.
pub fn adjust_for_weakness(catalogue: &mut Catalogue) -> usize {
    let mut n = 0;
    for target in catalogue.iter_mut() {
        if target.specificity != 0 {
            target.specificity -= target.weakness as i32;
            n += 1;
        }
    }
    n
}

#[cfg(test)]
mod test {
    use std::{
        cell::RefCell,
        path::Path,
    };

    use fnv::{FnvHashMap, FnvHashSet};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::target::Target;

    /// Reports a fixed set of unique read slots per threshold.
    #[derive(Default)]
    struct MockOracle {
        unique: FnvHashMap<u32, FnvHashSet<usize>>,
        calls: RefCell<Vec<u32>>,
        prepared: RefCell<bool>,
    }

    impl Oracle for MockOracle {
        fn prepare(&self) -> Result<()> {
            *self.prepared.borrow_mut() = true;
            Ok(())
        }

        fn align(&self, reads: &Path, threshold: u32) -> Result<Vec<(String, Alignment)>> {
            assert!(reads.exists());
            self.calls.borrow_mut().push(threshold);
            let unique = self.unique.get(&threshold).cloned().unwrap_or_default();
            Ok(unique
                .into_iter()
                .map(|idx| (idx.to_string(), Alignment::Unique))
                .collect())
        }
    }

    struct FailingOracle;

    impl Oracle for FailingOracle {
        fn prepare(&self) -> Result<()> {
            Ok(())
        }

        fn align(&self, _reads: &Path, _threshold: u32) -> Result<Vec<(String, Alignment)>> {
            Err(OracleError::Failed {
                program: "bowtie".to_string(),
                code: 2,
            }
            .into())
        }
    }

    const GUIDE: &str = "ACGTACGTACGTACGTACGT";

    fn catalogue(weaknesses: &[u32]) -> Catalogue {
        weaknesses
            .iter()
            .enumerate()
            .map(|(i, &w)| {
                let mut t = Target::new(GUIDE, "AGG", "chrI", i as u64 * 100 + 1, false);
                t.weakness = w;
                t
            })
            .collect()
    }

    #[test]
    fn test_raise_only() {
        let mut cat = catalogue(&[0, 0]);
        let unique = |idxs: &[usize]| -> Vec<(String, Alignment)> {
            idxs.iter()
                .map(|i| (i.to_string(), Alignment::Unique))
                .collect()
        };
        // loose pass first, then stricter passes that also see target 0
        mark_threshold(&mut cat, &unique(&[0]), 95).unwrap();
        mark_threshold(&mut cat, &unique(&[0, 1]), 50).unwrap();
        mark_threshold(&mut cat, &unique(&[0, 1]), 1).unwrap();
        assert_eq!(cat.get_slot(0).unwrap().specificity, 95);
        assert_eq!(cat.get_slot(1).unwrap().specificity, 50);
    }

    #[test]
    fn test_non_unique_ignored() {
        let mut cat = catalogue(&[0, 0]);
        let hits = vec![
            ("0".to_string(), Alignment::Suppressed),
            ("1".to_string(), Alignment::Unaligned),
        ];
        assert_eq!(mark_threshold(&mut cat, &hits, 40).unwrap(), 0);
        assert!(cat.iter().all(|t| t.specificity == 0));
    }

    #[test]
    fn test_unknown_read() {
        let mut cat = catalogue(&[0]);
        let hits = vec![("7".to_string(), Alignment::Unique)];
        assert!(matches!(
            mark_threshold(&mut cat, &hits, 40),
            Err(OracleError::UnknownRead(_))
        ));
    }

    #[test]
    fn test_adjust_for_weakness() {
        let mut cat = catalogue(&[10, 25]);
        cat.get_slot_mut(0).unwrap().specificity = 50;
        assert_eq!(adjust_for_weakness(&mut cat), 1);
        assert_eq!(cat.get_slot(0).unwrap().specificity, 40);
        assert_eq!(cat.get_slot(1).unwrap().specificity, 0);
    }

    #[test]
    fn test_thresholds_sorted() {
        let mut opts = SpecificityOptions::default();
        opts.thresholds(vec![1, 50, 95, 50]);
        assert_eq!(opts.get_thresholds(), &[95, 50, 1]);
    }

    #[test]
    fn test_run_with_oracle() {
        let mut cat = catalogue(&[0, 10, 19]);
        let mut oracle = MockOracle::default();
        oracle.unique.insert(95, [0].into_iter().collect());
        oracle.unique.insert(50, [0, 1].into_iter().collect());
        oracle.unique.insert(1, [0, 1].into_iter().collect());

        let mut opts = SpecificityOptions::default();
        opts.thresholds(vec![1, 50, 95]);
        opts.run(&mut cat, &oracle).unwrap();

        assert!(*oracle.prepared.borrow());
        assert_eq!(*oracle.calls.borrow(), vec![95, 50, 1]);
        let scores: Vec<i32> = cat.iter().map(|t| t.specificity).collect();
        assert_eq!(scores, vec![95, 40, 0]);
    }

    #[test]
    fn test_run_aborts_on_oracle_failure() {
        let mut cat = catalogue(&[0]);
        let err = SpecificityOptions::default()
            .run(&mut cat, &FailingOracle)
            .unwrap_err();
        let code = err
            .chain()
            .find_map(|e| e.downcast_ref::<OracleError>())
            .and_then(|e| e.exit_code());
        assert_eq!(code, Some(2));
        assert_eq!(cat.get_slot(0).unwrap().specificity, 0);
    }
}
