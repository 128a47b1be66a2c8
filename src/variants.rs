//! Degenerate variants of canonical targets.
//!
//! A substitution costs more the closer it is to the PAM; the summed cost
//! of a variant's substitutions becomes its weakness.

use std::{fmt, ops::Range, str::FromStr};

use eyre::Result;
use fnv::FnvHashSet;
use indicatif::{ProgressBar, ProgressStyle};
use rand::{rngs::SmallRng, seq::index, Rng, SeedableRng};
use thiserror::Error;

use crate::target::{Catalogue, Target};

pub const BASES: [u8; 4] = *b"ATCG";

pub const COST_VECTOR: [u32; 20] = [
    10, 10, 10, 10, 10, 10, 10, 10, 19, 19, 19, 19, 19, 28, 28, 28, 28, 28, 28, 28,
];

/// Upper bound on rejected draws before a variant is declared unsampleable.
pub const MAX_TRIES: usize = 10_000;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum VariantError {
    #[error("Target {target} has length {found}, cost vector has length {expected}")]
    LengthMismatch {
        target: String,
        found: usize,
        expected: usize,
    },
    #[error("Could not sample a {n_subs}-substitution variant of {target} in {tries} tries")]
    SampleExhausted {
        target: String,
        n_subs: usize,
        tries: usize,
    },
    #[error("Cannot substitute {n_subs} positions within {available}")]
    TooFewPositions { n_subs: usize, available: usize },
    #[error("Invalid cost vector: {0}")]
    InvalidCosts(String),
}

/// Per position substitution cost, one entry per base of the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostVector(Vec<u32>);

impl Default for CostVector {
    fn default() -> Self {
        CostVector(COST_VECTOR.to_vec())
    }
}

impl CostVector {
    pub fn new(costs: Vec<u32>) -> Result<Self, VariantError> {
        if costs.is_empty() {
            Err(VariantError::InvalidCosts("empty".to_string()))
        } else {
            Ok(CostVector(costs))
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn cost(&self, idx: usize) -> u32 {
        self.0[idx]
    }

    pub fn costs(&self) -> &[u32] {
        &self.0
    }

    pub fn total<'a, I: IntoIterator<Item = &'a usize>>(&self, positions: I) -> u32 {
        positions.into_iter().map(|&p| self.0[p]).sum()
    }

    pub fn check(&self, target: &str) -> Result<(), VariantError> {
        if target.len() != self.len() {
            Err(VariantError::LengthMismatch {
                target: target.to_string(),
                found: target.len(),
                expected: self.len(),
            })
        } else {
            Ok(())
        }
    }

    /// Runs of equal cost, split into the tail (first run), the seed (last
    /// run) and whatever lies between.
    pub fn tiers(&self) -> Tiers {
        let first = self.0[0];
        let last = self.0[self.len() - 1];
        let tail_end = self.0.iter().take_while(|&&c| c == first).count();
        let seed_len = self.0.iter().rev().take_while(|&&c| c == last).count();
        let seed_start = (self.len() - seed_len).max(tail_end);
        Tiers {
            tail: 0..tail_end,
            middle: tail_end..seed_start,
            seed: seed_start..self.len(),
        }
    }
}

impl FromStr for CostVector {
    type Err = VariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let costs = s
            .split(',')
            .map(|c| c.trim().parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| VariantError::InvalidCosts(e.to_string()))?;
        CostVector::new(costs)
    }
}

impl fmt::Display for CostVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let costs: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", costs.join(","))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tiers {
    pub tail: Range<usize>,
    pub middle: Range<usize>,
    pub seed: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub sequence: String,
    pub positions: Vec<usize>,
    pub cost: u32,
}

/// Every single base substitution, ordered by position then by base.
pub fn all_single_variants(target: &str, costs: &CostVector) -> Result<Vec<Variant>, VariantError> {
    costs.check(target)?;
    let target = target.to_ascii_uppercase().into_bytes();
    let mut acc = Vec::with_capacity(target.len() * 3);
    for (i, &orig) in target.iter().enumerate() {
        for &base in BASES.iter().filter(|&&b| b != orig) {
            let mut new_target = target.clone();
            new_target[i] = base;
            acc.push(Variant {
                sequence: String::from_utf8_lossy(&new_target).into_owned(),
                positions: vec![i],
                cost: costs.cost(i),
            });
        }
    }
    Ok(acc)
}

/// Draw `n_subs` distinct positions inside `within`, replace each with a
/// random base and keep the draw only if every replacement changed its base.
pub fn sample_variant<R: Rng>(
    target: &str,
    n_subs: usize,
    within: Range<usize>,
    costs: &CostVector,
    rng: &mut R,
    max_tries: usize,
) -> Result<Variant, VariantError> {
    costs.check(target)?;
    let available = within.len();
    if n_subs == 0 || n_subs > available || within.end > target.len() {
        return Err(VariantError::TooFewPositions { n_subs, available });
    }
    let orig = target.to_ascii_uppercase().into_bytes();
    for _ in 0..max_tries {
        let positions: Vec<usize> = index::sample(rng, available, n_subs)
            .into_iter()
            .map(|p| p + within.start)
            .collect();
        let mut new_target = orig.clone();
        let mut keep = true;
        for &p in positions.iter() {
            new_target[p] = BASES[rng.gen_range(0..BASES.len())];
            if new_target[p] == orig[p] {
                keep = false;
            }
        }
        if keep {
            return Ok(Variant {
                sequence: String::from_utf8_lossy(&new_target).into_owned(),
                cost: costs.total(&positions),
                positions,
            });
        }
    }
    Err(VariantError::SampleExhausted {
        target: target.to_string(),
        n_subs,
        tries: max_tries,
    })
}

/// `n` double substitution variants drawn independently, repeats allowed.
pub fn n_double_variants<R: Rng>(
    target: &str,
    n: usize,
    costs: &CostVector,
    rng: &mut R,
    max_tries: usize,
) -> Result<Vec<Variant>, VariantError> {
    (0..n)
        .map(|_| sample_variant(target, 2, 0..target.len(), costs, rng, max_tries))
        .collect()
}

/// Exactly `count` variants split across substitution regions: 8% left
/// unmodified, 12% single substitutions in the tail, 20% in the middle, 20%
/// in the seed and the remainder doubles. Repeats are not accepted, and
/// slots that cannot be filled with distinct variants hold the unmodified
/// target.
pub fn fractioned_variants<R: Rng>(
    target: &str,
    count: usize,
    costs: &CostVector,
    rng: &mut R,
    max_tries: usize,
) -> Result<Vec<Variant>, VariantError> {
    costs.check(target)?;
    let tail_count = (count as f64 * 0.2 * 0.6) as usize;
    let middle_count = (count as f64 * 0.2) as usize;
    let seed_count = (count as f64 * 0.2) as usize;
    let orig_count = (count as f64 * 0.2 * 0.4) as usize;
    let double_count = count.saturating_sub(orig_count + tail_count + middle_count + seed_count);

    let tiers = costs.tiers();
    let phases = [
        (2, 0..target.len(), double_count),
        (1, tiers.tail, tail_count),
        (1, tiers.middle, middle_count),
        (1, tiers.seed, seed_count),
    ];

    let mut seen = FnvHashSet::default();
    let mut variants = Vec::with_capacity(count);
    for (n_subs, within, wanted) in phases {
        if within.len() < n_subs {
            continue;
        }
        let goal = variants.len() + wanted;
        let mut tries = 0;
        while variants.len() < goal && tries < max_tries {
            tries += 1;
            let variant = sample_variant(target, n_subs, within.clone(), costs, rng, max_tries)?;
            if seen.insert(variant.sequence.clone()) {
                variants.push(variant);
            }
        }
        if variants.len() < goal {
            log::debug!("Ran out of distinct {n_subs}-substitution variants in {within:?}");
        }
    }
    while variants.len() < count {
        variants.push(Variant {
            sequence: target.to_ascii_uppercase(),
            positions: Vec::new(),
            cost: 0,
        });
    }
    Ok(variants)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Regime {
    /// All single substitutions plus sampled doubles
    Exhaustive,
    /// A fixed number of variants split across substitution regions
    Fractioned,
}

/// Expands a catalogue of canonical targets with their variants.
pub struct VariantOptions {
    costs: CostVector,
    samples: usize,
    regime: Regime,
    rng: SmallRng,
    max_tries: usize,
    progress: bool,
}

impl Default for VariantOptions {
    fn default() -> Self {
        Self {
            costs: CostVector::default(),
            samples: 20,
            regime: Regime::Exhaustive,
            rng: SmallRng::seed_from_u64(2456),
            max_tries: MAX_TRIES,
            progress: false,
        }
    }
}

impl VariantOptions {
    pub fn costs(&mut self, costs: CostVector) -> &mut Self {
        self.costs = costs;
        self
    }

    /// Number of doubles per target for [Regime::Exhaustive], total variants
    /// per target for [Regime::Fractioned]
    pub fn samples(&mut self, samples: usize) -> &mut Self {
        self.samples = samples;
        self
    }

    pub fn regime(&mut self, regime: Regime) -> &mut Self {
        self.regime = regime;
        self
    }

    pub fn seed(&mut self, seed: u64) -> &mut Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    pub fn max_tries(&mut self, max_tries: usize) -> &mut Self {
        self.max_tries = max_tries;
        self
    }

    pub fn progress(&mut self, progress: bool) -> &mut Self {
        self.progress = progress;
        self
    }

    fn variants_of(&mut self, target: &Target) -> Result<Vec<Variant>, VariantError> {
        let seq = target.sequence.as_str();
        match self.regime {
            Regime::Exhaustive => {
                let mut acc = all_single_variants(seq, &self.costs)?;
                acc.extend(n_double_variants(
                    seq,
                    self.samples,
                    &self.costs,
                    &mut self.rng,
                    self.max_tries,
                )?);
                Ok(acc)
            }
            Regime::Fractioned => fractioned_variants(
                seq,
                self.samples,
                &self.costs,
                &mut self.rng,
                self.max_tries,
            ),
        }
    }

    /// Each canonical target followed by its variants. Variants keep the
    /// location of their parent, so a variant equal to another entry
    /// overwrites it.
    pub fn run(&mut self, raw: &Catalogue) -> Result<Catalogue> {
        let pb = if self.progress {
            let style = ProgressStyle::with_template(
                "{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}",
            )?;
            ProgressBar::new(raw.len() as u64)
                .with_style(style)
                .with_message("Varying targets")
        } else {
            ProgressBar::hidden()
        };
        let mut all_targets = Catalogue::new();
        for target in pb.wrap_iter(raw.iter()) {
            all_targets.insert(target.clone());
            for variant in self.variants_of(target)? {
                all_targets.insert(target.variant(variant.sequence, variant.cost));
            }
        }
        pb.finish_and_clear();
        log::info!("{} all targets.", all_targets.len());
        Ok(all_targets)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    const GUIDE: &str = "ACGTACGTACGTACGTACGT";

    fn n_diffs(a: &str, b: &str) -> Vec<usize> {
        a.bytes()
            .zip(b.bytes())
            .enumerate()
            .filter(|(_, (x, y))| x != y)
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn test_all_single_variants() {
        let costs = CostVector::default();
        let variants = all_single_variants(GUIDE, &costs).unwrap();
        assert_eq!(variants.len(), 3 * GUIDE.len());
        for v in variants.iter() {
            let diffs = n_diffs(GUIDE, &v.sequence);
            assert_eq!(diffs.len(), 1);
            assert_eq!(diffs, v.positions);
            assert_eq!(v.cost, COST_VECTOR[diffs[0]]);
        }
        // position major, then ATCG order skipping the original A
        assert_eq!(variants[0].sequence, "TCGTACGTACGTACGTACGT");
        assert_eq!(variants[1].sequence, "CCGTACGTACGTACGTACGT");
        assert_eq!(variants[2].sequence, "GCGTACGTACGTACGTACGT");
        assert_eq!(variants[3].positions, vec![1]);
    }

    #[test]
    fn test_length_mismatch() {
        let costs = CostVector::default();
        let err = all_single_variants("ACGT", &costs).unwrap_err();
        assert_eq!(
            err,
            VariantError::LengthMismatch {
                target: "ACGT".to_string(),
                found: 4,
                expected: 20
            }
        );
        let mut rng = SmallRng::seed_from_u64(1);
        assert!(n_double_variants("ACGT", 3, &costs, &mut rng, MAX_TRIES).is_err());
    }

    #[test]
    fn test_double_variants() {
        let costs = CostVector::default();
        let mut rng = SmallRng::seed_from_u64(2456);
        let variants = n_double_variants(GUIDE, 200, &costs, &mut rng, MAX_TRIES).unwrap();
        assert_eq!(variants.len(), 200);
        for v in variants.iter() {
            let mut diffs = n_diffs(GUIDE, &v.sequence);
            assert_eq!(diffs.len(), 2);
            let mut positions = v.positions.clone();
            positions.sort_unstable();
            diffs.sort_unstable();
            assert_eq!(diffs, positions);
            assert_eq!(v.cost, COST_VECTOR[diffs[0]] + COST_VECTOR[diffs[1]]);
        }
    }

    #[test]
    fn test_doubles_reproducible() {
        let costs = CostVector::default();
        let mut a = SmallRng::seed_from_u64(7);
        let mut b = SmallRng::seed_from_u64(7);
        assert_eq!(
            n_double_variants(GUIDE, 10, &costs, &mut a, MAX_TRIES).unwrap(),
            n_double_variants(GUIDE, 10, &costs, &mut b, MAX_TRIES).unwrap()
        );
    }

    #[test]
    fn test_sample_exhausted() {
        let costs = CostVector::new(vec![1, 1]).unwrap();
        let mut rng = SmallRng::seed_from_u64(3);
        let err = sample_variant("AC", 2, 0..2, &costs, &mut rng, 0).unwrap_err();
        assert!(matches!(err, VariantError::SampleExhausted { tries: 0, .. }));
        let err = sample_variant("AC", 3, 0..2, &costs, &mut rng, 10).unwrap_err();
        assert!(matches!(err, VariantError::TooFewPositions { .. }));
    }

    #[test]
    fn test_tiers() {
        let tiers = CostVector::default().tiers();
        assert_eq!(
            tiers,
            Tiers {
                tail: 0..8,
                middle: 8..13,
                seed: 13..20
            }
        );
        let flat = CostVector::new(vec![5; 4]).unwrap().tiers();
        assert_eq!(flat.tail, 0..4);
        assert!(flat.middle.is_empty());
    }

    #[test]
    fn test_fractioned_variants() {
        let costs = CostVector::default();
        let mut rng = SmallRng::seed_from_u64(2456);
        let variants = fractioned_variants(GUIDE, 20, &costs, &mut rng, MAX_TRIES).unwrap();
        assert_eq!(variants.len(), 20);
        let singles: Vec<_> = variants.iter().filter(|v| v.positions.len() == 1).collect();
        let doubles = variants.iter().filter(|v| v.positions.len() == 2).count();
        let unmodified = variants.iter().filter(|v| v.positions.is_empty()).count();
        assert_eq!(doubles, 9);
        assert_eq!(singles.len(), 10);
        assert_eq!(unmodified, 1);
        assert_eq!(singles.iter().filter(|v| v.positions[0] < 8).count(), 2);
        assert_eq!(singles.iter().filter(|v| v.positions[0] >= 13).count(), 4);
    }

    #[test]
    fn test_fractioned_pads_when_pool_runs_out() {
        // only 3 * 8 tail singles exist, far fewer than requested
        let costs = CostVector::default();
        let mut rng = SmallRng::seed_from_u64(1);
        let variants = fractioned_variants(GUIDE, 500, &costs, &mut rng, 2_000).unwrap();
        assert_eq!(variants.len(), 500);
        let tail = variants
            .iter()
            .filter(|v| v.positions.len() == 1 && v.positions[0] < 8)
            .count();
        assert_eq!(tail, 24);
    }

    #[test]
    fn test_run_expands_catalogue() {
        let mut raw = Catalogue::new();
        raw.insert(Target::new(GUIDE, "AGG", "chrI", 1, false));
        raw.insert(Target::new("TTTTACGTACGTACGTACGT", "TGG", "chrI", 30, true));
        let mut opts = VariantOptions::default();
        opts.samples(5);
        let all = opts.run(&raw).unwrap();
        assert!(all.len() > 2 * 60);
        assert!(all.len() <= 2 * (1 + 60 + 5));
        assert_eq!(all.get_slot(0), raw.get_slot(0));
        assert!(all.iter().all(|t| t.weakness > 0 || raw.get(&t.key()).is_some()));
        assert!(all
            .iter()
            .all(|t| (t.chrom.as_str(), t.end - t.start) == ("chrI", 20)));
    }

    #[test]
    fn test_run_rejects_wrong_length() {
        let mut raw = Catalogue::new();
        raw.insert(Target::new("ACGT", "AGG", "chrI", 1, false));
        assert!(VariantOptions::default().run(&raw).is_err());
    }
}
