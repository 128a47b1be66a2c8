//! Shuffled negative controls: guides with realistic base composition that
//! do not align anywhere in the genome.

use std::io::{BufWriter, Write};

use eyre::{Result, WrapErr};
use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};

use crate::{
    oracle::{write_reads, Alignment, Oracle, OracleError, ReadQualities},
    target::{Catalogue, Target},
};

/// Threshold of the single oracle pass, also the score given to controls
/// that survive it.
pub const CONTROL_THRESHOLD: u32 = 39;

#[derive(Debug, Clone)]
pub struct ControlOptions {
    needed: usize,
    threshold: u32,
    qualities: ReadQualities,
    rng: SmallRng,
}

impl Default for ControlOptions {
    fn default() -> Self {
        Self {
            needed: 100,
            threshold: CONTROL_THRESHOLD,
            qualities: ReadQualities::default(),
            rng: SmallRng::seed_from_u64(2456),
        }
    }
}

impl ControlOptions {
    pub fn needed(&mut self, needed: usize) -> &mut Self {
        self.needed = needed;
        self
    }

    pub fn threshold(&mut self, threshold: u32) -> &mut Self {
        self.threshold = threshold;
        self
    }

    pub fn qualities(&mut self, qualities: ReadQualities) -> &mut Self {
        self.qualities = qualities;
        self
    }

    pub fn seed(&mut self, seed: u64) -> &mut Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    /// Draw `needed` templates with replacement and shuffle each one's
    /// bases. Coordinates are kept from the template, so two draws that
    /// shuffle to the same sequence collapse into one control.
    pub fn shuffle_targets(&mut self, targets: &[Target]) -> Catalogue {
        let mut controls = Catalogue::new();
        if targets.is_empty() {
            log::warn!("No targets to build controls from");
            return controls;
        }
        for _ in 0..self.needed {
            let template = match targets.choose(&mut self.rng) {
                Some(t) => t,
                None => break,
            };
            let mut bases = template.sequence.clone().into_bytes();
            bases.shuffle(&mut self.rng);
            let mut control = template.variant(String::from_utf8_lossy(&bases), template.weakness);
            control.specificity = 0;
            controls.insert(control);
        }
        log::info!("{} shuffled controls.", controls.len());
        controls
    }

    /// Keep the controls that do not align at all at the control threshold,
    /// scored with that threshold.
    pub fn evaluate<O: Oracle + ?Sized>(
        &self,
        controls: Catalogue,
        oracle: &O,
    ) -> Result<Vec<Target>> {
        oracle.prepare()?;
        let mut reads = tempfile::Builder::new().suffix(".fq").tempfile()?;
        {
            let mut writer = BufWriter::new(reads.as_file_mut());
            write_reads(&controls, &self.qualities, &mut writer)?;
            writer.flush()?;
        }
        let hits = oracle
            .align(reads.path(), self.threshold)
            .wrap_err("Alignment pass for controls failed")?;

        let mut unaligned = vec![false; controls.len()];
        for (name, alignment) in hits {
            let idx = name
                .parse::<usize>()
                .ok()
                .filter(|&idx| idx < unaligned.len())
                .ok_or(OracleError::UnknownRead(name))?;
            if alignment == Alignment::Unaligned {
                unaligned[idx] = true;
            }
        }
        let specific: Vec<Target> = controls
            .into_iter()
            .zip(unaligned)
            .filter_map(|(mut control, keep)| {
                keep.then(|| {
                    control.specificity = self.threshold as i32;
                    control
                })
            })
            .collect();
        log::info!("{} controls do not align.", specific.len());
        Ok(specific)
    }

    pub fn run<O: Oracle + ?Sized>(&mut self, targets: &[Target], oracle: &O) -> Result<Vec<Target>> {
        let controls = self.shuffle_targets(targets);
        self.evaluate(controls, oracle)
    }
}

#[cfg(test)]
mod test {
    use std::path::Path;

    use itertools::Itertools;
    use pretty_assertions::assert_eq;

    use super::*;

    /// Leaves every even read unaligned.
    struct EvenOracle;

    impl Oracle for EvenOracle {
        fn prepare(&self) -> Result<()> {
            Ok(())
        }

        fn align(&self, reads: &Path, threshold: u32) -> Result<Vec<(String, Alignment)>> {
            assert_eq!(threshold, CONTROL_THRESHOLD);
            let text = std::fs::read_to_string(reads)?;
            Ok(text
                .lines()
                .step_by(4)
                .map(|l| l.trim_start_matches('@').to_string())
                .map(|name| {
                    let idx: usize = name.parse().unwrap();
                    let alignment = if idx % 2 == 0 {
                        Alignment::Unaligned
                    } else {
                        Alignment::Unique
                    };
                    (name, alignment)
                })
                .collect())
        }
    }

    fn templates() -> Vec<Target> {
        vec![
            Target::new("AAAAACCCCCGGGGGTTTTT", "AGG", "chrI", 1, false),
            Target::new("ACACACACACGTGTGTGTGT", "TGG", "chrI", 101, true),
        ]
    }

    #[test]
    fn test_shuffle_keeps_composition() {
        let mut opts = ControlOptions::default();
        opts.needed(10);
        let controls = opts.shuffle_targets(&templates());
        assert!(!controls.is_empty());
        assert!(controls.len() <= 10);
        for c in controls.iter() {
            let template = templates()
                .into_iter()
                .find(|t| t.start == c.start)
                .unwrap();
            let sorted = |s: &str| s.chars().sorted().collect::<String>();
            assert_eq!(sorted(&c.sequence), sorted(&template.sequence));
            assert_eq!(c.pam, template.pam);
            assert_eq!(c.specificity, 0);
        }
    }

    #[test]
    fn test_shuffle_is_seeded() {
        let a = ControlOptions::default().needed(5).shuffle_targets(&templates());
        let b = ControlOptions::default().needed(5).shuffle_targets(&templates());
        assert_eq!(a, b);
    }

    #[test]
    fn test_shuffle_empty_input() {
        let controls = ControlOptions::default().shuffle_targets(&[]);
        assert!(controls.is_empty());
    }

    #[test]
    fn test_evaluate_keeps_unaligned() {
        let controls: Catalogue = templates().into_iter().collect();
        let kept = ControlOptions::default()
            .evaluate(controls, &EvenOracle)
            .unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].start, 1);
        assert_eq!(kept[0].specificity, 39);
    }
}
