use fnv::FnvHashMap;

use crate::{controls::CONTROL_THRESHOLD, target::Target};

/// Keeps targets whose sequence also appears in a comparison library, with
/// both copies scored at exactly the required specificity.
pub struct MatchFilter {
    comparisons: FnvHashMap<String, i32>,
    specificity: i32,
}

impl MatchFilter {
    /// Later comparison targets with the same sequence replace earlier ones.
    pub fn new<'a, I>(comparisons: I, specificity: i32) -> Self
    where
        I: IntoIterator<Item = &'a Target>,
    {
        let comparisons = comparisons
            .into_iter()
            .map(|t| (t.sequence.clone(), t.specificity))
            .collect();
        Self {
            comparisons,
            specificity,
        }
    }

    pub fn keeps(&self, target: &Target) -> bool {
        target.specificity == self.specificity
            && self.comparisons.get(&target.sequence) == Some(&self.specificity)
    }

    pub fn run(&self, targets: Vec<Target>) -> Vec<Target> {
        let n = targets.len();
        let kept: Vec<Target> = targets.into_iter().filter(|t| self.keeps(t)).collect();
        log::info!("Kept {} of {n} targets with a matched comparison", kept.len());
        kept
    }
}

impl Default for MatchFilter {
    fn default() -> Self {
        Self {
            comparisons: FnvHashMap::default(),
            specificity: CONTROL_THRESHOLD as i32,
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    fn scored(seq: &str, start: u64, specificity: i32) -> Target {
        let mut t = Target::new(seq, "AGG", "chrI", start, false);
        t.specificity = specificity;
        t
    }

    #[test]
    fn test_match_filter() {
        let comparisons = vec![
            scored("AAAA", 1, 39),
            scored("CCCC", 1, 20),
            scored("GGGG", 1, 10),
            scored("GGGG", 50, 39),
        ];
        let filter = MatchFilter::new(&comparisons, 39);
        let targets = vec![
            scored("AAAA", 900, 39),
            scored("AAAA", 901, 38),
            scored("CCCC", 900, 39),
            scored("GGGG", 900, 39),
            scored("TTTT", 900, 39),
        ];
        let kept: Vec<_> = filter
            .run(targets)
            .into_iter()
            .map(|t| (t.sequence, t.start))
            .collect();
        assert_eq!(
            kept,
            vec![("AAAA".to_string(), 900), ("GGGG".to_string(), 900)]
        );
    }

    #[test]
    fn test_empty_comparisons_keep_nothing() {
        let filter = MatchFilter::default();
        assert!(!filter.keeps(&scored("AAAA", 1, 39)));
    }
}
