//! The guide target record and the deduplicating catalogue every stage
//! passes along.

use std::fmt;

use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tsv::{orientation, sense, sentinel};

#[derive(Error, Debug)]
pub enum TargetError {
    #[error("Duplicate target in library: {0}")]
    DuplicateKey(TargetKey),
}

/// A candidate guide sequence next to its motif (PAM), plus the annotations
/// accumulated by each stage.
///
/// Coordinates are one-based with `end` exclusive, so `end - start` is
/// always the length of `sequence`. Field order here is the column order of
/// the tsv format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    #[serde(with = "sentinel")]
    pub gene: Option<String>,

    #[serde(with = "sentinel")]
    pub offset: Option<i64>,

    #[serde(rename = "target")]
    pub sequence: String,

    pub pam: String,

    pub chrom: String,

    pub start: u64,

    pub end: u64,

    #[serde(with = "orientation")]
    pub reverse: bool,

    #[serde(with = "sense")]
    pub sense_strand: Option<bool>,

    pub weakness: u32,

    pub specificity: i32,
}

impl Target {
    pub fn new<S, P, C>(sequence: S, pam: P, chrom: C, start: u64, reverse: bool) -> Self
    where
        S: Into<String>,
        P: Into<String>,
        C: Into<String>,
    {
        let sequence = sequence.into();
        let end = start + sequence.len() as u64;
        Self {
            gene: None,
            offset: None,
            sequence,
            pam: pam.into(),
            chrom: chrom.into(),
            start,
            end,
            reverse,
            sense_strand: None,
            weakness: 0,
            specificity: 0,
        }
    }

    pub fn key(&self) -> TargetKey {
        TargetKey {
            sequence: self.sequence.clone(),
            pam: self.pam.clone(),
            chrom: self.chrom.clone(),
            start: self.start,
            reverse: self.reverse,
        }
    }

    /// DNA sequence with trailing PAM in place.
    pub fn sequence_with_pam(&self) -> String {
        let mut full = String::with_capacity(self.sequence.len() + self.pam.len());
        full.push_str(&self.sequence);
        full.push_str(&self.pam);
        full
    }

    /// Copy of this target with a substituted sequence and the cost of the
    /// substitutions. Coordinates and strand are inherited unchanged.
    pub fn variant<S: Into<String>>(&self, sequence: S, weakness: u32) -> Self {
        let mut variant = self.clone();
        variant.sequence = sequence.into();
        variant.weakness = weakness;
        variant
    }
}

/// Identity of a target inside a [Catalogue].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetKey {
    pub sequence: String,
    pub pam: String,
    pub chrom: String,
    pub start: u64,
    pub reverse: bool,
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{};{};{};{};{}",
            self.sequence, self.pam, self.chrom, self.start, self.reverse
        )
    }
}

/// Insertion-ordered map from [TargetKey] to [Target].
///
/// Inserting a key that is already present overwrites the stored target in
/// its original slot, so iteration order only depends on first insertion.
/// Slot indices are stable and are used as read names when the catalogue is
/// handed to the alignment oracle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Catalogue {
    slots: FnvHashMap<TargetKey, usize>,
    targets: Vec<Target>,
}

impl Catalogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert with last-write-wins semantics, returning the replaced target.
    pub fn insert(&mut self, target: Target) -> Option<Target> {
        let key = target.key();
        if let Some(&idx) = self.slots.get(&key) {
            Some(std::mem::replace(&mut self.targets[idx], target))
        } else {
            self.slots.insert(key, self.targets.len());
            self.targets.push(target);
            None
        }
    }

    /// Build a catalogue from a target library that is expected to hold each
    /// key once, failing on the first repeat.
    pub fn try_from_targets<I>(targets: I) -> Result<Self, TargetError>
    where
        I: IntoIterator<Item = Target>,
    {
        let mut catalogue = Catalogue::new();
        for target in targets {
            let key = target.key();
            if catalogue.slots.contains_key(&key) {
                return Err(TargetError::DuplicateKey(key));
            }
            catalogue.insert(target);
        }
        Ok(catalogue)
    }

    pub fn get(&self, key: &TargetKey) -> Option<&Target> {
        self.slots.get(key).map(|&idx| &self.targets[idx])
    }

    pub fn get_slot(&self, idx: usize) -> Option<&Target> {
        self.targets.get(idx)
    }

    pub fn get_slot_mut(&mut self, idx: usize) -> Option<&mut Target> {
        self.targets.get_mut(idx)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Target> {
        self.targets.iter()
    }

    /// Mutable access to the stored targets. Callers must not change the
    /// fields making up the key.
    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, Target> {
        self.targets.iter_mut()
    }

    pub fn into_targets(self) -> Vec<Target> {
        self.targets
    }
}

impl FromIterator<Target> for Catalogue {
    fn from_iter<I: IntoIterator<Item = Target>>(iter: I) -> Self {
        let mut catalogue = Catalogue::new();
        for target in iter {
            catalogue.insert(target);
        }
        catalogue
    }
}

impl Extend<Target> for Catalogue {
    fn extend<I: IntoIterator<Item = Target>>(&mut self, iter: I) {
        for target in iter {
            self.insert(target);
        }
    }
}

impl IntoIterator for Catalogue {
    type Item = Target;
    type IntoIter = std::vec::IntoIter<Target>;

    fn into_iter(self) -> Self::IntoIter {
        self.targets.into_iter()
    }
}

impl<'a> IntoIterator for &'a Catalogue {
    type Item = &'a Target;
    type IntoIter = std::slice::Iter<'a, Target>;

    fn into_iter(self) -> Self::IntoIter {
        self.targets.iter()
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_new_target_coordinates() {
        let t = Target::new("ACGTACGTACGTACGTACGT", "AGG", "chrI", 101, false);
        assert_eq!(t.end - t.start, 20);
        assert_eq!(t.sequence_with_pam(), "ACGTACGTACGTACGTACGTAGG");
        assert!(t.gene.is_none());
        assert_eq!(t.weakness, 0);
        assert_eq!(t.specificity, 0);
    }

    #[test]
    fn test_insert_overwrites_in_place() {
        let mut catalogue = Catalogue::new();
        let a = Target::new("AAAA", "AGG", "chrI", 1, false);
        let b = Target::new("CCCC", "TGG", "chrI", 10, true);
        assert!(catalogue.insert(a.clone()).is_none());
        assert!(catalogue.insert(b.clone()).is_none());

        let mut a2 = a.clone();
        a2.specificity = 40;
        let old = catalogue.insert(a2.clone());
        assert_eq!(old, Some(a));
        assert_eq!(catalogue.len(), 2);
        assert_eq!(catalogue.get_slot(0), Some(&a2));
        assert_eq!(catalogue.get_slot(1), Some(&b));
    }

    #[test]
    fn test_key_ignores_annotations() {
        let a = Target::new("AAAA", "AGG", "chrI", 1, false);
        let mut b = a.clone();
        b.gene = Some("YAL001C".to_string());
        b.weakness = 10;
        assert_eq!(a.key(), b.key());

        let c = Target::new("AAAA", "AGG", "chrI", 1, true);
        assert_ne!(a.key(), c.key());
    }

    #[test]
    fn test_try_from_targets_rejects_duplicates() {
        let a = Target::new("AAAA", "AGG", "chrI", 1, false);
        let b = Target::new("AAAT", "AGG", "chrI", 1, false);
        assert!(Catalogue::try_from_targets(vec![a.clone(), b]).is_ok());
        let err = Catalogue::try_from_targets(vec![a.clone(), a]).unwrap_err();
        assert!(err.to_string().contains("AAAA;AGG;chrI;1;false"));
    }

    #[test]
    fn test_variant_inherits_location() {
        let t = Target::new("AAAA", "AGG", "chrII", 50, true);
        let v = t.variant("AATA", 19);
        assert_eq!(v.sequence, "AATA");
        assert_eq!(v.weakness, 19);
        assert_eq!((v.chrom.as_str(), v.start, v.end, v.reverse), ("chrII", 50, 54, true));
    }
}
