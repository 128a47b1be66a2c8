//! Label targets with the gene regions they fall in.
//!
//! Targets are bucketed per chromosome and sorted by `(start, end)`, then
//! each chromosome's regions sweep over its bucket with a pair of cursors
//! that only ever move forward.

use fnv::FnvHashMap;

use crate::{
    region::{validate_sorted, Region, RegionError},
    target::{Catalogue, Target},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Overlap {
    /// Any shared base counts as an overlap
    #[default]
    Partial,
    /// The target must lie entirely inside the region
    Contained,
}

impl Overlap {
    fn overlaps(&self, target: &Target, region: &Region) -> bool {
        match self {
            Overlap::Partial => target.start < region.end && target.end > region.start,
            Overlap::Contained => target.start >= region.start && target.end <= region.end,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnnotateOptions {
    overlap: Overlap,
    include_unlabeled: bool,
}

/// Sorted targets of one chromosome and the sweep cursors over them.
struct ChromArena<'a> {
    targets: Vec<&'a Target>,
    front: usize,
    back: usize,
}

impl<'a> ChromArena<'a> {
    fn new(mut targets: Vec<&'a Target>) -> Self {
        targets.sort_by_key(|t| (t.start, t.end));
        Self {
            targets,
            front: 0,
            back: 0,
        }
    }

    fn advance(&mut self, overlap: Overlap, region: &Region) -> &[&'a Target] {
        let n = self.targets.len();
        match overlap {
            Overlap::Partial => {
                while self.back < n && self.targets[self.back].start < region.end {
                    self.back += 1;
                }
                while self.front < n && self.targets[self.front].end <= region.start {
                    self.front += 1;
                }
            }
            Overlap::Contained => {
                while self.back < n && self.targets[self.back].end <= region.end {
                    self.back += 1;
                }
                while self.front < n && self.targets[self.front].start < region.start {
                    self.front += 1;
                }
            }
        }
        if self.front < self.back {
            &self.targets[self.front..self.back]
        } else {
            &[]
        }
    }
}

/// Copy of `target` labeled with `region`. The offset is measured from the
/// region's 5' end on its own strand.
pub fn label(target: &Target, region: &Region) -> Target {
    let offset = if region.reverse {
        region.end as i64 - target.end as i64
    } else {
        target.start as i64 - region.start as i64
    };
    let mut labeled = target.clone();
    labeled.gene = Some(region.name.clone());
    labeled.offset = Some(offset);
    labeled.sense_strand = Some(region.reverse == target.reverse);
    labeled
}

impl AnnotateOptions {
    pub fn overlap(&mut self, overlap: Overlap) -> &mut Self {
        self.overlap = overlap;
        self
    }

    pub fn include_unlabeled(&mut self, include_unlabeled: bool) -> &mut Self {
        self.include_unlabeled = include_unlabeled;
        self
    }

    /// Returns one labeled copy per (target, region) overlap, preceded by an
    /// unlabeled copy of every target when `include_unlabeled` is set.
    /// Regions must be sorted by position within each chromosome.
    pub fn run(
        &self,
        catalogue: &Catalogue,
        regions: &[Region],
        chrom_lens: &FnvHashMap<String, u64>,
    ) -> Result<Vec<Target>, RegionError> {
        validate_sorted(regions)?;
        log::info!("Labeling targets based on {} regions", regions.len());

        let mut annotated = Vec::new();
        let mut by_chrom: FnvHashMap<&str, Vec<&Target>> = FnvHashMap::default();
        for target in catalogue.iter() {
            by_chrom.entry(target.chrom.as_str()).or_default().push(target);
            if self.include_unlabeled {
                annotated.push(target.clone());
            }
        }
        let mut arenas: FnvHashMap<&str, ChromArena> = by_chrom
            .into_iter()
            .map(|(chrom, targets)| (chrom, ChromArena::new(targets)))
            .collect();

        for (i, region) in regions.iter().enumerate() {
            if i % 100 == 0 {
                log::debug!("Examining gene {i} [{}]", region.name);
            }
            let chrom_len = match chrom_lens.get(&region.chrom) {
                Some(&len) => len,
                None => {
                    log::warn!(
                        "Region {} is on unknown sequence {}, skipping",
                        region.name,
                        region.chrom
                    );
                    continue;
                }
            };
            if region.start >= chrom_len {
                continue;
            }
            let hits: Vec<&Target> = match arenas.get_mut(region.chrom.as_str()) {
                Some(arena) => arena
                    .advance(self.overlap, region)
                    .iter()
                    .copied()
                    .filter(|t| self.overlap.overlaps(t, region))
                    .collect(),
                None => Vec::new(),
            };
            if hits.is_empty() {
                log::warn!("No overlapping targets for gene {}.", region.name);
            }
            annotated.extend(hits.into_iter().map(|t| label(t, region)));
        }
        log::info!("{} annotated targets.", annotated.len());
        Ok(annotated)
    }
}
