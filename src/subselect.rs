//! Per-gene selection of a small, spread out, specific set of guides.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use eyre::{Result, WrapErr};
use fnv::{FnvHashMap, FnvHashSet};
use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};
use thiserror::Error;

use crate::target::Target;

pub const THRESHOLDS: [i32; 4] = [30, 20, 10, 0];
pub const MIN_SPACING: i64 = 20;
pub const POSITIONAL_COUNT: usize = 3;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SubselectError {
    #[error("Policy must request at least one target")]
    NothingWanted,
    #[error("Policy needs at least one specificity threshold")]
    NoThresholds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strand {
    Sense,
    Antisense,
}

impl Strand {
    fn holds(&self, target: &Target) -> bool {
        let sense = target.sense_strand == Some(true);
        match self {
            Strand::Sense => sense,
            Strand::Antisense => !sense,
        }
    }
}

/// Policy names accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PolicyName {
    /// Spaced guides on the antisense strand, topped up from the sense strand
    Antisense,
    /// Spaced guides on the sense (template) strand only
    Template,
    /// One guide near each end of the gene and one in the middle
    Positional,
    /// Uniform random sample, ignores strand and specificity
    Random,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Policy {
    Spaced {
        strand: Strand,
        wanted: usize,
        min_spacing: i64,
        thresholds: Vec<i32>,
        fallback_other_strand: bool,
    },
    Positional {
        thresholds: Vec<i32>,
    },
    Random {
        wanted: usize,
    },
}

impl Policy {
    pub fn antisense(wanted: usize) -> Self {
        Policy::Spaced {
            strand: Strand::Antisense,
            wanted,
            min_spacing: MIN_SPACING,
            thresholds: THRESHOLDS.to_vec(),
            fallback_other_strand: true,
        }
    }

    pub fn template(wanted: usize) -> Self {
        Policy::Spaced {
            strand: Strand::Sense,
            wanted,
            min_spacing: MIN_SPACING,
            thresholds: THRESHOLDS.to_vec(),
            fallback_other_strand: false,
        }
    }

    pub fn positional() -> Self {
        Policy::Positional {
            thresholds: THRESHOLDS.to_vec(),
        }
    }

    pub fn random(wanted: usize) -> Self {
        Policy::Random { wanted }
    }

    pub fn from_name(name: PolicyName, wanted: usize) -> Self {
        match name {
            PolicyName::Antisense => Policy::antisense(wanted),
            PolicyName::Template => Policy::template(wanted),
            PolicyName::Positional => Policy::positional(),
            PolicyName::Random => Policy::random(wanted),
        }
    }

    pub fn wanted(&self) -> usize {
        match self {
            Policy::Spaced { wanted, .. } | Policy::Random { wanted } => *wanted,
            Policy::Positional { .. } => POSITIONAL_COUNT,
        }
    }

    fn check(&self) -> Result<(), SubselectError> {
        if self.wanted() == 0 {
            return Err(SubselectError::NothingWanted);
        }
        match self {
            Policy::Spaced { thresholds, .. } | Policy::Positional { thresholds }
                if thresholds.is_empty() =>
            {
                Err(SubselectError::NoThresholds)
            }
            _ => Ok(()),
        }
    }
}

fn offset(target: &Target) -> i64 {
    target.offset.unwrap_or_default()
}

/// Split offset-sorted targets into those at least `min_spacing` past the
/// previously kept one and the rest.
pub fn partition_overlapping<'a>(
    targets: &[&'a Target],
    min_spacing: i64,
) -> (Vec<&'a Target>, Vec<&'a Target>) {
    let mut spaced: Vec<&Target> = Vec::new();
    let mut overlapped = Vec::new();
    for &t in targets {
        let clear = spaced
            .last()
            .map_or(true, |prev| offset(t) >= offset(prev) + min_spacing);
        if clear {
            spaced.push(t);
        } else {
            overlapped.push(t);
        }
    }
    (spaced, overlapped)
}

fn select_spaced<'a>(
    sorted: &[&'a Target],
    strand: Strand,
    wanted: usize,
    min_spacing: i64,
    thresholds: &[i32],
    fallback_other_strand: bool,
) -> Vec<&'a Target> {
    let (primary, other): (Vec<&Target>, Vec<&Target>) =
        sorted.iter().copied().partition(|t| strand.holds(t));

    let mut specific = Vec::new();
    let mut nonspecific = Vec::new();
    for &threshold in thresholds {
        (specific, nonspecific) = primary
            .iter()
            .copied()
            .partition(|t| t.specificity > threshold);
        let (mut spaced, overlapped) = partition_overlapping(&specific, min_spacing);
        if spaced.len() >= wanted {
            spaced.truncate(wanted);
            return spaced;
        }
        if specific.len() >= wanted {
            let needed = wanted - spaced.len();
            spaced.extend(overlapped.into_iter().take(needed));
            return spaced;
        }
    }

    if primary.len() >= wanted || !fallback_other_strand {
        let needed = wanted.saturating_sub(specific.len());
        specific.extend(nonspecific.into_iter().take(needed));
        return specific;
    }
    let needed = wanted - primary.len();
    let mut chosen = primary;
    chosen.extend(other.into_iter().take(needed));
    chosen
}

fn select_positional<'a>(sorted: &[&'a Target], thresholds: &[i32]) -> Vec<&'a Target> {
    let qualifying = thresholds
        .iter()
        .map(|&threshold| {
            sorted
                .iter()
                .copied()
                .filter(|t| t.specificity > threshold)
                .collect::<Vec<_>>()
        })
        .find(|q| q.len() >= POSITIONAL_COUNT)
        .unwrap_or_else(|| sorted.to_vec());

    if qualifying.len() < POSITIONAL_COUNT {
        return qualifying;
    }
    let first = qualifying[0];
    let last = qualifying[qualifying.len() - 1];
    let mid = (offset(first) + offset(last)) / 2;
    let inner = &qualifying[1..qualifying.len() - 1];
    let middle = inner
        .iter()
        .copied()
        .min_by_key(|t| (offset(t) - mid).abs())
        .unwrap_or(inner[0]);
    vec![first, middle, last]
}

/// Applies a [Policy] to one gene's targets at a time.
#[derive(Debug, Clone)]
pub struct Subselector {
    policy: Policy,
    rng: SmallRng,
}

impl Subselector {
    pub fn new(policy: Policy, seed: u64) -> Result<Self, SubselectError> {
        policy.check()?;
        Ok(Self {
            policy,
            rng: SmallRng::seed_from_u64(seed),
        })
    }

    /// Choose at most the policy's wanted count of targets labeled with
    /// `gene`, ordered by the policy. Targets from other genes are ignored.
    pub fn select(&mut self, gene: &str, group: &[Target]) -> Vec<Target> {
        let mut sorted: Vec<&Target> = group
            .iter()
            .filter(|t| t.gene.as_deref() == Some(gene))
            .collect();
        if sorted.len() < group.len() {
            log::warn!(
                "Ignoring {} targets not labeled with {gene}",
                group.len() - sorted.len()
            );
        }
        sorted.sort_by_key(|t| offset(t));

        let chosen = match &self.policy {
            Policy::Spaced {
                strand,
                wanted,
                min_spacing,
                thresholds,
                fallback_other_strand,
            } => select_spaced(
                &sorted,
                *strand,
                *wanted,
                *min_spacing,
                thresholds,
                *fallback_other_strand,
            ),
            Policy::Positional { thresholds } => select_positional(&sorted, thresholds),
            Policy::Random { wanted } => sorted
                .choose_multiple(&mut self.rng, *wanted)
                .copied()
                .collect(),
        };
        let wanted = self.policy.wanted();
        if chosen.len() < wanted {
            log::warn!(
                "Only found {} of {wanted} targets for gene {gene}",
                chosen.len()
            );
        }
        chosen.into_iter().cloned().collect()
    }
}

/// Which genes take part in subselection.
#[derive(Debug, Clone, Default)]
pub enum GeneFilter {
    #[default]
    All,
    Only(FnvHashSet<String>),
    Except(FnvHashSet<String>),
}

impl GeneFilter {
    pub fn new(genes: Option<Vec<String>>, exclude: bool) -> Self {
        match genes {
            None => GeneFilter::All,
            Some(genes) if exclude => GeneFilter::Except(genes.into_iter().collect()),
            Some(genes) => GeneFilter::Only(genes.into_iter().collect()),
        }
    }

    pub fn keeps(&self, gene: &str) -> bool {
        match self {
            GeneFilter::All => true,
            GeneFilter::Only(genes) => genes.contains(gene),
            GeneFilter::Except(genes) => !genes.contains(gene),
        }
    }
}

/// One gene name per line, blank lines ignored.
pub fn read_gene_list<R: BufRead>(reader: R) -> std::io::Result<Vec<String>> {
    let mut genes = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let gene = line.trim();
        if !gene.is_empty() {
            genes.push(gene.to_string());
        }
    }
    Ok(genes)
}

pub fn load_gene_list<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let file = File::open(path).wrap_err_with(|| format!("Failed to open {}", path.display()))?;
    let genes = read_gene_list(BufReader::new(file))?;
    log::info!("Read {} genes from {}", genes.len(), path.display());
    Ok(genes)
}

/// Group labeled targets by gene in order of first appearance. Unlabeled
/// targets and genes rejected by `filter` are dropped.
pub fn group_by_gene(targets: Vec<Target>, filter: &GeneFilter) -> Vec<(String, Vec<Target>)> {
    let mut slots: FnvHashMap<String, usize> = FnvHashMap::default();
    let mut groups: Vec<(String, Vec<Target>)> = Vec::new();
    for target in targets {
        let gene = match &target.gene {
            Some(gene) if filter.keeps(gene) => gene.clone(),
            _ => continue,
        };
        match slots.get(&gene) {
            Some(&idx) => groups[idx].1.push(target),
            None => {
                slots.insert(gene.clone(), groups.len());
                groups.push((gene, vec![target]));
            }
        }
    }
    groups
}

/// Run `selector` over every gene group and concatenate the results.
pub fn subselect_library(
    targets: Vec<Target>,
    filter: &GeneFilter,
    selector: &mut Subselector,
) -> Vec<Target> {
    let groups = group_by_gene(targets, filter);
    log::info!("Selecting targets for {} genes", groups.len());
    let mut chosen = Vec::new();
    for (i, (gene, group)) in groups.iter().enumerate() {
        if i % 500 == 0 {
            log::info!("Selecting targets for gene {gene}");
        }
        chosen.extend(selector.select(gene, group));
    }
    log::info!("{} chosen targets.", chosen.len());
    chosen
}
