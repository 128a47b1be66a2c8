use std::path::PathBuf;

use clap::Parser;
use libguides::{
    target::Catalogue,
    tsv,
    utils,
    variants::{CostVector, Regime, VariantOptions},
};

use crate::file::ValidPathBuf;

#[derive(Parser, Debug)]
pub struct VaryCmd {
    /// Target file, usually from guides extract
    #[clap(short, long)]
    pub input: ValidPathBuf,

    /// Path to output target file
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// How variants are generated for each target
    #[clap(long, value_enum, default_value_t = Regime::Exhaustive)]
    pub regime: Regime,

    /// Double substitution variants per target for the exhaustive regime,
    /// or the total number of variants per target for the fractioned regime
    #[clap(short = 'n', long, default_value_t = 20)]
    pub double_variants: usize,

    /// Comma separated substitution cost of each guide position, must have
    /// one entry per base of the guides
    #[clap(long, default_value_t = CostVector::default())]
    pub costs: CostVector,

    /// Seed for sampling variants
    #[clap(long, default_value_t = 2456)]
    pub seed: u64,

    /// Show a progress bar
    #[clap(long)]
    pub progress: bool,
}

impl VaryCmd {
    pub fn run(self) -> eyre::Result<()> {
        let targets = tsv::load_targets(&self.input)?;
        let raw = Catalogue::try_from_targets(targets)?;
        let all_targets = VariantOptions::default()
            .costs(self.costs)
            .samples(self.double_variants)
            .regime(self.regime)
            .seed(self.seed)
            .progress(self.progress)
            .run(&raw)?;
        let output = self
            .output
            .unwrap_or_else(|| utils::tagged_output(&self.input, ".vary"));
        tsv::save_targets(output, &all_targets)
    }
}
