use std::path::PathBuf;

use clap::Parser;
use libguides::{
    controls::{ControlOptions, CONTROL_THRESHOLD},
    tsv,
    utils,
};

use super::OracleArgs;
use crate::file::ValidPathBuf;

#[derive(Parser, Debug)]
pub struct ControlsCmd {
    /// Target file whose guides are shuffled into controls
    #[clap(short, long)]
    pub input: ValidPathBuf,

    /// Path to genome fasta file the controls must not align to
    #[clap(short, long)]
    pub genome: ValidPathBuf,

    /// Path to output target file
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Number of shuffled guides to draw before filtering
    #[clap(short, long, default_value_t = 100)]
    pub needed: usize,

    /// Dissimilarity threshold controls are tested at
    #[clap(short, long, default_value_t = CONTROL_THRESHOLD)]
    pub threshold: u32,

    /// Seed for drawing and shuffling guides
    #[clap(long, default_value_t = 2456)]
    pub seed: u64,

    #[clap(flatten)]
    pub oracle: OracleArgs,
}

impl ControlsCmd {
    pub fn run(self) -> eyre::Result<()> {
        let targets = tsv::load_targets(&self.input)?;
        let mut bowtie = self.oracle.bowtie(&self.genome)?;
        bowtie.tryhard(true).chunkmbs(256);
        let controls = ControlOptions::default()
            .needed(self.needed)
            .threshold(self.threshold)
            .seed(self.seed)
            .run(&targets, &bowtie)?;
        let output = self
            .output
            .unwrap_or_else(|| utils::tagged_output(&self.input, ".controls"));
        tsv::save_targets(output, &controls)
    }
}
