use std::path::PathBuf;

use clap::Parser;
use libguides::{
    oracle::ReadQualities,
    specificity::{SpecificityOptions, THRESHOLDS},
    target::Catalogue,
    tsv,
    utils,
    variants::CostVector,
};

use super::OracleArgs;
use crate::file::ValidPathBuf;

#[derive(Parser, Debug)]
pub struct ScoreCmd {
    /// Target file, usually from guides vary
    #[clap(short, long)]
    pub input: ValidPathBuf,

    /// Path to genome fasta file, a bowtie index is built next to it if
    /// missing
    #[clap(short, long)]
    pub genome: ValidPathBuf,

    /// Path to output target file
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Dissimilarity thresholds to test, separated by commas
    #[clap(short, long, num_args=1.., value_delimiter=',', default_values_t = THRESHOLDS)]
    pub thresholds: Vec<u32>,

    /// Comma separated substitution cost of each guide position, used as the
    /// base qualities of the guide part of each read
    #[clap(long, default_value_t = CostVector::default())]
    pub costs: CostVector,

    /// Base qualities given to the PAM part of each read
    #[clap(long, default_value = "!4I")]
    pub pam_qualities: String,

    #[clap(flatten)]
    pub oracle: OracleArgs,
}

impl ScoreCmd {
    pub fn run(self) -> eyre::Result<()> {
        let targets = tsv::load_targets(&self.input)?;
        let mut catalogue = Catalogue::try_from_targets(targets)?;
        let bowtie = self.oracle.bowtie(&self.genome)?;
        SpecificityOptions::default()
            .thresholds(self.thresholds)
            .qualities(ReadQualities::new(&self.costs, &self.pam_qualities))
            .run(&mut catalogue, &bowtie)?;
        let output = self
            .output
            .unwrap_or_else(|| utils::tagged_output(&self.input, ".scored"));
        tsv::save_targets(output, &catalogue)
    }
}
