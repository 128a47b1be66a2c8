use std::path::PathBuf;

use clap::Parser;
use libguides::{
    genome::Genome,
    motif::{ExtractOptions, Motif},
    tsv,
    utils,
};

use crate::file::ValidPathBuf;

#[derive(Parser, Debug)]
pub struct ExtractCmd {
    /// Path to genome fasta file
    #[clap(short, long)]
    pub genome: ValidPathBuf,

    /// Path to output target file
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// PAM motif following each guide, N or . match any base
    #[clap(short, long, default_value_t = Motif::default())]
    pub motif: Motif,

    /// Length of the guide sequence in front of the motif
    #[clap(short = 'l', long, default_value_t = 20)]
    pub target_len: usize,
}

impl ExtractCmd {
    pub fn run(self) -> eyre::Result<()> {
        if self.target_len == 0 {
            return Err(eyre::eyre!("Target length must be greater than 0"));
        }
        let genome = Genome::from_path(&self.genome)?;
        let catalogue = ExtractOptions::default()
            .motif(self.motif)
            .target_len(self.target_len)
            .run(&genome);
        let output = self
            .output
            .unwrap_or_else(|| utils::suffixed_output(&self.genome, ".targets.raw.tsv"));
        tsv::save_targets(output, &catalogue)
    }
}
