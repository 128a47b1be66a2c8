use std::path::PathBuf;

use clap::Parser;
use libguides::{
    subselect::{self, GeneFilter, Policy, PolicyName, Subselector},
    tsv,
    utils,
};

use crate::file::ValidPathBuf;

#[derive(Parser, Debug)]
pub struct SubselectCmd {
    /// Annotated target file, usually from guides annotate
    #[clap(short, long)]
    pub input: ValidPathBuf,

    /// Path to output target file
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// How targets are picked within each gene
    #[clap(short, long, value_enum)]
    pub policy: PolicyName,

    /// Number of targets wanted per gene, the positional policy always picks
    /// three
    #[clap(short, long, default_value_t = 3)]
    pub wanted: usize,

    /// File with one gene name per line, only these genes are used
    #[clap(long)]
    pub gene_list: Option<ValidPathBuf>,

    /// Use every gene except those in --gene-list
    #[clap(long, requires = "gene_list")]
    pub exclude_listed_genes: bool,

    /// Seed for the random policy
    #[clap(long, default_value_t = 2456)]
    pub seed: u64,
}

impl SubselectCmd {
    pub fn run(self) -> eyre::Result<()> {
        let targets = tsv::load_targets(&self.input)?;
        let genes = self
            .gene_list
            .as_ref()
            .map(subselect::load_gene_list)
            .transpose()?;
        let filter = GeneFilter::new(genes, self.exclude_listed_genes);
        let policy = Policy::from_name(self.policy, self.wanted);
        let mut selector = Subselector::new(policy, self.seed)?;
        let chosen = subselect::subselect_library(targets, &filter, &mut selector);
        let output = self
            .output
            .unwrap_or_else(|| utils::tagged_output(&self.input, ".sub"));
        tsv::save_targets(output, &chosen)
    }
}
