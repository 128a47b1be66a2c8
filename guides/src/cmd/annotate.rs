use std::path::PathBuf;

use clap::Parser;
use libguides::{
    annotate::{AnnotateOptions, Overlap},
    genome::Genome,
    region,
    target::Catalogue,
    tsv,
    utils,
};

use crate::file::ValidPathBuf;

#[derive(Parser, Debug)]
pub struct AnnotateCmd {
    /// Target file, usually from guides score
    #[clap(short, long)]
    pub input: ValidPathBuf,

    /// Path to genome fasta file, used for chromosome lengths
    #[clap(short, long)]
    pub genome: ValidPathBuf,

    /// Region file with name, chrom, start, end and strand columns, sorted
    /// by position within each chromosome
    #[clap(short, long)]
    pub regions: ValidPathBuf,

    /// Path to output target file
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Also output an unlabeled copy of every target, even those outside any
    /// region
    #[clap(long)]
    pub include_unlabeled: bool,

    /// Only label targets fully contained in a region
    #[clap(long)]
    pub only_fully_overlapping: bool,
}

impl AnnotateCmd {
    pub fn run(self) -> eyre::Result<()> {
        let targets = tsv::load_targets(&self.input)?;
        let catalogue = Catalogue::try_from_targets(targets)?;
        let chrom_lens = Genome::from_path(&self.genome)?.chrom_lens();
        let regions = region::load_regions(&self.regions)?;
        let overlap = if self.only_fully_overlapping {
            Overlap::Contained
        } else {
            Overlap::Partial
        };
        let annotated = AnnotateOptions::default()
            .overlap(overlap)
            .include_unlabeled(self.include_unlabeled)
            .run(&catalogue, &regions, &chrom_lens)?;
        let output = self
            .output
            .unwrap_or_else(|| utils::tagged_output(&self.input, ".annotated"));
        tsv::save_targets(output, &annotated)
    }
}
