use std::path::PathBuf;

use clap::Parser;
use eyre::WrapErr;
use libguides::{
    annotate::{AnnotateOptions, Overlap},
    genome::Genome,
    motif::{ExtractOptions, Motif},
    region,
    specificity::SpecificityOptions,
    tsv,
    utils,
    variants::VariantOptions,
};
use log::LevelFilter;

use crate::{cmd::OracleArgs, file::ValidPathBuf};

#[derive(Parser, Debug)]
pub struct BuildCmd {
    /// Path to genome fasta file
    #[clap(short, long)]
    genome: ValidPathBuf,

    /// Region file with name, chrom, start, end and strand columns
    #[clap(short, long)]
    regions: ValidPathBuf,

    /// Path to output target file, defaults to {genome}.targets.all.tsv
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[clap(long)]
    log_file: Option<PathBuf>,

    /// PAM motif following each guide
    #[clap(short, long, default_value_t = Motif::default())]
    motif: Motif,

    /// Output targets even if they overlap no region
    #[clap(long)]
    include_unlabeled: bool,

    /// Only label targets fully contained in a region
    #[clap(long)]
    only_fully_overlapping: bool,

    /// Double substitution variants sampled per target
    #[clap(long, default_value_t = 20)]
    double_variants: usize,

    /// Seed for sampling variants
    #[clap(long, default_value_t = 2456)]
    seed: u64,

    #[clap(flatten)]
    oracle: OracleArgs,
}

impl BuildCmd {
    fn init_logging(&self, log_level_filter: LevelFilter) -> eyre::Result<()> {
        if let Some(log_file) = &self.log_file {
            simple_logging::log_to_file(log_file, LevelFilter::Info)
                .wrap_err_with(|| format!("Failed to open log file {}", log_file.display()))?;
        } else {
            env_logger::Builder::new()
                .filter_level(log_level_filter)
                .init();
        }
        Ok(())
    }

    pub fn run(self, log_level_filter: LevelFilter) -> eyre::Result<()> {
        self.init_logging(log_level_filter)?;
        log::info!("{self:?}");

        let output = self
            .output
            .clone()
            .unwrap_or_else(|| utils::suffixed_output(&self.genome, ".targets.all.tsv"));
        let genome = Genome::from_path(&self.genome)?;
        let regions = region::load_regions(&self.regions)?;
        region::validate_sorted(&regions)?;

        let raw = ExtractOptions::default()
            .motif(self.motif.clone())
            .run(&genome);
        let mut all_targets = VariantOptions::default()
            .samples(self.double_variants)
            .seed(self.seed)
            .progress(self.log_file.is_none())
            .run(&raw)?;

        let bowtie = self.oracle.bowtie(&self.genome)?;
        SpecificityOptions::default().run(&mut all_targets, &bowtie)?;

        let overlap = if self.only_fully_overlapping {
            Overlap::Contained
        } else {
            Overlap::Partial
        };
        let annotated = AnnotateOptions::default()
            .overlap(overlap)
            .include_unlabeled(self.include_unlabeled)
            .run(&all_targets, &regions, &genome.chrom_lens())?;
        tsv::save_targets(output, &annotated)
    }
}
