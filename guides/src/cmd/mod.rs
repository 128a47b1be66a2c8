pub mod annotate;
pub mod controls;
pub mod extract;
pub mod matched;
pub mod regions;
pub mod score;
pub mod subselect;
pub mod vary;

use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use libguides::oracle::Bowtie;

#[derive(Subcommand, Debug)]
pub enum StageCmds {
    /// Find every guide next to a PAM motif on both strands of a genome
    ///
    /// Output file defaults to {genome}.targets.raw.tsv
    Extract(extract::ExtractCmd),

    /// Add substituted variants of every target, weighted by where the
    /// substitutions fall
    ///
    /// Output file defaults to {input}.vary.tsv
    Vary(vary::VaryCmd),

    /// Score how uniquely every target maps back to the genome with bowtie
    ///
    /// Output file defaults to {input}.scored.tsv
    Score(score::ScoreCmd),

    /// Label targets with the gene regions they overlap
    ///
    /// Output file defaults to {input}.annotated.tsv
    Annotate(annotate::AnnotateCmd),

    /// Pick a small set of targets per gene
    ///
    /// Output file defaults to {input}.sub.tsv
    Subselect(subselect::SubselectCmd),

    /// Build shuffled negative control guides that align nowhere in the genome
    ///
    /// Output file defaults to {input}.controls.tsv
    Controls(controls::ControlsCmd),

    /// Keep targets whose sequence was also scored as a control in a
    /// comparison library
    ///
    /// Output file defaults to {input}.matched.tsv
    Matched(matched::MatchedCmd),

    /// Convert GFF gene features into a region file for annotate
    ///
    /// Output file defaults to {gff}.regions.tsv
    Regions(regions::RegionsCmd),
}

impl StageCmds {
    pub fn run(self) -> eyre::Result<()> {
        match self {
            StageCmds::Extract(cmd) => cmd.run(),
            StageCmds::Vary(cmd) => cmd.run(),
            StageCmds::Score(cmd) => cmd.run(),
            StageCmds::Annotate(cmd) => cmd.run(),
            StageCmds::Subselect(cmd) => cmd.run(),
            StageCmds::Controls(cmd) => cmd.run(),
            StageCmds::Matched(cmd) => cmd.run(),
            StageCmds::Regions(cmd) => cmd.run(),
        }
    }
}

/// Where to find bowtie and how hard to run it.
#[derive(Args, Debug)]
pub struct OracleArgs {
    /// Path to bowtie, optional if in PATH
    #[clap(long)]
    pub bowtie_path: Option<PathBuf>,

    /// Path to bowtie-build, optional if in PATH
    #[clap(long)]
    pub bowtie_build_path: Option<PathBuf>,

    /// Number of threads bowtie uses, by default num cpus
    #[clap(short = 'j', long)]
    pub threads: Option<usize>,

    /// Keep a copy of the SAM output of the final bowtie run
    #[clap(long)]
    pub sam_copy: Option<PathBuf>,
}

impl OracleArgs {
    pub fn bowtie(&self, genome: &Path) -> eyre::Result<Bowtie> {
        let mut bowtie = Bowtie::find(genome, &self.bowtie_path, &self.bowtie_build_path)?;
        let threads = self.threads.unwrap_or_else(num_cpus::get);
        log::info!("Running bowtie with {threads} threads");
        bowtie.threads(threads).sam_copy(self.sam_copy.clone());
        Ok(bowtie)
    }
}
