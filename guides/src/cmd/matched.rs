use std::path::PathBuf;

use clap::Parser;
use libguides::{controls::CONTROL_THRESHOLD, filter::MatchFilter, tsv, utils};

use crate::file::ValidPathBuf;

#[derive(Parser, Debug)]
pub struct MatchedCmd {
    /// Target file to filter
    #[clap(short, long)]
    pub input: ValidPathBuf,

    /// Target file the sequences are looked up in
    #[clap(short, long)]
    pub comparison: ValidPathBuf,

    /// Path to output target file
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Specificity both copies of a sequence must have
    #[clap(short, long, default_value_t = CONTROL_THRESHOLD as i32)]
    pub specificity: i32,
}

impl MatchedCmd {
    pub fn run(self) -> eyre::Result<()> {
        let targets = tsv::load_targets(&self.input)?;
        let comparisons = tsv::load_targets(&self.comparison)?;
        let chosen = MatchFilter::new(&comparisons, self.specificity).run(targets);
        let output = self
            .output
            .unwrap_or_else(|| utils::tagged_output(&self.input, ".matched"));
        tsv::save_targets(output, &chosen)
    }
}
