use std::{fs::File, io::BufWriter, path::PathBuf};

use clap::Parser;
use eyre::WrapErr;
use libguides::{region, utils};

use crate::file::ValidPathBuf;

#[derive(Parser, Debug)]
pub struct RegionsCmd {
    /// GFF3 annotation file
    #[clap(short, long)]
    pub gff: ValidPathBuf,

    /// Path to output region file
    #[clap(short, long)]
    pub output: Option<PathBuf>,
}

impl RegionsCmd {
    pub fn run(self) -> eyre::Result<()> {
        let mut genes = region::load_gff_genes(&self.gff)?;
        // annotate expects positional order within each chromosome
        genes.sort_by(|a, b| {
            (a.chrom.as_str(), a.start, a.end).cmp(&(b.chrom.as_str(), b.start, b.end))
        });
        let output = self
            .output
            .unwrap_or_else(|| utils::suffixed_output(&self.gff, ".regions.tsv"));
        let file = File::create(&output)
            .wrap_err_with(|| format!("Failed to create {}", output.display()))?;
        let n = region::write_regions(BufWriter::new(file), &genes)?;
        log::info!("Wrote {n} regions to {}", output.display());
        Ok(())
    }
}
