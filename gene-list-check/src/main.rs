use std::path::PathBuf;

use clap::{ArgGroup, Parser};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use fnv::FnvHashSet;
use human_panic::setup_panic;
use libguides::{
    region::{self, Region},
    subselect,
};

/// Warn about listed genes that no region describes.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
#[clap(group(ArgGroup::new("source").required(true).args(["regions", "gff"])))]
struct Args {
    #[clap(flatten)]
    verbose: Verbosity<InfoLevel>,

    /// Gene names, one per line
    #[clap(short = 'l', long)]
    gene_list: PathBuf,

    /// Region file with name, chrom, start, end and strand columns
    #[clap(short, long)]
    regions: Option<PathBuf>,

    /// GFF3 annotation to take gene names from
    #[clap(short, long)]
    gff: Option<PathBuf>,
}

/// Listed genes with no region of the same name, in list order.
fn missing_genes<'a>(genes: &'a [String], regions: &[Region]) -> Vec<&'a str> {
    let known: FnvHashSet<&str> = regions.iter().map(|r| r.name.as_str()).collect();
    genes
        .iter()
        .map(String::as_str)
        .filter(|g| !known.contains(g))
        .collect()
}

fn main() -> eyre::Result<()> {
    setup_panic!();
    jane_eyre::install()?;

    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .init();

    let genes = subselect::load_gene_list(&args.gene_list)?;
    let regions = match (&args.regions, &args.gff) {
        (Some(path), _) => region::load_regions(path)?,
        (None, Some(path)) => region::load_gff_genes(path)?,
        (None, None) => eyre::bail!("Either --regions or --gff is required"),
    };

    let missing = missing_genes(&genes, &regions);
    for gene in missing.iter() {
        log::warn!("{gene} has no region");
    }
    log::info!(
        "{} of {} listed genes found in regions",
        genes.len() - missing.len(),
        genes.len()
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_missing_genes() {
        let genes = vec!["YAL069W".to_string(), "FAKE1".to_string(), "SEO1".to_string()];
        let regions = vec![
            Region::new("SEO1", "chrI", 2000, 2500, true),
            Region::new("YAL069W", "chrI", 335, 649, false),
        ];
        assert_eq!(missing_genes(&genes, &regions), vec!["FAKE1"]);
        assert!(missing_genes(&[], &regions).is_empty());
    }

    #[test]
    fn test_args_need_one_source() {
        assert!(Args::try_parse_from(["gene-list-check", "-l", "genes.txt"]).is_err());
        assert!(Args::try_parse_from([
            "gene-list-check",
            "-l",
            "genes.txt",
            "-r",
            "regions.tsv",
            "-g",
            "genes.gff"
        ])
        .is_err());
        let args =
            Args::try_parse_from(["gene-list-check", "-l", "genes.txt", "-g", "genes.gff"]).unwrap();
        assert_eq!(args.gff, Some(PathBuf::from("genes.gff")));
    }
}
