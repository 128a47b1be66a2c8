//! Named, stranded genomic intervals (genes) that targets are annotated
//! against, read from a five column region file or from GFF gene features.

use std::{
    fs::File,
    io::{BufRead, BufReader, Read, Write},
    path::Path,
};

use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use eyre::{Result, WrapErr};
use fnv::FnvHashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegionError {
    #[error("Line {line}: expected {expected} fields, found {found}")]
    FieldCount {
        line: u64,
        expected: usize,
        found: usize,
    },
    #[error("Line {line}: could not parse {field} from {value:?}")]
    Malformed {
        line: u64,
        field: &'static str,
        value: String,
    },
    #[error("Regions on {chrom} are not sorted by position, {name} starts at {start} after {prev_start}")]
    Unsorted {
        chrom: String,
        name: String,
        start: u64,
        prev_start: u64,
    },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub name: String,
    pub chrom: String,
    pub start: u64,
    pub end: u64,
    pub reverse: bool,
}

impl Region {
    pub fn new<N, C>(name: N, chrom: C, start: u64, end: u64, reverse: bool) -> Self
    where
        N: Into<String>,
        C: Into<String>,
    {
        Self {
            name: name.into(),
            chrom: chrom.into(),
            start,
            end,
            reverse,
        }
    }

    pub fn strand(&self) -> &'static str {
        if self.reverse {
            "-"
        } else {
            "+"
        }
    }
}

/// `-` is the reverse strand, `+` and `.` are read as forward.
fn parse_strand(token: &str, line: u64) -> Result<bool, RegionError> {
    match token {
        "-" => Ok(true),
        "+" | "." => Ok(false),
        _ => Err(RegionError::Malformed {
            line,
            field: "strand",
            value: token.to_string(),
        }),
    }
}

/// Parse `name chrom start end strand` rows. A row with the wrong number of
/// fields is fatal, while a row whose coordinates are not integers is logged
/// and skipped.
pub fn read_regions<R: Read>(reader: R) -> Result<Vec<Region>, RegionError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .comment(Some(b'#'))
        .quoting(false)
        .flexible(true)
        .from_reader(reader);
    let mut regions = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        if record.len() != 5 {
            return Err(RegionError::FieldCount {
                line,
                expected: 5,
                found: record.len(),
            });
        }
        let (start, end) = match (record[2].trim().parse(), record[3].trim().parse()) {
            (Ok(start), Ok(end)) => (start, end),
            _ => {
                log::warn!(
                    "Could not fully parse line {line}: {}",
                    record.iter().collect::<Vec<_>>().join("\t")
                );
                continue;
            }
        };
        let reverse = parse_strand(record[4].trim(), line)?;
        regions.push(Region::new(
            record[0].trim(),
            record[1].trim(),
            start,
            end,
            reverse,
        ));
    }
    Ok(regions)
}

pub fn load_regions<P: AsRef<Path>>(path: P) -> Result<Vec<Region>> {
    let path = path.as_ref();
    let file = File::open(path).wrap_err_with(|| format!("Failed to open {}", path.display()))?;
    let regions =
        read_regions(file).wrap_err_with(|| format!("Failed to parse {}", path.display()))?;
    log::info!("Found {} target regions in region file.", regions.len());
    Ok(regions)
}

pub fn write_regions<'a, W, I>(writer: W, regions: I) -> Result<usize, RegionError>
where
    W: Write,
    I: IntoIterator<Item = &'a Region>,
{
    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .quote_style(QuoteStyle::Never)
        .from_writer(writer);
    let mut n = 0;
    for r in regions {
        writer.write_record([
            r.name.as_str(),
            r.chrom.as_str(),
            r.start.to_string().as_str(),
            r.end.to_string().as_str(),
            r.strand(),
        ])?;
        n += 1;
    }
    writer.flush()?;
    Ok(n)
}

fn gene_name(attributes: &str) -> Option<&str> {
    attributes
        .split(';')
        .filter_map(|kv| kv.split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("name"))
        .map(|(_, v)| v.trim())
        .filter(|v| !v.is_empty())
}

/// Pull gene features out of a GFF3 file. Genes without a Name attribute are
/// skipped. Anything after a `##FASTA` directive is ignored.
pub fn read_gff_genes<R: Read>(reader: R) -> Result<Vec<Region>, RegionError> {
    let mut genes = Vec::new();
    for (idx, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        let line_no = idx as u64 + 1;
        if line.starts_with("##FASTA") {
            break;
        }
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.trim_end().split('\t').collect();
        if fields.len() != 9 {
            return Err(RegionError::FieldCount {
                line: line_no,
                expected: 9,
                found: fields.len(),
            });
        }
        if !fields[2].eq_ignore_ascii_case("gene") {
            continue;
        }
        let name = match gene_name(fields[8]) {
            Some(name) => name,
            None => {
                log::debug!("Skipping unnamed gene on line {line_no}");
                continue;
            }
        };
        let coord = |field: &'static str, value: &str| {
            value.parse::<u64>().map_err(|_| RegionError::Malformed {
                line: line_no,
                field,
                value: value.to_string(),
            })
        };
        let start = coord("start", fields[3])?;
        let end = coord("end", fields[4])?;
        let reverse = parse_strand(fields[6], line_no)?;
        genes.push(Region::new(name, fields[0], start, end, reverse));
    }
    Ok(genes)
}

pub fn load_gff_genes<P: AsRef<Path>>(path: P) -> Result<Vec<Region>> {
    let path = path.as_ref();
    let file = File::open(path).wrap_err_with(|| format!("Failed to open {}", path.display()))?;
    let genes =
        read_gff_genes(file).wrap_err_with(|| format!("Failed to parse {}", path.display()))?;
    log::info!("Found {} named genes in {}", genes.len(), path.display());
    Ok(genes)
}

/// Within each chromosome regions must appear in `(start, end)` order.
/// Chromosomes themselves may be interleaved.
pub fn validate_sorted(regions: &[Region]) -> Result<(), RegionError> {
    let mut last: FnvHashMap<&str, (u64, u64)> = FnvHashMap::default();
    for r in regions {
        if let Some(&(prev_start, prev_end)) = last.get(r.chrom.as_str()) {
            if (r.start, r.end) < (prev_start, prev_end) {
                return Err(RegionError::Unsorted {
                    chrom: r.chrom.clone(),
                    name: r.name.clone(),
                    start: r.start,
                    prev_start,
                });
            }
        }
        last.insert(r.chrom.as_str(), (r.start, r.end));
    }
    Ok(())
}
