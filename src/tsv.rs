//! Tab separated format for target catalogues passed between stages.
//!
//! Every row holds the eleven [Target] fields in a fixed order. Missing
//! values are written as `None`, strand as `rev`/`fwd` and sense as
//! `sense`/`anti`. Files start with a `#` header line naming the columns;
//! any line starting with `#` is skipped on read.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use csv::{QuoteStyle, ReaderBuilder, StringRecord, Trim, WriterBuilder};
use eyre::{Result, WrapErr};
use thiserror::Error;

use crate::target::Target;

pub const NONE: &str = "None";

pub const COLUMNS: [&str; 11] = [
    "gene",
    "offset",
    "target",
    "pam",
    "chrom",
    "start",
    "end",
    "reverse",
    "sense_strand",
    "weakness",
    "specificity",
];

#[derive(Error, Debug)]
pub enum TsvError {
    #[error("Line {line}: expected {} fields, found {found}", COLUMNS.len())]
    FieldCount { line: u64, found: usize },
    #[error("Line {line}: {source}")]
    Field { line: u64, source: csv::Error },
    #[error("Line {line}: end - start does not match length of {sequence}")]
    Coordinates { line: u64, sequence: String },
    #[error("Line {line}: {sequence} has a base other than A, C, G or T")]
    Alphabet { line: u64, sequence: String },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Header line, without the trailing newline.
pub fn header() -> String {
    let names: Vec<String> = COLUMNS.iter().map(|c| c.to_uppercase()).collect();
    format!("#{}", names.join("\t"))
}

/// Writes targets one row at a time after emitting the header line.
pub struct TargetWriter<W: Write> {
    inner: csv::Writer<W>,
}

impl<W: Write> TargetWriter<W> {
    pub fn new(mut writer: W) -> Result<Self, TsvError> {
        writeln!(writer, "{}", header())?;
        let inner = WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .quote_style(QuoteStyle::Never)
            .from_writer(writer);
        Ok(Self { inner })
    }

    pub fn write(&mut self, target: &Target) -> Result<(), TsvError> {
        self.inner.serialize(target)?;
        Ok(())
    }

    pub fn write_all<'a, I>(&mut self, targets: I) -> Result<usize, TsvError>
    where
        I: IntoIterator<Item = &'a Target>,
    {
        let mut n = 0;
        for target in targets {
            self.write(target)?;
            n += 1;
        }
        Ok(n)
    }

    pub fn finish(mut self) -> Result<(), TsvError> {
        self.inner.flush()?;
        Ok(())
    }
}

fn line_of(record: &StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or_default()
}

fn from_record(record: &StringRecord) -> Result<Target, TsvError> {
    let line = line_of(record);
    if record.len() != COLUMNS.len() {
        return Err(TsvError::FieldCount {
            line,
            found: record.len(),
        });
    }
    let target: Target = record
        .deserialize(None)
        .map_err(|source| TsvError::Field { line, source })?;
    if target.end.checked_sub(target.start) != Some(target.sequence.len() as u64) {
        return Err(TsvError::Coordinates {
            line,
            sequence: target.sequence,
        });
    }
    if !target
        .sequence
        .bytes()
        .all(|b| matches!(b.to_ascii_uppercase(), b'A' | b'C' | b'G' | b'T'))
    {
        return Err(TsvError::Alphabet {
            line,
            sequence: target.sequence,
        });
    }
    Ok(target)
}

/// Read every target from a tsv stream. Any malformed row fails the whole
/// read.
pub fn read_targets<R: Read>(reader: R) -> Result<Vec<Target>, TsvError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .comment(Some(b'#'))
        .quoting(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);
    let mut targets = Vec::new();
    for record in reader.records() {
        targets.push(from_record(&record?)?);
    }
    Ok(targets)
}

pub fn load_targets<P: AsRef<Path>>(path: P) -> Result<Vec<Target>> {
    let path = path.as_ref();
    let file = File::open(path).wrap_err_with(|| format!("Failed to open {}", path.display()))?;
    let targets = read_targets(BufReader::new(file))
        .wrap_err_with(|| format!("Malformed target file {}", path.display()))?;
    log::info!("Read {} targets from {}", targets.len(), path.display());
    Ok(targets)
}

pub fn save_targets<'a, P, I>(path: P, targets: I) -> Result<()>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = &'a Target>,
{
    let path = path.as_ref();
    let file =
        File::create(path).wrap_err_with(|| format!("Failed to create {}", path.display()))?;
    let mut writer = TargetWriter::new(BufWriter::new(file))?;
    let n = writer.write_all(targets)?;
    writer.finish()?;
    log::info!("Wrote {n} targets to {}", path.display());
    Ok(())
}

/// Serialize a single target as one row, without a trailing newline.
pub fn to_line(target: &Target) -> Result<String, TsvError> {
    let mut inner = WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .quote_style(QuoteStyle::Never)
        .from_writer(Vec::new());
    inner.serialize(target)?;
    let bytes = inner.into_inner().map_err(|e| {
        TsvError::Io(std::io::Error::new(e.error().kind(), e.error().to_string()))
    })?;
    let line = String::from_utf8_lossy(&bytes);
    Ok(line.trim_end_matches('\n').to_string())
}

pub fn from_line(line: &str) -> Result<Target, TsvError> {
    let mut targets = read_targets(line.as_bytes())?;
    match targets.pop() {
        Some(target) if targets.is_empty() => Ok(target),
        _ => Err(TsvError::FieldCount { line: 1, found: 0 }),
    }
}

/// `None` sentinel for optional fields.
pub(crate) mod sentinel {
    use std::{fmt::Display, str::FromStr};

    use serde::{de, Deserialize, Deserializer, Serializer};

    use super::NONE;

    pub fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Display,
        S: Serializer,
    {
        match value {
            Some(v) => serializer.collect_str(v),
            None => serializer.serialize_str(NONE),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        if raw == NONE {
            Ok(None)
        } else {
            raw.parse().map(Some).map_err(de::Error::custom)
        }
    }
}

/// `rev`/`fwd` strand of the target relative to the reference.
pub(crate) mod orientation {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(reverse: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *reverse { "rev" } else { "fwd" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.as_str() {
            "rev" => Ok(true),
            "fwd" => Ok(false),
            other => Err(de::Error::custom(format!(
                "Unrecognized strand token {other}"
            ))),
        }
    }
}

/// `sense`/`anti` relative to the annotated gene, `None` when unannotated.
pub(crate) mod sense {
    use serde::{de, Deserialize, Deserializer, Serializer};

    use super::NONE;

    pub fn serialize<S: Serializer>(
        sense_strand: &Option<bool>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let token = match sense_strand {
            Some(true) => "sense",
            Some(false) => "anti",
            None => NONE,
        };
        serializer.serialize_str(token)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<bool>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.as_str() {
            "sense" => Ok(Some(true)),
            "anti" => Ok(Some(false)),
            NONE => Ok(None),
            other => Err(de::Error::custom(format!(
                "Unrecognized sense token {other}"
            ))),
        }
    }
}
