use std::{fs::File, io::Read, path::Path};

use bio::io::fasta;
use eyre::{Result, WrapErr};
use fnv::{FnvHashMap, FnvHashSet};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenomeError {
    #[error("Saw sequence record {0} twice")]
    DuplicateRecord(String),
}

/// Named sequence records of a reference genome, uppercased, in file order.
#[derive(Debug, Default, Clone)]
pub struct Genome {
    records: Vec<(String, Vec<u8>)>,
}

impl Genome {
    pub fn from_records<I, S>(records: I) -> Result<Self, GenomeError>
    where
        I: IntoIterator<Item = (S, Vec<u8>)>,
        S: Into<String>,
    {
        let mut seen = FnvHashSet::default();
        let mut acc = Vec::new();
        for (name, mut seq) in records {
            let name = name.into();
            if !seen.insert(name.clone()) {
                return Err(GenomeError::DuplicateRecord(name));
            }
            seq.make_ascii_uppercase();
            acc.push((name, seq));
        }
        Ok(Genome { records: acc })
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let reader = fasta::Reader::new(reader);
        let mut records = Vec::new();
        for record in reader.records() {
            let record = record?;
            records.push((record.id().to_string(), record.seq().to_vec()));
        }
        Ok(Genome::from_records(records)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Reading genome from {}", path.display());
        let file =
            File::open(path).wrap_err_with(|| format!("Failed to open {}", path.display()))?;
        Genome::from_reader(file).wrap_err_with(|| format!("Failed to parse {}", path.display()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.records
            .iter()
            .map(|(name, seq)| (name.as_str(), seq.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Get the size of each chromosome, later used to skip regions that start
    /// past the end of their chromosome.
    pub fn chrom_lens(&self) -> FnvHashMap<String, u64> {
        self.records
            .iter()
            .map(|(name, seq)| (name.clone(), seq.len() as u64))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_reader() {
        let fasta = b">chrI\nacgtNN\nACGT\n>chrII description\nGGG\n";
        let genome = Genome::from_reader(&fasta[..]).unwrap();
        let records: Vec<_> = genome.iter().collect();
        assert_eq!(records, vec![("chrI", &b"ACGTNNACGT"[..]), ("chrII", &b"GGG"[..])]);
        let lens = genome.chrom_lens();
        assert_eq!(lens["chrI"], 10);
        assert_eq!(lens["chrII"], 3);
    }

    #[test]
    fn test_duplicate_record() {
        let fasta = b">chrI\nACGT\n>chrI\nGGGG\n";
        let err = Genome::from_reader(&fasta[..]).unwrap_err();
        assert!(err.to_string().contains("chrI"));
    }
}
