use std::{fmt, str::FromStr};

use bio::alphabets::dna;
use thiserror::Error;

use crate::{
    genome::Genome,
    target::{Catalogue, Target},
};

/// Symbol matching any single base. `.` is accepted on input as an alias.
pub const WILDCARD: u8 = b'N';

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MotifError {
    #[error("Motif must not be empty")]
    Empty,
    #[error("Invalid base {0:?}, should only be ACGT or a N/. wildcard")]
    InvalidBase(char),
}

fn is_acgt(base: u8) -> bool {
    matches!(base, b'A' | b'C' | b'G' | b'T')
}

/// PAM pattern over A, C, G, T plus a single base wildcard, ie "NGG".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Motif {
    motif: Vec<u8>,
}

impl Motif {
    pub fn parse_from_str<T>(string: T) -> Result<Self, MotifError>
    where
        T: AsRef<str>,
    {
        let string = string.as_ref();
        if string.is_empty() {
            return Err(MotifError::Empty);
        }
        let motif = string
            .chars()
            .map(|c| match c.to_ascii_uppercase() {
                '.' | 'N' => Ok(WILDCARD),
                b @ ('A' | 'C' | 'G' | 'T') => Ok(b as u8),
                _ => Err(MotifError::InvalidBase(c)),
            })
            .collect::<Result<Vec<u8>, _>>()?;
        Ok(Motif { motif })
    }

    pub fn motif(&self) -> &[u8] {
        &self.motif
    }

    pub fn len_motif(&self) -> usize {
        self.motif.len()
    }

    pub fn revcomp(&self) -> Motif {
        Motif {
            motif: dna::revcomp(&self.motif),
        }
    }

    /// True if the (already uppercased) window has a concrete base at every
    /// position and agrees with every fixed position of the motif.
    pub fn matches(&self, window: &[u8]) -> bool {
        window.len() == self.motif.len()
            && self
                .motif
                .iter()
                .zip(window)
                .all(|(&m, &b)| is_acgt(b) && (m == WILDCARD || m == b))
    }
}

impl Default for Motif {
    fn default() -> Self {
        Motif {
            motif: b"NGG".to_vec(),
        }
    }
}

impl fmt::Display for Motif {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.motif))
    }
}

impl FromStr for Motif {
    type Err = MotifError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Motif::parse_from_str(s)
    }
}

/// Finds every motif-adjacent target of a fixed length on both strands.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    motif: Motif,
    target_len: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            motif: Motif::default(),
            target_len: 20,
        }
    }
}

impl ExtractOptions {
    pub fn motif(&mut self, motif: Motif) -> &mut Self {
        self.motif = motif;
        self
    }

    pub fn target_len(&mut self, target_len: usize) -> &mut Self {
        self.target_len = target_len;
        self
    }

    pub fn run(&self, genome: &Genome) -> Catalogue {
        log::info!(
            "Extracting {}bp targets adjacent to {} from {} sequences",
            self.target_len,
            self.motif,
            genome.len()
        );
        let mut catalogue = Catalogue::new();
        for (chrom, seq) in genome.iter() {
            self.extract_record(chrom, seq, &mut catalogue);
        }
        log::info!("{} raw targets.", catalogue.len());
        catalogue
    }

    /// Scan one sequence record. Every start position is tested, so matches
    /// may overlap. Windows holding anything other than A/C/G/T are skipped.
    pub fn extract_record(&self, chrom: &str, seq: &[u8], catalogue: &mut Catalogue) {
        let seq = seq.to_ascii_uppercase();
        let tlen = self.target_len;
        let mlen = self.motif.len_motif();
        let width = tlen + mlen;
        if seq.len() < width {
            log::debug!("{chrom} shorter than {width}bp, skipping");
            return;
        }
        let n_before = catalogue.len();

        // [target][motif] on the forward strand
        for (i, window) in seq.windows(width).enumerate() {
            let (capture, pam) = window.split_at(tlen);
            if !self.motif.matches(pam) || !capture.iter().all(|&b| is_acgt(b)) {
                continue;
            }
            let t = Target::new(
                String::from_utf8_lossy(capture),
                String::from_utf8_lossy(pam),
                chrom,
                i as u64 + 1,
                false,
            );
            catalogue.insert(t);
        }

        // [revcomp motif][target] read on the forward strand is a reverse strand
        // target starting right after the motif
        let rc_motif = self.motif.revcomp();
        for (i, window) in seq.windows(width).enumerate() {
            let (pam, capture) = window.split_at(mlen);
            if !rc_motif.matches(pam) || !capture.iter().all(|&b| is_acgt(b)) {
                continue;
            }
            let t = Target::new(
                String::from_utf8_lossy(&dna::revcomp(capture)),
                String::from_utf8_lossy(&dna::revcomp(pam)),
                chrom,
                (i + mlen) as u64 + 1,
                true,
            );
            catalogue.insert(t);
        }
        log::debug!("{chrom}: {} targets", catalogue.len() - n_before);
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_motif() {
        let m = Motif::parse_from_str("NGG");
        assert!(m.is_ok());

        let m = Motif::parse_from_str(".gg").unwrap();
        assert_eq!(m, Motif::default());

        let m = Motif::parse_from_str("TTTV");
        assert_eq!(m, Err(MotifError::InvalidBase('V')));

        let m = Motif::parse_from_str("");
        assert_eq!(m, Err(MotifError::Empty));

        let m = Motif::parse_from_str("1:GC");
        assert!(m.is_err());
    }

    #[test]
    fn test_motif_matches() {
        let m = Motif::default();
        assert!(m.matches(b"AGG"));
        assert!(m.matches(b"TGG"));
        assert!(!m.matches(b"NGG"));
        assert!(!m.matches(b"AGC"));
        assert!(!m.matches(b"AG"));
        assert_eq!(m.revcomp().motif(), b"CCN");
    }

    fn extract(seq: &str, motif: &str, len: usize) -> Vec<Target> {
        let mut opts = ExtractOptions::default();
        opts.motif(motif.parse().unwrap()).target_len(len);
        let mut catalogue = Catalogue::new();
        opts.extract_record("chr1", seq.as_bytes(), &mut catalogue);
        catalogue.into_targets()
    }

    #[test]
    fn test_extract_both_strands() {
        let targets = extract("AAAACCGGTT", "GG", 4);
        assert_eq!(
            targets,
            vec![
                Target::new("AACC", "GG", "chr1", 3, false),
                Target::new("AACC", "GG", "chr1", 7, true),
            ]
        );
        let fwd = &targets[0];
        assert_eq!((fwd.start, fwd.end), (3, 7));
        let rev = &targets[1];
        assert_eq!((rev.start, rev.end), (7, 11));
    }

    #[test]
    fn test_extract_overlapping_windows() {
        // GGG holds two overlapping GG motifs
        let targets = extract("ACGTGGG", "GG", 3);
        let fwd: Vec<_> = targets.iter().filter(|t| !t.reverse).collect();
        assert_eq!(fwd.len(), 2);
        assert_eq!(fwd[0].sequence, "CGT");
        assert_eq!(fwd[0].start, 2);
        assert_eq!(fwd[1].sequence, "GTG");
        assert_eq!(fwd[1].start, 3);
    }

    #[test]
    fn test_extract_skips_unknown_bases() {
        assert!(extract("AANCCGGTT", "GG", 4)
            .iter()
            .all(|t| t.reverse));
        assert!(extract("AACNGGTTA", "GG", 4).is_empty());
    }

    #[test]
    fn test_extract_lowercase_and_wildcard() {
        let targets = extract("acgtacgtagg", "NGG", 8);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].sequence, "ACGTACGT");
        assert_eq!(targets[0].pam, "AGG");
    }

    #[test]
    fn test_extract_reverse_wildcard() {
        // CCA on the forward strand reads as TGG on the reverse strand
        let targets = extract("TCCAAAAACCCCGGGGTTTTACGT", "NGG", 20);
        assert_eq!(
            targets,
            vec![Target::new(
                "ACGTAAAACCCCGGGGTTTT",
                "TGG",
                "chr1",
                5,
                true
            )]
        );
        assert_eq!(targets[0].end, 25);
    }

    #[test]
    fn test_extract_deterministic() {
        let records = vec![
            ("chrI", b"ACGTACGTAGGCCTACGTACGTTGGAACCG".to_vec()),
            ("chrII", b"CCGTTAGCATGGACCAGGTACGTCGG".to_vec()),
        ];
        let mut opts = ExtractOptions::default();
        opts.target_len(8);

        let genome = Genome::from_records(records.clone()).unwrap();
        let first = opts.run(&genome).into_targets();
        let second = opts.run(&genome).into_targets();
        assert!(!first.is_empty());
        assert_eq!(first, second);

        let reordered = Genome::from_records(records.into_iter().rev()).unwrap();
        let mut keys: Vec<_> = first.iter().map(Target::key).collect();
        let mut other: Vec<_> = opts.run(&reordered).iter().map(Target::key).collect();
        keys.sort();
        other.sort();
        assert_eq!(keys, other);
    }

    #[test]
    fn test_extract_short_sequence() {
        assert!(extract("ACGGG", "NGG", 20).is_empty());
    }
}
