//! External alignment oracle used to decide whether a guide maps uniquely
//! back to its genome.
//!
//! Each pass writes the whole catalogue as synthetic reads, aligns them at
//! one dissimilarity threshold and reports for every read whether it had
//! exactly one alignment.

use std::{
    fs::{self, File},
    io::{BufReader, Read, Write},
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Output},
};

use bio::io::fastq;
use csv::{ReaderBuilder, StringRecord};
use eyre::{Result, WrapErr};
use thiserror::Error;

use crate::{
    target::Catalogue,
    utils::find_binary,
    variants::{CostVector, VariantError},
};

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("{program} exited with code {code}")]
    Failed { program: String, code: i32 },
    #[error("{program} was terminated by a signal")]
    Terminated { program: String },
    #[error("Oracle reported read {0} which was never submitted")]
    UnknownRead(String),
    #[error("Malformed alignment record: {0}")]
    MalformedRecord(String),
    #[error("PAM {pam} does not match the {n} motif base qualities")]
    PamQuality { pam: String, n: usize },
}

impl OracleError {
    /// Exit code to hand back to the shell when this error aborts a run.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            OracleError::Failed { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub fn check_status(program: &str, status: ExitStatus) -> Result<(), OracleError> {
    if status.success() {
        Ok(())
    } else if let Some(code) = status.code() {
        Err(OracleError::Failed {
            program: program.to_string(),
            code,
        })
    } else {
        Err(OracleError::Terminated {
            program: program.to_string(),
        })
    }
}

pub fn check_if_failed(program: &str, output: Output) -> Result<(), OracleError> {
    for line in String::from_utf8_lossy(&output.stderr).lines() {
        log::info!("{program}: {line}");
    }
    check_status(program, output.status)
}

/// Outcome for one synthetic read in a single pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    /// Exactly one alignment within the threshold
    Unique,
    /// No alignment at all within the threshold
    Unaligned,
    /// More than one alignment, so the read was discarded
    Suppressed,
}

pub trait Oracle {
    /// Build whatever index the aligner needs. Must be a no-op when the index
    /// already exists.
    fn prepare(&self) -> Result<()>;

    /// Align every read in a fastq file at one dissimilarity threshold,
    /// blocking until done.
    fn align(&self, reads: &Path, threshold: u32) -> Result<Vec<(String, Alignment)>>;
}

/// Phred scores of a synthetic read: the substitution cost of each guide
/// position, followed by fixed scores for the PAM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadQualities {
    target: Vec<u8>,
    pam: Vec<u8>,
}

impl Default for ReadQualities {
    fn default() -> Self {
        ReadQualities::new(&CostVector::default(), "!4I")
    }
}

impl ReadQualities {
    pub fn new(costs: &CostVector, pam: &str) -> Self {
        let target = costs
            .costs()
            .iter()
            .map(|&c| (c.min(93 - 33) + 33) as u8)
            .collect();
        Self {
            target,
            pam: pam.as_bytes().to_vec(),
        }
    }

    pub fn for_read(&self, sequence: &str, pam: &str) -> Result<Vec<u8>, OracleError> {
        if sequence.len() != self.target.len() {
            let err = VariantError::LengthMismatch {
                target: sequence.to_string(),
                found: sequence.len(),
                expected: self.target.len(),
            };
            return Err(OracleError::MalformedRecord(err.to_string()));
        }
        if pam.len() != self.pam.len() {
            return Err(OracleError::PamQuality {
                pam: pam.to_string(),
                n: self.pam.len(),
            });
        }
        let mut qual = self.target.clone();
        qual.extend_from_slice(&self.pam);
        Ok(qual)
    }
}

/// Write every target with its PAM as a fastq read named by catalogue slot.
pub fn write_reads<W: Write>(
    catalogue: &Catalogue,
    qualities: &ReadQualities,
    writer: W,
) -> Result<()> {
    let mut writer = fastq::Writer::new(writer);
    for (idx, target) in catalogue.iter().enumerate() {
        let qual = qualities.for_read(&target.sequence, &target.pam)?;
        writer.write(
            &idx.to_string(),
            None,
            target.sequence_with_pam().as_bytes(),
            &qual,
        )?;
    }
    writer.flush()?;
    Ok(())
}

fn classify(record: &StringRecord) -> Result<(String, Alignment), OracleError> {
    let malformed = || OracleError::MalformedRecord(record.iter().collect::<Vec<_>>().join("\t"));
    let name = record.get(0).ok_or_else(malformed)?;
    let flag: u16 = record
        .get(1)
        .and_then(|f| f.parse().ok())
        .ok_or_else(malformed)?;
    if flag & 4 == 0 {
        return Ok((name.to_string(), Alignment::Unique));
    }
    let n_hits = record
        .iter()
        .skip(11)
        .find_map(|tag| tag.strip_prefix("XM:i:"))
        .map(|n| n.parse::<u32>().map_err(|_| malformed()))
        .transpose()?
        .unwrap_or(0);
    if n_hits > 0 {
        Ok((name.to_string(), Alignment::Suppressed))
    } else {
        Ok((name.to_string(), Alignment::Unaligned))
    }
}

/// Classify every record of a SAM stream. Unaligned records count as
/// suppressed when the aligner reports hits in the XM tag.
pub fn parse_sam<R: Read>(reader: R) -> Result<Vec<(String, Alignment)>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .comment(Some(b'@'))
        .quoting(false)
        .flexible(true)
        .from_reader(reader);
    let mut acc = Vec::new();
    for record in reader.records() {
        acc.push(classify(&record?)?);
    }
    Ok(acc)
}

/// bowtie (v1) driven as a subprocess, one invocation per threshold.
#[derive(Debug, Clone)]
pub struct Bowtie {
    bowtie: PathBuf,
    bowtie_build: PathBuf,
    genome: PathBuf,
    threads: usize,
    seed_len: u32,
    seed_mismatches: u32,
    chunkmbs: u32,
    tryhard: bool,
    sam_copy: Option<PathBuf>,
}

impl Bowtie {
    pub fn new<P: AsRef<Path>>(genome: P, bowtie: PathBuf, bowtie_build: PathBuf) -> Self {
        Self {
            bowtie,
            bowtie_build,
            genome: genome.as_ref().to_path_buf(),
            threads: num_cpus::get(),
            seed_len: 15,
            seed_mismatches: 3,
            chunkmbs: 128,
            tryhard: false,
            sam_copy: None,
        }
    }

    /// Look up bowtie and bowtie-build in $PATH unless paths are given.
    pub fn find<P: AsRef<Path>>(
        genome: P,
        bowtie_path: &Option<PathBuf>,
        bowtie_build_path: &Option<PathBuf>,
    ) -> Result<Self> {
        let bowtie = find_binary("bowtie", bowtie_path)?;
        let bowtie_build = find_binary("bowtie-build", bowtie_build_path)?;
        Ok(Bowtie::new(genome, bowtie, bowtie_build))
    }

    pub fn threads(&mut self, threads: usize) -> &mut Self {
        self.threads = threads;
        self
    }

    pub fn seed_len(&mut self, seed_len: u32) -> &mut Self {
        self.seed_len = seed_len;
        self
    }

    pub fn seed_mismatches(&mut self, seed_mismatches: u32) -> &mut Self {
        self.seed_mismatches = seed_mismatches;
        self
    }

    pub fn chunkmbs(&mut self, chunkmbs: u32) -> &mut Self {
        self.chunkmbs = chunkmbs;
        self
    }

    pub fn tryhard(&mut self, tryhard: bool) -> &mut Self {
        self.tryhard = tryhard;
        self
    }

    /// Keep a copy of the SAM output of the latest pass.
    pub fn sam_copy(&mut self, sam_copy: Option<PathBuf>) -> &mut Self {
        self.sam_copy = sam_copy;
        self
    }

    fn index_file(&self) -> PathBuf {
        let mut name = self.genome.clone().into_os_string();
        name.push(".1.ebwt");
        PathBuf::from(name)
    }

    pub(crate) fn align_cmd(&self, reads: &Path, output: &Path, threshold: u32) -> Command {
        let mut cmd = Command::new(&self.bowtie);
        cmd.arg("-S")
            .arg("--nomaqround")
            .arg("-q")
            .arg("-a")
            .arg("--best");
        if self.tryhard {
            cmd.arg("--tryhard");
        }
        cmd.arg("--chunkmbs")
            .arg(self.chunkmbs.to_string())
            .arg("-p")
            .arg(self.threads.to_string())
            .arg("-n")
            .arg(self.seed_mismatches.to_string())
            .arg("-l")
            .arg(self.seed_len.to_string())
            .arg("-e")
            .arg(threshold.to_string())
            .arg("-m")
            .arg("1")
            .arg(&self.genome)
            .arg(reads)
            .arg(output);
        cmd
    }
}

impl Oracle for Bowtie {
    fn prepare(&self) -> Result<()> {
        if self.index_file().exists() {
            log::info!("Found bowtie index {}", self.index_file().display());
            return Ok(());
        }
        let mut cmd = Command::new(&self.bowtie_build);
        cmd.arg(&self.genome).arg(&self.genome);
        log::info!("{cmd:?}");
        let output = cmd.output().wrap_err("Failed to start bowtie-build")?;
        check_if_failed("bowtie-build", output).wrap_err("Failed to build bowtie index")?;
        Ok(())
    }

    fn align(&self, reads: &Path, threshold: u32) -> Result<Vec<(String, Alignment)>> {
        let specific = tempfile::NamedTempFile::new()?;
        let mut cmd = self.align_cmd(reads, specific.path(), threshold);
        log::info!("{cmd:?}");
        let output = cmd.output().wrap_err("Failed to start bowtie")?;
        check_if_failed("bowtie", output)?;
        if let Some(copy) = &self.sam_copy {
            fs::copy(specific.path(), copy)
                .wrap_err_with(|| format!("Failed to copy SAM output to {}", copy.display()))?;
        }
        let hits = parse_sam(BufReader::new(File::open(specific.path())?))?;
        Ok(hits)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::target::Target;

    #[test]
    fn test_read_qualities() {
        let qual = ReadQualities::default();
        let q = qual
            .for_read("ACGTACGTACGTACGTACGT", "AGG")
            .unwrap();
        assert_eq!(q, b"++++++++44444=======!4I".to_vec());
        assert!(qual.for_read("ACGT", "AGG").is_err());
        assert!(matches!(
            qual.for_read("ACGTACGTACGTACGTACGT", "AG"),
            Err(OracleError::PamQuality { .. })
        ));
    }

    #[test]
    fn test_write_reads() {
        let mut catalogue = Catalogue::new();
        catalogue.insert(Target::new("ACGTACGTACGTACGTACGT", "AGG", "chrI", 1, false));
        catalogue.insert(Target::new("TTGTACGTACGTACGTACGT", "TGG", "chrI", 9, true));
        let mut buf = Vec::new();
        write_reads(&catalogue, &ReadQualities::default(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "@0\nACGTACGTACGTACGTACGTAGG\n+\n++++++++44444=======!4I\n\
             @1\nTTGTACGTACGTACGTACGTTGG\n+\n++++++++44444=======!4I\n"
        );
    }

    #[test]
    fn test_parse_sam() {
        let sam = "@HD\tVN:1.0\tSO:unsorted\n\
                   @SQ\tSN:chrI\tLN:230218\n\
                   0\t0\tchrI\t100\t255\t23M\t*\t0\t0\tACGT\tIIII\tXA:i:0\tMD:Z:23\tNM:i:0\n\
                   1\t4\t*\t0\t0\t*\t*\t0\t0\tACGT\tIIII\tXM:i:2\n\
                   2\t4\t*\t0\t0\t*\t*\t0\t0\tACGT\tIIII\tXM:i:0\n\
                   3\t16\tchrI\t500\t255\t23M\t*\t0\t0\tACGT\tIIII\tXM:i:1\n";
        let hits = parse_sam(sam.as_bytes()).unwrap();
        assert_eq!(
            hits,
            vec![
                ("0".to_string(), Alignment::Unique),
                ("1".to_string(), Alignment::Suppressed),
                ("2".to_string(), Alignment::Unaligned),
                ("3".to_string(), Alignment::Unique),
            ]
        );
        assert!(parse_sam("0\tnotaflag\n".as_bytes()).is_err());
    }

    #[test]
    fn test_align_cmd() {
        let mut bowtie = Bowtie::new("ref/genome.fa", "bowtie".into(), "bowtie-build".into());
        bowtie.threads(7);
        let cmd = bowtie.align_cmd(Path::new("reads.fq"), Path::new("out.sam"), 95);
        let args: Vec<_> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args.join(" "),
            "-S --nomaqround -q -a --best --chunkmbs 128 -p 7 -n 3 -l 15 -e 95 -m 1 \
             ref/genome.fa reads.fq out.sam"
        );
        assert_eq!(bowtie.index_file(), PathBuf::from("ref/genome.fa.1.ebwt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_check_status() {
        use std::os::unix::process::ExitStatusExt;
        assert!(check_status("bowtie", ExitStatus::from_raw(0)).is_ok());
        let err = check_status("bowtie", ExitStatus::from_raw(3 << 8)).unwrap_err();
        assert_eq!(err.exit_code(), Some(3));
        let err = check_status("bowtie", ExitStatus::from_raw(9)).unwrap_err();
        assert!(matches!(err, OracleError::Terminated { .. }));
    }
}
