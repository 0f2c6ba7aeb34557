//! Common functionality.

use std::{
    io::Read,
    path::{Path, PathBuf},
};

use bytesize::ByteSize;
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use sha2::{Digest, Sha256};

pub mod io;

/// Commonly used command line arguments.
#[derive(Parser, Debug)]
pub struct Args {
    /// Verbosity of the program
    #[clap(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            verbose: Verbosity::new(0, 0),
        }
    }
}

/// Helper to print the current memory resident set size via `tracing`.
pub fn trace_rss_now() {
    match procfs::process::Process::myself().and_then(|me| me.stat()) {
        Ok(stat) => tracing::debug!(
            "RSS now: {}",
            ByteSize::b((stat.rss * procfs::page_size()) as u64)
        ),
        Err(e) => tracing::debug!("could not determine RSS: {}", e),
    }
}

/// Reference genomes accepted in the `##reference` header, in priority order.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum GenomeReference {
    #[strum(serialize = "GRCh38")]
    #[serde(rename = "GRCh38")]
    Grch38,
    #[strum(serialize = "GRCh37")]
    #[serde(rename = "GRCh37")]
    Grch37,
    #[strum(serialize = "hg19")]
    #[serde(rename = "hg19")]
    Hg19,
    #[strum(serialize = "hg38")]
    #[serde(rename = "hg38")]
    Hg38,
}

/// Size of the blocks read when hashing input files.
const HASH_BLOCK_SIZE: usize = 128 * 1024;

/// Compute the lower-case hex SHA-256 digest of the file at `path`.
pub fn sha256_hex<P>(path: P) -> Result<String, anyhow::Error>
where
    P: AsRef<Path>,
{
    let mut file = std::fs::File::open(path.as_ref()).map_err(|e| {
        anyhow::anyhow!("could not open {:?} for hashing: {}", path.as_ref(), e)
    })?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_BLOCK_SIZE];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(base16ct::lower::encode_string(&hasher.finalize()))
}

/// Directory receiving the per-gene files derived from the uploaded file `path_in`.
///
/// The directory is keyed by the base name of the input so repeated uploads
/// of the same file name land in the same place.
pub fn intermediary_dir<D, P>(data_dir: D, path_in: P) -> PathBuf
where
    D: AsRef<Path>,
    P: AsRef<Path>,
{
    let base_name = path_in
        .as_ref()
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    data_dir.as_ref().join("intermediary").join(base_name)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use strum::IntoEnumIterator;

    use super::GenomeReference;

    #[test]
    fn trace_rss_now_smoke() {
        super::trace_rss_now();
    }

    #[test]
    fn sha256_hex_empty_and_text() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path_empty = tmp_dir.join("empty.vcf");
        std::fs::write(&path_empty, b"")?;
        let path_abc = tmp_dir.join("abc.vcf");
        std::fs::write(&path_abc, b"abc")?;

        assert_eq!(
            super::sha256_hex(&path_empty)?,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            super::sha256_hex(&path_abc)?,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );

        Ok(())
    }

    #[test]
    fn sha256_hex_missing_file() {
        assert!(super::sha256_hex("tests/does/not/exist.vcf").is_err());
    }

    #[rstest::rstest]
    #[case("uploads/sample.vcf", "data/intermediary/sample.vcf")]
    #[case("/abs/path/to/other.vcf.gz", "data/intermediary/other.vcf.gz")]
    fn intermediary_dir(#[case] path_in: &str, #[case] expected: &str) {
        assert_eq!(
            super::intermediary_dir("data", path_in),
            std::path::PathBuf::from(expected)
        );
    }

    #[test]
    fn genome_reference_priority_order() {
        let names = GenomeReference::iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["GRCh38", "GRCh37", "hg19", "hg38"]);
    }

    #[rstest::rstest]
    #[case("grch38", GenomeReference::Grch38)]
    #[case("GRCh37", GenomeReference::Grch37)]
    #[case("HG19", GenomeReference::Hg19)]
    fn genome_reference_from_str(#[case] s: &str, #[case] expected: GenomeReference) {
        assert_eq!(s.parse::<GenomeReference>().unwrap(), expected);
    }
}
