//! Inspection of the VCF meta header of uploaded files.

use std::{io::BufRead, path::Path, sync::OnceLock};

use strum::IntoEnumIterator;

use crate::{common::io::open_read_maybe_gz, common::GenomeReference, err::ParsingError};

/// Oldest supported VCF version.
const MIN_VCF_VERSION: f64 = 4.0;

fn fileformat_regex() -> &'static regex::Regex {
    static FILEFORMAT: OnceLock<regex::Regex> = OnceLock::new();
    FILEFORMAT.get_or_init(|| {
        regex::Regex::new(r"^##fileformat=VCFv(?P<version>[0-9.]+)")
            .expect("invalid fileformat pattern")
    })
}

/// Read the header lines of the (possibly gzip-compressed) VCF file at `path`.
///
/// Reading stops at the first line that does not start with `#`, so only the
/// header is ever read into memory.
pub fn read_header_lines<P>(path: P) -> Result<Vec<String>, anyhow::Error>
where
    P: AsRef<Path>,
{
    let reader = open_read_maybe_gz(path.as_ref())
        .map_err(|e| anyhow::anyhow!("could not open {:?}: {}", path.as_ref(), e))?;
    let mut result = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if !line.starts_with('#') {
            break;
        }
        result.push(line);
    }
    Ok(result)
}

/// Ensure the `##fileformat` header declares VCF version 4 or later.
///
/// Returns the parsed version.
pub fn validate_format_version<S: AsRef<str>>(headers: &[S]) -> Result<f64, ParsingError> {
    let line = headers
        .iter()
        .map(|line| line.as_ref())
        .find(|line| line.starts_with("##fileformat"))
        .ok_or_else(|| ParsingError::new("Cannot find fileformat header."))?;

    let captures = fileformat_regex()
        .captures(line)
        .ok_or_else(|| ParsingError::new("Cannot parse ##fileformat header"))?;
    let version: f64 = captures["version"]
        .parse()
        .map_err(|_| ParsingError::new("Cannot parse ##fileformat header"))?;

    if version < MIN_VCF_VERSION {
        return Err(ParsingError::new(
            "VCF files with version older than 4 are not supported.",
        ));
    }
    Ok(version)
}

/// Find the `##reference` header and resolve it to an accepted reference.
///
/// The accepted references are matched case-insensitively as substrings of
/// the header line, in the priority order of `GenomeReference`.
pub fn validate_and_resolve_reference<S: AsRef<str>>(
    headers: &[S],
) -> Result<GenomeReference, ParsingError> {
    let line = headers
        .iter()
        .map(|line| line.as_ref())
        .find(|line| line.starts_with("##reference"))
        .ok_or_else(|| ParsingError::new("Cannot find reference header."))?;
    let line = line.to_ascii_lowercase();

    GenomeReference::iter()
        .find(|reference| line.contains(&reference.to_string().to_ascii_lowercase()))
        .ok_or_else(|| {
            ParsingError::new(format!(
                "Unsupported genome reference version. Should be one of {}",
                GenomeReference::iter()
                    .map(|r| r.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })
}
