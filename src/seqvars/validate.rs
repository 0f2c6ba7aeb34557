//! Implementation of `seqvars validate` subcommand.

use crate::{
    common::{self, GenomeReference},
    seqvars::header,
};

/// Command line arguments for `seqvars validate` subcommand.
#[derive(Debug, clap::Parser)]
#[command(author, version, about = "check VCF version and genome reference", long_about = None)]
pub struct Args {
    /// Path to input VCF file, optionally gzip-compressed.
    #[clap(long)]
    pub path_in: String,
}

/// Validate the header of the VCF file at `path_in` and resolve its genome reference.
pub fn validate_file(path_in: &str) -> Result<GenomeReference, anyhow::Error> {
    let headers = header::read_header_lines(path_in)?;
    tracing::debug!("read {} header lines from {}", headers.len(), path_in);
    let version = header::validate_format_version(&headers)
        .map_err(|e| anyhow::anyhow!("invalid VCF file {}: {}", path_in, e))?;
    let reference = header::validate_and_resolve_reference(&headers)
        .map_err(|e| anyhow::anyhow!("invalid VCF file {}: {}", path_in, e))?;
    tracing::debug!("VCF version {}, reference {}", version, reference);
    Ok(reference)
}

/// Main entry point for `seqvars validate` sub command.
pub fn run(args_common: &common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let reference = validate_file(&args.path_in)?;
    println!("{}", reference);

    Ok(())
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use crate::common::GenomeReference;

    #[test]
    fn validate_example() -> Result<(), anyhow::Error> {
        assert_eq!(
            super::validate_file("tests/seqvars/example.vcf")?,
            GenomeReference::Grch38
        );
        Ok(())
    }

    #[rstest]
    #[case("tests/seqvars/old_version.vcf", "older than 4")]
    #[case("tests/seqvars/unsupported_reference.vcf", "Unsupported genome reference")]
    #[case("tests/seqvars/missing.vcf", "could not open")]
    fn validate_rejects(#[case] path: &str, #[case] message: &str) {
        let err = super::validate_file(path).unwrap_err();
        assert!(
            err.to_string().contains(message),
            "{:?} does not contain {:?}",
            err.to_string(),
            message
        );
    }
}
