//! Implementation of `seqvars filter` subcommand and the filtered per-gene files.
//!
//! The filtered file keeps the header and every record mentioning a `HIGH`,
//! `MODERATE`, or `LOW` impact, i.e., drops records with `MODIFIER` effects only.

use std::{
    fs::File,
    io::{BufRead, BufWriter, Write},
    path::{Path, PathBuf},
};

use thousands::Separable;

use crate::common::{self, io::open_read_maybe_gz};

/// Impact markers of records kept in the filtered file.
const KEPT_IMPACTS: &[&str] = &["HIGH", "MODERATE", "LOW"];

/// Command line arguments for `seqvars filter` subcommand.
#[derive(Debug, clap::Parser)]
#[command(author, version, about = "write filtered companion of a per-gene VCF", long_about = None)]
pub struct Args {
    /// Path to the per-gene VCF file.
    #[clap(long)]
    pub path_in: String,
    /// Path to the output file; defaults to `<name>_filtered.vcf` next to the input.
    #[clap(long)]
    pub path_out: Option<String>,
}

/// Name of the filtered companion of `path`, e.g., `IL9R.vcf` becomes `IL9R_filtered.vcf`.
pub fn filtered_vcf_name<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref().display().to_string();
    let stem = path.strip_suffix(".vcf").unwrap_or(&path);
    PathBuf::from(format!("{}_filtered.vcf", stem))
}

/// Whether the line is kept in the filtered file.
fn is_kept(line: &str) -> bool {
    line.starts_with('#') || KEPT_IMPACTS.iter().any(|impact| line.contains(impact))
}

/// Copy the kept lines of `path_in` to `path_out`, returning the number of kept records.
pub fn write_filtered_vcf<P, Q>(path_in: P, path_out: Q) -> Result<usize, anyhow::Error>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let reader = open_read_maybe_gz(path_in.as_ref())
        .map_err(|e| anyhow::anyhow!("could not open {:?}: {}", path_in.as_ref(), e))?;
    let mut writer = BufWriter::new(
        File::create(path_out.as_ref())
            .map_err(|e| anyhow::anyhow!("could not create {:?}: {}", path_out.as_ref(), e))?,
    );

    let mut records = 0usize;
    for line in reader.lines() {
        let line = line?;
        if is_kept(&line) {
            if !line.starts_with('#') {
                records += 1;
            }
            writeln!(writer, "{}", line)?;
        }
    }
    writer.flush()?;

    Ok(records)
}

/// Create the filtered companion file next to `path` and return its path.
pub fn create_filtered_vcf<P: AsRef<Path>>(path: P) -> Result<PathBuf, anyhow::Error> {
    let path_out = filtered_vcf_name(path.as_ref());
    let records = write_filtered_vcf(path.as_ref(), &path_out)?;
    tracing::debug!(
        "wrote {} records to {}",
        records.separate_with_commas(),
        path_out.display()
    );
    Ok(path_out)
}

/// Main entry point for `seqvars filter` sub command.
pub fn run(args_common: &common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:#?}", &args_common);
    tracing::info!("args = {:#?}", &args);

    let path_out = args
        .path_out
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| filtered_vcf_name(&args.path_in));
    let records = write_filtered_vcf(&args.path_in, &path_out)?;
    tracing::info!(
        "... wrote {} records to {}",
        records.separate_with_commas(),
        path_out.display()
    );

    Ok(())
}
