//! Common, IO-related code.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use flate2::bufread::MultiGzDecoder;

/// Transparently open a file with gzip decoder.
pub fn open_read_maybe_gz<P>(path: P) -> Result<Box<dyn BufRead>, anyhow::Error>
where
    P: AsRef<Path>,
{
    if path.as_ref().extension().map(|s| s.to_str()) == Some(Some("gz")) {
        tracing::trace!("Opening {:?} as gzip for reading", path.as_ref());
        let file = File::open(path)?;
        let bufreader = BufReader::new(file);
        let decoder = MultiGzDecoder::new(bufreader);
        Ok(Box::new(BufReader::new(decoder)))
    } else {
        tracing::trace!("Opening {:?} as plain text for reading", path.as_ref());
        let file = File::open(path)?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Read a newline-delimited list of gene symbols.
///
/// Surrounding whitespace is trimmed and blank lines are skipped.
pub fn read_gene_list<P>(path: P) -> Result<Vec<String>, anyhow::Error>
where
    P: AsRef<Path>,
{
    let reader = File::open(path.as_ref())
        .map(BufReader::new)
        .map_err(|e| anyhow::anyhow!("could not open gene list {:?}: {}", path.as_ref(), e))?;
    let mut result = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let gene = line.trim();
        if !gene.is_empty() {
            result.push(gene.to_string());
        }
    }
    Ok(result)
}

/// Write `genes` as a newline-delimited list to a fresh temporary file.
///
/// The file is removed when the returned handle is dropped.
pub fn write_gene_list(genes: &[String]) -> Result<tempfile::NamedTempFile, anyhow::Error> {
    use std::io::Write;

    let mut file = tempfile::Builder::new()
        .prefix("genes-")
        .suffix(".txt")
        .tempfile()?;
    for gene in genes {
        writeln!(file, "{}", gene)?;
    }
    file.flush()?;
    Ok(file)
}
