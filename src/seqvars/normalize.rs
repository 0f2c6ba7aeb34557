//! Normalization of an annotated per-gene VCF file into variant and annotation rows.
//!
//! Variants are numbered by their row order in the file (`gene_variation`,
//! zero-based); annotations are numbered within their variant
//! (`variation_annotation`, one-based, restarting for every variant).

use std::{io::BufRead, path::Path};

use crate::{
    common::io::open_read_maybe_gz,
    err::ParsingError,
    seqvars::{
        ann::AnnField,
        record::{Info, Interval, VarType, VcfRecord},
    },
};

/// Error type for `normalize_*()`.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{path} line {lineno}: {source}")]
    Parsing {
        path: String,
        lineno: usize,
        #[source]
        source: ParsingError,
    },
    #[error("could not read {path}: {message}")]
    Io { path: String, message: String },
}

/// One variant of a gene, ready for storage.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantRow {
    /// Row index of the variant within the gene's file.
    pub gene_variation: i64,
    pub chrom: String,
    pub pos: i64,
    pub id: Option<String>,
    pub reference: String,
    pub alt: Vec<String>,
    pub qual: Option<f64>,
    pub filter: Vec<String>,
    /// `INFO` without the `ANN` entry.
    pub info: Info,
    pub format: Option<String>,
    pub interval: Interval,
    pub alleles: Vec<String>,
    pub affected: Interval,
    pub var_type: VarType,
    pub var_subtype: String,
}

impl VariantRow {
    fn new(gene_variation: i64, record: VcfRecord) -> Self {
        let interval = record.interval();
        let affected = record.affected_interval();
        let alleles = record.alleles();
        let var_type = record.var_type();
        let var_subtype = record.var_subtype();
        let VcfRecord {
            chrom,
            pos,
            id,
            reference,
            alt,
            qual,
            filter,
            info,
            format,
        } = record;

        Self {
            gene_variation,
            chrom,
            pos,
            id,
            reference,
            alt,
            qual,
            filter,
            info,
            format,
            interval,
            alleles,
            affected,
            var_type,
            var_subtype,
        }
    }
}

/// One effect annotation of a variant, ready for storage.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationRow {
    pub gene_variation: i64,
    pub variation_annotation: i64,
    pub ann: AnnField,
}

/// The normalized content of one per-gene file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneData {
    pub gene_hgnc: String,
    pub variants: Vec<VariantRow>,
    pub annotations: Vec<AnnotationRow>,
}

/// Counter for `variation_annotation`, restarting at 1 whenever the owning variant changes.
///
/// Annotations must arrive grouped by variant.
#[derive(Debug, Default)]
struct AnnotationNumbering {
    owner: Option<i64>,
    counter: i64,
}

impl AnnotationNumbering {
    fn next(&mut self, gene_variation: i64) -> i64 {
        if self.owner != Some(gene_variation) {
            self.owner = Some(gene_variation);
            self.counter = 0;
        }
        self.counter += 1;
        self.counter
    }
}

/// Normalize the VCF lines from `reader`; `path` is only used in error messages.
pub fn normalize_reader<R: BufRead>(
    gene_hgnc: &str,
    reader: R,
    path: &str,
) -> Result<GeneData, Error> {
    let mut result = GeneData {
        gene_hgnc: gene_hgnc.to_string(),
        ..Default::default()
    };
    let mut gene_variation = 0i64;
    let mut numbering = AnnotationNumbering::default();

    for (idx, line) in reader.lines().enumerate() {
        let lineno = idx + 1;
        let line = line.map_err(|e| Error::Io {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parsing_error = |source: ParsingError| Error::Parsing {
            path: path.to_string(),
            lineno,
            source,
        };

        let mut record: VcfRecord = line.parse().map_err(parsing_error)?;
        let anns = record.take_ann().map_err(parsing_error)?;
        tracing::trace!(
            "{}:{} has {} annotations",
            &record.chrom,
            record.pos,
            anns.len()
        );
        for ann in anns {
            result.annotations.push(AnnotationRow {
                gene_variation,
                variation_annotation: numbering.next(gene_variation),
                ann,
            });
        }
        result
            .variants
            .push(VariantRow::new(gene_variation, record));
        gene_variation += 1;
    }

    Ok(result)
}

/// Normalize the per-gene file at `path`.
pub fn normalize_file<P>(gene_hgnc: &str, path: P) -> Result<GeneData, Error>
where
    P: AsRef<Path>,
{
    let path_str = path.as_ref().display().to_string();
    let reader = open_read_maybe_gz(path.as_ref()).map_err(|e| Error::Io {
        path: path_str.clone(),
        message: e.to_string(),
    })?;
    normalize_reader(gene_hgnc, reader, &path_str)
}
