//! Records as read back from the store.

use crate::{
    common::GenomeReference,
    seqvars::{ann::AnnField, record::Info},
};

/// Processing state of an uploaded file.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FileStatus {
    Unprocessed,
    Processed,
}

/// An uploaded file, identified by the SHA-256 of its content.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FileRecord {
    pub hash: String,
    pub name: String,
    pub path: String,
    pub reference: GenomeReference,
    /// RFC 3339 timestamp.
    pub created_at: String,
    pub status: FileStatus,
}

/// State of one pipeline run.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Done,
    Failed,
}

/// One pipeline run for a file.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Task {
    pub id: i64,
    pub created_at: String,
    pub file_hash: String,
    pub status: TaskStatus,
    /// Failure description for failed runs.
    pub message: Option<String>,
}

/// A stored variant.
///
/// `start`/`end` are one-based and closed; `affected_start`/`affected_end`
/// are returned as stored.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Variant {
    pub file_hash: String,
    pub gene_hgnc: String,
    pub gene_variation: i64,
    pub chrom: String,
    pub pos: i64,
    pub id: Option<String>,
    #[serde(rename = "ref")]
    pub reference: String,
    pub alt: Vec<String>,
    pub qual: Option<f64>,
    pub filter: Vec<String>,
    pub info: Info,
    pub format: Option<String>,
    pub start: i64,
    pub end: i64,
    pub alleles: Vec<String>,
    pub affected_start: i64,
    pub affected_end: i64,
    pub var_type: String,
    pub var_subtype: String,
}

/// A stored effect annotation.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Annotation {
    pub file_hash: String,
    pub gene_hgnc: String,
    pub gene_variation: i64,
    pub variation_annotation: i64,
    #[serde(flatten)]
    pub ann: AnnField,
}

/// A named list of genes.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GeneSet {
    pub name: String,
    pub description: Option<String>,
    pub genes: Vec<String>,
}
