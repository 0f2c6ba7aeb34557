//! Database schema.
//!
//! Ownership runs file → gene → variant → annotation, enforced by foreign keys.
//! Intervals are stored zero-based and half-open.

use rusqlite::Connection;

use crate::err::StorageError;

const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS files (
    hash TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    path TEXT NOT NULL,
    reference TEXT NOT NULL,
    created_at TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'unprocessed'
);

CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL,
    file_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    message TEXT,

    FOREIGN KEY (file_hash) REFERENCES files (hash)
);

CREATE TABLE IF NOT EXISTS genes (
    file_hash TEXT NOT NULL,
    gene_hgnc TEXT NOT NULL,

    PRIMARY KEY (file_hash, gene_hgnc),
    FOREIGN KEY (file_hash) REFERENCES files (hash)
);

CREATE TABLE IF NOT EXISTS variants (
    file_hash TEXT NOT NULL,
    gene_hgnc TEXT NOT NULL,
    gene_variation INTEGER NOT NULL,

    chrom TEXT NOT NULL,
    pos INTEGER NOT NULL,
    id TEXT,
    ref TEXT NOT NULL,
    alt TEXT,
    qual REAL,
    filter TEXT,
    info TEXT NOT NULL,
    format TEXT,

    start_pos INTEGER NOT NULL,
    end_pos INTEGER NOT NULL,
    alleles TEXT NOT NULL,
    affected_start INTEGER NOT NULL,
    affected_end INTEGER NOT NULL,
    var_type TEXT NOT NULL,
    var_subtype TEXT NOT NULL,

    PRIMARY KEY (file_hash, gene_hgnc, gene_variation),
    FOREIGN KEY (file_hash, gene_hgnc) REFERENCES genes (file_hash, gene_hgnc)
);

CREATE TABLE IF NOT EXISTS annotations (
    file_hash TEXT NOT NULL,
    gene_hgnc TEXT NOT NULL,
    gene_variation INTEGER NOT NULL,
    variation_annotation INTEGER NOT NULL,

    alt TEXT,
    effect TEXT,
    impact TEXT,
    gene TEXT,
    gene_id TEXT,
    feature_type TEXT,
    feature_id TEXT,
    transcript_biotype TEXT,
    rank_to_total TEXT,
    hgvs_dna TEXT,
    hgvs_protein TEXT,
    cdna_pos_to_cdna_len TEXT,
    cds_pos_to_cds_len TEXT,
    prot_pos_to_prot_len TEXT,
    distance_to_feature TEXT,
    note TEXT,

    PRIMARY KEY (file_hash, gene_hgnc, gene_variation, variation_annotation),
    FOREIGN KEY (file_hash, gene_hgnc, gene_variation)
        REFERENCES variants (file_hash, gene_hgnc, gene_variation)
);

CREATE TABLE IF NOT EXISTS gene_sets (
    name TEXT PRIMARY KEY,
    description TEXT
);

CREATE TABLE IF NOT EXISTS gene_set_members (
    gene_set TEXT NOT NULL,
    position INTEGER NOT NULL,
    gene_hgnc TEXT NOT NULL,

    PRIMARY KEY (gene_set, gene_hgnc),
    FOREIGN KEY (gene_set) REFERENCES gene_sets (name)
);

CREATE INDEX IF NOT EXISTS tasks_file_hash ON tasks (file_hash);
";

/// Create all tables that do not exist yet.
pub fn create_tables(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(CREATE_TABLES)?;
    Ok(())
}
