//! Read-only aggregations over a file's variants and annotations.
//!
//! Effect-based summaries leave out `intergenic_region` annotations.  All
//! results come in a fixed order: grouping keys ascending, counts descending.

use rusqlite::{Connection, ToSql};

use crate::{db::Store, err::StorageError};

/// Number of variants per chromosome and gene.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VariantCount {
    pub chrom: String,
    pub gene_hgnc: String,
    pub count: i64,
}

/// Number of annotations per chromosome, gene, impact, and effect.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EffectCount {
    pub chrom: String,
    pub gene_hgnc: String,
    pub impact: Option<String>,
    pub effect: Option<String>,
    pub count: i64,
}

/// Number of annotations per chromosome, gene, and transcript biotype.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BiotypeCount {
    pub chrom: String,
    pub gene_hgnc: String,
    pub transcript_biotype: Option<String>,
    pub count: i64,
}

/// Number of annotations per impact for one chromosome and gene.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ImpactCounts {
    pub chrom: String,
    pub gene_hgnc: String,
    pub high: i64,
    pub moderate: i64,
    pub low: i64,
    pub modifier: i64,
}

/// Totals of one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FileSummary {
    pub genes: i64,
    pub variations: i64,
    pub effects: i64,
}

/// All analyses of one file.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Report {
    pub file: FileSummary,
    pub variants: Vec<VariantCount>,
    pub effects_by_impact: Vec<EffectCount>,
    pub transcripts: Vec<BiotypeCount>,
    pub impacts: Vec<ImpactCounts>,
}

const JOIN_ANNOTATIONS: &str = "FROM variants v JOIN annotations a \
    ON v.file_hash = a.file_hash AND v.gene_hgnc = a.gene_hgnc \
    AND v.gene_variation = a.gene_variation";

/// Filter on file, optional gene, and non-intergenic effects.
fn effect_where(gene_hgnc: Option<&str>) -> &'static str {
    if gene_hgnc.is_some() {
        "WHERE v.file_hash = ?1 AND v.gene_hgnc = ?2 \
         AND (a.effect IS NULL OR a.effect <> 'intergenic_region')"
    } else {
        "WHERE v.file_hash = ?1 \
         AND (a.effect IS NULL OR a.effect <> 'intergenic_region')"
    }
}

fn query_all<T, F>(
    conn: &Connection,
    sql: &str,
    file_hash: &str,
    gene_hgnc: Option<&str>,
    map: F,
) -> Result<Vec<T>, StorageError>
where
    F: FnMut(&rusqlite::Row) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare(sql)?;
    let params: Vec<&dyn ToSql> = match &gene_hgnc {
        Some(gene_hgnc) => vec![&file_hash, gene_hgnc],
        None => vec![&file_hash],
    };
    let rows = stmt
        .query_map(params.as_slice(), map)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn variants_summary(conn: &Connection, file_hash: &str) -> Result<Vec<VariantCount>, StorageError> {
    query_all(
        conn,
        "SELECT chrom, gene_hgnc, COUNT(*) AS count FROM variants \
         WHERE file_hash = ?1 \
         GROUP BY chrom, gene_hgnc \
         ORDER BY chrom ASC, count DESC, gene_hgnc ASC",
        file_hash,
        None,
        |row| {
            Ok(VariantCount {
                chrom: row.get(0)?,
                gene_hgnc: row.get(1)?,
                count: row.get(2)?,
            })
        },
    )
}

fn effects_by_impact_summary(
    conn: &Connection,
    file_hash: &str,
    gene_hgnc: Option<&str>,
) -> Result<Vec<EffectCount>, StorageError> {
    let sql = format!(
        "SELECT v.chrom, v.gene_hgnc, a.impact, a.effect, COUNT(*) AS count {} {} \
         GROUP BY v.chrom, v.gene_hgnc, a.impact, a.effect \
         ORDER BY v.chrom ASC, v.gene_hgnc ASC, a.impact ASC, count DESC, a.effect ASC",
        JOIN_ANNOTATIONS,
        effect_where(gene_hgnc)
    );
    query_all(conn, &sql, file_hash, gene_hgnc, |row| {
        Ok(EffectCount {
            chrom: row.get(0)?,
            gene_hgnc: row.get(1)?,
            impact: row.get(2)?,
            effect: row.get(3)?,
            count: row.get(4)?,
        })
    })
}

fn transcripts_overview(
    conn: &Connection,
    file_hash: &str,
    gene_hgnc: Option<&str>,
) -> Result<Vec<BiotypeCount>, StorageError> {
    let sql = format!(
        "SELECT v.chrom, v.gene_hgnc, a.transcript_biotype, COUNT(*) AS count {} {} \
         GROUP BY v.chrom, v.gene_hgnc, a.transcript_biotype \
         ORDER BY v.chrom ASC, v.gene_hgnc ASC, count DESC, a.transcript_biotype ASC",
        JOIN_ANNOTATIONS,
        effect_where(gene_hgnc)
    );
    query_all(conn, &sql, file_hash, gene_hgnc, |row| {
        Ok(BiotypeCount {
            chrom: row.get(0)?,
            gene_hgnc: row.get(1)?,
            transcript_biotype: row.get(2)?,
            count: row.get(3)?,
        })
    })
}

fn impact_summary(conn: &Connection, file_hash: &str) -> Result<Vec<ImpactCounts>, StorageError> {
    let sql = format!(
        "SELECT v.chrom, v.gene_hgnc, \
         SUM(CASE a.impact WHEN 'HIGH' THEN 1 ELSE 0 END) AS high, \
         SUM(CASE a.impact WHEN 'MODERATE' THEN 1 ELSE 0 END) AS moderate, \
         SUM(CASE a.impact WHEN 'LOW' THEN 1 ELSE 0 END) AS low, \
         SUM(CASE a.impact WHEN 'MODIFIER' THEN 1 ELSE 0 END) AS modifier {} {} \
         GROUP BY v.chrom, v.gene_hgnc \
         ORDER BY v.chrom ASC, v.gene_hgnc ASC, high DESC, moderate DESC, low DESC, modifier DESC",
        JOIN_ANNOTATIONS,
        effect_where(None)
    );
    query_all(conn, &sql, file_hash, None, |row| {
        Ok(ImpactCounts {
            chrom: row.get(0)?,
            gene_hgnc: row.get(1)?,
            high: row.get(2)?,
            moderate: row.get(3)?,
            low: row.get(4)?,
            modifier: row.get(5)?,
        })
    })
}

fn file_summary(conn: &Connection, file_hash: &str) -> Result<FileSummary, StorageError> {
    let summary = conn.query_row(
        "SELECT \
         (SELECT COUNT(DISTINCT gene_hgnc) FROM annotations WHERE file_hash = ?1), \
         (SELECT COUNT(*) FROM (SELECT DISTINCT gene_hgnc, gene_variation \
                                FROM annotations WHERE file_hash = ?1)), \
         (SELECT COUNT(*) FROM annotations WHERE file_hash = ?1)",
        [file_hash],
        |row| {
            Ok(FileSummary {
                genes: row.get(0)?,
                variations: row.get(1)?,
                effects: row.get(2)?,
            })
        },
    )?;
    Ok(summary)
}

impl Store {
    /// Variants per chromosome and gene.
    pub fn variants_summary(&self, file_hash: &str) -> Result<Vec<VariantCount>, StorageError> {
        self.read(|conn| variants_summary(conn, file_hash))
    }

    /// Annotations per impact and effect, optionally for one gene only.
    pub fn effects_by_impact_summary(
        &self,
        file_hash: &str,
        gene_hgnc: Option<&str>,
    ) -> Result<Vec<EffectCount>, StorageError> {
        self.read(|conn| effects_by_impact_summary(conn, file_hash, gene_hgnc))
    }

    /// Annotations per transcript biotype, optionally for one gene only.
    pub fn transcripts_overview(
        &self,
        file_hash: &str,
        gene_hgnc: Option<&str>,
    ) -> Result<Vec<BiotypeCount>, StorageError> {
        self.read(|conn| transcripts_overview(conn, file_hash, gene_hgnc))
    }

    /// Annotations per impact for each gene.
    pub fn impact_summary(&self, file_hash: &str) -> Result<Vec<ImpactCounts>, StorageError> {
        self.read(|conn| impact_summary(conn, file_hash))
    }

    /// Distinct genes and variants, and number of annotations of a file.
    pub fn file_summary(&self, file_hash: &str) -> Result<FileSummary, StorageError> {
        self.read(|conn| file_summary(conn, file_hash))
    }

    /// All analyses of a file, computed under one read lock.
    pub fn report(&self, file_hash: &str) -> Result<Report, StorageError> {
        self.read(|conn| {
            Ok(Report {
                file: file_summary(conn, file_hash)?,
                variants: variants_summary(conn, file_hash)?,
                effects_by_impact: effects_by_impact_summary(conn, file_hash, None)?,
                transcripts: transcripts_overview(conn, file_hash, None)?,
                impacts: impact_summary(conn, file_hash)?,
            })
        })
    }
}
