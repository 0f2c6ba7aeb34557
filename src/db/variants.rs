//! Variants and annotations.

use rusqlite::{params, Connection, OptionalExtension};

use crate::{
    db::{
        files::parse_column,
        filter::{AnnotationFilter, Predicates},
        model::{Annotation, Variant},
        Store,
    },
    err::StorageError,
    seqvars::{ann::AnnField, ann::Impact, normalize::GeneData, record::Interval},
};

/// Join list values for storage; empty lists are stored as `NULL`.
fn join_list(values: &[String]) -> Option<String> {
    if values.is_empty() {
        None
    } else {
        Some(values.join(","))
    }
}

/// Split a stored list back into its values.
fn split_list(value: Option<String>) -> Vec<String> {
    match value {
        Some(value) if !value.is_empty() => value.split(',').map(|s| s.to_string()).collect(),
        _ => Vec::new(),
    }
}

/// Insert the gene row with all variants and annotations of `data`.
pub(crate) fn insert_gene_data(
    conn: &Connection,
    file_hash: &str,
    data: &GeneData,
) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO genes (file_hash, gene_hgnc) VALUES (?1, ?2)",
        params![file_hash, &data.gene_hgnc],
    )?;

    let mut insert_variant = conn.prepare_cached(
        "INSERT INTO variants (
            file_hash, gene_hgnc, gene_variation,
            chrom, pos, id, ref, alt, qual, filter, info, format,
            start_pos, end_pos, alleles, affected_start, affected_end, var_type, var_subtype
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
    )?;
    for variant in &data.variants {
        insert_variant.execute(params![
            file_hash,
            &data.gene_hgnc,
            variant.gene_variation,
            &variant.chrom,
            variant.pos,
            &variant.id,
            &variant.reference,
            join_list(&variant.alt),
            variant.qual,
            join_list(&variant.filter),
            serde_json::to_string(&variant.info)?,
            &variant.format,
            variant.interval.start,
            variant.interval.end,
            variant.alleles.join(","),
            variant.affected.start,
            variant.affected.end,
            variant.var_type.to_string(),
            &variant.var_subtype,
        ])?;
    }

    let mut insert_annotation = conn.prepare_cached(
        "INSERT INTO annotations (
            file_hash, gene_hgnc, gene_variation, variation_annotation,
            alt, effect, impact, gene, gene_id, feature_type, feature_id, transcript_biotype,
            rank_to_total, hgvs_dna, hgvs_protein, cdna_pos_to_cdna_len, cds_pos_to_cds_len,
            prot_pos_to_prot_len, distance_to_feature, note
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
    )?;
    for row in &data.annotations {
        let ann = &row.ann;
        insert_annotation.execute(params![
            file_hash,
            &data.gene_hgnc,
            row.gene_variation,
            row.variation_annotation,
            &ann.alt,
            &ann.effect,
            ann.impact.map(|impact| impact.to_string()),
            &ann.gene,
            &ann.gene_id,
            &ann.feature_type,
            &ann.feature_id,
            &ann.transcript_biotype,
            &ann.rank_to_total,
            &ann.hgvs_dna,
            &ann.hgvs_protein,
            &ann.cdna_pos_to_cdna_len,
            &ann.cds_pos_to_cds_len,
            &ann.prot_pos_to_prot_len,
            &ann.distance_to_feature,
            &ann.note,
        ])?;
    }

    tracing::trace!(
        "inserted gene {} with {} variants and {} annotations",
        &data.gene_hgnc,
        data.variants.len(),
        data.annotations.len()
    );
    Ok(())
}

const VARIANT_COLUMNS: &str = "v.file_hash, v.gene_hgnc, v.gene_variation, v.chrom, v.pos, \
    v.id, v.ref, v.alt, v.qual, v.filter, v.info, v.format, v.start_pos, v.end_pos, \
    v.alleles, v.affected_start, v.affected_end, v.var_type, v.var_subtype";

/// A variant row with its list and map columns still encoded.
struct RawVariant {
    variant: Variant,
    alt: Option<String>,
    filter: Option<String>,
    info: String,
    alleles: String,
}

fn raw_variant(row: &rusqlite::Row) -> rusqlite::Result<RawVariant> {
    Ok(RawVariant {
        variant: Variant {
            file_hash: row.get(0)?,
            gene_hgnc: row.get(1)?,
            gene_variation: row.get(2)?,
            chrom: row.get(3)?,
            pos: row.get(4)?,
            id: row.get(5)?,
            reference: row.get(6)?,
            alt: Vec::new(),
            qual: row.get(8)?,
            filter: Vec::new(),
            info: Default::default(),
            format: row.get(11)?,
            start: row.get(12)?,
            end: row.get(13)?,
            alleles: Vec::new(),
            affected_start: row.get(15)?,
            affected_end: row.get(16)?,
            var_type: row.get(17)?,
            var_subtype: row.get(18)?,
        },
        alt: row.get(7)?,
        filter: row.get(9)?,
        info: row.get(10)?,
        alleles: row.get(14)?,
    })
}

/// Decode the list and map columns and convert the interval to one-based.
fn variant_from_raw(raw: RawVariant) -> Result<Variant, StorageError> {
    let RawVariant {
        variant,
        alt,
        filter,
        info,
        alleles,
    } = raw;
    let (start, end) = Interval::new(variant.start, variant.end).to_one_based();
    Ok(Variant {
        alt: split_list(alt),
        filter: split_list(filter),
        info: serde_json::from_str(&info)?,
        alleles: split_list(Some(alleles)),
        start,
        end,
        ..variant
    })
}

const ANNOTATION_COLUMNS: &str = "a.file_hash, a.gene_hgnc, a.gene_variation, \
    a.variation_annotation, a.alt, a.effect, a.impact, a.gene, a.gene_id, a.feature_type, \
    a.feature_id, a.transcript_biotype, a.rank_to_total, a.hgvs_dna, a.hgvs_protein, \
    a.cdna_pos_to_cdna_len, a.cds_pos_to_cds_len, a.prot_pos_to_prot_len, \
    a.distance_to_feature, a.note";

fn raw_annotation(row: &rusqlite::Row) -> rusqlite::Result<(Annotation, Option<String>)> {
    Ok((
        Annotation {
            file_hash: row.get(0)?,
            gene_hgnc: row.get(1)?,
            gene_variation: row.get(2)?,
            variation_annotation: row.get(3)?,
            ann: AnnField {
                alt: row.get(4)?,
                effect: row.get(5)?,
                impact: None,
                gene: row.get(7)?,
                gene_id: row.get(8)?,
                feature_type: row.get(9)?,
                feature_id: row.get(10)?,
                transcript_biotype: row.get(11)?,
                rank_to_total: row.get(12)?,
                hgvs_dna: row.get(13)?,
                hgvs_protein: row.get(14)?,
                cdna_pos_to_cdna_len: row.get(15)?,
                cds_pos_to_cds_len: row.get(16)?,
                prot_pos_to_prot_len: row.get(17)?,
                distance_to_feature: row.get(18)?,
                note: row.get(19)?,
            },
        },
        row.get(6)?,
    ))
}

fn annotation_from_raw(raw: (Annotation, Option<String>)) -> Result<Annotation, StorageError> {
    let (mut annotation, impact) = raw;
    annotation.ann.impact = impact
        .map(|impact| parse_column::<Impact>("annotations.impact", impact))
        .transpose()?;
    Ok(annotation)
}

/// Distinct annotation values of a gene, for building filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AnnotationFacets {
    pub effects: Vec<String>,
    /// Ordered by severity.
    pub impacts: Vec<Impact>,
    pub biotypes: Vec<String>,
    pub feature_types: Vec<String>,
}

fn distinct_values(
    conn: &Connection,
    column: &str,
    file_hash: &str,
    gene_hgnc: &str,
) -> Result<Vec<String>, StorageError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT DISTINCT {column} FROM annotations \
         WHERE file_hash = ?1 AND gene_hgnc = ?2 AND {column} IS NOT NULL \
         ORDER BY {column} ASC",
        column = column
    ))?;
    let values = stmt
        .query_map([file_hash, gene_hgnc], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(values)
}

impl Store {
    /// Look up one variant by key.
    pub fn get_variant(
        &self,
        file_hash: &str,
        gene_hgnc: &str,
        gene_variation: i64,
    ) -> Result<Option<Variant>, StorageError> {
        self.read(|conn| {
            let raw = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM variants v \
                         WHERE v.file_hash = ?1 AND v.gene_hgnc = ?2 AND v.gene_variation = ?3",
                        VARIANT_COLUMNS
                    ),
                    params![file_hash, gene_hgnc, gene_variation],
                    raw_variant,
                )
                .optional()?;
            raw.map(variant_from_raw).transpose()
        })
    }

    /// Variants of a gene in file order.
    ///
    /// With a non-empty `filter`, only variants with at least one matching
    /// annotation are returned.
    pub fn get_variants(
        &self,
        file_hash: &str,
        gene_hgnc: &str,
        filter: &AnnotationFilter,
    ) -> Result<Vec<Variant>, StorageError> {
        let mut predicates = Predicates::new();
        predicates
            .eq("v.file_hash", file_hash.to_string())
            .eq("v.gene_hgnc", gene_hgnc.to_string());
        if !filter.is_empty() {
            let mut inner = Predicates::new();
            inner
                .condition("a.file_hash = v.file_hash")
                .condition("a.gene_hgnc = v.gene_hgnc")
                .condition("a.gene_variation = v.gene_variation");
            filter.add_predicates("a", &mut inner);
            predicates.exists("annotations a", inner);
        }
        let sql = format!(
            "SELECT {} FROM variants v {} ORDER BY v.gene_variation ASC",
            VARIANT_COLUMNS,
            predicates.where_clause()
        );
        tracing::trace!("get_variants: {}", &sql);

        self.read(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let raws = stmt
                .query_map(predicates.params().as_slice(), raw_variant)?
                .collect::<Result<Vec<_>, _>>()?;
            raws.into_iter().map(variant_from_raw).collect()
        })
    }

    /// Annotations of a gene, or of one of its variants, in file order.
    pub fn get_annotations(
        &self,
        file_hash: &str,
        gene_hgnc: &str,
        gene_variation: Option<i64>,
        filter: &AnnotationFilter,
    ) -> Result<Vec<Annotation>, StorageError> {
        let mut predicates = Predicates::new();
        predicates
            .eq("a.file_hash", file_hash.to_string())
            .eq("a.gene_hgnc", gene_hgnc.to_string());
        if let Some(gene_variation) = gene_variation {
            predicates.eq("a.gene_variation", gene_variation);
        }
        filter.add_predicates("a", &mut predicates);
        let sql = format!(
            "SELECT {} FROM annotations a {} \
             ORDER BY a.gene_variation ASC, a.variation_annotation ASC",
            ANNOTATION_COLUMNS,
            predicates.where_clause()
        );
        tracing::trace!("get_annotations: {}", &sql);

        self.read(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let raws = stmt
                .query_map(predicates.params().as_slice(), raw_annotation)?
                .collect::<Result<Vec<_>, _>>()?;
            raws.into_iter().map(annotation_from_raw).collect()
        })
    }

    /// Distinct effects, impacts, biotypes, and feature types of a gene's annotations.
    pub fn get_annotation_facets(
        &self,
        file_hash: &str,
        gene_hgnc: &str,
    ) -> Result<AnnotationFacets, StorageError> {
        self.read(|conn| {
            let mut impacts = distinct_values(conn, "impact", file_hash, gene_hgnc)?
                .into_iter()
                .map(|impact| parse_column::<Impact>("annotations.impact", impact))
                .collect::<Result<Vec<_>, _>>()?;
            impacts.sort();
            Ok(AnnotationFacets {
                effects: distinct_values(conn, "effect", file_hash, gene_hgnc)?,
                impacts,
                biotypes: distinct_values(conn, "transcript_biotype", file_hash, gene_hgnc)?,
                feature_types: distinct_values(conn, "feature_type", file_hash, gene_hgnc)?,
            })
        })
    }
}
