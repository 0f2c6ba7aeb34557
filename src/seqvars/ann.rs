//! Functional-effect annotations as written into `INFO/ANN` by the annotator.

use crate::err::ParsingError;

/// Number of pipe-separated fields in one `ANN` block.
pub const ANN_FIELD_COUNT: usize = 16;

/// Putative impact of an effect, ordered from most to least severe.
#[derive(
    Debug,
    Clone,
    Copy,
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
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Impact {
    High,
    Moderate,
    Low,
    Modifier,
}

/// One effect annotation block of a variant.
///
/// Empty fields are kept as `None`.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnnField {
    /// The alternate allele the effect refers to.
    pub alt: Option<String>,
    /// Sequence Ontology effect term(s), `&`-concatenated if several.
    pub effect: Option<String>,
    pub impact: Option<Impact>,
    /// HGNC gene symbol.
    pub gene: Option<String>,
    pub gene_id: Option<String>,
    pub feature_type: Option<String>,
    pub feature_id: Option<String>,
    pub transcript_biotype: Option<String>,
    /// Exon or intron rank over total count, e.g. `3/11`.
    pub rank_to_total: Option<String>,
    pub hgvs_dna: Option<String>,
    pub hgvs_protein: Option<String>,
    pub cdna_pos_to_cdna_len: Option<String>,
    pub cds_pos_to_cds_len: Option<String>,
    pub prot_pos_to_prot_len: Option<String>,
    pub distance_to_feature: Option<String>,
    /// Errors, warnings or info codes.
    pub note: Option<String>,
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl std::str::FromStr for AnnField {
    type Err = ParsingError;

    /// Parse one `|`-delimited block; missing trailing fields are `None`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParsingError::new("empty ANN block"));
        }
        let fields = s.split('|').collect::<Vec<_>>();
        if fields.len() > ANN_FIELD_COUNT {
            return Err(ParsingError::new(format!(
                "ANN block has {} fields, expected {}: {:?}",
                fields.len(),
                ANN_FIELD_COUNT,
                s
            )));
        }
        let field = |idx: usize| fields.get(idx).and_then(|value| non_empty(value));

        let impact = match field(2) {
            Some(value) => Some(value.parse::<Impact>().map_err(|_| {
                ParsingError::new(format!("invalid impact {:?} in ANN block {:?}", value, s))
            })?),
            None => None,
        };

        Ok(AnnField {
            alt: field(0),
            effect: field(1),
            impact,
            gene: field(3),
            gene_id: field(4),
            feature_type: field(5),
            feature_id: field(6),
            transcript_biotype: field(7),
            rank_to_total: field(8),
            hgvs_dna: field(9),
            hgvs_protein: field(10),
            cdna_pos_to_cdna_len: field(11),
            cds_pos_to_cds_len: field(12),
            prot_pos_to_prot_len: field(13),
            distance_to_feature: field(14),
            note: field(15),
        })
    }
}
