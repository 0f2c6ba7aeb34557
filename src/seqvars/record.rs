//! Parsing of VCF data lines into structured variant records.

use indexmap::IndexMap;

use crate::{err::ParsingError, seqvars::ann::AnnField};

/// Number of mandatory VCF columns (`CHROM` to `INFO`).
const MANDATORY_COLUMNS: usize = 8;

/// Value of one `INFO` entry.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum InfoValue {
    /// Flag without value, e.g. `DB`.
    Flag(bool),
    /// Single value, e.g. `DP=12`.
    Single(String),
    /// Comma-separated values, e.g. `AF=0.1,0.2`.
    Multi(Vec<String>),
}

impl InfoValue {
    /// The values of the entry, empty for flags.
    pub fn values(&self) -> Vec<&str> {
        match self {
            InfoValue::Flag(_) => Vec::new(),
            InfoValue::Single(value) => vec![value.as_str()],
            InfoValue::Multi(values) => values.iter().map(|v| v.as_str()).collect(),
        }
    }
}

/// The `INFO` column, keys in file order.
pub type Info = IndexMap<String, InfoValue>;

/// Zero-based, half-open genomic interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Interval {
    pub start: i64,
    pub end: i64,
}

impl Interval {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Convert to the one-based, closed interval `[start + 1, end]`.
    pub fn to_one_based(self) -> (i64, i64) {
        (self.start + 1, self.end)
    }
}

/// Coarse classification of a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum VarType {
    Snp,
    Indel,
    Sv,
    Unknown,
}

/// One data line of a VCF file.
///
/// Sample columns are not kept.
#[derive(Debug, Clone, PartialEq)]
pub struct VcfRecord {
    pub chrom: String,
    /// One-based position.
    pub pos: i64,
    pub id: Option<String>,
    pub reference: String,
    /// Alternate alleles, empty for `.`.
    pub alt: Vec<String>,
    pub qual: Option<f64>,
    /// Filter tags, empty for `.`.
    pub filter: Vec<String>,
    pub info: Info,
    pub format: Option<String>,
}

fn missing_to_none(value: &str) -> Option<String> {
    if value.is_empty() || value == "." {
        None
    } else {
        Some(value.to_string())
    }
}

/// Parse the `INFO` column into an ordered map.
pub fn parse_info(raw: &str) -> Result<Info, ParsingError> {
    let mut result = Info::new();
    if raw.is_empty() || raw == "." {
        return Ok(result);
    }

    for entry in raw.split(';').filter(|entry| !entry.is_empty()) {
        let (key, value) = match entry.split_once('=') {
            Some((key, value)) => {
                let values = value.split(',').map(|s| s.to_string()).collect::<Vec<_>>();
                let value = if values.len() == 1 {
                    InfoValue::Single(value.to_string())
                } else {
                    InfoValue::Multi(values)
                };
                (key, value)
            }
            None => (entry, InfoValue::Flag(true)),
        };
        if key.is_empty() || key.contains(char::is_whitespace) {
            return Err(ParsingError::new(format!(
                "invalid INFO entry {:?} in {:?}",
                entry, raw
            )));
        }
        if result.insert(key.to_string(), value).is_some() {
            return Err(ParsingError::new(format!(
                "duplicate INFO key {:?} in {:?}",
                key, raw
            )));
        }
    }

    Ok(result)
}

impl std::str::FromStr for VcfRecord {
    type Err = ParsingError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches(|c: char| c == '\r' || c == '\n');
        let columns = line.split('\t').collect::<Vec<_>>();
        if columns.len() < MANDATORY_COLUMNS {
            return Err(ParsingError::new(format!(
                "expected at least {} tab-separated columns but found {} in line {:?}",
                MANDATORY_COLUMNS,
                columns.len(),
                line
            )));
        }

        let chrom = columns[0].to_string();
        if chrom.is_empty() {
            return Err(ParsingError::new(format!("empty CHROM in line {:?}", line)));
        }
        let pos: i64 = columns[1]
            .parse()
            .map_err(|e| ParsingError::new(format!("invalid POS {:?}: {}", columns[1], e)))?;
        if pos < 1 {
            return Err(ParsingError::new(format!(
                "POS must be one-based but was {}",
                pos
            )));
        }
        let reference = columns[3].to_string();
        if reference.is_empty() || reference == "." {
            return Err(ParsingError::new(format!("missing REF in line {:?}", line)));
        }
        let alt = if columns[4] == "." {
            Vec::new()
        } else {
            let alt = columns[4]
                .split(',')
                .map(|s| s.to_string())
                .collect::<Vec<_>>();
            if alt.iter().any(|allele| allele.is_empty()) {
                return Err(ParsingError::new(format!(
                    "empty allele in ALT {:?}",
                    columns[4]
                )));
            }
            alt
        };
        let qual = match columns[5] {
            "." => None,
            value => Some(
                value
                    .parse::<f64>()
                    .map_err(|e| ParsingError::new(format!("invalid QUAL {:?}: {}", value, e)))?,
            ),
        };
        let filter = match columns[6] {
            "." | "" => Vec::new(),
            value => value.split(';').map(|s| s.to_string()).collect(),
        };
        let info = parse_info(columns[7])?;
        let format = columns.get(8).and_then(|value| missing_to_none(value));

        Ok(VcfRecord {
            chrom,
            pos,
            id: missing_to_none(columns[2]),
            reference,
            alt,
            qual,
            filter,
            info,
            format,
        })
    }
}

/// Whether `allele` is a plain nucleotide sequence (no symbolic or breakend notation).
fn is_sequence(allele: &str) -> bool {
    allele
        .bytes()
        .all(|b| matches!(b.to_ascii_uppercase(), b'A' | b'C' | b'G' | b'T' | b'N' | b'*'))
}

fn is_purine(base: &str) -> bool {
    matches!(base, "A" | "G" | "a" | "g")
}

fn is_pyrimidine(base: &str) -> bool {
    matches!(base, "C" | "T" | "c" | "t")
}

impl VcfRecord {
    /// Remove `INFO/ANN` from the record and parse its effect blocks.
    ///
    /// Records without `ANN`, or with an empty or `.` value, yield no annotations.
    pub fn take_ann(&mut self) -> Result<Vec<AnnField>, ParsingError> {
        match self.info.shift_remove("ANN") {
            None => Ok(Vec::new()),
            Some(InfoValue::Flag(_)) => Err(ParsingError::new(format!(
                "ANN without value at {}:{}",
                self.chrom, self.pos
            ))),
            Some(InfoValue::Single(value)) if value.is_empty() || value == "." => Ok(Vec::new()),
            Some(value) => value
                .values()
                .into_iter()
                .map(|block| {
                    if block.is_empty() || block == "." {
                        Err(ParsingError::new(format!(
                            "empty ANN block at {}:{}",
                            self.chrom, self.pos
                        )))
                    } else {
                        block.parse::<AnnField>()
                    }
                })
                .collect(),
        }
    }

    /// `REF` followed by the `ALT` alleles.
    pub fn alleles(&self) -> Vec<String> {
        std::iter::once(self.reference.clone())
            .chain(self.alt.iter().cloned())
            .collect()
    }

    fn svtype(&self) -> Option<&str> {
        match self.info.get("SVTYPE") {
            Some(InfoValue::Single(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    fn info_end(&self) -> Option<i64> {
        match self.info.get("END") {
            Some(InfoValue::Single(value)) => value.parse().ok(),
            _ => None,
        }
    }

    /// Classify the variant.
    pub fn var_type(&self) -> VarType {
        if self.alt.is_empty() {
            VarType::Unknown
        } else if self.svtype().is_some() || self.alt.iter().any(|allele| !is_sequence(allele)) {
            VarType::Sv
        } else if self.reference.len() == 1 && self.alt.iter().all(|allele| allele.len() == 1) {
            VarType::Snp
        } else {
            VarType::Indel
        }
    }

    /// Refine the classification of `var_type()`.
    pub fn var_subtype(&self) -> String {
        let single_alt = if self.alt.len() == 1 {
            Some(self.alt[0].as_str())
        } else {
            None
        };
        let subtype = match (self.var_type(), single_alt) {
            (VarType::Snp, Some(alt)) => {
                let reference = self.reference.as_str();
                if (is_purine(reference) && is_purine(alt))
                    || (is_pyrimidine(reference) && is_pyrimidine(alt))
                {
                    "ts"
                } else {
                    "tv"
                }
            }
            (VarType::Indel, Some(alt)) => match self.reference.len().cmp(&alt.len()) {
                std::cmp::Ordering::Greater => "del",
                std::cmp::Ordering::Less => "ins",
                std::cmp::Ordering::Equal => "unknown",
            },
            (VarType::Sv, _) => {
                let is_breakend = self
                    .alt
                    .iter()
                    .any(|allele| allele.contains('[') || allele.contains(']'));
                match self.svtype() {
                    Some("BND") => "complex",
                    Some(svtype) => return svtype.to_string(),
                    None if is_breakend => "complex",
                    None => {
                        return single_alt
                            .and_then(|alt| alt.strip_prefix('<'))
                            .and_then(|alt| alt.strip_suffix('>'))
                            .unwrap_or("unknown")
                            .to_string()
                    }
                }
            }
            _ => "unknown",
        };
        subtype.to_string()
    }

    /// The reference span of the record, `END` for structural variants.
    pub fn interval(&self) -> Interval {
        let start = self.pos - 1;
        let end = match (self.var_type(), self.info_end()) {
            (VarType::Sv, Some(end)) => end,
            _ => start + self.reference.len() as i64,
        };
        Interval::new(start, end)
    }

    /// The reference bases actually changed by the variant.
    ///
    /// The padding base in front of indels is not part of the affected region,
    /// so single-base-REF insertions affect the empty interval `[POS, POS)`.
    pub fn affected_interval(&self) -> Interval {
        let start = self.pos - 1;
        let ref_len = self.reference.len() as i64;
        match self.var_type() {
            VarType::Unknown | VarType::Snp => Interval::new(start, start + ref_len),
            VarType::Sv => Interval::new(self.pos, self.interval().end),
            VarType::Indel => Interval::new(self.pos, self.pos - 1 + ref_len),
        }
    }
}
