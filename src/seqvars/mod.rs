//! Sequence variant VCF processing.

pub mod ann;
pub mod annotate;
pub mod filtered;
pub mod header;
pub mod ingest;
pub mod normalize;
pub mod record;
pub mod validate;
