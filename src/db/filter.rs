//! Parameterized filter predicates for annotation queries.

use itertools::Itertools;
use rusqlite::ToSql;

use crate::seqvars::ann::Impact;

/// A conjunction of SQL predicates with their bound parameters.
///
/// Clauses use positional `?` placeholders only.
#[derive(Default)]
pub struct Predicates {
    clauses: Vec<String>,
    params: Vec<Box<dyn ToSql>>,
}

impl std::fmt::Debug for Predicates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Predicates")
            .field("clauses", &self.clauses)
            .field("params", &self.params.len())
            .finish()
    }
}

impl Predicates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `column = value`.
    pub fn eq<T: ToSql + 'static>(&mut self, column: &str, value: T) -> &mut Self {
        self.clauses.push(format!("{} = ?", column));
        self.params.push(Box::new(value));
        self
    }

    /// Require `column` to be one of `values`; no restriction if `values` is empty.
    pub fn any_of<T: ToSql + Clone + 'static>(&mut self, column: &str, values: &[T]) -> &mut Self {
        if values.is_empty() {
            return self;
        }
        let placeholders = values.iter().map(|_| "?").join(", ");
        self.clauses
            .push(format!("{} IN ({})", column, placeholders));
        for value in values {
            self.params.push(Box::new(value.clone()));
        }
        self
    }

    /// Add a clause without parameters, e.g., a join condition.
    pub fn condition(&mut self, clause: &str) -> &mut Self {
        self.clauses.push(clause.to_string());
        self
    }

    /// Require a row in `table` matching all of `inner`.
    pub fn exists(&mut self, table: &str, inner: Predicates) -> &mut Self {
        self.clauses.push(format!(
            "EXISTS (SELECT 1 FROM {} {})",
            table,
            inner.where_clause()
        ));
        self.params.extend(inner.params);
        self
    }

    /// The `WHERE` clause, empty if there are no predicates.
    pub fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }

    /// The parameters, in placeholder order.
    pub fn params(&self) -> Vec<&dyn ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }
}

/// Restriction of annotations by effect, impact, biotype, and feature type.
///
/// An empty list does not restrict its dimension, so the default filter
/// matches everything.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize, clap::Args,
)]
pub struct AnnotationFilter {
    /// Effect terms to keep.
    #[arg(long = "effect", value_delimiter = ',')]
    pub effects: Vec<String>,
    /// Impacts to keep.
    #[arg(long = "impact", value_delimiter = ',')]
    pub impacts: Vec<Impact>,
    /// Transcript biotypes to keep.
    #[arg(long = "biotype", value_delimiter = ',')]
    pub biotypes: Vec<String>,
    /// Feature types to keep.
    #[arg(long = "feature-type", value_delimiter = ',')]
    pub feature_types: Vec<String>,
}

impl AnnotationFilter {
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
            && self.impacts.is_empty()
            && self.biotypes.is_empty()
            && self.feature_types.is_empty()
    }

    /// Add the predicates on the annotation table aliased as `alias`.
    pub fn add_predicates(&self, alias: &str, predicates: &mut Predicates) {
        let impacts = self
            .impacts
            .iter()
            .map(|impact| impact.to_string())
            .collect::<Vec<_>>();
        predicates
            .any_of(&format!("{}.effect", alias), &self.effects)
            .any_of(&format!("{}.impact", alias), &impacts)
            .any_of(&format!("{}.transcript_biotype", alias), &self.biotypes)
            .any_of(&format!("{}.feature_type", alias), &self.feature_types);
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{AnnotationFilter, Predicates};
    use crate::seqvars::ann::Impact;

    #[test]
    fn empty_filter_adds_no_predicates() {
        let mut predicates = Predicates::new();
        AnnotationFilter::default().add_predicates("a", &mut predicates);

        assert!(AnnotationFilter::default().is_empty());
        assert_eq!(predicates.where_clause(), "");
        assert!(predicates.params().is_empty());
    }

    #[test]
    fn filter_predicates_in_order() {
        let filter = AnnotationFilter {
            effects: vec!["missense_variant".into()],
            impacts: vec![Impact::High, Impact::Moderate],
            biotypes: vec![],
            feature_types: vec!["transcript".into()],
        };
        let mut predicates = Predicates::new();
        predicates.eq("a.file_hash", "abc".to_string());
        filter.add_predicates("a", &mut predicates);

        assert_eq!(
            predicates.where_clause(),
            "WHERE a.file_hash = ? AND a.effect IN (?) AND a.impact IN (?, ?) \
             AND a.feature_type IN (?)"
        );
        assert_eq!(predicates.params().len(), 5);
    }
}
