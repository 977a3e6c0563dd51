//! Align a source file's column layout with the target table.

use crate::error::{LoadError, Result};
use crate::types::{ColumnSpec, HeaderMode};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Header name comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeaderMatch {
    #[default]
    CaseInsensitive,
    Exact,
}

impl HeaderMatch {
    fn matches(&self, header: &str, column: &str) -> bool {
        match self {
            HeaderMatch::CaseInsensitive => header.trim().eq_ignore_ascii_case(column),
            HeaderMatch::Exact => header == column,
        }
    }
}

/// One source field and the table column it feeds, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    /// 0-based position in the source line
    pub source_index: usize,
    /// `None` keeps an unmatched header field as a placeholder
    pub target: Option<ColumnSpec>,
}

/// Result of aligning a source layout to the target columns.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    mode: HeaderMode,
    targets: Vec<ColumnSpec>,
    mappings: Vec<ColumnMapping>,
    /// target index -> source index
    source_for_target: Vec<Option<usize>>,
    unmatched_headers: Vec<String>,
}

impl Reconciliation {
    pub fn mode(&self) -> HeaderMode {
        self.mode
    }

    /// Target columns in table order.
    pub fn targets(&self) -> &[ColumnSpec] {
        &self.targets
    }

    pub fn mappings(&self) -> &[ColumnMapping] {
        &self.mappings
    }

    pub fn unmatched_headers(&self) -> &[String] {
        &self.unmatched_headers
    }

    /// Source field index that feeds target column `target_index`.
    pub fn source_for_target(&self, target_index: usize) -> Option<usize> {
        self.source_for_target.get(target_index).copied().flatten()
    }

    /// Number of target columns that receive a value.
    pub fn mapped_count(&self) -> usize {
        self.source_for_target.iter().filter(|s| s.is_some()).count()
    }

    /// Whether source fields already line up one-to-one with target columns.
    pub fn is_identity(&self) -> bool {
        self.source_for_target
            .iter()
            .enumerate()
            .all(|(target, source)| *source == Some(target))
    }

    /// Reorder one parsed line into target-column order.
    ///
    /// Missing source fields and unmapped targets come back as `None`;
    /// source fields past the mapped width are ignored.
    pub fn project<'a>(&self, fields: &[&'a str]) -> Vec<Option<&'a str>> {
        self.source_for_target
            .iter()
            .map(|source| source.and_then(|idx| fields.get(idx).copied()))
            .collect()
    }
}

/// Maps file columns onto target columns by name or by position.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnReconciler {
    pub mode: HeaderMode,
    pub header_match: HeaderMatch,
    /// ByName only: every header must equal the table column at the same position.
    pub strict: bool,
}

impl ColumnReconciler {
    pub fn new(mode: HeaderMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn with_header_match(mut self, header_match: HeaderMatch) -> Self {
        self.header_match = header_match;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Reconcile `targets` (table order) with an optional source header.
    ///
    /// `table` is only used for error messages.
    pub fn reconcile(
        &self,
        table: &str,
        targets: &[ColumnSpec],
        header: Option<&[&str]>,
    ) -> Result<Reconciliation> {
        if targets.is_empty() {
            return Err(LoadError::table_not_found(table));
        }

        match self.mode {
            HeaderMode::ByName => {
                let header = header.ok_or_else(|| {
                    LoadError::invalid_config("Header row required to match columns by name")
                })?;
                self.by_name(targets, header)
            }
            HeaderMode::ByPosition | HeaderMode::NoHeader => {
                Ok(self.by_position(targets, header.map(|h| h.len())))
            }
        }
    }

    fn by_name(&self, targets: &[ColumnSpec], header: &[&str]) -> Result<Reconciliation> {
        if self.strict {
            check_strict(targets, header, self.header_match)?;
        }

        let mut source_for_target = vec![None; targets.len()];
        let mut mappings = Vec::with_capacity(header.len());
        let mut unmatched = Vec::new();

        for (source_index, raw_name) in header.iter().enumerate() {
            let name = crate::delimited::strip_outer_quotes(raw_name.trim());
            let found = targets
                .iter()
                .position(|col| self.header_match.matches(name, &col.name))
                .filter(|&t| source_for_target[t].is_none());

            match found {
                Some(target_index) => {
                    source_for_target[target_index] = Some(source_index);
                    mappings.push(ColumnMapping {
                        source_index,
                        target: Some(targets[target_index].clone()),
                    });
                }
                None => {
                    warn!("Header '{}' has no matching table column; field will be skipped", name);
                    unmatched.push(name.to_string());
                    mappings.push(ColumnMapping {
                        source_index,
                        target: None,
                    });
                }
            }
        }

        Ok(Reconciliation {
            mode: HeaderMode::ByName,
            targets: targets.to_vec(),
            mappings,
            source_for_target,
            unmatched_headers: unmatched,
        })
    }

    fn by_position(&self, targets: &[ColumnSpec], source_width: Option<usize>) -> Reconciliation {
        // Without a header sample every target column is assumed present;
        // short rows simply project to None.
        let mapped = source_width.unwrap_or(targets.len()).min(targets.len());
        let source_for_target = (0..targets.len())
            .map(|idx| (idx < mapped).then_some(idx))
            .collect();
        let mappings = targets[..mapped]
            .iter()
            .enumerate()
            .map(|(idx, col)| ColumnMapping {
                source_index: idx,
                target: Some(col.clone()),
            })
            .collect();

        Reconciliation {
            mode: self.mode,
            targets: targets.to_vec(),
            mappings,
            source_for_target,
            unmatched_headers: Vec::new(),
        }
    }
}

fn check_strict(targets: &[ColumnSpec], header: &[&str], header_match: HeaderMatch) -> Result<()> {
    for position in 0..header.len().max(targets.len()) {
        let found = header
            .get(position)
            .map(|h| crate::delimited::strip_outer_quotes(h.trim()));
        let expected = targets.get(position).map(|c| c.name.as_str());
        let ok = match (found, expected) {
            (Some(f), Some(e)) => header_match.matches(f, e),
            _ => false,
        };
        if !ok {
            return Err(LoadError::ColumnMismatch {
                position: position + 1,
                expected: expected.unwrap_or("<none>").to_string(),
                found: found.unwrap_or("<none>").to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MaxLength;

    fn cols(names: &[&str]) -> Vec<ColumnSpec> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| ColumnSpec::new(i as u32 + 1, *n, "varchar", MaxLength::Bounded(50)))
            .collect()
    }

    #[test]
    fn test_no_columns_is_table_not_found() {
        let err = ColumnReconciler::new(HeaderMode::NoHeader)
            .reconcile("dbo.missing", &[], None)
            .unwrap_err();
        assert!(matches!(err, LoadError::TableNotFound { .. }));
    }

    #[test]
    fn test_by_name_reorders() {
        let targets = cols(&["id", "name", "city"]);
        let rec = ColumnReconciler::new(HeaderMode::ByName)
            .reconcile("t", &targets, Some(&["city", "id", "name"][..]))
            .unwrap();
        assert_eq!(rec.source_for_target(0), Some(1));
        assert_eq!(rec.source_for_target(1), Some(2));
        assert_eq!(rec.source_for_target(2), Some(0));
        assert!(!rec.is_identity());
        assert_eq!(rec.project(&["Paris", "7", "Ann"]), vec![Some("7"), Some("Ann"), Some("Paris")]);
    }

    #[test]
    fn test_by_name_unmatched_header_is_placeholder() {
        let targets = cols(&["id", "name"]);
        let rec = ColumnReconciler::new(HeaderMode::ByName)
            .reconcile("t", &targets, Some(&["id", "junk", "name"][..]))
            .unwrap();
        assert_eq!(rec.unmatched_headers(), &["junk".to_string()]);
        assert_eq!(rec.mappings().len(), 3);
        assert!(rec.mappings()[1].target.is_none());
        assert_eq!(rec.project(&["1", "x", "Bob"]), vec![Some("1"), Some("Bob")]);
    }

    #[test]
    fn test_header_case_sensitivity_is_configurable() {
        let targets = cols(&["CustomerId"]);
        let insensitive = ColumnReconciler::new(HeaderMode::ByName)
            .reconcile("t", &targets, Some(&["customerid"][..]))
            .unwrap();
        assert_eq!(insensitive.mapped_count(), 1);

        let exact = ColumnReconciler::new(HeaderMode::ByName)
            .with_header_match(HeaderMatch::Exact)
            .reconcile("t", &targets, Some(&["customerid"][..]))
            .unwrap();
        assert_eq!(exact.mapped_count(), 0);
        assert_eq!(exact.unmatched_headers(), &["customerid".to_string()]);
    }

    #[test]
    fn test_quoted_header_names_match() {
        let targets = cols(&["id"]);
        let rec = ColumnReconciler::new(HeaderMode::ByName)
            .reconcile("t", &targets, Some(&["\"id\""][..]))
            .unwrap();
        assert_eq!(rec.source_for_target(0), Some(0));
    }

    #[test]
    fn test_strict_mode_rejects_divergence() {
        let targets = cols(&["id", "name"]);
        let err = ColumnReconciler::new(HeaderMode::ByName)
            .strict(true)
            .reconcile("t", &targets, Some(&["name", "id"][..]))
            .unwrap_err();
        match err {
            LoadError::ColumnMismatch { position, expected, found } => {
                assert_eq!(position, 1);
                assert_eq!(expected, "id");
                assert_eq!(found, "name");
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = ColumnReconciler::new(HeaderMode::ByName)
            .strict(true)
            .reconcile("t", &targets, Some(&["id"][..]))
            .unwrap_err();
        assert!(matches!(err, LoadError::ColumnMismatch { position: 2, .. }));
    }

    #[test]
    fn test_by_position_extra_source_columns_ignored() {
        let targets = cols(&["a", "b"]);
        let rec = ColumnReconciler::new(HeaderMode::ByPosition)
            .reconcile("t", &targets, Some(&["x", "y", "z"][..]))
            .unwrap();
        assert!(rec.is_identity());
        assert_eq!(rec.project(&["1", "2", "3"]), vec![Some("1"), Some("2")]);
    }

    #[test]
    fn test_by_position_extra_target_columns_unmapped() {
        let targets = cols(&["a", "b", "c"]);
        let rec = ColumnReconciler::new(HeaderMode::ByPosition)
            .reconcile("t", &targets, Some(&["x"][..]))
            .unwrap();
        assert_eq!(rec.mapped_count(), 1);
        assert_eq!(rec.source_for_target(2), None);
        assert_eq!(rec.project(&["1", "2"]), vec![Some("1"), None, None]);
    }

    #[test]
    fn test_no_header_maps_every_target() {
        let targets = cols(&["a", "b"]);
        let rec = ColumnReconciler::new(HeaderMode::NoHeader)
            .reconcile("t", &targets, None)
            .unwrap();
        assert!(rec.is_identity());
        assert_eq!(rec.project(&["1"]), vec![Some("1"), None]);
    }

    #[test]
    fn test_by_name_requires_header() {
        let err = ColumnReconciler::new(HeaderMode::ByName)
            .reconcile("t", &cols(&["a"]), None)
            .unwrap_err();
        assert!(matches!(err, LoadError::InvalidConfig(_)));
    }
}
