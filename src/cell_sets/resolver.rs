//! # Cell Set Resolution
//!
//! Turns the symbolic references of a comparison (`cellSet`, `compareWith`, `basis`)
//! into two disjoint, concrete cell id sets.
//!
//! ## Reference forms
//!
//! - a literal cell set key, which always wins over keyword interpretation
//! - `rest`: every cell in the other side's root hierarchy, minus that side's cells
//! - `all` (or any key starting with `all`): every cell in the experiment
//!
//! ## Ordering
//!
//! ```text
//! expand both sides -> drop shared cells from both -> intersect with basis -> type
//! ```
//!
//! Cells claimed by both sides are excluded from the comparison altogether so that
//! ambiguous membership never biases either group.

use crate::cell_sets::store::CellSetStore;
use crate::error::{ComparisonSide, Result, WorkerError};
use crate::models::{CellIds, CellSetNode, CellSetTree};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

const REST_KEYWORD: &str = "rest";
const ALL_PREFIX: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonType {
    Within,
    Between,
}

impl fmt::Display for ComparisonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonType::Within => write!(f, "within"),
            ComparisonType::Between => write!(f, "between"),
        }
    }
}

impl FromStr for ComparisonType {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "within" => Ok(ComparisonType::Within),
            "between" => Ok(ComparisonType::Between),
            other => Err(WorkerError::parameter(format!(
                "comparisonType must be 'within' or 'between', got '{other}'"
            ))),
        }
    }
}

/// Symbolic references of one comparison
#[derive(Debug, Clone, Copy)]
pub struct ComparisonQuery<'a> {
    pub cell_set: &'a str,
    pub compare_with: &'a str,
    pub basis: Option<&'a str>,
    pub comparison_type: Option<ComparisonType>,
}

impl<'a> ComparisonQuery<'a> {
    pub fn new(cell_set: &'a str, compare_with: &'a str) -> Self {
        Self {
            cell_set,
            compare_with,
            basis: None,
            comparison_type: None,
        }
    }

    pub fn with_basis(mut self, basis: &'a str) -> Self {
        self.basis = Some(basis);
        self
    }

    pub fn with_comparison_type(mut self, comparison_type: ComparisonType) -> Self {
        self.comparison_type = Some(comparison_type);
        self
    }
}

/// Two disjoint groups ready for a differential comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedComparison {
    pub base_cells: CellIds,
    pub background_cells: CellIds,
    pub comparison_type: ComparisonType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reference<'a> {
    Literal(&'a str),
    Rest,
    All,
}

/// Resolves comparisons against one experiment's indexed forest
#[derive(Debug)]
pub struct CellSetResolver {
    tree: CellSetTree,
}

impl CellSetResolver {
    pub fn new(tree: CellSetTree) -> Self {
        Self { tree }
    }

    pub fn from_forest(forest: &[CellSetNode]) -> Result<Self> {
        Ok(Self::new(CellSetTree::build(forest)?))
    }

    /// Fetch the experiment's forest and index it for this request
    pub async fn load(store: &dyn CellSetStore, experiment_id: &str) -> Result<Self> {
        let forest = store.fetch(experiment_id).await?;
        let resolver = Self::from_forest(&forest)?;
        debug!(
            experiment_id = %experiment_id,
            cell_sets = resolver.tree.len(),
            cells = resolver.tree.all_cells().len(),
            "Indexed cell set forest"
        );
        Ok(resolver)
    }

    pub fn tree(&self) -> &CellSetTree {
        &self.tree
    }

    pub fn resolve(&self, query: &ComparisonQuery<'_>) -> Result<ResolvedComparison> {
        let first = self.classify(query.cell_set);
        let second = self.classify(query.compare_with);

        let mut base_cells = self.expand(first, second, ComparisonSide::First)?;
        let mut background_cells = self.expand(second, first, ComparisonSide::Second)?;

        let shared: CellIds = base_cells
            .intersection(&background_cells)
            .copied()
            .collect();
        base_cells.retain(|cell| !shared.contains(cell));
        background_cells.retain(|cell| !shared.contains(cell));

        if let Some(basis) = self.basis_cells(query.basis)? {
            base_cells.retain(|cell| basis.contains(cell));
            background_cells.retain(|cell| basis.contains(cell));
        }

        let comparison_type = match query.comparison_type {
            Some(explicit) => explicit,
            None => self.default_comparison_type(first, second)?,
        };

        debug!(
            cell_set = %query.cell_set,
            compare_with = %query.compare_with,
            basis = ?query.basis,
            excluded_shared = shared.len(),
            base = base_cells.len(),
            background = background_cells.len(),
            comparison_type = %comparison_type,
            "Resolved comparison"
        );

        Ok(ResolvedComparison {
            base_cells,
            background_cells,
            comparison_type,
        })
    }

    fn classify<'a>(&self, key: &'a str) -> Reference<'a> {
        if self.tree.contains(key) {
            Reference::Literal(key)
        } else if key == REST_KEYWORD {
            Reference::Rest
        } else if key.starts_with(ALL_PREFIX) {
            Reference::All
        } else {
            Reference::Literal(key)
        }
    }

    fn expand(
        &self,
        reference: Reference<'_>,
        other: Reference<'_>,
        side: ComparisonSide,
    ) -> Result<CellIds> {
        let (key, cells) = match reference {
            Reference::Literal(key) => {
                let cells = self
                    .tree
                    .cells(key)
                    .cloned()
                    .ok_or_else(|| WorkerError::cell_set_not_found(side, key))?;
                (key, cells)
            }
            Reference::All => (ALL_PREFIX, self.tree.all_cells().clone()),
            Reference::Rest => (REST_KEYWORD, self.rest_of(other, side)?),
        };

        if cells.is_empty() {
            return Err(WorkerError::cell_set_not_found(side, key));
        }
        Ok(cells)
    }

    /// Same-hierarchy complement of the other side
    fn rest_of(&self, other: Reference<'_>, side: ComparisonSide) -> Result<CellIds> {
        match other {
            Reference::Literal(key) => {
                let (hierarchy, own) = self
                    .tree
                    .hierarchy_of(key)
                    .zip(self.tree.cells(key))
                    .ok_or_else(|| WorkerError::cell_set_not_found(side.other(), key))?;
                Ok(self
                    .tree
                    .hierarchy_cells(hierarchy)
                    .map(|cells| cells.difference(own).copied().collect())
                    .unwrap_or_default())
            }
            Reference::All => Ok(CellIds::new()),
            Reference::Rest => Err(WorkerError::parameter(
                "cellSet and compareWith cannot both be 'rest'",
            )),
        }
    }

    fn basis_cells(&self, basis: Option<&str>) -> Result<Option<&CellIds>> {
        match basis {
            None => Ok(None),
            Some(key) => match self.tree.cells(key) {
                Some(cells) => Ok(Some(cells)),
                None if key.starts_with(ALL_PREFIX) => Ok(None),
                None => Err(WorkerError::invalid_basis(key)),
            },
        }
    }

    fn default_comparison_type(
        &self,
        first: Reference<'_>,
        second: Reference<'_>,
    ) -> Result<ComparisonType> {
        let (Reference::Literal(a), Reference::Literal(b)) = (first, second) else {
            return Ok(ComparisonType::Within);
        };

        if self.tree.hierarchy_of(a) == self.tree.hierarchy_of(b) {
            Ok(ComparisonType::Within)
        } else {
            Err(WorkerError::parameter(format!(
                "'{a}' and '{b}' belong to different cell set hierarchies; comparisonType must be given explicitly"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(cells: &CellIds) -> Vec<u32> {
        cells.iter().copied().collect()
    }

    fn flat(sets: &[(&str, &[u32])]) -> CellSetResolver {
        let forest: Vec<CellSetNode> = sets
            .iter()
            .map(|(key, cells)| CellSetNode::leaf(*key, cells.iter().copied()).as_root())
            .collect();
        CellSetResolver::from_forest(&forest).unwrap()
    }

    fn hierarchical() -> CellSetResolver {
        CellSetResolver::from_forest(&[
            CellSetNode::root(
                "louvain",
                vec![
                    CellSetNode::leaf("cluster1", [0]),
                    CellSetNode::leaf("cluster2", [1, 2]),
                ],
            ),
            CellSetNode::root(
                "sample",
                vec![
                    CellSetNode::leaf("basisCluster", [0, 1, 3]),
                    CellSetNode::leaf("otherSample", [2, 4, 5]),
                ],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_two_root_sets_resolve_verbatim_within() {
        let resolver = flat(&[("cluster1", &[4, 5]), ("cluster2", &[0, 1, 2, 3])]);
        let resolved = resolver
            .resolve(&ComparisonQuery::new("cluster1", "cluster2"))
            .unwrap();

        assert_eq!(ids(&resolved.base_cells), vec![4, 5]);
        assert_eq!(ids(&resolved.background_cells), vec![0, 1, 2, 3]);
        assert_eq!(resolved.comparison_type, ComparisonType::Within);
    }

    #[test]
    fn test_shared_cells_are_dropped_from_both_sides() {
        let resolver = flat(&[("cluster1", &[1, 2, 3]), ("cluster2", &[3, 4, 5])]);
        let resolved = resolver
            .resolve(&ComparisonQuery::new("cluster1", "cluster2"))
            .unwrap();

        assert_eq!(ids(&resolved.base_cells), vec![1, 2]);
        assert_eq!(ids(&resolved.background_cells), vec![4, 5]);
    }

    #[test]
    fn test_basis_restricts_both_sides() {
        let resolver = flat(&[
            ("cluster1", &[1, 2, 3]),
            ("cluster2", &[4, 5, 6]),
            ("basisCluster", &[3, 5, 6, 7]),
        ]);
        let resolved = resolver
            .resolve(&ComparisonQuery::new("cluster1", "cluster2").with_basis("basisCluster"))
            .unwrap();

        assert_eq!(ids(&resolved.base_cells), vec![3]);
        assert_eq!(ids(&resolved.background_cells), vec![5, 6]);
    }

    #[test]
    fn test_rest_stays_inside_the_other_sides_hierarchy() {
        let resolved = hierarchical()
            .resolve(&ComparisonQuery::new("cluster1", "rest"))
            .unwrap();

        assert_eq!(ids(&resolved.base_cells), vec![0]);
        assert_eq!(ids(&resolved.background_cells), vec![1, 2]);
        assert_eq!(resolved.comparison_type, ComparisonType::Within);
    }

    #[test]
    fn test_rest_may_be_the_first_side() {
        let resolved = hierarchical()
            .resolve(&ComparisonQuery::new("rest", "cluster2"))
            .unwrap();

        assert_eq!(ids(&resolved.base_cells), vec![0]);
        assert_eq!(ids(&resolved.background_cells), vec![1, 2]);
    }

    #[test]
    fn test_rest_of_a_lone_set_is_not_found() {
        let err = flat(&[("cluster1", &[1, 2])])
            .resolve(&ComparisonQuery::new("cluster1", "rest"))
            .unwrap_err();

        assert!(matches!(
            err,
            WorkerError::CellSetNotFound {
                side: ComparisonSide::Second,
                ..
            }
        ));
        assert!(err.to_string().contains("No cell id fulfills the 2nd cell set"));
    }

    #[test]
    fn test_unknown_keys_name_the_failing_side() {
        let resolver = hierarchical();

        let first = resolver
            .resolve(&ComparisonQuery::new("nope", "cluster2"))
            .unwrap_err();
        assert!(first.to_string().contains("1st"));

        let second = resolver
            .resolve(&ComparisonQuery::new("cluster1", "nope"))
            .unwrap_err();
        assert!(second.to_string().contains("2nd"));

        let anchored_on_unknown = resolver
            .resolve(&ComparisonQuery::new("rest", "nope"))
            .unwrap_err();
        assert!(matches!(
            anchored_on_unknown,
            WorkerError::CellSetNotFound {
                side: ComparisonSide::Second,
                ..
            }
        ));
    }

    #[test]
    fn test_all_prefix_spans_every_hierarchy() {
        let resolved = hierarchical()
            .resolve(
                &ComparisonQuery::new("cluster1", "all-cells")
                    .with_basis("all")
                    .with_comparison_type(ComparisonType::Between),
            )
            .unwrap();

        assert_eq!(ids(&resolved.base_cells), Vec::<u32>::new());
        assert_eq!(ids(&resolved.background_cells), vec![1, 2, 3, 4, 5]);
        assert_eq!(resolved.comparison_type, ComparisonType::Between);
    }

    #[test]
    fn test_literal_key_named_all_takes_precedence() {
        let resolver = flat(&[
            ("cluster1", &[1, 2]),
            ("cluster2", &[3, 4]),
            ("all", &[1, 3]),
        ]);
        let resolved = resolver
            .resolve(&ComparisonQuery::new("cluster1", "cluster2").with_basis("all"))
            .unwrap();

        assert_eq!(ids(&resolved.base_cells), vec![1]);
        assert_eq!(ids(&resolved.background_cells), vec![3]);
    }

    #[test]
    fn test_unknown_basis_is_invalid() {
        let err = hierarchical()
            .resolve(&ComparisonQuery::new("cluster1", "cluster2").with_basis("ghost"))
            .unwrap_err();
        assert!(matches!(err, WorkerError::InvalidBasis { ref key } if key == "ghost"));
    }

    #[test]
    fn test_cross_hierarchy_needs_an_explicit_type() {
        let resolver = hierarchical();

        let implicit = resolver.resolve(&ComparisonQuery::new("cluster1", "otherSample"));
        assert!(matches!(implicit, Err(WorkerError::Parameter(_))));

        let explicit = resolver
            .resolve(
                &ComparisonQuery::new("cluster1", "otherSample")
                    .with_comparison_type(ComparisonType::Between),
            )
            .unwrap();
        assert_eq!(explicit.comparison_type, ComparisonType::Between);
    }

    #[test]
    fn test_both_sides_rest_is_rejected() {
        let err = hierarchical()
            .resolve(&ComparisonQuery::new("rest", "rest"))
            .unwrap_err();
        assert!(matches!(err, WorkerError::Parameter(_)));
    }

    #[test]
    fn test_comparison_type_parsing() {
        assert_eq!("within".parse::<ComparisonType>().unwrap(), ComparisonType::Within);
        assert_eq!("between".parse::<ComparisonType>().unwrap(), ComparisonType::Between);
        assert!("sideways".parse::<ComparisonType>().is_err());
    }
}
