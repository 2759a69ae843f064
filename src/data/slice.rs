use anyhow::{bail, Result};
use itertools::Either;

/// A selection along one axis of a matrix or annotation table.
///
/// Value filters produce `Index` selections (ordered store positions);
/// the absence of a filter is `All`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AxisSelect {
    All,
    Index(Vec<usize>),
}

impl AxisSelect {
    pub fn is_all(&self) -> bool {
        matches!(self, AxisSelect::All)
    }

    /// Number of positions selected out of an axis of length `bound`.
    pub fn len(&self, bound: usize) -> usize {
        match self {
            AxisSelect::All => bound,
            AxisSelect::Index(idx) => idx.len(),
        }
    }

    pub fn is_empty(&self, bound: usize) -> bool {
        self.len(bound) == 0
    }

    /// Iterate the selected positions, in selection order.
    pub fn iter(&self, bound: usize) -> impl Iterator<Item = usize> + Clone + '_ {
        match self {
            AxisSelect::All => Either::Left(0..bound),
            AxisSelect::Index(idx) => Either::Right(idx.iter().copied()),
        }
    }

    pub fn bound_check(&self, bound: usize) -> Result<()> {
        if let AxisSelect::Index(idx) = self {
            if let Some(i) = idx.iter().find(|i| **i >= bound) {
                bail!("index {} out of bounds for axis of length {}", i, bound);
            }
        }
        Ok(())
    }
}

impl From<Vec<usize>> for AxisSelect {
    fn from(idx: Vec<usize>) -> Self {
        AxisSelect::Index(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_covers_the_bound() {
        let sel = AxisSelect::All;
        assert_eq!(sel.len(5), 5);
        assert_eq!(sel.iter(3).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(sel.bound_check(0).is_ok());
    }

    #[test]
    fn index_preserves_order() {
        let sel = AxisSelect::from(vec![4, 0, 2]);
        assert_eq!(sel.len(100), 3);
        assert_eq!(sel.iter(100).collect::<Vec<_>>(), vec![4, 0, 2]);
    }

    #[test]
    fn bound_check_rejects_out_of_range() {
        let sel = AxisSelect::from(vec![0, 7]);
        assert!(sel.bound_check(7).is_err());
        assert!(sel.bound_check(8).is_ok());
    }

    #[test]
    fn empty_index_is_empty() {
        assert!(AxisSelect::from(vec![]).is_empty(10));
        assert!(!AxisSelect::All.is_empty(10));
    }
}
