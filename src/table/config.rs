//! Lookup table configuration.
//!
//! [`TableConfig`] controls how interval bounds are compared and which row
//! wins when several rows could match the same record.

/// How interval bounds are compared.
///
/// The default, [`Boundary::Inclusive`], closes both ends. Two rows whose
/// intervals only touch at a shared edge (`[16, 20]` then `[20, 25]`) are
/// accepted; a record exactly on the edge matches the row that wins under
/// the table's [`Precedence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Boundary {
    /// `[lo, hi]`; shared edges between rows are resolved by precedence.
    #[default]
    Inclusive,

    /// `[lo, hi]`; rows sharing an edge are rejected at construction.
    InclusiveStrict,

    /// `[lo, hi)`.
    LowerInclusive,

    /// `(lo, hi]`.
    UpperInclusive,
}

impl Boundary {
    /// Whether `x` falls inside the interval.
    pub fn contains(self, lo: f64, hi: f64, x: f64) -> bool {
        match self {
            Boundary::Inclusive | Boundary::InclusiveStrict => lo <= x && x <= hi,
            Boundary::LowerInclusive => lo <= x && x < hi,
            Boundary::UpperInclusive => lo < x && x <= hi,
        }
    }

    /// Whether two intervals overlap in a way precedence may not resolve.
    pub(crate) fn overlaps(self, a: (f64, f64), b: (f64, f64)) -> bool {
        let lo = a.0.max(b.0);
        let hi = a.1.min(b.1);
        match self {
            Boundary::InclusiveStrict => lo <= hi,
            Boundary::LowerInclusive | Boundary::UpperInclusive => lo < hi,
            Boundary::Inclusive => {
                if lo != hi {
                    return lo < hi;
                }
                // a single common point is fine only when it is the upper
                // edge of one proper interval and the lower edge of the other
                let proper = a.0 < a.1 && b.0 < b.1;
                !(proper && (a.1 == b.0 || b.1 == a.0))
            }
        }
    }
}

/// Which row wins when more than one row matches a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Precedence {
    /// Rows are tried in declaration order.
    #[default]
    FirstDeclared,

    /// Rows without wildcards are tried before rows with wildcards; each
    /// group keeps declaration order. Wildcard rows then act as fallbacks
    /// for values not listed explicitly.
    SpecificFirst,
}

/// Configuration for a [`LookupTable`](super::LookupTable).
///
/// # Examples
///
/// ```
/// use u_rating::table::{Boundary, Precedence, TableConfig};
///
/// let config = TableConfig::default()
///     .with_boundary(Boundary::LowerInclusive)
///     .with_precedence(Precedence::SpecificFirst);
/// assert_eq!(config.boundary, Boundary::LowerInclusive);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TableConfig {
    /// Interval bound comparison.
    pub boundary: Boundary,

    /// Row precedence among matching rows.
    pub precedence: Precedence,
}

impl TableConfig {
    /// Sets the interval boundary policy.
    pub fn with_boundary(mut self, boundary: Boundary) -> Self {
        self.boundary = boundary;
        self
    }

    /// Sets the row precedence policy.
    pub fn with_precedence(mut self, precedence: Precedence) -> Self {
        self.precedence = precedence;
        self
    }

    /// Strict preset: closed intervals, shared edges rejected.
    pub fn strict() -> Self {
        Self {
            boundary: Boundary::InclusiveStrict,
            precedence: Precedence::FirstDeclared,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TableConfig::default();
        assert_eq!(config.boundary, Boundary::Inclusive);
        assert_eq!(config.precedence, Precedence::FirstDeclared);
    }

    #[test]
    fn test_contains() {
        assert!(Boundary::Inclusive.contains(1.0, 2.0, 2.0));
        assert!(Boundary::LowerInclusive.contains(1.0, 2.0, 1.0));
        assert!(!Boundary::LowerInclusive.contains(1.0, 2.0, 2.0));
        assert!(!Boundary::UpperInclusive.contains(1.0, 2.0, 1.0));
        assert!(Boundary::UpperInclusive.contains(1.0, 2.0, 2.0));
        assert!(Boundary::Inclusive.contains(f64::NEG_INFINITY, 0.0, -1e300));
    }

    #[test]
    fn test_shared_edge_tolerated_when_inclusive() {
        assert!(!Boundary::Inclusive.overlaps((16.0, 20.0), (20.0, 25.0)));
        assert!(!Boundary::Inclusive.overlaps((20.0, 25.0), (16.0, 20.0)));
        assert!(Boundary::InclusiveStrict.overlaps((16.0, 20.0), (20.0, 25.0)));
        assert!(!Boundary::LowerInclusive.overlaps((16.0, 20.0), (20.0, 25.0)));
    }

    #[test]
    fn test_genuine_overlap_detected() {
        assert!(Boundary::Inclusive.overlaps((16.0, 21.0), (20.0, 25.0)));
        assert!(Boundary::Inclusive.overlaps((0.0, 10.0), (5.0, 5.0)));
        assert!(Boundary::Inclusive.overlaps((5.0, 5.0), (5.0, 5.0)));
        assert!(!Boundary::Inclusive.overlaps((0.0, 1.0), (2.0, 3.0)));
    }
}
