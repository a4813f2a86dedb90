//! Native query form
//!
//! `NativeQuery` is what the translator produces and what a `DocumentStore`
//! executes: a collection, an optional filter over native field paths, sort keys,
//! and paging. Constants carry their native type; stores compare them
//! without conversion. Projection happens client-side after conversion.

use docshape_core::NativeValue;
use std::fmt;

/// Comparison operator of a native filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Less than
    Lt,
    /// Less than or equal
    Le,
    /// Greater than
    Gt,
    /// Greater than or equal
    Ge,
}

impl CompareOp {
    /// Operator symbol
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "$eq",
            CompareOp::Ne => "$ne",
            CompareOp::Lt => "$lt",
            CompareOp::Le => "$lte",
            CompareOp::Gt => "$gt",
            CompareOp::Ge => "$gte",
        }
    }
}

/// Native filter expression
#[derive(Debug, Clone, PartialEq)]
pub enum NativeExpr {
    /// Constant truth value
    Const(bool),
    /// Compare a field (native path) with a constant
    ///
    /// `Eq` with `Null` matches missing fields; `Ne` with `Null` matches
    /// present, non-null fields.
    Compare {
        /// Native field path
        path: Vec<String>,
        /// Operator
        op: CompareOp,
        /// Constant, already in the field's native type
        value: NativeValue,
    },
    /// All of the sub-expressions hold
    And(Vec<NativeExpr>),
    /// Any of the sub-expressions holds
    Or(Vec<NativeExpr>),
    /// Negation
    Not(Box<NativeExpr>),
}

impl NativeExpr {
    /// Comparison helper
    pub fn compare(path: Vec<String>, op: CompareOp, value: impl Into<NativeValue>) -> Self {
        NativeExpr::Compare {
            path,
            op,
            value: value.into(),
        }
    }

    /// Conjunction of two expressions, flattening nested `And`
    pub fn and(self, other: NativeExpr) -> NativeExpr {
        match (self, other) {
            (NativeExpr::Const(true), e) | (e, NativeExpr::Const(true)) => e,
            (NativeExpr::And(mut a), NativeExpr::And(b)) => {
                a.extend(b);
                NativeExpr::And(a)
            }
            (NativeExpr::And(mut a), e) => {
                a.push(e);
                NativeExpr::And(a)
            }
            (e, NativeExpr::And(mut b)) => {
                b.insert(0, e);
                NativeExpr::And(b)
            }
            (a, b) => NativeExpr::And(vec![a, b]),
        }
    }
}

impl fmt::Display for NativeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeExpr::Const(b) => write!(f, "{}", b),
            NativeExpr::Compare { path, op, value } => {
                write!(f, "{{{}: {{{}: {:?}}}}}", path.join("."), op.symbol(), value)
            }
            NativeExpr::And(items) | NativeExpr::Or(items) => {
                let name = if matches!(self, NativeExpr::And(_)) {
                    "$and"
                } else {
                    "$or"
                };
                write!(f, "{{{}: [", name)?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]}}")
            }
            NativeExpr::Not(inner) => write!(f, "{{$not: {}}}", inner),
        }
    }
}

/// One sort key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKey {
    /// Order by a native field path
    Field {
        /// Native field path
        path: Vec<String>,
        /// Descending order
        descending: bool,
    },
    /// Storage (insertion) order
    Natural {
        /// Reverse storage order
        descending: bool,
    },
}

impl SortKey {
    /// Ascending field order
    pub fn asc(path: Vec<String>) -> Self {
        SortKey::Field {
            path,
            descending: false,
        }
    }

    /// Descending field order
    pub fn desc(path: Vec<String>) -> Self {
        SortKey::Field {
            path,
            descending: true,
        }
    }

    /// True for storage order
    pub fn is_natural(&self) -> bool {
        matches!(self, SortKey::Natural { .. })
    }
}

/// Direction of a natural-order scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanOrder {
    /// Oldest first
    #[default]
    Forward,
    /// Newest first
    Reverse,
}

/// Executable native query
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NativeQuery {
    /// Target collection
    pub collection: String,
    /// Filter; None matches everything
    pub filter: Option<NativeExpr>,
    /// Sort keys, most significant first
    pub sort: Vec<SortKey>,
    /// Documents to skip after sorting
    pub skip: Option<u64>,
    /// Maximum documents to return
    pub limit: Option<u64>,
}

impl NativeQuery {
    /// Query returning every document of a collection
    pub fn new(collection: impl Into<String>) -> Self {
        NativeQuery {
            collection: collection.into(),
            ..Default::default()
        }
    }

    /// Add a filter, ANDed with any existing one
    pub fn filter(mut self, expr: NativeExpr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    /// Append a sort key
    pub fn sort(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }

    /// Set skip
    pub fn skip(mut self, n: u64) -> Self {
        self.skip = Some(n);
        self
    }

    /// Set limit
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }
}
