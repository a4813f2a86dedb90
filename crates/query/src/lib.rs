//! Query translation for docshape
//!
//! Queries are written against the resource model (`QueryExpr` over `Expr`
//! lambdas) and translated into native queries in three passes:
//! - normalize: accessor calls to property access, static type tests, convert erasure
//! - discovery: referenced property paths and the minimal structural shape
//! - native rewrite: native fields, coerced constants, shim and redundancy rewrites
//!
//! Projection is compiled separately and applied client-side.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod discovery;
pub mod expr;
pub mod native;
pub mod normalize;
pub mod projection;
pub mod translator;

pub use discovery::{discover_fields, FieldSet};
pub use expr::{BinaryOp, Expr, QueryExpr, QueryOp};
pub use normalize::{normalize, NormalizeContext};
pub use projection::CompiledProjection;
pub use translator::{TranslateOptions, TranslatedQuery, Translator};
