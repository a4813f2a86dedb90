//! Query translation pipeline
//!
//! `Translator::translate` applies the passes in order (normalize, discover
//! fields, native rewrite) and assembles a `NativeQuery`. It never executes
//! anything; the caller hands the native query to a store and applies the
//! compiled projection to the converted results.
//!
//! Operator rules:
//! - filters and orderings must precede skip/take
//! - a later `OrderBy` replaces earlier orderings; `ThenBy` needs an `OrderBy`
//! - `Select` and `Count` end the query
//! - an ascending `ThenBy` on the synthetic key is dropped when
//!   `elide_natural_tiebreak` is on (natural order is already the tie-break),
//!   together with every ordering after it

use crate::discovery::{discover_fields, FieldSet};
use crate::expr::{Expr, QueryExpr, QueryOp};
use crate::native::{native_rewrite, to_native_filter, to_sort_key};
use crate::normalize::{normalize, NormalizeContext};
use crate::projection::CompiledProjection;
use docshape_core::{Error, Metadata, MetadataConfig, Result, StructuralShape};
use docshape_storage::{NativeExpr, NativeQuery};
use std::borrow::Cow;
use tracing::debug;

/// Translation switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslateOptions {
    /// Drop ascending secondary orderings on the synthetic key
    pub elide_natural_tiebreak: bool,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self {
            elide_natural_tiebreak: true,
        }
    }
}

impl From<&MetadataConfig> for TranslateOptions {
    fn from(config: &MetadataConfig) -> Self {
        Self {
            elide_natural_tiebreak: config.elide_natural_tiebreak,
        }
    }
}

/// Result of translating one query
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedQuery {
    /// Query for the store
    pub native: NativeQuery,
    /// Client-side projection, if the query selects
    pub projection: Option<CompiledProjection>,
    /// True if the query asks for a count instead of rows
    pub count: bool,
    /// Referenced fields and the minimal shape they were bound to
    pub fields: FieldSet,
}

/// Translates resource queries into native queries over one metadata snapshot
#[derive(Debug, Clone, Copy)]
pub struct Translator<'m> {
    metadata: &'m Metadata,
    options: TranslateOptions,
}

#[derive(Default)]
struct Plan {
    filters: Vec<Expr>,
    order: Vec<(Expr, bool)>,
    skip: Option<u64>,
    take: Option<u64>,
    select: Option<Vec<Expr>>,
    count: bool,
}

impl<'m> Translator<'m> {
    /// Translator over a metadata snapshot
    pub fn new(metadata: &'m Metadata, options: TranslateOptions) -> Self {
        Translator { metadata, options }
    }

    /// Translate a query
    ///
    /// # Errors
    ///
    /// `UnknownResourceSet`, `StructuralMismatch` for unknown properties,
    /// `UnsupportedExpression` for operator sequences or expressions with no
    /// native form.
    pub fn translate(&self, query: &QueryExpr) -> Result<TranslatedQuery> {
        let model = &self.metadata.model;
        let set = model
            .resolve_set(&query.set)
            .ok_or_else(|| Error::UnknownResourceSet(query.set.clone()))?;
        let entity = model.entity_type_of(set.name())?;
        let full_shape: Cow<'_, StructuralShape> = match self.metadata.shape(set.name()) {
            Some(shape) => Cow::Borrowed(shape),
            None => Cow::Owned(StructuralShape::for_collection(
                model,
                &self.metadata.provider_types,
                set.name(),
            )?),
        };
        let ctx = NormalizeContext { model, entity };

        let plan = plan(query, &ctx)?;

        let referenced = plan
            .filters
            .iter()
            .chain(plan.order.iter().map(|(key, _)| key))
            .chain(plan.select.iter().flatten());
        let fields = discover_fields(referenced, &full_shape)?;

        let mut filter: Option<NativeExpr> = None;
        for predicate in &plan.filters {
            let lowered = to_native_filter(&native_rewrite(predicate.clone(), &fields.shape)?)?;
            filter = Some(match filter {
                Some(existing) => existing.and(lowered),
                None => lowered,
            });
        }

        let mut sort = Vec::with_capacity(plan.order.len());
        for (i, (key, descending)) in plan.order.iter().enumerate() {
            let key = to_sort_key(&native_rewrite(key.clone(), &fields.shape)?, *descending)?;
            if i > 0 && !descending && key.is_natural() && self.options.elide_natural_tiebreak {
                // The key is unique, so nothing after it can change the order
                debug!(
                    target: "docshape::query",
                    set = set.name(),
                    dropped = plan.order.len() - i,
                    "Eliding natural-order tie-break"
                );
                break;
            }
            sort.push(key);
        }

        let projection = plan
            .select
            .as_deref()
            .map(|fields| CompiledProjection::compile(fields, &full_shape))
            .transpose()?;

        let native = NativeQuery {
            collection: set.name().to_string(),
            filter,
            sort,
            skip: plan.skip,
            limit: plan.take,
        };
        debug!(
            target: "docshape::query",
            set = set.name(),
            filter = ?native.filter.as_ref().map(|f| f.to_string()),
            sort = ?native.sort,
            skip = ?native.skip,
            limit = ?native.limit,
            count = plan.count,
            "Translated query"
        );
        Ok(TranslatedQuery {
            native,
            projection,
            count: plan.count,
            fields,
        })
    }
}

fn plan(query: &QueryExpr, ctx: &NormalizeContext<'_>) -> Result<Plan> {
    let mut plan = Plan::default();
    for op in &query.ops {
        if plan.select.is_some() || plan.count {
            return Err(Error::unsupported(format!(
                "{} cannot follow select or count",
                op_name(op)
            )));
        }
        let paged = plan.skip.is_some() || plan.take.is_some();
        match op {
            QueryOp::Filter(_) | QueryOp::OrderBy { .. } | QueryOp::ThenBy { .. } if paged => {
                return Err(Error::unsupported(format!(
                    "{} cannot follow skip or take",
                    op_name(op)
                )));
            }
            QueryOp::Filter(predicate) => plan.filters.push(normalize(predicate.clone(), ctx)?),
            QueryOp::OrderBy { key, descending } => {
                plan.order.clear();
                plan.order.push((normalize(key.clone(), ctx)?, *descending));
            }
            QueryOp::ThenBy { key, descending } => {
                if plan.order.is_empty() {
                    return Err(Error::unsupported("then-by requires a preceding order-by"));
                }
                plan.order.push((normalize(key.clone(), ctx)?, *descending));
            }
            QueryOp::Skip(n) => {
                if plan.take.is_some() {
                    return Err(Error::unsupported("skip cannot follow take"));
                }
                plan.skip = Some(plan.skip.unwrap_or(0).saturating_add(*n));
            }
            QueryOp::Take(n) => {
                plan.take = Some(plan.take.map_or(*n, |t| t.min(*n)));
            }
            QueryOp::Select(fields) => {
                let normalized = fields
                    .iter()
                    .map(|f| normalize(f.clone(), ctx))
                    .collect::<Result<Vec<_>>>()?;
                plan.select = Some(normalized);
            }
            QueryOp::Count => plan.count = true,
        }
    }
    Ok(plan)
}

fn op_name(op: &QueryOp) -> &'static str {
    match op {
        QueryOp::Filter(_) => "filter",
        QueryOp::OrderBy { .. } => "order-by",
        QueryOp::ThenBy { .. } => "then-by",
        QueryOp::Skip(_) => "skip",
        QueryOp::Take(_) => "take",
        QueryOp::Select(_) => "select",
        QueryOp::Count => "count",
    }
}
