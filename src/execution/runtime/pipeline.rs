// Unary pipeline operators: filter, project, apply a function, limit,
// sort, and kNN distance scoring.

use std::sync::Arc;

use crate::error::{DbError, Result};
use crate::execution::logical::{FilterPredicate, KnnPredicate, SortKey};
use crate::function::{Function, FunctionRegistry};
use crate::storage::compare;
use crate::value::{Binding, BindingContext, ColumnDef, Name, Record, Type, TypeKind, Value};

use super::{compare_rows, Operator};

/// Evaluates `predicate` against each input row, dropping rows that
/// don't match. A predicate with no literal (`FilterPredicate::any`)
/// passes every row through.
pub struct FilterOperator {
    input: Box<dyn Operator>,
    predicate: FilterPredicate,
}

impl FilterOperator {
    pub fn new(input: Box<dyn Operator>, predicate: FilterPredicate) -> Self {
        Self { input, predicate }
    }
}

impl Operator for FilterOperator {
    fn columns(&self) -> &[ColumnDef] {
        self.input.columns()
    }

    fn next(&mut self, ctx: &mut BindingContext) -> Result<Option<Record>> {
        loop {
            match self.input.next(ctx)? {
                Some(record) => {
                    let keep = match self.predicate.literal() {
                        None => true,
                        Some(literal) => match record.get(self.predicate.column.name.simple_name()) {
                            Some(value) => compare(self.predicate.operator, value, literal),
                            None => false,
                        },
                    };
                    if keep {
                        return Ok(Some(record));
                    }
                }
                None => return Ok(None),
            }
        }
    }

    fn close(&mut self) {
        self.input.close();
    }
}

/// Invokes a resolved function against each row's argument columns and
/// writes (or overwrites) `out_column`. Resolution happens
/// once, at construction, rather than per row.
pub struct FunctionOperator {
    input: Box<dyn Operator>,
    function: Arc<dyn Function>,
    vectorized: Option<Arc<dyn crate::function::VectorizedFunction>>,
    arguments: Vec<ColumnDef>,
    out_column: ColumnDef,
    output_columns: Vec<ColumnDef>,
}

impl FunctionOperator {
    pub fn new(
        input: Box<dyn Operator>,
        registry: &FunctionRegistry,
        name: Name,
        arguments: Vec<ColumnDef>,
        out_column: ColumnDef,
        vectorized: bool,
    ) -> Result<Self> {
        let arg_types: Vec<Type> = arguments.iter().map(|c| c.col_type).collect();
        let function = registry.resolve(&name.to_string(), &arg_types)?;
        // `SimdRule` only ever flips this flag for a function whose
        // `as_vectorizable()` is `Some`; if it somehow isn't, fall
        // back to the scalar path rather than failing the query.
        let vectorized = if vectorized {
            match function.as_vectorizable() {
                Some(vf) => Some(vf.vectorized()),
                None => {
                    tracing::warn!(function = %name, "vectorized flag set on a non-vectorizable function, using scalar path");
                    None
                }
            }
        } else {
            None
        };
        let mut output_columns = input.columns().to_vec();
        if !output_columns.contains(&out_column) {
            output_columns.push(out_column.clone());
        }
        Ok(Self {
            input,
            function,
            vectorized,
            arguments,
            out_column,
            output_columns,
        })
    }
}

impl Operator for FunctionOperator {
    fn columns(&self) -> &[ColumnDef] {
        &self.output_columns
    }

    fn next(&mut self, ctx: &mut BindingContext) -> Result<Option<Record>> {
        match self.input.next(ctx)? {
            Some(mut record) => {
                let mut call_arguments = Vec::with_capacity(self.arguments.len());
                for argument in &self.arguments {
                    let value = record
                        .get(argument.name.simple_name())
                        .cloned()
                        .ok_or_else(|| DbError::query_binding(format!("missing argument column '{}'", argument.name)))?;
                    call_arguments.push(value);
                }
                let result = match &self.vectorized {
                    Some(vf) => vf.invoke(&call_arguments)?,
                    None => self.function.invoke(&call_arguments)?,
                };
                if let Some(idx) = record.columns.iter().position(|c| c == &self.out_column) {
                    record.values[idx] = result;
                } else {
                    record.columns.push(self.out_column.clone());
                    record.values.push(result);
                }
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        self.input.close();
    }
}

/// Projects each row down to `columns`, in order. Fails if the
/// input record doesn't carry a requested column — a planner bug, since
/// `propagate`'s `requires` accounting should have prevented this.
pub struct ProjectionOperator {
    input: Box<dyn Operator>,
    columns: Vec<ColumnDef>,
}

impl ProjectionOperator {
    pub fn new(input: Box<dyn Operator>, columns: Vec<ColumnDef>) -> Self {
        Self { input, columns }
    }
}

impl Operator for ProjectionOperator {
    fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    fn next(&mut self, ctx: &mut BindingContext) -> Result<Option<Record>> {
        match self.input.next(ctx)? {
            Some(record) => {
                let projected = record
                    .project(&self.columns)
                    .ok_or_else(|| DbError::internal("projection requested a column the input record does not carry"))?;
                Ok(Some(projected))
            }
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        self.input.close();
    }
}

/// Skips `skip` rows, then emits at most `limit`.
pub struct LimitOperator {
    input: Box<dyn Operator>,
    skip: usize,
    limit: usize,
    skipped: usize,
    emitted: usize,
}

impl LimitOperator {
    pub fn new(input: Box<dyn Operator>, skip: usize, limit: usize) -> Self {
        Self {
            input,
            skip,
            limit,
            skipped: 0,
            emitted: 0,
        }
    }
}

impl Operator for LimitOperator {
    fn columns(&self) -> &[ColumnDef] {
        self.input.columns()
    }

    fn next(&mut self, ctx: &mut BindingContext) -> Result<Option<Record>> {
        if self.emitted >= self.limit {
            return Ok(None);
        }
        loop {
            match self.input.next(ctx)? {
                Some(record) => {
                    if self.skipped < self.skip {
                        self.skipped += 1;
                        continue;
                    }
                    self.emitted += 1;
                    return Ok(Some(record));
                }
                None => return Ok(None),
            }
        }
    }

    fn close(&mut self) {
        self.input.close();
    }
}

/// A single-strand `PipelineBreaker`: materializes its entire input, sorts
/// it by `sort_on`, then streams the sorted rows. The NAry,
/// bounded-heap counterpart lives in [`super::merge::MergeLimitingHeapSortOperator`].
pub struct SortOperator {
    input: Box<dyn Operator>,
    sort_on: Vec<SortKey>,
    sorted: Option<std::vec::IntoIter<Record>>,
}

impl SortOperator {
    pub fn new(input: Box<dyn Operator>, sort_on: Vec<SortKey>) -> Self {
        Self {
            input,
            sort_on,
            sorted: None,
        }
    }

    fn materialize(&mut self, ctx: &mut BindingContext) -> Result<()> {
        let mut rows = Vec::new();
        while let Some(record) = self.input.next(ctx)? {
            rows.push(record);
        }
        rows.sort_by(|a, b| compare_rows(&self.sort_on, a, b));
        self.sorted = Some(rows.into_iter());
        Ok(())
    }
}

impl Operator for SortOperator {
    fn columns(&self) -> &[ColumnDef] {
        self.input.columns()
    }

    fn is_breaker(&self) -> bool {
        true
    }

    fn next(&mut self, ctx: &mut BindingContext) -> Result<Option<Record>> {
        if self.sorted.is_none() {
            self.materialize(ctx)?;
        }
        Ok(self.sorted.as_mut().expect("materialized above").next())
    }

    fn close(&mut self) {
        self.input.close();
    }
}

/// Scores each row by `predicate`'s distance kernel against a late-bound
/// query vector, writing (or overwriting) a `<column>.distance` column.
///
/// The query vector is deliberately not part of `KnnPredicate` (its
/// `digest()` only folds in the predicate's *shape*, never a
/// reference-derived hash, so it stays stable across processes); at
/// execution time it
/// is resolved from the `BindingContext` under the binding id
/// `predicate.query_fingerprint`, which the query-binding layer is
/// responsible for populating before the first pull.
pub struct KnnOperator {
    input: Box<dyn Operator>,
    predicate: KnnPredicate,
    distance_column: ColumnDef,
    output_columns: Vec<ColumnDef>,
}

impl KnnOperator {
    pub fn new(input: Box<dyn Operator>, predicate: KnnPredicate) -> Self {
        let parent = predicate.column.name.parent().unwrap_or_else(|| predicate.column.name.clone());
        let distance_column = ColumnDef::new(parent.child("distance"), Type::scalar(TypeKind::Double), false, false);
        let mut output_columns = input.columns().to_vec();
        if !output_columns.contains(&distance_column) {
            output_columns.push(distance_column.clone());
        }
        Self {
            input,
            predicate,
            distance_column,
            output_columns,
        }
    }
}

impl Operator for KnnOperator {
    fn columns(&self) -> &[ColumnDef] {
        &self.output_columns
    }

    fn next(&mut self, ctx: &mut BindingContext) -> Result<Option<Record>> {
        match self.input.next(ctx)? {
            Some(mut record) => {
                let query = match ctx.resolve(self.predicate.query_fingerprint) {
                    Some(Binding::Literal(Value::DoubleVector(v))) => v.clone(),
                    Some(_) => return Err(DbError::query_binding("kNN query binding is not a double vector literal")),
                    None => return Err(DbError::query_binding("kNN query vector binding was not resolved before execution")),
                };
                let probe = match record.get(self.predicate.column.name.simple_name()) {
                    Some(Value::DoubleVector(v)) => v.clone(),
                    _ => return Err(DbError::query_binding("kNN probe column is not a double vector")),
                };
                let kernel = crate::function::build_f64_kernel(self.predicate.distance, probe.len());
                // Scalar and vectorized kernels agree within the documented
                // ULP bound; favoring vectorized here mirrors what the
                // `SimdRule` would already have picked for a wide enough
                // predicate.
                let distance = kernel.vectorized(&query, &probe);
                if let Some(idx) = record.columns.iter().position(|c| c == &self.distance_column) {
                    record.values[idx] = Value::Double(distance);
                } else {
                    record.columns.push(self.distance_column.clone());
                    record.values.push(Value::Double(distance));
                }
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        self.input.close();
    }
}
