// Function / VectorizableFunction / VectorizedFunction traits.

use std::sync::Arc;

use crate::error::Result;
use crate::value::Value;

use super::signature::Signature;

/// A registered, invocable function.
pub trait Function: Send + Sync {
    fn signature(&self) -> &Signature;

    /// Atomic CPU cost estimate the cost model folds into a plan's
    /// `Cost`.
    fn cost(&self) -> f64;

    fn invoke(&self, arguments: &[Value]) -> Result<Value>;

    /// Downcasts to `VectorizableFunction` when this function actually
    /// has a vectorized dual. `SimdRule` only flips a physical
    /// `Function` node's `vectorized` flag when this returns `Some`;
    /// `FunctionOperator` uses it to pick the dual at construction time
    /// rather than re-checking per row.
    fn as_vectorizable(&self) -> Option<&dyn VectorizableFunction> {
        None
    }
}

/// A `Function` with a dimensionality-dependent vectorized dual.
/// `f.invoke(x) == f.vectorized().invoke(x)` modulo floating-point
/// rounding within a documented ULP bound.
pub trait VectorizableFunction: Function {
    fn dimensionality(&self) -> usize;

    fn vectorized(&self) -> Arc<dyn VectorizedFunction>;
}

/// The vectorized counterpart of a `VectorizableFunction`. Carries the
/// same signature; `SimdRule` substitutes one for the other when
/// profitable.
pub trait VectorizedFunction: Function {}
