// A small set of functions registered into the global `FunctionRegistry`
// at startup, giving `SimdRule` (`execution/planner`) a real
// `VectorizableFunction` to rewrite end to end. The dedicated
// `VectorDistance<T>` kernels in [`super::distance`] cover kNN scoring
// on their own bind-time `copy(d)` path; these cover the generic
// `FunctionPhysicalOperatorNode` path the rest of the rule catalogue
// exercises.

use std::sync::Arc;

use crate::error::{DbError, Result};
use crate::value::{Name, Type, TypeKind, Value};

use super::registry::FunctionRegistry;
use super::signature::{ArgumentBound, ArgumentType, Signature};
use super::traits::{Function, VectorizableFunction, VectorizedFunction};

const LANES: usize = 8;

fn extract_vector(arguments: &[Value]) -> Result<&[f64]> {
    match arguments.first() {
        Some(Value::DoubleVector(v)) => Ok(v.as_slice()),
        _ => Err(DbError::query_binding("vector_sum expects one double-vector argument")),
    }
}

/// Sums a double-vector column's components. Scalar path accumulates
/// sequentially; the vectorized dual uses the same 8-wide chunked
/// accumulation the distance kernels use, so the two agree within the
/// documented ULP bound and differ only in accumulation order.
pub struct VectorSumFunction {
    signature: Signature,
}

impl VectorSumFunction {
    pub fn new() -> Self {
        Self {
            signature: Signature::new(
                Name::parse("vector_sum"),
                vec![ArgumentType::Open(ArgumentBound::AnyVector)],
                Type::scalar(TypeKind::Double),
            ),
        }
    }
}

impl Default for VectorSumFunction {
    fn default() -> Self {
        Self::new()
    }
}

impl Function for VectorSumFunction {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn cost(&self) -> f64 {
        crate::execution::cost::FUNCTION_CALL
    }

    fn invoke(&self, arguments: &[Value]) -> Result<Value> {
        let v = extract_vector(arguments)?;
        Ok(Value::Double(v.iter().sum()))
    }

    fn as_vectorizable(&self) -> Option<&dyn VectorizableFunction> {
        Some(self)
    }
}

impl VectorizableFunction for VectorSumFunction {
    /// Not fixed at registration; `vector_sum` accepts any
    /// dimensionality (`ArgumentBound::AnyVector`), so the dual is
    /// chosen once per call site by `SimdRule` rather than by a
    /// `copy(d)` rebind.
    fn dimensionality(&self) -> usize {
        0
    }

    fn vectorized(&self) -> Arc<dyn VectorizedFunction> {
        Arc::new(VectorizedVectorSumFunction {
            signature: self.signature.clone(),
        })
    }
}

struct VectorizedVectorSumFunction {
    signature: Signature,
}

impl Function for VectorizedVectorSumFunction {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn cost(&self) -> f64 {
        crate::execution::cost::FUNCTION_CALL
    }

    fn invoke(&self, arguments: &[Value]) -> Result<Value> {
        let v = extract_vector(arguments)?;
        let chunks = v.len() / LANES;
        let mut acc = [0.0f64; LANES];
        for c in 0..chunks {
            let base = c * LANES;
            for (lane, slot) in acc.iter_mut().enumerate() {
                *slot += v[base + lane];
            }
        }
        let mut total: f64 = acc.iter().sum();
        for value in &v[chunks * LANES..] {
            total += value;
        }
        Ok(Value::Double(total))
    }
}

impl VectorizedFunction for VectorizedVectorSumFunction {}

/// Registers the builtin functions once, at first access to
/// `FunctionRegistry::global()` — the process-wide immutable map
/// assembled at startup.
pub(super) fn register_defaults(registry: &FunctionRegistry) {
    registry.register(Arc::new(VectorSumFunction::new()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_and_vectorized_sum_agree_within_rounding() {
        let f = VectorSumFunction::new();
        let values: Vec<f64> = (0..37).map(|i| i as f64 * 0.5).collect();
        let arg = vec![Value::DoubleVector(values)];
        let scalar = f.invoke(&arg).unwrap();
        let vectorized = f.vectorized().invoke(&arg).unwrap();
        match (scalar, vectorized) {
            (Value::Double(a), Value::Double(b)) => assert!((a - b).abs() < 1e-9),
            _ => panic!("expected doubles"),
        }
    }

    #[test]
    fn non_vector_argument_is_a_binding_error() {
        let f = VectorSumFunction::new();
        let err = f.invoke(&[Value::Int(1)]).unwrap_err();
        assert!(matches!(err, DbError::QueryBinding(_)));
    }
}
