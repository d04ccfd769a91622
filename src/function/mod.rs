// Function registry.
//
// Scalar/vector functions, signatures, the vectorization duality, and
// the `VectorDistance<T>` kernels kNN predicates bind against.

pub mod builtin;
pub mod distance;
pub mod registry;
pub mod signature;
pub mod traits;

pub use builtin::VectorSumFunction;
pub use distance::{build_f64_kernel, DistanceKind, HaversineDistance, VectorDistance};
pub use registry::FunctionRegistry;
pub use signature::{ArgumentBound, ArgumentType, Signature};
pub use traits::{Function, VectorizableFunction, VectorizedFunction};
