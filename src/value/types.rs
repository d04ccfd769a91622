// The type and value model.
//
// Flat tagged-union `Value` over the full scalar/vector set named
// below, with the constructors/equality/hashing guarantees a column's
// typed value needs.

use std::fmt;
use std::hash::{Hash, Hasher};

use rand::Rng;

/// Logical/physical size pair. `logical_size` is dimensionality for
/// vectors, 1 for scalars; `physical_size` is the serialized byte width,
/// used by the cost model's memory estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Type {
    kind: TypeKind,
    logical_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    String,
    Date,
    Complex32,
    Complex64,
    BooleanVector,
    IntVector,
    LongVector,
    FloatVector,
    DoubleVector,
    ComplexVector,
}

impl Type {
    pub fn scalar(kind: TypeKind) -> Self {
        Self {
            kind,
            logical_size: 1,
        }
    }

    pub fn vector(kind: TypeKind, dimensionality: usize) -> Self {
        Self {
            kind,
            logical_size: dimensionality,
        }
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn logical_size(&self) -> usize {
        self.logical_size
    }

    pub fn is_vector(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::BooleanVector
                | TypeKind::IntVector
                | TypeKind::LongVector
                | TypeKind::FloatVector
                | TypeKind::DoubleVector
                | TypeKind::ComplexVector
        )
    }

    /// Serialized byte width of a single value of this type, used by the
    /// cost model's row-width estimates.
    pub fn physical_size(&self) -> usize {
        let component = match self.kind {
            TypeKind::Boolean => 1,
            TypeKind::Byte => 1,
            TypeKind::Short => 2,
            TypeKind::Int | TypeKind::IntVector => 4,
            TypeKind::Long | TypeKind::LongVector => 8,
            TypeKind::Float | TypeKind::FloatVector => 4,
            TypeKind::Double | TypeKind::DoubleVector => 8,
            TypeKind::String => 1,
            TypeKind::Date => 8,
            TypeKind::Complex32 => 8,
            TypeKind::Complex64 => 16,
            TypeKind::ComplexVector => 16,
            TypeKind::BooleanVector => 1,
        };
        component * self.logical_size
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_vector() {
            write!(f, "{:?}({})", self.kind, self.logical_size)
        } else {
            write!(f, "{:?}", self.kind)
        }
    }
}

/// A typed scalar or vector value.
///
/// Invariant: a value's runtime variant always equals its declared
/// `Type` — constructors below never produce a mismatch, and callers
/// binding a `Value` to a typed slot must check `value.value_type() ==
/// expected` themselves (the binding layer does this; see
/// `value::binding`).
#[derive(Debug, Clone)]
pub enum Value {
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    StringValue(String),
    Date(i64),
    Complex32(f32, f32),
    Complex64(f64, f64),
    BooleanVector(Vec<bool>),
    IntVector(Vec<i32>),
    LongVector(Vec<i64>),
    FloatVector(Vec<f32>),
    DoubleVector(Vec<f64>),
    ComplexVector(Vec<(f64, f64)>),
}

impl Value {
    pub fn value_type(&self) -> Type {
        match self {
            Value::Boolean(_) => Type::scalar(TypeKind::Boolean),
            Value::Byte(_) => Type::scalar(TypeKind::Byte),
            Value::Short(_) => Type::scalar(TypeKind::Short),
            Value::Int(_) => Type::scalar(TypeKind::Int),
            Value::Long(_) => Type::scalar(TypeKind::Long),
            Value::Float(_) => Type::scalar(TypeKind::Float),
            Value::Double(_) => Type::scalar(TypeKind::Double),
            Value::StringValue(_) => Type::scalar(TypeKind::String),
            Value::Date(_) => Type::scalar(TypeKind::Date),
            Value::Complex32(..) => Type::scalar(TypeKind::Complex32),
            Value::Complex64(..) => Type::scalar(TypeKind::Complex64),
            Value::BooleanVector(v) => Type::vector(TypeKind::BooleanVector, v.len()),
            Value::IntVector(v) => Type::vector(TypeKind::IntVector, v.len()),
            Value::LongVector(v) => Type::vector(TypeKind::LongVector, v.len()),
            Value::FloatVector(v) => Type::vector(TypeKind::FloatVector, v.len()),
            Value::DoubleVector(v) => Type::vector(TypeKind::DoubleVector, v.len()),
            Value::ComplexVector(v) => Type::vector(TypeKind::ComplexVector, v.len()),
        }
    }

    pub fn zero(kind: TypeKind) -> Self {
        match kind {
            TypeKind::Boolean => Value::Boolean(false),
            TypeKind::Byte => Value::Byte(0),
            TypeKind::Short => Value::Short(0),
            TypeKind::Int => Value::Int(0),
            TypeKind::Long => Value::Long(0),
            TypeKind::Float => Value::Float(0.0),
            TypeKind::Double => Value::Double(0.0),
            TypeKind::String => Value::StringValue(String::new()),
            TypeKind::Date => Value::Date(0),
            TypeKind::Complex32 => Value::Complex32(0.0, 0.0),
            TypeKind::Complex64 => Value::Complex64(0.0, 0.0),
            TypeKind::BooleanVector => Value::BooleanVector(Vec::new()),
            TypeKind::IntVector => Value::IntVector(Vec::new()),
            TypeKind::LongVector => Value::LongVector(Vec::new()),
            TypeKind::FloatVector => Value::FloatVector(Vec::new()),
            TypeKind::DoubleVector => Value::DoubleVector(Vec::new()),
            TypeKind::ComplexVector => Value::ComplexVector(Vec::new()),
        }
    }

    pub fn one(kind: TypeKind) -> Self {
        match kind {
            TypeKind::Boolean => Value::Boolean(true),
            TypeKind::Byte => Value::Byte(1),
            TypeKind::Short => Value::Short(1),
            TypeKind::Int => Value::Int(1),
            TypeKind::Long => Value::Long(1),
            TypeKind::Float => Value::Float(1.0),
            TypeKind::Double => Value::Double(1.0),
            TypeKind::Complex32 => Value::Complex32(1.0, 0.0),
            TypeKind::Complex64 => Value::Complex64(1.0, 0.0),
            other => Value::zero(other),
        }
    }

    /// Builds a scalar value from an `f64`, narrowing to the requested
    /// kind. Vector kinds are rejected — use the `*Vector` constructors.
    pub fn of(kind: TypeKind, number: f64) -> Option<Self> {
        Some(match kind {
            TypeKind::Boolean => Value::Boolean(number != 0.0),
            TypeKind::Byte => Value::Byte(number as i8),
            TypeKind::Short => Value::Short(number as i16),
            TypeKind::Int => Value::Int(number as i32),
            TypeKind::Long => Value::Long(number as i64),
            TypeKind::Float => Value::Float(number as f32),
            TypeKind::Double => Value::Double(number),
            TypeKind::Date => Value::Date(number as i64),
            TypeKind::Complex32 => Value::Complex32(number as f32, 0.0),
            TypeKind::Complex64 => Value::Complex64(number, 0.0),
            _ => return None,
        })
    }

    pub fn random(kind: TypeKind, rng: &mut impl Rng) -> Self {
        match kind {
            TypeKind::Boolean => Value::Boolean(rng.gen()),
            TypeKind::Byte => Value::Byte(rng.gen()),
            TypeKind::Short => Value::Short(rng.gen()),
            TypeKind::Int => Value::Int(rng.gen()),
            TypeKind::Long => Value::Long(rng.gen()),
            TypeKind::Float => Value::Float(rng.gen()),
            TypeKind::Double => Value::Double(rng.gen()),
            TypeKind::String => Value::StringValue(String::new()),
            TypeKind::Date => Value::Date(rng.gen()),
            TypeKind::Complex32 => Value::Complex32(rng.gen(), rng.gen()),
            TypeKind::Complex64 => Value::Complex64(rng.gen(), rng.gen()),
            other => Value::zero(other),
        }
    }

    pub fn random_vector(kind: TypeKind, dimensionality: usize, rng: &mut impl Rng) -> Self {
        match kind {
            TypeKind::BooleanVector => {
                Value::BooleanVector((0..dimensionality).map(|_| rng.gen()).collect())
            }
            TypeKind::IntVector => {
                Value::IntVector((0..dimensionality).map(|_| rng.gen()).collect())
            }
            TypeKind::LongVector => {
                Value::LongVector((0..dimensionality).map(|_| rng.gen()).collect())
            }
            TypeKind::FloatVector => {
                Value::FloatVector((0..dimensionality).map(|_| rng.gen()).collect())
            }
            TypeKind::DoubleVector => {
                Value::DoubleVector((0..dimensionality).map(|_| rng.gen()).collect())
            }
            TypeKind::ComplexVector => Value::ComplexVector(
                (0..dimensionality).map(|_| (rng.gen(), rng.gen())).collect(),
            ),
            other => Value::zero(other),
        }
    }

    pub fn is_vector(&self) -> bool {
        self.value_type().is_vector()
    }

    /// Number of components this value iterates over: dimensionality for
    /// vectors, 1 for scalars.
    pub fn len(&self) -> usize {
        self.value_type().logical_size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Boolean(a), Boolean(b)) => a == b,
            (Byte(a), Byte(b)) => a == b,
            (Short(a), Short(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Long(a), Long(b)) => a == b,
            (Float(a), Float(b)) => a.to_bits() == b.to_bits(),
            (Double(a), Double(b)) => a.to_bits() == b.to_bits(),
            (StringValue(a), StringValue(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (Complex32(ar, ai), Complex32(br, bi)) => ar.to_bits() == br.to_bits() && ai.to_bits() == bi.to_bits(),
            (Complex64(ar, ai), Complex64(br, bi)) => ar.to_bits() == br.to_bits() && ai.to_bits() == bi.to_bits(),
            (BooleanVector(a), BooleanVector(b)) => a == b,
            (IntVector(a), IntVector(b)) => a == b,
            (LongVector(a), LongVector(b)) => a == b,
            (FloatVector(a), FloatVector(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            (DoubleVector(a), DoubleVector(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            (ComplexVector(a), ComplexVector(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|(x, y)| x.0.to_bits() == y.0.to_bits() && x.1.to_bits() == y.1.to_bits())
            }
            _ => false,
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        use Value::*;
        match (self, other) {
            (Boolean(a), Boolean(b)) => a.partial_cmp(b),
            (Byte(a), Byte(b)) => a.partial_cmp(b),
            (Short(a), Short(b)) => a.partial_cmp(b),
            (Int(a), Int(b)) => a.partial_cmp(b),
            (Long(a), Long(b)) => a.partial_cmp(b),
            (Float(a), Float(b)) => a.partial_cmp(b),
            (Double(a), Double(b)) => a.partial_cmp(b),
            (StringValue(a), StringValue(b)) => a.partial_cmp(b),
            (Date(a), Date(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Hashes the canonical bit representation, never a pointer or
/// address-derived value, so the hash is stable across runs of the same
/// build.
impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Boolean(b) => b.hash(state),
            Value::Byte(b) => b.hash(state),
            Value::Short(s) => s.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Long(l) => l.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Double(d) => d.to_bits().hash(state),
            Value::StringValue(s) => s.hash(state),
            Value::Date(d) => d.hash(state),
            Value::Complex32(r, i) => {
                r.to_bits().hash(state);
                i.to_bits().hash(state);
            }
            Value::Complex64(r, i) => {
                r.to_bits().hash(state);
                i.to_bits().hash(state);
            }
            Value::BooleanVector(v) => v.hash(state),
            Value::IntVector(v) => v.hash(state),
            Value::LongVector(v) => v.hash(state),
            Value::FloatVector(v) => v.iter().for_each(|x| x.to_bits().hash(state)),
            Value::DoubleVector(v) => v.iter().for_each(|x| x.to_bits().hash(state)),
            Value::ComplexVector(v) => v.iter().for_each(|(r, i)| {
                r.to_bits().hash(state);
                i.to_bits().hash(state);
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn value_type_matches_declared_variant() {
        let v = Value::DoubleVector(vec![1.0, 2.0, 3.0]);
        let t = v.value_type();
        assert_eq!(t.kind(), TypeKind::DoubleVector);
        assert_eq!(t.logical_size(), 3);
    }

    #[test]
    fn float_equality_is_bitwise_not_semantic_nan_aware() {
        let a = Value::Double(1.5);
        let b = Value::Double(1.5);
        assert_eq!(a, b);
    }

    #[test]
    fn hash_is_stable_across_two_computations() {
        use std::collections::hash_map::DefaultHasher;
        let v = Value::FloatVector(vec![1.0, 2.0, 3.0]);
        let mut h1 = DefaultHasher::new();
        v.hash(&mut h1);
        let mut h2 = DefaultHasher::new();
        v.hash(&mut h2);
        assert_eq!(h1.finish(), h2.finish());
    }

    #[test]
    fn random_vector_has_requested_dimensionality() {
        let mut rng = SmallRng::seed_from_u64(7);
        let v = Value::random_vector(TypeKind::FloatVector, 128, &mut rng);
        assert_eq!(v.len(), 128);
    }

    #[test]
    fn physical_size_scales_with_dimensionality() {
        let t = Type::vector(TypeKind::DoubleVector, 512);
        assert_eq!(t.physical_size(), 512 * 8);
    }
}
