// Function signatures and argument-type matching.

use crate::value::{Name, Type, TypeKind};

/// An argument slot in a `Signature`: either a concrete `Type` or an
/// open bound a concrete type must satisfy at resolution time.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentType {
    Typed(Type),
    Open(ArgumentBound),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentBound {
    Any,
    AnyNumeric,
    AnyVector,
}

impl ArgumentType {
    /// Whether a concrete `Type` satisfies this argument slot.
    pub fn accepts(&self, candidate: &Type) -> bool {
        match self {
            ArgumentType::Typed(expected) => expected == candidate,
            ArgumentType::Open(ArgumentBound::Any) => true,
            ArgumentType::Open(ArgumentBound::AnyVector) => candidate.is_vector(),
            ArgumentType::Open(ArgumentBound::AnyNumeric) => matches!(
                candidate.kind(),
                TypeKind::Byte
                    | TypeKind::Short
                    | TypeKind::Int
                    | TypeKind::Long
                    | TypeKind::Float
                    | TypeKind::Double
            ),
        }
    }

    /// A `Typed` slot is strictly more specific than any `Open` slot;
    /// used to rank overload candidates when more than one accepts the
    /// call — resolution picks the most specific match.
    pub fn specificity(&self) -> u8 {
        match self {
            ArgumentType::Typed(_) => 2,
            ArgumentType::Open(ArgumentBound::AnyVector) | ArgumentType::Open(ArgumentBound::AnyNumeric) => 1,
            ArgumentType::Open(ArgumentBound::Any) => 0,
        }
    }
}

/// `(Name, [ArgumentType], ReturnType)`.
#[derive(Debug, Clone)]
pub struct Signature {
    pub name: Name,
    pub arguments: Vec<ArgumentType>,
    pub return_type: Type,
}

impl Signature {
    pub fn new(name: Name, arguments: Vec<ArgumentType>, return_type: Type) -> Self {
        Self {
            name,
            arguments,
            return_type,
        }
    }

    pub fn matches(&self, call_arguments: &[Type]) -> bool {
        self.arguments.len() == call_arguments.len()
            && self
                .arguments
                .iter()
                .zip(call_arguments)
                .all(|(slot, candidate)| slot.accepts(candidate))
    }

    /// Sum of per-argument specificity, used to break ties between two
    /// signatures that both match a call.
    pub fn specificity(&self) -> u32 {
        self.arguments.iter().map(|a| a.specificity() as u32).sum()
    }
}
