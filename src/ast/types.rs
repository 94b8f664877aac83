//! # Type Definitions
//!
//! Primitive types recognized by the Anvil language. Every declaration,
//! parameter, and return type carries one of these; the code generator uses
//! [`Type::byte_size`] to size stack slots and `mem.sizeof`.

/// The fundamental data types in Anvil.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Bool,
    Float32,
    Float64,
    Char,
    /// A pointer to a NUL-terminated byte buffer.
    String,
    Void,
}

impl Type {
    /// Parses a primitive type name as it appears in source (`Int64`, `Uint8`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Int8" => Self::Int8,
            "Int16" => Self::Int16,
            "Int32" => Self::Int32,
            "Int64" => Self::Int64,
            "Uint8" => Self::Uint8,
            "Uint16" => Self::Uint16,
            "Uint32" => Self::Uint32,
            "Uint64" => Self::Uint64,
            "Bool" => Self::Bool,
            "Float32" => Self::Float32,
            "Float64" => Self::Float64,
            "Char" => Self::Char,
            "String" => Self::String,
            "Void" => Self::Void,
            _ => return None,
        })
    }

    /// The number of bytes this type occupies in a stack slot or struct field.
    /// Every local is allocated a full 8-byte-aligned slot regardless of this
    /// value (spec.md §4.5.1), but `mem.sizeof` and narrowing casts need the
    /// declared width.
    pub fn byte_size(self) -> u64 {
        match self {
            Self::Int8 | Self::Uint8 | Self::Bool | Self::Char => 1,
            Self::Int16 | Self::Uint16 => 2,
            Self::Int32 | Self::Uint32 | Self::Float32 => 4,
            Self::Int64 | Self::Uint64 | Self::Float64 | Self::String => 8,
            Self::Void => 0,
        }
    }

    /// Every local variable is allocated a full 8-byte frame slot so offsets
    /// stay uniformly addressable by `movq`/`leaq`, independent of the
    /// declared type's natural width.
    pub fn slot_size(self) -> u64 {
        8
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Int8
                | Self::Int16
                | Self::Int32
                | Self::Int64
                | Self::Uint8
                | Self::Uint16
                | Self::Uint32
                | Self::Uint64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64
        )
    }

    /// Compatibility check used by the (light) semantic pass: `Unknown`-style
    /// permissiveness is not part of Anvil's closed type set, so this is a
    /// straightforward equality modulo the integer/float widening the
    /// language allows in arithmetic.
    pub fn is_compatible_with(self, other: Self) -> bool {
        if self == other {
            return true;
        }
        (self.is_integer() || self.is_float()) && (other.is_integer() || other.is_float())
    }
}
