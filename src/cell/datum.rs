//! Datum - primitive payload of a data cell.
//!
//! A `Datum` is the value carried by a primitive cell. Arithmetic, casting and
//! operator overloads live outside the engine; only the contracts the list
//! engine relies on (rendering, equality, numeric classification) are here.
//!
//! # Example
//!
//! ```rust
//! use slip::Datum;
//!
//! let n = Datum::from(42);
//! let b = Datum::from(true);
//! assert_eq!(n.to_string(), "42");
//! assert_eq!(b.to_string(), "true");
//! assert!(n.is_numeric());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque user pointer handle. The engine never dereferences it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserPointer(pub u64);

/// Primitive value held by a data cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Datum {
    Bool(bool),
    Integer(i64),
    Unsigned(u64),
    Float(f64),
    String(String),
    Pointer(UserPointer),
}

impl Datum {
    /// Check if the datum takes part in arithmetic
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Datum::Integer(_) | Datum::Unsigned(_) | Datum::Float(_)
        )
    }

    /// Get as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Datum::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as signed integer (unsigned values that fit are converted)
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Datum::Integer(n) => Some(*n),
            Datum::Unsigned(n) => i64::try_from(*n).ok(),
            _ => None,
        }
    }

    /// Get as float (every numeric datum converts)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Integer(n) => Some(*n as f64),
            Datum::Unsigned(n) => Some(*n as f64),
            Datum::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::String(s) => Some(s),
            _ => None,
        }
    }

    /// Value equality with numeric promotion: `1 == 1u == 1.0`.
    pub fn value_eq(&self, other: &Datum) -> bool {
        match (self, other) {
            (Datum::Float(_), _) | (_, Datum::Float(_)) => {
                match (self.as_f64(), other.as_f64()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }
            }
            (Datum::Integer(a), Datum::Unsigned(b)) | (Datum::Unsigned(b), Datum::Integer(a)) => {
                i128::from(*a) == i128::from(*b)
            }
            _ => self == other,
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Bool(b) => write!(f, "{}", b),
            Datum::Integer(n) => write!(f, "{}", n),
            Datum::Unsigned(n) => write!(f, "{}", n),
            Datum::Float(n) => write!(f, "{:?}", n),
            Datum::String(s) => write!(f, "{:?}", s),
            Datum::Pointer(p) => write!(f, "0x{:x}", p.0),
        }
    }
}

// Conversions
impl From<bool> for Datum {
    fn from(b: bool) -> Self {
        Datum::Bool(b)
    }
}

impl From<i32> for Datum {
    fn from(n: i32) -> Self {
        Datum::Integer(n as i64)
    }
}

impl From<i64> for Datum {
    fn from(n: i64) -> Self {
        Datum::Integer(n)
    }
}

impl From<u64> for Datum {
    fn from(n: u64) -> Self {
        Datum::Unsigned(n)
    }
}

impl From<f64> for Datum {
    fn from(n: f64) -> Self {
        Datum::Float(n)
    }
}

impl From<String> for Datum {
    fn from(s: String) -> Self {
        Datum::String(s)
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Self {
        Datum::String(s.to_string())
    }
}

impl From<UserPointer> for Datum {
    fn from(p: UserPointer) -> Self {
        Datum::Pointer(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Datum::from(123).to_string(), "123");
        assert_eq!(Datum::from(true).to_string(), "true");
        assert_eq!(Datum::from(2.0).to_string(), "2.0");
        assert_eq!(Datum::from("abc").to_string(), "\"abc\"");
        assert_eq!(Datum::from(UserPointer(255)).to_string(), "0xff");
    }

    #[test]
    fn test_numeric_promotion() {
        assert!(Datum::from(1).value_eq(&Datum::from(1u64)));
        assert!(Datum::from(1u64).value_eq(&Datum::from(1.0)));
        assert!(!Datum::from(1).value_eq(&Datum::from(true)));
        assert!(!Datum::from(-1).value_eq(&Datum::Unsigned(u64::MAX)));
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Datum::from(7u64).as_i64(), Some(7));
        assert_eq!(Datum::Unsigned(u64::MAX).as_i64(), None);
        assert_eq!(Datum::from("x").as_str(), Some("x"));
        assert_eq!(Datum::from(false).as_bool(), Some(false));
        assert!(!Datum::from("1").is_numeric());
    }
}
