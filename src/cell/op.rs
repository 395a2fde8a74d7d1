//! Dispatch descriptors
//!
//! Every cell carries a `&'static dyn CellOp`. There is exactly one descriptor
//! instance per variant; cells share it and never own it. Variant queries and
//! variant-specific behaviour (rendering, equality, numeric classification) are
//! answered by the descriptor, never by inspecting the payload directly.

use super::datum::Datum;
use super::{CellKind, Payload};

/// Behaviour descriptor selected by a cell's dispatch tag
pub trait CellOp: Sync + Send {
    /// Variant this descriptor implements
    fn kind(&self) -> CellKind;

    /// Short name used in dumps and logs
    fn name(&self) -> &'static str;

    /// Render a payload of this variant
    fn render(&self, payload: &Payload) -> String;

    /// Compare two payloads; `rhs` may belong to any variant
    fn equals(&self, lhs: &Payload, rhs: &Payload) -> bool;

    /// Whether cells of this variant take part in arithmetic
    fn is_numeric(&self) -> bool {
        false
    }
}

/// Descriptor shared by all primitive variants
#[derive(Debug)]
pub struct DatumOp {
    kind: CellKind,
    name: &'static str,
}

impl CellOp for DatumOp {
    fn kind(&self) -> CellKind {
        self.kind
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn render(&self, payload: &Payload) -> String {
        match payload {
            Payload::Datum(datum) => datum.to_string(),
            other => format!("<{} with {:?}>", self.name, other),
        }
    }

    fn equals(&self, lhs: &Payload, rhs: &Payload) -> bool {
        match (lhs, rhs) {
            (Payload::Datum(a), Payload::Datum(b)) => a.value_eq(b),
            _ => false,
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(
            self.kind,
            CellKind::Integer | CellKind::Unsigned | CellKind::Float
        )
    }
}

/// Descriptor for list headers
#[derive(Debug)]
pub struct HeaderOp;

impl CellOp for HeaderOp {
    fn kind(&self) -> CellKind {
        CellKind::Header
    }

    fn name(&self) -> &'static str {
        "header"
    }

    fn render(&self, payload: &Payload) -> String {
        match payload {
            Payload::Header(block) => format!("header(refs={}, mark={})", block.ref_count, block.mark),
            _ => "header(?)".to_string(),
        }
    }

    // List contents are compared by the arena, which can walk the links.
    fn equals(&self, _lhs: &Payload, _rhs: &Payload) -> bool {
        false
    }
}

/// Descriptor for sublist references
#[derive(Debug)]
pub struct SublistOp;

impl CellOp for SublistOp {
    fn kind(&self) -> CellKind {
        CellKind::Sublist
    }

    fn name(&self) -> &'static str {
        "sublist"
    }

    fn render(&self, payload: &Payload) -> String {
        match payload {
            Payload::Sublist(header) => format!("sublist -> {}", header),
            _ => "sublist(?)".to_string(),
        }
    }

    fn equals(&self, lhs: &Payload, rhs: &Payload) -> bool {
        match (lhs, rhs) {
            (Payload::Sublist(a), Payload::Sublist(b)) => a == b,
            _ => false,
        }
    }
}

/// Descriptor stamped on fresh and freed slots
#[derive(Debug)]
pub struct UndefinedOp;

impl CellOp for UndefinedOp {
    fn kind(&self) -> CellKind {
        CellKind::Undefined
    }

    fn name(&self) -> &'static str {
        "undefined"
    }

    fn render(&self, _payload: &Payload) -> String {
        "undefined".to_string()
    }

    fn equals(&self, _lhs: &Payload, _rhs: &Payload) -> bool {
        false
    }
}

pub static UNDEFINED_OP: UndefinedOp = UndefinedOp;
pub static HEADER_OP: HeaderOp = HeaderOp;
pub static SUBLIST_OP: SublistOp = SublistOp;
pub static BOOL_OP: DatumOp = DatumOp { kind: CellKind::Bool, name: "bool" };
pub static INTEGER_OP: DatumOp = DatumOp { kind: CellKind::Integer, name: "integer" };
pub static UNSIGNED_OP: DatumOp = DatumOp { kind: CellKind::Unsigned, name: "unsigned" };
pub static FLOAT_OP: DatumOp = DatumOp { kind: CellKind::Float, name: "float" };
pub static STRING_OP: DatumOp = DatumOp { kind: CellKind::String, name: "string" };
pub static POINTER_OP: DatumOp = DatumOp { kind: CellKind::Pointer, name: "pointer" };

/// Select the shared descriptor for a primitive value
pub fn op_for(datum: &Datum) -> &'static dyn CellOp {
    match datum {
        Datum::Bool(_) => &BOOL_OP,
        Datum::Integer(_) => &INTEGER_OP,
        Datum::Unsigned(_) => &UNSIGNED_OP,
        Datum::Float(_) => &FLOAT_OP,
        Datum::String(_) => &STRING_OP,
        Datum::Pointer(_) => &POINTER_OP,
    }
}

/// True when both tags point at the same descriptor instance
pub fn same_op(a: &'static dyn CellOp, b: &'static dyn CellOp) -> bool {
    std::ptr::addr_eq(a as *const dyn CellOp, b as *const dyn CellOp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_shared_per_variant() {
        let a = op_for(&Datum::from(1));
        let b = op_for(&Datum::from(99));
        assert!(same_op(a, b));
        assert!(!same_op(a, op_for(&Datum::from(true))));
        assert_eq!(a.kind(), CellKind::Integer);
    }

    #[test]
    fn test_numeric_classification() {
        assert!(op_for(&Datum::from(1.5)).is_numeric());
        assert!(op_for(&Datum::from(3u64)).is_numeric());
        assert!(!op_for(&Datum::from("3")).is_numeric());
        assert!(!HEADER_OP.is_numeric());
    }

    #[test]
    fn test_datum_render_and_equals() {
        let op = op_for(&Datum::from(123));
        let payload = Payload::Datum(Datum::from(123));
        assert_eq!(op.render(&payload), "123");
        assert!(op.equals(&payload, &Payload::Datum(Datum::from(123.0))));
        assert!(!op.equals(&payload, &Payload::Undefined));
    }
}
