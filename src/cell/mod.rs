//! Cell identity and linkage
//!
//! A cell is the fixed-size unit every list is built from. Its lifecycle is
//! carried by an explicit state tag next to two link fields:
//!
//! ```text
//! state       left            right
//! Temporary   -               -               (never linked, never freed)
//! Unlinked    -               -               (arena slot, in no list)
//! Linked      prev | header   next | header   (member of a live list)
//! Free        -               next free slot  (on the available space list)
//! ```
//!
//! Headers are live sentinels: their `right` link is the first list member and
//! their `left` link the last; an empty header points at itself on both sides.
//! Link mutators here are mechanism only. Validation belongs to the list layer.

pub mod datum;
pub mod op;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use datum::{Datum, UserPointer};
pub use op::{op_for, same_op, CellOp};

/// Handle of a cell. Arena slots are indices; temporaries carry a high tag bit
/// so their handles never fall inside a fragment.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellId(u32);

impl CellId {
    /// Reserved marker slot, never handed out by the allocator
    pub const RESERVED: CellId = CellId(0);

    pub(crate) const TEMPORARY_BIT: u32 = 1 << 31;

    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub(crate) fn temporary(index: u32) -> Self {
        Self(index | Self::TEMPORARY_BIT)
    }

    /// Raw address value
    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn index(&self) -> usize {
        (self.0 & !Self::TEMPORARY_BIT) as usize
    }

    /// Whether this handle addresses temporary (non-arena) storage
    pub fn is_temporary_handle(&self) -> bool {
        self.0 & Self::TEMPORARY_BIT != 0
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl fmt::Debug for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CellId(0x{:x})", self.0)
    }
}

/// Lifecycle state of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CellState {
    Temporary,
    Unlinked,
    Linked,
    Free,
}

/// Variant selected by the dispatch tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CellKind {
    Undefined,
    Bool,
    Integer,
    Unsigned,
    Float,
    String,
    Pointer,
    Header,
    Sublist,
}

impl CellKind {
    pub fn is_data(&self) -> bool {
        !matches!(self, CellKind::Undefined | CellKind::Header | CellKind::Sublist)
    }
}

/// Bookkeeping block of a list header
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderBlock {
    /// Number of live sublist cells referencing this header
    pub ref_count: u32,
    /// User mark
    pub mark: u32,
    /// Optional key→value descriptors
    pub descriptors: Option<Box<BTreeMap<String, Datum>>>,
}

/// Cell payload
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Undefined,
    Datum(Datum),
    Header(HeaderBlock),
    /// Counted reference to a header. Freed sublist slots keep it until the
    /// slot is reused so the decrement can happen lazily.
    Sublist(CellId),
}

/// A single list cell
#[derive(Clone)]
pub struct Cell {
    pub(crate) left: Option<CellId>,
    pub(crate) right: Option<CellId>,
    pub(crate) state: CellState,
    pub(crate) op: &'static dyn CellOp,
    pub(crate) payload: Payload,
}

impl Cell {
    /// Slot formatted for the available space list
    pub(crate) fn free_slot(next: Option<CellId>) -> Self {
        Self {
            left: None,
            right: next,
            state: CellState::Free,
            op: &op::UNDEFINED_OP,
            payload: Payload::Undefined,
        }
    }

    /// Cell living outside the arena
    pub(crate) fn temporary(payload: Payload, op: &'static dyn CellOp) -> Self {
        Self {
            left: None,
            right: None,
            state: CellState::Temporary,
            op,
            payload,
        }
    }

    pub fn state(&self) -> CellState {
        self.state
    }

    pub fn kind(&self) -> CellKind {
        self.op.kind()
    }

    pub fn op(&self) -> &'static dyn CellOp {
        self.op
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn left_link(&self) -> Option<CellId> {
        self.left
    }

    pub fn right_link(&self) -> Option<CellId> {
        self.right
    }

    /// Raw mutator, returns the previous value
    pub(crate) fn set_left_link(&mut self, link: Option<CellId>) -> Option<CellId> {
        std::mem::replace(&mut self.left, link)
    }

    /// Raw mutator, returns the previous value
    pub(crate) fn set_right_link(&mut self, link: Option<CellId>) -> Option<CellId> {
        std::mem::replace(&mut self.right, link)
    }

    pub fn is_temporary(&self) -> bool {
        self.state == CellState::Temporary
    }

    pub fn is_free(&self) -> bool {
        self.state == CellState::Free
    }

    pub fn is_unlinked(&self) -> bool {
        self.state == CellState::Unlinked
    }

    pub fn is_linked(&self) -> bool {
        self.state == CellState::Linked
    }

    pub fn is_header(&self) -> bool {
        self.kind() == CellKind::Header
    }

    pub fn is_sublist(&self) -> bool {
        self.kind() == CellKind::Sublist
    }

    pub fn is_data(&self) -> bool {
        self.kind().is_data()
    }

    pub fn datum(&self) -> Option<&Datum> {
        match &self.payload {
            Payload::Datum(d) => Some(d),
            _ => None,
        }
    }

    pub(crate) fn header_block(&self) -> Option<&HeaderBlock> {
        match &self.payload {
            Payload::Header(block) => Some(block),
            _ => None,
        }
    }

    pub(crate) fn header_block_mut(&mut self) -> Option<&mut HeaderBlock> {
        match &mut self.payload {
            Payload::Header(block) => Some(block),
            _ => None,
        }
    }

    /// Header referenced by a sublist cell
    pub fn sublist_target(&self) -> Option<CellId> {
        match self.payload {
            Payload::Sublist(header) => Some(header),
            _ => None,
        }
    }

    /// Stamp a new variant and payload, keeping links and state
    pub(crate) fn stamp(&mut self, op: &'static dyn CellOp, payload: Payload) {
        self.op = op;
        self.payload = payload;
    }

    /// Render with the cell's own descriptor
    pub fn render(&self) -> String {
        self.op.render(&self.payload)
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("state", &self.state)
            .field("op", &self.op.name())
            .field("left", &self.left)
            .field("right", &self.right)
            .field("payload", &self.payload)
            .finish()
    }
}

fn link_str(link: Option<CellId>) -> String {
    match link {
        Some(id) => id.to_string(),
        None => "null".to_string(),
    }
}

/// Structural one-line dump used by the diagnostic sink
pub(crate) fn dump(id: CellId, cell: &Cell) -> String {
    format!(
        "cell {} [{:?}] op={} left={} right={} payload={}",
        id,
        cell.state,
        cell.op.name(),
        link_str(cell.left),
        link_str(cell.right),
        cell.render()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_id_handles() {
        let id = CellId::new(26);
        assert_eq!(id.index(), 26);
        assert!(!id.is_temporary_handle());
        assert_eq!(id.to_string(), "0x0000001a");

        let temp = CellId::temporary(26);
        assert!(temp.is_temporary_handle());
        assert_eq!(temp.index(), 26);
        assert_ne!(temp, id);
    }

    #[test]
    fn test_free_slot_pattern() {
        let cell = Cell::free_slot(Some(CellId::new(4)));
        assert!(cell.is_free());
        assert_eq!(cell.left_link(), None);
        assert_eq!(cell.right_link(), Some(CellId::new(4)));
        assert_eq!(cell.kind(), CellKind::Undefined);
    }

    #[test]
    fn test_raw_link_mutators_return_previous() {
        let mut cell = Cell::free_slot(None);
        assert_eq!(cell.set_left_link(Some(CellId::new(9))), None);
        assert_eq!(cell.set_left_link(None), Some(CellId::new(9)));
        assert_eq!(cell.set_right_link(Some(CellId::new(2))), None);
        // State is untouched by the raw mutators
        assert!(cell.is_free());
    }

    #[test]
    fn test_stamp_changes_variant() {
        let datum = Datum::from(5);
        let mut cell = Cell::temporary(Payload::Datum(datum.clone()), op_for(&datum));
        assert_eq!(cell.kind(), CellKind::Integer);
        assert!(cell.is_data());

        cell.stamp(op_for(&Datum::from(true)), Payload::Datum(Datum::from(true)));
        assert_eq!(cell.kind(), CellKind::Bool);
        assert_eq!(cell.render(), "true");
        assert!(cell.is_temporary());
    }

    #[test]
    fn test_dump_format() {
        let cell = Cell::free_slot(None);
        let line = dump(CellId::new(1), &cell);
        assert!(line.contains("0x00000001"));
        assert!(line.contains("[Free]"));
        assert!(line.contains("right=null"));
    }
}
