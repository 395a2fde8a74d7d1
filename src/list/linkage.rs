//! List operations
//!
//! O(1) structural mutation of doubly linked lists. Every operation validates
//! its operands before touching a single link, so a rejected call leaves all
//! lists exactly as they were.
//!
//! Allocating can reclaim a list whose last reference sat in the reused slot.
//! Operations that allocate check their operands again afterwards and give
//! the new cell back if the list they work on is gone.

use crate::arena::Arena;
use crate::cell::{op, op_for, CellId, CellState, Datum, HeaderBlock, Payload};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Which side of the split point moves to the new header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitSide {
    /// Cells from the first one up to and including the split cell
    LeftInclusive,
    /// The split cell and every cell after it
    RightInclusive,
}

/// Iterator over the members of one list, first to last
pub struct ListIter<'a> {
    arena: &'a Arena,
    header: CellId,
    next: Option<CellId>,
}

impl<'a> Iterator for ListIter<'a> {
    type Item = CellId;

    fn next(&mut self) -> Option<CellId> {
        let id = self.next?;
        if id == self.header {
            self.next = None;
            return None;
        }
        self.next = self.arena.right_link(id);
        Some(id)
    }
}

impl Arena {
    // === Construction ===

    /// Allocate an unlinked data cell
    pub fn new_datum(&mut self, value: impl Into<Datum>) -> Result<CellId> {
        let datum = value.into();
        let id = self.allocate()?;
        self.cell_mut(id).stamp(op_for(&datum), Payload::Datum(datum));
        Ok(id)
    }

    /// Allocate an empty list header with a reference count of zero
    pub fn new_header(&mut self) -> Result<CellId> {
        let id = self.allocate()?;
        let cell = self.cell_mut(id);
        cell.stamp(&op::HEADER_OP, Payload::Header(HeaderBlock::default()));
        cell.left = Some(id);
        cell.right = Some(id);
        cell.state = CellState::Linked;
        debug!(header = %id, "Created list header");
        Ok(id)
    }

    // === Validation ===

    /// A cell about to be spliced in must be an unlinked, non-header slot
    fn check_insertable(&mut self, id: CellId, operation: &'static str) -> Result<()> {
        let cell = match self.get(id) {
            Some(c) => c,
            None => {
                return self.fail(
                    Error::StructuralCorruption(format!("unknown cell {}", id)),
                    operation,
                    &[],
                )
            }
        };
        let err = match cell.state() {
            CellState::Temporary => Error::InvalidOperationOnTemporary(id),
            CellState::Free => {
                Error::StructuralCorruption(format!("cell {} is on the free list", id))
            }
            CellState::Linked if cell.is_header() => {
                Error::InvalidLinkage(format!("header {} cannot be a list member", id))
            }
            CellState::Linked => Error::InvalidLinkage(format!("cell {} is already linked", id)),
            CellState::Unlinked => return Ok(()),
        };
        self.fail(err, operation, &[id])
    }

    /// An anchor must be a live header or a list member
    fn check_anchor(&mut self, anchor: CellId, operation: &'static str) -> Result<()> {
        let err = match self.get(anchor).map(|c| c.state()) {
            Some(CellState::Linked) => return Ok(()),
            Some(CellState::Temporary) => Error::InvalidOperationOnTemporary(anchor),
            Some(CellState::Free) => {
                Error::StructuralCorruption(format!("anchor {} is on the free list", anchor))
            }
            Some(CellState::Unlinked) => {
                Error::InvalidLinkage(format!("anchor {} is not in a list", anchor))
            }
            None => Error::StructuralCorruption(format!("unknown anchor {}", anchor)),
        };
        self.fail(err, operation, &[anchor])
    }

    fn check_header(&mut self, header: CellId, operation: &'static str) -> Result<()> {
        if self.is_header(header) {
            return Ok(());
        }
        let err = if self.is_temporary(header) {
            Error::InvalidOperationOnTemporary(header)
        } else {
            Error::InvalidLinkage(format!("{} is not a list header", header))
        };
        self.fail(err, operation, &[header])
    }

    /// Check `header` again once `fresh` has been allocated for it
    fn check_header_after_allocation(
        &mut self,
        header: CellId,
        fresh: CellId,
        operation: &'static str,
    ) -> Result<()> {
        if self.is_header(header) {
            return Ok(());
        }
        self.discard(fresh, operation);
        self.fail(
            Error::InvalidLinkage(format!(
                "list {} was reclaimed while allocating {}",
                header, fresh
            )),
            operation,
            &[header, fresh],
        )
    }

    /// Give back an unlinked cell allocated by an operation that then
    /// failed. A sublist's reference is withdrawn without reclaiming the
    /// list it points at.
    pub(crate) fn discard(&mut self, fresh: CellId, operation: &'static str) {
        if let Some(header) = self.cell(fresh).sublist_target() {
            self.adjust_ref_count(header, -1);
        }
        let cell = self.cell_mut(fresh);
        cell.stamp(&op::UNDEFINED_OP, Payload::Undefined);
        cell.left = None;
        cell.right = None;
        cell.state = CellState::Unlinked;
        if let Err(e) = self.release_cell(fresh) {
            warn!(cell = %fresh, operation, error = %e, "Could not give back cell");
        }
    }

    // === Linkage ===

    /// Splice an unlinked `cell` immediately left of `anchor`.
    /// With a header as anchor the cell becomes the last member.
    pub fn insert_left(&mut self, anchor: CellId, cell: CellId) -> Result<()> {
        self.check_insertable(cell, "insert_left")?;
        self.check_anchor(anchor, "insert_left")?;
        self.link_left(anchor, cell);
        Ok(())
    }

    /// Splice an unlinked `cell` immediately right of `anchor`.
    /// With a header as anchor the cell becomes the first member.
    pub fn insert_right(&mut self, anchor: CellId, cell: CellId) -> Result<()> {
        self.check_insertable(cell, "insert_right")?;
        self.check_anchor(anchor, "insert_right")?;
        self.link_right(anchor, cell);
        Ok(())
    }

    fn link_left(&mut self, anchor: CellId, cell: CellId) {
        let prev = self.left_link(anchor).unwrap_or(anchor);
        {
            let c = self.cell_mut(cell);
            c.left = Some(prev);
            c.right = Some(anchor);
            c.state = CellState::Linked;
        }
        self.cell_mut(prev).right = Some(cell);
        self.cell_mut(anchor).left = Some(cell);
    }

    fn link_right(&mut self, anchor: CellId, cell: CellId) {
        let next = self.right_link(anchor).unwrap_or(anchor);
        {
            let c = self.cell_mut(cell);
            c.left = Some(anchor);
            c.right = Some(next);
            c.state = CellState::Linked;
        }
        self.cell_mut(anchor).right = Some(cell);
        self.cell_mut(next).left = Some(cell);
    }

    /// Remove `cell` from its list. Unlinking an unlinked cell is a no-op.
    pub fn unlink(&mut self, cell: CellId) -> Result<()> {
        let err = match self.get(cell) {
            None => Error::StructuralCorruption(format!("unknown cell {}", cell)),
            Some(c) => match c.state() {
                CellState::Unlinked => return Ok(()),
                CellState::Temporary => Error::InvalidOperationOnTemporary(cell),
                CellState::Free => {
                    Error::StructuralCorruption(format!("cell {} is on the free list", cell))
                }
                CellState::Linked if c.is_header() => {
                    Error::InvalidLinkage(format!("header {} cannot be unlinked", cell))
                }
                CellState::Linked => {
                    self.detach(cell);
                    return Ok(());
                }
            },
        };
        self.fail(err, "unlink", &[cell])
    }

    /// Relink the neighbours of a linked member and mark it unlinked
    pub(crate) fn detach(&mut self, cell: CellId) {
        let (left, right) = {
            let c = self.cell(cell);
            (c.left_link(), c.right_link())
        };
        if let (Some(left), Some(right)) = (left, right) {
            self.cell_mut(left).right = Some(right);
            self.cell_mut(right).left = Some(left);
        }
        let c = self.cell_mut(cell);
        c.left = None;
        c.right = None;
        c.state = CellState::Unlinked;
    }

    /// Put `new` in the list position of `old`; `old` ends up unlinked.
    /// `new` must be a fresh unlinked slot.
    pub(crate) fn transplant(&mut self, old: CellId, new: CellId) {
        if !self.is_linked(old) {
            return;
        }
        let (left, right) = {
            let c = self.cell(old);
            (c.left_link(), c.right_link())
        };
        {
            let c = self.cell_mut(new);
            c.left = left;
            c.right = right;
            c.state = CellState::Linked;
        }
        if let Some(left) = left {
            self.cell_mut(left).right = Some(new);
        }
        if let Some(right) = right {
            self.cell_mut(right).left = Some(new);
        }
        let c = self.cell_mut(old);
        c.left = None;
        c.right = None;
        c.state = CellState::Unlinked;
    }

    fn check_movable(&mut self, anchor: CellId, cell: CellId, operation: &'static str) -> Result<()> {
        if anchor == cell {
            return self.fail(
                Error::InvalidLinkage(format!("cannot move {} next to itself", cell)),
                operation,
                &[cell],
            );
        }
        self.check_anchor(anchor, operation)?;
        match self.get(cell).map(|c| (c.state(), c.is_header())) {
            Some((CellState::Linked, false)) | Some((CellState::Unlinked, _)) => Ok(()),
            _ => self.check_insertable(cell, operation),
        }
    }

    /// Move `cell` (linked or not) to the left of `anchor`
    pub fn move_left(&mut self, anchor: CellId, cell: CellId) -> Result<()> {
        self.check_movable(anchor, cell, "move_left")?;
        if self.is_linked(cell) {
            self.detach(cell);
        }
        self.link_left(anchor, cell);
        Ok(())
    }

    /// Move `cell` (linked or not) to the right of `anchor`
    pub fn move_right(&mut self, anchor: CellId, cell: CellId) -> Result<()> {
        self.check_movable(anchor, cell, "move_right")?;
        if self.is_linked(cell) {
            self.detach(cell);
        }
        self.link_right(anchor, cell);
        Ok(())
    }

    fn check_list_move(&mut self, anchor: CellId, source: CellId, operation: &'static str) -> Result<()> {
        self.check_header(source, operation)?;
        self.check_anchor(anchor, operation)?;
        if anchor == source || self.iter(source).any(|id| id == anchor) {
            return self.fail(
                Error::InvalidLinkage(format!("anchor {} belongs to the moved list {}", anchor, source)),
                operation,
                &[anchor, source],
            );
        }
        Ok(())
    }

    /// Detach every member of `source`, returning the (first, last) chain
    fn take_members(&mut self, source: CellId) -> Option<(CellId, CellId)> {
        let first = self.first(source)?;
        let last = self.last(source)?;
        let header = self.cell_mut(source);
        header.left = Some(source);
        header.right = Some(source);
        Some((first, last))
    }

    /// Move all members of `source` to the left of `anchor`, leaving
    /// `source` empty
    pub fn move_list_left(&mut self, anchor: CellId, source: CellId) -> Result<()> {
        self.check_list_move(anchor, source, "move_list_left")?;
        if let Some((first, last)) = self.take_members(source) {
            let prev = self.left_link(anchor).unwrap_or(anchor);
            self.cell_mut(prev).right = Some(first);
            self.cell_mut(first).left = Some(prev);
            self.cell_mut(last).right = Some(anchor);
            self.cell_mut(anchor).left = Some(last);
        }
        Ok(())
    }

    /// Move all members of `source` to the right of `anchor`, leaving
    /// `source` empty
    pub fn move_list_right(&mut self, anchor: CellId, source: CellId) -> Result<()> {
        self.check_list_move(anchor, source, "move_list_right")?;
        if let Some((first, last)) = self.take_members(source) {
            let next = self.right_link(anchor).unwrap_or(anchor);
            self.cell_mut(anchor).right = Some(first);
            self.cell_mut(first).left = Some(anchor);
            self.cell_mut(last).right = Some(next);
            self.cell_mut(next).left = Some(last);
        }
        Ok(())
    }

    /// Find the header of the list `cell` belongs to
    pub fn owner(&self, cell: CellId) -> Option<CellId> {
        if !self.is_linked(cell) {
            return None;
        }
        let mut cursor = cell;
        for _ in 0..=self.total_slots() {
            if self.cell(cursor).is_header() {
                return Some(cursor);
            }
            cursor = self.right_link(cursor)?;
        }
        None
    }

    /// Split the list containing `cell`. The cells on `side` of it (the
    /// split cell included) move to a freshly allocated header, which is
    /// returned.
    pub fn split(&mut self, cell: CellId, side: SplitSide) -> Result<CellId> {
        if self.is_temporary(cell) {
            return self.fail(Error::InvalidOperationOnTemporary(cell), "split", &[cell]);
        }
        if !self.is_linked(cell) || self.is_header(cell) {
            return self.fail(
                Error::InvalidLinkage(format!("{} is not a list member", cell)),
                "split",
                &[cell],
            );
        }

        let new_header = self.new_header()?;
        if !self.is_linked(cell) || self.is_header(cell) {
            self.discard(new_header, "split");
            return self.fail(
                Error::InvalidLinkage(format!("list of {} was reclaimed while splitting", cell)),
                "split",
                &[cell, new_header],
            );
        }
        let header = match self.owner(cell) {
            Some(h) => h,
            None => {
                self.discard(new_header, "split");
                return self.fail(
                    Error::StructuralCorruption(format!("list of {} has no header", cell)),
                    "split",
                    &[cell],
                );
            }
        };
        match side {
            SplitSide::LeftInclusive => {
                let first = self.first(header).unwrap_or(cell);
                let after = self.right_link(cell).unwrap_or(header);
                self.cell_mut(header).right = Some(after);
                self.cell_mut(after).left = Some(header);
                self.cell_mut(new_header).right = Some(first);
                self.cell_mut(first).left = Some(new_header);
                self.cell_mut(new_header).left = Some(cell);
                self.cell_mut(cell).right = Some(new_header);
            }
            SplitSide::RightInclusive => {
                let last = self.last(header).unwrap_or(cell);
                let before = self.left_link(cell).unwrap_or(header);
                self.cell_mut(before).right = Some(header);
                self.cell_mut(header).left = Some(before);
                self.cell_mut(new_header).right = Some(cell);
                self.cell_mut(cell).left = Some(new_header);
                self.cell_mut(new_header).left = Some(last);
                self.cell_mut(last).right = Some(new_header);
            }
        }
        debug!(header = %header, new_header = %new_header, at = %cell, ?side, "Split list");
        Ok(new_header)
    }

    // === Header utilities ===

    /// Add a value at the front of a list
    pub fn push_front(&mut self, header: CellId, value: impl Into<Datum>) -> Result<CellId> {
        self.check_header(header, "push_front")?;
        let id = self.new_datum(value)?;
        self.check_header_after_allocation(header, id, "push_front")?;
        self.link_right(header, id);
        Ok(id)
    }

    /// Add a value at the back of a list
    pub fn push_back(&mut self, header: CellId, value: impl Into<Datum>) -> Result<CellId> {
        self.check_header(header, "push_back")?;
        let id = self.new_datum(value)?;
        self.check_header_after_allocation(header, id, "push_back")?;
        self.link_left(header, id);
        Ok(id)
    }

    /// Add a sublist referencing `target` at the back of a list
    pub fn push_sublist_back(&mut self, header: CellId, target: CellId) -> Result<CellId> {
        self.check_header(header, "push_sublist_back")?;
        let id = self.new_sublist(target)?;
        self.check_header_after_allocation(header, id, "push_sublist_back")?;
        self.link_left(header, id);
        Ok(id)
    }

    pub fn first(&self, header: CellId) -> Option<CellId> {
        let first = self.right_link(header)?;
        (first != header).then_some(first)
    }

    pub fn last(&self, header: CellId) -> Option<CellId> {
        let last = self.left_link(header)?;
        (last != header).then_some(last)
    }

    pub fn is_empty_list(&self, header: CellId) -> bool {
        self.first(header).is_none()
    }

    /// Iterate the members of a list
    pub fn iter(&self, header: CellId) -> ListIter<'_> {
        let next = if self.is_header(header) {
            self.right_link(header)
        } else {
            None
        };
        ListIter {
            arena: self,
            header,
            next,
        }
    }

    pub fn list_cells(&self, header: CellId) -> Vec<CellId> {
        self.iter(header).collect()
    }

    pub fn list_len(&self, header: CellId) -> usize {
        self.iter(header).count()
    }

    /// Reference count of a header
    pub fn ref_count(&self, header: CellId) -> Option<u32> {
        self.get(header)
            .filter(|c| !c.is_free())
            .and_then(|c| c.header_block())
            .map(|b| b.ref_count)
    }

    pub fn mark(&self, header: CellId) -> Option<u32> {
        self.get(header)
            .filter(|c| !c.is_free())
            .and_then(|c| c.header_block())
            .map(|b| b.mark)
    }

    pub fn set_mark(&mut self, header: CellId, mark: u32) -> Result<()> {
        self.check_header(header, "set_mark")?;
        if let Some(block) = self.cell_mut(header).header_block_mut() {
            block.mark = mark;
        }
        Ok(())
    }

    /// Attach a key→value descriptor to a header
    pub fn set_descriptor(&mut self, header: CellId, key: &str, value: impl Into<Datum>) -> Result<Option<Datum>> {
        self.check_header(header, "set_descriptor")?;
        let previous = self.cell_mut(header).header_block_mut().and_then(|block| {
            block
                .descriptors
                .get_or_insert_with(|| Box::new(BTreeMap::new()))
                .insert(key.to_string(), value.into())
        });
        Ok(previous)
    }

    pub fn descriptor(&self, header: CellId, key: &str) -> Option<&Datum> {
        self.get(header)
            .filter(|c| !c.is_free())
            .and_then(|c| c.header_block())
            .and_then(|b| b.descriptors.as_ref())
            .and_then(|d| d.get(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaConfig;
    use crate::error::ErrorKind;

    fn values(arena: &Arena, header: CellId) -> Vec<String> {
        arena.iter(header).map(|id| arena.cell(id).render()).collect()
    }

    fn arena() -> Arena {
        Arena::new(ArenaConfig::new(32, 32))
    }

    #[test]
    fn test_empty_header_points_at_itself() -> Result<()> {
        let mut arena = arena();
        let h = arena.new_header()?;
        assert_eq!(arena.left_link(h), Some(h));
        assert_eq!(arena.right_link(h), Some(h));
        assert!(arena.is_empty_list(h));
        assert_eq!(arena.ref_count(h), Some(0));
        Ok(())
    }

    #[test]
    fn test_push_front_and_back() -> Result<()> {
        let mut arena = arena();
        let h = arena.new_header()?;
        arena.push_back(h, 2)?;
        arena.push_back(h, 3)?;
        arena.push_front(h, 1)?;
        assert_eq!(values(&arena, h), vec!["1", "2", "3"]);
        assert_eq!(arena.list_len(h), 3);
        Ok(())
    }

    #[test]
    fn test_insert_and_unlink() -> Result<()> {
        let mut arena = arena();
        let h = arena.new_header()?;
        let a = arena.push_back(h, 1)?;
        let c = arena.push_back(h, 3)?;
        let b = arena.new_datum(2)?;
        arena.insert_right(a, b)?;
        assert_eq!(values(&arena, h), vec!["1", "2", "3"]);

        arena.unlink(b)?;
        assert!(arena.is_unlinked(b));
        assert_eq!(values(&arena, h), vec!["1", "3"]);
        assert_eq!(arena.right_link(a), Some(c));

        // Idempotent on an unlinked cell
        arena.unlink(b)?;
        assert!(arena.diagnostics().is_empty());
        Ok(())
    }

    #[test]
    fn test_insert_rejects_linked_cell() -> Result<()> {
        let mut arena = arena();
        let h = arena.new_header()?;
        let a = arena.push_back(h, 1)?;
        let err = arena.insert_left(h, a).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidLinkage);
        assert_eq!(values(&arena, h), vec!["1"]);
        Ok(())
    }

    #[test]
    fn test_insert_rejects_temporary_without_mutation() -> Result<()> {
        let mut arena = arena();
        let h = arena.new_header()?;
        arena.push_back(h, 1)?;
        let t = arena.temporary(9);

        let err = arena.insert_right(h, t).unwrap_err();
        assert_eq!(err, Error::InvalidOperationOnTemporary(t));
        assert_eq!(values(&arena, h), vec!["1"]);
        assert_eq!(arena.left_link(t), None);
        assert_eq!(arena.diagnostics().count(ErrorKind::InvalidOperationOnTemporary), 1);
        Ok(())
    }

    #[test]
    fn test_header_cannot_be_member_or_unlinked() -> Result<()> {
        let mut arena = arena();
        let h = arena.new_header()?;
        let g = arena.new_header()?;
        assert!(arena.insert_left(h, g).is_err());
        assert!(arena.unlink(h).is_err());
        Ok(())
    }

    #[test]
    fn test_move_within_same_list() -> Result<()> {
        let mut arena = arena();
        let h = arena.new_header()?;
        let a = arena.push_back(h, 1)?;
        let b = arena.push_back(h, 2)?;
        let c = arena.push_back(h, 3)?;

        arena.move_left(a, c)?;
        assert_eq!(values(&arena, h), vec!["3", "1", "2"]);
        arena.move_right(c, b)?;
        assert_eq!(values(&arena, h), vec!["3", "2", "1"]);
        assert!(arena.move_left(a, a).is_err());
        Ok(())
    }

    #[test]
    fn test_move_between_lists() -> Result<()> {
        let mut arena = arena();
        let h1 = arena.new_header()?;
        let h2 = arena.new_header()?;
        let a = arena.push_back(h1, 1)?;
        arena.push_back(h2, 2)?;

        arena.move_left(h2, a)?;
        assert!(arena.is_empty_list(h1));
        assert_eq!(values(&arena, h2), vec!["2", "1"]);
        Ok(())
    }

    #[test]
    fn test_move_list() -> Result<()> {
        let mut arena = arena();
        let h1 = arena.new_header()?;
        let h2 = arena.new_header()?;
        arena.push_back(h1, 1)?;
        arena.push_back(h1, 2)?;
        let x = arena.push_back(h2, 10)?;
        arena.push_back(h2, 20)?;

        arena.move_list_right(x, h1)?;
        assert!(arena.is_empty_list(h1));
        assert_eq!(values(&arena, h2), vec!["10", "1", "2", "20"]);

        arena.move_list_left(h1, h2)?;
        assert!(arena.is_empty_list(h2));
        assert_eq!(values(&arena, h1), vec!["10", "1", "2", "20"]);

        // Anchor inside the moved list is rejected before anything moves
        let inner = arena.first(h1).unwrap();
        assert!(arena.move_list_left(inner, h1).is_err());
        assert_eq!(arena.list_len(h1), 4);
        Ok(())
    }

    #[test]
    fn test_split_left_inclusive() -> Result<()> {
        let mut arena = arena();
        let h = arena.new_header()?;
        for v in 1..=5 {
            arena.push_back(h, v)?;
        }
        let at = arena.list_cells(h)[2];
        let left = arena.split(at, SplitSide::LeftInclusive)?;
        assert_eq!(values(&arena, left), vec!["1", "2", "3"]);
        assert_eq!(values(&arena, h), vec!["4", "5"]);
        assert_eq!(arena.owner(at), Some(left));
        Ok(())
    }

    #[test]
    fn test_split_right_inclusive() -> Result<()> {
        let mut arena = arena();
        let h = arena.new_header()?;
        for v in 1..=5 {
            arena.push_back(h, v)?;
        }
        let at = arena.list_cells(h)[2];
        let right = arena.split(at, SplitSide::RightInclusive)?;
        assert_eq!(values(&arena, h), vec!["1", "2"]);
        assert_eq!(values(&arena, right), vec!["3", "4", "5"]);

        // Splitting at the last cell leaves the original empty
        let last = arena.last(h).unwrap();
        let tail = arena.split(arena.first(h).unwrap(), SplitSide::RightInclusive)?;
        assert!(arena.is_empty_list(h));
        assert_eq!(arena.last(tail), Some(last));
        Ok(())
    }

    /// Leave `list` referenced only by a freed sublist slot sitting at the
    /// head of the free list, so the next allocation reclaims it
    fn reference_at_free_head(arena: &mut Arena, list: CellId) -> Result<CellId> {
        let holder = arena.new_header()?;
        let s = arena.push_sublist_back(holder, list)?;
        arena.delete_list(holder)?;
        assert_eq!(arena.allocate()?, holder);
        assert_eq!(arena.free_list_head(), Some(s));
        Ok(s)
    }

    #[test]
    fn test_push_into_list_reclaimed_by_allocation() -> Result<()> {
        let mut arena = arena();
        let h = arena.new_header()?;
        arena.push_back(h, 1)?;
        let s = reference_at_free_head(&mut arena, h)?;

        let err = arena.push_back(h, 5).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidLinkage);
        assert!(arena.is_free(h));
        assert!(arena.is_free(s));
        let check = arena.check_free_list();
        assert!(check.is_consistent(), "{:?}", check.issues);
        Ok(())
    }

    #[test]
    fn test_push_sublist_into_reclaimed_list_keeps_target() -> Result<()> {
        let mut arena = arena();
        let h = arena.new_header()?;
        let target = arena.new_header()?;
        arena.push_back(target, 2)?;
        reference_at_free_head(&mut arena, h)?;

        assert!(arena.push_sublist_back(h, target).is_err());
        assert!(arena.is_free(h));
        assert_eq!(arena.ref_count(target), Some(0));
        assert_eq!(arena.list_len(target), 1);
        assert!(arena.check_free_list().is_consistent());
        Ok(())
    }

    #[test]
    fn test_split_of_list_reclaimed_by_allocation() -> Result<()> {
        let mut arena = arena();
        let h = arena.new_header()?;
        let a = arena.push_back(h, 1)?;
        arena.push_back(h, 2)?;
        reference_at_free_head(&mut arena, h)?;

        let err = arena.split(a, SplitSide::LeftInclusive).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidLinkage);
        assert!(arena.is_free(h));
        assert!(arena.is_free(a));
        assert!(arena.check_free_list().is_consistent());
        Ok(())
    }

    #[test]
    fn test_mark_and_descriptors() -> Result<()> {
        let mut arena = arena();
        let h = arena.new_header()?;
        arena.set_mark(h, 7)?;
        assert_eq!(arena.mark(h), Some(7));

        assert_eq!(arena.set_descriptor(h, "name", "points")?, None);
        assert_eq!(arena.set_descriptor(h, "name", "lines")?, Some(Datum::from("points")));
        assert_eq!(arena.descriptor(h, "name"), Some(&Datum::from("lines")));
        assert_eq!(arena.descriptor(h, "missing"), None);
        Ok(())
    }
}
