//! Reference-counted sublists and list reclamation
//!
//! A sublist cell holds a counted reference to a header. The list's owner is
//! not counted: `delete_list` reclaims an unreferenced list at once and leaves
//! a referenced one to its last sublist. Destroying a sublist drops its
//! reference immediately; deleting a list does not recurse into the sublists
//! it contains. Those keep their reference while on the free list and drop it
//! when the slot is reused by `allocate` or when `flush_pending` runs.
//!
//! ```text
//! delete_list(O)          O: ( 1 S 2 )   S -> H (refs=1)
//!   O, 1, S, 2 freed      pending {S -> H}, H refs=1
//! allocate() pops S       H refs=0 -> H and its members freed
//! ```

use crate::arena::Arena;
use crate::cell::{op, CellId, CellState, Payload};
use crate::error::{Error, Result};
use tracing::{debug, warn};

impl Arena {
    /// Header a new reference to `target` should point at. A sublist target
    /// resolves to the header it references.
    fn resolve_list_target(&mut self, target: CellId, operation: &'static str) -> Result<CellId> {
        let resolved = match self.get(target) {
            Some(c) if c.is_temporary() => {
                return self.fail(Error::InvalidOperationOnTemporary(target), operation, &[target])
            }
            Some(c) if c.is_free() => None,
            Some(c) if c.is_header() => Some(target),
            Some(c) => c.sublist_target(),
            None => None,
        };
        match resolved {
            Some(header) if self.is_header(header) => Ok(header),
            Some(header) => self.fail(
                Error::StructuralCorruption(format!(
                    "sublist {} references {} which is not a live header",
                    target, header
                )),
                operation,
                &[target, header],
            ),
            None => self.fail(
                Error::IncompatibleReplaceTarget(format!(
                    "{} is neither a list header nor a sublist",
                    target
                )),
                operation,
                &[target],
            ),
        }
    }

    pub(crate) fn adjust_ref_count(&mut self, header: CellId, delta: i64) -> Option<u32> {
        let block = self.cell_mut(header).header_block_mut()?;
        block.ref_count = (block.ref_count as i64 + delta).max(0) as u32;
        Some(block.ref_count)
    }

    /// Allocate an unlinked sublist referencing `target` (a header, or a
    /// sublist whose header is shared). The header count is incremented.
    pub fn new_sublist(&mut self, target: CellId) -> Result<CellId> {
        let header = self.resolve_list_target(target, "new_sublist")?;

        // Take the reference before allocating: popping a pending slot that
        // references the same header must not drive it to zero.
        self.adjust_ref_count(header, 1);
        let id = match self.allocate() {
            Ok(id) => id,
            Err(e) => {
                self.adjust_ref_count(header, -1);
                return Err(e);
            }
        };
        self.cell_mut(id).stamp(&op::SUBLIST_OP, Payload::Sublist(header));
        debug!(sublist = %id, header = %header, refs = ?self.ref_count(header), "Created sublist");
        Ok(id)
    }

    /// Destroy a sublist: unlink it, drop its header reference and free its
    /// slot. Destroying an already freed sublist is a no-op.
    ///
    /// Returns the number of slots freed, the header's list included when
    /// this was the last reference.
    pub fn destroy_sublist(&mut self, sublist: CellId) -> Result<usize> {
        let cell = match self.get(sublist) {
            Some(c) => c,
            None => {
                return self.fail(
                    Error::StructuralCorruption(format!("unknown cell {}", sublist)),
                    "destroy_sublist",
                    &[],
                )
            }
        };
        if cell.is_free() {
            return Ok(0);
        }
        if cell.is_temporary() {
            return self.fail(
                Error::InvalidOperationOnTemporary(sublist),
                "destroy_sublist",
                &[sublist],
            );
        }
        let header = match cell.sublist_target() {
            Some(h) => h,
            None => {
                return self.fail(
                    Error::InvalidLinkage(format!("{} is not a sublist", sublist)),
                    "destroy_sublist",
                    &[sublist],
                )
            }
        };

        if cell.state() == CellState::Linked {
            self.detach(sublist);
        }
        self.cell_mut(sublist)
            .stamp(&op::UNDEFINED_OP, Payload::Undefined);

        let reclaimed = self.release_header_ref(header, sublist, "destroy_sublist");
        let freed = self.release_cell(sublist)?;
        Ok(reclaimed + freed)
    }

    /// Point a live sublist at a different list. The new header is counted
    /// before the old one is released, so reassigning to the same list is
    /// safe.
    pub fn assign_sublist(&mut self, sublist: CellId, target: CellId) -> Result<()> {
        let old = match self.get(sublist) {
            Some(c) if c.is_temporary() => {
                return self.fail(
                    Error::InvalidOperationOnTemporary(sublist),
                    "assign_sublist",
                    &[sublist],
                )
            }
            Some(c) if !c.is_free() => c.sublist_target(),
            _ => None,
        };
        let old = match old {
            Some(h) => h,
            None => {
                return self.fail(
                    Error::InvalidLinkage(format!("{} is not a live sublist", sublist)),
                    "assign_sublist",
                    &[sublist],
                )
            }
        };
        let header = self.resolve_list_target(target, "assign_sublist")?;

        self.adjust_ref_count(header, 1);
        self.cell_mut(sublist)
            .stamp(&op::SUBLIST_OP, Payload::Sublist(header));
        self.release_header_ref(old, sublist, "assign_sublist");
        debug!(sublist = %sublist, from = %old, to = %header, "Reassigned sublist");
        Ok(())
    }

    /// Delete a list on behalf of its owner. An unreferenced list is released
    /// at once, header and members in one chain. A list that sublists still
    /// reference stays live and is reclaimed when the last of them goes.
    /// Sublists among the members keep their references until their slots
    /// are reused.
    ///
    /// Returns the number of slots freed.
    pub fn delete_list(&mut self, header: CellId) -> Result<usize> {
        if self.is_temporary(header) {
            return self.fail(Error::InvalidOperationOnTemporary(header), "delete_list", &[header]);
        }
        let count = match self.ref_count(header) {
            Some(c) => c,
            None => {
                return self.fail(
                    Error::InvalidLinkage(format!("{} is not a list header", header)),
                    "delete_list",
                    &[header],
                )
            }
        };
        if count > 0 {
            debug!(header = %header, refs = count, "List still referenced, left to its sublists");
            return Ok(0);
        }
        Ok(self.reclaim_list(header))
    }

    /// Drop the reference a sublist slot (`holder`) held on `header`.
    /// Bad targets and underflows are reported, never fatal.
    pub(crate) fn release_header_ref(&mut self, header: CellId, holder: CellId, operation: &'static str) -> usize {
        if !self.is_header(header) {
            self.report(
                &Error::StructuralCorruption(format!(
                    "sublist {} references {} which is not a live header",
                    holder, header
                )),
                operation,
                &[holder, header],
            );
            return 0;
        }
        match self.ref_count(header) {
            Some(0) | None => {
                self.report(
                    &Error::StructuralCorruption(format!(
                        "reference count underflow on {} (released by {})",
                        header, holder
                    )),
                    operation,
                    &[header, holder],
                );
                0
            }
            Some(_) => match self.adjust_ref_count(header, -1) {
                Some(0) => self.reclaim_list(header),
                _ => 0,
            },
        }
    }

    /// Hand the header and all its members to the free list as one chain
    fn reclaim_list(&mut self, header: CellId) -> usize {
        let end = self.last(header).unwrap_or(header);
        match self.release(header, end) {
            Ok(freed) => {
                debug!(header = %header, freed, "Reclaimed list");
                freed
            }
            Err(e) => {
                warn!(header = %header, error = %e, "List reclamation failed");
                0
            }
        }
    }

    /// Destroy any arena cell: headers go through `delete_list`, sublists
    /// through `destroy_sublist`, anything else is unlinked and freed.
    pub fn destroy(&mut self, cell: CellId) -> Result<usize> {
        match self.get(cell) {
            None => self.fail(
                Error::StructuralCorruption(format!("unknown cell {}", cell)),
                "destroy",
                &[],
            ),
            Some(c) if c.is_temporary() => {
                self.fail(Error::InvalidOperationOnTemporary(cell), "destroy", &[cell])
            }
            Some(c) if c.is_free() => Ok(0),
            Some(c) if c.is_header() => self.delete_list(cell),
            Some(c) if c.is_sublist() => self.destroy_sublist(cell),
            Some(c) => {
                if c.is_linked() {
                    self.detach(cell);
                }
                self.release_cell(cell)
            }
        }
    }

    /// Number of freed sublist slots whose header reference is still held
    pub fn pending_reclaims(&self) -> usize {
        self.pending.len()
    }

    /// Resolve every deferred header reference now, following cascades
    /// until none remain. Returns the number of slots freed.
    pub fn flush_pending(&mut self) -> usize {
        let mut freed = 0;
        while let Some((slot, header)) = self.pending.pop_first() {
            self.cell_mut(slot).stamp(&op::UNDEFINED_OP, Payload::Undefined);
            freed += self.release_header_ref(header, slot, "flush_pending");
        }
        if freed > 0 {
            debug!(freed, "Flushed pending reclaims");
        }
        freed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaConfig;
    use crate::error::ErrorKind;

    fn arena() -> Arena {
        Arena::new(ArenaConfig::new(64, 64))
    }

    fn list_of(arena: &mut Arena, values: &[i64]) -> Result<CellId> {
        let h = arena.new_header()?;
        for &v in values {
            arena.push_back(h, v)?;
        }
        Ok(h)
    }

    #[test]
    fn test_sublists_share_header() -> Result<()> {
        let mut arena = arena();
        let h = list_of(&mut arena, &[1, 2, 3])?;
        let s1 = arena.new_sublist(h)?;
        let s2 = arena.new_sublist(s1)?;
        assert_eq!(arena.ref_count(h), Some(2));
        assert_eq!(arena.cell(s2).sublist_target(), Some(h));
        assert!(arena.is_unlinked(s1));
        Ok(())
    }

    #[test]
    fn test_sublist_over_data_rejected() -> Result<()> {
        let mut arena = arena();
        let h = list_of(&mut arena, &[1])?;
        let data = arena.first(h).unwrap();
        let free = arena.free_count();

        let err = arena.new_sublist(data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompatibleReplaceTarget);
        assert_eq!(arena.free_count(), free);
        assert_eq!(arena.list_len(h), 1);
        Ok(())
    }

    #[test]
    fn test_destroy_last_sublist_reclaims() -> Result<()> {
        let mut arena = arena();
        let h = list_of(&mut arena, &[1, 2])?;
        let s = arena.new_sublist(h)?;
        let free = arena.free_count();

        // Header + 2 members + the sublist slot
        assert_eq!(arena.destroy_sublist(s)?, 4);
        assert_eq!(arena.free_count(), free + 4);
        assert!(arena.is_free(h));
        // Second destroy is a no-op
        assert_eq!(arena.destroy_sublist(s)?, 0);
        assert!(arena.diagnostics().is_empty());
        Ok(())
    }

    #[test]
    fn test_self_assignment_keeps_list() -> Result<()> {
        let mut arena = arena();
        let h = list_of(&mut arena, &[1, 2])?;
        let s = arena.new_sublist(h)?;
        arena.assign_sublist(s, h)?;
        assert_eq!(arena.ref_count(h), Some(1));
        assert_eq!(arena.list_len(h), 2);
        Ok(())
    }

    #[test]
    fn test_reassignment_releases_old_list() -> Result<()> {
        let mut arena = arena();
        let old = list_of(&mut arena, &[1])?;
        let new = list_of(&mut arena, &[2])?;
        let s = arena.new_sublist(old)?;

        arena.assign_sublist(s, new)?;
        assert!(arena.is_free(old));
        assert_eq!(arena.ref_count(new), Some(1));
        assert_eq!(arena.cell(s).sublist_target(), Some(new));
        Ok(())
    }

    #[test]
    fn test_delete_list_with_references() -> Result<()> {
        let mut arena = arena();
        let h = list_of(&mut arena, &[1])?;
        let s1 = arena.new_sublist(h)?;
        let s2 = arena.new_sublist(h)?;

        // Referenced lists survive their owner's delete, however often
        assert_eq!(arena.delete_list(h)?, 0);
        assert_eq!(arena.delete_list(h)?, 0);
        assert_eq!(arena.ref_count(h), Some(2));
        assert_eq!(arena.list_len(h), 1);

        assert_eq!(arena.destroy_sublist(s1)?, 1);
        assert!(arena.is_header(h));
        // Header, member and the sublist slot
        assert_eq!(arena.destroy_sublist(s2)?, 3);
        assert!(arena.is_free(h));
        assert!(arena.diagnostics().is_empty());
        Ok(())
    }

    #[test]
    fn test_deleted_list_slot_not_shared_with_live_sublist() -> Result<()> {
        let mut arena = arena();
        let h = list_of(&mut arena, &[1])?;
        let s1 = arena.new_sublist(h)?;
        arena.delete_list(h)?;
        assert!(!arena.is_free(h));

        // Nothing handed out may alias the list `s1` still points at
        let h3 = arena.new_header()?;
        assert_ne!(h3, h);
        let s2 = arena.new_sublist(h3)?;
        arena.destroy_sublist(s1)?;
        assert!(arena.is_free(h));
        assert!(arena.is_header(h3));
        assert_eq!(arena.cell(s2).sublist_target(), Some(h3));
        assert!(arena.diagnostics().is_empty());
        assert!(arena.check_free_list().is_consistent());
        Ok(())
    }

    #[test]
    fn test_reassignment_keeps_list_with_other_references() -> Result<()> {
        let mut arena = arena();
        let old = list_of(&mut arena, &[1])?;
        let new = list_of(&mut arena, &[2])?;
        let s = arena.new_sublist(old)?;
        let other = arena.new_sublist(old)?;

        arena.assign_sublist(s, new)?;
        assert_eq!(arena.ref_count(old), Some(1));
        assert_eq!(arena.list_len(old), 1);
        arena.destroy_sublist(other)?;
        assert!(arena.is_free(old));
        Ok(())
    }

    #[test]
    fn test_nested_sublist_reclaimed_lazily() -> Result<()> {
        let mut arena = arena();
        let inner = list_of(&mut arena, &[7, 8])?;
        let outer = list_of(&mut arena, &[1])?;
        let s = arena.push_sublist_back(outer, inner)?;
        assert_eq!(arena.ref_count(inner), Some(1));

        arena.delete_list(outer)?;
        assert!(arena.is_free(s));
        assert_eq!(arena.ref_count(inner), Some(1));
        assert_eq!(arena.pending_reclaims(), 1);
        assert!(arena.check_free_list().is_consistent());

        // The chain was pushed as outer -> 1 -> s; the third pop reuses `s`
        assert_eq!(arena.free_list_head(), Some(outer));
        arena.allocate()?;
        arena.allocate()?;
        assert_eq!(arena.allocate()?, s);
        assert!(arena.is_free(inner));
        assert_eq!(arena.pending_reclaims(), 0);
        assert!(arena.check_free_list().is_consistent());
        Ok(())
    }

    #[test]
    fn test_flush_pending_cascades() -> Result<()> {
        let mut arena = arena();
        let deepest = list_of(&mut arena, &[3])?;
        let middle = list_of(&mut arena, &[2])?;
        arena.push_sublist_back(middle, deepest)?;
        let outer = list_of(&mut arena, &[1])?;
        arena.push_sublist_back(outer, middle)?;

        arena.delete_list(outer)?;
        assert_eq!(arena.pending_reclaims(), 1);

        // middle (3 slots) then deepest (2 slots)
        assert_eq!(arena.flush_pending(), 5);
        assert_eq!(arena.pending_reclaims(), 0);
        assert!(arena.is_free(middle));
        assert!(arena.is_free(deepest));
        assert!(arena.check_free_list().is_consistent());
        Ok(())
    }

    #[test]
    fn test_destroy_routes_by_variant() -> Result<()> {
        let mut arena = arena();
        let h = list_of(&mut arena, &[1, 2])?;
        let first = arena.first(h).unwrap();
        assert_eq!(arena.destroy(first)?, 1);
        assert_eq!(arena.list_len(h), 1);

        let t = arena.temporary(1);
        assert!(arena.destroy(t).is_err());

        assert_eq!(arena.destroy(h)?, 2);
        assert_eq!(arena.destroy(h)?, 0);
        Ok(())
    }
}
