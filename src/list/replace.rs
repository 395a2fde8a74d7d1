//! Replace protocol
//!
//! Changes what a list position holds while keeping the cell's identity
//! whenever the variant allows it:
//!
//! | target    | new value | result                                        |
//! |-----------|-----------|-----------------------------------------------|
//! | primitive | primitive | rewritten in place, same handle               |
//! | primitive | list      | new sublist spliced in, old slot freed        |
//! | sublist   | list      | reassigned in place, same handle              |
//! | sublist   | primitive | new cell spliced in, old list deleted         |
//! | header    | anything  | rejected                                      |
//!
//! Undefined (freshly allocated) cells count as primitive. Handles to a slot
//! that was substituted are stale afterwards; a [`Cursor`](super::Cursor)
//! follows the substitution.

use crate::arena::Arena;
use crate::cell::{op, op_for, CellId, CellKind, CellState, Datum, Payload};
use crate::error::{Error, Result};
use tracing::debug;

/// Value written by `replace`
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Datum(Datum),
    /// Reference to a list, given by its header or by a sublist sharing it
    List(CellId),
}

impl Value {
    pub fn datum(value: impl Into<Datum>) -> Self {
        Value::Datum(value.into())
    }

    pub fn list(target: CellId) -> Self {
        Value::List(target)
    }
}

impl From<Datum> for Value {
    fn from(datum: Datum) -> Self {
        Value::Datum(datum)
    }
}

impl Arena {
    /// Replace the contents of `target` with `value`.
    ///
    /// Returns the handle now holding the value: `target` itself when the
    /// change happened in place, otherwise the substituted cell.
    pub fn replace(&mut self, target: CellId, value: Value) -> Result<CellId> {
        let (state, kind) = match self.get(target) {
            Some(c) => (c.state(), c.kind()),
            None => {
                return self.fail(
                    Error::StructuralCorruption(format!("unknown cell {}", target)),
                    "replace",
                    &[],
                )
            }
        };

        if state == CellState::Free {
            return self.fail(
                Error::StructuralCorruption(format!("replace on freed cell {}", target)),
                "replace",
                &[target],
            );
        }
        if kind == CellKind::Header {
            return self.fail(
                Error::IncompatibleReplaceTarget(format!("{} is a list header", target)),
                "replace",
                &[target],
            );
        }

        match (kind, value) {
            (CellKind::Sublist, Value::List(list)) => {
                self.assign_sublist(target, list)?;
                Ok(target)
            }
            (CellKind::Sublist, Value::Datum(datum)) => self.replace_sublist_with_datum(target, datum),
            (_, Value::Datum(datum)) => {
                self.cell_mut(target)
                    .stamp(op_for(&datum), Payload::Datum(datum));
                Ok(target)
            }
            (_, Value::List(_)) if state == CellState::Temporary => {
                self.fail(Error::InvalidOperationOnTemporary(target), "replace", &[target])
            }
            (_, Value::List(list)) => self.replace_datum_with_sublist(target, list),
        }
    }

    fn replace_datum_with_sublist(&mut self, target: CellId, list: CellId) -> Result<CellId> {
        let sublist = self.new_sublist(list)?;
        self.check_target_survived(target, sublist)?;
        self.transplant(target, sublist);
        self.release_cell(target)?;
        debug!(old = %target, new = %sublist, "Substituted primitive with sublist");
        Ok(sublist)
    }

    fn replace_sublist_with_datum(&mut self, target: CellId, datum: Datum) -> Result<CellId> {
        let cell = self.new_datum(datum)?;
        self.check_target_survived(target, cell)?;
        let old_header = self.cell(target).sublist_target();
        self.transplant(target, cell);

        self.cell_mut(target)
            .stamp(&op::UNDEFINED_OP, Payload::Undefined);
        if let Some(header) = old_header {
            self.release_header_ref(header, target, "replace");
        }
        self.release_cell(target)?;
        debug!(old = %target, new = %cell, "Substituted sublist with primitive");
        Ok(cell)
    }

    /// Allocating the substitute can reclaim the list holding `target`.
    /// In that case the substitute is given back and the replace fails.
    fn check_target_survived(&mut self, target: CellId, substitute: CellId) -> Result<()> {
        if !self.is_free(target) {
            return Ok(());
        }
        self.discard(substitute, "replace");
        self.fail(
            Error::StructuralCorruption(format!(
                "{} was reclaimed while allocating its substitute",
                target
            )),
            "replace",
            &[target, substitute],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaConfig;
    use crate::error::ErrorKind;

    fn arena() -> Arena {
        Arena::new(ArenaConfig::new(32, 32))
    }

    #[test]
    fn test_primitive_in_place() -> Result<()> {
        let mut arena = arena();
        let h = arena.new_header()?;
        arena.push_back(h, 1)?;
        let bottom = arena.push_back(h, 123)?;

        let id = arena.replace(bottom, Value::datum(true))?;
        assert_eq!(id, bottom);
        assert_eq!(arena.cell(bottom).render(), "true");
        assert_eq!(arena.kind(bottom), CellKind::Bool);
        assert_eq!(arena.last(h), Some(bottom));
        Ok(())
    }

    #[test]
    fn test_primitive_to_sublist_substitutes() -> Result<()> {
        let mut arena = arena();
        let inner = arena.new_header()?;
        arena.push_back(inner, 9)?;
        let h = arena.new_header()?;
        let a = arena.push_back(h, 1)?;
        let b = arena.push_back(h, 2)?;
        let c = arena.push_back(h, 3)?;

        let s = arena.replace(b, Value::list(inner))?;
        assert_ne!(s, b);
        assert!(arena.is_free(b));
        assert!(arena.is_sublist(s));
        assert_eq!(arena.list_cells(h), vec![a, s, c]);
        assert_eq!(arena.ref_count(inner), Some(1));
        Ok(())
    }

    #[test]
    fn test_sublist_reassigned_in_place() -> Result<()> {
        let mut arena = arena();
        let l1 = arena.new_header()?;
        let l2 = arena.new_header()?;
        let h = arena.new_header()?;
        let s = arena.push_sublist_back(h, l1)?;

        let id = arena.replace(s, Value::list(l2))?;
        assert_eq!(id, s);
        assert_eq!(arena.cell(s).sublist_target(), Some(l2));
        assert!(arena.is_free(l1));
        assert_eq!(arena.ref_count(l2), Some(1));
        Ok(())
    }

    #[test]
    fn test_sublist_to_primitive_substitutes() -> Result<()> {
        let mut arena = arena();
        let inner = arena.new_header()?;
        arena.push_back(inner, 5)?;
        let h = arena.new_header()?;
        let s = arena.push_sublist_back(h, inner)?;

        let cell = arena.replace(s, Value::datum(42))?;
        assert_ne!(cell, s);
        assert!(arena.is_free(s));
        assert!(arena.is_free(inner));
        assert_eq!(arena.list_cells(h), vec![cell]);
        assert_eq!(arena.datum(cell), Some(&Datum::Integer(42)));
        assert!(arena.check_free_list().is_consistent());
        Ok(())
    }

    #[test]
    fn test_header_target_rejected() -> Result<()> {
        let mut arena = arena();
        let h = arena.new_header()?;
        let err = arena.replace(h, Value::datum(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompatibleReplaceTarget);
        assert!(arena.is_header(h));
        Ok(())
    }

    #[test]
    fn test_temporary_targets() -> Result<()> {
        let mut arena = arena();
        let t = arena.temporary(1);
        assert_eq!(arena.replace(t, Value::datum("x"))?, t);
        assert_eq!(arena.datum(t), Some(&Datum::from("x")));

        let h = arena.new_header()?;
        let err = arena.replace(t, Value::list(h)).unwrap_err();
        assert_eq!(err, Error::InvalidOperationOnTemporary(t));
        assert_eq!(arena.ref_count(h), Some(0));
        Ok(())
    }

    #[test]
    fn test_sublist_to_primitive_keeps_other_references() -> Result<()> {
        let mut arena = arena();
        let inner = arena.new_header()?;
        arena.push_back(inner, 5)?;
        let keeper = arena.new_sublist(inner)?;
        let h = arena.new_header()?;
        let s = arena.push_sublist_back(h, inner)?;

        arena.replace(s, Value::datum(1))?;
        assert_eq!(arena.ref_count(inner), Some(1));
        assert_eq!(arena.list_len(inner), 1);
        arena.destroy_sublist(keeper)?;
        assert!(arena.is_free(inner));
        Ok(())
    }

    #[test]
    fn test_target_list_reclaimed_while_allocating() -> Result<()> {
        let mut arena = arena();
        let other = arena.new_header()?;
        let h = arena.new_header()?;
        let target = arena.push_back(h, 1)?;

        // `h` is referenced only from a freed slot at the head of the free list
        let holder = arena.new_header()?;
        arena.push_sublist_back(holder, h)?;
        arena.delete_list(holder)?;
        arena.allocate()?;

        let err = arena.replace(target, Value::list(other)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StructuralCorruption);
        assert!(arena.is_free(h));
        assert!(arena.is_free(target));
        assert_eq!(arena.ref_count(other), Some(0));
        assert!(arena.is_header(other));
        assert!(arena.check_free_list().is_consistent());
        Ok(())
    }

    #[test]
    fn test_freed_target_rejected() -> Result<()> {
        let mut arena = arena();
        let id = arena.new_datum(1)?;
        arena.release_cell(id)?;
        let err = arena.replace(id, Value::datum(2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StructuralCorruption);
        Ok(())
    }
}
