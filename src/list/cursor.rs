//! List cursor
//!
//! A position inside one list that stays valid across `replace`, even when
//! the replacement substitutes the cell under it.

use super::replace::Value;
use crate::arena::Arena;
use crate::cell::CellId;
use crate::error::{Error, Result};

/// Position within a list. `None` means the cursor sits on the header,
/// before the first member or after the last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    header: CellId,
    current: Option<CellId>,
}

impl Cursor {
    /// Cursor on the first member of `header`
    pub fn new(arena: &mut Arena, header: CellId) -> Result<Self> {
        if !arena.is_header(header) {
            return arena.fail(
                Error::InvalidLinkage(format!("{} is not a list header", header)),
                "cursor",
                &[header],
            );
        }
        Ok(Self {
            header,
            current: arena.first(header),
        })
    }

    pub fn header(&self) -> CellId {
        self.header
    }

    pub fn current(&self) -> Option<CellId> {
        self.current
    }

    pub fn is_at_end(&self) -> bool {
        self.current.is_none()
    }

    /// Step right. From the end, wraps to the first member.
    pub fn advance(&mut self, arena: &Arena) -> Option<CellId> {
        let from = self.current.unwrap_or(self.header);
        self.current = arena.right_link(from).filter(|&id| id != self.header);
        self.current
    }

    /// Step left. From the end, wraps to the last member.
    pub fn retreat(&mut self, arena: &Arena) -> Option<CellId> {
        let from = self.current.unwrap_or(self.header);
        self.current = arena.left_link(from).filter(|&id| id != self.header);
        self.current
    }

    /// Replace the value under the cursor and keep pointing at whichever
    /// cell now holds it
    pub fn replace(&mut self, arena: &mut Arena, value: Value) -> Result<CellId> {
        let target = match self.current {
            Some(id) => id,
            None => {
                return arena.fail(
                    Error::InvalidLinkage(format!("cursor on {} is past the end", self.header)),
                    "cursor_replace",
                    &[self.header],
                )
            }
        };
        let id = arena.replace(target, value)?;
        self.current = Some(id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaConfig;
    use crate::cell::Datum;

    #[test]
    fn test_walk_both_directions() -> Result<()> {
        let mut arena = Arena::new(ArenaConfig::new(16, 16));
        let h = arena.new_header()?;
        let a = arena.push_back(h, 1)?;
        let b = arena.push_back(h, 2)?;

        let mut cursor = Cursor::new(&mut arena, h)?;
        assert_eq!(cursor.current(), Some(a));
        assert_eq!(cursor.advance(&arena), Some(b));
        assert_eq!(cursor.advance(&arena), None);
        assert!(cursor.is_at_end());
        assert_eq!(cursor.retreat(&arena), Some(b));
        assert_eq!(cursor.retreat(&arena), Some(a));
        Ok(())
    }

    #[test]
    fn test_follows_substitution() -> Result<()> {
        let mut arena = Arena::new(ArenaConfig::new(16, 16));
        let inner = arena.new_header()?;
        let h = arena.new_header()?;
        arena.push_back(h, 1)?;
        let tail = arena.push_back(h, 2)?;

        let mut cursor = Cursor::new(&mut arena, h)?;
        let s = cursor.replace(&mut arena, Value::list(inner))?;
        assert_eq!(cursor.current(), Some(s));
        assert_eq!(cursor.advance(&arena), Some(tail));

        cursor.retreat(&arena);
        let d = cursor.replace(&mut arena, Value::datum(5))?;
        assert_eq!(cursor.current(), Some(d));
        assert_eq!(arena.datum(d), Some(&Datum::Integer(5)));
        Ok(())
    }

    #[test]
    fn test_empty_list_and_bad_header() -> Result<()> {
        let mut arena = Arena::new(ArenaConfig::new(16, 16));
        let h = arena.new_header()?;
        let mut cursor = Cursor::new(&mut arena, h)?;
        assert!(cursor.is_at_end());
        assert!(cursor.replace(&mut arena, Value::datum(1)).is_err());

        let d = arena.new_datum(1)?;
        assert!(Cursor::new(&mut arena, d).is_err());
        Ok(())
    }
}
