//! Textual rendering and structural equality
//!
//! Both go through each cell's dispatch descriptor; only list structure is
//! walked here. Sublists render as the list they reference:
//!
//! ```text
//! ( 1 2 ( 3 "x" ) true )
//! ```

use crate::arena::Arena;
use crate::cell::CellId;
use std::collections::HashSet;

/// Nesting depth past which rendering and comparison stop descending
pub const MAX_DEPTH: usize = 256;

impl Arena {
    /// List header a cell stands for, if it is a header or a live sublist
    fn list_view(&self, id: CellId) -> Option<CellId> {
        let cell = self.get(id).filter(|c| !c.is_free())?;
        if cell.is_header() {
            return Some(id);
        }
        cell.sublist_target().filter(|&h| self.is_header(h))
    }

    /// Render a cell; lists print their members recursively. A list that
    /// contains itself, directly or through other lists, prints `( ... )`
    /// where it repeats.
    pub fn render(&self, id: CellId) -> String {
        let mut out = String::new();
        let mut path = HashSet::new();
        self.render_into(id, &mut path, &mut out);
        out
    }

    fn render_into(&self, id: CellId, path: &mut HashSet<CellId>, out: &mut String) {
        let header = match self.list_view(id) {
            Some(h) => h,
            None => {
                match self.get(id) {
                    Some(c) => out.push_str(&c.render()),
                    None => out.push_str("<invalid>"),
                }
                return;
            }
        };
        if path.len() >= MAX_DEPTH || !path.insert(header) {
            out.push_str("( ... )");
            return;
        }
        out.push('(');
        for member in self.iter(header) {
            out.push(' ');
            self.render_into(member, path, out);
        }
        out.push_str(" )");
        path.remove(&header);
    }

    /// Structural equality: data cells compare through their descriptor,
    /// lists element by element
    pub fn equal(&self, a: CellId, b: CellId) -> bool {
        self.equal_at(a, b, 0, &mut HashSet::new())
    }

    /// `seen` holds list pairs already under comparison. Any mismatch ends
    /// the whole comparison, so a pair met again is taken as equal.
    fn equal_at(&self, a: CellId, b: CellId, depth: usize, seen: &mut HashSet<(CellId, CellId)>) -> bool {
        match (self.list_view(a), self.list_view(b)) {
            (Some(ha), Some(hb)) => {
                if ha == hb || !seen.insert((ha, hb)) {
                    return true;
                }
                if depth >= MAX_DEPTH {
                    return false;
                }
                let mut left = self.iter(ha);
                let mut right = self.iter(hb);
                loop {
                    match (left.next(), right.next()) {
                        (None, None) => return true,
                        (Some(x), Some(y)) if self.equal_at(x, y, depth + 1, seen) => {}
                        _ => return false,
                    }
                }
            }
            (None, None) => match (self.get(a), self.get(b)) {
                (Some(x), Some(y)) if x.is_data() && y.is_data() => {
                    x.op().equals(x.payload(), y.payload())
                }
                _ => false,
            },
            _ => false,
        }
    }
}
