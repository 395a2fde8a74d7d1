//! Read-only inspection: usage statistics, text report and free-list walk

use super::allocator::Arena;
use crate::cell::{CellId, CellKind};
use crate::metrics;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt::Write;

/// Arena usage snapshot
#[derive(Debug, Clone, Default, Serialize)]
pub struct ArenaStats {
    pub total_slots: usize,
    pub free_slots: usize,
    pub live_slots: usize,
    pub fragments: usize,
    pub pending_reclaims: usize,
    pub temporaries: usize,
    pub allocations: u64,
    pub releases: u64,
    pub diagnostics: u64,
}

/// Result of walking the free list
#[derive(Debug, Clone, Default, Serialize)]
pub struct FreeListCheck {
    /// Slots reached from the head
    pub walked: usize,
    /// Slots the arena believes are free
    pub expected: usize,
    pub issues: Vec<String>,
}

impl FreeListCheck {
    pub fn is_consistent(&self) -> bool {
        self.issues.is_empty()
    }
}

impl Arena {
    /// Get statistics about the arena
    pub fn stats(&self) -> ArenaStats {
        let stats = ArenaStats {
            total_slots: self.total_slots(),
            free_slots: self.free_count(),
            live_slots: self.live_count(),
            fragments: self.fragments().len(),
            pending_reclaims: self.pending.len(),
            temporaries: self.temporary_count(),
            allocations: self.allocations(),
            releases: self.releases(),
            diagnostics: self.diagnostics().total(),
        };
        metrics::record_stats(self.id(), &stats);
        stats
    }

    /// Human-readable usage report
    pub fn report_usage(&self) -> String {
        let stats = self.stats();
        let mut out = String::new();

        let _ = writeln!(out, "SLIP arena report");
        match self.fragments().watermarks() {
            Some((low, high)) => {
                let _ = writeln!(
                    out,
                    "  fragments: {} (watermarks {}..{})",
                    stats.fragments,
                    CellId::new(low),
                    CellId::new(high)
                );
            }
            None => {
                let _ = writeln!(out, "  fragments: none");
            }
        }
        for fragment in self.fragments().iter() {
            let _ = writeln!(
                out,
                "    [{}..{}] {} slots",
                CellId::new(fragment.low),
                CellId::new(fragment.high),
                fragment.slots()
            );
        }
        let _ = writeln!(
            out,
            "  slots: total={} free={} live={}",
            stats.total_slots, stats.free_slots, stats.live_slots
        );
        let _ = writeln!(out, "  pending reclaims: {}", stats.pending_reclaims);
        let _ = writeln!(out, "  temporaries: {}", stats.temporaries);
        let _ = writeln!(
            out,
            "  allocations={} releases={} diagnostics={}",
            stats.allocations, stats.releases, stats.diagnostics
        );
        out
    }

    /// Walk the free list and check it against the arena's bookkeeping.
    /// Never mutates state.
    pub fn check_free_list(&self) -> FreeListCheck {
        let mut check = FreeListCheck {
            expected: self.free_count(),
            ..Default::default()
        };
        let mut seen = HashSet::new();
        let mut cursor = self.free_list_head();

        while let Some(id) = cursor {
            if !seen.insert(id) {
                check.issues.push(format!("cycle at {}", id));
                break;
            }
            if check.walked > self.total_slots() {
                check.issues.push("free list longer than the arena".to_string());
                break;
            }
            if id == CellId::RESERVED {
                check.issues.push("reserved slot on the free list".to_string());
            }
            if !self.query(id) {
                check.issues.push(format!("{} is outside every fragment", id));
                break;
            }
            let cell = self.cell(id);
            if !cell.is_free() {
                check.issues.push(self.dump_cell(id));
                break;
            }
            match (cell.kind(), self.pending.get(&id)) {
                (CellKind::Sublist, None) => {
                    check.issues.push(format!("{} keeps a sublist reference but is not pending", id))
                }
                (CellKind::Sublist, Some(_)) | (CellKind::Undefined, None) => {}
                (kind, _) => check.issues.push(format!("{} is free but tagged {:?}", id, kind)),
            }
            check.walked += 1;
            cursor = cell.right_link();
        }

        if check.walked != check.expected {
            check.issues.push(format!(
                "walked {} free slots, expected {}",
                check.walked, check.expected
            ));
        }
        for slot in self.pending.keys() {
            if !seen.contains(slot) {
                check.issues.push(format!("pending slot {} is not on the free list", slot));
            }
        }
        check
    }
}
