//! Cell arena and available space list

use super::config::ArenaConfig;
use super::fragment::{Fragment, FragmentRegistry};
use crate::cell::{self, op, Cell, CellId, CellKind, CellOp, Datum, Payload};
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

static NEXT_ARENA_ID: AtomicU64 = AtomicU64::new(1);

/// Cell arena
///
/// Owns every arena slot, the fragment registry and the available space list
/// (a singly linked chain of free slots threaded through their right links).
/// Nothing is requested from the system until the first allocation.
pub struct Arena {
    /// Process-unique, labels this arena's metrics
    id: u64,
    config: ArenaConfig,
    initialized: bool,
    /// Slot storage; index 0 is the reserved marker slot
    slots: Vec<Cell>,
    /// Cells whose storage is outside every fragment; `None` once dropped
    temporaries: Vec<Option<Cell>>,
    /// Dropped temporary indices, reused first
    vacant_temporaries: Vec<u32>,
    fragments: FragmentRegistry,
    free_head: Option<CellId>,
    free_count: usize,
    /// Freed sublist slots whose header decrement is deferred (slot -> header)
    pub(crate) pending: BTreeMap<CellId, CellId>,
    allocations: u64,
    releases: u64,
    pub(crate) diagnostics: Diagnostics,
}

impl Default for Arena {
    fn default() -> Self {
        Self::new(ArenaConfig::default())
    }
}

impl Arena {
    /// Create an initialized arena; fragments are requested lazily
    pub fn new(config: ArenaConfig) -> Self {
        info!(
            initial_slots = config.initial_slots,
            growth_slots = config.growth_slots,
            max_slots = config.max_slots,
            "Initializing cell arena"
        );
        Self {
            id: NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed),
            config,
            initialized: true,
            slots: vec![Self::reserved_slot()],
            temporaries: Vec::new(),
            vacant_temporaries: Vec::new(),
            fragments: FragmentRegistry::new(),
            free_head: None,
            free_count: 0,
            pending: BTreeMap::new(),
            allocations: 0,
            releases: 0,
            diagnostics: Diagnostics::default(),
        }
    }

    /// Re-arm the arena after `reset` (or replace the configuration)
    pub fn init(&mut self, config: ArenaConfig) {
        self.reset();
        info!(
            initial_slots = config.initial_slots,
            growth_slots = config.growth_slots,
            "Re-initializing cell arena"
        );
        self.config = config;
        self.initialized = true;
    }

    /// Drop every fragment. All outstanding handles become invalid and the
    /// arena refuses work until `init` is called again.
    pub fn reset(&mut self) {
        info!(
            fragments = self.fragments.len(),
            slots = self.slots.len() - 1,
            "Resetting cell arena"
        );
        self.slots.clear();
        self.slots.push(Self::reserved_slot());
        self.temporaries.clear();
        self.vacant_temporaries.clear();
        self.fragments.clear();
        self.free_head = None;
        self.free_count = 0;
        self.pending.clear();
        self.allocations = 0;
        self.releases = 0;
        self.initialized = false;
    }

    fn reserved_slot() -> Cell {
        Cell::temporary(Payload::Undefined, &op::UNDEFINED_OP)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub(crate) fn ensure_initialized(&mut self, operation: &'static str) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        let err = Error::NotInitialized;
        self.diagnostics.report(&err, operation, vec![]);
        Err(err)
    }

    // === Slot access ===

    /// Look up a cell. Returns `None` for handles this arena never issued.
    pub fn get(&self, id: CellId) -> Option<&Cell> {
        if id.is_temporary_handle() {
            self.temporaries.get(id.index()).and_then(Option::as_ref)
        } else {
            self.slots.get(id.index())
        }
    }

    /// Look up a cell.
    ///
    /// # Panics
    /// Panics on a handle this arena never issued (or issued before `reset`)
    /// and on a dropped temporary.
    pub fn cell(&self, id: CellId) -> &Cell {
        if id.is_temporary_handle() {
            match &self.temporaries[id.index()] {
                Some(cell) => cell,
                None => panic!("temporary {} was dropped", id),
            }
        } else {
            &self.slots[id.index()]
        }
    }

    pub(crate) fn cell_mut(&mut self, id: CellId) -> &mut Cell {
        if id.is_temporary_handle() {
            match &mut self.temporaries[id.index()] {
                Some(cell) => cell,
                None => panic!("temporary {} was dropped", id),
            }
        } else {
            &mut self.slots[id.index()]
        }
    }

    /// Structural dump of one cell
    pub fn dump_cell(&self, id: CellId) -> String {
        match self.get(id) {
            Some(c) => cell::dump(id, c),
            None => format!("cell {} [invalid handle]", id),
        }
    }

    /// Report a non-fatal error with dumps of the given cells
    pub(crate) fn report(&mut self, err: &Error, operation: &'static str, cells: &[CellId]) {
        let dumps = cells.iter().map(|&id| self.dump_cell(id)).collect();
        self.diagnostics.report(err, operation, dumps);
    }

    /// Report and hand the error back for propagation
    pub(crate) fn fail<T>(&mut self, err: Error, operation: &'static str, cells: &[CellId]) -> Result<T> {
        self.report(&err, operation, cells);
        Err(err)
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    // === Predicates ===

    pub fn is_temporary(&self, id: CellId) -> bool {
        self.get(id).map_or(false, Cell::is_temporary)
    }

    pub fn is_free(&self, id: CellId) -> bool {
        self.get(id).map_or(false, Cell::is_free)
    }

    pub fn is_unlinked(&self, id: CellId) -> bool {
        self.get(id).map_or(false, Cell::is_unlinked)
    }

    pub fn is_linked(&self, id: CellId) -> bool {
        self.get(id).map_or(false, Cell::is_linked)
    }

    pub fn is_header(&self, id: CellId) -> bool {
        self.get(id).map_or(false, |c| !c.is_free() && c.is_header())
    }

    pub fn is_sublist(&self, id: CellId) -> bool {
        self.get(id).map_or(false, |c| !c.is_free() && c.is_sublist())
    }

    pub fn is_data(&self, id: CellId) -> bool {
        self.get(id).map_or(false, |c| !c.is_free() && c.is_data())
    }

    pub fn kind(&self, id: CellId) -> CellKind {
        self.cell(id).kind()
    }

    pub fn datum(&self, id: CellId) -> Option<&Datum> {
        self.get(id).and_then(Cell::datum)
    }

    // === Raw link mutators (no validation) ===

    pub fn left_link(&self, id: CellId) -> Option<CellId> {
        self.cell(id).left_link()
    }

    pub fn right_link(&self, id: CellId) -> Option<CellId> {
        self.cell(id).right_link()
    }

    /// Overwrite a left link, returning the previous value
    pub fn set_left_link(&mut self, id: CellId, link: Option<CellId>) -> Option<CellId> {
        self.cell_mut(id).set_left_link(link)
    }

    /// Overwrite a right link, returning the previous value
    pub fn set_right_link(&mut self, id: CellId, link: Option<CellId>) -> Option<CellId> {
        self.cell_mut(id).set_right_link(link)
    }

    // === Allocation ===

    /// Create a temporary cell holding a primitive value.
    ///
    /// Temporaries live outside every fragment: they can be read and mutated
    /// in place but never linked into a list or released.
    pub fn temporary(&mut self, value: impl Into<Datum>) -> CellId {
        let datum = value.into();
        let cell = Cell::temporary(Payload::Datum(datum.clone()), cell::op_for(&datum));
        let index = match self.vacant_temporaries.pop() {
            Some(index) => {
                self.temporaries[index as usize] = Some(cell);
                index
            }
            None => {
                self.temporaries.push(Some(cell));
                (self.temporaries.len() - 1) as u32
            }
        };
        CellId::temporary(index)
    }

    /// Discard a temporary. Its handle becomes invalid and the storage is
    /// reused by the next `temporary` call.
    pub fn drop_temporary(&mut self, id: CellId) -> Result<()> {
        if !id.is_temporary_handle() {
            return self.fail(
                Error::InvalidLinkage(format!("{} is not a temporary", id)),
                "drop_temporary",
                &[id],
            );
        }
        match self.temporaries.get_mut(id.index()) {
            Some(entry) if entry.is_some() => {
                *entry = None;
                self.vacant_temporaries.push(id.index() as u32);
                debug!(temporary = %id, "Dropped temporary");
                Ok(())
            }
            _ => self.fail(
                Error::StructuralCorruption(format!("unknown temporary {}", id)),
                "drop_temporary",
                &[],
            ),
        }
    }

    /// Hand out one unlinked slot stamped with the undefined tag.
    ///
    /// Popping a freed sublist slot first drops its deferred header
    /// reference, which may cascade a whole list back onto the free list
    /// before the slot is returned.
    pub fn allocate(&mut self) -> Result<CellId> {
        self.ensure_initialized("allocate")?;

        loop {
            let id = match self.free_head {
                Some(id) => id,
                None => {
                    self.grow()?;
                    continue;
                }
            };

            if id == CellId::RESERVED {
                // Never hand out the marker slot
                let next = self.slots[0].right_link();
                self.report(
                    &Error::StructuralCorruption("reserved slot found on the free list".into()),
                    "allocate",
                    &[id],
                );
                self.free_head = next;
                self.free_count = self.free_count.saturating_sub(1);
                continue;
            }

            if !self.cell(id).is_free() {
                // The chain is broken; nothing after this point can be trusted
                self.report(
                    &Error::StructuralCorruption(format!(
                        "free list head {} is not a free slot; dropping {} listed slots",
                        id, self.free_count
                    )),
                    "allocate",
                    &[id],
                );
                self.free_head = None;
                self.free_count = 0;
                continue;
            }

            let slot = self.cell_mut(id);
            let next = slot.right_link();
            let deferred = slot.sublist_target();
            slot.left = None;
            slot.right = None;
            slot.state = cell::CellState::Unlinked;
            slot.stamp(&op::UNDEFINED_OP, Payload::Undefined);

            self.free_head = next;
            self.free_count -= 1;
            self.allocations += 1;

            if let Some(header) = deferred {
                self.pending.remove(&id);
                debug!(slot = %id, header = %header, "Resolving deferred sublist reference");
                self.release_header_ref(header, id, "allocate");
            }

            debug!(slot = %id, free = self.free_count, "Allocated cell");
            return Ok(id);
        }
    }

    /// Obtain a new fragment and format it onto the free list
    fn grow(&mut self) -> Result<()> {
        let first = self.fragments.is_empty();
        let slots = match self.config.fragment_slots(first) {
            Ok(n) => n,
            Err(e) => return self.fail(e, "allocate", &[]),
        };

        let owned = self.slots.len() - 1;
        if self.config.max_slots > 0 && owned + slots > self.config.max_slots {
            return self.fail(
                Error::AllocatorExhausted(format!(
                    "fragment of {} slots exceeds limit ({} of {} in use)",
                    slots, owned, self.config.max_slots
                )),
                "allocate",
                &[],
            );
        }

        let low = self.slots.len();
        if low + slots > CellId::TEMPORARY_BIT as usize {
            return self.fail(
                Error::AllocatorExhausted(format!("address space exhausted at slot {}", low)),
                "allocate",
                &[],
            );
        }
        if let Err(e) = self.slots.try_reserve_exact(slots) {
            return self.fail(
                Error::AllocatorExhausted(format!("system allocator refused {} slots: {}", slots, e)),
                "allocate",
                &[],
            );
        }

        // Format every slot as a free node; the last one continues the old list
        let tail = self.free_head;
        for i in 0..slots {
            let next = if i + 1 < slots {
                Some(CellId::new((low + i + 1) as u32))
            } else {
                tail
            };
            self.slots.push(Cell::free_slot(next));
        }

        let fragment = Fragment::new(low as u32, slots as u32);
        if let Err(e) = self.fragments.insert(fragment) {
            return self.fail(e, "allocate", &[]);
        }

        self.free_head = Some(CellId::new(low as u32));
        self.free_count += slots;

        info!(
            low = fragment.low,
            high = fragment.high,
            slots,
            total = self.slots.len() - 1,
            "Allocated arena fragment"
        );
        Ok(())
    }

    /// Return a right-linked chain `start ..= end` to the free list.
    ///
    /// The chain is pushed in front of the current free list, so the last
    /// released slot points at the previous head. Temporaries anywhere in the
    /// chain reject the whole call before anything is touched; slots that are
    /// already free are reported as double releases and skipped.
    ///
    /// Returns the number of slots added to the free list.
    pub fn release(&mut self, start: CellId, end: CellId) -> Result<usize> {
        self.ensure_initialized("release")?;

        let mut chain = Vec::new();
        let mut cursor = Some(start);
        loop {
            let id = match cursor {
                Some(id) => id,
                None => {
                    self.report(
                        &Error::StructuralCorruption(format!(
                            "release chain from {} ended before reaching {}",
                            start, end
                        )),
                        "release",
                        &[start, end],
                    );
                    break;
                }
            };

            match self.get(id) {
                None => {
                    return self.fail(
                        Error::StructuralCorruption(format!("release of unknown cell {}", id)),
                        "release",
                        &[],
                    )
                }
                Some(c) if c.is_temporary() => {
                    return self.fail(Error::InvalidOperationOnTemporary(id), "release", &[id])
                }
                Some(_) => {}
            }

            chain.push(id);
            if id == end {
                break;
            }
            if chain.len() >= self.slots.len() {
                return self.fail(
                    Error::StructuralCorruption(format!("release chain from {} does not terminate", start)),
                    "release",
                    &[start, end],
                );
            }
            cursor = self.cell(id).right_link();
        }

        // Excise slots that are already on the free list
        let mut accepted = Vec::with_capacity(chain.len());
        for id in chain {
            if self.cell(id).is_free() {
                self.report(&Error::DoubleRelease(id), "release", &[id]);
            } else {
                accepted.push(id);
            }
        }

        let count = accepted.len();
        let old_head = self.free_head;
        for (i, &id) in accepted.iter().enumerate() {
            let next = accepted.get(i + 1).copied().or(old_head);
            let slot = self.cell_mut(id);
            slot.left = None;
            slot.right = next;
            slot.state = cell::CellState::Free;
            match slot.sublist_target() {
                // Keep the reference; it is dropped when the slot is reused
                Some(header) => {
                    self.pending.insert(id, header);
                }
                None => slot.stamp(&op::UNDEFINED_OP, Payload::Undefined),
            }
        }

        if let Some(&first) = accepted.first() {
            self.free_head = Some(first);
        }
        self.free_count += count;
        self.releases += count as u64;

        debug!(start = %start, end = %end, released = count, free = self.free_count, "Released cells");
        Ok(count)
    }

    /// Release a single slot
    pub fn release_cell(&mut self, id: CellId) -> Result<usize> {
        self.release(id, id)
    }

    /// True iff `id` addresses a slot inside a registered fragment
    pub fn query(&self, id: CellId) -> bool {
        !id.is_temporary_handle() && self.fragments.contains(id.raw())
    }

    // === Accounting ===

    pub fn free_count(&self) -> usize {
        self.free_count
    }

    /// Slots ever obtained from the system
    pub fn total_slots(&self) -> usize {
        self.slots.len() - 1
    }

    pub fn live_count(&self) -> usize {
        self.total_slots() - self.free_count
    }

    pub fn free_list_head(&self) -> Option<CellId> {
        self.free_head
    }

    pub fn fragments(&self) -> &FragmentRegistry {
        &self.fragments
    }

    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    pub fn releases(&self) -> u64 {
        self.releases
    }

    pub(crate) fn temporary_count(&self) -> usize {
        self.temporaries.len() - self.vacant_temporaries.len()
    }

    pub(crate) fn op_of(&self, id: CellId) -> &'static dyn CellOp {
        self.cell(id).op()
    }
}
