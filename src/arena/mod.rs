//! Cell Arena
//!
//! Slab allocator for fixed-size list cells. Fragments are requested in bulk,
//! sliced into slots and threaded onto the available space list (AVSL).
//!
//! # Architecture
//!
//! ```text
//! Arena
//!   ├─→ slots[0]              reserved marker, never allocated
//!   ├─→ Fragment [1..=25]     ┐
//!   ├─→ Fragment [26..=50]    ┘ coalesced into [1..=50]
//!   ├─→ AVSL head → 17 → 4 → 26 → ... → null
//!   └─→ pending: {slot 17 → header 9}   deferred sublist decrements
//! ```
//!
//! Allocation pops the AVSL head. If the popped slot is a freed sublist, its
//! header reference is dropped first, which may push a whole list back onto
//! the AVSL before the slot is handed out.

pub mod allocator;
pub mod config;
pub mod fragment;
pub mod stats;

pub use allocator::Arena;
pub use config::{ArenaConfig, MIN_FRAGMENT_SLOTS};
pub use fragment::{Fragment, FragmentRegistry};
pub use stats::{ArenaStats, FreeListCheck};
