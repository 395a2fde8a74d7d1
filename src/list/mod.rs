//! Lists
//!
//! Doubly linked lists built from arena cells, closed by a header sentinel.
//!
//! ```text
//!        ┌──────────────────────────────────────┐
//!        ▼                                      │
//!   [header] ⇄ [1] ⇄ [sublist] ⇄ [true] ⇄ ──────┘
//!                        │
//!                        └─→ [header'] (refs=1) ⇄ [3] ⇄ ...
//! ```
//!
//! - `linkage`: insert, unlink, move, split and header utilities
//! - `sublist`: counted references between lists and reclamation
//! - `replace`: changing a position's variant, in place when possible
//! - `cursor`: positions that follow substitution
//! - `render`: text form and structural equality

pub mod cursor;
pub mod linkage;
pub mod render;
pub mod replace;
pub mod sublist;

pub use cursor::Cursor;
pub use linkage::{ListIter, SplitSide};
pub use replace::Value;
