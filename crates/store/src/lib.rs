//! In-memory system of record.
//!
//! Each collection sits behind its own `parking_lot::RwLock`; guards are
//! held only for the duration of a structural mutation and never across an
//! await point. Collection names and unique keys mirror the documented
//! persistence layout so a database adapter can slot in behind the same
//! facade.

mod ids;
mod store;

pub use ids::IdGenerator;
pub use store::Store;
