//! Domain services: each owns one slice of commerce state and exposes the
//! operations the agents and the voice loop call. Services never call
//! other agents; cross-service reads are wired at the composition root.

mod admin_activity;
mod carts;
mod interactions;
mod memory;
mod notifications;
mod orders;
mod products;
mod sessions;
mod support;

pub use admin_activity::{AdminActivityService, IntegrityIssue, IntegrityReport};
pub use carts::CartService;
pub use interactions::InteractionService;
pub use memory::MemoryService;
pub use notifications::NotificationService;
pub use orders::OrderService;
pub use products::{ProductPage, ProductService};
pub use sessions::SessionService;
pub use support::SupportService;
