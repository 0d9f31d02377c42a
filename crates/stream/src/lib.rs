//! Interest management: which regions and columns each subscriber needs, and
//! what must be sent to keep them current.
//!
//! # Invariants
//! - A subscriber's [`ViewFormula`] is replaced only when the view radii change
//!   or it moves at least one region edge from where the view was taken.
//! - Each watched coordinate has exactly one tracker; trackers exist only while
//!   some subscriber watches them.
//! - A region snapshot never reaches a subscriber before the snapshot of its
//!   column, and deltas never reach a subscriber before its region snapshot.
//! - Unload notices go only to subscribers that were sent the snapshot.

mod buffer;
mod budget;
mod config;
mod interest;
mod message;
mod tracker;
mod view;

pub use buffer::{ChangeBuffer, OVERFLOW, Pending};
pub use budget::{TickStats, TickTimer};
pub use config::{ConfigError, InterestConfig};
pub use interest::{InterestManager, Subscriber};
pub use message::{Attachments, Delivery, Outbound, Outbox};
pub use tracker::{ColumnRemoval, ColumnTracker, RegionTracker};
pub use view::{Positions, ViewFormula};

pub fn crate_info() -> &'static str {
    "strata-stream v0.1.0"
}
