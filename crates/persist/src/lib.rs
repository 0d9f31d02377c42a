//! Persistence: one compressed, checksummed file per region and per column.
//!
//! # Invariants
//! - Records are written to a temporary file and renamed into place.
//! - Every record is verified against its stored sha256 on load; mismatches
//!   and schema changes fail closed.

mod store;

pub use store::{FileStore, StoreMeta};

pub fn crate_info() -> &'static str {
    "strata-persist v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("persist"));
    }
}
