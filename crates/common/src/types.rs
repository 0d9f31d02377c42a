use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a connected subscriber session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriberId(pub Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Amount of work a region (or column) must have completed before it is
/// handed out.
///
/// Ordered from least to most work. `Cached` only looks at what is resident,
/// `Load` may read from the store, `Generate` may run the generator,
/// `Populate` also populates the surrounding footprint and `Light` finishes
/// the initial lighting pass.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum Requirement {
    Cached,
    Load,
    Generate,
    Populate,
    #[default]
    Light,
}

impl Requirement {
    pub const ALL: [Requirement; 5] = [
        Requirement::Cached,
        Requirement::Load,
        Requirement::Generate,
        Requirement::Populate,
        Requirement::Light,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Requirement::Cached => "cached",
            Requirement::Load => "load",
            Requirement::Generate => "generate",
            Requirement::Populate => "populate",
            Requirement::Light => "light",
        }
    }

    /// Whether satisfying this tier may create new content.
    pub fn allows_generation(self) -> bool {
        self >= Requirement::Generate
    }
}

impl std::fmt::Display for Requirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_id_uniqueness() {
        let a = SubscriberId::new();
        let b = SubscriberId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn requirement_total_order() {
        for pair in Requirement::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert_eq!(Requirement::default(), Requirement::Light);
    }

    #[test]
    fn only_upper_tiers_generate() {
        assert!(!Requirement::Cached.allows_generation());
        assert!(!Requirement::Load.allows_generation());
        assert!(Requirement::Generate.allows_generation());
        assert!(Requirement::Light.allows_generation());
    }

    #[test]
    fn requirement_display_uses_name() {
        assert_eq!(Requirement::Populate.to_string(), "populate");
    }
}
