/// Engine constants and tunable parameters shared by compute passes and actions.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineConfig {
    /// Property count above which a compute pass reports a `warning`.
    pub max_props: usize,
}

impl EngineConfig {
    // ===== fixed rule constants =====
    /// Default soft limit on properties per creature.
    pub const MAX_PROPS: usize = 1000;
    /// Natural d20 at or above which an attack is a critical hit.
    pub const DEFAULT_CRITICAL_HIT_TARGET: f64 = 20.0;
    /// Natural d20 at or below which an attack is a critical miss.
    pub const DEFAULT_CRITICAL_MISS_TARGET: f64 = 1.0;
    /// Stamped on every creature a compute pass writes.
    pub const COMPUTE_VERSION: &'static str = "2.0.0";

    pub fn new() -> Self {
        Self {
            max_props: Self::MAX_PROPS,
        }
    }

    pub fn with_max_props(max_props: usize) -> Self {
        Self { max_props }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
