use crate::capability::{BackendCapabilityProfile, Capability};
use crate::catalog::StrategyDescriptor;
use serde::Serialize;
use std::collections::BTreeSet;

/// Fit between one strategy and one backend profile. Computed on demand and
/// never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompatibilityReport {
    /// 0.0 when a required capability is missing, otherwise in [0.5, 1.0].
    pub score: f64,
    pub required_met: bool,
    pub preferred_met: bool,
    /// Required capabilities the backend lacks.
    pub missing_capabilities: BTreeSet<Capability>,
    /// Preferred capabilities the backend lacks.
    pub missing_preferred: BTreeSet<Capability>,
}

/// Score a strategy against a backend.
///
/// Required capabilities gate (score 0 when any is missing). Preferred
/// capabilities add a linear bonus: `0.5 + 0.5 * met / max(1, preferred)`.
pub fn score(
    descriptor: &StrategyDescriptor,
    profile: &BackendCapabilityProfile,
) -> CompatibilityReport {
    let missing_capabilities: BTreeSet<Capability> = descriptor
        .required_capabilities
        .difference(&profile.supported)
        .cloned()
        .collect();
    let missing_preferred: BTreeSet<Capability> = descriptor
        .preferred_capabilities
        .difference(&profile.supported)
        .cloned()
        .collect();

    let required_met = missing_capabilities.is_empty();
    let preferred_total = descriptor.preferred_capabilities.len();
    let preferred_met_count = preferred_total - missing_preferred.len();

    let score = if required_met {
        0.5 + 0.5 * (preferred_met_count as f64 / preferred_total.max(1) as f64)
    } else {
        0.0
    };

    CompatibilityReport {
        score,
        required_met,
        preferred_met: missing_preferred.is_empty(),
        missing_capabilities,
        missing_preferred,
    }
}
