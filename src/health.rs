//! Health adapter: maps the cached aggregate to a ternary probe status.

use crate::coordinator::Coordinator;
use crate::outcome::StartupReport;

/// Ternary health status for readiness and liveness probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "timeline-export",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum HealthStatus {
    /// Every signal succeeded and the global deadline held.
    Healthy,
    /// Every signal succeeded but the soft global deadline was observed.
    Degraded,
    /// At least one signal did not succeed, or startup has not finished.
    Unhealthy,
}

impl HealthStatus {
    /// Stable lower-case label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StartupReport {
    /// The ternary health status this report maps to.
    #[must_use]
    pub fn health(&self) -> HealthStatus {
        match (self.all_succeeded(), self.global_timeout_observed) {
            (true, false) => HealthStatus::Healthy,
            (true, true) => HealthStatus::Degraded,
            (false, _) => HealthStatus::Unhealthy,
        }
    }
}

impl Coordinator {
    /// Probe adapter over the cached aggregate.
    ///
    /// Reports [`HealthStatus::Unhealthy`] until a cached report exists:
    /// a process that has not finished starting is not ready.
    #[must_use]
    pub fn health(&self) -> HealthStatus {
        self.result()
            .map_or(HealthStatus::Unhealthy, |report| report.health())
    }
}
