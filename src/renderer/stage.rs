//! Clustered Pass Ordering
//!
//! `ClusteredStage` fixes the pass numbers of the clustered renderer. The
//! command stream executes passes in ascending id, so the enum order is the
//! execution order.

use crate::renderer::backend::ViewId;

/// Passes of one clustered frame.
///
/// | Stage | Pass | Work |
/// |-------|------|------|
/// | `ClusterBuilding` | 0 | Compute: one AABB per cluster |
/// | `LightCulling` | 1 | Compute: light grid + light indices |
/// | `Lighting` | 2 | Graphics: clear target, shade every mesh |
#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy, PartialOrd, Ord)]
#[repr(u16)]
pub enum ClusteredStage {
    ClusterBuilding = 0,
    LightCulling = 1,
    Lighting = 2,
}

impl ClusteredStage {
    pub const ALL: [Self; 3] = [Self::ClusterBuilding, Self::LightCulling, Self::Lighting];

    #[inline]
    #[must_use]
    pub const fn view(self) -> ViewId {
        self as ViewId
    }

    /// Pass name shown in GPU debuggers.
    #[inline]
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ClusterBuilding => "Cluster building pass (compute)",
            Self::LightCulling => "Clustered light culling pass (compute)",
            Self::Lighting => "Clustered lighting pass",
        }
    }
}
