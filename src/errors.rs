//! Error Types
//!
//! This module defines the error types used throughout the crate.
//!
//! # Overview
//!
//! Per-frame operations never fail with a recoverable error: an unsupported
//! backend is a caller contract violation, a failed resource creation is
//! logged and continues with an invalid handle, and light overflow is
//! silently truncated. [`ClusterError`] therefore only covers the
//! construction-time failure modes:
//! - Invalid renderer settings (cluster grid / capacity)
//! - GPU adapter and device acquisition
//! - Shader template rendering
//!
//! # Usage
//!
//! ```rust,ignore
//! use clustered_forward::errors::Result;
//!
//! fn configure(settings: &RendererSettings) -> Result<()> {
//!     settings.validate()?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// The main error type for the clustered renderer.
#[derive(Error, Debug)]
pub enum ClusterError {
    // ========================================================================
    // Settings Errors
    // ========================================================================
    /// A cluster grid dimension is zero.
    #[error("Cluster grid dimension `{axis}` must be > 0")]
    EmptyGridAxis {
        /// Name of the offending axis
        axis: &'static str,
    },

    /// The depth slice count is not a multiple of the light-culling thread depth.
    #[error("CLUSTERS_Z ({z}) must be a multiple of CLUSTERS_Z_THREADS ({z_threads})")]
    UnevenDepthBatches {
        /// Number of depth slices
        z: u32,
        /// Depth slices processed per light-culling work group
        z_threads: u32,
    },

    /// The light-culling work group exceeds the invocation limit.
    #[error("Light culling work group has {invocations} invocations (limit {limit})")]
    WorkgroupTooLarge {
        /// CLUSTERS_X * CLUSTERS_Y * CLUSTERS_Z_THREADS
        invocations: u32,
        /// Maximum invocations per work group
        limit: u32,
    },

    /// Light buffer or per-cluster capacity is zero.
    #[error("Capacity `{0}` must be > 0")]
    ZeroCapacity(&'static str),

    // ========================================================================
    // GPU Errors
    // ========================================================================
    /// Failed to request a compatible GPU adapter.
    #[error("Failed to request WGPU adapter: {0}")]
    AdapterRequestFailed(String),

    /// Failed to create the GPU device.
    #[error("Failed to create WGPU device: {0}")]
    DeviceCreateFailed(#[from] wgpu::RequestDeviceError),

    // ========================================================================
    // Shader Errors
    // ========================================================================
    /// Shader template could not be loaded or rendered.
    #[error("Shader template error: {0}")]
    ShaderTemplate(#[from] minijinja::Error),
}

/// Alias for `Result<T, ClusterError>`.
pub type Result<T> = std::result::Result<T, ClusterError>;
