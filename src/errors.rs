//! Error Types
//!
//! This module defines the error types used throughout the renderer core.
//!
//! # Overview
//!
//! The main error type [`TesseraError`] covers the failure modes the frame
//! orchestration core can surface:
//! - GPU initialization failures and fatal device conditions
//! - Bindless slot table misuse or exhaustion
//! - Render pass registration and ordering mistakes
//!
//! CPU-side capacity overflows inside the indirect batcher are *not* errors:
//! they are logged and the excess work is dropped for that frame.
//!
//! # Usage
//!
//! All fallible public APIs return [`Result<T>`], an alias for
//! `std::result::Result<T, TesseraError>`.
//!
//! ```rust,ignore
//! use tessera::errors::{Result, TesseraError};
//!
//! fn upload() -> Result<()> {
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// The main error type for the renderer core.
#[derive(Error, Debug)]
pub enum TesseraError {
    // ========================================================================
    // GPU & Device Errors
    // ========================================================================
    /// Failed to request a compatible GPU adapter.
    #[error("Failed to request WGPU adapter: {0}")]
    AdapterRequestFailed(String),

    /// Failed to create the GPU device.
    #[error("Failed to create WGPU device: {0}")]
    DeviceCreateFailed(#[from] wgpu::RequestDeviceError),

    /// Failed to create the presentation surface.
    #[error("Failed to create surface: {0}")]
    SurfaceCreateFailed(#[from] wgpu::CreateSurfaceError),

    /// The adapter lacks features the renderer depends on.
    #[error("Adapter is missing required features: {0:?}")]
    MissingFeatures(wgpu::Features),

    /// Waiting on a frame fence or for device idle failed.
    #[error("GPU wait failed: {0}")]
    FenceWaitFailed(#[from] wgpu::PollError),

    /// The device was lost. Not recoverable at this layer.
    #[error("GPU device lost: {0}")]
    DeviceLost(String),

    /// The GPU ran out of memory while acquiring or submitting a frame.
    #[error("GPU out of memory: {0}")]
    OutOfMemory(String),

    // ========================================================================
    // Bindless Residency Errors
    // ========================================================================
    /// No unoccupied or expired slot was found in the bindless table.
    #[error("Bindless table exhausted after {attempts} probes ({capacity} slots)")]
    SlotTableExhausted {
        /// Number of slots examined before giving up
        attempts: u32,
        /// Total table capacity
        capacity: u32,
    },

    /// A slot id outside `[0, capacity)` was supplied.
    #[error("Bindless slot {slot} out of range (capacity {capacity})")]
    SlotOutOfRange {
        /// The invalid slot
        slot: u32,
        /// Total table capacity
        capacity: u32,
    },

    /// Attempted to overwrite the reserved default-texture slot.
    #[error("Bindless slot {0} is reserved for the default texture")]
    ReservedSlot(u32),

    // ========================================================================
    // Render Pass Pipeline Errors
    // ========================================================================
    /// A pass with the same name is already registered.
    #[error("Render pass '{0}' is already registered")]
    DuplicatePass(String),

    /// A pass declared a dependency on a pass that was never registered.
    #[error("Render pass '{consumer}' depends on '{producer}', which is not registered")]
    MissingDependency {
        /// The pass declaring the dependency
        consumer: String,
        /// The missing producer
        producer: String,
    },

    /// A pass declared a dependency on a pass registered after it.
    #[error("Render pass '{consumer}' depends on '{producer}', which is registered after it")]
    PassOrderViolation {
        /// The pass declaring the dependency
        consumer: String,
        /// The producer registered too late
        producer: String,
    },

    /// A pass hook failed.
    #[error("Render pass '{pass}' failed during {stage}: {reason}")]
    PassFailed {
        /// Pass name
        pass: String,
        /// Lifecycle stage (init, resize, ...)
        stage: &'static str,
        /// Failure description
        reason: String,
    },
}

/// Alias for `Result<T, TesseraError>`.
pub type Result<T> = std::result::Result<T, TesseraError>;
