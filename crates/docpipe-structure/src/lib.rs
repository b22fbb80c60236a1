// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! docpipe-structure
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Profile overrides, smart-table detection, metric merging.
pub mod overrides;
/// Platform RPC seam.
pub mod platform;
/// The pipeline driver.
pub mod task;

pub use overrides::{apply_profile_overrides, merge_metrics, should_skip_for_smart_table};
pub use platform::{MockPlatformClient, PlatformClient, PlatformError};
pub use task::{StructureToolError, StructureToolRequest, StructureToolTask};
