// SPDX-License-Identifier: CEPL-1.0
//! Windowing re-exports shared by the app and renderer backends.
pub use winit;
