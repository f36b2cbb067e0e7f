#![doc(hidden)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Core library for cve-harvest
//!
//! This library consolidates all functionality for the cve-harvest tool, which collects
//! GitHub repository metadata for repositories referenced by CVE records.
//!
//! # Module Organization
//!
//! - [`commands`]: Command-line interface and orchestration
//! - [`harvest`]: Rate-limited, resumable batch harvesting

pub type Result<T, E = ohno::AppError> = core::result::Result<T, E>;

#[cfg(any(debug_assertions, test))]
pub mod commands;
#[cfg(not(any(debug_assertions, test)))]
mod commands;

pub mod harvest;

pub use crate::commands::{Host, run};
