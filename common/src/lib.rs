pub mod config;
pub mod yaml_include;

/// Shared building blocks for the Carnes Premium backend
///
/// - YAML configuration with `!include` merging
/// - Test helpers shared by the `commerce` and `shop` test suites

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

#[cfg(any(test, feature = "test-helpers"))]
pub use test_helpers::{generate_unique_id, get_test_database_url};
