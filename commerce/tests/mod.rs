
// HTTP-level suites, driven through the full router
pub mod api_tests;
