//! Integration tests for site-mirror
//!
//! Mirror runs are driven by an in-memory fetcher or a wiremock origin;
//! localization and serving work on temporary mirror trees.

mod common;
mod localize_tests;
mod mirror_tests;
mod serve_tests;
