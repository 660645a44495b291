//! End-to-end tests for dkim-verify.
//!
//! The SP1 toolchain is replaced by small `sh` scripts written into a
//! temporary workspace, so every test drives real child processes through
//! the HTTP surface.

#![cfg(unix)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod harness;
mod verify_routes;

pub use harness::TestHarness;
