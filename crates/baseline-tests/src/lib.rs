//! Integration test suite for the Baseline light wallet.
//!
//! The tests in `tests/` drive the wallet through its public API only:
//! sessions over real and in-memory stores, payments against a simulated
//! node, and property checks of the selection, signing and encryption
//! invariants.

pub mod helpers;
