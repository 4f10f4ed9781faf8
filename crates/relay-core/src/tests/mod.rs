//! Shared fixtures for unit tests across the crate.

pub(crate) mod support;
