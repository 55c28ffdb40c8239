//! Integration test crate for hilltrack.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It drives the tracker from hilltrack-tracking with options and geometry
//! from hilltrack-core.

#[cfg(test)]
mod tracking;

#[cfg(test)]
mod patch;
