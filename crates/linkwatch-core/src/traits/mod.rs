//! Core traits for the link monitor
//!
//! This module defines the seams where probe implementations plug in.
//!
//! - [`Probe`]: One reachability/address-discovery technique bound to a target
//! - [`ProbeFactory`]: Builds a [`Probe`] for a link at construction time
//! - [`ReverseLookup`]: PTR lookups used to verify a link's address

pub mod probe;
pub mod reverse_lookup;

pub use probe::{Probe, ProbeError, ProbeFactory, ProbeSpec};
pub use reverse_lookup::ReverseLookup;
