//! Built-in probes
//!
//! Only the file probe lives in the core. Network probes are provided by
//! plugin crates and registered through [`crate::ProbeRegistry`].

mod file;

pub use file::{FileProbe, FileProbeFactory, parse_probe_file};
