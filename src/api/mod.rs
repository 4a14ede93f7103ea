//! Public entry points for the `evfleet` binary.

pub mod cli;
