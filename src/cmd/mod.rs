//! CLI command implementations for albumscan.
//!
//! Each module corresponds to one subcommand.

pub mod doctor;
pub mod next;
pub mod status;
pub mod validate;
pub mod watch;
