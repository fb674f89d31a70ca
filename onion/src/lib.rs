//! This crate rexports all crates of the onion relay network.

pub use onion_binary_io as binary_io;
pub use onion_core as core;
pub use onion_crypto as crypto;
pub use onion_packet as packet;

/// The onion crate version string in the form "major.minor.patch" (e.g. "1.2.3")
pub fn crate_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// The onion crate major version represented as unsigned integer
pub fn crate_version_major() -> u32 {
    env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or_default()
}
