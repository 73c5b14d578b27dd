//! Tunable operational defaults for the DSS system.
//!
//! Protocol-level constants (wire limits, validation bounds) live in
//! [`crate::constants`]. This module centralizes the configurable
//! defaults that can be overridden via CLI flags.

/// Default listen port for the manager daemon.
pub const DEFAULT_MANAGER_PORT: u16 = 7400;

/// Default management port for a disk node.
pub const DEFAULT_DISK_MGMT_PORT: u16 = 7500;

/// Default command (data-plane) port for a disk node.
pub const DEFAULT_DISK_CMD_PORT: u16 = 7501;

/// Per-attempt timeout for a request/reply exchange (milliseconds).
/// The transport is unreliable; every exchange applies this timeout.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 2000;

/// Attempts per request/reply exchange before giving up.
pub const DEFAULT_REQUEST_RETRIES: u32 = 3;

/// Attempts to re-fetch and re-verify a stripe whose parity check
/// failed, before the read fails hard.
pub const DEFAULT_STRIPE_RETRIES: u32 = 3;

/// Suffix appended to the source file name for read output.
pub const DEFAULT_OUTPUT_SUFFIX: &str = ".out";
