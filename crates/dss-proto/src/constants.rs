//! DSS protocol constants.

/// Minimum number of member disks in a volume
pub const MIN_VOLUME_DISKS: usize = 3;

/// Striping unit bounds (bytes, inclusive). Must be a power of two.
pub const MIN_STRIPING_UNIT: usize = 128;
pub const MAX_STRIPING_UNIT: usize = 1 << 20;

/// Maximum length of a user, disk, or volume name
pub const MAX_NAME_LEN: usize = 15;

/// Largest datagram either plane will send or accept.
/// Also bounds the receive buffer on every socket.
pub const MAX_DATAGRAM: usize = 65536;

/// Length prefix size on a READ_BLOCK reply (big-endian u32)
pub const BLOCK_LEN_PREFIX: usize = 4;
