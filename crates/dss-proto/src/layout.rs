//! Volume layout and name/parameter validation.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::constants::*;
use crate::error::{DssError, DssResult};

/// Data-plane endpoint of one member disk, in slot order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiskTarget {
    /// Registered disk name
    pub name: String,
    /// Network address
    pub ip: IpAddr,
    /// Command (data-plane) port
    pub cmd_port: u16,
}

impl DiskTarget {
    pub fn new(name: impl Into<String>, ip: IpAddr, cmd_port: u16) -> Self {
        Self {
            name: name.into(),
            ip,
            cmd_port,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.cmd_port)
    }
}

impl fmt::Display for DiskTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.name, self.ip, self.cmd_port)
    }
}

/// Routing information for one volume, as returned by the manager's
/// phase-1 operations. Disk order is semantically significant: the
/// position of a disk in `disks` is its slot index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeLayout {
    /// Volume name
    pub volume: String,
    /// Member disk count (n)
    pub n: usize,
    /// Striping unit in bytes
    pub striping_unit: usize,
    /// Member disks in slot order
    pub disks: Vec<DiskTarget>,
}

impl VolumeLayout {
    /// Source bytes consumed by one full stripe: (n-1) data blocks.
    pub fn data_per_stripe(&self) -> usize {
        (self.n - 1) * self.striping_unit
    }
}

/// Check the shared name shape: alphabetic characters only, at most
/// 15 of them. Applies to user, disk, and volume names alike.
pub fn valid_name(name: &str) -> bool {
    !name.is_empty() && name.len() <= MAX_NAME_LEN && name.chars().all(|c| c.is_ascii_alphabetic())
}

pub fn is_power_of_two(x: usize) -> bool {
    x > 0 && (x & (x - 1)) == 0
}

/// Validate a striping unit: power of two within [128, 1 Mi].
pub fn validate_striping_unit(su: usize) -> DssResult<()> {
    if !is_power_of_two(su) {
        return Err(DssError::SuNotPowerOfTwo);
    }
    if !(MIN_STRIPING_UNIT..=MAX_STRIPING_UNIT).contains(&su) {
        return Err(DssError::SuOutOfRange);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_name() {
        assert!(valid_name("alpha"));
        assert!(valid_name("ABCdefGHIjklMNO")); // exactly 15
        assert!(!valid_name(""));
        assert!(!valid_name("toolongbyonechar")); // 16
        assert!(!valid_name("disk1"));
        assert!(!valid_name("with space"));
        assert!(!valid_name("pipe|name"));
    }

    #[test]
    fn test_validate_striping_unit() {
        assert!(validate_striping_unit(128).is_ok());
        assert!(validate_striping_unit(512).is_ok());
        assert!(validate_striping_unit(1 << 20).is_ok());
        assert_eq!(
            validate_striping_unit(100),
            Err(DssError::SuNotPowerOfTwo)
        );
        assert_eq!(validate_striping_unit(64), Err(DssError::SuOutOfRange));
        assert_eq!(
            validate_striping_unit(1 << 21),
            Err(DssError::SuOutOfRange)
        );
        assert_eq!(validate_striping_unit(0), Err(DssError::SuNotPowerOfTwo));
    }
}
