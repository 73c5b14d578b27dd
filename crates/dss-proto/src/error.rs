//! DSS error types.
//!
//! Every failure the protocol can express is represented as a single
//! enum. Control-plane failures travel on the wire as
//! `FAILURE|<reason-token>`; the token mapping is bidirectional so the
//! client can reconstruct the same variant the manager produced.

/// Unified error type for all DSS operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum DssError {
    // ---- Validation ----
    #[error("wrong number of fields")]
    InvalidArity,
    #[error("port field is not an integer")]
    NonIntegerPort,
    #[error("numeric field is not an integer")]
    NonInteger,
    #[error("name must be alphabetic and at most 15 characters")]
    BadName,
    #[error("fewer than 3 disks requested")]
    TooFewDisks,
    #[error("striping unit is not a power of two")]
    SuNotPowerOfTwo,
    #[error("striping unit outside [128, 1048576]")]
    SuOutOfRange,
    #[error("malformed frame")]
    BadFrame,

    // ---- Conflict ----
    #[error("user already registered")]
    UserExists,
    #[error("disk already registered")]
    DiskExists,
    #[error("DSS already exists")]
    DssExists,

    // ---- Resource ----
    #[error("no such user")]
    NoSuchUser,
    #[error("no such disk")]
    NoSuchDisk,
    #[error("no DSS configured")]
    NoDssConfigured,
    #[error("no such DSS")]
    NoSuchDss,
    #[error("no such file")]
    NoSuchFile,
    #[error("not enough free disks")]
    InsufficientDisks,

    // ---- State ----
    #[error("disk belongs to a DSS")]
    DiskInDss,
    #[error("user has an operation in flight")]
    UserBusy,
    #[error("file is not owned by the requesting user")]
    NotOwner,
    #[error("critical section busy")]
    CriticalSectionBusy,
    #[error("no pending copy for this user")]
    NoPendingCopy,
    #[error("no pending failure for this DSS")]
    NoPendingFailure,
    #[error("reads in progress")]
    ReadsInProgress,

    // ---- Transport (caller side only, never sent by a node) ----
    #[error("request timed out")]
    Timeout,
    #[error("network error")]
    Network,

    // ---- Data plane integrity ----
    #[error("parity mismatch after retries")]
    ParityMismatch,

    // ---- Catch-alls ----
    #[error("unknown command")]
    UnknownCommand,
    #[error("internal error")]
    Internal,
}

impl DssError {
    /// Wire reason token for this error.
    ///
    /// Spellings are part of the wire contract; changing one breaks
    /// every deployed peer.
    pub fn token(self) -> &'static str {
        match self {
            Self::InvalidArity => "invalid-arity",
            Self::NonIntegerPort => "non-integer-port",
            Self::NonInteger => "non-integer",
            Self::BadName => "bad-dss-name",
            Self::TooFewDisks => "n-must-be->=3",
            Self::SuNotPowerOfTwo => "striping-unit-not-power-of-two",
            Self::SuOutOfRange => "striping-unit-out-of-range",
            Self::BadFrame => "malformed-frame",
            Self::UserExists => "user-exists",
            Self::DiskExists => "disk-exists",
            Self::DssExists => "dss-exists",
            Self::NoSuchUser => "no-such-user",
            Self::NoSuchDisk => "no-such-disk",
            Self::NoDssConfigured => "no-dss-configured",
            Self::NoSuchDss => "no-such-dss",
            Self::NoSuchFile => "no-such-file",
            Self::InsufficientDisks => "insufficient-disks",
            Self::DiskInDss => "disk-in-dss",
            Self::UserBusy => "user-busy",
            Self::NotOwner => "not-owner",
            Self::CriticalSectionBusy => "critical-section-busy",
            Self::NoPendingCopy => "no-pending-copy",
            Self::NoPendingFailure => "no-pending-failure",
            Self::ReadsInProgress => "reads-in-progress",
            Self::Timeout => "timeout",
            Self::Network => "network-error",
            Self::ParityMismatch => "parity-mismatch",
            Self::UnknownCommand => "unknown-command",
            Self::Internal => "internal-error",
        }
    }

    /// Reconstruct an error from a wire reason token.
    /// Unrecognized tokens collapse to `Internal`.
    pub fn from_token(token: &str) -> Self {
        match token {
            "invalid-arity" => Self::InvalidArity,
            "non-integer-port" => Self::NonIntegerPort,
            "non-integer" => Self::NonInteger,
            "bad-dss-name" => Self::BadName,
            "n-must-be->=3" => Self::TooFewDisks,
            "striping-unit-not-power-of-two" => Self::SuNotPowerOfTwo,
            "striping-unit-out-of-range" => Self::SuOutOfRange,
            "malformed-frame" => Self::BadFrame,
            "user-exists" => Self::UserExists,
            "disk-exists" => Self::DiskExists,
            "dss-exists" => Self::DssExists,
            "no-such-user" => Self::NoSuchUser,
            "no-such-disk" => Self::NoSuchDisk,
            "no-dss-configured" => Self::NoDssConfigured,
            "no-such-dss" => Self::NoSuchDss,
            "no-such-file" => Self::NoSuchFile,
            "insufficient-disks" => Self::InsufficientDisks,
            "disk-in-dss" => Self::DiskInDss,
            "user-busy" => Self::UserBusy,
            "not-owner" => Self::NotOwner,
            "critical-section-busy" => Self::CriticalSectionBusy,
            "no-pending-copy" => Self::NoPendingCopy,
            "no-pending-failure" => Self::NoPendingFailure,
            "reads-in-progress" => Self::ReadsInProgress,
            "timeout" => Self::Timeout,
            "network-error" => Self::Network,
            "parity-mismatch" => Self::ParityMismatch,
            "unknown-command" => Self::UnknownCommand,
            _ => Self::Internal,
        }
    }
}

/// Result type alias for DSS operations.
pub type DssResult<T> = Result<T, DssError>;

impl From<std::io::Error> for DssError {
    fn from(_: std::io::Error) -> Self {
        DssError::Network
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        let all = [
            DssError::InvalidArity,
            DssError::NonIntegerPort,
            DssError::NonInteger,
            DssError::BadName,
            DssError::TooFewDisks,
            DssError::SuNotPowerOfTwo,
            DssError::SuOutOfRange,
            DssError::BadFrame,
            DssError::UserExists,
            DssError::DiskExists,
            DssError::DssExists,
            DssError::NoSuchUser,
            DssError::NoSuchDisk,
            DssError::NoDssConfigured,
            DssError::NoSuchDss,
            DssError::NoSuchFile,
            DssError::InsufficientDisks,
            DssError::DiskInDss,
            DssError::UserBusy,
            DssError::NotOwner,
            DssError::CriticalSectionBusy,
            DssError::NoPendingCopy,
            DssError::NoPendingFailure,
            DssError::ReadsInProgress,
            DssError::Timeout,
            DssError::Network,
            DssError::ParityMismatch,
            DssError::UnknownCommand,
            DssError::Internal,
        ];
        for e in all {
            assert_eq!(DssError::from_token(e.token()), e, "token {}", e.token());
        }
    }

    #[test]
    fn test_unknown_token_is_internal() {
        assert_eq!(DssError::from_token("no-such-token"), DssError::Internal);
    }
}
