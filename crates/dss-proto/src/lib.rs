//! # dss-proto
//!
//! Protocol types, constants, and data structures for the DSS
//! distributed striped storage service.
//!
//! This crate defines the control-plane and data-plane wire formats,
//! the error taxonomy, and the volume layout math shared by the
//! manager, the disk nodes, and the user client.

pub mod block;
pub mod constants;
pub mod defaults;
pub mod error;
pub mod layout;
pub mod message;

// Re-export commonly used types at the crate root
pub use block::{BlockKey, BlockType, DiskReply, DiskRequest};
pub use error::{DssError, DssResult};
pub use layout::{DiskTarget, VolumeLayout};
pub use message::{ManagerRequest, ManagerResponse};
