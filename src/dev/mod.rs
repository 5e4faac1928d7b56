//! # Device Module
//!
//! This is the middleware between the volume layer and the image layer.  It
//! owns the static device characteristics tables and the track capacity model
//! built on them.  The tables are reference data: geometry, physical track
//! capacity, and the capacity formula constants come from the published device
//! specifications and are not derived here.

pub mod ckdtab;
pub mod fbatab;
pub mod caps;

/// Enumerates device errors.  The `Display` trait will print equivalent long message.
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("device type is not known")]
    UnknownDevice,
    #[error("record can never fit on a track of this device")]
    RecordTooLarge
}
