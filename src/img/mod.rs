//! # DASD Image Module
//!
//! DASD images are represented by objects implementing the `DasdImage` trait.
//! The object type is named for the image layout that it handles, e.g., `Cckd`.
//! This object is perhaps best thought of as the image file plus the bookkeeping
//! structures that locate a track within it.
//!
//! ## Basic Functions
//!
//! The trait includes loading and storing whole track images by track number.
//! It is agnostic as to the records on a track; that is the volume layer's business.
//! An important design element is that an image can refuse a request as out of scope,
//! e.g., a flat FBA image will refuse CKD record operations at the volume layer
//! because the types will not pair.
//!
//! ## Relation to Volumes
//!
//! The `DasdImage` trait object serves as the underlying storage for the `vol` module.
//! The volume layer works by loading a track from, or storing a track to, the image.
//! The task of mapping a cylinder and head to a stored position happens here,
//! including the two-level L1/L2 lookup used by the compressed layouts, but never
//! with any help from `vol`.
//!
//! ## Track Images
//!
//! Every buffer exchanged through `load_track`/`store_track` begins with the 5-byte
//! track header and is exactly `track_len` bytes long.  For FBA layouts the "track"
//! is a block group and the header carries the group number in the cylinder and head
//! fields; see `fba` for the arithmetic.

pub mod codec;
pub mod track;
pub mod ckd;
pub mod cckd;
pub mod fba;

use std::str::FromStr;
use std::fmt;
use std::io::Read;
use log::{debug,error};
use a2kit_macro::DiskStruct;
use a2kit_macro::DiskStructError;
use a2kit_macro_derive::DiskStruct;
use crate::{STDRESULT,DYNERR};

pub const DEVICE_HEADER_LEN: usize = 512;
/// widest geometry any table device carries; used to sanity check headers
const MAX_HEADS: u32 = 120;
const MAX_TRACK_LEN: u32 = 1 << 20;

/// Enumerates DASD image errors.  The `Display` trait will print equivalent long message.
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("unknown device id")]
    UnknownDeviceId,
    #[error("unknown image type")]
    UnknownImageType,
    #[error("geometric coordinate out of range")]
    GeometryMismatch,
    #[error("image size did not match the header")]
    ImageSizeMismatch,
    #[error("image type not compatible with request")]
    ImageTypeMismatch,
    #[error("unable to access track")]
    TrackAccess,
    #[error("track image is corrupt")]
    CorruptTrack,
    #[error("records would overflow the track")]
    TrackOverflow,
    #[error("lookup table entry out of bounds")]
    BadLookupEntry,
    #[error("unknown compression code")]
    Compression,
    #[error("compressed track could not be restored")]
    CompressedTrack,
    #[error("metadata mismatch")]
    MetadataMismatch
}

/// The four on-disk layouts, as declared by the device id field.
#[derive(PartialEq,Eq,Clone,Copy,Debug)]
pub enum DasdImageType {
    CkdFlat,
    CkdCompressed,
    FbaFlat,
    FbaCompressed
}

impl DasdImageType {
    pub fn is_ckd(&self) -> bool {
        match self {
            Self::CkdFlat | Self::CkdCompressed => true,
            _ => false
        }
    }
    pub fn device_id(&self) -> [u8;8] {
        match self {
            Self::CkdFlat => *b"CKD_P370",
            Self::CkdCompressed => *b"CKD_C370",
            Self::FbaFlat => *b"FBA_P370",
            Self::FbaCompressed => *b"FBA_C370"
        }
    }
}

/// Allows the image type to be displayed to the console using `println!`.  This also
/// derives `to_string`, so the enum can be converted to `String`.
impl fmt::Display for DasdImageType {
    fn fmt(&self,f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CkdFlat => write!(f,"ckd"),
            Self::CkdCompressed => write!(f,"cckd"),
            Self::FbaFlat => write!(f,"fba"),
            Self::FbaCompressed => write!(f,"cfba")
        }
    }
}

/// match command line or option argument to an image type
impl FromStr for DasdImageType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self,Self::Err> {
        match s {
            "ckd" => Ok(Self::CkdFlat),
            "cckd" => Ok(Self::CkdCompressed),
            "fba" => Ok(Self::FbaFlat),
            "cfba" => Ok(Self::FbaCompressed),
            _ => Err(Error::UnknownImageType)
        }
    }
}

/// The 512-byte header leading every image file.  Multi-byte numbers are kept as
/// byte arrays; use the access functions, which apply the byte-order correction
/// for headers written on the other endianness.
#[derive(DiskStruct)]
pub struct DeviceHeader {
    pub devid: [u8;8],
    pub heads: [u8;4],
    pub trksize: [u8;4],
    pub devtype: u8,
    pub fileseq: u8,
    pub highcyl: [u8;2],
    reserved: [u8;492]
}

impl DeviceHeader {
    pub fn create(typ: DasdImageType,heads: u32,trksize: u32,devtype: u8) -> Self {
        Self {
            devid: typ.device_id(),
            heads: u32::to_le_bytes(heads),
            trksize: u32::to_le_bytes(trksize),
            devtype,
            fileseq: 0,
            highcyl: [0,0],
            reserved: [0;492]
        }
    }
    pub fn image_type(&self) -> Result<DasdImageType,DYNERR> {
        match &self.devid {
            b"CKD_P370" => Ok(DasdImageType::CkdFlat),
            b"CKD_C370" => Ok(DasdImageType::CkdCompressed),
            b"FBA_P370" => Ok(DasdImageType::FbaFlat),
            b"FBA_C370" => Ok(DasdImageType::FbaCompressed),
            _ => {
                debug!("device id {} not recognized",hex::encode(self.devid));
                Err(Box::new(Error::UnknownDeviceId))
            }
        }
    }
    /// Get (heads,track size), correcting for a header written on the other
    /// endianness.  Historic images stored these in host order; we accept either
    /// order, preferring little-endian, and log when the swap was needed.
    pub fn geometry(&self) -> Result<(usize,usize),DYNERR> {
        let mut heads = u32::from_le_bytes(self.heads);
        let mut trksize = u32::from_le_bytes(self.trksize);
        if heads==0 || heads>MAX_HEADS || trksize==0 || trksize>MAX_TRACK_LEN {
            heads = u32::from_be_bytes(self.heads);
            trksize = u32::from_be_bytes(self.trksize);
            if heads==0 || heads>MAX_HEADS || trksize==0 || trksize>MAX_TRACK_LEN {
                error!("implausible geometry in either byte order: heads {}, track size {}",
                    u32::from_le_bytes(self.heads),u32::from_le_bytes(self.trksize));
                return Err(Box::new(Error::GeometryMismatch));
            }
            log::warn!("device header was written on the other endianness, swapping");
        }
        Ok((heads as usize,trksize as usize))
    }
    pub fn high_cylinder(&self) -> u16 {
        u16::from_le_bytes(self.highcyl)
    }
    pub fn set_sequence(&mut self,fileseq: u8,highcyl: u16) {
        self.fileseq = fileseq;
        self.highcyl = u16::to_le_bytes(highcyl);
    }
}

/// The main trait for working with any kind of DASD image.
/// The corresponding trait object serves as storage for the volume layer.
/// Loading can mutate the object because the image may be caching lookup
/// tables or other location state.
pub trait DasdImage {
    fn what_am_i(&self) -> DasdImageType;
    /// Tracks per cylinder.  FBA layouts report 1, a cylinder standing for one block group.
    fn heads(&self) -> usize;
    /// Cylinder count.  For FBA layouts this is the block group count.
    fn cylinders(&self) -> usize;
    /// Length of every buffer exchanged through `load_track`/`store_track`.
    fn track_len(&self) -> usize;
    /// The device type byte from the header, e.g. 0x90 for a 3390.
    fn devtype(&self) -> u8;
    fn track_count(&self) -> usize {
        self.cylinders() * self.heads()
    }
    /// Total FBA blocks, 0 for CKD layouts.
    fn blocks(&self) -> usize {
        0
    }
    /// FBA block length, 0 for CKD layouts.
    fn block_len(&self) -> usize {
        0
    }
    /// Get the full track image for the given track number.  An address inside
    /// the geometry that was never written yields a synthesized null track,
    /// never an error.
    fn load_track(&mut self,track: usize) -> Result<Vec<u8>,DYNERR>;
    /// Store a full track image at the given track number.  The buffer must be
    /// exactly `track_len` bytes and begin with a matching track header.
    fn store_track(&mut self,track: usize,buf: &[u8]) -> STDRESULT;
    /// Write back any header or lookup-table state held in memory.
    fn flush(&mut self) -> STDRESULT;
    /// Get image metadata into JSON string.
    /// Default contains only the image type.
    fn get_metadata(&self,indent: Option<u16>) -> String {
        let mut root = json::JsonValue::new_object();
        let typ = self.what_am_i().to_string();
        root[typ] = json::JsonValue::new_object();
        if let Some(spaces) = indent {
            json::stringify_pretty(root,spaces)
        } else {
            json::stringify(root)
        }
    }
}

/// Open any DASD image file, dispatching on the device id in the header.
pub fn open_dasd_image(img_path: &str) -> Result<Box<dyn DasdImage>,DYNERR> {
    let mut file = std::fs::File::open(img_path)?;
    let mut buf: Vec<u8> = vec![0;DEVICE_HEADER_LEN];
    file.read_exact(&mut buf)?;
    let header = DeviceHeader::from_bytes(&buf)?;
    match header.image_type()? {
        DasdImageType::CkdFlat => Ok(Box::new(ckd::Ckd::open(img_path)?)),
        DasdImageType::CkdCompressed => Ok(Box::new(cckd::Cckd::open(img_path)?)),
        DasdImageType::FbaFlat => Ok(Box::new(fba::Fba::open(img_path)?)),
        DasdImageType::FbaCompressed => Ok(Box::new(cckd::Cckd::open(img_path)?))
    }
}
