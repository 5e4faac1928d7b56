//! # `dasdkit` main library
//!
//! This library manipulates mainframe DASD (direct access storage device) images of the
//! kind used by emulators and dataset-transfer tooling.  Manipulations can be done at a
//! level as low as raw track bytes, or as high as keyed record lookups.
//!
//! ## Architecture
//!
//! Volume operations are built around two layers:
//! * `img::DasdImage` maps track addresses to stored bytes, flat or compressed; it does
//!   not try to interpret the records on a track
//! * `vol::CkdVolume` / `vol::FbaVolume` impose record or block semantics on an already
//!   located track image
//!
//! When a volume object is created it takes ownership of some `DasdImage`.  It then uses
//! this owned image as storage, keeping exactly one track resident in its buffer.  Any
//! record mutation marks the buffer dirty; the buffer is flushed before another track is
//! loaded and when the volume is closed.
//!
//! ## Image Layouts
//!
//! In order to manipulate tracks, `dasdkit` must understand the way track data is packed
//! into an image file.  As of this writing `dasdkit` supports
//! * flat CKD (`CKD_P370`), optionally split across sequenced files
//! * compressed CKD (`CKD_C370`), with the two-level L1/L2 lookup structure
//! * flat FBA (`FBA_P370`)
//! * compressed FBA (`FBA_C370`), block groups stored through the same L1/L2 structure
//!
//! ## Device Kinds
//!
//! An image represents some device model (defined by geometry and capacity formula
//! characteristics).  The models `dasdkit` knows are kept in `dev::ckdtab` and
//! `dev::fbatab`; they include the 2311/2314/3330/3340/3350 linear-overhead family,
//! the 3380/3390/9345 interleaved family, and the 3310/3370/9336 FBA family.

pub mod img;
pub mod dev;
pub mod vol;
pub mod ebcdic;

use std::fmt::Write;
use log::info;

type DYNERR = Box<dyn std::error::Error>;
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

/// Context passed into open and create calls.  This replaces process-global state:
/// volumes that do not carry a device number are tagged from the running counter here.
pub struct DasdCtx {
    next_devnum: u32
}

impl DasdCtx {
    pub fn new() -> Self {
        Self {
            next_devnum: 0x0100
        }
    }
    /// Synthesize a placeholder device number for a newly opened volume.
    pub(crate) fn assign_devnum(&mut self) -> u32 {
        let ans = self.next_devnum;
        self.next_devnum += 1;
        ans
    }
}

/// Open a CKD volume, flat or compressed, from a file.
/// The layout is determined by the device id in the first header block.
pub fn open_ckd_volume(img_path: &str,ctx: &mut DasdCtx) -> Result<vol::CkdVolume,DYNERR> {
    let image = img::open_dasd_image(img_path)?;
    match image.what_am_i() {
        img::DasdImageType::CkdFlat | img::DasdImageType::CkdCompressed => {
            info!("identified {} image",image.what_am_i());
            vol::CkdVolume::from_img(image,ctx)
        },
        _ => Err(Box::new(img::Error::ImageTypeMismatch))
    }
}

/// Open an FBA volume, flat or compressed, from a file.
/// The layout is determined by the device id in the first header block.
pub fn open_fba_volume(img_path: &str,ctx: &mut DasdCtx) -> Result<vol::FbaVolume,DYNERR> {
    let image = img::open_dasd_image(img_path)?;
    match image.what_am_i() {
        img::DasdImageType::FbaFlat | img::DasdImageType::FbaCompressed => {
            info!("identified {} image",image.what_am_i());
            vol::FbaVolume::from_img(image,ctx)
        },
        _ => Err(Box::new(img::Error::ImageTypeMismatch))
    }
}

/// Create a new CKD volume file.  Calls through to `vol::init::create_volume`.
pub fn create_volume(img_path: &str,device: &str,cyls: Option<usize>,volser: &str,
    opts: &vol::init::CreateOpts,ctx: &mut DasdCtx) -> STDRESULT {
    vol::init::create_volume(img_path,device,cyls,volser,opts,ctx)
}

/// Create a new FBA volume file.  Calls through to `vol::init::create_fba_volume`.
pub fn create_fba_volume(img_path: &str,device: &str,blocks: Option<usize>,volser: &str,
    opts: &vol::init::CreateOpts,ctx: &mut DasdCtx) -> STDRESULT {
    vol::init::create_fba_volume(img_path,device,blocks,volser,opts,ctx)
}

/// Render binary to a string in columns of hex, ascii, and ebcdic.
/// DASD record data is usually EBCDIC, so both translations are offered.
pub fn display_block(start_addr: usize,block: &[u8]) -> String {
    let mut ans = String::new();
    let mut slice_start = 0;
    loop {
        let row_label = start_addr + slice_start;
        let mut slice_end = slice_start + 16;
        if slice_end > block.len() {
            slice_end = block.len();
        }
        let slice = &block[slice_start..slice_end];
        let txt: Vec<u8> = slice.iter().map(|c| match *c {
            x if x<32 => '.' as u8,
            x if x<127 => x,
            _ => '.' as u8
        }).collect();
        let ebc: Vec<u8> = slice.iter().map(|c| ebcdic::to_ascii(*c)).collect();
        write!(ans,"{:06X} : ",row_label).expect("unreachable");
        for byte in slice {
            write!(ans,"{:02X} ",byte).expect("unreachable");
        }
        for _blank in slice_end..slice_start+16 {
            ans += "   ";
        }
        write!(ans,"|a| {} ",String::from_utf8_lossy(&txt)).expect("unreachable");
        for _blank in slice_end..slice_start+16 {
            ans += " ";
        }
        write!(ans,"|e| {}\n",String::from_utf8_lossy(&ebc)).expect("unreachable");
        slice_start += 16;
        if slice_end==block.len() {
            break;
        }
    }
    ans
}

#[test]
fn test_display_block() {
    // EBCDIC 'VOL1' followed by ascii 'VOL1'
    let buf: Vec<u8> = vec![0xE5,0xD6,0xD3,0xF1,0x56,0x4F,0x4C,0x31];
    let txt = display_block(0,&buf);
    assert!(txt.contains("|a| ....VOL1"));
    assert!(txt.contains("|e| VOL1"));
}
