//! ## Volume initialization
//!
//! Builds brand new volume files.  The image layer writes the headers and the
//! body of the file; track 0 is then formatted through the ordinary volume
//! write path with the IPL bootstrap records and the volume label.  Real
//! operating system loaders parse these records positionally, so their layouts
//! are reproduced byte for byte.

use log::{debug,info,error};
use crate::img::{self,DasdImage,DasdImageType};
use crate::img::ckd::Ckd;
use crate::img::cckd::Cckd;
use crate::img::fba::{Fba,GROUP_BLOCKS};
use crate::img::codec::Compression;
use crate::img::track::{self,NullFormat,R0_DATA_LEN,RECORD_HEADER_LEN,TRACK_HEADER_LEN};
use crate::ebcdic;
use crate::dev;
use crate::{DasdCtx,STDRESULT,DYNERR};
use super::{CkdVolume,FbaVolume};

/// flat images larger than this split into sequenced files
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1 << 31;

/// IPL program status word loaded by the bootstrap
const IPL_PSW: [u8;8] = [0x00,0x06,0x00,0x00,0x00,0x00,0x00,0x0F];
/// channel command words following the PSW in IPL1
const IPL_CCW1: [u8;8] = [0x06,0x00,0x0B,0x8E,0x60,0x00,0x00,0x60];
const IPL_CCW2: [u8;8] = [0x08,0x00,0x0B,0x8E,0x00,0x00,0x00,0x00];
/// length of the IPL2 bootstrap record
const IPL2_DATA_LEN: usize = 144;
/// length of the volume label record
const VOL1_DATA_LEN: usize = 80;
/// where the label says the VTOC lives: cyl 0, head 0, record 5
const VTOC_CCHHR: [u8;5] = [0,0,0,0,5];

/// Options governing volume creation.
pub struct CreateOpts {
    /// compressed two-level layout rather than flat
    pub compressed: bool,
    /// codec for compressed layouts
    pub compression: Compression,
    /// codec level, 1-9
    pub compress_parm: u16,
    /// how never-written tracks materialize
    pub null_format: NullFormat,
    /// flat file split threshold
    pub max_file_size: u64
}

impl Default for CreateOpts {
    fn default() -> Self {
        Self {
            compressed: false,
            compression: Compression::Zlib,
            compress_parm: 6,
            null_format: NullFormat::Basic,
            max_file_size: DEFAULT_MAX_FILE_SIZE
        }
    }
}

/// Uppercase and validate a volume serial: 1-6 characters from the national
/// character set.
fn validate_volser(volser: &str) -> Result<String,DYNERR> {
    let up = volser.to_uppercase();
    let patt = regex::Regex::new(r"^[A-Z0-9$#@]{1,6}$").expect("unreachable");
    if !patt.is_match(&up) {
        error!("volume serial `{}` is invalid",volser);
        return Err(Box::new(super::Error::BadVolumeSerial));
    }
    Ok(up)
}

/// Full track image length for a device: room for the track header, R0, one
/// maximum length record, and the end-of-track mark, rounded up to 512.
fn full_track_len(max_dlen: usize) -> usize {
    let need = TRACK_HEADER_LEN + RECORD_HEADER_LEN + R0_DATA_LEN + RECORD_HEADER_LEN + max_dlen + track::END_OF_TRACK.len();
    (need + 511) & !511
}

/// the 80-byte VOL1 label: id, serial, security byte, VTOC pointer, the rest
/// EBCDIC spaces
fn vol1_data(volser: &str) -> Vec<u8> {
    let mut dat = vec![0x40;VOL1_DATA_LEN];
    dat[0..4].copy_from_slice(&ebcdic::to_field("VOL1",4));
    dat[4..10].copy_from_slice(&ebcdic::to_field(volser,6));
    dat[11..16].copy_from_slice(&VTOC_CCHHR);
    dat
}

/// Write the IPL records and volume label onto track 0.
fn format_track0(vol: &mut CkdVolume,volser: &str) -> STDRESULT {
    let mut ipl1 = Vec::with_capacity(24);
    ipl1.extend_from_slice(&IPL_PSW);
    ipl1.extend_from_slice(&IPL_CCW1);
    ipl1.extend_from_slice(&IPL_CCW2);
    vol.write_block(0,0,1,Some(&ebcdic::to_field("IPL1",4)),&ipl1)?;
    vol.write_block(0,0,2,Some(&ebcdic::to_field("IPL2",4)),&vec![0;IPL2_DATA_LEN])?;
    vol.write_block(0,0,3,Some(&ebcdic::to_field("VOL1",4)),&vol1_data(volser))?;
    Ok(())
}

/// Create a CKD volume file, flat or compressed per the options, and format
/// track 0 with the IPL records and volume label.  `cyls` of `None` takes the
/// device model's standard count.
pub fn create_volume(img_path: &str,device: &str,cyls: Option<usize>,volser: &str,
    opts: &CreateOpts,ctx: &mut DasdCtx) -> STDRESULT {
    let volser = validate_volser(volser)?;
    let dev = dev::ckdtab::lookup(device)?;
    let cyls = cyls.unwrap_or(dev.cyls);
    if cyls == 0 || cyls > u16::MAX as usize + 1 {
        error!("{} cylinders cannot be addressed",cyls);
        return Err(Box::new(img::Error::GeometryMismatch));
    }
    let trksize = full_track_len(dev.max_dlen);
    info!("create {} as a {} with {} cylinders, {} byte tracks",img_path,dev.name,cyls,trksize);
    let image: Box<dyn DasdImage> = match opts.compressed {
        true => Box::new(Cckd::create(img_path,DasdImageType::CkdCompressed,dev.devtype,
            dev.heads,trksize,cyls,opts.null_format,opts.compression,opts.compress_parm)?),
        false => Box::new(Ckd::create(img_path,dev.devtype,dev.heads,trksize,cyls,
            opts.null_format,track::linux_filler_count(trksize),opts.max_file_size)?)
    };
    let mut vol = CkdVolume::from_img(image,ctx)?;
    format_track0(&mut vol,&volser)?;
    vol.close()
}

/// Create an FBA volume file, flat or compressed per the options, with the
/// volume label at block 1.  `blocks` of `None` takes the device model's
/// standard count; compressed layouts round up to whole block groups.
pub fn create_fba_volume(img_path: &str,device: &str,blocks: Option<usize>,volser: &str,
    opts: &CreateOpts,ctx: &mut DasdCtx) -> STDRESULT {
    let volser = validate_volser(volser)?;
    let dev = dev::fbatab::lookup(device)?;
    let blocks = blocks.unwrap_or(dev.blocks);
    if blocks < 2 {
        error!("an FBA volume needs at least 2 blocks");
        return Err(Box::new(img::Error::GeometryMismatch));
    }
    info!("create {} as a {} with {} blocks",img_path,dev.name,blocks);
    let image: Box<dyn DasdImage> = match opts.compressed {
        true => {
            let groups = (blocks + GROUP_BLOCKS - 1) / GROUP_BLOCKS;
            debug!("{} blocks stored as {} groups",blocks,groups);
            Box::new(Cckd::create(img_path,DasdImageType::FbaCompressed,dev.devtype,
                GROUP_BLOCKS,dev::fbatab::BLOCK_LEN,groups,NullFormat::Basic,
                opts.compression,opts.compress_parm)?)
        },
        false => Box::new(Fba::create(img_path,dev.devtype,blocks)?)
    };
    let mut vol = FbaVolume::from_img(image,ctx)?;
    let mut label = vol1_data(&volser);
    label.resize(dev::fbatab::BLOCK_LEN,0);
    vol.write_sector(1,&label)?;
    vol.close()
}
