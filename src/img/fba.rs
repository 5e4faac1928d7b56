//! ## Support for flat FBA images
//!
//! Fixed block architecture images are a device header followed by a flat array
//! of 512-byte blocks.  To keep one code path above the image layer, blocks are
//! exchanged in groups dressed up like tracks: a 5-byte header carrying the
//! group number, then the blocks of the group.  A volume whose block count is
//! not a whole number of groups has a short final group; the exchanged buffer
//! is still full length, with the tail zero filled and never written back.

use std::io::{Read,Write,Seek,SeekFrom};
use std::fs::File;
use log::{trace,error};
use a2kit_macro::DiskStruct;
use crate::img;
use crate::img::{DeviceHeader,DEVICE_HEADER_LEN,DasdImageType};
use crate::img::track::{TrackHeader,TRACK_HEADER_LEN};
use crate::{STDRESULT,DYNERR};

/// blocks exchanged as one group, the FBA analog of a track
pub const GROUP_BLOCKS: usize = 120;
/// the FBA block length
pub const BLOCK_LEN: usize = 512;

/// Wrapper for flat FBA data.
pub struct Fba {
    devtype: u8,
    block_len: usize,
    group_blocks: usize,
    total_blocks: usize,
    file: File
}

impl Fba {
    pub fn open(img_path: &str) -> Result<Self,DYNERR> {
        let mut file = File::options().read(true).write(true).open(img_path)?;
        let mut buf: Vec<u8> = vec![0;DEVICE_HEADER_LEN];
        file.read_exact(&mut buf)?;
        let header = DeviceHeader::from_bytes(&buf)?;
        if header.image_type()? != DasdImageType::FbaFlat {
            return Err(Box::new(img::Error::ImageTypeMismatch));
        }
        let (group_blocks,block_len) = header.geometry()?;
        let block_bytes = file.metadata()?.len() as usize - DEVICE_HEADER_LEN;
        if block_bytes % block_len != 0 {
            error!("size of {} is not a whole number of blocks",img_path);
            return Err(Box::new(img::Error::ImageSizeMismatch));
        }
        Ok(Self {
            devtype: header.devtype,
            block_len,
            group_blocks,
            total_blocks: block_bytes / block_len,
            file
        })
    }
    /// Create a flat image with every block zeroed.
    pub fn create(img_path: &str,devtype: u8,blocks: usize) -> Result<Self,DYNERR> {
        if blocks == 0 {
            return Err(Box::new(img::Error::GeometryMismatch));
        }
        let mut file = File::options().read(true).write(true).create(true).truncate(true).open(img_path)?;
        let header = DeviceHeader::create(DasdImageType::FbaFlat,GROUP_BLOCKS as u32,BLOCK_LEN as u32,devtype);
        let mut out = std::io::BufWriter::new(&mut file);
        out.write_all(&header.to_bytes())?;
        let zero_block = vec![0;BLOCK_LEN];
        for _blk in 0..blocks {
            out.write_all(&zero_block)?;
        }
        out.flush()?;
        drop(out);
        Ok(Self {
            devtype,
            block_len: BLOCK_LEN,
            group_blocks: GROUP_BLOCKS,
            total_blocks: blocks,
            file
        })
    }
    fn groups(&self) -> usize {
        (self.total_blocks + self.group_blocks - 1) / self.group_blocks
    }
    /// blocks actually present in the given group, short for the last one
    fn group_size(&self,group: usize) -> usize {
        usize::min(self.group_blocks,self.total_blocks - group*self.group_blocks)
    }
    fn bounds_check(&self,group: usize) -> STDRESULT {
        if group >= self.groups() {
            error!("group {} exceeds the {} block geometry",group,self.total_blocks);
            return Err(Box::new(img::Error::GeometryMismatch));
        }
        Ok(())
    }
}

impl img::DasdImage for Fba {
    fn what_am_i(&self) -> DasdImageType {
        DasdImageType::FbaFlat
    }
    fn heads(&self) -> usize {
        1
    }
    fn cylinders(&self) -> usize {
        self.groups()
    }
    fn track_len(&self) -> usize {
        TRACK_HEADER_LEN + self.group_blocks*self.block_len
    }
    fn devtype(&self) -> u8 {
        self.devtype
    }
    fn blocks(&self) -> usize {
        self.total_blocks
    }
    fn block_len(&self) -> usize {
        self.block_len
    }
    fn load_track(&mut self,group: usize) -> Result<Vec<u8>,DYNERR> {
        trace!("load group {}",group);
        self.bounds_check(group)?;
        let mut buf = TrackHeader::create((group >> 16) as u16,(group & 0xffff) as u16).to_bytes();
        buf.resize(self.track_len(),0);
        let count = self.group_size(group) * self.block_len;
        let offset = (DEVICE_HEADER_LEN + group*self.group_blocks*self.block_len) as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf[TRACK_HEADER_LEN..TRACK_HEADER_LEN+count])?;
        Ok(buf)
    }
    fn store_track(&mut self,group: usize,buf: &[u8]) -> STDRESULT {
        trace!("store group {}",group);
        self.bounds_check(group)?;
        if buf.len() != self.track_len() {
            return Err(Box::new(img::Error::ImageSizeMismatch));
        }
        let header = TrackHeader::from_bytes(&buf[0..TRACK_HEADER_LEN])?;
        let addressed = ((header.cyl() as usize) << 16) + header.head() as usize;
        if addressed != group {
            error!("buffer addressed to group {} cannot store at group {}",addressed,group);
            return Err(Box::new(img::Error::GeometryMismatch));
        }
        let count = self.group_size(group) * self.block_len;
        let offset = (DEVICE_HEADER_LEN + group*self.group_blocks*self.block_len) as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&buf[TRACK_HEADER_LEN..TRACK_HEADER_LEN+count])?;
        Ok(())
    }
    fn flush(&mut self) -> STDRESULT {
        self.file.flush()?;
        Ok(())
    }
    fn get_metadata(&self,indent: Option<u16>) -> String {
        let mut root = json::JsonValue::new_object();
        let typ = self.what_am_i().to_string();
        root[&typ] = json::JsonValue::new_object();
        root[&typ]["devtype"] = json::JsonValue::String(format!("{:02X}",self.devtype));
        root[&typ]["blocks"] = json::JsonValue::Number(self.total_blocks.into());
        root[&typ]["block_size"] = json::JsonValue::Number(self.block_len.into());
        root[&typ]["groups"] = json::JsonValue::Number(self.groups().into());
        if let Some(spaces) = indent {
            json::stringify_pretty(root,spaces)
        } else {
            json::stringify(root)
        }
    }
}
