//! ## Support for compressed CKD and FBA images
//!
//! Compressed images avoid preallocating full size track images by storing
//! tracks through a two level lookup: the L1 table maps a group of tracks to an
//! L2 table, and the L2 table maps a track within the group to a stored payload.
//! A zero L1 entry means no track in the group was ever written; a zero length
//! L2 entry means that one track was never written.  Either way the track is
//! synthesized on demand, it is not an error.  Rewrites append at end of file
//! and repoint the L2 entry; the bytes of the prior version become unreferenced.
//!
//! The same container serves FBA layouts, where the stored unit is a group of
//! 120 blocks and the 5-byte header carries the group number in place of the
//! cylinder and head.
//!
//! All integers in the compressed header and the lookup tables pass through
//! `StoredInt`, which applies the byte order declared in the header options.

use std::io::{Read,Write,Seek,SeekFrom};
use std::fs::File;
use std::collections::HashMap;
use log::{trace,debug,error};
use a2kit_macro::DiskStruct;
use a2kit_macro::DiskStructError;
use a2kit_macro_derive::DiskStruct;
use crate::img;
use crate::img::{DeviceHeader,DEVICE_HEADER_LEN,DasdImageType};
use crate::img::codec::{self,Compression};
use crate::img::track::{self,NullFormat,TRACK_HEADER_LEN,linux_filler_count};
use crate::{STDRESULT,DYNERR};

pub const COMPRESSED_HEADER_LEN: usize = 512;
/// byte offset of the L1 table in every compressed image
const L1_OFFSET: u64 = (DEVICE_HEADER_LEN + COMPRESSED_HEADER_LEN) as u64;
/// tracks mapped by one L2 table
pub const L2_ENTRIES: usize = 256;
const L1_ENTRY_LEN: usize = 4;
const L2_ENTRY_LEN: usize = 12;
/// options bit declaring that stored integers are big-endian
const OPT_BIG_ENDIAN: u8 = 0x02;
/// version, release, modification written into new images
const VRM: [u8;3] = [0,3,1];

/// Byte-order codec for every stored integer in the compressed header and the
/// L1/L2 tables.  The order is declared once in the header options and captured
/// here at open time, so no other code needs to ask which order is in force.
#[derive(Clone,Copy)]
pub struct StoredInt {
    big_endian: bool
}

impl StoredInt {
    pub fn new(big_endian: bool) -> Self {
        Self { big_endian }
    }
    pub fn get_u16(&self,bytes: [u8;2]) -> u16 {
        match self.big_endian {
            true => u16::from_be_bytes(bytes),
            false => u16::from_le_bytes(bytes)
        }
    }
    pub fn put_u16(&self,val: u16) -> [u8;2] {
        match self.big_endian {
            true => u16::to_be_bytes(val),
            false => u16::to_le_bytes(val)
        }
    }
    pub fn get_u32(&self,bytes: [u8;4]) -> u32 {
        match self.big_endian {
            true => u32::from_be_bytes(bytes),
            false => u32::from_le_bytes(bytes)
        }
    }
    pub fn put_u32(&self,val: u32) -> [u8;4] {
        match self.big_endian {
            true => u32::to_be_bytes(val),
            false => u32::to_le_bytes(val)
        }
    }
    /// read a stored u32 out of a table buffer
    fn read_u32(&self,buf: &[u8],offset: usize) -> Result<u32,DYNERR> {
        match buf.get(offset..offset+4) {
            Some(s) => {
                let mut bytes: [u8;4] = [0;4];
                bytes.copy_from_slice(s);
                Ok(self.get_u32(bytes))
            },
            None => Err(Box::new(img::Error::BadLookupEntry))
        }
    }
}

/// The 512-byte header following the device header in compressed images.
/// Multi-byte numbers are byte arrays; interpretation goes through `StoredInt`.
#[derive(DiskStruct)]
pub struct CompressedHeader {
    pub vrm: [u8;3],
    pub options: u8,
    num_l1: [u8;4],
    num_l2: [u8;4],
    cyls: [u8;4],
    size: [u8;4],
    used: [u8;4],
    free: [u8;4],
    free_total: [u8;4],
    free_largest: [u8;4],
    free_count: [u8;4],
    free_imbed: [u8;4],
    nullfmt: u8,
    compress: u8,
    compress_parm: [u8;2],
    reserved: [u8;464]
}

/// One entry of an L2 table: where a track is stored, how many bytes are
/// stored, and how many bytes the track occupied before compression.
#[derive(Clone,Copy,PartialEq,Eq,Debug)]
pub struct L2Entry {
    pub pos: u32,
    pub len: u32,
    pub size: u32
}

impl L2Entry {
    fn unformatted(&self) -> bool {
        self.len == 0
    }
    fn from_bytes(buf: &[u8],order: StoredInt) -> Result<Self,DYNERR> {
        Ok(Self {
            pos: order.read_u32(buf,0)?,
            len: order.read_u32(buf,4)?,
            size: order.read_u32(buf,8)?
        })
    }
    fn to_bytes(&self,order: StoredInt) -> [u8;L2_ENTRY_LEN] {
        let mut ans: [u8;L2_ENTRY_LEN] = [0;L2_ENTRY_LEN];
        ans[0..4].copy_from_slice(&order.put_u32(self.pos));
        ans[4..8].copy_from_slice(&order.put_u32(self.len));
        ans[8..12].copy_from_slice(&order.put_u32(self.size));
        ans
    }
}

/// Wrapper for compressed CKD or FBA data.
pub struct Cckd {
    typ: DasdImageType,
    file: File,
    devtype: u8,
    heads: usize,
    cylinders: usize,
    /// length of every exchanged track or group buffer
    trksize: usize,
    /// FBA block length, 0 for CKD
    block_len: usize,
    /// FBA blocks per group, 0 for CKD
    group_blocks: usize,
    order: StoredInt,
    vrm: [u8;3],
    options: u8,
    num_l1: usize,
    num_l2: usize,
    nullfmt: NullFormat,
    /// 4096-byte filler records per track for the Linux null format
    filler_recs: usize,
    compress: Compression,
    compress_parm: u16,
    size: u32,
    used: u32,
    free: [u32;5],
    l1: Vec<u32>,
    l2_cache: HashMap<usize,Vec<L2Entry>>,
    header_dirty: bool
}

impl Cckd {
    /// Open a compressed image.  The byte order of the stored integers is
    /// captured from the header options and honored from here on.
    pub fn open(img_path: &str) -> Result<Self,DYNERR> {
        let mut file = File::options().read(true).write(true).open(img_path)?;
        let mut buf: Vec<u8> = vec![0;DEVICE_HEADER_LEN];
        file.read_exact(&mut buf)?;
        let dev_header = DeviceHeader::from_bytes(&buf)?;
        let typ = dev_header.image_type()?;
        if typ != DasdImageType::CkdCompressed && typ != DasdImageType::FbaCompressed {
            return Err(Box::new(img::Error::ImageTypeMismatch));
        }
        let (raw_heads,raw_trksize) = dev_header.geometry()?;
        let mut hbuf: Vec<u8> = vec![0;COMPRESSED_HEADER_LEN];
        file.read_exact(&mut hbuf)?;
        let header = CompressedHeader::from_bytes(&hbuf)?;
        let order = StoredInt::new(header.options & OPT_BIG_ENDIAN != 0);
        let num_l1 = order.get_u32(header.num_l1) as usize;
        let num_l2 = order.get_u32(header.num_l2) as usize;
        let cylinders = order.get_u32(header.cyls) as usize;
        let nullfmt: NullFormat = match num_traits::FromPrimitive::from_u8(header.nullfmt) {
            Some(f) => f,
            None => {
                error!("null track format {} is not recognized",header.nullfmt);
                return Err(Box::new(img::Error::UnknownImageType));
            }
        };
        let compress = match num_traits::FromPrimitive::from_u8(header.compress) {
            Some(c) => c,
            None => {
                error!("header compression code {} is not recognized",header.compress);
                return Err(Box::new(img::Error::Compression));
            }
        };
        let (heads,trksize,block_len,group_blocks) = match typ {
            DasdImageType::CkdCompressed => (raw_heads,raw_trksize,0,0),
            _ => (1,TRACK_HEADER_LEN + raw_heads*raw_trksize,raw_trksize,raw_heads)
        };
        if num_l2 == 0 || num_l1*num_l2 < cylinders*heads {
            error!("lookup tables map {} tracks, geometry needs {}",num_l1*num_l2,cylinders*heads);
            return Err(Box::new(img::Error::BadLookupEntry));
        }
        let file_len = file.metadata()?.len();
        let l1_len = (num_l1*L1_ENTRY_LEN) as u64;
        if file_len < L1_OFFSET + l1_len {
            error!("file of {} bytes cannot hold the declared L1 table",file_len);
            return Err(Box::new(img::Error::ImageSizeMismatch));
        }
        let mut l1_buf: Vec<u8> = vec![0;l1_len as usize];
        file.seek(SeekFrom::Start(L1_OFFSET))?;
        file.read_exact(&mut l1_buf)?;
        let mut l1: Vec<u32> = Vec::new();
        for i in 0..num_l1 {
            l1.push(order.read_u32(&l1_buf,i*L1_ENTRY_LEN)?);
        }
        debug!("opened compressed image, {} L1 entries, {} tracks per group",num_l1,num_l2);
        Ok(Self {
            typ,
            file,
            devtype: dev_header.devtype,
            heads,
            cylinders,
            trksize,
            block_len,
            group_blocks,
            order,
            vrm: header.vrm,
            options: header.options,
            num_l1,
            num_l2,
            nullfmt,
            filler_recs: linux_filler_count(trksize),
            compress,
            compress_parm: order.get_u16(header.compress_parm),
            size: order.get_u32(header.size),
            used: order.get_u32(header.used),
            free: [
                order.get_u32(header.free),
                order.get_u32(header.free_total),
                order.get_u32(header.free_largest),
                order.get_u32(header.free_count),
                order.get_u32(header.free_imbed)
            ],
            l1,
            l2_cache: HashMap::new(),
            header_dirty: false
        })
    }
    /// Create a compressed image.  For CKD layouts `heads` and `trksize` are the
    /// real geometry; for FBA layouts pass the blocks per group and the block
    /// length, with `cylinders` counting block groups.  Only the headers and a
    /// zeroed L1 table are written; every track comes into being lazily.
    pub fn create(img_path: &str,typ: DasdImageType,devtype: u8,heads: usize,trksize: usize,
        cylinders: usize,nullfmt: NullFormat,compress: Compression,compress_parm: u16) -> Result<Self,DYNERR> {
        if typ != DasdImageType::CkdCompressed && typ != DasdImageType::FbaCompressed {
            return Err(Box::new(img::Error::ImageTypeMismatch));
        }
        if heads == 0 || trksize == 0 || cylinders == 0 {
            return Err(Box::new(img::Error::GeometryMismatch));
        }
        let tracks = cylinders * match typ {
            DasdImageType::CkdCompressed => heads,
            _ => 1
        };
        let num_l1 = (tracks + L2_ENTRIES - 1) / L2_ENTRIES;
        let order = StoredInt::new(false);
        let size = (DEVICE_HEADER_LEN + COMPRESSED_HEADER_LEN + num_l1*L1_ENTRY_LEN) as u32;
        let mut file = File::options().read(true).write(true).create(true).truncate(true).open(img_path)?;
        let dev_header = DeviceHeader::create(typ,heads as u32,trksize as u32,devtype);
        let mut header = CompressedHeader::new();
        header.vrm = VRM;
        header.options = 0;
        header.num_l1 = order.put_u32(num_l1 as u32);
        header.num_l2 = order.put_u32(L2_ENTRIES as u32);
        header.cyls = order.put_u32(cylinders as u32);
        header.size = order.put_u32(size);
        header.used = order.put_u32(size);
        header.nullfmt = nullfmt as u8;
        header.compress = compress as u8;
        header.compress_parm = order.put_u16(compress_parm);
        file.write_all(&dev_header.to_bytes())?;
        file.write_all(&header.to_bytes())?;
        file.write_all(&vec![0;num_l1*L1_ENTRY_LEN])?;
        drop(file);
        Self::open(img_path)
    }
    fn tracks(&self) -> usize {
        self.cylinders * self.heads
    }
    /// the cylinder and head that belong in a track or group header
    fn address(&self,track: usize) -> (u16,u16) {
        match self.typ {
            DasdImageType::CkdCompressed => ((track/self.heads) as u16,(track%self.heads) as u16),
            _ => ((track >> 16) as u16,(track & 0xffff) as u16)
        }
    }
    fn synthesize(&self,track: usize) -> Result<Vec<u8>,DYNERR> {
        let (cyl,head) = self.address(track);
        match self.typ {
            DasdImageType::CkdCompressed => track::null_track(cyl,head,self.nullfmt,self.trksize,self.filler_recs),
            _ => {
                let mut buf = track::TrackHeader::create(cyl,head).to_bytes();
                buf.resize(self.trksize,0);
                Ok(buf)
            }
        }
    }
    /// Get the L2 table for an L1 group, reading and caching it if need be.
    /// The L1 entry must be nonzero.
    fn l2_table(&mut self,l1x: usize) -> Result<&mut Vec<L2Entry>,DYNERR> {
        if !self.l2_cache.contains_key(&l1x) {
            let pos = self.l1[l1x] as u64;
            let table_len = self.num_l2 * L2_ENTRY_LEN;
            if pos < L1_OFFSET + (self.num_l1*L1_ENTRY_LEN) as u64 || pos + table_len as u64 > self.file.metadata()?.len() {
                error!("L1 entry {} points at {}, outside the file",l1x,pos);
                return Err(Box::new(img::Error::BadLookupEntry));
            }
            let mut buf: Vec<u8> = vec![0;table_len];
            self.file.seek(SeekFrom::Start(pos))?;
            self.file.read_exact(&mut buf)?;
            let mut table: Vec<L2Entry> = Vec::new();
            for i in 0..self.num_l2 {
                table.push(L2Entry::from_bytes(&buf[i*L2_ENTRY_LEN..(i+1)*L2_ENTRY_LEN],self.order)?);
            }
            self.l2_cache.insert(l1x,table);
        }
        Ok(self.l2_cache.get_mut(&l1x).expect("unreachable"))
    }
    /// Allocate a zeroed L2 table at end of file for a still empty L1 group,
    /// writing the new L1 entry through to disk.
    fn allocate_l2(&mut self,l1x: usize) -> STDRESULT {
        let pos = self.file.seek(SeekFrom::End(0))?;
        let table_len = self.num_l2 * L2_ENTRY_LEN;
        self.file.write_all(&vec![0;table_len])?;
        self.l1[l1x] = pos as u32;
        self.file.seek(SeekFrom::Start(L1_OFFSET + (l1x*L1_ENTRY_LEN) as u64))?;
        self.file.write_all(&self.order.put_u32(pos as u32))?;
        self.l2_cache.insert(l1x,vec![L2Entry { pos:0,len:0,size:0 };self.num_l2]);
        self.used += table_len as u32;
        self.header_dirty = true;
        debug!("allocated L2 table for group {} at {}",l1x,pos);
        Ok(())
    }
    fn bounds_check(&self,track: usize) -> STDRESULT {
        if track >= self.tracks() {
            error!("track {} exceeds the geometry of {} tracks",track,self.tracks());
            return Err(Box::new(img::Error::GeometryMismatch));
        }
        Ok(())
    }
}

impl img::DasdImage for Cckd {
    fn what_am_i(&self) -> DasdImageType {
        self.typ
    }
    fn heads(&self) -> usize {
        self.heads
    }
    fn cylinders(&self) -> usize {
        self.cylinders
    }
    fn track_len(&self) -> usize {
        self.trksize
    }
    fn devtype(&self) -> u8 {
        self.devtype
    }
    fn blocks(&self) -> usize {
        self.cylinders * self.group_blocks
    }
    fn block_len(&self) -> usize {
        self.block_len
    }
    fn load_track(&mut self,track: usize) -> Result<Vec<u8>,DYNERR> {
        trace!("load track {}",track);
        self.bounds_check(track)?;
        let l1x = track / self.num_l2;
        let l2x = track % self.num_l2;
        if self.l1[l1x] == 0 {
            trace!("group {} was never written, synthesizing",l1x);
            return self.synthesize(track);
        }
        let entry = self.l2_table(l1x)?[l2x];
        if entry.unformatted() {
            trace!("track {} was never written, synthesizing",track);
            return self.synthesize(track);
        }
        if (entry.pos as u64) + (entry.len as u64) > self.file.metadata()?.len() || (entry.len as usize) < TRACK_HEADER_LEN {
            error!("L2 entry for track {} points at {}+{}, outside the file",track,entry.pos,entry.len);
            return Err(Box::new(img::Error::BadLookupEntry));
        }
        let mut stored: Vec<u8> = vec![0;entry.len as usize];
        self.file.seek(SeekFrom::Start(entry.pos as u64))?;
        self.file.read_exact(&mut stored)?;
        let (cyl,head) = self.address(track);
        let stored_cyl = u16::from_be_bytes([stored[1],stored[2]]);
        let stored_head = u16::from_be_bytes([stored[3],stored[4]]);
        if stored_cyl != cyl || stored_head != head {
            error!("stored header says ({},{}), expected ({},{})",stored_cyl,stored_head,cyl,head);
            return Err(Box::new(img::Error::CorruptTrack));
        }
        let restored = codec::uncompress(stored[0],&stored[TRACK_HEADER_LEN..],self.trksize - TRACK_HEADER_LEN)?;
        let mut buf = track::TrackHeader::create(cyl,head).to_bytes();
        buf.extend_from_slice(&restored);
        Ok(buf)
    }
    fn store_track(&mut self,track: usize,buf: &[u8]) -> STDRESULT {
        trace!("store track {}",track);
        self.bounds_check(track)?;
        if buf.len() != self.trksize {
            return Err(Box::new(img::Error::ImageSizeMismatch));
        }
        let (cyl,head) = self.address(track);
        let header = track::TrackHeader::from_bytes(&buf[0..TRACK_HEADER_LEN])?;
        if header.cyl() != cyl || header.head() != head {
            error!("buffer addressed ({},{}) cannot store at track {}",header.cyl(),header.head(),track);
            return Err(Box::new(img::Error::GeometryMismatch));
        }
        // only the bytes through the end-of-track mark are stored for CKD;
        // an FBA group is stored whole
        let occupied = match self.typ {
            DasdImageType::CkdCompressed => track::used_len(buf,cyl,head)?,
            _ => self.trksize
        };
        let payload = &buf[TRACK_HEADER_LEN..occupied];
        let packed = codec::compress(self.compress,self.compress_parm,payload)?;
        // a payload the codec could not shrink is stored raw
        let (code,body) = match packed.len() < payload.len() {
            true => (self.compress as u8,packed),
            false => (Compression::None as u8,payload.to_vec())
        };
        let l1x = track / self.num_l2;
        let l2x = track % self.num_l2;
        if self.l1[l1x] == 0 {
            self.allocate_l2(l1x)?;
        }
        let pos = self.file.seek(SeekFrom::End(0))?;
        let mut stored: Vec<u8> = Vec::with_capacity(TRACK_HEADER_LEN + body.len());
        stored.push(code);
        stored.extend_from_slice(&buf[1..TRACK_HEADER_LEN]);
        stored.extend_from_slice(&body);
        self.file.write_all(&stored)?;
        let entry = L2Entry {
            pos: pos as u32,
            len: stored.len() as u32,
            size: occupied as u32
        };
        let l2_pos = self.l1[l1x] as u64 + (l2x*L2_ENTRY_LEN) as u64;
        self.file.seek(SeekFrom::Start(l2_pos))?;
        self.file.write_all(&entry.to_bytes(self.order))?;
        self.l2_table(l1x)?[l2x] = entry;
        self.size = self.file.metadata()?.len() as u32;
        self.used += stored.len() as u32;
        self.header_dirty = true;
        Ok(())
    }
    fn flush(&mut self) -> STDRESULT {
        if self.header_dirty {
            let mut header = CompressedHeader::new();
            header.vrm = self.vrm;
            header.options = self.options;
            header.num_l1 = self.order.put_u32(self.num_l1 as u32);
            header.num_l2 = self.order.put_u32(self.num_l2 as u32);
            header.cyls = self.order.put_u32(self.cylinders as u32);
            header.size = self.order.put_u32(self.size);
            header.used = self.order.put_u32(self.used);
            header.free = self.order.put_u32(self.free[0]);
            header.free_total = self.order.put_u32(self.free[1]);
            header.free_largest = self.order.put_u32(self.free[2]);
            header.free_count = self.order.put_u32(self.free[3]);
            header.free_imbed = self.order.put_u32(self.free[4]);
            header.nullfmt = self.nullfmt as u8;
            header.compress = self.compress as u8;
            header.compress_parm = self.order.put_u16(self.compress_parm);
            self.file.seek(SeekFrom::Start(DEVICE_HEADER_LEN as u64))?;
            self.file.write_all(&header.to_bytes())?;
            self.header_dirty = false;
        }
        self.file.flush()?;
        Ok(())
    }
    fn get_metadata(&self,indent: Option<u16>) -> String {
        let mut root = json::JsonValue::new_object();
        let typ = self.what_am_i().to_string();
        root[&typ] = json::JsonValue::new_object();
        root[&typ]["version"] = json::JsonValue::String(format!("{}.{}.{}",self.vrm[0],self.vrm[1],self.vrm[2]));
        root[&typ]["byte_order"] = json::JsonValue::String(match self.order.big_endian {
            true => "big".to_string(),
            false => "little".to_string()
        });
        root[&typ]["devtype"] = json::JsonValue::String(format!("{:02X}",self.devtype));
        root[&typ]["cylinders"] = json::JsonValue::Number(self.cylinders.into());
        root[&typ]["l1_entries"] = json::JsonValue::Number(self.num_l1.into());
        root[&typ]["l2_entries"] = json::JsonValue::Number(self.num_l2.into());
        root[&typ]["size"] = json::JsonValue::String(format!("{:08X}",self.size));
        root[&typ]["used"] = json::JsonValue::String(format!("{:08X}",self.used));
        root[&typ]["null_format"] = json::JsonValue::Number((self.nullfmt as u8).into());
        root[&typ]["compression"] = json::JsonValue::String(self.compress.to_string());
        if let Some(spaces) = indent {
            json::stringify_pretty(root,spaces)
        } else {
            json::stringify(root)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_int_orders() {
        let le = StoredInt::new(false);
        let be = StoredInt::new(true);
        assert_eq!(le.put_u32(0x12345678),[0x78,0x56,0x34,0x12]);
        assert_eq!(be.put_u32(0x12345678),[0x12,0x34,0x56,0x78]);
        assert_eq!(le.get_u32([0x78,0x56,0x34,0x12]),0x12345678);
        assert_eq!(be.get_u32([0x12,0x34,0x56,0x78]),0x12345678);
        assert_eq!(le.get_u16(le.put_u16(0xBEEF)),0xBEEF);
        assert_eq!(be.get_u16(be.put_u16(0xBEEF)),0xBEEF);
    }

    #[test]
    fn l2_entry_round_trip() {
        let ent = L2Entry { pos: 0x1000, len: 0x234, size: 0x5678 };
        for order in [StoredInt::new(false),StoredInt::new(true)] {
            let bytes = ent.to_bytes(order);
            assert_eq!(L2Entry::from_bytes(&bytes,order).expect("parse failed"),ent);
        }
    }

    #[test]
    fn compressed_header_round_trip() {
        let order = StoredInt::new(false);
        let mut header = CompressedHeader::new();
        header.vrm = VRM;
        header.num_l1 = order.put_u32(33);
        header.num_l2 = order.put_u32(256);
        header.cyls = order.put_u32(1113);
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(),COMPRESSED_HEADER_LEN);
        let back = CompressedHeader::from_bytes(&bytes).expect("parse failed");
        assert_eq!(order.get_u32(back.num_l1),33);
        assert_eq!(order.get_u32(back.num_l2),256);
        assert_eq!(order.get_u32(back.cyls),1113);
    }

    #[test]
    fn filler_counts() {
        // 3390 sized track holds 13 filler records, 2314 sized track holds 1
        assert_eq!(linux_filler_count(56832),13);
        assert_eq!(linux_filler_count(7680),1);
        assert_eq!(linux_filler_count(16),0);
    }
}
