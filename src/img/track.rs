//! ## Track image layout
//!
//! A track image is a 5-byte track header, zero or more count-key-data records,
//! and an 8-byte end-of-track mark of all ones.  Each record leads with an 8-byte
//! count field declaring its own key and data lengths.  All multi-byte fields are
//! big-endian.  This module provides the header structures, a bounds-checked
//! cursor for walking records in place, a builder for composing tracks, and the
//! null track synthesizer used for addresses that were never written.

use num_derive::FromPrimitive;
use log::error;
use a2kit_macro::DiskStruct;
use a2kit_macro::DiskStructError;
use a2kit_macro_derive::DiskStruct;
use crate::DYNERR;

pub const TRACK_HEADER_LEN: usize = 5;
pub const RECORD_HEADER_LEN: usize = 8;
pub const END_OF_TRACK: [u8;8] = [0xff;8];
/// data length of the control record (R0) on every formatted track
pub const R0_DATA_LEN: usize = 8;
/// data length of the filler records written by the Linux null format
pub const LINUX_FILL_LEN: usize = 4096;

/// How a never-written track materializes when it is first read.
/// The numeric values are stored in the compressed device header.
#[derive(FromPrimitive,PartialEq,Eq,Clone,Copy,Debug)]
pub enum NullFormat {
    /// track header, R0, end-of-track mark
    Basic = 0,
    /// like `Basic` with an empty R1 before the mark
    EmptyR1 = 1,
    /// R0 followed by as many 4096-byte zero records as the device holds
    Linux = 2
}

#[derive(DiskStruct)]
pub struct TrackHeader {
    pub bin: u8,
    pub cyl: [u8;2],
    pub head: [u8;2]
}

#[derive(DiskStruct)]
pub struct RecordHeader {
    pub cyl: [u8;2],
    pub head: [u8;2],
    pub rec: u8,
    pub klen: u8,
    pub dlen: [u8;2]
}

impl TrackHeader {
    pub fn create(cyl: u16,head: u16) -> Self {
        Self {
            bin: 0,
            cyl: u16::to_be_bytes(cyl),
            head: u16::to_be_bytes(head)
        }
    }
    pub fn cyl(&self) -> u16 {
        u16::from_be_bytes(self.cyl)
    }
    pub fn head(&self) -> u16 {
        u16::from_be_bytes(self.head)
    }
}

impl RecordHeader {
    pub fn create(cyl: u16,head: u16,rec: u8,klen: u8,dlen: u16) -> Self {
        Self {
            cyl: u16::to_be_bytes(cyl),
            head: u16::to_be_bytes(head),
            rec,
            klen,
            dlen: u16::to_be_bytes(dlen)
        }
    }
    pub fn dlen(&self) -> usize {
        u16::from_be_bytes(self.dlen) as usize
    }
}

/// Borrowed view of one record inside a resident track buffer.
/// Do not retain across a track switch.
pub struct RecordView<'a> {
    pub cyl: u16,
    pub head: u16,
    pub rec: u8,
    /// `None` for an unkeyed record (key length 0)
    pub key: Option<&'a [u8]>,
    pub data: &'a [u8],
    /// offset of the record's count field within the track buffer
    pub pos: usize
}

/// Cursor over the records of a track image.  All advances are bounds checked;
/// running off the buffer without meeting the end-of-track mark is corruption,
/// never undefined behavior.
pub struct TrackCursor<'a> {
    buf: &'a [u8],
    ptr: usize
}

impl<'a> TrackCursor<'a> {
    /// Start a cursor, verifying the track header against the expected address.
    pub fn new(buf: &'a [u8],cyl: u16,head: u16) -> Result<Self,DYNERR> {
        if buf.len() < TRACK_HEADER_LEN + END_OF_TRACK.len() {
            return Err(Box::new(super::Error::CorruptTrack));
        }
        let header = TrackHeader::from_bytes(&buf[0..TRACK_HEADER_LEN])?;
        if header.bin != 0 {
            error!("track flag byte {} should be 0 in a restored track",header.bin);
            return Err(Box::new(super::Error::CorruptTrack));
        }
        if header.cyl() != cyl || header.head() != head {
            error!("track header says ({},{}), expected ({},{})",header.cyl(),header.head(),cyl,head);
            return Err(Box::new(super::Error::CorruptTrack));
        }
        Ok(Self {
            buf,
            ptr: TRACK_HEADER_LEN
        })
    }
    /// Advance to the next record.  `None` means the end-of-track mark was met.
    pub fn next(&mut self) -> Result<Option<RecordView<'a>>,DYNERR> {
        if self.ptr + RECORD_HEADER_LEN > self.buf.len() {
            error!("no end-of-track mark within the track bounds");
            return Err(Box::new(super::Error::CorruptTrack));
        }
        if self.buf[self.ptr..self.ptr+8] == END_OF_TRACK {
            return Ok(None);
        }
        let pos = self.ptr;
        let header = RecordHeader::from_bytes(&self.buf[pos..pos+RECORD_HEADER_LEN])?;
        let klen = header.klen as usize;
        let dlen = header.dlen();
        if pos + RECORD_HEADER_LEN + klen + dlen > self.buf.len() {
            error!("record ({},{},{}) runs past the track bounds",
                u16::from_be_bytes(header.cyl),u16::from_be_bytes(header.head),header.rec);
            return Err(Box::new(super::Error::CorruptTrack));
        }
        let key_start = pos + RECORD_HEADER_LEN;
        let key = match klen {
            0 => None,
            _ => Some(&self.buf[key_start..key_start+klen])
        };
        self.ptr = key_start + klen + dlen;
        Ok(Some(RecordView {
            cyl: u16::from_be_bytes(header.cyl),
            head: u16::from_be_bytes(header.head),
            rec: header.rec,
            key,
            data: &self.buf[key_start+klen..key_start+klen+dlen],
            pos
        }))
    }
}

/// Count the bytes of a track image actually in use, i.e. through the
/// end-of-track mark.  Compressed containers store only this much.
pub fn used_len(buf: &[u8],cyl: u16,head: u16) -> Result<usize,DYNERR> {
    let mut curs = TrackCursor::new(buf,cyl,head)?;
    while let Some(_rec) = curs.next()? {}
    Ok(curs.ptr + END_OF_TRACK.len())
}

/// Composes a track image record by record.
pub struct TrackBuilder {
    cyl: u16,
    head: u16,
    buf: Vec<u8>
}

impl TrackBuilder {
    /// Start a track with its header only.  Used when recomposing a track
    /// whose records, R0 included, are supplied by the caller.
    pub fn bare(cyl: u16,head: u16) -> Self {
        Self {
            cyl,
            head,
            buf: TrackHeader::create(cyl,head).to_bytes()
        }
    }
    /// Start a track with its header and the conventional R0 control record.
    pub fn format(cyl: u16,head: u16) -> Self {
        let mut buf = TrackHeader::create(cyl,head).to_bytes();
        buf.append(&mut RecordHeader::create(cyl,head,0,0,R0_DATA_LEN as u16).to_bytes());
        buf.append(&mut vec![0;R0_DATA_LEN]);
        Self {
            cyl,
            head,
            buf
        }
    }
    pub fn add_record(&mut self,rec: u8,key: Option<&[u8]>,data: &[u8]) -> Result<(),DYNERR> {
        let klen = match key {
            Some(k) if k.len() > u8::MAX as usize => {
                error!("key of {} bytes exceeds the count field",k.len());
                return Err(Box::new(super::Error::TrackOverflow));
            },
            Some(k) => k.len() as u8,
            None => 0
        };
        if data.len() > u16::MAX as usize {
            error!("data of {} bytes exceeds the count field",data.len());
            return Err(Box::new(super::Error::TrackOverflow));
        }
        self.buf.append(&mut RecordHeader::create(self.cyl,self.head,rec,klen,data.len() as u16).to_bytes());
        if let Some(k) = key {
            self.buf.extend_from_slice(k);
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }
    /// Close with the end-of-track mark and pad with zeroes to the track length.
    pub fn seal(mut self,track_len: usize) -> Result<Vec<u8>,DYNERR> {
        self.buf.extend_from_slice(&END_OF_TRACK);
        if self.buf.len() > track_len {
            error!("{} bytes of records exceed the {} byte track",self.buf.len(),track_len);
            return Err(Box::new(super::Error::TrackOverflow));
        }
        self.buf.resize(track_len,0);
        Ok(self.buf)
    }
}

/// How many 4096-byte filler records fit in a track buffer alongside the
/// header, R0, and the end-of-track mark.  Flat and compressed layouts must
/// agree on this count so their Linux-format null tracks are identical.
pub fn linux_filler_count(track_len: usize) -> usize {
    let fixed = TRACK_HEADER_LEN + RECORD_HEADER_LEN + R0_DATA_LEN + END_OF_TRACK.len();
    match track_len > fixed {
        true => (track_len - fixed) / (RECORD_HEADER_LEN + LINUX_FILL_LEN),
        false => 0
    }
}

/// Synthesize the image of a never-written track.  `filler_recs` is consulted
/// only by the Linux format and gives the 4096-byte record count for the device.
pub fn null_track(cyl: u16,head: u16,fmt: NullFormat,track_len: usize,filler_recs: usize) -> Result<Vec<u8>,DYNERR> {
    let mut bld = TrackBuilder::format(cyl,head);
    match fmt {
        NullFormat::Basic => {},
        NullFormat::EmptyR1 => {
            bld.add_record(1,None,&[])?;
        },
        NullFormat::Linux => {
            let fill = vec![0;LINUX_FILL_LEN];
            for rec in 1..=filler_recs {
                bld.add_record(rec as u8,None,&fill)?;
            }
        }
    }
    bld.seal(track_len)
}
