//! ## Record access
//!
//! Keyed record operations against a `CkdVolume`.  Reads hand back views into
//! the resident track buffer rather than copies; a view is good only until the
//! next operation that can switch or rewrite the buffer.  All scans are linear
//! walks from the first record past the track header, the way the hardware
//! search commands worked.

use log::{debug,error};
use crate::img::track::{TrackBuilder,TrackCursor,RECORD_HEADER_LEN};
use crate::{STDRESULT,DYNERR};
use super::extents::{self,Extent};
use super::{CkdVolume,Error};

/// Borrowed view of one record.  Do not retain across volume operations.
pub struct Record<'a> {
    pub cyl: u16,
    pub head: u16,
    pub rec: u8,
    /// `None` for an unkeyed record (key length 0)
    pub key: Option<&'a [u8]>,
    pub data: &'a [u8]
}

/// Answer from a record lookup: either the record, or the end-of-track mark
/// was met first.  The latter is how catalog walkers learn there is no more
/// data, so it is a result, not an error.
pub enum Block<'a> {
    Record(Record<'a>),
    EndOfTrack
}

impl CkdVolume {
    /// Find a record on a track by record number.  The scan stops at the
    /// end-of-track mark; a number that never appears yields `EndOfTrack`.
    pub fn read_block(&mut self,cyl: usize,head: usize,rec: u8) -> Result<Block<'_>,DYNERR> {
        self.ensure_track(cyl,head)?;
        let mut curs = TrackCursor::new(&self.buf,cyl as u16,head as u16)?;
        while let Some(r) = curs.next()? {
            if r.rec == rec {
                return Ok(Block::Record(Record {
                    cyl: r.cyl,
                    head: r.head,
                    rec: r.rec,
                    key: r.key,
                    data: r.data
                }));
            }
        }
        Ok(Block::EndOfTrack)
    }
    /// Search every record of every track in the extent sequence for an exact
    /// key match, in extent order.  `None` means the key is nowhere in the
    /// allocation.  This is the catalog lookup primitive, where records are
    /// keyed by dataset name.
    pub fn search_key_equal(&mut self,key: &[u8],exts: &[Extent]) -> Result<Option<(u16,u16,u8)>,DYNERR> {
        let total = extents::total_tracks(exts,self.heads)?;
        for tt in 0..total {
            let (cyl,head) = extents::convert_relative_track(tt,exts,self.heads)?;
            self.ensure_track(cyl as usize,head as usize)?;
            let mut curs = TrackCursor::new(&self.buf,cyl,head)?;
            while let Some(r) = curs.next()? {
                if r.key == Some(key) {
                    debug!("key found at ({},{},{})",cyl,head,r.rec);
                    return Ok(Some((cyl,head,r.rec)));
                }
            }
        }
        Ok(None)
    }
    /// Rewrite a record's key and data in place.  The new dimensions must match
    /// the old exactly; changing a record's shape means rewriting the track.
    pub fn update_block(&mut self,cyl: usize,head: usize,rec: u8,key: Option<&[u8]>,data: &[u8]) -> STDRESULT {
        self.ensure_track(cyl,head)?;
        let mut found: Option<(usize,usize,usize)> = None;
        let mut curs = TrackCursor::new(&self.buf,cyl as u16,head as u16)?;
        while let Some(r) = curs.next()? {
            if r.rec == rec {
                found = Some((r.pos,r.key.map(|k| k.len()).unwrap_or(0),r.data.len()));
                break;
            }
        }
        match found {
            Some((pos,klen,dlen)) => {
                let new_klen = key.map(|k| k.len()).unwrap_or(0);
                if new_klen != klen || data.len() != dlen {
                    error!("record ({},{},{}) is {}+{} bytes, replacement is {}+{}",
                        cyl,head,rec,klen,dlen,new_klen,data.len());
                    return Err(Box::new(Error::RecordMismatch));
                }
                let key_start = pos + RECORD_HEADER_LEN;
                if let Some(k) = key {
                    self.buf[key_start..key_start+klen].copy_from_slice(k);
                }
                self.buf[key_start+klen..key_start+klen+dlen].copy_from_slice(data);
                self.dirty = true;
                Ok(())
            },
            None => Err(Box::new(Error::RecordNotFound))
        }
    }
    /// Write a record, replacing one with the same number or appending after
    /// the last.  The track is recomposed around the new record, so dimensions
    /// may change freely as long as the result fits the track.
    pub fn write_block(&mut self,cyl: usize,head: usize,rec: u8,key: Option<&[u8]>,data: &[u8]) -> STDRESULT {
        self.ensure_track(cyl,head)?;
        let mut kept: Vec<(u8,Option<Vec<u8>>,Vec<u8>)> = Vec::new();
        let mut curs = TrackCursor::new(&self.buf,cyl as u16,head as u16)?;
        while let Some(r) = curs.next()? {
            kept.push((r.rec,r.key.map(|k| k.to_vec()),r.data.to_vec()));
        }
        let mut bld = TrackBuilder::bare(cyl as u16,head as u16);
        let mut replaced = false;
        for (num,k,d) in &kept {
            match *num == rec {
                true => {
                    bld.add_record(rec,key,data)?;
                    replaced = true;
                },
                false => bld.add_record(*num,k.as_deref(),d)?
            }
        }
        if !replaced {
            bld.add_record(rec,key,data)?;
        }
        self.buf = bld.seal(self.track_len())?;
        self.dirty = true;
        Ok(())
    }
}
