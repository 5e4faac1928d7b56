//! # Volume Module
//!
//! A volume object imposes record or block semantics on an owned `DasdImage`.
//! When a volume is created it takes ownership of the image and uses it as
//! storage, keeping exactly one track (or block group) resident in its buffer.
//! Record mutations mark the buffer dirty; the buffer is flushed before another
//! track is loaded and when the volume is closed.  This single resident track
//! is the central simplifying invariant: there is never a second buffer to
//! reconcile.
//!
//! Callers needing the same underlying file from several places must arrange
//! their own locking; a volume assumes exclusive ownership of the image for
//! its lifetime.

pub mod extents;
pub mod records;
pub mod init;

use log::{trace,info,warn,error};
use crate::img::DasdImage;
use crate::{DasdCtx,STDRESULT,DYNERR};

/// Enumerates volume errors.  The `Display` trait will print equivalent long message.
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("address is outside the allocated extents")]
    OutOfExtent,
    #[error("address is outside the volume geometry")]
    OutOfRange,
    #[error("record was not found")]
    RecordNotFound,
    #[error("volume serial is invalid")]
    BadVolumeSerial,
    #[error("replacement does not match the record dimensions")]
    RecordMismatch,
    #[error("buffer is not one block")]
    BadBlockLength
}

/// Count-key-data volume with one resident track.
pub struct CkdVolume {
    img: Box<dyn DasdImage>,
    devnum: u32,
    heads: usize,
    cylinders: usize,
    trksize: usize,
    buf: Vec<u8>,
    /// cylinder and head now in the buffer, `None` when nothing is loaded
    resident: Option<(usize,usize)>,
    dirty: bool
}

impl CkdVolume {
    /// Impose CKD volume semantics on an image, taking ownership of it.
    pub fn from_img(img: Box<dyn DasdImage>,ctx: &mut DasdCtx) -> Result<Self,DYNERR> {
        if !img.what_am_i().is_ckd() {
            return Err(Box::new(crate::img::Error::ImageTypeMismatch));
        }
        let devnum = ctx.assign_devnum();
        info!("volume {:04X}: {} cylinders of {} tracks",devnum,img.cylinders(),img.heads());
        Ok(Self {
            devnum,
            heads: img.heads(),
            cylinders: img.cylinders(),
            trksize: img.track_len(),
            img,
            buf: Vec::new(),
            resident: None,
            dirty: false
        })
    }
    pub fn devnum(&self) -> u32 {
        self.devnum
    }
    pub fn heads(&self) -> usize {
        self.heads
    }
    pub fn cylinders(&self) -> usize {
        self.cylinders
    }
    pub fn track_len(&self) -> usize {
        self.trksize
    }
    pub fn devtype(&self) -> u8 {
        self.img.devtype()
    }
    pub fn get_metadata(&self,indent: Option<u16>) -> String {
        self.img.get_metadata(indent)
    }
    fn track_number(&self,cyl: usize,head: usize) -> Result<usize,DYNERR> {
        if cyl >= self.cylinders || head >= self.heads {
            error!("({},{}) is outside the volume geometry",cyl,head);
            return Err(Box::new(Error::OutOfRange));
        }
        Ok(cyl*self.heads + head)
    }
    /// Make the given track resident.  A hit on the already resident track does
    /// nothing; otherwise a dirty buffer is flushed before the switch.
    fn ensure_track(&mut self,cyl: usize,head: usize) -> STDRESULT {
        if self.resident == Some((cyl,head)) {
            return Ok(());
        }
        let track = self.track_number(cyl,head)?;
        self.flush_buf()?;
        trace!("switch buffer to ({},{})",cyl,head);
        self.buf = self.img.load_track(track)?;
        self.resident = Some((cyl,head));
        Ok(())
    }
    /// Write the buffer back to the image if it is dirty.
    fn flush_buf(&mut self) -> STDRESULT {
        if self.dirty {
            if let Some((cyl,head)) = self.resident {
                let track = cyl*self.heads + head;
                self.img.store_track(track,&self.buf)?;
            }
            self.dirty = false;
        }
        Ok(())
    }
    /// Get the full image of a track, loading it if it is not resident.
    /// The view is invalidated by the next track operation.
    pub fn read_track(&mut self,cyl: usize,head: usize) -> Result<&[u8],DYNERR> {
        self.ensure_track(cyl,head)?;
        Ok(&self.buf)
    }
    /// Replace the image of a track wholesale.  The buffer must be a full track
    /// addressed to the given cylinder and head; it is flushed immediately.
    pub fn write_track(&mut self,cyl: usize,head: usize,buf: &[u8]) -> STDRESULT {
        let track = self.track_number(cyl,head)?;
        if self.resident == Some((cyl,head)) {
            self.resident = None;
            self.dirty = false;
        }
        self.img.store_track(track,buf)
    }
    /// Flush any dirty buffer without giving up the volume.
    pub fn sync(&mut self) -> STDRESULT {
        self.flush_buf()?;
        self.img.flush()
    }
    /// Flush and release the volume.
    pub fn close(mut self) -> STDRESULT {
        self.flush_buf()?;
        self.img.flush()
    }
}

impl Drop for CkdVolume {
    fn drop(&mut self) {
        if let Err(e) = self.flush_buf().and_then(|_| self.img.flush()) {
            warn!("volume {:04X} dropped with unsaved state: {}",self.devnum,e);
        }
    }
}

/// Fixed block volume with one resident block group.
pub struct FbaVolume {
    img: Box<dyn DasdImage>,
    devnum: u32,
    block_len: usize,
    group_blocks: usize,
    total_blocks: usize,
    buf: Vec<u8>,
    resident: Option<usize>,
    dirty: bool
}

impl FbaVolume {
    /// Impose FBA volume semantics on an image, taking ownership of it.
    pub fn from_img(img: Box<dyn DasdImage>,ctx: &mut DasdCtx) -> Result<Self,DYNERR> {
        if img.what_am_i().is_ckd() {
            return Err(Box::new(crate::img::Error::ImageTypeMismatch));
        }
        let block_len = img.block_len();
        let group_blocks = (img.track_len() - crate::img::track::TRACK_HEADER_LEN) / block_len;
        let devnum = ctx.assign_devnum();
        info!("volume {:04X}: {} blocks in groups of {}",devnum,img.blocks(),group_blocks);
        Ok(Self {
            devnum,
            block_len,
            group_blocks,
            total_blocks: img.blocks(),
            img,
            buf: Vec::new(),
            resident: None,
            dirty: false
        })
    }
    pub fn devnum(&self) -> u32 {
        self.devnum
    }
    pub fn blocks(&self) -> usize {
        self.total_blocks
    }
    pub fn block_len(&self) -> usize {
        self.block_len
    }
    pub fn devtype(&self) -> u8 {
        self.img.devtype()
    }
    pub fn get_metadata(&self,indent: Option<u16>) -> String {
        self.img.get_metadata(indent)
    }
    fn ensure_group(&mut self,group: usize) -> STDRESULT {
        if self.resident == Some(group) {
            return Ok(());
        }
        self.flush_buf()?;
        trace!("switch buffer to group {}",group);
        self.buf = self.img.load_track(group)?;
        self.resident = Some(group);
        Ok(())
    }
    fn flush_buf(&mut self) -> STDRESULT {
        if self.dirty {
            if let Some(group) = self.resident {
                self.img.store_track(group,&self.buf)?;
            }
            self.dirty = false;
        }
        Ok(())
    }
    fn locate(&self,block: usize) -> Result<(usize,usize),DYNERR> {
        if block >= self.total_blocks {
            error!("block {} is outside the {} block volume",block,self.total_blocks);
            return Err(Box::new(Error::OutOfRange));
        }
        let offset = crate::img::track::TRACK_HEADER_LEN + (block % self.group_blocks)*self.block_len;
        Ok((block / self.group_blocks,offset))
    }
    /// Get one block.  The view is invalidated by the next block operation.
    pub fn read_sector(&mut self,block: usize) -> Result<&[u8],DYNERR> {
        let (group,offset) = self.locate(block)?;
        self.ensure_group(group)?;
        Ok(&self.buf[offset..offset+self.block_len])
    }
    /// Replace one block.  The buffer must be exactly one block long.
    pub fn write_sector(&mut self,block: usize,dat: &[u8]) -> STDRESULT {
        if dat.len() != self.block_len {
            error!("got {} bytes, a block is {}",dat.len(),self.block_len);
            return Err(Box::new(Error::BadBlockLength));
        }
        let (group,offset) = self.locate(block)?;
        self.ensure_group(group)?;
        self.buf[offset..offset+self.block_len].copy_from_slice(dat);
        self.dirty = true;
        Ok(())
    }
    /// Flush and release the volume.
    pub fn close(mut self) -> STDRESULT {
        self.flush_buf()?;
        self.img.flush()
    }
}

impl Drop for FbaVolume {
    fn drop(&mut self) {
        if let Err(e) = self.flush_buf().and_then(|_| self.img.flush()) {
            warn!("volume {:04X} dropped with unsaved state: {}",self.devnum,e);
        }
    }
}
