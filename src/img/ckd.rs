//! ## Support for flat CKD images
//!
//! Flat images are a simple sequential dump of fully formatted track images
//! behind the device header.  Every track exists on disk, so there is no null
//! track synthesis here.  A volume too large for one host file is split across
//! sequenced files named `name_1`, `name_2`, ...; the device header of each
//! carries its file sequence and high cylinder, and the split is invisible to
//! callers, who keep using volume-relative track numbers.

use std::io::{Read,Write,Seek,SeekFrom};
use std::fs::File;
use log::{trace,debug,error};
use a2kit_macro::DiskStruct;
use crate::img;
use crate::img::{DeviceHeader,DEVICE_HEADER_LEN};
use crate::img::track::{self,NullFormat,TrackHeader,TRACK_HEADER_LEN};
use crate::{STDRESULT,DYNERR};

/// One host file of a possibly split volume.
struct Segment {
    file: File,
    /// first cylinder stored in this file
    low_cyl: usize,
    /// cylinders stored in this file
    cyls: usize
}

/// Wrapper for flat CKD data.
pub struct Ckd {
    devtype: u8,
    heads: usize,
    trksize: usize,
    cylinders: usize,
    segments: Vec<Segment>
}

/// Break a path into (stem,extension) so sequence numbers can be edited in.
fn split_path(img_path: &str) -> (String,String) {
    let patt = regex::Regex::new(r"^(.+)(\.[^./\\]+)$").expect("unreachable");
    match patt.captures(img_path) {
        Some(caps) => (caps[1].to_string(),caps[2].to_string()),
        None => (img_path.to_string(),"".to_string())
    }
}

/// Path of the file holding sequence number `seq` (1-based) of a split volume.
fn segment_path(img_path: &str,seq: usize) -> String {
    let (stem,ext) = split_path(img_path);
    let patt = regex::Regex::new(r"^(.+)_[0-9]+$").expect("unreachable");
    match patt.captures(&stem) {
        Some(caps) => format!("{}_{}{}",&caps[1],seq,ext),
        None => format!("{}_{}{}",stem,seq,ext)
    }
}

fn open_segment(img_path: &str,heads: usize,trksize: usize) -> Result<(DeviceHeader,Segment),DYNERR> {
    let mut file = File::options().read(true).write(true).open(img_path)?;
    let mut buf: Vec<u8> = vec![0;DEVICE_HEADER_LEN];
    file.read_exact(&mut buf)?;
    let header = DeviceHeader::from_bytes(&buf)?;
    if header.image_type()? != img::DasdImageType::CkdFlat {
        return Err(Box::new(img::Error::ImageTypeMismatch));
    }
    let (seg_heads,seg_trksize) = header.geometry()?;
    if heads>0 && (seg_heads!=heads || seg_trksize!=trksize) {
        error!("segment {} geometry {}x{} does not match the volume",img_path,seg_heads,seg_trksize);
        return Err(Box::new(img::Error::GeometryMismatch));
    }
    let cyl_bytes = file.metadata()?.len() as usize - DEVICE_HEADER_LEN;
    if cyl_bytes % (seg_heads*seg_trksize) != 0 {
        error!("size of {} is not a whole number of cylinders",img_path);
        return Err(Box::new(img::Error::ImageSizeMismatch));
    }
    let cyls = cyl_bytes / (seg_heads*seg_trksize);
    Ok((header,Segment {
        file,
        low_cyl: 0,
        cyls
    }))
}

impl Ckd {
    /// Open a flat image.  For a split volume, pass the first file (`name_1`);
    /// the remaining segments are located and opened from it.
    pub fn open(img_path: &str) -> Result<Self,DYNERR> {
        let (header,mut segment) = open_segment(img_path,0,0)?;
        let (heads,trksize) = header.geometry()?;
        let devtype = header.devtype;
        let mut segments: Vec<Segment> = Vec::new();
        if header.fileseq == 0 {
            let cylinders = segment.cyls;
            segments.push(segment);
            return Ok(Self {
                devtype,
                heads,
                trksize,
                cylinders,
                segments
            });
        }
        if header.fileseq != 1 {
            error!("split volume must be opened through its first file, this is file {}",header.fileseq);
            return Err(Box::new(img::Error::ImageTypeMismatch));
        }
        let mut cylinders = 0;
        let mut high_cyl = header.high_cylinder();
        loop {
            segment.low_cyl = cylinders;
            cylinders += segment.cyls;
            segments.push(segment);
            if high_cyl == 0 {
                break;
            }
            if cylinders != high_cyl as usize + 1 {
                error!("segment boundary at cylinder {} does not match the header's {}",cylinders,high_cyl);
                return Err(Box::new(img::Error::ImageSizeMismatch));
            }
            let next_path = segment_path(img_path,segments.len()+1);
            debug!("opening segment {}",next_path);
            let (next_header,next_segment) = open_segment(&next_path,heads,trksize)?;
            if next_header.fileseq as usize != segments.len()+1 {
                error!("segment {} carries sequence {}",next_path,next_header.fileseq);
                return Err(Box::new(img::Error::ImageSizeMismatch));
            }
            high_cyl = next_header.high_cylinder();
            segment = next_segment;
        }
        Ok(Self {
            devtype,
            heads,
            trksize,
            cylinders,
            segments
        })
    }
    /// Create a flat image with every track formatted per the null format.
    /// Output splits into sequenced files when it would exceed `max_file_size`.
    pub fn create(img_path: &str,devtype: u8,heads: usize,trksize: usize,cylinders: usize,
        fmt: NullFormat,filler_recs: usize,max_file_size: u64) -> Result<Self,DYNERR> {
        if heads==0 || cylinders==0 || trksize<TRACK_HEADER_LEN+track::END_OF_TRACK.len() {
            return Err(Box::new(img::Error::GeometryMismatch));
        }
        let cyl_bytes = (heads*trksize) as u64;
        let mut cyls_per_file = match max_file_size > DEVICE_HEADER_LEN as u64 {
            true => ((max_file_size - DEVICE_HEADER_LEN as u64) / cyl_bytes) as usize,
            false => 0
        };
        if cyls_per_file == 0 {
            cyls_per_file = 1;
        }
        let nfiles = (cylinders + cyls_per_file - 1) / cyls_per_file;
        let mut segments: Vec<Segment> = Vec::new();
        for seq in 0..nfiles {
            let low_cyl = seq * cyls_per_file;
            let cyls = usize::min(cyls_per_file,cylinders-low_cyl);
            let seg_path = match nfiles {
                1 => img_path.to_string(),
                _ => segment_path(img_path,seq+1)
            };
            let mut file = File::options().read(true).write(true).create(true).truncate(true).open(&seg_path)?;
            let mut header = DeviceHeader::create(img::DasdImageType::CkdFlat,heads as u32,trksize as u32,devtype);
            if nfiles > 1 {
                let highcyl = match seq+1==nfiles {
                    true => 0,
                    false => (low_cyl+cyls-1) as u16
                };
                header.set_sequence((seq+1) as u8,highcyl);
            }
            let mut out = std::io::BufWriter::new(&mut file);
            out.write_all(&header.to_bytes())?;
            for cyl in low_cyl..low_cyl+cyls {
                for head in 0..heads {
                    let trk = track::null_track(cyl as u16,head as u16,fmt,trksize,filler_recs)?;
                    out.write_all(&trk)?;
                }
            }
            out.flush()?;
            drop(out);
            segments.push(Segment {
                file,
                low_cyl,
                cyls
            });
        }
        Ok(Self {
            devtype,
            heads,
            trksize,
            cylinders,
            segments
        })
    }
    /// Locate the segment and byte offset of a track.
    fn locate(&mut self,track: usize) -> Result<(usize,u64),DYNERR> {
        if track >= self.cylinders*self.heads {
            error!("track {} exceeds the {} cylinder geometry",track,self.cylinders);
            return Err(Box::new(img::Error::GeometryMismatch));
        }
        let cyl = track / self.heads;
        for i in 0..self.segments.len() {
            let seg = &self.segments[i];
            if cyl >= seg.low_cyl && cyl < seg.low_cyl + seg.cyls {
                let offset = DEVICE_HEADER_LEN as u64 + ((track - seg.low_cyl*self.heads)*self.trksize) as u64;
                return Ok((i,offset));
            }
        }
        error!("no segment holds cylinder {}",cyl);
        Err(Box::new(img::Error::ImageSizeMismatch))
    }
}

impl img::DasdImage for Ckd {
    fn what_am_i(&self) -> img::DasdImageType {
        img::DasdImageType::CkdFlat
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
    fn load_track(&mut self,track: usize) -> Result<Vec<u8>,DYNERR> {
        trace!("load track {}",track);
        let (i,offset) = self.locate(track)?;
        let mut buf: Vec<u8> = vec![0;self.trksize];
        self.segments[i].file.seek(SeekFrom::Start(offset))?;
        self.segments[i].file.read_exact(&mut buf)?;
        let header = TrackHeader::from_bytes(&buf[0..TRACK_HEADER_LEN])?;
        if header.bin != 0 || header.cyl() as usize != track/self.heads || header.head() as usize != track%self.heads {
            error!("stored track header ({},{}) does not match track {}",header.cyl(),header.head(),track);
            return Err(Box::new(img::Error::CorruptTrack));
        }
        Ok(buf)
    }
    fn store_track(&mut self,track: usize,buf: &[u8]) -> STDRESULT {
        trace!("store track {}",track);
        if buf.len() != self.trksize {
            return Err(Box::new(img::Error::ImageSizeMismatch));
        }
        let header = TrackHeader::from_bytes(&buf[0..TRACK_HEADER_LEN])?;
        if header.cyl() as usize != track/self.heads || header.head() as usize != track%self.heads {
            error!("buffer addressed ({},{}) cannot store at track {}",header.cyl(),header.head(),track);
            return Err(Box::new(img::Error::GeometryMismatch));
        }
        let (i,offset) = self.locate(track)?;
        self.segments[i].file.seek(SeekFrom::Start(offset))?;
        self.segments[i].file.write_all(buf)?;
        Ok(())
    }
    fn flush(&mut self) -> STDRESULT {
        for seg in &mut self.segments {
            seg.file.flush()?;
        }
        Ok(())
    }
    fn get_metadata(&self,indent: Option<u16>) -> String {
        let mut root = json::JsonValue::new_object();
        let typ = self.what_am_i().to_string();
        root[&typ] = json::JsonValue::new_object();
        root[&typ]["devtype"] = json::JsonValue::String(format!("{:02X}",self.devtype));
        root[&typ]["heads"] = json::JsonValue::Number(self.heads.into());
        root[&typ]["track_size"] = json::JsonValue::Number(self.trksize.into());
        root[&typ]["cylinders"] = json::JsonValue::Number(self.cylinders.into());
        root[&typ]["files"] = json::JsonValue::Number(self.segments.len().into());
        if let Some(spaces) = indent {
            json::stringify_pretty(root,spaces)
        } else {
            json::stringify(root)
        }
    }
}
