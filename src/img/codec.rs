//! ## Stored track codec
//!
//! Compressed layouts prefix every stored track payload with a one-byte
//! compression code.  This module round-trips payloads through the codec the
//! code names.  The 5-byte track header is never part of the payload handed
//! here; containers split it off first.  The numeric code values are fixed by
//! the existing image ecosystem and must not be renumbered.

use std::fmt;
use std::str::FromStr;
use std::io::{Read,Write};
use num_traits::FromPrimitive;
use num_derive::FromPrimitive;
use log::{debug,error};
use crate::DYNERR;

/// Compression code stored in the first byte of a track payload.
#[derive(FromPrimitive,PartialEq,Eq,Clone,Copy,Debug)]
pub enum Compression {
    None = 0,
    Zlib = 1,
    Bzip2 = 2
}

impl fmt::Display for Compression {
    fn fmt(&self,f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f,"none"),
            Self::Zlib => write!(f,"zlib"),
            Self::Bzip2 => write!(f,"bzip2")
        }
    }
}

/// match command line or option argument to a compression code
impl FromStr for Compression {
    type Err = super::Error;
    fn from_str(s: &str) -> Result<Self,Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "zlib" => Ok(Self::Zlib),
            "bzip2" => Ok(Self::Bzip2),
            _ => Err(super::Error::Compression)
        }
    }
}

/// Compress a track payload.  `parm` is the codec level, 1-9; out of range
/// values are clamped.  `Compression::None` copies.
pub fn compress(alg: Compression,parm: u16,dat: &[u8]) -> Result<Vec<u8>,DYNERR> {
    let level = match parm {
        0 => 1,
        p if p > 9 => 9,
        p => p
    } as u32;
    match alg {
        Compression::None => Ok(dat.to_vec()),
        Compression::Zlib => {
            let mut enc = flate2::write::ZlibEncoder::new(Vec::new(),flate2::Compression::new(level));
            enc.write_all(dat)?;
            Ok(enc.finish()?)
        },
        Compression::Bzip2 => {
            let mut enc = bzip2::write::BzEncoder::new(Vec::new(),bzip2::Compression::new(level));
            enc.write_all(dat)?;
            Ok(enc.finish()?)
        }
    }
}

/// Restore a track payload given the stored compression code byte.
/// The answer is always exactly `max_len` bytes: the output buffer is cleared
/// first, so a short payload comes back zero filled, never with leftover
/// memory content.  A payload that restores to more than `max_len` bytes, a
/// codec failure, or an unknown code byte are all distinct errors; none of
/// them can be confused with an unformatted track.
pub fn uncompress(code: u8,dat: &[u8],max_len: usize) -> Result<Vec<u8>,DYNERR> {
    let alg = match Compression::from_u8(code) {
        Some(a) => a,
        None => {
            error!("compression code {} is not recognized",code);
            return Err(Box::new(super::Error::Compression));
        }
    };
    let mut ans: Vec<u8> = vec![0;max_len];
    match alg {
        Compression::None => {
            let count = usize::min(dat.len(),max_len);
            ans[0..count].copy_from_slice(&dat[0..count]);
            Ok(ans)
        },
        Compression::Zlib => {
            let mut dec = flate2::read::ZlibDecoder::new(dat);
            let mut out: Vec<u8> = Vec::new();
            if let Err(e) = dec.read_to_end(&mut out) {
                debug!("zlib failure, payload began {}",hex::encode(&dat[0..usize::min(dat.len(),8)]));
                error!("zlib could not restore track: {}",e);
                return Err(Box::new(super::Error::CompressedTrack));
            }
            if out.len() > max_len {
                error!("zlib track restored to {} bytes, limit {}",out.len(),max_len);
                return Err(Box::new(super::Error::CompressedTrack));
            }
            ans[0..out.len()].copy_from_slice(&out);
            Ok(ans)
        },
        Compression::Bzip2 => {
            let mut dec = bzip2::read::BzDecoder::new(dat);
            let mut out: Vec<u8> = Vec::new();
            if let Err(e) = dec.read_to_end(&mut out) {
                debug!("bzip2 failure, payload began {}",hex::encode(&dat[0..usize::min(dat.len(),8)]));
                error!("bzip2 could not restore track: {}",e);
                return Err(Box::new(super::Error::CompressedTrack));
            }
            if out.len() > max_len {
                error!("bzip2 track restored to {} bytes, limit {}",out.len(),max_len);
                return Err(Box::new(super::Error::CompressedTrack));
            }
            ans[0..out.len()].copy_from_slice(&out);
            Ok(ans)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        let mut dat: Vec<u8> = Vec::new();
        for i in 0..2000 {
            dat.push((i % 251) as u8);
        }
        dat
    }

    #[test]
    fn round_trips() {
        let dat = sample();
        for alg in [Compression::None,Compression::Zlib,Compression::Bzip2] {
            let stored = compress(alg,4,&dat).expect("compress failed");
            let back = uncompress(alg as u8,&stored,dat.len()).expect("uncompress failed");
            assert_eq!(back,dat);
        }
    }

    #[test]
    fn short_payload_zero_fills() {
        let dat = vec![0xAB;100];
        let back = uncompress(Compression::None as u8,&dat,256).expect("uncompress failed");
        assert_eq!(back[0..100],dat[..]);
        assert_eq!(back[100..256],[0;156]);
    }

    #[test]
    fn bad_code_is_an_error() {
        assert!(uncompress(0x83,&[0;16],256).is_err());
    }

    #[test]
    fn corrupt_stream_is_an_error() {
        let dat = sample();
        let mut stored = compress(Compression::Zlib,4,&dat).expect("compress failed");
        let n = stored.len();
        stored[n/2] ^= 0xFF;
        stored.truncate(n-4);
        assert!(uncompress(Compression::Zlib as u8,&stored,dat.len()).is_err());
    }
}
