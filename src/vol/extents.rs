//! ## Extent translation
//!
//! A dataset's allocation is an ordered sequence of extents, each a contiguous
//! run of tracks bounded by a begin and end cylinder/head.  Dataset-relative
//! track numbers count through the sequence in order; these functions translate
//! between that relative numbering and absolute volume addresses.  An address
//! outside the sequence is a hard error, not a retryable condition.

use log::error;
use crate::DYNERR;

/// One contiguous allocation of tracks.
#[derive(Clone,Copy,PartialEq,Eq,Debug)]
pub struct Extent {
    /// extent type tag as carried in the catalog
    pub xttype: u8,
    /// sequence number within the dataset
    pub seqno: u8,
    pub begin_cyl: u16,
    pub begin_head: u16,
    pub end_cyl: u16,
    pub end_head: u16
}

impl Extent {
    pub fn new(begin: (u16,u16),end: (u16,u16)) -> Self {
        Self {
            xttype: 1,
            seqno: 0,
            begin_cyl: begin.0,
            begin_head: begin.1,
            end_cyl: end.0,
            end_head: end.1
        }
    }
    fn first_track(&self,heads: usize) -> usize {
        self.begin_cyl as usize * heads + self.begin_head as usize
    }
    fn last_track(&self,heads: usize) -> usize {
        self.end_cyl as usize * heads + self.end_head as usize
    }
    /// tracks in the extent, or an error for an inverted or degenerate range
    pub fn track_count(&self,heads: usize) -> Result<usize,DYNERR> {
        let (first,last) = (self.first_track(heads),self.last_track(heads));
        if last < first || self.begin_head as usize >= heads || self.end_head as usize >= heads {
            error!("extent ({},{})-({},{}) is not a valid range",
                self.begin_cyl,self.begin_head,self.end_cyl,self.end_head);
            return Err(Box::new(super::Error::OutOfExtent));
        }
        Ok(last - first + 1)
    }
}

/// Translate a dataset-relative track number to an absolute cylinder and head,
/// walking the extent sequence in order.
pub fn convert_relative_track(tt: usize,extents: &[Extent],heads: usize) -> Result<(u16,u16),DYNERR> {
    let mut remaining = tt;
    for ext in extents {
        let count = ext.track_count(heads)?;
        if remaining < count {
            let abs = ext.first_track(heads) + remaining;
            return Ok(((abs/heads) as u16,(abs%heads) as u16));
        }
        remaining -= count;
    }
    error!("relative track {} lies beyond the extent sequence",tt);
    Err(Box::new(super::Error::OutOfExtent))
}

/// The inverse of `convert_relative_track`: find the extent containing the
/// absolute address and sum the preceding extents' track counts.
pub fn calculate_relative_track(cyl: u16,head: u16,heads: usize,extents: &[Extent]) -> Result<usize,DYNERR> {
    if head as usize >= heads {
        return Err(Box::new(super::Error::OutOfRange));
    }
    let abs = cyl as usize * heads + head as usize;
    let mut preceding = 0;
    for ext in extents {
        let count = ext.track_count(heads)?;
        let first = ext.first_track(heads);
        if abs >= first && abs < first + count {
            return Ok(preceding + abs - first);
        }
        preceding += count;
    }
    error!("({},{}) lies in no extent of the sequence",cyl,head);
    Err(Box::new(super::Error::OutOfExtent))
}

/// total tracks in an extent sequence
pub fn total_tracks(extents: &[Extent],heads: usize) -> Result<usize,DYNERR> {
    let mut total = 0;
    for ext in extents {
        total += ext.track_count(heads)?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_extents() -> Vec<Extent> {
        vec![
            Extent::new((0,0),(0,9)),
            Extent::new((1,0),(1,4))
        ]
    }

    #[test]
    fn second_extent_begins_at_its_first_track() {
        // first extent holds tracks 0..9, so relative track 10 starts the second
        assert_eq!(convert_relative_track(10,&two_extents(),10).expect("translate failed"),(1,0));
    }

    #[test]
    fn bijection_over_all_tracks() {
        let extents = vec![
            Extent::new((3,5),(4,2)),
            Extent::new((0,0),(0,9)),
            Extent::new((7,0),(7,0))
        ];
        let heads = 10;
        let total = total_tracks(&extents,heads).expect("count failed");
        assert_eq!(total,8+10+1);
        for tt in 0..total {
            let (cyl,head) = convert_relative_track(tt,&extents,heads).expect("translate failed");
            assert!((head as usize) < heads);
            assert_eq!(calculate_relative_track(cyl,head,heads,&extents).expect("inverse failed"),tt);
        }
    }

    #[test]
    fn past_the_end_is_an_error() {
        let extents = two_extents();
        assert!(convert_relative_track(14,&extents,10).is_ok());
        assert!(convert_relative_track(15,&extents,10).is_err());
    }

    #[test]
    fn unallocated_address_is_an_error() {
        assert!(calculate_relative_track(2,0,10,&two_extents()).is_err());
    }

    #[test]
    fn inverted_extent_is_an_error() {
        let bad = vec![Extent::new((5,0),(4,9))];
        assert!(convert_relative_track(0,&bad,10).is_err());
    }
}
