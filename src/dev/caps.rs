//! ## Track capacity model
//!
//! How many bytes a record occupies on a physical track depends on the device
//! family.  The classic devices charge linear per-record overheads, with the
//! oldest of them scaling the key and data bytes by a rotational tolerance
//! factor.  The 3380/3390/9345 class instead counts whole cells of a fixed
//! size, reflecting real sector boundaries on the media.  Both families reduce
//! to: a record costs some whole number of units, and a track has a fixed
//! budget of units.
//!
//! Callers thread `new_used` from one call into the next call's `used` to walk
//! a track record by record; `used` is in the device's native units and should
//! not be interpreted beyond that.

use log::debug;
use super::ckdtab::CkdDevice;
use crate::DYNERR;

/// The capacity formula family of a device, with its constants.
pub enum Formula {
    /// a record costs `c1`, plus `c2` if keyed, plus the key and data bytes
    /// scaled by the tolerance factor `tol_num/tol_den`
    Linear { c1: usize, c2: usize, tol_num: usize, tol_den: usize },
    /// a record costs whole cells of `unit` bytes: `base` cells, plus
    /// `kbase` and the padded key cells if keyed, plus the padded data cells
    Interleaved { unit: usize, base: usize, kbase: usize, pad: usize }
}

/// Answer from one capacity query.
pub struct Capacity {
    /// the record fits in the remaining space of this track
    pub fits: bool,
    /// track units in use if the record is placed; thread into the next query
    pub new_used: usize,
    /// track units remaining if the record is placed
    pub balance: usize,
    /// physical track length in bytes
    pub physlen: usize,
    /// largest data length a single record may carry
    pub max_dlen: usize,
    /// records of these dimensions that fit on an empty track
    pub recs_per_track: usize,
    /// records of these dimensions that fit in an empty cylinder
    pub recs_per_cyl: usize
}

fn div_round_up(num: usize,den: usize) -> usize {
    (num + den - 1) / den
}

/// units one record occupies on a track of the given device
fn record_cost(dev: &CkdDevice,klen: usize,dlen: usize) -> usize {
    match &dev.formula {
        Formula::Linear { c1, c2, tol_num, tol_den } => {
            let keyed = match klen {
                0 => 0,
                _ => *c2
            };
            c1 + keyed + div_round_up((klen + dlen)*tol_num,*tol_den)
        },
        Formula::Interleaved { unit, base, kbase, pad } => {
            let keyed = match klen {
                0 => 0,
                _ => kbase + div_round_up(klen + pad,*unit)
            };
            base + keyed + div_round_up(dlen + pad,*unit)
        }
    }
}

/// track budget in the device's native units
fn track_budget(dev: &CkdDevice) -> usize {
    match &dev.formula {
        Formula::Linear {..} => dev.trklen,
        Formula::Interleaved { unit, .. } => dev.trklen / unit
    }
}

/// Ask whether a record of the given key and data lengths fits on a track with
/// `used` units already occupied.  A record that cannot fit even on an empty
/// track is the hard error `RecordTooLarge`; `fits == false` only ever means
/// the caller should move to the next track.
pub fn capacity(dev: &CkdDevice,used: usize,klen: usize,dlen: usize) -> Result<Capacity,DYNERR> {
    if dlen > dev.max_dlen {
        debug!("data length {} exceeds the {} limit of {}",dlen,dev.name,dev.max_dlen);
        return Err(Box::new(super::Error::RecordTooLarge));
    }
    let cost = record_cost(dev,klen,dlen);
    let budget = track_budget(dev);
    if cost > budget {
        debug!("record of {} units can never fit in the {} unit track",cost,budget);
        return Err(Box::new(super::Error::RecordTooLarge));
    }
    let new_used = used + cost;
    let recs_per_track = budget / cost;
    Ok(Capacity {
        fits: new_used <= budget,
        new_used,
        balance: budget.saturating_sub(new_used),
        physlen: dev.trklen,
        max_dlen: dev.max_dlen,
        recs_per_track,
        recs_per_cyl: recs_per_track * dev.heads
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::ckdtab;

    /// fill a track with records of fixed dimensions by threading `new_used`
    fn fill_track(dev: &CkdDevice,klen: usize,dlen: usize) -> usize {
        let mut used = 0;
        let mut count = 0;
        loop {
            let cap = capacity(dev,used,klen,dlen).expect("capacity failed");
            if !cap.fits {
                return count;
            }
            used = cap.new_used;
            count += 1;
        }
    }

    #[test]
    fn published_4k_records_per_track() {
        assert_eq!(capacity(&ckdtab::D3390,0,0,4096).expect("capacity failed").recs_per_track,12);
        assert_eq!(capacity(&ckdtab::D3380,0,0,4096).expect("capacity failed").recs_per_track,10);
        assert_eq!(capacity(&ckdtab::D9345,0,0,4096).expect("capacity failed").recs_per_track,10);
    }

    #[test]
    fn threading_matches_bulk_count() {
        for dev in [&ckdtab::D3390,&ckdtab::D3380,&ckdtab::D3350,&ckdtab::D3330,&ckdtab::D2314] {
            let bulk = capacity(dev,0,0,800).expect("capacity failed").recs_per_track;
            assert_eq!(fill_track(dev,0,800),bulk);
        }
    }

    #[test]
    fn keyed_records_cost_more() {
        for dev in [&ckdtab::D3390,&ckdtab::D3380,&ckdtab::D3330,&ckdtab::D2311] {
            let unkeyed = capacity(dev,0,0,1000).expect("capacity failed").new_used;
            let keyed = capacity(dev,0,8,1000).expect("capacity failed").new_used;
            assert!(keyed > unkeyed);
        }
    }

    #[test]
    fn max_record_exactly_fills_3380() {
        // the 3380 limit is exactly the formula's empty track capacity
        let cap = capacity(&ckdtab::D3380,0,0,47476).expect("capacity failed");
        assert!(cap.fits);
        assert_eq!(cap.balance,0);
        assert_eq!(cap.recs_per_track,1);
    }

    #[test]
    fn oversize_record_is_a_hard_error() {
        assert!(capacity(&ckdtab::D3390,0,0,56665).is_err());
        assert!(capacity(&ckdtab::D2311,0,0,4096).is_err());
    }

    #[test]
    fn full_track_stops_fitting() {
        let dev = &ckdtab::D3330;
        let one = capacity(dev,0,0,4096).expect("capacity failed");
        assert!(one.fits);
        assert_eq!(one.recs_per_track,3);
        let mut used = one.new_used;
        used = capacity(dev,used,0,4096).expect("capacity failed").new_used;
        used = capacity(dev,used,0,4096).expect("capacity failed").new_used;
        assert!(!capacity(dev,used,0,4096).expect("capacity failed").fits);
    }

    #[test]
    fn tolerance_factor_scales_2311() {
        // 537/512 of 1000 bytes, rounded up, plus the 61 byte overhead
        let cap = capacity(&ckdtab::D2311,0,0,1000).expect("capacity failed");
        assert_eq!(cap.new_used,61 + 1049);
    }
}
