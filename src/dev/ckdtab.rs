//! ## CKD device characteristics
//!
//! One entry per supported device model.  The `trklen` and formula constants
//! reproduce the published space arithmetic for each device; downstream
//! consumers populate catalog self-descriptor fields from them, so they must
//! not be adjusted to taste.  Larger models of a device differ only in
//! cylinder count.

use log::debug;
use super::caps::Formula;
use crate::DYNERR;

/// Characteristics of one CKD device model.
pub struct CkdDevice {
    pub name: &'static str,
    /// device type byte written into the image header
    pub devtype: u8,
    pub heads: usize,
    /// standard cylinder count for the model
    pub cyls: usize,
    /// physical track capacity in bytes
    pub trklen: usize,
    /// largest data length a single record may carry
    pub max_dlen: usize,
    pub formula: Formula
}

pub const D2311: CkdDevice = CkdDevice {
    name: "2311",
    devtype: 0x11,
    heads: 10,
    cyls: 200,
    trklen: 3625,
    max_dlen: 3625,
    formula: Formula::Linear { c1: 61, c2: 20, tol_num: 537, tol_den: 512 }
};

pub const D2314: CkdDevice = CkdDevice {
    name: "2314",
    devtype: 0x14,
    heads: 20,
    cyls: 200,
    trklen: 7294,
    max_dlen: 7294,
    formula: Formula::Linear { c1: 101, c2: 45, tol_num: 534, tol_den: 512 }
};

pub const D3330: CkdDevice = CkdDevice {
    name: "3330",
    devtype: 0x30,
    heads: 19,
    cyls: 404,
    trklen: 13030,
    max_dlen: 13030,
    formula: Formula::Linear { c1: 135, c2: 56, tol_num: 1, tol_den: 1 }
};

pub const D3330_11: CkdDevice = CkdDevice {
    name: "3330-11",
    devtype: 0x30,
    heads: 19,
    cyls: 808,
    trklen: 13030,
    max_dlen: 13030,
    formula: Formula::Linear { c1: 135, c2: 56, tol_num: 1, tol_den: 1 }
};

pub const D3340: CkdDevice = CkdDevice {
    name: "3340",
    devtype: 0x40,
    heads: 12,
    cyls: 348,
    trklen: 8368,
    max_dlen: 8368,
    formula: Formula::Linear { c1: 167, c2: 75, tol_num: 1, tol_den: 1 }
};

pub const D3340_70: CkdDevice = CkdDevice {
    name: "3340-70",
    devtype: 0x40,
    heads: 12,
    cyls: 696,
    trklen: 8368,
    max_dlen: 8368,
    formula: Formula::Linear { c1: 167, c2: 75, tol_num: 1, tol_den: 1 }
};

pub const D3350: CkdDevice = CkdDevice {
    name: "3350",
    devtype: 0x50,
    heads: 30,
    cyls: 555,
    trklen: 19069,
    max_dlen: 19069,
    formula: Formula::Linear { c1: 185, c2: 82, tol_num: 1, tol_den: 1 }
};

pub const D3380: CkdDevice = CkdDevice {
    name: "3380",
    devtype: 0x80,
    heads: 15,
    cyls: 885,
    trklen: 47968,
    max_dlen: 47476,
    formula: Formula::Interleaved { unit: 32, base: 15, kbase: 0, pad: 12 }
};

pub const D3380_2: CkdDevice = CkdDevice {
    name: "3380-2",
    devtype: 0x80,
    heads: 15,
    cyls: 1770,
    trklen: 47968,
    max_dlen: 47476,
    formula: Formula::Interleaved { unit: 32, base: 15, kbase: 0, pad: 12 }
};

pub const D3390: CkdDevice = CkdDevice {
    name: "3390",
    devtype: 0x90,
    heads: 15,
    cyls: 1113,
    trklen: 58786,
    max_dlen: 56664,
    formula: Formula::Interleaved { unit: 34, base: 19, kbase: 9, pad: 6 }
};

pub const D3390_2: CkdDevice = CkdDevice {
    name: "3390-2",
    devtype: 0x90,
    heads: 15,
    cyls: 2226,
    trklen: 58786,
    max_dlen: 56664,
    formula: Formula::Interleaved { unit: 34, base: 19, kbase: 9, pad: 6 }
};

pub const D3390_3: CkdDevice = CkdDevice {
    name: "3390-3",
    devtype: 0x90,
    heads: 15,
    cyls: 3339,
    trklen: 58786,
    max_dlen: 56664,
    formula: Formula::Interleaved { unit: 34, base: 19, kbase: 9, pad: 6 }
};

pub const D9345: CkdDevice = CkdDevice {
    name: "9345",
    devtype: 0x45,
    heads: 15,
    cyls: 1440,
    trklen: 48280,
    max_dlen: 46456,
    formula: Formula::Interleaved { unit: 34, base: 14, kbase: 9, pad: 6 }
};

pub const D9345_2: CkdDevice = CkdDevice {
    name: "9345-2",
    devtype: 0x45,
    heads: 15,
    cyls: 2156,
    trklen: 48280,
    max_dlen: 46456,
    formula: Formula::Interleaved { unit: 34, base: 14, kbase: 9, pad: 6 }
};

const TABLE: [&CkdDevice;14] = [
    &D2311,&D2314,&D3330,&D3330_11,&D3340,&D3340_70,&D3350,
    &D3380,&D3380_2,&D3390,&D3390_2,&D3390_3,&D9345,&D9345_2
];

/// Look up a CKD device model by name, e.g. `3390` or `3390-3`.
pub fn lookup(name: &str) -> Result<&'static CkdDevice,DYNERR> {
    for dev in TABLE {
        if dev.name == name {
            return Ok(dev);
        }
    }
    debug!("device {} is not in the CKD table",name);
    Err(Box::new(super::Error::UnknownDevice))
}

/// Look up a CKD device model by the type byte in an image header.
/// Models sharing the byte resolve to the base model.
pub fn lookup_type(devtype: u8) -> Result<&'static CkdDevice,DYNERR> {
    for dev in TABLE {
        if dev.devtype == devtype {
            return Ok(dev);
        }
    }
    debug!("device type {:02X} is not in the CKD table",devtype);
    Err(Box::new(super::Error::UnknownDevice))
}
