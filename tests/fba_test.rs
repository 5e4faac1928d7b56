// tests of FBA volumes, flat and compressed
use dasdkit::{DasdCtx,create_fba_volume,open_fba_volume};
use dasdkit::vol::init::CreateOpts;

fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// EBCDIC for the VOL1 label id
const VOL1_KEY: [u8;4] = [0xE5,0xD6,0xD3,0xF1];

#[test]
fn flat_volume_round_trip() {
    init_log();
    let dir = tempfile::tempdir().expect("no temp dir");
    let path_buf = dir.path().join("fvol01.fba");
    let path = path_buf.to_str().expect("bad path");
    let mut ctx = DasdCtx::new();
    // 300 blocks is two full groups and a short one
    create_fba_volume(path,"3310",Some(300),"fvol01",&CreateOpts::default(),&mut ctx).expect("create failed");

    let mut vol = open_fba_volume(path,&mut ctx).expect("open failed");
    assert_eq!(vol.blocks(),300);
    assert_eq!(vol.block_len(),512);
    assert_eq!(vol.devtype(),0x10);
    // the label sits at block 1
    let label = vol.read_sector(1).expect("read failed");
    assert_eq!(&label[0..4],&VOL1_KEY);
    // a block in the short final group
    let mut pattern = vec![0u8;512];
    for (i,b) in pattern.iter_mut().enumerate() {
        *b = (i % 251) as u8;
    }
    vol.write_sector(290,&pattern).expect("write failed");
    vol.close().expect("close failed");

    let mut vol = open_fba_volume(path,&mut ctx).expect("reopen failed");
    assert_eq!(vol.read_sector(290).expect("read failed"),&pattern[..]);
    // neighboring blocks stay zero
    assert_eq!(vol.read_sector(289).expect("read failed"),&[0u8;512][..]);
    assert!(vol.read_sector(300).is_err());
    vol.close().expect("close failed");
}

#[test]
fn compressed_volume_round_trip() {
    init_log();
    let dir = tempfile::tempdir().expect("no temp dir");
    let path_buf = dir.path().join("fvol02.cfba");
    let path = path_buf.to_str().expect("bad path");
    let mut ctx = DasdCtx::new();
    let opts = CreateOpts {
        compressed: true,
        ..Default::default()
    };
    // rounds up to whole block groups
    create_fba_volume(path,"3370",Some(300),"fvol02",&opts,&mut ctx).expect("create failed");

    let mut vol = open_fba_volume(path,&mut ctx).expect("open failed");
    assert_eq!(vol.blocks(),360);
    let label = vol.read_sector(1).expect("read failed");
    assert_eq!(&label[0..4],&VOL1_KEY);
    // a block in a never-written group reads zero
    assert_eq!(vol.read_sector(250).expect("read failed"),&[0u8;512][..]);
    vol.write_sector(250,&[0x77;512]).expect("write failed");
    vol.close().expect("close failed");

    let mut vol = open_fba_volume(path,&mut ctx).expect("reopen failed");
    assert_eq!(vol.read_sector(250).expect("read failed"),&[0x77;512][..]);
    // the rest of that group is still zero
    assert_eq!(vol.read_sector(251).expect("read failed"),&[0u8;512][..]);
    vol.close().expect("close failed");
}
