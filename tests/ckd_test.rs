// tests of flat CKD volumes built and reopened through the library
use dasdkit::{DasdCtx,create_volume,open_ckd_volume};
use dasdkit::vol::init::CreateOpts;
use dasdkit::vol::records::Block;

fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// EBCDIC for the 4-byte label keys
const VOL1_KEY: [u8;4] = [0xE5,0xD6,0xD3,0xF1];
const IPL1_KEY: [u8;4] = [0xC9,0xD7,0xD3,0xF1];

#[test]
fn create_and_reopen_3330() {
    init_log();
    let dir = tempfile::tempdir().expect("no temp dir");
    let path_buf = dir.path().join("work01.ckd");
    let path = path_buf.to_str().expect("bad path");
    let mut ctx = DasdCtx::new();
    create_volume(path,"3330",Some(4),"work01",&CreateOpts::default(),&mut ctx).expect("create failed");

    let mut vol = open_ckd_volume(path,&mut ctx).expect("open failed");
    assert_eq!(vol.heads(),19);
    assert_eq!(vol.cylinders(),4);
    assert_eq!(vol.devtype(),0x30);
    match vol.read_block(0,0,1).expect("read failed") {
        Block::Record(r) => {
            assert_eq!(r.key,Some(&IPL1_KEY[..]));
            assert_eq!(r.data.len(),24);
            // the IPL PSW leads the bootstrap record
            assert_eq!(&r.data[0..8],&[0x00,0x06,0x00,0x00,0x00,0x00,0x00,0x0F]);
        },
        Block::EndOfTrack => panic!("IPL1 record missing")
    }
    match vol.read_block(0,0,3).expect("read failed") {
        Block::Record(r) => {
            assert_eq!(r.key,Some(&VOL1_KEY[..]));
            assert_eq!(r.data.len(),80);
            assert_eq!(&r.data[0..4],&VOL1_KEY);
            // EBCDIC WORK01, uppercased from the request
            assert_eq!(&r.data[4..10],&[0xE6,0xD6,0xD9,0xD2,0xF0,0xF1]);
        },
        Block::EndOfTrack => panic!("volume label missing")
    }
    vol.close().expect("close failed");
}

#[test]
fn unwritten_tracks_are_formatted_null() {
    init_log();
    let dir = tempfile::tempdir().expect("no temp dir");
    let path_buf = dir.path().join("work02.ckd");
    let path = path_buf.to_str().expect("bad path");
    let mut ctx = DasdCtx::new();
    create_volume(path,"2314",Some(3),"work02",&CreateOpts::default(),&mut ctx).expect("create failed");

    let mut vol = open_ckd_volume(path,&mut ctx).expect("open failed");
    // a flat image holds real bytes for every track: R0 then the mark
    match vol.read_block(1,5,0).expect("read failed") {
        Block::Record(r) => {
            assert_eq!(r.key,None);
            assert_eq!(r.data,&[0u8;8]);
        },
        Block::EndOfTrack => panic!("R0 missing from null track")
    }
    match vol.read_block(1,5,1).expect("read failed") {
        Block::Record(_) => panic!("null track should end after R0"),
        Block::EndOfTrack => {}
    }
    vol.close().expect("close failed");
}

#[test]
fn records_survive_reopen() {
    init_log();
    let dir = tempfile::tempdir().expect("no temp dir");
    let path_buf = dir.path().join("work03.ckd");
    let path = path_buf.to_str().expect("bad path");
    let mut ctx = DasdCtx::new();
    create_volume(path,"3350",Some(2),"work03",&CreateOpts::default(),&mut ctx).expect("create failed");

    let mut vol = open_ckd_volume(path,&mut ctx).expect("open failed");
    vol.write_block(1,7,1,Some(b"DATASET1"),&[0x5A;500]).expect("write failed");
    vol.write_block(1,7,2,None,&[0xC3;200]).expect("write failed");
    vol.close().expect("close failed");

    let mut vol = open_ckd_volume(path,&mut ctx).expect("reopen failed");
    match vol.read_block(1,7,1).expect("read failed") {
        Block::Record(r) => {
            assert_eq!(r.key,Some(&b"DATASET1"[..]));
            assert_eq!(r.data,&[0x5A;500][..]);
        },
        Block::EndOfTrack => panic!("record 1 missing")
    }
    match vol.read_block(1,7,2).expect("read failed") {
        Block::Record(r) => {
            assert_eq!(r.key,None);
            assert_eq!(r.data,&[0xC3;200][..]);
        },
        Block::EndOfTrack => panic!("record 2 missing")
    }
    vol.close().expect("close failed");
}

#[test]
fn update_in_place_keeps_dimensions() {
    init_log();
    let dir = tempfile::tempdir().expect("no temp dir");
    let path_buf = dir.path().join("work04.ckd");
    let path = path_buf.to_str().expect("bad path");
    let mut ctx = DasdCtx::new();
    create_volume(path,"3330",Some(2),"work04",&CreateOpts::default(),&mut ctx).expect("create failed");

    let mut vol = open_ckd_volume(path,&mut ctx).expect("open failed");
    vol.write_block(0,1,1,Some(b"KEY1"),&[1,2,3,4]).expect("write failed");
    vol.update_block(0,1,1,Some(b"KEY2"),&[5,6,7,8]).expect("update failed");
    // changing dimensions in place is refused
    assert!(vol.update_block(0,1,1,Some(b"KEY2"),&[5,6,7]).is_err());
    assert!(vol.update_block(0,1,1,None,&[5,6,7,8]).is_err());
    match vol.read_block(0,1,1).expect("read failed") {
        Block::Record(r) => {
            assert_eq!(r.key,Some(&b"KEY2"[..]));
            assert_eq!(r.data,&[5,6,7,8][..]);
        },
        Block::EndOfTrack => panic!("record missing after update")
    }
    vol.close().expect("close failed");
}

#[test]
fn key_search_walks_extents() {
    use dasdkit::vol::extents::Extent;
    init_log();
    let dir = tempfile::tempdir().expect("no temp dir");
    let path_buf = dir.path().join("work05.ckd");
    let path = path_buf.to_str().expect("bad path");
    let mut ctx = DasdCtx::new();
    create_volume(path,"3330",Some(3),"work05",&CreateOpts::default(),&mut ctx).expect("create failed");

    let mut vol = open_ckd_volume(path,&mut ctx).expect("open failed");
    vol.write_block(2,4,1,Some(b"SYS1.LINKLIB"),&[0;44]).expect("write failed");
    let exts = vec![
        Extent::new((1,0),(1,18)),
        Extent::new((2,0),(2,18))
    ];
    let hit = vol.search_key_equal(b"SYS1.LINKLIB",&exts).expect("search failed");
    assert_eq!(hit,Some((2,4,1)));
    let miss = vol.search_key_equal(b"SYS1.NUCLEUS",&exts).expect("search failed");
    assert_eq!(miss,None);
    vol.close().expect("close failed");
}

#[test]
fn oversize_volume_splits_into_files() {
    init_log();
    let dir = tempfile::tempdir().expect("no temp dir");
    let path_buf = dir.path().join("span.ckd");
    let path = path_buf.to_str().expect("bad path");
    let mut ctx = DasdCtx::new();
    // 2314 cylinders are 20 x 7680 bytes; cap files at two cylinders each
    let opts = CreateOpts {
        max_file_size: 512 + 2*20*7680,
        ..Default::default()
    };
    create_volume(path,"2314",Some(5),"span01",&opts,&mut ctx).expect("create failed");
    assert!(dir.path().join("span_1.ckd").exists());
    assert!(dir.path().join("span_2.ckd").exists());
    assert!(dir.path().join("span_3.ckd").exists());
    assert!(!dir.path().join("span.ckd").exists());
    assert!(!dir.path().join("span_4.ckd").exists());

    // the split is invisible above the image: volume-relative addressing
    // reaches cylinder 4, which lives in the third file
    let first_buf = dir.path().join("span_1.ckd");
    let first = first_buf.to_str().expect("bad path");
    let mut vol = open_ckd_volume(first,&mut ctx).expect("open failed");
    assert_eq!(vol.cylinders(),5);
    vol.write_block(4,19,1,Some(b"LASTTRK"),&[0xEE;100]).expect("write failed");
    vol.close().expect("close failed");

    let mut vol = open_ckd_volume(first,&mut ctx).expect("reopen failed");
    match vol.read_block(4,19,1).expect("read failed") {
        Block::Record(r) => assert_eq!(r.data,&[0xEE;100][..]),
        Block::EndOfTrack => panic!("record missing from last segment")
    }
    // the label still reads from the first segment
    match vol.read_block(0,0,3).expect("read failed") {
        Block::Record(r) => assert_eq!(r.key,Some(&VOL1_KEY[..])),
        Block::EndOfTrack => panic!("volume label missing")
    }
    vol.close().expect("close failed");
}
