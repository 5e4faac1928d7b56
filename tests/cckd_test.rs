// tests of compressed CKD volumes built and reopened through the library
use dasdkit::{DasdCtx,create_volume,open_ckd_volume};
use dasdkit::vol::init::CreateOpts;
use dasdkit::vol::records::Block;
use dasdkit::img::codec::Compression;

fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn compressed_opts() -> CreateOpts {
    CreateOpts {
        compressed: true,
        ..Default::default()
    }
}

/// pull the hex `used` field out of the image metadata
fn used_bytes(meta: &str) -> u64 {
    let root = json::parse(meta).expect("bad metadata");
    u64::from_str_radix(root["cckd"]["used"].as_str().expect("used missing"),16).expect("used not hex")
}

#[test]
fn keyed_record_round_trip() {
    init_log();
    let dir = tempfile::tempdir().expect("no temp dir");
    let path_buf = dir.path().join("cvol01.cckd");
    let path = path_buf.to_str().expect("bad path");
    let mut ctx = DasdCtx::new();
    create_volume(path,"3390",Some(1),"cvol01",&compressed_opts(),&mut ctx).expect("create failed");

    let mut vol = open_ckd_volume(path,&mut ctx).expect("open failed");
    assert_eq!(vol.heads(),15);
    vol.write_block(0,0,1,Some(b"TESTKEY1"),&[0xAB;100]).expect("write failed");
    vol.close().expect("close failed");

    let mut vol = open_ckd_volume(path,&mut ctx).expect("reopen failed");
    match vol.read_block(0,0,1).expect("read failed") {
        Block::Record(r) => {
            assert_eq!(r.key,Some(&b"TESTKEY1"[..]));
            assert_eq!(r.data,&[0xAB;100][..]);
        },
        Block::EndOfTrack => panic!("record missing after reopen")
    }
    vol.close().expect("close failed");
}

#[test]
fn untouched_track_synthesizes_deterministically() {
    init_log();
    let dir = tempfile::tempdir().expect("no temp dir");
    let path_buf = dir.path().join("cvol02.cckd");
    let path = path_buf.to_str().expect("bad path");
    let mut ctx = DasdCtx::new();
    create_volume(path,"3390",Some(6),"cvol02",&compressed_opts(),&mut ctx).expect("create failed");

    let mut vol = open_ckd_volume(path,&mut ctx).expect("open failed");
    let first = vol.read_track(5,3).expect("read failed").to_vec();
    // track header for (5,3), R0 with 8 zero data bytes, end-of-track mark
    assert_eq!(first[0..5],[0,0,5,0,3]);
    assert_eq!(first[5..13],[0,5,0,3,0,0,0,8]);
    assert_eq!(first[13..21],[0;8]);
    assert_eq!(first[21..29],[0xFF;8]);
    match vol.read_block(5,3,1).expect("read failed") {
        Block::Record(_) => panic!("null track should end after R0"),
        Block::EndOfTrack => {}
    }
    let second = vol.read_track(5,3).expect("read failed").to_vec();
    assert_eq!(first,second);
    vol.close().expect("close failed");
}

#[test]
fn l2_tables_allocate_lazily_and_used_never_decreases() {
    init_log();
    let dir = tempfile::tempdir().expect("no temp dir");
    let path_buf = dir.path().join("cvol03.cckd");
    let path = path_buf.to_str().expect("bad path");
    let mut ctx = DasdCtx::new();
    // 35 cylinders of 15 heads is 525 tracks, spanning 3 L1 groups
    create_volume(path,"3390",Some(35),"cvol03",&compressed_opts(),&mut ctx).expect("create failed");

    let mut vol = open_ckd_volume(path,&mut ctx).expect("open failed");
    let u0 = used_bytes(&vol.get_metadata(None));
    // cylinder 30 is track 450, in the second L1 group: first touch allocates
    // an L2 table and stores the track
    vol.write_block(30,0,1,Some(b"GROUPTWO"),&[0x11;256]).expect("write failed");
    vol.sync().expect("sync failed");
    let u1 = used_bytes(&vol.get_metadata(None));
    assert!(u1 > u0);
    // rewriting appends a fresh copy; the old bytes stay behind
    vol.write_block(30,0,1,Some(b"GROUPTWO"),&[0x22;256]).expect("write failed");
    vol.sync().expect("sync failed");
    let u2 = used_bytes(&vol.get_metadata(None));
    assert!(u2 > u1);
    match vol.read_block(30,0,1).expect("read failed") {
        Block::Record(r) => assert_eq!(r.data,&[0x22;256][..]),
        Block::EndOfTrack => panic!("rewritten record missing")
    }
    vol.close().expect("close failed");

    let mut vol = open_ckd_volume(path,&mut ctx).expect("reopen failed");
    assert_eq!(used_bytes(&vol.get_metadata(None)),u2);
    match vol.read_block(30,0,1).expect("read failed") {
        Block::Record(r) => assert_eq!(r.data,&[0x22;256][..]),
        Block::EndOfTrack => panic!("record missing after reopen")
    }
    vol.close().expect("close failed");
}

#[test]
fn codecs_round_trip_through_reopen() {
    init_log();
    for alg in [Compression::None,Compression::Zlib,Compression::Bzip2] {
        let dir = tempfile::tempdir().expect("no temp dir");
        let path_buf = dir.path().join("cvol04.cckd");
        let path = path_buf.to_str().expect("bad path");
        let mut ctx = DasdCtx::new();
        let opts = CreateOpts {
            compressed: true,
            compression: alg,
            ..Default::default()
        };
        create_volume(path,"3380",Some(2),"cvol04",&opts,&mut ctx).expect("create failed");
        let mut vol = open_ckd_volume(path,&mut ctx).expect("open failed");
        let dat: Vec<u8> = (0..2000).map(|i| (i % 17) as u8).collect();
        vol.write_block(1,9,1,None,&dat).expect("write failed");
        vol.close().expect("close failed");
        let mut vol = open_ckd_volume(path,&mut ctx).expect("reopen failed");
        match vol.read_block(1,9,1).expect("read failed") {
            Block::Record(r) => assert_eq!(r.data,&dat[..]),
            Block::EndOfTrack => panic!("record missing with {}",alg)
        }
        vol.close().expect("close failed");
    }
}

#[test]
fn sparse_image_stays_small() {
    init_log();
    let dir = tempfile::tempdir().expect("no temp dir");
    let path_buf = dir.path().join("cvol05.cckd");
    let path = path_buf.to_str().expect("bad path");
    let mut ctx = DasdCtx::new();
    // a full 3390-1 would be gigabytes flat; compressed with one formatted
    // track it stays a few kilobytes
    create_volume(path,"3390",None,"cvol05",&compressed_opts(),&mut ctx).expect("create failed");
    let len = std::fs::metadata(path).expect("no file").len();
    assert!(len < 65536,"sparse image ballooned to {} bytes",len);
    let mut vol = open_ckd_volume(path,&mut ctx).expect("open failed");
    assert_eq!(vol.cylinders(),1113);
    vol.close().expect("close failed");
}
