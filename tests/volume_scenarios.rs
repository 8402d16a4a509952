//! End-to-end tests against synthetic images, covering the scenarios in spec.md §8.

mod support;

use std::ops::ControlFlow;

use fat32fuse::error::Fat32Error;
use fat32fuse::volume::Volume;
use support::{lfn_entry, short_entry, short_name_checksum, Image};

fn open(image: &Image) -> Volume {
    Volume::open(&image.path(), 1000, 1000, 1_700_000_000).expect("open valid image")
}

#[test]
fn smallest_valid_image_has_an_empty_root() {
    let image = Image::new();
    let volume = open(&image);

    let stat = volume.getattr("/").unwrap();
    assert_eq!(stat.size, image.cluster_size() as u64);
    assert_eq!(stat.kind, fat32fuse::volume::FileKind::Directory);

    let mut names = Vec::new();
    volume
        .readdir("/", |name, _entry| {
            names.push(name.to_string());
            ControlFlow::Continue(())
        })
        .unwrap();
    assert!(names.is_empty());
}

#[test]
fn root_with_one_short_name_file() {
    let image = Image::new();
    image.write_dir_entries(
        support::ROOT_CLUSTER,
        &[short_entry(b"HELLO   TXT", 0x20, 3, 13)],
    );
    image.set_fat_entry(3, 0x0FFF_FFFF);
    image.write_cluster(3, b"Hello, world!");

    let volume = open(&image);

    let mut names = Vec::new();
    volume
        .readdir("/", |name, _entry| {
            names.push(name.to_string());
            ControlFlow::Continue(())
        })
        .unwrap();
    assert_eq!(names, vec!["HELLO.TXT"]);

    let mut buf = [0u8; 13];
    let n = volume.read("/HELLO.TXT", 0, &mut buf).unwrap();
    assert_eq!(n, 13);
    assert_eq!(&buf, b"Hello, world!");
}

#[test]
fn long_filename_is_reconstructed_and_checksum_matches() {
    let image = Image::new();

    let short_raw = *b"A LONG~1TXT";
    let checksum = short_name_checksum(&short_raw);
    let text: Vec<u16> = "A Long Filename.txt".encode_utf16().collect();

    let entry1 = lfn_entry(1, false, checksum, &text[0..13]);
    let entry2 = lfn_entry(2, true, checksum, &text[13..]);
    let short = short_entry(&short_raw, 0x20, 3, 5);

    // On-disk order: LFN entries descend in sequence number, ending with the short entry.
    image.write_dir_entries(support::ROOT_CLUSTER, &[entry2, entry1, short]);
    image.set_fat_entry(3, 0x0FFF_FFFF);
    image.write_cluster(3, b"hello");

    let volume = open(&image);
    let mut names = Vec::new();
    volume
        .readdir("/", |name, _entry| {
            names.push(name.to_string());
            ControlFlow::Continue(())
        })
        .unwrap();
    assert_eq!(names, vec!["A Long Filename.txt"]);
}

#[test]
fn multi_cluster_file_reads_across_cluster_boundaries() {
    let image = Image::new();

    // Three 512-byte clusters chained 3 -> 4 -> 5 -> EOC, holding a 1200-byte file.
    image.set_fat_entry(3, 4);
    image.set_fat_entry(4, 5);
    image.set_fat_entry(5, 0x0FFF_FFFF);

    let mut payload = Vec::new();
    for i in 0..1200u32 {
        payload.push((i % 251) as u8);
    }
    image.write_cluster(3, &payload[0..512]);
    image.write_cluster(4, &payload[512..1024]);
    image.write_cluster(5, &payload[1024..1200]);

    image.write_dir_entries(
        support::ROOT_CLUSTER,
        &[short_entry(b"BIG     BIN", 0x20, 3, 1200)],
    );

    let volume = open(&image);

    // A read spanning the boundary between cluster 3 and cluster 4.
    let mut buf = [0u8; 20];
    let n = volume.read("/BIG.BIN", 505, &mut buf).unwrap();
    assert_eq!(n, 20);
    assert_eq!(&buf[..], &payload[505..525]);

    // A read of the whole file.
    let mut whole = vec![0u8; 1200];
    let n = volume.read("/BIG.BIN", 0, &mut whole).unwrap();
    assert_eq!(n, 1200);
    assert_eq!(whole, payload);
}

#[test]
fn deleted_entry_is_skipped() {
    let image = Image::new();

    let live_a = short_entry(b"AAA     TXT", 0x20, 3, 1);
    let mut deleted = short_entry(b"BBB     TXT", 0x20, 4, 1);
    deleted[0] = 0xE5;
    let live_b = short_entry(b"CCC     TXT", 0x20, 5, 1);

    image.write_dir_entries(support::ROOT_CLUSTER, &[live_a, deleted, live_b]);
    image.set_fat_entry(3, 0x0FFF_FFFF);
    image.set_fat_entry(5, 0x0FFF_FFFF);
    image.write_cluster(3, b"a");
    image.write_cluster(5, b"c");

    let volume = open(&image);
    let mut names = Vec::new();
    volume
        .readdir("/", |name, _entry| {
            names.push(name.to_string());
            ControlFlow::Continue(())
        })
        .unwrap();
    assert_eq!(names, vec!["AAA.TXT", "CCC.TXT"]);
}

#[test]
fn corrupt_fat_mirror_fails_traversal() {
    let image = Image::new();
    image.write_dir_entries(
        support::ROOT_CLUSTER,
        &[short_entry(b"X       TXT", 0x20, 7, 1)],
    );
    image.set_fat_entry_mismatched(7, 0x0000_0008, 0x0000_0009);
    image.write_cluster(7, b"x");

    let volume = open(&image);
    let err = volume.read("/X.TXT", 0, &mut [0u8; 1]).unwrap_err();
    assert!(matches!(err, Fat32Error::CorruptFat { cluster: 7, .. }));
}

#[test]
fn read_past_end_of_file_returns_zero() {
    let image = Image::new();
    image.write_dir_entries(
        support::ROOT_CLUSTER,
        &[short_entry(b"SMALL   TXT", 0x20, 3, 4)],
    );
    image.set_fat_entry(3, 0x0FFF_FFFF);
    image.write_cluster(3, b"abcd");

    let volume = open(&image);
    let n = volume.read("/SMALL.TXT", 4, &mut [0u8; 10]).unwrap();
    assert_eq!(n, 0);

    let mut buf = [0u8; 10];
    let n = volume.read("/SMALL.TXT", 2, &mut buf).unwrap();
    assert_eq!(n, 2);
    assert_eq!(&buf[..2], b"cd");
}

#[test]
fn nonexistent_path_is_not_found() {
    let image = Image::new();
    let volume = open(&image);
    assert!(matches!(
        volume.getattr("/nope.txt").unwrap_err(),
        Fat32Error::NotFound
    ));
}

#[test]
fn non_terminal_file_component_is_not_a_directory() {
    let image = Image::new();
    image.write_dir_entries(
        support::ROOT_CLUSTER,
        &[short_entry(b"FILE    TXT", 0x20, 3, 1)],
    );
    image.set_fat_entry(3, 0x0FFF_FFFF);
    image.write_cluster(3, b"x");

    let volume = open(&image);
    assert!(matches!(
        volume.getattr("/FILE.TXT/inner").unwrap_err(),
        Fat32Error::NotDir
    ));
}

#[test]
fn read_only_cleared_mode_is_full_rwx_for_files_and_directories() {
    let image = Image::new();

    // A file with the read-only attribute cleared, and a subdirectory, both under root.
    image.write_dir_entries(
        support::ROOT_CLUSTER,
        &[
            short_entry(b"WRITE   TXT", 0x20, 3, 1),
            short_entry(b"SUB        ", 0x10, 4, 0),
        ],
    );
    image.set_fat_entry(3, 0x0FFF_FFFF);
    image.set_fat_entry(4, 0x0FFF_FFFF);
    image.write_cluster(3, b"x");

    let volume = open(&image);

    let file_stat = volume.getattr("/WRITE.TXT").unwrap();
    assert_eq!(file_stat.mode & 0o777, 0o777);

    let dir_stat = volume.getattr("/SUB").unwrap();
    assert_eq!(dir_stat.mode & 0o777, 0o777);
}

#[test]
fn read_only_set_mode_is_read_only_for_files_and_directories() {
    let image = Image::new();

    image.write_dir_entries(
        support::ROOT_CLUSTER,
        &[
            short_entry(b"RDONLY  TXT", 0x21, 3, 1),
            short_entry(b"SUB        ", 0x11, 4, 0),
        ],
    );
    image.set_fat_entry(3, 0x0FFF_FFFF);
    image.set_fat_entry(4, 0x0FFF_FFFF);
    image.write_cluster(3, b"x");

    let volume = open(&image);

    let file_stat = volume.getattr("/RDONLY.TXT").unwrap();
    assert_eq!(file_stat.mode & 0o777, 0o444);

    let dir_stat = volume.getattr("/SUB").unwrap();
    assert_eq!(dir_stat.mode & 0o777, 0o444);
}

#[test]
fn debug_cluster_xattr_reports_start_cluster() {
    let image = Image::new();
    image.write_dir_entries(
        support::ROOT_CLUSTER,
        &[short_entry(b"HELLO   TXT", 0x20, 3, 1)],
    );
    image.set_fat_entry(3, 0x0FFF_FFFF);
    image.write_cluster(3, b"x");

    let volume = open(&image);
    let value = volume.getxattr("/HELLO.TXT", "debug.cluster").unwrap();
    assert_eq!(value, b"3");

    assert!(matches!(
        volume.getxattr("/HELLO.TXT", "user.other").unwrap_err(),
        Fat32Error::NoData
    ));
}
