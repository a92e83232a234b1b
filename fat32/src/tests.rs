extern crate std;

use std::io::{Cursor, Read, Write};
use std::vec::Vec;

use crate::volume::Volume;
use crate::*;

// ── Mock block device backed by Vec<u8> ──────────────────────────────────

struct MemDisk(Vec<u8>);

impl BlockDev for MemDisk {
    fn read(&mut self, lba: u64, buf: &mut [u8; 512]) -> bool {
        let off = lba as usize * 512;
        if off + 512 > self.0.len() {
            return false;
        }
        buf.copy_from_slice(&self.0[off..off + 512]);
        true
    }
    fn write(&mut self, lba: u64, buf: &[u8; 512]) -> bool {
        let off = lba as usize * 512;
        if off + 512 > self.0.len() {
            return false;
        }
        self.0[off..off + 512].copy_from_slice(buf);
        true
    }
}

/// Small enough to keep the Vec manageable, large enough for the FAT32
/// cluster floor with 1-sector clusters.
const TOTAL_SECTORS: u32 = 140_000;

fn formatted_disk() -> MemDisk {
    let mut disk = MemDisk(vec![0u8; TOTAL_SECTORS as usize * 512]);
    format(&mut disk, TOTAL_SECTORS, 1).expect("format failed");
    disk
}

fn mounted() -> Volume<MemDisk> {
    Volume::mount(formatted_disk()).expect("mount failed")
}

/// Create an in-memory FAT32 image using the `fatfs` std crate.
/// At 40 MB with the Fat32 type hint, `fatfs` picks 512-byte clusters.
fn fatfs_disk() -> MemDisk {
    const SIZE: usize = 40 * 1024 * 1024;
    let mut cursor = Cursor::new(vec![0u8; SIZE]);
    fatfs::format_volume(
        &mut cursor,
        fatfs::FormatVolumeOptions::new().fat_type(fatfs::FatType::Fat32),
    )
    .expect("format_volume failed");
    MemDisk(cursor.into_inner())
}

fn fatfs_disk_with_file(name: &str, content: &[u8]) -> MemDisk {
    let mut disk = fatfs_disk();
    {
        let mut cursor = Cursor::new(&mut disk.0);
        let fs = fatfs::FileSystem::new(&mut cursor, fatfs::FsOptions::new()).unwrap();
        let mut f = fs.root_dir().create_file(name).unwrap();
        f.truncate().unwrap();
        f.write_all(content).unwrap();
    }
    disk
}

fn read_via_fatfs(disk: &mut MemDisk, name: &str) -> Vec<u8> {
    let mut cursor = Cursor::new(&mut disk.0);
    let fs = fatfs::FileSystem::new(&mut cursor, fatfs::FsOptions::new()).unwrap();
    let mut f = fs.root_dir().open_file(name).unwrap();
    let mut buf = Vec::new();
    f.read_to_end(&mut buf).unwrap();
    buf
}

fn blank_listing() -> [Entry; 48] {
    core::array::from_fn(|_| Entry {
        cluster: 0,
        size: 0,
        is_dir: false,
        name: [0; 12],
        name_len: 0,
    })
}

fn entry_name(e: &Entry) -> &str {
    core::str::from_utf8(&e.name[..e.name_len]).unwrap()
}

/// All clusters of a chain, in order.
fn collect_chain(vol: &mut Volume<MemDisk>, first: u32) -> Vec<u32> {
    let mut out = Vec::new();
    let mut c = first;
    while c >= 2 && c < FAT_EOC_MIN {
        out.push(c);
        c = vol.fat_entry(c).unwrap();
    }
    out
}

fn count_free_entries(vol: &mut Volume<MemDisk>) -> u32 {
    let max = vol.max_cluster();
    (2..max).filter(|&c| vol.fat_entry(c).unwrap() == FAT_FREE).count() as u32
}

// ── format ───────────────────────────────────────────────────────────────

#[test]
fn format_rejects_small_disk() {
    let mut disk = MemDisk(vec![0u8; 65_000 * 512]);
    assert_eq!(format(&mut disk, 65_000, 8), Err(FsError::TooFewClusters));
}

#[test]
fn format_rejects_non_power_of_two_cluster() {
    let mut disk = MemDisk(vec![0u8; TOTAL_SECTORS as usize * 512]);
    assert_eq!(format(&mut disk, TOTAL_SECTORS, 3), Err(FsError::TooFewClusters));
    assert_eq!(format(&mut disk, TOTAL_SECTORS, 0), Err(FsError::TooFewClusters));
}

#[test]
fn format_rejects_cluster_starvation() {
    // 65 536 sectors in 64-sector clusters is nowhere near 65 525 clusters.
    let mut disk = MemDisk(vec![0u8; 65_536 * 512]);
    assert_eq!(format(&mut disk, 65_536, 64), Err(FsError::TooFewClusters));
}

#[test]
fn format_writes_boot_sector_and_backup() {
    let disk = formatted_disk();
    let boot = &disk.0[0..512];
    let backup = &disk.0[6 * 512..7 * 512];
    assert_eq!(boot, backup);
    assert_eq!(boot[510], 0x55);
    assert_eq!(boot[511], 0xAA);
    assert_eq!(&boot[82..90], b"FAT32   ");
    assert_eq!(&boot[3..11], b"MSDOS5.0");
}

#[test]
fn format_writes_fsinfo() {
    let disk = formatted_disk();
    let fsinfo = &disk.0[512..1024];
    assert_eq!(u32::from_le_bytes(fsinfo[0..4].try_into().unwrap()), 0x4161_5252);
    assert_eq!(u32::from_le_bytes(fsinfo[484..488].try_into().unwrap()), 0x6141_7272);
    let fat_size = (TOTAL_SECTORS - 32).div_ceil(129);
    let clusters = TOTAL_SECTORS - 32 - 2 * fat_size;
    assert_eq!(u32::from_le_bytes(fsinfo[488..492].try_into().unwrap()), clusters - 1);
    assert_eq!(u32::from_le_bytes(fsinfo[492..496].try_into().unwrap()), 3);
    assert_eq!(fsinfo[510], 0x55);
    assert_eq!(fsinfo[511], 0xAA);
}

#[test]
fn suggested_cluster_sizes_follow_disk_size() {
    assert_eq!(suggest_sectors_per_cluster(2_097_152), 16);
    assert_eq!(suggest_sectors_per_cluster(500_000), 8);
    assert_eq!(suggest_sectors_per_cluster(33_554_432), 64);
    assert_eq!(suggest_sectors_per_cluster(16_777_216), 32);
}

// ── mount ────────────────────────────────────────────────────────────────

#[test]
fn mount_formatted_volume() {
    let vol = mounted();
    assert_eq!(vol.root_cluster, 2);
    assert_eq!(vol.bytes_per_sector, 512);
    assert_eq!(vol.first_fat, 32);
    assert_eq!(vol.first_data, 32 + 2 * vol.fat_size);
}

#[test]
fn mount_blank_disk_fails() {
    let disk = MemDisk(vec![0u8; 4 * 1024 * 1024]);
    assert_eq!(Volume::mount(disk).err(), Some(FsError::NotFat32));
}

#[test]
fn mount_unreadable_disk_fails() {
    let disk = MemDisk(Vec::new());
    assert_eq!(Volume::mount(disk).err(), Some(FsError::Io));
}

#[test]
fn fatfs_accepts_formatted_volume() {
    // Freshly formatted volume mounts under an independent implementation
    // and lists an empty root.
    let mut disk = formatted_disk();
    let mut cursor = Cursor::new(&mut disk.0);
    let fs = fatfs::FileSystem::new(&mut cursor, fatfs::FsOptions::new())
        .expect("fatfs rejected our format");
    assert_eq!(fs.root_dir().iter().count(), 0);
}

// ── create / list ────────────────────────────────────────────────────────

#[test]
fn create_then_list() {
    let mut vol = mounted();
    vol.create("HELLO.TXT", b"hi\n").unwrap();

    let mut out = blank_listing();
    let count = vol.read_dir(&mut out).unwrap();
    assert_eq!(count, 1);
    assert_eq!(entry_name(&out[0]), "HELLO.TXT");
    assert_eq!(out[0].size, 3);
}

#[test]
fn created_file_visible_to_fatfs() {
    let mut vol = mounted();
    vol.create("OUT.TXT", b"written by the engine").unwrap();
    let mut disk = vol.into_disk();
    assert_eq!(read_via_fatfs(&mut disk, "OUT.TXT"), b"written by the engine");
}

#[test]
fn fatfs_file_readable_by_engine() {
    let disk = fatfs_disk_with_file("README.TXT", b"oracle data");
    let mut vol = Volume::mount(disk).unwrap();
    let mut buf = [0u8; 64];
    let n = vol.read_to_buffer("readme.txt", &mut buf).unwrap();
    assert_eq!(&buf[..n], b"oracle data");
}

#[test]
fn empty_file_has_no_cluster() {
    let mut vol = mounted();
    vol.create("EMPTY.TXT", &[]).unwrap();

    let mut out = blank_listing();
    let count = vol.read_dir(&mut out).unwrap();
    assert_eq!(count, 1);
    assert_eq!(out[0].cluster, 0);
    assert_eq!(out[0].size, 0);

    let mut buf = [0u8; 8];
    assert_eq!(vol.read_to_buffer("EMPTY.TXT", &mut buf).unwrap(), 0);
    assert_eq!(buf[0], 0);
}

#[test]
fn directory_full_rolls_back_chain() {
    // With 1-sector clusters the root directory holds exactly 16 entries.
    let mut vol = mounted();
    for i in 0..16 {
        let name = std::format!("F{i:02}.TXT");
        vol.create(&name, b"x").unwrap();
    }
    let free_before = count_free_entries(&mut vol);
    assert_eq!(vol.create("LAST.TXT", b"x"), Err(FsError::DirectoryFull));
    assert_eq!(count_free_entries(&mut vol), free_before);
    assert_eq!(vol.check().unwrap(), 0);
}

// ── read ─────────────────────────────────────────────────────────────────

#[test]
fn roundtrip_multi_cluster() {
    let content: Vec<u8> = (0u32..5120).map(|i| (i & 0xFF) as u8).collect();
    let mut vol = mounted();
    vol.create("BIG.BIN", &content).unwrap();

    let mut buf = vec![0xAAu8; 6000];
    let n = vol.read_to_buffer("BIG.BIN", &mut buf).unwrap();
    assert_eq!(n, 5120);
    assert_eq!(&buf[..5120], &content[..]);
    assert_eq!(buf[5120], 0);
}

#[test]
fn roundtrip_all_sizes_up_to_four_clusters() {
    let mut vol = mounted();
    for (i, n) in [0usize, 1, 511, 512, 513, 1024, 2048].into_iter().enumerate() {
        let name = std::format!("S{i}.BIN");
        let content: Vec<u8> = (0..n).map(|j| (j * 7 + i) as u8).collect();
        vol.write(&name, &content).unwrap();
        let mut buf = vec![0u8; n + 1];
        let got = vol.read_to_buffer(&name, &mut buf).unwrap();
        assert_eq!(got, n, "size {n}");
        assert_eq!(&buf[..n], &content[..], "size {n}");
    }
    assert_eq!(vol.check().unwrap(), 0);
}

#[test]
fn read_to_buffer_truncates_to_buffer() {
    let content: Vec<u8> = (0u8..100).collect();
    let mut vol = mounted();
    vol.create("WIDE.BIN", &content).unwrap();

    let mut buf = [0xFFu8; 51];
    let n = vol.read_to_buffer("WIDE.BIN", &mut buf).unwrap();
    assert_eq!(n, 50);
    assert_eq!(&buf[..50], &content[..50]);
    assert_eq!(buf[50], 0);
}

#[test]
fn read_missing_file() {
    let mut vol = mounted();
    let mut buf = [0u8; 8];
    assert_eq!(vol.read_to_buffer("NOSUCH.TXT", &mut buf), Err(FsError::NotFound));
}

// ── remove ───────────────────────────────────────────────────────────────

#[test]
fn remove_frees_every_cluster() {
    let content: Vec<u8> = (0u32..5120).map(|i| (i & 0xFF) as u8).collect();
    let mut vol = mounted();
    vol.create("BIG.BIN", &content).unwrap();

    let mut out = blank_listing();
    vol.read_dir(&mut out).unwrap();
    let chain = collect_chain(&mut vol, out[0].cluster);
    assert_eq!(chain.len(), 10);

    vol.remove("BIG.BIN").unwrap();
    for c in chain {
        assert_eq!(vol.fat_entry(c).unwrap(), FAT_FREE);
    }
    assert_eq!(vol.check().unwrap(), 0);
}

#[test]
fn remove_is_idempotent_on_the_fat() {
    let mut vol = mounted();
    vol.create("GONE.TXT", b"bye").unwrap();
    vol.remove("GONE.TXT").unwrap();

    let fat_region =
        vol.disk.0[32 * 512..(32 + 2 * vol.fat_size) as usize * 512].to_vec();
    assert_eq!(vol.remove("GONE.TXT"), Err(FsError::NotFound));
    assert_eq!(
        vol.disk.0[32 * 512..(32 + 2 * vol.fat_size) as usize * 512],
        fat_region[..]
    );
}

// ── write / rename / copy ────────────────────────────────────────────────

#[test]
fn write_replaces_contents() {
    let mut vol = mounted();
    vol.write("NOTE.TXT", b"first").unwrap();
    vol.write("NOTE.TXT", b"the second, longer body").unwrap();

    let mut buf = [0u8; 64];
    let n = vol.read_to_buffer("NOTE.TXT", &mut buf).unwrap();
    assert_eq!(&buf[..n], b"the second, longer body");

    let mut out = blank_listing();
    assert_eq!(vol.read_dir(&mut out).unwrap(), 1);
    assert_eq!(vol.check().unwrap(), 0);
}

#[test]
fn write_creates_missing_file() {
    let mut vol = mounted();
    vol.write("FRESH.TXT", b"made by write").unwrap();
    let mut buf = [0u8; 32];
    let n = vol.read_to_buffer("FRESH.TXT", &mut buf).unwrap();
    assert_eq!(&buf[..n], b"made by write");
}

#[test]
fn rename_moves_the_entry() {
    let mut vol = mounted();
    vol.create("OLD.TXT", b"payload").unwrap();
    vol.rename("old.txt", "NEW.TXT").unwrap();

    let mut buf = [0u8; 16];
    assert_eq!(vol.read_to_buffer("OLD.TXT", &mut buf), Err(FsError::NotFound));
    let n = vol.read_to_buffer("NEW.TXT", &mut buf).unwrap();
    assert_eq!(&buf[..n], b"payload");

    let mut disk = vol.into_disk();
    assert_eq!(read_via_fatfs(&mut disk, "NEW.TXT"), b"payload");
}

#[test]
fn rename_missing_file() {
    let mut vol = mounted();
    assert_eq!(vol.rename("NOPE.TXT", "NEW.TXT"), Err(FsError::NotFound));
}

#[test]
fn copy_duplicates_content_with_its_own_chain() {
    let mut vol = mounted();
    vol.create("A", b"abc").unwrap();
    vol.copy("A", "B").unwrap();

    let mut buf = [0u8; 8];
    let n = vol.read_to_buffer("B", &mut buf).unwrap();
    assert_eq!(&buf[..n], b"abc");

    let mut out = blank_listing();
    let count = vol.read_dir(&mut out).unwrap();
    assert_eq!(count, 2);
    assert!(out[0].cluster >= 2 && out[1].cluster >= 2);
    assert_ne!(out[0].cluster, out[1].cluster);
}

#[test]
fn copy_empty_file() {
    let mut vol = mounted();
    vol.create("A.TXT", &[]).unwrap();
    vol.copy("A.TXT", "B.TXT").unwrap();

    let mut out = blank_listing();
    assert_eq!(vol.read_dir(&mut out).unwrap(), 2);
    assert_eq!(out[1].size, 0);
    assert_eq!(out[1].cluster, 0);
}

#[test]
fn copy_missing_source() {
    let mut vol = mounted();
    assert_eq!(vol.copy("NOPE", "DST"), Err(FsError::NotFound));
}

// ── invariants ───────────────────────────────────────────────────────────

#[test]
fn fat_mirrors_stay_identical() {
    let mut vol = mounted();
    vol.create("ONE.TXT", b"one").unwrap();
    vol.write("TWO.BIN", &[0x5A; 3000]).unwrap();
    vol.remove("ONE.TXT").unwrap();
    vol.rename("TWO.BIN", "TRE.BIN").unwrap();
    vol.copy("TRE.BIN", "FOUR.BIN").unwrap();

    let fat_bytes = vol.fat_size as usize * 512;
    let fat0 = &vol.disk.0[32 * 512..32 * 512 + fat_bytes];
    let fat1 = &vol.disk.0[32 * 512 + fat_bytes..32 * 512 + 2 * fat_bytes];
    assert_eq!(fat0, fat1);
}

#[test]
fn chains_terminate_in_eoc() {
    let mut vol = mounted();
    vol.create("A.BIN", &[1; 700]).unwrap();
    vol.create("B.BIN", &[2; 1500]).unwrap();

    let mut out = blank_listing();
    let count = vol.read_dir(&mut out).unwrap();
    let max_steps = vol.max_cluster() - 2;
    for e in &out[..count] {
        let mut c = e.cluster;
        let mut steps = 0;
        while c >= 2 && c < FAT_EOC_MIN {
            c = vol.fat_entry(c).unwrap();
            steps += 1;
            assert!(steps <= max_steps, "chain did not terminate");
        }
        assert!(c >= FAT_EOC_MIN, "chain ended on a non-EOC entry: {c:#x}");
    }
}

#[test]
fn fat_write_preserves_reserved_bits() {
    let mut vol = mounted();
    let c = 1000u32;
    let off = 32 * 512 + c as usize * 4;
    vol.disk.0[off..off + 4].copy_from_slice(&0xF000_0000u32.to_le_bytes());

    vol.set_fat_entry(c, FAT_EOC).unwrap();
    let word = u32::from_le_bytes(vol.disk.0[off..off + 4].try_into().unwrap());
    assert_eq!(word, 0xFFFF_FFFF);

    vol.set_fat_entry(c, FAT_FREE).unwrap();
    let word = u32::from_le_bytes(vol.disk.0[off..off + 4].try_into().unwrap());
    assert_eq!(word, 0xF000_0000);
}

// ── chkdsk ───────────────────────────────────────────────────────────────

#[test]
fn chkdsk_reclaims_a_leaked_chain() {
    let mut vol = mounted();
    vol.create("KEEP.TXT", b"not an orphan").unwrap();

    // Leak: allocate a chain without committing a directory entry for it.
    vol.allocate_chain(3).unwrap();

    assert_eq!(vol.check().unwrap(), 3);
    assert_eq!(vol.check().unwrap(), 0);

    let mut buf = [0u8; 32];
    let n = vol.read_to_buffer("KEEP.TXT", &mut buf).unwrap();
    assert_eq!(&buf[..n], b"not an orphan");
}

#[test]
fn chkdsk_clean_after_mixed_operations() {
    let mut vol = mounted();
    vol.create("A.TXT", b"aaa").unwrap();
    vol.write("B.BIN", &[7; 2048]).unwrap();
    vol.copy("B.BIN", "C.BIN").unwrap();
    vol.remove("A.TXT").unwrap();
    vol.write("B.BIN", &[9; 100]).unwrap();
    vol.rename("C.BIN", "D.BIN").unwrap();
    assert_eq!(vol.check().unwrap(), 0);
}
