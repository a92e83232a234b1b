//! Volume formatting: boot sector + backup, FSInfo, FAT initialization and
//! root directory clearing.

use crate::volume::Bpb;
use crate::{BlockDev, FsError, FsResult, SECTOR_SIZE};

const RESERVED_SECTORS: u32 = 32;
const MIN_TOTAL_SECTORS: u32 = 65_536;
const MIN_CLUSTERS: u32 = 65_525;

/// Cluster size the formatter picks for a given disk, following the usual
/// FAT32 size brackets.
pub fn suggest_sectors_per_cluster(total_sectors: u32) -> u8 {
    if total_sectors >= 33_554_432 {
        64 // >= 16 GiB
    } else if total_sectors >= 16_777_216 {
        32 // >= 8 GiB
    } else if total_sectors >= 524_288 {
        16 // >= 256 MiB
    } else {
        8
    }
}

/// Format the device as a FAT32 volume.
///
/// `sectors_per_cluster` must be a nonzero power of two and the resulting
/// geometry must yield at least 65 525 clusters, the FAT32 floor.
pub fn format<D: BlockDev>(
    disk: &mut D,
    total_sectors: u32,
    sectors_per_cluster: u8,
) -> FsResult<()> {
    if total_sectors < MIN_TOTAL_SECTORS {
        return Err(FsError::TooFewClusters);
    }
    if sectors_per_cluster == 0 || !sectors_per_cluster.is_power_of_two() {
        return Err(FsError::TooFewClusters);
    }

    let spc = sectors_per_cluster as u32;
    // One FAT sector describes 128 clusters, i.e. 128 * spc data sectors;
    // with two FATs each sector of FAT pays for (256 * spc + 2) / 2 sectors
    // of disk. Slightly overestimates the FAT, which is the safe direction.
    let denom = 128 * spc + 1;
    let fat_size = (total_sectors - RESERVED_SECTORS).div_ceil(denom);
    let clusters = (total_sectors - RESERVED_SECTORS - 2 * fat_size) / spc;
    if clusters < MIN_CLUSTERS {
        return Err(FsError::TooFewClusters);
    }

    // Boot sector, mirrored to the backup slot at sector 6.
    let mut sec = [0u8; SECTOR_SIZE];
    let bpb = Bpb {
        jmp_boot: [0xEB, 0x58, 0x90],
        oem_name: *b"MSDOS5.0",
        bytes_per_sec: (SECTOR_SIZE as u16).to_le(),
        sec_per_clus: sectors_per_cluster,
        rsvd_sec_cnt: (RESERVED_SECTORS as u16).to_le(),
        num_fats: 2,
        root_ent_cnt: 0,
        tot_sec16: 0,
        media: 0xF8,
        fat_sz16: 0,
        sec_per_trk: 63u16.to_le(),
        num_heads: 255u16.to_le(),
        hidd_sec: 0,
        tot_sec32: total_sectors.to_le(),
        fat_sz32: fat_size.to_le(),
        ext_flags: 0,
        fs_ver: 0,
        root_clus: 2u32.to_le(),
        fs_info: 1u16.to_le(),
        bk_boot_sec: 6u16.to_le(),
        reserved: [0; 12],
        drv_num: 0x80,
        reserved1: 0,
        boot_sig: 0x29,
        vol_id: 0x1234_5678u32.to_le(),
        vol_lab: *b"NO NAME    ",
        fil_sys_type: *b"FAT32   ",
    };
    let bpb_bytes = unsafe {
        core::slice::from_raw_parts(&bpb as *const Bpb as *const u8, core::mem::size_of::<Bpb>())
    };
    sec[..bpb_bytes.len()].copy_from_slice(bpb_bytes);
    sec[510] = 0x55;
    sec[511] = 0xAA;
    if !disk.write(0, &sec) || !disk.write(6, &sec) {
        return Err(FsError::Io);
    }

    // FSInfo sector.
    let mut sec = [0u8; SECTOR_SIZE];
    sec[0..4].copy_from_slice(&0x4161_5252u32.to_le_bytes());
    sec[484..488].copy_from_slice(&0x6141_7272u32.to_le_bytes());
    sec[488..492].copy_from_slice(&(clusters - 1).to_le_bytes());
    sec[492..496].copy_from_slice(&3u32.to_le_bytes());
    sec[510] = 0x55;
    sec[511] = 0xAA;
    if !disk.write(1, &sec) {
        return Err(FsError::Io);
    }

    // First FAT sector: media entry, reserved entry, EOC for the root
    // directory cluster.
    let mut sec = [0u8; SECTOR_SIZE];
    sec[0..4].copy_from_slice(&0x0FFF_FFF8u32.to_le_bytes());
    sec[4..8].copy_from_slice(&0x0FFF_FFFFu32.to_le_bytes());
    sec[8..12].copy_from_slice(&0x0FFF_FFFFu32.to_le_bytes());
    for fat_i in 0..2u32 {
        let lba = (RESERVED_SECTORS + fat_i * fat_size) as u64;
        if !disk.write(lba, &sec) {
            return Err(FsError::Io);
        }
    }

    // Remaining FAT sectors are all free entries.
    let sec = [0u8; SECTOR_SIZE];
    for fat_i in 0..2u32 {
        let base = (RESERVED_SECTORS + fat_i * fat_size) as u64;
        for s in 1..fat_size as u64 {
            if !disk.write(base + s, &sec) {
                return Err(FsError::Io);
            }
        }
    }

    // Root directory cluster (cluster 2, right at the start of the data area).
    let data_start = RESERVED_SECTORS + 2 * fat_size;
    for s in 0..spc as u64 {
        if !disk.write(data_start as u64 + s, &sec) {
            return Err(FsError::Io);
        }
    }
    Ok(())
}
