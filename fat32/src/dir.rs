//! Directory walking and file operations.

use alloc::vec;

use crate::names::{from_83, to_83};
use crate::volume::Volume;
use crate::{
    BlockDev, FsError, FsResult, ATTR_ARCHIVE, ATTR_DIRECTORY, ATTR_LONG_NAME, ATTR_VOLUME_ID,
    DELETED_ENTRY, DIR_ENTRY_SIZE, SECTOR_SIZE,
};

const ENTRIES_PER_SECTOR: usize = SECTOR_SIZE / DIR_ENTRY_SIZE;

// ─── Directory entry (32 bytes) ────────────────────────────────────────────────

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub(crate) struct RawDirEntry {
    pub name: [u8; 11],
    pub attr: u8,
    pub nt_res: u8,
    pub crt_time_tenth: u8,
    pub crt_time: u16,
    pub crt_date: u16,
    pub lst_acc_date: u16,
    pub fst_clus_hi: u16,
    pub wrt_time: u16,
    pub wrt_date: u16,
    pub fst_clus_lo: u16,
    pub file_size: u32,
}

impl RawDirEntry {
    pub fn is_end(&self) -> bool {
        self.name[0] == 0x00
    }

    pub fn is_deleted(&self) -> bool {
        self.name[0] == DELETED_ENTRY
    }

    /// Long-name and volume-label entries never participate in lookups.
    pub fn is_skipped(&self) -> bool {
        self.is_deleted() || self.attr & (ATTR_LONG_NAME | ATTR_VOLUME_ID) != 0
    }

    pub fn is_dir(&self) -> bool {
        self.attr & ATTR_DIRECTORY != 0
    }

    pub fn first_cluster(&self) -> u32 {
        ((u16::from_le(self.fst_clus_hi) as u32) << 16) | u16::from_le(self.fst_clus_lo) as u32
    }

    pub fn size(&self) -> u32 {
        u32::from_le(self.file_size)
    }

    fn new_file(name83: [u8; 11], first_cluster: u32, size: u32) -> Self {
        RawDirEntry {
            name: name83,
            attr: ATTR_ARCHIVE,
            nt_res: 0,
            crt_time_tenth: 0,
            crt_time: 0,
            crt_date: 0,
            lst_acc_date: 0,
            fst_clus_hi: ((first_cluster >> 16) as u16).to_le(),
            wrt_time: 0,
            wrt_date: 0,
            fst_clus_lo: (first_cluster as u16).to_le(),
            file_size: size.to_le(),
        }
    }
}

/// A live directory entry's on-disk location: the sector holding it and the
/// entry index inside that sector.
#[derive(Clone, Copy)]
pub(crate) struct DirSlot {
    pub lba: u64,
    pub index: usize,
}

/// A listing row returned by [`Volume::read_dir`].
pub struct Entry {
    pub cluster: u32,
    pub size: u32,
    pub is_dir: bool,
    pub name: [u8; 12],
    pub name_len: usize,
}

pub(crate) fn entry_at(sec: &[u8; SECTOR_SIZE], index: usize) -> RawDirEntry {
    unsafe { *(sec.as_ptr().add(index * DIR_ENTRY_SIZE) as *const RawDirEntry) }
}

// ─── File operations ───────────────────────────────────────────────────────────

impl<D: BlockDev> Volume<D> {
    /// List up to `out.len()` entries of the current directory.
    /// Returns the number of entries written.
    pub fn read_dir(&mut self, out: &mut [Entry]) -> FsResult<usize> {
        let mut count = 0;
        let mut cluster = self.current_dir;

        'walk: while !Self::is_eoc(cluster) && cluster >= 2 {
            let lba = self.cluster_to_lba(cluster);
            for s in 0..self.sectors_per_cluster as u64 {
                let mut sec = [0u8; SECTOR_SIZE];
                if !self.disk.read(lba + s, &mut sec) {
                    return Err(FsError::Io);
                }
                for i in 0..ENTRIES_PER_SECTOR {
                    let de = entry_at(&sec, i);
                    if de.is_end() {
                        break 'walk;
                    }
                    if de.is_skipped() {
                        continue;
                    }
                    if count >= out.len() {
                        break 'walk;
                    }
                    let mut name = [0u8; 12];
                    let name_len = from_83(&de.name, &mut name);
                    out[count] = Entry {
                        cluster: de.first_cluster(),
                        size: de.size(),
                        is_dir: de.is_dir(),
                        name,
                        name_len,
                    };
                    count += 1;
                }
            }
            cluster = self.fat_entry(cluster)?;
        }
        Ok(count)
    }

    /// Read a whole file into `buf`, NUL-terminated. At most
    /// `buf.len() - 1` bytes are copied. Returns bytes read.
    pub fn read_to_buffer(&mut self, name: &str, buf: &mut [u8]) -> FsResult<usize> {
        let (_, de) = self.find_entry(&to_83(name))?.ok_or(FsError::NotFound)?;
        if buf.is_empty() {
            return Ok(0);
        }
        let limit = buf.len() - 1;
        let n = self.read_chain(de.first_cluster(), de.size(), &mut buf[..limit])?;
        buf[n] = 0;
        Ok(n)
    }

    /// Create a file in the current directory from `data`.
    ///
    /// The cluster chain is allocated and written first; only then is the
    /// directory entry committed, so a failure part-way leaves nothing
    /// visible and the chain is rolled back.
    pub fn create(&mut self, name: &str, data: &[u8]) -> FsResult<()> {
        let name83 = to_83(name);

        let first_cluster = if data.is_empty() {
            0
        } else {
            let clusters = data.len().div_ceil(self.cluster_bytes()) as u32;
            let first = self.allocate_chain(clusters)?;
            if let Err(e) = self.write_chain(first, data) {
                let _ = self.free_chain(first);
                return Err(e);
            }
            first
        };

        let slot = match self.find_free_slot() {
            Ok(Some(slot)) => slot,
            Ok(None) => {
                if first_cluster >= 2 {
                    let _ = self.free_chain(first_cluster);
                }
                return Err(FsError::DirectoryFull);
            }
            Err(e) => {
                if first_cluster >= 2 {
                    let _ = self.free_chain(first_cluster);
                }
                return Err(e);
            }
        };

        let de = RawDirEntry::new_file(name83, first_cluster, data.len() as u32);
        if let Err(e) = self.write_dir_entry(slot, &de) {
            if first_cluster >= 2 {
                let _ = self.free_chain(first_cluster);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Delete a file: mark its slot deleted, then free its chain.
    pub fn remove(&mut self, name: &str) -> FsResult<()> {
        let (slot, de) = self.find_entry(&to_83(name))?.ok_or(FsError::NotFound)?;
        let first_cluster = de.first_cluster();

        let mut sec = [0u8; SECTOR_SIZE];
        if !self.disk.read(slot.lba, &mut sec) {
            return Err(FsError::Io);
        }
        sec[slot.index * DIR_ENTRY_SIZE] = DELETED_ENTRY;
        if !self.disk.write(slot.lba, &sec) {
            return Err(FsError::DirWrite);
        }

        if first_cluster >= 2 {
            self.free_chain(first_cluster)?;
        }
        Ok(())
    }

    /// Replace a file's contents. Atomic only with respect to the caller,
    /// not across a crash.
    pub fn write(&mut self, name: &str, data: &[u8]) -> FsResult<()> {
        match self.remove(name) {
            Ok(()) | Err(FsError::NotFound) => {}
            Err(e) => return Err(e),
        }
        self.create(name, data)
    }

    /// Rename in place by overwriting the 11 name bytes. Does not check for
    /// a collision with an existing `new` entry.
    pub fn rename(&mut self, old: &str, new: &str) -> FsResult<()> {
        let (slot, _) = self.find_entry(&to_83(old))?.ok_or(FsError::NotFound)?;
        let name83 = to_83(new);

        let mut sec = [0u8; SECTOR_SIZE];
        if !self.disk.read(slot.lba, &mut sec) {
            return Err(FsError::Io);
        }
        let off = slot.index * DIR_ENTRY_SIZE;
        sec[off..off + 11].copy_from_slice(&name83);
        if !self.disk.write(slot.lba, &sec) {
            return Err(FsError::DirWrite);
        }
        Ok(())
    }

    /// Copy `src` to a new file `dst` with its own chain.
    pub fn copy(&mut self, src: &str, dst: &str) -> FsResult<()> {
        let (_, de) = self.find_entry(&to_83(src))?.ok_or(FsError::NotFound)?;
        let size = de.size() as usize;
        if size == 0 {
            return self.create(dst, &[]);
        }
        let mut buf = vec![0u8; size];
        let n = self.read_chain(de.first_cluster(), de.size(), &mut buf)?;
        self.create(dst, &buf[..n])
    }

    // ─── Directory walking ─────────────────────────────────────────────────────

    /// Locate a live entry by canonical name anywhere in the current
    /// directory's cluster chain.
    pub(crate) fn find_entry(&mut self, name83: &[u8; 11]) -> FsResult<Option<(DirSlot, RawDirEntry)>> {
        let mut cluster = self.current_dir;

        while !Self::is_eoc(cluster) && cluster >= 2 {
            let lba = self.cluster_to_lba(cluster);
            for s in 0..self.sectors_per_cluster as u64 {
                let mut sec = [0u8; SECTOR_SIZE];
                if !self.disk.read(lba + s, &mut sec) {
                    return Err(FsError::Io);
                }
                for i in 0..ENTRIES_PER_SECTOR {
                    let de = entry_at(&sec, i);
                    if de.is_end() {
                        return Ok(None);
                    }
                    if de.is_skipped() {
                        continue;
                    }
                    if de.name == *name83 {
                        return Ok(Some((DirSlot { lba: lba + s, index: i }, de)));
                    }
                }
            }
            cluster = self.fat_entry(cluster)?;
        }
        Ok(None)
    }

    /// First reusable slot (deleted or end-of-directory) in the current
    /// directory chain, or `None` when every slot is live.
    fn find_free_slot(&mut self) -> FsResult<Option<DirSlot>> {
        let mut cluster = self.current_dir;

        while !Self::is_eoc(cluster) && cluster >= 2 {
            let lba = self.cluster_to_lba(cluster);
            for s in 0..self.sectors_per_cluster as u64 {
                let mut sec = [0u8; SECTOR_SIZE];
                if !self.disk.read(lba + s, &mut sec) {
                    return Err(FsError::Io);
                }
                for i in 0..ENTRIES_PER_SECTOR {
                    let de = entry_at(&sec, i);
                    if de.is_end() || de.is_deleted() {
                        return Ok(Some(DirSlot { lba: lba + s, index: i }));
                    }
                }
            }
            cluster = self.fat_entry(cluster)?;
        }
        Ok(None)
    }

    fn write_dir_entry(&mut self, slot: DirSlot, de: &RawDirEntry) -> FsResult<()> {
        let mut sec = [0u8; SECTOR_SIZE];
        if !self.disk.read(slot.lba, &mut sec) {
            return Err(FsError::Io);
        }
        let off = slot.index * DIR_ENTRY_SIZE;
        let bytes = unsafe {
            core::slice::from_raw_parts(de as *const RawDirEntry as *const u8, DIR_ENTRY_SIZE)
        };
        sec[off..off + DIR_ENTRY_SIZE].copy_from_slice(bytes);
        if !self.disk.write(slot.lba, &sec) {
            return Err(FsError::DirWrite);
        }
        Ok(())
    }
}
