//! Read-only reader for the FAT16 root directory the kernel boots from.
//!
//! Out of scope per the core's own boundary (§1), but implemented here
//! rather than stubbed: the reference kernel this core was distilled from
//! keeps this reader in the same source file as the open-file layer it
//! feeds, so `load_file`/`search_file` are reused as the pure primitive the
//! inode cache (component B) is built on.
//!
//! Deliberately minimal: read-only, root-directory-only (no subdirectories,
//! no long filenames, no writes), matching the Non-goals.

use crate::hal::{Hal, HalError, Page};

const BOOT_SIGNATURE: u16 = 0xAA55;
const ENTRY_EMPTY: u8 = 0x00;
const ENTRY_DELETED: u8 = 0xE5;
const INVALID_ATTR: u8 = 0x0F; // long-filename entries, unsupported here
const END_OF_DATA: u16 = 0xFFF8;
const FAT_RESERVED_CLUSTERS: u16 = 2;

pub const NAME_LEN: usize = 8;
pub const EXT_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatError {
    BadSignature,
    NotFound,
    BadPath,
    ReadFailed,
}

/// BIOS Parameter Block fields this reader consumes (§6).
#[derive(Debug, Clone, Copy)]
pub struct Bpb {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sector_count: u16,
    pub fat_count: u8,
    pub sectors_per_fat: u16,
    pub root_entry_count: u16,
}

impl Bpb {
    /// Parses a BPB out of the first sector of the FAT16 partition and
    /// checks the 0xAA55 boot signature at byte 510.
    pub fn parse(sector: &[u8]) -> Result<Self, FatError> {
        if sector.len() < 512 {
            return Err(FatError::BadSignature);
        }
        let sig = u16::from_le_bytes([sector[510], sector[511]]);
        if sig != BOOT_SIGNATURE {
            return Err(FatError::BadSignature);
        }
        Ok(Self {
            bytes_per_sector: u16::from_le_bytes([sector[11], sector[12]]),
            sectors_per_cluster: sector[13],
            reserved_sector_count: u16::from_le_bytes([sector[14], sector[15]]),
            fat_count: sector[16],
            sectors_per_fat: u16::from_le_bytes([sector[22], sector[23]]),
            root_entry_count: u16::from_le_bytes([sector[17], sector[18]]),
        })
    }

    fn cluster_size(&self) -> u32 {
        self.bytes_per_sector as u32 * self.sectors_per_cluster as u32
    }

    fn fat_offset(&self) -> u32 {
        self.reserved_sector_count as u32 * self.bytes_per_sector as u32
    }

    fn root_dir_offset(&self) -> u32 {
        (self.reserved_sector_count as u32
            + self.fat_count as u32 * self.sectors_per_fat as u32)
            * self.bytes_per_sector as u32
    }

    fn data_region_offset(&self) -> u32 {
        self.root_dir_offset() + self.root_entry_count as u32 * DirEntry::SIZE as u32
    }

    /// Byte offset, from the start of the partition, of `cluster`'s data.
    fn cluster_offset(&self, cluster: u16) -> u32 {
        debug_assert!(cluster >= FAT_RESERVED_CLUSTERS);
        self.data_region_offset() + (cluster - FAT_RESERVED_CLUSTERS) as u32 * self.cluster_size()
    }
}

/// One 32-byte FAT16 directory entry, 8.3 name/ext, no long-name support.
#[derive(Debug, Clone, Copy)]
pub struct DirEntry {
    pub name: [u8; NAME_LEN],
    pub ext: [u8; EXT_LEN],
    pub attr: u8,
    pub cluster_index: u16,
    pub file_size: u32,
}

impl DirEntry {
    const SIZE: usize = 32;

    fn from_bytes(b: &[u8]) -> Self {
        let mut name = [0u8; NAME_LEN];
        name.copy_from_slice(&b[0..8]);
        let mut ext = [0u8; EXT_LEN];
        ext.copy_from_slice(&b[8..11]);
        Self {
            name,
            ext,
            attr: b[11],
            cluster_index: u16::from_le_bytes([b[26], b[27]]),
            file_size: u32::from_le_bytes([b[28], b[29], b[30], b[31]]),
        }
    }

    fn is_free(&self) -> bool {
        self.name[0] == ENTRY_EMPTY || self.name[0] == ENTRY_DELETED
    }

    fn is_valid_file(&self) -> bool {
        !self.is_free() && self.attr != INVALID_ATTR
    }
}

/// An 8.3 name split into space-padded name/ext fields, matching the
/// on-disk representation so entries can be compared byte-for-byte.
pub struct EightDotThree {
    pub name: [u8; NAME_LEN],
    pub ext: [u8; EXT_LEN],
}

/// Splits `path` ("NAME.EXT") into space-padded 8.3 fields. Rejects paths
/// containing '/': no subdirectories are supported.
pub fn split_path(path: &str) -> Result<EightDotThree, FatError> {
    if path.contains('/') {
        return Err(FatError::BadPath);
    }
    let mut name = [b' '; NAME_LEN];
    let mut ext = [b' '; EXT_LEN];
    let (base, extension) = match path.split_once('.') {
        Some((b, e)) => (b, e),
        None => (path, ""),
    };
    if base.is_empty() || base.len() > NAME_LEN || extension.len() > EXT_LEN {
        return Err(FatError::BadPath);
    }
    for (i, c) in base.bytes().enumerate() {
        name[i] = c.to_ascii_uppercase();
    }
    for (i, c) in extension.bytes().enumerate() {
        ext[i] = c.to_ascii_uppercase();
    }
    Ok(EightDotThree { name, ext })
}

/// Handle to the mounted, read-only FAT16 volume. Holds the HAL page that
/// the whole partition image was loaded into by the boot sequence; all
/// offsets computed from the BPB are relative to the start of that page.
pub struct Fat16 {
    bpb: Bpb,
    partition: Page,
}

impl Fat16 {
    /// Mounts the FAT16 volume whose first sector has already been staged
    /// into `partition` (by the out-of-scope boot loader / disk driver).
    pub fn mount(hal: &dyn Hal, partition: Page) -> Result<Self, FatError> {
        let bpb = Bpb::parse(hal.page_bytes_mut(partition))?;
        Ok(Self { bpb, partition })
    }

    fn bytes<'h>(&self, hal: &'h dyn Hal) -> &'h [u8] {
        hal.page_bytes_mut(self.partition)
    }

    fn root_dir<'h>(&self, hal: &'h dyn Hal) -> &'h [u8] {
        let off = self.bpb.root_dir_offset() as usize;
        let len = self.bpb.root_entry_count as usize * DirEntry::SIZE;
        &self.bytes(hal)[off..off + len]
    }

    fn dir_entry(&self, hal: &dyn Hal, index: usize) -> DirEntry {
        let dir = self.root_dir(hal);
        DirEntry::from_bytes(&dir[index * DirEntry::SIZE..(index + 1) * DirEntry::SIZE])
    }

    /// Linear scan of the root directory for `path`; returns its slot index
    /// (the same index the inode cache uses, invariant 9).
    pub fn search_file(&self, hal: &dyn Hal, path: &str) -> Result<usize, FatError> {
        let needle = split_path(path)?;
        let dir = self.root_dir(hal);
        for i in 0..self.bpb.root_entry_count as usize {
            let e = DirEntry::from_bytes(&dir[i * DirEntry::SIZE..(i + 1) * DirEntry::SIZE]);
            if !e.is_valid_file() {
                continue;
            }
            if e.name == needle.name && e.ext == needle.ext {
                return Ok(i);
            }
        }
        Err(FatError::NotFound)
    }

    fn next_cluster(&self, hal: &dyn Hal, cluster: u16) -> u16 {
        let fat_off = self.bpb.fat_offset() as usize + cluster as usize * 2;
        let bytes = self.bytes(hal);
        u16::from_le_bytes([bytes[fat_off], bytes[fat_off + 1]])
    }

    fn read_chain(&self, hal: &dyn Hal, mut cluster: u16, size: u32, buf: &mut [u8]) -> u32 {
        let cluster_size = self.bpb.cluster_size();
        let mut read = 0u32;
        while read < size {
            let off = self.bpb.cluster_offset(cluster) as usize;
            let remaining = size - read;
            let this_read = remaining.min(cluster_size);
            let src = &self.bytes(hal)[off..off + this_read as usize];
            buf[read as usize..(read + this_read) as usize].copy_from_slice(src);
            read += this_read;

            let next = self.next_cluster(hal, cluster);
            if next >= END_OF_DATA {
                break;
            }
            cluster = next;
        }
        read
    }

    /// Reads the directory entry at `dir_index`'s full contents into `buf`.
    pub fn read_file(&self, hal: &dyn Hal, dir_index: usize, buf: &mut [u8]) -> Result<u32, FatError> {
        let entry = self.dir_entry(hal, dir_index);
        if buf.len() < entry.file_size as usize {
            return Err(FatError::ReadFailed);
        }
        let read = self.read_chain(hal, entry.cluster_index, entry.file_size, buf);
        if read != entry.file_size {
            return Err(FatError::ReadFailed);
        }
        Ok(read)
    }

    /// `load_file(path, buf) -> status`: the one primitive §1 says this
    /// crate may reuse from the raw reader without re-deriving it.
    pub fn load_file(&self, hal: &dyn Hal, path: &str, buf: &mut [u8]) -> Result<u32, FatError> {
        let index = self.search_file(hal, path)?;
        self.read_file(hal, index, buf)
    }

    pub fn dir_entry_at(&self, hal: &dyn Hal, dir_index: usize) -> DirEntry {
        self.dir_entry(hal, dir_index)
    }

    pub fn root_entry_count(&self) -> usize {
        self.bpb.root_entry_count as usize
    }
}

impl From<HalError> for FatError {
    fn from(_: HalError) -> Self {
        FatError::ReadFailed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::fake::FakeHal;
    use crate::hal::Hal;

    /// Builds a minimal one-file FAT16 image: BPB with tiny geometry, one
    /// root entry for "HELLO.BIN", one data cluster holding its contents.
    fn build_image(contents: &[u8]) -> (FakeHal, u32) {
        let bytes_per_sector: u16 = 512;
        let sectors_per_cluster: u8 = 1;
        let reserved_sector_count: u16 = 1;
        let fat_count: u8 = 1;
        let sectors_per_fat: u16 = 1;
        let root_entry_count: u16 = 16;

        let root_dir_off = (reserved_sector_count as u32 + fat_count as u32 * sectors_per_fat as u32)
            * bytes_per_sector as u32;
        let data_off = root_dir_off + root_entry_count as u32 * 32;
        let cluster_size = bytes_per_sector as u32 * sectors_per_cluster as u32;
        let total = data_off as usize + cluster_size as usize;

        let hal = FakeHal::new(total);
        let page = hal.alloc_page().unwrap();
        {
            let buf = hal.page_bytes_mut(page);
            buf[11..13].copy_from_slice(&bytes_per_sector.to_le_bytes());
            buf[13] = sectors_per_cluster;
            buf[14..16].copy_from_slice(&reserved_sector_count.to_le_bytes());
            buf[16] = fat_count;
            buf[17..19].copy_from_slice(&root_entry_count.to_le_bytes());
            buf[22..24].copy_from_slice(&sectors_per_fat.to_le_bytes());
            buf[510] = 0x55;
            buf[511] = 0xAA;

            // FAT: cluster 2 terminates the chain.
            let fat_off = reserved_sector_count as usize * bytes_per_sector as usize;
            buf[fat_off + 4..fat_off + 6].copy_from_slice(&END_OF_DATA.to_le_bytes());

            // Root dir entry 0: "HELLO   BIN", cluster 2, size = contents.len().
            let e = root_dir_off as usize;
            buf[e..e + 8].copy_from_slice(b"HELLO   ");
            buf[e + 8..e + 11].copy_from_slice(b"BIN");
            buf[e + 11] = 0x20; // archive attribute, not a long-name entry
            buf[e + 26..e + 28].copy_from_slice(&2u16.to_le_bytes());
            buf[e + 28..e + 32].copy_from_slice(&(contents.len() as u32).to_le_bytes());

            // Data cluster 2.
            buf[data_off as usize..data_off as usize + contents.len()].copy_from_slice(contents);
        }
        (hal, page)
    }

    #[test]
    fn search_file_finds_and_rejects() {
        let (hal, page) = build_image(b"hi");
        let fs = Fat16::mount(&hal, page).unwrap();
        assert_eq!(fs.search_file(&hal, "HELLO.BIN").unwrap(), 0);
        assert!(matches!(
            fs.search_file(&hal, "NOPE.BIN"),
            Err(FatError::NotFound)
        ));
    }

    #[test]
    fn load_file_round_trips_contents() {
        let (hal, page) = build_image(b"hello world");
        let fs = Fat16::mount(&hal, page).unwrap();
        let mut buf = [0u8; 32];
        let n = fs.load_file(&hal, "HELLO.BIN", &mut buf).unwrap();
        assert_eq!(&buf[..n as usize], b"hello world");
    }

    #[test]
    fn split_path_rejects_subdirectories() {
        assert!(matches!(split_path("A/B.BIN"), Err(FatError::BadPath)));
        let ok = split_path("A.BIN").unwrap();
        assert_eq!(&ok.name[..1], b"A");
    }
}
