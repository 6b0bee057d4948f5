//! Cross-checks parted's geometry against the bytes on the device.
//!
//! Everything after parsing trusts the offsets parted reported, so a partition whose
//! device node does not begin with the same sector the disk holds at its start offset
//! stops the run before anything is resized.

use super::{Disk, Partition};
use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

#[derive(Debug, Fail)]
pub enum ConsistencyError {
    #[fail(
        display = "partition {} spans {} - {}, which disagrees with its size of {} bytes",
        number, start, end, size
    )]
    Geometry { number: u32, start: u64, end: u64, size: u64 },
    #[fail(display = "unable to open {:?}: {}", path, why)]
    Open { path: PathBuf, why: io::Error },
    #[fail(display = "unable to read {:?} at offset {}: {}", path, offset, why)]
    Read { path: PathBuf, offset: u64, why: io::Error },
    #[fail(
        display = "short read of {:?} at offset {}: expected {} bytes, got {}",
        path, offset, expected, read
    )]
    ShortRead { path: PathBuf, offset: u64, expected: usize, read: usize },
    #[fail(
        display = "partition {} differs from the disk at byte {} (disk offset {}): {:#04x} != {:#04x}",
        number, byte, disk_offset, partition, disk
    )]
    Mismatch { number: u32, byte: usize, disk_offset: u64, partition: u8, disk: u8 },
}

/// Checks that a partition's inclusive range agrees with its size.
pub fn check_geometry(part: &Partition) -> Result<(), ConsistencyError> {
    let spans = part.end.checked_sub(part.start).map(|span| span + 1);
    if spans != Some(part.size) {
        return Err(ConsistencyError::Geometry {
            number: part.number,
            start:  part.start,
            end:    part.end,
            size:   part.size,
        });
    }

    Ok(())
}

/// Reads exactly `count` bytes at `offset`. The file is closed before returning.
fn read_at(path: &Path, offset: u64, count: usize) -> Result<Vec<u8>, ConsistencyError> {
    let mut file =
        File::open(path).map_err(|why| ConsistencyError::Open { path: path.into(), why })?;

    let read_error = |why| ConsistencyError::Read { path: path.into(), offset, why };
    file.seek(SeekFrom::Start(offset)).map_err(read_error)?;

    let mut buffer = vec![0u8; count];
    let mut read = 0;
    while read < count {
        match file.read(&mut buffer[read..]) {
            Ok(0) => break,
            Ok(bytes) => read += bytes,
            Err(ref why) if why.kind() == io::ErrorKind::Interrupted => continue,
            Err(why) => return Err(read_error(why)),
        }
    }

    if read != count {
        return Err(ConsistencyError::ShortRead { path: path.into(), offset, expected: count, read });
    }

    Ok(buffer)
}

/// Compares the first logical sector of a partition's device node with the sector the
/// raw disk holds at the partition's start offset.
pub fn check_partition(disk: &Disk, part: &Partition) -> Result<(), ConsistencyError> {
    check_geometry(part)?;

    let count = disk.logical_sector as usize;
    let node = part.device_path(&disk.path);
    let from_partition = read_at(&node, 0, count)?;
    let from_disk = read_at(Path::new(&disk.path), part.start, count)?;

    let difference = from_partition.iter().zip(from_disk.iter()).enumerate().find(|(_, (a, b))| a != b);
    if let Some((byte, (&partition, &disk_byte))) = difference {
        return Err(ConsistencyError::Mismatch {
            number: part.number,
            byte,
            disk_offset: part.start + byte as u64,
            partition,
            disk: disk_byte,
        });
    }

    debug!("partition {} agrees with {} at offset {}", part.number, disk.path, part.start);
    Ok(())
}

impl Disk {
    /// Validates every allocated partition, one device node at a time.
    pub fn validate(&self) -> Result<(), ConsistencyError> {
        for part in self.allocated() {
            check_partition(self, part)?;
        }

        info!("validated {} partitions on {}", self.allocated().count(), self.path);
        Ok(())
    }
}
