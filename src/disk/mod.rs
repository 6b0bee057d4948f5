//! The disk layout, as parted reports it in byte units with free space listed.

mod header;
mod partition;
pub mod validate;

pub use self::{
    header::{Column, Columns, Record},
    partition::{Partition, FREE_SPACE},
    validate::ConsistencyError,
};

use self::header::{END, FILE_SYSTEM, FLAGS, NAME, NUMBER, SIZE, START, TYPE};
use crate::{config::Identity, size::parse_size};
use external::{Parted, Runner};
use std::{io, path::PathBuf};

const MODEL: &str = "Model";
const SECTOR_SIZE: &str = "Sector size (logical/physical)";
const PARTITION_TABLE: &str = "Partition Table";
const DISK_FLAGS: &str = "Disk Flags";

/// Errors that arise while decoding parted's report.
#[derive(Debug, Fail)]
pub enum ParseError {
    #[fail(display = "unable to obtain the partition report: {}", why)]
    Command { why: io::Error },
    #[fail(display = "report lacks the '{}' header", key)]
    MissingHeader { key: String },
    #[fail(display = "failed to scan size of disk {}: '{}'", disk, value)]
    DiskSize { disk: String, value: String },
    #[fail(display = "failed to scan logical/physical sector size of disk {}: '{}'", disk, value)]
    SectorSize { disk: String, value: String },
    #[fail(display = "report lacks a column header row")]
    NoColumns,
    #[fail(display = "column header row lacks the '{}' column", column)]
    MissingColumn { column: &'static str },
    #[fail(display = "failed to scan partition {} on line {}: '{}'", field, line, value)]
    Field { line: usize, field: &'static str, value: String },
    #[fail(display = "failed to parse size '{}' of partition {}", size, number)]
    PartitionSize { number: u32, size: String },
    #[fail(
        display = "parsed disk size, {}, is {} bytes less than counted partition sizes, {}: parted must be out of touch",
        disk, difference, parts
    )]
    Overcommitted { disk: u64, parts: u64, difference: u64 },
}

/// One line of the partition table, before its size has been checked.
#[derive(Debug, Clone, PartialEq)]
struct Entry {
    number: u32,
    start:  u64,
    end:    u64,
    /// The size column as written.
    size:   String,
    /// `None` if the size column could not be decoded.
    bytes:  Option<u64>,
    fs:     String,
    name:   String,
    flags:  String,
    kind:   Option<String>,
}

/// Decodes an integer with parted's byte unit suffix, such as `1048576B`.
fn parse_bytes(value: &str) -> Option<u64> {
    let value = value.trim();
    value.strip_suffix('B').unwrap_or(value).parse::<u64>().ok()
}

/// A block device and its partition table.
#[derive(Debug, Clone, PartialEq)]
pub struct Disk {
    /// Path to the raw disk device.
    pub path:            String,
    /// The disk model, such as "ATA VBOX HARDDISK (scsi)".
    pub model:           String,
    /// The disk flags, such as "pmbr_boot".
    pub flags:           String,
    /// The partition table type, upper-cased, such as "GPT".
    pub table:           String,
    pub logical_sector:  u64,
    pub physical_sector: u64,
    /// The total size of the disk in bytes.
    pub size:            u64,
    /// Bytes not covered by any partition or listed gap.
    pub table_size:      u64,
    /// The combined size of every partition and gap.
    pub parts_size:      u64,
    /// Partitions and gaps of free space, in the order parted lists them.
    pub partitions:      Vec<Partition>,
}

impl Disk {
    /// Asks parted for the layout of its disk, including gaps of free space.
    pub fn probe<R: Runner + ?Sized>(runner: &R, parted: &Parted) -> Result<Disk, ParseError> {
        let report = parted.print_free(runner).map_err(|why| ParseError::Command { why })?;
        Disk::parse(&parted.disk, &report)
    }

    /// Decodes a report from `parted <path> unit B print free`.
    pub fn parse(path: &str, report: &str) -> Result<Disk, ParseError> {
        let disk_key = format!("Disk {}", path);

        let mut model = None;
        let mut size = None;
        let mut sectors = None;
        let mut table = None;
        let mut flags = None;
        let mut columns: Option<Columns> = None;
        let mut entries = Vec::new();

        for (index, line) in report.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }

            if let Some(ref columns) = columns {
                entries.push(parse_entry(columns, index + 1, line)?);
                continue;
            }

            match split_header(line) {
                Some((key, value)) => {
                    if key == MODEL {
                        model = Some(value.to_owned());
                    } else if key == disk_key {
                        size = Some(parse_bytes(value).ok_or_else(|| ParseError::DiskSize {
                            disk:  path.into(),
                            value: value.into(),
                        })?);
                    } else if key == SECTOR_SIZE {
                        sectors = Some(parse_sectors(value).ok_or_else(|| {
                            ParseError::SectorSize { disk: path.into(), value: value.into() }
                        })?);
                    } else if key == PARTITION_TABLE {
                        table = Some(value.to_uppercase());
                    } else if key == DISK_FLAGS {
                        flags = Some(value.to_owned());
                    } else {
                        debug!("ignoring report line: {}", line);
                    }
                }
                // The first line without a delimiter is the column header row.
                None => columns = Some(parse_columns(line)?),
            }
        }

        let size = size.ok_or_else(|| ParseError::MissingHeader { key: disk_key })?;
        let (logical_sector, physical_sector) =
            sectors.ok_or_else(|| ParseError::MissingHeader { key: SECTOR_SIZE.into() })?;
        let table = table.ok_or_else(|| ParseError::MissingHeader { key: PARTITION_TABLE.into() })?;
        if columns.is_none() {
            return Err(ParseError::NoColumns);
        }

        Disk::from_entries(DiskInfo {
            path: path.into(),
            model: model.unwrap_or_default(),
            flags: flags.unwrap_or_default(),
            table,
            logical_sector,
            physical_sector,
            size,
        }, entries)
    }

    fn from_entries(info: DiskInfo, entries: Vec<Entry>) -> Result<Disk, ParseError> {
        let mut partitions = Vec::with_capacity(entries.len());
        for entry in entries {
            let size = match entry.bytes {
                Some(size) => size,
                None => {
                    return Err(ParseError::PartitionSize { number: entry.number, size: entry.size })
                }
            };

            partitions.push(Partition {
                number: entry.number,
                start: entry.start,
                end: entry.end,
                size,
                fs: entry.fs,
                name: entry.name,
                flags: entry.flags,
                kind: entry.kind,
                wipe: false,
            });
        }

        let parts_size: u64 = partitions.iter().map(|part| part.size).sum();
        if parts_size > info.size {
            return Err(ParseError::Overcommitted {
                disk:       info.size,
                parts:      parts_size,
                difference: parts_size - info.size,
            });
        }

        Ok(Disk {
            path: info.path,
            model: info.model,
            flags: info.flags,
            table: info.table,
            logical_sector: info.logical_sector,
            physical_sector: info.physical_sector,
            size: info.size,
            table_size: info.size - parts_size,
            parts_size,
            partitions,
        })
    }

    /// Partitions that exist in the table, skipping gaps of free space.
    pub fn allocated(&self) -> impl Iterator<Item = &Partition> {
        self.partitions.iter().filter(|part| !part.is_free())
    }

    /// Gaps of free space.
    pub fn gaps(&self) -> impl Iterator<Item = &Partition> {
        self.partitions.iter().filter(|part| part.is_free())
    }

    /// The combined size of every gap of free space.
    pub fn free_space(&self) -> u64 { self.gaps().map(|gap| gap.size).sum() }

    pub fn get_partition_by_name(&self, name: &str) -> Option<&Partition> {
        self.allocated().find(|part| part.name == name)
    }

    pub fn get_partition_by_number(&self, number: u32) -> Option<&Partition> {
        self.allocated().find(|part| part.number == number)
    }

    /// Finds the partition a spec refers to: by name first, then by number.
    pub fn get_partition(&self, identity: &Identity) -> Option<&Partition> {
        identity
            .name()
            .and_then(|name| self.get_partition_by_name(name))
            .or_else(|| identity.number().and_then(|number| self.get_partition_by_number(number)))
    }

    /// The first allocated partition that begins at `start`.
    pub fn get_partition_at(&self, start: u64) -> Option<&Partition> {
        self.allocated().find(|part| part.start == start)
    }

    /// The device node of partition `number`.
    pub fn partition_path(&self, number: u32) -> PathBuf {
        PathBuf::from(format!("{}{}", self.path, number))
    }

    pub fn is_gpt(&self) -> bool { self.table == "GPT" }
}

struct DiskInfo {
    path:            String,
    model:           String,
    flags:           String,
    table:           String,
    logical_sector:  u64,
    physical_sector: u64,
    size:            u64,
}

/// Splits a `key: value` header line. The column header row has no delimiter.
fn split_header(line: &str) -> Option<(&str, &str)> {
    match line.find(": ") {
        Some(pos) => Some((&line[..pos], line[pos + 2..].trim())),
        None => {
            let trimmed = line.trim_end();
            if trimmed.ends_with(':') {
                Some((&trimmed[..trimmed.len() - 1], ""))
            } else {
                None
            }
        }
    }
}

/// Decodes `512B/4096B`.
fn parse_sectors(value: &str) -> Option<(u64, u64)> {
    let mut sizes = value.splitn(2, '/');
    let logical = parse_bytes(sizes.next()?)?;
    let physical = parse_bytes(sizes.next()?)?;
    if logical == 0 || physical == 0 {
        return None;
    }

    Some((logical, physical))
}

fn parse_columns(line: &str) -> Result<Columns, ParseError> {
    let columns = Columns::parse(line);
    for &column in &[NUMBER, START, END, SIZE] {
        if !columns.contains(column) {
            return Err(ParseError::MissingColumn { column });
        }
    }

    Ok(columns)
}

fn parse_entry(columns: &Columns, line_number: usize, line: &str) -> Result<Entry, ParseError> {
    let record = columns.slice(line);
    let field_error = |field: &'static str| ParseError::Field {
        line: line_number,
        field,
        value: record.get(field).to_owned(),
    };

    let number = match record.get(NUMBER) {
        "" => 0,
        number => number.parse::<u32>().map_err(|_| field_error(NUMBER))?,
    };
    let start = parse_bytes(record.get(START)).ok_or_else(|| field_error(START))?;
    let end = parse_bytes(record.get(END)).ok_or_else(|| field_error(END))?;
    let size = record.get(SIZE).to_owned();
    let bytes = parse_size(&size).ok();
    let kind = Some(record.get(TYPE)).filter(|kind| !kind.is_empty()).map(String::from);

    let entry = Entry {
        number,
        start,
        end,
        bytes,
        size,
        fs: record.get(FILE_SYSTEM).to_owned(),
        name: record.get(NAME).to_owned(),
        flags: record.get(FLAGS).to_owned(),
        kind,
    };

    debug!("parsed partition entry: {:?}", entry);
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "Model: SD SC32G (sd/mmc)
Disk /dev/mmcblk0: 1073741824B
Sector size (logical/physical): 512B/512B
Partition Table: gpt
Disk Flags:

Number  Start       End          Size         File system  Name      Flags
        17408B      1048575B     1031168B     Free Space
 1      1048576B    135266303B   134217728B   fat32        boot      boot, esp
 2      135266304B  269484031B   134217728B   ext4         rootfs
 3      269484032B  1073725439B  804241408B   ext4         data
        1073725440B  1073741823B  16384B      Free Space

";

    #[test]
    fn header() {
        let disk = Disk::parse("/dev/mmcblk0", REPORT).unwrap();
        assert_eq!(disk.model, "SD SC32G (sd/mmc)");
        assert_eq!(disk.size, 1_073_741_824);
        assert_eq!(disk.logical_sector, 512);
        assert_eq!(disk.physical_sector, 512);
        assert_eq!(disk.table, "GPT");
        assert!(disk.is_gpt());
        assert_eq!(disk.flags, "");
    }

    #[test]
    fn partitions() {
        let disk = Disk::parse("/dev/mmcblk0", REPORT).unwrap();
        assert_eq!(disk.partitions.len(), 5);
        assert_eq!(disk.allocated().count(), 3);

        let boot = disk.get_partition_by_name("boot").unwrap();
        assert_eq!(boot.number, 1);
        assert_eq!(boot.start, 1_048_576);
        assert_eq!(boot.end, 135_266_303);
        assert_eq!(boot.size, 134_217_728);
        assert_eq!(boot.fs, "fat32");
        assert_eq!(boot.flags, "boot, esp");

        let rootfs = disk.get_partition_by_number(2).unwrap();
        assert_eq!(rootfs.name, "rootfs");
        assert_eq!(rootfs.flags, "");

        assert_eq!(disk.free_space(), 1_031_168 + 16_384);
        assert!(disk.partitions[0].is_free());
        assert_eq!(disk.partitions[4].start, 1_073_725_440);
    }

    #[test]
    fn table_size() {
        let disk = Disk::parse("/dev/mmcblk0", REPORT).unwrap();
        let sum: u64 = disk.partitions.iter().map(|p| p.size).sum();
        assert_eq!(disk.parts_size, sum);
        assert_eq!(disk.table_size, disk.size - sum);
        assert_eq!(disk.table_size, 17_408);
    }

    #[test]
    fn overcommitted_report() {
        let report = REPORT.replace("Disk /dev/mmcblk0: 1073741824B", "Disk /dev/mmcblk0: 1000000000B");
        match Disk::parse("/dev/mmcblk0", &report) {
            Err(ParseError::Overcommitted { disk: 1_000_000_000, .. }) => (),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn lookup_by_identity() {
        let disk = Disk::parse("/dev/mmcblk0", REPORT).unwrap();
        assert_eq!(disk.get_partition(&Identity::Name("data".into())).unwrap().number, 3);
        assert_eq!(disk.get_partition(&Identity::Number(2)).unwrap().name, "rootfs");
        assert_eq!(
            disk.get_partition(&Identity::NameAndNumber("missing".into(), 1)).unwrap().name,
            "boot"
        );
        assert!(disk.get_partition(&Identity::Number(0)).is_none());
        assert!(disk.get_partition(&Identity::Name("Free Space".into())).is_none());
    }

    #[test]
    fn wrong_disk() {
        match Disk::parse("/dev/sda", REPORT) {
            Err(ParseError::MissingHeader { ref key }) if key == "Disk /dev/sda" => (),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn malformed_annotations() {
        let report = REPORT.replace("1073741824B", "1GB?");
        assert!(matches!(Disk::parse("/dev/mmcblk0", &report), Err(ParseError::DiskSize { .. })));

        let report = REPORT.replace("512B/512B", "512B");
        assert!(matches!(Disk::parse("/dev/mmcblk0", &report), Err(ParseError::SectorSize { .. })));
    }

    #[test]
    fn undecodable_size() {
        let report = REPORT.replace("134217728B   ext4", "134217728X   ext4");
        match Disk::parse("/dev/mmcblk0", &report) {
            Err(ParseError::PartitionSize { number: 2, ref size }) if size == "134217728X" => (),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn missing_columns() {
        let report = REPORT.replace("Number  Start", "Numbr   Start");
        assert!(matches!(
            Disk::parse("/dev/mmcblk0", &report),
            Err(ParseError::MissingColumn { column: "Number" })
        ));

        let header_only: String = REPORT.lines().take(5).map(|l| format!("{}\n", l)).collect();
        assert!(matches!(Disk::parse("/dev/mmcblk0", &header_only), Err(ParseError::NoColumns)));
    }

    #[test]
    fn warnings_before_the_header() {
        let report = format!(
            "Warning: Not all of the space available to /dev/mmcblk0 appears to be used.\n{}",
            REPORT
        );
        assert_eq!(Disk::parse("/dev/mmcblk0", &report).unwrap().allocated().count(), 3);
    }
}
