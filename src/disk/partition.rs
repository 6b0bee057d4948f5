use std::path::PathBuf;

/// The file system label parted gives to unallocated gaps.
pub const FREE_SPACE: &str = "Free Space";

/// A partition, or a gap of free space, as reported by parted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Partition {
    /// The partition number, or 0 for a gap of free space.
    #[serde(rename = "num")]
    pub number: u32,
    /// Byte offset of the first byte.
    pub start:  u64,
    /// Byte offset of the last byte, inclusive.
    pub end:    u64,
    /// The size in bytes, decoded from the report's size column.
    pub size:   u64,
    pub fs:     String,
    pub name:   String,
    pub flags:  String,
    /// The msdos partition type (primary, extended, logical), when the table has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind:   Option<String>,
    /// Set from the configuration: the check and resize tools must run on this partition.
    pub wipe:   bool,
}

impl Partition {
    /// True for the gaps that parted lists between partitions.
    pub fn is_free(&self) -> bool { self.number == 0 || self.fs == FREE_SPACE }

    /// The device node of this partition on `disk`, such as `/dev/mmcblk0` + `3`.
    pub fn device_path(&self, disk: &str) -> PathBuf { PathBuf::from(format!("{}{}", disk, self.number)) }

    /// Individual flags from parted's comma-separated list.
    pub fn flag_list(&self) -> impl Iterator<Item = &str> {
        self.flags.split(',').map(str::trim).filter(|flag| !flag.is_empty())
    }

    /// Copies the wipe marker from the partition's configured spec.
    pub fn mark_wipe(&mut self, wipe: bool) { self.wipe = wipe; }
}
