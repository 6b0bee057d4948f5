//! The declared layout: which partitions are reserved, which hold user data, and
//! which tools reconcile them.

use crate::size::{parse_size, SizeError};
use std::{
    convert::TryFrom,
    fmt, fs, io,
    path::{Path, PathBuf},
};

#[derive(Debug, Fail)]
pub enum ConfigError {
    #[fail(display = "unable to read configuration at {}: {}", path, why)]
    Read { path: String, why: io::Error },
    #[fail(display = "unable to load configuration from {}: {}", path, why)]
    Json { path: String, why: serde_json::Error },
    #[fail(display = "no disk specified")]
    NoDisk,
    #[fail(display = "no parted executable specified")]
    NoParted,
    #[fail(display = "must specify either name or number for a partition")]
    NoIdentity,
    #[fail(display = "{}", why)]
    Size { why: SizeError },
    #[fail(display = "invalid size specified for reserved partition {}", index)]
    InvalidReservedSize { index: usize },
    #[fail(display = "partition {} requests a wipe, but no {} executable is specified", id, tool)]
    WipeWithoutTool { id: Identity, tool: &'static str },
}

impl From<SizeError> for ConfigError {
    fn from(why: SizeError) -> ConfigError { ConfigError::Size { why } }
}

/// How a configured partition finds its counterpart on the disk.
///
/// A spec without a name or a number cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Name(String),
    Number(u32),
    NameAndNumber(String, u32),
}

impl Identity {
    fn from_parts(name: Option<String>, number: Option<u32>) -> Result<Self, ConfigError> {
        let name = name.filter(|name| !name.is_empty());
        let number = number.filter(|&number| number != 0);
        match (name, number) {
            (Some(name), Some(number)) => Ok(Identity::NameAndNumber(name, number)),
            (Some(name), None) => Ok(Identity::Name(name)),
            (None, Some(number)) => Ok(Identity::Number(number)),
            (None, None) => Err(ConfigError::NoIdentity),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Identity::Name(name) | Identity::NameAndNumber(name, _) => Some(name.as_str()),
            Identity::Number(_) => None,
        }
    }

    pub fn number(&self) -> Option<u32> {
        match *self {
            Identity::Number(number) | Identity::NameAndNumber(_, number) => Some(number),
            Identity::Name(_) => None,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Identity::Name(name) | Identity::NameAndNumber(name, _) => write!(f, "'{}'", name),
            Identity::Number(number) => write!(f, "#{}", number),
        }
    }
}

/// The serialized form of a partition spec.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RawSpec {
    #[serde(rename = "num", default, skip_serializing_if = "Option::is_none")]
    number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start:  Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end:    Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    size:   Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fs:     Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name:   Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    flags:  Option<String>,
    #[serde(default)]
    wipe:   bool,
}

/// A partition as it should be once the layout has been reconciled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSpec", into = "RawSpec")]
pub struct PartitionSpec {
    pub identity: Identity,
    /// Byte offset of the first byte, when the spec pins its placement.
    pub start:    Option<u64>,
    /// Byte offset of the last byte, inclusive.
    pub end:      Option<u64>,
    /// The target size as written, such as `256MiB`.
    pub size:     Option<String>,
    pub fs:       Option<String>,
    pub flags:    Option<String>,
    /// Run the check and resize tools even if the size does not change.
    pub wipe:     bool,
    bytes:        Option<u64>,
}

impl TryFrom<RawSpec> for PartitionSpec {
    type Error = ConfigError;

    fn try_from(raw: RawSpec) -> Result<Self, Self::Error> {
        let identity = Identity::from_parts(raw.name, raw.number)?;
        let bytes = match raw.size {
            Some(ref size) => Some(parse_size(size)?),
            None => None,
        };

        Ok(PartitionSpec {
            identity,
            start: raw.start,
            end: raw.end,
            size: raw.size,
            fs: raw.fs,
            flags: raw.flags,
            wipe: raw.wipe,
            bytes,
        })
    }
}

impl From<PartitionSpec> for RawSpec {
    fn from(spec: PartitionSpec) -> RawSpec {
        RawSpec {
            number: spec.identity.number(),
            name:   spec.identity.name().map(String::from),
            start:  spec.start,
            end:    spec.end,
            size:   spec.size,
            fs:     spec.fs,
            flags:  spec.flags,
            wipe:   spec.wipe,
        }
    }
}

impl PartitionSpec {
    pub fn new(identity: Identity) -> Self {
        PartitionSpec {
            identity,
            start: None,
            end: None,
            size: None,
            fs: None,
            flags: None,
            wipe: false,
            bytes: None,
        }
    }

    /// Sets the target size, decoding it immediately.
    pub fn with_size(mut self, size: &str) -> Result<Self, SizeError> {
        self.bytes = Some(parse_size(size)?);
        self.size = Some(size.to_owned());
        Ok(self)
    }

    pub fn with_start(mut self, start: u64) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_flags(mut self, flags: &str) -> Self {
        self.flags = Some(flags.to_owned());
        self
    }

    pub fn with_wipe(mut self, wipe: bool) -> Self {
        self.wipe = wipe;
        self
    }

    /// The decoded target size in bytes.
    pub fn bytes(&self) -> Option<u64> { self.bytes }

    pub fn name(&self) -> Option<&str> { self.identity.name() }

    pub fn number(&self) -> Option<u32> { self.identity.number() }
}

/// The configuration document that drives a reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Path to the raw disk device.
    #[serde(default)]
    pub disk:     String,
    /// Path to the parted executable.
    #[serde(default)]
    pub parted:   String,
    /// Path to the file system checker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fsck:     Option<String>,
    /// Path to the file system resize tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resize:   Option<String>,
    /// Partitions that must shrink or grow to fit their new definitions.
    #[serde(default)]
    pub reserved: Vec<PartitionSpec>,
    /// Partitions that absorb whatever space is left over.
    #[serde(default)]
    pub userdata: Vec<PartitionSpec>,
}

impl Config {
    /// Reads and validates a configuration file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let data = fs::read(path)
            .map_err(|why| ConfigError::Read { path: path.display().to_string(), why })?;
        Config::from_slice(&data)
            .map_err(|why| ConfigError::Json { path: path.display().to_string(), why })?
            .validated()
    }

    /// `<name>.json` in the same directory as the executable at `exe`.
    pub fn default_path(exe: &Path) -> PathBuf {
        let stem = exe.file_stem().map_or_else(|| "reparted".into(), |stem| stem.to_string_lossy());
        exe.with_file_name(format!("{}.json", stem))
    }

    pub fn from_slice(data: &[u8]) -> Result<Config, serde_json::Error> {
        serde_json::from_slice(data)
    }

    /// Checks everything that must hold before the disk is touched.
    pub fn validated(self) -> Result<Config, ConfigError> {
        if self.disk.is_empty() {
            return Err(ConfigError::NoDisk);
        }

        if self.parted.is_empty() {
            return Err(ConfigError::NoParted);
        }

        for (index, spec) in self.reserved.iter().enumerate() {
            if spec.bytes().map_or(true, |bytes| bytes == 0) {
                return Err(ConfigError::InvalidReservedSize { index: index + 1 });
            }
        }

        for spec in self.reserved.iter().chain(self.userdata.iter()).filter(|s| s.wipe) {
            if self.fsck.as_ref().map_or(true, String::is_empty) {
                return Err(ConfigError::WipeWithoutTool { id: spec.identity.clone(), tool: "fsck" });
            }

            if self.resize.as_ref().map_or(true, String::is_empty) {
                return Err(ConfigError::WipeWithoutTool { id: spec.identity.clone(), tool: "resize" });
            }
        }

        Ok(self)
    }
}
