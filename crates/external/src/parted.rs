//! Invocations of the parted binary.
//!
//! parted is always driven in script mode with byte units, so its reports can be parsed
//! and its table edits never stop to ask questions.

use super::Runner;
use std::io;

/// A parted binary bound to one disk.
#[derive(Debug, Clone, PartialEq)]
pub struct Parted {
    /// Path to the parted executable.
    pub binary: String,
    /// Path to the raw disk device.
    pub disk:   String,
}

impl Parted {
    pub fn new<B: Into<String>, D: Into<String>>(binary: B, disk: D) -> Self {
        Parted { binary: binary.into(), disk: disk.into() }
    }

    /// Runs a parted command against the disk in script mode and byte units.
    pub fn run<R: Runner + ?Sized>(&self, runner: &R, command: &str) -> io::Result<String> {
        let args = format!("--script {} unit B {}", self.disk, command);
        runner.run(&self.binary, &args).map_err(|why| {
            io::Error::new(
                why.kind(),
                format!("parted `{}` on {} failed: {}", command, self.disk, why),
            )
        })
    }

    /// The partition report that includes unallocated gaps.
    pub fn print_free<R: Runner + ?Sized>(&self, runner: &R) -> io::Result<String> {
        self.run(runner, "print free")
    }

    /// Reports for every block device parted can see.
    pub fn print_list<R: Runner + ?Sized>(&self, runner: &R, all: bool) -> io::Result<String> {
        self.run(runner, if all { "print all" } else { "print list" })
    }

    pub fn version<R: Runner + ?Sized>(&self, runner: &R) -> io::Result<String> {
        runner.run(&self.binary, "--version")
    }

    pub fn help<R: Runner + ?Sized>(&self, runner: &R) -> io::Result<String> {
        runner.run(&self.binary, "--help")
    }

    /// Deletes partition `num` from the table. The data on the disk is untouched.
    pub fn remove<R: Runner + ?Sized>(&self, runner: &R, num: u32) -> io::Result<String> {
        info!("removing partition {} from the table on {}", num, self.disk);
        self.run(runner, &format!("rm {}", num))
    }

    /// Creates a table entry spanning `start..=end` bytes.
    ///
    /// `kind` is the GPT partition name or the msdos partition type, as parted expects
    /// in the first `mkpart` argument.
    pub fn mkpart<R: Runner + ?Sized>(
        &self,
        runner: &R,
        kind: &str,
        fs: Option<&str>,
        start: u64,
        end: u64,
    ) -> io::Result<String> {
        info!("creating partition {}B - {}B on {}", start, end, self.disk);
        let command = match fs {
            Some(fs) => format!("mkpart {} {} {}B {}B", kind, fs, start, end),
            None => format!("mkpart {} {}B {}B", kind, start, end),
        };

        self.run(runner, &command)
    }

    /// Sets the GPT name of partition `num`.
    pub fn name<R: Runner + ?Sized>(&self, runner: &R, num: u32, name: &str) -> io::Result<String> {
        self.run(runner, &format!("name {} {}", num, name))
    }

    /// Turns a flag on partition `num` on or off.
    pub fn set<R: Runner + ?Sized>(
        &self,
        runner: &R,
        num: u32,
        flag: &str,
        state: bool,
    ) -> io::Result<String> {
        self.run(runner, &format!("set {} {} {}", num, flag, if state { "on" } else { "off" }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, path::Path};

    #[derive(Default)]
    struct Echo(RefCell<Vec<String>>);

    impl Runner for Echo {
        fn run(&self, program: &str, args: &str) -> io::Result<String> {
            let line = format!("{} {}", program, args);
            self.0.borrow_mut().push(line.clone());
            Ok(line)
        }

        fn unmount(&self, _device: &Path) -> io::Result<()> { Ok(()) }
    }

    #[test]
    fn table_commands() {
        let parted = Parted::new("/sbin/parted", "/dev/mmcblk0");
        let runner = Echo::default();

        parted.print_free(&runner).unwrap();
        parted.remove(&runner, 3).unwrap();
        parted.mkpart(&runner, "boot", Some("fat32"), 1048576, 269484031).unwrap();
        parted.mkpart(&runner, "primary", None, 1048576, 269484031).unwrap();
        parted.name(&runner, 3, "boot").unwrap();
        parted.set(&runner, 3, "esp", true).unwrap();
        parted.version(&runner).unwrap();

        assert_eq!(*runner.0.borrow(), vec![
            "/sbin/parted --script /dev/mmcblk0 unit B print free",
            "/sbin/parted --script /dev/mmcblk0 unit B rm 3",
            "/sbin/parted --script /dev/mmcblk0 unit B mkpart boot fat32 1048576B 269484031B",
            "/sbin/parted --script /dev/mmcblk0 unit B mkpart primary 1048576B 269484031B",
            "/sbin/parted --script /dev/mmcblk0 unit B name 3 boot",
            "/sbin/parted --script /dev/mmcblk0 unit B set 3 esp on",
            "/sbin/parted --version",
        ]);
    }
}
