//! Reconciles a live partition table with a declared layout of reserved partitions,
//! which have fixed sizes, and userdata partitions, which absorb whatever is left.

#[macro_use]
extern crate derive_new;
extern crate failure;
#[macro_use]
extern crate failure_derive;
extern crate fern;
#[macro_use]
extern crate log;
extern crate reparted_external_commands as external;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;
#[cfg(test)]
extern crate tempdir;

pub mod config;
pub mod disk;
mod errors;
mod logging;
pub mod plan;
pub mod resize;
pub mod size;

pub use self::{
    config::{Config, ConfigError, Identity, PartitionSpec},
    disk::{ConsistencyError, Disk, ParseError, Partition},
    errors::RepartedError,
    logging::log,
    plan::{plan, Adjustment, PlanError, Reservation, ResizePlan},
    resize::{ExecutionError, Executor, Step},
    size::{parse_size, Human, SizeError},
};
pub use external::{ExitPolicy, Parted, Runner, System};

/// Logs what parted reported about the disk.
fn log_disk(disk: &Disk) {
    for part in &disk.partitions {
        if let Ok(json) = serde_json::to_string(part) {
            info!("{}", json);
        }
    }

    info!("Disk model: {}", disk.model);
    info!(
        "Disk total size: {} ({} logical / {} physical)",
        disk.size, disk.logical_sector, disk.physical_sector
    );
    info!("Disk flags: {}", disk.flags);
    info!("Partition table: {}", disk.table);
    info!("Size of partition table: {} (partitions: {})", disk.table_size, disk.parts_size);
}

/// Parses the disk, validates it against its own bytes, plans the resize, and then
/// executes that plan unless `dry_run` is set.
///
/// Each stage only begins once the previous one has fully succeeded.
pub fn reconcile<R: Runner + ?Sized>(
    runner: &R,
    config: &Config,
    dry_run: bool,
) -> Result<ResizePlan, RepartedError> {
    let parted = Parted::new(config.parted.as_str(), config.disk.as_str());
    match parted.version(runner) {
        Ok(version) => debug!("using {}", version.lines().next().unwrap_or("").trim()),
        Err(why) => warn!("unable to get the parted version: {}", why),
    }

    let disk = Disk::probe(runner, &parted)?;
    info!("Loaded parted for disk {}", disk.path);
    log_disk(&disk);

    disk.validate()?;

    let plan = plan(&disk, &config.reserved, &config.userdata)?;
    if dry_run {
        info!("dry run: leaving {} untouched", disk.path);
    } else if plan.is_empty() {
        info!("partition table of {} already matches the configuration", disk.path);
    } else {
        Executor::new(runner, &parted, config, &disk).execute(&plan)?;
        info!("partition table of {} has been reconciled", disk.path);
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, fs, io, path::Path};
    use tempdir::TempDir;

    /// Answers `print free` with a fixed report.
    struct Report {
        report: String,
        calls:  RefCell<Vec<String>>,
    }

    impl Runner for Report {
        fn run(&self, program: &str, args: &str) -> io::Result<String> {
            self.calls.borrow_mut().push(format!("{} {}", program, args));
            if args.ends_with("print free") {
                Ok(self.report.clone())
            } else {
                Ok("parted (GNU parted) 3.4\n".into())
            }
        }

        fn unmount(&self, device: &Path) -> io::Result<()> {
            self.calls.borrow_mut().push(format!("unmount {}", device.display()));
            Ok(())
        }
    }

    /// An 8 KiB disk image holding boot (1 KiB at 1 KiB) and data (4 KiB at 3 KiB),
    /// along with the device nodes of both partitions.
    fn scratch(dir: &TempDir) -> (String, String) {
        let disk = dir.path().join("disk");
        let data: Vec<u8> = (0..8192u32).map(|byte| (byte % 251) as u8).collect();
        fs::write(&disk, &data).unwrap();
        fs::write(dir.path().join("disk1"), &data[1024..2048]).unwrap();
        fs::write(dir.path().join("disk2"), &data[3072..7168]).unwrap();

        let disk = disk.to_string_lossy().into_owned();
        let report = format!(
            "Model: scratch\n\
             Disk {}: 8192B\n\
             Sector size (logical/physical): 512B/512B\n\
             Partition Table: gpt\n\
             Disk Flags: \n\
             \n\
             Number  Start  End    Size   File system  Name  Flags\n \
             1      1024B  2047B  1024B  fat32        boot  boot\n        \
             2048B  3071B  1024B  Free Space\n \
             2      3072B  7167B  4096B  ext4         data\n",
            disk
        );

        (disk, report)
    }

    fn config(disk: &str, boot: &str) -> Config {
        Config {
            disk: disk.into(),
            parted: "parted".into(),
            fsck: None,
            resize: None,
            reserved: vec![PartitionSpec::new(Identity::Name("boot".into())).with_size(boot).unwrap()],
            userdata: vec![PartitionSpec::new(Identity::Name("data".into()))],
        }
    }

    #[test]
    fn dry_run_plans_without_touching_the_disk() {
        let dir = TempDir::new("reparted").unwrap();
        let (disk, report) = scratch(&dir);
        let runner = Report { report, calls: RefCell::new(Vec::new()) };

        let plan = reconcile(&runner, &config(&disk, "3KiB"), true).unwrap();
        // 2 KiB more for boot, less the 1 KiB gap that is already free.
        assert_eq!(plan.reserve, 1024);
        assert_eq!(plan.grow.len(), 1);
        assert_eq!(runner.calls.borrow().len(), 2);
    }

    #[test]
    fn stale_device_nodes_stop_the_run() {
        let dir = TempDir::new("reparted").unwrap();
        let (disk, report) = scratch(&dir);
        fs::write(dir.path().join("disk2"), vec![0u8; 4096]).unwrap();
        let runner = Report { report, calls: RefCell::new(Vec::new()) };

        match reconcile(&runner, &config(&disk, "3KiB"), false) {
            Err(RepartedError::Consistency { why: ConsistencyError::Mismatch { number: 2, .. } }) => (),
            other => panic!("unexpected result: {:?}", other),
        }

        assert!(!runner.calls.borrow().iter().any(|call| call.contains("rm")));
    }

    #[test]
    fn matching_layouts_are_left_alone() {
        let dir = TempDir::new("reparted").unwrap();
        let (disk, report) = scratch(&dir);
        let runner = Report { report, calls: RefCell::new(Vec::new()) };

        let plan = reconcile(&runner, &config(&disk, "1KiB"), false).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.userdata_adjustment(), Adjustment::Award(1024));
    }
}
