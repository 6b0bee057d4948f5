//! Carries out a resize plan, one partition at a time.
//!
//! A partition shrinks by shrinking its file system before its table entry, and grows by
//! growing its table entry before its file system. Every table rewrite is checked
//! against a fresh report, because parted may print a warning and exit as though the
//! edit succeeded. Nothing is rolled back when a step fails.

use crate::{
    config::{Config, Identity, PartitionSpec},
    disk::{Disk, Partition, FREE_SPACE},
    plan::{Reservation, ResizePlan},
};
use external::{fsck, resize, Parted, Runner};
use std::{fmt, io};

/// The step of a partition's sequence that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Unmount,
    Fsck,
    Resize,
    Remove,
    Create,
    Name,
    Flag,
    Verify,
    Place,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let step = match *self {
            Step::Unmount => "unmount",
            Step::Fsck => "fsck",
            Step::Resize => "resize",
            Step::Remove => "table entry removal",
            Step::Create => "table entry creation",
            Step::Name => "naming",
            Step::Flag => "flagging",
            Step::Verify => "verification",
            Step::Place => "placement",
        };

        f.write_str(step)
    }
}

#[derive(Debug, Fail)]
#[fail(display = "{} of partition {} failed: {}", step, partition, why)]
pub struct ExecutionError {
    pub partition: Identity,
    pub step:      Step,
    pub why:       io::Error,
}

/// Where a rewritten table entry must land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Extent {
    start: u64,
    end:   u64,
}

impl Extent {
    /// The spec's own offsets win. Otherwise the entry keeps its start and spans `target`.
    fn of(spec: &PartitionSpec, actual: Option<&Partition>, target: u64) -> Option<Extent> {
        let start = spec.start.or_else(|| actual.map(|actual| actual.start))?;
        let end = match spec.end {
            Some(end) => end,
            None => (start + target).checked_sub(1)?,
        };

        if end < start {
            return None;
        }

        Some(Extent { start, end })
    }

    fn len(self) -> u64 { self.end - self.start + 1 }
}

/// Applies resize plans to one disk through a `Runner`.
pub struct Executor<'a, R: Runner + ?Sized> {
    runner: &'a R,
    parted: &'a Parted,
    fsck:   Option<&'a str>,
    resize: Option<&'a str>,
    gpt:    bool,
}

impl<'a, R: Runner + ?Sized> Executor<'a, R> {
    pub fn new(runner: &'a R, parted: &'a Parted, config: &'a Config, disk: &Disk) -> Self {
        Executor {
            runner,
            parted,
            fsck: config.fsck.as_ref().map(String::as_str).filter(|cmd| !cmd.is_empty()),
            resize: config.resize.as_ref().map(String::as_str).filter(|cmd| !cmd.is_empty()),
            gpt: disk.is_gpt(),
        }
    }

    /// Shrinks, then grows, then re-checks wiped partitions, then creates new entries.
    pub fn execute(&self, plan: &ResizePlan) -> Result<(), ExecutionError> {
        for reservation in &plan.shrink {
            if let Some(ref actual) = reservation.actual {
                self.shrink(reservation, actual)?;
            }
        }

        for reservation in &plan.grow {
            if let Some(ref actual) = reservation.actual {
                self.grow(reservation, actual)?;
            }
        }

        for reservation in &plan.wiped {
            if let Some(ref actual) = reservation.actual {
                self.unmount(&reservation.spec, actual)?;
                self.regenerate(&reservation.spec, actual, None)?;
            }
        }

        for reservation in &plan.moves {
            info!(
                "partition {} has no fixed number and keeps whichever slot parted gives it",
                reservation.spec.identity
            );
        }

        for reservation in &plan.create {
            self.create(reservation)?;
        }

        Ok(())
    }

    /// The table entry is only cut down once the file system has been shrunk to fit it.
    fn shrink(&self, reservation: &Reservation, actual: &Partition) -> Result<(), ExecutionError> {
        let spec = &reservation.spec;
        let extent = self.extent(spec, Some(actual), reservation.target)?;
        if !actual.wipe {
            return Err(self.error(
                spec,
                Step::Resize,
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "refusing to shrink a table entry below a file system that is not marked to be wiped",
                ),
            ));
        }

        info!("shrinking partition {} to {} bytes", spec.identity, extent.len());
        self.unmount(spec, actual)?;
        self.regenerate(spec, actual, Some(extent.len()))?;
        self.rewrite(spec, Some(actual), reservation.target)?;
        Ok(())
    }

    fn grow(&self, reservation: &Reservation, actual: &Partition) -> Result<(), ExecutionError> {
        let spec = &reservation.spec;
        info!("growing partition {} to {} bytes", spec.identity, reservation.target);
        self.unmount(spec, actual)?;
        let mut rewritten = self.rewrite(spec, Some(actual), reservation.target)?;
        rewritten.mark_wipe(actual.wipe);
        self.regenerate(spec, &rewritten, None)
    }

    fn create(&self, reservation: &Reservation) -> Result<(), ExecutionError> {
        let spec = &reservation.spec;
        if spec.start.is_none() {
            return Err(self.error(
                spec,
                Step::Place,
                io::Error::new(io::ErrorKind::InvalidInput, "no start offset to create it at"),
            ));
        }

        info!("creating partition {} with {} bytes", spec.identity, reservation.target);
        self.rewrite(spec, None, reservation.target).map(|_| ())
    }

    fn unmount(&self, spec: &PartitionSpec, actual: &Partition) -> Result<(), ExecutionError> {
        let device = actual.device_path(&self.parted.disk);
        self.runner.unmount(&device).map_err(|why| self.error(spec, Step::Unmount, why))
    }

    /// Checks and resizes the file system, if the partition is marked to be wiped.
    ///
    /// Without a `size` the file system is resized to fill its partition.
    fn regenerate(
        &self,
        spec: &PartitionSpec,
        actual: &Partition,
        size: Option<u64>,
    ) -> Result<(), ExecutionError> {
        if !actual.wipe {
            return Ok(());
        }

        let device = actual.device_path(&self.parted.disk);
        let fsck_cmd = self.tool(spec, Step::Fsck, self.fsck)?;
        fsck(self.runner, fsck_cmd, &device).map_err(|why| self.error(spec, Step::Fsck, why))?;

        let resize_cmd = self.tool(spec, Step::Resize, self.resize)?;
        resize(self.runner, resize_cmd, &device, size)
            .map_err(|why| self.error(spec, Step::Resize, why))?;

        Ok(())
    }

    /// Replaces the table entry of `actual` (if any) with one at the spec's extent, then
    /// restores its name and flags. Returns the entry as parted now reports it.
    fn rewrite(
        &self,
        spec: &PartitionSpec,
        actual: Option<&Partition>,
        target: u64,
    ) -> Result<Partition, ExecutionError> {
        let extent = self.extent(spec, actual, target)?;

        if let Some(actual) = actual {
            self.parted
                .remove(self.runner, actual.number)
                .map_err(|why| self.error(spec, Step::Remove, why))?;
        }

        let name = spec.name().or_else(|| actual.map(|actual| actual.name.as_str())).unwrap_or("");
        let fs = spec
            .fs
            .as_ref()
            .map(String::as_str)
            .or_else(|| actual.map(|actual| actual.fs.as_str()))
            .filter(|fs| !fs.is_empty() && *fs != FREE_SPACE);

        let kind = if self.gpt {
            if name.is_empty() { "primary" } else { name }
        } else {
            actual.and_then(|actual| actual.kind.as_ref().map(String::as_str)).unwrap_or("primary")
        };

        self.parted
            .mkpart(self.runner, kind, fs, extent.start, extent.end)
            .map_err(|why| self.error(spec, Step::Create, why))?;

        let created = self.verify(spec, extent)?;

        if self.gpt && !name.is_empty() {
            self.parted
                .name(self.runner, created.number, name)
                .map_err(|why| self.error(spec, Step::Name, why))?;
        }

        let flags = spec
            .flags
            .as_ref()
            .map(String::as_str)
            .or_else(|| actual.map(|actual| actual.flags.as_str()))
            .unwrap_or("");

        for flag in flags.split(',').map(str::trim).filter(|flag| !flag.is_empty()) {
            self.parted
                .set(self.runner, created.number, flag, true)
                .map_err(|why| self.error(spec, Step::Flag, why))?;
        }

        Ok(created)
    }

    fn extent(
        &self,
        spec: &PartitionSpec,
        actual: Option<&Partition>,
        target: u64,
    ) -> Result<Extent, ExecutionError> {
        Extent::of(spec, actual, target).ok_or_else(|| {
            self.error(
                spec,
                Step::Place,
                io::Error::new(io::ErrorKind::InvalidInput, "partition has no valid extent"),
            )
        })
    }

    /// Re-reads the table and finds the entry that should now span `extent`.
    fn verify(&self, spec: &PartitionSpec, extent: Extent) -> Result<Partition, ExecutionError> {
        let verify_error = |message: String| {
            self.error(spec, Step::Verify, io::Error::new(io::ErrorKind::Other, message))
        };

        let disk = Disk::probe(self.runner, self.parted)
            .map_err(|why| verify_error(format!("unable to re-read the table: {}", why)))?;

        let created = disk.get_partition_at(extent.start).ok_or_else(|| {
            verify_error(format!("no partition begins at {} after the rewrite", extent.start))
        })?;

        if created.end != extent.end {
            return Err(verify_error(format!(
                "partition {} ends at {} rather than {}",
                created.number, created.end, extent.end
            )));
        }

        info!(
            "partition {} now spans {} - {} as partition {}",
            spec.identity, created.start, created.end, created.number
        );

        Ok(created.clone())
    }

    fn tool<'b>(
        &self,
        spec: &PartitionSpec,
        step: Step,
        tool: Option<&'b str>,
    ) -> Result<&'b str, ExecutionError> {
        tool.ok_or_else(|| {
            self.error(
                spec,
                step,
                io::Error::new(io::ErrorKind::NotFound, format!("no {} executable is configured", step)),
            )
        })
    }

    fn error(&self, spec: &PartitionSpec, step: Step, why: io::Error) -> ExecutionError {
        error!("{} of partition {} failed: {}", step, spec.identity, why);
        ExecutionError { partition: spec.identity.clone(), step, why }
    }
}
