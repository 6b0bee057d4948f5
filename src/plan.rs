//! Works out how the reserved partitions must change to meet their configured sizes,
//! and how much of that the userdata partitions must give up or absorb.

use crate::{
    config::PartitionSpec,
    disk::{Disk, Partition},
    size::Human,
};
use std::convert::TryFrom;

#[rustfmt::skip]
#[derive(Debug, Fail)]
pub enum PlanError {
    #[fail(display = "none of the reserved partitions could be matched to the disk")]
    NoReserved,
    #[fail(display = "none of the userdata partitions could be matched to the disk")]
    NoUserData,
    #[fail(display = "{} userdata partitions are configured, but only {} matched the disk", configured, matched)]
    UserDataMismatch { configured: usize, matched: usize },
    #[fail(display = "need to reserve {} bytes, but userdata only holds {} bytes ({} bytes short)", reserve, available, shortfall)]
    Insufficient { reserve: u64, available: u64, shortfall: u64 },
}

/// How a partition's size changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    /// This many bytes are taken away.
    Take(u64),
    /// This many bytes are added.
    Award(u64),
    Unchanged,
}

impl Adjustment {
    fn from_delta(delta: i128) -> Adjustment {
        if delta > 0 {
            Adjustment::Take(saturate(delta))
        } else if delta < 0 {
            Adjustment::Award(saturate(-delta))
        } else {
            Adjustment::Unchanged
        }
    }
}

fn saturate(bytes: i128) -> u64 { u64::try_from(bytes).unwrap_or(u64::MAX) }

/// A reserved spec, paired with the partition it matched on the disk.
#[derive(Debug, Clone, PartialEq, new)]
pub struct Reservation {
    pub spec:   PartitionSpec,
    /// `None` if the spec must be created.
    pub actual: Option<Partition>,
    /// The configured size in bytes.
    pub target: u64,
}

impl Reservation {
    /// Specs without a number have no fixed slot in the table.
    pub fn is_move(&self) -> bool { self.spec.number().is_none() }

    /// How the matched partition changes, or `None` if nothing matched.
    pub fn adjustment(&self) -> Option<Adjustment> {
        self.actual.as_ref().map(|actual| {
            Adjustment::from_delta(i128::from(actual.size) - i128::from(self.target))
        })
    }
}

/// What must happen to the disk. Nothing is changed until an executor consumes it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResizePlan {
    /// Bytes taken from userdata when positive, awarded to userdata when negative.
    pub reserve:   i128,
    /// Unallocated bytes already on the disk.
    pub free:      u64,
    /// The combined size of the matched userdata partitions.
    pub available: u64,
    pub shrink:    Vec<Reservation>,
    pub grow:      Vec<Reservation>,
    /// Matched specs without a partition number. These may also be in shrink or grow.
    pub moves:     Vec<Reservation>,
    /// Specs that matched nothing on the disk.
    pub create:    Vec<Reservation>,
    /// Matched specs whose size is unchanged, but whose file system must be redone.
    pub wiped:     Vec<Reservation>,
    pub userdata:  Vec<Partition>,
}

impl ResizePlan {
    /// How the userdata partitions change as a whole.
    pub fn userdata_adjustment(&self) -> Adjustment { Adjustment::from_delta(self.reserve) }

    /// True if executing the plan would not touch the partition table.
    pub fn is_empty(&self) -> bool {
        self.shrink.is_empty() && self.grow.is_empty() && self.create.is_empty() && self.wiped.is_empty()
    }
}

/// Matches the configured layout against the disk and classifies every reserved
/// partition.
pub fn plan(
    disk: &Disk,
    reserved: &[PartitionSpec],
    userdata: &[PartitionSpec],
) -> Result<ResizePlan, PlanError> {
    // Wide enough that no sum of u64 sizes can wrap.
    let mut reserve: i128 = 0;
    let mut reservations = Vec::with_capacity(reserved.len());

    for (index, spec) in reserved.iter().enumerate() {
        let target = spec.bytes().unwrap_or(0);
        reserve += i128::from(target);

        let actual = disk.get_partition(&spec.identity).cloned().map(|mut actual| {
            actual.mark_wipe(spec.wipe);
            actual
        });

        match actual {
            Some(ref actual) => {
                reserve -= i128::from(actual.size);
                debug!(
                    "reserved partition {} ({}) matched partition {} of {}",
                    index + 1,
                    spec.identity,
                    actual.number,
                    Human(actual.size)
                );
            }
            None => warn!(
                "reserved partition {} ({}) could not be matched to {}",
                index + 1,
                spec.identity,
                disk.path
            ),
        }

        reservations.push(Reservation::new(spec.clone(), actual, target));
    }

    let free = disk.free_space();
    reserve -= i128::from(free);

    if reservations.iter().all(|r| r.actual.is_none()) {
        return Err(PlanError::NoReserved);
    }

    let userdata_parts: Vec<Partition> = userdata
        .iter()
        .filter_map(|spec| {
            let matched = disk.get_partition(&spec.identity).cloned();
            if matched.is_none() {
                warn!("userdata partition {} could not be matched to {}", spec.identity, disk.path);
            }

            matched.map(|mut part| {
                part.mark_wipe(spec.wipe);
                part
            })
        })
        .collect();

    if userdata_parts.is_empty() {
        return Err(PlanError::NoUserData);
    }

    if userdata_parts.len() != userdata.len() {
        return Err(PlanError::UserDataMismatch {
            configured: userdata.len(),
            matched:    userdata_parts.len(),
        });
    }

    let available: u64 = userdata_parts.iter().map(|part| part.size).sum();
    if reserve > i128::from(available) {
        let reserve = saturate(reserve);
        return Err(PlanError::Insufficient { reserve, available, shortfall: reserve - available });
    }

    match Adjustment::from_delta(reserve) {
        Adjustment::Take(bytes) => {
            info!("Need to reserve {}/{} for new partition table", Human(bytes), Human(disk.size))
        }
        Adjustment::Award(bytes) => {
            info!("Need to free {}/{} for new partition table", Human(bytes), Human(disk.size))
        }
        Adjustment::Unchanged => {
            info!("No additional space will be freed or reserved for new partition table")
        }
    }

    let mut plan = ResizePlan {
        reserve,
        free,
        available,
        shrink: Vec::new(),
        grow: Vec::new(),
        moves: Vec::new(),
        create: Vec::new(),
        wiped: Vec::new(),
        userdata: userdata_parts,
    };

    for reservation in reservations {
        let adjustment = match reservation.adjustment() {
            Some(adjustment) => adjustment,
            None => {
                plan.create.push(reservation);
                continue;
            }
        };

        if reservation.is_move() {
            plan.moves.push(reservation.clone());
        }

        match adjustment {
            Adjustment::Take(_) => plan.shrink.push(reservation),
            Adjustment::Award(_) => plan.grow.push(reservation),
            Adjustment::Unchanged if reservation.spec.wipe => plan.wiped.push(reservation),
            Adjustment::Unchanged => (),
        }
    }

    info!(
        "planned {} shrinks, {} grows, {} moves, {} creations and {} wipes",
        plan.shrink.len(),
        plan.grow.len(),
        plan.moves.len(),
        plan.create.len(),
        plan.wiped.len()
    );

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Identity;

    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * MIB;

    fn part(number: u32, name: &str, start: u64, size: u64) -> Partition {
        Partition {
            number,
            start,
            end: start + size - 1,
            size,
            fs: "ext4".into(),
            name: name.into(),
            flags: String::new(),
            kind: None,
            wipe: false,
        }
    }

    fn free(start: u64, size: u64) -> Partition {
        Partition { fs: crate::disk::FREE_SPACE.into(), ..part(0, "", start, size) }
    }

    fn disk(partitions: Vec<Partition>) -> Disk {
        let parts_size = partitions.iter().map(|p| p.size).sum::<u64>();
        let size = parts_size + MIB;
        Disk {
            path: "/dev/mmcblk0".into(),
            model: String::new(),
            flags: String::new(),
            table: "GPT".into(),
            logical_sector: 512,
            physical_sector: 512,
            size,
            table_size: size - parts_size,
            parts_size,
            partitions,
        }
    }

    fn named(name: &str, size: &str) -> PartitionSpec {
        PartitionSpec::new(Identity::Name(name.into())).with_size(size).unwrap()
    }

    fn numbered(name: &str, number: u32, size: &str) -> PartitionSpec {
        PartitionSpec::new(Identity::NameAndNumber(name.into(), number)).with_size(size).unwrap()
    }

    fn userdata() -> Vec<PartitionSpec> { vec![PartitionSpec::new(Identity::Name("data".into()))] }

    #[test]
    fn boot_grows_into_userdata() {
        let disk = disk(vec![part(1, "boot", MIB, 128 * MIB), part(2, "data", 129 * MIB, 10 * GIB)]);
        let plan = plan(&disk, &[named("boot", "256MiB")], &userdata()).unwrap();

        assert_eq!(plan.reserve, 128 * MIB as i128);
        assert_eq!(plan.userdata_adjustment(), Adjustment::Take(128 * MIB));
        assert_eq!(plan.available, 10 * GIB);
        assert_eq!(plan.grow.len(), 1);
        assert_eq!(plan.grow[0].spec.name(), Some("boot"));
        assert!(plan.shrink.is_empty());
        // No number was given, so boot has no fixed slot.
        assert_eq!(plan.moves.len(), 1);
    }

    #[test]
    fn actual_sizes_are_always_subtracted() {
        let disk = disk(vec![
            part(1, "a", MIB, 400 * MIB),
            part(2, "b", 401 * MIB, 150 * MIB),
            part(3, "data", 551 * MIB, GIB),
        ]);
        let reserved = [numbered("a", 1, "300MiB"), numbered("b", 2, "200MiB")];
        let plan = plan(&disk, &reserved, &userdata()).unwrap();

        assert_eq!(plan.reserve, -50 * MIB as i128);
        assert_eq!(plan.userdata_adjustment(), Adjustment::Award(50 * MIB));
        assert_eq!(plan.shrink.len(), 1);
        assert_eq!(plan.shrink[0].spec.name(), Some("a"));
        assert_eq!(plan.grow.len(), 1);
        assert_eq!(plan.grow[0].spec.name(), Some("b"));
        assert!(plan.moves.is_empty());
    }

    #[test]
    fn free_space_reduces_the_reservation() {
        let disk = disk(vec![
            part(1, "boot", MIB, 128 * MIB),
            free(129 * MIB, 64 * MIB),
            part(2, "data", 193 * MIB, GIB),
        ]);
        let plan = plan(&disk, &[numbered("boot", 1, "256MiB")], &userdata()).unwrap();

        assert_eq!(plan.free, 64 * MIB);
        assert_eq!(plan.reserve, 64 * MIB as i128);
    }

    #[test]
    fn unchanged_sizes() {
        let disk = disk(vec![part(1, "boot", MIB, 128 * MIB), part(2, "data", 129 * MIB, GIB)]);

        let plan = plan(&disk, &[numbered("boot", 1, "128MiB")], &userdata()).unwrap();
        assert_eq!(plan.userdata_adjustment(), Adjustment::Unchanged);
        assert!(plan.is_empty());

        let wiped = numbered("boot", 1, "128MiB").with_wipe(true);
        let plan = super::plan(&disk, &[wiped], &userdata()).unwrap();
        assert_eq!(plan.wiped.len(), 1);
        assert!(plan.wiped[0].actual.as_ref().unwrap().wipe);
        assert!(!plan.is_empty());
    }

    #[test]
    fn unmatched_specs_are_created() {
        let disk = disk(vec![part(1, "boot", MIB, 128 * MIB), part(2, "data", 129 * MIB, GIB)]);
        let reserved = [numbered("boot", 1, "128MiB"), named("vendor", "64MiB").with_start(MIB)];
        let plan = plan(&disk, &reserved, &userdata()).unwrap();

        assert_eq!(plan.reserve, 64 * MIB as i128);
        assert_eq!(plan.create.len(), 1);
        assert_eq!(plan.create[0].target, 64 * MIB);
        assert!(plan.moves.is_empty());
    }

    #[test]
    fn nothing_reserved_matched() {
        let disk = disk(vec![part(1, "boot", MIB, 128 * MIB), part(2, "data", 129 * MIB, GIB)]);
        let result = plan(&disk, &[named("vendor", "64MiB")], &userdata());
        assert!(matches!(result, Err(PlanError::NoReserved)));

        let result = plan(&disk, &[], &userdata());
        assert!(matches!(result, Err(PlanError::NoReserved)));
    }

    #[test]
    fn userdata_must_match() {
        let disk = disk(vec![part(1, "boot", MIB, 128 * MIB), part(2, "data", 129 * MIB, GIB)]);
        let reserved = [numbered("boot", 1, "128MiB")];

        assert!(matches!(plan(&disk, &reserved, &[]), Err(PlanError::NoUserData)));

        let mut userdata = userdata();
        userdata.push(PartitionSpec::new(Identity::Name("cache".into())));
        assert!(matches!(
            plan(&disk, &reserved, &userdata),
            Err(PlanError::UserDataMismatch { configured: 2, matched: 1 })
        ));
    }

    #[test]
    fn insufficient_userdata() {
        let disk = disk(vec![part(1, "boot", MIB, 128 * MIB), part(2, "data", 129 * MIB, 64 * MIB)]);
        match plan(&disk, &[numbered("boot", 1, "256MiB")], &userdata()) {
            Err(PlanError::Insufficient { reserve, available, shortfall }) => {
                assert_eq!(reserve, 128 * MIB);
                assert_eq!(available, 64 * MIB);
                assert_eq!(shortfall, 64 * MIB);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn oversized_targets_do_not_wrap() {
        let disk = disk(vec![part(1, "boot", MIB, 128 * MIB), part(2, "data", 129 * MIB, GIB)]);
        match plan(&disk, &[numbered("boot", 1, "9EiB")], &userdata()) {
            Err(PlanError::Insufficient { reserve, available, .. }) => {
                assert_eq!(reserve, 9 * GIB * GIB - 128 * MIB);
                assert_eq!(available, GIB);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
