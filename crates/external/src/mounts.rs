use proc_mounts::MountList;
use std::{
    io::{self, Error},
    path::{Path, PathBuf},
};
use sys_mount::{unmount, UnmountFlags};

/// All destinations at which `device` is mounted, most recent mount last.
pub fn mount_points(mounts: &MountList, device: &Path) -> Vec<PathBuf> {
    mounts.0.iter().filter(|mount| mount.source == device).map(|mount| mount.dest.clone()).collect()
}

/// Unmounts all mount points of `device`. Nothing mounted is not an error.
pub fn unmount_device(device: &Path) -> io::Result<()> {
    let mounts = MountList::new().map_err(|why| {
        Error::new(why.kind(), format!("unable to read /proc/mounts: {}", why))
    })?;
    let targets = mount_points(&mounts, device);

    if targets.is_empty() {
        debug!("{} is not mounted", device.display());
        return Ok(());
    }

    // Stacked mounts are released from the top down.
    for target in targets.iter().rev() {
        info!("unmounting {}, which is mounted at {}", device.display(), target.display());
        match unmount(target, UnmountFlags::empty()) {
            Ok(()) => (),
            Err(ref why) if why.raw_os_error() == Some(libc::EINVAL) => {
                debug!("{} was no longer mounted", target.display());
            }
            Err(why) => {
                return Err(Error::new(
                    why.kind(),
                    format!("unable to unmount {} from {}: {}", device.display(), target.display(), why),
                ));
            }
        }
    }

    Ok(())
}
