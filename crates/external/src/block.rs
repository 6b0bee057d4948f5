use super::Runner;
use std::{io, path::Path};

/// Splits a configured tool such as `e2fsck -fy` into its program and leading arguments,
/// then appends `args`.
fn command<'a>(cmd: &'a str, args: &str) -> (&'a str, String) {
    let cmd = cmd.trim();
    match cmd.find(' ') {
        Some(pos) => (&cmd[..pos], format!("{} {}", cmd[pos + 1..].trim(), args)),
        None => (cmd, args.to_owned()),
    }
}

/// Checks & corrects errors on a partition before it is resized.
///
/// `cmd` is the checker declared in the configuration, along with any arguments it
/// needs. Its input is not a terminal, so it must be told not to prompt (`-fy` for
/// e2fsck). The device node is appended last.
pub fn fsck<R: Runner + ?Sized>(runner: &R, cmd: &str, part: &Path) -> io::Result<String> {
    info!("checking {} with {}", part.display(), cmd);
    let (program, args) = command(cmd, &part.to_string_lossy());
    runner.run(program, &args).map_err(|why| {
        io::Error::new(why.kind(), format!("fsck of {} failed: {}", part.display(), why))
    })
}

/// Resizes the file system on a partition.
///
/// With a `size` in bytes the file system is shrunk to that many KiB, rounded down, in
/// the `<device> <size>K` form resize2fs takes. Without one it grows to fill its
/// partition.
pub fn resize<R: Runner + ?Sized>(
    runner: &R,
    cmd: &str,
    part: &Path,
    size: Option<u64>,
) -> io::Result<String> {
    let device = part.to_string_lossy();
    let target = match size {
        Some(bytes) => {
            info!("resizing {} to {} bytes with {}", part.display(), bytes, cmd);
            format!("{} {}K", device, bytes / 1024)
        }
        None => {
            info!("resizing {} to fill its partition with {}", part.display(), cmd);
            device.into_owned()
        }
    };

    let (program, args) = command(cmd, &target);
    runner.run(program, &args).map_err(|why| {
        io::Error::new(why.kind(), format!("resize of {} failed: {}", part.display(), why))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Calls(RefCell<Vec<String>>);

    impl Runner for Calls {
        fn run(&self, program: &str, args: &str) -> io::Result<String> {
            self.0.borrow_mut().push(format!("{}|{}", program, args));
            Ok(String::new())
        }

        fn unmount(&self, _device: &Path) -> io::Result<()> { Ok(()) }
    }

    #[test]
    fn tool_arguments_come_before_the_device() {
        let calls = Calls::default();
        fsck(&calls, "e2fsck -fy", Path::new("/dev/sda1")).unwrap();
        fsck(&calls, "/sbin/fsck.vfat", Path::new("/dev/sda2")).unwrap();
        resize(&calls, "resize2fs", Path::new("/dev/sda1"), Some(128 * 1024 * 1024 + 512)).unwrap();
        resize(&calls, "resize2fs -f", Path::new("/dev/sda1"), None).unwrap();

        assert_eq!(*calls.0.borrow(), vec![
            "e2fsck|-fy /dev/sda1",
            "/sbin/fsck.vfat|/dev/sda2",
            "resize2fs|/dev/sda1 131072K",
            "resize2fs|-f /dev/sda1",
        ]);
    }
}
