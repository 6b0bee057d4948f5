use log::LevelFilter;
use std::{io, path::Path};

/// Initialize logging with the fern logger.
///
/// Every record is written to stderr as `[<prefix>] <LEVEL> message`, and appended to
/// `file` when one is given.
pub fn log(prefix: &str, level: LevelFilter, file: Option<&Path>) -> Result<(), fern::InitError> {
    let prefix = prefix.to_owned();
    let mut logger = fern::Dispatch::new()
        .level(level)
        .format(move |out, message, record| {
            out.finish(format_args!("[{}] {} {}", prefix, record.level(), message))
        })
        .chain(io::stderr());

    if let Some(file) = file {
        logger = logger.chain(fern::log_file(file)?);
    }

    logger.apply()?;
    Ok(())
}
