use reparted::{ConfigError, RepartedError};
use std::io;

#[derive(Debug, Fail)]
pub(crate) enum CliError {
    #[fail(display = "unable to locate the running executable: {}", why)]
    CurrentExe { why: io::Error },
    #[fail(display = "{}", why)]
    Parted { why: io::Error },
    #[fail(display = "{}", why)]
    Reparted { why: RepartedError },
}

impl From<RepartedError> for CliError {
    fn from(why: RepartedError) -> CliError { CliError::Reparted { why } }
}

impl From<ConfigError> for CliError {
    fn from(why: ConfigError) -> CliError { CliError::Reparted { why: why.into() } }
}
