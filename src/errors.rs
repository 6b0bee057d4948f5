use crate::{
    config::ConfigError,
    disk::{ConsistencyError, ParseError},
    plan::PlanError,
    resize::ExecutionError,
};

/// Every way a reconciliation can stop. None of these are retried.
#[rustfmt::skip]
#[derive(Debug, Fail)]
pub enum RepartedError {
    #[fail(display = "configuration error: {}", why)]
    Config { why: ConfigError },
    #[fail(display = "unable to parse the partition table: {}", why)]
    Parse { why: ParseError },
    #[fail(display = "partition table disagrees with the disk: {}", why)]
    Consistency { why: ConsistencyError },
    #[fail(display = "unable to plan the resize: {}", why)]
    Plan { why: PlanError },
    #[fail(display = "resize failed, inspect the disk before retrying: {}", why)]
    Execution { why: ExecutionError },
}

impl From<ConfigError> for RepartedError {
    fn from(why: ConfigError) -> RepartedError { RepartedError::Config { why } }
}

impl From<ParseError> for RepartedError {
    fn from(why: ParseError) -> RepartedError { RepartedError::Parse { why } }
}

impl From<ConsistencyError> for RepartedError {
    fn from(why: ConsistencyError) -> RepartedError { RepartedError::Consistency { why } }
}

impl From<PlanError> for RepartedError {
    fn from(why: PlanError) -> RepartedError { RepartedError::Plan { why } }
}

impl From<ExecutionError> for RepartedError {
    fn from(why: ExecutionError) -> RepartedError { RepartedError::Execution { why } }
}
