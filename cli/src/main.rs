extern crate clap;
extern crate failure;
#[macro_use]
extern crate failure_derive;
#[macro_use]
extern crate log;
extern crate reparted;

mod errors;

use self::errors::CliError;
use clap::{App, Arg, ArgMatches};
use log::LevelFilter;
use reparted::{Adjustment, Config, ExitPolicy, Parted, System};
use std::{
    env,
    path::{Path, PathBuf},
    process::exit,
};

fn main() {
    let matches = App::new("reparted")
        .about("Reconciles a partition table with its reserved and userdata layout")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .help("the layout to apply, defaulting to <executable>.json beside the executable")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("dry-run")
                .short("n")
                .long("dry-run")
                .help("parse, validate and plan, but leave the disk untouched"),
        )
        .arg(
            Arg::with_name("log")
                .short("l")
                .long("log")
                .help("also append log messages to this file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("log more detail; may be repeated"),
        )
        .arg(
            Arg::with_name("strict")
                .long("strict")
                .help("treat a non-zero exit status as failure, even when the tool printed output"),
        )
        .arg(
            Arg::with_name("list")
                .long("list")
                .help("print the layout of every disk parted can see, then exit"),
        )
        .arg(
            Arg::with_name("tool-version")
                .long("tool-version")
                .help("print the version of the configured parted, then exit"),
        )
        .arg(
            Arg::with_name("tool-help")
                .long("tool-help")
                .help("print the usage of the configured parted, then exit"),
        )
        .get_matches();

    let level = match matches.occurrences_of("verbose") {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    if let Err(why) = reparted::log("reparted", level, matches.value_of("log").map(Path::new)) {
        eprintln!("reparted: failed to initialize logging: {}", why);
        exit(1);
    }

    if let Err(why) = run(&matches) {
        error!("!!!FATAL!!!");
        error!("{}", why);
        exit(1);
    }
}

fn config_path(matches: &ArgMatches) -> Result<PathBuf, CliError> {
    match matches.value_of("config") {
        Some(path) => Ok(PathBuf::from(path)),
        None => env::current_exe()
            .map(|exe| Config::default_path(&exe))
            .map_err(|why| CliError::CurrentExe { why }),
    }
}

fn run(matches: &ArgMatches) -> Result<(), CliError> {
    let path = config_path(matches)?;
    let config = Config::open(&path)?;
    info!("loaded {}", path.display());

    let policy = if matches.is_present("strict") {
        ExitPolicy::RequireSuccess
    } else {
        ExitPolicy::default()
    };
    let runner = System::new(policy);
    let parted = Parted::new(config.parted.as_str(), config.disk.as_str());

    let tool_output = if matches.is_present("list") {
        Some(parted.print_list(&runner, true))
    } else if matches.is_present("tool-version") {
        Some(parted.version(&runner))
    } else if matches.is_present("tool-help") {
        Some(parted.help(&runner))
    } else {
        None
    };

    if let Some(output) = tool_output {
        print!("{}", output.map_err(|why| CliError::Parted { why })?);
        return Ok(());
    }

    let plan = reparted::reconcile(&runner, &config, matches.is_present("dry-run"))?;
    match plan.userdata_adjustment() {
        Adjustment::Take(bytes) => info!("userdata gives up {} bytes", bytes),
        Adjustment::Award(bytes) => info!("userdata gains {} bytes", bytes),
        Adjustment::Unchanged => info!("userdata is unchanged"),
    }

    Ok(())
}
