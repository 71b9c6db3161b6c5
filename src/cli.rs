use std::ffi::OsString;
use std::time::Duration;

use clap::{App, Arg, ErrorKind};

use crate::config::{Config, ConfigBuilder};
use crate::error::{Error, Result};

/// Parses the command line into a [`Config`].
///
/// `--help` and `--version` print and exit here. Anything clap rejects
/// becomes [`Error::Usage`].
pub fn parse<I, T>(argv: I) -> Result<Config>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = App::new("jobherd")
        .version(clap::crate_version!())
        .about("Run a fixed set of jobs, relaying operator input to them and their output back")
        .arg(Arg::with_name("verbose")
                 .help("Report registration, spawning and restarts of jobs")
                 .short("v")
                 .long("verbose"))
        .arg(Arg::with_name("input")
                 .help("Read operator input from this file instead of stdin")
                 .short("i")
                 .long("input")
                 .takes_value(true)
                 .value_name("inputfile"))
        .arg(Arg::with_name("settle")
                 .help("Pause after starting or signalling jobs, defaults to 1000ms")
                 .long("settle")
                 .takes_value(true)
                 .value_name("milliseconds"))
        .arg(Arg::with_name("jobfile")
                 .help("File with one job per line: restarts:input:output:command")
                 .required(true))
        .get_matches_from_safe(argv)
        .map_err(|err| match err.kind {
            ErrorKind::HelpDisplayed | ErrorKind::VersionDisplayed => err.exit(),
            _ => {
                debug!("rejected command line: {}", err.message);
                Error::Usage
            }
        })?;

    let settle = match args.value_of("settle") {
        Some(ms) => Some(ms.parse::<u64>().map_err(|_| Error::Usage)?),
        None => None,
    };

    let mut builder = ConfigBuilder::default();
    builder
        .jobfile(args.value_of_os("jobfile").unwrap_or_default())
        .verbose(args.is_present("verbose"));
    if let Some(input) = args.value_of_os("input") {
        builder.input(input);
    }
    if let Some(ms) = settle {
        builder.settle(Duration::from_millis(ms));
    }

    Ok(builder.build()?)
}
