//! Configuration for jobherd.
//!
//! The [`Config`] struct is not constructable, use [`ConfigBuilder`].
//!
//! # Examples
//!
//! ```
//! # use jobherd::config::ConfigBuilder;
//! ConfigBuilder::default()
//!     .jobfile("jobs.txt")
//!     .verbose(true)
//!     .build()
//!     .expect("mission failed");
//! ```

use std::{path::PathBuf, time::Duration};

use derive_builder::Builder;

/// Arguments to the supervisor
#[derive(Builder, Clone, Debug)]
#[builder(setter(into, strip_option))]
#[builder(build_fn(validate = "Self::validate"))]
#[non_exhaustive]
pub struct Config {
    /// Job file, one job specification per line.
    pub jobfile: PathBuf,
    /// Read operator input from this file instead of standard input.
    #[builder(default)]
    pub input: Option<PathBuf>,
    /// Report registration, spawning, restarts and malformed lines.
    #[builder(default)]
    pub verbose: bool,
    /// Pause given to jobs after they are (re)started or signalled, and the
    /// longest the loop waits for piped job output in a tick.
    #[builder(default = "Duration::from_secs(1)")]
    pub settle: Duration,
}

impl ConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self
            .jobfile
            .as_ref()
            .map_or(true, |path| path.as_os_str().is_empty())
        {
            return Err("jobfile must not be empty".into());
        }

        Ok(())
    }
}
