//! Jobherd: the library
//!
//! Supervises a fixed set of jobs read from a job file. Each line the operator
//! types is broadcast to every running job with piped input, and one line of
//! each piped job's output is relayed back per tick. Jobs are restarted when
//! they end until their restart budget is spent.
//!
//! The purpose of the project is to deliver the `jobherd` tool; the library
//! interface exists to implement it and to test it, and may change between
//! releases.

#![deny(unsafe_code)]
#![allow(clippy::default_trait_access)]

#[macro_use]
extern crate log;

pub mod cli;
pub mod config;
pub mod console;
pub mod error;
pub mod job;
pub mod jobfile;
pub mod lines;
pub mod output;
pub mod process;
pub mod report;
pub mod run;
pub mod signal;
pub mod table;
pub mod tokenize;

pub use run::run;
