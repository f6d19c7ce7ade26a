use std::io::{self, Write};

use serde::Serialize;

use crate::app::{AllResult, ProgressEvent, ProgressSink};
use crate::archive::ExpandResult;
use crate::layout::FixResult;
use crate::sidecar::PruneResult;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_unzip(result: &ExpandResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_fix(result: &FixResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_clean(result: &PruneResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_all(result: &AllResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Prints progress lines to stdout as they arrive.
pub struct ConsoleOutput;

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => println!("{} ({} ms)", event.message, elapsed.as_millis()),
            None => println!("{}", event.message),
        }
    }
}
