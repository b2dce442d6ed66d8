//! Operator commands read line by line from stdin.

use anyhow::{bail, Context, Result};
use rover_vehicle::{Pad, PadInput};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ResetTarget {
    /// Re-center the camera gimbal
    Gimbal,
    /// Restart SLAM mapping
    Map,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConsoleCommand {
    Pad(Pad, PadInput),
    Dismiss,
    Reset(ResetTarget),
    Status,
    Connect,
    Disconnect,
    ReloadVideo,
    Quit,
}

/// Blank lines and `#` comments yield `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<ConsoleCommand>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let words: Vec<&str> = line.split_whitespace().collect();
    let cmd = match words.as_slice() {
        [pad @ ("car" | "gimbal"), rest @ ..] => {
            let pad = if *pad == "car" { Pad::Vehicle } else { Pad::Gimbal };
            ConsoleCommand::Pad(pad, pad_input(rest)?)
        }
        ["dismiss"] => ConsoleCommand::Dismiss,
        ["reset", "gimbal"] => ConsoleCommand::Reset(ResetTarget::Gimbal),
        ["reset", "map"] => ConsoleCommand::Reset(ResetTarget::Map),
        ["status"] => ConsoleCommand::Status,
        ["connect"] => ConsoleCommand::Connect,
        ["disconnect"] => ConsoleCommand::Disconnect,
        ["reload", "video"] => ConsoleCommand::ReloadVideo,
        ["quit"] | ["exit"] => ConsoleCommand::Quit,
        _ => bail!("unknown command {:?}", line),
    };
    Ok(Some(cmd))
}

fn pad_input(args: &[&str]) -> Result<PadInput> {
    match args {
        ["release"] => Ok(PadInput::Release),
        [x, y] => {
            let x: f64 = x.parse().with_context(|| format!("bad x {:?}", x))?;
            let y: f64 = y.parse().with_context(|| format!("bad y {:?}", y))?;
            Ok(PadInput::Move { x, y })
        }
        _ => bail!("expected `<x> <y>` or `release`"),
    }
}
