//! Offline listener check for mission authors.

use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};
use mission_core::{ListenerKind, MatchResult, MissionDefinition, PartialMatcher, SessionDefinition};

/// Loads `config`, picks the 1-based `mission`, and checks each block of
/// stdin against its listener until stdin closes.
pub fn run(config: &Path, mission: usize) -> Result<()> {
    let definition = SessionDefinition::load(config)
        .with_context(|| format!("failed to load {}", config.display()))?;
    let stdin = io::stdin();
    let stdout = io::stdout();
    validate(&definition.missions, mission, stdin.lock(), stdout.lock())
}

pub fn validate<R: BufRead, W: Write>(
    missions: &[MissionDefinition],
    number: usize,
    input: R,
    mut out: W,
) -> Result<()> {
    let Some(mission) = number.checked_sub(1).and_then(|index| missions.get(index)) else {
        writeln!(out, "❌ Invalid mission number. Available missions:")?;
        for (index, mission) in missions.iter().enumerate() {
            writeln!(out, "{}. {}", index + 1, mission.title)?;
        }
        return Ok(());
    };

    let listener = &mission.listener;
    let matcher = match PartialMatcher::new(listener.kind, &listener.pattern) {
        Ok(matcher) => matcher,
        Err(err) => {
            writeln!(out, "❌ Invalid pattern: {err}")?;
            return Ok(());
        }
    };
    writeln!(out, "\nMission {number}: {}", mission.title)?;
    let label = match listener.kind {
        ListenerKind::Exact => "exact match",
        ListenerKind::Regex => "regex pattern",
    };
    writeln!(out, "{label}: {}", listener.pattern)?;
    writeln!(
        out,
        "\nEnter {} to validate (double empty line to submit, Ctrl+D to exit):",
        listener.target
    )?;
    out.flush()?;

    let mut lines = input.lines();
    loop {
        let (block, more) = read_block(&mut lines)?;
        if let Some(block) = block {
            report(&mut out, matcher.evaluate(&block))?;
            out.flush()?;
        }
        if !more {
            break;
        }
    }
    writeln!(out, "\nExiting validation mode")?;
    Ok(())
}

/// Reads lines until two consecutive empty lines (the first is kept as
/// part of the block) or end of input. Returns the block, if it has any
/// content, and whether more input may follow.
fn read_block<I>(lines: &mut I) -> io::Result<(Option<String>, bool)>
where
    I: Iterator<Item = io::Result<String>>,
{
    let mut block: Vec<String> = Vec::new();
    let mut empty_run = 0;
    let more = loop {
        let Some(line) = lines.next().transpose()? else {
            break false;
        };
        if line.is_empty() {
            empty_run += 1;
            if empty_run >= 2 {
                break true;
            }
        } else {
            empty_run = 0;
        }
        block.push(line);
    };
    let has_content = block.iter().any(|line| !line.is_empty());
    Ok((has_content.then(|| block.join("\n")), more))
}

fn report<W: Write>(out: &mut W, result: MatchResult) -> io::Result<()> {
    match result {
        MatchResult::Complete(text) => {
            writeln!(out, "✅ Match!")?;
            writeln!(out, "Matched text: {text:?}")
        }
        MatchResult::Partial(text) => {
            writeln!(out, "🔍 Partial match found.")?;
            writeln!(out, "Matched up to: {text:?}")
        }
        MatchResult::NoMatch => writeln!(out, "❌ No match"),
    }
}
