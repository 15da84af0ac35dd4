//! Command Extraction
//!
//! Pulls runnable shell commands out of fenced code blocks in an assistant reply.

use once_cell::sync::Lazy;
use regex::Regex;

use super::safety::validate_command;
use crate::models::Command;

/// Any fenced block; group 1 is the language tag, group 2 the body
static CODE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```([\w+-]*)\n(.*?)\n```").expect("Invalid code block regex"));

/// Tags of blocks whose lines are treated as commands; empty means untagged
const SHELL_TAGS: &[&str] = &["", "bash", "shell"];

/// How far before a block to look for its description, in bytes
const CONTEXT_WINDOW: usize = 150;

const SECTION_BREAKS: &[&str] = &["\n\n", "# ", "## ", "### "];

const LIST_MARKERS: &[&str] = &["\n1. ", "\n- ", "\n* ", "\n• "];

/// Extract validated commands from markdown, in source order.
///
/// Each non-blank, non-comment line of a block becomes one command. Lines the
/// validator rejects are dropped silently.
pub fn extract_commands(markdown: &str) -> Vec<Command> {
    let mut commands = Vec::new();

    for captures in CODE_BLOCK.captures_iter(markdown) {
        let (Some(block), Some(tag), Some(body)) = (captures.get(0), captures.get(1), captures.get(2))
        else {
            continue;
        };

        if !SHELL_TAGS.contains(&tag.as_str()) {
            continue;
        }

        let body = body.as_str().trim();
        if body.is_empty() {
            continue;
        }

        let description = command_context(markdown, block.start());

        for line in body.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if validate_command(line) {
                commands.push(Command::new(line, description.clone()));
            } else {
                tracing::debug!("Dropped unsafe command from reply: {:?}", line);
            }
        }
    }

    commands
}

/// Describe a block using the text right before it.
///
/// The text is cut at the last paragraph break or heading, or at the last list
/// item when that is closer to the block.
fn command_context(content: &str, block_start: usize) -> Option<String> {
    let mut start = block_start.saturating_sub(CONTEXT_WINDOW);
    while !content.is_char_boundary(start) {
        start += 1;
    }
    let before = &content[start..block_start];

    // Widen a heading match back to its first `#`
    let section_cut = SECTION_BREAKS
        .iter()
        .filter_map(|marker| before.rfind(marker))
        .max()
        .map(|mut idx| {
            while idx > 0 && before.as_bytes()[idx - 1] == b'#' {
                idx -= 1;
            }
            idx
        });

    // Skip the newline so the list marker itself is kept
    let list_cut = LIST_MARKERS
        .iter()
        .filter_map(|marker| before.rfind(marker).map(|idx| idx + 1))
        .max();

    let cut = match (section_cut, list_cut) {
        (Some(section), Some(list)) => Some(section.max(list)),
        (section, list) => section.or(list),
    };

    let context = cut.map_or(before, |idx| &before[idx..]).trim();
    if context.is_empty() {
        None
    } else {
        Some(context.to_string())
    }
}
