//! iCalendar text normalization and VEVENT block extraction
//!
//! Input is untrusted and often sloppy, so nothing here returns an error:
//! lines that do not look like `NAME[;PARAMS]:VALUE` are skipped, an event left
//! open at end of input is dropped, and empty input yields no blocks.
//!
//! Format notes (RFC 5545, only what the pipeline needs):
//! - A physical line starting with a space or tab continues the previous one;
//!   the single leading whitespace character is removed when unfolding.
//! - Text values escape `,` `;` `\` and newlines with a backslash.
//! - Components nest (`BEGIN:VALARM` inside `BEGIN:VEVENT`); only properties at
//!   the event's own level are collected.

use tracing::debug;

/// Raw properties of one VEVENT, with text values already decoded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventBlock {
    /// DTSTART value as written, parameters stripped
    pub dtstart: Option<String>,
    pub summary: String,
    pub description: String,
    pub location: String,
}

/// One unfolded content line split into name and value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContentLine<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

impl ContentLine<'_> {
    fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Rejoin folded lines. Handles `\r\n` and `\n` line endings and a leading BOM.
pub fn unfold_lines(raw: &str) -> Vec<String> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let mut lines: Vec<String> = Vec::new();

    for physical in raw.split('\n') {
        let physical = physical.strip_suffix('\r').unwrap_or(physical);

        match physical.chars().next() {
            Some(c @ (' ' | '\t')) => match lines.last_mut() {
                Some(last) => last.push_str(&physical[c.len_utf8()..]),
                None => {
                    let trimmed = physical.trim_start();
                    if !trimmed.is_empty() {
                        lines.push(trimmed.to_string());
                    }
                }
            },
            Some(_) => lines.push(physical.to_string()),
            None => {}
        }
    }

    lines
}

/// Decode TEXT escapes. Escaped newlines become a single space so that
/// multi-line descriptions stay searchable as one line.
pub fn decode_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push(' '),
            Some(escaped @ (',' | ';' | '\\' | ':' | '"')) => out.push(escaped),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}

/// Split `NAME;PARAM=a:b;X="q:r":VALUE` into name and value. The value starts
/// after the first colon outside a quoted parameter value.
pub fn split_content_line(line: &str) -> Option<ContentLine<'_>> {
    let name_end = line.find([';', ':'])?;
    let name = line[..name_end].trim();
    if name.is_empty() {
        return None;
    }

    let mut in_quotes = false;
    for (offset, c) in line[name_end..].char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ':' if !in_quotes => {
                let value_start = name_end + offset + 1;
                return Some(ContentLine { name, value: &line[value_start..] });
            }
            _ => {}
        }
    }

    None
}

/// Parser state over logical lines
enum ParserState {
    OutsideEvent,
    /// Inside a VEVENT; `depth` counts nested components (VALARM etc.)
    InEvent { block: EventBlock, depth: usize },
}

/// Extract every complete VEVENT from raw calendar text
pub fn parse_event_blocks(raw: &str) -> Vec<EventBlock> {
    let mut blocks = Vec::new();
    let mut state = ParserState::OutsideEvent;
    let mut skipped_lines = 0usize;

    for line in unfold_lines(raw) {
        let Some(content) = split_content_line(&line) else {
            skipped_lines += 1;
            continue;
        };

        state = match state {
            ParserState::OutsideEvent => {
                if content.is("BEGIN") && content.value.trim().eq_ignore_ascii_case("VEVENT") {
                    ParserState::InEvent { block: EventBlock::default(), depth: 0 }
                } else {
                    ParserState::OutsideEvent
                }
            }
            ParserState::InEvent { mut block, depth } => {
                if content.is("BEGIN") && content.value.trim().eq_ignore_ascii_case("VEVENT") {
                    // VEVENT never nests: the open block lost its END
                    debug!(summary = %block.summary, "ics_unterminated_event_dropped");
                    ParserState::InEvent { block: EventBlock::default(), depth: 0 }
                } else if content.is("BEGIN") {
                    ParserState::InEvent { block, depth: depth + 1 }
                } else if content.is("END") && depth > 0 {
                    ParserState::InEvent { block, depth: depth - 1 }
                } else if content.is("END") {
                    if content.value.trim().eq_ignore_ascii_case("VEVENT") {
                        blocks.push(block);
                    } else {
                        debug!(end = %content.value, "ics_unbalanced_end_dropped_event");
                    }
                    ParserState::OutsideEvent
                } else {
                    if depth == 0 {
                        apply_property(&mut block, &content);
                    }
                    ParserState::InEvent { block, depth }
                }
            }
        };
    }

    if matches!(state, ParserState::InEvent { .. }) {
        debug!("ics_unterminated_event_dropped");
    }
    if skipped_lines > 0 {
        debug!(skipped_lines = %skipped_lines, "ics_malformed_lines_skipped");
    }

    blocks
}

fn apply_property(block: &mut EventBlock, content: &ContentLine<'_>) {
    if content.is("DTSTART") {
        if block.dtstart.is_none() {
            block.dtstart = Some(content.value.trim().to_string());
        }
    } else if content.is("SUMMARY") {
        if block.summary.is_empty() {
            block.summary = decode_value(content.value);
        }
    } else if content.is("DESCRIPTION") {
        if !block.description.is_empty() {
            block.description.push(' ');
        }
        block.description.push_str(&decode_value(content.value));
    } else if content.is("LOCATION") && block.location.is_empty() {
        block.location = decode_value(content.value);
    }
}
