use super::{ProgramUnit, StatementEdit, TextRange};
use crate::error::PrintError;

/// Serializes a (possibly mutated) program unit back to source text.
///
/// Unedited code is copied verbatim from the unit source; only the spans of
/// edited statements change. A removed statement that is alone on its lines
/// takes those lines with it.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnitPrinter;

impl UnitPrinter {
    pub fn new() -> Self {
        Self
    }

    pub fn print(&self, unit: &ProgramUnit) -> Result<String, PrintError> {
        let source = unit.source.as_str();
        let mut edits: Vec<(usize, TextRange, &str)> = Vec::new();

        for stmt in unit.statements() {
            let Some(edit) = stmt.edit() else { continue };
            let span = stmt.origin.span;
            if span.start > span.end
                || span.end > source.len()
                || !source.is_char_boundary(span.start)
                || !source.is_char_boundary(span.end)
            {
                return Err(PrintError::SpanOutOfRange(stmt.id));
            }
            match edit {
                StatementEdit::Replace(text) => edits.push((stmt.id, span, text.as_str())),
                StatementEdit::Remove => edits.push((stmt.id, owned_lines(source, span), "")),
            }
        }

        edits.sort_by_key(|(id, span, _)| (span.start, *id));
        for pair in edits.windows(2) {
            if pair[0].1.overlaps(&pair[1].1) || pair[0].1 == pair[1].1 {
                return Err(PrintError::OverlappingEdits {
                    first: pair[0].0,
                    second: pair[1].0,
                });
            }
        }

        let mut output = source.to_string();
        for (_, span, text) in edits.iter().rev() {
            output.replace_range(span.start..span.end, text);
        }
        Ok(output)
    }
}

/// Widens `span` to its full lines when nothing but whitespace shares them.
fn owned_lines(source: &str, span: TextRange) -> TextRange {
    let line_start = source[..span.start].rfind('\n').map_or(0, |i| i + 1);
    if !source[line_start..span.start].trim().is_empty() {
        return span;
    }

    let rest = &source[span.end..];
    let (tail, newline) = match rest.find('\n') {
        Some(i) => (&rest[..i], 1),
        None => (rest, 0),
    };
    if !tail.trim().is_empty() {
        return span;
    }
    TextRange::new(line_start, span.end + tail.len() + newline)
}
