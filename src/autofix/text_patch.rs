use super::{Attempt, FixMode, FixStrategy};
use crate::defect::{Fix, IssueReport, TextPatch};
use crate::error::FixError;
use crate::model::ProgramUnit;

pub struct TextPatchStrategy;

impl FixStrategy for TextPatchStrategy {
    fn mode(&self) -> FixMode {
        FixMode::TextPatch
    }

    fn attempt(&self, unit: &ProgramUnit, issue: &IssueReport) -> Result<Attempt, FixError> {
        match &issue.fix {
            Some(Fix::TextPatch(patch)) => apply_patch(&unit.source, patch).map(Attempt::text),
            _ => Err(FixError::NotApplicable(issue.rule_id().to_string())),
        }
    }
}

/// Applies every edit of `patch` to a copy of `source`.
///
/// The patch is rejected as a whole if any edit is out of bounds, overlaps
/// another edit, or its anchor no longer matches the text at its range.
pub fn apply_patch(source: &str, patch: &TextPatch) -> Result<String, FixError> {
    let mut order: Vec<usize> = (0..patch.edits.len()).collect();
    order.sort_by_key(|&i| (patch.edits[i].range.start, patch.edits[i].range.end));

    for &index in &order {
        let range = patch.edits[index].range;
        if range.start > range.end
            || range.end > source.len()
            || !source.is_char_boundary(range.start)
            || !source.is_char_boundary(range.end)
        {
            return Err(FixError::OutOfBounds {
                index,
                start: range.start,
                end: range.end,
                len: source.len(),
            });
        }
        if source[range.start..range.end] != patch.edits[index].anchor {
            return Err(FixError::StaleAnchor { index });
        }
    }

    for pair in order.windows(2) {
        let (a, b) = (&patch.edits[pair[0]].range, &patch.edits[pair[1]].range);
        // two insertions at one point are ambiguous too
        if a.overlaps(b) || a.start == b.start {
            return Err(FixError::Overlap {
                first: pair[0],
                second: pair[1],
            });
        }
    }

    let mut output = source.to_string();
    for &index in order.iter().rev() {
        let edit = &patch.edits[index];
        output.replace_range(edit.range.start..edit.range.end, &edit.replacement);
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TextRange;

    const SOURCE: &str = "let a = md5(x);\nlet b = md5(y);\n";

    #[test]
    fn test_edits_apply_from_the_end() {
        let patch = TextPatch::new("sha")
            .replace(SOURCE, TextRange::new(8, 11), "sha256")
            .replace(SOURCE, TextRange::new(24, 27), "sha256");
        let patched = apply_patch(SOURCE, &patch).unwrap();
        assert_eq!(patched, "let a = sha256(x);\nlet b = sha256(y);\n");
    }

    #[test]
    fn test_overlapping_edits_are_rejected() {
        let patch = TextPatch::new("overlap")
            .replace(SOURCE, TextRange::new(8, 11), "sha256")
            .replace(SOURCE, TextRange::new(10, 14), "");
        assert!(matches!(apply_patch(SOURCE, &patch), Err(FixError::Overlap { .. })));
    }

    #[test]
    fn test_stale_anchor_is_rejected() {
        let patch = TextPatch::new("sha").replace(SOURCE, TextRange::new(8, 11), "sha256");
        let edited = SOURCE.replacen("md5", "crc", 1);
        assert!(matches!(
            apply_patch(&edited, &patch),
            Err(FixError::StaleAnchor { index: 0 })
        ));
    }

    #[test]
    fn test_out_of_bounds_is_rejected() {
        let mut patch = TextPatch::new("oob");
        patch.edits.push(crate::defect::PatchEdit {
            range: TextRange::new(30, 90),
            anchor: String::new(),
            replacement: "x".to_string(),
        });
        assert!(matches!(apply_patch(SOURCE, &patch), Err(FixError::OutOfBounds { .. })));
    }

    #[test]
    fn test_non_char_boundary_is_rejected() {
        let source = "let s = \"é\";";
        let mut patch = TextPatch::new("split");
        patch.edits.push(crate::defect::PatchEdit {
            range: TextRange::new(10, 11),
            anchor: String::new(),
            replacement: "e".to_string(),
        });
        assert!(matches!(apply_patch(source, &patch), Err(FixError::OutOfBounds { .. })));
    }
}
