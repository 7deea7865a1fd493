use super::{Attempt, FixMode, FixStrategy};
use crate::defect::{Fix, IssueReport};
use crate::error::FixError;
use crate::model::{ProgramUnit, UnitPrinter};

/// Runs the fix's mutator on a copy of the unit, then prints the copy.
///
/// The engine swaps the copy in once the artifact is written, so a failed
/// attempt or a failed write leaves the unit as it was.
pub struct UnitFixStrategy;

impl FixStrategy for UnitFixStrategy {
    fn mode(&self) -> FixMode {
        FixMode::UnitFix
    }

    fn attempt(&self, unit: &ProgramUnit, issue: &IssueReport) -> Result<Attempt, FixError> {
        let Some(Fix::UnitFix(fix)) = &issue.fix else {
            return Err(FixError::NotApplicable(issue.rule_id().to_string()));
        };
        let key = issue.defect.fix_key.clone().unwrap_or_default();

        let mut candidate = unit.clone();
        if !fix.fix(&mut candidate, &key) {
            return Err(FixError::NotApplicable(key));
        }
        let printed = UnitPrinter::new().print(&candidate)?;
        Ok(Attempt::with_unit(printed, candidate))
    }
}
