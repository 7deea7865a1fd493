//! Routes program entities to the checkers whose matchers accept them.

use crate::config::{Config, RuleSettings};
use crate::defect::IssueReport;
use crate::model::{Class, Method, ProgramUnit, Statement};
use crate::rules::{CheckContext, Checker, Granularity, Matcher, Node};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};

/// A checker that panicked while handling a node. The run carries on without
/// the findings of that call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckerFault {
    pub rule_id: String,
    pub node: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Grouped by checker in registration order, then by node document order.
    pub issues: Vec<IssueReport>,
    pub faults: Vec<CheckerFault>,
}

struct Entry {
    checker: Box<dyn Checker>,
    settings: RuleSettings,
    matchers: [Vec<Matcher>; 5],
}

impl Entry {
    fn accepts(&self, node: &Node<'_>) -> bool {
        self.matchers[node.granularity().index()]
            .iter()
            .any(|matcher| matcher.accepts(node))
    }
}

pub struct Dispatcher {
    entries: Vec<Entry>,
    /// Indexes into `entries` of the checkers with at least one matcher per
    /// granularity.
    interested: [Vec<usize>; 5],
}

impl Dispatcher {
    /// Collects matchers from every enabled checker, once.
    pub fn new(checkers: Vec<Box<dyn Checker>>, config: &Config) -> Self {
        let mut entries = Vec::new();
        let mut interested: [Vec<usize>; 5] = Default::default();

        for checker in checkers {
            if !config.is_enabled(checker.id()) {
                tracing::debug!("rule {} disabled", checker.id());
                continue;
            }
            let mut matchers: [Vec<Matcher>; 5] = Default::default();
            for matcher in checker.register_matchers() {
                matchers[matcher.granularity.index()].push(matcher);
            }
            let index = entries.len();
            for granularity in Granularity::ALL {
                if !matchers[granularity.index()].is_empty() {
                    interested[granularity.index()].push(index);
                }
            }
            let settings = config.rule(checker.id());
            entries.push(Entry {
                checker,
                settings,
                matchers,
            });
        }

        Self { entries, interested }
    }

    pub fn checker_ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|entry| entry.checker.id())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dispatch(&self, unit: &ProgramUnit) -> DispatchOutcome {
        let mut walk = Walk {
            dispatcher: self,
            contexts: self
                .entries
                .iter()
                .map(|entry| CheckContext::new(unit, entry.checker.as_ref(), &entry.settings))
                .collect(),
            faults: Vec::new(),
        };

        walk.visit(Node::File(unit));
        for class in &unit.classes {
            walk.visit_class(class);
        }

        let issues: Vec<IssueReport> = walk.contexts.into_iter().flat_map(CheckContext::into_issues).collect();
        tracing::debug!(
            "dispatched {}: {} issues, {} faults",
            unit.name,
            issues.len(),
            walk.faults.len()
        );
        DispatchOutcome {
            issues,
            faults: walk.faults,
        }
    }
}

struct Walk<'d, 'u> {
    dispatcher: &'d Dispatcher,
    contexts: Vec<CheckContext<'u>>,
    faults: Vec<CheckerFault>,
}

impl<'d, 'u> Walk<'d, 'u> {
    fn visit_class(&mut self, class: &'u Class) {
        self.visit(Node::Class(class));
        for method in &class.methods {
            if method.is_synthetic() {
                continue;
            }
            self.visit(Node::Method { class, method });
            self.visit_body(method);
        }
    }

    fn visit_body(&mut self, method: &'u Method) {
        for statement in method.cfg.statements() {
            self.visit(Node::Statement { method, statement });
            self.visit_expressions(statement);
        }
    }

    fn visit_expressions(&mut self, statement: &'u Statement) {
        let mut expressions: Vec<_> = statement.expressions.iter().collect();
        expressions.sort_by_key(|expr| expr.origin.span.start);
        for expression in expressions {
            self.visit(Node::Expression { statement, expression });
        }
    }

    fn visit(&mut self, node: Node<'u>) {
        let dispatcher = self.dispatcher;
        for &index in &dispatcher.interested[node.granularity().index()] {
            let entry = &dispatcher.entries[index];
            if !entry.accepts(&node) {
                continue;
            }

            let ctx = &mut self.contexts[index];
            let before = ctx.issue_count();
            let result = panic::catch_unwind(AssertUnwindSafe(|| entry.checker.check(node, ctx)));
            if let Err(payload) = result {
                ctx.truncate(before);
                let fault = CheckerFault {
                    rule_id: entry.checker.id().to_string(),
                    node: node.describe(),
                    message: panic_message(payload.as_ref()),
                };
                tracing::warn!("rule {} failed on {}: {}", fault.rule_id, fault.node, fault.message);
                self.faults.push(fault);
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "checker panicked".to_string()
    }
}
