//! Lowers Rust source into the program model with `syn`.
//!
//! `impl` blocks and trait definitions become classes, free functions are
//! gathered into a `<module>` class. Every block of a function body is a basic
//! block; a nested block is linked to its parent in both directions. Methods
//! of `#[automatically_derived]` impls have no origin.

use super::Frontend;
use crate::error::FrontendError;
use crate::model::{
    BasicBlock, Class, ControlFlowGraph, ExprKind, Expression, LineIndex, Method, Origin, ProgramUnit, Statement,
    TextRange,
};
use proc_macro2::{LineColumn, Span};
use quote::ToTokens;
use std::path::Path;
use syn::punctuated::Punctuated;
use syn::visit::{self, Visit};
use syn::{Attribute, Block, Expr, ImplItem, Item, Lit, Stmt, TraitItem, Type};

pub const MODULE_CLASS: &str = "<module>";

pub struct RustFrontend;

impl Frontend for RustFrontend {
    fn name(&self) -> &'static str {
        "rust"
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension().map_or(false, |ext| ext == "rs")
    }

    fn parse(&self, name: &str, path: &Path, source: String) -> Result<ProgramUnit, FrontendError> {
        let lowered = lower_source(&source).map_err(|message| FrontendError::Parse {
            path: path.to_path_buf(),
            message,
        });
        // every parse leaves a copy of the source in the thread's span map
        proc_macro2::extra::invalidate_current_thread_spans();

        let classes = lowered?;
        let mut unit = ProgramUnit::new(name, path, source);
        unit.classes = classes;
        Ok(unit)
    }
}

/// Parses and lowers `source`. No span outlives this call.
fn lower_source(source: &str) -> Result<Vec<Class>, String> {
    let file = syn::parse_file(source).map_err(|e| {
        let at = e.span().start();
        format!("{}:{}: {}", at.line, at.column + 1, e)
    })?;
    let mut lowering = Lowering::new(source);
    lowering.lower_items(&file.items, "");
    Ok(lowering.finish())
}

struct Lowering<'s> {
    source: &'s str,
    index: LineIndex,
    next_id: usize,
    classes: Vec<Class>,
    free_functions: Vec<Method>,
}

impl<'s> Lowering<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            index: LineIndex::new(source),
            next_id: 0,
            classes: Vec::new(),
            free_functions: Vec::new(),
        }
    }

    fn finish(mut self) -> Vec<Class> {
        if !self.free_functions.is_empty() {
            self.classes.insert(
                0,
                Class {
                    name: MODULE_CLASS.to_string(),
                    origin: None,
                    methods: self.free_functions,
                },
            );
        }
        self.classes
    }

    fn lower_items(&mut self, items: &[Item], prefix: &str) {
        for item in items {
            match item {
                Item::Fn(func) => {
                    let method = self.lower_method(func.sig.ident.to_string(), false, &func.attrs, &func.sig, &func.block);
                    self.free_functions.push(method);
                }
                Item::Impl(imp) => {
                    let derived = is_derived(&imp.attrs);
                    let methods = imp
                        .items
                        .iter()
                        .filter_map(|item| match item {
                            ImplItem::Fn(f) => {
                                Some(self.lower_method(f.sig.ident.to_string(), derived, &f.attrs, &f.sig, &f.block))
                            }
                            _ => None,
                        })
                        .collect();
                    let origin = self.origin_of(imp.impl_token.span, imp.brace_token.span.close());
                    self.classes.push(Class {
                        name: format!("{}{}", prefix, type_name(&imp.self_ty)),
                        origin: if derived { None } else { origin },
                        methods,
                    });
                }
                Item::Trait(tr) => {
                    let methods = tr
                        .items
                        .iter()
                        .filter_map(|item| match item {
                            TraitItem::Fn(f) => f
                                .default
                                .as_ref()
                                .map(|block| self.lower_method(f.sig.ident.to_string(), false, &f.attrs, &f.sig, block)),
                            _ => None,
                        })
                        .collect();
                    let origin = self.origin_of(tr.trait_token.span, tr.brace_token.span.close());
                    self.classes.push(Class {
                        name: format!("{}{}", prefix, tr.ident),
                        origin,
                        methods,
                    });
                }
                Item::Mod(module) => {
                    if let Some((_, items)) = &module.content {
                        let prefix = format!("{}{}::", prefix, module.ident);
                        self.lower_items(items, &prefix);
                    }
                }
                _ => {}
            }
        }
    }

    fn lower_method(
        &mut self,
        name: String,
        derived: bool,
        attrs: &[Attribute],
        sig: &syn::Signature,
        block: &Block,
    ) -> Method {
        let synthetic = derived || is_derived(attrs);
        let origin = if synthetic {
            None
        } else {
            range_between(self.source, &self.index, sig, block).map(|range| self.index.origin(range))
        };
        let mut cfg = ControlFlowGraph::default();
        self.lower_block(block, None, &mut cfg);
        Method { name, origin, cfg }
    }

    fn lower_block(&mut self, block: &Block, parent: Option<usize>, cfg: &mut ControlFlowGraph) {
        let id = cfg.blocks.len();
        cfg.blocks.push(BasicBlock {
            id,
            statements: Vec::new(),
        });
        if let Some(parent) = parent {
            cfg.edges.push((parent, id));
            cfg.edges.push((id, parent));
        }

        for stmt in &block.stmts {
            // nested items are not part of the body's flow
            if matches!(stmt, Stmt::Item(_)) {
                continue;
            }
            let mut collector = Collector::new(self.source, &self.index);
            collector.visit_stmt(stmt);
            let Collector { expressions, nested, .. } = collector;

            if let Some(range) = range_between(self.source, &self.index, stmt, stmt) {
                let statement = Statement::new(self.next_id, self.index.origin(range), &self.source[range.start..range.end])
                    .with_expressions(expressions);
                self.next_id += 1;
                cfg.blocks[id].statements.push(statement);
            }
            for child in &nested {
                self.lower_block(child, Some(id), cfg);
            }
        }
    }

    fn origin_of(&self, start: Span, end: Span) -> Option<Origin> {
        let start = offset(self.source, &self.index, start.start())?;
        let end = offset(self.source, &self.index, end.end())?;
        (start <= end).then(|| self.index.origin(TextRange::new(start, end)))
    }
}

/// Gathers the expressions of one statement. Blocks are collected, not
/// entered; they become basic blocks of their own.
struct Collector<'a> {
    source: &'a str,
    index: &'a LineIndex,
    expressions: Vec<Expression>,
    nested: Vec<Block>,
}

impl<'a> Collector<'a> {
    fn new(source: &'a str, index: &'a LineIndex) -> Self {
        Self {
            source,
            index,
            expressions: Vec::new(),
            nested: Vec::new(),
        }
    }

    fn push(&mut self, kind: ExprKind, name: Option<String>, range: Option<TextRange>) {
        if let Some(range) = range {
            let text = &self.source[range.start..range.end];
            self.expressions
                .push(Expression::new(kind, name, text, self.index.origin(range)));
        }
    }

    fn range<T: ToTokens>(&self, node: &T) -> Option<TextRange> {
        range_between(self.source, self.index, node, node)
    }
}

impl<'ast, 'a> Visit<'ast> for Collector<'a> {
    fn visit_block(&mut self, block: &'ast Block) {
        self.nested.push(block.clone());
    }

    fn visit_item(&mut self, _item: &'ast Item) {}

    fn visit_expr_call(&mut self, call: &'ast syn::ExprCall) {
        let name = match call.func.as_ref() {
            Expr::Path(path) => Some(path_name(&path.path)),
            _ => None,
        };
        let range = self.range(call);
        self.push(ExprKind::Call, name, range);
        visit::visit_expr_call(self, call);
    }

    fn visit_expr_method_call(&mut self, call: &'ast syn::ExprMethodCall) {
        // the receiver is an expression of its own
        let range = range_between(self.source, self.index, &call.method, call);
        self.push(ExprKind::MethodCall, Some(call.method.to_string()), range);
        visit::visit_expr_method_call(self, call);
    }

    fn visit_expr_binary(&mut self, binary: &'ast syn::ExprBinary) {
        let op = binary.op.to_token_stream().to_string().replace(' ', "");
        let range = self.range(binary);
        self.push(ExprKind::Binary, Some(op), range);
        visit::visit_expr_binary(self, binary);
    }

    fn visit_expr_lit(&mut self, lit: &'ast syn::ExprLit) {
        let kind = match &lit.lit {
            Lit::Str(_) | Lit::ByteStr(_) => ExprKind::StringLiteral,
            Lit::Int(_) | Lit::Float(_) => ExprKind::NumberLiteral,
            _ => ExprKind::Other,
        };
        let range = self.range(lit);
        self.push(kind, None, range);
    }

    fn visit_macro(&mut self, mac: &'ast syn::Macro) {
        let range = self.range(mac);
        self.push(ExprKind::Macro, Some(path_name(&mac.path)), range);
        // format-like macros take plain expressions
        if let Ok(args) = mac.parse_body_with(Punctuated::<Expr, syn::Token![,]>::parse_terminated) {
            for arg in &args {
                self.visit_expr(arg);
            }
        }
    }
}

fn is_derived(attrs: &[Attribute]) -> bool {
    attrs.iter().any(|attr| attr.path().is_ident("automatically_derived"))
}

fn path_name(path: &syn::Path) -> String {
    path.segments
        .iter()
        .map(|segment| segment.ident.to_string())
        .collect::<Vec<_>>()
        .join("::")
}

fn type_name(ty: &Type) -> String {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .map_or_else(|| "?".to_string(), |segment| segment.ident.to_string()),
        other => other.to_token_stream().to_string().replace(' ', ""),
    }
}

fn offset(source: &str, index: &LineIndex, at: LineColumn) -> Option<usize> {
    index.offset(source, at.line, at.column)
}

/// Byte range from the first token of `first` to the last token of `last`.
fn range_between<A: ToTokens, B: ToTokens>(
    source: &str,
    index: &LineIndex,
    first: &A,
    last: &B,
) -> Option<TextRange> {
    let start_span = first.to_token_stream().into_iter().next()?.span();
    let end_span = last.to_token_stream().into_iter().last()?.span();
    let start = offset(source, index, start_span.start())?;
    let end = offset(source, index, end_span.end())?;
    (start <= end).then(|| TextRange::new(start, end))
}
