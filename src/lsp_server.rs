use std::collections::HashMap;
use std::path::PathBuf;

use tokio::sync::{Mutex, RwLock};
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};

use checkfix::analyzer::Analyzer;
use checkfix::config::Config;
use checkfix::defect::{Fix, IssueReport, Severity};
use checkfix::model::LineIndex;
use tracing_subscriber::EnvFilter;

const SOURCE: &str = "checkfix";

pub struct Backend {
    client: Client,
    analyzer: RwLock<Analyzer>,
    documents: Mutex<HashMap<Url, String>>,
}

impl Backend {
    pub fn new(client: Client) -> Self {
        let config = Config::load_or_default(&PathBuf::from("."));
        Self {
            client,
            analyzer: RwLock::new(Analyzer::new(config)),
            documents: Mutex::new(HashMap::new()),
        }
    }

    async fn issues_for(&self, uri: &Url) -> Option<(String, Vec<IssueReport>)> {
        let path = uri.to_file_path().ok()?;
        let text = match self.documents.lock().await.get(uri) {
            Some(text) => text.clone(),
            None => std::fs::read_to_string(&path).ok()?,
        };
        let name = path.file_name()?.to_string_lossy().to_string();
        let result = self.analyzer.read().await.analyze_source(&name, &path, text.clone());
        match result {
            Ok(result) => Some((text, result.issues)),
            Err(e) => {
                tracing::debug!("{}", e);
                None
            }
        }
    }

    async fn publish(&self, uri: Url) {
        let diagnostics = match self.issues_for(&uri).await {
            Some((text, issues)) => issues.iter().map(|issue| diagnostic(&text, issue)).collect(),
            None => Vec::new(),
        };
        self.client.publish_diagnostics(uri, diagnostics, None).await;
    }
}

/// Workspace root announced by the client, if it is on disk.
#[allow(deprecated)]
fn workspace_root(params: &InitializeParams) -> Option<PathBuf> {
    params
        .workspace_folders
        .as_ref()
        .and_then(|folders| folders.first())
        .and_then(|folder| folder.uri.to_file_path().ok())
        .or_else(|| params.root_uri.as_ref().and_then(|uri| uri.to_file_path().ok()))
}

fn severity(severity: Severity) -> DiagnosticSeverity {
    match severity {
        Severity::Error => DiagnosticSeverity::ERROR,
        Severity::Warning => DiagnosticSeverity::WARNING,
        Severity::Info => DiagnosticSeverity::INFORMATION,
    }
}

/// Character position of a 1-based line and 1-based byte column.
fn position(text: &str, line: usize, byte_column: usize) -> Position {
    let line_text = text.lines().nth(line.saturating_sub(1)).unwrap_or("");
    let byte = byte_column.saturating_sub(1).min(line_text.len());
    let character = line_text
        .char_indices()
        .take_while(|(i, _)| *i < byte)
        .count();
    Position {
        line: line.saturating_sub(1) as u32,
        character: character as u32,
    }
}

fn diagnostic(text: &str, issue: &IssueReport) -> Diagnostic {
    let line = usize::try_from(issue.defect.start_line).unwrap_or(1);
    Diagnostic {
        range: Range {
            start: position(text, line, issue.defect.start_column),
            end: position(text, line, issue.defect.end_column),
        },
        severity: Some(severity(issue.defect.severity)),
        code: Some(NumberOrString::String(issue.defect.rule_id.clone())),
        source: Some(SOURCE.to_string()),
        message: issue.defect.description.clone(),
        related_information: None,
        tags: None,
        code_description: None,
        data: None,
    }
}

fn range_of(text: &str, index: &LineIndex, start: usize, end: usize) -> Range {
    let (start_line, start_col) = index.position(start);
    let (end_line, end_col) = index.position(end);
    Range {
        start: position(text, start_line, start_col),
        end: position(text, end_line, end_col),
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        if let Some(root) = workspace_root(&params) {
            tracing::debug!("loading configuration from {}", root.display());
            *self.analyzer.write().await = Analyzer::new(Config::load_or_default(&root));
        }
        Ok(InitializeResult {
            server_info: Some(ServerInfo {
                name: SOURCE.to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::FULL)),
                code_action_provider: Some(CodeActionProviderCapability::Simple(true)),
                ..Default::default()
            },
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "checkfix LSP server initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        self.documents
            .lock()
            .await
            .insert(uri.clone(), params.text_document.text);
        self.publish(uri).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        // full sync: the last change holds the whole text
        if let Some(change) = params.content_changes.into_iter().last() {
            self.documents.lock().await.insert(uri.clone(), change.text);
        }
        self.publish(uri).await;
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        self.publish(params.text_document.uri).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.documents.lock().await.remove(&uri);
        self.client.publish_diagnostics(uri, Vec::new(), None).await;
    }

    async fn code_action(&self, params: CodeActionParams) -> Result<Option<CodeActionResponse>> {
        let uri = &params.text_document.uri;
        let Some((text, issues)) = self.issues_for(uri).await else {
            return Ok(None);
        };
        let index = LineIndex::new(&text);

        let mut actions = Vec::new();
        for issue in &issues {
            let Some(Fix::TextPatch(patch)) = &issue.fix else {
                continue;
            };
            let diagnostic = diagnostic(&text, issue);
            if diagnostic.range.end < params.range.start || params.range.end < diagnostic.range.start {
                continue;
            }

            let edits: Vec<TextEdit> = patch
                .edits
                .iter()
                .map(|edit| TextEdit {
                    range: range_of(&text, &index, edit.range.start, edit.range.end),
                    new_text: edit.replacement.clone(),
                })
                .collect();
            let action = CodeAction {
                title: patch.description.clone(),
                kind: Some(CodeActionKind::QUICKFIX),
                diagnostics: Some(vec![diagnostic]),
                edit: Some(WorkspaceEdit {
                    changes: Some(HashMap::from([(uri.clone(), edits)])),
                    document_changes: None,
                    change_annotations: None,
                }),
                command: None,
                is_preferred: Some(true),
                disabled: None,
                data: None,
            };
            actions.push(CodeActionOrCommand::CodeAction(action));
        }

        Ok(Some(actions))
    }
}

#[tokio::main]
async fn main() {
    // stdout carries the protocol
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("CHECKFIX_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(Backend::new);
    Server::new(stdin, stdout, socket).serve(service).await;
}
