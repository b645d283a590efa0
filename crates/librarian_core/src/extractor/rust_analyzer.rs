//! Fact extraction backed by rust-analyzer over the Language Server
//! Protocol: document symbols become [`Symbol`] records, and outgoing
//! call-hierarchy edges become [`GraphEdge`]s of kind [`EdgeKind::Calls`].

use crate::error::Result;
use crate::extractor::client::LspClient;
use crate::extractor::protocol::{
    CallHierarchyClientCapabilities, ClientCapabilities, DocumentSymbol,
    DocumentSymbolClientCapabilities, InitializeParams, TextDocumentClientCapabilities, Url,
};
use crate::extractor::queries::LspQueries;
use crate::extractor::{ExtractedFacts, FactExtractor, UnresolvedCall};
use crate::types::{Span, Symbol, SymbolKind};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, warn};

/// Manages a running rust-analyzer process and translates its responses
/// into the Librarian's symbol/edge data model.
pub struct RustAnalyzerExtractor {
    client: LspClient,
    project_root: PathBuf,
    file_version: i32,
    indexing_complete: bool,
}

impl RustAnalyzerExtractor {
    /// Returns true if `rust-analyzer` is on `PATH`.
    pub fn is_available() -> bool {
        Command::new("rust-analyzer")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Spawns rust-analyzer and performs the LSP initialize handshake.
    pub fn start(project_root: &Path) -> Result<Self> {
        let mut client = LspClient::spawn(project_root)?;

        #[allow(deprecated)]
        let init_params = InitializeParams {
            process_id: Some(std::process::id()),
            root_uri: Some(path_to_uri(project_root)),
            root_path: None,
            capabilities: ClientCapabilities {
                text_document: Some(TextDocumentClientCapabilities {
                    call_hierarchy: Some(CallHierarchyClientCapabilities {
                        dynamic_registration: Some(false),
                    }),
                    document_symbol: Some(DocumentSymbolClientCapabilities {
                        hierarchical_document_symbol_support: Some(true),
                        dynamic_registration: None,
                        symbol_kind: None,
                        tag_support: None,
                    }),
                    ..Default::default()
                }),
                workspace: None,
                window: None,
                general: None,
                experimental: None,
            },
            client_info: None,
            locale: None,
            initialization_options: None,
            trace: None,
            workspace_folders: None,
        };

        client.initialize(init_params)?;
        client.initialized()?;

        Ok(Self {
            client,
            project_root: project_root.to_path_buf(),
            file_version: 1,
            indexing_complete: false,
        })
    }

    fn wait_for_indexing(&mut self) {
        if self.indexing_complete {
            return;
        }
        match self.client.wait_for_notification("textDocument/publishDiagnostics", 10_000) {
            Ok(_) => self.indexing_complete = true,
            Err(e) => warn!("timed out waiting for rust-analyzer diagnostics: {}", e),
        }
    }
}

impl FactExtractor for RustAnalyzerExtractor {
    fn extract(&mut self, path: &str, content: &str) -> Result<ExtractedFacts> {
        let abs_path = self.project_root.join(path);
        let uri = path_to_uri(&abs_path);

        let version = self.file_version;
        self.file_version += 1;

        {
            let mut queries = LspQueries::new(&mut self.client);
            queries.did_open(&uri, content, version)?;
        }
        std::thread::sleep(Duration::from_millis(50));
        self.wait_for_indexing();

        let document_symbols = {
            let mut queries = LspQueries::new(&mut self.client);
            queries.document_symbols(&uri)?
        };

        let mut symbols = Vec::new();
        flatten_symbols(path, &document_symbols, None, &mut symbols);

        let mut unresolved_calls = Vec::new();
        for symbol in &symbols {
            if symbol.kind != SymbolKind::Function {
                continue;
            }
            let position = crate::extractor::protocol::Position {
                line: symbol.span.start_line,
                character: symbol.span.start_col,
            };

            let items = {
                let mut queries = LspQueries::new(&mut self.client);
                queries.prepare_call_hierarchy(&uri, position)
            };
            let Ok(items) = items else { continue };

            for item in items {
                let outgoing = {
                    let mut queries = LspQueries::new(&mut self.client);
                    queries.call_hierarchy_outgoing(&item)
                };
                let Ok(outgoing) = outgoing else { continue };

                for call in outgoing {
                    let callee_path = call
                        .to
                        .uri
                        .to_file_path()
                        .ok()
                        .and_then(|p| p.strip_prefix(&self.project_root).ok().map(|p| p.to_path_buf()))
                        .map(|p| p.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.to_string());

                    unresolved_calls.push(UnresolvedCall {
                        from: symbol.id,
                        callee_path,
                        callee_name: call.to.name.clone(),
                    });
                }
            }
        }

        {
            let mut queries = LspQueries::new(&mut self.client);
            queries.did_close(&uri)?;
        }

        debug!(
            path,
            symbols = symbols.len(),
            unresolved_calls = unresolved_calls.len(),
            "rust-analyzer extraction complete"
        );

        Ok(ExtractedFacts { symbols, edges: Vec::new(), unresolved_calls })
    }
}

fn flatten_symbols(
    path: &str,
    document_symbols: &[DocumentSymbol],
    parent_name: Option<&str>,
    out: &mut Vec<Symbol>,
) {
    for doc_symbol in document_symbols {
        let canonical_name = match parent_name {
            Some(parent) => format!("{}::{}", parent, doc_symbol.name),
            None => doc_symbol.name.clone(),
        };

        if let Some(kind) = map_symbol_kind(doc_symbol.kind) {
            let range = doc_symbol.selection_range;
            let span = Span {
                start_byte: 0,
                end_byte: 0,
                start_line: range.start.line,
                start_col: range.start.character,
                end_line: range.end.line,
                end_col: range.end.character,
            };

            let signature_shape = doc_symbol
                .detail
                .clone()
                .unwrap_or_else(|| format!("{:?}", doc_symbol.kind));

            let id = Symbol::compute_id(path, &canonical_name, &signature_shape);

            out.push(Symbol {
                id,
                path: path.to_string(),
                canonical_name: canonical_name.clone(),
                kind,
                signature_shape,
                span,
                last_seen_version: 0,
            });
        }

        if let Some(children) = &doc_symbol.children {
            flatten_symbols(path, children, Some(&canonical_name), out);
        }
    }
}

fn map_symbol_kind(kind: lsp_types::SymbolKind) -> Option<SymbolKind> {
    use lsp_types::SymbolKind as Lsk;
    match kind {
        Lsk::FUNCTION | Lsk::METHOD | Lsk::CONSTRUCTOR => Some(SymbolKind::Function),
        Lsk::STRUCT | Lsk::ENUM | Lsk::CLASS => Some(SymbolKind::Type),
        Lsk::INTERFACE => Some(SymbolKind::Trait),
        Lsk::MODULE | Lsk::NAMESPACE => Some(SymbolKind::Module),
        Lsk::CONSTANT => Some(SymbolKind::Const),
        _ => None,
    }
}

fn path_to_uri(path: &Path) -> Url {
    Url::from_file_path(path).unwrap_or_else(|_| Url::parse("file:///invalid").unwrap())
}
