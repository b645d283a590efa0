//! Heuristic fact extraction: a regex-free, line-oriented scanner used
//! when rust-analyzer is unavailable. Recognizes top-level declarations
//! and `use` statements; it cannot resolve call edges, since that needs
//! a real parse.

use crate::error::Result;
use crate::extractor::{ExtractedFacts, FactExtractor};
use crate::types::{EdgeKind, GraphEdge, Span, Symbol, SymbolKind};

/// Line-oriented fallback extractor. Produces coarser symbols than
/// rust-analyzer (no nested/qualified names, byte-approximate spans) but
/// keeps the workspace indexable when the LSP backend is unavailable.
#[derive(Default)]
pub struct HeuristicExtractor;

impl HeuristicExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl FactExtractor for HeuristicExtractor {
    fn extract(&mut self, path: &str, content: &str) -> Result<ExtractedFacts> {
        let mut symbols = Vec::new();
        let mut edges = Vec::new();
        let mut byte_offset = 0u32;

        for (line_no, line) in content.lines().enumerate() {
            let trimmed = line.trim_start();
            let indent = (line.len() - trimmed.len()) as u32;
            let line_no = line_no as u32;

            if let Some((kind, name)) = parse_declaration(trimmed) {
                let signature_shape = trimmed.to_string();
                let id = Symbol::compute_id(path, &name, &signature_shape);
                symbols.push(Symbol {
                    id,
                    path: path.to_string(),
                    canonical_name: name,
                    kind,
                    signature_shape,
                    span: Span {
                        start_byte: byte_offset,
                        end_byte: byte_offset + line.len() as u32,
                        start_line: line_no,
                        start_col: indent,
                        end_line: line_no,
                        end_col: line.len() as u32,
                    },
                    last_seen_version: 0,
                });
            } else if let Some(imported) = parse_use(trimmed) {
                let from_id = Symbol::compute_id(path, "crate::module", "mod");
                let to_id = Symbol::compute_id(&imported, "crate::module", "mod");
                edges.push(GraphEdge {
                    from: from_id,
                    to: to_id,
                    kind: EdgeKind::Imports,
                    evidence_ids: Vec::new(),
                    last_seen_version: 0,
                });
            }

            byte_offset += line.len() as u32 + 1;
        }

        Ok(ExtractedFacts { symbols, edges, unresolved_calls: Vec::new() })
    }
}

fn parse_declaration(line: &str) -> Option<(SymbolKind, String)> {
    const PREFIXES: &[(&str, SymbolKind)] = &[
        ("pub fn ", SymbolKind::Function),
        ("fn ", SymbolKind::Function),
        ("pub struct ", SymbolKind::Type),
        ("struct ", SymbolKind::Type),
        ("pub enum ", SymbolKind::Type),
        ("enum ", SymbolKind::Type),
        ("pub trait ", SymbolKind::Trait),
        ("trait ", SymbolKind::Trait),
        ("impl ", SymbolKind::Impl),
        ("pub mod ", SymbolKind::Module),
        ("mod ", SymbolKind::Module),
        ("pub const ", SymbolKind::Const),
        ("const ", SymbolKind::Const),
        ("pub static ", SymbolKind::Const),
        ("static ", SymbolKind::Const),
    ];

    for (prefix, kind) in PREFIXES {
        if let Some(rest) = line.strip_prefix(prefix) {
            let name = extract_identifier(rest)?;
            return Some((*kind, name));
        }
    }
    None
}

fn extract_identifier(s: &str) -> Option<String> {
    let end = s
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    Some(s[..end].to_string())
}

fn parse_use(line: &str) -> Option<String> {
    let rest = line.strip_prefix("use ")?;
    let rest = rest.trim_end_matches(';').trim();
    let path = rest.split("::").next()?.trim();
    if path.is_empty() {
        None
    } else {
        Some(path.to_string())
    }
}
