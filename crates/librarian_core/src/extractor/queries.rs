//! High-level LSP query wrappers used by [`super::rust_analyzer`].

use crate::error::Result;
use crate::extractor::client::LspClient;
use crate::extractor::protocol::{
    CallHierarchyIncomingCall, CallHierarchyItem, CallHierarchyOutgoingCall, DocumentSymbol,
    TextDocumentIdentifier, TextDocumentItem, TextDocumentPositionParams, Url,
};

/// High-level LSP query operations over a borrowed client.
pub struct LspQueries<'a> {
    client: &'a mut LspClient,
}

impl<'a> LspQueries<'a> {
    pub fn new(client: &'a mut LspClient) -> Self {
        Self { client }
    }

    pub fn did_open(&mut self, uri: &Url, content: &str, version: i32) -> Result<()> {
        let params = serde_json::json!({
            "textDocument": TextDocumentItem {
                uri: uri.clone(),
                language_id: "rust".to_string(),
                version,
                text: content.to_string(),
            }
        });
        self.client.notify("textDocument/didOpen", params)
    }

    pub fn did_close(&mut self, uri: &Url) -> Result<()> {
        let params = serde_json::json!({
            "textDocument": TextDocumentIdentifier { uri: uri.clone() }
        });
        self.client.notify("textDocument/didClose", params)
    }

    /// Returns the hierarchical file outline.
    pub fn document_symbols(&mut self, uri: &Url) -> Result<Vec<DocumentSymbol>> {
        let params = serde_json::json!({
            "textDocument": TextDocumentIdentifier { uri: uri.clone() }
        });
        let response: Option<Vec<DocumentSymbol>> =
            self.client.request("textDocument/documentSymbol", params)?;
        Ok(response.unwrap_or_default())
    }

    /// Prepares call hierarchy at a position, a prerequisite for the two
    /// incoming/outgoing queries below.
    pub fn prepare_call_hierarchy(
        &mut self,
        uri: &Url,
        position: crate::extractor::protocol::Position,
    ) -> Result<Vec<CallHierarchyItem>> {
        let params = TextDocumentPositionParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
            position,
        };
        let response: Option<Vec<CallHierarchyItem>> =
            self.client.request("textDocument/prepareCallHierarchy", params)?;
        Ok(response.unwrap_or_default())
    }

    /// What calls this function.
    pub fn call_hierarchy_incoming(
        &mut self,
        item: &CallHierarchyItem,
    ) -> Result<Vec<CallHierarchyIncomingCall>> {
        let params = serde_json::json!({ "item": item });
        let response: Option<Vec<CallHierarchyIncomingCall>> =
            self.client.request("callHierarchy/incomingCalls", params)?;
        Ok(response.unwrap_or_default())
    }

    /// What this function calls.
    pub fn call_hierarchy_outgoing(
        &mut self,
        item: &CallHierarchyItem,
    ) -> Result<Vec<CallHierarchyOutgoingCall>> {
        let params = serde_json::json!({ "item": item });
        let response: Option<Vec<CallHierarchyOutgoingCall>> =
            self.client.request("callHierarchy/outgoingCalls", params)?;
        Ok(response.unwrap_or_default())
    }
}
