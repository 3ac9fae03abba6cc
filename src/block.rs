//! Structural block extraction.
//!
//! The only concrete [`BlockParser`] shipped is [`SynBlockParser`], which
//! understands Rust source via `syn`. The trait exists so the rest of the
//! engine (fingerprinting, caching, the store) never depends on `syn`
//! directly — a host embedding a different source language implements the
//! trait and nothing else changes.

use std::collections::HashMap;

use proc_macro2::LineColumn;
use syn::spanned::Spanned;
use syn::visit::{self, Visit};

/// A single structural unit within a source file: a function, method, or
/// the implicit whole-module block.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub name: String,
    pub first_line: usize,
    pub last_line: usize,
}

/// Extracts [`Block`]s from source text.
pub trait BlockParser: Send + Sync {
    fn parse(&self, source: &str) -> Vec<Block>;
}

/// Parses Rust source with `syn`. Falls back to a single whole-module block
/// when the source doesn't parse — a parse failure is never fatal, just
/// coarser-grained tracking for that file.
#[derive(Debug, Default, Clone, Copy)]
pub struct SynBlockParser;

impl BlockParser for SynBlockParser {
    fn parse(&self, source: &str) -> Vec<Block> {
        parse_blocks(source)
    }
}

/// Convenience free function equivalent to `SynBlockParser.parse(source)`.
pub fn parse_module(source: &str) -> Vec<Block> {
    parse_blocks(source)
}

fn line_of(lc: LineColumn) -> usize {
    lc.line
}

fn parse_blocks(source: &str) -> Vec<Block> {
    let module_block = Block {
        name: "<module>".to_string(),
        first_line: 1,
        last_line: source.lines().count().max(1),
    };

    let file = match syn::parse_file(source) {
        Ok(file) => file,
        Err(_) => return vec![module_block],
    };

    let mut visitor = BlockVisitor::default();
    visitor.visit_file(&file);

    let mut blocks = vec![module_block];
    blocks.extend(visitor.blocks);
    blocks
}

#[derive(Default)]
struct BlockVisitor {
    scope: Vec<String>,
    seen: HashMap<String, usize>,
    blocks: Vec<Block>,
}

impl BlockVisitor {
    fn qualified_name(&self, base: &str) -> String {
        if self.scope.is_empty() {
            base.to_string()
        } else {
            format!("{}.{}", self.scope.join("."), base)
        }
    }

    /// Records a block, disambiguating repeated names within the same
    /// scope with a `#2`, `#3`, ... suffix.
    fn record(&mut self, base_name: &str, first_line: usize, last_line: usize) {
        let qualified = self.qualified_name(base_name);
        let count = self.seen.entry(qualified.clone()).or_insert(0);
        *count += 1;
        let name = if *count == 1 {
            qualified
        } else {
            format!("{qualified}#{count}")
        };
        self.blocks.push(Block {
            name,
            first_line,
            last_line,
        });
    }
}

impl<'ast> Visit<'ast> for BlockVisitor {
    fn visit_item_fn(&mut self, node: &'ast syn::ItemFn) {
        let first_line = line_of(node.sig.fn_token.span().start());
        let last_line = line_of(node.block.brace_token.span.close().start());
        let name = node.sig.ident.to_string();
        self.record(&name, first_line, last_line);

        self.scope.push(name);
        visit::visit_item_fn(self, node);
        self.scope.pop();
    }

    fn visit_item_impl(&mut self, node: &'ast syn::ItemImpl) {
        let type_name = impl_type_name(&node.self_ty);
        self.scope.push(type_name);
        visit::visit_item_impl(self, node);
        self.scope.pop();
    }

    fn visit_impl_item_fn(&mut self, node: &'ast syn::ImplItemFn) {
        let first_line = line_of(node.sig.fn_token.span().start());
        let last_line = line_of(node.block.brace_token.span.close().start());
        let name = node.sig.ident.to_string();
        self.record(&name, first_line, last_line);

        self.scope.push(name);
        visit::visit_impl_item_fn(self, node);
        self.scope.pop();
    }

    fn visit_item_mod(&mut self, node: &'ast syn::ItemMod) {
        let name = node.ident.to_string();
        self.scope.push(name);
        visit::visit_item_mod(self, node);
        self.scope.pop();
    }
}

fn impl_type_name(ty: &syn::Type) -> String {
    match ty {
        syn::Type::Path(p) => p
            .path
            .segments
            .last()
            .map(|s| s.ident.to_string())
            .unwrap_or_else(|| "<impl>".to_string()),
        _ => "<impl>".to_string(),
    }
}
