//! # Argument Expression Tree
//!
//! `Args` is a lazy, ordered representation of a command's argument list. Some tokens
//! are only known once another command has run, so the tree separates building the
//! *shape* of a command (pure, no I/O) from filling in its values through a
//! [`Lookup`] at collection time.
//!
//! Invariants:
//! - Node order is preserved through every append/compose operation and through
//!   resolution, so arguments render in the order a human would type them.
//! - Appending an `Args` splices its nodes, giving value semantics to composition.
//! - [`Args::collect`] visits every node even after a failure and reports all of them.

use crate::core::provider::{Lookup, ValueProvider};
use std::{fmt, sync::Arc};
use thiserror::Error;

/// Errors produced while resolving a tree into literal tokens.
#[derive(Error, Debug)]
pub enum ArgsError {
    /// A deferred reference or provider failed; `after` is the previous resolved token.
    #[error("after {after}: {source}")]
    Unresolved {
        /// The last token successfully produced before the failing node.
        after: String,
        /// The failure reported by the lookup or the provider.
        #[source]
        source: anyhow::Error,
    },
    /// Two or more nodes failed in the same resolution pass.
    #[error("{}", format_multiple(.0))]
    Multiple(Vec<ArgsError>),
}

fn format_multiple(errors: &[ArgsError]) -> String {
    let mut out = format!("{} errors occurred:", errors.len());
    for err in errors {
        out.push_str("\n\t* ");
        out.push_str(&err.to_string());
    }
    out
}

/// A token whose value is obtained from a [`Lookup`] at collection time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredRef {
    /// The key passed to the lookup.
    pub key: String,
    /// Prepended to the looked-up value, e.g. `--name=`.
    pub prefix: Option<String>,
    /// When set, a successful lookup emits this literal instead of the looked-up value.
    pub if_resolved: Option<String>,
}

impl DeferredRef {
    /// A reference emitting the looked-up value as is.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            prefix: None,
            if_resolved: None,
        }
    }

    /// A reference emitting `prefix` followed by the looked-up value.
    pub fn with_prefix(prefix: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            ..Self::new(key)
        }
    }

    /// A reference gating `literal` on the lookup of `key` succeeding.
    /// The looked-up content itself is ignored.
    pub fn if_resolved(literal: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            if_resolved: Some(literal.into()),
            ..Self::new(key)
        }
    }

    fn token(&self, value: String) -> String {
        match (&self.if_resolved, &self.prefix) {
            (Some(literal), _) => literal.clone(),
            (None, Some(prefix)) => format!("{prefix}{value}"),
            (None, None) => value,
        }
    }

    fn placeholder(&self) -> String {
        match (&self.if_resolved, &self.prefix) {
            (Some(literal), _) => format!("$(if get {} then {})", self.key, literal),
            (None, Some(prefix)) => format!("{}$(get {})", prefix, self.key),
            (None, None) => format!("$(get {})", self.key),
        }
    }
}

/// A single node of an argument tree.
#[derive(Debug, Clone)]
pub enum Arg {
    /// A fixed token.
    Literal(String),
    /// A token resolved at collection time.
    Deferred(DeferredRef),
    /// A value resolving itself.
    Provider(Arc<dyn ValueProvider>),
    /// A nested tree, inlined in place.
    Tree(Args),
    /// A raw batch of literal tokens, spliced in place.
    List(Vec<String>),
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Literal(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Literal(s)
    }
}

impl From<&String> for Arg {
    fn from(s: &String) -> Self {
        Arg::Literal(s.clone())
    }
}

impl From<Vec<String>> for Arg {
    fn from(list: Vec<String>) -> Self {
        Arg::List(list)
    }
}

impl From<&[String]> for Arg {
    fn from(list: &[String]) -> Self {
        Arg::List(list.to_vec())
    }
}

impl From<DeferredRef> for Arg {
    fn from(deferred: DeferredRef) -> Self {
        Arg::Deferred(deferred)
    }
}

impl From<Args> for Arg {
    fn from(args: Args) -> Self {
        Arg::Tree(args)
    }
}

impl From<&Args> for Arg {
    fn from(args: &Args) -> Self {
        Arg::Tree(args.clone())
    }
}

/// A leaf reached by [`Args::walk`]; container nodes never surface here.
enum Leaf<'a> {
    Literal(&'a str),
    Deferred(&'a DeferredRef),
    Provider(&'a dyn ValueProvider),
}

/// An ordered, append-only argument tree.
///
/// The empty tree doubles as the "absent" tree: collecting it yields nothing.
#[derive(Debug, Clone, Default)]
pub struct Args {
    nodes: Vec<Arg>,
}

impl Args {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tree from anything convertible into nodes, in order.
    pub fn of<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Arg>,
    {
        let mut args = Self::new();
        for item in items {
            args.append(item);
        }
        args
    }

    /// Number of top-level nodes, with appended trees already spliced.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if nothing was appended.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Appends a node. Appending an `Args` splices its nodes instead of nesting it.
    pub fn append(&mut self, item: impl Into<Arg>) -> &mut Self {
        match item.into() {
            Arg::Tree(tree) => self.nodes.extend(tree.nodes),
            node => self.nodes.push(node),
        }
        self
    }

    /// Builder form of [`Args::append`].
    pub fn with(mut self, item: impl Into<Arg>) -> Self {
        self.append(item);
        self
    }

    /// Appends a tree as a single nested node, keeping its boundary.
    pub fn nest(&mut self, tree: Args) -> &mut Self {
        self.nodes.push(Arg::Tree(tree));
        self
    }

    /// Appends each string as a literal.
    pub fn append_strings<I, S>(&mut self, items: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.nodes
            .extend(items.into_iter().map(|s| Arg::Literal(s.into())));
        self
    }

    /// Appends a token resolved from `key` at collection time.
    pub fn append_deferred(&mut self, key: impl Into<String>) -> &mut Self {
        self.append(DeferredRef::new(key))
    }

    /// Appends `prefix` glued to the value resolved from `key`.
    pub fn append_deferred_with_prefix(
        &mut self,
        prefix: impl Into<String>,
        key: impl Into<String>,
    ) -> &mut Self {
        self.append(DeferredRef::with_prefix(prefix, key))
    }

    /// Appends `literal` only if `key` resolves successfully.
    pub fn append_deferred_if_resolved(
        &mut self,
        literal: impl Into<String>,
        key: impl Into<String>,
    ) -> &mut Self {
        self.append(DeferredRef::if_resolved(literal, key))
    }

    /// Splices a copy of `other`'s nodes onto the end of this tree.
    pub fn copy_from(&mut self, other: &Args) -> &mut Self {
        self.nodes.extend(other.nodes.iter().cloned());
        self
    }

    fn walk<'a>(&'a self, f: &mut impl FnMut(Leaf<'a>)) {
        for node in &self.nodes {
            match node {
                Arg::Literal(s) => f(Leaf::Literal(s)),
                Arg::Deferred(d) => f(Leaf::Deferred(d)),
                Arg::Provider(p) => f(Leaf::Provider(p.as_ref())),
                Arg::Tree(tree) => tree.walk(f),
                Arg::List(list) => list.iter().for_each(|s| f(Leaf::Literal(s))),
            }
        }
    }

    /// Single-pass, in-order traversal. Nested trees and literal batches are unfolded,
    /// so the callbacks only ever see literals, deferred references and providers.
    pub fn visit<L, D, P>(&self, mut on_literal: L, mut on_deferred: D, mut on_provider: P)
    where
        L: FnMut(&str),
        D: FnMut(&DeferredRef),
        P: FnMut(&dyn ValueProvider),
    {
        self.walk(&mut |leaf| match leaf {
            Leaf::Literal(s) => on_literal(s),
            Leaf::Deferred(d) => on_deferred(d),
            Leaf::Provider(p) => on_provider(p),
        });
    }

    /// Resolves every node to a literal token, in tree order.
    ///
    /// Every node is attempted even after a failure. A single failure is returned as
    /// is, several are combined into [`ArgsError::Multiple`].
    pub fn collect(&self, lookup: &Lookup<'_>) -> Result<Vec<String>, ArgsError> {
        let mut tokens: Vec<String> = Vec::with_capacity(self.nodes.len());
        let mut errors = Vec::new();
        let mut prev = String::new();

        self.walk(&mut |leaf| {
            let resolved = match leaf {
                Leaf::Literal(s) => Ok(s.to_string()),
                Leaf::Deferred(d) => lookup(&d.key).map(|value| d.token(value)),
                Leaf::Provider(p) => p.resolve(lookup),
            };
            match resolved {
                Ok(token) => {
                    prev.clone_from(&token);
                    tokens.push(token);
                }
                Err(source) => errors.push(ArgsError::Unresolved {
                    after: prev.clone(),
                    source,
                }),
            }
        });

        match errors.len() {
            0 => Ok(tokens),
            1 => Err(errors.remove(0)),
            _ => Err(ArgsError::Multiple(errors)),
        }
    }

    /// Same as [`Args::collect`] but aborts on error. Only for trees known to resolve,
    /// such as literal-only trees in tests and diagnostics.
    #[allow(clippy::panic)]
    pub fn must_collect(&self, lookup: &Lookup<'_>) -> Vec<String> {
        match self.collect(lookup) {
            Ok(tokens) => tokens,
            Err(e) => panic!("unable to collect arguments `{self}`: {e}"),
        }
    }

    /// Rendered tokens, deferred references shown as placeholders.
    pub fn render_tokens(&self) -> Vec<String> {
        let mut tokens = Vec::with_capacity(self.nodes.len());
        self.walk(&mut |leaf| {
            tokens.push(match leaf {
                Leaf::Literal(s) => s.to_string(),
                Leaf::Deferred(d) => d.placeholder(),
                Leaf::Provider(p) => p.describe(),
            })
        });
        tokens
    }

    /// A human-readable approximation of the arguments for logs and diffs.
    /// Nothing is resolved.
    pub fn render(&self) -> String {
        self.render_tokens().join(" ")
    }
}

/// Collects an optional tree; an absent tree yields no tokens and no error.
pub fn collect_optional(
    args: Option<&Args>,
    lookup: &Lookup<'_>,
) -> Result<Vec<String>, ArgsError> {
    match args {
        Some(args) => args.collect(lookup),
        None => Ok(Vec::new()),
    }
}

impl fmt::Display for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl<T: Into<Arg>> Extend<T> for Args {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.append(item);
        }
    }
}

impl<T: Into<Arg>> FromIterator<T> for Args {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::of(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::provider::BashScript;
    use anyhow::{Result, anyhow};
    use std::cell::RefCell;

    fn ok(key: &str) -> Result<String> {
        Ok(key.to_uppercase())
    }

    fn only_ok(key: &str) -> Result<String> {
        if key.starts_with("ok") {
            Ok(key.to_uppercase())
        } else {
            Err(anyhow!("unable to obtain value for key {key:?}"))
        }
    }

    #[test]
    fn test_collect_preserves_append_order_and_inlines_containers() {
        let mut nested = Args::new();
        nested.append("--b").append_deferred("b");

        let mut args = Args::new();
        args.append("--a")
            .append_deferred("a")
            .append(vec!["x".to_string(), "y".to_string()])
            .append(nested.clone())
            .nest(nested)
            .append(BashScript::new(Args::of(["echo", "z"])))
            .append("last");

        assert_eq!(
            args.collect(&ok).unwrap(),
            vec!["--a", "A", "x", "y", "--b", "B", "--b", "B", "echo z", "last"]
        );
    }

    #[test]
    fn test_appending_a_tree_splices_its_nodes() {
        let flags = Args::of(["--server", "example.com"]);
        let mut login = Args::new();
        login.append("login").append(flags.clone());
        assert_eq!(login.len(), 3);

        let mut create = Args::new();
        create.append("create").copy_from(&flags).copy_from(&flags);
        assert_eq!(create.len(), 5);
        // The source is unaffected by being copied.
        assert_eq!(flags.len(), 2);
    }

    #[test]
    fn test_absent_tree_collects_to_nothing() {
        assert_eq!(collect_optional(None, &only_ok).unwrap(), Vec::<String>::new());
        assert!(Args::default().collect(&only_ok).unwrap().is_empty());

        let mut fresh = Args::default();
        fresh.append("a");
        assert_eq!(
            collect_optional(Some(&fresh), &only_ok).unwrap(),
            Args::new().with("a").collect(&only_ok).unwrap()
        );
    }

    #[test]
    fn test_single_failure_is_returned_with_previous_token() {
        let mut args = Args::new();
        args.append("--a").append_deferred("ng");
        let err = args.collect(&only_ok).unwrap_err();
        assert!(matches!(err, ArgsError::Unresolved { ref after, .. } if after == "--a"));
        assert_eq!(
            err.to_string(),
            "after --a: unable to obtain value for key \"ng\""
        );
    }

    #[test]
    fn test_previous_token_is_the_resolved_value() {
        let mut args = Args::new();
        args.append_deferred("ok1").append_deferred("ng");
        let err = args.collect(&only_ok).unwrap_err();
        assert!(err.to_string().starts_with("after OK1: "));
    }

    #[test]
    fn test_multiple_failures_are_aggregated() {
        let mut args = Args::new();
        args.append("--a")
            .append_deferred("ng1")
            .append_deferred("ok")
            .append("--b")
            .append_deferred("ng2")
            .append_deferred("ng3");

        match args.collect(&only_ok).unwrap_err() {
            ArgsError::Multiple(errors) => {
                assert_eq!(errors.len(), 3);
                assert_eq!(
                    errors[0].to_string(),
                    "after --a: unable to obtain value for key \"ng1\""
                );
                assert!(errors[1].to_string().starts_with("after --b: "));
                assert!(errors[2].to_string().starts_with("after --b: "));
            }
            other => panic!("expected an aggregate error, got {other:?}"),
        }
    }

    #[test]
    fn test_lookup_is_called_for_every_deferred_node() {
        let calls = RefCell::new(Vec::new());
        let lookup = |key: &str| -> Result<String> {
            calls.borrow_mut().push(key.to_string());
            Err(anyhow!("nope"))
        };
        let mut args = Args::new();
        args.append_deferred("a")
            .append_deferred("b")
            .append_deferred("a");
        assert!(args.collect(&lookup).is_err());
        assert_eq!(*calls.borrow(), vec!["a", "b", "a"]);
    }

    #[test]
    fn test_if_resolved_emits_the_literal_not_the_value() {
        let mut args = Args::new();
        args.append("login")
            .append_deferred_if_resolved("--insecure", "ok-insecure");
        assert_eq!(
            args.collect(&|_: &str| Ok("anything at all".to_string()))
                .unwrap(),
            vec!["login", "--insecure"]
        );
        assert_eq!(
            args.collect(&|_: &str| Ok(String::new())).unwrap(),
            vec!["login", "--insecure"]
        );
    }

    #[test]
    fn test_if_resolved_failure_contributes_nothing_and_errors() {
        let mut args = Args::new();
        args.append("login")
            .append_deferred_if_resolved("--insecure", "ng");
        let err = args.collect(&only_ok).unwrap_err();
        assert!(err.to_string().starts_with("after login: "));
    }

    #[test]
    fn test_prefixed_deferred_reference() {
        let mut args = Args::new();
        args.append_deferred_with_prefix("--name=", "ok");
        assert_eq!(args.collect(&only_ok).unwrap(), vec!["--name=OK"]);
    }

    #[test]
    fn test_visit_unfolds_containers() {
        let mut args = Args::new();
        args.append("a")
            .nest(Args::new().with("b").with(DeferredRef::new("k")))
            .append(vec!["c".to_string()])
            .append(BashScript::new(Args::of(["d"])));

        let mut literals = Vec::new();
        let mut deferred = Vec::new();
        let mut providers = 0;
        args.visit(
            |s| literals.push(s.to_string()),
            |d| deferred.push(d.key.clone()),
            |_| providers += 1,
        );
        assert_eq!(literals, vec!["a", "b", "c"]);
        assert_eq!(deferred, vec!["k"]);
        assert_eq!(providers, 1);
    }

    #[test]
    fn test_render_uses_placeholders() {
        let mut args = Args::new();
        args.append("argocd")
            .append("--server")
            .append_deferred("server")
            .append_deferred_with_prefix("--path=", "path")
            .append_deferred_if_resolved("--insecure", "insecure");
        assert_eq!(
            args.to_string(),
            "argocd --server $(get server) --path=$(get path) $(if get insecure then --insecure)"
        );
    }

    #[test]
    fn test_must_collect_literal_tree() {
        let args: Args = ["a", "b"].into_iter().collect();
        assert_eq!(args.must_collect(&only_ok), vec!["a", "b"]);
    }

    #[test]
    #[should_panic(expected = "unable to collect arguments")]
    fn test_must_collect_panics_on_failure() {
        Args::new().with(DeferredRef::new("ng")).must_collect(&only_ok);
    }
}
