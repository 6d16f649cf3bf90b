//! # Value Providers
//!
//! A value provider is a leaf of an argument tree that knows how to produce its own
//! final token once the captured outputs of earlier steps are available. The tree
//! delegates to [`ValueProvider::resolve`] at collection time and to
//! [`ValueProvider::describe`] when rendering for diagnostics.

use crate::core::args::{Arg, Args};
use anyhow::Result;
use std::{fmt, sync::Arc};

/// The "fetch captured output by key" callback consumed by [`Args::collect`].
///
/// It may be called once per occurrence of a key, including occurrences whose
/// results end up discarded because another node failed.
pub type Lookup<'a> = dyn Fn(&str) -> Result<String> + 'a;

/// A value able to produce its own argument token given a [`Lookup`].
pub trait ValueProvider: fmt::Debug + Send + Sync {
    /// Produces the final token.
    fn resolve(&self, lookup: &Lookup<'_>) -> Result<String>;

    /// A human-readable approximation of the token, used by [`Args::render`].
    fn describe(&self) -> String {
        format!("{self:?}")
    }
}

impl Arg {
    /// Wraps any provider into a tree node.
    pub fn provider(provider: impl ValueProvider + 'static) -> Self {
        Arg::Provider(Arc::new(provider))
    }
}

impl From<Arc<dyn ValueProvider>> for Arg {
    fn from(provider: Arc<dyn ValueProvider>) -> Self {
        Arg::Provider(provider)
    }
}

/// Concatenates the tokens of a tree without any separator.
///
/// Useful to glue a deferred token onto a fixed prefix or suffix, e.g. `dir/*`.
#[derive(Debug, Clone, Default)]
pub struct Join {
    /// The tree whose tokens are glued together.
    pub args: Args,
}

impl Join {
    /// Creates a new `Join` over `args`.
    pub fn new(args: Args) -> Self {
        Self { args }
    }
}

impl ValueProvider for Join {
    fn resolve(&self, lookup: &Lookup<'_>) -> Result<String> {
        Ok(self.args.collect(lookup)?.concat())
    }

    fn describe(&self) -> String {
        self.args.render_tokens().concat()
    }
}

impl From<Join> for Arg {
    fn from(join: Join) -> Self {
        Arg::provider(join)
    }
}

/// Collapses a tree into a single space-separated script, the operand of `bash -c`.
#[derive(Debug, Clone, Default)]
pub struct BashScript {
    /// The script tokens.
    pub script: Args,
}

impl BashScript {
    /// Creates a new `BashScript` from `script`.
    pub fn new(script: Args) -> Self {
        Self { script }
    }
}

impl ValueProvider for BashScript {
    fn resolve(&self, lookup: &Lookup<'_>) -> Result<String> {
        Ok(self.script.collect(lookup)?.join(" "))
    }

    fn describe(&self) -> String {
        format!("'{}'", self.script.render())
    }
}

impl From<BashScript> for Arg {
    fn from(script: BashScript) -> Self {
        Arg::provider(script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn upper(key: &str) -> Result<String> {
        Ok(key.to_uppercase())
    }

    #[test]
    fn test_join_concatenates_without_separator() {
        let mut inner = Args::new();
        inner.append("dir").append("/").append_deferred("name");
        let join = Join::new(inner);
        assert_eq!(join.resolve(&upper).unwrap(), "dir/NAME");
        assert_eq!(join.describe(), "dir/$(get name)");
    }

    #[test]
    fn test_bash_script_joins_with_spaces() {
        let script = BashScript::new(Args::of(["cd", "repo", ";", "git", "add", "."]));
        assert_eq!(script.resolve(&upper).unwrap(), "cd repo ; git add .");
        assert_eq!(script.describe(), "'cd repo ; git add .'");
    }

    #[test]
    fn test_bash_script_propagates_lookup_failures() {
        let mut inner = Args::new();
        inner.append("git").append("clone").append_deferred("repo");
        let script = BashScript::new(inner);
        let err = script
            .resolve(&|key: &str| Err(anyhow!("missing {key}")))
            .unwrap_err();
        assert_eq!(err.to_string(), "after clone: missing repo");
    }

    #[test]
    fn test_provider_nodes_resolve_inside_trees() {
        let mut args = Args::new();
        args.append("-vxc")
            .append(BashScript::new(Args::of(["echo", "hi"])));
        assert_eq!(args.collect(&upper).unwrap(), vec!["-vxc", "echo hi"]);
    }
}
