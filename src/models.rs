// src/models.rs

//! The declarative deployment description and its flag mappings.
//!
//! Every type deserializes from `kargo.toml` and registers a field table through
//! [`Schema`], which the compiler walks to produce tool arguments.

use crate::{
    constants::{FIELD_TAG_ARGOCD, FIELD_TAG_HELM, FIELD_TAG_KARGO, FIELD_TAG_KUSTOMIZE},
    core::{
        args::{Args, DeferredRef},
        provider::{Lookup, ValueProvider},
        schema::{Field, Schema, SchemaError, Value},
    },
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Excluded for every target.
const EXCLUDED: &[(&str, &str)] = &[(FIELD_TAG_KARGO, "")];

/// Excluded from generated `argocd app` flags; the generator maps these by hand.
const ARGOCD_MANUAL: &[(&str, &str)] = &[(FIELD_TAG_ARGOCD, "")];

// --- Top level ---

/// A deployment description.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    /// The application name. Defaults to the basename of the directory holding
    /// the description when loaded from a file.
    pub name: String,
    /// Path to the manifests, chart values or compose file.
    pub path: String,
    /// Environment variables handed to the Argo CD config management plugin.
    pub env: Vec<Env>,
    /// Deploy with `docker compose`.
    pub compose: Option<Compose>,
    /// Convert a compose file with kompose, then apply it.
    pub kompose: Option<Kompose>,
    /// Build and apply a kustomization.
    pub kustomize: Option<Kustomize>,
    /// Install a Helm chart.
    pub helm: Option<Helm>,
    /// Manage the deployment as an Argo CD application. Wraps the other backends.
    pub argocd: Option<ArgoCD>,
}

impl Schema for Config {
    fn describe(&self) -> Value<'_> {
        Value::Record(vec![
            Field::tagged("name", &[(FIELD_TAG_ARGOCD, ",arg")], &self.name),
            Field::tagged("path", &[(FIELD_TAG_ARGOCD, "")], &self.path),
            Field::tagged(
                "env",
                &[(FIELD_TAG_ARGOCD, "plugin-env")],
                Value::providers(&self.env),
            ),
            Field::tagged("compose", EXCLUDED, Value::optional(self.compose.as_ref())),
            Field::tagged("kompose", EXCLUDED, Value::optional(self.kompose.as_ref())),
            Field::tagged("kustomize", EXCLUDED, Value::optional(self.kustomize.as_ref())),
            Field::tagged("helm", EXCLUDED, Value::optional(self.helm.as_ref())),
            Field::tagged("argocd", EXCLUDED, Value::optional(self.argocd.as_ref())),
        ])
    }
}

// --- NAME=VALUE pairs ---

/// A `NAME=VALUE` pair whose value may come from a captured output.
fn pair_token(name: &str, value: &str, value_from: &str, lookup: &Lookup<'_>) -> Result<String> {
    if value_from.is_empty() {
        return Ok(format!("{name}={value}"));
    }
    Ok(format!("{name}={}", lookup(value_from)?))
}

fn pair_placeholder(name: &str, value: &str, value_from: &str) -> String {
    if value_from.is_empty() {
        return format!("{name}={value}");
    }
    Args::new()
        .with(DeferredRef::with_prefix(format!("{name}="), value_from))
        .render()
}

/// An environment variable for the config management plugin.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct Env {
    /// Variable name.
    pub name: String,
    /// Literal value.
    pub value: String,
    /// Output key to take the value from. Wins over `value` when set.
    pub value_from: String,
}

impl ValueProvider for Env {
    fn resolve(&self, lookup: &Lookup<'_>) -> Result<String> {
        pair_token(&self.name, &self.value, &self.value_from, lookup)
    }

    fn describe(&self) -> String {
        pair_placeholder(&self.name, &self.value, &self.value_from)
    }
}

/// A Helm value override.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct Set {
    /// Variable name.
    pub name: String,
    /// Literal value.
    pub value: String,
    /// Output key to take the value from. Wins over `value` when set.
    pub value_from: String,
}

impl ValueProvider for Set {
    fn resolve(&self, lookup: &Lookup<'_>) -> Result<String> {
        pair_token(&self.name, &self.value, &self.value_from, lookup)
    }

    fn describe(&self) -> String {
        pair_placeholder(&self.name, &self.value, &self.value_from)
    }
}

// --- Backends ---

/// Deploys with `docker compose`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct Compose {
    /// Renders secrets with `vals` before handing the file to compose.
    pub enable_vals: bool,
}

impl Schema for Compose {
    fn describe(&self) -> Value<'_> {
        Value::Record(vec![Field::tagged("enable_vals", EXCLUDED, self.enable_vals)])
    }
}

/// Converts a compose file with `kompose` and applies it with `kubectl`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct Kompose {
    /// Renders secrets with `vals` before handing the file to kompose.
    pub enable_vals: bool,
}

impl Schema for Kompose {
    fn describe(&self) -> Value<'_> {
        Value::Record(vec![Field::tagged("enable_vals", EXCLUDED, self.enable_vals)])
    }
}

/// Sets images on a kustomization, then builds and applies it or opens a pull request.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct Kustomize {
    /// Images set with `kustomize edit set image`.
    pub images: KustomizeImages,
    /// Whether to apply directly or through a pull request.
    pub strategy: KustomizeStrategy,
    /// The repository holding the kustomization, for [`KustomizeStrategy::SetImageAndCreatePR`].
    pub git: KustomizeGit,
}

impl Schema for Kustomize {
    fn describe(&self) -> Value<'_> {
        Value::Record(vec![
            Field::new("images", Value::Nested(&self.images)),
            Field::tagged("strategy", EXCLUDED, self.strategy.to_string()),
            Field::tagged("git", EXCLUDED, Value::Nested(&self.git)),
        ])
    }
}

/// How kustomize changes reach the cluster.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KustomizeStrategy {
    /// `kustomize build` into a temporary file, then `kubectl apply` it.
    #[default]
    #[serde(rename = "buildAndKubectlApply")]
    BuildAndKubectlApply,
    /// Run `kustomize edit set image` in a clone of the repository and open a pull request.
    #[serde(rename = "setImageAndCreatePR")]
    SetImageAndCreatePR,
}

impl fmt::Display for KustomizeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BuildAndKubectlApply => "buildAndKubectlApply",
            Self::SetImageAndCreatePR => "setImageAndCreatePR",
        })
    }
}

/// Where a kustomization lives for the pull-request strategy.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct KustomizeGit {
    /// Repository holding the kustomization.
    pub repo: String,
    /// Base branch of the pull request. Defaults to `main`.
    pub branch: String,
    /// Directory of the kustomization within the repository.
    pub path: String,
}

impl Schema for KustomizeGit {
    fn describe(&self) -> Value<'_> {
        Value::Record(vec![
            Field::new("repo", &self.repo),
            Field::new("branch", &self.branch),
            Field::new("path", &self.path),
        ])
    }
}

/// The images of a kustomization.
///
/// Compiles to bare `name[=newName][:newTag]` operands for `kustomize edit set image`
/// and to a single comma-separated `--kustomize-image` flag for `argocd app create`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct KustomizeImages(pub Vec<KustomizeImage>);

impl KustomizeImages {
    /// Image operands in `name[=newName][:newTag]` form.
    pub fn operands(&self) -> Vec<String> {
        self.0.iter().map(KustomizeImage::operand).collect()
    }
}

impl Schema for KustomizeImages {
    fn describe(&self) -> Value<'_> {
        Value::nested_list(&self.0)
    }

    fn compile_self(&self, args: &Args, target: &str) -> Result<Option<Args>, SchemaError> {
        let operands = self.operands();
        let mut args = args.clone();
        match target {
            FIELD_TAG_KUSTOMIZE => {
                args.append_strings(operands);
            }
            FIELD_TAG_ARGOCD if !operands.is_empty() => {
                args.append("--kustomize-image").append(operands.join(","));
            }
            FIELD_TAG_ARGOCD => {}
            _ => return Ok(None),
        }
        Ok(Some(args))
    }
}

/// An image override.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct KustomizeImage {
    /// Image name as referenced by the manifests.
    pub name: String,
    /// Replacement image name, if any.
    pub new_name: String,
    /// Replacement tag, if any.
    pub new_tag: String,
}

impl KustomizeImage {
    fn operand(&self) -> String {
        let mut operand = self.name.clone();
        if !self.new_name.is_empty() {
            operand.push('=');
            operand.push_str(&self.new_name);
        }
        if !self.new_tag.is_empty() {
            operand.push(':');
            operand.push_str(&self.new_tag);
        }
        operand
    }
}

impl Schema for KustomizeImage {
    fn describe(&self) -> Value<'_> {
        Value::Record(vec![
            Field::new("name", &self.name),
            Field::new("new_name", &self.new_name),
            Field::new("new_tag", &self.new_tag),
        ])
    }
}

/// Installs a chart with `helm upgrade --install`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct Helm {
    /// Chart repository URL. Its basename names the local repo alias.
    pub repo: String,
    /// Chart name within the repository.
    pub chart: String,
    /// Chart version. The latest when empty.
    pub version: String,
    /// Values overridden with `--set`.
    pub set: Vec<Set>,
}

impl Schema for Helm {
    fn describe(&self) -> Value<'_> {
        Value::Record(vec![
            Field::tagged(
                "repo",
                &[(FIELD_TAG_HELM, ""), (FIELD_TAG_ARGOCD, "repo")],
                &self.repo,
            ),
            Field::tagged(
                "chart",
                &[(FIELD_TAG_HELM, ""), (FIELD_TAG_ARGOCD, "helm-chart")],
                &self.chart,
            ),
            Field::tagged("version", &[(FIELD_TAG_ARGOCD, "revision")], &self.version),
            Field::tagged(
                "set",
                &[(FIELD_TAG_HELM, "set"), (FIELD_TAG_ARGOCD, "helm-set")],
                Value::providers(&self.set),
            ),
        ])
    }
}

/// Registers the application with Argo CD.
///
/// Pairs like `server`/`server_from` take either a literal or an output key; the
/// literal wins when both are set.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ArgoCD {
    /// Repository Argo CD syncs from.
    pub repo: String,
    /// Output key holding the repository.
    pub repo_from: String,
    /// Path within the repository.
    pub path: String,
    /// Output key holding the path.
    pub path_from: String,
    /// Base branch for GitOps pull requests.
    pub branch: String,
    /// Sync subdirectories of `path` too.
    pub dir_recurse: bool,
    /// Destination cluster name, also used for `aws eks update-kubeconfig`.
    pub dest_name: String,
    /// Output key holding the destination cluster name.
    pub dest_name_from: String,
    /// Namespace the application is deployed to.
    pub dest_namespace: String,
    /// Destination cluster API server.
    pub dest_server: String,
    /// Argo CD API server.
    pub server: String,
    /// Output key holding the API server.
    pub server_from: String,
    /// Login user.
    pub username: String,
    /// Output key holding the login user.
    pub username_from: String,
    /// Login password.
    pub password: String,
    /// Output key holding the login password.
    pub password_from: String,
    /// Skip TLS verification.
    pub insecure: bool,
    /// Output key whose presence turns on `--insecure`. Its content is ignored.
    pub insecure_from: String,
    /// Argo CD project. Defaults to the application name.
    pub project: String,
    /// Pushes the repository through a GitOps pull request before syncing.
    pub push: bool,
    /// Local directories copied into the repository. Implies `push`.
    pub upload: Vec<Upload>,
    /// Config management plugin rendering the manifests. Set for kompose.
    pub config_management_plugin: String,
    /// SSH key registered with `argocd repo add`.
    pub repo_ssh_private_key_path: String,
    /// Output key holding the SSH key path.
    pub repo_ssh_private_key_path_from: String,
}

impl Schema for ArgoCD {
    fn describe(&self) -> Value<'_> {
        Value::Record(vec![
            Field::tagged("repo", ARGOCD_MANUAL, &self.repo),
            Field::tagged("repo_from", ARGOCD_MANUAL, &self.repo_from),
            Field::tagged("path", ARGOCD_MANUAL, &self.path),
            Field::tagged("path_from", ARGOCD_MANUAL, &self.path_from),
            Field::tagged("branch", ARGOCD_MANUAL, &self.branch),
            Field::tagged("dest_name", ARGOCD_MANUAL, &self.dest_name),
            Field::tagged("dest_name_from", ARGOCD_MANUAL, &self.dest_name_from),
            Field::tagged(
                "dest_namespace",
                &[(FIELD_TAG_ARGOCD, "dest-namespace")],
                &self.dest_namespace,
            ),
            Field::tagged("dest_server", &[(FIELD_TAG_ARGOCD, "dest-server")], &self.dest_server),
            Field::tagged(
                "dir_recurse",
                &[(FIELD_TAG_ARGOCD, "directory-recurse,paramless")],
                self.dir_recurse,
            ),
            Field::tagged("server", ARGOCD_MANUAL, &self.server),
            Field::tagged("server_from", ARGOCD_MANUAL, &self.server_from),
            Field::tagged("username", ARGOCD_MANUAL, &self.username),
            Field::tagged("username_from", ARGOCD_MANUAL, &self.username_from),
            Field::tagged("password", ARGOCD_MANUAL, &self.password),
            Field::tagged("password_from", ARGOCD_MANUAL, &self.password_from),
            Field::tagged("insecure", ARGOCD_MANUAL, self.insecure),
            Field::tagged("insecure_from", ARGOCD_MANUAL, &self.insecure_from),
            Field::tagged("project", ARGOCD_MANUAL, &self.project),
            Field::tagged("push", ARGOCD_MANUAL, self.push),
            Field::tagged("upload", ARGOCD_MANUAL, Value::nested_list(&self.upload)),
            Field::tagged(
                "config_management_plugin",
                ARGOCD_MANUAL,
                &self.config_management_plugin,
            ),
            Field::tagged(
                "repo_ssh_private_key_path",
                ARGOCD_MANUAL,
                &self.repo_ssh_private_key_path,
            ),
            Field::tagged(
                "repo_ssh_private_key_path_from",
                ARGOCD_MANUAL,
                &self.repo_ssh_private_key_path_from,
            ),
        ])
    }
}

/// A local directory whose contents are copied into the GitOps worktree.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct Upload {
    /// Local directory whose contents are copied.
    pub local: String,
    /// Destination directory relative to the repository root.
    pub remote: String,
}

impl Schema for Upload {
    fn describe(&self) -> Value<'_> {
        Value::Record(vec![
            Field::new("local", &self.local),
            Field::new("remote", &self.remote),
        ])
    }
}
