// src/constants.rs

/// The default name of a deployment description file.
pub const CONFIG_FILENAME: &str = "kargo.toml";

// --- Target keys ---

/// Universal target key. A field tagged `""` under it is excluded for every target.
pub const FIELD_TAG_KARGO: &str = "kargo";

/// Target key for `docker compose` flags.
pub const FIELD_TAG_COMPOSE: &str = "compose";

/// Target key for `helm upgrade` flags.
pub const FIELD_TAG_HELM: &str = "helm";

/// Target key for `kustomize edit set image` operands.
pub const FIELD_TAG_KUSTOMIZE: &str = "kustomize";

/// Target key for `kompose convert` flags.
pub const FIELD_TAG_KOMPOSE: &str = "kompose";

/// Target key for `argocd app create` flags.
pub const FIELD_TAG_ARGOCD: &str = "argocd";

/// Suffix marking a field whose content is a lookup key rather than a value.
pub const REFERENCE_SUFFIX: &str = "_from";

// --- Generated files and directories ---

/// The compose file used when the configured path does not name one.
pub const DEFAULT_COMPOSE_FILE: &str = "docker-compose.yml";

/// The file `kustomize build` writes into the temporary directory.
pub const KUSTOMIZE_BUILT_FILENAME: &str = "kustomize-built.yaml";

/// The directory (under the temporary directory) holding GitOps worktrees.
pub const GITOPS_DIR: &str = "kargo-gitops";

/// The config management plugin registered for kompose-based Argo CD apps.
pub const KOMPOSE_PLUGIN_NAME: &str = "kargo";

// --- GitOps ---

/// The git remote every GitOps worktree is cloned with.
pub const GIT_REMOTE: &str = "origin";

/// The branch pull requests target when none is configured.
pub const DEFAULT_BASE_BRANCH: &str = "main";

/// The user part injected into https repository URLs carrying a token.
pub const GIT_TOKEN_USER: &str = "kargo";

/// The environment variable the clone script reads the repository token from.
pub const GIT_TOKEN_ENV: &str = "KARGO_GIT_TOKEN";

/// Timestamp layout of generated branch names.
pub const BRANCH_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// The environment variable the pull-request tool reads its token from.
pub const TOOLS_GITHUB_TOKEN_ENV: &str = "KARGO_TOOLS_GITHUB_TOKEN";

/// Subcommand of the tools command creating a pull request.
pub const COMMAND_CREATE_PULL_REQUEST: &str = "create-pullrequest";

/// Flag names understood by the `create-pullrequest` tool.
pub mod pull_request_flags {
    /// Local clone the pull request is opened from.
    pub const DIR: &str = "dir";
    /// Pull request title.
    pub const TITLE: &str = "title";
    /// Pull request body.
    pub const BODY: &str = "body";
    /// Branch holding the change.
    pub const HEAD: &str = "head";
    /// Branch the pull request targets.
    pub const BASE: &str = "base";
    /// Comma-separated assignees.
    pub const ASSIGNEE_IDS: &str = "assignee-ids";
    /// Environment variable holding the GitHub token.
    pub const TOKEN_ENV: &str = "token-env";
    /// Print the pull request instead of creating it.
    pub const DRY_RUN: &str = "dry-run";
    /// File the created pull request is written to.
    pub const OUTPUT_FILE: &str = "output-file";
}

// --- Environment read by the binary ---

/// Token used to clone repositories and open pull requests.
pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";

/// Suffix of `<TOOL>_DRY_RUN`; `true` forces the pull-request tool into dry-run mode.
pub const ENV_DRY_RUN_SUFFIX: &str = "_DRY_RUN";

/// Suffix of `<TOOL>_PULLREQUEST_ASSIGNEE_IDS`, a comma-separated list of user ids.
pub const ENV_PULLREQUEST_ASSIGNEE_IDS_SUFFIX: &str = "_PULLREQUEST_ASSIGNEE_IDS";

/// Suffix of `<TOOL>_PULLREQUEST_HEAD`, overriding the generated branch name.
pub const ENV_PULLREQUEST_HEAD_SUFFIX: &str = "_PULLREQUEST_HEAD";
