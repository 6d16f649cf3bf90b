//! # Command Generator
//!
//! Turns a [`Config`] into the ordered list of external-tool invocations that
//! preview ([`Target::Plan`]) or execute ([`Target::Apply`]) the deployment.
//!
//! Nothing here spawns a process. Every [`Cmd`] carries an [`Args`] tree whose
//! deferred references are resolved by the caller, once the outputs of earlier
//! steps are known.

use crate::{
    constants::{
        DEFAULT_COMPOSE_FILE, FIELD_TAG_ARGOCD, FIELD_TAG_COMPOSE, FIELD_TAG_HELM,
        FIELD_TAG_KOMPOSE, FIELD_TAG_KUSTOMIZE, KOMPOSE_PLUGIN_NAME, KUSTOMIZE_BUILT_FILENAME,
    },
    core::{
        args::{Arg, Args, ArgsError, DeferredRef},
        gitops::{GitOpsRequest, PullRequestOptions},
        provider::{BashScript, Lookup},
        schema,
    },
    models::{
        ArgoCD, Compose, Config, Helm, Kompose, Kustomize, KustomizeStrategy,
    },
};
use anyhow::{Context, Result, bail};
use chrono::NaiveDateTime;
use lazy_static::lazy_static;
use regex::Regex;
use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

lazy_static! {
    // DNS-1123 subdomain, the names Argo CD accepts for projects.
    static ref PROJECT_NAME_RE: Regex =
        Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").unwrap();
}

/// Whether the generated commands preview or execute the deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Show what would change.
    Plan,
    /// Make the change.
    Apply,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Target::Plan => "plan",
            Target::Apply => "apply",
        })
    }
}

/// A single external-tool invocation.
#[derive(Debug, Clone, Default)]
pub struct Cmd {
    /// Optional identifier other steps can refer to when looking up this command's output.
    pub id: String,
    /// The program to run.
    pub name: String,
    /// Arguments, possibly still referring to earlier outputs.
    pub args: Args,
    /// Working directory. `None` means the caller's current directory.
    pub dir: Option<PathBuf>,
    /// Variables added on top of the inherited environment.
    pub add_env: BTreeMap<String, String>,
}

impl Cmd {
    /// Creates a command running `name` with `args`.
    pub fn new(name: impl Into<String>, args: impl Into<Arg>) -> Self {
        Self {
            name: name.into(),
            args: Args::new().with(args),
            ..Default::default()
        }
    }

    /// Runs `script` through `bash -vxc`, echoing every line it executes.
    pub fn bash_script(script: Args) -> Self {
        Self::new("bash", Args::new().with("-vxc").with(BashScript::new(script)))
    }

    /// Sets the identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the working directory, if any.
    pub fn within(mut self, dir: Option<&Path>) -> Self {
        self.dir = dir.map(Path::to_path_buf);
        self
    }

    /// Adds an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_env.insert(key.into(), value.into());
        self
    }

    /// The program name followed by its arguments.
    pub fn to_args(&self) -> Args {
        Args::new().with(self.name.as_str()).with(&self.args)
    }

    /// Resolves the arguments into the final argv, without the program name.
    pub fn resolve(&self, lookup: &Lookup<'_>) -> Result<Vec<String>, ArgsError> {
        self.args.collect(lookup)
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.args)
    }
}

/// Generates the commands required to plan and apply a deployment.
#[derive(Debug, Clone, Default)]
pub struct Generator {
    /// Name of the tool embedding the generator. Prefixes generated branch names.
    pub tool_name: String,
    /// The command running the bundled tools, e.g. `["kargo", "tools"]`.
    /// Required by the GitOps flow, which ends with `<tools command> create-pullrequest`.
    pub tools_command: Vec<String>,
    /// Where `kustomize build` output and GitOps worktrees are written.
    pub temp_dir: Option<PathBuf>,
    /// Follow the application's logs after applying.
    pub tail_logs: bool,
    /// Token for cloning over https and opening pull requests.
    pub github_token: Option<String>,
    /// Forces the pull-request tool into dry-run mode.
    pub dry_run: bool,
    /// Forwarded to the pull-request tool and `git commit`.
    pub pull_request: PullRequestOptions,
    /// Branch pushed for pull requests. Generated from `tool_name` and the time when unset.
    pub pull_request_head: Option<String>,
    /// Time used in generated branch names. The current local time when unset.
    pub timestamp: Option<NaiveDateTime>,
}

impl Generator {
    /// Generates the commands for `target`.
    ///
    /// An `argocd` section takes precedence and wraps the other backends. Otherwise the
    /// first backend present among compose, helm, kustomize and kompose is used, falling
    /// back to applying plain manifests under `path` with kubectl.
    pub fn exec_cmds(&self, config: &Config, target: Target) -> Result<Vec<Cmd>> {
        log::debug!("Generating {} commands for '{}'", target, config.name);

        let cmds = if let Some(argocd) = &config.argocd {
            self.argocd_cmds(config, argocd, target)?
        } else if let Some(compose) = &config.compose {
            self.compose_cmds(config, compose, target)?
        } else if let Some(helm) = &config.helm {
            self.helm_cmds(config, helm, target)?
        } else if let Some(kustomize) = &config.kustomize {
            self.kustomize_cmds(config, kustomize, target)?
        } else if let Some(kompose) = &config.kompose {
            self.kompose_cmds(config, kompose, target)?
        } else {
            kubectl_cmds(config, target)
        };

        for cmd in &cmds {
            log::trace!("Generated: {}", cmd);
        }
        Ok(cmds)
    }

    fn compose_cmds(&self, config: &Config, compose: &Compose, target: Target) -> Result<Vec<Cmd>> {
        let flags = schema::compile(compose, FIELD_TAG_COMPOSE)
            .context("unable to compile compose flags")?;
        let (dir, file) = split_compose_path(&config.path);

        let mut up = Args::of(["up"]);
        if !self.tail_logs {
            up.append("-d");
        }

        let compose_args = Args::of(["compose", "-f", file.as_str()]).with(flags);

        let cmd = match target {
            Target::Apply if compose.enable_vals => Cmd::new(
                "vals",
                Args::of(["exec", "--stream-yaml", file.as_str(), "--"])
                    .with(Args::of(["docker", "compose", "-f", "-"]))
                    .with(up),
            ),
            Target::Apply => Cmd::new("docker", compose_args.with(up)),
            Target::Plan => Cmd::new("docker", compose_args.with("convert")),
        };
        Ok(vec![cmd.within(dir.as_deref())])
    }

    fn helm_cmds(&self, config: &Config, helm: &Helm, target: Target) -> Result<Vec<Cmd>> {
        if helm.repo.is_empty() || helm.chart.is_empty() {
            bail!("unable to generate helm commands: specify helm.repo and helm.chart in your config");
        }
        let flags =
            schema::compile(helm, FIELD_TAG_HELM).context("unable to compile helm flags")?;

        let alias = helm
            .repo
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();

        let repo_add = Cmd::new("helm", Args::of(["repo", "add", alias, helm.repo.as_str()]));
        let upgrade = Args::of(["upgrade", "--install"])
            .with(config.name.as_str())
            .with(format!("{}/{}", alias, helm.chart))
            .with(flags);

        let install = match target {
            Target::Apply => Cmd::new("helm", upgrade),
            Target::Plan => Cmd::new("helm", Args::of(["diff"]).with(upgrade)),
        };
        Ok(vec![repo_add, install])
    }

    fn kustomize_cmds(
        &self,
        config: &Config,
        kustomize: &Kustomize,
        target: Target,
    ) -> Result<Vec<Cmd>> {
        let images = schema::compile(&kustomize.images, FIELD_TAG_KUSTOMIZE)
            .context("unable to compile kustomize images")?;
        if images.is_empty() {
            bail!("unable to generate kustomize commands: specify kustomize.images in your config");
        }

        let path = non_empty(&config.path).map(Path::new);
        let edit = Cmd::new("kustomize", Args::of(["edit", "set", "image"]).with(images))
            .within(path);

        if kustomize.strategy == KustomizeStrategy::SetImageAndCreatePR {
            if kustomize.git.repo.is_empty() {
                bail!(
                    "kustomize.git.repo is required for kustomize.strategy={}",
                    KustomizeStrategy::SetImageAndCreatePR
                );
            }
            let request = GitOpsRequest {
                name: &config.name,
                repo: &kustomize.git.repo,
                branch: &kustomize.git.branch,
                path: &kustomize.git.path,
                uploads: &[],
                file_mod_cmds: vec![edit],
                do_pr: true,
            };
            return self
                .gitops(target, request)
                .context("unable to generate gitops commands");
        }

        let built = self
            .temp_dir
            .clone()
            .unwrap_or_default()
            .join(KUSTOMIZE_BUILT_FILENAME)
            .display()
            .to_string();

        let mut build_args = Args::new().with("build").with(format!("--output={built}"));
        if let Some(path) = non_empty(&config.path) {
            build_args.append(path);
        }
        let build = Cmd::new("kustomize", build_args);

        let verb = match target {
            Target::Apply => "apply",
            Target::Plan => "diff",
        };
        let kubectl = Cmd::new(
            "kubectl",
            Args::of([verb, "-f", built.as_str(), "--server-side=true"]),
        );

        Ok(vec![edit, build, kubectl])
    }

    fn kompose_cmds(&self, config: &Config, kompose: &Kompose, target: Target) -> Result<Vec<Cmd>> {
        let flags = schema::compile(kompose, FIELD_TAG_KOMPOSE)
            .context("unable to compile kompose flags")?;
        let (dir, file) = split_compose_path(&config.path);

        let pipeline = |input: &str, verb: &str, tail: bool| {
            let mut script = Args::of(["kompose", "convert", "--stdout"]);
            if !config.path.is_empty() {
                script.append_strings(["-f", input]);
            }
            script
                .append(flags.clone())
                .append_strings(["|", "kubectl", verb, "--server-side", "-f", "-"]);
            if tail {
                script.append_strings(["&&", "stern", "-l", "kompose.io.service!="]);
            }
            BashScript::new(script)
        };

        let cmd = match target {
            Target::Apply if kompose.enable_vals => Cmd::new(
                "vals",
                Args::of(["exec", "--stream-yaml", file.as_str(), "--", "bash", "-c"])
                    .with(pipeline("-", "apply", self.tail_logs)),
            ),
            Target::Apply => Cmd::new(
                "bash",
                Args::of(["-c"]).with(pipeline(file.as_str(), "apply", self.tail_logs)),
            ),
            Target::Plan => Cmd::new(
                "bash",
                Args::of(["-c"]).with(pipeline(file.as_str(), "diff", false)),
            ),
        };
        Ok(vec![cmd.within(dir.as_deref())])
    }

    fn argocd_cmds(&self, config: &Config, argocd: &ArgoCD, target: Target) -> Result<Vec<Cmd>> {
        let mut app =
            schema::compile(config, FIELD_TAG_ARGOCD).context("unable to compile argocd app flags")?;
        if let Some(helm) = &config.helm {
            app = schema::append_args(app, helm, FIELD_TAG_ARGOCD)
                .context("unable to compile helm flags for argocd")?;
        } else if let Some(kustomize) = &config.kustomize {
            app = schema::append_args(app, kustomize, FIELD_TAG_ARGOCD)
                .context("unable to compile kustomize flags for argocd")?;
        } else if config.compose.is_some() {
            bail!("compose is not supported with argocd");
        }

        // Connection flags shared by login, project creation and app creation.
        let mut conn = Args::new();
        let mut login = Args::new();
        let mut kubeconfig = Args::new();
        let mut cluster_add = Args::new();
        let mut repo_add = Args::new();

        if let Some(server) = literal_or_ref(&argocd.server, &argocd.server_from) {
            conn.append("--server").append(server.clone());
            login.append(server);
        }
        if let Some(username) = literal_or_ref(&argocd.username, &argocd.username_from) {
            login.append("--username").append(username);
        }
        if let Some(password) = literal_or_ref(&argocd.password, &argocd.password_from) {
            login.append("--password").append(password);
        }
        if argocd.insecure {
            conn.append("--insecure");
            login.append("--insecure");
        } else if !argocd.insecure_from.is_empty() {
            conn.append_deferred_if_resolved("--insecure", argocd.insecure_from.as_str());
            login.append_deferred_if_resolved("--insecure", argocd.insecure_from.as_str());
        }

        app.copy_from(&conn);

        if let Some(dest) = literal_or_ref(&argocd.dest_name, &argocd.dest_name_from) {
            app.append("--dest-name").append(dest.clone());
            kubeconfig
                .append("--name")
                .append(dest.clone())
                .append("--alias")
                .append(dest.clone());
            cluster_add.append(dest);
        }

        let plugin = match non_empty(&argocd.config_management_plugin) {
            Some(plugin) => Some(plugin),
            None if config.kompose.is_some() => Some(KOMPOSE_PLUGIN_NAME),
            None => None,
        };
        if let Some(plugin) = plugin {
            app.append(format!("--config-management-plugin={plugin}"));
        }

        if let Some(path) = literal_or_ref(&argocd.path, &argocd.path_from) {
            app.append("--path").append(path);
        }

        if let Some(repo) = literal_or_ref(&argocd.repo, &argocd.repo_from) {
            app.append("--repo").append(repo.clone());
            repo_add.append(repo);
        }

        app = schema::append_args(app, argocd, FIELD_TAG_ARGOCD)
            .context("unable to compile argocd flags")?;

        let project = non_empty(&argocd.project).unwrap_or(config.name.as_str());
        if !PROJECT_NAME_RE.is_match(project) {
            bail!("invalid argocd.project value: {project}");
        }

        if let Some(key_path) = literal_or_ref(
            &argocd.repo_ssh_private_key_path,
            &argocd.repo_ssh_private_key_path_from,
        ) {
            repo_add.append("--ssh-private-key-path").append(key_path);
        }

        if conn.is_empty() {
            bail!("unable to generate argocd commands: specify argocd connection-related fields in your config");
        } else if app.is_empty() {
            bail!("unable to generate argocd commands: specify argocd app-related fields in your config");
        }

        let mut cmds = Vec::new();
        if argocd.push || !argocd.upload.is_empty() {
            let request = GitOpsRequest {
                name: &config.name,
                repo: &argocd.repo,
                branch: &argocd.branch,
                path: "",
                uploads: &argocd.upload,
                file_mod_cmds: Vec::new(),
                do_pr: true,
            };
            cmds.extend(
                self.gitops(target, request)
                    .context("unable to generate gitops commands")?,
            );
        }

        if target == Target::Plan {
            return Ok(cmds);
        }

        let mut script = Args::new();
        script
            .append_strings(["argocd", "login"])
            .append(login)
            .append(";")
            .append_strings(["argocd", "proj", "create", project])
            .append(&conn)
            .append(";")
            .append_strings(["aws", "eks", "update-kubeconfig"])
            .append(kubeconfig)
            .append(";")
            .append_strings(["argocd", "cluster", "add"])
            .append(cluster_add)
            .append(";")
            .append_strings(["argocd", "repo", "add"])
            .append(repo_add)
            .append(";")
            .append_strings(["argocd", "app", "create"])
            .append(&app)
            .append(";")
            .append_strings(["argocd", "app", "set"])
            .append(&app);
        if self.tail_logs {
            script
                .append(";")
                .append_strings(["argocd", "app", "logs", config.name.as_str()])
                .append_strings(["--follow", "--tail=-1"]);
        }

        cmds.push(Cmd::bash_script(script));
        Ok(cmds)
    }
}

fn kubectl_cmds(config: &Config, target: Target) -> Vec<Cmd> {
    let path = non_empty(&config.path).unwrap_or(".");
    let verb = match target {
        Target::Apply => "apply",
        Target::Plan => "diff",
    };
    vec![Cmd::new(
        "kubectl",
        Args::of([verb, "-f", path, "--server-side=true"]),
    )]
}

/// Splits a compose path into the working directory and the file name.
/// A path not ending in `.yml` is a directory holding `docker-compose.yml`.
fn split_compose_path(path: &str) -> (Option<PathBuf>, String) {
    if !path.ends_with(".yml") {
        return (
            non_empty(path).map(PathBuf::from),
            DEFAULT_COMPOSE_FILE.to_string(),
        );
    }
    let path = Path::new(path);
    let file = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_COMPOSE_FILE.to_string());
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf);
    (dir, file)
}

/// The literal when set, otherwise a deferred reference to `key` when set.
fn literal_or_ref(literal: &str, key: &str) -> Option<Arg> {
    if !literal.is_empty() {
        Some(Arg::from(literal))
    } else if !key.is_empty() {
        Some(Arg::Deferred(DeferredRef::new(key)))
    } else {
        None
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() { None } else { Some(s) }
}
