// src/cli.rs

use crate::{constants::CONFIG_FILENAME, core::generator::Target};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// kargo: generates the commands that plan and apply a deployment.
///
/// The deployment is described in a `kargo.toml` (docker compose, kompose,
/// kustomize, Helm or plain manifests, optionally managed through Argo CD).
/// kargo prints the external-tool invocations it would run, in order.
///
/// Values produced by earlier steps are shown as `$(get KEY)` placeholders.
/// Pass them with `--output KEY=VALUE` and `--resolve` to print the final argv.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// The deployment description to load.
    #[arg(long, short, global = true, default_value = CONFIG_FILENAME)]
    pub config: PathBuf,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the commands previewing the deployment.
    Plan(GenerateArgs),
    /// Print the commands executing the deployment.
    Apply(GenerateArgs),
}

impl Command {
    /// The generation target selected by the subcommand.
    pub fn target(&self) -> Target {
        match self {
            Command::Plan(_) => Target::Plan,
            Command::Apply(_) => Target::Apply,
        }
    }

    /// The options shared by every subcommand.
    pub fn args(&self) -> &GenerateArgs {
        match self {
            Command::Plan(args) | Command::Apply(args) => args,
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct GenerateArgs {
    /// Follow the deployment's logs after applying.
    #[arg(long)]
    pub tail_logs: bool,

    /// Directory for build output and GitOps worktrees.
    #[arg(long)]
    pub temp_dir: Option<PathBuf>,

    /// The command running the bundled tools, split like a shell would.
    #[arg(long, default_value = "kargo tools")]
    pub tools_command: String,

    /// A captured output referenced by the deployment (e.g. "argocd_server=https://argocd").
    #[arg(long = "output", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub outputs: Vec<(String, String)>,

    /// Resolve references against `--output` and print the final arguments.
    #[arg(long)]
    pub resolve: bool,

    /// `user.name` for GitOps commits.
    #[arg(long)]
    pub git_user_name: Option<String>,

    /// `user.email` for GitOps commits.
    #[arg(long)]
    pub git_user_email: Option<String>,

    /// File the pull-request tool writes the created pull request to.
    #[arg(long)]
    pub pull_request_output_file: Option<String>,
}

/// Parses a `KEY=VALUE` pair. The value may itself contain `=`.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("invalid KEY=VALUE: no key found in `{s}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plan_with_outputs() {
        let cli = Cli::try_parse_from([
            "kargo",
            "plan",
            "--output",
            "server=https://argocd.example.com",
            "--output",
            "token=a=b",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from(CONFIG_FILENAME));
        assert_eq!(cli.command.target(), Target::Plan);
        assert_eq!(
            cli.command.args().outputs,
            vec![
                ("server".to_string(), "https://argocd.example.com".to_string()),
                ("token".to_string(), "a=b".to_string()),
            ]
        );
        assert_eq!(cli.command.args().tools_command, "kargo tools");
    }

    #[test]
    fn test_parse_apply_with_global_flags() {
        let cli = Cli::try_parse_from([
            "kargo",
            "apply",
            "-c",
            "deploy/kargo.toml",
            "-v",
            "--tail-logs",
            "--temp-dir",
            "/tmp/kargo",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("deploy/kargo.toml"));
        assert_eq!(cli.command.target(), Target::Apply);
        assert!(cli.command.args().tail_logs);
        assert_eq!(cli.command.args().temp_dir, Some(PathBuf::from("/tmp/kargo")));
    }

    #[test]
    fn test_rejects_output_without_key() {
        assert!(Cli::try_parse_from(["kargo", "plan", "--output", "novalue"]).is_err());
        assert!(Cli::try_parse_from(["kargo", "plan", "--output", "=value"]).is_err());
    }
}
