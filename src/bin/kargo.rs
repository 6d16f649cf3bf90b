// src/bin/kargo.rs

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use colored::*;
use kargo::{
    cli::{Cli, GenerateArgs},
    constants::{
        ENV_DRY_RUN_SUFFIX, ENV_GITHUB_TOKEN, ENV_PULLREQUEST_ASSIGNEE_IDS_SUFFIX,
        ENV_PULLREQUEST_HEAD_SUFFIX,
    },
    core::{
        config_loader,
        generator::Generator,
        gitops::PullRequestOptions,
    },
};
use std::{collections::HashMap, env};

/// The name generated branches and environment variables are derived from.
const TOOL_NAME: &str = "kargo";

/// The main entry point of the `kargo` application.
/// It sets up logging, parses arguments, prints the generated commands,
/// and performs centralized error handling.
fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if let Err(e) = run_cli(cli) {
        eprintln!("\n{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run_cli(cli: Cli) -> Result<()> {
    log::debug!("CLI args parsed: {:?}", cli);

    let config = config_loader::load(&cli.config)?;
    let args = cli.command.args();
    let generator = generator_from_env(args)?;

    let cmds = generator
        .exec_cmds(&config, cli.command.target())
        .with_context(|| format!("unable to generate commands for '{}'", config.name))?;

    let outputs: HashMap<&str, &str> = args
        .outputs
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    let lookup = |key: &str| -> Result<String> {
        outputs
            .get(key)
            .map(|v| v.to_string())
            .ok_or_else(|| anyhow!("no output named '{key}', pass it with --output {key}=VALUE"))
    };

    for cmd in &cmds {
        if let Some(dir) = &cmd.dir {
            println!("{}", format!("# in {}", dir.display()).dimmed());
        }
        for key in cmd.add_env.keys() {
            println!("{}", format!("# with ${key}").dimmed());
        }

        if args.resolve {
            let argv = cmd
                .resolve(&lookup)
                .with_context(|| format!("unable to resolve arguments of `{}`", cmd.name))?;
            let quoted = shlex::try_join(argv.iter().map(String::as_str))
                .map_err(|e| anyhow!("unable to quote arguments of `{}`: {:?}", cmd.name, e))?;
            println!("{} {}", cmd.name.bold(), quoted);
        } else {
            println!("{} {}", cmd.name.bold(), cmd.args);
        }
    }

    Ok(())
}

/// Threads CLI flags and `KARGO_*` environment variables into the generator.
fn generator_from_env(args: &GenerateArgs) -> Result<Generator> {
    let tools_command = shlex::split(&args.tools_command)
        .ok_or_else(|| anyhow!("invalid --tools-command: {}", args.tools_command))?;

    let prefix = TOOL_NAME.to_uppercase();
    let var = |suffix: &str| {
        env::var(format!("{prefix}{suffix}"))
            .ok()
            .filter(|v| !v.is_empty())
    };

    let assignee_ids = var(ENV_PULLREQUEST_ASSIGNEE_IDS_SUFFIX)
        .map(|ids| ids.split(',').map(str::to_string).collect())
        .unwrap_or_default();

    Ok(Generator {
        tool_name: TOOL_NAME.to_string(),
        tools_command,
        temp_dir: args.temp_dir.clone().or_else(|| Some(env::temp_dir())),
        tail_logs: args.tail_logs,
        github_token: env::var(ENV_GITHUB_TOKEN).ok().filter(|t| !t.is_empty()),
        dry_run: var(ENV_DRY_RUN_SUFFIX).as_deref() == Some("true"),
        pull_request: PullRequestOptions {
            assignee_ids,
            output_file: args.pull_request_output_file.clone(),
            git_user_name: args.git_user_name.clone(),
            git_user_email: args.git_user_email.clone(),
        },
        pull_request_head: var(ENV_PULLREQUEST_HEAD_SUFFIX),
        timestamp: None,
    })
}
