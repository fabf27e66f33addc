mod accounts;
mod cli;
mod config;
mod engine;
mod paths;
mod plan;
mod registry;
mod resource;
mod results;
mod runner;
mod ui;

use anyhow::{Context as _, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command, PlanArgs};
use config::AgentConfig;
use declarative::Context;
use engine::{ExecuteOptions, Printer};
use plan::Plan;
use std::io;
use std::path::Path;

/// Global context for the application
pub struct AppContext {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() {
    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            ui::error(&format!("{e:#}"));
            std::process::exit(2);
        }
    }
}

/// Whether the run succeeded
fn run() -> Result<bool> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let app = AppContext {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    match cli.command {
        Command::Plan(args) => converge(&app, cli.config.as_deref(), &args, false, true),
        Command::Apply(args) => converge(&app, cli.config.as_deref(), &args.plan, true, args.yes),
        Command::Types => {
            list_types();
            Ok(true)
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "converge", &mut io::stdout());
            Ok(true)
        }
    }
}

fn converge(
    app: &AppContext,
    config: Option<&Path>,
    args: &PlanArgs,
    apply: bool,
    yes: bool,
) -> Result<bool> {
    let agent = AgentConfig::discover(config)?;
    let plan = Plan::load(&args.file)?;
    let env = agent.environment(plan.uses(registry::SYSTEMD_UNIT_STATE))?;
    let ctx = Context::new();

    if !app.quiet {
        ui::header(&format!(
            "{} {}",
            if apply { "Applying" } else { "Planning" },
            args.file.display()
        ));
        ui::kv("resources", &plan.resources.len().to_string());
        ui::kv("cache", &env.cache_dir.display().to_string());
        println!();
    }

    // Show the plan and ask before touching the host
    if apply && !yes {
        let mut printer = Printer::new(app.verbose > 0, app.quiet);
        let preview = engine::execute(
            &plan,
            &mut plan.renderer(&args.params)?,
            &env,
            &ctx,
            ExecuteOptions { apply: false },
            &mut printer,
        );
        if preview.total_changes() == 0 {
            engine::print_summary(&preview, false);
            return Ok(preview.is_success());
        }
        if !confirm_proceed()? {
            println!();
            println!("  Aborted");
            return Ok(true);
        }
        println!();
    }

    let mut printer = Printer::new(app.verbose > 0, app.quiet);
    let summary = engine::execute(
        &plan,
        &mut plan.renderer(&args.params)?,
        &env,
        &ctx,
        ExecuteOptions { apply },
        &mut printer,
    );

    if !app.quiet {
        engine::print_summary(&summary, apply);
    }
    Ok(summary.is_success())
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    dialoguer::Confirm::new()
        .with_prompt("Apply changes?")
        .default(true)
        .interact()
        .context("Failed to read confirmation")
}

fn list_types() {
    ui::header("Resource types");
    for registration in registry::REGISTRY {
        let schema = (registration.schema)();
        let fields: Vec<&str> = schema.fields().iter().map(|f| f.name).collect();
        ui::kv(registration.name, &fields.join(", "));
    }
    println!();
    ui::info("Every type also accepts depends and group");
    ui::dim("Values may use {{ param \"name\" }} and {{ lookup \"type.name.field\" }}");
}
