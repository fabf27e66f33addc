use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "converge")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge a host to a declared state", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Agent config file
    #[arg(long, global = true, env = "CONVERGE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check every resource and show what would change
    Plan(PlanArgs),

    /// Check every resource and converge the ones that differ
    Apply(ApplyArgs),

    /// List registered resource types
    Types,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct PlanArgs {
    /// Plan file (TOML)
    pub file: PathBuf,

    /// Override a plan param, as name=value
    #[arg(short, long = "param", value_parser = crate::plan::parse_param)]
    pub params: Vec<(String, String)>,
}

#[derive(Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub plan: PlanArgs,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_apply_with_params() {
        let cli = Cli::try_parse_from([
            "converge", "-vv", "apply", "site.toml", "-p", "user=deploy", "--param", "port=80", "-y",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert!(args.yes);
        assert_eq!(args.plan.file, PathBuf::from("site.toml"));
        assert_eq!(
            args.plan.params,
            vec![
                ("user".to_string(), "deploy".to_string()),
                ("port".to_string(), "80".to_string()),
            ]
        );
    }

    #[test]
    fn test_bad_param_rejected() {
        assert!(Cli::try_parse_from(["converge", "plan", "site.toml", "-p", "oops"]).is_err());
    }
}
