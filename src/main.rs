use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use aclprof::{
    commands,
    paths::Paths,
    ui::{ColorMode, Ui},
};

#[derive(Parser)]
#[command(name = "aclprof")]
#[command(about = "ACL Profile Switcher - keep named ACL policies and activate one at a time")]
#[command(version)]
struct Cli {
    /// Directory holding the profile index [default: ~/.aclprof]
    #[arg(long, global = true, env = "ACLPROF_DIR", value_name = "DIR")]
    dir: Option<PathBuf>,

    /// File overwritten by `apply` [default: <DIR>/acl.hujson]
    #[arg(long, global = true, env = "ACLPROF_OUTPUT", value_name = "FILE")]
    output: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// When to use colors
    #[arg(long, global = true, value_enum, value_name = "WHEN", default_value = "auto")]
    color: ColorMode,

    /// Log debug events to stderr (overrides ACLPROF_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored profiles
    List,

    /// Print a profile's content
    Show {
        name: String,
    },

    /// Create a profile or replace its content
    Set {
        name: String,

        /// Read content from this file instead of stdin
        #[arg(long, short)]
        file: Option<PathBuf>,
    },

    /// Rename a profile (never overwrites an existing one)
    Rename {
        old_name: String,
        new_name: String,
    },

    /// Remove a profile from the index
    Remove {
        name: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Write a profile's content to the output file
    Apply {
        name: String,
    },

    /// Show the last applied profile and output file status
    Current,

    /// Run diagnostics on the profile directory
    Doctor,

    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("aclprof=debug")
    } else {
        EnvFilter::try_from_env("ACLPROF_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let paths = Paths::resolve(cli.dir, cli.output)?;
    let ui = Ui::new(cli.color, cli.no_color);

    match cli.command {
        Commands::List => commands::list(&paths, &ui),
        Commands::Show { name } => commands::show(&paths, &name),
        Commands::Set { name, file } => commands::set(&paths, &name, file.as_deref(), &ui),
        Commands::Rename { old_name, new_name } => {
            commands::rename(&paths, &old_name, &new_name, &ui)
        }
        Commands::Remove { name, force } => commands::remove(&paths, &name, &ui, force),
        Commands::Apply { name } => commands::apply(&paths, &name, &ui),
        Commands::Current => commands::current(&paths, &ui),
        Commands::Doctor => commands::doctor(&paths, &ui),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "aclprof", &mut std::io::stdout());
            Ok(())
        }
    }
}
