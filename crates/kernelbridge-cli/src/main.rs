//! kernelbridge CLI.
//!
//! Runs C++ fragments through a Jupyter kernel from the shell.
//!
//! # Quick Start
//!
//! ```bash
//! # Run one fragment
//! kernelbridge exec 'std::cout << 6 * 7 << std::endl;'
//!
//! # Interactive session (blank line submits)
//! kernelbridge repl
//!
//! # List installed kernels
//! kernelbridge kernels
//! ```

mod commands;
mod style;

use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

/// kernelbridge - drive an incrementally compiling C++ kernel from the shell.
#[derive(Parser)]
#[command(name = "kernelbridge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory to load kernelbridge.toml from.
    #[arg(short = 'C', long, global = true, default_value = ".")]
    project: String,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one fragment in a fresh kernel and print its output.
    Exec {
        /// Source lines, joined with newlines. Reads stdin when empty or `-`.
        code: Vec<String>,

        /// Kernelspec name, overriding the configured one.
        #[arg(short, long)]
        kernel: Option<String>,

        /// Execution timeout in milliseconds.
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },

    /// Interactive session; a blank line submits the accumulated fragment.
    Repl {
        /// Kernelspec name, overriding the configured one.
        #[arg(short, long)]
        kernel: Option<String>,
    },

    /// List installed kernelspecs.
    Kernels,

    /// Configuration commands.
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration.
    Show {
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
    Toml,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    style::set_no_color(cli.no_color || std::env::var_os("NO_COLOR").is_some());

    let result = match cli.command {
        Commands::Exec {
            code,
            kernel,
            timeout_ms,
        } => commands::exec::run(&cli.project, &code, kernel.as_deref(), timeout_ms),
        Commands::Repl { kernel } => commands::repl::run(&cli.project, kernel.as_deref()),
        Commands::Kernels => commands::kernels::run(&cli.project),
        Commands::Config(ConfigCommands::Show { format }) => {
            commands::config::show(&cli.project, format)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            style::print_error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}
