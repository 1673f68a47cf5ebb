use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "xtasks")]
#[command(about = "Run project tasks using rust instead of scripts")]
pub struct App {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Builds one of the project binaries
    Build(BuildArgs),
    /// Builds a binary and installs it at the given path
    Install(InstallArgs),
    /// Runs the workspace tests
    Test(TestArgs),
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Release flag
    #[arg(short, long)]
    pub release: bool,

    /// Name of the binary to build (`folio-relay` or `folio-chat`). Builds everything if
    /// omitted.
    #[arg(short, long)]
    pub bin: Option<String>,
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Name of the binary to install.
    #[arg(short, long)]
    pub name: String,

    /// Path to install the binary to.
    #[arg(short, long)]
    pub path: String,
}

#[derive(Args, Debug)]
pub struct TestArgs {
    /// Only test this package.
    #[arg(short, long)]
    pub package: Option<String>,

    /// Show `log` output from the tests (sets `RUST_LOG=debug`).
    #[arg(short, long)]
    pub verbose: bool,
}
