use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "entrygate")]
#[command(version)]
#[command(about = "Container entrypoint: wait for dependencies, then run a mode under supervision")]
#[command(after_help = "Run `entrygate help` for the list of modes and environment variables.")]
pub struct Cli {
    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log debug output
    #[arg(short, long)]
    pub verbose: bool,

    /// Mode to run (app, worker, beat, shell, migrate, health, ...) or any
    /// executable on PATH
    #[arg(value_name = "MODE", default_value = "app")]
    pub mode: String,

    /// Arguments passed through to the mode
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl Cli {
    /// Level forced by `-q`/`-v`, overriding `RUST_LOG` and `LOG_LEVEL`.
    pub fn log_level_override(&self) -> Option<&'static str> {
        if self.quiet {
            Some("error")
        } else if self.verbose {
            Some("debug")
        } else {
            None
        }
    }
}
