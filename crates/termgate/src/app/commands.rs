use clap::Parser;
use clap::Subcommand;
use clap::ValueHint;
pub use clap_complete::Shell;

pub use crate::adapters::OutputFormat;

const AFTER_HELP: &str =
    "Use --help for full details and examples. Use --format json for machine-readable output.";

const LONG_ABOUT: &str = "\
Open a shell session in the running termgate instance.\n\
\n\
The first launch starts a background daemon; later launches hand their request\n\
to it. Each launch waits for its own session to end and exits with the session's\n\
exit status.";

const AFTER_LONG_HELP: &str = r#"EXIT STATUS:
    The session's exit status when a session ran: the child's own code,
    128+N when it died from signal N, 127 when the program was not found,
    126 when it could not be executed. Launch errors use sysexits codes
    (64 usage, 69 daemon unavailable, 74 I/O error).

EXAMPLES:
    termgate                       # Your $SHELL in a new session
    termgate -e "make test"        # Run a command through /bin/sh -c
    termgate sessions              # List open sessions
    termgate close ab12cd34 --yes  # Close a session without asking
    termgate daemon status"#;

#[derive(Parser)]
#[command(name = "termgate")]
#[command(author, version, propagate_version = true)]
#[command(about = "Single-instance terminal session host that reports exit statuses back to each launch")]
#[command(long_about = LONG_ABOUT)]
#[command(after_help = AFTER_HELP)]
#[command(after_long_help = AFTER_LONG_HELP)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Command to run through /bin/sh -c instead of your $SHELL
    #[arg(
        short = 'e',
        long = "command",
        value_name = "CMD",
        value_hint = ValueHint::CommandString,
        allow_hyphen_values = true
    )]
    pub run: Option<String>,

    /// Output format (text or json)
    #[arg(
        short,
        long,
        global = true,
        value_enum,
        value_name = "FORMAT",
        default_value_t = OutputFormat::Text,
        help_heading = "Output Options"
    )]
    pub format: OutputFormat,

    /// Shorthand for --format json
    #[arg(long, global = true, help_heading = "Output Options")]
    pub json: bool,

    /// Disable colored output (also respects NO_COLOR)
    #[arg(long, global = true, env = "NO_COLOR", help_heading = "Output Options")]
    pub no_color: bool,

    /// Enable verbose output (debug logging on stderr)
    #[arg(short, long, global = true, help_heading = "Debug Options")]
    pub verbose: bool,
}

impl Cli {
    pub fn effective_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format
        }
    }

    pub fn is_foreground_daemon(&self) -> bool {
        matches!(
            self.command,
            Some(Commands::Daemon(DaemonCommand::Start { foreground: true }))
        )
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List open sessions
    #[command(after_long_help = "\
EXAMPLES:
    termgate sessions
    termgate sessions --json")]
    Sessions,

    /// Ask a session's window to close
    #[command(long_about = "\
Ask a session's window to close.

A window running a single process closes right away. When more than one process
would be closed, the close is cancelled unless --yes answers the confirmation.")]
    Close {
        /// Session ID (from 'termgate sessions')
        #[arg(value_name = "ID")]
        session: String,

        /// Answer the close confirmation with yes
        #[arg(short, long)]
        yes: bool,
    },

    /// Manage the background daemon
    #[command(subcommand)]
    Daemon(DaemonCommand),

    /// Generate shell completions
    #[command(after_long_help = "\
EXAMPLES:
    termgate completions bash > ~/.local/share/bash-completion/completions/termgate
    termgate completions zsh > ~/.zfunc/_termgate")]
    Completions {
        #[arg(value_enum, value_name = "SHELL")]
        shell: Shell,
    },

    /// Show client and daemon versions
    Version,
}

#[derive(Debug, Subcommand)]
pub enum DaemonCommand {
    /// Start the daemon process
    #[command(long_about = "\
Start the daemon process.

By default, starts the daemon in the background. Use --foreground to run
in the current terminal (useful for debugging).")]
    Start {
        /// Run in the foreground (debugging)
        #[arg(long)]
        foreground: bool,
    },

    /// Stop the running daemon after its open sessions are closed
    Stop,

    /// Show daemon status and version
    Status,
}
