//! Argument parsing and command dispatch.

use std::env;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use temuin_client::booking::DEFAULT_CUSTOMER_NAME;
use temuin_client::config::DEFAULT_API_URL;
use temuin_telemetry::{LogFormat, LoggingConfig, init_logging};
use url::Url;

use crate::client::{AppContext, CliResult, parse_url, print_notifications};
use crate::commands::admin::{handle_admin_audit, handle_admin_promote, handle_admin_users};
use crate::commands::auth::{
    handle_login, handle_logout, handle_register, handle_whoami,
};
use crate::commands::booking::handle_book;
use crate::commands::catalog::{handle_health, handle_providers, handle_services, handle_slots};

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CLI_LOG_LEVEL: &str = "warn";
const STATE_FILE_NAME: &str = "state.json";

/// Parses CLI arguments, executes the requested command, and prints
/// notifications raised along the way. Returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let logging = LoggingConfig {
        level: &cli.log_level,
        format: cli.log_format,
        build_sha: option_env!("TEMUIN_BUILD_SHA").unwrap_or("dev"),
    };
    if let Err(err) = init_logging(&logging) {
        eprintln!("warning: logging disabled: {err}");
    }

    let ctx = match AppContext::from_cli(&cli) {
        Ok(ctx) => ctx,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            return err.exit_code();
        }
    };

    let command = cli.command.label();
    let mut notifications = ctx.app.events().subscribe(None);
    let result = dispatch(&ctx, cli.command, cli.output).await;
    print_notifications(&mut notifications);

    match result {
        Ok(()) => {
            tracing::debug!(command, "command completed");
            0
        }
        Err(err) => {
            let exit_code = err.exit_code();
            tracing::debug!(command, exit_code, "command failed");
            eprintln!("error: {}", err.display_message());
            exit_code
        }
    }
}

pub(crate) async fn dispatch(
    ctx: &AppContext,
    command: Command,
    output: OutputFormat,
) -> CliResult<()> {
    match command {
        Command::Health => handle_health(ctx, output).await,
        Command::Login(args) => handle_login(ctx, args, output).await,
        Command::Register(args) => handle_register(ctx, args, output).await,
        Command::Logout => handle_logout(ctx).await,
        Command::Whoami => handle_whoami(ctx, output).await,
        Command::Services => handle_services(ctx, output).await,
        Command::Providers => handle_providers(ctx, output).await,
        Command::Slots(args) => handle_slots(ctx, args, output).await,
        Command::Book(args) => handle_book(ctx, args, output).await,
        Command::Admin(admin) => match admin {
            AdminCommand::Users(args) => handle_admin_users(ctx, args, output).await,
            AdminCommand::Audit => handle_admin_audit(ctx, output).await,
            AdminCommand::Promote(args) => handle_admin_promote(ctx, args).await,
        },
    }
}

#[derive(Parser)]
#[command(name = "temuin", about = "Book appointments on the Temuin platform")]
pub(crate) struct Cli {
    #[arg(
        long,
        global = true,
        env = "TEMUIN_API_URL",
        value_parser = parse_url,
        default_value = DEFAULT_API_URL
    )]
    pub(crate) api_url: Url,
    #[arg(
        long,
        global = true,
        env = "TEMUIN_HTTP_TIMEOUT_SECS",
        default_value_t = DEFAULT_TIMEOUT_SECS
    )]
    pub(crate) timeout: u64,
    #[arg(
        long,
        global = true,
        env = "TEMUIN_STATE_FILE",
        help = "File holding the persisted session (defaults to ~/.config/temuin/state.json)"
    )]
    pub(crate) state_file: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        env = "TEMUIN_LOG_LEVEL",
        default_value = DEFAULT_CLI_LOG_LEVEL
    )]
    pub(crate) log_level: String,
    #[arg(
        long,
        global = true,
        env = "TEMUIN_LOG_FORMAT",
        default_value = "auto",
        help = "Log format: pretty, json or auto"
    )]
    pub(crate) log_format: LogFormat,
    #[arg(
        long = "output",
        alias = "format",
        global = true,
        value_enum,
        default_value_t = OutputFormat::Table,
        help = "Select output format for commands that render structured data"
    )]
    pub(crate) output: OutputFormat,
    #[command(subcommand)]
    pub(crate) command: Command,
}

impl Cli {
    pub(crate) fn state_file(&self) -> PathBuf {
        self.state_file.clone().unwrap_or_else(default_state_file)
    }
}

fn default_state_file() -> PathBuf {
    env::var_os("HOME").map_or_else(
        || PathBuf::from(".temuin").join(STATE_FILE_NAME),
        |home| {
            PathBuf::from(home)
                .join(".config")
                .join("temuin")
                .join(STATE_FILE_NAME)
        },
    )
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Check that the backend is reachable.
    Health,
    /// Sign in with email and password.
    Login(LoginArgs),
    /// Create an account and sign in.
    Register(RegisterArgs),
    /// Clear the local session.
    Logout,
    /// Show the signed-in account.
    Whoami,
    /// List services.
    Services,
    /// List providers.
    Providers,
    /// Show open slots for a provider on a date.
    Slots(SlotsArgs),
    /// Book a slot and pay for it.
    Book(BookArgs),
    /// Administrator commands.
    #[command(subcommand)]
    Admin(AdminCommand),
}

impl Command {
    const fn label(&self) -> &'static str {
        match self {
            Self::Health => "health",
            Self::Login(_) => "login",
            Self::Register(_) => "register",
            Self::Logout => "logout",
            Self::Whoami => "whoami",
            Self::Services => "services",
            Self::Providers => "providers",
            Self::Slots(_) => "slots",
            Self::Book(_) => "book",
            Self::Admin(AdminCommand::Users(_)) => "admin_users",
            Self::Admin(AdminCommand::Audit) => "admin_audit",
            Self::Admin(AdminCommand::Promote(_)) => "admin_promote",
        }
    }
}

#[derive(Subcommand)]
pub(crate) enum AdminCommand {
    /// List accounts, optionally filtered by email or name.
    Users(AdminUsersArgs),
    /// Show the audit log.
    Audit,
    /// Promote an account to administrator.
    Promote(PromoteArgs),
}

#[derive(Args)]
pub(crate) struct LoginArgs {
    #[arg(long, env = "TEMUIN_EMAIL")]
    pub(crate) email: String,
    #[arg(long, help = "Password (prompted when omitted on a terminal)")]
    pub(crate) password: Option<String>,
}

#[derive(Args)]
pub(crate) struct RegisterArgs {
    #[arg(long)]
    pub(crate) email: String,
    #[arg(long, help = "Password (prompted when omitted on a terminal)")]
    pub(crate) password: Option<String>,
    #[arg(long)]
    pub(crate) name: Option<String>,
}

#[derive(Args)]
pub(crate) struct SlotsArgs {
    #[arg(long)]
    pub(crate) provider: String,
    #[arg(long, help = "Calendar date (YYYY-MM-DD)")]
    pub(crate) date: NaiveDate,
}

#[derive(Args)]
pub(crate) struct BookArgs {
    #[arg(long)]
    pub(crate) provider: Option<String>,
    #[arg(long, help = "Slot start as an RFC 3339 timestamp")]
    pub(crate) slot: Option<DateTime<Utc>>,
    #[arg(long, default_value = DEFAULT_CUSTOMER_NAME)]
    pub(crate) customer_name: String,
    #[arg(long, help = "Corrupt the payment secret so the gateway declines it")]
    pub(crate) force_payment_failure: bool,
}

#[derive(Args)]
pub(crate) struct AdminUsersArgs {
    #[arg(long, default_value_t = 1)]
    pub(crate) page: usize,
    #[arg(long, default_value = "")]
    pub(crate) q: String,
}

#[derive(Args)]
pub(crate) struct PromoteArgs {
    pub(crate) email: String,
    #[arg(long, help = "Skip the confirmation prompt")]
    pub(crate) yes: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum OutputFormat {
    Table,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn book_defaults_and_global_flags_parse() {
        let cli = Cli::try_parse_from([
            "temuin",
            "--api-url",
            "http://backend.test",
            "--output",
            "json",
            "book",
            "--provider",
            "p1",
            "--slot",
            "2025-05-06T09:00:00Z",
            "--force-payment-failure",
        ])
        .expect("arguments parse");
        assert_eq!(cli.api_url.as_str(), "http://backend.test/");
        assert_eq!(cli.output, OutputFormat::Json);
        let Command::Book(args) = cli.command else {
            panic!("expected book command");
        };
        assert_eq!(args.provider.as_deref(), Some("p1"));
        assert_eq!(args.customer_name, DEFAULT_CUSTOMER_NAME);
        assert!(args.force_payment_failure);
        assert!(args.slot.is_some());
    }

    #[test]
    fn admin_subcommands_parse() {
        let cli = Cli::try_parse_from(["temuin", "admin", "promote", "a@x", "--yes"])
            .expect("arguments parse");
        assert_eq!(cli.command.label(), "admin_promote");

        let cli = Cli::try_parse_from(["temuin", "admin", "users", "--q", "bob"])
            .expect("arguments parse");
        let Command::Admin(AdminCommand::Users(args)) = cli.command else {
            panic!("expected admin users");
        };
        assert_eq!(args.page, 1);
        assert_eq!(args.q, "bob");
    }

    #[test]
    fn invalid_inputs_are_rejected_by_the_parser() {
        assert!(Cli::try_parse_from(["temuin", "--api-url", "ftp://x", "health"]).is_err());
        assert!(
            Cli::try_parse_from(["temuin", "slots", "--provider", "p1", "--date", "06/05"])
                .is_err()
        );
    }

    #[test]
    fn explicit_state_file_wins() {
        let cli = Cli::try_parse_from(["temuin", "--state-file", "/tmp/s.json", "whoami"])
            .expect("arguments parse");
        assert_eq!(cli.state_file(), PathBuf::from("/tmp/s.json"));
    }
}
