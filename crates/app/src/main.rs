use std::fmt;

use services::AppServices;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::Command;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    MissingArgument { command: &'static str, name: &'static str },
    UnexpectedArgument { command: &'static str, raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown subcommand: {cmd}"),
            ArgsError::MissingArgument { command, name } => {
                write!(f, "{command} requires <{name}>")
            }
            ArgsError::UnexpectedArgument { command, raw } => {
                write!(f, "{command} does not take {raw:?}")
            }
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- <command> [args...] [--api <url>] [--db <sqlite_url>]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  whoami");
    eprintln!("  login <email> <password>");
    eprintln!("  logout");
    eprintln!("  send-code <email>");
    eprintln!("  register <name> <email> <password> <code>");
    eprintln!("  forgot-password <email>");
    eprintln!("  reset-password <reset-token> <password> <confirmation>");
    eprintln!("  courses");
    eprintln!("  course <course-id>");
    eprintln!("  my-courses");
    eprintln!("  enroll <course-id>");
    eprintln!("  progress <course-id>");
    eprintln!("  watch <course-id> <lecture-id>");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --api {}", services::api::DEFAULT_BASE_URL);
    eprintln!("  --db sqlite://session.sqlite3");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  COURSE_API_URL, COURSE_DB_URL, RUST_LOG");
}

struct Args {
    command: Command,
    api_url: Option<String>,
    db_url: String,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut api_url = None;
        let mut db_url = std::env::var("COURSE_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://session.sqlite3".into(), normalize_sqlite_url);
        let mut positional = Vec::new();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--api" => {
                    api_url = Some(require_value(&mut args, "--api")?);
                }
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                flag if flag.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                _ => positional.push(arg),
            }
        }

        let mut positional = positional.into_iter();
        let name = positional.next().unwrap_or_else(|| "whoami".to_string());
        let command = Command::parse(&name, positional)?;

        Ok(Self {
            command,
            api_url,
            db_url,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    if matches!(argv.first().map(String::as_str), Some("--help" | "-h" | "help")) {
        print_usage();
        return Ok(());
    }

    let parsed = Args::parse(argv.into_iter()).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    tracing::debug!(db = %parsed.db_url, "starting");

    prepare_sqlite_file(&parsed.db_url)?;
    let services = AppServices::new_sqlite(parsed.api_url.as_deref(), &parsed.db_url).await?;

    commands::execute(&services, parsed.command).await
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "app=info,services=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, ArgsError> {
        Args::parse(args.iter().map(|arg| (*arg).to_string()))
    }

    #[test]
    fn flags_may_follow_the_command() {
        let args = parse(&["watch", "c1", "L1", "--api", "http://api.test", "--db", "sqlite::memory:"])
            .unwrap();
        assert_eq!(args.api_url.as_deref(), Some("http://api.test"));
        assert_eq!(args.db_url, "sqlite::memory:");
        assert!(matches!(args.command, Command::Watch { .. }));
    }

    #[test]
    fn missing_positional_is_reported_by_name() {
        let err = parse(&["login", "ada@example.com"]).err().unwrap();
        assert_eq!(err.to_string(), "login requires <password>");
    }

    #[test]
    fn unknown_flag_is_rejected() {
        let err = parse(&["courses", "--verbose"]).err().unwrap();
        assert!(matches!(err, ArgsError::UnknownArg(_)));
    }

    #[test]
    fn relative_db_path_becomes_absolute_url() {
        let url = normalize_sqlite_url("sqlite:data/session.sqlite3".to_string());
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("data/session.sqlite3"));
    }
}
