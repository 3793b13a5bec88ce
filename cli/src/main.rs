use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use sqlstencil_core::{Param, TemplateDocument, Value, compile};
use sqlstencil_db::DEFAULT_BUSY_TIMEOUT_MS;
use sqlstencil_sqlite::{
    MigrationReport, MigrationStatus, Migrator, RetentionPolicy, RetentionRules, Session,
    TableSnapshot, open_session, optimize, snapshot_tables, update_database_file_with,
};
use tracing::Level;

/// Log level accepted by `--verbosity`.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Verbosity {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<Verbosity> for Level {
    fn from(verbosity: Verbosity) -> Self {
        match verbosity {
            Verbosity::Error => Level::ERROR,
            Verbosity::Warn => Level::WARN,
            Verbosity::Info => Level::INFO,
            Verbosity::Debug => Level::DEBUG,
            Verbosity::Trace => Level::TRACE,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "sqlstencil")]
#[command(about = "Render SQL templates and upgrade SQLite database files")]
struct Cli {
    /// Log verbosity written to stderr.
    #[arg(long, global = true, value_enum, default_value = "warn")]
    verbosity: Verbosity,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compile one query of a template file and print the SQL.
    Render(RenderArgs),
    /// Print the user_version and tables of a database file.
    Status(StatusArgs),
    /// Print whether the new file has a higher user_version than the old one.
    NeedsUpdate(NeedsUpdateArgs),
    /// Copy rows from an old database file into a newer schema and replace it.
    Migrate(MigrateArgs),
    /// Compact a database file with VACUUM.
    Optimize(OptimizeArgs),
}

#[derive(Debug, Args)]
struct RenderArgs {
    /// Template file (XML-style markup).
    #[arg(long)]
    template: PathBuf,
    /// Query id inside the template.
    #[arg(long)]
    query: String,
    /// Parameter as `name=value`, `name:int=5`, `name:real=1.5`,
    /// `name:bool=true`, `name:blob=0aff` or `name:null`. Repeatable.
    #[arg(long = "param")]
    params: Vec<String>,
}

#[derive(Debug, Args)]
struct StatusArgs {
    /// Database file to inspect.
    #[arg(long)]
    db: PathBuf,
    /// Print JSON instead of text.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct NeedsUpdateArgs {
    /// Database file currently in use.
    #[arg(long)]
    old: PathBuf,
    /// Freshly created database file with the new schema.
    #[arg(long)]
    new: PathBuf,
}

#[derive(Debug, Args)]
struct MigrateArgs {
    /// Database file currently in use; replaced on success.
    #[arg(long)]
    old: PathBuf,
    /// Freshly created database file with the new schema.
    #[arg(long)]
    new: PathBuf,
    /// YAML retention policy.
    #[arg(long)]
    policy: Option<PathBuf>,
    /// Keep the new file when nothing was migrated.
    #[arg(long)]
    keep_new: bool,
    /// Print the report as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct OptimizeArgs {
    /// Database file to compact.
    #[arg(long)]
    db: PathBuf,
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbosity);

    let result = match cli.command {
        Command::Render(args) => run_render(args),
        Command::Status(args) => run_status(args),
        Command::NeedsUpdate(args) => run_needs_update(args),
        Command::Migrate(args) => run_migrate(args),
        Command::Optimize(args) => run_optimize(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn setup_logging(verbosity: Verbosity) {
    tracing_subscriber::fmt()
        .with_max_level(Level::from(verbosity))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_render(args: RenderArgs) -> Result<(), String> {
    let text = fs::read_to_string(&args.template)
        .map_err(|e| format!("Failed to read template '{}': {e}", args.template.display()))?;
    let document = TemplateDocument::parse(&text)
        .map_err(|e| format!("Malformed template '{}': {e}", args.template.display()))?;
    let params = args
        .params
        .iter()
        .map(String::as_str)
        .map(parse_param)
        .collect::<Result<Vec<_>, _>>()?;

    let query = compile(&document, &args.query, &params)
        .map_err(|e| format!("Failed to compile '{}': {e}", args.query))?;
    println!("{}", query.sql());
    for key in query.select_keys() {
        let sql = match key.sql() {
            "" => sqlstencil_core::DEFAULT_SELECT_KEY_SQL,
            sql => sql,
        };
        println!("-- selectKey: {sql}");
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct StatusReport<'a> {
    database: &'a Path,
    user_version: i64,
    tables: Vec<TableSnapshot>,
}

fn run_status(args: StatusArgs) -> Result<(), String> {
    let session = open_read_only(&args.db)?;
    let user_version = session
        .user_version()
        .map_err(|e| format!("Failed to read user_version: {e}"))?;
    let tables = snapshot_tables(&session).map_err(|e| format!("Failed to read tables: {e}"))?;
    let report = StatusReport {
        database: &args.db,
        user_version,
        tables,
    };

    if args.json {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| format!("Failed to serialize status: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    println!("Database: {}", report.database.display());
    println!("  user_version: {}", report.user_version);
    println!("  Tables: {}", report.tables.len());
    for table in &report.tables {
        println!(
            "    {} ({} rows): {}",
            table.name,
            table.row_count,
            table.columns.join(", ")
        );
    }
    Ok(())
}

fn run_needs_update(args: NeedsUpdateArgs) -> Result<(), String> {
    let old = open_read_only(&args.old)?;
    let new = open_read_only(&args.new)?;
    let needed = Migrator::new(&old, &new)
        .needs_update()
        .map_err(|e| format!("Failed to compare versions: {e}"))?;
    println!("{}", if needed { "yes" } else { "no" });
    Ok(())
}

fn run_migrate(args: MigrateArgs) -> Result<(), String> {
    let rules = args
        .policy
        .as_ref()
        .map(|path| {
            RetentionRules::load(path)
                .map_err(|e| format!("Failed to load policy '{}': {e}", path.display()))
        })
        .transpose()?;
    let policy = rules.as_ref().map(|r| r as &dyn RetentionPolicy);

    let report = update_database_file_with(&args.old, &args.new, policy, args.keep_new)
        .map_err(|e| format!("Migration failed: {e}"))?;

    if args.json {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| format!("Failed to serialize report: {e}"))?;
        println!("{json}");
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &MigrationReport) {
    match report.status {
        MigrationStatus::UpToDate => {
            println!(
                "Database is up to date (old version {}, new version {}).",
                report.old_version, report.new_version
            );
        }
        MigrationStatus::Migrated => {
            println!(
                "Migration complete (version {} -> {}):",
                report.old_version, report.new_version
            );
            println!("  Tables migrated: {}", report.tables);
            println!("  Rows inserted: {}", report.inserted);
            println!("  Rows updated: {}", report.updated);
            println!("  Rows skipped: {}", report.skipped);
            if !report.skipped_tables.is_empty() {
                println!("  Tables skipped: {}", report.skipped_tables.join(", "));
            }
            println!("  Committed: {}", if report.committed { "yes" } else { "no" });
        }
    }
}

fn run_optimize(args: OptimizeArgs) -> Result<(), String> {
    if !args.db.exists() {
        return Err(format!("Database '{}' does not exist", args.db.display()));
    }
    let session = open_session(&args.db, false, busy_timeout())
        .map_err(|e| format!("Failed to open database '{}': {e}", args.db.display()))?;
    optimize(&session).map_err(|e| format!("Optimize failed: {e}"))?;
    println!("Optimized '{}'.", args.db.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn busy_timeout() -> Duration {
    Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS)
}

fn open_read_only(path: &Path) -> Result<Session, String> {
    open_session(path, true, busy_timeout())
        .map_err(|e| format!("Failed to open database '{}': {e}", path.display()))
}

/// Parses `name=value`, `name:type=value` or `name:null`.
fn parse_param(arg: &str) -> Result<Param, String> {
    let (head, raw) = match arg.split_once('=') {
        Some((head, raw)) => (head, Some(raw)),
        None => (arg, None),
    };
    let (name, kind) = match head.split_once(':') {
        Some((name, kind)) => (name.trim(), kind.trim()),
        None => (head.trim(), "text"),
    };
    if name.is_empty() {
        return Err(format!("Parameter '{arg}' has no name"));
    }

    let value = match (kind, raw) {
        ("null", _) => Value::Null,
        (_, None) => return Err(format!("Parameter '{arg}' has no value")),
        ("text" | "str", Some(raw)) => Value::Text(raw.to_string()),
        ("int", Some(raw)) => raw
            .trim()
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|e| format!("Parameter '{name}': {e}"))?,
        ("real", Some(raw)) => raw
            .trim()
            .parse::<f64>()
            .map(Value::Real)
            .map_err(|e| format!("Parameter '{name}': {e}"))?,
        ("bool", Some(raw)) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Value::Bool(true),
            "false" | "0" => Value::Bool(false),
            other => return Err(format!("Parameter '{name}': '{other}' is not a boolean")),
        },
        ("blob", Some(raw)) => Value::Blob(parse_hex(raw).ok_or_else(|| {
            format!("Parameter '{name}': '{raw}' is not an even-length hex string")
        })?),
        (other, Some(_)) => return Err(format!("Parameter '{name}': unknown type '{other}'")),
    };
    Ok(Param::new(name, value))
}

fn parse_hex(raw: &str) -> Option<Vec<u8>> {
    let raw = raw.trim();
    if raw.len() % 2 != 0 {
        return None;
    }
    (0..raw.len())
        .step_by(2)
        .map(|i| raw.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{parse_hex, parse_param};
    use sqlstencil_core::Value;

    #[test]
    fn test_parse_param_defaults_to_text() {
        let param = parse_param("name=O'Brien").unwrap();
        assert_eq!(param.name(), "name");
        assert_eq!(param.value(), &Value::Text("O'Brien".into()));
    }

    #[test]
    fn test_parse_param_keeps_equals_in_value() {
        let param = parse_param("expr=a=b").unwrap();
        assert_eq!(param.value(), &Value::Text("a=b".into()));
    }

    #[test]
    fn test_parse_param_typed_values() {
        assert_eq!(parse_param("n:int=5").unwrap().value(), &Value::Integer(5));
        assert_eq!(parse_param("r:real=1.5").unwrap().value(), &Value::Real(1.5));
        assert_eq!(parse_param("b:bool=TRUE").unwrap().value(), &Value::Bool(true));
        assert_eq!(parse_param("x:null").unwrap().value(), &Value::Null);
        assert_eq!(
            parse_param("d:blob=0aff").unwrap().value(),
            &Value::Blob(vec![0x0a, 0xff])
        );
    }

    #[test]
    fn test_parse_param_rejects_bad_input() {
        assert!(parse_param("=5").is_err());
        assert!(parse_param("n:int=five").is_err());
        assert!(parse_param("n:bool=maybe").is_err());
        assert!(parse_param("n:date=2024").is_err());
        assert!(parse_param("n").is_err());
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("00FF"), Some(vec![0, 255]));
        assert_eq!(parse_hex("abc"), None);
        assert_eq!(parse_hex("zz"), None);
    }
}
