//! CLI mode for desk - manage records, the calculator and sync from a
//! terminal.

mod output;

use std::path::PathBuf;
use std::str::FromStr;

use serde_json::Value;

use crate::app::{Desk, SaveOutcome, SyncPass};
use crate::calc::Operation;
use crate::config::AppConfig;
use crate::export::{calculations_to_csv, records_to_csv};
use crate::format::format_number;
use crate::model::{Category, RecordInput};
use crate::store::{CleanupOptions, SearchOptions, SortKey, SortOrder};

use output::{print_history, print_pending, print_records, print_statistics, print_storage_info};

/// Calculator invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum CalcInput {
    Binary(f64, Operation, f64),
    SquareRoot(f64),
    Factorial(i64),
}

/// Export target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Full document as JSON.
    Json,
    /// Records as CSV.
    Csv,
    /// Calculator history as CSV.
    HistoryCsv,
    /// Runtime info plus the document.
    App,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "history-csv" => Ok(Self::HistoryCsv),
            "app" => Ok(Self::App),
            other => Err(format!("unknown export format: {other}")),
        }
    }
}

/// A parsed CLI command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Add(RecordInput),
    Update { id: String, input: RecordInput },
    List(Box<SearchOptions>),
    Delete(String),
    Calc(CalcInput),
    History { clear: bool },
    Export { format: ExportFormat, output: Option<PathBuf> },
    Import(PathBuf),
    Info,
    Stats,
    Cleanup(CleanupOptions),
    Clear,
    Pending { clear: bool },
    Sync,
    Endpoint(String),
    TestConnection,
    Set { key: String, value: Value },
    Get(String),
    Serve(ServeOptions),
}

/// Overrides for the `[server]` config section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServeOptions {
    pub origin: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl ServeOptions {
    fn apply(self, config: &mut AppConfig) {
        if let Some(origin) = self.origin {
            config.server.origin = origin;
        }
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
    }
}

fn take_value(args: &[String], i: &mut usize, flag: &str) -> Result<String, String> {
    *i += 1;
    args.get(*i)
        .cloned()
        .ok_or_else(|| format!("{flag} requires a value"))
}

fn parse_number<T: FromStr>(value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("not a number: {value}"))
}

/// Splits `args` into positionals and applies record flags to `input`.
fn parse_record_flags(args: &[String], input: &mut RecordInput) -> Result<Vec<String>, String> {
    let mut positional = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--name" => input.name = take_value(args, &mut i, "--name")?,
            "--email" => input.email = take_value(args, &mut i, "--email")?,
            "--phone" => input.phone = Some(take_value(args, &mut i, "--phone")?),
            "--note" => input.note = Some(take_value(args, &mut i, "--note")?),
            "--category" => {
                input.category = take_value(args, &mut i, "--category")?.parse()?;
            }
            other => positional.push(other.to_string()),
        }
        i += 1;
    }
    Ok(positional)
}

fn parse_record(args: &[String]) -> Result<(Vec<String>, RecordInput), String> {
    let mut input = RecordInput::default();
    let mut positional = parse_record_flags(args, &mut input)?;
    // Positionals fill whichever of name and email was not given as a flag,
    // taken from the end.
    if input.email.is_empty() {
        input.email = positional.pop().ok_or("missing <email>")?;
    }
    if input.name.is_empty() {
        input.name = positional.pop().ok_or("missing <name>")?;
    }
    Ok((positional, input))
}

fn parse_list(args: &[String]) -> Result<SearchOptions, String> {
    let mut options = SearchOptions::new();
    let mut order = SortOrder::Asc;
    let mut sort = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--category" => {
                let category: Category = take_value(args, &mut i, "--category")?.parse()?;
                options = options.with_category(category);
            }
            "--sort" => sort = Some(take_value(args, &mut i, "--sort")?.parse::<SortKey>()?),
            "--desc" => order = SortOrder::Desc,
            query => options = options.with_query(query),
        }
        i += 1;
    }
    if let Some(key) = sort {
        options = options.sorted_by(key, order);
    }
    Ok(options)
}

fn parse_calc(args: &[String]) -> Result<CalcInput, String> {
    match args {
        [op, a] if op == "sqrt" => Ok(CalcInput::SquareRoot(parse_number(a)?)),
        [op, n] if op == "fact" => Ok(CalcInput::Factorial(parse_number(n)?)),
        [a, op, b] => {
            let op: Operation = op.parse().map_err(|e| format!("{e}"))?;
            Ok(CalcInput::Binary(parse_number(a)?, op, parse_number(b)?))
        }
        _ => Err("expected <a> <op> <b>, sqrt <a> or fact <n>".to_string()),
    }
}

fn parse_export(args: &[String]) -> Result<Command, String> {
    let mut format = ExportFormat::Json;
    let mut output = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-o" | "--output" => output = Some(PathBuf::from(take_value(args, &mut i, "--output")?)),
            other => format = other.parse()?,
        }
        i += 1;
    }
    Ok(Command::Export { format, output })
}

fn parse_cleanup(args: &[String]) -> Result<CleanupOptions, String> {
    let mut options = CleanupOptions::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--days" => options.older_than_days = parse_number(&take_value(args, &mut i, "--days")?)?,
            "--keep" => {
                options.max_calculations = parse_number(&take_value(args, &mut i, "--keep")?)?;
            }
            other => return Err(format!("unknown option: {other}")),
        }
        i += 1;
    }
    Ok(options)
}

fn parse_serve(args: &[String]) -> Result<ServeOptions, String> {
    let mut options = ServeOptions::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--origin" => options.origin = Some(take_value(args, &mut i, "--origin")?),
            "--host" => options.host = Some(take_value(args, &mut i, "--host")?),
            "--port" => options.port = Some(parse_number(&take_value(args, &mut i, "--port")?)?),
            other => return Err(format!("unknown option: {other}")),
        }
        i += 1;
    }
    Ok(options)
}

/// Setting values are taken as JSON when they parse, as a string otherwise.
fn parse_setting_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Parses the command line after the program name and global flags.
///
/// # Errors
///
/// Returns a message suitable for the user when the arguments are invalid.
pub fn parse(args: &[String]) -> Result<Command, String> {
    let Some((name, rest)) = args.split_first() else {
        return Err("no command given".to_string());
    };
    let flag = |f: &str| rest.iter().any(|a| a == f);

    match name.as_str() {
        "add" => {
            let (extra, input) = parse_record(rest)?;
            if let Some(arg) = extra.first() {
                return Err(format!("unexpected argument: {arg}"));
            }
            Ok(Command::Add(input))
        }
        "update" => {
            let (extra, input) = parse_record(rest)?;
            match extra.as_slice() {
                [id] => Ok(Command::Update {
                    id: id.clone(),
                    input,
                }),
                _ => Err("expected <id> <name> <email>".to_string()),
            }
        }
        "list" => Ok(Command::List(Box::new(parse_list(rest)?))),
        "delete" => match rest {
            [id] => Ok(Command::Delete(id.clone())),
            _ => Err("expected <id>".to_string()),
        },
        "calc" => Ok(Command::Calc(parse_calc(rest)?)),
        "history" => Ok(Command::History {
            clear: flag("--clear"),
        }),
        "export" => parse_export(rest),
        "import" => match rest {
            [path] => Ok(Command::Import(PathBuf::from(path))),
            _ => Err("expected <file>".to_string()),
        },
        "info" => Ok(Command::Info),
        "stats" => Ok(Command::Stats),
        "cleanup" => Ok(Command::Cleanup(parse_cleanup(rest)?)),
        "clear" => Ok(Command::Clear),
        "pending" => Ok(Command::Pending {
            clear: flag("--clear"),
        }),
        "sync" => Ok(Command::Sync),
        "endpoint" => match rest {
            [url] => Ok(Command::Endpoint(url.clone())),
            _ => Err("expected <url>".to_string()),
        },
        "test" => Ok(Command::TestConnection),
        "set" => match rest {
            [key, value] => Ok(Command::Set {
                key: key.clone(),
                value: parse_setting_value(value),
            }),
            _ => Err("expected <key> <value>".to_string()),
        },
        "get" => match rest {
            [key] => Ok(Command::Get(key.clone())),
            _ => Err("expected <key>".to_string()),
        },
        "serve" => Ok(Command::Serve(parse_serve(rest)?)),
        other => Err(format!("unknown command: {other}")),
    }
}

fn describe(outcome: SaveOutcome) -> &'static str {
    match outcome {
        SaveOutcome::Synced => "saved and synced",
        SaveOutcome::Queued => "saved offline, will sync when back online",
        SaveOutcome::SyncFailed => "saved locally, sync failed",
        SaveOutcome::LocalOnly => "saved",
    }
}

fn write_or_print(output: Option<PathBuf>, contents: &str) -> crate::Result<()> {
    match output {
        Some(path) => {
            std::fs::write(&path, contents)?;
            println!("Exported to {}", path.display());
        }
        None => println!("{contents}"),
    }
    Ok(())
}

/// Runs `command` against the desk described by `config`.
///
/// # Errors
///
/// Returns an error if the command fails; validation and calculator errors
/// are reported as such.
pub async fn run(mut config: AppConfig, command: Command) -> crate::Result<()> {
    if let Command::Serve(options) = &command {
        options.clone().apply(&mut config);
    }
    let desk = Desk::open(&config)?;

    match command {
        Command::Add(input) => {
            let (record, outcome) = desk.save_record(input).await?;
            println!("{} {}", record.id, describe(outcome));
        }
        Command::Update { id, input } => match desk.update_record(&id, input).await? {
            Some((record, outcome)) => println!("{} {}", record.id, describe(outcome)),
            None => println!("No record with id {id}"),
        },
        Command::List(options) => print_records(&desk.store().advanced_search(&options)),
        Command::Delete(id) => {
            if desk.delete_record(&id)? {
                println!("Deleted {id}");
            } else {
                println!("No record with id {id}");
            }
        }
        Command::Calc(input) => {
            let calc = match input {
                CalcInput::Binary(a, op, b) => desk.calculate(a, op, b)?,
                CalcInput::SquareRoot(a) => desk.square_root(a)?,
                CalcInput::Factorial(n) => desk.factorial(n)?,
            };
            println!("{} = {}", calc.expression, format_number(calc.result));
        }
        Command::History { clear: true } => {
            desk.store().clear_calculation_history()?;
            println!("History cleared.");
        }
        Command::History { clear: false } => print_history(&desk.store().calculation_history()),
        Command::Export { format, output } => {
            let store = desk.store();
            let contents = match format {
                ExportFormat::Json => store.export_json()?,
                ExportFormat::Csv => records_to_csv(&store.all_records()),
                ExportFormat::HistoryCsv => calculations_to_csv(&store.calculation_history()),
                ExportFormat::App => serde_json::to_string_pretty(&desk.export_app_data()?)?,
            };
            write_or_print(output, &contents)?;
        }
        Command::Import(path) => {
            let json = std::fs::read_to_string(&path)?;
            desk.store().import_json(&json)?;
            println!("Imported {}", path.display());
        }
        Command::Info => {
            let info = desk.app_info();
            println!("{} v{} on {}", env!("CARGO_PKG_NAME"), info.version, info.platform);
            println!(
                "Sync: {}",
                if info.sync_configured {
                    desk.sync_client().endpoint()
                } else {
                    "not configured".to_string()
                }
            );
            if let Some(storage) = desk.store().storage_info() {
                print_storage_info(&storage);
            }
        }
        Command::Stats => match desk.store().statistics() {
            Some(stats) => print_statistics(&stats),
            None => println!("No data."),
        },
        Command::Cleanup(options) => {
            if desk.store().cleanup(options)? {
                println!("Cleanup done.");
            }
        }
        Command::Clear => {
            desk.store().clear_all()?;
            println!("All data cleared.");
        }
        Command::Pending { clear: true } => {
            desk.store().clear_pending_sync()?;
            println!("Pending queue cleared.");
        }
        Command::Pending { clear: false } => print_pending(&desk.store().pending_sync()),
        Command::Sync => match desk.sync_pending().await? {
            SyncPass::Drained(count) => println!("Synced {count} item(s)."),
            SyncPass::Delegated => println!("Sync handed to the cache worker."),
            SyncPass::Skipped => println!("Nothing to sync."),
        },
        Command::Endpoint(url) => {
            desk.configure_endpoint(&url)?;
            println!("Endpoint set.");
        }
        Command::TestConnection => {
            let response = desk.test_connection().await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Set { key, value } => desk.store().save_setting(&key, value)?,
        Command::Get(key) => match desk.store().load_setting(&key) {
            Some(value) => println!("{value}"),
            None => println!("(unset)"),
        },
        Command::Serve(_) => serve(&config, desk).await?,
    }
    Ok(())
}

#[cfg(feature = "server")]
async fn serve(config: &AppConfig, mut desk: Desk) -> crate::Result<()> {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use crate::worker::{
        CacheStore, CacheWorker, DiskCacheStore, HttpFetcher, RegisterOutcome, WorkerHandle,
    };

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.sync.timeout_secs))
        .build()?;
    let fetcher = Arc::new(HttpFetcher::new(http, config.server.origin.clone()));
    let cache_dir = config
        .worker
        .cache_dir
        .clone()
        .unwrap_or_else(|| config.storage.data_dir.join("caches"));
    let caches: Arc<dyn CacheStore> = Arc::new(DiskCacheStore::new(cache_dir));

    let handle = WorkerHandle::spawn(Some(desk.background_sync_hook()));
    desk.attach_worker(handle.clone());

    let worker = CacheWorker::new(config.worker.clone(), fetcher, caches);
    match handle.register(worker).await? {
        RegisterOutcome::Activated => log::info!("Cache worker {} active", config.worker.cache_name()),
        RegisterOutcome::Waiting => log::info!("Cache worker waiting"),
        RegisterOutcome::Failed => log::warn!("Cache worker install failed, serving without it"),
    }

    let mut events = handle.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            log::info!("Worker event: {event:?}");
        }
    });

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Shutting down");
            token.cancel();
        }
    });

    crate::server::serve(handle, &config.server.host, config.server.port, shutdown).await
}

#[cfg(not(feature = "server"))]
async fn serve(_config: &AppConfig, _desk: Desk) -> crate::Result<()> {
    eprintln!("Server support not compiled in");
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn parses_add_with_flags() {
        let Command::Add(input) =
            parse(&args("add Somchai somchai@example.com --phone 0812345678 --category work"))
                .unwrap()
        else {
            panic!("expected add");
        };
        assert_eq!(input.name, "Somchai");
        assert_eq!(input.email, "somchai@example.com");
        assert_eq!(input.phone.as_deref(), Some("0812345678"));
        assert_eq!(input.category, Category::Work);
    }

    #[test]
    fn add_requires_name_and_email() {
        assert!(parse(&args("add Somchai")).is_err());
        assert!(parse(&args("add a b c")).is_err());
        assert!(parse(&args("add a b --category alien")).is_err());
    }

    #[test]
    fn name_and_email_as_flags() {
        let Command::Add(input) =
            parse(&args("add --name Ann --email ann@example.com --note hi")).unwrap()
        else {
            panic!("expected add");
        };
        assert_eq!(input.name, "Ann");
        assert_eq!(input.email, "ann@example.com");
        assert_eq!(input.note.as_deref(), Some("hi"));
    }

    #[test]
    fn serve_overrides_config() {
        let Command::Serve(options) =
            parse(&args("serve --origin http://localhost:3000 --port 8000")).unwrap()
        else {
            panic!("expected serve");
        };
        let mut config = AppConfig::default();
        options.apply(&mut config);
        assert_eq!(config.server.origin, "http://localhost:3000");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(parse(&args("serve --port http")).is_err());
    }

    #[test]
    fn parses_update() {
        let Command::Update { id, input } = parse(&args("update 42 Ann ann@example.com")).unwrap()
        else {
            panic!("expected update");
        };
        assert_eq!(id, "42");
        assert_eq!(input.name, "Ann");
    }

    #[test]
    fn parses_calc_forms() {
        assert_eq!(
            parse(&args("calc 5 + 3")).unwrap(),
            Command::Calc(CalcInput::Binary(5.0, Operation::Add, 3.0))
        );
        assert_eq!(
            parse(&args("calc sqrt 16")).unwrap(),
            Command::Calc(CalcInput::SquareRoot(16.0))
        );
        assert_eq!(
            parse(&args("calc fact 5")).unwrap(),
            Command::Calc(CalcInput::Factorial(5))
        );
        assert!(parse(&args("calc 5 ? 3")).is_err());
        assert!(parse(&args("calc five + 3")).is_err());
    }

    #[test]
    fn parses_list_options() {
        let Command::List(options) =
            parse(&args("list ann --category personal --sort name --desc")).unwrap()
        else {
            panic!("expected list");
        };
        assert_eq!(options.query.as_deref(), Some("ann"));
        assert_eq!(options.category, Some(Category::Personal));
        assert_eq!(options.sort_by, Some(SortKey::Name));
        assert_eq!(options.sort_order, SortOrder::Desc);
    }

    #[test]
    fn parses_export_and_cleanup() {
        assert_eq!(
            parse(&args("export csv -o out.csv")).unwrap(),
            Command::Export {
                format: ExportFormat::Csv,
                output: Some(PathBuf::from("out.csv")),
            }
        );
        assert!(parse(&args("export xml")).is_err());

        let Command::Cleanup(options) = parse(&args("cleanup --days 30 --keep 10")).unwrap() else {
            panic!("expected cleanup");
        };
        assert_eq!(options.older_than_days, 30);
        assert_eq!(options.max_calculations, 10);
    }

    #[test]
    fn setting_values_prefer_json() {
        assert_eq!(
            parse(&args("set theme dark")).unwrap(),
            Command::Set {
                key: "theme".to_string(),
                value: Value::String("dark".to_string()),
            }
        );
        assert_eq!(
            parse(&args("set notifications false")).unwrap(),
            Command::Set {
                key: "notifications".to_string(),
                value: Value::Bool(false),
            }
        );
    }

    #[test]
    fn rejects_unknown_command() {
        assert!(parse(&args("frobnicate")).is_err());
        assert!(parse(&[]).is_err());
    }
}
