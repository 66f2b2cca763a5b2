use std::env;
use std::path::PathBuf;

use offline_desk::AppConfig;
use offline_desk::cli::{self, Command};

fn print_usage() {
    eprintln!("Usage: desk [OPTIONS] <COMMAND> [ARGS]...");
    eprintln!();
    eprintln!("Records:");
    eprintln!("  add <name> <email> [--phone P] [--category C] [--note N]");
    eprintln!("      (--name N and --email E may replace the positionals)");
    eprintln!("  update <id> <name> <email> [--phone P] [--category C] [--note N]");
    eprintln!("  list [query] [--category C] [--sort KEY] [--desc]");
    eprintln!("  delete <id>");
    eprintln!();
    eprintln!("Calculator:");
    eprintln!("  calc <a> <op> <b>   op is one of + - * / ^ %");
    eprintln!("  calc sqrt <a>");
    eprintln!("  calc fact <n>");
    eprintln!("  history [--clear]");
    eprintln!();
    eprintln!("Data:");
    eprintln!("  export [json|csv|history-csv|app] [-o FILE]");
    eprintln!("  import <file>");
    eprintln!("  info | stats | clear");
    eprintln!("  cleanup [--days N] [--keep N]");
    eprintln!("  set <key> <value> | get <key>");
    eprintln!();
    eprintln!("Sync:");
    eprintln!("  endpoint <url>      Set the remote endpoint (empty string to unset)");
    eprintln!("  test                Test the remote connection");
    eprintln!("  pending [--clear]   Show or clear the pending queue");
    eprintln!("  sync                Send pending items now");
    eprintln!();
    eprintln!("Server:");
    eprintln!("  serve [--origin URL] [--host H] [--port P]");
    eprintln!("                      Run the caching proxy in front of the origin");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <FILE> Config file (default: $DESK_CONFIG or ~/.config/offline-desk/config.toml)");
    eprintln!("  -h, --help          Show this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  RUST_LOG            Log filter (default: info)");
}

fn parse_args() -> (PathBuf, Command) {
    let args: Vec<String> = env::args().skip(1).collect();

    let mut config_path = None;
    let mut rest = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-c" | "--config" => {
                i += 1;
                if i < args.len() {
                    config_path = Some(PathBuf::from(&args[i]));
                } else {
                    eprintln!("Error: --config requires a value");
                    std::process::exit(1);
                }
            }
            "-h" | "--help" if rest.is_empty() => {
                print_usage();
                std::process::exit(0);
            }
            _ => rest.push(args[i].clone()),
        }
        i += 1;
    }

    if rest.is_empty() {
        print_usage();
        std::process::exit(1);
    }

    match cli::parse(&rest) {
        Ok(command) => (config_path.unwrap_or_else(AppConfig::default_path), command),
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Run 'desk --help' for usage.");
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() -> offline_desk::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (config_path, command) = parse_args();
    let config = AppConfig::load_or_create(&config_path)?;

    cli::run(config, command).await
}
