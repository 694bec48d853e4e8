//! overspill - live text stream on a surface that restarts when full
//!
//! USAGE:
//!   overspill [--url URL]                      # interactive surface
//!   overspill stream [--temp T] [--context N]  # headless, print to stdout
//!   overspill doctor                           # check config, backend, printer
//!   overspill config set <key> <value>         # non-interactive config

use anyhow::{Context, Result};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;

use overspill::client::{self, HttpSource};
use overspill::config::{self, Config};
use overspill::logging;
use overspill::params::{GenerationRequest, LiveParams};
use overspill::printer::PrintClient;
use overspill::session::{SessionManager, Step};
use overspill::ui;

// ═══════════════════════════════════════════════════════════════
// CLI
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, PartialEq)]
enum Command {
    Interactive {
        url: Option<String>,
    },
    Stream {
        url: Option<String>,
        temperature: Option<f32>,
        context: Option<u32>,
    },
    Doctor,
    ConfigSet {
        key: String,
        value: String,
    },
    Help,
}

fn parse_args(args: &[String]) -> Result<Command> {
    if args.iter().any(|a| a == "--help" || a == "-h") {
        return Ok(Command::Help);
    }

    match args.first().map(|s| s.as_str()) {
        Some("doctor") => return Ok(Command::Doctor),
        Some("config") => {
            if args.get(1).map(|s| s.as_str()) != Some("set") {
                anyhow::bail!("Usage: overspill config set <key> <value>");
            }
            return Ok(Command::ConfigSet {
                key: args.get(2).cloned().unwrap_or_default(),
                value: args.get(3).cloned().unwrap_or_default(),
            });
        }
        _ => {}
    }

    let streaming = args.first().map(|s| s.as_str()) == Some("stream");
    let flags = if streaming { &args[1..] } else { args };

    let mut url = None;
    let mut temperature = None;
    let mut context = None;
    let mut i = 0;

    while i < flags.len() {
        match flags[i].as_str() {
            "--url" | "-u" => {
                i += 1;
                url = flags.get(i).cloned();
            }
            "--temp" | "-t" => {
                i += 1;
                let raw = flags.get(i).context("--temp needs a value")?;
                temperature = Some(raw.parse().with_context(|| format!("Invalid temperature: {}", raw))?);
            }
            "--context" | "-c" => {
                i += 1;
                let raw = flags.get(i).context("--context needs a value")?;
                context = Some(raw.parse().with_context(|| format!("Invalid context window: {}", raw))?);
            }
            other => anyhow::bail!("Unknown argument: {}", other),
        }
        i += 1;
    }

    if streaming {
        Ok(Command::Stream { url, temperature, context })
    } else {
        Ok(Command::Interactive { url })
    }
}

fn print_help() {
    println!(r#"overspill - live text stream on a surface that restarts when full

USAGE:
    overspill [--url URL]                      # interactive surface
    overspill stream [--temp T] [--context N]  # headless, print to stdout
    overspill doctor                           # check config, backend, printer
    overspill config set <key> <value>         # set config value

FLAGS:
    -u, --url <url>         Generation backend base URL
    -t, --temp <float>      Temperature for stream mode (0.7 - 2.0)
    -c, --context <int>     Context window for stream mode (1 - 25)
    -h, --help              Show this help

CONFIG:
    ~/.config/overspill/config.json    url, print-url, debounce
    ~/.local/state/overspill/          Log file

ENVIRONMENT:
    OVERSPILL_API_URL       Override backend URL from config
    OVERSPILL_PRINT_URL     Override print server URL from config
    OVERSPILL_LOG           Log filter (default: info)

CONTROLS (interactive mode):
    mouse move      Left/right: context window, up/down: temperature
    click, r, Space Restart with the current parameters
    arrows          Nudge parameters
    p               Print the surface
    Tab             Switch tabs
    q, Esc          Quit
"#);
}

// ═══════════════════════════════════════════════════════════════
// MAIN
// ═══════════════════════════════════════════════════════════════

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match parse_args(&args)? {
        Command::Help => {
            print_help();
            Ok(())
        }
        Command::ConfigSet { key, value } => run_config_set(&key, &value),
        Command::Doctor => {
            init_logging();
            run_doctor().await
        }
        Command::Stream { url, temperature, context } => {
            init_logging();
            run_stream(url, temperature, context).await
        }
        Command::Interactive { url } => {
            init_logging();
            let cfg = load_config(url)?;
            ui::run_tui(&cfg).await
        }
    }
}

/// Logging is best effort; a read-only state dir must not stop the app
fn init_logging() {
    if let Ok(dir) = config::state_dir() {
        let _ = logging::init(&dir);
    }
}

fn load_config(url: Option<String>) -> Result<Config> {
    let mut cfg = Config::load()?.with_env_overrides();
    if let Some(url) = url {
        cfg.api_url = url;
    }
    Ok(cfg)
}

// ═══════════════════════════════════════════════════════════════
// COMMANDS
// ═══════════════════════════════════════════════════════════════

async fn run_doctor() -> Result<()> {
    println!("overspill doctor\n");

    let path = config::config_path()?;
    println!("[{}] Config: {}", if path.exists() { "✓" } else { "-" }, path.display());

    let cfg = load_config(None)?;
    println!("    backend: {}", cfg.api_url);
    println!("    printer: {}", cfg.print_url);
    println!("    debounce: {}ms", cfg.debounce_ms);

    print!("[?] Backend: checking...");
    std::io::stdout().flush()?;
    match client::check_connectivity(&cfg.api_url).await {
        Ok(()) => println!("\r[✓] Backend: reachable         "),
        Err(e) => println!("\r[✗] Backend: {:#}", e),
    }

    print!("[?] Printer: checking...");
    std::io::stdout().flush()?;
    match PrintClient::new(&cfg.print_url).health().await {
        Ok(h) => println!(
            "\r[✓] Printer: {} ({})         ",
            h.status,
            h.printer.unwrap_or_else(|| "unknown model".into())
        ),
        Err(e) => println!("\r[✗] Printer: {:#}", e),
    }

    Ok(())
}

fn run_config_set(key: &str, value: &str) -> Result<()> {
    let mut cfg = Config::load()?;
    cfg.set(key, value)?;
    cfg.save()?;
    println!("Set {} = {} in {}", key, value, config::config_path()?.display());
    Ok(())
}

/// One session printed to stdout until it ends or Ctrl-C
async fn run_stream(url: Option<String>, temperature: Option<f32>, context: Option<u32>) -> Result<()> {
    let cfg = load_config(url)?;
    let defaults = LiveParams::default();
    let live = LiveParams::clamped(
        temperature.unwrap_or(defaults.temperature),
        context.unwrap_or(defaults.context_window),
    );

    let (stop_tx, mut stop_rx) = mpsc::unbounded_channel::<()>();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .context("Failed to install Ctrl-C handler")?;

    let (tx, mut rx) = mpsc::channel(256);
    let source = Arc::new(HttpSource::new(&cfg.api_url)?);
    let mut sessions = SessionManager::new(source, tx);

    eprintln!(
        "Streaming from {} (temp {:.2}, context {})\n",
        cfg.api_url, live.temperature, live.context_window
    );
    let request = GenerationRequest {
        temperature: live.temperature,
        context_window: live.context_window,
    };
    sessions.start(request, true);

    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                sessions.shutdown();
                eprintln!();
                break;
            }
            Some(delivery) = rx.recv() => match sessions.accept(delivery) {
                Some(Step::Fragment { text, .. }) => {
                    write!(stdout, "{}", text)?;
                    stdout.flush()?;
                }
                Some(Step::Ended) => {
                    eprintln!("\n[stream ended]");
                    break;
                }
                Some(Step::Failed(reason)) => anyhow::bail!("Stream failed: {}", reason),
                _ => {}
            },
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_defaults_to_interactive() {
        assert_eq!(parse_args(&[]).unwrap(), Command::Interactive { url: None });
        assert_eq!(
            parse_args(&args(&["--url", "http://gen:7860"])).unwrap(),
            Command::Interactive { url: Some("http://gen:7860".into()) }
        );
    }

    #[test]
    fn test_parse_stream_flags() {
        assert_eq!(
            parse_args(&args(&["stream", "--temp", "1.5", "-c", "12"])).unwrap(),
            Command::Stream { url: None, temperature: Some(1.5), context: Some(12) }
        );
        assert!(parse_args(&args(&["stream", "--temp", "hot"])).is_err());
        assert!(parse_args(&args(&["stream", "--context"])).is_err());
    }

    #[test]
    fn test_parse_subcommands() {
        assert_eq!(parse_args(&args(&["doctor"])).unwrap(), Command::Doctor);
        assert_eq!(parse_args(&args(&["-h"])).unwrap(), Command::Help);
        assert_eq!(
            parse_args(&args(&["config", "set", "url", "http://x"])).unwrap(),
            Command::ConfigSet { key: "url".into(), value: "http://x".into() }
        );
        assert!(parse_args(&args(&["config", "get"])).is_err());
        assert!(parse_args(&args(&["--bogus"])).is_err());
    }
}
