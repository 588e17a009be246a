use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use proxy_pulse::{
    proxy::export, CheckerSettings, Proxy, ProxyChecker, ProxyParser, ProxyStatus, ProxyType,
    ProxyVerifier, VerifyClient, DEFAULT_API_URL,
};
use proxy_pulse::tui::ProxyCheckerApp;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

/// A batched, pausable proxy checker with multi-threading support
#[derive(Parser)]
#[command(name = "proxy-pulse")]
#[command(about = "A batched, pausable proxy checker with multi-threading support")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse proxies from a file
    Parse {
        /// Input file containing proxies
        input: PathBuf,
        /// Output file for parsed proxies
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Default proxy type for lines without a scheme (http, https, socks4, socks5)
        #[arg(short = 't', long, default_value = "http")]
        proxy_type: String,
    },
    /// Check proxies and export the working ones
    Check {
        /// Input file containing proxies
        input: PathBuf,
        /// Default proxy type for lines without a scheme (http, https, socks4, socks5)
        #[arg(short = 't', long, default_value = "http")]
        proxy_type: String,
        /// Number of concurrent checks
        #[arg(short = 'n', long, default_value = "10")]
        threads: usize,
        /// Timeout in seconds per proxy
        #[arg(long, default_value = "10")]
        timeout: u64,
        /// Number of proxies per batch
        #[arg(long, default_value = "50")]
        batch_size: usize,
        /// Verification endpoint URL
        #[arg(long, default_value = DEFAULT_API_URL)]
        api_url: String,
        /// Write working proxies as CSV to this file
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Write working proxies as JSON to this file
        #[arg(long)]
        json: Option<PathBuf>,
        /// Ring the terminal bell when the check completes
        #[arg(long)]
        bell: bool,
    },
    /// Start the interactive checker TUI
    Tui {
        /// Input file containing proxies
        input: PathBuf,
        /// Default proxy type for lines without a scheme (http, https, socks4, socks5)
        #[arg(short = 't', long, default_value = "http")]
        proxy_type: String,
        /// Number of concurrent checks
        #[arg(short = 'n', long, default_value = "10")]
        threads: usize,
        /// Timeout in seconds per proxy
        #[arg(long, default_value = "10")]
        timeout: u64,
        /// Number of proxies per batch
        #[arg(long, default_value = "50")]
        batch_size: usize,
        /// Verification endpoint URL
        #[arg(long, default_value = DEFAULT_API_URL)]
        api_url: String,
        /// Disable the completion bell
        #[arg(long)]
        quiet: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Parse {
            input,
            output,
            proxy_type,
        } => {
            let ptype = parse_proxy_type(&proxy_type)?;
            let proxies = ProxyParser::parse_file(&input, ptype)?;

            println!("Parsed {} proxies from {:?}", proxies.len(), input);

            if let Some(output_path) = output {
                ProxyParser::save_to_file(&proxies, &output_path)?;
                println!("Saved parsed proxies to {:?}", output_path);
            } else {
                for proxy in &proxies {
                    println!("{}", proxy.url());
                }
            }
        }
        Commands::Check {
            input,
            proxy_type,
            threads,
            timeout,
            batch_size,
            api_url,
            csv,
            json,
            bell,
        } => {
            let ptype = parse_proxy_type(&proxy_type)?;
            let proxies = ProxyParser::parse_file(&input, ptype)?;

            println!("Loaded {} proxies from {:?}", proxies.len(), input);
            println!(
                "Checking with {} threads, timeout: {}s, batch size: {}",
                threads, timeout, batch_size
            );
            println!();

            let settings = CheckerSettings::new()
                .with_threads(threads)
                .with_timeout_secs(timeout)
                .with_batch_size(batch_size)
                .with_sound_notification(bell);

            let verifier: Arc<dyn ProxyVerifier> = Arc::new(VerifyClient::new(api_url));
            let checker =
                ProxyChecker::new(proxies, settings.clone(), verifier, |_proxies, progress| {
                    log::debug!("progress: {:.1}%", progress);
                });
            checker.start().await;

            let results = checker.proxies();
            let valid: Vec<&Proxy> = results
                .iter()
                .filter(|p| p.status == ProxyStatus::Valid)
                .collect();
            let invalid_count = results
                .iter()
                .filter(|p| p.status == ProxyStatus::Invalid)
                .count();

            println!("Results: {} valid, {} invalid", valid.len(), invalid_count);

            if !valid.is_empty() {
                println!("\nWorking proxies:");
                for proxy in &valid {
                    match (proxy.speed_ms, proxy.rating) {
                        (Some(speed), Some(rating)) => println!(
                            "  {} ({}ms, {}/5{})",
                            proxy.to_simple_string(),
                            speed,
                            rating,
                            proxy
                                .country_code
                                .as_deref()
                                .map(|code| format!(", {}", code))
                                .unwrap_or_default()
                        ),
                        _ => println!("  {}", proxy.to_simple_string()),
                    }
                }
            }

            if let Some(csv_path) = csv {
                fs::write(&csv_path, export::to_csv(&results))?;
                println!("Saved CSV report to {:?}", csv_path);
            }

            if let Some(json_path) = json {
                fs::write(&json_path, export::to_json(&results)?)?;
                println!("Saved JSON report to {:?}", json_path);
            }

            if settings.sound_notification {
                print!("\x07");
                io::stdout().flush()?;
            }
        }
        Commands::Tui {
            input,
            proxy_type,
            threads,
            timeout,
            batch_size,
            api_url,
            quiet,
        } => {
            let ptype = parse_proxy_type(&proxy_type)?;
            let proxies = ProxyParser::parse_file(&input, ptype)?;
            if proxies.is_empty() {
                return Err(anyhow!("No proxies found in {:?}", input));
            }

            let settings = CheckerSettings::new()
                .with_threads(threads)
                .with_timeout_secs(timeout)
                .with_batch_size(batch_size)
                .with_sound_notification(!quiet);

            let mut app = ProxyCheckerApp::new(proxies, settings, api_url);
            app.run().await?;
        }
    }

    Ok(())
}

fn parse_proxy_type(s: &str) -> Result<ProxyType> {
    match s.to_lowercase().as_str() {
        "http" => Ok(ProxyType::Http),
        "https" => Ok(ProxyType::Https),
        "socks4" => Ok(ProxyType::Socks4),
        "socks5" => Ok(ProxyType::Socks5),
        _ => Err(anyhow!(
            "Invalid proxy type: {}. Use: http, https, socks4, socks5",
            s
        )),
    }
}
