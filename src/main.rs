use anyhow::Result;
use chrono::Local;
use clap::Parser;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cnpjfinder::browser_pool::BrowserSession;
use cnpjfinder::cli::{Args, Cli};
use cnpjfinder::collector::{Collector, StopReason};
use cnpjfinder::company::SearchParams;
use cnpjfinder::config::{self, AppConfig};
use cnpjfinder::export;
use cnpjfinder::identifier::SearchRecovery;
use cnpjfinder::logger::{CollectionLogger, VerbosityLevel};
use cnpjfinder::maps::ChromeMaps;
use cnpjfinder::registry::RegistryClient;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let args = Args::from(&cli);

    // Handle --init flag first (before any other processing)
    if args.init {
        match AppConfig::create_default_config() {
            Ok(path) => {
                println!("✅ Created default configuration file at: {}", path.display());
                println!("   Edit this file to customize settings, then run cnpjfinder again.");
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("❌ Failed to create configuration file: {}", e);
                std::process::exit(1);
            }
        }
    }

    let mut app_config = match AppConfig::load() {
        Ok(cfg) => cfg,
        Err(config::ConfigError::FileNotFound(path)) => match AppConfig::prompt_create_config() {
            Ok(Some(created_path)) => {
                println!("✅ Created default configuration file at: {}", created_path.display());
                println!("   Edit this file to customize settings, then run cnpjfinder again.");
                std::process::exit(0);
            }
            Ok(None) => {
                eprintln!("❌ Configuration file not found at: {}", path.display());
                eprintln!("   Run with --init to create a default configuration file.");
                std::process::exit(1);
            }
            Err(e) => {
                eprintln!("❌ Failed to create configuration file: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("❌ Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if args.show_browser {
        app_config.browser.headless = false;
    }
    if let Some(ref chrome_path) = args.chrome_path {
        app_config.browser.chrome_path = chrome_path.clone();
    }

    // -vv also surfaces the library's tracing output
    if args.verbose >= 2 {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cnpjfinder=debug")),
            )
            .with_writer(std::io::stderr)
            .try_init();
    }

    let verbosity = VerbosityLevel::from_flags(args.quiet, args.verbose);
    let logger = match &args.log_file {
        Some(log_file_path) => CollectionLogger::with_log_file(verbosity, log_file_path.clone()),
        None => CollectionLogger::new(verbosity),
    };

    if let Err(e) = args.validate() {
        logger.error(&format!("Invalid arguments: {}", e));
        std::process::exit(2);
    }

    let output_format = match args.get_output_format() {
        Ok(format) => format,
        Err(e) => {
            logger.error(&format!("Invalid arguments: {}", e));
            std::process::exit(2);
        }
    };

    // Prompts must finish before the progress bar takes over the terminal
    let params = match resolve_search_params(&args) {
        Ok(params) => params,
        Err(e) => {
            logger.error(&format!("Invalid arguments: {}", e));
            std::process::exit(2);
        }
    };

    // First Ctrl-C stops the run after the current candidate; a second one exits immediately
    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || {
        if handler_flag.swap(true, Ordering::SeqCst) {
            eprintln!("\n⚠️  Force exiting. Chrome may still be running and need to be closed by hand.");
            std::process::exit(130);
        }
        eprintln!("\n⚠️  Interrupt received. Finishing the current company and saving partial results...");
    })
    .unwrap_or_else(|e| {
        eprintln!("⚠️  Warning: Failed to set Ctrl-C handler: {}. Interrupt signals may not be handled gracefully.", e);
    });

    let registry = match RegistryClient::new(&app_config.http, &app_config.registry, &app_config.retry) {
        Ok(client) => client,
        Err(e) => {
            logger.error(&format!("Failed to initialize registry client: {}", e));
            std::process::exit(1);
        }
    };

    logger.log_run_start(&params);
    logger.start_progress(params.target_count as u64).await;

    let session = match BrowserSession::launch(&app_config.browser) {
        Ok(session) => session,
        Err(e) => {
            logger.finish_progress("Browser could not be started").await;
            logger.error(&format!("{:#}", e));
            logger.error("Install Chrome/Chromium or point CHROME_PATH / --chrome-path at the binary.");
            finish_logs(&logger, &args);
            std::process::exit(1);
        }
    };

    let result = {
        let maps = ChromeMaps::new(&session, &app_config.maps);
        let recovery = SearchRecovery::new(&session, &app_config.search);
        let collector = Collector::new(&maps, &recovery, &registry, &logger, &app_config, cancel.clone());
        collector.run(&params).await
    };

    if let Err(e) = session.release() {
        logger.error(&format!("Failed to release browser session: {:#}", e));
    }

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            logger.finish_progress("Collection failed").await;
            logger.error(&e.to_string());
            logger.print_final_summary();
            finish_logs(&logger, &args);
            std::process::exit(1);
        }
    };

    logger
        .finish_progress(&format!(
            "Collection finished: {} companies ({})",
            outcome.records.len(),
            outcome.stop_reason
        ))
        .await;

    let filename = export::output_filename(&params.city, &params.category, output_format, Local::now());
    let output_dir = args.get_output_dir();
    match export::export_records(&outcome.records, Path::new(&output_dir), &filename, output_format) {
        Ok(path) => logger.log_export_success(&path.display().to_string()),
        Err(e) => {
            logger.error(&format!("Failed to export results: {:#}", e));
            finish_logs(&logger, &args);
            std::process::exit(1);
        }
    }

    export::print_results_table(&outcome.records);
    export::print_collection_summary(&outcome);
    logger.print_final_summary();
    finish_logs(&logger, &args);

    if outcome.stop_reason == StopReason::Interrupted {
        std::process::exit(130);
    }

    Ok(())
}

/// Location fields from flags, prompting for missing ones in a terminal
fn resolve_search_params(args: &Args) -> Result<SearchParams, String> {
    let complete = args.city.is_some() && args.state.is_some() && args.category.is_some();
    if complete || !AppConfig::is_interactive() {
        return args.search_params();
    }

    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut output = std::io::stdout();
    args.prompt_search_params(&mut input, &mut output)
}

fn finish_logs(logger: &CollectionLogger, args: &Args) {
    if !logger.is_log_export_enabled() {
        return;
    }
    match logger.export_logs() {
        Ok(()) => {
            if let Some(ref log_file) = args.log_file {
                println!("📄 Execution logs exported to: {}", log_file);
                println!("   Total log entries: {}", logger.get_log_count());
            }
        }
        Err(e) => {
            eprintln!("⚠️ Warning: Failed to export logs: {}", e);
        }
    }
}
