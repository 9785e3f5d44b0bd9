use clap::Parser;
use std::io::{BufRead, Write};

use crate::company::{RegimeFilter, SearchParams};
use crate::export::OutputFormat;

pub const DEFAULT_CITY: &str = "Alfenas";
pub const DEFAULT_STATE: &str = "MG";
pub const DEFAULT_CATEGORY: &str = "indústria";

#[derive(Parser, Debug)]
#[command(name = "cnpjfinder")]
#[command(about = "Collects active businesses from Google Maps and enriches them with CNPJ registry data")]
#[command(version)]
#[command(after_help = "Ctrl-C stops after the current company and exports what was collected (exit code 130).\n\
A second Ctrl-C exits at once without closing Chrome; a browser process may be left running.")]
pub struct Cli {
    /// Create default configuration file at ./config/cnpjfinder.toml
    #[arg(long)]
    pub init: bool,

    /// City to search in (prompted when omitted in a terminal)
    #[arg(long)]
    pub city: Option<String>,

    /// State abbreviation, e.g. MG (prompted when omitted in a terminal)
    #[arg(long)]
    pub state: Option<String>,

    /// Business category, e.g. "padaria" (prompted when omitted in a terminal)
    #[arg(long)]
    pub category: Option<String>,

    /// Number of active companies to collect
    #[arg(short = 'n', long, default_value = "5")]
    pub count: usize,

    /// Keep only companies under this tax regime
    #[arg(short = 'r', long, value_enum, default_value_t = RegimeFilter::All)]
    pub regime: RegimeFilter,

    /// Output format: 'xlsx' (default), 'csv' or 'json'
    #[arg(short = 'f', long, default_value = "xlsx")]
    pub output_format: String,

    /// Output directory for the results file (defaults to the current directory)
    #[arg(long)]
    pub output_dir: Option<String>,

    /// Verbose logging (use -v for warnings, -vv for DEBUG with tracing output)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only show errors, the progress bar and the final summary
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write all log messages to this file at the end of the run
    #[arg(long)]
    pub log_file: Option<String>,

    /// Run Chrome with a visible window (overrides config)
    #[arg(long)]
    pub show_browser: bool,

    /// Path to the Chrome/Chromium binary (overrides browser.chrome_path in config)
    #[arg(long)]
    pub chrome_path: Option<String>,
}

/// Flattened arguments used by the rest of the application
#[derive(Debug, Clone)]
pub struct Args {
    pub init: bool,
    pub city: Option<String>,
    pub state: Option<String>,
    pub category: Option<String>,
    pub count: usize,
    pub regime: RegimeFilter,
    pub output_format: String,
    pub output_dir: Option<String>,
    pub verbose: u8,
    pub quiet: bool,
    pub log_file: Option<String>,
    pub show_browser: bool,
    pub chrome_path: Option<String>,
}

impl From<&Cli> for Args {
    fn from(cli: &Cli) -> Self {
        Args {
            init: cli.init,
            city: cli.city.clone(),
            state: cli.state.clone(),
            category: cli.category.clone(),
            count: cli.count,
            regime: cli.regime,
            output_format: cli.output_format.clone(),
            output_dir: cli.output_dir.clone(),
            verbose: cli.verbose,
            quiet: cli.quiet,
            log_file: cli.log_file.clone(),
            show_browser: cli.show_browser,
            chrome_path: cli.chrome_path.clone(),
        }
    }
}

impl Args {
    pub fn validate(&self) -> Result<(), String> {
        if self.count == 0 {
            return Err("Count must be greater than 0".to_string());
        }

        if self.output_format.parse::<OutputFormat>().is_err() {
            return Err("Output format must be 'xlsx', 'csv', or 'json'".to_string());
        }

        for (flag, value) in [("--city", &self.city), ("--state", &self.state), ("--category", &self.category)] {
            if let Some(v) = value {
                if v.trim().is_empty() {
                    return Err(format!("{} cannot be empty", flag));
                }
            }
        }

        Ok(())
    }

    pub fn get_output_format(&self) -> Result<OutputFormat, String> {
        self.output_format.parse()
    }

    pub fn get_output_dir(&self) -> String {
        self.output_dir.clone().unwrap_or_else(|| ".".to_string())
    }

    /// Search parameters from the flags alone; every location field is required.
    pub fn search_params(&self) -> Result<SearchParams, String> {
        let require = |value: &Option<String>, flag: &str| {
            value
                .as_ref()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| format!("{} is required when not running in a terminal", flag))
        };

        Ok(SearchParams {
            city: require(&self.city, "--city")?,
            state: require(&self.state, "--state")?,
            category: require(&self.category, "--category")?,
            target_count: self.count,
            regime_filter: self.regime,
        })
    }

    /// Search parameters, asking for any missing location field on `input`.
    /// An empty answer takes the default shown in the prompt.
    pub fn prompt_search_params<R: BufRead, W: Write>(
        &self,
        input: &mut R,
        output: &mut W,
    ) -> Result<SearchParams, String> {
        let mut ask = |value: &Option<String>, label: &str, default: &str| -> Result<String, String> {
            match value {
                Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
                _ => prompt_with_default(input, output, label, default)
                    .map_err(|e| format!("Failed to read {}: {}", label, e)),
            }
        };

        Ok(SearchParams {
            city: ask(&self.city, "City", DEFAULT_CITY)?,
            state: ask(&self.state, "State", DEFAULT_STATE)?,
            category: ask(&self.category, "Category", DEFAULT_CATEGORY)?,
            target_count: self.count,
            regime_filter: self.regime,
        })
    }
}

fn prompt_with_default<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    label: &str,
    default: &str,
) -> std::io::Result<String> {
    write!(output, "{} [{}]: ", label, default)?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let answer = line.trim();
    Ok(if answer.is_empty() {
        default.to_string()
    } else {
        answer.to_string()
    })
}
