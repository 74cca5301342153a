//! # Configuration Module
//!
//! Command-line and environment configuration for the `nnbench` binary.
//! A `.env` file, when present, is loaded before flags are parsed.

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
use crate::core::http_client::HttpClientConfig;
use crate::core::retry::RetryPolicy;
use crate::error::BenchError;
use std::time::Duration;
use url::Url;

/// # NexusNitro Bench Configuration
///
/// Shared options for every subcommand plus the subcommand itself. Built once
/// in `main` and passed by reference to whatever needs it.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "cli", derive(Parser))]
#[cfg_attr(feature = "cli", command(name = "nnbench"))]
#[cfg_attr(feature = "cli", command(about = "Benchmark and chat with OpenAI-compatible streaming completion APIs"))]
#[cfg_attr(feature = "cli", command(version))]
pub struct Config {
    /// Base URL of the API; `/v1/chat/completions` is appended
    #[cfg_attr(feature = "cli", arg(short = 'u', long, env = "NNBENCH_BASE_URL", default_value = "http://localhost:8080", global = true))]
    pub base_url: String,

    /// Model identifier sent with every request
    #[cfg_attr(feature = "cli", arg(short, long, env = "NNBENCH_MODEL", default_value = "gpt-4.1", global = true))]
    pub model: String,

    /// Attempts per request before giving up on transport errors
    #[cfg_attr(feature = "cli", arg(long, env = "NNBENCH_MAX_ATTEMPTS", default_value = "20", global = true))]
    pub max_attempts: u32,

    /// Delay between attempts, in milliseconds
    #[cfg_attr(feature = "cli", arg(long, env = "NNBENCH_RETRY_DELAY_MS", default_value = "50", global = true))]
    pub retry_delay_ms: u64,

    /// TCP connect timeout, in seconds
    #[cfg_attr(feature = "cli", arg(long, env = "NNBENCH_CONNECT_TIMEOUT", default_value = "10", global = true))]
    pub connect_timeout: u64,

    /// Maximum silence while reading a response body, in seconds
    #[cfg_attr(feature = "cli", arg(long, env = "NNBENCH_READ_TIMEOUT", global = true))]
    pub read_timeout: Option<u64>,

    /// Log filter, e.g. `info` or `nexus_nitro_bench=debug`
    #[cfg_attr(feature = "cli", arg(long, env = "RUST_LOG", default_value = "info", global = true))]
    pub log_level: String,

    #[cfg_attr(feature = "cli", command(subcommand))]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(Subcommand))]
pub enum Command {
    /// Benchmark an OpenAI-compatible REST API
    Bench {
        /// Prompt to send with every request
        #[cfg_attr(feature = "cli", arg(short, long))]
        prompt: String,

        /// Number of requests to perform
        #[cfg_attr(feature = "cli", arg(short = 'n', long, default_value = "12"))]
        request_count: usize,

        /// Number of requests in flight at a time
        #[cfg_attr(feature = "cli", arg(short, long, default_value = "3"))]
        concurrency: usize,

        /// Print the results as JSON instead of a table
        #[cfg_attr(feature = "cli", arg(long))]
        json: bool,
    },
    /// Chat with the model, keeping the conversation history
    Chat {
        /// Send a single message and exit instead of starting a session
        #[cfg_attr(feature = "cli", arg(short, long))]
        prompt: Option<String>,
    },
}

impl Config {
    /// Parse configuration from command line arguments and environment variables.
    ///
    /// Loads `.env`, parses flags, sets up logging and validates. Exits the
    /// process with a message if validation fails.
    #[cfg(feature = "cli")]
    pub fn parse_args() -> Self {
        // Load .env file if it exists (ignore errors if file doesn't exist)
        let _ = dotenv::dotenv();

        let config = Self::parse();

        config.setup_logging();

        if let Err(err) = config.validate() {
            eprintln!("Configuration validation failed: {}", err);
            std::process::exit(1);
        }

        config
    }

    /// Create a test configuration pointing at `http://localhost:8080`.
    pub fn for_test() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            model: "gpt-4.1".to_string(),
            max_attempts: 3,
            retry_delay_ms: 10,
            connect_timeout: 10,
            read_timeout: None,
            log_level: "info".to_string(),
            command: Command::Bench {
                prompt: "What is the capital of France?".to_string(),
                request_count: 12,
                concurrency: 3,
                json: false,
            },
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.retry_delay_ms))
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig::from(self)
    }

    /// Initialise the tracing subscriber. Later calls are no-ops.
    pub fn setup_logging(&self) {
        #[cfg(feature = "cli")]
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new(&self.log_level))
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    }

    /// Validate configuration values and provide helpful error messages.
    pub fn validate(&self) -> Result<(), BenchError> {
        let invalid = |message: &str| Err(BenchError::Config(message.to_string()));

        if self.base_url.trim().is_empty() {
            return invalid("base URL is required");
        }
        let url = Url::parse(self.base_url.trim())
            .map_err(|err| BenchError::Config(format!("invalid base URL '{}': {}", self.base_url, err)))?;
        if !["http", "https"].contains(&url.scheme()) {
            return Err(BenchError::Config(format!(
                "base URL must use http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.model.trim().is_empty() {
            return invalid("model is required");
        }
        if self.max_attempts == 0 {
            return invalid("max attempts must be greater than 0");
        }
        if self.connect_timeout == 0 {
            return invalid("connect timeout must be greater than 0");
        }
        if self.read_timeout == Some(0) {
            return invalid("read timeout must be greater than 0 when set");
        }

        if self.log_level.trim().is_empty() {
            return invalid("log level cannot be empty");
        }
        validate_log_filter(&self.log_level)?;

        match &self.command {
            Command::Bench {
                prompt,
                request_count,
                concurrency,
                ..
            } => {
                if prompt.trim().is_empty() {
                    return invalid("a prompt is required for benchmarking");
                }
                if *request_count == 0 {
                    return invalid("request count must be greater than 0");
                }
                if *concurrency == 0 {
                    return invalid("concurrency must be greater than 0");
                }
            }
            Command::Chat { .. } => {}
        }

        Ok(())
    }
}

#[cfg(feature = "cli")]
fn validate_log_filter(filter: &str) -> Result<(), BenchError> {
    tracing_subscriber::EnvFilter::try_new(filter)
        .map(|_| ())
        .map_err(|err| BenchError::Config(format!("invalid log level '{}': {}", filter, err)))
}

#[cfg(not(feature = "cli"))]
fn validate_log_filter(_filter: &str) -> Result<(), BenchError> {
    Ok(())
}
