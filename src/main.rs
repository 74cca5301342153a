//! # NexusNitro Bench (nnbench)
//!
//! `nnbench bench` measures TTFT, TBT and total time of a streaming chat
//! completion endpoint. `nnbench chat` talks to it interactively.

use nexus_nitro_bench::graceful_shutdown::shutdown_token;
use nexus_nitro_bench::report::render_table;
use nexus_nitro_bench::{
    benchmark_stream, Benchmark, BenchError, ChatMessage, ChatSession, Command,
    CompletionClient, Config, Fragment,
};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from CLI args and .env file
    let config = Config::parse_args();
    let cancel = shutdown_token();
    let client = CompletionClient::from_config(&config)?;

    info!("🚀 nnbench targeting {}", client.endpoint());
    info!("Model: {}", config.model);

    match &config.command {
        Command::Bench {
            prompt,
            request_count,
            concurrency,
            json,
        } => run_bench(&config, client, prompt, *request_count, *concurrency, *json, &cancel).await,
        Command::Chat { prompt } => run_chat(&config, client, prompt.as_deref(), &cancel).await,
    }
}

async fn run_bench(
    config: &Config,
    client: CompletionClient,
    prompt: &str,
    request_count: usize,
    concurrency: usize,
    json: bool,
    cancel: &CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let message = ChatMessage::parse_input(prompt)
        .ok_or_else(|| BenchError::Config("a prompt is required for benchmarking".to_string()))?;

    let benchmark = Benchmark::new(request_count, concurrency)?;
    let stream_func = benchmark_stream(client, &config.model, vec![message]);

    let result = match benchmark.run(cancel, stream_func).await {
        Ok(result) => result,
        Err(err) if err.is_cancelled() => {
            eprintln!("Benchmark cancelled.");
            std::process::exit(130);
        }
        Err(err) => {
            eprintln!("Error in benchmarking: {}", err);
            std::process::exit(1);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", render_table(&result));
    }
    Ok(())
}

async fn run_chat(
    config: &Config,
    client: CompletionClient,
    prompt: Option<&str>,
    cancel: &CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = ChatSession::new(client, config.model.clone());

    if let Some(prompt) = prompt {
        let message = ChatMessage::parse_input(prompt)
            .ok_or_else(|| BenchError::Config("prompt cannot be empty".to_string()))?;
        return match send(&mut session, message, cancel).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_cancelled() => Ok(()),
            Err(err) => Err(err.into()),
        };
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            // stdin closed
            break;
        };
        let Some(message) = ChatMessage::parse_input(&line) else {
            continue;
        };

        match send(&mut session, message, cancel).await {
            Ok(()) => {}
            Err(err) if err.is_cancelled() => break,
            Err(err) => println!("Failed to stream response: {}", err),
        }
    }

    println!();
    debug!(turns = session.history().len(), "chat session ended");
    Ok(())
}

async fn send(
    session: &mut ChatSession,
    message: ChatMessage,
    cancel: &CancellationToken,
) -> Result<(), BenchError> {
    let mut stdout = std::io::stdout();
    let mut started = false;

    session
        .send(message, cancel, |fragment| {
            if !started {
                print!("Assistant: ");
                started = true;
            }
            match fragment {
                Fragment::Text(text) => print!("{}", text),
                Fragment::Failure(err) => print!("<error>{}</error>", err),
            }
            let _ = stdout.flush();
        })
        .await?;

    println!();
    Ok(())
}
