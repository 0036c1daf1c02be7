use anyhow::{Context, Result};
use localcode::cli::{Args, ChatConfig, ConfigDiscovery, ExecutionMode, InteractiveConfig};
use localcode::env;
use localcode::llm::{ChatMessage, GenerationOptions, LLMProvider, ProviderDetector};
use localcode::{AssistantConfig, AssistantSession, ClassifiedError, ProviderDiagnostics};
use std::io::{self, Write};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        env::VERBOSE_LOG_FILTER
    } else {
        env::DEFAULT_LOG_FILTER
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(io::stderr)
        .init();

    let mode = match args.mode() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    match mode {
        ExecutionMode::ShowConfig => {
            ConfigDiscovery::show_discovery_info();
            return Ok(());
        }
        ExecutionMode::InitConfig => {
            let path = ConfigDiscovery::create_default_user_config()?;
            println!("Configuration file: {}", path.display());
            return Ok(());
        }
        _ => {}
    }

    let config = load_config(&args)?;
    debug!("Effective configuration: {:?}", config);

    let result = match mode {
        ExecutionMode::Detect { all, json } => run_detect(config, all, json).await,
        ExecutionMode::Test { json } => run_test(config, json).await,
        ExecutionMode::Models { json } => run_models(config, json).await,
        ExecutionMode::Chat(chat) => run_chat(config, chat).await,
        ExecutionMode::Interactive(interactive) => run_interactive(config, interactive).await,
        ExecutionMode::ShowConfig | ExecutionMode::InitConfig => Ok(()),
    };

    if let Err(e) = result {
        match e.downcast_ref::<ClassifiedError>() {
            Some(classified) => eprintln!("Error: {}", classified.user_message()),
            None => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<AssistantConfig> {
    let mut config = match &args.config {
        Some(path) => ConfigDiscovery::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => ConfigDiscovery::discover_config()?,
    };
    args.apply_overrides(&mut config)?;
    Ok(config)
}

async fn run_detect(config: AssistantConfig, all: bool, json: bool) -> Result<()> {
    let detector = ProviderDetector::new(config.connection.clone());
    info!("Probing {} candidate endpoints", detector.candidates().len());

    let found = if all {
        detector.scan().await
    } else {
        detector.detect().await.into_iter().collect()
    };

    if json {
        let report: Vec<serde_json::Value> = found
            .iter()
            .map(|d| {
                serde_json::json!({
                    "kind": d.kind,
                    "endpoint": d.endpoint.base_url(),
                    "capabilities": d.provider.get_capabilities(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if found.is_empty() {
        println!("No local LLM server found.");
        println!();
        println!("Start one of:");
        for profile in detector.suggestions() {
            println!("  {:<10} {} on port {}", profile.name, profile.label, profile.port);
        }
        println!();
        println!("or pass --endpoint host:port");
        return Ok(());
    }

    for detected in &found {
        println!("✓ {} at {}", detected.kind.label(), detected.endpoint);
    }
    Ok(())
}

async fn run_test(config: AssistantConfig, json: bool) -> Result<()> {
    let session = AssistantSession::connect(config).await?;
    let diagnostics = session.test_provider().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&diagnostics)?);
    } else {
        print_diagnostics(&diagnostics);
    }

    if !diagnostics.is_healthy() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_diagnostics(diagnostics: &ProviderDiagnostics) {
    let status = if diagnostics.is_healthy() {
        "✓ healthy"
    } else {
        "✗ unhealthy"
    };
    println!("{} ({})", diagnostics.kind.label(), status);
    println!("  Endpoint: {}", diagnostics.endpoint);
    match diagnostics.latency_ms {
        Some(ms) => println!("  Latency:  {} ms", ms),
        None => println!("  Latency:  unreachable"),
    }
    if let Some(circuit) = &diagnostics.circuit {
        println!(
            "  Circuit:  {} ({} consecutive failures)",
            circuit.state, circuit.consecutive_failures
        );
    }
    println!("  Models:   {}", diagnostics.models.len());
    for model in &diagnostics.models {
        println!("    - {}", model.name);
    }
    if let Some(error) = &diagnostics.error {
        println!();
        println!("{}", error.user_message());
    }
}

async fn run_models(config: AssistantConfig, json: bool) -> Result<()> {
    let session = AssistantSession::connect(config).await?;
    let models = session.provider().list_models().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }

    if models.is_empty() {
        println!("{} reports no models.", session.provider().endpoint());
        return Ok(());
    }
    for model in &models {
        let context = model
            .context_window
            .map(|c| format!("{} ctx", c))
            .unwrap_or_default();
        let format = model.format_hint.as_deref().unwrap_or("");
        println!("{:<40} {:>10} {}", model.name, context, format);
    }
    Ok(())
}

fn conversation_start(system: Option<String>) -> Vec<ChatMessage> {
    system.map(ChatMessage::system).into_iter().collect()
}

fn print_chunk(chunk: &str) {
    print!("{}", chunk);
    let _ = io::stdout().flush();
}

async fn run_chat(mut config: AssistantConfig, chat: ChatConfig) -> Result<()> {
    if chat.model.is_some() {
        config.connection.default_model = chat.model.clone();
    }
    let session = AssistantSession::connect(config).await?;

    let mut messages = conversation_start(chat.system);
    messages.push(ChatMessage::user(chat.prompt));

    let guard = session.guard().clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            guard.cancel_active();
        }
    });

    let outcome = session.submit(messages, chat.options, print_chunk).await;
    interrupt.abort();
    let outcome = outcome?;
    println!();

    if let Some(error) = outcome.error {
        return Err(error.into());
    }
    info!(
        "{} chunks from {} in {:.1}s",
        outcome.chunk_count,
        outcome.model,
        outcome.elapsed.as_secs_f64()
    );
    Ok(())
}

async fn run_interactive(mut config: AssistantConfig, interactive: InteractiveConfig) -> Result<()> {
    if interactive.model.is_some() {
        config.connection.default_model = interactive.model.clone();
    }
    let session = AssistantSession::connect(config).await?;
    let model = session.resolve_model().await?;

    println!(
        "Connected to {} at {} using {}. Type 'help' for commands.",
        session.provider().kind().label(),
        session.provider().endpoint(),
        model
    );

    let guard = session.guard().clone();
    let interrupt = tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if !guard.cancel_active() {
                eprintln!("\n(nothing to interrupt; type 'quit' to exit)");
            }
        }
    });

    let mut history = conversation_start(interactive.system.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        let _ = io::stdout().flush();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();

        match input {
            "" => continue,
            "quit" | "exit" => break,
            "help" => {
                show_interactive_help();
                continue;
            }
            "status" => {
                print_diagnostics(&session.test_provider().await);
                continue;
            }
            "reset" => {
                history = conversation_start(interactive.system.clone());
                println!("Conversation cleared.");
                continue;
            }
            _ => {}
        }

        let decision = session.guard().can_accept_input();
        if !decision.allowed {
            if let Some(reason) = decision.reason {
                println!("{}", reason);
            }
            continue;
        }

        history.push(ChatMessage::user(input));
        match session
            .submit(history.clone(), GenerationOptions::default(), print_chunk)
            .await
        {
            Ok(outcome) => {
                println!();
                if let Some(error) = &outcome.error {
                    if error.is_cancelled() {
                        println!("(interrupted)");
                    } else {
                        println!("{}", error.user_message());
                    }
                }
                if outcome.text.is_empty() {
                    history.pop();
                } else {
                    history.push(ChatMessage::assistant(outcome.text));
                }
            }
            Err(e) if e.is_cancelled() => {
                println!("(interrupted)");
                history.pop();
            }
            Err(e) => {
                warn!("Turn did not start: {}", e);
                println!("{}", e.user_message());
                history.pop();
            }
        }
    }

    interrupt.abort();
    println!("Goodbye!");
    Ok(())
}

fn show_interactive_help() {
    println!("Interactive Mode Commands:");
    println!("  status  - Probe the server and show circuit state");
    println!("  reset   - Forget the conversation so far");
    println!("  help    - Show this help message");
    println!("  quit    - Exit the application");
    println!();
    println!("Any other text is sent to the model. Ctrl-C interrupts a response.");
}
