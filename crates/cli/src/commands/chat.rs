//! `loomterm chat` — interactive or single-message chat.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use loomterm_agent::{
    AgentLoop, AgentStreamEvent, CancellationToken, ChannelSink, ROUND_LIMIT_NOTICE, TurnOutcome,
};
use loomterm_config::AppConfig;
use loomterm_core::error::ProviderError;
use loomterm_core::event::EventBus;
use loomterm_core::message::Conversation;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;

use super::{config_path, load_config};
use crate::render::Renderer;

pub async fn run(
    explicit: Option<&Path>,
    message: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(explicit)?;

    let provider = match loomterm_providers::build_from_config(&config) {
        Ok(provider) => provider,
        Err(ProviderError::NotConfigured(reason)) => {
            print_setup_help(&reason, explicit);
            return Err("Provider not configured. See above for setup instructions.".into());
        }
        Err(e) => return Err(e.into()),
    };
    let tools = Arc::new(loomterm_tools::default_registry(&config.tools)?);
    let agent = build_agent(&config, provider, tools);

    let mut conversation = Conversation::new();
    if let Some(msg) = message {
        run_turn(&agent, &mut conversation, &msg).await?;
        return Ok(());
    }

    println!();
    println!("  loomterm — interactive mode");
    println!();
    println!("  Provider:  {}", config.provider);
    println!("  Model:     {}", config.model);
    println!("  Tools:     {}", agent.tools().names().join(", "));
    println!();
    println!("  Ctrl+C stops a running answer. Type 'exit' or press Ctrl+C at the prompt to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }
        if matches!(prompt, "exit" | "quit") {
            break;
        }

        println!();
        if let Err(e) = run_turn(&agent, &mut conversation, prompt).await {
            eprintln!("  [error] {e}");
        }
        println!();
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}

fn build_agent(
    config: &AppConfig,
    provider: Arc<dyn loomterm_core::provider::Provider>,
    tools: Arc<loomterm_core::tool::ToolRegistry>,
) -> AgentLoop {
    let mut agent = AgentLoop::new(
        provider,
        &config.model,
        config.temperature,
        tools,
        Arc::new(EventBus::default()),
    )
    .with_max_rounds(config.agent.max_rounds)
    .with_fan_out(config.agent.tool_fan_out)
    .with_tool_timeout(Duration::from_secs(config.agent.tool_timeout_secs))
    .with_paragraph_splits(config.agent.paragraph_splits);
    if let Some(max) = config.max_tokens {
        agent = agent.with_max_tokens(max);
    }
    if let Some(prompt) = &config.agent.system_prompt {
        agent = agent.with_system_prompt(prompt);
    }
    agent
}

/// Run one turn, rendering events as they arrive. Ctrl+C cancels the turn.
async fn run_turn(
    agent: &AgentLoop,
    conversation: &mut Conversation,
    prompt: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let (sink, mut events) = ChannelSink::channel();
    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let mut renderer = Renderer::default();
    let turn = agent.run_turn(conversation, prompt, &sink, &cancel);
    tokio::pin!(turn);
    let result = loop {
        tokio::select! {
            result = &mut turn => break result,
            Some(event) = events.recv() => print_event(&mut renderer, &event)?,
        }
    };
    interrupt.abort();
    drain(&mut renderer, &mut events)?;
    print!("{}", renderer.finish());

    report(&result?);
    Ok(())
}

fn drain(
    renderer: &mut Renderer,
    events: &mut UnboundedReceiver<AgentStreamEvent>,
) -> std::io::Result<()> {
    while let Ok(event) = events.try_recv() {
        print_event(renderer, &event)?;
    }
    Ok(())
}

fn print_event(renderer: &mut Renderer, event: &AgentStreamEvent) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(renderer.render(event).as_bytes())?;
    stdout.flush()
}

fn report(outcome: &TurnOutcome) {
    tracing::debug!(rounds = outcome.rounds, state = ?outcome.state, "Turn finished");
    if outcome.is_cancelled() {
        eprintln!("  [cancelled]");
        return;
    }
    if let Some(error) = outcome.response.as_ref().and_then(|r| r.error.as_ref()) {
        eprintln!("  [error] {error}");
    }
    if outcome.was_truncated() {
        eprintln!("  {ROUND_LIMIT_NOTICE}");
    }
}

fn print_setup_help(reason: &str, explicit: Option<&Path>) {
    eprintln!();
    eprintln!("  ERROR: {reason}");
    eprintln!();
    eprintln!("  Set one of these environment variables:");
    eprintln!("    export OPENROUTER_API_KEY='sk-or-v1-...'   (recommended)");
    eprintln!("    export OPENAI_API_KEY='sk-...'            (for OpenAI direct)");
    eprintln!("    export LOOMTERM_API_KEY='sk-...'          (generic)");
    eprintln!();
    eprintln!("  Or edit your config file:");
    eprintln!("    {}", config_path(explicit).display());
    eprintln!();
    eprintln!("  To try loomterm offline, set provider = \"scripted\".");
    eprintln!();
}
