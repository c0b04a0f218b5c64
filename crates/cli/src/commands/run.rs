//! `stepwise run`: drive one run with a replayed model.

use std::path::PathBuf;
use std::sync::Arc;

use stepwise_agent::{ConsoleObserver, PromptComposer, ScriptedGenerator, StepLoop};
use stepwise_config::{ActionFormatKind, AppConfig};
use stepwise_core::run::Run;
use stepwise_telemetry::{CostObserver, PricingTable, UsageLedger, calculate_run_cost};
use stepwise_tools::default_registry;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct RunArgs {
    pub objective: String,
    pub responses: PathBuf,
    pub max_steps: Option<usize>,
    pub format: Option<ActionFormatKind>,
    pub workspace: Option<PathBuf>,
    pub quiet: bool,
    pub json: bool,
}

impl RunArgs {
    /// Progress lines go to stdout, so they are off for `--quiet` and for
    /// `--json`, which owns stdout.
    fn shows_progress(&self) -> bool {
        !self.quiet && !self.json
    }
}

/// Build the step loop for `config`, replaying `transcript` as the model.
pub fn build_step_loop(
    config: &AppConfig,
    transcript: &str,
    ledger: Arc<UsageLedger>,
    console: bool,
) -> stepwise_core::Result<StepLoop> {
    let registry = default_registry(
        &config.tools,
        super::action_format(config.agent.action_format),
    )?;
    let generator = ScriptedGenerator::from_transcript(transcript).with_model(config.model.name.clone());
    info!(
        responses = generator.remaining(),
        model = %config.model.name,
        "Loaded response transcript"
    );

    let mut step_loop = StepLoop::new(
        PromptComposer::from_config(&config.agent),
        Arc::new(registry),
        Arc::new(generator),
    )
    .with_config(&config.agent)
    .with_observer(Arc::new(CostObserver::new(ledger)));
    if console {
        step_loop = step_loop.with_observer(Arc::new(ConsoleObserver::new("stepwise")));
    }
    Ok(step_loop)
}

pub async fn run(mut config: AppConfig, args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(max_steps) = args.max_steps {
        config.agent.max_steps = max_steps;
    }
    if let Some(format) = args.format {
        config.agent.action_format = format;
    }
    if let Some(workspace) = &args.workspace {
        config.tools.workspace_root = workspace.clone();
    }
    config.validate()?;

    let transcript = tokio::fs::read_to_string(&args.responses)
        .await
        .map_err(|e| format!("Failed to read {}: {e}", args.responses.display()))?;

    let ledger = Arc::new(UsageLedger::new(PricingTable::from_config(
        &config.telemetry.pricing,
    )));
    let step_loop = build_step_loop(&config, &transcript, ledger.clone(), args.shows_progress())?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let run = step_loop.run_with_cancellation(args.objective, cancel).await;

    if args.json {
        println!("{}", run_json(&run)?);
    } else {
        print_summary(&run, ledger.pricing());
    }
    Ok(())
}

fn run_json(run: &Run) -> stepwise_core::Result<String> {
    Ok(serde_json::to_string_pretty(run)?)
}

fn print_summary(run: &Run, pricing: &PricingTable) {
    let cost = calculate_run_cost(run, pricing);
    let reason = run
        .termination()
        .map(|r| r.to_string())
        .unwrap_or_else(|| "unknown".into());

    println!();
    println!("Run {}", run.id());
    println!("─────────────────────────────────────");
    println!("  Objective:    {}", run.objective());
    println!("  Steps:        {}", run.step_count());
    println!(
        "  Failed steps: {}",
        run.steps().iter().filter(|s| !s.is_success()).count()
    );
    println!(
        "  Model calls:  {} ({} successful)",
        cost.calls, cost.successful_calls
    );
    println!("  Tokens:       {}", cost.total_tokens());
    println!("  Cost:         ${:.6}", cost.cost_usd);
    println!("  Stopped:      {reason}");
}
