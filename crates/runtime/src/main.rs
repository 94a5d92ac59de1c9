//! Demonstration binary: wires the orchestration-core components
//! together against a small embedded configuration and runs one
//! illustrative scenario end to end before exiting. Not a supported
//! product surface — see `DESIGN.md`.

use std::time::Duration;

use async_trait::async_trait;
use tracing_subscriber::EnvFilter;

use orc_concurrency::{AgentMessageQueue, DrainOutcome, LaneManager, SendOutcome};
use orc_domain::config::Config;
use orc_domain::model::{Agent, Tier};
use orc_domain::{Event, EventBus};
use orc_orchestrator::{DelegationManager, MessageContext, Orchestrator, TaskContinuationEnforcer};
use orc_pool::{AgentProcessManager, AgentProcessPool};
use orc_swarm::db::{CreateTaskParams, SwarmDb};
use orc_swarm::waves::{run_waves, TaskExecutor, TaskRef, Wave};
use orc_tasks::BackgroundTaskManager;
use orc_ultrawork::UltraworkManager;
use orc_workflow::WorkflowEngine;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,orc_runtime=debug")))
        .json()
        .init();
}

fn example_config() -> Config {
    let mut config = Config::default();
    config.agents.agents = vec![
        Agent {
            agent_id: "lead".into(),
            display_name: "Lead".into(),
            trigger_prefix: Some("@lead".into()),
            tier: Some(Tier::One),
            can_delegate: Some(true),
            is_planning_agent: Some(true),
            auto_continue: Some(true),
            tool_permissions: None,
            auto_respond_keywords: vec!["plan".into()],
            pool_size: None,
            enabled: true,
            model: None,
            command: None,
            working_dir: None,
        },
        Agent {
            agent_id: "worker".into(),
            display_name: "Worker".into(),
            trigger_prefix: Some("@worker".into()),
            tier: Some(Tier::Two),
            can_delegate: Some(false),
            is_planning_agent: None,
            auto_continue: None,
            tool_permissions: None,
            auto_respond_keywords: vec![],
            pool_size: None,
            enabled: true,
            model: None,
            command: None,
            working_dir: None,
        },
    ];
    config
}

struct EchoExecutor;

#[async_trait]
impl TaskExecutor for EchoExecutor {
    async fn execute(&self, task: &TaskRef) -> orc_domain::Result<String> {
        tracing::info!(task_id = %task.id, description = %task.description, "swarm task executing");
        Ok(format!("completed: {}", task.description))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    tracing::info!("orchestration core starting");

    let config = example_config();
    let events = EventBus::new(256);

    // ── Construct the full component set ──────────────────────────
    let orchestrator = Orchestrator::new(config.orchestrator.clone(), config.agents.agents.clone());
    let lanes = LaneManager::new(config.lanes.default_max_concurrent).with_events(events.clone());
    let queue = AgentMessageQueue::new(
        config.message_queue.max_len,
        Duration::from_millis(config.message_queue.ttl_ms),
        config.message_queue.max_busy_retries,
    );
    let _pool_manager = AgentProcessManager::new(
        AgentProcessPool::new(Duration::from_millis(config.pool.idle_timeout_ms)),
        config.pool.tier1_hook_features.clone(),
    );
    let _delegation = DelegationManager::with_events(events.clone());
    let _continuation = TaskContinuationEnforcer::with_events(config.continuation.clone(), events.clone());
    let _background_tasks = BackgroundTaskManager::new(
        config.background_tasks.max_queue_size,
        config.background_tasks.max_total_concurrent,
        config.background_tasks.max_concurrent_per_agent,
        Duration::from_millis(config.background_tasks.stale_timeout_ms),
    );
    let _workflow = WorkflowEngine::new(events.clone());
    let _ultrawork = UltraworkManager::with_events(config.ultrawork.clone(), config.agents.clone(), events.clone());

    // ── Scenario step 1: select an agent for an incoming message ──
    let ctx = MessageContext { channel: "demo", content: "let's make a plan", is_human: true };
    let selection = orchestrator.select_responding_agents(&ctx);
    tracing::info!(selected = ?selection.selected_agents, reason = ?selection.reason, "agent selected");

    // ── Scenario step 2: run the selected agent's turn through a lane ──
    let lane_result = lanes
        .enqueue(
            "demo-lane",
            || async move {
                tracing::info!("agent turn running inside lane");
                "turn complete"
            },
            None,
        )
        .await?;
    tracing::info!(result = lane_result, "lane turn finished");

    // ── Scenario step 3: drain a queued follow-up message ──────────
    queue.enqueue("lead", "summarize the plan".into(), "demo".into(), None, "demo".into());
    loop {
        let outcome = queue
            .drain_one(
                "lead",
                |prompt| async move {
                    tracing::info!(%prompt, "delivering queued prompt");
                    SendOutcome::Delivered("ack".into())
                },
                |agent_id, _entry, response| {
                    tracing::info!(agent_id, response, "queued prompt delivered");
                },
            )
            .await;
        if matches!(outcome, DrainOutcome::Empty | DrainOutcome::Requeued) {
            break;
        }
    }

    // ── Scenario step 4: execute a two-task swarm wave ──────────────
    let db = SwarmDb::connect_memory().await?;
    let first = db
        .create_task(CreateTaskParams {
            session_id: "demo".into(),
            description: "draft the outline".into(),
            category: "planning".into(),
            wave: 0,
            priority: 0,
            ..Default::default()
        })
        .await?;
    let second = db
        .create_task(CreateTaskParams {
            session_id: "demo".into(),
            description: "review the outline".into(),
            category: "review".into(),
            wave: 0,
            priority: 0,
            ..Default::default()
        })
        .await?;

    let wave = Wave {
        wave: 0,
        tasks: vec![
            TaskRef { id: first, description: "draft the outline".into(), category: "planning".into() },
            TaskRef { id: second, description: "review the outline".into(), category: "review".into() },
        ],
    };
    let summary = run_waves(&db, &[wave], &EchoExecutor).await;
    tracing::info!(
        completed = summary.completed,
        failed = summary.failed,
        skipped = summary.skipped,
        "swarm wave finished"
    );
    events.publish(Event::Progress { scope: "demo".into(), message: "scenario complete".into() });

    tracing::info!("orchestration core demo finished");
    Ok(())
}
