//! End-to-end runs of the update engine against scripted commands

use std::sync::Arc;
use std::time::{Duration, Instant};

use uca_core::{Agent, FailureReason, ManagerKind, Outcome, Phase, SkipReason, UpdateStrategy};
use uca_exec::{CancellationToken, MockResponse, MockRunner};
use uca_orchestrator::{
    event_channel, summarize, RunOptions, SchedulerOptions, UpdateEngine, BATCH_FALLBACK_HINT,
    BATCH_RETRY_MARKER,
};
use uca_probe::{EnvironmentProbe, ProbeTimeouts, StaticLocator};

fn engine(runner: MockRunner, locator: StaticLocator) -> (Arc<MockRunner>, UpdateEngine) {
    let runner = Arc::new(runner);
    let probe = Arc::new(EnvironmentProbe::detect(
        runner.clone(),
        Arc::new(locator),
        ProbeTimeouts::default(),
    ));
    let engine = UpdateEngine::new(probe, runner.clone());
    (runner, engine)
}

fn native(name: &str) -> Agent {
    Agent::new(name)
        .with_binary(name)
        .with_version_cmd([name, "--version"])
        .with_strategy(UpdateStrategy::native([name, "update"]))
}

fn npm_agent(name: &str, package: &str) -> Agent {
    Agent::new(name)
        .with_binary(name)
        .with_version_cmd([name, "--version"])
        .with_strategy(UpdateStrategy::package(ManagerKind::Npm, package))
}

fn brew_agent(name: &str) -> Agent {
    Agent::new(name).with_strategy(UpdateStrategy::package(ManagerKind::Brew, name))
}

fn opts(scheduler: SchedulerOptions) -> RunOptions {
    RunOptions {
        dry_run: false,
        scheduler,
    }
}

#[tokio::test]
async fn test_native_failure_reports_exit_code() {
    let runner = MockRunner::new()
        .on("amp --version", MockResponse::ok("1.0.0\n"))
        .on("amp update", MockResponse::fail(1, "something went sideways"));
    let locator = StaticLocator::new().with("amp", "/usr/local/bin/amp");
    let (_, engine) = engine(runner, locator);

    let results = engine.run(&[native("amp")], &RunOptions::default()).await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].outcome, Some(Outcome::Failed(FailureReason::Exit(1))));
    assert_eq!(results[0].reason().as_deref(), Some("exit 1"));
    assert_eq!(results[0].before, "1.0.0");
    assert_eq!(results[0].command, "amp update");
    assert!(summarize(&results, &[]).has_failures());
}

#[tokio::test]
async fn test_version_decides_updated_or_unchanged() {
    let runner = MockRunner::new()
        .on_sequence(
            "amp --version",
            vec![MockResponse::ok("1.0.0"), MockResponse::ok("1.1.0")],
        )
        .on("amp update", MockResponse::ok("updated"))
        .on("claude --version", MockResponse::ok("2.0.0 (Claude Code)"))
        .on("claude update", MockResponse::ok("already latest"));
    let locator = StaticLocator::new()
        .with("amp", "/usr/local/bin/amp")
        .with("claude", "/usr/local/bin/claude");
    let (_, engine) = engine(runner, locator);

    let results = engine
        .run(&[native("amp"), native("claude")], &RunOptions::default())
        .await;

    assert_eq!(results[0].outcome, Some(Outcome::Updated { dry_run: false }));
    assert_eq!(results[0].after, "1.1.0");
    assert_eq!(results[0].log, "updated");
    assert_eq!(results[1].outcome, Some(Outcome::Unchanged));
    assert!(!summarize(&results, &[]).has_failures());
}

#[tokio::test]
async fn test_missing_and_manual_agents_create_no_commands() {
    let runner = MockRunner::new();
    let locator = StaticLocator::new().with("codex", "/opt/custom/codex");
    let (runner, engine) = engine(runner, locator);

    let results = engine
        .run(
            &[native("goose"), npm_agent("codex", "@openai/codex")],
            &RunOptions::default(),
        )
        .await;

    assert_eq!(results[0].outcome, Some(Outcome::Skipped(SkipReason::Missing)));
    assert_eq!(
        results[1].outcome,
        Some(Outcome::Skipped(SkipReason::ManualInstall))
    );
    assert!(runner.calls().await.is_empty());
}

#[tokio::test]
async fn test_failed_batch_is_retried_per_agent() {
    let batch = "npm install -g @google/gemini-cli@latest @openai/codex@latest";
    let runner = MockRunner::new()
        .on("npm bin -g", MockResponse::ok("/g/bin\n"))
        .on(batch, MockResponse::fail(1, "batch went wrong"))
        .on(
            "npm install -g @openai/codex@latest",
            MockResponse::ok("added 1 package"),
        )
        .on(
            "npm install -g @google/gemini-cli@latest",
            MockResponse::fail(1, "gemini went wrong"),
        )
        .on_sequence(
            "codex --version",
            vec![MockResponse::ok("0.1.0"), MockResponse::ok("0.2.0")],
        )
        .on("gemini --version", MockResponse::ok("2.0.0"));
    let locator = StaticLocator::new()
        .with("npm", "/usr/bin/npm")
        .with("codex", "/g/bin/codex")
        .with("gemini", "/g/bin/gemini");
    let (runner, engine) = engine(runner, locator);

    let agents = [
        npm_agent("codex", "@openai/codex"),
        npm_agent("gemini", "@google/gemini-cli"),
    ];
    let results = engine.run(&agents, &RunOptions::default()).await;

    assert_eq!(runner.calls_to(batch).await.len(), 1);

    let codex = &results[0];
    assert_eq!(codex.outcome, Some(Outcome::Updated { dry_run: false }));
    assert_eq!(codex.after, "0.2.0");
    assert_eq!(codex.command, "npm install -g @openai/codex@latest");
    assert!(codex.explain.contains(BATCH_FALLBACK_HINT));
    assert!(codex.log.starts_with("batch went wrong"));
    assert!(codex.log.contains(BATCH_RETRY_MARKER));
    assert!(codex.log.ends_with("added 1 package"));

    let gemini = &results[1];
    assert_eq!(gemini.reason().as_deref(), Some("exit 1"));
    assert!(gemini.log.ends_with("gemini went wrong"));
}

#[tokio::test]
async fn test_canceled_batch_is_not_split() {
    let cancel = CancellationToken::new();
    let batch = "npm install -g @google/gemini-cli@latest @openai/codex@latest";
    let runner = MockRunner::with_cancellation(cancel.clone())
        .on("npm bin -g", MockResponse::ok("/g/bin\n"))
        .on(
            batch,
            MockResponse::ok("never").with_delay(Duration::from_secs(10)),
        )
        .on("npm install -g @openai/codex@latest", MockResponse::ok("added 1 package"))
        .on("npm install -g @google/gemini-cli@latest", MockResponse::ok("added 1 package"))
        .on("codex --version", MockResponse::ok("0.1.0"))
        .on("gemini --version", MockResponse::ok("2.0.0"));
    let locator = StaticLocator::new()
        .with("npm", "/usr/bin/npm")
        .with("codex", "/g/bin/codex")
        .with("gemini", "/g/bin/gemini");
    let (runner, engine) = engine(runner, locator);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let agents = [
        npm_agent("codex", "@openai/codex"),
        npm_agent("gemini", "@google/gemini-cli"),
    ];
    let started = Instant::now();
    let results = engine.run(&agents, &RunOptions::default()).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(runner.calls_to(batch).await.len(), 1);
    assert!(runner
        .calls_to("npm install -g @openai/codex@latest")
        .await
        .is_empty());
    assert!(runner
        .calls_to("npm install -g @google/gemini-cli@latest")
        .await
        .is_empty());
    for result in &results {
        assert_eq!(result.outcome, Some(Outcome::Failed(FailureReason::Canceled)));
        assert!(!result.explain.contains(BATCH_FALLBACK_HINT));
        assert!(!result.log.contains(BATCH_RETRY_MARKER));
        assert_eq!(result.command, batch);
    }
}

#[tokio::test]
async fn test_same_kind_never_overlaps_but_kinds_do() {
    let slow = |out: &str| MockResponse::ok(out).with_delay(Duration::from_millis(80));
    let runner = MockRunner::new()
        .on("brew list --formula --versions aa", MockResponse::ok("aa 1.0"))
        .on("brew list --formula --versions bb", MockResponse::ok("bb 1.0"))
        .on("brew upgrade aa", slow("aa upgraded"))
        .on("brew upgrade bb", slow("bb upgraded"))
        .on("amp update", slow("amp updated"));
    let locator = StaticLocator::new()
        .with("brew", "/opt/homebrew/bin/brew")
        .with("amp", "/usr/local/bin/amp");
    let (runner, engine) = engine(runner, locator);

    let agents = [brew_agent("aa"), brew_agent("bb"), native("amp")];
    let results = engine.run(&agents, &RunOptions::default()).await;
    assert!(results.iter().all(|r| !r.is_failed()), "{results:?}");

    let aa = runner.calls_to("brew upgrade aa").await.remove(0);
    let bb = runner.calls_to("brew upgrade bb").await.remove(0);
    let amp = runner.calls_to("amp update").await.remove(0);

    assert!(!aa.overlaps(&bb), "brew upgrades ran concurrently");
    assert!(amp.overlaps(&aa) || amp.overlaps(&bb), "native update was serialized");
}

#[tokio::test]
async fn test_serial_mode_runs_one_at_a_time() {
    let slow = |out: &str| MockResponse::ok(out).with_delay(Duration::from_millis(40));
    let runner = MockRunner::new()
        .on("amp update", slow("ok"))
        .on("claude update", slow("ok"));
    let locator = StaticLocator::new()
        .with("amp", "/usr/local/bin/amp")
        .with("claude", "/usr/local/bin/claude");
    let (runner, engine) = engine(runner, locator);

    let serial = opts(SchedulerOptions {
        serial: true,
        ..SchedulerOptions::default()
    });
    engine.run(&[native("amp"), native("claude")], &serial).await;

    let amp = runner.calls_to("amp update").await.remove(0);
    let claude = runner.calls_to("claude update").await.remove(0);
    assert!(!amp.overlaps(&claude));
}

#[tokio::test]
async fn test_quota_output_is_classified() {
    let runner = MockRunner::new().on(
        "gemini update",
        MockResponse::fail(1, "TerminalQuotaError: exhausted capacity"),
    );
    let locator = StaticLocator::new().with("gemini", "/usr/local/bin/gemini");
    let (_, engine) = engine(runner, locator);

    let results = engine.run(&[native("gemini")], &RunOptions::default()).await;
    assert_eq!(results[0].outcome, Some(Outcome::Failed(FailureReason::Quota)));
    assert!(results[0].explain.contains("hint:"));
}

#[tokio::test]
async fn test_timeout_is_structural() {
    let runner = MockRunner::new().on(
        "amp update",
        MockResponse::fail(1, "EACCES").with_delay(Duration::from_secs(5)),
    );
    let locator = StaticLocator::new().with("amp", "/usr/local/bin/amp");
    let (_, engine) = engine(runner, locator);

    let options = opts(SchedulerOptions {
        timeout: Some(Duration::from_millis(50)),
        ..SchedulerOptions::default()
    });
    let results = engine.run(&[native("amp")], &options).await;

    assert_eq!(results[0].outcome, Some(Outcome::Failed(FailureReason::Timeout)));
    assert!(results[0].explain.contains("timed out"));
}

#[tokio::test]
async fn test_cancellation_stops_running_and_queued_work() {
    let cancel = CancellationToken::new();
    let runner = MockRunner::with_cancellation(cancel.clone())
        .on(
            "amp update",
            MockResponse::ok("never").with_delay(Duration::from_secs(10)),
        )
        .on("claude update", MockResponse::ok("never"));
    let locator = StaticLocator::new()
        .with("amp", "/usr/local/bin/amp")
        .with("claude", "/usr/local/bin/claude");
    let (runner, engine) = engine(runner, locator);
    let (sink, mut rx) = event_channel();
    let engine = engine.with_events(sink);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let serial = opts(SchedulerOptions {
        serial: true,
        ..SchedulerOptions::default()
    });
    let started = Instant::now();
    let results = engine.run(&[native("amp"), native("claude")], &serial).await;
    drop(engine);

    assert!(started.elapsed() < Duration::from_secs(5));
    for result in &results {
        assert_eq!(result.outcome, Some(Outcome::Failed(FailureReason::Canceled)));
        assert!(result.explain.contains("interrupted"));
    }
    assert!(runner.calls_to("claude update").await.is_empty());

    let mut claude_phases = Vec::new();
    while let Some(event) = rx.recv().await {
        if event.index == 1 {
            claude_phases.push(event.phase);
        }
    }
    assert_eq!(claude_phases, vec![Phase::Detect, Phase::Finish]);
}

#[tokio::test]
async fn test_dry_run_previews_without_running() {
    let runner = MockRunner::new()
        .on("npm bin -g", MockResponse::ok("/g/bin"))
        .on("codex --version", MockResponse::ok("codex-cli 0.1.0"))
        .on(
            "npm view @openai/codex dist-tags.latest",
            MockResponse::ok("0.2.0\n"),
        )
        .on("amp --version", MockResponse::ok("v1.0.0"));
    let locator = StaticLocator::new()
        .with("npm", "/usr/bin/npm")
        .with("codex", "/g/bin/codex")
        .with("amp", "/usr/local/bin/amp");
    let (runner, engine) = engine(runner, locator);
    let (sink, mut rx) = event_channel();
    let engine = engine.with_events(sink);

    let options = RunOptions {
        dry_run: true,
        ..RunOptions::default()
    };
    let results = engine
        .run(&[npm_agent("codex", "@openai/codex"), native("amp")], &options)
        .await;
    drop(engine);

    let codex = &results[0];
    assert!(codex.outcome.as_ref().is_some_and(Outcome::is_dry_run));
    assert_eq!(codex.reason().as_deref(), Some("dry-run"));
    assert_eq!(codex.before, "codex-cli 0.1.0");
    assert_eq!(codex.after, "codex-cli 0.2.0");
    assert_eq!(codex.command, "npm install -g @openai/codex@latest");

    assert_eq!(results[1].before, "v1.0.0");
    assert_eq!(results[1].after, "v1.0.0");

    assert!(runner.calls_to("npm install -g @openai/codex@latest").await.is_empty());
    assert!(runner.calls_to("amp update").await.is_empty());

    while let Some(event) = rx.recv().await {
        assert_ne!(event.phase, Phase::Start);
    }
}

#[tokio::test]
async fn test_events_follow_phase_order_per_agent() {
    let runner = MockRunner::new()
        .on("amp update", MockResponse::ok("ok"))
        .on("claude update", MockResponse::fail(1, "nope"));
    let locator = StaticLocator::new()
        .with("amp", "/usr/local/bin/amp")
        .with("claude", "/usr/local/bin/claude");
    let (_, engine) = engine(runner, locator);
    let (sink, mut rx) = event_channel();
    let engine = engine.with_events(sink);

    let agents = [native("amp"), native("goose"), native("claude")];
    engine.run(&agents, &RunOptions::default()).await;
    drop(engine);

    let mut phases = vec![Vec::new(); agents.len()];
    let mut visible = vec![false; agents.len()];
    while let Some(event) = rx.recv().await {
        phases[event.index].push(event.phase);
        if event.phase == Phase::Detect {
            visible[event.index] = event.visible;
        }
        if event.phase == Phase::Finish {
            assert!(event.result.outcome.is_some());
        }
    }

    assert_eq!(phases[0], vec![Phase::Detect, Phase::Start, Phase::Finish]);
    assert_eq!(phases[1], vec![Phase::Detect, Phase::Finish]);
    assert_eq!(phases[2], vec![Phase::Detect, Phase::Start, Phase::Finish]);
    assert_eq!(visible, vec![true, false, true]);
}
