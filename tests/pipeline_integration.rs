//! End-to-end pipeline tests over the simulated board: real dispatcher,
//! real workers on spawned tasks, shared in-memory store.

use std::sync::Arc;
use std::time::Duration;

use autotriage::board::sim::{SimBoard, SimCard, SimDetail, SimSpawner};
use autotriage::board::{ContextSpawner, SourceProfile, Surface};
use autotriage::channel::Channel;
use autotriage::config::RunConfig;
use autotriage::dispatcher::Dispatcher;
use autotriage::filter::FilterCriteria;
use autotriage::growth::GrowthController;
use autotriage::ledger::Ledger;
use autotriage::model::{Task, TaskStatus};
use autotriage::scanner::Scanner;
use autotriage::store::{KvStore, MemoryKv};
use chrono::{TimeDelta, Utc};

fn fast_config() -> RunConfig {
    RunConfig {
        poll_interval: Duration::from_millis(5),
        overall_timeout: Duration::from_millis(300),
        settle_interval: Duration::from_millis(1),
        control_search_spacing: Duration::from_millis(1),
        control_search_attempts: 2,
        growth_attempts: 1,
        growth_settle: Duration::from_millis(1),
        ..RunConfig::default()
    }
}

struct Pipeline {
    kv: Arc<MemoryKv>,
    channel: Channel,
    spawner: Arc<SimSpawner>,
    dispatcher: Dispatcher,
}

async fn pipeline(board: SimBoard, criteria: FilterCriteria, config: RunConfig) -> Pipeline {
    pipeline_on(Arc::new(MemoryKv::new()), board, criteria, config).await
}

async fn pipeline_on(
    kv: Arc<MemoryKv>,
    board: SimBoard,
    criteria: FilterCriteria,
    config: RunConfig,
) -> Pipeline {
    let profile = Arc::new(SourceProfile::default());
    let channel = Channel::new(Arc::clone(&kv) as Arc<dyn KvStore>);
    let spawner = Arc::new(SimSpawner::new(
        channel.clone(),
        Arc::clone(&profile),
        config.clone(),
    ));
    let ledger = Ledger::load(
        Arc::clone(&kv) as Arc<dyn KvStore>,
        config.idempotency_capacity,
    )
    .await
    .unwrap();
    let surface: Arc<dyn Surface> = Arc::new(board);
    let dispatcher = Dispatcher::new(
        Scanner::new(Arc::clone(&surface), Arc::clone(&profile)),
        GrowthController::new(surface, Arc::clone(&profile), config.clone()),
        channel.clone(),
        Arc::clone(&spawner) as Arc<dyn ContextSpawner>,
        ledger,
        criteria,
        config,
    );
    Pipeline {
        kv,
        channel,
        spawner,
        dispatcher,
    }
}

fn profile() -> SourceProfile {
    SourceProfile::default()
}

#[tokio::test]
async fn full_apply_sequence_is_recorded() {
    let board = SimBoard::new(
        &profile(),
        vec![SimCard::new(
            "Rust Engineer",
            "Acme",
            "Berlin",
            "https://x/job/1?from=list",
        )],
    );
    let criteria = FilterCriteria::from_raw("rust", "", "", "rust", false);
    let mut p = pipeline(board, criteria, fast_config()).await;
    let detail = SimDetail::new("We build Rust services")
        .with_control("聊一聊")
        .with_control("投简历")
        .with_confirmation("立即投递");
    p.spawner.insert_detail("https://x/job/1", detail.clone());

    p.dispatcher.run().await.unwrap();

    assert_eq!(detail.activations(), vec!["聊一聊", "投简历", "立即投递"]);
    let stats = p.dispatcher.stats();
    assert_eq!(stats.success_count, 1);
    assert_eq!(stats.daily_count, 1);

    // The processed record survives in the store under the stripped link.
    let processed = p.kv.get("triage_processed").await.unwrap().unwrap();
    let ids: Vec<String> = serde_json::from_value(processed).unwrap();
    assert_eq!(ids, vec!["https://x/job/1"]);

    // The slot and result were consumed.
    assert!(p.channel.task().await.unwrap().is_none());
}

#[tokio::test]
async fn unresponsive_context_times_out_and_run_continues() {
    let board = SimBoard::new(
        &profile(),
        vec![
            SimCard::new("Rust Dev", "Acme", "Berlin", "https://x/job/1"),
            SimCard::new("Rust Lead", "Acme", "Berlin", "https://x/job/2"),
        ],
    );
    let criteria = FilterCriteria::from_raw("rust", "", "", "", false);
    let mut p = pipeline(board, criteria, fast_config()).await;
    p.spawner
        .insert_detail("https://x/job/1", SimDetail::new("body").unresponsive());
    p.spawner
        .insert_detail("https://x/job/2", SimDetail::new("body").with_control("投简历"));

    p.dispatcher.run().await.unwrap();

    // The hung candidate cost a fail; the second one still went through.
    let stats = p.dispatcher.stats();
    assert_eq!(stats.fail_count, 1);
    assert_eq!(stats.success_count, 1);
    assert_eq!(p.spawner.opened().len(), 2);
    // The waiter force-closed the unresponsive context.
    assert!(p.spawner.closed_states()[0]);
    assert!(p.channel.task().await.unwrap().is_none());
}

#[tokio::test]
async fn worker_ignores_stale_task() {
    let kv = Arc::new(MemoryKv::new());
    let channel = Channel::new(Arc::clone(&kv) as Arc<dyn KvStore>);
    let config = fast_config();
    let spawner = SimSpawner::new(channel.clone(), Arc::new(profile()), config);
    let detail = SimDetail::new("body").with_control("投简历");
    spawner.insert_detail("https://x/job/1", detail.clone());

    // A task left over from a session that died over a minute ago.
    let stale = Task {
        seq: 0,
        candidate_id: "https://x/job/1".into(),
        link: "https://x/job/1".into(),
        description_terms: vec![],
        created_at: Utc::now() - TimeDelta::seconds(120),
        auto_close_worker: true,
        status: TaskStatus::Pending,
    };
    let seq = channel.put_task(stale).await.unwrap();

    let handle = spawner.open("https://x/job/1", false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(channel.take_result(seq).await.unwrap().is_none());
    assert!(detail.activations().is_empty());
    // The worker stayed idle rather than self-terminating.
    assert!(!handle.is_closed());
    handle.close().await;
}

#[tokio::test]
async fn second_session_skips_processed_candidates() {
    let kv = Arc::new(MemoryKv::new());
    let criteria = FilterCriteria::from_raw("rust", "", "", "", false);
    let cards = vec![SimCard::new("Rust Dev", "Acme", "Berlin", "https://x/job/1")];

    let board = SimBoard::new(&profile(), cards.clone());
    let mut p = pipeline_on(Arc::clone(&kv), board, criteria.clone(), fast_config()).await;
    p.spawner
        .insert_detail("https://x/job/1", SimDetail::new("body").with_control("投简历"));
    p.dispatcher.run().await.unwrap();
    assert_eq!(p.spawner.opened().len(), 1);

    // Fresh session over the same store: the ledger remembers.
    let board = SimBoard::new(&profile(), cards);
    let mut p2 = pipeline_on(kv, board, criteria, fast_config()).await;
    p2.spawner
        .insert_detail("https://x/job/1", SimDetail::new("body").with_control("投简历"));
    p2.dispatcher.run().await.unwrap();
    assert!(p2.spawner.opened().is_empty());
    assert_eq!(p2.dispatcher.stats().success_count, 1);
}

#[tokio::test]
async fn persisted_processed_list_is_bounded() {
    let cards: Vec<SimCard> = (0..4)
        .map(|i| {
            SimCard::new(
                &format!("Rust Dev {i}"),
                "Acme",
                "Berlin",
                &format!("https://x/job/{i}"),
            )
        })
        .collect();
    let board = SimBoard::new(&profile(), cards);
    let criteria = FilterCriteria::from_raw("rust", "", "", "", false);
    let config = RunConfig {
        idempotency_capacity: 2,
        ..fast_config()
    };
    let mut p = pipeline(board, criteria, config).await;
    for i in 0..4 {
        p.spawner.insert_detail(
            &format!("https://x/job/{i}"),
            SimDetail::new("body").with_control("投简历"),
        );
    }

    p.dispatcher.run().await.unwrap();
    assert_eq!(p.dispatcher.stats().success_count, 4);

    // FIFO eviction kept the persisted set at capacity, oldest dropped.
    let processed = p.kv.get("triage_processed").await.unwrap().unwrap();
    let ids: Vec<String> = serde_json::from_value(processed).unwrap();
    assert_eq!(ids, vec!["https://x/job/2", "https://x/job/3"]);
}

#[tokio::test]
async fn intermediary_postings_can_be_excluded() {
    let board = SimBoard::new(
        &profile(),
        vec![
            SimCard::new("Rust Dev", "Acme", "Berlin", "https://x/job/1").intermediary(),
            SimCard::new("Rust Lead", "Acme", "Berlin", "https://x/job/2"),
        ],
    );
    let criteria = FilterCriteria::from_raw("rust", "", "", "", true);
    let mut p = pipeline(board, criteria, fast_config()).await;
    p.spawner
        .insert_detail("https://x/job/2", SimDetail::new("body").with_control("投简历"));

    p.dispatcher.run().await.unwrap();
    assert_eq!(p.spawner.opened(), vec!["https://x/job/2"]);
}

#[tokio::test]
async fn description_mismatch_records_skip() {
    let board = SimBoard::new(
        &profile(),
        vec![SimCard::new("Rust Dev", "Acme", "Berlin", "https://x/job/1")],
    );
    let criteria = FilterCriteria::from_raw("rust", "", "", "kubernetes", false);
    let mut p = pipeline(board, criteria, fast_config()).await;
    p.spawner.insert_detail(
        "https://x/job/1",
        SimDetail::new("Pure embedded work").with_control("投简历"),
    );

    p.dispatcher.run().await.unwrap();

    let stats = p.dispatcher.stats();
    assert_eq!(stats.skip_count, 1);
    assert_eq!(stats.success_count, 0);
    // Skips earn a processed record so the candidate is not revisited.
    let processed = p.kv.get("triage_processed").await.unwrap().unwrap();
    let ids: Vec<String> = serde_json::from_value(processed).unwrap();
    assert_eq!(ids, vec!["https://x/job/1"]);
}
