use std::sync::Arc;

use autotriage::board::sim::{SimBoard, SimCard, SimDetail, SimSpawner};
use autotriage::board::{ContextSpawner, SourceProfile, Surface};
use autotriage::channel::Channel;
use autotriage::config::RunConfig;
use autotriage::dispatcher::Dispatcher;
use autotriage::filter::FilterCriteria;
use autotriage::growth::GrowthController;
use autotriage::ledger::Ledger;
use autotriage::scanner::Scanner;
use autotriage::store::{KvStore, MemoryKv};

/// Runs the pipeline against the built-in simulated board, driven entirely
/// by environment variables. A real deployment swaps in surface and spawner
/// implementations bound to an actual listing source.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = RunConfig::from_env();
    let criteria = FilterCriteria::from_raw(
        &env_or("AUTOTRIAGE_TITLE_TERMS", ""),
        &env_or("AUTOTRIAGE_LOCATION_TERMS", ""),
        &env_or("AUTOTRIAGE_CITY_TERMS", ""),
        &env_or("AUTOTRIAGE_DESCRIPTION_TERMS", ""),
        env_or("AUTOTRIAGE_EXCLUDE_INTERMEDIARY", "0") == "1",
    );

    eprintln!("autotriage v{} (simulated board)", env!("CARGO_PKG_VERSION"));
    eprintln!("   title terms:       {:?}", criteria.title_terms);
    eprintln!("   description terms: {:?}", criteria.description_terms);
    eprintln!("   daily limit:       {}", config.daily_limit);

    let kv = Arc::new(MemoryKv::new());
    let profile = Arc::new(SourceProfile::default());
    let channel = Channel::new(Arc::clone(&kv) as Arc<dyn KvStore>);

    let board = SimBoard::new(&profile, demo_cards()).revealed(3).with_next_control();
    let spawner = Arc::new(SimSpawner::new(
        channel.clone(),
        Arc::clone(&profile),
        config.clone(),
    ));
    for (link, detail) in demo_details() {
        spawner.insert_detail(link, detail);
    }

    let ledger = Ledger::load(
        Arc::clone(&kv) as Arc<dyn KvStore>,
        config.idempotency_capacity,
    )
    .await?;

    let surface: Arc<dyn Surface> = Arc::new(board);
    let mut dispatcher = Dispatcher::new(
        Scanner::new(Arc::clone(&surface), Arc::clone(&profile)),
        GrowthController::new(surface, Arc::clone(&profile), config.clone()),
        channel,
        spawner as Arc<dyn ContextSpawner>,
        ledger,
        criteria,
        config,
    );
    dispatcher.run().await?;

    let stats = dispatcher.stats();
    eprintln!(
        "done: {} succeeded, {} skipped, {} failed ({} today)",
        stats.success_count, stats.skip_count, stats.fail_count, stats.daily_count
    );
    Ok(())
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn demo_cards() -> Vec<SimCard> {
    vec![
        SimCard::new("Rust 后端工程师", "Acme", "上海-浦东", "https://sim/job/1?from=list"),
        SimCard::new("Java 开发", "Globex", "北京", "https://sim/job/2"),
        SimCard::new("Rust 平台工程师", "Initech", "上海", "https://sim/job/3").intermediary(),
        SimCard::new("前端工程师", "Hooli", "深圳", "https://sim/job/4"),
        SimCard::new("Rust 存储工程师", "Umbrella", "上海", "https://sim/job/5"),
    ]
}

fn demo_details() -> Vec<(&'static str, SimDetail)> {
    vec![
        (
            "https://sim/job/1",
            SimDetail::new("负责 Rust 服务端开发，tokio 技术栈")
                .with_control("聊一聊")
                .with_control("投简历")
                .with_confirmation("立即投递"),
        ),
        ("https://sim/job/2", SimDetail::new("Java 微服务").with_control("立即沟通")),
        (
            "https://sim/job/3",
            SimDetail::new("Rust 平台组").with_control("立即沟通"),
        ),
        ("https://sim/job/4", SimDetail::new("前端岗位").with_control("投简历")),
        (
            "https://sim/job/5",
            SimDetail::new("分布式存储，Rust 优先")
                .with_control("投简历")
                .appearing_after(2),
        ),
    ]
}
