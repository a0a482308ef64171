// 角色刷新核心命令行入口
// init-config 写出默认配置，simulate 用内存服务模拟多个群的刷新与抢夺

use anyhow::Context;
use chatspawn::{
    model::{ChatInfo, InboundMessage, UserInfo},
    services::memory::{demo_characters, demo_rarity_policy, MemoryCatalog, MemoryMessenger, MemoryRarityPolicy, MemoryStats},
    spawn::RejectReason,
    ClaimOutcome, ConfigManager, InboundEvent, MessageOutcome, Services, SpawnConfig, SpawnEngine, SpawnOutcome,
};
use chatspawn::utils::RandomGenerator;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "chatspawn", version, about = "聊天群角色刷新/抢夺核心")]
struct Cli {
    /// 配置文件路径，不存在时写出默认配置
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 覆盖配置中的日志级别
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 写出默认配置文件
    InitConfig { path: PathBuf },

    /// 用内存服务模拟刷新与抢夺
    Simulate {
        /// JSON格式的角色库，缺省使用内置演示角色
        #[arg(long)]
        catalog: Option<PathBuf>,

        #[arg(long, default_value_t = 3)]
        chats: u32,

        /// 每个群的消息数
        #[arg(long, default_value_t = 200)]
        messages: u32,

        #[arg(long)]
        seed: Option<u64>,

        /// 每条消息后有人猜名的概率
        #[arg(long, default_value_t = 0.1)]
        guess_rate: f64,
    },
}

#[derive(Debug, Default)]
struct Summary {
    spawns: u32,
    failed_spawns: u32,
    claims: u32,
    wrong_guesses: u32,
    late_guesses: u32,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("运行失败: {:#}", e);
        eprintln!("错误: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => ConfigManager::open(path.clone())
            .with_context(|| format!("无法加载配置 {:?}", path))?
            .config()
            .clone(),
        None => SpawnConfig::default(),
    };

    let log_level = cli.log_level.as_deref().unwrap_or(&config.general.log_level);
    chatspawn::init(log_level)?;

    match cli.command {
        Command::InitConfig { path } => {
            ConfigManager::save_config_to_file(&SpawnConfig::default(), &path)?;
            println!("默认配置已写入 {}", path.display());
            Ok(())
        }
        Command::Simulate {
            catalog,
            chats,
            messages,
            seed,
            guess_rate,
        } => {
            let mut config = config;
            if seed.is_some() {
                config.general.rng_seed = seed;
            }
            simulate(config, catalog, chats, messages, guess_rate.clamp(0.0, 1.0)).await
        }
    }
}

async fn simulate(
    config: SpawnConfig,
    catalog_path: Option<PathBuf>,
    chats: u32,
    messages: u32,
    guess_rate: f64,
) -> anyhow::Result<()> {
    let catalog = match &catalog_path {
        Some(path) => MemoryCatalog::from_json_file(path)?,
        None => MemoryCatalog::new(demo_characters()),
    };
    let catalog = Arc::new(catalog);
    let messenger = Arc::new(MemoryMessenger::new());
    let stats = Arc::new(MemoryStats::new());
    let services = Services::new(
        catalog.clone(),
        Arc::new(MemoryRarityPolicy::new(demo_rarity_policy())),
        messenger.clone(),
        stats.clone(),
    );

    let engine = SpawnEngine::new(services, &config);
    let mut rng = RandomGenerator::from_optional_seed(config.general.rng_seed);
    let mut summary = Summary::default();
    info!("开始模拟: {} 个群，每群 {} 条消息", chats, messages);

    let groups: Vec<ChatInfo> = (1..=i64::from(chats))
        .map(|n| ChatInfo::supergroup(-1_001_000_000_000 - n, format!("Group {}", n)))
        .collect();
    let users: Vec<UserInfo> = (1..=8).map(|n| UserInfo::new(n, format!("Player {}", n))).collect();

    for _ in 0..messages {
        for chat in &groups {
            let sender = rng.choose(&users).cloned();
            let event = InboundEvent::Message(InboundMessage::new(chat.clone(), sender));

            if let chatspawn::spawn::EventOutcome::Message(MessageOutcome::Triggered(handle)) =
                engine.dispatch(event).await
            {
                match handle.await.context("刷新任务异常")? {
                    SpawnOutcome::Published { .. } => summary.spawns += 1,
                    _ => summary.failed_spawns += 1,
                }
            }

            if rng.range_f64(0.0, 1.0) >= guess_rate {
                continue;
            }
            let user = match rng.choose(&users) {
                Some(user) => user.clone(),
                None => continue,
            };
            let guess = guess_text(&engine, chat, &mut rng).await;

            match engine.attempt_claim(chat, &user, &guess).await {
                ClaimOutcome::Accepted(receipt) => {
                    summary.claims += 1;
                    println!("{} 在 {} 抢到了 {}", user.first_name, chat.id, receipt.character.name);
                }
                ClaimOutcome::Rejected(RejectReason::WrongName { .. }) => summary.wrong_guesses += 1,
                ClaimOutcome::AlreadyClaimed { .. } | ClaimOutcome::NoActiveSpawn => summary.late_guesses += 1,
                ClaimOutcome::Rejected(_) => {}
            }
        }
    }

    println!();
    println!("刷新: {} (失败 {})", summary.spawns, summary.failed_spawns);
    println!("抢夺: {}，猜错: {}，来晚了: {}", summary.claims, summary.wrong_guesses, summary.late_guesses);
    println!("消息: 发送 {}，删除 {}", messenger.posted().len(), messenger.deleted().len());
    for (chat, totals) in stats.top_groups() {
        println!(
            "  {} {}: {}",
            chat,
            totals.group_name.as_deref().unwrap_or("-"),
            totals.count
        );
    }

    #[cfg(feature = "daily-claim")]
    {
        let daily = chatspawn::DailyClaimService::new(
            catalog,
            stats.clone(),
            config.daily_cooldown(),
            RandomGenerator::from_optional_seed(config.general.rng_seed),
        );
        for user in &users {
            if let chatspawn::DailyOutcome::Granted(character) = daily.claim(user).await? {
                println!("每日领取: {} -> {}", user.first_name, character.name);
            }
        }
    }

    Ok(())
}

/// 一半概率猜对当前刷新的角色
async fn guess_text(engine: &SpawnEngine, chat: &ChatInfo, rng: &mut RandomGenerator) -> String {
    let active = engine
        .snapshot(chat.id)
        .await
        .and_then(|snapshot| snapshot.active_spawn);

    match active {
        Some(record) if rng.range_f64(0.0, 1.0) < 0.5 => {
            let parts: Vec<&str> = record.character.name.split_whitespace().collect();
            rng.choose(&parts)
                .map(|part| part.to_string())
                .unwrap_or_else(|| record.character.name.clone())
        }
        _ => "nobody".to_string(),
    }
}
