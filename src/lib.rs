// 聊天群角色刷新/抢夺核心
// 群消息达到阈值刷新角色，先猜中名字的用户获得角色
// 架构：外部服务通过接口注入，每个群的状态独立加锁

// 核心模块
pub mod core;
pub mod model;
pub mod services;
pub mod spawn;
pub mod utils;

// 可选功能
#[cfg(feature = "daily-claim")]
pub mod daily;

// 重新导出核心类型
pub use crate::core::{ConfigManager, ErrorSeverity, Result, SpawnConfig, SpawnError};
pub use model::{Character, ChatId, ChatInfo, InboundMessage, UserId, UserInfo};
pub use services::{Services, ServiceError};
pub use spawn::{ClaimOutcome, InboundEvent, MessageOutcome, SpawnEngine, SpawnOutcome};

#[cfg(feature = "daily-claim")]
pub use daily::{DailyClaimService, DailyOutcome};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = "chatspawn";

// 默认参数
pub mod constants {
    /// 每多少条群消息刷新一次
    pub const DEFAULT_MESSAGE_FREQUENCY: u32 = 40;
    pub const DEFAULT_DESPAWN_SECS: u64 = 180;
    pub const DEFAULT_MISSED_GRACE_SECS: u64 = 10;

    pub const DEFAULT_RARITY_WEIGHT: f64 = 5.0;
    pub const DEFAULT_EXCLUSIVE_WEIGHT: f64 = 10.0;

    /// 唯一允许刷新视频角色的群
    pub const DEFAULT_VIDEO_CHAT_ID: i64 = -1003100468240;
}

/// 初始化日志。RUST_LOG 优先于传入的级别，重复调用不报错
pub fn init(log_level: &str) -> Result<()> {
    use tracing_subscriber::EnvFilter;

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!("chatspawn={}", log_level))
            .map_err(|e| SpawnError::Config(format!("无效的日志级别 {}: {}", log_level, e)))?,
    };

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
    {
        tracing::info!("角色刷新核心初始化完成 v{}", VERSION);
    }

    Ok(())
}
