/*
 * 配置管理
 * 刷新频率、消失时间、稀有度权重、猜名限制与每日领取冷却都从TOML读取
 * 文件不存在时写出默认配置
 */

use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info};

use crate::core::error::{Result, SpawnError};
use crate::model::{ChatId, RarityTag, VIDEO_RARITY_TAG};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    pub general: GeneralConfig,
    pub spawn: SpawnSettings,
    pub rarity: RaritySettings,
    pub claim: ClaimSettings,
    pub daily: DailySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,
    /// 固定随机种子，便于复现抽取结果
    pub rng_seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnSettings {
    /// 每多少条群消息触发一次刷新
    pub message_frequency: u32,
    /// 刷新后可被抢夺的秒数
    pub despawn_secs: u64,
    /// 错过提示保留的秒数
    pub missed_grace_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaritySettings {
    /// 全局策略未指定权重时使用
    pub default_weight: f64,
    /// 群专属稀有度未指定权重时使用
    pub exclusive_weight: f64,
    pub video_tag: String,
    /// 唯一允许刷新视频角色的群
    pub video_chat_id: Option<ChatId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimSettings {
    pub forbidden_sequences: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailySettings {
    pub cooldown_hours: u32,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            spawn: SpawnSettings::default(),
            rarity: RaritySettings::default(),
            claim: ClaimSettings::default(),
            daily: DailySettings::default(),
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: if cfg!(debug_assertions) { "debug".to_string() } else { "info".to_string() },
            rng_seed: None,
        }
    }
}

impl Default for SpawnSettings {
    fn default() -> Self {
        Self {
            message_frequency: crate::constants::DEFAULT_MESSAGE_FREQUENCY,
            despawn_secs: crate::constants::DEFAULT_DESPAWN_SECS,
            missed_grace_secs: crate::constants::DEFAULT_MISSED_GRACE_SECS,
        }
    }
}

impl Default for RaritySettings {
    fn default() -> Self {
        Self {
            default_weight: crate::constants::DEFAULT_RARITY_WEIGHT,
            exclusive_weight: crate::constants::DEFAULT_EXCLUSIVE_WEIGHT,
            video_tag: VIDEO_RARITY_TAG.to_string(),
            video_chat_id: Some(ChatId(crate::constants::DEFAULT_VIDEO_CHAT_ID)),
        }
    }
}

impl Default for ClaimSettings {
    fn default() -> Self {
        Self {
            forbidden_sequences: vec!["()".to_string(), "&".to_string()],
        }
    }
}

impl Default for DailySettings {
    fn default() -> Self {
        Self { cooldown_hours: 24 }
    }
}

impl SpawnConfig {
    pub fn despawn_after(&self) -> Duration {
        Duration::from_secs(self.spawn.despawn_secs)
    }

    pub fn missed_grace(&self) -> Duration {
        Duration::from_secs(self.spawn.missed_grace_secs)
    }

    pub fn video_tag(&self) -> RarityTag {
        RarityTag::new(self.rarity.video_tag.clone())
    }

    pub fn daily_cooldown(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.daily.cooldown_hours))
    }
}

pub struct ConfigManager {
    config: SpawnConfig,
    config_path: PathBuf,
}

impl ConfigManager {
    /// 读取配置文件，不存在时写出默认配置
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let config_path = path.into();
        let config = Self::load_from_file(&config_path)?;
        Ok(Self { config, config_path })
    }

    pub fn config(&self) -> &SpawnConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn update_config<F>(&mut self, updater: F) -> Result<()>
    where
        F: FnOnce(&mut SpawnConfig),
    {
        let mut next = self.config.clone();
        updater(&mut next);
        Self::validate_config(&next)?;
        Self::save_config_to_file(&next, &self.config_path)?;
        self.config = next;
        info!("配置已更新并保存");
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<SpawnConfig> {
        if !path.exists() {
            info!("配置文件不存在，创建默认配置: {:?}", path);
            let default_config = SpawnConfig::default();
            Self::save_config_to_file(&default_config, path)?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(path)?;
        let config: SpawnConfig = toml::from_str(&content)
            .map_err(|e| SpawnError::Config(format!("解析配置文件失败: {}", e)))?;

        Self::validate_config(&config)?;
        info!("成功加载配置文件: {:?}", path);
        Ok(config)
    }

    pub fn save_config_to_file(config: &SpawnConfig, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(config)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        fs::write(path, content)?;
        debug!("配置已保存到: {:?}", path);
        Ok(())
    }

    pub fn validate_config(config: &SpawnConfig) -> Result<()> {
        if config.general.log_level.trim().is_empty() {
            return Err(SpawnError::Config("日志级别不能为空".to_string()));
        }

        if config.spawn.message_frequency == 0 {
            return Err(SpawnError::Config("刷新消息数必须大于0".to_string()));
        }

        if config.spawn.despawn_secs == 0 {
            return Err(SpawnError::Config("消失时间必须大于0".to_string()));
        }

        for (name, weight) in [
            ("default_weight", config.rarity.default_weight),
            ("exclusive_weight", config.rarity.exclusive_weight),
        ] {
            if !weight.is_finite() || weight <= 0.0 {
                return Err(SpawnError::Config(format!("{} 必须是正数", name)));
            }
        }

        if config.claim.forbidden_sequences.iter().any(|s| s.is_empty()) {
            return Err(SpawnError::Config("禁止字符序列不能为空字符串".to_string()));
        }

        if config.daily.cooldown_hours == 0 {
            return Err(SpawnError::Config("每日领取冷却必须大于0小时".to_string()));
        }

        Ok(())
    }
}
