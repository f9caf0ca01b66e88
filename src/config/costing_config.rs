// ==========================================
// 工艺成本核算系统 - 核算配置
// ==========================================
// 职责: 执行时取价口径等运行配置
// 说明: 批次创建时将生效配置以 JSON 快照固化到批次上,
//       后续配置变更不回溯影响在途批次
// ==========================================

use crate::domain::types::PricingMode;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 核算配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostingConfig {
    /// 执行时实际单价的取价模式
    pub actual_pricing_mode: PricingMode,
}

impl Default for CostingConfig {
    fn default() -> Self {
        Self {
            actual_pricing_mode: PricingMode::CheapestActive,
        }
    }
}

impl CostingConfig {
    /// 从 JSON 配置文件加载;文件不存在时返回默认配置
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!("配置文件不存在,使用默认配置: {}", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("解析配置文件失败: {}", path.display()))?;
        Ok(config)
    }

    /// 序列化为批次配置快照 JSON
    pub fn to_snapshot_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// 从批次配置快照 JSON 还原;快照缺失/损坏时返回 None,由调用方决定回退
    pub fn from_snapshot_json(json: &str) -> Option<Self> {
        serde_json::from_str(json).ok()
    }
}
