// ==========================================
// 工艺成本核算系统 - 工艺快照
// ==========================================
// 职责: 不可变的工艺结构聚合视图,供核算/校验/执行共用
// 红线: 快照按 active=1 过滤软删除实体;成本口径只依赖快照,
//       目录后续编辑不得回溯影响在途/已完成批次
// ==========================================

use crate::domain::catalog::{
    CostItem, Process, ProcessSubprocess, Subprocess, SubstituteGroup, VariantUsage,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ==========================================
// SnapshotGroup - 快照内的替代组及其成员
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotGroup {
    pub group: SubstituteGroup,
    /// 组内有效成员 (active=1),按 usage_id 排序保证遍历稳定
    pub members: Vec<VariantUsage>,
}

impl SnapshotGroup {
    /// 判断 usage_id 是否为本组有效成员
    pub fn contains_usage(&self, usage_id: &str) -> bool {
        self.members.iter().any(|m| m.usage_id == usage_id)
    }
}

// ==========================================
// SnapshotSubprocess - 快照内的子工序节点
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSubprocess {
    pub link: ProcessSubprocess,
    pub subprocess: Subprocess,
    /// 子工序全部有效用料 (含已入组成员)
    pub usages: Vec<VariantUsage>,
    /// 子工序内的替代组
    pub groups: Vec<SnapshotGroup>,
    /// 非材料成本项
    pub cost_items: Vec<CostItem>,
}

impl SnapshotSubprocess {
    /// 未入组的用料 (直接参与成本合计,不经过替代组)
    pub fn ungrouped_usages(&self) -> impl Iterator<Item = &VariantUsage> {
        self.usages.iter().filter(|u| u.group_id.is_none())
    }
}

// ==========================================
// ProcessSnapshot - 工艺快照聚合根
// ==========================================
// 按 sequence_order 升序持有子工序节点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub process: Process,
    pub subprocesses: Vec<SnapshotSubprocess>,
}

impl ProcessSnapshot {
    /// 快照捕获时的工艺版本号
    pub fn version(&self) -> i64 {
        self.process.version
    }

    /// 自快照可达的全部替代组
    pub fn reachable_groups(&self) -> impl Iterator<Item = &SnapshotGroup> {
        self.subprocesses.iter().flat_map(|sp| sp.groups.iter())
    }

    /// 按 group_id 查找可达替代组
    pub fn find_group(&self, group_id: &str) -> Option<&SnapshotGroup> {
        self.reachable_groups().find(|g| g.group.group_id == group_id)
    }

    /// 按 usage_id 查找用料
    pub fn find_usage(&self, usage_id: &str) -> Option<&VariantUsage> {
        self.subprocesses
            .iter()
            .flat_map(|sp| sp.usages.iter())
            .find(|u| u.usage_id == usage_id)
    }

    /// 快照涉及的全部变体ID (去重,有序)
    pub fn variant_ids(&self) -> Vec<String> {
        let set: BTreeSet<String> = self
            .subprocesses
            .iter()
            .flat_map(|sp| sp.usages.iter())
            .map(|u| u.variant_id.clone())
            .collect();
        set.into_iter().collect()
    }
}
