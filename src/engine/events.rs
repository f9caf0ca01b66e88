// ==========================================
// 工艺成本核算系统 - 引擎层事件发布
// ==========================================
// 职责: 定义批次事件发布 trait,实现依赖倒置
// 说明: 本核心只发射结构化事件,审计持久化属于外部边界
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 批次事件类型
// ==========================================

/// 批次事件触发类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LotEventType {
    /// 批次创建
    LotCreated,
    /// 替代组选型
    LotSelected,
    /// 执行完成
    LotExecuted,
    /// 批次取消
    LotCancelled,
    /// 执行失败 (不可重试)
    LotFailed,
}

impl LotEventType {
    /// 转换为事件标识 (审计边界的事件名约定)
    pub fn as_str(&self) -> &'static str {
        match self {
            LotEventType::LotCreated => "lot.created",
            LotEventType::LotSelected => "lot.selected",
            LotEventType::LotExecuted => "lot.executed",
            LotEventType::LotCancelled => "lot.cancelled",
            LotEventType::LotFailed => "lot.failed",
        }
    }
}

/// 批次事件
///
/// 引擎层发布的事件,包含批次ID、类型、操作人与负载
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotEvent {
    /// 批次 ID
    pub lot_id: String,
    /// 事件类型
    pub event_type: LotEventType,
    /// 操作人
    pub actor: String,
    /// 事件负载 (JSON)
    pub payload: serde_json::Value,
    /// 发生时间
    pub occurred_at: NaiveDateTime,
}

impl LotEvent {
    pub fn new(
        lot_id: String,
        event_type: LotEventType,
        actor: String,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            lot_id,
            event_type,
            actor,
            payload,
            occurred_at: chrono::Local::now().naive_local(),
        }
    }
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 批次事件发布者 Trait
///
/// 引擎层定义,审计/消息边界实现。
/// 本核心绝不持久化事件,只负责发射。
pub trait LotEventPublisher: Send + Sync {
    /// 发布批次事件
    ///
    /// # 返回
    /// - `Ok(())`: 发布成功
    /// - `Err`: 发布失败 (调用方仅告警,不影响主流程)
    fn publish(&self, event: LotEvent) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// 空操作事件发布者
///
/// 用于不需要事件发布的场景（如单元测试）
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl LotEventPublisher for NoOpEventPublisher {
    fn publish(&self, event: LotEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpEventPublisher: 跳过事件发布 - lot_id={}, event_type={}",
            event.lot_id,
            event.event_type.as_str()
        );
        Ok(())
    }
}

/// 可选的事件发布者包装
///
/// 简化 Option<Arc<dyn LotEventPublisher>> 的使用
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn LotEventPublisher>>,
}

impl OptionalEventPublisher {
    /// 创建带发布者的实例
    pub fn with_publisher(publisher: Arc<dyn LotEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    /// 创建空实例（不发布事件）
    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 发布事件（如果有发布者）
    pub fn publish(&self, event: LotEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        match &self.inner {
            Some(publisher) => publisher.publish(event),
            None => {
                tracing::debug!(
                    "OptionalEventPublisher: 未配置发布者，跳过事件 - lot_id={}, event_type={}",
                    event.lot_id,
                    event.event_type.as_str()
                );
                Ok(())
            }
        }
    }

    /// 检查是否配置了发布者
    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalEventPublisher {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// 收集事件的测试发布者
    struct CollectingPublisher {
        events: Mutex<Vec<LotEvent>>,
    }

    impl LotEventPublisher for CollectingPublisher {
        fn publish(&self, event: LotEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    #[test]
    fn test_event_type_identifiers() {
        assert_eq!(LotEventType::LotCreated.as_str(), "lot.created");
        assert_eq!(LotEventType::LotSelected.as_str(), "lot.selected");
        assert_eq!(LotEventType::LotExecuted.as_str(), "lot.executed");
        assert_eq!(LotEventType::LotCancelled.as_str(), "lot.cancelled");
        assert_eq!(LotEventType::LotFailed.as_str(), "lot.failed");
    }

    #[test]
    fn test_optional_publisher_forwards() {
        let collector = Arc::new(CollectingPublisher {
            events: Mutex::new(Vec::new()),
        });
        let publisher = OptionalEventPublisher::with_publisher(collector.clone());
        assert!(publisher.is_configured());

        let event = LotEvent::new(
            "LOT-1".to_string(),
            LotEventType::LotExecuted,
            "tester".to_string(),
            serde_json::json!({"actual_total_cost": 518.0}),
        );
        publisher.publish(event).unwrap();

        let events = collector.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].lot_id, "LOT-1");
    }

    #[test]
    fn test_none_publisher_is_silent() {
        let publisher = OptionalEventPublisher::none();
        assert!(!publisher.is_configured());
        let event = LotEvent::new(
            "LOT-1".to_string(),
            LotEventType::LotCreated,
            "tester".to_string(),
            serde_json::json!({}),
        );
        assert!(publisher.publish(event).is_ok());
    }
}
