//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为假节拍器控制器与睡眠覆盖开关提供集中的错误定义，测试代码只需匹配一个枚举即可区分
//!   “等待超时”与“生命周期误用”两类问题；
//! - 唯一可恢复的错误路径是超时：调用方可以重试、延长超时或直接判定测试失败。
//!
//! ## 设计要求（What）
//! - 所有变体派生 `thiserror::Error`，与 `std::error::Error` 生态兼容；
//! - 超时类错误必须携带“实际数量 vs 期望数量”，便于直接写入断言信息。

use std::time::Duration;

use thiserror::Error;

/// 假节拍器与睡眠覆盖的统一错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：把“未激活即调用”“重复激活”等误用从未定义行为收敛为显式错误，
///   同时为 `wait_for_count` 的超时提供可读诊断。
/// - **契约 (What)**：
///   - 变体均为 `Clone + Eq`，测试可以直接 `assert_eq!` 比较；
///   - `operation`/`component` 使用 `&'static str`，避免在错误路径上额外分配。
/// - **风险 (Trade-offs)**：派发到无读者的通道属于“无限阻塞”而非错误，本枚举不会覆盖该场景；
///   需要有界等待时请改用 `dispatch_timeout`。
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum FakeTickersError {
    /// 在未激活（或已停用）的组件上执行了需要激活状态的操作。
    #[error("`{operation}` requires an active interception, but none is installed")]
    NotActive { operation: &'static str },

    /// 组件已处于激活状态，拒绝重复激活。
    #[error("{component} is already active; deactivate it before activating again")]
    AlreadyActive { component: &'static str },

    /// `wait_for_count` 在超时窗口内未等到足够数量的节拍器创建。
    #[error("timed out after {waited:?}: only {actual} tickers created (expected at least {expected})")]
    Timeout {
        actual: usize,
        expected: usize,
        waited: Duration,
    },

    /// `dispatch_timeout` 在截止时间前未能把节拍送达全部匹配的节拍器。
    #[error("dispatch to tag `{tag}` timed out: delivered {delivered} of {expected} ticks")]
    DispatchTimeout {
        tag: String,
        delivered: usize,
        expected: usize,
    },
}

impl FakeTickersError {
    /// 判断错误是否为可重试的超时类错误。
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            FakeTickersError::Timeout { .. } | FakeTickersError::DispatchTimeout { .. }
        )
    }
}
