//! 睡眠覆盖开关：让注入的 [`Sleeper`] 在覆盖期间立即返回。
//!
//! 与节拍器控制器没有任何共享状态，生命周期相互独立。

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::FakeTickersError;
use crate::time::{Sleeper, SystemSleeper};

/// 可被临时“短路”的睡眠实现。
///
/// # 教案式说明
/// - **意图 (Why)**：生产循环里的 `sleep(Duration::from_secs(3600))` 在测试中应当零耗时完成，
///   而覆盖结束后又必须恢复真实等待；
/// - **契约 (What)**：
///   - 覆盖期间任意时长（包括极大值）的 `sleep` 都立即返回，并计入 [`elided_count`](Self::elided_count)；
///   - 未覆盖时委托给回落实现（默认 [`SystemSleeper`]）；
///   - 同一时刻只允许存在一个 [`SleepOverride`] 句柄，它是单一的全局开/关；
/// - **实现 (How)**：克隆共享同一份原子状态，覆盖句柄释放时把开关复位。
#[derive(Clone)]
pub struct FakeSleeper {
    state: Arc<OverrideState>,
    fallback: Arc<dyn Sleeper>,
}

#[derive(Debug, Default)]
struct OverrideState {
    overridden: AtomicBool,
    elided: AtomicU64,
}

impl FakeSleeper {
    /// 以 [`SystemSleeper`] 作为回落实现构造。
    pub fn new() -> Self {
        Self::with_fallback(Arc::new(SystemSleeper))
    }

    /// 以指定的回落实现构造。
    pub fn with_fallback(fallback: Arc<dyn Sleeper>) -> Self {
        Self {
            state: Arc::new(OverrideState::default()),
            fallback,
        }
    }

    /// 打开覆盖，返回的句柄在 [`SleepOverride::deactivate`] 或释放时恢复真实睡眠。
    pub fn activate_override(&self) -> Result<SleepOverride, FakeTickersError> {
        self.state
            .overridden
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| FakeTickersError::AlreadyActive {
                component: "sleep override",
            })?;
        debug!("sleep override activated");
        Ok(SleepOverride {
            state: Some(Arc::clone(&self.state)),
        })
    }

    /// 覆盖是否生效。
    pub fn is_overridden(&self) -> bool {
        self.state.overridden.load(Ordering::Acquire)
    }

    /// 覆盖期间被跳过的睡眠次数（累计值）。
    pub fn elided_count(&self) -> u64 {
        self.state.elided.load(Ordering::Relaxed)
    }
}

impl Default for FakeSleeper {
    fn default() -> Self {
        Self::new()
    }
}

impl Sleeper for FakeSleeper {
    fn sleep(&self, duration: Duration) {
        if self.is_overridden() {
            self.state.elided.fetch_add(1, Ordering::Relaxed);
            trace!(?duration, "sleep elided");
            return;
        }
        self.fallback.sleep(duration);
    }
}

impl fmt::Debug for FakeSleeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeSleeper")
            .field("overridden", &self.is_overridden())
            .field("elided", &self.elided_count())
            .finish_non_exhaustive()
    }
}

/// 睡眠覆盖句柄。
#[derive(Debug)]
#[must_use = "dropping the handle immediately restores real sleeping"]
pub struct SleepOverride {
    state: Option<Arc<OverrideState>>,
}

impl SleepOverride {
    /// 关闭覆盖，恢复真实睡眠。
    pub fn deactivate(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(state) = self.state.take() {
            state.overridden.store(false, Ordering::Release);
            debug!(
                elided = state.elided.load(Ordering::Relaxed),
                "sleep override deactivated"
            );
        }
    }
}

impl Drop for SleepOverride {
    fn drop(&mut self) {
        self.release();
    }
}
