#![doc = r#"
# spark-faketickers

## 设计动机（Why）
- **定位**：让测试代码确定性地驱动依赖时间的后台循环（“每 15 分钟出一次报表”之类），
  既不真实等待，也不需要为测试改写生产逻辑的节奏参数。
- **注入而非打补丁**：生产代码不直接调用系统节拍器/睡眠原语，而是持有
  [`TickerFactory`]/[`Sleeper`] 能力；测试注入 [`FakeTickers`]/[`FakeSleeper`] 后即可接管时间。

## 核心契约（What）
- [`FakeTickers`]：激活期间拦截节拍器创建，支持标签路由、手动派发、创建屏障、立即模式与停用协议；
  停用后创建行为与真实工厂完全一致；
- [`FakeSleeper`]：覆盖期间所有睡眠立即返回，句柄释放后恢复；
- [`FakeTickersError`]：唯一可恢复的错误是超时，其余为生命周期误用的显式报告。

## 实现策略（How）
- 通道使用 `crossbeam` 零容量会合通道，派发即“交到读者手里”，没有积压；
- 登记表由 `parking_lot::Mutex` 保护，创建屏障使用 `parking_lot::Condvar` 事件驱动；
- 日志统一通过 `tracing` 输出，本 crate 从不安装订阅者。

## 风险与考量（Trade-offs）
- 向没有读者等待的节拍器派发会无限阻塞，这是测试编排的契约而非故障；测试套件中建议
  总是使用带超时的 `wait_for_count`，必要时改用 `dispatch_timeout`；
- 每个控制器同一时刻只允许一次激活，标签对控制器全局生效。
"#]

mod error;
mod sleep;
mod tickers;
mod time;

pub use error::FakeTickersError;
pub use sleep::{FakeSleeper, SleepOverride};
pub use tickers::{FakeTickerOptions, FakeTickers, UNTAGGED};
pub use time::{Sleeper, SystemSleeper, SystemTickers, Ticker, TickerFactory};

pub use crossbeam::channel::{RecvTimeoutError, TryRecvError};
