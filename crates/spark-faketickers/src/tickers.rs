//! 假节拍器控制器：拦截节拍器创建、按标签派发节拍、等待创建屏障与停用协议。
//!
//! # 模块定位（Why）
//! - 后台循环通常形如“创建周期节拍器 → 循环读取节拍 → 执行业务”，若使用真实时间，测试只能等待
//!   十几分钟或缩短周期碰运气；
//! - [`FakeTickers`] 实现 [`TickerFactory`]，激活期间交出由测试控制的节拍器，测试可以逐次手动派发
//!   （[`FakeTickers::dispatch`]），也可以在构造时选择立即模式，让后台任务以读者能消费的最快速度灌入节拍。
//!
//! # 结构概览（What）
//! - 登记表：激活期间创建的全部节拍器记录（标签 + 发送端），与当前标签、激活状态共用一把互斥锁；
//! - 标签路由：[`FakeTickers::set_tag`] 改写“当前标签”，只影响之后创建的节拍器；
//! - 手动派发：[`FakeTickers::dispatch`] 对标签完全相等的记录逐个阻塞发送一次时间戳；
//! - 创建屏障：[`FakeTickers::wait_for_count`] 基于条件变量等待登记表达到阈值；
//! - 立即模式：每个记录配一个灌注线程，与停机广播竞争；
//! - 停用协议：[`FakeTickers::deactivate`] 广播停机 → 等待全部灌注线程退出 → 恢复原始创建行为 → 关闭全部通道。
//!
//! # 风险提示（Trade-offs）
//! - 派发是无界阻塞的：若匹配的节拍器没有读者正在等待，调用会一直阻塞，这说明测试没有先用
//!   `wait_for_count` 与生产线程对齐。需要有界等待时使用 [`FakeTickers::dispatch_timeout`]；
//! - 标签对控制器全局生效而非按线程生效，并发创建多个节拍器时需要逐个 `set_tag` + `wait_for_count`。

use std::fmt;
use std::mem;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, SendTimeoutError, Sender};
use crossbeam::select;
use crossbeam::sync::WaitGroup;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::error::FakeTickersError;
use crate::time::{SystemTickers, Ticker, TickerFactory};

/// 默认（未打标签）分组。
pub const UNTAGGED: &str = "";

/// 控制器的构造期配置。
///
/// # 教案式说明
/// - **意图 (Why)**：把“是否启用立即模式”“停用后回落到哪个真实工厂”在构造时固定下来，
///   运行期不可变，避免测试中途切换模式导致部分节拍器没有灌注线程；
/// - **契约 (What)**：默认手动模式，回落工厂为 [`SystemTickers`]。
#[derive(Clone)]
pub struct FakeTickerOptions {
    immediate: bool,
    fallback: Arc<dyn TickerFactory>,
}

impl FakeTickerOptions {
    /// 以默认值构造配置。
    pub fn new() -> Self {
        Self::default()
    }

    /// 启用或关闭立即模式。
    pub fn with_immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    /// 指定未激活时负责创建节拍器的真实工厂。
    pub fn with_fallback(mut self, fallback: Arc<dyn TickerFactory>) -> Self {
        self.fallback = fallback;
        self
    }

    /// 当前是否启用立即模式。
    pub fn immediate(&self) -> bool {
        self.immediate
    }
}

impl Default for FakeTickerOptions {
    fn default() -> Self {
        Self {
            immediate: false,
            fallback: Arc::new(SystemTickers),
        }
    }
}

impl fmt::Debug for FakeTickerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeTickerOptions")
            .field("immediate", &self.immediate)
            .finish_non_exhaustive()
    }
}

/// 可被测试代码驱动的节拍器工厂。
///
/// # 教案式说明
/// - **意图 (Why)**：生产代码通过 `Arc<dyn TickerFactory>` 创建节拍器；测试把同一个 `Arc<FakeTickers>`
///   注入进去，即可在不修改生产代码的前提下接管其时间节奏；
/// - **契约 (What)**：
///   - 每个控制器同一时刻至多处于一次激活期，重复 [`activate`](Self::activate) 返回
///     [`FakeTickersError::AlreadyActive`]；
///   - 未激活时 [`new_ticker`](TickerFactory::new_ticker) 原样委托给回落工厂，创建的节拍器不会进入登记表；
///   - 激活期间创建的通道只在 [`deactivate`](Self::deactivate) 中关闭，且一定晚于全部灌注线程退出；
/// - **实现 (How)**：登记表、当前标签与激活信息共享一把 `parking_lot::Mutex`；通道使用零容量的
///   `crossbeam` 会合通道，“关闭”即释放最后一个发送端。
///
/// ```
/// use std::sync::Arc;
/// use std::thread;
/// use std::time::Duration;
///
/// use spark_faketickers::{FakeTickerOptions, FakeTickers, TickerFactory};
///
/// let fake = Arc::new(FakeTickers::started(FakeTickerOptions::new()));
/// let factory: Arc<dyn TickerFactory> = fake.clone();
/// let worker = thread::spawn(move || {
///     let ticker = factory.new_ticker(Duration::from_secs(15 * 60));
///     ticker.recv().is_some()
/// });
///
/// fake.wait_for_count(1, Some(Duration::from_secs(5))).unwrap();
/// assert_eq!(fake.tick().unwrap(), 1);
/// assert!(worker.join().unwrap());
/// fake.deactivate().unwrap();
/// ```
pub struct FakeTickers {
    state: Mutex<ControllerState>,
    created: Condvar,
    options: FakeTickerOptions,
}

struct ControllerState {
    activation: Option<Activation>,
    registry: Vec<TimerRecord>,
    current_tag: String,
    next_id: u64,
    // 激活期代号：每次激活/停用递增，等待者据此识别“中途被停用过”。
    epoch: u64,
}

/// 一次激活期内的停机广播与灌注线程计数。
struct Activation {
    // 唯一的发送端：释放即向全部灌注线程广播停机。
    shutdown: Sender<()>,
    shutdown_signal: Receiver<()>,
    floods: WaitGroup,
}

impl Activation {
    fn new() -> Self {
        let (shutdown, shutdown_signal) = channel::bounded(0);
        Self {
            shutdown,
            shutdown_signal,
            floods: WaitGroup::new(),
        }
    }

    fn enlist(&self, sender: Sender<Instant>) -> FloodTask {
        FloodTask {
            sender,
            shutdown: self.shutdown_signal.clone(),
            member: self.floods.clone(),
        }
    }
}

struct TimerRecord {
    id: u64,
    tag: String,
    sender: Sender<Instant>,
}

impl FakeTickers {
    /// 构造未激活、手动模式的控制器。
    pub fn new() -> Self {
        Self::with_options(FakeTickerOptions::default())
    }

    /// 以给定配置构造未激活的控制器。
    pub fn with_options(options: FakeTickerOptions) -> Self {
        Self::build(options, None)
    }

    /// 构造并立即激活控制器。
    pub fn started(options: FakeTickerOptions) -> Self {
        debug!(immediate = options.immediate, "fake tickers activated");
        Self::build(options, Some(Activation::new()))
    }

    fn build(options: FakeTickerOptions, activation: Option<Activation>) -> Self {
        Self {
            state: Mutex::new(ControllerState {
                activation,
                registry: Vec::new(),
                current_tag: String::new(),
                next_id: 0,
                epoch: 0,
            }),
            created: Condvar::new(),
            options,
        }
    }

    /// 安装拦截：此后创建的节拍器都由测试控制。
    ///
    /// 登记表清空，当前标签重置为 [`UNTAGGED`]。
    pub fn activate(&self) -> Result<(), FakeTickersError> {
        let mut state = self.state.lock();
        if state.activation.is_some() {
            return Err(FakeTickersError::AlreadyActive {
                component: "FakeTickers",
            });
        }
        state.activation = Some(Activation::new());
        state.epoch += 1;
        state.registry.clear();
        state.current_tag.clear();
        debug!(immediate = self.options.immediate, "fake tickers activated");
        Ok(())
    }

    /// 停用拦截并关闭本次激活期内创建的全部通道。
    ///
    /// # 教案式说明
    /// - **意图 (Why)**：阻塞在节拍器上的生产线程必须观察到通道关闭（`recv` 返回 `None`）而不是永远挂起；
    /// - **逻辑 (How)**：
    ///   1. 持锁取走激活信息与登记表，此刻起新创建的节拍器回落到真实工厂，并唤醒所有 `wait_for_count` 等待者；
    ///   2. 释放停机发送端，灌注线程在下一次 `select!` 中观察到广播；
    ///   3. 等待灌注线程全部退出，它们持有的发送端随之释放；
    ///   4. 释放登记表中的发送端，通道关闭。
    /// - **契约 (What)**：未激活时返回 [`FakeTickersError::NotActive`]。若另一线程仍阻塞在
    ///   `dispatch` 的发送上，对应通道会在该次发送完成后才真正关闭。
    pub fn deactivate(&self) -> Result<(), FakeTickersError> {
        let (activation, records) = {
            let mut state = self.state.lock();
            let activation = state
                .activation
                .take()
                .ok_or(FakeTickersError::NotActive {
                    operation: "deactivate",
                })?;
            state.epoch += 1;
            state.current_tag.clear();
            (activation, mem::take(&mut state.registry))
        };
        self.created.notify_all();

        let Activation {
            shutdown,
            shutdown_signal,
            floods,
        } = activation;
        drop(shutdown);
        drop(shutdown_signal);
        floods.wait();

        let closed = records.len();
        drop(records);
        debug!(closed, "fake tickers deactivated");
        Ok(())
    }

    /// 设置之后创建的节拍器所携带的标签。
    ///
    /// 标签对整个控制器生效，不区分线程；已创建的节拍器标签不会改变。
    pub fn set_tag(&self, tag: impl Into<String>) -> Result<(), FakeTickersError> {
        let mut state = self.state.lock();
        if state.activation.is_none() {
            return Err(FakeTickersError::NotActive {
                operation: "set_tag",
            });
        }
        state.current_tag = tag.into();
        Ok(())
    }

    /// 当前生效的标签。
    pub fn current_tag(&self) -> String {
        self.state.lock().current_tag.clone()
    }

    /// 向全部未打标签的节拍器各派发一次节拍。
    pub fn tick(&self) -> Result<usize, FakeTickersError> {
        self.dispatch(UNTAGGED)
    }

    /// 向标签与 `tag` 完全相等的每个节拍器各派发一次节拍，返回送达数量。
    ///
    /// # 教案式说明
    /// - **逻辑 (How)**：持锁拍下匹配记录的快照后释放锁，再按登记顺序逐个阻塞发送同一个时间戳；
    /// - **契约 (What)**：
    ///   - 每次调用对每个匹配节拍器恰好投递一次，没有缓冲积压；
    ///   - 读者已丢弃节拍器的记录会被跳过（发送立即失败），不计入返回值；
    ///   - 若匹配节拍器没有读者在等待，调用会无限期阻塞在该记录上。
    pub fn dispatch(&self, tag: &str) -> Result<usize, FakeTickersError> {
        let targets = self.matching(tag, "dispatch")?;
        let now = Instant::now();
        let mut delivered = 0;
        for target in &targets {
            match target.sender.send(now) {
                Ok(()) => {
                    delivered += 1;
                    trace!(id = target.id, tag, "tick delivered");
                }
                Err(_) => debug!(id = target.id, tag, "ticker reader is gone; skipped"),
            }
        }
        debug!(tag, delivered, matched = targets.len(), "dispatch finished");
        Ok(delivered)
    }

    /// [`dispatch`](Self::dispatch) 的有界版本：整体耗时超过 `timeout` 时返回
    /// [`FakeTickersError::DispatchTimeout`]。
    ///
    /// 已送达的节拍不会回滚。
    pub fn dispatch_timeout(
        &self,
        tag: &str,
        timeout: Duration,
    ) -> Result<usize, FakeTickersError> {
        let targets = self.matching(tag, "dispatch_timeout")?;
        let now = Instant::now();
        let mut delivered = 0;
        for target in &targets {
            let remaining = timeout.saturating_sub(now.elapsed());
            match target.sender.send_timeout(now, remaining) {
                Ok(()) => delivered += 1,
                Err(SendTimeoutError::Disconnected(_)) => {
                    debug!(id = target.id, tag, "ticker reader is gone; skipped");
                }
                Err(SendTimeoutError::Timeout(_)) => {
                    return Err(FakeTickersError::DispatchTimeout {
                        tag: tag.to_owned(),
                        delivered,
                        expected: targets.len(),
                    });
                }
            }
        }
        Ok(delivered)
    }

    /// 阻塞直到激活期内创建的节拍器数量不少于 `minimum`。
    ///
    /// # 教案式说明
    /// - **意图 (Why)**：保证生产线程已经拿到节拍器、即将读取，再进行派发，避免派发阻塞或标签被提前覆盖；
    /// - **逻辑 (How)**：每次登记表追加都会通知条件变量，本方法在锁下重新检查长度，无需轮询；
    /// - **契约 (What)**：
    ///   - `minimum == 0` 时立即返回；
    ///   - `timeout` 为 `None` 时无限等待，测试套件中建议总是提供超时；
    ///   - 超时返回 [`FakeTickersError::Timeout`]，附带实际与期望数量；
    ///   - 等待期间控制器被停用则返回 [`FakeTickersError::NotActive`]，即便随后又被重新激活。
    pub fn wait_for_count(
        &self,
        minimum: usize,
        timeout: Option<Duration>,
    ) -> Result<(), FakeTickersError> {
        let started = Instant::now();
        let deadline = timeout.and_then(|timeout| started.checked_add(timeout));
        let mut state = self.state.lock();
        let epoch = state.epoch;
        loop {
            if state.activation.is_none() || state.epoch != epoch {
                return Err(FakeTickersError::NotActive {
                    operation: "wait_for_count",
                });
            }
            if state.registry.len() >= minimum {
                return Ok(());
            }
            match deadline {
                None => self.created.wait(&mut state),
                Some(deadline) => {
                    let timed_out = self.created.wait_until(&mut state, deadline).timed_out();
                    if timed_out
                        && state.activation.is_some()
                        && state.epoch == epoch
                        && state.registry.len() < minimum
                    {
                        return Err(FakeTickersError::Timeout {
                            actual: state.registry.len(),
                            expected: minimum,
                            waited: started.elapsed(),
                        });
                    }
                }
            }
        }
    }

    /// 是否处于激活期。
    pub fn is_active(&self) -> bool {
        self.state.lock().activation.is_some()
    }

    /// 是否以立即模式构造。
    pub fn is_immediate(&self) -> bool {
        self.options.immediate
    }

    /// 本次激活期内创建的节拍器数量；未激活时为 0。
    pub fn ticker_count(&self) -> usize {
        self.state.lock().registry.len()
    }

    /// 本次激活期内携带 `tag` 的节拍器数量。
    pub fn tagged_count(&self, tag: &str) -> usize {
        self.state
            .lock()
            .registry
            .iter()
            .filter(|record| record.tag == tag)
            .count()
    }

    fn matching(
        &self,
        tag: &str,
        operation: &'static str,
    ) -> Result<Vec<DispatchTarget>, FakeTickersError> {
        let state = self.state.lock();
        if state.activation.is_none() {
            return Err(FakeTickersError::NotActive { operation });
        }
        Ok(state
            .registry
            .iter()
            .filter(|record| record.tag == tag)
            .map(|record| DispatchTarget {
                id: record.id,
                sender: record.sender.clone(),
            })
            .collect())
    }
}

impl Default for FakeTickers {
    fn default() -> Self {
        Self::new()
    }
}

impl TickerFactory for FakeTickers {
    fn new_ticker(&self, period: Duration) -> Ticker {
        let mut state = self.state.lock();
        if state.activation.is_none() {
            drop(state);
            return self.options.fallback.new_ticker(period);
        }

        let (sender, receiver) = channel::bounded(0);
        let flood = match state.activation.as_ref() {
            Some(activation) if self.options.immediate => Some(activation.enlist(sender.clone())),
            _ => None,
        };
        let id = state.next_id;
        state.next_id += 1;
        let tag = state.current_tag.clone();
        state.registry.push(TimerRecord {
            id,
            tag: tag.clone(),
            sender,
        });
        let count = state.registry.len();
        drop(state);
        self.created.notify_all();

        debug!(id, tag = %tag, ?period, count, "ticker intercepted");
        if let Some(flood) = flood {
            flood.spawn(id);
        }
        Ticker::intercepted(receiver, period, id, tag)
    }
}

impl Drop for FakeTickers {
    fn drop(&mut self) {
        if self.state.get_mut().activation.is_some() {
            if let Err(err) = self.deactivate() {
                warn!(error = %err, "failed to deactivate fake tickers on drop");
            }
        }
    }
}

impl fmt::Debug for FakeTickers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FakeTickers")
            .field("active", &state.activation.is_some())
            .field("tickers", &state.registry.len())
            .field("current_tag", &state.current_tag)
            .field("immediate", &self.options.immediate)
            .finish()
    }
}

struct DispatchTarget {
    id: u64,
    sender: Sender<Instant>,
}

/// 立即模式下为单个节拍器灌注节拍的后台任务。
///
/// 每轮在“发送当前时间戳”与“观察到停机广播”之间择一完成；读者丢弃节拍器时发送失败，任务同样退出。
/// `member` 随任务结束释放，`deactivate` 据此确认全部任务退出。
struct FloodTask {
    sender: Sender<Instant>,
    shutdown: Receiver<()>,
    member: WaitGroup,
}

impl FloodTask {
    fn spawn(self, id: u64) {
        let spawned = thread::Builder::new()
            .name(format!("faketicker-flood-{id}"))
            .spawn(move || self.run(id));
        if let Err(err) = spawned {
            warn!(id, error = %err, "failed to spawn flood thread; ticker stays manual");
        }
    }

    fn run(self, id: u64) {
        let FloodTask {
            sender,
            shutdown,
            member,
        } = self;
        let mut sent: u64 = 0;
        loop {
            select! {
                recv(shutdown) -> _ => break,
                send(sender, Instant::now()) -> result => match result {
                    Ok(()) => sent += 1,
                    Err(_) => break,
                },
            }
        }
        trace!(id, sent, "flood task exited");
        drop(member);
    }
}
