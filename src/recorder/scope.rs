//! # 请求作用域
//!
//! 宿主在请求生命周期钩子里创建 [`RequestScope`] 并显式传递给处理器。
//! 录制器挂在作用域上，调用路径也只在作用域内切换。

use std::sync::{Arc, Mutex, MutexGuard};

use super::interceptor::{CallPath, CaptureOptions, QueryExecutor};
use super::session::Recorder;

/// 单个请求的作用域句柄
pub struct RequestScope {
    call_path: CallPath,
    slot: Mutex<Option<Arc<Recorder>>>,
}

impl RequestScope {
    /// 以原始执行器创建，初始状态不录制
    #[must_use]
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            call_path: CallPath::new(executor),
            slot: Mutex::new(None),
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<Arc<Recorder>>> {
        self.slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// 本请求应使用的数据库执行器
    #[must_use]
    pub fn executor(&self) -> Arc<dyn QueryExecutor> {
        self.call_path.get()
    }

    #[must_use]
    pub const fn call_path(&self) -> &CallPath {
        &self.call_path
    }

    /// 当前挂载的录制器
    #[must_use]
    pub fn recorder(&self) -> Option<Arc<Recorder>> {
        self.lock_slot().clone()
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.lock_slot().is_some()
    }

    /// 挂载录制器并安装拦截器；已有录制器时保持不变并返回 `false`
    pub fn attach(&self, recorder: Arc<Recorder>, options: CaptureOptions) -> bool {
        let mut slot = self.lock_slot();
        if slot.is_some() {
            return false;
        }
        self.call_path.install(Arc::clone(&recorder), options);
        *slot = Some(recorder);
        true
    }

    /// 卸下录制器并恢复原始调用路径
    pub fn detach(&self) -> Option<Arc<Recorder>> {
        let mut slot = self.lock_slot();
        self.call_path.restore();
        slot.take()
    }

    /// 强制拆除：不论状态如何都恢复原始调用路径，返回被丢弃的录制器 ID
    pub fn teardown(&self) -> Option<String> {
        self.detach().map(|recorder| recorder.id().to_string())
    }
}
