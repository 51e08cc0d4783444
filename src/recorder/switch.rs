//! # 录制开关
//!
//! 存放在共享存储里的布尔标志，所有服务进程共用。

use std::sync::Arc;

use crate::cache::{CacheKey, UnifiedCacheManager};
use crate::error::Result;
use crate::ldebug;
use crate::logging::{LogComponent, LogStage};

/// 全局录制开关
#[derive(Clone)]
pub struct ArmSwitch {
    cache: Arc<UnifiedCacheManager>,
}

impl ArmSwitch {
    #[must_use]
    pub const fn new(cache: Arc<UnifiedCacheManager>) -> Self {
        Self { cache }
    }

    /// 标志不存在视为未开启
    pub async fn is_armed(&self) -> Result<bool> {
        let armed = self.cache.get::<bool>(CacheKey::InterceptFlag).await?;
        Ok(armed.unwrap_or(false))
    }

    pub async fn arm(&self) -> Result<()> {
        self.cache.set(CacheKey::InterceptFlag, &true).await?;
        ldebug!("system", LogStage::Control, LogComponent::ArmSwitch, "arm", "录制开关已打开");
        Ok(())
    }

    /// 删除标志；已关闭时再次调用同样成功
    pub async fn disarm(&self) -> Result<()> {
        self.cache.delete(CacheKey::InterceptFlag).await?;
        ldebug!("system", LogStage::Control, LogComponent::ArmSwitch, "disarm", "录制开关已关闭");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_arm_disarm_is_idempotent() {
        let switch = ArmSwitch::new(Arc::new(UnifiedCacheManager::memory()));
        assert!(!switch.is_armed().await.unwrap());

        switch.arm().await.unwrap();
        switch.arm().await.unwrap();
        assert!(switch.is_armed().await.unwrap());

        switch.disarm().await.unwrap();
        switch.disarm().await.unwrap();
        assert!(!switch.is_armed().await.unwrap());
    }

    #[tokio::test]
    async fn test_switch_is_shared_through_the_store() {
        let cache = Arc::new(UnifiedCacheManager::memory());
        let control = ArmSwitch::new(Arc::clone(&cache));
        let worker = ArmSwitch::new(cache);

        control.arm().await.unwrap();
        assert!(worker.is_armed().await.unwrap());
    }
}
