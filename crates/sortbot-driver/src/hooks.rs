//! 消息回调系统
//!
//! 按消息类型注册回调，由 IO 线程（或分类线程）在消息到达时调用。
//! 每个类型只保留一个回调，后注册的覆盖先注册的。
//!
//! # 性能要求
//!
//! 回调在 IO 线程上执行，耗时会推迟后续帧的解码。
//! 重活应转交给通道或其它线程。

use sortbot_protocol::Message;
use std::collections::HashMap;
use std::sync::Arc;

/// 消息回调 trait
///
/// 闭包 `Fn(&Message) + Send + Sync` 自动实现此 trait。
pub trait MessageCallback: Send + Sync {
    fn on_message(&self, message: &Message);
}

impl<F> MessageCallback for F
where
    F: Fn(&Message) + Send + Sync,
{
    fn on_message(&self, message: &Message) {
        self(message)
    }
}

/// 回调注册表
///
/// 非线程安全，需要外部同步（`LinkContext` 中使用 `RwLock`）。
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: HashMap<String, Arc<dyn MessageCallback>>,
}

impl CallbackRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            callbacks: HashMap::new(),
        }
    }

    /// 注册回调，返回被替换的旧回调（如有）
    pub fn register(
        &mut self,
        msg_type: impl Into<String>,
        callback: Arc<dyn MessageCallback>,
    ) -> Option<Arc<dyn MessageCallback>> {
        let mut key = msg_type.into();
        key.make_ascii_lowercase();
        self.callbacks.insert(key, callback)
    }

    /// 移除某类型的回调
    pub fn unregister(&mut self, msg_type: &str) -> Option<Arc<dyn MessageCallback>> {
        self.callbacks.remove(&msg_type.to_ascii_lowercase())
    }

    /// 获取某类型的回调（克隆 `Arc`，调用时无需持锁）
    pub fn get(&self, msg_type: &str) -> Option<Arc<dyn MessageCallback>> {
        self.callbacks.get(msg_type).cloned()
    }

    /// 移除所有回调
    pub fn clear(&mut self) {
        self.callbacks.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn counter() -> (Arc<AtomicU64>, Arc<dyn MessageCallback>) {
        let count = Arc::new(AtomicU64::new(0));
        let c = count.clone();
        let cb: Arc<dyn MessageCallback> = Arc::new(move |_: &Message| {
            c.fetch_add(1, Ordering::Relaxed);
        });
        (count, cb)
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = CallbackRegistry::new();
        assert!(registry.is_empty());

        let (count, cb) = counter();
        registry.register("scan_service", cb);
        assert_eq!(registry.len(), 1);

        let cb = registry.get("scan_service").unwrap();
        cb.on_message(&Message::empty("scan_service"));
        assert_eq!(count.load(Ordering::Relaxed), 1);
        assert!(registry.get("pick_service").is_none());
    }

    #[test]
    fn test_last_registration_wins() {
        let mut registry = CallbackRegistry::new();
        let (first, cb1) = counter();
        let (second, cb2) = counter();

        assert!(registry.register("scan_service", cb1).is_none());
        assert!(registry.register("SCAN_SERVICE", cb2).is_some());
        assert_eq!(registry.len(), 1);

        registry.get("scan_service").unwrap().on_message(&Message::empty("scan_service"));
        assert_eq!(first.load(Ordering::Relaxed), 0);
        assert_eq!(second.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_unregister_and_clear() {
        let mut registry = CallbackRegistry::new();
        let (_, cb) = counter();
        registry.register("check_service", cb.clone());
        registry.register("safety_service", cb);

        assert!(registry.unregister("check_service").is_some());
        assert_eq!(registry.len(), 1);

        registry.clear();
        assert!(registry.is_empty());
    }
}
