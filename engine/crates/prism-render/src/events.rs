//! 显式的发布 / 订阅通道
//!
//! 每种通知一个 [`EventChannel`]。订阅者拿到自己的 [`Subscription`]，
//! 在控制线程上按需取出事件；发布可以发生在任意线程（例如场景加载的 worker）。

use std::sync::{
    Mutex,
    atomic::{AtomicU64, Ordering},
};

use crossbeam_channel::{Receiver, Sender, TryIter};
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// 一个订阅者的接收端；drop 之后下一次发布时自动从通道中移除
pub struct Subscription<E> {
    id: SubscriptionId,
    receiver: Receiver<E>,
}

impl<E> Subscription<E> {
    #[inline]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// 取出所有已经到达的事件，不阻塞
    pub fn drain(&self) -> TryIter<'_, E> {
        self.receiver.try_iter()
    }

    pub fn try_recv(&self) -> Option<E> {
        self.receiver.try_recv().ok()
    }
}

/// 某一种通知的通道，按照注册顺序投递
pub struct EventChannel<E> {
    name: &'static str,
    next_id: AtomicU64,
    senders: Mutex<IndexMap<SubscriptionId, Sender<E>>>,
}

impl<E: Clone> EventChannel<E> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(0),
            senders: Mutex::new(IndexMap::new()),
        }
    }

    pub fn subscribe(&self) -> Subscription<E> {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.lock().insert(id, sender);
        log::debug!("event channel `{}`: subscriber {} registered", self.name, id.0);
        Subscription { id, receiver }
    }

    /// 返回该订阅是否存在
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.lock().shift_remove(&id).is_some();
        if removed {
            log::debug!("event channel `{}`: subscriber {} removed", self.name, id.0);
        }
        removed
    }

    /// 投递给所有订阅者，返回收到事件的订阅者数量
    pub fn publish(&self, event: E) -> usize {
        let mut senders = self.lock();
        // 接收端已经 drop 的订阅者在这里清理
        senders.retain(|_, sender| sender.send(event.clone()).is_ok());
        log::trace!("event channel `{}`: delivered to {} subscribers", self.name, senders.len());
        senders.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IndexMap<SubscriptionId, Sender<E>>> {
        // 发送不会 panic，锁不会被毒化；即使被毒化，map 本身仍然有效
        self.senders.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// 一个场景已经加载完成，可以开始渲染
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneActivated {
    pub scene_id: u64,
}

/// 相机的位置或朝向发生了变化，渐进式累积需要重新开始
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraMoved {
    pub position: glam::Vec3,
    pub direction: glam::Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceResized {
    pub width: u32,
    pub height: u32,
}

/// renderer 关心的所有通知
pub struct EventBus {
    pub scene_activated: EventChannel<SceneActivated>,
    pub camera_moved: EventChannel<CameraMoved>,
    pub surface_resized: EventChannel<SurfaceResized>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            scene_activated: EventChannel::new("scene-activated"),
            camera_moved: EventChannel::new("camera-moved"),
            surface_resized: EventChannel::new("surface-resized"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_delivery_in_registration_order() {
        let channel = EventChannel::<SceneActivated>::new("test");
        let first = channel.subscribe();
        let second = channel.subscribe();
        assert!(first.id() < second.id());

        assert_eq!(channel.publish(SceneActivated { scene_id: 1 }), 2);
        assert_eq!(channel.publish(SceneActivated { scene_id: 2 }), 2);

        let ids: Vec<_> = first.drain().map(|e| e.scene_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(second.try_recv(), Some(SceneActivated { scene_id: 1 }));
    }

    #[test]
    fn test_unsubscribe_and_dropped_receivers() {
        let channel = EventChannel::<SurfaceResized>::new("test");
        let kept = channel.subscribe();
        let removed = channel.subscribe();
        let dropped = channel.subscribe();

        assert!(channel.unsubscribe(removed.id()));
        assert!(!channel.unsubscribe(removed.id()));
        drop(dropped);

        assert_eq!(channel.publish(SurfaceResized { width: 4, height: 4 }), 1);
        assert_eq!(channel.subscriber_count(), 1);
        assert!(removed.try_recv().is_none());
        assert!(kept.try_recv().is_some());
    }

    #[test]
    fn test_publish_from_worker_thread() {
        let bus = Arc::new(EventBus::new());
        let subscription = bus.scene_activated.subscribe();

        let worker_bus = bus.clone();
        std::thread::spawn(move || {
            worker_bus.scene_activated.publish(SceneActivated { scene_id: 7 });
        })
        .join()
        .unwrap();

        assert_eq!(subscription.try_recv(), Some(SceneActivated { scene_id: 7 }));
    }
}
