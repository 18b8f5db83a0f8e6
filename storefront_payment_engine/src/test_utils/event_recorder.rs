use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
};

use crate::events::{ClearCartEvent, EventHooks, NotificationEvent, NotificationKind};

/// Collects every event it is hooked into, so tests can assert on what was published.
#[derive(Clone, Default)]
pub struct EventRecorder {
    notifications: Arc<Mutex<Vec<NotificationEvent>>>,
    cleared_carts: Arc<Mutex<Vec<ClearCartEvent>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hooks(&self) -> EventHooks {
        let mut hooks = EventHooks::default();
        let notifications = Arc::clone(&self.notifications);
        hooks.on_notification(move |ev| {
            let notifications = Arc::clone(&notifications);
            Box::pin(async move {
                notifications.lock().expect("poisoned lock").push(ev);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let carts = Arc::clone(&self.cleared_carts);
        hooks.on_clear_cart(move |ev| {
            let carts = Arc::clone(&carts);
            Box::pin(async move {
                carts.lock().expect("poisoned lock").push(ev);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        hooks
    }

    pub fn notifications(&self) -> Vec<NotificationEvent> {
        self.notifications.lock().expect("poisoned lock").clone()
    }

    pub fn kinds(&self) -> Vec<NotificationKind> {
        self.notifications().into_iter().map(|n| n.kind).collect()
    }

    pub fn cleared_carts(&self) -> Vec<ClearCartEvent> {
        self.cleared_carts.lock().expect("poisoned lock").clone()
    }
}
