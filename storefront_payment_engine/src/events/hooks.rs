use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::task::JoinHandle;

use crate::events::{ClearCartEvent, EventHandler, EventProducer, Handler, NotificationEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub notification_producer: Vec<EventProducer<NotificationEvent>>,
    pub clear_cart_producer: Vec<EventProducer<ClearCartEvent>>,
}

impl EventProducers {
    pub async fn publish_notification(&self, event: NotificationEvent) {
        debug!("📬️ Publishing {} notification for order {}", event.kind, event.order.order_number);
        for producer in &self.notification_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_clear_cart(&self, event: ClearCartEvent) {
        for producer in &self.clear_cart_producer {
            producer.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_notification: Option<EventHandler<NotificationEvent>>,
    pub on_clear_cart: Option<EventHandler<ClearCartEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_notification = hooks.on_notification.map(|f| EventHandler::new(buffer_size, f));
        let on_clear_cart = hooks.on_clear_cart.map(|f| EventHandler::new(buffer_size, f));
        Self { on_notification, on_clear_cart }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_notification {
            result.notification_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_clear_cart {
            result.clear_cart_producer.push(handler.subscribe());
        }
        result
    }

    /// Spawns a task per registered handler. Each task ends once all of its producers have been dropped and pending
    /// events are handled.
    pub fn start_handlers(self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(2);
        if let Some(handler) = self.on_notification {
            handles.push(tokio::spawn(handler.start_handler()));
        }
        if let Some(handler) = self.on_clear_cart {
            handles.push(tokio::spawn(handler.start_handler()));
        }
        handles
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_notification: Option<Handler<NotificationEvent>>,
    pub on_clear_cart: Option<Handler<ClearCartEvent>>,
}

impl EventHooks {
    pub fn on_notification<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(NotificationEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_notification = Some(Arc::new(f));
        self
    }

    pub fn on_clear_cart<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(ClearCartEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_clear_cart = Some(Arc::new(f));
        self
    }
}
