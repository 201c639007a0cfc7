//! Type-keyed publish/subscribe registry.
//!
//! Handlers for one [`EventType`] are kept sorted by [`HandlerId`] and always
//! run in ascending id order on the caller's task. `fire` keeps going after a
//! handler fails and reports every failure at the end.

use super::types::{DomainEvent, EventType};
use crate::framework::{StoreError, UnitOfWork};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(Uuid);

impl HandlerId {
    fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for HandlerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("payload serialization error: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("handler {0} is not registered")]
    HandlerNotRegistered(HandlerId),
}

/// Every handler failure of one `fire` call, in invocation order.
#[derive(Debug)]
pub struct FireError {
    pub failures: Vec<(HandlerId, HandlerError)>,
}

impl std::fmt::Display for FireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} event handler(s) failed", self.failures.len())?;
        for (id, error) in &self.failures {
            write!(f, "; {id}: {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for FireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures
            .first()
            .map(|(_, e)| e as &(dyn std::error::Error + 'static))
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(
        &self,
        event: &DomainEvent,
        uow: &mut dyn UnitOfWork,
    ) -> Result<(), HandlerError>;
}

#[derive(Default)]
struct Registry {
    handlers: HashMap<HandlerId, EventType>,
    by_type: HashMap<EventType, Vec<(HandlerId, Arc<dyn EventHandler>)>>,
}

/// Built once at startup and shared by `Arc`.
#[derive(Default)]
pub struct Listener {
    registry: RwLock<Registry>,
}

impl Listener {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(
        &self,
        event_type: EventType,
        handler: Arc<dyn EventHandler>,
    ) -> HandlerId {
        let id = HandlerId::random();
        self.register_with_id(id, event_type, handler).await;
        id
    }

    async fn register_with_id(
        &self,
        id: HandlerId,
        event_type: EventType,
        handler: Arc<dyn EventHandler>,
    ) {
        let mut registry = self.registry.write().await;
        let list = registry.by_type.entry(event_type).or_default();
        let position = list
            .binary_search_by(|(existing, _)| existing.cmp(&id))
            .unwrap_or_else(|insert_at| insert_at);
        list.insert(position, (id, handler));
        registry.handlers.insert(id, event_type);
        debug!(handler_id = %id, event_type = %event_type, "Registered event handler");
    }

    pub async fn unregister(&self, id: HandlerId) -> Result<(), ListenerError> {
        let mut registry = self.registry.write().await;
        let event_type = registry
            .handlers
            .remove(&id)
            .ok_or(ListenerError::HandlerNotRegistered(id))?;
        if let Some(list) = registry.by_type.get_mut(&event_type) {
            list.retain(|(existing, _)| *existing != id);
            if list.is_empty() {
                registry.by_type.remove(&event_type);
            }
        }
        debug!(handler_id = %id, event_type = %event_type, "Unregistered event handler");
        Ok(())
    }

    /// Run every handler registered for the event's type.
    ///
    /// The read lock is held for the whole call: concurrent fires proceed,
    /// registration waits.
    pub async fn fire(
        &self,
        event: &DomainEvent,
        uow: &mut dyn UnitOfWork,
    ) -> Result<(), FireError> {
        let event_type = event.event_type();
        let registry = self.registry.read().await;
        let Some(handlers) = registry.by_type.get(&event_type) else {
            debug!(event_type = %event_type, "No handlers registered");
            return Ok(());
        };

        debug!(
            event_type = %event_type,
            handlers = handlers.len(),
            description = %event.description(),
            "Firing event"
        );

        let mut failures = Vec::new();
        for (id, handler) in handlers {
            if let Err(error) = handler.handle(event, &mut *uow).await {
                warn!(
                    handler_id = %id,
                    event_type = %event_type,
                    error = %error,
                    "Event handler failed"
                );
                failures.push((*id, error));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(FireError { failures })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::invoices::{Invoice, InvoiceStatus};
    use crate::entities::stores::Store;
    use crate::events::types::InvoiceStatusChanged;
    use crate::framework::memory::MemoryStorage;
    use crate::framework::{IsolationLevel, Storage};
    use rust_decimal::Decimal;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        calls: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(
            &self,
            _event: &DomainEvent,
            _uow: &mut dyn UnitOfWork,
        ) -> Result<(), HandlerError> {
            self.calls.lock().unwrap().push(self.name);
            if self.fail {
                Err(HandlerError::Failed(format!("{} broke", self.name)))
            } else {
                Ok(())
            }
        }
    }

    fn recorder(
        name: &'static str,
        calls: &Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    ) -> Arc<dyn EventHandler> {
        Arc::new(Recorder {
            name,
            calls: calls.clone(),
            fail,
        })
    }

    fn event() -> DomainEvent {
        DomainEvent::InvoiceStatusChanged(InvoiceStatusChanged {
            invoice: Invoice {
                id: Uuid::nil(),
                store_id: Uuid::nil(),
                order_id: None,
                status: InvoiceStatus::Paid,
                amount_usd: Decimal::TEN,
                updated_at: time::OffsetDateTime::UNIX_EPOCH,
            },
            previous_status: InvoiceStatus::Pending,
            store: Store {
                id: Uuid::nil(),
                name: "shop".to_string(),
                minimal_payment_usd: Decimal::ZERO,
                webhook_secret: "secret".to_string(),
            },
        })
    }

    fn id(prefix: u8) -> HandlerId {
        let mut bytes = [0u8; 16];
        bytes[0] = prefix;
        HandlerId(Uuid::from_bytes(bytes))
    }

    #[tokio::test]
    async fn test_handlers_run_in_id_order() {
        let listener = Listener::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        listener
            .register_with_id(id(0xb0), EventType::InvoiceStatusChanged, recorder("b", &calls, false))
            .await;
        listener
            .register_with_id(id(0xa0), EventType::InvoiceStatusChanged, recorder("a", &calls, false))
            .await;
        listener
            .register_with_id(id(0xc0), EventType::DepositReceived, recorder("c", &calls, false))
            .await;

        let storage = MemoryStorage::default();
        let mut uow = storage.begin(IsolationLevel::ReadCommitted).await.unwrap();
        listener.fire(&event(), uow.as_mut()).await.unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_later_handlers() {
        let listener = Listener::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        listener
            .register_with_id(id(0x10), EventType::InvoiceStatusChanged, recorder("h1", &calls, true))
            .await;
        listener
            .register_with_id(id(0x20), EventType::InvoiceStatusChanged, recorder("h2", &calls, false))
            .await;

        let storage = MemoryStorage::default();
        let mut uow = storage.begin(IsolationLevel::ReadCommitted).await.unwrap();
        let err = listener.fire(&event(), uow.as_mut()).await.unwrap_err();

        assert_eq!(*calls.lock().unwrap(), vec!["h1", "h2"]);
        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].0, id(0x10));
        assert!(err.to_string().contains("h1 broke"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[tokio::test]
    async fn test_unregister() {
        let listener = Listener::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let handler_id = listener
            .register(EventType::InvoiceStatusChanged, recorder("a", &calls, false))
            .await;

        listener.unregister(handler_id).await.unwrap();
        assert!(matches!(
            listener.unregister(handler_id).await,
            Err(ListenerError::HandlerNotRegistered(missing)) if missing == handler_id
        ));

        let storage = MemoryStorage::default();
        let mut uow = storage.begin(IsolationLevel::ReadCommitted).await.unwrap();
        listener.fire(&event(), uow.as_mut()).await.unwrap();
        assert!(calls.lock().unwrap().is_empty());
    }
}
