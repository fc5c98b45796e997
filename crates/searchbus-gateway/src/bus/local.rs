//! In-process message bus

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use searchbus_protocol::{Envelope, Failure};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{BusError, BusResult, EnvelopeHandler, MessageBus};

/// Address-to-handler registry delivering each envelope on its own task.
#[derive(Clone, Default)]
pub struct LocalBus {
    handlers: Arc<RwLock<HashMap<String, Arc<dyn EnvelopeHandler>>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `address` currently has a handler
    pub async fn has_handler(&self, address: &str) -> bool {
        self.handlers.read().await.contains_key(address)
    }

    /// Registered addresses, sorted
    pub async fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.handlers.read().await.keys().cloned().collect();
        addresses.sort();
        addresses
    }
}

#[async_trait]
impl MessageBus for LocalBus {
    async fn register(&self, address: &str, handler: Arc<dyn EnvelopeHandler>) -> BusResult<()> {
        if address.trim().is_empty() {
            return Err(BusError::InvalidAddress);
        }

        let mut handlers = self.handlers.write().await;
        if handlers.contains_key(address) {
            warn!(address = %address, "Handler already registered");
            return Err(BusError::AddressInUse(address.to_string()));
        }
        handlers.insert(address.to_string(), handler);
        info!(address = %address, "Handler registered");
        Ok(())
    }

    async fn unregister(&self, address: &str) -> bool {
        let removed = self.handlers.write().await.remove(address).is_some();
        if removed {
            info!(address = %address, "Handler unregistered");
        }
        removed
    }

    async fn send(
        &self,
        address: &str,
        envelope: Envelope,
        timeout: Duration,
    ) -> BusResult<Envelope> {
        let handler = self
            .handlers
            .read()
            .await
            .get(address)
            .cloned()
            .ok_or_else(|| BusError::NoHandlers(address.to_string()))?;

        debug!(address = %address, "Delivering envelope");
        let delivery = tokio::spawn(async move { handler.handle(envelope).await });

        match tokio::time::timeout(timeout, delivery).await {
            Ok(Ok(Ok(reply))) => Ok(reply),
            Ok(Ok(Err(failure))) => Err(BusError::RecipientFailure(failure)),
            Ok(Err(join_error)) if join_error.is_panic() => {
                warn!(address = %address, "Handler panicked");
                Err(BusError::RecipientFailure(Failure::new("Unhandled exception!")))
            }
            Ok(Err(_)) => Err(BusError::Closed(address.to_string())),
            Err(_) => {
                warn!(
                    address = %address,
                    timeout_ms = timeout.as_millis() as u64,
                    "Reply timed out"
                );
                Err(BusError::Timeout {
                    address: address.to_string(),
                    timeout,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use searchbus_protocol::Reply;

    struct Echo;

    #[async_trait]
    impl EnvelopeHandler for Echo {
        async fn handle(&self, envelope: Envelope) -> Reply {
            Ok(envelope)
        }
    }

    struct Refuse;

    #[async_trait]
    impl EnvelopeHandler for Refuse {
        async fn handle(&self, _envelope: Envelope) -> Reply {
            Err(Failure::new("nope"))
        }
    }

    struct Slow;

    #[async_trait]
    impl EnvelopeHandler for Slow {
        async fn handle(&self, envelope: Envelope) -> Reply {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(envelope)
        }
    }

    struct Explode;

    #[async_trait]
    impl EnvelopeHandler for Explode {
        async fn handle(&self, _envelope: Envelope) -> Reply {
            panic!("handler exploded");
        }
    }

    const WAIT: Duration = Duration::from_millis(500);

    #[tokio::test]
    async fn send_round_trips_through_handler() {
        let bus = LocalBus::new();
        bus.register("echo", Arc::new(Echo)).await.unwrap();

        let reply = bus
            .send("echo", Envelope::new().with("k", "v"), WAIT)
            .await
            .unwrap();
        assert_eq!(reply, Envelope::new().with("k", "v"));
    }

    #[tokio::test]
    async fn address_accepts_a_single_handler() {
        let bus = LocalBus::new();
        bus.register("echo", Arc::new(Echo)).await.unwrap();
        assert_eq!(
            bus.register("echo", Arc::new(Echo)).await.unwrap_err(),
            BusError::AddressInUse("echo".into())
        );
        assert_eq!(
            bus.register("  ", Arc::new(Echo)).await.unwrap_err(),
            BusError::InvalidAddress
        );

        assert!(bus.unregister("echo").await);
        assert!(!bus.unregister("echo").await);
        assert!(bus.addresses().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_address_has_no_handlers() {
        let bus = LocalBus::new();
        let err = bus.send("nowhere", Envelope::new(), WAIT).await.unwrap_err();
        assert_eq!(err, BusError::NoHandlers("nowhere".into()));
    }

    #[tokio::test]
    async fn handler_failure_is_reported_to_sender() {
        let bus = LocalBus::new();
        bus.register("refuse", Arc::new(Refuse)).await.unwrap();
        let err = bus.send("refuse", Envelope::new(), WAIT).await.unwrap_err();
        assert_eq!(err, BusError::RecipientFailure(Failure::new("nope")));
    }

    #[tokio::test]
    async fn slow_handler_times_out() {
        let bus = LocalBus::new();
        bus.register("slow", Arc::new(Slow)).await.unwrap();
        let err = bus
            .send("slow", Envelope::new(), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::Timeout { .. }));
    }

    #[tokio::test]
    async fn panicking_handler_becomes_recipient_failure() {
        let bus = LocalBus::new();
        bus.register("explode", Arc::new(Explode)).await.unwrap();
        let err = bus.send("explode", Envelope::new(), WAIT).await.unwrap_err();
        assert_eq!(
            err,
            BusError::RecipientFailure(Failure::new("Unhandled exception!"))
        );
        assert!(bus.has_handler("explode").await);
    }
}
