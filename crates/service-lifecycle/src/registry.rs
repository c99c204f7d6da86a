//! Handler registry
//!
//! Maps (command, platform, service type) to the handler that performs the
//! verb. Strategies populate a [`HandlerRegistryBuilder`] once at start-up;
//! the built [`HandlerRegistry`] is read-only.

use crate::{CommandKind, Error, HandlerContext, HandlerOutput, PlatformKind, Result, ServiceType};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Leaf function performing one verb for one (platform, service type) pair
#[async_trait]
pub trait Handler: Send + Sync {
    /// Perform the verb
    ///
    /// Expected failures are reported as `Ok` with `success == false`;
    /// `Err` is reserved for faults.
    async fn handle(&self, context: HandlerContext) -> Result<HandlerOutput>;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(HandlerContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<HandlerOutput>> + Send + 'static,
{
    async fn handle(&self, context: HandlerContext) -> Result<HandlerOutput> {
        (self)(context).await
    }
}

/// Bind shared strategy state to an async handler function
///
/// The state is cloned into every call, so `f` receives an owned `Arc`
/// and its future can be `'static`.
pub fn bind<S, F, Fut>(state: &Arc<S>, f: F) -> impl Handler + 'static
where
    S: Send + Sync + 'static,
    F: Fn(Arc<S>, HandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HandlerOutput>> + Send + 'static,
{
    let state = Arc::clone(state);
    move |context: HandlerContext| f(Arc::clone(&state), context)
}

/// Service-type part of a registry key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeScope {
    /// Exactly this service type
    Exact(ServiceType),
    /// Any service type on the platform
    Any,
}

/// Registry key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerKey {
    /// Verb
    pub command: CommandKind,
    /// Platform
    pub platform: PlatformKind,
    /// Service type scope
    pub scope: TypeScope,
}

/// Collects handler registrations while strategies are constructed
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<HandlerKey, Arc<dyn Handler>>,
}

impl HandlerRegistryBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an exact (command, platform, service type) triple
    pub fn register(
        &mut self,
        command: CommandKind,
        platform: PlatformKind,
        service_type: ServiceType,
        handler: impl Handler + 'static,
    ) -> &mut Self {
        self.insert(
            HandlerKey {
                command,
                platform,
                scope: TypeScope::Exact(service_type),
            },
            Arc::new(handler),
        )
    }

    /// Register a fallback handler for every service type of a platform
    pub fn register_wildcard(
        &mut self,
        command: CommandKind,
        platform: PlatformKind,
        handler: impl Handler + 'static,
    ) -> &mut Self {
        self.insert(
            HandlerKey {
                command,
                platform,
                scope: TypeScope::Any,
            },
            Arc::new(handler),
        )
    }

    fn insert(&mut self, key: HandlerKey, handler: Arc<dyn Handler>) -> &mut Self {
        if self.handlers.insert(key, handler).is_some() {
            warn!("Replacing handler registered for {:?}", key);
        }
        self
    }

    /// Freeze the registrations
    pub fn build(self) -> HandlerRegistry {
        debug!("Handler registry built with {} entries", self.handlers.len());
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}

/// Read-only handler table
pub struct HandlerRegistry {
    handlers: HashMap<HandlerKey, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    /// Find the handler for a triple
    ///
    /// Exact match first, then the platform's wildcard for the command,
    /// otherwise [`Error::UnsupportedCombination`].
    pub fn lookup(
        &self,
        command: CommandKind,
        platform: PlatformKind,
        service_type: ServiceType,
    ) -> Result<Arc<dyn Handler>> {
        let exact = HandlerKey {
            command,
            platform,
            scope: TypeScope::Exact(service_type),
        };
        let wildcard = HandlerKey {
            scope: TypeScope::Any,
            ..exact
        };

        self.handlers
            .get(&exact)
            .or_else(|| self.handlers.get(&wildcard))
            .cloned()
            .ok_or(Error::UnsupportedCombination {
                command,
                platform,
                service_type,
            })
    }

    /// Whether a lookup would succeed
    pub fn supports(
        &self,
        command: CommandKind,
        platform: PlatformKind,
        service_type: ServiceType,
    ) -> bool {
        self.lookup(command, platform, service_type).is_ok()
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// All registered keys
    pub fn keys(&self) -> Vec<HandlerKey> {
        self.handlers.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResultStatus;

    async fn exact_handler(_context: HandlerContext) -> Result<HandlerOutput> {
        Ok(HandlerOutput::with_status(ResultStatus::Started))
    }

    async fn wildcard_handler(_context: HandlerContext) -> Result<HandlerOutput> {
        Ok(HandlerOutput::with_status(ResultStatus::NoChange))
    }

    fn registry() -> HandlerRegistry {
        let mut builder = HandlerRegistryBuilder::new();
        builder
            .register(
                CommandKind::Start,
                PlatformKind::Container,
                ServiceType::Database,
                exact_handler,
            )
            .register_wildcard(CommandKind::Start, PlatformKind::Container, wildcard_handler);
        builder.build()
    }

    #[test]
    fn test_exact_match_wins() {
        let registry = registry();
        assert!(
            registry
                .lookup(CommandKind::Start, PlatformKind::Container, ServiceType::Database)
                .is_ok()
        );
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_wildcard_fallback() {
        let registry = registry();
        assert!(registry.supports(CommandKind::Start, PlatformKind::Container, ServiceType::Worker));
    }

    #[test]
    fn test_unsupported_combination_is_an_error() {
        let registry = registry();
        let err = registry
            .lookup(CommandKind::Stop, PlatformKind::Container, ServiceType::Database)
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnsupportedCombination { .. }));

        // A wildcard on one platform never leaks to another
        assert!(!registry.supports(CommandKind::Start, PlatformKind::Posix, ServiceType::Worker));
    }

    #[smol_potat::test]
    async fn test_lookup_returns_the_registered_handler() {
        use crate::{CommandOptions, ContextExtensions, HandlerInput, Service, ServiceConfig};

        let registry = registry();
        let service = Service::new("db", "staging", ServiceConfig::default());
        let context = HandlerContext {
            command: CommandKind::Start,
            requirements: service.requirements(),
            service,
            platform: PlatformKind::Container,
            service_type: ServiceType::Worker,
            options: CommandOptions::new("staging"),
            input: HandlerInput::Start,
            extensions: ContextExtensions::named("acme-db-staging"),
        };

        let handler = registry
            .lookup(CommandKind::Start, PlatformKind::Container, ServiceType::Worker)
            .unwrap();
        let output = handler.handle(context).await.unwrap();
        assert_eq!(output.status, Some(ResultStatus::NoChange));
    }
}
