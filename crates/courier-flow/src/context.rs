//! Flow context, runtime and external capabilities

use crate::config::EngineConfig;
use crate::error::{DispatchError, FlowError};
use crate::flow::FlowRegistry;
use courier_expr::{Bindings, Evaluator, Interpreter};
use courier_http::{HttpsRequestObject, HttpsResponseObject};
use courier_schema::{MaskRedactor, Redactor, Renderer};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Performs the actual exchange for a rendered request
#[async_trait::async_trait]
pub trait Dispatcher: Send + Sync + Debug {
    /// Send `request` and return what came back
    async fn dispatch(&self, request: &HttpsRequestObject) -> Result<HttpsResponseObject, DispatchError>;
}

/// Sending side of a cancellation signal
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancellationHandle {
    /// Signal cancellation; later calls are no-ops
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

/// Cooperative cancellation observed by running flows
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    receiver: watch::Receiver<bool>,
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::never()
    }
}

impl CancellationSignal {
    /// Linked handle and signal
    #[must_use]
    pub fn channel() -> (CancellationHandle, Self) {
        let (sender, receiver) = watch::channel(false);
        (
            CancellationHandle {
                sender: Arc::new(sender),
            },
            Self { receiver },
        )
    }

    /// Signal that never fires
    #[must_use]
    pub fn never() -> Self {
        Self::channel().1
    }

    /// Check if cancellation was signalled
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Fail with [`FlowError::Cancelled`] once signalled
    ///
    /// # Errors
    /// Returns [`FlowError::Cancelled`] if cancellation was signalled.
    pub fn check(&self) -> Result<(), FlowError> {
        if self.is_cancelled() {
            Err(FlowError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve when cancellation is signalled; pends forever otherwise
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Wait `delay` unless cancelled first
    ///
    /// # Errors
    /// Returns [`FlowError::Cancelled`] when cancellation wins the race.
    pub async fn sleep(&self, delay: Duration) -> Result<(), FlowError> {
        tokio::select! {
            () = tokio::time::sleep(delay) => Ok(()),
            () = self.cancelled() => Err(FlowError::Cancelled),
        }
    }
}

/// Shared capabilities of every flow run
#[derive(Debug)]
pub struct FlowRuntime {
    dispatcher: Arc<dyn Dispatcher>,
    evaluator: Arc<dyn Evaluator>,
    redactor: Arc<dyn Redactor>,
    registry: FlowRegistry,
    config: EngineConfig,
}

impl FlowRuntime {
    /// Runtime sending requests through `dispatcher`
    #[must_use]
    pub fn new(dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            dispatcher,
            evaluator: Arc::new(Interpreter::new()),
            redactor: Arc::new(MaskRedactor),
            registry: FlowRegistry::new(),
            config: EngineConfig::default(),
        }
    }

    /// With expression evaluator
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// With redactor for previews
    #[must_use]
    pub fn with_redactor(mut self, redactor: Arc<dyn Redactor>) -> Self {
        self.redactor = redactor;
        self
    }

    /// With flows available to `use`
    #[must_use]
    pub fn with_registry(mut self, registry: FlowRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// With engine configuration
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Dispatcher
    #[inline]
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.dispatcher
    }

    /// Expression evaluator
    #[inline]
    #[must_use]
    pub fn evaluator(&self) -> &Arc<dyn Evaluator> {
        &self.evaluator
    }

    /// Registered flows
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &FlowRegistry {
        &self.registry
    }

    /// Engine configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Renderer set up from this runtime
    #[must_use]
    pub fn renderer(&self) -> Renderer {
        Renderer::new()
            .with_evaluator(Arc::clone(&self.evaluator))
            .with_redactor(Arc::clone(&self.redactor))
            .with_redact_secrets(self.config.redact_secrets)
            .with_cache_capacity(self.config.render_cache_capacity)
    }
}

/// Environment, cancellation and runtime of a running flow
///
/// Contexts are never changed in place; each change yields a new one that
/// the caller threads forward.
#[derive(Debug, Clone)]
pub struct FlowContext {
    environment: Arc<Bindings>,
    cancellation: CancellationSignal,
    runtime: Arc<FlowRuntime>,
}

impl FlowContext {
    /// Empty environment, never cancelled
    #[must_use]
    pub fn new(runtime: Arc<FlowRuntime>) -> Self {
        Self {
            environment: Arc::new(Bindings::new()),
            cancellation: CancellationSignal::never(),
            runtime,
        }
    }

    /// Bindings after the last completed flow
    #[inline]
    #[must_use]
    pub fn environment(&self) -> &Bindings {
        &self.environment
    }

    /// Cancellation signal
    #[inline]
    #[must_use]
    pub fn cancellation(&self) -> &CancellationSignal {
        &self.cancellation
    }

    /// Shared runtime
    #[inline]
    #[must_use]
    pub fn runtime(&self) -> &Arc<FlowRuntime> {
        &self.runtime
    }

    /// Same context with `environment`
    #[must_use]
    pub fn with_environment(&self, environment: Bindings) -> Self {
        Self {
            environment: Arc::new(environment),
            ..self.clone()
        }
    }

    /// Same context with the environment extended by `values`
    #[must_use]
    pub fn extended(&self, values: &Bindings) -> Self {
        let mut environment = (*self.environment).clone();
        environment.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.with_environment(environment)
    }

    /// Same context observing `cancellation`
    #[must_use]
    pub fn with_cancellation(&self, cancellation: CancellationSignal) -> Self {
        Self {
            cancellation,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_sleep() {
        let (handle, signal) = CancellationSignal::channel();
        let waiter = tokio::spawn({
            let signal = signal.clone();
            async move { signal.sleep(Duration::from_secs(60)).await }
        });
        tokio::task::yield_now().await;
        handle.cancel();
        assert!(matches!(waiter.await.unwrap(), Err(FlowError::Cancelled)));
        assert!(signal.check().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn never_signal_sleeps_through() {
        let signal = CancellationSignal::never();
        assert!(signal.sleep(Duration::from_millis(10)).await.is_ok());
        assert!(!signal.is_cancelled());
    }
}
