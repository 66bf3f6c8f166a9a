//--------------------------------------------------------------------------------------------------
// STRUCTS & TRAITS
//--------------------------------------------------------------------------------------------------
// | Name                    | Description                                       | Key Methods       |
// |-------------------------|---------------------------------------------------|------------------|
// | EventBus                | Binds listeners, emits and pins events           | bind, emit, unpin |
//--------------------------------------------------------------------------------------------------

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::event_types::{EmitReport, EventError, EventResult, ListenerError};
use super::handlers::{DelegateId, EventReceiver, WildcardDelegate, describe_payload};
use super::pin_store::{PinStore, PinnedEvent};
use super::registry::{ListenerRegistration, ListenerRegistry, ListenerTarget};
use crate::config::GlobalOptions;
use crate::domain::models::event_key::{EventContext, EventKey, ReceiverId};
use crate::domain::models::wildcard::{TypeTag, WildcardValue};

/// Routine traffic goes to info when verbose logging is on, debug otherwise
macro_rules! trace_op {
    ($options:expr, $($arg:tt)+) => {
        if $options.verbose_logging {
            info!($($arg)+)
        } else {
            debug!($($arg)+)
        }
    };
}

/// Outcome of a single delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Delivered,
    Skipped,
}

#[derive(Debug, Default)]
struct BusState {
    registry: ListenerRegistry,
    pins: PinStore,
}

/// Synchronous event bus with pinned events.
///
/// Every operation runs on the calling thread. Clones share the same listeners, pins and
/// options. Listener code always runs with no lock held, so a listener may bind, unbind or
/// emit on the same bus while it is being dispatched to.
#[derive(Debug, Clone)]
pub struct EventBus {
    state: Arc<Mutex<BusState>>,
    options: Arc<RwLock<GlobalOptions>>,
    // Sequence counter for event ordering
    sequence_counter: Arc<AtomicU64>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(GlobalOptions::default())
    }
}

impl EventBus {
    pub fn new(options: GlobalOptions) -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState::default())),
            options: Arc::new(RwLock::new(options)),
            sequence_counter: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Replaces the options. Takes effect on the next operation.
    pub fn set_options(&self, options: GlobalOptions) {
        *self.options.write() = options;
        debug!("Event system options set to {:?}", options);
    }

    pub fn options(&self) -> GlobalOptions {
        *self.options.read()
    }

    /// Binds `function` on `receiver` to `key`.
    ///
    /// If `key` holds a pinned emission, the new listener receives it right away, before
    /// this call returns. Binding the same receiver function twice fails with
    /// [`EventError::DuplicateListener`] and delivers nothing.
    pub fn bind<R>(&self, ctx: &EventContext, key: &EventKey, receiver: &Arc<R>, function: &str) -> EventResult<()>
    where
        R: EventReceiver + 'static,
    {
        self.register(ctx, key, ListenerRegistration::function(receiver, function))
    }

    /// [`EventBus::bind`] for callers that only hold a type-erased receiver.
    pub fn bind_dyn(
        &self,
        ctx: &EventContext,
        key: &EventKey,
        receiver: &Arc<dyn EventReceiver>,
        function: &str,
    ) -> EventResult<()> {
        self.register(ctx, key, ListenerRegistration::function_dyn(receiver, function))
    }

    /// Binds a delegate to `key`. Same late delivery rules as [`EventBus::bind`].
    pub fn bind_to_delegate(&self, ctx: &EventContext, delegate: &WildcardDelegate, key: &EventKey) -> EventResult<()> {
        self.register(ctx, key, ListenerRegistration::delegate(delegate.clone()))
    }

    /// Removes `function` on `receiver` from `key`. Returns how many registrations were
    /// removed; unbinding something that was never bound is a no-op.
    pub fn unbind<R>(&self, ctx: &EventContext, key: &EventKey, receiver: &Arc<R>, function: &str) -> usize
    where
        R: ?Sized,
    {
        let removed = self
            .state
            .lock()
            .registry
            .unbind_function(key, ReceiverId::of(receiver), function);
        trace_op!(self.options(), "[{}] Unbound {} listener(s) '{}' from {}", ctx, removed, function, key);
        removed
    }

    pub fn unbind_delegate(&self, ctx: &EventContext, key: &EventKey, delegate_id: DelegateId) -> usize {
        let removed = self.state.lock().registry.unbind_delegate(key, delegate_id);
        trace_op!(self.options(), "[{}] Unbound {} from {} ({} removed)", ctx, delegate_id, key, removed);
        removed
    }

    /// Removes every function of `receiver` from every key. Meant for receiver teardown.
    pub fn unbind_receiver<R>(&self, ctx: &EventContext, receiver: &Arc<R>) -> usize
    where
        R: ?Sized,
    {
        let options = self.options();
        let receiver_id = ReceiverId::of(receiver);
        let (removed, stale) = {
            let mut state = self.state.lock();
            let removed = state.registry.unbind_receiver(receiver_id);
            (removed, state.registry.prune_all_stale())
        };
        trace_op!(options, "[{}] Removed {} binding(s) of {}", ctx, removed, receiver_id);
        self.report_stale_everywhere(ctx, stale, &options);
        removed
    }

    /// Emits `payload` to every listener of `key`, in bind order.
    ///
    /// With `pinned`, the emission is also stored for listeners that bind later. If the key
    /// is already pinned the listeners still receive the emission, but the pin is refused
    /// with [`EventError::AlreadyPinned`] and the earlier value stays; unpin it first.
    pub fn emit(
        &self,
        ctx: &EventContext,
        pinned: bool,
        key: &EventKey,
        payload: impl Into<WildcardValue>,
    ) -> EventResult<EmitReport> {
        self.dispatch(ctx, pinned, key, Some(payload.into()))
    }

    /// Emits `key` without a payload.
    pub fn emit_no_payload(&self, ctx: &EventContext, pinned: bool, key: &EventKey) -> EventResult<EmitReport> {
        self.dispatch(ctx, pinned, key, None)
    }

    /// Clears the pinned emission of `key`. Returns false when nothing was pinned.
    pub fn unpin(&self, ctx: &EventContext, key: &EventKey) -> bool {
        let options = self.options();
        let (removed, stale) = {
            let mut state = self.state.lock();
            (state.pins.unpin(key), state.registry.prune_all_stale())
        };
        match &removed {
            Some(pinned) => trace_op!(options, "[{}] Unpinned {} (pinned at {})", ctx, key, pinned.pinned_at()),
            None => trace_op!(options, "[{}] Unpin {}: not pinned", ctx, key),
        }
        self.report_stale_everywhere(ctx, stale, &options);
        removed.is_some()
    }

    pub fn is_pinned(&self, key: &EventKey) -> bool {
        self.state.lock().pins.is_pinned(key)
    }

    /// The pinned emission of `key`, if any.
    pub fn pinned(&self, key: &EventKey) -> Option<PinnedEvent> {
        self.state.lock().pins.get(key).cloned()
    }

    /// Number of registrations on `key`. Registrations of dropped receivers are counted
    /// until they are pruned: on the next bind or emit of the key, or on any
    /// `unbind_receiver` or `unpin` of the bus.
    pub fn listener_count(&self, key: &EventKey) -> usize {
        self.state.lock().registry.listener_count(key)
    }

    fn register(&self, ctx: &EventContext, key: &EventKey, registration: ListenerRegistration) -> EventResult<()> {
        let options = self.options();
        let listener = registration.describe();

        let pinned = {
            let mut state = self.state.lock();
            let stale = state.registry.prune_stale(key);
            self.report_stale(ctx, key, stale, &options);

            if let Err(err) = state.registry.bind(key, registration.clone()) {
                warn!("[{}] {}", ctx, err);
                return Err(err);
            }
            state.pins.get(key).cloned()
        };
        trace_op!(options, "[{}] Bound {} to {} at {}", ctx, listener, key, registration.bound_at());

        if let Some(pinned) = pinned {
            trace_op!(
                options,
                "[{}] Delivering pinned emission #{} of {} (pinned at {}) to {}",
                ctx,
                pinned.sequence(),
                key,
                pinned.pinned_at(),
                listener
            );
            self.deliver(ctx, key, &registration, pinned.payload(), &options);
        }
        Ok(())
    }

    fn dispatch(
        &self,
        ctx: &EventContext,
        pinned: bool,
        key: &EventKey,
        payload: Option<WildcardValue>,
    ) -> EventResult<EmitReport> {
        if let Some(value) = &payload {
            if value.type_tag() == TypeTag::Object {
                warn!("[{}] Refusing to emit {}: object payloads are not supported", ctx, key);
                return Err(EventError::UnsupportedPayload(TypeTag::Object));
            }
        }

        let options = self.options();

        // Snapshot under the lock, deliver without it
        let (listeners, mut report) = {
            let mut state = self.state.lock();
            let stale_removed = state.registry.prune_stale(key);
            let report = EmitReport {
                sequence: self.sequence_counter.fetch_add(1, Ordering::SeqCst),
                stale_removed,
                ..EmitReport::default()
            };
            (state.registry.listeners_for(key), report)
        };
        self.report_stale(ctx, key, report.stale_removed, &options);

        trace_op!(
            options,
            "[{}] Emitting #{} {} ({}{}) to {} listener(s)",
            ctx,
            report.sequence,
            key,
            describe_payload(payload.as_ref()),
            if pinned { ", pinned" } else { "" },
            listeners.len()
        );

        for registration in &listeners {
            match self.deliver(ctx, key, registration, payload.as_ref(), &options) {
                Delivery::Delivered => report.delivered += 1,
                Delivery::Skipped => report.skipped += 1,
            }
        }

        if pinned {
            // Already pinned: listeners got the emission, the old pin stays
            if let Err(err) = self.state.lock().pins.pin(key, payload, report.sequence) {
                warn!("[{}] {}", ctx, err);
                return Err(err);
            }
            trace_op!(options, "[{}] Pinned emission #{} of {}", ctx, report.sequence, key);
        }

        Ok(report)
    }

    fn deliver(
        &self,
        ctx: &EventContext,
        key: &EventKey,
        registration: &ListenerRegistration,
        payload: Option<&WildcardValue>,
        options: &GlobalOptions,
    ) -> Delivery {
        let result = match registration.target() {
            ListenerTarget::Delegate(delegate) => guarded(|| {
                delegate.call(payload);
                Ok(())
            }),
            ListenerTarget::Function { receiver, function, .. } => {
                let Some(receiver) = receiver.upgrade() else {
                    debug!("[{}] Receiver of {} was dropped during dispatch of {}", ctx, registration.describe(), key);
                    return Delivery::Skipped;
                };
                let Some(signature) = receiver.signature(function) else {
                    warn!(
                        "[{}] {} on {}",
                        ctx,
                        ListenerError::FunctionNotFound(function.clone()),
                        key
                    );
                    return Delivery::Skipped;
                };
                if options.verify_parameter_types && !signature.accepts(payload) {
                    let err = ListenerError::ParameterMismatch {
                        function: function.clone(),
                        expected: signature.describe(),
                        found: describe_payload(payload),
                    };
                    warn!("[{}] Skipping listener of {}: {}", ctx, key, err);
                    return Delivery::Skipped;
                }
                guarded(|| receiver.receive(function, payload))
            }
        };

        match result {
            Ok(()) => Delivery::Delivered,
            Err(err) => {
                error!("[{}] Listener {} of {} failed: {}", ctx, registration.describe(), key, err);
                Delivery::Skipped
            }
        }
    }

    fn report_stale_everywhere(&self, ctx: &EventContext, removed: usize, options: &GlobalOptions) {
        if removed == 0 {
            return;
        }
        if options.log_stale_removals {
            info!("[{}] Removed {} stale listener(s) across all events", ctx, removed);
        } else {
            debug!("[{}] Removed {} stale listener(s) across all events", ctx, removed);
        }
    }

    fn report_stale(&self, ctx: &EventContext, key: &EventKey, removed: usize, options: &GlobalOptions) {
        if removed == 0 {
            return;
        }
        if options.log_stale_removals {
            info!("[{}] Removed {} stale listener(s) from {}", ctx, removed, key);
        } else {
            debug!("[{}] Removed {} stale listener(s) from {}", ctx, removed, key);
        }
    }
}

/// Runs one listener, turning a panic into a [`ListenerError`] so the sweep can go on.
fn guarded<F>(listener: F) -> Result<(), ListenerError>
where
    F: FnOnce() -> Result<(), ListenerError>,
{
    panic::catch_unwind(AssertUnwindSafe(listener)).unwrap_or_else(|cause| Err(ListenerError::Failed(panic_message(&*cause))))
}

fn panic_message(cause: &(dyn Any + Send)) -> String {
    if let Some(message) = cause.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = cause.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}
