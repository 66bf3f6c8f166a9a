#[cfg(test)]
pub mod tests {
    use crate::config::GlobalOptions;
    use crate::domain::models::{EventContext, EventKey, ObjectRef, StructValue, TypeTag, WildcardValue};
    use crate::domain::services::events::{
        EventBus, EventError, EventReceiver, EventRecorder, FunctionReceiver, FunctionSignature, ListenerError,
        WildcardDelegate,
    };
    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Weak};
    use uuid::Uuid;

    type Log = Arc<Mutex<Vec<(String, i32)>>>;

    fn ctx() -> EventContext {
        EventContext::new("test")
    }

    fn score_key() -> EventKey {
        EventKey::global("Score")
    }

    // Helper to create a receiver whose "OnScore" function records (name, value)
    fn score_receiver(name: &str, log: &Log) -> Arc<FunctionReceiver> {
        let sink = Arc::clone(log);
        let label = name.to_string();
        Arc::new(FunctionReceiver::new(name).with_function(
            "OnScore",
            FunctionSignature::typed(TypeTag::Int),
            move |payload| {
                let value = payload
                    .ok_or_else(|| ListenerError::Failed("no payload".into()))?
                    .to_int()?;
                sink.lock().push((label.clone(), value));
                Ok(())
            },
        ))
    }

    fn names(log: &Log) -> Vec<String> {
        log.lock().iter().map(|(name, _)| name.clone()).collect()
    }

    /// Receiver that unbinds itself the first time it is called
    struct OneShot {
        bus: EventBus,
        key: EventKey,
        this: Weak<OneShot>,
        calls: AtomicUsize,
    }

    impl OneShot {
        fn new(bus: &EventBus, key: &EventKey) -> Arc<Self> {
            Arc::new_cyclic(|this| OneShot {
                bus: bus.clone(),
                key: key.clone(),
                this: this.clone(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl EventReceiver for OneShot {
        fn signature(&self, _function: &str) -> Option<FunctionSignature> {
            Some(FunctionSignature::wildcard())
        }

        fn receive(&self, function: &str, _payload: Option<&WildcardValue>) -> Result<(), ListenerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(this) = self.this.upgrade() {
                self.bus.unbind(&EventContext::new("one-shot"), &self.key, &this, function);
            }
            Ok(())
        }
    }

    #[test]
    fn test_pinned_emit_reaches_late_binder_once() {
        let bus = EventBus::default();
        let log = Log::default();

        let report = bus.emit(&ctx(), true, &score_key(), 42).unwrap();
        assert_eq!(report.delivered, 0);
        assert!(bus.is_pinned(&score_key()));

        let x = score_receiver("X", &log);
        bus.bind(&ctx(), &score_key(), &x, "OnScore").unwrap();
        assert_eq!(*log.lock(), vec![("X".to_string(), 42)]);

        // Binding something else does not replay to X again
        let y = score_receiver("Y", &log);
        bus.bind(&ctx(), &score_key(), &y, "OnScore").unwrap();
        assert_eq!(names(&log), vec!["X", "Y"]);
    }

    #[test]
    fn test_repin_fails_and_keeps_first_value() {
        let bus = EventBus::default();
        let log = Log::default();
        let x = score_receiver("X", &log);
        bus.bind(&ctx(), &score_key(), &x, "OnScore").unwrap();

        bus.emit(&ctx(), true, &score_key(), 1).unwrap();
        let err = bus.emit(&ctx(), true, &score_key(), 2).unwrap_err();
        assert_eq!(err, EventError::AlreadyPinned { key: score_key() });

        // Bound listeners still see the emission whose pin was refused
        assert_eq!(*log.lock(), vec![("X".to_string(), 1), ("X".to_string(), 2)]);
        assert_eq!(
            bus.pinned(&score_key()).unwrap().payload(),
            Some(&WildcardValue::Int(1))
        );

        // Non-pinned emissions still go through while the key is pinned
        bus.emit(&ctx(), false, &score_key(), 3).unwrap();
        assert_eq!(log.lock().last(), Some(&("X".to_string(), 3)));
        assert_eq!(
            bus.pinned(&score_key()).unwrap().payload(),
            Some(&WildcardValue::Int(1))
        );
    }

    #[test]
    fn test_refused_repin_still_reaches_listeners_and_late_binders_get_first_value() {
        let bus = EventBus::default();
        let recorder = Arc::new(EventRecorder::new(8));
        bus.bind(&ctx(), &score_key(), &recorder, EventRecorder::FUNCTION).unwrap();

        bus.emit(&ctx(), true, &score_key(), 1).unwrap();
        assert!(matches!(
            bus.emit(&ctx(), true, &score_key(), 2),
            Err(EventError::AlreadyPinned { .. })
        ));
        assert_eq!(
            recorder.payloads(),
            vec![Some(WildcardValue::Int(1)), Some(WildcardValue::Int(2))]
        );

        let late = EventRecorder::new(8);
        bus.bind_to_delegate(&ctx(), &late.delegate(), &score_key()).unwrap();
        assert_eq!(late.payloads(), vec![Some(WildcardValue::Int(1))]);
    }

    #[test]
    fn test_pinned_event_records_time_and_sequence() {
        let bus = EventBus::default();
        let before = chrono::Utc::now();
        let report = bus.emit(&ctx(), true, &score_key(), 5).unwrap();

        let pinned = bus.pinned(&score_key()).unwrap();
        assert_eq!(pinned.sequence(), report.sequence);
        assert!(pinned.pinned_at() >= before);
    }

    #[test]
    fn test_unpin_then_repin() {
        let bus = EventBus::default();
        assert!(!bus.unpin(&ctx(), &score_key()));

        bus.emit(&ctx(), true, &score_key(), 1).unwrap();
        assert!(bus.unpin(&ctx(), &score_key()));
        assert!(!bus.is_pinned(&score_key()));

        bus.emit(&ctx(), true, &score_key(), 2).unwrap();
        let log = Log::default();
        let x = score_receiver("X", &log);
        bus.bind(&ctx(), &score_key(), &x, "OnScore").unwrap();
        assert_eq!(*log.lock(), vec![("X".to_string(), 2)]);
    }

    #[test]
    fn test_unbind_never_bound_is_noop() {
        let bus = EventBus::default();
        let log = Log::default();
        let x = score_receiver("X", &log);

        assert_eq!(bus.unbind(&ctx(), &score_key(), &x, "OnScore"), 0);
        assert_eq!(bus.unbind_delegate(&ctx(), &score_key(), WildcardDelegate::new(|_| {}).id()), 0);
        assert_eq!(bus.unbind_receiver(&ctx(), &x), 0);
        assert_eq!(bus.listener_count(&score_key()), 0);
    }

    #[test]
    fn test_emit_follows_bind_order_every_time() {
        let bus = EventBus::default();
        let log = Log::default();
        let receivers: Vec<_> = ["L1", "L2", "L3"].iter().map(|n| score_receiver(n, &log)).collect();
        for receiver in &receivers {
            bus.bind(&ctx(), &score_key(), receiver, "OnScore").unwrap();
        }

        for value in 0..3 {
            let report = bus.emit(&ctx(), false, &score_key(), value).unwrap();
            assert_eq!(report.delivered, 3);
        }
        assert_eq!(names(&log), vec!["L1", "L2", "L3", "L1", "L2", "L3", "L1", "L2", "L3"]);
    }

    #[test]
    fn test_unbound_listener_is_not_called() {
        let bus = EventBus::default();
        let log = Log::default();
        let a = score_receiver("A", &log);
        let b = score_receiver("B", &log);

        bus.bind(&ctx(), &score_key(), &a, "OnScore").unwrap();
        bus.bind(&ctx(), &score_key(), &b, "OnScore").unwrap();
        assert_eq!(bus.unbind(&ctx(), &score_key(), &a, "OnScore"), 1);

        bus.emit(&ctx(), false, &score_key(), 7).unwrap();
        assert_eq!(*log.lock(), vec![("B".to_string(), 7)]);
    }

    #[test]
    fn test_self_unbind_during_dispatch() {
        let bus = EventBus::default();
        let key = EventKey::new("ui", "Close");
        let one_shot = OneShot::new(&bus, &key);
        let recorder = Arc::new(EventRecorder::new(8));

        bus.bind(&ctx(), &key, &one_shot, "OnClose").unwrap();
        bus.bind(&ctx(), &key, &recorder, EventRecorder::FUNCTION).unwrap();

        let first = bus.emit(&ctx(), false, &key, true).unwrap();
        assert_eq!(first.delivered, 2);
        assert_eq!(one_shot.calls.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count(&key), 1);

        let second = bus.emit(&ctx(), false, &key, false).unwrap();
        assert_eq!(second.delivered, 1);
        assert_eq!(one_shot.calls.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.len(), 2);
    }

    #[test]
    fn test_unbinding_another_listener_mid_dispatch_keeps_snapshot() {
        let bus = EventBus::default();
        let log = Log::default();
        let victim = score_receiver("victim", &log);

        let killer = {
            let bus = bus.clone();
            let victim = Arc::clone(&victim);
            WildcardDelegate::new(move |_| {
                bus.unbind(&EventContext::new("killer"), &score_key(), &victim, "OnScore");
            })
        };
        bus.bind_to_delegate(&ctx(), &killer, &score_key()).unwrap();
        bus.bind(&ctx(), &score_key(), &victim, "OnScore").unwrap();

        bus.emit(&ctx(), false, &score_key(), 1).unwrap();
        bus.emit(&ctx(), false, &score_key(), 2).unwrap();
        assert_eq!(*log.lock(), vec![("victim".to_string(), 1)]);
    }

    #[test]
    fn test_delegate_receives_payload_and_pinned_value() {
        let bus = EventBus::default();
        let recorder = EventRecorder::new(8);
        let key = EventKey::new("match", "Phase");

        bus.emit(&ctx(), true, &key, "warmup").unwrap();
        bus.bind_to_delegate(&ctx(), &recorder.delegate(), &key).unwrap();
        assert_eq!(recorder.payloads(), vec![Some(WildcardValue::from("warmup"))]);

        bus.emit_no_payload(&ctx(), false, &key).unwrap();
        assert_eq!(recorder.payloads()[1], None);
    }

    #[test]
    fn test_pinned_emit_without_payload() {
        let bus = EventBus::default();
        let key = EventKey::new("level", "Loaded");
        bus.emit_no_payload(&ctx(), true, &key).unwrap();

        let recorder = Arc::new(EventRecorder::new(4));
        bus.bind(&ctx(), &key, &recorder, EventRecorder::FUNCTION).unwrap();
        assert_eq!(recorder.payloads(), vec![None]);
    }

    #[test]
    fn test_duplicate_bind_is_rejected_without_late_delivery() {
        let bus = EventBus::default();
        let log = Log::default();
        let x = score_receiver("X", &log);
        bus.emit(&ctx(), true, &score_key(), 5).unwrap();

        bus.bind(&ctx(), &score_key(), &x, "OnScore").unwrap();
        let err = bus.bind(&ctx(), &score_key(), &x, "OnScore").unwrap_err();
        assert!(matches!(err, EventError::DuplicateListener { .. }));
        assert_eq!(log.lock().len(), 1);
        assert_eq!(bus.listener_count(&score_key()), 1);
    }

    #[test]
    fn test_parameter_verification_skips_mismatch() {
        let bus = EventBus::default();
        let log = Log::default();
        let x = score_receiver("X", &log);
        bus.bind(&ctx(), &score_key(), &x, "OnScore").unwrap();

        let report = bus.emit(&ctx(), false, &score_key(), "not a number").unwrap();
        assert_eq!(report.delivered, 0);
        assert_eq!(report.skipped, 1);

        let report = bus.emit_no_payload(&ctx(), false, &score_key()).unwrap();
        assert_eq!(report.skipped, 1);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_options_are_read_at_call_time() {
        let bus = EventBus::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let receiver = Arc::new(FunctionReceiver::new("strict").with_function(
            "OnFloat",
            FunctionSignature::typed(TypeTag::Float),
            move |payload| {
                counter.fetch_add(1, Ordering::SeqCst);
                payload.map(|p| p.to_float()).transpose()?;
                Ok(())
            },
        ));
        bus.bind(&ctx(), &score_key(), &receiver, "OnFloat").unwrap();

        bus.emit(&ctx(), false, &score_key(), 3).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        bus.set_options(GlobalOptions {
            verify_parameter_types: false,
            ..GlobalOptions::default()
        });
        // Invoked with the wrong data; the receiver's own conversion fails and is logged
        let report = bus.emit(&ctx(), false, &score_key(), 3).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.skipped, 1);

        bus.set_options(GlobalOptions::default());
        bus.emit(&ctx(), false, &score_key(), 3).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Loot {
        item: String,
        gold: u32,
    }

    #[test]
    fn test_struct_payload_type_name_is_verified() {
        let bus = EventBus::default();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let receiver = Arc::new(FunctionReceiver::new("inventory").with_function(
            "OnLoot",
            FunctionSignature::structure("Loot"),
            move |payload| {
                if let Some(value) = payload {
                    sink.lock().push(value.to_struct::<Loot>()?);
                }
                Ok(())
            },
        ));
        let key = EventKey::new("inventory", "Loot");
        bus.bind(&ctx(), &key, &receiver, "OnLoot").unwrap();

        let loot = Loot { item: "sword".into(), gold: 12 };
        bus.emit(&ctx(), false, &key, StructValue::from_serde("Loot", &loot).unwrap()).unwrap();
        let report = bus
            .emit(&ctx(), false, &key, StructValue::new("Quest", serde_json::json!({"id": 1})))
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(*received.lock(), vec![loot]);
    }

    #[test]
    fn test_missing_function_is_skipped() {
        let bus = EventBus::default();
        let log = Log::default();
        let x = score_receiver("X", &log);
        bus.bind(&ctx(), &score_key(), &x, "OnTypo").unwrap();

        let report = bus.emit(&ctx(), false, &score_key(), 1).unwrap();
        assert_eq!(report.skipped, 1);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_object_payload_is_rejected() {
        let bus = EventBus::default();
        let recorder = EventRecorder::new(4);
        bus.bind_to_delegate(&ctx(), &recorder.delegate(), &score_key()).unwrap();

        let err = bus
            .emit(&ctx(), true, &score_key(), ObjectRef::new(Uuid::new_v4()))
            .unwrap_err();
        assert_eq!(err, EventError::UnsupportedPayload(TypeTag::Object));
        assert!(recorder.is_empty());
        assert!(!bus.is_pinned(&score_key()));
    }

    #[test]
    fn test_failing_listener_does_not_stop_dispatch() {
        let bus = EventBus::default();
        let log = Log::default();
        let failing = Arc::new(FunctionReceiver::new("failing").with_function(
            "OnScore",
            FunctionSignature::typed(TypeTag::Int),
            |_| Err(ListenerError::Failed("refused".into())),
        ));
        let after = score_receiver("after", &log);
        bus.bind(&ctx(), &score_key(), &failing, "OnScore").unwrap();
        bus.bind(&ctx(), &score_key(), &after, "OnScore").unwrap();

        let report = bus.emit(&ctx(), false, &score_key(), 6).unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(*log.lock(), vec![("after".to_string(), 6)]);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_dispatch() {
        let bus = EventBus::default();
        let log = Log::default();
        let after = score_receiver("after", &log);

        bus.bind_to_delegate(&ctx(), &WildcardDelegate::new(|_| panic!("boom")), &score_key())
            .unwrap();
        bus.bind(&ctx(), &score_key(), &after, "OnScore").unwrap();

        let report = bus.emit(&ctx(), false, &score_key(), 9).unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(*log.lock(), vec![("after".to_string(), 9)]);
    }

    #[test]
    fn test_dropped_receivers_are_pruned() {
        let bus = EventBus::new(GlobalOptions {
            log_stale_removals: true,
            ..GlobalOptions::default()
        });
        let log = Log::default();
        let gone = score_receiver("gone", &log);
        let kept = score_receiver("kept", &log);
        bus.bind(&ctx(), &score_key(), &gone, "OnScore").unwrap();
        bus.bind(&ctx(), &score_key(), &kept, "OnScore").unwrap();
        drop(gone);

        assert_eq!(bus.listener_count(&score_key()), 2);
        let report = bus.emit(&ctx(), false, &score_key(), 4).unwrap();
        assert_eq!(report.stale_removed, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(bus.listener_count(&score_key()), 1);
        assert_eq!(names(&log), vec!["kept"]);
    }

    #[test]
    fn test_unpin_prunes_dropped_receivers_on_untouched_keys() {
        let bus = EventBus::default();
        let log = Log::default();
        let gone = score_receiver("gone", &log);
        let quiet = EventKey::new("quiet", "NeverEmitted");
        bus.bind(&ctx(), &quiet, &gone, "OnScore").unwrap();
        drop(gone);

        assert_eq!(bus.listener_count(&quiet), 1);
        bus.unpin(&ctx(), &score_key());
        assert_eq!(bus.listener_count(&quiet), 0);
    }

    #[test]
    fn test_bind_type_erased_receiver() {
        let bus = EventBus::default();
        let log = Log::default();
        let concrete = score_receiver("erased", &log);
        let erased: Arc<dyn EventReceiver> = concrete.clone();

        bus.emit(&ctx(), true, &score_key(), 8).unwrap();
        bus.bind_dyn(&ctx(), &score_key(), &erased, "OnScore").unwrap();
        assert_eq!(*log.lock(), vec![("erased".to_string(), 8)]);

        assert_eq!(bus.unbind(&ctx(), &score_key(), &concrete, "OnScore"), 1);
        assert_eq!(bus.listener_count(&score_key()), 0);
    }

    #[test]
    fn test_unbind_receiver_clears_every_key() {
        let bus = EventBus::default();
        let recorder = Arc::new(EventRecorder::new(8));
        let keys = [EventKey::global("A"), EventKey::new("ui", "B")];
        for key in &keys {
            bus.bind(&ctx(), key, &recorder, EventRecorder::FUNCTION).unwrap();
        }

        assert_eq!(bus.unbind_receiver(&ctx(), &recorder), 2);
        for key in &keys {
            bus.emit_no_payload(&ctx(), false, key).unwrap();
        }
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_emit_without_listeners_and_sequence_numbers() {
        let bus = EventBus::default();
        let first = bus.emit_no_payload(&ctx(), false, &EventKey::global("Nobody")).unwrap();
        let second = bus.emit(&ctx(), false, &EventKey::global("Nobody"), 1.5f32).unwrap();

        assert_eq!(first.total(), 0);
        assert!(second.sequence > first.sequence);
    }

    #[test]
    fn test_domains_are_isolated() {
        let bus = EventBus::default();
        let log = Log::default();
        let x = score_receiver("X", &log);
        bus.bind(&ctx(), &EventKey::new("arena", "Score"), &x, "OnScore").unwrap();

        bus.emit(&ctx(), false, &score_key(), 1).unwrap();
        bus.emit(&ctx(), false, &EventKey::new("Arena", "Score"), 2).unwrap();
        bus.emit(&ctx(), false, &EventKey::new("arena", "Score"), 3).unwrap();
        assert_eq!(*log.lock(), vec![("X".to_string(), 3)]);
    }

    #[test]
    fn test_clones_share_state() {
        let bus = EventBus::default();
        let other = bus.clone();
        other.emit(&ctx(), true, &score_key(), 10).unwrap();
        assert!(bus.is_pinned(&score_key()));

        bus.set_options(GlobalOptions {
            verbose_logging: true,
            ..GlobalOptions::default()
        });
        assert!(other.options().verbose_logging);
    }
}
