//! Integration tests for checkout: session initiation through reconciliation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use checkout::{
    CheckoutError, CheckoutMetadata, CheckoutReconciler, CheckoutSettings, InMemoryNotifier,
    InMemoryPaymentProcessor, NotificationEvent, PaymentError, PaymentSession,
    PaymentSessionInitiator, PaymentStatus, ProcessedSessions, ReconcileOutcome,
};
use domain::BagService;
use rust_decimal_macros::dec;
use store::{
    BagId, BagStatus, FabricSelection, InMemoryStore, NewBagItem, Profile, ProfileRole,
    ShippingAddress, Store, UserId,
};

struct TestHarness {
    store: InMemoryStore,
    payments: InMemoryPaymentProcessor,
    notifier: InMemoryNotifier,
    guard: Arc<ProcessedSessions>,
    bags: BagService<InMemoryStore>,
    initiator: PaymentSessionInitiator<InMemoryStore>,
    reconciler: Arc<CheckoutReconciler<InMemoryStore>>,
}

struct PaidCheckout {
    session_id: String,
    bag_id: BagId,
    user: UserId,
    tailor: UserId,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_window(Duration::from_secs(60))
    }

    fn with_window(window: Duration) -> Self {
        let store = InMemoryStore::new();
        let payments = InMemoryPaymentProcessor::new();
        let notifier = InMemoryNotifier::new();
        let guard = Arc::new(ProcessedSessions::new(window));

        let initiator = PaymentSessionInitiator::new(
            store.clone(),
            Arc::new(payments.clone()),
            CheckoutSettings::default(),
        );
        let reconciler = Arc::new(CheckoutReconciler::new(
            store.clone(),
            Arc::new(payments.clone()),
            Arc::new(notifier.clone()),
            guard.clone(),
        ));

        Self {
            bags: BagService::new(store.clone()),
            store,
            payments,
            notifier,
            guard,
            initiator,
            reconciler,
        }
    }

    async fn add_profile(&self, id: UserId, role: ProfileRole, email: &str) {
        self.store
            .upsert_profile(Profile {
                id,
                full_name: email.split('@').next().unwrap_or_default().to_string(),
                email: email.to_string(),
                role,
            })
            .await
            .unwrap();
    }

    /// Fills a bag with two items, creates a session for it and (optionally) pays.
    async fn checkout(&self, pay: bool) -> PaidCheckout {
        let user = UserId::new();
        let tailor = UserId::new();
        self.add_profile(user, ProfileRole::Customer, "ada@example.com")
            .await;
        self.add_profile(tailor, ProfileRole::Tailor, "tomas@example.com")
            .await;

        self.bags.add_item(user, tailor, kurta()).await.unwrap();
        let added = self.bags.add_item(user, tailor, kurta()).await.unwrap();

        let session = self
            .initiator
            .start_checkout(user, &address())
            .await
            .unwrap();
        if pay {
            assert!(self.payments.mark_paid(&session.session_id));
        }

        PaidCheckout {
            session_id: session.session_id,
            bag_id: added.bag.id,
            user,
            tailor,
        }
    }

    async fn bag_status(&self, bag_id: BagId) -> BagStatus {
        self.store.get_bag(bag_id).await.unwrap().unwrap().status
    }
}

fn kurta() -> NewBagItem {
    NewBagItem {
        design_id: "D-1".to_string(),
        design_name: "Kurta".to_string(),
        price: dec!(20),
        fabric: Some(FabricSelection {
            fabric_id: "F-7".to_string(),
            price_per_yard: Some(dec!(5)),
            yards: Some(dec!(3)),
        }),
        color: Some("indigo".to_string()),
        style: None,
        tailor_notes: Some("slim fit".to_string()),
        measurement_id: Some("M-9".to_string()),
    }
}

fn address() -> ShippingAddress {
    ShippingAddress {
        street: "1 Main St".to_string(),
        city: "Austin".to_string(),
        state: "TX".to_string(),
        postal_code: "78701".to_string(),
        country: Some("US".to_string()),
    }
}

mod happy_path {
    use super::*;

    #[tokio::test]
    async fn paid_session_becomes_one_order() {
        let h = TestHarness::new();
        let c = h.checkout(true).await;

        let outcome = h.reconciler.reconcile(&c.session_id).await.unwrap();
        let ReconcileOutcome::OrderPlaced {
            order_id,
            already_existing,
        } = outcome
        else {
            panic!("expected an order, got {outcome:?}");
        };
        assert!(!already_existing);

        let order = h.store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.bag_id, c.bag_id);
        assert_eq!(order.user_id, c.user);
        assert_eq!(order.tailor_id, c.tailor);
        assert_eq!(order.total_cents, 7000);
        assert_eq!(order.session_id, c.session_id);
        assert_eq!(order.shipping_address, address());

        let lines = h.store.list_order_items(order_id).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.tailor_notes.as_deref() == Some("slim fit")));

        assert_eq!(h.bag_status(c.bag_id).await, BagStatus::CheckedOut);
        assert!(h.store.find_open_bag(c.user).await.unwrap().is_none());

        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event, NotificationEvent::OrderPlaced);
        assert_eq!(sent[0].order_id, order_id);
        assert_eq!(sent[0].customer_email, "ada@example.com");
        assert_eq!(sent[0].tailor_email, "tomas@example.com");
    }

    #[tokio::test]
    async fn order_total_is_the_charged_amount() {
        let h = TestHarness::new();
        let user = UserId::new();
        let tailor = UserId::new();
        let added = h.bags.add_item(user, tailor, kurta()).await.unwrap();

        // Charged 50.00 although the bag prices at 35.00 today.
        let metadata = CheckoutMetadata {
            bag_id: added.bag.id,
            user_id: user,
            tailor_id: tailor,
            shipping_address: address(),
        }
        .to_map()
        .unwrap();
        h.payments.insert_session(PaymentSession {
            id: "cs_locked".to_string(),
            payment_status: PaymentStatus::Paid,
            amount_total: 5000,
            metadata,
        });

        let outcome = h.reconciler.reconcile("cs_locked").await.unwrap();
        let order = h
            .store
            .get_order(outcome.order_id().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.total_cents, 5000);
    }
}

mod idempotence {
    use super::*;

    #[tokio::test]
    async fn second_call_is_flagged_already_existing() {
        let h = TestHarness::new();
        let c = h.checkout(true).await;

        let first = h.reconciler.reconcile(&c.session_id).await.unwrap();
        let second = h.reconciler.reconcile(&c.session_id).await.unwrap();

        assert!(!first.already_existing());
        assert!(second.already_existing());
        assert_eq!(first.order_id(), second.order_id());
        assert_eq!(h.store.order_count_for_bag(c.bag_id).await, 1);

        // The guard answered the second call.
        assert_eq!(h.payments.retrieve_calls(), 1);
        assert_eq!(h.notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn storage_check_holds_without_the_guard() {
        let h = TestHarness::new();
        let c = h.checkout(true).await;

        let first = h.reconciler.reconcile(&c.session_id).await.unwrap();
        h.guard.clear().await;
        let second = h.reconciler.reconcile(&c.session_id).await.unwrap();

        assert!(second.already_existing());
        assert_eq!(first.order_id(), second.order_id());
        assert_eq!(h.payments.retrieve_calls(), 2);
        assert_eq!(h.store.order_count().await, 1);
    }

    #[tokio::test]
    async fn concurrent_calls_create_exactly_one_order() {
        let h = TestHarness::new();
        let c = h.checkout(true).await;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let reconciler = h.reconciler.clone();
            let session_id = c.session_id.clone();
            handles.push(tokio::spawn(async move {
                reconciler.reconcile(&session_id).await
            }));
        }

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap().unwrap());
        }

        let created = outcomes.iter().filter(|o| !o.already_existing()).count();
        assert_eq!(created, 1);
        let order_id = outcomes[0].order_id();
        assert!(outcomes.iter().all(|o| o.order_id() == order_id));

        assert_eq!(h.store.order_count_for_bag(c.bag_id).await, 1);
        let lines = h
            .store
            .list_order_items(order_id.unwrap())
            .await
            .unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(h.notifier.sent().len(), 1);
        assert_eq!(h.bag_status(c.bag_id).await, BagStatus::CheckedOut);
    }

    #[tokio::test]
    async fn concurrent_calls_without_guard_create_exactly_one_order() {
        let h = TestHarness::with_window(Duration::ZERO);
        let c = h.checkout(true).await;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let reconciler = h.reconciler.clone();
            let session_id = c.session_id.clone();
            handles.push(tokio::spawn(async move {
                reconciler.reconcile(&session_id).await
            }));
        }

        let mut created = 0;
        for handle in handles {
            if !handle.await.unwrap().unwrap().already_existing() {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        assert_eq!(h.store.order_count().await, 1);
        assert_eq!(h.payments.retrieve_calls(), 16);
    }
}

mod guard_window {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn replay_after_window_goes_back_to_the_processor() {
        let h = TestHarness::new();
        let c = h.checkout(true).await;

        let first = h.reconciler.reconcile(&c.session_id).await.unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        h.reconciler.reconcile(&c.session_id).await.unwrap();
        assert_eq!(h.payments.retrieve_calls(), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        let late = h.reconciler.reconcile(&c.session_id).await.unwrap();
        assert_eq!(h.payments.retrieve_calls(), 2);
        assert!(late.already_existing());
        assert_eq!(late.order_id(), first.order_id());
        assert_eq!(h.store.order_count().await, 1);
    }

    #[tokio::test]
    async fn failures_are_not_recorded() {
        let h = TestHarness::new();
        let c = h.checkout(false).await;

        assert!(h.reconciler.reconcile(&c.session_id).await.is_err());
        assert!(h.guard.is_empty().await);

        h.payments.mark_paid(&c.session_id);
        let outcome = h.reconciler.reconcile(&c.session_id).await.unwrap();
        assert!(!outcome.already_existing());
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn unpaid_session_changes_nothing() {
        let h = TestHarness::new();
        let c = h.checkout(false).await;

        let err = h.reconciler.reconcile(&c.session_id).await.unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::PaymentIncomplete {
                status: PaymentStatus::Unpaid,
                ..
            }
        ));
        assert_eq!(h.bag_status(c.bag_id).await, BagStatus::Open);
        assert_eq!(h.store.order_count().await, 0);
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn checked_out_bag_without_order_is_an_anomaly() {
        let h = TestHarness::new();
        let c = h.checkout(true).await;
        h.store
            .set_bag_status(c.bag_id, BagStatus::CheckedOut)
            .await
            .unwrap();

        let err = h.reconciler.reconcile(&c.session_id).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Anomaly { bag_id, .. } if bag_id == c.bag_id));
        assert_eq!(h.store.order_count().await, 0);

        // Still reported on retry; never auto-corrected.
        let err = h.reconciler.reconcile(&c.session_id).await.unwrap_err();
        assert_eq!(err.kind(), "anomaly");
        assert_eq!(h.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn processor_timeout_is_retryable() {
        let h = TestHarness::new();
        let c = h.checkout(true).await;
        h.payments
            .set_fail_on_retrieve(Some(PaymentError::Timeout("15s elapsed".to_string())));

        let err = h.reconciler.reconcile(&c.session_id).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(h.store.order_count().await, 0);

        h.payments.set_fail_on_retrieve(None);
        let outcome = h.reconciler.reconcile(&c.session_id).await.unwrap();
        assert!(!outcome.already_existing());
    }

    #[tokio::test]
    async fn unknown_session_is_reported() {
        let h = TestHarness::new();
        let err = h.reconciler.reconcile("cs_missing").await.unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::Payment(PaymentError::SessionNotFound(_))
        ));

        let err = h.reconciler.reconcile("   ").await.unwrap_err();
        assert!(matches!(err, CheckoutError::MissingSessionId));
    }

    #[tokio::test]
    async fn malformed_session_id_never_reaches_the_processor() {
        let h = TestHarness::new();

        for session_id in ["cs_test/../../customers/cus_1", "cs_1?expand[]=sources", "cs_1%2F"] {
            let err = h.reconciler.reconcile(session_id).await.unwrap_err();
            assert!(matches!(err, CheckoutError::InvalidSessionId(_)), "{session_id}");
            assert_eq!(err.kind(), "invalid");
        }
        assert_eq!(h.payments.retrieve_calls(), 0);
    }

    #[tokio::test]
    async fn session_without_bag_is_a_no_op() {
        let h = TestHarness::new();
        h.payments.insert_session(PaymentSession {
            id: "cs_gift".to_string(),
            payment_status: PaymentStatus::Paid,
            amount_total: 2500,
            metadata: HashMap::from([("gift_card".to_string(), "GC-1".to_string())]),
        });

        let outcome = h.reconciler.reconcile("cs_gift").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::NotBagCheckout);
        assert_eq!(h.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn incomplete_metadata_is_rejected() {
        let h = TestHarness::new();
        h.payments.insert_session(PaymentSession {
            id: "cs_partial".to_string(),
            payment_status: PaymentStatus::Paid,
            amount_total: 2500,
            metadata: HashMap::from([("bag_id".to_string(), BagId::new().to_string())]),
        });

        let err = h.reconciler.reconcile("cs_partial").await.unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidMetadata(_)));
    }

    #[tokio::test]
    async fn missing_bag_is_not_found() {
        let h = TestHarness::new();
        let metadata = CheckoutMetadata {
            bag_id: BagId::new(),
            user_id: UserId::new(),
            tailor_id: UserId::new(),
            shipping_address: address(),
        }
        .to_map()
        .unwrap();
        h.payments.insert_session(PaymentSession {
            id: "cs_orphan".to_string(),
            payment_status: PaymentStatus::Paid,
            amount_total: 2500,
            metadata,
        });

        let err = h.reconciler.reconcile("cs_orphan").await.unwrap_err();
        assert!(matches!(err, CheckoutError::BagNotFound(_)));
    }

    #[tokio::test]
    async fn empty_bag_cannot_become_an_order() {
        let h = TestHarness::new();
        let user = UserId::new();
        let tailor = UserId::new();
        let added = h.bags.add_item(user, tailor, kurta()).await.unwrap();
        h.bags.remove_item(user, added.item.id).await.unwrap();

        let metadata = CheckoutMetadata {
            bag_id: added.bag.id,
            user_id: user,
            tailor_id: tailor,
            shipping_address: address(),
        }
        .to_map()
        .unwrap();
        h.payments.insert_session(PaymentSession {
            id: "cs_empty".to_string(),
            payment_status: PaymentStatus::Paid,
            amount_total: 3500,
            metadata,
        });

        let err = h.reconciler.reconcile("cs_empty").await.unwrap_err();
        assert!(matches!(err, CheckoutError::EmptyBag));
        assert_eq!(h.store.order_count().await, 0);
        assert_eq!(h.bag_status(added.bag.id).await, BagStatus::Open);
    }
}

mod notifications {
    use super::*;

    #[tokio::test]
    async fn notification_failure_does_not_fail_reconcile() {
        let h = TestHarness::new();
        h.notifier.set_fail_on_send(true);
        let c = h.checkout(true).await;

        let outcome = h.reconciler.reconcile(&c.session_id).await.unwrap();
        assert!(!outcome.already_existing());
        assert_eq!(h.notifier.attempts(), 1);
        assert!(h.notifier.sent().is_empty());
        assert_eq!(h.bag_status(c.bag_id).await, BagStatus::CheckedOut);
    }

    #[tokio::test]
    async fn missing_profiles_skip_notification() {
        let h = TestHarness::new();
        let user = UserId::new();
        let tailor = UserId::new();
        h.bags.add_item(user, tailor, kurta()).await.unwrap();
        let session = h.initiator.start_checkout(user, &address()).await.unwrap();
        h.payments.mark_paid(&session.session_id);

        let outcome = h.reconciler.reconcile(&session.session_id).await.unwrap();
        assert!(outcome.order_id().is_some());
        assert_eq!(h.notifier.attempts(), 0);
    }
}

mod resume {
    use super::*;

    #[tokio::test]
    async fn partial_item_copy_is_completed_by_the_next_call() {
        let h = TestHarness::new();
        let c = h.checkout(true).await;
        h.store.fail_order_items_after(1).await;

        let err = h.reconciler.reconcile(&c.session_id).await.unwrap_err();
        let CheckoutError::OrderItemsIncomplete { order_id, .. } = err else {
            panic!("expected OrderItemsIncomplete, got {err:?}");
        };
        assert_eq!(h.store.order_count().await, 1);
        assert_eq!(h.store.list_order_items(order_id).await.unwrap().len(), 1);
        assert_eq!(h.bag_status(c.bag_id).await, BagStatus::Open);

        h.store.clear_faults().await;
        let outcome = h.reconciler.reconcile(&c.session_id).await.unwrap();

        assert_eq!(outcome.order_id(), Some(order_id));
        assert!(outcome.already_existing());
        assert_eq!(h.store.order_count().await, 1);
        assert_eq!(h.store.list_order_items(order_id).await.unwrap().len(), 2);
        assert_eq!(h.bag_status(c.bag_id).await, BagStatus::CheckedOut);
    }

    #[tokio::test]
    async fn completing_a_partial_copy_sends_the_order_notification() {
        let h = TestHarness::new();
        let c = h.checkout(true).await;
        h.store.fail_order_items_after(1).await;

        h.reconciler.reconcile(&c.session_id).await.unwrap_err();
        assert_eq!(h.notifier.attempts(), 0);

        h.store.clear_faults().await;
        let outcome = h.reconciler.reconcile(&c.session_id).await.unwrap();
        assert!(outcome.already_existing());

        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event, NotificationEvent::OrderPlaced);
        assert_eq!(Some(sent[0].order_id), outcome.order_id());

        // A full replay after the bag is reopened copies nothing new.
        h.store
            .set_bag_status(c.bag_id, BagStatus::Open)
            .await
            .unwrap();
        h.guard.clear().await;
        h.reconciler.reconcile(&c.session_id).await.unwrap();
        assert_eq!(h.notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn open_bag_with_order_is_closed_without_a_second_order() {
        let h = TestHarness::new();
        let c = h.checkout(true).await;
        let first = h.reconciler.reconcile(&c.session_id).await.unwrap();

        // Simulate a crash between order creation and bag closure.
        h.store
            .set_bag_status(c.bag_id, BagStatus::Open)
            .await
            .unwrap();
        h.guard.clear().await;

        let second = h.reconciler.reconcile(&c.session_id).await.unwrap();
        assert_eq!(second.order_id(), first.order_id());
        assert!(second.already_existing());
        assert_eq!(h.store.order_count().await, 1);
        assert_eq!(h.bag_status(c.bag_id).await, BagStatus::CheckedOut);
        assert_eq!(h.notifier.sent().len(), 1);
    }
}

mod bag_rules {
    use super::*;

    #[tokio::test]
    async fn checkout_frees_the_user_for_another_tailor() {
        let h = TestHarness::new();
        let c = h.checkout(true).await;

        // Before reconciliation, another tailor is rejected.
        let err = h
            .bags
            .add_item(c.user, UserId::new(), kurta())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            domain::DomainError::Bag(domain::BagError::TailorMismatch { .. })
        ));

        h.reconciler.reconcile(&c.session_id).await.unwrap();

        let added = h
            .bags
            .add_item(c.user, UserId::new(), kurta())
            .await
            .unwrap();
        assert!(added.bag_created);
        assert_ne!(added.bag.id, c.bag_id);
    }
}
