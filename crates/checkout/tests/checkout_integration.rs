//! Integration tests for the checkout saga.
//!
//! These tests drive full checkouts against the in-memory document store and
//! verify the durable effects: orders, commissions, affiliate ledgers and
//! stock.

use std::time::Duration;

use checkout::{
    CheckoutConfig, CheckoutCoordinator, CheckoutError, CheckoutRequest, FaultKind, Reconciler,
    RetryPolicy, SettlementStatus, SimulatedPaymentGateway,
};
use document_store::{
    DocumentQuery, DocumentStore, DocumentStoreExt, DocumentUpdate, FaultRule,
    InMemoryDocumentStore, StoreOp, collections,
};
use storefront::{
    Affiliate, AffiliateId, BuyerId, CartLedger, Commission, CommissionStatus, FulfillmentStatus,
    MemoryLocalStore, Money, Order, PaymentStatus, Product, ProductId, ReferralTracker,
    ShippingDetails, UserProfile, UserRole,
};

type Coordinator = CheckoutCoordinator<InMemoryDocumentStore, SimulatedPaymentGateway>;

/// One buyer's device: its own cart and referral slot.
struct Device {
    cart: CartLedger<MemoryLocalStore>,
    referral: ReferralTracker<MemoryLocalStore>,
}

impl Device {
    fn new() -> Self {
        let local = MemoryLocalStore::new();
        Self {
            cart: CartLedger::load(local.clone()).unwrap(),
            referral: ReferralTracker::new(local),
        }
    }

    fn add(&mut self, product_id: &str, product: &Product, quantity: u32) {
        self.cart
            .add_item(ProductId::new(product_id), product, "M", "Preto", quantity)
            .unwrap();
    }
}

fn product(price_reais: i64, stock: i64) -> Product {
    Product {
        name: "Vestido Floral".into(),
        price: Money::from_reais(price_reais),
        stock,
        images: vec!["vestido.jpg".into()],
        sizes: vec!["M".into()],
        colors: vec!["Preto".into()],
        category: "vestidos".into(),
        description: String::new(),
    }
}

fn request(buyer: &str) -> CheckoutRequest {
    CheckoutRequest::new(
        Some(BuyerId::new(buyer)),
        ShippingDetails {
            name: buyer.to_uppercase(),
            email: format!("{buyer}@example.com"),
            address: "Av. Boa Viagem, 100".into(),
            city: "Recife".into(),
            postal_code: "51020-000".into(),
        },
    )
}

async fn seed_store(buyers: usize, products: &[(&str, Product)]) -> InMemoryDocumentStore {
    let store = InMemoryDocumentStore::new();
    for i in 0..buyers {
        let uid = BuyerId::new(format!("u{i}"));
        store
            .create_from(
                collections::USERS,
                Some(uid.clone()),
                &UserProfile {
                    uid,
                    name: format!("Buyer {i}"),
                    email: format!("u{i}@example.com"),
                    role: UserRole::Customer,
                },
            )
            .await
            .unwrap();
    }
    for (id, product) in products {
        store
            .create_from(collections::PRODUCTS, Some(ProductId::new(*id)), product)
            .await
            .unwrap();
    }
    store
        .create_from(
            collections::AFFILIATES,
            Some(AffiliateId::new("aff-a")),
            &Affiliate::new("Afiliada A", "AFFA"),
        )
        .await
        .unwrap();
    store
}

fn coordinator(store: &InMemoryDocumentStore, payment: &SimulatedPaymentGateway) -> Coordinator {
    CheckoutCoordinator::new(
        store.clone(),
        payment.clone(),
        CheckoutConfig::default().with_settlement_retry(
            RetryPolicy::default()
                .with_max_attempts(2)
                .with_backoff(Duration::from_millis(1), Duration::from_millis(1)),
        ),
    )
}

async fn stock_of(store: &InMemoryDocumentStore, id: &str) -> i64 {
    let product: Product = store
        .get_as(collections::PRODUCTS, &ProductId::new(id))
        .await
        .unwrap()
        .unwrap();
    product.stock
}

async fn affiliate_a(store: &InMemoryDocumentStore) -> Affiliate {
    store
        .get_as(collections::AFFILIATES, &AffiliateId::new("aff-a"))
        .await
        .unwrap()
        .unwrap()
}

mod successful_checkout {
    use super::*;

    #[tokio::test]
    async fn without_referral_creates_one_order_and_no_commission() {
        let store = seed_store(1, &[("p1", product(100, 5)), ("p2", product(40, 5))]).await;
        let payment = SimulatedPaymentGateway::instant();
        let coordinator = coordinator(&store, &payment);
        let mut device = Device::new();
        device.add("p1", &product(100, 5), 2);
        device.add("p2", &product(40, 5), 1);

        let receipt = coordinator
            .checkout(&mut device.cart, &mut device.referral, request("u0"))
            .await
            .unwrap();

        assert_eq!(store.document_count(collections::ORDERS).await, 1);
        assert_eq!(store.document_count(collections::COMMISSIONS).await, 0);
        assert_eq!(stock_of(&store, "p1").await, 3);
        assert_eq!(stock_of(&store, "p2").await, 4);

        let order: Order = store
            .get_as(collections::ORDERS, &receipt.order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.total, Money::from_reais(240));
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.fulfillment_status, FulfillmentStatus::Processing);
        assert!(order.affiliate_id.is_none());
        assert!(order.settlement.completed);
    }

    #[tokio::test]
    async fn with_referral_credits_the_affiliate() {
        let store = seed_store(1, &[("p1", product(100, 5))]).await;
        let payment = SimulatedPaymentGateway::instant();
        let coordinator = coordinator(&store, &payment);
        let mut device = Device::new();
        device.referral.capture("AFFA").unwrap();
        device.add("p1", &product(100, 5), 2);

        let receipt = coordinator
            .checkout(&mut device.cart, &mut device.referral, request("u0"))
            .await
            .unwrap();

        assert_eq!(receipt.affiliate_id, Some(AffiliateId::new("aff-a")));
        assert_eq!(receipt.commission, Some(Money::from_reais(20)));

        let order: Order = store
            .get_as(collections::ORDERS, &receipt.order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.affiliate_id, Some(AffiliateId::new("aff-a")));
        assert_eq!(order.total, Money::from_reais(200));

        let commissions: Vec<(_, Commission)> = store
            .query_as(DocumentQuery::collection(collections::COMMISSIONS))
            .await
            .unwrap();
        assert_eq!(commissions.len(), 1);
        let commission = &commissions[0].1;
        assert_eq!(commission.order_id, receipt.order_id);
        assert_eq!(commission.affiliate_id, AffiliateId::new("aff-a"));
        assert_eq!(commission.amount, Money::from_reais(20));
        assert_eq!(commission.status, CommissionStatus::Pending);

        let affiliate = affiliate_a(&store).await;
        assert_eq!(affiliate.balance, Money::from_reais(20));
        assert_eq!(affiliate.sale_count, 1);
    }

    #[tokio::test]
    async fn unknown_referral_behaves_like_no_referral() {
        let store = seed_store(1, &[("p1", product(100, 5))]).await;
        let payment = SimulatedPaymentGateway::instant();
        let coordinator = coordinator(&store, &payment);
        let mut device = Device::new();
        device.referral.capture("NOBODY").unwrap();
        device.add("p1", &product(100, 5), 1);

        let receipt = coordinator
            .checkout(&mut device.cart, &mut device.referral, request("u0"))
            .await
            .unwrap();

        assert!(receipt.affiliate_id.is_none());
        assert!(receipt.commission.is_none());
        assert_eq!(store.document_count(collections::COMMISSIONS).await, 0);
        assert_eq!(affiliate_a(&store).await.sale_count, 0);

        let order: Order = store
            .get_as(collections::ORDERS, &receipt.order_id)
            .await
            .unwrap()
            .unwrap();
        assert!(order.affiliate_id.is_none());
    }

    #[tokio::test]
    async fn clears_cart_and_referral() {
        let store = seed_store(1, &[("p1", product(100, 5))]).await;
        let payment = SimulatedPaymentGateway::instant();
        let coordinator = coordinator(&store, &payment);
        let mut device = Device::new();
        device.referral.capture("AFFA").unwrap();
        device.add("p1", &product(100, 5), 1);
        let summary = device.cart.subscribe();

        coordinator
            .checkout(&mut device.cart, &mut device.referral, request("u0"))
            .await
            .unwrap();

        assert!(device.cart.is_empty());
        assert!(device.referral.peek().unwrap().is_none());
        assert_eq!(summary.borrow().item_count, 0);
    }

    #[tokio::test]
    async fn concurrent_buyers_credit_one_affiliate_exactly() {
        let store = seed_store(10, &[("p1", product(100, 100))]).await;
        let payment = SimulatedPaymentGateway::new(Duration::from_millis(5));
        let coordinator = coordinator(&store, &payment);

        let mut devices: Vec<Device> = (0..10)
            .map(|_| {
                let mut device = Device::new();
                device.referral.capture("AFFA").unwrap();
                device.add("p1", &product(100, 100), 1);
                device
            })
            .collect();

        let results = futures_util::future::join_all(devices.iter_mut().enumerate().map(
            |(i, device)| {
                coordinator.checkout(
                    &mut device.cart,
                    &mut device.referral,
                    request(&format!("u{i}")),
                )
            },
        ))
        .await;
        assert!(results.iter().all(Result::is_ok));

        let affiliate = affiliate_a(&store).await;
        assert_eq!(affiliate.sale_count, 10);
        assert_eq!(affiliate.balance, Money::from_reais(100));
        assert_eq!(stock_of(&store, "p1").await, 90);
    }
}

mod rejected_checkout {
    use super::*;

    #[tokio::test]
    async fn empty_cart_is_user_input_fault_with_zero_writes() {
        let store = seed_store(1, &[("p1", product(100, 5))]).await;
        let payment = SimulatedPaymentGateway::instant();
        let coordinator = coordinator(&store, &payment);
        let mut device = Device::new();
        let writes = store.write_count();

        let err = coordinator
            .checkout(&mut device.cart, &mut device.referral, request("u0"))
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::EmptyCart));
        assert_eq!(err.kind(), FaultKind::UserInput);
        assert_eq!(store.write_count(), writes);
        assert_eq!(payment.charge_count(), 0);
    }

    #[tokio::test]
    async fn unauthenticated_keeps_cart_and_referral() {
        let store = seed_store(1, &[("p1", product(100, 5))]).await;
        let payment = SimulatedPaymentGateway::instant();
        let coordinator = coordinator(&store, &payment);
        let mut device = Device::new();
        device.referral.capture("AFFA").unwrap();
        device.add("p1", &product(100, 5), 2);

        let mut req = request("u0");
        req.buyer_id = None;
        let err = coordinator
            .checkout(&mut device.cart, &mut device.referral, req)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FaultKind::AuthenticationRequired);
        assert_eq!(device.cart.item_count(), 2);
        assert_eq!(device.referral.peek().unwrap().unwrap().as_str(), "AFFA");
    }

    #[tokio::test]
    async fn declined_payment_preserves_everything() {
        let store = seed_store(1, &[("p1", product(100, 5))]).await;
        let payment = SimulatedPaymentGateway::instant();
        payment.set_decline(true);
        let coordinator = coordinator(&store, &payment);
        let mut device = Device::new();
        device.referral.capture("AFFA").unwrap();
        device.add("p1", &product(100, 5), 1);
        let writes = store.write_count();

        let err = coordinator
            .checkout(&mut device.cart, &mut device.referral, request("u0"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FaultKind::Payment);
        assert!(err.is_retryable());
        assert_eq!(store.write_count(), writes);
        assert_eq!(device.cart.item_count(), 1);
        assert!(device.referral.peek().unwrap().is_some());

        // Retrying after the decline clears succeeds.
        payment.set_decline(false);
        coordinator
            .checkout(&mut device.cart, &mut device.referral, request("u0"))
            .await
            .unwrap();
        assert_eq!(affiliate_a(&store).await.sale_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_payment_times_out_as_payment_fault() {
        let store = seed_store(1, &[("p1", product(100, 5))]).await;
        let payment = SimulatedPaymentGateway::new(Duration::from_secs(60));
        let coordinator = CheckoutCoordinator::new(
            store.clone(),
            payment.clone(),
            CheckoutConfig::default().with_payment_timeout(Duration::from_secs(10)),
        );
        let mut device = Device::new();
        device.add("p1", &product(100, 5), 1);

        let err = coordinator
            .checkout(&mut device.cart, &mut device.referral, request("u0"))
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::PaymentTimeout { .. }));
        assert_eq!(err.kind(), FaultKind::Payment);
        assert_eq!(store.document_count(collections::ORDERS).await, 0);
        assert_eq!(device.cart.item_count(), 1);
    }

    #[tokio::test]
    async fn store_down_before_commit_is_retryable() {
        let store = seed_store(1, &[("p1", product(100, 5))]).await;
        let payment = SimulatedPaymentGateway::instant();
        let coordinator = coordinator(&store, &payment);
        let mut device = Device::new();
        device.referral.capture("AFFA").unwrap();
        device.add("p1", &product(100, 5), 1);

        store.inject_fault(
            FaultRule::on(StoreOp::Create)
                .in_collection(collections::ORDERS)
                .times(1),
        );
        let err = coordinator
            .checkout(&mut device.cart, &mut device.referral, request("u0"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FaultKind::Persistence);
        assert!(err.is_retryable());
        assert_eq!(store.document_count(collections::ORDERS).await, 0);
        assert_eq!(device.cart.item_count(), 1);
        assert!(device.referral.peek().unwrap().is_some());

        coordinator
            .checkout(&mut device.cart, &mut device.referral, request("u0"))
            .await
            .unwrap();
        assert_eq!(store.document_count(collections::ORDERS).await, 1);
    }
}

mod contention {
    use super::*;

    #[tokio::test]
    async fn last_unit_race_exhausts_stock_for_exactly_one_buyer() {
        let store = seed_store(3, &[("p1", product(100, 1))]).await;
        // The delay keeps both buyers past the advisory check before either
        // settles.
        let payment = SimulatedPaymentGateway::new(Duration::from_millis(20));
        let coordinator = coordinator(&store, &payment);
        let mut first = Device::new();
        let mut second = Device::new();
        first.add("p1", &product(100, 1), 1);
        second.add("p1", &product(100, 1), 1);

        let (a, b) = tokio::join!(
            coordinator.checkout(&mut first.cart, &mut first.referral, request("u0")),
            coordinator.checkout(&mut second.cart, &mut second.referral, request("u1")),
        );
        let receipts = [a.unwrap(), b.unwrap()];

        let exhausted: Vec<_> = receipts
            .iter()
            .filter(|r| {
                matches!(&r.settlement, SettlementStatus::Completed { shortfalls } if !shortfalls.is_empty())
            })
            .collect();
        assert_eq!(exhausted.len(), 1);
        assert_eq!(stock_of(&store, "p1").await, 0);

        let backordered: Order = store
            .get_as(collections::ORDERS, &exhausted[0].order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(backordered.fulfillment_status, FulfillmentStatus::Backordered);

        // A later buyer is turned away up front.
        let mut third = Device::new();
        third.add("p1", &product(100, 1), 1);
        let err = coordinator
            .checkout(&mut third.cart, &mut third.referral, request("u2"))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::InsufficientStock { .. }));
    }
}

mod post_commit_faults {
    use super::*;

    #[tokio::test]
    async fn settlement_failure_is_deferred_and_reconciled() {
        let store = seed_store(1, &[("p1", product(100, 5))]).await;
        let payment = SimulatedPaymentGateway::instant();
        let coordinator = coordinator(&store, &payment);
        let mut device = Device::new();
        device.referral.capture("AFFA").unwrap();
        device.add("p1", &product(100, 5), 2);

        store.inject_fault(
            FaultRule::on(StoreOp::Create)
                .in_collection(collections::COMMISSIONS)
                .times(100),
        );
        let receipt = coordinator
            .checkout(&mut device.cart, &mut device.referral, request("u0"))
            .await
            .unwrap();

        // The buyer still sees success.
        assert!(matches!(
            receipt.settlement,
            SettlementStatus::Deferred { attempts: 2, .. }
        ));
        assert!(device.cart.is_empty());
        assert!(device.referral.peek().unwrap().is_none());
        assert_eq!(store.document_count(collections::COMMISSIONS).await, 0);
        assert_eq!(stock_of(&store, "p1").await, 5);

        // The affiliate's percent changes before reconciliation runs; the
        // commission keeps the percent in effect at order time.
        store
            .update(
                collections::AFFILIATES,
                &AffiliateId::new("aff-a"),
                DocumentUpdate::new().set("commissionPercent", 50),
            )
            .await
            .unwrap();

        store.clear_faults();
        let reconciler = Reconciler::new(store.clone(), coordinator.settler().clone());
        let report = reconciler.run_once().await.unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.settled, 1);

        let commission: Commission = store
            .get_as(collections::COMMISSIONS, &receipt.order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(commission.amount, Money::from_reais(20));
        assert_eq!(affiliate_a(&store).await.balance, Money::from_reais(20));
        assert_eq!(stock_of(&store, "p1").await, 3);
    }

    #[tokio::test]
    async fn transient_settlement_fault_is_retried_inline() {
        let store = seed_store(1, &[("p1", product(100, 5))]).await;
        let payment = SimulatedPaymentGateway::instant();
        let coordinator = coordinator(&store, &payment);
        let mut device = Device::new();
        device.add("p1", &product(100, 5), 1);

        store.inject_fault(
            FaultRule::on(StoreOp::Update)
                .in_collection(collections::PRODUCTS)
                .times(1),
        );
        let receipt = coordinator
            .checkout(&mut device.cart, &mut device.referral, request("u0"))
            .await
            .unwrap();

        assert!(receipt.settlement.is_completed());
        assert_eq!(stock_of(&store, "p1").await, 4);
    }
}
