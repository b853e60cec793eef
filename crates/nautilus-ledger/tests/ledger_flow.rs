//! End-to-end ledger flows against in-memory SQLite.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;

use nautilus_core::checkout::{CartLine, Discount};
use nautilus_core::{
    CatalogItem, GiftCardActivityKind, ItemKind, Money, PaymentKind, PaymentMethod, TaxRate,
    TransactionKind, TransactionStatus,
};
use nautilus_db::repository::outbox;
use nautilus_db::{commit, Database, DbConfig};
use nautilus_ledger::{
    ChannelSink, CheckoutRequest, DeliveryReport, ErrorCode, EventSink, Ledger, LedgerConfig,
    LedgerError, LedgerEvent, PaymentRequest, SinkError, MAX_DELIVERY_ATTEMPTS,
};

const MASK: &str = "mask-01";
const OPEN_WATER: &str = "ow-0612";

fn cents(c: i64) -> Money {
    Money::from_cents(c)
}

async fn add_item(db: &Database, kind: ItemKind, ref_id: &str, price: i64, available: i64, taxable: bool) {
    let now = Utc::now();
    db.catalog()
        .insert(&CatalogItem {
            kind,
            ref_id: ref_id.to_string(),
            sku: ref_id.to_uppercase(),
            name: format!("Item {}", ref_id),
            unit_price_cents: price,
            available_quantity: available,
            taxable,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
}

/// In-memory ledger at 8% tax with a $10.00 mask (5 in stock) and a $499
/// untaxed course (8 seats).
async fn setup() -> Ledger {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    add_item(&db, ItemKind::Product, MASK, 1000, 5, true).await;
    add_item(&db, ItemKind::CourseSeat, OPEN_WATER, 49_900, 8, false).await;
    Ledger::new(db, &LedgerConfig::default())
}

async fn available(ledger: &Ledger, kind: ItemKind, ref_id: &str) -> i64 {
    ledger
        .database()
        .catalog()
        .get(kind, ref_id)
        .await
        .unwrap()
        .unwrap()
        .available_quantity
}

async fn two_masks(ledger: &Ledger, kind: TransactionKind) -> String {
    ledger
        .create_transaction(CheckoutRequest::new(
            kind,
            vec![CartLine::new(ItemKind::Product, MASK, 2)],
        ))
        .await
        .unwrap()
}

/// The stored amount paid always equals the sum of the payment events.
async fn assert_paid_matches_events(ledger: &Ledger, id: &str) {
    let txn = ledger.get_transaction(id).await.unwrap();
    let net = ledger.database().transactions().net_paid_cents(id).await.unwrap();
    assert_eq!(txn.amount_paid_cents, net);
}

struct RejectingSink;

impl EventSink for RejectingSink {
    fn publish(&self, _event: &LedgerEvent) -> Result<(), SinkError> {
        Err(SinkError::Rejected("receipt printer offline".to_string()))
    }
}

/// Counts how often each (event type, transaction) pair is published.
#[derive(Default)]
struct CountingSink {
    seen: Mutex<HashMap<(String, String), usize>>,
}

impl EventSink for CountingSink {
    fn publish(&self, event: &LedgerEvent) -> Result<(), SinkError> {
        let key = (event.event_type().to_string(), event.transaction_id().to_string());
        if let Ok(mut seen) = self.seen.lock() {
            *seen.entry(key).or_default() += 1;
        }
        Ok(())
    }
}

// =============================================================================
// Checkout
// =============================================================================

#[tokio::test]
async fn test_checkout_prices_cart() {
    let ledger = setup().await;
    let id = two_masks(&ledger, TransactionKind::Sale).await;

    let txn = ledger.get_transaction(&id).await.unwrap();
    assert_eq!(txn.status, TransactionStatus::Pending);
    assert_eq!(txn.subtotal_cents, 2000);
    assert_eq!(txn.tax_cents, 160);
    assert_eq!(txn.total_cents, 2160);
    assert_eq!(txn.amount_paid_cents, 0);
    assert!(txn.is_walk_in());
    assert!(txn.transaction_number.starts_with("TXN-"));

    let items = ledger.get_transaction_items(&id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].sku_snapshot, "MASK-01");
    assert_eq!(items[0].line_total_cents, 2000);
    assert_eq!(items[0].tax_cents, 160);

    // Nothing is reserved until payment
    assert_eq!(available(&ledger, ItemKind::Product, MASK).await, 5);
    assert!(ledger.get_reservations(&id).await.unwrap().is_empty());

    let history = ledger.get_status_history(&id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].from_status, None);
    assert_eq!(history[0].to_status, TransactionStatus::Pending);
}

#[tokio::test]
async fn test_checkout_uses_configured_tax_rate() {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    add_item(&db, ItemKind::Product, MASK, 1000, 5, true).await;
    let config = LedgerConfig::default().with_tax_rate(TaxRate::from_bps(825));
    let ledger = Ledger::new(db, &config);
    assert_eq!(ledger.tax_rate().bps(), 825);

    let id = two_masks(&ledger, TransactionKind::Sale).await;
    let txn = ledger.get_transaction(&id).await.unwrap();
    assert_eq!(txn.tax_cents, 165);
    assert_eq!(txn.total_cents, 2165);
}

#[tokio::test]
async fn test_checkout_mixed_cart_with_discount() {
    let ledger = setup().await;
    let id = ledger
        .create_transaction(
            CheckoutRequest::sale(vec![
                CartLine::new(ItemKind::Product, MASK, 1),
                CartLine::new(ItemKind::CourseSeat, OPEN_WATER, 1),
            ])
            .for_customer("cust-42")
            .with_discount(Discount::Fixed(cents(900))),
        )
        .await
        .unwrap();

    let txn = ledger.get_transaction(&id).await.unwrap();
    assert_eq!(txn.subtotal_cents, 50_900);
    assert_eq!(txn.tax_cents, 80);
    assert_eq!(txn.discount_cents, 900);
    assert_eq!(txn.total_cents, 50_080);
    assert_eq!(txn.customer_id.as_deref(), Some("cust-42"));

    let items = ledger.get_transaction_items(&id).await.unwrap();
    assert_eq!(items[0].kind, ItemKind::Product);
    assert_eq!(items[1].kind, ItemKind::CourseSeat);
    assert!(!items[1].taxable);
}

#[tokio::test]
async fn test_checkout_rejects_bad_carts() {
    let ledger = setup().await;

    let err = ledger.create_transaction(CheckoutRequest::sale(vec![])).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);

    let err = ledger
        .create_transaction(CheckoutRequest::sale(vec![CartLine::new(ItemKind::Product, MASK, 0)]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);

    let err = ledger
        .create_transaction(CheckoutRequest::sale(vec![CartLine::new(ItemKind::Product, "nope", 1)]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);

    // Right ref id, wrong kind
    let err = ledger
        .create_transaction(CheckoutRequest::sale(vec![CartLine::new(ItemKind::TripSlot, MASK, 1)]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);

    let err = ledger
        .create_transaction(
            CheckoutRequest::sale(vec![CartLine::new(ItemKind::Product, MASK, 1)])
                .with_discount(Discount::Fixed(cents(1001))),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);

    // Nothing was written by any of the failures
    assert_eq!(ledger.database().outbox().count_pending().await.unwrap(), 0);
}

#[tokio::test]
async fn test_checkout_checks_capacity_across_duplicate_lines() {
    let ledger = setup().await;

    let err = ledger
        .create_transaction(CheckoutRequest::sale(vec![
            CartLine::new(ItemKind::Product, MASK, 3),
            CartLine::new(ItemKind::Product, MASK, 3),
        ]))
        .await
        .unwrap_err();

    match err {
        LedgerError::InsufficientStock { sku, available, requested } => {
            assert_eq!(sku, "MASK-01");
            assert_eq!(available, 5);
            assert_eq!(requested, 6);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }
}

#[tokio::test]
async fn test_quote_skips_capacity_and_cannot_be_paid() {
    let ledger = setup().await;
    let id = ledger
        .create_transaction(CheckoutRequest::quote(vec![CartLine::new(ItemKind::Product, MASK, 50)]))
        .await
        .unwrap();

    let err = ledger
        .process_payment(&id, PaymentRequest::cash(cents(100_000)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidState);

    ledger.void_transaction(&id, None).await.unwrap();
    assert_eq!(
        ledger.get_transaction(&id).await.unwrap().status,
        TransactionStatus::Voided
    );
    assert_eq!(available(&ledger, ItemKind::Product, MASK).await, 5);
}

// =============================================================================
// Payment
// =============================================================================

#[tokio::test]
async fn test_sale_pay_then_full_refund() {
    let ledger = setup().await;
    let id = two_masks(&ledger, TransactionKind::Sale).await;

    let receipt = ledger
        .process_payment(&id, PaymentRequest::cash(cents(3000)))
        .await
        .unwrap();
    assert_eq!(receipt.status, TransactionStatus::Paid);
    assert_eq!(receipt.applied, cents(2160));
    assert_eq!(receipt.change, cents(840));
    assert!(receipt.balance_due.is_zero());

    let txn = ledger.get_transaction(&id).await.unwrap();
    assert_eq!(txn.amount_paid_cents, 2160);
    assert!(txn.paid_at.is_some());

    let payments = ledger.get_payments(&id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].tendered_cents, Some(3000));
    assert_eq!(payments[0].change_cents, Some(840));

    let reservations = ledger.get_reservations(&id).await.unwrap();
    assert_eq!(reservations.len(), 1);
    assert_eq!(reservations[0].quantity, 2);
    assert!(reservations[0].is_active());
    assert_eq!(available(&ledger, ItemKind::Product, MASK).await, 3);

    let refund = ledger
        .refund_transaction(&id, cents(2160), Some("wrong size".to_string()))
        .await
        .unwrap();
    assert!(refund.full);
    assert_eq!(refund.status, TransactionStatus::Refunded);
    assert!(refund.amount_paid.is_zero());

    let txn = ledger.get_transaction(&id).await.unwrap();
    assert_eq!(txn.reason.as_deref(), Some("wrong size"));
    assert!(ledger.get_reservations(&id).await.unwrap().iter().all(|r| !r.is_active()));
    assert_eq!(available(&ledger, ItemKind::Product, MASK).await, 5);
    assert_paid_matches_events(&ledger, &id).await;

    let statuses: Vec<_> = ledger
        .get_status_history(&id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.to_status)
        .collect();
    assert_eq!(
        statuses,
        vec![TransactionStatus::Pending, TransactionStatus::Paid, TransactionStatus::Refunded]
    );
}

#[tokio::test]
async fn test_short_tender_leaves_sale_pending() {
    let ledger = setup().await;
    let id = two_masks(&ledger, TransactionKind::Sale).await;

    let err = ledger
        .process_payment(&id, PaymentRequest::cash(cents(1000)))
        .await
        .unwrap_err();
    match err {
        LedgerError::InsufficientPayment { required, tendered } => {
            assert_eq!(required, cents(2160));
            assert_eq!(tendered, cents(1000));
        }
        other => panic!("expected InsufficientPayment, got {other:?}"),
    }

    let txn = ledger.get_transaction(&id).await.unwrap();
    assert_eq!(txn.status, TransactionStatus::Pending);
    assert!(ledger.get_payments(&id).await.unwrap().is_empty());
    assert_eq!(available(&ledger, ItemKind::Product, MASK).await, 5);

    ledger.void_transaction(&id, Some("customer left".to_string())).await.unwrap();
    let txn = ledger.get_transaction(&id).await.unwrap();
    assert_eq!(txn.status, TransactionStatus::Voided);
    assert!(ledger.get_payments(&id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_payment_rejects_bad_requests() {
    let ledger = setup().await;
    let id = two_masks(&ledger, TransactionKind::Sale).await;

    let err = ledger
        .process_payment(&id, PaymentRequest::cash(cents(-1)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);

    let err = ledger
        .process_payment(&id, PaymentRequest::new(PaymentMethod::GiftCard, cents(2160)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);

    let mut request = PaymentRequest::card(cents(2160));
    request.gift_card_id = Some("gc-1".to_string());
    let err = ledger.process_payment(&id, request).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);

    let err = ledger
        .process_payment("missing", PaymentRequest::cash(cents(2160)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[tokio::test]
async fn test_paying_twice_is_rejected() {
    let ledger = setup().await;
    let id = two_masks(&ledger, TransactionKind::Sale).await;

    ledger.process_payment(&id, PaymentRequest::card(cents(2160))).await.unwrap();
    let err = ledger
        .process_payment(&id, PaymentRequest::card(cents(2160)))
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::InvalidState);
    assert_eq!(ledger.get_payments(&id).await.unwrap().len(), 1);
    assert_eq!(available(&ledger, ItemKind::Product, MASK).await, 3);
}

#[tokio::test]
async fn test_stock_taken_between_checkout_and_payment() {
    let ledger = setup().await;
    let first = ledger
        .create_transaction(CheckoutRequest::sale(vec![CartLine::new(ItemKind::Product, MASK, 4)]))
        .await
        .unwrap();
    let second = ledger
        .create_transaction(CheckoutRequest::sale(vec![CartLine::new(ItemKind::Product, MASK, 4)]))
        .await
        .unwrap();

    ledger.process_payment(&first, PaymentRequest::cash(cents(4320))).await.unwrap();

    let err = ledger
        .process_payment(&second, PaymentRequest::cash(cents(4320)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InsufficientStock);

    // Rolled back: no payment event, still pending
    assert!(ledger.get_payments(&second).await.unwrap().is_empty());
    assert_eq!(
        ledger.get_transaction(&second).await.unwrap().status,
        TransactionStatus::Pending
    );
    assert_eq!(available(&ledger, ItemKind::Product, MASK).await, 1);
}

#[tokio::test]
async fn test_item_deactivated_between_checkout_and_payment() {
    let ledger = setup().await;
    let id = two_masks(&ledger, TransactionKind::Sale).await;
    ledger.database().catalog().set_active(ItemKind::Product, MASK, false).await.unwrap();

    match ledger.process_payment(&id, PaymentRequest::cash(cents(2160))).await.unwrap_err() {
        LedgerError::InsufficientStock { sku, available, requested } => {
            assert_eq!(sku, "MASK-01");
            assert_eq!(available, 0);
            assert_eq!(requested, 2);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }
    assert_eq!(
        ledger.get_transaction(&id).await.unwrap().status,
        TransactionStatus::Pending
    );
    assert_eq!(available(&ledger, ItemKind::Product, MASK).await, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_payments_never_oversell() {
    let path = std::env::temp_dir().join(format!("nautilus-ledger-{}.db", uuid::Uuid::new_v4()));
    let db = Database::new(DbConfig::new(&path)).await.unwrap();
    add_item(&db, ItemKind::TripSlot, "wreck-0701", 16_500, 3, false).await;
    let ledger = Ledger::new(db, &LedgerConfig::default());

    let mut ids = Vec::new();
    for _ in 0..6 {
        let id = ledger
            .create_transaction(CheckoutRequest::sale(vec![CartLine::new(
                ItemKind::TripSlot,
                "wreck-0701",
                1,
            )]))
            .await
            .unwrap();
        ids.push(id);
    }

    let handles: Vec<_> = ids
        .iter()
        .cloned()
        .map(|id| {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                ledger.process_payment(&id, PaymentRequest::card(cents(16_500))).await
            })
        })
        .collect();

    let mut paid = 0;
    let mut sold_out = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => paid += 1,
            Err(LedgerError::InsufficientStock { .. }) => sold_out += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(paid, 3);
    assert_eq!(sold_out, 3);
    assert_eq!(available(&ledger, ItemKind::TripSlot, "wreck-0701").await, 0);

    ledger.database().close().await;
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
    }
}

// =============================================================================
// Layaway
// =============================================================================

#[tokio::test]
async fn test_layaway_zero_deposit_then_installments() {
    let ledger = setup().await;
    let id = two_masks(&ledger, TransactionKind::Layaway).await;

    let receipt = ledger
        .process_payment(&id, PaymentRequest::cash(Money::zero()))
        .await
        .unwrap();
    assert_eq!(receipt.status, TransactionStatus::Paid);
    assert!(receipt.applied.is_zero());
    assert_eq!(receipt.balance_due, cents(2160));
    assert!(ledger.get_payments(&id).await.unwrap().is_empty());
    assert_eq!(available(&ledger, ItemKind::Product, MASK).await, 3);

    let receipt = ledger
        .record_installment(&id, PaymentRequest::card(cents(1000)))
        .await
        .unwrap();
    assert_eq!(receipt.amount_paid, cents(1000));
    assert_eq!(receipt.balance_due, cents(1160));

    let receipt = ledger
        .record_installment(&id, PaymentRequest::cash(cents(2000)))
        .await
        .unwrap();
    assert_eq!(receipt.applied, cents(1160));
    assert_eq!(receipt.change, cents(840));
    assert!(receipt.balance_due.is_zero());

    let err = ledger
        .record_installment(&id, PaymentRequest::cash(cents(100)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidState);

    let balance = ledger.balance(&id).await.unwrap();
    assert_eq!(balance.paid, cents(2160));
    assert!(balance.due.is_zero());
    assert_paid_matches_events(&ledger, &id).await;
}

#[tokio::test]
async fn test_installments_only_on_paid_layaways() {
    let ledger = setup().await;

    let sale = two_masks(&ledger, TransactionKind::Sale).await;
    ledger.process_payment(&sale, PaymentRequest::cash(cents(2160))).await.unwrap();
    let err = ledger
        .record_installment(&sale, PaymentRequest::cash(cents(100)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidState);

    let layaway = two_masks(&ledger, TransactionKind::Layaway).await;
    let err = ledger
        .record_installment(&layaway, PaymentRequest::cash(cents(100)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidState);

    ledger.process_payment(&layaway, PaymentRequest::cash(cents(500))).await.unwrap();
    let err = ledger
        .record_installment(&layaway, PaymentRequest::cash(Money::zero()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);
}

// =============================================================================
// Void / Refund
// =============================================================================

#[tokio::test]
async fn test_void_paid_sale_reverses_and_releases() {
    let ledger = setup().await;
    let id = two_masks(&ledger, TransactionKind::Sale).await;
    ledger.process_payment(&id, PaymentRequest::card(cents(2160))).await.unwrap();

    ledger
        .void_transaction(&id, Some("rang up twice".to_string()))
        .await
        .unwrap();

    let txn = ledger.get_transaction(&id).await.unwrap();
    assert_eq!(txn.status, TransactionStatus::Voided);
    assert_eq!(txn.amount_paid_cents, 0);
    assert_eq!(txn.reason.as_deref(), Some("rang up twice"));

    let payments = ledger.get_payments(&id).await.unwrap();
    assert_eq!(payments.len(), 2);
    assert_eq!(payments[1].kind, PaymentKind::Reversal);
    assert_eq!(payments[1].method, PaymentMethod::Card);
    assert_eq!(payments[1].amount_cents, -2160);
    assert_paid_matches_events(&ledger, &id).await;
    assert_eq!(available(&ledger, ItemKind::Product, MASK).await, 5);

    // Second void is a no-op
    ledger.void_transaction(&id, None).await.unwrap();
    assert_eq!(ledger.get_payments(&id).await.unwrap().len(), 2);
    assert_eq!(ledger.get_status_history(&id).await.unwrap().len(), 3);

    let err = ledger.refund_transaction(&id, cents(100), None).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidState);
}

#[tokio::test]
async fn test_void_refunded_is_rejected() {
    let ledger = setup().await;
    let id = two_masks(&ledger, TransactionKind::Sale).await;
    ledger.process_payment(&id, PaymentRequest::cash(cents(2160))).await.unwrap();
    ledger.refund_transaction(&id, cents(2160), None).await.unwrap();

    let err = ledger.void_transaction(&id, None).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidState);
    assert_eq!(available(&ledger, ItemKind::Product, MASK).await, 5);
}

#[tokio::test]
async fn test_partial_refunds() {
    let ledger = setup().await;
    let id = two_masks(&ledger, TransactionKind::Sale).await;

    let err = ledger.refund_transaction(&id, cents(100), None).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidState);

    ledger.process_payment(&id, PaymentRequest::cash(cents(2160))).await.unwrap();

    let refund = ledger.refund_transaction(&id, cents(500), None).await.unwrap();
    assert!(!refund.full);
    assert_eq!(refund.status, TransactionStatus::Paid);
    assert_eq!(refund.amount_paid, cents(1660));

    // Reservations stay with the customer after a partial refund
    assert!(ledger.get_reservations(&id).await.unwrap()[0].is_active());
    assert_eq!(available(&ledger, ItemKind::Product, MASK).await, 3);

    for bad in [0, -5, 1661] {
        match ledger.refund_transaction(&id, cents(bad), None).await.unwrap_err() {
            LedgerError::InvalidAmount { requested, max } => {
                assert_eq!(requested, cents(bad));
                assert_eq!(max, cents(1660));
            }
            other => panic!("expected InvalidAmount, got {other:?}"),
        }
    }

    let refund = ledger.refund_transaction(&id, cents(1660), None).await.unwrap();
    assert!(refund.full);
    assert_eq!(refund.status, TransactionStatus::Refunded);
    assert_eq!(available(&ledger, ItemKind::Product, MASK).await, 5);
    assert_paid_matches_events(&ledger, &id).await;
}

#[tokio::test]
async fn test_void_layaway_without_deposit() {
    let ledger = setup().await;
    let id = two_masks(&ledger, TransactionKind::Layaway).await;
    ledger.process_payment(&id, PaymentRequest::cash(Money::zero())).await.unwrap();

    let err = ledger.refund_transaction(&id, cents(1), None).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidAmount);

    ledger.void_transaction(&id, None).await.unwrap();
    assert!(ledger.get_payments(&id).await.unwrap().is_empty());
    assert_eq!(available(&ledger, ItemKind::Product, MASK).await, 5);
}

// =============================================================================
// Queries
// =============================================================================

#[tokio::test]
async fn test_queries_on_unknown_transaction() {
    let ledger = setup().await;

    assert_eq!(ledger.get_transaction("nope").await.unwrap_err().code(), ErrorCode::NotFound);
    assert_eq!(
        ledger.get_transaction_items("nope").await.unwrap_err().code(),
        ErrorCode::NotFound
    );
    assert_eq!(ledger.balance("nope").await.unwrap_err().code(), ErrorCode::NotFound);
    assert_eq!(
        ledger.void_transaction("nope", None).await.unwrap_err().code(),
        ErrorCode::NotFound
    );
}

// =============================================================================
// Gift cards
// =============================================================================

#[tokio::test]
async fn test_gift_card_payment_and_void_credit() {
    let ledger = setup().await;
    let card = ledger
        .issue_gift_card(Some("cust-7".to_string()), cents(5000))
        .await
        .unwrap();
    assert_eq!(card.card_number.len(), 16);

    let id = two_masks(&ledger, TransactionKind::Sale).await;
    let receipt = ledger
        .process_payment(&id, PaymentRequest::gift_card(&card.id, cents(2160)))
        .await
        .unwrap();
    assert_eq!(receipt.status, TransactionStatus::Paid);
    assert_eq!(ledger.get_gift_card(&card.id).await.unwrap().balance(), cents(2840));

    ledger.void_transaction(&id, None).await.unwrap();
    assert_eq!(ledger.get_gift_card(&card.id).await.unwrap().balance(), cents(5000));

    let reversal = &ledger.get_payments(&id).await.unwrap()[1];
    assert_eq!(reversal.method, PaymentMethod::GiftCard);
    assert_eq!(reversal.gift_card_id.as_deref(), Some(card.id.as_str()));

    let kinds: Vec<_> = ledger
        .gift_card_activity(&card.id)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            GiftCardActivityKind::Issue,
            GiftCardActivityKind::Redeem,
            GiftCardActivityKind::Credit
        ]
    );
}

#[tokio::test]
async fn test_void_mixed_tender_layaway_returns_each_tender() {
    let ledger = setup().await;
    let card = ledger.issue_gift_card(None, cents(5000)).await.unwrap();
    let id = two_masks(&ledger, TransactionKind::Layaway).await;

    ledger
        .process_payment(&id, PaymentRequest::gift_card(&card.id, cents(1000)))
        .await
        .unwrap();
    assert_eq!(ledger.get_gift_card(&card.id).await.unwrap().balance(), cents(4000));
    ledger.record_installment(&id, PaymentRequest::cash(cents(1160))).await.unwrap();

    ledger.void_transaction(&id, None).await.unwrap();

    // The card gets its deposit back, not the cash installment
    assert_eq!(ledger.get_gift_card(&card.id).await.unwrap().balance(), cents(5000));

    let reversals: Vec<_> = ledger
        .get_payments(&id)
        .await
        .unwrap()
        .into_iter()
        .filter(|p| p.kind == PaymentKind::Reversal)
        .map(|p| (p.method, p.gift_card_id, p.amount_cents))
        .collect();
    assert_eq!(
        reversals,
        vec![
            (PaymentMethod::GiftCard, Some(card.id.clone()), -1000),
            (PaymentMethod::Cash, None, -1160),
        ]
    );
    assert_paid_matches_events(&ledger, &id).await;
}

#[tokio::test]
async fn test_partial_refund_mixed_tender_credits_card_first() {
    let ledger = setup().await;
    let card = ledger.issue_gift_card(None, cents(5000)).await.unwrap();
    let id = two_masks(&ledger, TransactionKind::Layaway).await;

    ledger.process_payment(&id, PaymentRequest::cash(cents(1000))).await.unwrap();
    ledger
        .record_installment(&id, PaymentRequest::gift_card(&card.id, cents(1160)))
        .await
        .unwrap();
    assert_eq!(ledger.get_gift_card(&card.id).await.unwrap().balance(), cents(3840));

    let refund = ledger.refund_transaction(&id, cents(1500), None).await.unwrap();
    assert!(!refund.full);
    assert_eq!(refund.amount_paid, cents(660));
    assert_eq!(ledger.get_gift_card(&card.id).await.unwrap().balance(), cents(5000));

    let refund = ledger.refund_transaction(&id, cents(660), None).await.unwrap();
    assert!(refund.full);
    // Already made whole; the rest of the refund is cash
    assert_eq!(ledger.get_gift_card(&card.id).await.unwrap().balance(), cents(5000));

    let reversals: Vec<_> = ledger
        .get_payments(&id)
        .await
        .unwrap()
        .into_iter()
        .filter(|p| p.kind == PaymentKind::Reversal)
        .map(|p| (p.method, p.amount_cents))
        .collect();
    assert_eq!(
        reversals,
        vec![
            (PaymentMethod::GiftCard, -1160),
            (PaymentMethod::Cash, -340),
            (PaymentMethod::Cash, -660),
        ]
    );
    assert_paid_matches_events(&ledger, &id).await;
}

#[tokio::test]
async fn test_gift_card_refusals_roll_back() {
    let ledger = setup().await;
    let card = ledger.issue_gift_card(None, cents(1000)).await.unwrap();
    let id = two_masks(&ledger, TransactionKind::Sale).await;

    let err = ledger
        .process_payment(&id, PaymentRequest::gift_card(&card.id, cents(2160)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::GiftCardError);
    assert_eq!(
        err.to_string(),
        format!("Gift card error: Gift card {} balance $10.00 is less than $21.60", card.id)
    );
    assert_eq!(ledger.get_gift_card(&card.id).await.unwrap().balance(), cents(1000));

    ledger.reload_gift_card(&card.id, cents(2000)).await.unwrap();
    ledger.deactivate_gift_card(&card.id).await.unwrap();

    let err = ledger
        .process_payment(&id, PaymentRequest::gift_card(&card.id, cents(2160)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::GiftCardError);

    let txn = ledger.get_transaction(&id).await.unwrap();
    assert_eq!(txn.status, TransactionStatus::Pending);
    assert!(ledger.get_payments(&id).await.unwrap().is_empty());
    assert_eq!(available(&ledger, ItemKind::Product, MASK).await, 5);

    // Reload reactivates
    let card = ledger.reload_gift_card(&card.id, cents(100)).await.unwrap();
    assert_eq!(card.balance(), cents(3100));
    ledger
        .process_payment(&id, PaymentRequest::gift_card(&card.id, cents(2160)))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_gift_card_lookup() {
    let ledger = setup().await;
    let card = ledger.issue_gift_card(None, cents(2500)).await.unwrap();

    let found = ledger.gift_card_by_number(&card.card_number).await.unwrap();
    assert_eq!(found.id, card.id);

    let err = ledger.gift_card_by_number("1234").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);

    let err = ledger.reload_gift_card("missing", cents(100)).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);

    let err = ledger.issue_gift_card(None, Money::zero()).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);
}

// =============================================================================
// Events
// =============================================================================

#[tokio::test]
async fn test_events_reach_the_sink() {
    let (sink, mut rx) = ChannelSink::new(16);
    let ledger = setup().await.with_sink(Arc::new(sink));

    let id = two_masks(&ledger, TransactionKind::Sale).await;
    ledger.process_payment(&id, PaymentRequest::cash(cents(2160))).await.unwrap();

    let created = rx.recv().await.unwrap();
    assert_eq!(created.event_type(), "transaction.created");

    match rx.recv().await.unwrap() {
        LedgerEvent::TransactionCompleted { transaction_id, amount_paid_cents, .. } => {
            assert_eq!(transaction_id, id);
            assert_eq!(amount_paid_cents, 2160);
        }
        other => panic!("expected TransactionCompleted, got {other:?}"),
    }

    assert_eq!(ledger.database().outbox().count_pending().await.unwrap(), 0);
}

#[tokio::test]
async fn test_sink_failure_does_not_fail_payment() {
    let ledger = setup().await.with_sink(Arc::new(RejectingSink));

    let id = two_masks(&ledger, TransactionKind::Sale).await;
    let receipt = ledger
        .process_payment(&id, PaymentRequest::cash(cents(2160)))
        .await
        .unwrap();
    assert_eq!(receipt.status, TransactionStatus::Paid);

    let outbox = ledger.database().outbox();
    assert_eq!(outbox.count_pending().await.unwrap(), 2);
    let pending = outbox.get_pending(10).await.unwrap();
    assert_eq!(pending[1].event_type, "transaction.completed");
    assert_eq!(pending[1].attempts, 1);

    let report = ledger.redeliver_pending(None).await.unwrap();
    assert_eq!(report.failed, 2);

    let (sink, mut rx) = ChannelSink::new(16);
    let ledger = ledger.with_sink(Arc::new(sink));
    let report = ledger.redeliver_pending(Some(10)).await.unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(outbox.count_pending().await.unwrap(), 0);
    assert_eq!(rx.recv().await.unwrap().transaction_id(), id);
}

#[tokio::test]
async fn test_redelivery_gives_up_after_max_attempts() {
    let ledger = setup().await.with_sink(Arc::new(RejectingSink));
    two_masks(&ledger, TransactionKind::Quote).await;

    for _ in 1..MAX_DELIVERY_ATTEMPTS {
        ledger.redeliver_pending(None).await.unwrap();
    }

    let report = ledger.redeliver_pending(None).await.unwrap();
    assert_eq!(
        report,
        DeliveryReport { delivered: 0, failed: 0, skipped: 1, in_flight: 0 }
    );
}

#[tokio::test]
async fn test_redelivery_leaves_in_flight_events_alone() {
    let (sink, mut rx) = ChannelSink::new(16);
    let ledger = setup().await.with_sink(Arc::new(sink));

    // Committed by an operation that has not notified the sink yet
    let event = LedgerEvent::InstallmentRecorded {
        transaction_id: "txn-in-flight".to_string(),
        amount_cents: 500,
        balance_due_cents: 0,
    };
    let mut tx = ledger.database().begin().await.unwrap();
    outbox::queue(&mut tx, event.event_type(), event.transaction_id(), &event)
        .await
        .unwrap();
    commit(tx).await.unwrap();

    let report = ledger.redeliver_pending(None).await.unwrap();
    assert_eq!(report, DeliveryReport { in_flight: 1, ..DeliveryReport::default() });
    assert!(rx.try_recv().is_err());
    assert_eq!(ledger.database().outbox().count_pending().await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_redelivery_publishes_each_event_once() {
    let path = std::env::temp_dir().join(format!("nautilus-ledger-{}.db", uuid::Uuid::new_v4()));
    let db = Database::new(DbConfig::new(&path)).await.unwrap();
    add_item(&db, ItemKind::RentalUnit, "bcd-m", 2_500, 20, true).await;
    let sink = Arc::new(CountingSink::default());
    let ledger = Ledger::new(db, &LedgerConfig::default()).with_sink(sink.clone());

    let sales: Vec<_> = (0..8)
        .map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                let id = ledger
                    .create_transaction(CheckoutRequest::sale(vec![CartLine::new(
                        ItemKind::RentalUnit,
                        "bcd-m",
                        1,
                    )]))
                    .await
                    .unwrap();
                ledger.process_payment(&id, PaymentRequest::card(cents(2700))).await.unwrap();
            })
        })
        .collect();
    let sweeps: Vec<_> = (0..4)
        .map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                for _ in 0..10 {
                    ledger.redeliver_pending(None).await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for handle in sales.into_iter().chain(sweeps) {
        handle.await.unwrap();
    }

    let seen = sink.seen.lock().unwrap();
    assert_eq!(seen.len(), 16);
    assert!(seen.values().all(|&n| n == 1), "duplicate deliveries: {seen:?}");
    drop(seen);
    assert_eq!(ledger.database().outbox().count_pending().await.unwrap(), 0);

    ledger.database().close().await;
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
    }
}
