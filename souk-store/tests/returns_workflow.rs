mod common;

use chrono::{DateTime, Duration, Utc};
use common::Harness;
use rust_decimal_macros::dec;
use souk_core::CoreError;
use souk_order::{Order, OrderRepository, PaymentStatus};
use souk_returns::{
    CreateReturn, RefundAllocation, RefundMethod, RefundPolicy, ReturnError, ReturnReason,
    ReturnRepository, ReturnStatus, ReviewAction, Reviewer, ReviewerRole, SupplierResponse,
};
use souk_shared::{DomainEvent, Money};
use uuid::Uuid;

fn admin() -> Reviewer {
    Reviewer {
        id: Uuid::new_v4(),
        role: ReviewerRole::Admin,
    }
}

fn request_for(order: &Order, reason: ReturnReason, quantity: u32) -> CreateReturn {
    CreateReturn {
        order_id: order.id,
        order_line_id: None,
        product_id: None,
        customer_id: order.customer_id,
        reason,
        quantity,
        is_warranty_claim: false,
        description: Some("not what I ordered".to_string()),
        evidence: vec![],
    }
}

async fn delivered_with_warranty(
    h: &Harness,
    warranty_expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    delivered_at: DateTime<Utc>,
) -> Order {
    let mut line = common::line(Uuid::new_v4(), dec!(800), 1);
    line.warranty_expires_at = warranty_expires_at;

    let mut order = Order::new(Uuid::new_v4(), created_at);
    order.add_line(line, h.rules.commission_rate()).unwrap();
    common::advance_to_delivered(&mut order, created_at, delivered_at);
    order.set_payment_status(PaymentStatus::Completed, created_at);
    h.store.save_order(&order).await.unwrap();
    order
}

fn approve() -> ReviewAction {
    ReviewAction::Approve {
        refund_method: RefundMethod::MobileMoney,
        policy: None,
        manual_allocation: None,
    }
}

#[tokio::test]
async fn test_supplier_fault_return_to_refund() {
    let h = Harness::new();
    let mut rx = h.events.subscribe();
    let now = Utc::now();
    let supplier = Uuid::new_v4();
    let order = h
        .delivered_order(Uuid::new_v4(), supplier, dec!(500), 2, now - Duration::days(5), now - Duration::days(3))
        .await;

    let created = h
        .returns
        .create(request_for(&order, ReturnReason::Defective, 2), now)
        .await
        .unwrap();
    assert_eq!(created.status, ReturnStatus::PendingReview);
    assert_eq!(created.refund_policy, RefundPolicy::SupplierFault);
    assert_eq!(created.item_total, Money::new(dec!(1000)));

    let approved = h.returns.review(created.id, approve(), &admin(), None, now).await.unwrap();
    let allocation = approved.allocation.unwrap();
    assert_eq!(allocation.customer_refund, Money::new(dec!(1000)));
    assert_eq!(allocation.supplier_deduction, Money::new(dec!(1000)));
    assert_eq!(allocation.platform_deduction, Money::zero());

    h.returns.mark_item_received(created.id, now).await.unwrap();
    h.returns.begin_refund(created.id, now).await.unwrap();
    let refunded = h
        .returns
        .complete_refund(created.id, Some("MM-20931".to_string()), now)
        .await
        .unwrap();
    assert_eq!(refunded.status, ReturnStatus::RefundCompleted);
    assert_eq!(refunded.refunded_at, Some(now));

    let topics: Vec<&str> = [rx.recv().await.unwrap(), rx.recv().await.unwrap(), rx.recv().await.unwrap()]
        .iter()
        .map(DomainEvent::topic)
        .collect();
    assert_eq!(
        topics,
        vec!["returns.approved", "returns.item_received", "returns.refund_completed"]
    );
}

#[tokio::test]
async fn test_return_window_expired() {
    let h = Harness::new();
    let now = Utc::now();
    let order = h
        .delivered_order(Uuid::new_v4(), Uuid::new_v4(), dec!(300), 1, now - Duration::days(20), now - Duration::days(15))
        .await;

    let err = h
        .returns
        .create(request_for(&order, ReturnReason::ChangedMind, 1), now)
        .await
        .unwrap_err();

    assert!(matches!(err, ReturnError::ReturnWindowExpired { days: 14 }));
    assert!(err.to_string().to_lowercase().contains("return window expired"));
}

#[tokio::test]
async fn test_changed_mind_keeps_restocking_fee() {
    let h = Harness::new();
    let now = Utc::now();
    let order = h
        .delivered_order(Uuid::new_v4(), Uuid::new_v4(), dec!(1000), 1, now - Duration::days(2), now - Duration::days(1))
        .await;

    let created = h
        .returns
        .create(request_for(&order, ReturnReason::ChangedMind, 1), now)
        .await
        .unwrap();
    let allocation = created.allocation.unwrap();

    assert_eq!(allocation.restocking_fee, Money::new(dec!(150)));
    assert_eq!(allocation.customer_refund, Money::new(dec!(850)));
    assert_eq!(allocation.supplier_deduction, Money::new(dec!(637.50)));
}

#[tokio::test]
async fn test_returned_quantity_is_bounded_by_line() {
    let h = Harness::new();
    let now = Utc::now();
    let order = h
        .delivered_order(Uuid::new_v4(), Uuid::new_v4(), dec!(100), 3, now - Duration::days(2), now - Duration::days(1))
        .await;

    let first = h
        .returns
        .create(request_for(&order, ReturnReason::SizeIssue, 2), now)
        .await
        .unwrap();
    let err = h
        .returns
        .create(request_for(&order, ReturnReason::SizeIssue, 2), now)
        .await
        .unwrap_err();
    assert!(matches!(err, ReturnError::InvalidQuantity { requested: 2, available: 1 }));

    let customer = Reviewer {
        id: order.customer_id,
        role: ReviewerRole::Customer,
    };
    h.returns
        .cancel(first.id, &customer, Some("changed plans".to_string()), now)
        .await
        .unwrap();

    assert!(h
        .returns
        .create(request_for(&order, ReturnReason::SizeIssue, 3), now)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_only_owner_can_open_return() {
    let h = Harness::new();
    let now = Utc::now();
    let order = h
        .delivered_order(Uuid::new_v4(), Uuid::new_v4(), dec!(100), 1, now - Duration::days(2), now - Duration::days(1))
        .await;

    let mut input = request_for(&order, ReturnReason::Defective, 1);
    input.customer_id = Uuid::new_v4();

    assert!(matches!(
        h.returns.create(input, now).await,
        Err(ReturnError::NotOrderOwner(_))
    ));
}

#[tokio::test]
async fn test_supplier_dispute_then_admin_decides() {
    let h = Harness::new();
    let now = Utc::now();
    let supplier = Uuid::new_v4();
    let order = h
        .delivered_order(Uuid::new_v4(), supplier, dec!(250), 1, now - Duration::days(2), now - Duration::days(1))
        .await;
    let created = h
        .returns
        .create(request_for(&order, ReturnReason::NotAsDescribed, 1), now)
        .await
        .unwrap();

    h.returns
        .review(created.id, ReviewAction::EscalateToSupplier, &admin(), None, now)
        .await
        .unwrap();

    let other_supplier = h
        .returns
        .supplier_respond(created.id, Uuid::new_v4(), SupplierResponse::Accept, now)
        .await;
    assert!(matches!(other_supplier, Err(ReturnError::NotAuthorized { .. })));

    let disputed = h
        .returns
        .supplier_respond(
            created.id,
            supplier,
            SupplierResponse::Dispute {
                reason: "item was used".to_string(),
            },
            now,
        )
        .await
        .unwrap();
    assert_eq!(disputed.status, ReturnStatus::Disputed);
    assert_eq!(disputed.supplier_dispute_reason.as_deref(), Some("item was used"));

    let rejected = h
        .returns
        .review(
            created.id,
            ReviewAction::Reject {
                reason: "evidence of wear".to_string(),
            },
            &admin(),
            None,
            now,
        )
        .await
        .unwrap();
    assert_eq!(rejected.status, ReturnStatus::Rejected);
}

#[tokio::test]
async fn test_second_decision_loses() {
    let h = Harness::new();
    let now = Utc::now();
    let order = h
        .delivered_order(Uuid::new_v4(), Uuid::new_v4(), dec!(400), 1, now - Duration::days(2), now - Duration::days(1))
        .await;
    let created = h
        .returns
        .create(request_for(&order, ReturnReason::Defective, 1), now)
        .await
        .unwrap();

    h.returns.review(created.id, approve(), &admin(), None, now).await.unwrap();
    let err = h
        .returns
        .review(
            created.id,
            ReviewAction::Reject {
                reason: "duplicate".to_string(),
            },
            &admin(),
            None,
            now,
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ReturnError::InvalidTransition {
            from: ReturnStatus::Approved,
            to: ReturnStatus::Rejected
        }
    ));
    assert_eq!(h.returns.get(created.id).await.unwrap().status, ReturnStatus::Approved);
}

#[tokio::test]
async fn test_customer_cannot_review() {
    let h = Harness::new();
    let now = Utc::now();
    let order = h
        .delivered_order(Uuid::new_v4(), Uuid::new_v4(), dec!(400), 1, now - Duration::days(2), now - Duration::days(1))
        .await;
    let created = h
        .returns
        .create(request_for(&order, ReturnReason::Defective, 1), now)
        .await
        .unwrap();

    let customer = Reviewer {
        id: order.customer_id,
        role: ReviewerRole::Customer,
    };
    assert!(matches!(
        h.returns.review(created.id, approve(), &customer, None, now).await,
        Err(ReturnError::NotAuthorized { .. })
    ));
}

#[tokio::test]
async fn test_refund_completion_is_idempotent() {
    let h = Harness::new();
    let now = Utc::now();
    let order = h
        .delivered_order(Uuid::new_v4(), Uuid::new_v4(), dec!(400), 1, now - Duration::days(2), now - Duration::days(1))
        .await;
    let created = h
        .returns
        .create(request_for(&order, ReturnReason::WrongItem, 1), now)
        .await
        .unwrap();
    h.returns.review(created.id, approve(), &admin(), None, now).await.unwrap();
    h.returns.mark_item_received(created.id, now).await.unwrap();
    h.returns.begin_refund(created.id, now).await.unwrap();

    assert!(matches!(
        h.returns.complete_refund(created.id, None, now).await,
        Err(ReturnError::MissingField("refund_reference"))
    ));

    let first = h
        .returns
        .complete_refund(created.id, Some("MM-1".to_string()), now)
        .await
        .unwrap();
    let again = h
        .returns
        .complete_refund(created.id, Some("MM-2".to_string()), now + Duration::minutes(5))
        .await
        .unwrap();

    assert_eq!(first, again);
    assert_eq!(again.refund_reference.as_deref(), Some("MM-1"));
}

#[tokio::test]
async fn test_warranty_claim_ignores_return_window() {
    let h = Harness::new();
    let now = Utc::now();
    let order = delivered_with_warranty(
        &h,
        Some(now + Duration::days(300)),
        now - Duration::days(40),
        now - Duration::days(35),
    )
    .await;

    let mut input = request_for(&order, ReturnReason::Defective, 1);
    input.is_warranty_claim = true;
    let created = h.returns.create(input, now).await.unwrap();

    assert_eq!(created.status, ReturnStatus::PendingReview);
    assert!(created.is_warranty_claim);
}

#[tokio::test]
async fn test_warranty_claim_after_expiry() {
    let h = Harness::new();
    let now = Utc::now();
    let expired = delivered_with_warranty(
        &h,
        Some(now - Duration::days(1)),
        now - Duration::days(40),
        now - Duration::days(35),
    )
    .await;
    let uncovered = delivered_with_warranty(&h, None, now - Duration::days(3), now - Duration::days(2)).await;

    for order in [&expired, &uncovered] {
        let mut input = request_for(order, ReturnReason::Defective, 1);
        input.is_warranty_claim = true;
        let err = h.returns.create(input, now).await.unwrap_err();
        assert!(matches!(err, ReturnError::WarrantyExpired));
        assert!(err.is_validation());
    }
}

#[tokio::test]
async fn test_unpriced_return_needs_manual_figures() {
    let h = Harness::new();
    let now = Utc::now();
    let order = h
        .delivered_order(Uuid::new_v4(), Uuid::new_v4(), dec!(0), 1, now - Duration::days(2), now - Duration::days(1))
        .await;

    let created = h
        .returns
        .create(request_for(&order, ReturnReason::Defective, 1), now)
        .await
        .unwrap();
    assert_eq!(created.status, ReturnStatus::PendingReview);
    assert!(created.allocation.is_none());

    assert!(matches!(
        h.returns.review(created.id, approve(), &admin(), None, now).await,
        Err(ReturnError::UnresolvablePricing(_))
    ));
    assert_eq!(h.returns.get(created.id).await.unwrap().status, ReturnStatus::PendingReview);

    let manual = RefundAllocation {
        refund_amount: Money::new(dec!(50)),
        restocking_fee: Money::zero(),
        customer_refund: Money::new(dec!(50)),
        supplier_deduction: Money::new(dec!(50)),
        platform_deduction: Money::zero(),
    };
    let approved = h
        .returns
        .review(
            created.id,
            ReviewAction::Approve {
                refund_method: RefundMethod::StoreCredit,
                policy: None,
                manual_allocation: Some(manual),
            },
            &admin(),
            Some("priced from supplier invoice".to_string()),
            now,
        )
        .await
        .unwrap();

    assert_eq!(approved.status, ReturnStatus::Approved);
    assert_eq!(approved.allocation, Some(manual));
}

#[tokio::test]
async fn test_manual_figures_rejected_when_priced() {
    let h = Harness::new();
    let now = Utc::now();
    let order = h
        .delivered_order(Uuid::new_v4(), Uuid::new_v4(), dec!(200), 1, now - Duration::days(2), now - Duration::days(1))
        .await;
    let created = h
        .returns
        .create(request_for(&order, ReturnReason::Defective, 1), now)
        .await
        .unwrap();
    let calculated = created.allocation;
    assert!(calculated.is_some());

    let manual = RefundAllocation {
        refund_amount: Money::new(dec!(200)),
        restocking_fee: Money::zero(),
        customer_refund: Money::new(dec!(200)),
        supplier_deduction: Money::new(dec!(100)),
        platform_deduction: Money::new(dec!(100)),
    };
    let err = h
        .returns
        .review(
            created.id,
            ReviewAction::Approve {
                refund_method: RefundMethod::MobileMoney,
                policy: None,
                manual_allocation: Some(manual),
            },
            &admin(),
            None,
            now,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ReturnError::ManualAllocationNotAllowed(id) if id == created.id));
    let stored = h.returns.get(created.id).await.unwrap();
    assert_eq!(stored.status, ReturnStatus::PendingReview);
    assert_eq!(stored.allocation, calculated);
}

#[tokio::test]
async fn test_rejection_requires_reason() {
    let h = Harness::new();
    let now = Utc::now();
    let order = h
        .delivered_order(Uuid::new_v4(), Uuid::new_v4(), dec!(200), 1, now - Duration::days(2), now - Duration::days(1))
        .await;
    let created = h
        .returns
        .create(request_for(&order, ReturnReason::ChangedMind, 1), now)
        .await
        .unwrap();

    let err = h
        .returns
        .review(
            created.id,
            ReviewAction::Reject {
                reason: "   ".to_string(),
            },
            &admin(),
            None,
            now,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ReturnError::MissingField("rejection_reason")));
    assert_eq!(h.returns.get(created.id).await.unwrap().status, ReturnStatus::PendingReview);
}

#[tokio::test]
async fn test_concurrent_returns_cannot_exceed_line() {
    let h = Harness::new();
    let now = Utc::now();
    let order = h
        .delivered_order(Uuid::new_v4(), Uuid::new_v4(), dec!(100), 3, now - Duration::days(2), now - Duration::days(1))
        .await;

    let (a, b) = tokio::join!(
        h.returns.create(request_for(&order, ReturnReason::SizeIssue, 2), now),
        h.returns.create(request_for(&order, ReturnReason::SizeIssue, 2), now)
    );

    let stored: Vec<_> = [&a, &b].into_iter().filter(|r| r.is_ok()).collect();
    assert_eq!(stored.len(), 1);
    assert!([a, b]
        .into_iter()
        .any(|r| matches!(r, Err(ReturnError::InvalidQuantity { requested: 2, .. }))));
}

#[tokio::test]
async fn test_store_refuses_over_return() {
    let h = Harness::new();
    let now = Utc::now();
    let order = h
        .delivered_order(Uuid::new_v4(), Uuid::new_v4(), dec!(100), 3, now - Duration::days(2), now - Duration::days(1))
        .await;
    let first = h
        .returns
        .create(request_for(&order, ReturnReason::SizeIssue, 2), now)
        .await
        .unwrap();

    let mut second = first.clone();
    second.id = Uuid::new_v4();
    let result = ReturnRepository::insert(h.store.as_ref(), &second, 3).await;
    assert!(matches!(result, Err(CoreError::Conflict(_))));

    second.quantity = 1;
    assert!(ReturnRepository::insert(h.store.as_ref(), &second, 3).await.is_ok());
}
