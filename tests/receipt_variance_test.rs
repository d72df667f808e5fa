//! Receipt processing: variance polarity, severity classification,
//! ledger conservation at received quantities, and idempotent retries.

mod common;

use assert_matches::assert_matches;
use common::{basic_fixture, TestHarness, TransferFixture};
use rust_decimal_macros::dec;

use transferdesk_api::errors::ServiceError;
use transferdesk_api::events::Event;
use transferdesk_api::services::receiving::{ReceiptLine, ReceiveTransferCommand};
use transferdesk_api::services::transfers::{
    ApproveTransferCommand, CreateTransferCommand, NewTransferLine, TransferDetail,
};

async fn approved_transfer(
    harness: &TestHarness,
    fixture: &TransferFixture,
    quantity: i32,
) -> TransferDetail {
    let detail = harness
        .transfers
        .create_transfer(
            CreateTransferCommand {
                source_outlet_id: fixture.source,
                destination_outlet_id: fixture.dest,
                notes: None,
                lines: vec![NewTransferLine {
                    product_id: fixture.product,
                    quantity,
                }],
                packaging_lines: vec![],
            },
            fixture.requester,
        )
        .await
        .unwrap();
    harness
        .transfers
        .approve_transfer(
            detail.transfer.id,
            ApproveTransferCommand::default(),
            harness.manager(),
        )
        .await
        .unwrap()
}

fn count(line_item_id: uuid::Uuid, quantity_received: i32) -> ReceiveTransferCommand {
    ReceiveTransferCommand {
        lines: vec![ReceiptLine {
            line_item_id,
            quantity_received,
            reason: None,
        }],
        packaging_lines: vec![],
    }
}

#[tokio::test]
async fn exact_count_completes_without_variance() {
    let mut harness = TestHarness::new().await;
    let fixture = basic_fixture(&harness, dec!(20)).await;
    let detail = approved_transfer(&harness, &fixture, 10).await;
    let receiver = harness.staff_with_access(fixture.dest).await;

    let outcome = harness
        .receipts
        .receive_transfer(detail.transfer.id, count(detail.lines[0].id, 10), receiver)
        .await
        .unwrap();

    assert!(outcome.newly_received);
    assert_eq!(outcome.transfer.status, "completed");
    assert!(outcome.transfer.completed_at.is_some());
    assert!(outcome.variances.is_empty());

    let events = harness.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::TransferReceived { variance_count, .. } if *variance_count == 0)));
    assert!(!events
        .iter()
        .any(|e| matches!(e, Event::VarianceDetected { .. })));
}

#[tokio::test]
async fn short_count_creates_positive_variance() {
    let mut harness = TestHarness::new().await;
    let fixture = basic_fixture(&harness, dec!(20)).await;
    let detail = approved_transfer(&harness, &fixture, 10).await;
    let receiver = harness.staff_with_access(fixture.dest).await;

    let outcome = harness
        .receipts
        .receive_transfer(detail.transfer.id, count(detail.lines[0].id, 8), receiver)
        .await
        .unwrap();

    assert_eq!(outcome.transfer.status, "received");
    assert!(outcome.transfer.completed_at.is_none());
    assert_eq!(outcome.variances.len(), 1);

    let variance = &outcome.variances[0];
    assert_eq!(variance.expected_quantity, 10);
    assert_eq!(variance.received_quantity, 8);
    assert_eq!(variance.variance, 2);
    assert_eq!(variance.unit_cost, dec!(20));
    assert_eq!(variance.variance_value, dec!(40));
    assert_eq!(variance.status, "open");
    assert_eq!(variance.severity, "low");
    assert_eq!(variance.outlet_id, fixture.dest);

    let events = harness.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        Event::VarianceDetected { alerts, .. } if alerts.len() == 1 && alerts[0].variance == 2
    )));
}

#[tokio::test]
async fn overage_still_creates_a_variance_record() {
    let harness = TestHarness::new().await;
    let fixture = basic_fixture(&harness, dec!(20)).await;
    let detail = approved_transfer(&harness, &fixture, 10).await;
    let receiver = harness.staff_with_access(fixture.dest).await;

    let outcome = harness
        .receipts
        .receive_transfer(detail.transfer.id, count(detail.lines[0].id, 13), receiver)
        .await
        .unwrap();

    // Excess is not fine: it is evidence of an upstream counting error or
    // fraud in the other direction.
    assert_eq!(outcome.transfer.status, "received");
    assert_eq!(outcome.variances.len(), 1);
    assert_eq!(outcome.variances[0].variance, -3);
    assert_eq!(outcome.variances[0].variance_value, dec!(-60));
}

#[tokio::test]
async fn ledger_reflects_received_quantity_and_stays_balanced() {
    let harness = TestHarness::new().await;
    let fixture = basic_fixture(&harness, dec!(20)).await;
    let detail = approved_transfer(&harness, &fixture, 10).await;
    let receiver = harness.staff_with_access(fixture.dest).await;

    harness
        .receipts
        .receive_transfer(detail.transfer.id, count(detail.lines[0].id, 8), receiver)
        .await
        .unwrap();

    // The ledger records what physically arrived, not what was expected.
    let dest_on_hand = harness
        .ledger
        .product_on_hand(harness.db.as_ref(), fixture.product, fixture.dest)
        .await
        .unwrap();
    assert_eq!(dest_on_hand, 8);

    // Conservation holds per line even with a variance outstanding.
    let balance = harness
        .ledger
        .product_line_balance(harness.db.as_ref(), detail.lines[0].id)
        .await
        .unwrap();
    assert_eq!(balance, 0);

    let unbalanced = harness
        .reconciliation
        .find_unbalanced_references(harness.db.as_ref())
        .await
        .unwrap();
    assert!(unbalanced.is_empty());
}

#[tokio::test]
async fn omitted_lines_default_to_expected_quantity() {
    let harness = TestHarness::new().await;
    let fixture = basic_fixture(&harness, dec!(20)).await;
    let detail = approved_transfer(&harness, &fixture, 10).await;
    let receiver = harness.staff_with_access(fixture.dest).await;

    let outcome = harness
        .receipts
        .receive_transfer(
            detail.transfer.id,
            ReceiveTransferCommand::default(),
            receiver,
        )
        .await
        .unwrap();

    assert_eq!(outcome.transfer.status, "completed");
    assert!(outcome.variances.is_empty());

    let detail = harness
        .transfers
        .get_transfer(detail.transfer.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(detail.lines[0].received_quantity, Some(10));
}

#[tokio::test]
async fn receive_retry_is_a_no_op() {
    let harness = TestHarness::new().await;
    let fixture = basic_fixture(&harness, dec!(20)).await;
    let detail = approved_transfer(&harness, &fixture, 10).await;
    let receiver = harness.staff_with_access(fixture.dest).await;

    let first = harness
        .receipts
        .receive_transfer(
            detail.transfer.id,
            count(detail.lines[0].id, 7),
            receiver,
        )
        .await
        .unwrap();
    assert!(first.newly_received);

    let retry = harness
        .receipts
        .receive_transfer(
            detail.transfer.id,
            count(detail.lines[0].id, 7),
            receiver,
        )
        .await
        .unwrap();
    assert!(!retry.newly_received);
    assert_eq!(retry.transfer.status, "received");
    assert_eq!(retry.variances.len(), 1, "retry returns the prior result");

    let movements = harness
        .ledger
        .product_movements_for_transfer(harness.db.as_ref(), detail.transfer.id)
        .await
        .unwrap();
    assert_eq!(movements.len(), 2, "retry must not write a second pair");
}

#[tokio::test]
async fn receive_requires_destination_access() {
    let harness = TestHarness::new().await;
    let fixture = basic_fixture(&harness, dec!(20)).await;
    let detail = approved_transfer(&harness, &fixture, 10).await;

    let stranger = harness.staff();
    let err = harness
        .receipts
        .receive_transfer(detail.transfer.id, count(detail.lines[0].id, 10), stranger)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));
}

#[tokio::test]
async fn receive_fails_before_approval() {
    let harness = TestHarness::new().await;
    let fixture = basic_fixture(&harness, dec!(20)).await;
    let receiver = harness.staff_with_access(fixture.dest).await;

    let detail = harness
        .transfers
        .create_transfer(
            CreateTransferCommand {
                source_outlet_id: fixture.source,
                destination_outlet_id: fixture.dest,
                notes: None,
                lines: vec![NewTransferLine {
                    product_id: fixture.product,
                    quantity: 10,
                }],
                packaging_lines: vec![],
            },
            fixture.requester,
        )
        .await
        .unwrap();

    let err = harness
        .receipts
        .receive_transfer(detail.transfer.id, count(detail.lines[0].id, 10), receiver)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InvalidState { ref current_status, .. } if current_status == "pending"
    );
}

#[tokio::test]
async fn negative_counts_are_rejected() {
    let harness = TestHarness::new().await;
    let fixture = basic_fixture(&harness, dec!(20)).await;
    let detail = approved_transfer(&harness, &fixture, 10).await;
    let receiver = harness.staff_with_access(fixture.dest).await;

    let err = harness
        .receipts
        .receive_transfer(detail.transfer.id, count(detail.lines[0].id, -1), receiver)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn nothing_received_writes_no_movements_but_records_the_loss() {
    let harness = TestHarness::new().await;
    let fixture = basic_fixture(&harness, dec!(20)).await;
    let detail = approved_transfer(&harness, &fixture, 10).await;
    let receiver = harness.staff_with_access(fixture.dest).await;

    let outcome = harness
        .receipts
        .receive_transfer(detail.transfer.id, count(detail.lines[0].id, 0), receiver)
        .await
        .unwrap();

    assert_eq!(outcome.variances.len(), 1);
    assert_eq!(outcome.variances[0].variance, 10);

    let movements = harness
        .ledger
        .product_movements_for_transfer(harness.db.as_ref(), detail.transfer.id)
        .await
        .unwrap();
    assert!(movements.is_empty(), "a zero receipt moves nothing");
}

#[tokio::test]
async fn severity_follows_monetary_magnitude() {
    let harness = TestHarness::new().await;
    // unit cost 1000: a shortage of 2 is worth 2000 -> medium,
    // a shortage of 6 is worth 6000 -> high, 11 -> critical.
    let fixture = basic_fixture(&harness, dec!(1000)).await;

    for (received, expected_severity) in [(18, "medium"), (14, "high"), (9, "critical")] {
        let detail = approved_transfer(&harness, &fixture, 20).await;
        let receiver = harness.staff_with_access(fixture.dest).await;
        let outcome = harness
            .receipts
            .receive_transfer(
                detail.transfer.id,
                count(detail.lines[0].id, received),
                receiver,
            )
            .await
            .unwrap();
        assert_eq!(
            outcome.variances[0].severity, expected_severity,
            "received {} of 20 at unit cost 1000",
            received
        );
    }
}

#[tokio::test]
async fn variance_value_at_exact_cutoff_stays_in_lower_bucket() {
    let harness = TestHarness::new().await;
    // A shortage of 1 at unit cost 1000 is worth exactly 1000 -> low.
    let fixture = basic_fixture(&harness, dec!(1000)).await;
    let detail = approved_transfer(&harness, &fixture, 20).await;
    let receiver = harness.staff_with_access(fixture.dest).await;

    let outcome = harness
        .receipts
        .receive_transfer(detail.transfer.id, count(detail.lines[0].id, 19), receiver)
        .await
        .unwrap();
    assert_eq!(outcome.variances[0].severity, "low");
    assert_eq!(outcome.variances[0].variance_value, dec!(1000));
}

#[tokio::test]
async fn receipt_reason_is_stored_on_the_variance() {
    let harness = TestHarness::new().await;
    let fixture = basic_fixture(&harness, dec!(20)).await;
    let detail = approved_transfer(&harness, &fixture, 10).await;
    let receiver = harness.staff_with_access(fixture.dest).await;

    let outcome = harness
        .receipts
        .receive_transfer(
            detail.transfer.id,
            ReceiveTransferCommand {
                lines: vec![ReceiptLine {
                    line_item_id: detail.lines[0].id,
                    quantity_received: 9,
                    reason: Some("one carton crushed".to_string()),
                }],
                packaging_lines: vec![],
            },
            receiver,
        )
        .await
        .unwrap();

    assert_eq!(
        outcome.variances[0].reason.as_deref(),
        Some("one carton crushed")
    );
}
