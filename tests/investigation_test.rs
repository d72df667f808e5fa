//! Investigation workflow and the full transfer-to-resolution scenario.

mod common;

use assert_matches::assert_matches;
use common::{basic_fixture, TestHarness, TransferFixture};
use rust_decimal_macros::dec;

use transferdesk_api::entities::transfer_variance::VarianceStatus;
use transferdesk_api::errors::ServiceError;
use transferdesk_api::services::investigations::InvestigateCommand;
use transferdesk_api::services::receiving::{ReceiptLine, ReceiveTransferCommand};
use transferdesk_api::services::transfers::{
    ApproveTransferCommand, CreateTransferCommand, NewTransferLine,
};

/// Runs a transfer through approval and a short receipt, returning the
/// open variance it produced.
async fn variance_from_short_receipt(
    harness: &TestHarness,
    fixture: &TransferFixture,
    approved: i32,
    received: i32,
) -> transferdesk_api::entities::transfer_variance::Model {
    let detail = harness
        .transfers
        .create_transfer(
            CreateTransferCommand {
                source_outlet_id: fixture.source,
                destination_outlet_id: fixture.dest,
                notes: None,
                lines: vec![NewTransferLine {
                    product_id: fixture.product,
                    quantity: approved,
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
        .unwrap();
    let receiver = harness.staff_with_access(fixture.dest).await;
    let outcome = harness
        .receipts
        .receive_transfer(
            detail.transfer.id,
            ReceiveTransferCommand {
                lines: vec![ReceiptLine {
                    line_item_id: detail.lines[0].id,
                    quantity_received: received,
                    reason: None,
                }],
                packaging_lines: vec![],
            },
            receiver,
        )
        .await
        .unwrap();
    outcome.variances.into_iter().next().expect("variance")
}

fn resolve_command() -> InvestigateCommand {
    InvestigateCommand {
        root_cause: "damaged in transit".to_string(),
        corrective_action: "claim filed with carrier".to_string(),
        new_status: VarianceStatus::Resolved,
    }
}

#[tokio::test]
async fn investigate_requires_root_cause_and_corrective_action() {
    let harness = TestHarness::new().await;
    let fixture = basic_fixture(&harness, dec!(15)).await;
    let variance = variance_from_short_receipt(&harness, &fixture, 10, 8).await;

    for (root_cause, corrective_action) in [("", "restock"), ("miscount", "  "), ("  ", "")] {
        let err = harness
            .variances
            .investigate(
                variance.id,
                InvestigateCommand {
                    root_cause: root_cause.to_string(),
                    corrective_action: corrective_action.to_string(),
                    new_status: VarianceStatus::Resolved,
                },
                harness.manager(),
            )
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(_));
    }
}

#[tokio::test]
async fn investigate_requires_manager_role() {
    let harness = TestHarness::new().await;
    let fixture = basic_fixture(&harness, dec!(15)).await;
    let variance = variance_from_short_receipt(&harness, &fixture, 10, 8).await;

    let err = harness
        .variances
        .investigate(variance.id, resolve_command(), harness.staff())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));
}

#[tokio::test]
async fn resolving_stamps_resolved_at() {
    let harness = TestHarness::new().await;
    let fixture = basic_fixture(&harness, dec!(15)).await;
    let variance = variance_from_short_receipt(&harness, &fixture, 10, 8).await;

    let resolved = harness
        .variances
        .investigate(variance.id, resolve_command(), harness.manager())
        .await
        .unwrap();

    assert_eq!(resolved.status, "resolved");
    assert!(resolved.resolved_at.is_some());
    assert_eq!(resolved.root_cause.as_deref(), Some("damaged in transit"));
    assert_eq!(
        resolved.corrective_action.as_deref(),
        Some("claim filed with carrier")
    );
}

#[tokio::test]
async fn write_off_does_not_stamp_resolved_at() {
    let harness = TestHarness::new().await;
    let fixture = basic_fixture(&harness, dec!(15)).await;
    let variance = variance_from_short_receipt(&harness, &fixture, 10, 8).await;

    let written_off = harness
        .variances
        .investigate(
            variance.id,
            InvestigateCommand {
                root_cause: "shrinkage below claim threshold".to_string(),
                corrective_action: "written off".to_string(),
                new_status: VarianceStatus::WriteOff,
            },
            harness.manager(),
        )
        .await
        .unwrap();

    assert_eq!(written_off.status, "write_off");
    assert!(written_off.resolved_at.is_none());
}

#[tokio::test]
async fn investigating_then_resolving_is_allowed() {
    let harness = TestHarness::new().await;
    let fixture = basic_fixture(&harness, dec!(15)).await;
    let variance = variance_from_short_receipt(&harness, &fixture, 10, 8).await;

    let investigating = harness
        .variances
        .investigate(
            variance.id,
            InvestigateCommand {
                root_cause: "under review".to_string(),
                corrective_action: "recount scheduled".to_string(),
                new_status: VarianceStatus::Investigating,
            },
            harness.manager(),
        )
        .await
        .unwrap();
    assert_eq!(investigating.status, "investigating");
    assert!(investigating.resolved_at.is_none());

    let resolved = harness
        .variances
        .investigate(variance.id, resolve_command(), harness.manager())
        .await
        .unwrap();
    assert_eq!(resolved.status, "resolved");
}

#[tokio::test]
async fn resolved_variance_cannot_be_reinvestigated() {
    let harness = TestHarness::new().await;
    let fixture = basic_fixture(&harness, dec!(15)).await;
    let variance = variance_from_short_receipt(&harness, &fixture, 10, 8).await;

    harness
        .variances
        .investigate(variance.id, resolve_command(), harness.manager())
        .await
        .unwrap();

    let err = harness
        .variances
        .investigate(variance.id, resolve_command(), harness.manager())
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InvalidState { ref current_status, .. } if current_status == "resolved"
    );
}

#[tokio::test]
async fn investigation_cannot_reopen_a_variance() {
    let harness = TestHarness::new().await;
    let fixture = basic_fixture(&harness, dec!(15)).await;
    let variance = variance_from_short_receipt(&harness, &fixture, 10, 8).await;

    let err = harness
        .variances
        .investigate(
            variance.id,
            InvestigateCommand {
                root_cause: "n/a".to_string(),
                corrective_action: "n/a".to_string(),
                new_status: VarianceStatus::Open,
            },
            harness.manager(),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn investigation_never_touches_the_ledger() {
    let harness = TestHarness::new().await;
    let fixture = basic_fixture(&harness, dec!(15)).await;
    let variance = variance_from_short_receipt(&harness, &fixture, 10, 8).await;

    let before = harness
        .ledger
        .product_on_hand(harness.db.as_ref(), fixture.product, fixture.dest)
        .await
        .unwrap();

    harness
        .variances
        .investigate(variance.id, resolve_command(), harness.manager())
        .await
        .unwrap();

    let after = harness
        .ledger
        .product_on_hand(harness.db.as_ref(), fixture.product, fixture.dest)
        .await
        .unwrap();
    assert_eq!(before, after);
}

// ==================== Risk integration ====================

#[tokio::test]
async fn risk_reads_are_recomputed_against_the_live_population() {
    let harness = TestHarness::new().await;
    let fixture = basic_fixture(&harness, dec!(15)).await;

    // Four open variances at the same destination outlet
    let subject = variance_from_short_receipt(&harness, &fixture, 10, 8).await;
    let mut siblings = Vec::new();
    for _ in 0..3 {
        siblings.push(variance_from_short_receipt(&harness, &fixture, 10, 9).await);
    }

    let with_risk = harness
        .variances
        .get_variance_with_risk(subject.id)
        .await
        .unwrap()
        .unwrap();
    assert!(with_risk
        .risk
        .flags
        .iter()
        .any(|f| f.ends_with("Unresolved at Location")));
    let clustered_score = with_risk.risk.score;

    // Resolving one sibling drops the cluster below the threshold
    harness
        .variances
        .investigate(siblings[0].id, resolve_command(), harness.manager())
        .await
        .unwrap();

    let with_risk = harness
        .variances
        .get_variance_with_risk(subject.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!with_risk
        .risk
        .flags
        .iter()
        .any(|f| f.ends_with("Unresolved at Location")));
    assert_eq!(clustered_score - with_risk.risk.score, 30);
}

// ==================== End-to-end scenario ====================

#[tokio::test]
async fn full_transfer_to_resolution_scenario() {
    let harness = TestHarness::new().await;
    let warehouse = harness.seed_outlet("WH-MAIN", "warehouse").await;
    let store = harness.seed_outlet("ST-DOWNTOWN", "store").await;
    let product = harness.seed_product("SKU-A", dec!(120)).await;
    let requester = harness.staff_with_access(store).await;

    // Create a transfer of 50 units warehouse -> store
    let detail = harness
        .transfers
        .create_transfer(
            CreateTransferCommand {
                source_outlet_id: warehouse,
                destination_outlet_id: store,
                notes: Some("weekly replenishment".to_string()),
                lines: vec![NewTransferLine {
                    product_id: product,
                    quantity: 50,
                }],
                packaging_lines: vec![],
            },
            requester,
        )
        .await
        .unwrap();

    // Approve all 50
    harness
        .transfers
        .approve_transfer(
            detail.transfer.id,
            ApproveTransferCommand::default(),
            harness.manager(),
        )
        .await
        .unwrap();

    // The store counts 45 on arrival
    let receiver = harness.staff_with_access(store).await;
    let outcome = harness
        .receipts
        .receive_transfer(
            detail.transfer.id,
            ReceiveTransferCommand {
                lines: vec![ReceiptLine {
                    line_item_id: detail.lines[0].id,
                    quantity_received: 45,
                    reason: None,
                }],
                packaging_lines: vec![],
            },
            receiver,
        )
        .await
        .unwrap();

    assert_eq!(outcome.transfer.status, "received");
    assert_eq!(outcome.variances.len(), 1);
    let variance = &outcome.variances[0];
    assert_eq!(variance.variance, 5);
    assert_eq!(variance.variance_value, dec!(600));
    assert_eq!(variance.severity, "low");
    assert_eq!(variance.status, "open");

    // The ledger carries what physically moved, balanced per line
    assert_eq!(
        harness
            .ledger
            .product_on_hand(harness.db.as_ref(), product, warehouse)
            .await
            .unwrap(),
        -45
    );
    assert_eq!(
        harness
            .ledger
            .product_on_hand(harness.db.as_ref(), product, store)
            .await
            .unwrap(),
        45
    );
    harness
        .reconciliation
        .verify_transfer_balanced(harness.db.as_ref(), detail.transfer.id)
        .await
        .unwrap();

    // Investigate and resolve
    let resolved = harness
        .variances
        .investigate(variance.id, resolve_command(), harness.manager())
        .await
        .unwrap();
    assert_eq!(resolved.status, "resolved");
    assert!(resolved.resolved_at.is_some());

    // The resolved variance no longer counts toward anyone's cluster score
    let open = harness.variances.open_variances().await.unwrap();
    assert!(open.iter().all(|v| v.id != variance.id));
}
