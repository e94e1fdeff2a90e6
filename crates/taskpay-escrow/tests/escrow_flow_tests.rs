mod common;

use std::sync::Arc;

use common::{charge_webhook, harness, harness_with, new_task, payer, FailingAuditSink, FakeGateway};
use taskpay_escrow::{EscrowError, Resolution, TaskStatus};
use taskpay_ledger::{Amount, TransactionStatus, TransactionType, UserId};

/// The full happy path: poster creates a 100.00 task, the provider confirms
/// the charge, the doer accepts and completes, the poster confirms. At a 15%
/// fee the doer ends with 85.00 and the platform with 15.00.
#[tokio::test]
async fn end_to_end_payment_scenario() {
    let h = harness(15);
    let poster = UserId::new();
    let doer = UserId::new();

    let (task, intent) = h
        .engine
        .create_task(poster, payer(), new_task(10_000))
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Posted);
    assert!(intent.checkout_url.starts_with("https://"));

    // Provider confirms the escrow charge.
    h.reconciler
        .process(charge_webhook(&intent.tx_ref, "successful"))
        .await
        .unwrap();

    let accepted = h.engine.accept_task(doer, task.id).await.unwrap();
    assert_eq!(accepted.status, TaskStatus::Accepted);
    assert_eq!(accepted.doer_id, Some(doer));

    let completed = h.engine.complete_task(doer, task.id).await.unwrap();
    assert_eq!(completed.status, TaskStatus::Completed);

    let paid = h.engine.confirm_task(poster, task.id).await.unwrap();
    assert_eq!(paid.status, TaskStatus::Paid);

    assert_eq!(
        h.ledger.get_balance(doer).await.unwrap(),
        Amount::from_minor(8_500)
    );
    assert_eq!(
        h.ledger.platform_fee_total().await.unwrap(),
        Amount::from_minor(1_500)
    );
    // Escrow nets to zero per task: nothing lost, nothing stranded.
    assert_eq!(
        h.ledger.escrow_wallet().await.unwrap().balance,
        Amount::ZERO
    );

    // All entries for the task are terminal and the hold carries the
    // provider's reference.
    let entries = h.ledger.transactions_by_task(task.id).await.unwrap();
    assert!(entries
        .iter()
        .all(|tx| tx.status == TransactionStatus::Completed));
    let hold = entries
        .iter()
        .find(|tx| tx.tx_type == TransactionType::EscrowHold)
        .unwrap();
    assert_eq!(hold.provider_ref.as_deref(), Some("FLW-MOCK-1"));
}

/// Fee conservation: fee + doer share equal the task fee exactly, for edge
/// percents and a one-minor-unit fee.
#[tokio::test]
async fn fee_conservation_at_edge_values() {
    for (fee_percent, fee_minor, expected_fee, expected_doer) in [
        (0u8, 10_000i64, 0i64, 10_000i64),
        (100, 10_000, 10_000, 0),
        (15, 1, 0, 1),
        (33, 100, 33, 67),
    ] {
        let h = harness(fee_percent);
        let poster = UserId::new();
        let doer = UserId::new();

        let (task, intent) = h
            .engine
            .create_task(poster, payer(), new_task(fee_minor))
            .await
            .unwrap();
        h.reconciler
            .process(charge_webhook(&intent.tx_ref, "successful"))
            .await
            .unwrap();
        h.engine.accept_task(doer, task.id).await.unwrap();
        h.engine.complete_task(doer, task.id).await.unwrap();
        h.engine.confirm_task(poster, task.id).await.unwrap();

        assert_eq!(
            h.ledger.get_balance(doer).await.unwrap(),
            Amount::from_minor(expected_doer),
            "doer share at {}%",
            fee_percent
        );
        assert_eq!(
            h.ledger.platform_fee_total().await.unwrap(),
            Amount::from_minor(expected_fee),
            "fee at {}%",
            fee_percent
        );
        assert_eq!(
            h.ledger.escrow_wallet().await.unwrap().balance,
            Amount::ZERO
        );
    }
}

/// Two concurrent accepts: exactly one wins, the loser gets Conflict, and
/// the recorded doer is the winner.
#[tokio::test]
async fn accept_race_has_exactly_one_winner() {
    let h = harness(15);
    let poster = UserId::new();
    let doer_a = UserId::new();
    let doer_b = UserId::new();

    let (task, _) = h
        .engine
        .create_task(poster, payer(), new_task(5_000))
        .await
        .unwrap();

    let engine_a = h.engine.clone();
    let engine_b = h.engine.clone();
    let (res_a, res_b) = tokio::join!(
        tokio::spawn(async move { engine_a.accept_task(doer_a, task.id).await }),
        tokio::spawn(async move { engine_b.accept_task(doer_b, task.id).await }),
    );
    let res_a = res_a.unwrap();
    let res_b = res_b.unwrap();

    let (winner_result, loser_result, winner) = if res_a.is_ok() {
        (res_a, res_b, doer_a)
    } else {
        (res_b, res_a, doer_b)
    };

    let won = winner_result.unwrap();
    assert_eq!(won.doer_id, Some(winner));
    assert!(matches!(
        loser_result.unwrap_err(),
        EscrowError::Conflict(_)
    ));

    let task = h.engine.get_task(task.id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Accepted);
    assert_eq!(task.doer_id, Some(winner));
}

#[tokio::test]
async fn poster_cannot_accept_own_task() {
    let h = harness(15);
    let poster = UserId::new();
    let (task, _) = h
        .engine
        .create_task(poster, payer(), new_task(5_000))
        .await
        .unwrap();

    assert!(matches!(
        h.engine.accept_task(poster, task.id).await.unwrap_err(),
        EscrowError::Forbidden(_)
    ));
}

/// Cancelling a POSTED task whose hold already completed refunds the poster
/// exactly the task fee.
#[tokio::test]
async fn cancel_after_funded_hold_refunds_poster() {
    let h = harness(15);
    let poster = UserId::new();

    let (task, intent) = h
        .engine
        .create_task(poster, payer(), new_task(10_000))
        .await
        .unwrap();
    h.reconciler
        .process(charge_webhook(&intent.tx_ref, "successful"))
        .await
        .unwrap();

    let before = h.ledger.get_balance(poster).await.unwrap();
    let cancelled = h.engine.cancel_task(poster, task.id).await.unwrap();

    assert_eq!(cancelled.status, TaskStatus::Cancelled);
    assert_eq!(cancelled.doer_id, None);
    assert_eq!(
        h.ledger.get_balance(poster).await.unwrap(),
        before.checked_add(Amount::from_minor(10_000)).unwrap()
    );
    assert_eq!(
        h.ledger.escrow_wallet().await.unwrap().balance,
        Amount::ZERO
    );

    // The refund uses the canonical REFUND type.
    let entries = h.ledger.transactions_by_task(task.id).await.unwrap();
    assert!(entries
        .iter()
        .any(|tx| tx.tx_type == TransactionType::Refund && tx.amount.is_positive()));
}

/// Cancelling before the charge confirms fails the hold instead; no balance
/// moves anywhere.
#[tokio::test]
async fn cancel_before_funding_fails_the_hold() {
    let h = harness(15);
    let poster = UserId::new();

    let (task, intent) = h
        .engine
        .create_task(poster, payer(), new_task(10_000))
        .await
        .unwrap();

    h.engine.cancel_task(poster, task.id).await.unwrap();

    let hold = h.ledger.get_transaction(intent.hold_tx_id).await.unwrap().unwrap();
    assert_eq!(hold.status, TransactionStatus::Failed);
    assert_eq!(h.ledger.get_balance(poster).await.unwrap(), Amount::ZERO);
    assert_eq!(
        h.ledger.escrow_wallet().await.unwrap().balance,
        Amount::ZERO
    );

    // A late charge webhook for the cancelled task must not resurrect the
    // hold: settlement is terminal.
    h.reconciler
        .process(charge_webhook(&intent.tx_ref, "successful"))
        .await
        .unwrap();
    let hold = h.ledger.get_transaction(intent.hold_tx_id).await.unwrap().unwrap();
    assert_eq!(hold.status, TransactionStatus::Failed);
    assert_eq!(
        h.ledger.escrow_wallet().await.unwrap().balance,
        Amount::ZERO
    );
}

#[tokio::test]
async fn accepted_task_cannot_be_cancelled_by_poster() {
    let h = harness(15);
    let poster = UserId::new();
    let doer = UserId::new();

    let (task, intent) = h
        .engine
        .create_task(poster, payer(), new_task(10_000))
        .await
        .unwrap();
    h.reconciler
        .process(charge_webhook(&intent.tx_ref, "successful"))
        .await
        .unwrap();
    h.engine.accept_task(doer, task.id).await.unwrap();

    assert!(matches!(
        h.engine.cancel_task(poster, task.id).await.unwrap_err(),
        EscrowError::Conflict(_)
    ));
    let task = h.engine.get_task(task.id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Accepted);
}

/// A user who is neither poster nor doer gets Forbidden and nothing changes.
#[tokio::test]
async fn unauthorized_transitions_are_forbidden() {
    let h = harness(15);
    let poster = UserId::new();
    let doer = UserId::new();
    let stranger = UserId::new();

    let (task, intent) = h
        .engine
        .create_task(poster, payer(), new_task(10_000))
        .await
        .unwrap();
    h.reconciler
        .process(charge_webhook(&intent.tx_ref, "successful"))
        .await
        .unwrap();
    h.engine.accept_task(doer, task.id).await.unwrap();

    assert!(matches!(
        h.engine.complete_task(stranger, task.id).await.unwrap_err(),
        EscrowError::Forbidden(_)
    ));
    assert!(matches!(
        h.engine.cancel_task(stranger, task.id).await.unwrap_err(),
        EscrowError::Forbidden(_)
    ));

    h.engine.complete_task(doer, task.id).await.unwrap();
    assert!(matches!(
        h.engine.confirm_task(stranger, task.id).await.unwrap_err(),
        EscrowError::Forbidden(_)
    ));
    // The poster cannot mark their own task completed either.
    assert!(matches!(
        h.engine.complete_task(poster, task.id).await.unwrap_err(),
        EscrowError::Forbidden(_)
    ));

    let task = h.engine.get_task(task.id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(h.ledger.get_balance(doer).await.unwrap(), Amount::ZERO);
}

/// Confirming before the provider confirmed the charge is a Conflict, and
/// no money moves. Unfunded escrow can never be released.
#[tokio::test]
async fn confirm_requires_funded_hold() {
    let h = harness(15);
    let poster = UserId::new();
    let doer = UserId::new();

    let (task, intent) = h
        .engine
        .create_task(poster, payer(), new_task(10_000))
        .await
        .unwrap();
    h.engine.accept_task(doer, task.id).await.unwrap();
    h.engine.complete_task(doer, task.id).await.unwrap();

    assert!(matches!(
        h.engine.confirm_task(poster, task.id).await.unwrap_err(),
        EscrowError::Conflict(_)
    ));
    let task_state = h.engine.get_task(task.id).await.unwrap();
    assert_eq!(task_state.status, TaskStatus::Completed);
    assert_eq!(h.ledger.get_balance(doer).await.unwrap(), Amount::ZERO);

    // Once the webhook lands, confirmation goes through.
    h.reconciler
        .process(charge_webhook(&intent.tx_ref, "successful"))
        .await
        .unwrap();
    h.engine.confirm_task(poster, task.id).await.unwrap();
    assert_eq!(
        h.ledger.get_balance(doer).await.unwrap(),
        Amount::from_minor(8_500)
    );
}

/// Confirming twice: the second confirm hits the PAID state and gets
/// Conflict; the doer is credited exactly once.
#[tokio::test]
async fn double_confirm_releases_once() {
    let h = harness(15);
    let poster = UserId::new();
    let doer = UserId::new();

    let (task, intent) = h
        .engine
        .create_task(poster, payer(), new_task(10_000))
        .await
        .unwrap();
    h.reconciler
        .process(charge_webhook(&intent.tx_ref, "successful"))
        .await
        .unwrap();
    h.engine.accept_task(doer, task.id).await.unwrap();
    h.engine.complete_task(doer, task.id).await.unwrap();

    h.engine.confirm_task(poster, task.id).await.unwrap();
    assert!(matches!(
        h.engine.confirm_task(poster, task.id).await.unwrap_err(),
        EscrowError::Conflict(_)
    ));

    assert_eq!(
        h.ledger.get_balance(doer).await.unwrap(),
        Amount::from_minor(8_500)
    );
}

/// Replayed charge webhooks settle the hold exactly once.
#[tokio::test]
async fn replayed_charge_webhook_is_idempotent() {
    let h = harness(15);
    let poster = UserId::new();

    let (_, intent) = h
        .engine
        .create_task(poster, payer(), new_task(10_000))
        .await
        .unwrap();

    for _ in 0..3 {
        h.reconciler
            .process(charge_webhook(&intent.tx_ref, "successful"))
            .await
            .unwrap();
    }

    assert_eq!(
        h.ledger.escrow_wallet().await.unwrap().balance,
        Amount::from_minor(10_000)
    );
}

/// Unsuccessful charge events and unknown event types are ignored.
#[tokio::test]
async fn non_successful_and_unknown_events_are_ignored() {
    let h = harness(15);
    let poster = UserId::new();

    let (_, intent) = h
        .engine
        .create_task(poster, payer(), new_task(10_000))
        .await
        .unwrap();

    h.reconciler
        .process(charge_webhook(&intent.tx_ref, "failed"))
        .await
        .unwrap();
    let hold = h.ledger.get_transaction(intent.hold_tx_id).await.unwrap().unwrap();
    assert_eq!(hold.status, TransactionStatus::Pending);

    h.reconciler
        .process(taskpay_gateway::WebhookPayload {
            event: "subscription.cancelled".into(),
            data: serde_json::json!({}),
        })
        .await
        .unwrap();

    // A charge event with a reference we never issued is ignored too.
    h.reconciler
        .process(charge_webhook("order_999", "successful"))
        .await
        .unwrap();
}

/// Charge initiation failure leaves the task POSTED with a PENDING hold:
/// a well-defined, reconcilable state.
#[tokio::test]
async fn gateway_failure_on_create_leaves_pending_hold() {
    let h = harness_with(
        Arc::new(FakeGateway {
            fail_charges: true,
            ..Default::default()
        }),
        15,
    );
    let poster = UserId::new();

    let err = h
        .engine
        .create_task(poster, payer(), new_task(10_000))
        .await
        .unwrap_err();
    assert!(matches!(err, EscrowError::Provider(_)));

    // The task and its hold exist; the hold is PENDING and balance is
    // untouched everywhere.
    let open = h.engine.open_tasks(10).await.unwrap();
    assert_eq!(open.len(), 1);
    let entries = h.ledger.transactions_by_task(open[0].id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, TransactionStatus::Pending);
    assert_eq!(
        h.ledger.escrow_wallet().await.unwrap().balance,
        Amount::ZERO
    );
}

#[tokio::test]
async fn create_task_validation() {
    let h = harness(15);
    let poster = UserId::new();

    let mut bad = new_task(10_000);
    bad.title = "   ".into();
    assert!(matches!(
        h.engine.create_task(poster, payer(), bad).await.unwrap_err(),
        EscrowError::Validation(_)
    ));

    assert!(matches!(
        h.engine
            .create_task(poster, payer(), new_task(0))
            .await
            .unwrap_err(),
        EscrowError::Validation(_)
    ));
}

/// Admin resolution to PAID from ACCEPTED pays the doer through the normal
/// release operation and records the audit action.
#[tokio::test]
async fn admin_resolution_paid_releases_and_audits() {
    let h = harness(15);
    let poster = UserId::new();
    let doer = UserId::new();
    let admin = UserId::new();

    let (task, intent) = h
        .engine
        .create_task(poster, payer(), new_task(10_000))
        .await
        .unwrap();
    h.reconciler
        .process(charge_webhook(&intent.tx_ref, "successful"))
        .await
        .unwrap();
    h.engine.accept_task(doer, task.id).await.unwrap();

    let resolved = h
        .engine
        .resolve_task(admin, task.id, Resolution::Paid, "poster unreachable for 14 days")
        .await
        .unwrap();
    assert_eq!(resolved.task.status, TaskStatus::Paid);
    assert!(!resolved.audit.is_degraded());
    assert_eq!(
        h.ledger.get_balance(doer).await.unwrap(),
        Amount::from_minor(8_500)
    );

    let actions = h.audit.actions().await;
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].admin_id, admin);
    assert_eq!(actions[0].task_id, task.id);
    assert_eq!(actions[0].reason, "poster unreachable for 14 days");
}

#[tokio::test]
async fn admin_resolution_cancelled_refunds_poster() {
    let h = harness(15);
    let poster = UserId::new();
    let doer = UserId::new();
    let admin = UserId::new();

    let (task, intent) = h
        .engine
        .create_task(poster, payer(), new_task(10_000))
        .await
        .unwrap();
    h.reconciler
        .process(charge_webhook(&intent.tx_ref, "successful"))
        .await
        .unwrap();
    h.engine.accept_task(doer, task.id).await.unwrap();
    h.engine.complete_task(doer, task.id).await.unwrap();

    let resolved = h
        .engine
        .resolve_task(admin, task.id, Resolution::Cancelled, "work disputed, refunding")
        .await
        .unwrap();
    assert_eq!(resolved.task.status, TaskStatus::Cancelled);
    assert_eq!(
        h.ledger.get_balance(poster).await.unwrap(),
        Amount::from_minor(10_000)
    );
    assert_eq!(h.ledger.get_balance(doer).await.unwrap(), Amount::ZERO);
}

#[tokio::test]
async fn admin_resolution_requires_reason() {
    let h = harness(15);
    let admin = UserId::new();
    let poster = UserId::new();

    let (task, _) = h
        .engine
        .create_task(poster, payer(), new_task(10_000))
        .await
        .unwrap();

    assert!(matches!(
        h.engine
            .resolve_task(admin, task.id, Resolution::Cancelled, "   ")
            .await
            .unwrap_err(),
        EscrowError::Validation(_)
    ));
    // Nothing happened without a reason.
    assert_eq!(
        h.engine.get_task(task.id).await.unwrap().status,
        TaskStatus::Posted
    );
    assert!(h.audit.actions().await.is_empty());
}

#[tokio::test]
async fn admin_resolution_rejects_terminal_and_unpayable_tasks() {
    let h = harness(15);
    let admin = UserId::new();
    let poster = UserId::new();

    let (task, _) = h
        .engine
        .create_task(poster, payer(), new_task(10_000))
        .await
        .unwrap();

    // POSTED task has no doer: cannot be resolved to PAID.
    assert!(matches!(
        h.engine
            .resolve_task(admin, task.id, Resolution::Paid, "pay out")
            .await
            .unwrap_err(),
        EscrowError::Validation(_)
    ));

    h.engine.cancel_task(poster, task.id).await.unwrap();
    assert!(matches!(
        h.engine
            .resolve_task(admin, task.id, Resolution::Cancelled, "cancel again")
            .await
            .unwrap_err(),
        EscrowError::Conflict(_)
    ));
}

/// Audit sink failure does not block the resolution; it surfaces as a
/// degraded-mode warning on the result.
#[tokio::test]
async fn audit_failure_degrades_but_does_not_block() {
    let ledger = Arc::new(taskpay_ledger::LedgerManager::new(
        Arc::new(taskpay_ledger::MemoryLedgerStorage::new()),
        "NGN",
    ));
    let engine = Arc::new(taskpay_escrow::EscrowEngine::new(
        ledger.clone(),
        Arc::new(taskpay_escrow::MemoryTaskStore::new()),
        Arc::new(FakeGateway::default()),
        Arc::new(FailingAuditSink),
        taskpay_escrow::EscrowConfig {
            platform_fee_percent: 15,
        },
    ));
    let reconciler = taskpay_escrow::WebhookReconciler::new(ledger.clone());

    let poster = UserId::new();
    let doer = UserId::new();
    let admin = UserId::new();

    let (task, intent) = engine
        .create_task(poster, payer(), new_task(10_000))
        .await
        .unwrap();
    reconciler
        .process(charge_webhook(&intent.tx_ref, "successful"))
        .await
        .unwrap();
    engine.accept_task(doer, task.id).await.unwrap();

    let resolved = engine
        .resolve_task(admin, task.id, Resolution::Paid, "doer provided proof of work")
        .await
        .unwrap();

    assert_eq!(resolved.task.status, TaskStatus::Paid);
    assert!(resolved.audit.is_degraded());
    assert_eq!(
        ledger.get_balance(doer).await.unwrap(),
        Amount::from_minor(8_500)
    );
}
