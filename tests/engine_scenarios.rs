//! End-to-end scenarios for the deposit engine against a scripted node.

use alloy::primitives::U256;
use std::time::Duration;

use block_deposit::blockchain::types::BlockchainError;
use block_deposit::config::SubmissionMode;
use block_deposit::deposit::{DepositError, Phase, StopReason};

mod common;
use common::{direct_engine, test_task, wait_until, MockNode, RecordingSink};

fn revert() -> BlockchainError {
    BlockchainError::RpcRejected {
        code: 3,
        message: "execution reverted: vault closed".to_string(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_sufficient_allowance_skips_approval() {
    let (node, blocks) = MockNode::new();
    node.state().allowance = U256::MAX;
    node.state().tx_count = 7;
    let sink = RecordingSink::new();
    let task = test_task(SubmissionMode::SingleShot);
    let target = task.target;

    let handle = direct_engine(node.clone(), task, sink.clone()).start();
    blocks.push(101);
    let outcome = handle.join().await;

    assert!(matches!(outcome.reason, StopReason::Completed));
    assert_eq!(outcome.submissions.len(), 1);
    assert_eq!(outcome.nonce_cursor, Some(8));

    let sent = node.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].is_deposit());
    assert_eq!(sent[0].to, Some(target));
    assert_eq!(sent[0].nonce, 7);
    assert_eq!(sent[0].hash, outcome.submissions[0]);

    assert!(!node.events().iter().any(|e| e == "send:approve"));
    assert_eq!(sink.count("sending approval"), 0);
    assert_eq!(sink.count("new block 101, attempting deposit"), 1);
    assert_eq!(sink.count("deposit sent, tx hash"), 1);
    assert!(sink.errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_zero_allowance_approves_once_before_deposit() {
    let (node, blocks) = MockNode::new();
    node.state().receipt_pending_polls = 2;
    let sink = RecordingSink::new();
    let task = test_task(SubmissionMode::SingleShot);
    assert_eq!(task.amount, U256::from(100_000_000u64));
    let token = task.token;

    let handle = direct_engine(node.clone(), task, sink.clone()).start();
    blocks.push(101);
    let outcome = handle.join().await;

    assert!(matches!(outcome.reason, StopReason::Completed));

    let sent = node.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent[0].is_approval());
    assert_eq!(sent[0].to, Some(token));
    assert_eq!(sent[0].nonce, 0);
    // Maximal approval: last word of the calldata is U256::MAX
    assert_eq!(U256::from_be_slice(&sent[0].input[36..68]), U256::MAX);
    assert!(sent[1].is_deposit());
    assert_eq!(sent[1].nonce, 1);

    let events = node.events();
    let approvals = events.iter().filter(|e| *e == "send:approve").count();
    let mined = events.iter().position(|e| e == "receipt:mined").unwrap();
    let deposit = events.iter().position(|e| e == "send:deposit").unwrap();
    assert_eq!(approvals, 1);
    assert!(events.iter().filter(|e| *e == "receipt:pending").count() >= 2);
    assert!(mined < deposit);

    assert_eq!(sink.count("approval sent, tx hash"), 1);
    assert_eq!(sink.count("approval confirmed in block"), 1);
    assert_eq!(sink.count("current nonce: 1"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_simulation_failures_retry_without_consuming_nonce() {
    let (node, blocks) = MockNode::new();
    node.state().allowance = U256::MAX;
    node.state().estimate_failures.extend([revert(), revert(), revert()]);
    let sink = RecordingSink::new();

    let handle = direct_engine(node.clone(), test_task(SubmissionMode::SingleShot), sink.clone()).start();
    blocks.push(200);
    let outcome = handle.join().await;

    assert!(matches!(outcome.reason, StopReason::Completed));
    assert_eq!(node.state().estimated_nonces, vec![0, 0, 0, 0]);
    assert_eq!(node.sent().len(), 1);
    assert_eq!(node.sent()[0].nonce, 0);
    assert_eq!(outcome.nonce_cursor, Some(1));

    let retries = sink.timed_lines("retrying in 1000ms");
    assert_eq!(retries.len(), 3);
    for pair in retries.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(1000));
    }

    // Retries stay in the block that triggered them
    assert_eq!(sink.count("new block"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_retry_scheduled() {
    let (node, blocks) = MockNode::new();
    node.state().allowance = U256::MAX;
    node.state().always_revert = true;
    let sink = RecordingSink::new();

    let mut handle = direct_engine(node.clone(), test_task(SubmissionMode::Recurring), sink.clone()).start();
    blocks.push(300);

    let phase = handle
        .wait_for_phase(|phase| matches!(phase, Phase::RetryScheduled { .. }))
        .await;
    assert_eq!(phase, Phase::RetryScheduled { block: 300 });

    let simulations = node.state().estimated_nonces.len();
    assert!(handle.stop());
    assert!(!handle.stop());
    assert!(handle.is_stopped());

    tokio::time::sleep(Duration::from_secs(5)).await;
    let outcome = handle.join().await;

    assert!(matches!(outcome.reason, StopReason::Cancelled));
    assert_eq!(node.state().estimated_nonces.len(), simulations);
    assert!(node.sent().is_empty());
    assert!(blocks.is_closed());
    assert_eq!(sink.count("deposit task stopped"), 1);
    assert!(sink.errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_before_start_skips_everything() {
    let (node, _blocks) = MockNode::new();
    let sink = RecordingSink::new();

    let mut handle = direct_engine(node.clone(), test_task(SubmissionMode::Recurring), sink.clone()).start();
    handle.stop();
    handle.finished().await;
    assert_eq!(handle.phase(), Phase::Stopped);

    let outcome = handle.join().await;
    assert!(matches!(outcome.reason, StopReason::Cancelled));
    assert!(!node.subscribed());
    assert!(node.events().is_empty());
    assert_eq!(outcome.nonce_cursor, None);
}

#[tokio::test(start_paused = true)]
async fn test_recurring_mode_uses_consecutive_nonces() {
    let (node, blocks) = MockNode::new();
    node.state().allowance = U256::MAX;
    node.state().tx_count = 3;
    let sink = RecordingSink::new();

    let handle = direct_engine(node.clone(), test_task(SubmissionMode::Recurring), sink.clone()).start();

    blocks.push(400);
    wait_until(|| node.sent().len() == 1).await;
    blocks.push(401);
    wait_until(|| node.sent().len() == 2).await;

    handle.stop();
    let outcome = handle.join().await;

    assert!(matches!(outcome.reason, StopReason::Cancelled));
    let nonces: Vec<u64> = node.sent().iter().map(|tx| tx.nonce).collect();
    assert_eq!(nonces, vec![3, 4]);
    assert_eq!(outcome.submissions.len(), 2);
    assert_eq!(outcome.nonce_cursor, Some(5));
}

#[tokio::test(start_paused = true)]
async fn test_queued_blocks_are_coalesced() {
    let (node, blocks) = MockNode::new();
    node.state().allowance = U256::MAX;
    let sink = RecordingSink::new();

    blocks.push(500);
    blocks.push(501);
    blocks.push(502);

    let handle = direct_engine(node.clone(), test_task(SubmissionMode::SingleShot), sink.clone()).start();
    let outcome = handle.join().await;

    assert!(matches!(outcome.reason, StopReason::Completed));
    assert_eq!(sink.count("new block"), 1);
    assert_eq!(sink.count("new block 502, attempting deposit"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_insufficient_funds_is_fatal() {
    let (node, blocks) = MockNode::new();
    node.state().allowance = U256::MAX;
    node.state().send_failures.push_back(BlockchainError::RpcRejected {
        code: -32000,
        message: "insufficient funds for gas * price + value".to_string(),
    });
    let sink = RecordingSink::new();

    let handle = direct_engine(node.clone(), test_task(SubmissionMode::Recurring), sink.clone()).start();
    blocks.push(600);
    let outcome = handle.join().await;

    assert!(matches!(outcome.error(), Some(DepositError::Broadcast(_))));
    assert_eq!(outcome.nonce_cursor, Some(0));
    assert!(outcome.submissions.is_empty());
    assert_eq!(sink.errors().len(), 1);
    assert!(sink.errors()[0].contains("insufficient funds"));
    assert_eq!(sink.count("retrying in"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_retry_cap_turns_fatal() {
    let (node, blocks) = MockNode::new();
    node.state().allowance = U256::MAX;
    node.state().always_revert = true;
    let sink = RecordingSink::new();

    let mut task = test_task(SubmissionMode::Recurring);
    task.retry.max_retries = Some(2);

    let handle = direct_engine(node.clone(), task, sink.clone()).start();
    blocks.push(700);
    let outcome = handle.join().await;

    match outcome.error() {
        Some(DepositError::RetriesExhausted { attempts, last_error }) => {
            assert_eq!(*attempts, 3);
            assert!(last_error.contains("execution reverted"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(sink.count("retrying in"), 2);
    assert_eq!(node.state().estimated_nonces.len(), 3);
    assert_eq!(sink.errors().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_rejection_retries_same_nonce() {
    let (node, blocks) = MockNode::new();
    node.state().allowance = U256::MAX;
    node.state().send_failures.push_back(BlockchainError::RpcRejected {
        code: -32000,
        message: "replacement transaction underpriced".to_string(),
    });
    node.state().send_failures.push_back(BlockchainError::Network("connection reset".to_string()));
    let sink = RecordingSink::new();

    let handle = direct_engine(node.clone(), test_task(SubmissionMode::SingleShot), sink.clone()).start();
    blocks.push(800);
    let outcome = handle.join().await;

    assert!(matches!(outcome.reason, StopReason::Completed));
    assert_eq!(sink.count("retrying in"), 2);
    assert_eq!(node.sent().len(), 1);
    assert_eq!(node.sent()[0].nonce, 0);
    assert_eq!(outcome.nonce_cursor, Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_nonce_too_low_resyncs_forward() {
    let (node, blocks) = MockNode::new();
    node.state().allowance = U256::MAX;
    let sink = RecordingSink::new();

    let mut handle = direct_engine(node.clone(), test_task(SubmissionMode::SingleShot), sink.clone()).start();
    handle.wait_for_phase(|phase| *phase == Phase::Armed).await;

    // Another sender used nonces 0..5 behind our back
    {
        let mut state = node.state();
        state.tx_count = 5;
        state.send_failures.push_back(BlockchainError::RpcRejected {
            code: -32000,
            message: "nonce too low".to_string(),
        });
    }
    blocks.push(900);
    let outcome = handle.join().await;

    assert!(matches!(outcome.reason, StopReason::Completed));
    assert_eq!(node.sent().len(), 1);
    assert_eq!(node.sent()[0].nonce, 5);
    assert_eq!(outcome.nonce_cursor, Some(6));
}

#[tokio::test(start_paused = true)]
async fn test_already_known_counts_as_submitted() {
    let (node, blocks) = MockNode::new();
    node.state().allowance = U256::MAX;
    node.state().send_failures.push_back(BlockchainError::RpcRejected {
        code: -32000,
        message: "already known".to_string(),
    });
    let sink = RecordingSink::new();

    let handle = direct_engine(node.clone(), test_task(SubmissionMode::SingleShot), sink.clone()).start();
    blocks.push(1000);
    let outcome = handle.join().await;

    assert!(matches!(outcome.reason, StopReason::Completed));
    assert_eq!(outcome.submissions.len(), 1);
    assert_eq!(outcome.nonce_cursor, Some(1));
    assert_eq!(sink.count("retrying in"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reverted_approval_fails_authorization() {
    let (node, blocks) = MockNode::new();
    node.state().receipt_success = false;
    let sink = RecordingSink::new();

    let handle = direct_engine(node.clone(), test_task(SubmissionMode::Recurring), sink.clone()).start();
    blocks.push(1100);
    let outcome = handle.join().await;

    assert!(matches!(outcome.error(), Some(DepositError::AuthorizationFailed(_))));
    let sent = node.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].is_approval());
    assert!(!node.subscribed());
    assert_eq!(sink.errors().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_chain_mismatch_stops_before_authorization() {
    let (node, _blocks) = MockNode::new();
    let sink = RecordingSink::new();

    let mut task = test_task(SubmissionMode::Recurring);
    task.chain_id = Some(1);

    let outcome = direct_engine(node.clone(), task, sink.clone()).start().join().await;

    assert!(matches!(
        outcome.error(),
        Some(DepositError::Chain(BlockchainError::ChainMismatch { expected: 1, actual: 42161 }))
    ));
    assert!(node.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_approval_is_mining() {
    let (node, _blocks) = MockNode::new();
    node.state().receipt_pending_polls = u32::MAX;
    let sink = RecordingSink::new();

    let mut handle = direct_engine(node.clone(), test_task(SubmissionMode::Recurring), sink.clone()).start();
    handle.wait_for_phase(|phase| *phase == Phase::AuthorizingAllowance).await;
    wait_until(|| sink.count("approval sent, tx hash") == 1).await;

    let stopped_at = tokio::time::Instant::now();
    assert!(handle.stop());
    let outcome = handle.join().await;

    assert!(matches!(outcome.reason, StopReason::Cancelled));
    assert!(stopped_at.elapsed() < Duration::from_secs(1));
    assert!(sink.errors().is_empty());
    assert_eq!(sink.count("approval confirmed"), 0);
    assert_eq!(sink.count("deposit task stopped"), 1);
    assert_eq!(outcome.nonce_cursor, None);
    assert!(!node.subscribed());
    // The nonce was read for the approval only, never primed for deposits
    assert_eq!(node.events().iter().filter(|e| *e == "transaction_count").count(), 1);
    assert_eq!(node.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_approval_fails_authorization() {
    let (node, _blocks) = MockNode::new();
    node.state().send_failures.push_back(BlockchainError::RpcRejected {
        code: -32000,
        message: "insufficient funds for gas * price + value".to_string(),
    });
    let sink = RecordingSink::new();

    let outcome = direct_engine(node.clone(), test_task(SubmissionMode::Recurring), sink.clone())
        .start()
        .join()
        .await;

    match outcome.error() {
        Some(DepositError::AuthorizationFailed(message)) => assert!(message.contains("approval rejected")),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(node.sent().is_empty());
    assert!(!node.subscribed());
    assert_eq!(sink.count("approval sent"), 0);
    assert_eq!(sink.errors().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unmined_approval_times_out() {
    let (node, _blocks) = MockNode::new();
    node.state().receipt_pending_polls = u32::MAX;
    let sink = RecordingSink::new();

    let started = tokio::time::Instant::now();
    let outcome = direct_engine(node.clone(), test_task(SubmissionMode::Recurring), sink.clone())
        .start()
        .join()
        .await;

    match outcome.error() {
        Some(DepositError::AuthorizationFailed(message)) => assert!(message.contains("not mined")),
        other => panic!("unexpected outcome: {:?}", other),
    }
    // approval_timeout_secs = 30 in the test config
    assert!(started.elapsed() >= Duration::from_secs(29));
    assert_eq!(node.sent().len(), 1);
    assert!(!node.subscribed());
    assert_eq!(sink.errors().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_allowance_query_failure_fails_authorization() {
    let (node, _blocks) = MockNode::new();
    node.state().allowance_failure = Some(BlockchainError::Network("connection refused".to_string()));
    let sink = RecordingSink::new();

    let outcome = direct_engine(node.clone(), test_task(SubmissionMode::Recurring), sink.clone())
        .start()
        .join()
        .await;

    match outcome.error() {
        Some(DepositError::AuthorizationFailed(message)) => assert!(message.contains("allowance query failed")),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(node.events(), vec!["allowance".to_string()]);
    assert!(!node.subscribed());
    assert_eq!(sink.errors().len(), 1);
}
