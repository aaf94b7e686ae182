//! Shared utilities for integration tests.
//!
//! - `MockNode`: scripted in-memory `NodeClient`
//! - `RecordingSink`: captures progress lines with timestamps
//! - `start_mock_relay`: raw TCP relay that records requests

#![allow(dead_code)]

use alloy::consensus::{Transaction, TxEnvelope};
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use futures_util::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::Instant;

use block_deposit::blockchain::types::{BlockStream, BlockchainError, BlockchainResult, TransactionReceipt};
use block_deposit::broadcast::{BroadcastGateway, DirectBroadcast};
use block_deposit::config::{DecimalValue, DepositConfig, SubmissionMode};
use block_deposit::deposit::{DepositEngine, DepositTask, ProgressSink};
use block_deposit::NodeClient;

/// Anvil's first development key.
pub const ANVIL_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// `approve(address,uint256)` selector.
pub const APPROVE_SELECTOR: [u8; 4] = [0x09, 0x5e, 0xa7, 0xb3];

/// `deposit(uint256)` selector.
pub const DEPOSIT_SELECTOR: [u8; 4] = [0xb6, 0xb5, 0x5f, 0x25];

/// A transaction the mock node accepted.
#[derive(Debug, Clone)]
pub struct SentTx {
    pub hash: TxHash,
    pub to: Option<Address>,
    pub nonce: u64,
    pub input: Bytes,
}

impl SentTx {
    pub fn is_approval(&self) -> bool {
        self.input.starts_with(&APPROVE_SELECTOR)
    }

    pub fn is_deposit(&self) -> bool {
        self.input.starts_with(&DEPOSIT_SELECTOR)
    }
}

/// Mutable, scriptable node state.
#[derive(Debug)]
pub struct MockState {
    pub chain_id: u64,
    pub block_number: u64,
    pub allowance: U256,
    /// Error returned by the next `allowance` call.
    pub allowance_failure: Option<BlockchainError>,
    pub tx_count: u64,
    /// Failures returned by the next `estimate_gas` calls, in order.
    pub estimate_failures: VecDeque<BlockchainError>,
    /// Fail every simulation.
    pub always_revert: bool,
    /// Failures returned by the next `send_raw_transaction` calls, in order.
    pub send_failures: VecDeque<BlockchainError>,
    /// Receipt polls answered with "pending" before a receipt appears.
    pub receipt_pending_polls: u32,
    /// Whether mined transactions succeed.
    pub receipt_success: bool,
    /// Nonces seen by `estimate_gas`.
    pub estimated_nonces: Vec<u64>,
    /// Accepted transactions, in order.
    pub sent: Vec<SentTx>,
    /// Call log, e.g. `send:approve`, `receipt:mined`.
    pub events: Vec<String>,
    receipts: HashMap<TxHash, u64>,
    pending_polls: u32,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            chain_id: 42161,
            block_number: 100,
            allowance: U256::ZERO,
            allowance_failure: None,
            tx_count: 0,
            estimate_failures: VecDeque::new(),
            always_revert: false,
            send_failures: VecDeque::new(),
            receipt_pending_polls: 0,
            receipt_success: true,
            estimated_nonces: Vec::new(),
            sent: Vec::new(),
            events: Vec::new(),
            receipts: HashMap::new(),
            pending_polls: 0,
        }
    }
}

/// In-memory `NodeClient`.
pub struct MockNode {
    state: Mutex<MockState>,
    blocks: Mutex<Option<mpsc::UnboundedReceiver<u64>>>,
}

/// Test side of the block subscription.
#[derive(Clone)]
pub struct BlockFeed {
    tx: mpsc::UnboundedSender<u64>,
}

impl BlockFeed {
    pub fn push(&self, number: u64) {
        let _ = self.tx.send(number);
    }

    /// Whether the subscriber dropped its stream.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl MockNode {
    pub fn new() -> (Arc<Self>, BlockFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        let node = Arc::new(Self {
            state: Mutex::new(MockState::default()),
            blocks: Mutex::new(Some(rx)),
        });
        (node, BlockFeed { tx })
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn sent(&self) -> Vec<SentTx> {
        self.state().sent.clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.state().events.clone()
    }

    pub fn subscribed(&self) -> bool {
        self.blocks.lock().unwrap().is_none()
    }
}

#[async_trait]
impl NodeClient for MockNode {
    async fn chain_id(&self) -> BlockchainResult<u64> {
        Ok(self.state().chain_id)
    }

    async fn block_number(&self) -> BlockchainResult<u64> {
        Ok(self.state().block_number)
    }

    async fn allowance(&self, _token: Address, _owner: Address, _spender: Address) -> BlockchainResult<U256> {
        let mut state = self.state();
        state.events.push("allowance".to_string());
        match state.allowance_failure.take() {
            Some(error) => Err(error),
            None => Ok(state.allowance),
        }
    }

    async fn transaction_count(&self, _address: Address) -> BlockchainResult<u64> {
        let mut state = self.state();
        state.events.push("transaction_count".to_string());
        Ok(state.tx_count)
    }

    async fn estimate_gas(&self, request: &TransactionRequest) -> BlockchainResult<u64> {
        let mut state = self.state();
        state.estimated_nonces.push(request.nonce.unwrap_or_default());
        state.events.push("estimate".to_string());

        if state.always_revert {
            return Err(BlockchainError::RpcRejected {
                code: 3,
                message: "execution reverted".to_string(),
            });
        }
        match state.estimate_failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(120_000),
        }
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> BlockchainResult<TxHash> {
        let mut state = self.state();

        if let Some(error) = state.send_failures.pop_front() {
            state.events.push("send:rejected".to_string());
            return Err(error);
        }

        let envelope = TxEnvelope::decode_2718(&mut &raw[..])
            .map_err(|e| BlockchainError::RpcRejected { code: -32602, message: e.to_string() })?;

        let sent = SentTx {
            hash: *envelope.tx_hash(),
            to: envelope.to(),
            nonce: envelope.nonce(),
            input: envelope.input().clone(),
        };

        let label = if sent.is_approval() { "send:approve" } else { "send:deposit" };
        state.events.push(label.to_string());

        // Mined immediately as far as the nonce is concerned
        state.tx_count = sent.nonce + 1;
        let block = state.block_number + 1;
        state.receipts.insert(sent.hash, block);
        state.pending_polls = state.receipt_pending_polls;

        let hash = sent.hash;
        state.sent.push(sent);
        Ok(hash)
    }

    async fn transaction_receipt(&self, tx_hash: TxHash) -> BlockchainResult<Option<TransactionReceipt>> {
        let mut state = self.state();

        if state.pending_polls > 0 {
            state.pending_polls -= 1;
            state.events.push("receipt:pending".to_string());
            return Ok(None);
        }

        let Some(block) = state.receipts.get(&tx_hash).copied() else {
            return Ok(None);
        };

        state.events.push("receipt:mined".to_string());
        Ok(Some(TransactionReceipt {
            transaction_hash: tx_hash,
            accepted: state.receipt_success,
            block_number: Some(block),
        }))
    }

    async fn subscribe_blocks(&self) -> BlockchainResult<BlockStream> {
        let rx = self
            .blocks
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| BlockchainError::Network("already subscribed".to_string()))?;

        self.state().events.push("subscribe".to_string());

        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|number| (number, rx))
        });
        Ok(stream.boxed())
    }
}

/// Sink that records every line with the (tokio) time it was reported.
#[derive(Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<(Instant, String)>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().iter().map(|(_, l)| l.clone()).collect()
    }

    pub fn timed_lines(&self, needle: &str) -> Vec<Instant> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, l)| l.contains(needle))
            .map(|(at, _)| *at)
            .collect()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.lines().iter().filter(|l| l.contains(needle)).count()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn progress(&self, line: &str) {
        self.lines.lock().unwrap().push((Instant::now(), line.to_string()));
    }

    fn error(&self, line: &str) {
        self.errors.lock().unwrap().push(line.to_string());
    }
}

/// Config for a 100-token deposit (100_000000 base units).
pub fn test_config(mode: SubmissionMode) -> DepositConfig {
    let mut config = DepositConfig::default();
    config.deposit.amount = DecimalValue::from("100");
    config.deposit.mode = mode;
    config.node.receipt_poll_interval_ms = 100;
    config.node.approval_timeout_secs = 30;
    config
}

pub fn test_task(mode: SubmissionMode) -> DepositTask {
    DepositTask::from_config(&test_config(mode), ANVIL_KEY).unwrap()
}

/// Engine over `node` with direct broadcast and a recording sink.
pub fn direct_engine(node: Arc<MockNode>, task: DepositTask, sink: Arc<RecordingSink>) -> DepositEngine {
    let gateway = BroadcastGateway::Direct(DirectBroadcast::new(node.clone(), Duration::from_secs(15)));
    DepositEngine::new(task, node, gateway).with_sink(sink)
}

/// Poll `condition` every 10ms (tokio time) until it holds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    while !condition() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// A request received by the mock relay.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    /// Header names are lower-cased.
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// Start a mock relay on an ephemeral port that answers every request
/// with `(status, body)` and records what it received.
pub async fn start_mock_relay(status: u16, body: &'static str) -> (SocketAddr, Arc<Mutex<Vec<CapturedRequest>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let captured = Arc::new(Mutex::new(Vec::new()));
    let log = captured.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let log = log.clone();
                    tokio::spawn(async move {
                        if let Some(request) = read_request(&mut socket).await {
                            log.lock().unwrap().push(request);
                        }

                        let status_text = match status {
                            200 => "200 OK",
                            401 => "401 Unauthorized",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, captured)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<CapturedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut headers = HashMap::new();
    for line in head.lines().skip(1) {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_lowercase(), value.trim().to_string());
        }
    }

    let content_length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();
    Some(CapturedRequest { headers, body })
}
