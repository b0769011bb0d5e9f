
use std::{sync::Arc, time::Duration};

use alloy::primitives::{Address, Bytes, U256};
use fixtures::{DEV_KEY, MineMode, MockChain};
use relay_core::{
    signer::{LocalTransactionSigner, TransactionSigner},
    transaction::TxRequest,
};
use relay_engine::{EngineConfig, Status, Transactor};
use relay_queue::{DurableQueue, MemoryQueue};

fn stale_config() -> EngineConfig {
    EngineConfig {
        tx_batch_size: 2,
        tx_batch_timeout_ms: 50,
        empty_queue_delay_ms: 20,
        // Short loss window so a vanished transaction goes stale quickly.
        mempool_timeout_ms: 100,
        receipt_timeout_ms: 5_000,
        poll_interval_ms: 20,
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_vanished_transaction_is_replaced_with_bumped_fees() {
    fixtures::setup_tracing();
    let signer = Arc::new(LocalTransactionSigner::from_hex_key(DEV_KEY).unwrap());
    let chain = Arc::new(MockChain::new(signer.address(), 0));
    chain.set_mode(MineMode::Vanish);
    let queue = Arc::new(MemoryQueue::new());

    let transactor =
        Transactor::start(stale_config(), chain.clone(), signer, queue.clone()).await;
    let mut results = transactor.subscribe_tx_results().await;

    transactor
        .send_tx_request(TxRequest::new(
            Address::repeat_byte(0x11),
            U256::from(1u64),
            Bytes::new(),
        ))
        .await
        .unwrap();

    // First pass never reaches the mempool and times out stale. Let the
    // replacement land normally.
    let stale = tokio::time::timeout(Duration::from_secs(5), results.rx.recv())
        .await
        .expect("no stale event")
        .expect("dispatcher dropped");
    assert_eq!(stale.status(), Status::Stale);
    chain.set_mode(MineMode::Mine { success: true });

    // Replacements keep going stale until the mode flip takes effect; the
    // final event is the confirmation.
    let confirmed = loop {
        let event = tokio::time::timeout(Duration::from_secs(10), results.rx.recv())
            .await
            .expect("no further events")
            .expect("dispatcher dropped");
        match event.status() {
            Status::Stale => continue,
            status => break (event, status),
        }
    };
    assert_eq!(confirmed.1, Status::Success);

    let records = chain.records();
    assert!(records.len() >= 2, "expected at least one replacement");

    // Every replacement reuses the nonce and bumps both fee caps by 15%.
    for pair in records.windows(2) {
        assert_eq!(pair[1].nonce, pair[0].nonce);
        assert_eq!(pair[1].max_fee_per_gas, pair[0].max_fee_per_gas * 115 / 100);
        assert_eq!(
            pair[1].max_priority_fee_per_gas,
            pair[0].max_priority_fee_per_gas * 115 / 100
        );
        assert_ne!(pair[1].hash, pair[0].hash);
    }

    // The confirmed replacement acks the original queue message.
    assert_eq!(queue.len().await.unwrap(), 0);

    transactor.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_queued_mempool_position_goes_stale_immediately() {
    fixtures::setup_tracing();
    let signer = Arc::new(LocalTransactionSigner::from_hex_key(DEV_KEY).unwrap());
    let chain = Arc::new(MockChain::new(signer.address(), 3));
    chain.set_mode(MineMode::Queued);
    let queue = Arc::new(MemoryQueue::new());

    let config = EngineConfig {
        // Long loss window: the queued position must short-circuit it.
        mempool_timeout_ms: 60_000,
        ..stale_config()
    };
    let transactor = Transactor::start(config, chain.clone(), signer, queue).await;
    let mut results = transactor.subscribe_tx_results().await;

    transactor
        .send_tx_request(TxRequest::new(
            Address::repeat_byte(0x22),
            U256::ZERO,
            Bytes::new(),
        ))
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), results.rx.recv())
        .await
        .expect("queued transaction never went stale")
        .expect("dispatcher dropped");
    assert_eq!(event.status(), Status::Stale);

    transactor.shutdown().await;
}
