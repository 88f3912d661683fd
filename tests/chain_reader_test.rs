mod common;

use common::*;
use ethers::{
    abi::{encode, Token},
    contract::EthEvent,
    types::{Log, TransactionReceipt, H256, U256, U64},
};
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{json, Value};
use std::{
    ops::ControlFlow,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tip_engine::{
    contracts::TransferFilter,
    error::PaymentError,
    models::ReceiptStatus,
    services::{ChainReader, ChainReaderOptions, RpcChainReader},
};
use tokio_test::{assert_err, assert_ok};

fn options(not_found_polls: u32) -> ChainReaderOptions {
    ChainReaderOptions {
        poll_interval: Duration::from_millis(10),
        not_found_polls,
    }
}

fn rpc_body(result: Value) -> String {
    json!({ "jsonrpc": "2.0", "id": 1, "result": result }).to_string()
}

async fn rpc_mock(server: &mut ServerGuard, method: &str, result: Value) -> Mock {
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": method })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(rpc_body(result))
        .create_async()
        .await
}

async fn broken_mock(server: &mut ServerGuard, method: &str) -> Mock {
    server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(json!({ "method": method })))
        .with_status(500)
        .create_async()
        .await
}

fn mined_receipt(hash: H256) -> Value {
    let transfer = Log {
        address: token(),
        topics: vec![
            TransferFilter::signature(),
            H256::from(payer()),
            H256::from(recipient()),
        ],
        data: encode(&[Token::Uint(U256::from(5_000_000u64))]).into(),
        ..Default::default()
    };
    let receipt = TransactionReceipt {
        transaction_hash: hash,
        transaction_index: U64::from(3),
        block_number: Some(U64::from(1234)),
        status: Some(U64::from(1)),
        logs: vec![transfer],
        ..Default::default()
    };
    serde_json::to_value(receipt).unwrap()
}

#[tokio::test]
async fn unknown_transaction_gives_up_after_configured_polls() {
    let mut server = Server::new_async().await;
    rpc_mock(&mut server, "eth_getTransactionReceipt", Value::Null).await;
    let lookups = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJson(
            json!({ "method": "eth_getTransactionByHash" }),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(rpc_body(Value::Null))
        .expect(3)
        .create_async()
        .await;

    let reader = RpcChainReader::new(&server.url(), None, options(3)).unwrap();

    let err = assert_err!(reader.get_receipt(tx_hash(1)).await);
    assert_eq!(
        err,
        PaymentError::TransactionNotFound(format!("{:?}", tx_hash(1)))
    );
    lookups.assert_async().await;
}

#[tokio::test]
async fn receipt_is_returned_once_mined() {
    let mut server = Server::new_async().await;
    rpc_mock(&mut server, "eth_getTransactionReceipt", Value::Null).await;
    rpc_mock(&mut server, "eth_getTransactionReceipt", mined_receipt(tx_hash(2))).await;
    rpc_mock(&mut server, "eth_getTransactionByHash", Value::Null).await;

    let reader = RpcChainReader::new(&server.url(), None, options(3)).unwrap();

    let receipt = assert_ok!(reader.get_receipt(tx_hash(2)).await);
    assert_eq!(receipt.transaction_hash, tx_hash(2));
    assert_eq!(receipt.status, ReceiptStatus::Success);
    assert_eq!(receipt.tip_id(), "1234-3");
    assert!(receipt.pays(token(), recipient(), U256::from(5_000_000u64)));
}

#[tokio::test]
async fn failing_primary_falls_back() {
    let mut primary = Server::new_async().await;
    broken_mock(&mut primary, "eth_getTransactionReceipt").await;
    broken_mock(&mut primary, "eth_blockNumber").await;

    let mut fallback = Server::new_async().await;
    rpc_mock(&mut fallback, "eth_getTransactionReceipt", mined_receipt(tx_hash(3))).await;
    rpc_mock(&mut fallback, "eth_blockNumber", json!("0x2a")).await;

    let fallback_url = fallback.url();
    let reader =
        RpcChainReader::new(&primary.url(), Some(fallback_url.as_str()), options(3)).unwrap();

    let receipt = assert_ok!(reader.get_receipt(tx_hash(3)).await);
    assert_eq!(receipt.block_number, 1234);
    assert_eq!(assert_ok!(reader.get_block_height().await), 42);
}

#[tokio::test]
async fn failing_primary_without_fallback_is_rpc_error() {
    let mut server = Server::new_async().await;
    broken_mock(&mut server, "eth_blockNumber").await;

    let reader = RpcChainReader::new(&server.url(), None, options(3)).unwrap();

    let err = assert_err!(reader.get_block_height().await);
    assert!(matches!(err, PaymentError::Rpc(_)));
}

#[tokio::test]
async fn subscription_skips_repeated_heights_and_stops_on_break() {
    let mut server = Server::new_async().await;
    for height in ["0x64", "0x64", "0x63", "0x65", "0x66"] {
        rpc_mock(&mut server, "eth_blockNumber", json!(height)).await;
    }

    let reader = RpcChainReader::new(&server.url(), None, options(3)).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let subscription = {
        let seen = seen.clone();
        reader.subscribe_block_height(Box::new(move |height: u64| {
            seen.lock().unwrap().push(height);
            if height >= 102 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        }))
    };

    eventually(|| !subscription.is_active()).await;
    assert_eq!(*seen.lock().unwrap(), vec![100, 101, 102]);
}

#[tokio::test]
async fn poller_exits_after_break() {
    let mut server = Server::new_async().await;
    let calls = Arc::new(AtomicU64::new(0));
    {
        let calls = calls.clone();
        server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({ "method": "eth_blockNumber" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body_from_request(move |_| {
                let height = 100 + calls.fetch_add(1, Ordering::SeqCst);
                rpc_body(json!(format!("{:#x}", height))).into_bytes()
            })
            .create_async()
            .await;
    }

    let reader = RpcChainReader::new(&server.url(), None, options(3)).unwrap();
    let subscription = reader.subscribe_block_height(Box::new(|height: u64| {
        if height >= 102 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }));

    eventually(|| !subscription.is_active()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn transport_error_stalls_without_deregistering() {
    let mut server = Server::new_async().await;
    broken_mock(&mut server, "eth_blockNumber").await;
    rpc_mock(&mut server, "eth_blockNumber", json!("0x64")).await;

    let reader = RpcChainReader::new(&server.url(), None, options(3)).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let subscription = {
        let seen = seen.clone();
        reader.subscribe_block_height(Box::new(move |height: u64| {
            seen.lock().unwrap().push(height);
            ControlFlow::Continue(())
        }))
    };

    eventually(|| !seen.lock().unwrap().is_empty()).await;
    assert!(subscription.is_active());

    subscription.unsubscribe();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*seen.lock().unwrap(), vec![100]);
    assert!(!subscription.is_active());
}
