use alloy_primitives::{Address, Bytes, U64};
use eth1_mock_common::{
    deposit::{build_deposits, GENESIS_FORK_VERSION, MAX_EFFECTIVE_BALANCE},
    header::SealedHeader,
    keys::KeyPair,
    log::LogEntry,
};
use eth1_mock_node::{Args, Config, Node, MAX_REQUEST_BODY_SIZE};
use futures::{SinkExt, StreamExt};
use jsonrpsee::{
    core::client::{ClientT, Subscription, SubscriptionClientT},
    http_client::HttpClientBuilder,
    rpc_params,
    ws_client::WsClientBuilder,
};
use serde_json::{json, Value};
use tokio_tungstenite::{connect_async, tungstenite::Message};

const CONFIG: &str = r#"
[rpc]
host = "127.0.0.1"
http_port = 0
ws_port = 0

[chain]
block_time = 1
genesis_deposits = 2
start_block = 2000
history_block_time = 10
chain_id = 5
deposit_contract = "0x4242424242424242424242424242424242424242"
deposit_amount = 32000000000
fork_version = "0x00000000"

[deposits]
"#;

fn node(total: u8) -> Node {
    let config: Config = toml::from_str(CONFIG).unwrap();
    let keys: Vec<KeyPair> = (1..=total)
        .map(|i| {
            let mut validator = vec![0; 32];
            validator[31] = i;
            let mut withdrawal = vec![0; 32];
            withdrawal[30] = i;
            KeyPair::new(validator, withdrawal)
        })
        .collect();
    let deposits = build_deposits(&keys, MAX_EFFECTIVE_BALANCE, GENESIS_FORK_VERSION).unwrap();
    let args = Args { no_trigger: true, ..Default::default() };
    Node::new(config, args, deposits).unwrap()
}

#[tokio::test]
async fn should_serve_deposits_over_http() {
    let node = node(5);
    let servers = node.serve().await.unwrap();
    let client = HttpClientBuilder::default().build(format!("http://{}", servers.http_addr)).unwrap();

    let logs: Vec<LogEntry> = client.request("eth_getLogs", rpc_params![json!({})]).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert!(logs.iter().all(|log| log.block_hash.is_some()));
    let contract: Address = "0x4242424242424242424242424242424242424242".parse().unwrap();
    assert_eq!(logs[0].address, contract);

    let count: Bytes = client
        .request("eth_call", rpc_params![json!({"data": "0x621fd130"}), "latest"])
        .await
        .unwrap();
    assert_eq!(&count[64..72], &2u64.to_le_bytes());

    {
        let chain = node.chain();
        let mut chain = chain.lock().await;
        chain.trigger_deposits(2).unwrap();
        let now = chain.latest_header().timestamp() + 14;
        chain.advance_block(now).unwrap();
    }

    let logs: Vec<LogEntry> = client.request("eth_getLogs", rpc_params![]).await.unwrap();
    assert_eq!(logs.len(), 4);
    assert_eq!(logs[2].block_hash, logs[3].block_hash);
    assert_ne!(logs[0].block_hash, logs[2].block_hash);

    let head: SealedHeader =
        client.request("eth_getBlockByNumber", rpc_params!["latest", false]).await.unwrap();
    assert_eq!(head.number(), 2001);
    assert_eq!(Some(head.hash()), logs[3].block_hash);
    let same: SealedHeader =
        client.request("eth_getBlockByHash", rpc_params![head.hash(), false]).await.unwrap();
    assert_eq!(same, head);

    let count: Bytes = client
        .request("eth_call", rpc_params![json!({"data": "0x621fd130"})])
        .await
        .unwrap();
    assert_eq!(&count[64..72], &4u64.to_le_bytes());

    let chain_id: U64 = client.request("eth_chainId", rpc_params![]).await.unwrap();
    assert_eq!(chain_id.to::<u64>(), 5);

    let unknown = client.request::<U64, _>("eth_gasPrice", rpc_params![]).await;
    assert!(unknown.is_err());

    servers.stop().await;
}

#[tokio::test]
async fn should_push_heads_over_websocket() {
    let node = node(2);
    let servers = node.serve().await.unwrap();
    let client = WsClientBuilder::default().build(format!("ws://{}", servers.ws_addr)).await.unwrap();

    let number: U64 = client.request("eth_blockNumber", rpc_params![]).await.unwrap();
    assert_eq!(number.to::<u64>(), 2000);

    let mut heads: Subscription<SealedHeader> = client
        .subscribe("eth_subscribe", rpc_params!["newHeads"], "eth_unsubscribe")
        .await
        .unwrap();
    let head = heads.next().await.unwrap().unwrap();
    assert_eq!(head.number(), 2000);

    let rejected = client
        .subscribe::<SealedHeader, _>("eth_subscribe", rpc_params!["logs"], "eth_unsubscribe")
        .await;
    assert!(rejected.is_err());

    heads.unsubscribe().await.unwrap();
    servers.stop().await;
}

#[tokio::test]
async fn should_keep_transports_apart() {
    let node = node(2);
    let servers = node.serve().await.unwrap();

    // the HTTP listener does not upgrade to WebSocket
    let ws_on_http = WsClientBuilder::default().build(format!("ws://{}", servers.http_addr)).await;
    assert!(ws_on_http.is_err());

    // and the WebSocket listener does not answer plain HTTP
    let http_on_ws =
        HttpClientBuilder::default().build(format!("http://{}", servers.ws_addr)).unwrap();
    let res = http_on_ws.request::<U64, _>("eth_blockNumber", rpc_params![]).await;
    assert!(res.is_err());

    servers.stop().await;
}

#[tokio::test]
async fn should_reject_oversized_and_malformed_http_bodies() {
    let node = node(2);
    let servers = node.serve().await.unwrap();
    let url = format!("http://{}", servers.http_addr);
    let client = reqwest::Client::new();

    let padding = "0".repeat(MAX_REQUEST_BODY_SIZE as usize);
    let oversized =
        json!({"jsonrpc": "2.0", "id": 1, "method": "eth_getLogs", "params": [padding]});
    let res = client.post(&url).json(&oversized).send().await.unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::PAYLOAD_TOO_LARGE);

    let res = client
        .post(&url)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    let reply: Value = res.json().await.unwrap();
    assert_eq!(reply["error"]["code"], -32700);

    // a bad body does not take the listener down
    let res = client
        .post(&url)
        .json(&json!({"jsonrpc": "2.0", "id": 2, "method": "eth_chainId"}))
        .send()
        .await
        .unwrap();
    let reply: Value = res.json().await.unwrap();
    assert_eq!(reply["result"], "0x5");

    servers.stop().await;
}

#[tokio::test]
async fn should_close_websocket_on_undecodable_frame() {
    let node = node(2);
    let servers = node.serve().await.unwrap();
    let (mut socket, _) = connect_async(format!("ws://{}", servers.ws_addr)).await.unwrap();

    let request = json!({"jsonrpc": "2.0", "id": 1, "method": "eth_chainId"});
    socket.send(Message::Text(request.to_string())).await.unwrap();
    let reply = socket.next().await.unwrap().unwrap();
    let reply: Value = serde_json::from_str(reply.to_text().unwrap()).unwrap();
    assert_eq!(reply["result"], "0x5");

    socket.send(Message::Text("{not json".to_string())).await.unwrap();
    let reply = socket.next().await.unwrap().unwrap();
    let reply: Value = serde_json::from_str(reply.to_text().unwrap()).unwrap();
    assert_eq!(reply["error"]["code"], -32700);
    assert_eq!(reply["id"], Value::Null);

    match socket.next().await {
        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {},
        other => panic!("connection still open: {other:?}"),
    }

    // other sessions are unaffected
    let (mut socket, _) = connect_async(format!("ws://{}", servers.ws_addr)).await.unwrap();
    socket.send(Message::Text(request.to_string())).await.unwrap();
    let reply = socket.next().await.unwrap().unwrap();
    let reply: Value = serde_json::from_str(reply.to_text().unwrap()).unwrap();
    assert_eq!(reply["result"], "0x5");

    servers.stop().await;
}
