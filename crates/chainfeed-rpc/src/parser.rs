//! Block notification decoding.
//!
//! Notifications arrive as
//! `{"block": {id, height, timestamp, txs}, "results": [{success}]}` with
//! each action tagged by `type`. Transfer memos are hex strings.

use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use chainfeed_core::chain::{Action, Block, BlockParser, ConfirmedBlock, Transaction, Transfer, TxResult};
use chainfeed_core::error::FeedError;
use chainfeed_core::types::NetworkIdentity;

#[derive(Deserialize)]
struct WireNotification {
    block: WireBlock,
    #[serde(default)]
    results: Vec<WireResult>,
}

#[derive(Deserialize)]
struct WireBlock {
    id: String,
    #[serde(deserialize_with = "number_or_string")]
    height: u64,
    timestamp: i64,
    #[serde(default)]
    txs: Vec<WireTx>,
}

#[derive(Deserialize)]
struct WireTx {
    id: String,
    actor: String,
    #[serde(default)]
    actions: Vec<WireAction>,
}

#[derive(Deserialize)]
struct WireAction {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    to: String,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    memo: String,
}

#[derive(Deserialize)]
struct WireResult {
    success: bool,
}

/// Amounts may be sent as JSON numbers or decimal strings.
fn amount(value: &Value) -> Result<u64, String> {
    match value {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| format!("{n} is not an unsigned integer")),
        Value::String(s) => s.parse().map_err(|e| format!("{s:?}: {e}")),
        other => Err(format!("expected number, got {other}")),
    }
}

fn number_or_string<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    amount(&Value::deserialize(d)?).map_err(de::Error::custom)
}

fn decode_hex(memo: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(memo.strip_prefix("0x").unwrap_or(memo))
}

/// Decode one action. A transfer whose fields do not decode is kept out of
/// the feed without failing the rest of the block: a bad amount demotes it
/// to [`Action::Other`], a bad memo leaves it with an empty memo so it is
/// rejected like any other unreadable payload.
fn decode_action(tx_id: &str, action: WireAction) -> Action {
    if !action.kind.eq_ignore_ascii_case("transfer") {
        return Action::Other { kind: action.kind };
    }
    let value = match amount(&action.value) {
        Ok(value) => value,
        Err(reason) => {
            warn!(tx_id, to = %action.to, %reason, "transfer amount could not be decoded");
            return Action::Other { kind: action.kind };
        }
    };
    let memo = decode_hex(&action.memo).unwrap_or_else(|e| {
        debug!(tx_id, to = %action.to, error = %e, "transfer memo is not hex");
        Vec::new()
    });
    Action::Transfer(Transfer {
        to: action.to,
        value,
        memo,
    })
}

/// JSON block parser bound to one chain.
#[derive(Debug, Clone)]
pub struct JsonBlockParser {
    identity: NetworkIdentity,
}

impl JsonBlockParser {
    pub fn new(identity: NetworkIdentity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &NetworkIdentity {
        &self.identity
    }
}

impl BlockParser for JsonBlockParser {
    fn parse(&self, raw: &Value) -> Result<ConfirmedBlock, FeedError> {
        let wire = WireNotification::deserialize(raw)
            .map_err(|e| FeedError::Parse(format!("chain {}: {e}", self.identity.chain_id)))?;

        let mut txs = Vec::with_capacity(wire.block.txs.len());
        for tx in wire.block.txs {
            let actions = tx
                .actions
                .into_iter()
                .map(|action| decode_action(&tx.id, action))
                .collect();
            txs.push(Transaction {
                id: tx.id,
                actor: tx.actor,
                actions,
            });
        }

        Ok(ConfirmedBlock {
            block: Block {
                id: wire.block.id,
                height: wire.block.height,
                timestamp: wire.block.timestamp,
                txs,
            },
            results: wire
                .results
                .into_iter()
                .map(|r| TxResult { success: r.success })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parser() -> JsonBlockParser {
        JsonBlockParser::new(NetworkIdentity {
            network_id: 1337,
            subnet_id: "subnet".into(),
            chain_id: "chain".into(),
        })
    }

    #[test]
    fn decodes_transfer_with_hex_memo() {
        let memo = hex::encode(br#"{"message":"gm","url":""}"#);
        let raw = json!({
            "block": {
                "id": "blk",
                "height": "42",
                "timestamp": 1_700_000_000,
                "txs": [{
                    "id": "tx1",
                    "actor": "nuklai1sender",
                    "actions": [
                        { "type": "Transfer", "to": "nuklai1feed", "value": "1000000", "memo": format!("0x{memo}") },
                        { "type": "mintAsset" }
                    ]
                }]
            },
            "results": [{ "success": true }]
        });

        let confirmed = parser().parse(&raw).unwrap();
        assert_eq!(confirmed.block.height, 42);
        assert_eq!(confirmed.results, vec![TxResult { success: true }]);

        let tx = &confirmed.block.txs[0];
        let Action::Transfer(t) = &tx.actions[0] else {
            panic!("expected transfer");
        };
        assert_eq!(t.value, 1_000_000);
        assert_eq!(t.memo, br#"{"message":"gm","url":""}"#.to_vec());
        assert_eq!(
            tx.actions[1],
            Action::Other {
                kind: "mintAsset".into()
            }
        );
    }

    #[test]
    fn malformed_action_does_not_sink_the_block() {
        let paid = hex::encode(br#"{"message":"gm","url":""}"#);
        let raw = json!({
            "block": {
                "id": "blk", "height": 1, "timestamp": 1,
                "txs": [
                    { "id": "paid", "actor": "nuklai1a", "actions": [
                        { "type": "transfer", "to": "nuklai1feed", "value": 1_000_000, "memo": paid }
                    ]},
                    { "id": "bad-memo", "actor": "nuklai1b", "actions": [
                        { "type": "transfer", "to": "nuklai1elsewhere", "value": 5, "memo": "not-hex" }
                    ]},
                    { "id": "bad-value", "actor": "nuklai1c", "actions": [
                        { "type": "transfer", "to": "nuklai1feed", "value": "lots", "memo": "" }
                    ]}
                ]
            },
            "results": [{ "success": true }, { "success": true }, { "success": true }]
        });

        let confirmed = parser().parse(&raw).unwrap();
        let txs = &confirmed.block.txs;
        assert_eq!(txs.len(), 3);

        let Action::Transfer(t) = &txs[0].actions[0] else {
            panic!("expected transfer");
        };
        assert_eq!(t.value, 1_000_000);
        assert_eq!(t.memo, br#"{"message":"gm","url":""}"#.to_vec());

        let Action::Transfer(t) = &txs[1].actions[0] else {
            panic!("expected transfer");
        };
        assert!(t.memo.is_empty());

        assert_eq!(
            txs[2].actions[0],
            Action::Other {
                kind: "transfer".into()
            }
        );
    }

    #[test]
    fn missing_block_is_a_parse_error() {
        assert!(matches!(
            parser().parse(&json!({ "results": [] })),
            Err(FeedError::Parse(_))
        ));
    }
}
