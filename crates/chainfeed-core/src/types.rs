//! Shared types for the feed pipeline.

use serde::{Deserialize, Serialize};

use crate::error::FeedError;

// ─── FeedContent ─────────────────────────────────────────────────────────────

/// The payload a sender attaches to a transfer memo.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedContent {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub url: String,
}

impl FeedContent {
    /// Decode a transfer memo as JSON `{"message": …, "url": …}`.
    ///
    /// Missing fields default to empty strings; unknown fields are ignored.
    pub fn decode_memo(memo: &[u8]) -> Result<Self, FeedError> {
        serde_json::from_slice(memo).map_err(|e| FeedError::Content(e.to_string()))
    }
}

// ─── FeedEntry ───────────────────────────────────────────────────────────────

/// One accepted paid message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    #[serde(rename = "subnetID")]
    pub subnet_id: String,
    #[serde(rename = "chainID")]
    pub chain_id: String,
    /// Sender's bech32 account string.
    pub address: String,
    /// Transaction id; primary key in every store.
    #[serde(rename = "txID")]
    pub id: String,
    /// Block timestamp (seconds since epoch).
    pub timestamp: i64,
    /// Amount paid.
    pub fee: u64,
    pub content: FeedContent,
}

impl FeedEntry {
    /// Flatten into the record shape stores persist, serializing `content`.
    pub fn to_record(&self) -> Result<FeedRecord, FeedError> {
        let content =
            serde_json::to_string(&self.content).map_err(|e| FeedError::Content(e.to_string()))?;
        Ok(FeedRecord {
            id: self.id.clone(),
            subnet_id: self.subnet_id.clone(),
            chain_id: self.chain_id.clone(),
            address: self.address.clone(),
            timestamp: self.timestamp,
            fee: self.fee,
            content,
        })
    }
}

// ─── FeedRecord ──────────────────────────────────────────────────────────────

/// A feed entry as a store sees it: `content` is an opaque JSON string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedRecord {
    pub id: String,
    pub subnet_id: String,
    pub chain_id: String,
    pub address: String,
    pub timestamp: i64,
    pub fee: u64,
    pub content: String,
}

impl FeedRecord {
    /// Decode the stored content back into a [`FeedEntry`].
    pub fn into_entry(self) -> Result<FeedEntry, FeedError> {
        let content: FeedContent =
            serde_json::from_str(&self.content).map_err(|e| FeedError::Content(e.to_string()))?;
        Ok(FeedEntry {
            subnet_id: self.subnet_id,
            chain_id: self.chain_id,
            address: self.address,
            id: self.id,
            timestamp: self.timestamp,
            fee: self.fee,
            content,
        })
    }
}

// ─── NetworkIdentity ─────────────────────────────────────────────────────────

/// Identity reported by an upstream node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkIdentity {
    pub network_id: u32,
    pub subnet_id: String,
    pub chain_id: String,
}

// ─── FeedInfo ────────────────────────────────────────────────────────────────

/// Snapshot returned by the fee quote accessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedInfo {
    /// Recipient address that must be paid.
    pub address: String,
    /// Fee currently required for a message to be accepted.
    pub fee: u64,
}

// ─── Tests ────────────────────────────────────────────────────────────────────
