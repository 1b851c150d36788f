//! Deal proposal interface of the local storage node.
//!
//! [`ProposerTrait`] is the seam the submission driver talks to.
//! [`NodeProposer`] implements it over the node's JSON-RPC API.

use crate::error::{ProposalError, ProposalResult, DUPLICATE_TRACKING_MARKER};
use crate::sizing::PieceSize;
use async_trait::async_trait;
use autodeal_types::{DealConfig, DealOffer, TokenAmount};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// A proposal the node has accepted and assigned an identifier to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    /// Deal proposal CID.
    pub deal_cid: String,
    /// Start epoch the node accepted.
    pub start_epoch: i64,
}

/// Trait for proposing deals to a storage node.
///
/// This trait enables mock implementations for testing without requiring
/// a running node.
#[async_trait]
pub trait ProposerTrait: Send {
    /// Propose one deal.
    ///
    /// `attempt` is the zero-based retry index; implementations fold it into
    /// the proposal so successive attempts are distinct proposals.
    ///
    /// # Returns
    /// `Ok(Some(_))` once the node has accepted the deal, `Ok(None)` if it
    /// took the proposal but has not produced an identifier yet.
    async fn propose_deal(
        &mut self,
        offer: &DealOffer,
        cost: TokenAmount,
        piece: PieceSize,
        config: &DealConfig,
        attempt: u32,
    ) -> ProposalResult<Option<Proposal>>;
}

/// Configuration for the node proposer.
#[derive(Debug, Clone)]
pub struct NodeProposerConfig {
    /// Node JSON-RPC endpoint.
    pub rpc_url: String,
    /// Optional bearer token for the node API.
    pub auth_token: Option<String>,
    /// Request timeout.
    pub request_timeout: Duration,
}

impl Default for NodeProposerConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:1234/rpc/v0".to_string(),
            auth_token: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChainHead {
    #[serde(rename = "Height")]
    height: i64,
}

#[derive(Debug, Deserialize)]
struct CidLink {
    #[serde(rename = "/")]
    cid: String,
}

/// Proposer backed by the storage node's JSON-RPC API.
pub struct NodeProposer {
    config: NodeProposerConfig,
    client: Client,
    next_id: u64,
}

impl NodeProposer {
    /// Create a new node proposer.
    pub fn new(config: NodeProposerConfig) -> ProposalResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ProposalError::Connection(e.to_string()))?;

        Ok(Self {
            config,
            client,
            next_id: 1,
        })
    }

    /// Get the proposer configuration.
    pub fn config(&self) -> &NodeProposerConfig {
        &self.config
    }

    async fn call(&mut self, method: &str, params: Value) -> ProposalResult<Option<Value>> {
        let id = self.next_id;
        self.next_id += 1;

        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        };

        let mut builder = self.client.post(&self.config.rpc_url).json(&request);
        if let Some(token) = &self.config.auth_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ProposalError::Connection(e.to_string()))?
            .error_for_status()
            .map_err(|e| ProposalError::Connection(e.to_string()))?;

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| ProposalError::Decode(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(classify_rpc_error(error.code, error.message));
        }

        Ok(body.result.filter(|v| !v.is_null()))
    }

    /// Current chain height as seen by the node.
    pub async fn chain_height(&mut self) -> ProposalResult<i64> {
        let result = self
            .call("Filecoin.ChainHead", json!([]))
            .await?
            .ok_or_else(|| ProposalError::Decode("empty chain head".to_string()))?;

        let head: ChainHead =
            serde_json::from_value(result).map_err(|e| ProposalError::Decode(e.to_string()))?;
        Ok(head.height)
    }
}

/// Map a JSON-RPC error into a typed proposal error, recognising the
/// duplicate-tracking condition by its message text.
fn classify_rpc_error(code: i64, message: String) -> ProposalError {
    if message.contains(DUPLICATE_TRACKING_MARKER) {
        ProposalError::DuplicateTracking(message)
    } else {
        ProposalError::Rpc { code, message }
    }
}

/// Start epoch for a proposal attempt.
pub fn proposal_start_epoch(chain_height: i64, config: &DealConfig, attempt: u32) -> i64 {
    chain_height
        .saturating_add(config.start_epoch_offset())
        .saturating_add(attempt as i64)
}

fn start_deal_params(
    offer: &DealOffer,
    cost: TokenAmount,
    piece: PieceSize,
    config: &DealConfig,
    start_epoch: i64,
) -> Value {
    json!([{
        "Data": {
            "TransferType": "manual",
            "Root": { "/": offer.payload_cid },
            "PieceCid": { "/": offer.piece_cid },
            "PieceSize": piece.unpadded(),
        },
        "Wallet": config.sender_wallet,
        "Miner": config.miner_fid,
        "EpochPrice": cost.as_atto().to_string(),
        "MinBlocksDuration": config.duration_epochs,
        "DealStartEpoch": start_epoch,
        "FastRetrieval": config.fast_retrieval,
        "VerifiedDeal": config.verified_deal,
    }])
}

#[async_trait]
impl ProposerTrait for NodeProposer {
    async fn propose_deal(
        &mut self,
        offer: &DealOffer,
        cost: TokenAmount,
        piece: PieceSize,
        config: &DealConfig,
        attempt: u32,
    ) -> ProposalResult<Option<Proposal>> {
        let height = self.chain_height().await?;
        let start_epoch = proposal_start_epoch(height, config, attempt);

        debug!(
            offer_id = offer.id,
            miner = %config.miner_fid,
            start_epoch = start_epoch,
            attempt = attempt,
            "Submitting ClientStartDeal"
        );

        let params = start_deal_params(offer, cost, piece, config, start_epoch);
        let result = self.call("Filecoin.ClientStartDeal", params).await?;

        match result {
            None => Ok(None),
            Some(value) => {
                let link: CidLink = serde_json::from_value(value)
                    .map_err(|e| ProposalError::Decode(e.to_string()))?;
                Ok(Some(Proposal {
                    deal_cid: link.cid,
                    start_epoch,
                }))
            }
        }
    }
}
