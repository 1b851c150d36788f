//! Mock storage node for testing deal proposals without a running node.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use autodeal_engine::{PieceSize, Proposal, ProposalError, ProposalResult, ProposerTrait};
use autodeal_types::{DealConfig, DealOffer, TokenAmount};
use tokio::sync::watch;

/// How the mock node answers one proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeResponse {
    /// Accept and assign a deal identifier.
    Accept,
    /// Take the proposal without an identifier.
    Pending,
    /// Fail with the duplicate-tracking error.
    Duplicate,
    /// Fail with a non-retryable error.
    Reject(String),
}

/// A recorded proposal call for verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalCall {
    /// Offer ID.
    pub offer_id: u64,
    /// Zero-based attempt index.
    pub attempt: u32,
    /// Provider the deal was proposed to.
    pub miner_fid: String,
    /// Total deal cost.
    pub cost: TokenAmount,
    /// Padded piece size.
    pub piece_size: u64,
}

/// Mock storage node for simulation testing.
///
/// Each offer can be given a script of responses; once its script runs out
/// (or if it has none) the default response applies.
///
/// # Example
///
/// ```rust,ignore
/// use autodeal_simulation::mocks::{MockProposer, NodeResponse};
///
/// let proposer = MockProposer::new()
///     .with_script(7, vec![NodeResponse::Duplicate, NodeResponse::Accept])
///     .with_default(NodeResponse::Reject("offline".into()));
/// ```
#[derive(Debug, Clone)]
pub struct MockProposer {
    /// Recorded calls, in order.
    pub calls: VecDeque<ProposalCall>,
    scripts: HashMap<u64, VecDeque<NodeResponse>>,
    default_response: NodeResponse,
    chain_height: i64,
    interrupt: Option<(usize, Arc<watch::Sender<bool>>)>,
}

impl Default for MockProposer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProposer {
    /// Create a mock node that accepts every proposal.
    pub fn new() -> Self {
        Self {
            calls: VecDeque::new(),
            scripts: HashMap::new(),
            default_response: NodeResponse::Accept,
            chain_height: 1_000_000,
            interrupt: None,
        }
    }

    /// Response for offers without a remaining script.
    pub fn with_default(mut self, response: NodeResponse) -> Self {
        self.default_response = response;
        self
    }

    /// Queue responses for one offer.
    pub fn with_script(mut self, offer_id: u64, responses: Vec<NodeResponse>) -> Self {
        self.scripts
            .entry(offer_id)
            .or_default()
            .extend(responses);
        self
    }

    /// Chain height the accepted start epochs are based on.
    pub fn with_chain_height(mut self, height: i64) -> Self {
        self.chain_height = height;
        self
    }

    /// Raise `shutdown` while answering the `calls`-th proposal, the way an
    /// operator's Ctrl+C lands during a node round trip.
    pub fn with_interrupt_after(mut self, calls: usize, shutdown: watch::Sender<bool>) -> Self {
        self.interrupt = Some((calls, Arc::new(shutdown)));
        self
    }

    /// Get the chain height.
    pub fn chain_height(&self) -> i64 {
        self.chain_height
    }

    /// Get the number of proposal calls.
    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    /// Get the calls made for one offer.
    pub fn calls_for_offer(&self, offer_id: u64) -> Vec<&ProposalCall> {
        self.calls
            .iter()
            .filter(|call| call.offer_id == offer_id)
            .collect()
    }

    /// Deal identifier the mock assigns to an accepted attempt.
    pub fn deal_cid_for(offer_id: u64, attempt: u32) -> String {
        format!("bafyreimockdeal{offer_id}x{attempt}")
    }

    fn next_response(&mut self, offer_id: u64) -> NodeResponse {
        self.scripts
            .get_mut(&offer_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.default_response.clone())
    }
}

#[async_trait]
impl ProposerTrait for MockProposer {
    async fn propose_deal(
        &mut self,
        offer: &DealOffer,
        cost: TokenAmount,
        piece: PieceSize,
        config: &DealConfig,
        attempt: u32,
    ) -> ProposalResult<Option<Proposal>> {
        self.calls.push_back(ProposalCall {
            offer_id: offer.id,
            attempt,
            miner_fid: config.miner_fid.clone(),
            cost,
            piece_size: piece.padded(),
        });

        if let Some((after, shutdown)) = &self.interrupt {
            if self.calls.len() >= *after {
                shutdown.send_replace(true);
            }
        }

        match self.next_response(offer.id) {
            NodeResponse::Accept => Ok(Some(Proposal {
                deal_cid: Self::deal_cid_for(offer.id, attempt),
                start_epoch: self.chain_height + config.start_epoch_offset() + attempt as i64,
            })),
            NodeResponse::Pending => Ok(None),
            NodeResponse::Duplicate => Err(ProposalError::DuplicateTracking(format!(
                "deal for offer {}",
                offer.id
            ))),
            NodeResponse::Reject(reason) => Err(ProposalError::Rejected(reason)),
        }
    }
}
