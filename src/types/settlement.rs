use super::ChainId;
use alloy::primitives::{B256, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};

/// Lifecycle state of an [`OrderSettlement`].
///
/// The string forms are persisted and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStatus {
    /// Waiting to be included in a settlement batch.
    Pending,
    /// A batch settlement transaction landed on the destination chain.
    SettlementInitiated,
    /// The source chain reports the settlement as complete.
    Complete,
    /// An on-chain failure was observed.
    Failed,
}

impl SettlementStatus {
    /// Returns true for [`SettlementStatus::Complete`] and [`SettlementStatus::Failed`].
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Returns true if a settlement in this state may move to `next`.
    ///
    /// Statuses only ever advance: `Pending -> SettlementInitiated -> Complete`, with `Failed`
    /// reachable from either non-terminal state.
    pub fn can_advance_to(&self, next: Self) -> bool {
        next.predecessors().contains(self)
    }

    /// States a settlement must be in to move to `self`.
    pub const fn predecessors(&self) -> &'static [Self] {
        match self {
            Self::Pending => &[],
            Self::SettlementInitiated => &[Self::Pending],
            Self::Complete => &[Self::SettlementInitiated],
            Self::Failed => &[Self::Pending, Self::SettlementInitiated],
        }
    }
}

/// A filled order awaiting repayment to the solver on the source chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSettlement {
    /// Storage id. Zero until the record is persisted.
    pub id: i64,
    /// Chain the order was submitted on (where the solver gets repaid).
    pub source_chain_id: ChainId,
    /// Chain the order was filled on (where settlement is initiated).
    pub destination_chain_id: ChainId,
    /// Gateway contract on the source chain.
    pub source_chain_gateway: String,
    /// The settled order.
    pub order_id: B256,
    /// Amount to be repaid.
    pub amount: U256,
    /// Hash of the batch settlement transaction on the destination chain.
    pub initiate_settlement_tx: Option<String>,
    /// Hash of the transaction that completed the settlement on the source chain.
    pub complete_settlement_tx: Option<String>,
    /// Current status.
    pub status: SettlementStatus,
    /// Failure reason, set when the status is [`SettlementStatus::Failed`].
    pub status_message: Option<String>,
}

impl OrderSettlement {
    /// Creates a new pending settlement that has not been initiated yet.
    pub fn pending(
        source_chain_id: ChainId,
        destination_chain_id: ChainId,
        source_chain_gateway: String,
        order_id: B256,
        amount: U256,
    ) -> Self {
        Self {
            id: 0,
            source_chain_id,
            destination_chain_id,
            source_chain_gateway,
            order_id,
            amount,
            initiate_settlement_tx: None,
            complete_settlement_tx: None,
            status: SettlementStatus::Pending,
            status_message: None,
        }
    }

    /// The uniqueness key of a settlement.
    pub fn key(&self) -> SettlementKey {
        SettlementKey {
            source_chain_id: self.source_chain_id.clone(),
            destination_chain_id: self.destination_chain_id.clone(),
            source_chain_gateway: self.source_chain_gateway.clone(),
            order_id: self.order_id,
        }
    }
}

/// Identity of a settlement: at most one record exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SettlementKey {
    /// Source chain id.
    pub source_chain_id: ChainId,
    /// Destination chain id.
    pub destination_chain_id: ChainId,
    /// Source chain gateway.
    pub source_chain_gateway: String,
    /// Order id.
    pub order_id: B256,
}

/// Errors raised while building or valuing a [`SettlementBatch`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    /// A batch must contain at least one settlement.
    #[error("settlement batch is empty")]
    Empty,
    /// A settlement does not share the batch chain pair.
    #[error(
        "settlement for order {order_id} is on {source_chain_id} -> {destination_chain_id}, batch is {expected_source} -> {expected_destination}"
    )]
    ChainMismatch {
        /// Offending order.
        order_id: B256,
        /// Its source chain.
        source_chain_id: ChainId,
        /// Its destination chain.
        destination_chain_id: ChainId,
        /// Batch source chain.
        expected_source: ChainId,
        /// Batch destination chain.
        expected_destination: ChainId,
    },
    /// The summed value does not fit into 256 bits.
    #[error("settlement batch value overflows")]
    ValueOverflow,
}

/// A non-empty group of settlements sharing one source and destination chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementBatch {
    settlements: Vec<OrderSettlement>,
}

impl SettlementBatch {
    /// Creates a batch, checking that it is non-empty and every member shares the chain pair of
    /// the first one.
    pub fn new(settlements: Vec<OrderSettlement>) -> Result<Self, BatchError> {
        let first = settlements.first().ok_or(BatchError::Empty)?;
        if let Some(other) = settlements.iter().find(|s| {
            s.source_chain_id != first.source_chain_id
                || s.destination_chain_id != first.destination_chain_id
        }) {
            return Err(BatchError::ChainMismatch {
                order_id: other.order_id,
                source_chain_id: other.source_chain_id.clone(),
                destination_chain_id: other.destination_chain_id.clone(),
                expected_source: first.source_chain_id.clone(),
                expected_destination: first.destination_chain_id.clone(),
            });
        }
        Ok(Self { settlements })
    }

    /// Groups settlements by (source chain, destination chain).
    ///
    /// Batches are returned in a stable order, sorted by chain pair, with members kept in input
    /// order.
    pub fn by_chain_pair(settlements: Vec<OrderSettlement>) -> Vec<Self> {
        let mut groups: BTreeMap<(ChainId, ChainId), Vec<OrderSettlement>> = BTreeMap::new();
        for settlement in settlements {
            groups
                .entry((settlement.source_chain_id.clone(), settlement.destination_chain_id.clone()))
                .or_default()
                .push(settlement);
        }
        groups.into_values().map(|settlements| Self { settlements }).collect()
    }

    /// Groups settlements by their initiate settlement transaction.
    ///
    /// Settlements without an initiate transaction are skipped. A transaction only ever carries
    /// settlements of one chain pair, so the resulting groups are valid batches; groups that are
    /// not are dropped.
    pub fn by_initiate_tx(settlements: Vec<OrderSettlement>) -> Vec<Self> {
        let mut groups: BTreeMap<String, Vec<OrderSettlement>> = BTreeMap::new();
        for settlement in settlements {
            if let Some(tx) = settlement.initiate_settlement_tx.clone() {
                groups.entry(tx).or_default().push(settlement);
            }
        }
        groups.into_values().filter_map(|settlements| Self::new(settlements).ok()).collect()
    }

    /// Source chain shared by all members.
    pub fn source_chain_id(&self) -> &ChainId {
        &self.settlements[0].source_chain_id
    }

    /// Destination chain shared by all members.
    pub fn destination_chain_id(&self) -> &ChainId {
        &self.settlements[0].destination_chain_id
    }

    /// Source chain gateway of the first member.
    pub fn source_chain_gateway(&self) -> &str {
        &self.settlements[0].source_chain_gateway
    }

    /// Initiate transaction of the first member, if any.
    pub fn initiate_settlement_tx(&self) -> Option<&str> {
        self.settlements[0].initiate_settlement_tx.as_deref()
    }

    /// The batch members.
    pub fn settlements(&self) -> &[OrderSettlement] {
        &self.settlements
    }

    /// The first member, used to link audit records of the batch transaction.
    pub fn first(&self) -> &OrderSettlement {
        &self.settlements[0]
    }

    /// Ids of the settled orders, in batch order.
    pub fn order_ids(&self) -> Vec<B256> {
        self.settlements.iter().map(|s| s.order_id).collect()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.settlements.len()
    }

    /// Always false, batches are never empty.
    pub fn is_empty(&self) -> bool {
        self.settlements.is_empty()
    }

    /// Sum of the member amounts.
    pub fn total_value(&self) -> Result<U256, BatchError> {
        self.settlements.iter().try_fold(U256::ZERO, |total, settlement| {
            total.checked_add(settlement.amount).ok_or(BatchError::ValueOverflow)
        })
    }

    /// Returns true once the batch value reaches `threshold`.
    pub fn should_initiate_settlement(&self, threshold: U256) -> Result<bool, BatchError> {
        Ok(self.total_value()? >= threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settlement(source: &str, destination: &str, amount: u64) -> OrderSettlement {
        OrderSettlement::pending(
            source.to_string(),
            destination.to_string(),
            "0xgateway".to_string(),
            B256::random(),
            U256::from(amount),
        )
    }

    #[test]
    fn batch_reaches_threshold() {
        let batch = SettlementBatch::new(vec![
            settlement("1", "42161", 40),
            settlement("1", "42161", 35),
            settlement("1", "42161", 30),
        ])
        .unwrap();

        assert_eq!(batch.total_value().unwrap(), U256::from(105));
        assert!(batch.should_initiate_settlement(U256::from(100)).unwrap());
    }

    #[test]
    fn batch_below_threshold() {
        let batch =
            SettlementBatch::new(vec![settlement("1", "42161", 10), settlement("1", "42161", 10)])
                .unwrap();

        assert!(!batch.should_initiate_settlement(U256::from(100)).unwrap());
    }

    #[test]
    fn batch_value_overflow_is_an_error() {
        let mut big = settlement("1", "10", 0);
        big.amount = U256::MAX;
        let batch = SettlementBatch::new(vec![big, settlement("1", "10", 1)]).unwrap();

        assert_eq!(batch.total_value(), Err(BatchError::ValueOverflow));
        assert_eq!(batch.should_initiate_settlement(U256::ZERO), Err(BatchError::ValueOverflow));
    }

    #[test]
    fn batch_rejects_mixed_chain_pairs() {
        assert_eq!(SettlementBatch::new(vec![]), Err(BatchError::Empty));
        assert!(matches!(
            SettlementBatch::new(vec![settlement("1", "10", 1), settlement("1", "8453", 1)]),
            Err(BatchError::ChainMismatch { .. })
        ));
    }

    #[test]
    fn group_by_chain_pair() {
        let batches = SettlementBatch::by_chain_pair(vec![
            settlement("1", "10", 1),
            settlement("8453", "10", 2),
            settlement("1", "10", 3),
        ]);

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].source_chain_id(), "1");
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[0].total_value().unwrap(), U256::from(4));
        assert_eq!(batches[1].source_chain_id(), "8453");
    }

    #[test]
    fn group_by_initiate_tx() {
        let mut a = settlement("1", "10", 1);
        a.initiate_settlement_tx = Some("0xaa".to_string());
        let mut b = settlement("1", "10", 1);
        b.initiate_settlement_tx = Some("0xaa".to_string());
        let mut c = settlement("1", "10", 1);
        c.initiate_settlement_tx = Some("0xbb".to_string());
        let d = settlement("1", "10", 1);

        let batches = SettlementBatch::by_initiate_tx(vec![a, b, c, d]);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].initiate_settlement_tx(), Some("0xaa"));
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].len(), 1);
    }

    #[test]
    fn status_only_advances() {
        use SettlementStatus::*;

        assert!(Pending.can_advance_to(SettlementInitiated));
        assert!(SettlementInitiated.can_advance_to(Complete));
        assert!(SettlementInitiated.can_advance_to(Failed));
        assert!(!SettlementInitiated.can_advance_to(Pending));
        assert!(!Pending.can_advance_to(Complete));
        for next in [Pending, SettlementInitiated, Complete, Failed] {
            assert!(!Complete.can_advance_to(next));
            assert!(!Failed.can_advance_to(next));
        }
        assert_eq!(SettlementInitiated.to_string(), "SETTLEMENT_INITIATED");
        assert_eq!("COMPLETE".parse::<SettlementStatus>().unwrap(), Complete);
    }
}
