//! Settlement candidate detection.

use super::SettlementError;
use crate::{
    chains::ChainClients,
    config::ChainConfig,
    types::{OnChainOrderStatus, OrderSettlement},
};
use alloy::primitives::B256;
use std::collections::HashSet;
use tracing::{debug, instrument, warn};

/// Outcome of a fill scan.
#[derive(Debug)]
pub struct Detection {
    /// Orders checked against their source chain, with the settlement they need, if any.
    pub checked: Vec<(B256, Option<OrderSettlement>)>,
    /// False if a chain or an order could not be checked.
    pub complete: bool,
}

impl Detection {
    /// The settlements found by the scan.
    pub fn candidates(&self) -> impl Iterator<Item = &OrderSettlement> {
        self.checked.iter().filter_map(|(_, candidate)| candidate.as_ref())
    }
}

/// Finds fills that still have to be settled on the chain the order was submitted on.
#[derive(Debug, Clone)]
pub struct SettlementDetector {
    clients: ChainClients,
}

impl SettlementDetector {
    /// Creates a detector.
    pub fn new(clients: ChainClients) -> Self {
        Self { clients }
    }

    /// Scans the fills of the solver on every chain with a gateway.
    ///
    /// Orders in `seen` are skipped. Every order that was checked successfully is reported,
    /// whether or not it turned out to need a settlement, so the caller can mark it seen once
    /// its candidate is stored.
    #[instrument(skip_all)]
    pub async fn detect(&self, seen: &HashSet<B256>) -> Detection {
        let config = self.clients.config().clone();
        let mut detection = Detection { checked: Vec::new(), complete: true };

        for chain in config.gateway_chains() {
            let fills = match self.clients.client(&chain.chain_id).await {
                Ok(client) => client.order_fills_by_filler(&chain.solver_address).await,
                Err(err) => Err(err),
            };
            let fills = match fills {
                Ok(fills) => fills,
                Err(err) => {
                    warn!(chain_id = %chain.chain_id, %err, "Failed to list fills");
                    detection.complete = false;
                    continue;
                }
            };

            for fill in fills {
                if seen.contains(&fill.order_id) {
                    continue;
                }

                let source = match config.chain_by_domain(fill.source_domain) {
                    Ok(source) => source,
                    Err(err) => {
                        warn!(order_id = %fill.order_id, %err, "Unknown fill source");
                        continue;
                    }
                };

                match self.candidate(fill.order_id, source, chain).await {
                    Ok(candidate) => detection.checked.push((fill.order_id, candidate)),
                    Err(err) => {
                        warn!(order_id = %fill.order_id, %err, "Failed to check fill");
                        detection.complete = false;
                    }
                }
            }
        }

        debug!(
            checked = detection.checked.len(),
            complete = detection.complete,
            "Detected settlements"
        );
        detection
    }

    /// Checks a fill of `order_id` on `destination` against the gateway on `source`.
    ///
    /// Returns a pending settlement if the order exists on the source chain and is not settled
    /// yet.
    pub async fn candidate(
        &self,
        order_id: B256,
        source: &ChainConfig,
        destination: &ChainConfig,
    ) -> Result<Option<OrderSettlement>, SettlementError> {
        let client = self.clients.client(&source.chain_id).await?;
        let gateway = &source.fast_transfer_gateway;

        let height = client.block_height().await?;
        let (exists, amount) = client.order_exists(gateway, order_id, Some(height)).await?;
        if !exists {
            debug!(%order_id, chain_id = %source.chain_id, "Filled order does not exist on source");
            return Ok(None);
        }

        let status = client.order_status(gateway, order_id).await?;
        if status != OnChainOrderStatus::Unfilled {
            debug!(%order_id, %status, "Order already settled");
            return Ok(None);
        }

        Ok(Some(OrderSettlement::pending(
            source.chain_id.clone(),
            destination.chain_id.clone(),
            gateway.clone(),
            order_id,
            amount,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chains::ChainClient, config::SolverConfig, test_utils::MockChainClient, types::OrderFill,
    };
    use alloy::primitives::U256;
    use std::sync::Arc;

    fn fill(order_id: B256, source_domain: u32) -> OrderFill {
        OrderFill {
            order_id,
            source_domain,
            filler: "0x0000000000000000000000000000000000000001".to_string(),
            tx_hash: B256::random().to_string(),
        }
    }

    #[tokio::test]
    async fn detects_unsettled_fills() {
        let config = Arc::new(
            serde_yaml::from_str::<SolverConfig>(include_str!("../../config.example.yaml"))
                .unwrap(),
        );
        let unsettled = B256::repeat_byte(1);
        let settled = B256::repeat_byte(2);
        let missing = B256::repeat_byte(3);
        let unknown_domain = B256::repeat_byte(4);

        let source = Arc::new(MockChainClient::new("1"));
        source.set_order(unsettled, U256::from(40), OnChainOrderStatus::Unfilled);
        source.set_order(settled, U256::from(35), OnChainOrderStatus::Filled);
        let destination = Arc::new(MockChainClient::new("42161").with_filler_fills(vec![
            fill(unsettled, 1),
            fill(settled, 1),
            fill(missing, 1),
            fill(unknown_domain, 999),
        ]));

        let clients: Vec<Arc<dyn ChainClient>> = vec![source, destination];
        let detector = SettlementDetector::new(ChainClients::with_clients(config, clients));

        let detection = detector.detect(&HashSet::new()).await;
        assert!(detection.complete);
        let candidates: Vec<_> = detection.candidates().collect();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].order_id, unsettled);
        assert_eq!(candidates[0].source_chain_id, "1");
        assert_eq!(candidates[0].destination_chain_id, "42161");
        assert_eq!(candidates[0].amount, U256::from(40));
        assert_eq!(
            candidates[0].source_chain_gateway,
            "0xe7935104c9670015b21c6300e5b95d2f75474cda"
        );

        let seen: HashSet<B256> = detection.checked.iter().map(|(order_id, _)| *order_id).collect();
        assert_eq!(seen, HashSet::from([unsettled, settled, missing]));

        let again = detector.detect(&seen).await;
        assert!(again.checked.is_empty());
        assert!(again.complete);
    }
}
