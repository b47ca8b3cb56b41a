//! Fast transfer gateway contract bindings.

use crate::types::Order;
use alloy::{
    primitives::{B256, Bytes},
    sol,
};

sol! {
    /// Order as encoded by the fast transfer gateway.
    #[derive(Debug, PartialEq, Eq)]
    struct FastTransferOrder {
        bytes32 sender;
        bytes32 recipient;
        uint256 amountIn;
        uint256 amountOut;
        uint32 nonce;
        uint32 sourceDomain;
        uint32 destinationDomain;
        uint64 timeoutTimestamp;
        bytes data;
    }

    /// Fast transfer gateway.
    #[sol(rpc)]
    interface IFastTransferGateway {
        #[derive(Debug)]
        event OrderFilled(bytes32 indexed orderId, address indexed filler);

        function fillOrder(address filler, FastTransferOrder memory order) external;

        function initiateSettlement(bytes32 repaymentAddress, bytes memory orderIds) external payable;

        function quoteInitiateSettlement(uint32 sourceDomain, bytes32 repaymentAddress, bytes memory orderIds)
            external
            view
            returns (uint256);

        function initiateTimeout(FastTransferOrder[] memory orders) external payable;

        function quoteInitiateTimeout(uint32 sourceDomain, FastTransferOrder[] memory orders)
            external
            view
            returns (uint256);

        function orderStatuses(bytes32 orderId) external view returns (uint8);

        function orderFills(bytes32 orderId)
            external
            view
            returns (bytes32 filledOrderId, address filler, uint32 sourceDomain);

        function orderExists(bytes32 orderId) external view returns (bool exists, uint256 amountIn);
    }

    /// ERC20 balance lookup.
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
    }
}

/// Left pads chain-native address bytes to a 32 byte word.
///
/// Returns `None` for inputs longer than 32 bytes.
pub fn left_pad_word(bytes: &[u8]) -> Option<B256> {
    if bytes.len() > 32 {
        return None;
    }
    let mut word = B256::ZERO;
    word[32 - bytes.len()..].copy_from_slice(bytes);
    Some(word)
}

impl FastTransferOrder {
    /// Encodes `order` the way the gateway hashes and stores it.
    pub fn from_order(order: &Order, source_domain: u32, destination_domain: u32) -> Option<Self> {
        Some(Self {
            sender: left_pad_word(&order.sender)?,
            recipient: left_pad_word(&order.recipient)?,
            amountIn: order.amount_in,
            amountOut: order.amount_out,
            nonce: order.nonce,
            sourceDomain: source_domain,
            destinationDomain: destination_domain,
            timeoutTimestamp: order.timeout_timestamp.timestamp().max(0) as u64,
            data: order.data.clone().unwrap_or_else(Bytes::new),
        })
    }
}

/// Packs order ids into the `orderIds` argument of `initiateSettlement`.
pub fn pack_order_ids(order_ids: &[B256]) -> Bytes {
    order_ids.iter().flat_map(|id| id.0).collect::<Vec<u8>>().into()
}
