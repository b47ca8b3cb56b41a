//! Hyperlane contract interfaces.

use alloy::sol;

sol! {
    /// Hyperlane mailbox.
    #[sol(rpc)]
    interface IMailbox {
        #[derive(Debug)]
        event Dispatch(
            address indexed sender,
            uint32 indexed destination,
            bytes32 indexed recipient,
            bytes message
        );

        #[derive(Debug)]
        event DispatchId(bytes32 indexed messageId);

        function delivered(bytes32 messageId) external view returns (bool);

        function recipientIsm(address recipient) external view returns (address);

        function process(bytes calldata metadata, bytes calldata message) external payable;
    }

    /// Hyperlane merkle tree hook.
    #[sol(rpc)]
    interface IMerkleTreeHook {
        #[derive(Debug)]
        event InsertedIntoTree(bytes32 messageId, uint32 index);

        function count() external view returns (uint32);
    }

    /// Interchain security module.
    #[sol(rpc)]
    interface IInterchainSecurityModule {
        function moduleType() external view returns (uint8);
    }

    /// Routing interchain security module.
    #[sol(rpc)]
    interface IRoutingIsm {
        function route(bytes calldata message) external view returns (address);
    }

    /// Multisig interchain security module.
    #[sol(rpc)]
    interface IMultisigIsm {
        function validatorsAndThreshold(bytes calldata message)
            external
            view
            returns (address[] memory validators, uint8 threshold);
    }

    /// Validator announce.
    #[sol(rpc)]
    interface IValidatorAnnounce {
        function getAnnouncedStorageLocations(address[] calldata validators)
            external
            view
            returns (string[][] memory);
    }
}
