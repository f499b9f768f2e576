//! Solidity interface bindings for the account abstraction entry point.
//!
//! This crate holds the ABI surface shared by the entry point, its collaborators and off-chain
//! tooling: the [`UserOperation`] record, the entry point events and errors, and the calls of the
//! sample account, paymaster and aggregator interfaces.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(not(feature = "std"), no_std)]

pub use alloy_primitives;
pub use alloy_sol_types;

use alloy_sol_types::sol;
use serde::{Deserialize, Serialize};

sol! {
    /// A user operation submitted to the entry point on behalf of `sender`.
    ///
    /// A zero `paymaster` means the operation is self-funded.
    #[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    struct UserOperation {
        address sender;
        uint256 nonce;
        bytes initCode;
        bytes callData;
        uint256 callGas;
        uint256 verificationGas;
        uint256 preVerificationGas;
        uint256 maxFeePerGas;
        uint256 maxPriorityFeePerGas;
        address paymaster;
        bytes paymasterData;
        bytes signature;
    }

    /// A zero-knowledge membership proof bound to a nullifier.
    #[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    struct MembershipProof {
        uint256 root;
        uint256 nullifierHash;
        uint256 externalNullifier;
        uint256[8] proof;
    }

    /// Combined signature blob of the proof-gated aggregator: the inner aggregated signature plus
    /// one membership proof per operation, in batch order.
    #[derive(Debug, Default, PartialEq, Eq)]
    struct ProofGatedSignature {
        bytes aggregatedSignature;
        MembershipProof[] proofs;
    }

    /// Events and errors of the entry point.
    interface IEntryPoint {
        /// Emitted for every settled user operation.
        #[derive(Debug, PartialEq, Eq)]
        event UserOperationEvent(
            bytes32 indexed requestId,
            address indexed sender,
            address indexed paymaster,
            uint256 nonce,
            uint256 actualGasCost,
            uint256 actualGasPrice,
            bool success
        );

        /// Emitted when the call payload of a user operation reverted with data.
        #[derive(Debug, PartialEq, Eq)]
        event UserOperationRevertReason(
            bytes32 indexed requestId,
            address indexed sender,
            uint256 nonce,
            bytes revertReason
        );

        /// Emitted when a sender was deployed from its init code.
        #[derive(Debug, PartialEq, Eq)]
        event AccountDeployed(
            bytes32 indexed requestId,
            address indexed sender,
            address factory,
            address paymaster
        );

        /// A user operation was rejected during validation.
        #[derive(Debug, PartialEq, Eq)]
        error FailedOp(uint256 opIndex, address paymaster, string reason);

        /// The aggregated signature of a batch did not verify.
        #[derive(Debug, PartialEq, Eq)]
        error SignatureValidationFailed(address aggregator);
    }

    /// Events of the deposit ledger.
    interface IStakeManager {
        /// The deposit of `account` changed to `totalDeposit`.
        #[derive(Debug, PartialEq, Eq)]
        event Deposited(address indexed account, uint256 totalDeposit);

        /// `amount` of the deposit of `account` was paid out to `withdrawAddress`.
        #[derive(Debug, PartialEq, Eq)]
        event Withdrawn(address indexed account, address withdrawAddress, uint256 amount);

        /// The stake of `account` was locked.
        #[derive(Debug, PartialEq, Eq)]
        event StakeLocked(address indexed account, uint256 totalStaked, uint256 unstakeDelaySec);

        /// `account` started unlocking its stake.
        #[derive(Debug, PartialEq, Eq)]
        event StakeUnlocked(address indexed account, uint256 withdrawTime);

        /// The stake of `account` was paid out to `withdrawAddress`.
        #[derive(Debug, PartialEq, Eq)]
        event StakeWithdrawn(address indexed account, address withdrawAddress, uint256 amount);
    }

    /// The sample account wallet.
    interface ISimpleAccount {
        /// Calls `dest` with `value` and `func`.
        function execute(address dest, uint256 value, bytes func) external;
        /// Returns the current nonce of the account.
        function nonce() external view returns (uint256);
    }

    /// The sample account factory.
    interface ISimpleAccountFactory {
        /// Deploys an account owned by `owner`.
        function createAccount(address owner) external returns (address);
    }

    /// Accounts that sign with BLS keys.
    interface IBlsAccount {
        /// Returns the compressed G1 public key of the account.
        function getBlsPublicKey() external view returns (bytes publicKey);
    }

    /// The verifying paymaster administration interface.
    interface IVerifyingPaymaster {
        /// Returns the off-chain signer whose signature authorizes sponsorship.
        function verifyingSigner() external view returns (address);
        /// Rotates the off-chain signer. Owner only.
        function setVerifyingSigner(address signer) external;
    }
}
