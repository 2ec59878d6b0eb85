//! Bridge contract ABI definitions
//!
//! Uses alloy's sol! macro to generate type-safe bindings for the portal,
//! synthesis and meta-router contracts, plus the third-party contracts whose
//! logs mark an extra step (ThorChain router, Chainflip vault).
//!
//! Request ids flow through these events as follows:
//! - `SynthesizeRequest` / `BurnRequest` carry the internal id (non-indexed)
//!   and the destination chain (indexed `chainID`)
//! - completion events carry the external id as their first indexed topic

#![allow(clippy::too_many_arguments)]

use alloy::sol;

sol! {
    // ========================================================================
    // Shared Structs
    // ========================================================================

    /// Hub-relayed synthesize arguments
    struct MetaSynthesizeTransaction {
        uint256 stableBridgingFee;
        uint256 amount;
        address rtoken;
        address chain2address;
        address receiveSide;
        address oppositeBridge;
        address syntCaller;
        uint256 chainID;
        address[] swapTokens;
        address secondDexRouter;
        bytes secondSwapCalldata;
        address finalReceiveSide;
        bytes finalCalldata;
        uint256 finalOffset;
        address revertableAddress;
        bytes32 clientID;
    }

    /// Revert of a hub-relayed transfer, issued on the chain holding the
    /// stuck request and relayed through the hub
    struct MetaRevertTransaction {
        uint256 stableBridgingFee;
        bytes32 internalID;
        address receiveSide;
        address managerChainBridge;
        address sourceChainBridge;
        uint256 managerChainId;
        uint256 sourceChainId;
        address router;
        bytes swapCalldata;
        address sourceChainSynthesis;
        address burnToken;
        bytes burnCalldata;
        bytes32 clientID;
    }

    struct MetaRouteTransaction {
        bytes firstSwapCalldata;
        bytes secondSwapCalldata;
        address[] approvedTokens;
        address firstDexRouter;
        address secondDexRouter;
        uint256 amount;
        bool nativeIn;
        address relayRecipient;
        bytes otherSideCalldata;
    }

    // ========================================================================
    // Portal (origin-asset custody)
    // ========================================================================

    contract Portal {
        /// Origin asset locked, synthetic to be minted on `chainID`
        event SynthesizeRequest(
            bytes32 id,
            address indexed from,
            uint256 indexed chainID,
            address indexed revertableAddress,
            address to,
            uint256 amount,
            address token
        );

        /// Burned synthetic paid out as origin asset
        event BurnCompleted(
            bytes32 indexed id,
            bytes32 indexed crossChainID,
            address indexed to,
            uint256 amount,
            uint256 bridgingFee,
            address token
        );

        /// Locked origin asset returned to the revertable address
        event RevertSynthesizeCompleted(
            bytes32 indexed id,
            address indexed to,
            uint256 amount,
            uint256 bridgingFee,
            address token
        );

        event RevertBurnRequest(bytes32 indexed id, address indexed to);

        function synthesize(
            uint256 stableBridgingFee,
            address token,
            uint256 amount,
            address chain2address,
            address receiveSide,
            address oppositeBridge,
            address revertableAddress,
            uint256 chainID,
            bytes32 clientID
        ) external returns (bytes32);

        function metaSynthesize(MetaSynthesizeTransaction memory metaSynthesizeTransaction) external returns (bytes32);

        function unsynthesize(
            uint256 stableBridgingFee,
            bytes32 externalID,
            bytes32 crossChainID,
            address rtoken,
            uint256 amount,
            address chain2address
        ) external;

        function revertSynthesize(uint256 stableBridgingFee, bytes32 externalID) external;

        function revertBurnRequest(
            uint256 stableBridgingFee,
            bytes32 internalID,
            address receiveSide,
            address oppositeBridge,
            uint256 chainID,
            bytes32 clientID
        ) external;

        function metaRevertRequest(MetaRevertTransaction memory metaRevertTransaction) external;

        function requests(bytes32 internalID) external view returns (
            address recipient,
            address chain2address,
            uint256 amount,
            address rtoken,
            uint256 chainID,
            uint8 state
        );

        function unsynthesizeStates(bytes32 externalID) external view returns (uint8);
    }

    // ========================================================================
    // Synthesis (synthetic mint/burn)
    // ========================================================================

    contract Synthesis {
        /// Synthetic burned, origin asset to be released on `chainID`
        event BurnRequest(
            bytes32 id,
            address indexed from,
            uint256 indexed chainID,
            address indexed revertableAddress,
            address to,
            uint256 amount,
            address token
        );

        event SynthesizeCompleted(
            bytes32 indexed id,
            address indexed to,
            bytes32 crossChainID,
            uint256 amount,
            uint256 bridgingFee,
            address token
        );

        /// Revert of an unfinished synthesize requested on this chain;
        /// the origin portal on `chainID` completes it
        event RevertSynthesizeRequest(
            bytes32 indexed id,
            address indexed to,
            uint256 indexed chainID
        );

        event RevertBurnCompleted(
            bytes32 indexed id,
            address indexed to,
            uint256 amount,
            uint256 bridgingFee,
            address token
        );

        /// Burn paid out on Bitcoin by the forwarder, keyed by serial
        event BurnRequestBTC(
            uint256 indexed serialNumber,
            bytes32 indexed externalID,
            uint256 indexed externalChainID,
            address from,
            bytes to,
            uint256 amount,
            address token
        );

        /// Burn paid out by the TON portal
        event BurnRequestTON(
            bytes32 indexed externalID,
            uint256 indexed chainID,
            address indexed from,
            bytes to,
            uint256 amount,
            address token
        );

        function mintSyntheticToken(
            uint256 stableBridgingFee,
            bytes32 externalID,
            bytes32 crossChainID,
            address tokenReal,
            uint256 chainID,
            uint256 amount,
            address to
        ) external;

        function revertSynthesizeRequest(
            uint256 stableBridgingFee,
            bytes32 internalID,
            address receiveSide,
            address oppositeBridge,
            uint256 chainID,
            bytes32 clientID
        ) external;

        function revertSynthesizeRequestByBridge(
            uint256 stableBridgingFee,
            bytes32 internalID,
            address receiveSide,
            address oppositeBridge,
            uint256 chainID,
            address revertableAddress,
            bytes32 clientID
        ) external;

        function revertBurn(uint256 stableBridgingFee, bytes32 externalID) external;

        function revertBurnAndBurn(
            uint256 stableBridgingFee,
            bytes32 externalID,
            address receiveSide,
            address oppositeBridge,
            uint256 chainID,
            address revertableAddress,
            bytes32 clientID
        ) external;

        function requests(bytes32 internalID) external view returns (
            address recipient,
            address chain2address,
            uint256 amount,
            address stoken,
            uint256 chainID,
            uint8 state
        );

        function synthesizeStates(bytes32 externalID) external view returns (uint8);
    }

    // ========================================================================
    // MetaRouter (hub routing)
    // ========================================================================

    contract MetaRouter {
        function metaRoute(MetaRouteTransaction calldata metaRouteTransaction) external payable;
    }

    // ========================================================================
    // Third-party Extra Step Markers
    // ========================================================================

    contract ThorRouter {
        event Deposit(address indexed to, address indexed asset, uint256 amount, string memo);
    }

    contract ChainflipVault {
        event SwapNative(
            uint32 dstChain,
            bytes dstAddress,
            uint32 dstToken,
            uint256 amount,
            address indexed sender,
            bytes cfParameters
        );

        event SwapToken(
            uint32 dstChain,
            bytes dstAddress,
            uint32 dstToken,
            address srcToken,
            uint256 amount,
            address indexed sender,
            bytes cfParameters
        );
    }
}
