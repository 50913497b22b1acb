//! ============================================================================
//! Payment Contract ABI
//! ============================================================================
//! Solidity interface of the weather access payment contract. `#[sol(rpc)]`
//! generates the provider-bound instance used for reads; the payment
//! calldata is encoded directly for the wallet.
//! ============================================================================

use alloy::primitives::Bytes;
use alloy::sol;
use alloy::sol_types::SolCall;

sol! {
    #[sol(rpc)]
    interface IWeatherAccess {
        function hasAccess(address user) external view returns (bool);
        function checkAccess(address user) external view returns (bool);
        function getAccessPrice() external view returns (uint256);
        function accessPrice() external view returns (uint256);
        function getTotalPayments() external view returns (uint256);
        function getPaymentCount() external view returns (uint256);
        function makePayment() external payable;
    }
}

/// Calldata for `makePayment()`
pub fn encode_make_payment() -> Bytes {
    IWeatherAccess::makePaymentCall {}.abi_encode().into()
}
