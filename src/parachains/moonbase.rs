//! Fixtures of the Moonbase dev chain.

use crate::{chain::MockChain, config::HarnessConfig, identity::pallet_location};
use sp_core::H160;
use xcm::v3::MultiLocation;

pub const ALITH: H160 = H160([
    242, 79, 243, 169, 207, 4, 199, 29, 188, 148, 208, 181, 102, 247, 162, 123, 148, 86, 108, 172,
]);
pub const BALTHAZAR: H160 = H160([
    60, 208, 167, 5, 162, 220, 101, 229, 177, 225, 32, 88, 150, 186, 162, 190, 138, 7, 198, 224,
]);

/// Index of the balances pallet in the runtime.
pub const BALANCES_PALLET_INDEX: u8 = 3;

pub const INITIAL_EVM_BALANCE: u128 = 100 * 10u128.pow(18);

/// The native token, as seen from the chain itself.
pub fn native_location() -> MultiLocation {
    pallet_location(BALANCES_PALLET_INDEX)
}

/// A mock chain whose dev accounts hold their genesis balance, plus
/// `balances`.
pub fn new_mock_chain(config: &HarnessConfig, balances: impl IntoIterator<Item = (H160, u128)>) -> MockChain {
    MockChain::from_config(config)
        .with_balances([(ALITH, INITIAL_EVM_BALANCE), (BALTHAZAR, INITIAL_EVM_BALANCE)])
        .with_balances(balances)
}
