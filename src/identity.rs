//! Deterministic account identities used as message origins, and the
//! locations that name them.
//!
//! Sovereign accounts are the plain `AccountIdConversion` layout truncated to
//! 20 bytes; descended origins follow the runtime's location hashing.

use codec::{Compact, Encode};
use sp_core::{hashing::blake2_256, H160};
use xcm::{
    v2,
    v3::{Junction, Junctions, MultiLocation},
};

const SIBLING_PREFIX: &[u8; 4] = b"sibl";
const CHILD_PREFIX: &[u8; 4] = b"para";
const PARENT_PREFIX: &[u8; 6] = b"Parent";

/// Parachain whose account-key junction the legacy descended origin hashes.
pub const LEGACY_DESCEND_PARA_ID: u32 = 1;

fn padded(prefix: &[u8], para_id: Option<u32>) -> H160 {
    let mut account = [0u8; 20];
    account[..prefix.len()].copy_from_slice(prefix);
    if let Some(para_id) = para_id {
        account[prefix.len()..prefix.len() + 4].copy_from_slice(&para_id.to_le_bytes());
    }
    H160(account)
}

fn truncated(hash: [u8; 32]) -> H160 {
    H160::from_slice(&hash[..20])
}

/// Sibling parachain `para_id`, seen from a parachain.
pub fn sibling_location(para_id: u32) -> MultiLocation {
    MultiLocation::new(1, Junctions::X1(Junction::Parachain(para_id)))
}

/// Pallet `index` of the local runtime.
pub fn pallet_location(index: u8) -> MultiLocation {
    MultiLocation::new(0, Junctions::X1(Junction::PalletInstance(index)))
}

/// Local 20-byte account on any network.
pub fn account_key20_location(key: H160) -> MultiLocation {
    MultiLocation::new(0, Junctions::X1(Junction::AccountKey20 { network: None, key: key.0 }))
}

/// Account of a sibling parachain on this chain.
pub fn sovereign_account_of_sibling(para_id: u32) -> H160 {
    padded(SIBLING_PREFIX, Some(para_id))
}

/// Account of a child parachain on the relay chain.
pub fn sovereign_account_of_child(para_id: u32) -> H160 {
    padded(CHILD_PREFIX, Some(para_id))
}

/// Account of the relay chain on this chain.
pub fn sovereign_account_of_parent() -> H160 {
    padded(PARENT_PREFIX, None)
}

/// Account a `DescendOrigin` into `origin` resolves to, using the legacy
/// `("multiloc", location)` hashing.
pub fn descend_origin_from_address(origin: H160) -> H160 {
    let location = v2::MultiLocation::new(
        1,
        v2::Junctions::X2(
            v2::Junction::Parachain(LEGACY_DESCEND_PARA_ID),
            v2::Junction::AccountKey20 { network: v2::NetworkId::Any, key: origin.0 },
        ),
    );
    truncated(blake2_256(&("multiloc", location).encode()))
}

/// Account a `DescendOrigin` into `origin` from sibling `para_id` resolves to
/// under the `HashedDescription` scheme.
pub fn descend_origin_from_address20(para_id: u32, origin: H160) -> H160 {
    let tail = (b"AccountKey20", origin.0).encode();
    truncated(blake2_256(&(b"SiblingChain", Compact(para_id), tail).encode()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    const ALL_ONES: H160 = H160([1u8; 20]);

    #[test]
    fn sibling_sovereign_layout() {
        assert_eq!(
            sovereign_account_of_sibling(1_000),
            H160(hex!("7369626ce8030000000000000000000000000000"))
        );
        assert_eq!(
            sovereign_account_of_sibling(2_000).0[..8],
            [b's', b'i', b'b', b'l', 0xd0, 0x07, 0, 0]
        );
    }

    #[test]
    fn child_and_parent_sovereigns() {
        assert_eq!(
            sovereign_account_of_child(2_000),
            H160(hex!("70617261d0070000000000000000000000000000"))
        );
        assert_eq!(
            sovereign_account_of_parent(),
            H160(hex!("506172656e740000000000000000000000000000"))
        );
    }

    #[test]
    fn legacy_descended_origin_of_all_ones() {
        assert_eq!(
            descend_origin_from_address(ALL_ONES),
            H160(hex!("6a6174970cb8b67c05208086405a0c67342625d8"))
        );
    }

    #[test]
    fn hashed_descended_origin_of_all_ones() {
        assert_eq!(
            descend_origin_from_address20(1, ALL_ONES),
            H160(hex!("87f93a7a8196beee68c4bd81e1c7f596f9d5d50a"))
        );
    }

    #[test]
    fn locations_use_v3_layout() {
        assert_eq!(sibling_location(1_000).encode(), vec![1, 1, 0, 0xa1, 0x0f]);
        assert_eq!(pallet_location(3).encode(), vec![0, 1, 4, 3]);
        let beneficiary = account_key20_location(ALL_ONES).encode();
        assert_eq!(beneficiary[..4], [0, 1, 3, 0]);
        assert_eq!(beneficiary[4..], [1u8; 20]);
    }

    #[test]
    fn derivation_is_deterministic() {
        let origin = H160([7u8; 20]);
        assert_eq!(descend_origin_from_address(origin), descend_origin_from_address(origin));
        assert_ne!(descend_origin_from_address(origin), descend_origin_from_address(ALL_ONES));
        assert_ne!(descend_origin_from_address20(1, origin), descend_origin_from_address20(2, origin));
    }
}
