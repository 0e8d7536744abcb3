//! Dry-run weighing of programs and the fee arithmetic built on it.

use crate::{builder::xcm_version, chain::ChainHandle, Error, Result};
use codec::{Decode, Encode};
use ethabi::{ParamType, Token};
use serde::{Deserialize, Serialize};
use sp_core::H160;
use xcm::{v3::Weight, VersionedXcm};

/// Runtime API method weighing a program.
pub const QUERY_XCM_WEIGHT: &str = "XcmPaymentApi_query_xcm_weight";

/// Address of the XcmUtils precompile (2060).
pub const XCM_UTILS_ADDRESS: H160 = H160([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x08, 0x0c,
]);

const WEIGHT_MESSAGE: &str = "weightMessage";

/// Where a node is asked for weights.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightBackend {
    #[default]
    RuntimeApi,
    Precompile,
}

/// Failure reported by the payment runtime API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode)]
pub enum XcmPaymentApiError {
    Unimplemented,
    VersionedConversionFailed,
    WeightNotComputable,
    UnhandledXcmVersion,
    AssetNotFound,
    Unroutable,
}

/// Weight `program` would consume on `chain`.
pub async fn weight_message<C: ChainHandle + ?Sized>(chain: &C, program: &VersionedXcm<()>) -> Result<Weight> {
    let weight = chain.dry_run_weight(program).await?;
    tracing::debug!(target: "xcm::weight", version = xcm_version(program), ?weight, "weighed program");
    Ok(weight)
}

/// Decodes the SCALE `Result<Weight, _>` returned by [`QUERY_XCM_WEIGHT`].
pub fn decode_query_xcm_weight(mut bytes: &[u8]) -> Result<Weight> {
    match Result::<Weight, XcmPaymentApiError>::decode(&mut bytes)? {
        Ok(weight) => Ok(weight),
        Err(e) => Err(Error::unexpected(QUERY_XCM_WEIGHT, format!("{e:?}"))),
    }
}

/// Calldata for `weightMessage(bytes)` on the precompile.
pub fn encode_weight_message_call(program: &VersionedXcm<()>) -> Vec<u8> {
    let mut call = ethabi::short_signature(WEIGHT_MESSAGE, &[ParamType::Bytes]).to_vec();
    call.extend(ethabi::encode(&[Token::Bytes(program.encode())]));
    call
}

/// Reference time returned by `weightMessage`.
pub fn decode_weight_message_output(output: &[u8]) -> Result<Weight> {
    let tokens = ethabi::decode(&[ParamType::Uint(64)], output)?;
    match tokens.as_slice() {
        [Token::Uint(value)] if value.bits() <= 64 => Ok(Weight::from_parts(value.low_u64(), 0)),
        _ => Err(Error::unexpected("eth_call", format!("{WEIGHT_MESSAGE} returned {tokens:?}"))),
    }
}

/// Amount credited after paying `weight` at `fee_per_weight` out of `amount`.
pub fn expected_deposit(amount: u128, weight: Weight, fee_per_weight: u128) -> Result<u128> {
    let fee = fee_per_weight.saturating_mul(weight.ref_time().into());
    amount.checked_sub(fee).ok_or(Error::FeeExceedsAmount { amount, fee })
}

#[cfg(test)]
mod tests {
    use super::*;
    use xcm::v3;

    #[test]
    fn precompile_address_is_2060() {
        assert_eq!(XCM_UTILS_ADDRESS.to_low_u64_be(), 2060);
    }

    #[test]
    fn weight_message_calldata() {
        let program = VersionedXcm::V3(v3::Xcm(vec![v3::Instruction::ClearOrigin]));
        let call = encode_weight_message_call(&program);
        assert_eq!(&call[..4], &ethabi::short_signature("weightMessage", &[ParamType::Bytes]));
        // selector, offset, length, padded payload
        assert_eq!(call.len(), 4 + 32 + 32 + 32);
        assert_eq!(call[4 + 31], 0x20);
        assert_eq!(call[4 + 63], 3);
        assert_eq!(&call[4 + 64..4 + 67], &program.encode()[..]);
    }

    #[test]
    fn weight_message_output() {
        let output = ethabi::encode(&[Token::Uint(1_234u64.into())]);
        assert_eq!(decode_weight_message_output(&output).unwrap(), Weight::from_parts(1_234, 0));
        assert!(decode_weight_message_output(&[1, 2]).is_err());
    }

    #[test]
    fn runtime_api_result() {
        let ok = Ok::<_, XcmPaymentApiError>(Weight::from_parts(400, 8)).encode();
        assert_eq!(decode_query_xcm_weight(&ok).unwrap(), Weight::from_parts(400, 8));
        let err = Err::<Weight, _>(XcmPaymentApiError::WeightNotComputable).encode();
        assert!(decode_query_xcm_weight(&err).unwrap_err().to_string().contains("WeightNotComputable"));
    }

    #[test]
    fn deposit_is_amount_minus_fee() {
        let weight = Weight::from_parts(300_000_000, 0);
        assert_eq!(expected_deposit(1_000_000_000, weight, 2).unwrap(), 400_000_000);
        assert!(matches!(
            expected_deposit(10, weight, 1),
            Err(Error::FeeExceedsAmount { amount: 10, fee: 300_000_000 })
        ));
    }
}
