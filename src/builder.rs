//! Fluent construction of XCM programs from a declarative configuration.
//!
//! `XcmFragment` is a consuming builder: every call takes the fragment by
//! value and hands it back with one more instruction, and `as_v2`/`as_v3`
//! consume it into a finalized [`VersionedXcm`].

use crate::{
    chain::ChainHandle,
    identity::account_key20_location,
    Error, Result,
};
use sp_core::H160;
use tracing::{debug, trace};
use xcm::{
    v2,
    v3::{
        AssetId, Error as XcmError, Fungibility, Instruction, Junction, Junctions, MaybeErrorCode, MultiAsset,
        MultiAssetFilter, MultiAssets, MultiLocation, NetworkId, OriginKind, QueryId, QueryResponseInfo, Weight,
        WeightLimit, WildMultiAsset, Xcm,
    },
    VersionedXcm,
};

const LOG_TARGET: &str = "xcm::builder";

/// Ticket used when claiming trapped assets.
const CLAIM_TICKET: Junction = Junction::GeneralIndex(4);

/// Instruction set version `program` is expressed in.
pub fn xcm_version(program: &VersionedXcm<()>) -> u32 {
    match program {
        VersionedXcm::V2(_) => 2,
        VersionedXcm::V3(_) => 3,
    }
}

/// An asset the fragment moves, identified by its concrete location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FragmentAsset {
    pub location: MultiLocation,
    pub amount: u128,
}

impl FragmentAsset {
    pub fn new(location: MultiLocation, amount: u128) -> Self {
        Self { location, amount }
    }

    fn to_multi_asset(&self) -> MultiAsset {
        fungible(self.location, self.amount)
    }
}

fn fungible(location: MultiLocation, amount: u128) -> MultiAsset {
    MultiAsset { id: AssetId::Concrete(location), fun: Fungibility::Fungible(amount) }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct XcmFragmentConfig {
    pub assets: Vec<FragmentAsset>,
    /// `None` buys unlimited weight.
    pub weight_limit: Option<Weight>,
    pub descend_origin: Option<H160>,
    pub beneficiary: Option<H160>,
}

#[derive(Clone, Debug)]
pub struct XcmFragment {
    config: XcmFragmentConfig,
    instructions: Vec<Instruction<()>>,
}

impl XcmFragment {
    pub fn new(config: XcmFragmentConfig) -> Self {
        Self { config, instructions: Vec::new() }
    }

    pub fn config(&self) -> &XcmFragmentConfig {
        &self.config
    }

    pub fn instructions(&self) -> &[Instruction<()>] {
        &self.instructions
    }

    fn push(mut self, instruction: Instruction<()>) -> Self {
        trace!(target: LOG_TARGET, ?instruction, position = self.instructions.len(), "push");
        self.instructions.push(instruction);
        self
    }

    fn asset(&self, index: usize) -> Result<&FragmentAsset> {
        self.config
            .assets
            .get(index)
            .ok_or(Error::AssetIndexOutOfRange { index, len: self.config.assets.len() })
    }

    /// Every configured asset, in canonical order with equal ids merged.
    fn all_assets(&self) -> Result<MultiAssets> {
        self.all_assets_with(|asset| asset.amount)
    }

    fn all_assets_with(&self, amount: impl Fn(&FragmentAsset) -> u128) -> Result<MultiAssets> {
        if self.config.assets.is_empty() {
            return Err(Error::NoAssets);
        }
        let assets: Vec<_> = self.config.assets.iter().map(|asset| fungible(asset.location, amount(asset))).collect();
        Ok(assets.into())
    }

    fn first_asset(&self) -> Result<MultiAsset> {
        self.config.assets.first().map(FragmentAsset::to_multi_asset).ok_or(Error::NoAssets)
    }

    fn beneficiary(&self) -> Result<MultiLocation> {
        let key = self.config.beneficiary.ok_or(Error::MissingBeneficiary)?;
        Ok(account_key20_location(key))
    }

    fn weight_limit(&self) -> WeightLimit {
        self.config.weight_limit.into()
    }

    /// Fragment sharing this configuration but no instructions, used to
    /// build nested programs.
    fn nested(&self) -> Self {
        Self::new(self.config.clone())
    }

    pub fn reserve_asset_deposited(self) -> Result<Self> {
        let assets = self.all_assets()?;
        Ok(self.push(Instruction::ReserveAssetDeposited(assets)))
    }

    pub fn withdraw_asset(self) -> Result<Self> {
        let assets = self.all_assets()?;
        Ok(self.push(Instruction::WithdrawAsset(assets)))
    }

    /// Pays fees with the configured asset at `fee_index`.
    pub fn buy_execution(self, fee_index: usize) -> Result<Self> {
        self.buy_execution_repeated(fee_index, 1)
    }

    pub fn buy_execution_repeated(mut self, fee_index: usize, repeat: usize) -> Result<Self> {
        let fees = self.asset(fee_index)?.to_multi_asset();
        let weight_limit = self.weight_limit();
        for _ in 0..repeat {
            self = self.push(Instruction::BuyExecution { fees: fees.clone(), weight_limit: weight_limit.clone() });
        }
        Ok(self)
    }

    pub fn refund_surplus(self) -> Self {
        self.refund_surplus_repeated(1)
    }

    pub fn refund_surplus_repeated(mut self, repeat: usize) -> Self {
        for _ in 0..repeat {
            self = self.push(Instruction::RefundSurplus);
        }
        self
    }

    pub fn claim_asset(self, index: usize) -> Result<Self> {
        let asset = self.asset(index)?.to_multi_asset();
        Ok(self.push(Instruction::ClaimAsset {
            assets: asset.into(),
            ticket: MultiLocation::new(0, Junctions::X1(CLAIM_TICKET)),
        }))
    }

    pub fn clear_origin(self) -> Self {
        self.clear_origin_repeated(1)
    }

    pub fn clear_origin_repeated(mut self, repeat: usize) -> Self {
        for _ in 0..repeat {
            self = self.push(Instruction::ClearOrigin);
        }
        self
    }

    /// Descends into the configured origin address on any network.
    pub fn descend_origin(self) -> Result<Self> {
        self.descend_origin_on(None)
    }

    pub fn descend_origin_on(self, network: Option<NetworkId>) -> Result<Self> {
        let key = self.config.descend_origin.ok_or(Error::MissingDescendOrigin)?;
        Ok(self.push(Instruction::DescendOrigin(Junctions::X1(Junction::AccountKey20 { network, key: key.0 }))))
    }

    /// Deposits everything held to the beneficiary, bounded to one asset.
    pub fn deposit_asset(self) -> Result<Self> {
        self.deposit_asset_counted(1)
    }

    pub fn deposit_asset_counted(self, max_assets: u32) -> Result<Self> {
        let beneficiary = self.beneficiary()?;
        Ok(self.push(Instruction::DepositAsset {
            assets: MultiAssetFilter::Wild(WildMultiAsset::AllCounted(max_assets)),
            beneficiary,
        }))
    }

    pub fn deposit_asset_definite(self, location: MultiLocation, amount: u128, beneficiary: H160) -> Self {
        self.push(Instruction::DepositAsset {
            assets: MultiAssetFilter::Definite(fungible(location, amount).into()),
            beneficiary: account_key20_location(beneficiary),
        })
    }

    /// Installs an error handler built by `build` on a fresh fragment.
    pub fn set_error_handler_with<F>(self, build: F) -> Result<Self>
    where
        F: FnOnce(Self) -> Result<Self>,
    {
        let handler = build(self.nested())?;
        Ok(self.push(Instruction::SetErrorHandler(Xcm(handler.instructions))))
    }

    /// Installs an appendix built by `build` on a fresh fragment.
    pub fn set_appendix_with<F>(self, build: F) -> Result<Self>
    where
        F: FnOnce(Self) -> Result<Self>,
    {
        let appendix = build(self.nested())?;
        Ok(self.push(Instruction::SetAppendix(Xcm(appendix.instructions))))
    }

    pub fn trap(self) -> Self {
        self.push(Instruction::Trap(0))
    }

    pub fn push_any(self, instruction: Instruction<()>) -> Self {
        self.push(instruction)
    }

    /// Applies `f` in the middle of a chain.
    pub fn with<F>(self, f: F) -> Result<Self>
    where
        F: FnOnce(Self) -> Result<Self>,
    {
        f(self)
    }

    pub fn transact(self, origin_kind: OriginKind, require_weight_at_most: Weight, call: Vec<u8>) -> Self {
        self.push(Instruction::Transact { origin_kind, require_weight_at_most, call: call.into() })
    }

    /// Burns every configured asset, or `amount` of each when given.
    pub fn burn_asset(self, amount: Option<u128>) -> Result<Self> {
        let assets = self.all_assets_with(|asset| amount.unwrap_or(asset.amount))?;
        Ok(self.push(Instruction::BurnAsset(assets)))
    }

    pub fn report_holding(self, destination: MultiLocation, query_id: QueryId, max_weight: Weight) -> Self {
        self.push(Instruction::ReportHolding {
            response_info: QueryResponseInfo { destination, query_id, max_weight },
            assets: MultiAssetFilter::Wild(WildMultiAsset::All),
        })
    }

    pub fn expect_asset(self) -> Result<Self> {
        let assets = self.all_assets()?;
        Ok(self.push(Instruction::ExpectAsset(assets)))
    }

    pub fn expect_origin(self, origin: Option<MultiLocation>) -> Self {
        self.push(Instruction::ExpectOrigin(origin))
    }

    pub fn expect_error(self, error: Option<(u32, XcmError)>) -> Self {
        self.push(Instruction::ExpectError(error))
    }

    pub fn expect_transact_status(self, status: MaybeErrorCode) -> Self {
        self.push(Instruction::ExpectTransactStatus(status))
    }

    pub fn query_pallet(
        self,
        module_name: &str,
        destination: MultiLocation,
        query_id: QueryId,
        max_weight: Weight,
    ) -> Self {
        self.push(Instruction::QueryPallet {
            module_name: module_name.as_bytes().to_vec(),
            response_info: QueryResponseInfo { destination, query_id, max_weight },
        })
    }

    pub fn expect_pallet(
        self,
        index: u32,
        name: &str,
        module_name: &str,
        crate_major: u32,
        min_crate_minor: u32,
    ) -> Self {
        self.push(Instruction::ExpectPallet {
            index,
            name: name.as_bytes().to_vec(),
            module_name: module_name.as_bytes().to_vec(),
            crate_major,
            min_crate_minor,
        })
    }

    pub fn report_transact_status(self, destination: MultiLocation, query_id: QueryId, max_weight: Weight) -> Self {
        self.push(Instruction::ReportTransactStatus(QueryResponseInfo { destination, query_id, max_weight }))
    }

    pub fn clear_transact_status(self) -> Self {
        self.push(Instruction::ClearTransactStatus)
    }

    pub fn universal_origin(self, junction: Junction) -> Self {
        self.push(Instruction::UniversalOrigin(junction))
    }

    pub fn export_message(self, network: NetworkId, destination: Junctions, xcm: Xcm<()>) -> Self {
        self.push(Instruction::ExportMessage { network, destination, xcm })
    }

    /// Locks the first configured asset in favour of `unlocker`.
    pub fn lock_asset(self, unlocker: MultiLocation) -> Result<Self> {
        let asset = self.first_asset()?;
        Ok(self.push(Instruction::LockAsset { asset, unlocker }))
    }

    pub fn unlock_asset(self, target: MultiLocation) -> Result<Self> {
        let asset = self.first_asset()?;
        Ok(self.push(Instruction::UnlockAsset { asset, target }))
    }

    pub fn note_unlockable(self, owner: MultiLocation) -> Result<Self> {
        let asset = self.first_asset()?;
        Ok(self.push(Instruction::NoteUnlockable { asset, owner }))
    }

    pub fn request_unlock(self, locker: MultiLocation) -> Result<Self> {
        let asset = self.first_asset()?;
        Ok(self.push(Instruction::RequestUnlock { asset, locker }))
    }

    pub fn set_fees_mode(self, jit_withdraw: bool) -> Self {
        self.push(Instruction::SetFeesMode { jit_withdraw })
    }

    pub fn set_topic(self, topic: [u8; 32]) -> Self {
        self.push(Instruction::SetTopic(topic))
    }

    pub fn clear_topic(self) -> Self {
        self.push(Instruction::ClearTopic)
    }

    pub fn alias_origin(self, origin: MultiLocation) -> Self {
        self.push(Instruction::AliasOrigin(origin))
    }

    pub fn unpaid_execution(self, check_origin: Option<MultiLocation>) -> Self {
        let weight_limit = self.weight_limit();
        self.push(Instruction::UnpaidExecution { weight_limit, check_origin })
    }

    /// Replaces the weight limit of the first `BuyExecution` with the weight
    /// the chain reports for the program as built so far.
    pub async fn override_weight<C: ChainHandle + ?Sized>(mut self, chain: &C) -> Result<Self> {
        let position = self
            .instructions
            .iter()
            .position(|instruction| matches!(instruction, Instruction::BuyExecution { .. }))
            .ok_or(Error::NoBuyExecution)?;
        let program = VersionedXcm::V3(Xcm(self.instructions.clone()));
        let weight = crate::weight::weight_message(chain, &program).await?;
        if let Instruction::BuyExecution { weight_limit, .. } = &mut self.instructions[position] {
            *weight_limit = WeightLimit::Limited(weight);
        }
        debug!(target: LOG_TARGET, position, ?weight, "overrode buy execution weight");
        Ok(self)
    }

    pub fn as_v3(self) -> VersionedXcm<()> {
        debug!(target: LOG_TARGET, instructions = self.instructions.len(), "finalized v3 program");
        VersionedXcm::V3(Xcm(self.instructions))
    }

    /// Lowers the program to version 2, failing on anything version 2
    /// cannot express.
    pub fn as_v2(self) -> Result<VersionedXcm<()>> {
        let xcm = v2::Xcm::try_from(Xcm(self.instructions)).map_err(|()| Error::VersionConversion { version: 2 })?;
        debug!(target: LOG_TARGET, instructions = xcm.0.len(), "finalized v2 program");
        Ok(VersionedXcm::V2(xcm))
    }
}
