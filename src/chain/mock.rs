//! In-process stand-in for a dev node.
//!
//! Horizontal pages are serviced in the order the scheduler model predicts,
//! and programs run against a native-token ledger kept in the same
//! storage layout as the runtime, so the balance helpers in
//! [`super`] work unchanged. Only the instructions needed to move native
//! funds are executed; anything else fails with `Unimplemented`.
//! Forks share one state: building on an older parent only changes the seed.

use super::{account_key, parent_hash_key, queue_config_key, AccountInfo, BlockOptions, ChainHandle, CreatedBlock};
use crate::{
    config::{HarnessConfig, QueueConfigData, SchedulerConfig},
    identity,
    injector::XcmpMessageFormat,
    parachains::moonbase,
    scheduler::{ExecutionOutcome, SchedulerSimulator},
    Error, Result,
};
use async_trait::async_trait;
use codec::{Decode, DecodeLimit, Encode};
use parking_lot::Mutex;
use sp_core::{hashing::blake2_256, H160, H256};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace, warn};
use xcm::{
    v3::{
        AssetId, Error as XcmError, Fungibility, Instruction, Junction, Junctions, MultiAsset, MultiAssetFilter,
        MultiLocation, Weight, WeightLimit, Xcm,
    },
    VersionedXcm, MAX_XCM_DECODE_DEPTH,
};

const LOG_TARGET: &str = "xcm::mock";

/// Code the mock reports node-side failures with.
pub const NODE_ERROR_CODE: i32 = 20_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum XcmpQueueEvent {
    /// Executed on initialization without error.
    Success { sender: u32, message_hash: H256, weight: Weight },
    /// Failed during execution, or was turned away by the barrier.
    Fail { sender: u32, message_hash: H256, error: XcmError, weight: Weight },
    /// Serviced by the idle hook.
    ExecutedOnIdle { sender: u32, message_hash: H256, error: Option<XcmError> },
    /// Too many pages pending; the channel is no longer serviced.
    ChannelSuspended { sender: u32, pending: u32 },
    DownwardProcessed { message_hash: H256, weight: Weight, error: Option<XcmError> },
}

impl XcmpQueueEvent {
    /// How the event's message was scheduled, for horizontal messages.
    pub fn outcome(&self) -> Option<ExecutionOutcome> {
        match self {
            XcmpQueueEvent::Success { .. } => Some(ExecutionOutcome::ExecutedOnInitialization),
            XcmpQueueEvent::Fail { error: XcmError::Barrier, .. } => Some(ExecutionOutcome::RejectedByBarrier),
            XcmpQueueEvent::Fail { .. } => Some(ExecutionOutcome::ExecutedOnInitialization),
            XcmpQueueEvent::ExecutedOnIdle { .. } => Some(ExecutionOutcome::ExecutedOnIdle),
            XcmpQueueEvent::ChannelSuspended { .. } | XcmpQueueEvent::DownwardProcessed { .. } => None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Block {
    hash: H256,
    number: u32,
}

#[derive(Default)]
struct State {
    storage: BTreeMap<Vec<u8>, Vec<u8>>,
    blocks: Vec<Block>,
    best: usize,
    finalized: usize,
    downward: Vec<Vec<u8>>,
    horizontal: Vec<(u32, Vec<u8>)>,
    suspended: BTreeSet<u32>,
    events: Vec<XcmpQueueEvent>,
    outcomes: Vec<ExecutionOutcome>,
}

impl State {
    fn free_balance(&self, account: H160) -> u128 {
        self.account(account).data.free
    }

    fn account(&self, account: H160) -> AccountInfo {
        self.storage
            .get(&account_key(account))
            .and_then(|v| AccountInfo::decode(&mut &v[..]).ok())
            .unwrap_or_default()
    }

    fn set_free_balance(&mut self, account: H160, free: u128) {
        let mut info = self.account(account);
        info.data.free = free;
        info.providers = info.providers.max(u32::from(free > 0));
        self.storage.insert(account_key(account), info.encode());
    }

    fn queue_config(&self) -> QueueConfigData {
        self.storage
            .get(&queue_config_key())
            .and_then(|v| QueueConfigData::decode(&mut &v[..]).ok())
            .unwrap_or_default()
    }
}

/// A horizontal program awaiting service in the current block.
struct Inbound {
    sender: u32,
    hash: H256,
    program: Result<Xcm<()>, XcmError>,
    weight: Weight,
}

pub struct MockChain {
    state: Mutex<State>,
    total_xcmp_weight: u64,
    max_messages_on_initialization: Option<u32>,
    weight_per_instruction: u64,
    fee_per_weight: u128,
    native: MultiLocation,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::from_config(&HarnessConfig::default())
    }
}

impl MockChain {
    pub fn from_config(config: &HarnessConfig) -> Self {
        let genesis = Block { hash: H256(blake2_256(b"genesis")), number: 0 };
        let state = State { blocks: vec![genesis], ..Default::default() };
        Self {
            state: Mutex::new(state),
            total_xcmp_weight: 0,
            max_messages_on_initialization: None,
            weight_per_instruction: config.weight_per_instruction,
            fee_per_weight: config.fee_per_weight,
            native: moonbase::native_location(),
        }
        .with_scheduler(config.scheduler.clone())
    }

    /// Applies a scheduler budget; threshold and decay land in the stored
    /// queue configuration, where the chain reads them from.
    pub fn with_scheduler(mut self, config: SchedulerConfig) -> Self {
        self.total_xcmp_weight = config.total_xcmp_weight;
        self.max_messages_on_initialization = config.max_messages_on_initialization;
        let state = self.state.get_mut();
        let mut queue = state.queue_config();
        queue.threshold_weight = Weight::from_parts(config.threshold_weight, 0);
        queue.weight_restrict_decay = Weight::from_parts(config.decay_rate, 0);
        state.storage.insert(queue_config_key(), queue.encode());
        self
    }

    pub fn with_weight_per_instruction(mut self, weight: u64) -> Self {
        self.weight_per_instruction = weight;
        self
    }

    pub fn with_fee_per_weight(mut self, fee: u128) -> Self {
        self.fee_per_weight = fee;
        self
    }

    pub fn with_native_location(mut self, location: MultiLocation) -> Self {
        self.native = location;
        self
    }

    pub fn with_balances(mut self, balances: impl IntoIterator<Item = (H160, u128)>) -> Self {
        let state = self.state.get_mut();
        for (account, free) in balances {
            state.set_free_balance(account, free);
        }
        self
    }

    pub fn set_balance(&self, account: H160, free: u128) {
        self.state.lock().set_free_balance(account, free);
    }

    pub fn set_queue_config(&self, queue: QueueConfigData) {
        self.state.lock().storage.insert(queue_config_key(), queue.encode());
    }

    pub fn update_weight_restrict_decay(&self, decay: u64) {
        let mut state = self.state.lock();
        let mut queue = state.queue_config();
        queue.weight_restrict_decay = Weight::from_parts(decay, 0);
        state.storage.insert(queue_config_key(), queue.encode());
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        let queue = self.state.lock().queue_config();
        self.scheduler_config_for(&queue)
    }

    fn scheduler_config_for(&self, queue: &QueueConfigData) -> SchedulerConfig {
        SchedulerConfig {
            total_xcmp_weight: self.total_xcmp_weight,
            threshold_weight: queue.threshold_weight.ref_time(),
            decay_rate: queue.weight_restrict_decay.ref_time(),
            max_messages_on_initialization: self.max_messages_on_initialization,
        }
    }

    /// Events of the last produced block.
    pub fn events(&self) -> Vec<XcmpQueueEvent> {
        self.state.lock().events.clone()
    }

    /// Outcome of each horizontal message serviced in the last block, by
    /// arrival order.
    pub fn last_outcomes(&self) -> Vec<ExecutionOutcome> {
        self.state.lock().outcomes.clone()
    }

    pub fn is_suspended(&self, sender: u32) -> bool {
        self.state.lock().suspended.contains(&sender)
    }

    pub fn resume_channel(&self, sender: u32) {
        self.state.lock().suspended.remove(&sender);
    }

    pub fn pending_horizontal(&self, sender: u32) -> usize {
        self.state.lock().horizontal.iter().filter(|(s, _)| *s == sender).count()
    }

    pub fn best_hash(&self) -> H256 {
        let state = self.state.lock();
        state.blocks[state.best].hash
    }

    pub fn finalized_hash(&self) -> H256 {
        let state = self.state.lock();
        state.blocks[state.finalized].hash
    }

    /// Weight of `xcm`: a flat cost per instruction plus what `Transact`
    /// declares, nested programs included.
    pub fn weigh(&self, xcm: &Xcm<()>) -> Weight {
        Weight::from_parts(self.weigh_ref_time(xcm), 0)
    }

    fn weigh_ref_time(&self, xcm: &Xcm<()>) -> u64 {
        xcm.0.iter().fold(0u64, |total, instruction| {
            let extra = match instruction {
                Instruction::Transact { require_weight_at_most, .. } => require_weight_at_most.ref_time(),
                Instruction::SetErrorHandler(inner) | Instruction::SetAppendix(inner) => self.weigh_ref_time(inner),
                _ => 0,
            };
            total.saturating_add(self.weight_per_instruction).saturating_add(extra)
        })
    }

    fn executor<'a>(&'a self, state: &'a mut State, sender: Option<u32>, weight: Weight) -> Executor<'a> {
        let origin = match sender {
            Some(para_id) => identity::sovereign_account_of_sibling(para_id),
            None => identity::sovereign_account_of_parent(),
        };
        Executor {
            state,
            native: &self.native,
            fee_per_weight: self.fee_per_weight,
            weight,
            sender,
            origin: Some(origin),
            holding: 0,
            error_handler: Xcm::default(),
            appendix: Xcm::default(),
        }
    }

    fn process_downward(&self, state: &mut State, message: Vec<u8>) {
        let message_hash = H256(blake2_256(&message));
        let program = VersionedXcm::<()>::decode_all_with_depth_limit(MAX_XCM_DECODE_DEPTH, &mut &message[..])
            .map_err(|_| XcmError::FailedToDecode)
            .and_then(|xcm| Xcm::try_from(xcm).map_err(|()| XcmError::UnhandledXcmVersion));
        let (weight, error) = match program {
            Ok(xcm) => {
                let weight = self.weigh(&xcm);
                (weight, self.executor(state, None, weight).execute(xcm))
            }
            Err(error) => (Weight::zero(), Some(error)),
        };
        debug!(target: LOG_TARGET, ?message_hash, ?error, "processed downward message");
        state.events.push(XcmpQueueEvent::DownwardProcessed { message_hash, weight, error });
    }

    fn decode_page(&self, sender: u32, page: &[u8]) -> Vec<Inbound> {
        let mut input = page;
        match XcmpMessageFormat::decode(&mut input) {
            Ok(XcmpMessageFormat::ConcatenatedVersionedXcm) => {}
            Ok(format) => {
                warn!(target: LOG_TARGET, sender, ?format, "ignoring page format");
                return Vec::new();
            }
            Err(_) => {
                warn!(target: LOG_TARGET, sender, "page without format");
                return Vec::new();
            }
        }
        let mut inbound = Vec::new();
        while !input.is_empty() {
            let start = input;
            let Ok(program) = VersionedXcm::<()>::decode_with_depth_limit(MAX_XCM_DECODE_DEPTH, &mut input) else {
                warn!(target: LOG_TARGET, sender, remaining = start.len(), "undecodable message in page");
                break;
            };
            let hash = H256(blake2_256(&start[..start.len() - input.len()]));
            let program = Xcm::try_from(program).map_err(|()| XcmError::UnhandledXcmVersion);
            let weight = match &program {
                Ok(xcm) => self.weigh(xcm),
                Err(_) => Weight::zero(),
            };
            inbound.push(Inbound { sender, hash, program, weight });
        }
        inbound
    }

    fn process_horizontal(&self, state: &mut State, seed: H256) {
        let queue = state.queue_config();
        let pages = std::mem::take(&mut state.horizontal);

        let mut pending: BTreeMap<u32, u32> = BTreeMap::new();
        for (sender, _) in &pages {
            *pending.entry(*sender).or_default() += 1;
        }
        for (sender, count) in pending {
            if count > queue.suspend_threshold && state.suspended.insert(sender) {
                debug!(target: LOG_TARGET, sender, count, "suspending channel");
                state.events.push(XcmpQueueEvent::ChannelSuspended { sender, pending: count });
            }
        }

        let (held, ready): (Vec<_>, Vec<_>) = pages.into_iter().partition(|(sender, _)| state.suspended.contains(sender));
        state.horizontal = held;

        let inbound: Vec<Inbound> =
            ready.iter().flat_map(|(sender, page)| self.decode_page(*sender, page)).collect();
        let weights: Vec<u64> = inbound.iter().map(|m| m.weight.ref_time()).collect();
        let schedule = SchedulerSimulator::new(self.scheduler_config_for(&queue)).simulate(seed.as_bytes(), &weights);

        let mut outcomes = vec![ExecutionOutcome::ExecutedOnIdle; inbound.len()];
        for &index in &schedule.order {
            let Inbound { sender, hash: message_hash, program, weight } = &inbound[index];
            let (sender, message_hash, weight) = (*sender, *message_hash, *weight);
            let planned = schedule.messages[index].outcome;
            let event = match planned {
                ExecutionOutcome::RejectedByBarrier => {
                    XcmpQueueEvent::Fail { sender, message_hash, error: XcmError::Barrier, weight: Weight::zero() }
                }
                _ => {
                    let error = match program.clone() {
                        Ok(xcm) => self.executor(state, Some(sender), weight).execute(xcm),
                        Err(error) => Some(error),
                    };
                    match (planned, error) {
                        (ExecutionOutcome::ExecutedOnIdle, error) => {
                            XcmpQueueEvent::ExecutedOnIdle { sender, message_hash, error }
                        }
                        (_, None) => XcmpQueueEvent::Success { sender, message_hash, weight },
                        (_, Some(error)) => XcmpQueueEvent::Fail { sender, message_hash, error, weight },
                    }
                }
            };
            trace!(target: LOG_TARGET, index, ?event, "serviced");
            outcomes[index] = event.outcome().unwrap_or(planned);
            state.events.push(event);
        }
        state.outcomes = outcomes;
    }
}

fn node_error(message: impl Into<String>) -> Error {
    Error::Node { code: NODE_ERROR_CODE, message: message.into() }
}

#[async_trait]
impl ChainHandle for MockChain {
    async fn inject_downward(&self, message: Vec<u8>) -> Result<()> {
        trace!(target: LOG_TARGET, len = message.len(), "inject downward");
        self.state.lock().downward.push(message);
        Ok(())
    }

    async fn inject_hrmp(&self, sender: u32, message: Vec<u8>) -> Result<()> {
        let mut state = self.state.lock();
        let drop_threshold = state.queue_config().drop_threshold as usize;
        let pending = state.horizontal.iter().filter(|(s, _)| *s == sender).count();
        if pending >= drop_threshold {
            return Err(node_error("queue capacity exceeded"));
        }
        trace!(target: LOG_TARGET, sender, pending, len = message.len(), "inject horizontal");
        state.horizontal.push((sender, message));
        Ok(())
    }

    async fn produce_block(&self, options: BlockOptions) -> Result<CreatedBlock> {
        let mut state = self.state.lock();
        let parent = match options.parent_hash {
            Some(hash) => state
                .blocks
                .iter()
                .position(|b| b.hash == hash)
                .ok_or_else(|| node_error(format!("unknown parent {hash:?}")))?,
            None => state.best,
        };
        if !options.create_empty && state.downward.is_empty() && state.horizontal.is_empty() {
            return Err(node_error("EmptyTransactionPool"));
        }
        let Block { hash: parent_hash, number } = state.blocks[parent];

        state.storage.insert(parent_hash_key(), parent_hash.encode());
        state.events.clear();
        state.outcomes.clear();
        for message in std::mem::take(&mut state.downward) {
            self.process_downward(&mut state, message);
        }
        self.process_horizontal(&mut state, parent_hash);

        let nonce = state.blocks.len() as u32;
        let hash = H256(blake2_256(&(parent_hash, number + 1, nonce).encode()));
        state.blocks.push(Block { hash, number: number + 1 });
        state.best = state.blocks.len() - 1;
        if options.finalize {
            state.finalized = state.best;
        }
        debug!(target: LOG_TARGET, number = number + 1, ?hash, events = state.events.len(), "produced block");
        Ok(CreatedBlock { hash, aux: serde_json::json!({ "is_new_best": true }) })
    }

    async fn query_storage(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.state.lock().storage.get(key).cloned())
    }

    async fn dry_run_weight(&self, program: &VersionedXcm<()>) -> Result<Weight> {
        let xcm = Xcm::try_from(program.clone()).map_err(|()| Error::VersionConversion { version: 3 })?;
        Ok(self.weigh(&xcm))
    }
}

/// Runs one program against the native ledger.
struct Executor<'a> {
    state: &'a mut State,
    native: &'a MultiLocation,
    fee_per_weight: u128,
    weight: Weight,
    sender: Option<u32>,
    origin: Option<H160>,
    holding: u128,
    error_handler: Xcm<()>,
    appendix: Xcm<()>,
}

impl Executor<'_> {
    /// Executes `xcm`, then the error handler on failure and the appendix.
    fn execute(mut self, xcm: Xcm<()>) -> Option<XcmError> {
        if !self.passes_barrier(&xcm) {
            return Some(XcmError::Barrier);
        }
        let error = self.run(xcm).err();
        if error.is_some() {
            let handler = std::mem::take(&mut self.error_handler);
            let _ = self.run(handler);
        }
        let appendix = std::mem::take(&mut self.appendix);
        let _ = self.run(appendix);
        if self.holding > 0 {
            trace!(target: LOG_TARGET, amount = self.holding, "assets trapped");
        }
        error
    }

    /// Programs paying for less weight than they need never start.
    fn passes_barrier(&self, xcm: &Xcm<()>) -> bool {
        xcm.0.iter().all(|instruction| match instruction {
            Instruction::BuyExecution { weight_limit: WeightLimit::Limited(limit), .. } => {
                limit.ref_time() >= self.weight.ref_time()
            }
            _ => true,
        })
    }

    fn run(&mut self, xcm: Xcm<()>) -> std::result::Result<(), XcmError> {
        xcm.0.into_iter().try_for_each(|instruction| self.process(instruction))
    }

    fn native_amount(&self, asset: &MultiAsset) -> std::result::Result<u128, XcmError> {
        match (&asset.id, &asset.fun) {
            (AssetId::Concrete(location), Fungibility::Fungible(amount)) if location == self.native => Ok(*amount),
            _ => Err(XcmError::AssetNotFound),
        }
    }

    fn process(&mut self, instruction: Instruction<()>) -> std::result::Result<(), XcmError> {
        use Instruction::*;
        match instruction {
            WithdrawAsset(assets) => {
                let origin = self.origin.ok_or(XcmError::BadOrigin)?;
                for asset in assets.inner() {
                    let amount = self.native_amount(asset)?;
                    let free = self.state.free_balance(origin);
                    let rest = free.checked_sub(amount).ok_or(XcmError::FailedToTransactAsset("insufficient balance"))?;
                    self.state.set_free_balance(origin, rest);
                    self.holding += amount;
                }
                Ok(())
            }
            ReserveAssetDeposited(assets) | ReceiveTeleportedAsset(assets) => {
                for asset in assets.inner() {
                    self.holding += self.native_amount(asset)?;
                }
                Ok(())
            }
            BuyExecution { fees, .. } => {
                self.native_amount(&fees)?;
                let fee = self.fee_per_weight.saturating_mul(self.weight.ref_time().into());
                self.holding = self.holding.checked_sub(fee).ok_or(XcmError::TooExpensive)?;
                Ok(())
            }
            DepositAsset { assets, beneficiary } => {
                let account = local_account(&beneficiary)?;
                let amount = match assets {
                    MultiAssetFilter::Definite(assets) => {
                        let mut wanted = 0u128;
                        for asset in assets.inner() {
                            wanted = wanted.saturating_add(self.native_amount(asset)?);
                        }
                        wanted.min(self.holding)
                    }
                    MultiAssetFilter::Wild(_) => self.holding,
                };
                self.holding -= amount;
                let free = self.state.free_balance(account);
                self.state.set_free_balance(account, free.saturating_add(amount));
                Ok(())
            }
            DescendOrigin(Junctions::X1(Junction::AccountKey20 { key, .. })) => {
                match (self.sender, self.origin) {
                    (Some(para_id), Some(_)) => {
                        self.origin = Some(identity::descend_origin_from_address20(para_id, H160(key)));
                        Ok(())
                    }
                    (_, None) => Err(XcmError::BadOrigin),
                    (None, Some(_)) => Err(XcmError::Unimplemented),
                }
            }
            ClearOrigin => {
                self.origin = None;
                Ok(())
            }
            Transact { .. } => self.origin.map(|_| ()).ok_or(XcmError::BadOrigin),
            SetErrorHandler(xcm) => {
                self.error_handler = xcm;
                Ok(())
            }
            SetAppendix(xcm) => {
                self.appendix = xcm;
                Ok(())
            }
            ExpectAsset(assets) => {
                let mut expected = 0u128;
                for asset in assets.inner() {
                    expected = expected.saturating_add(self.native_amount(asset)?);
                }
                if self.holding >= expected {
                    Ok(())
                } else {
                    Err(XcmError::ExpectationFalse)
                }
            }
            Trap(code) => Err(XcmError::Trap(code)),
            RefundSurplus | ClearError | ClearTransactStatus | ClearTopic | SetTopic(_) | SetFeesMode { .. } => Ok(()),
            _ => Err(XcmError::Unimplemented),
        }
    }
}

fn local_account(location: &MultiLocation) -> std::result::Result<H160, XcmError> {
    match location {
        MultiLocation { parents: 0, interior: Junctions::X1(Junction::AccountKey20 { key, .. }) } => Ok(H160(*key)),
        _ => Err(XcmError::LocationCannotHold),
    }
}
