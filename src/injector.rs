//! Frames programs the way the relay chain delivers them and hands them to
//! the node's injection endpoints.
//!
//! Injection is not idempotent: every call queues another copy. Node errors
//! are returned untouched and nothing is retried.

use crate::{
    chain::{BlockOptions, ChainHandle, CreatedBlock},
    Result,
};
use codec::{Decode, Encode};
use tracing::debug;
use xcm::VersionedXcm;

const LOG_TARGET: &str = "xcm::injector";

/// Framing discriminator leading every horizontal message page, as the
/// receiving queue pallet reads it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub enum XcmpMessageFormat {
    #[default]
    ConcatenatedVersionedXcm,
    ConcatenatedEncodedBlob,
    Signals,
}

/// A horizontal page holding `program`, led by its format discriminator.
pub fn frame_hrmp(program: &VersionedXcm<()>, format: XcmpMessageFormat) -> Vec<u8> {
    let mut page = format.encode();
    program.encode_to(&mut page);
    page
}

pub async fn inject_hrmp_message<C: ChainHandle + ?Sized>(
    chain: &C,
    channel: u32,
    program: &VersionedXcm<()>,
) -> Result<()> {
    inject_hrmp_message_with_format(chain, channel, program, XcmpMessageFormat::default()).await
}

pub async fn inject_hrmp_message_with_format<C: ChainHandle + ?Sized>(
    chain: &C,
    channel: u32,
    program: &VersionedXcm<()>,
    format: XcmpMessageFormat,
) -> Result<()> {
    let page = frame_hrmp(program, format);
    debug!(target: LOG_TARGET, channel, ?format, len = page.len(), "injecting horizontal message");
    chain.inject_hrmp(channel, page).await
}

/// Injects `program` and produces the block that receives it.
pub async fn inject_hrmp_message_and_seal<C: ChainHandle + ?Sized>(
    chain: &C,
    channel: u32,
    program: &VersionedXcm<()>,
    options: BlockOptions,
) -> Result<CreatedBlock> {
    inject_hrmp_message(chain, channel, program).await?;
    chain.produce_block(options).await
}

/// Injects an already framed page, then produces two blocks: one enqueuing
/// the page and one processing it, built on the first. Returns the second.
pub async fn inject_encoded_hrmp_message_and_seal<C: ChainHandle + ?Sized>(
    chain: &C,
    channel: u32,
    page: Vec<u8>,
    options: BlockOptions,
) -> Result<CreatedBlock> {
    debug!(target: LOG_TARGET, channel, len = page.len(), "injecting encoded page");
    chain.inject_hrmp(channel, page).await?;
    let first = chain.produce_block(options).await?;
    chain.produce_block(BlockOptions { parent_hash: Some(first.hash), ..options }).await
}

/// Downward messages carry no format discriminator.
pub async fn inject_downward_message<C: ChainHandle + ?Sized>(chain: &C, program: &VersionedXcm<()>) -> Result<()> {
    let message = program.encode();
    debug!(target: LOG_TARGET, len = message.len(), "injecting downward message");
    chain.inject_downward(message).await
}

pub async fn inject_downward_message_and_seal<C: ChainHandle + ?Sized>(
    chain: &C,
    program: &VersionedXcm<()>,
    options: BlockOptions,
) -> Result<CreatedBlock> {
    inject_downward_message(chain, program).await?;
    chain.produce_block(options).await
}
