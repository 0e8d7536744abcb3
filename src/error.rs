use crate::scheduler::ScheduleDivergence;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("asset index {index} out of range, fragment holds {len} assets")]
    AssetIndexOutOfRange { index: usize, len: usize },
    #[error("fragment holds no assets")]
    NoAssets,
    #[error("deposit requires a beneficiary")]
    MissingBeneficiary,
    #[error("descend origin requires an origin address")]
    MissingDescendOrigin,
    #[error("program cannot be expressed in XCM v{version}")]
    VersionConversion { version: u32 },
    #[error("program has no BuyExecution to override")]
    NoBuyExecution,
    #[error("fee {fee} exceeds transferred amount {amount}")]
    FeeExceedsAmount { amount: u128, fee: u128 },
    #[error("codec: {0}")]
    Codec(#[from] codec::Error),
    #[error(transparent)]
    Rpc(#[from] jsonrpsee::core::ClientError),
    /// Error reported by the node, message kept verbatim.
    #[error("{message}")]
    Node { code: i32, message: String },
    #[error("unexpected response from {method}: {reason}")]
    UnexpectedResponse { method: &'static str, reason: String },
    #[error(transparent)]
    Divergence(#[from] ScheduleDivergence),
    #[error("abi: {0}")]
    Abi(#[from] ethabi::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn unexpected(method: &'static str, reason: impl ToString) -> Self {
        Error::UnexpectedResponse { method, reason: reason.to_string() }
    }
}
