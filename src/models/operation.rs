//! Operation and step types for mint/transfer/burn tracking
//!
//! Statuses are persisted as their string form; Display/FromStr are the
//! single source of truth for that mapping.

use serde::{Deserialize, Serialize};

/// Operation kinds accepted by the intent front-door
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    Mint,
    Transfer,
    Burn,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Mint => write!(f, "MINT"),
            OperationKind::Transfer => write!(f, "TRANSFER"),
            OperationKind::Burn => write!(f, "BURN"),
        }
    }
}

impl std::str::FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MINT" => Ok(OperationKind::Mint),
            "TRANSFER" => Ok(OperationKind::Transfer),
            "BURN" => Ok(OperationKind::Burn),
            _ => Err(format!("Unknown operation kind: {}", s)),
        }
    }
}

/// Operation status
/// Status progresses: PENDING → IN_PROGRESS → SUCCESS | FAILED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Pending,
    InProgress,
    Success,
    Failed,
}

impl OperationStatus {
    /// SUCCESS and FAILED are terminal: an operation never leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::Success | OperationStatus::Failed)
    }

    /// Aggregate an operation status from its step statuses.
    ///
    /// Returns `Some(Success)` when every step validated successfully,
    /// `Some(Failed)` when any step is terminally failed (VALIDATED_FAILED
    /// or TIMEOUT), and `None` while the outcome is still open.
    pub fn from_step_statuses(steps: &[StepStatus]) -> Option<OperationStatus> {
        if steps
            .iter()
            .any(|s| matches!(s, StepStatus::ValidatedFailed | StepStatus::Timeout))
        {
            return Some(OperationStatus::Failed);
        }
        if !steps.is_empty() && steps.iter().all(|s| *s == StepStatus::ValidatedSuccess) {
            return Some(OperationStatus::Success);
        }
        None
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationStatus::Pending => write!(f, "PENDING"),
            OperationStatus::InProgress => write!(f, "IN_PROGRESS"),
            OperationStatus::Success => write!(f, "SUCCESS"),
            OperationStatus::Failed => write!(f, "FAILED"),
        }
    }
}

impl std::str::FromStr for OperationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OperationStatus::Pending),
            "IN_PROGRESS" => Ok(OperationStatus::InProgress),
            "SUCCESS" => Ok(OperationStatus::Success),
            "FAILED" => Ok(OperationStatus::Failed),
            _ => Err(format!("Unknown operation status: {}", s)),
        }
    }
}

/// Step status
/// Steps only advance: PENDING → SUBMITTED → PENDING_VALIDATION →
/// VALIDATED_SUCCESS | VALIDATED_FAILED. TIMEOUT is a terminal
/// classification for a step the poller has given up on; nothing assigns
/// it today (the poller retries indefinitely) but aggregation and storage
/// both recognize it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    Submitted,
    PendingValidation,
    ValidatedSuccess,
    ValidatedFailed,
    Timeout,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::ValidatedSuccess | StepStatus::ValidatedFailed | StepStatus::Timeout
        )
    }

    /// Position in the forward-only lifecycle; transitions must not
    /// decrease it.
    pub fn rank(&self) -> u8 {
        match self {
            StepStatus::Pending => 0,
            StepStatus::Submitted => 1,
            StepStatus::PendingValidation => 2,
            StepStatus::ValidatedSuccess | StepStatus::ValidatedFailed | StepStatus::Timeout => 3,
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "PENDING"),
            StepStatus::Submitted => write!(f, "SUBMITTED"),
            StepStatus::PendingValidation => write!(f, "PENDING_VALIDATION"),
            StepStatus::ValidatedSuccess => write!(f, "VALIDATED_SUCCESS"),
            StepStatus::ValidatedFailed => write!(f, "VALIDATED_FAILED"),
            StepStatus::Timeout => write!(f, "TIMEOUT"),
        }
    }
}

impl std::str::FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(StepStatus::Pending),
            "SUBMITTED" => Ok(StepStatus::Submitted),
            "PENDING_VALIDATION" => Ok(StepStatus::PendingValidation),
            "VALIDATED_SUCCESS" => Ok(StepStatus::ValidatedSuccess),
            "VALIDATED_FAILED" => Ok(StepStatus::ValidatedFailed),
            "TIMEOUT" => Ok(StepStatus::Timeout),
            _ => Err(format!("Unknown step status: {}", s)),
        }
    }
}

/// Role a step plays inside its operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    IssuerMint,
    UserAuthorize,
    IssuerTransfer,
    ReceiverAuthorize,
    SenderTransfer,
    IssuerClawback,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepKind::IssuerMint => write!(f, "issuer_mint"),
            StepKind::UserAuthorize => write!(f, "user_authorize"),
            StepKind::IssuerTransfer => write!(f, "issuer_transfer"),
            StepKind::ReceiverAuthorize => write!(f, "receiver_authorize"),
            StepKind::SenderTransfer => write!(f, "sender_transfer"),
            StepKind::IssuerClawback => write!(f, "issuer_clawback"),
        }
    }
}

impl std::str::FromStr for StepKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "issuer_mint" => Ok(StepKind::IssuerMint),
            "user_authorize" => Ok(StepKind::UserAuthorize),
            "issuer_transfer" => Ok(StepKind::IssuerTransfer),
            "receiver_authorize" => Ok(StepKind::ReceiverAuthorize),
            "sender_transfer" => Ok(StepKind::SenderTransfer),
            "issuer_clawback" => Ok(StepKind::IssuerClawback),
            _ => Err(format!("Unknown step kind: {}", s)),
        }
    }
}

/// Mint intent request body
///
/// The issuer, asset scale, maximum amount and transfer fee are fixed by
/// the orchestrator; the old request fields remain declared so that a
/// caller still sending them gets a 400 naming the offender instead of a
/// silent ignore.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintRequest {
    pub idempotency_key: Option<String>,
    pub user_wallet_id: Option<String>,
    pub amount: Option<String>,
    pub metadata: Option<String>,
    // Deprecated inputs, rejected when present.
    pub issuer_wallet_id: Option<serde_json::Value>,
    pub asset_scale: Option<serde_json::Value>,
    pub maximum_amount: Option<serde_json::Value>,
    pub transfer_fee: Option<serde_json::Value>,
}

impl MintRequest {
    /// Names of deprecated fields present in this request.
    pub fn deprecated_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.issuer_wallet_id.is_some() {
            fields.push("issuerWalletId");
        }
        if self.asset_scale.is_some() {
            fields.push("assetScale");
        }
        if self.maximum_amount.is_some() {
            fields.push("maximumAmount");
        }
        if self.transfer_fee.is_some() {
            fields.push("transferFee");
        }
        fields
    }
}

/// Transfer intent request body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub idempotency_key: Option<String>,
    pub source_wallet_id: Option<String>,
    pub destination_wallet_id: Option<String>,
    pub issuance_id: Option<String>,
    pub amount: Option<String>,
}

/// Burn intent request body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnRequest {
    pub idempotency_key: Option<String>,
    /// Accepted for API compatibility; always the reserved "issuer".
    pub issuer_wallet_id: Option<String>,
    pub holder_wallet_id: Option<String>,
    pub issuance_id: Option<String>,
    pub amount: Option<String>,
}

/// Step representation in API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResponse {
    pub id: String,
    pub step_no: i32,
    pub kind: String,
    pub signer_wallet_id: Option<String>,
    pub tx_type: String,
    pub tx_hash: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<crate::entities::operation_steps::Model> for StepResponse {
    fn from(model: crate::entities::operation_steps::Model) -> Self {
        Self {
            id: model.id,
            step_no: model.step_no,
            kind: model.kind,
            signer_wallet_id: model.signer_wallet_id,
            tx_type: model.tx_type,
            tx_hash: model.tx_hash,
            status: model.status,
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
        }
    }
}

/// Operation representation in API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResponse {
    pub operation_id: String,
    pub kind: String,
    pub issuance_id: Option<String>,
    pub source_wallet_id: Option<String>,
    pub destination_wallet_id: Option<String>,
    pub amount: String,
    pub status: String,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<StepResponse>>,
}

impl OperationResponse {
    pub fn from_model(model: crate::entities::operations::Model) -> Self {
        Self {
            operation_id: model.id,
            kind: model.kind,
            issuance_id: model.issuance_id,
            source_wallet_id: model.source_wallet_id,
            destination_wallet_id: model.destination_wallet_id,
            amount: model.amount,
            status: model.status,
            error_code: model.error_code,
            error_message: model.error_message,
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
            steps: None,
        }
    }

    pub fn with_steps(
        model: crate::entities::operations::Model,
        steps: Vec<crate::entities::operation_steps::Model>,
    ) -> Self {
        let mut response = Self::from_model(model);
        response.steps = Some(steps.into_iter().map(Into::into).collect());
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            OperationKind::Mint,
            OperationKind::Transfer,
            OperationKind::Burn,
        ] {
            assert_eq!(OperationKind::from_str(&kind.to_string()).unwrap(), kind);
        }
        assert!(OperationKind::from_str("mint").is_err());
    }

    #[test]
    fn test_step_status_round_trip() {
        for status in [
            StepStatus::Pending,
            StepStatus::Submitted,
            StepStatus::PendingValidation,
            StepStatus::ValidatedSuccess,
            StepStatus::ValidatedFailed,
            StepStatus::Timeout,
        ] {
            assert_eq!(StepStatus::from_str(&status.to_string()).unwrap(), status);
        }
    }

    #[test]
    fn test_step_status_ranks_are_monotone() {
        assert!(StepStatus::Pending.rank() < StepStatus::Submitted.rank());
        assert!(StepStatus::Submitted.rank() < StepStatus::PendingValidation.rank());
        assert!(StepStatus::PendingValidation.rank() < StepStatus::ValidatedSuccess.rank());
        assert_eq!(
            StepStatus::ValidatedFailed.rank(),
            StepStatus::Timeout.rank()
        );
    }

    #[test]
    fn test_aggregate_all_success() {
        let steps = [StepStatus::ValidatedSuccess; 3];
        assert_eq!(
            OperationStatus::from_step_statuses(&steps),
            Some(OperationStatus::Success)
        );
    }

    #[test]
    fn test_aggregate_failed_step_fails_operation() {
        let steps = [
            StepStatus::ValidatedSuccess,
            StepStatus::ValidatedFailed,
            StepStatus::Pending,
        ];
        assert_eq!(
            OperationStatus::from_step_statuses(&steps),
            Some(OperationStatus::Failed)
        );
    }

    #[test]
    fn test_aggregate_timeout_fails_operation() {
        let steps = [StepStatus::ValidatedSuccess, StepStatus::Timeout];
        assert_eq!(
            OperationStatus::from_step_statuses(&steps),
            Some(OperationStatus::Failed)
        );
    }

    #[test]
    fn test_aggregate_open_while_steps_in_flight() {
        let steps = [StepStatus::ValidatedSuccess, StepStatus::PendingValidation];
        assert_eq!(OperationStatus::from_step_statuses(&steps), None);
    }

    #[test]
    fn test_deprecated_fields_listed_by_name() {
        let request = MintRequest {
            idempotency_key: Some("k".to_string()),
            user_wallet_id: Some("w".to_string()),
            amount: Some("1000".to_string()),
            metadata: None,
            issuer_wallet_id: None,
            asset_scale: Some(serde_json::json!(2)),
            maximum_amount: None,
            transfer_fee: Some(serde_json::json!(0)),
        };
        assert_eq!(
            request.deprecated_fields(),
            vec!["assetScale", "transferFee"]
        );
    }
}
