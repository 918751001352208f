//! Recorded transaction types.

use std::fmt;

use pilot_core::TransactionId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How the executing account invokes the target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    /// Regular message call.
    #[default]
    Call,
    /// Delegate call (target code runs in the caller's context).
    DelegateCall,
}

/// The intercepted call: what the page asked the wallet to send.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPayload {
    /// Target address (hex).
    pub to: String,
    /// Value in wei, as a decimal or `0x` quantity string.
    pub value: String,
    /// Calldata (hex).
    pub data: String,
    /// Call kind.
    #[serde(default)]
    pub operation: Operation,
}

impl TransactionPayload {
    /// Plain call with zero value.
    pub fn call(to: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            value: "0".to_string(),
            data: data.into(),
            operation: Operation::Call,
        }
    }
}

/// Lifecycle status of a recorded transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionStatus {
    /// Recorded, not yet sent to the fork.
    Pending,
    /// Sent to the fork; awaiting its receipt.
    Confirmed,
    /// Mined on the fork and succeeded.
    Success,
    /// Could not be executed on the fork.
    Failed,
    /// Mined on the fork but reverted.
    Reverted,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Reverted => write!(f, "reverted"),
        }
    }
}

/// Decoded information about the target contract.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractInfo {
    /// Contract address.
    pub address: String,
    /// Human-readable name, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// ABI used to decode the calldata, when verified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abi: Option<Value>,
    /// Implementation address when the target is a proxy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_to: Option<String>,
}

/// A transaction recorded in the ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Ledger-assigned identifier.
    pub id: TransactionId,
    /// What to execute.
    pub payload: TransactionPayload,
    /// Lifecycle status.
    pub status: TransactionStatus,
    /// Decoded target information.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_info: Option<ContractInfo>,
    /// Fork checkpoint taken right before this transaction was sent.
    /// Reverting to it undoes this transaction and everything after it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    /// Hash on the fork.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
}

impl Transaction {
    /// New pending transaction.
    pub fn pending(id: TransactionId, payload: TransactionPayload) -> Self {
        Self {
            id,
            payload,
            status: TransactionStatus::Pending,
            contract_info: None,
            snapshot_id: None,
            transaction_hash: None,
        }
    }

    /// Copy of this transaction as it must look when queued for re-execution:
    /// status back to pending, fork-specific data dropped, decoding kept.
    pub fn requeued(&self) -> Self {
        Self {
            id: self.id.clone(),
            payload: self.payload.clone(),
            status: TransactionStatus::Pending,
            contract_info: self.contract_info.clone(),
            snapshot_id: None,
            transaction_hash: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_wire_format() {
        let payload = TransactionPayload {
            to: "0xabc".into(),
            value: "1".into(),
            data: "0x".into(),
            operation: Operation::DelegateCall,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["operation"], "delegateCall");
    }

    #[test]
    fn operation_defaults_to_call() {
        let payload: TransactionPayload =
            serde_json::from_str(r#"{"to":"0x1","value":"0","data":"0x"}"#).unwrap();
        assert_eq!(payload.operation, Operation::Call);
    }

    #[test]
    fn requeued_drops_fork_data_and_keeps_decoding() {
        let mut tx = Transaction::pending(TransactionId::from("t"), TransactionPayload::call("0x1", "0x"));
        tx.status = TransactionStatus::Success;
        tx.snapshot_id = Some("snap".into());
        tx.transaction_hash = Some("0xhash".into());
        tx.contract_info = Some(ContractInfo {
            address: "0x1".into(),
            ..ContractInfo::default()
        });

        let again = tx.requeued();
        assert_eq!(again.status, TransactionStatus::Pending);
        assert_eq!(again.snapshot_id, None);
        assert_eq!(again.transaction_hash, None);
        assert_eq!(again.contract_info, tx.contract_info);
        assert_eq!(again.id, tx.id);
    }
}
