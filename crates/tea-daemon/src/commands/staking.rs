//! Staking lifecycle command handlers.
//!
//! The `caller` parameter is taken at face value: the daemon is a local
//! harness and performs no transport-level authentication.

use std::sync::Arc;

use serde_json::{json, Value};
use tea_staking::attestation::ExitRequest;
use tea_staking::eligibility::DelegationDescriptor;
use tea_staking::forwarder::{ForwardOutcome, SignedForwardRequest};
use tea_staking::intake::SignedPermit;
use tea_types::TokenId;
use tracing::info;

use super::{
    address_list_param, address_param, amount_json, amount_list_param, optional_param, param,
};
use crate::clock;
use crate::rpc::RpcError;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

/// Deposit one or more elements.
///
/// Params: `caller`, `tokens`, `amounts`, `descriptors`, optional `permit`.
pub async fn stake(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = address_param(params, "caller")?;
    let tokens: Vec<TokenId> = address_list_param(params, "tokens")?;
    let amounts = amount_list_param(params, "amounts")?;
    let descriptors: Vec<DelegationDescriptor> = param(params, "descriptors")?;
    let permit: Option<SignedPermit> = optional_param(params, "permit")?;

    let now = clock::now();
    let mut ledger = state.ledger.lock().await;
    let ids = ledger.stake(&caller, &tokens, &amounts, &descriptors, permit.as_ref(), now)?;
    state.publish(&mut ledger, now);

    info!(positions = ids.len(), "stake accepted");
    Ok(json!({ "ids": ids }))
}

/// Submit an operator-attested unstake. Params: `request`.
pub async fn unstake(state: &Arc<DaemonState>, params: &Value) -> Result {
    let request: ExitRequest = param(params, "request")?;

    let now = clock::now();
    let mut ledger = state.ledger.lock().await;
    ledger.unstake(&request, now)?;
    state.publish(&mut ledger, now);

    Ok(json!({ "unstaked": request.payload.ids }))
}

/// Submit an operator-attested reward claim. Params: `request`.
pub async fn claim(state: &Arc<DaemonState>, params: &Value) -> Result {
    let request: ExitRequest = param(params, "request")?;

    let now = clock::now();
    let mut ledger = state.ledger.lock().await;
    let paid = ledger.claim(&request, now)?;
    state.publish(&mut ledger, now);

    Ok(json!({ "paid": amount_json(paid) }))
}

/// Release principal and accrued reward after the cooldown.
///
/// Params: `caller`, `ids`.
pub async fn withdraw(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = address_param(params, "caller")?;
    let ids: Vec<u64> = param(params, "ids")?;

    let now = clock::now();
    let mut ledger = state.ledger.lock().await;
    let paid = ledger.withdraw(&caller, &ids, now)?;
    state.publish(&mut ledger, now);

    Ok(json!({ "paid": amount_json(paid) }))
}

/// Relay a user-signed stake or withdraw.
///
/// Params: `relayer`, `request`.
pub async fn forward(state: &Arc<DaemonState>, params: &Value) -> Result {
    let relayer = address_param(params, "relayer")?;
    let request: SignedForwardRequest = param(params, "request")?;

    let now = clock::now();
    let mut ledger = state.ledger.lock().await;
    let outcome = ledger.execute_forwarded(&relayer, &request, now)?;
    state.publish(&mut ledger, now);

    Ok(match outcome {
        ForwardOutcome::Staked(ids) => json!({ "ids": ids }),
        ForwardOutcome::Withdrawn(paid) => json!({ "paid": amount_json(paid) }),
    })
}
