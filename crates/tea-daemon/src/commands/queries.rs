//! Read-only query handlers.

use std::sync::Arc;

use serde_json::{json, Value};
use tea_staking::attestation::{AttestationDomain, ExitPayload};
use tea_types::address::to_hex;

use super::{address_param, amount_json, param};
use crate::clock;
use crate::rpc::RpcError;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

/// Principal of the user's Active positions. Params: `user`.
pub async fn get_total_user_staked_tokens(state: &Arc<DaemonState>, params: &Value) -> Result {
    let user = address_param(params, "user")?;
    let ledger = state.ledger.lock().await;
    Ok(json!({ "total": amount_json(ledger.get_total_user_staked_tokens(&user)) }))
}

/// Params: `user`.
pub async fn get_user_ids(state: &Arc<DaemonState>, params: &Value) -> Result {
    let user = address_param(params, "user")?;
    let ledger = state.ledger.lock().await;
    Ok(json!({ "ids": ledger.get_user_ids(&user) }))
}

/// Params: `token`.
pub async fn check_token_validity(state: &Arc<DaemonState>, params: &Value) -> Result {
    let token = address_param(params, "token")?;
    let ledger = state.ledger.lock().await;
    Ok(json!({ "valid": ledger.check_token_validity(&token) }))
}

pub async fn total_staked_tokens(state: &Arc<DaemonState>) -> Result {
    let ledger = state.ledger.lock().await;
    Ok(json!({ "total": amount_json(ledger.total_staked_tokens()) }))
}

/// Reward of a position as of now. Params: `id`.
pub async fn get_pending_rewards(state: &Arc<DaemonState>, params: &Value) -> Result {
    let id: u64 = param(params, "id")?;
    let ledger = state.ledger.lock().await;
    let pending = ledger.get_pending_rewards(id, clock::now())?;
    Ok(json!({ "id": id, "pending": amount_json(pending) }))
}

/// Full position record. Params: `id`.
pub async fn get_position(state: &Arc<DaemonState>, params: &Value) -> Result {
    let id: u64 = param(params, "id")?;
    let ledger = state.ledger.lock().await;
    let position = ledger
        .position(id)
        .ok_or_else(|| RpcError::from(tea_staking::StakingError::InvalidId(id)))?;
    serde_json::to_value(position)
        .map_err(|e| RpcError::internal_error(&format!("serialize position: {e}")))
}

/// Params: `operator`, `user`.
pub async fn operator_user_nonce(state: &Arc<DaemonState>, params: &Value) -> Result {
    let operator = address_param(params, "operator")?;
    let user = address_param(params, "user")?;
    let ledger = state.ledger.lock().await;
    Ok(json!({
        "nonce": ledger.operator_user_nonce(&operator, &user),
        "is_operator": ledger.is_operator(&operator),
    }))
}

/// Forwarder nonce of a meta-transaction signer. Params: `from`.
pub async fn forwarder_nonce(state: &Arc<DaemonState>, params: &Value) -> Result {
    let from = address_param(params, "from")?;
    let ledger = state.ledger.lock().await;
    Ok(json!({
        "nonce": ledger.forwarder_nonce(&from),
        "trusted_forwarder": ledger.trusted_forwarder().map(to_hex),
    }))
}

/// Reward budget snapshot.
pub async fn get_reward_state(state: &Arc<DaemonState>) -> Result {
    let now = clock::now();
    let ledger = state.ledger.lock().await;
    let mut out = serde_json::to_value(ledger.reward_state())
        .map_err(|e| RpcError::internal_error(&format!("serialize budget: {e}")))?;
    if let Some(map) = out.as_object_mut() {
        map.insert("active".to_string(), json!(ledger.is_staking_active(now)));
        map.insert("end_time".to_string(), json!(ledger.reward_state().end_time()));
    }
    Ok(out)
}

/// Identities and lock policy the ledger was built with.
pub async fn get_ledger_info(state: &Arc<DaemonState>) -> Result {
    let ledger = state.ledger.lock().await;
    let lock = ledger.lock_config();
    Ok(json!({
        "ledger_address": to_hex(ledger.address()),
        "primary_token": to_hex(ledger.primary_token()),
        "auxiliary_tokens": ledger.auxiliary_tokens().iter().map(to_hex).collect::<Vec<_>>(),
        "vesting_custody": to_hex(ledger.vesting_custody()),
        "treasury": to_hex(ledger.treasury()),
        "trusted_forwarder": ledger.trusted_forwarder().map(to_hex),
        "lock": {
            "large_threshold": amount_json(lock.large_threshold),
            "standard_hold": lock.standard_hold,
            "large_hold": lock.large_hold,
            "large_protect": lock.large_protect,
            "cooldown": lock.cooldown,
        },
    }))
}

/// Digest an operator must sign. Params: `domain` ("unstake" | "claim"), `payload`.
pub async fn attestation_digest(state: &Arc<DaemonState>, params: &Value) -> Result {
    let domain: AttestationDomain = param(params, "domain")?;
    let payload: ExitPayload = param(params, "payload")?;
    let ledger = state.ledger.lock().await;
    let digest = ledger.attestation_digest(domain, &payload);
    Ok(json!({ "digest": hex::encode(digest) }))
}
