//! Reward budget, admin and development command handlers.

use std::sync::Arc;

use serde_json::{json, Value};
use tea_staking::services::TokenBank;
use tea_types::{address, Timestamp};
use tracing::{info, warn};

use super::{address_param, amount_json, amount_param, optional_param};
use crate::clock;
use crate::rpc::RpcError;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

/// Permissionless accrual refresh.
pub async fn update_reward_per_share(state: &Arc<DaemonState>) -> Result {
    let now = clock::now();
    let mut ledger = state.ledger.lock().await;
    let emitted = ledger.update_reward_per_share(now)?;
    Ok(json!({ "emitted": amount_json(emitted) }))
}

/// Start a reward epoch.
///
/// Params: `caller`, `total_allocation`, optional `start_time` (defaults to now).
pub async fn initialize_staking(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = address_param(params, "caller")?;
    let total_allocation = amount_param(params, "total_allocation")?;
    let now = clock::now();
    let start_time: Timestamp = optional_param(params, "start_time")?.unwrap_or(now);

    let mut ledger = state.ledger.lock().await;
    ledger.initialize_staking(&caller, total_allocation, start_time, now)?;
    state.publish(&mut ledger, now);

    Ok(json!({
        "start_time": start_time,
        "end_time": ledger.reward_state().end_time(),
    }))
}

/// Sweep the primary balance to the treasury. Params: `caller`.
pub async fn emergency_withdraw(state: &Arc<DaemonState>, params: &Value) -> Result {
    let caller = address_param(params, "caller")?;
    let now = clock::now();

    let mut ledger = state.ledger.lock().await;
    let amount = ledger.emergency_withdraw(&caller)?;
    state.publish(&mut ledger, now);

    Ok(json!({ "amount": amount_json(amount) }))
}

/// Credit tokens in the in-memory bank. Params: `token`, `to`, `amount`.
pub async fn dev_mint(state: &Arc<DaemonState>, params: &Value) -> Result {
    let token = address_param(params, "token")?;
    let to = address_param(params, "to")?;
    let amount = amount_param(params, "amount")?;

    let mut ledger = state.ledger.lock().await;
    if !ledger.check_token_validity(&token) {
        return Err(RpcError::invalid_params("token is not accepted by the ledger"));
    }
    ledger.bank_mut().mint(&token, &to, amount);
    warn!(token = %address::short(&token), "dev_mint used");

    let balance = ledger.bank().balance_of(&token, &to);
    Ok(json!({ "balance": amount_json(balance) }))
}

/// Grant the ledger an unlimited, non-expiring allowance from `owner`.
///
/// Params: `token`, `owner`.
pub async fn dev_approve(state: &Arc<DaemonState>, params: &Value) -> Result {
    let token = address_param(params, "token")?;
    let owner = address_param(params, "owner")?;

    let mut ledger = state.ledger.lock().await;
    let spender = *ledger.address();
    let bank = ledger.bank_mut();
    bank.approve_service(&token, &owner, u128::MAX);
    bank.approve(&token, &owner, &spender, u128::MAX, Timestamp::MAX);
    info!(owner = %address::short(&owner), "dev_approve used");

    Ok(json!({ "approved": true }))
}

/// Set a vesting entitlement. Params: `user`, `token`, `amount`.
pub async fn dev_set_entitlement(state: &Arc<DaemonState>, params: &Value) -> Result {
    let user = address_param(params, "user")?;
    let token = address_param(params, "token")?;
    let amount = amount_param(params, "amount")?;

    let mut ledger = state.ledger.lock().await;
    ledger.vesting_mut().set_entitlement(user, token, amount);

    Ok(json!({ "entitlement": amount_json(amount) }))
}
