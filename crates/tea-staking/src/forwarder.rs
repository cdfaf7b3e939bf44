//! Trusted-forwarder meta-transactions.
//!
//! A relayer may submit `stake` or `withdraw` on a user's behalf. The user
//! signs a [`ForwardRequest`] naming the ledger, the call, their forwarder
//! nonce and a deadline. Only the ledger's trusted forwarder may relay it,
//! and the forwarded call runs with the request's `from` as its sender.
//!
//! ## Check order
//!
//! 1. relayer is the trusted forwarder
//! 2. `to` is this ledger
//! 3. `now <= deadline`
//! 4. nonce equals the stored nonce for `from`
//! 5. the signature verifies and its signer is `from`
//!
//! As with exit attestations, verification is read-only. The nonce is
//! consumed only after the forwarded call has succeeded.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as, DisplayFromStr};
use tea_crypto::blake3::{self, contexts, FieldEncoder};
use tea_crypto::ed25519::{SignerProof, SigningKey};
use tea_types::{address, Address, Amount, Hash, PositionId, Timestamp, TokenId};

use crate::attestation::recover_signer;
use crate::eligibility::DelegationDescriptor;
use crate::intake::SignedPermit;
use crate::{Result, StakingError};

/// Canonical type string hashed into every forward-request digest.
pub const FORWARD_REQUEST_TYPE: &str =
    "ForwardRequest(address from,address to,uint256 nonce,uint48 deadline,bytes data)";

/// A ledger call a relayer may submit for a user.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ForwardedCall {
    Stake {
        #[serde_as(as = "Vec<Hex>")]
        tokens: Vec<TokenId>,
        #[serde_as(as = "Vec<DisplayFromStr>")]
        amounts: Vec<Amount>,
        descriptors: Vec<DelegationDescriptor>,
        #[serde(default)]
        permit: Option<SignedPermit>,
    },
    Withdraw {
        ids: Vec<PositionId>,
    },
}

impl ForwardedCall {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Stake { .. } => "stake",
            Self::Withdraw { .. } => "withdraw",
        }
    }

    /// Digest of the call arguments as seen by sender `from`.
    ///
    /// Permits are bound through their own digests, so a relayer cannot
    /// swap in a different permit.
    pub fn digest(&self, from: &Address) -> Hash {
        let encoder = FieldEncoder::new().bytes32(&blake3::hash(self.name().as_bytes()));
        match self {
            Self::Stake {
                tokens,
                amounts,
                descriptors,
                permit,
            } => {
                let descriptor_digests: Vec<Hash> =
                    descriptors.iter().map(DelegationDescriptor::digest).collect();
                let encoder = encoder
                    .bytes32_list(tokens)
                    .u128_list(amounts)
                    .bytes32_list(&descriptor_digests);
                let encoder = match permit {
                    None => encoder.u64(0),
                    Some(signed) => {
                        let encoder = encoder.u64(1).bytes32(&signed.permit.digest(from));
                        match &signed.service_permit {
                            None => encoder.u64(0),
                            Some(service) => encoder.u64(1).bytes32(&service.permit.digest()),
                        }
                    }
                };
                encoder.digest(contexts::FORWARDED_CALL)
            }
            Self::Withdraw { ids } => encoder.u64_list(ids).digest(contexts::FORWARDED_CALL),
        }
    }
}

/// The part of a meta-transaction the user signs.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardRequest {
    /// Effective sender of the forwarded call.
    #[serde_as(as = "Hex")]
    pub from: Address,
    /// Target ledger.
    #[serde_as(as = "Hex")]
    pub to: Address,
    pub nonce: u64,
    pub deadline: Timestamp,
    pub call: ForwardedCall,
}

impl ForwardRequest {
    /// `derive_key(FORWARD_REQUEST, type_hash ‖ from ‖ to ‖ nonce ‖ deadline ‖ call_digest)`
    pub fn digest(&self) -> Hash {
        FieldEncoder::new()
            .bytes32(&blake3::hash(FORWARD_REQUEST_TYPE.as_bytes()))
            .bytes32(&self.from)
            .bytes32(&self.to)
            .u64(self.nonce)
            .u64(self.deadline)
            .bytes32(&self.call.digest(&self.from))
            .digest(contexts::FORWARD_REQUEST)
    }

    /// Sign as `key` and wrap into a relayable request.
    pub fn sign(self, key: &SigningKey) -> SignedForwardRequest {
        let proof = key.sign_with_proof(&self.digest());
        SignedForwardRequest {
            request: self,
            proof,
        }
    }
}

/// A user-signed forward request, as handed to the relayer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedForwardRequest {
    pub request: ForwardRequest,
    pub proof: SignerProof,
}

/// Result of a forwarded call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ForwardOutcome {
    Staked(Vec<PositionId>),
    Withdrawn(Amount),
}

/// Resolves the effective sender of relayed calls.
#[derive(Clone, Debug)]
pub struct TrustedForwarder {
    ledger: Address,
    forwarder: Option<Address>,
    nonces: HashMap<Address, u64>,
}

impl TrustedForwarder {
    /// `None` disables relaying. A zero forwarder identity is rejected.
    pub fn new(ledger: Address, forwarder: Option<Address>) -> Result<Self> {
        if forwarder.as_ref().is_some_and(address::is_zero) {
            return Err(StakingError::NoZeroAddress);
        }
        Ok(Self {
            ledger,
            forwarder,
            nonces: HashMap::new(),
        })
    }

    pub fn forwarder(&self) -> Option<&Address> {
        self.forwarder.as_ref()
    }

    pub fn is_trusted(&self, who: &Address) -> bool {
        self.forwarder.as_ref() == Some(who)
    }

    /// Next nonce expected in a request from `from`.
    pub fn nonce(&self, from: &Address) -> u64 {
        self.nonces.get(from).copied().unwrap_or(0)
    }

    /// Check `signed` as relayed by `relayer` and return its effective sender.
    pub fn verify(
        &self,
        relayer: &Address,
        signed: &SignedForwardRequest,
        now: Timestamp,
    ) -> Result<Address> {
        let result = self.check(relayer, signed, now);
        if let Err(e) = &result {
            tracing::warn!(
                relayer = %address::short(relayer),
                from = %address::short(&signed.request.from),
                call = signed.request.call.name(),
                error = %e,
                "forward request rejected"
            );
        }
        result
    }

    fn check(&self, relayer: &Address, signed: &SignedForwardRequest, now: Timestamp) -> Result<Address> {
        let request = &signed.request;

        if !self.is_trusted(relayer) {
            return Err(StakingError::UntrustedForwarder);
        }
        if request.to != self.ledger {
            return Err(StakingError::AddressesMismatch);
        }
        if now > request.deadline {
            return Err(StakingError::SignatureExpired);
        }
        let expected = self.nonce(&request.from);
        if request.nonce != expected {
            return Err(StakingError::MismatchingNonces {
                expected,
                actual: request.nonce,
            });
        }
        let signer = recover_signer(&request.digest(), &signed.proof)?;
        if signer != request.from {
            return Err(StakingError::InvalidSignature);
        }
        Ok(request.from)
    }

    /// Advance the nonce of `from`. Returns the consumed value.
    pub fn consume(&mut self, from: &Address) -> Result<u64> {
        let entry = self.nonces.entry(*from).or_insert(0);
        let consumed = *entry;
        *entry = consumed.checked_add(1).ok_or(StakingError::Overflow)?;
        Ok(consumed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tea_crypto::ed25519::KeyPair;

    const LEDGER: Address = [0x4C; 32];
    const RELAYER: Address = [0xF0; 32];

    fn withdraw_request(user: &KeyPair, nonce: u64) -> SignedForwardRequest {
        ForwardRequest {
            from: user.address(),
            to: LEDGER,
            nonce,
            deadline: 1_000,
            call: ForwardedCall::Withdraw { ids: vec![1, 2] },
        }
        .sign(&user.signing_key)
    }

    fn forwarder() -> TrustedForwarder {
        TrustedForwarder::new(LEDGER, Some(RELAYER)).expect("forwarder")
    }

    #[test]
    fn test_valid_request_resolves_sender() {
        let user = KeyPair::generate();
        let mut fwd = forwarder();
        let signed = withdraw_request(&user, 0);

        assert_eq!(fwd.verify(&RELAYER, &signed, 1_000).expect("valid"), user.address());
        assert_eq!(fwd.consume(&user.address()).expect("consume"), 0);
        assert_eq!(fwd.nonce(&user.address()), 1);

        let err = fwd.verify(&RELAYER, &signed, 1_000).unwrap_err();
        assert!(matches!(
            err,
            StakingError::MismatchingNonces {
                expected: 1,
                actual: 0
            }
        ));
    }

    #[test]
    fn test_untrusted_relayer() {
        let user = KeyPair::generate();
        let signed = withdraw_request(&user, 0);
        let err = forwarder().verify(&[0xF1; 32], &signed, 0).unwrap_err();
        assert!(matches!(err, StakingError::UntrustedForwarder));

        let disabled = TrustedForwarder::new(LEDGER, None).expect("disabled");
        let err = disabled.verify(&RELAYER, &signed, 0).unwrap_err();
        assert!(matches!(err, StakingError::UntrustedForwarder));
    }

    #[test]
    fn test_other_ledger_and_expiry() {
        let user = KeyPair::generate();
        let mut request = withdraw_request(&user, 0).request;
        request.to = [0x4D; 32];
        let signed = request.sign(&user.signing_key);
        let err = forwarder().verify(&RELAYER, &signed, 0).unwrap_err();
        assert!(matches!(err, StakingError::AddressesMismatch));

        let signed = withdraw_request(&user, 0);
        let err = forwarder().verify(&RELAYER, &signed, 1_001).unwrap_err();
        assert!(matches!(err, StakingError::SignatureExpired));
    }

    #[test]
    fn test_signer_must_be_sender() {
        let user = KeyPair::generate();
        let other = KeyPair::generate();
        let mut request = withdraw_request(&user, 0).request;
        request.from = other.address();
        let signed = request.sign(&user.signing_key);
        let err = forwarder().verify(&RELAYER, &signed, 0).unwrap_err();
        assert!(matches!(err, StakingError::InvalidSignature));
    }

    #[test]
    fn test_tampered_call_rejected() {
        let user = KeyPair::generate();
        let mut signed = withdraw_request(&user, 0);
        signed.request.call = ForwardedCall::Withdraw { ids: vec![1] };
        let err = forwarder().verify(&RELAYER, &signed, 0).unwrap_err();
        assert!(matches!(err, StakingError::InvalidSignature));
    }

    #[test]
    fn test_zero_forwarder_rejected() {
        let err = TrustedForwarder::new(LEDGER, Some([0u8; 32])).unwrap_err();
        assert!(matches!(err, StakingError::NoZeroAddress));
    }

    #[test]
    fn test_call_digest_binds_arguments() {
        let from = [0xA1; 32];
        let stake = |amount: Amount| ForwardedCall::Stake {
            tokens: vec![[0x01; 32]],
            amounts: vec![amount],
            descriptors: vec![DelegationDescriptor::new([0x01; 32], from, LEDGER)],
            permit: None,
        };
        assert_ne!(stake(1).digest(&from), stake(2).digest(&from));
        assert_ne!(
            ForwardedCall::Withdraw { ids: vec![] }.digest(&from),
            stake(1).digest(&from)
        );
    }

    #[test]
    fn test_request_json_roundtrip() {
        let user = KeyPair::generate();
        let signed = withdraw_request(&user, 4);
        let json = serde_json::to_value(&signed).expect("serialize");
        assert_eq!(json["request"]["call"]["method"], "withdraw");
        let back: SignedForwardRequest = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, signed);
    }
}
