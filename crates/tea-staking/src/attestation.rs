//! Operator attestations for exit requests.
//!
//! An off-chain operator signs an [`ExitPayload`] naming the user, the
//! position ids, the reward attested for each id, the operator-user nonce
//! and a deadline. The digest is domain separated twice: by a type hash
//! ([`AttestationDomain`]) so an unstake attestation can never be replayed
//! as a claim, and by the ledger's own address.
//!
//! ## Check order
//!
//! 1. operator is in the operator set
//! 2. `now <= deadline`
//! 3. nonce equals the stored nonce for (operator, user)
//! 4. the signature verifies and its signer is the operator
//!
//! Verification is read-only. The nonce is consumed separately with
//! [`AttestationVerifier::consume`] once the rest of the request has been
//! validated, so a rejected request leaves the nonce untouched.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as, DisplayFromStr};
use tea_crypto::blake3::{self, contexts, FieldEncoder};
use tea_crypto::ed25519::{SignerProof, SigningKey};
use tea_types::{address, Address, Amount, Hash, PositionId, Timestamp};

use crate::{Result, StakingError};

/// Which exit the attestation authorizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttestationDomain {
    Unstake,
    Claim,
}

impl AttestationDomain {
    /// Canonical type string hashed into the digest.
    pub fn type_string(&self) -> &'static str {
        match self {
            Self::Unstake => {
                "Unstake(address user,uint256[] ids,uint256[] rewardsWithLoyalty,uint256 nonce,uint256 deadline)"
            }
            Self::Claim => {
                "Claim(address user,uint256[] ids,uint256[] rewardsWithLoyalty,uint256 nonce,uint256 deadline)"
            }
        }
    }

    pub fn type_hash(&self) -> Hash {
        blake3::hash(self.type_string().as_bytes())
    }
}

impl std::fmt::Display for AttestationDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unstake => write!(f, "unstake"),
            Self::Claim => write!(f, "claim"),
        }
    }
}

/// The signed part of an exit request.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitPayload {
    #[serde_as(as = "Hex")]
    pub user: Address,
    pub ids: Vec<PositionId>,
    #[serde_as(as = "Vec<DisplayFromStr>")]
    pub rewards_with_loyalty: Vec<Amount>,
    pub nonce: u64,
    pub deadline: Timestamp,
}

impl ExitPayload {
    /// Digest an operator signs for this payload on ledger `ledger`.
    pub fn digest(&self, domain: AttestationDomain, ledger: &Address) -> Hash {
        attestation_digest(
            domain,
            ledger,
            &self.user,
            &self.ids,
            &self.rewards_with_loyalty,
            self.nonce,
            self.deadline,
        )
    }

    /// Sign as `operator_key` and wrap into a submittable request.
    pub fn sign(
        self,
        domain: AttestationDomain,
        ledger: &Address,
        operator_key: &SigningKey,
    ) -> ExitRequest {
        let proof = operator_key.sign_with_proof(&self.digest(domain, ledger));
        ExitRequest {
            operator: operator_key.verifying_key().to_bytes(),
            payload: self,
            proof,
        }
    }
}

/// An operator-attested exit request.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitRequest {
    #[serde_as(as = "Hex")]
    pub operator: Address,
    pub payload: ExitPayload,
    pub proof: SignerProof,
}

/// Canonical attestation digest.
///
/// `derive_key(EXIT_ATTESTATION, type_hash ‖ ledger ‖ user ‖ ids ‖ rewards ‖ nonce ‖ deadline)`
/// with big-endian integers and length-prefixed lists.
pub fn attestation_digest(
    domain: AttestationDomain,
    ledger: &Address,
    user: &Address,
    ids: &[PositionId],
    rewards_with_loyalty: &[Amount],
    nonce: u64,
    deadline: Timestamp,
) -> Hash {
    FieldEncoder::new()
        .bytes32(&domain.type_hash())
        .bytes32(ledger)
        .bytes32(user)
        .u64_list(ids)
        .u128_list(rewards_with_loyalty)
        .u64(nonce)
        .u64(deadline)
        .digest(contexts::EXIT_ATTESTATION)
}

/// Recover the signer identity of `proof` over `digest`.
///
/// Any cryptographic failure is reported as `InvalidSignature`.
pub fn recover_signer(digest: &Hash, proof: &SignerProof) -> Result<Address> {
    proof
        .recover(digest)
        .map_err(|_| StakingError::InvalidSignature)
}

/// Per-(operator, user) nonces.
#[derive(Clone, Debug, Default)]
pub struct NonceBook {
    nonces: HashMap<(Address, Address), u64>,
}

impl NonceBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next nonce expected from `operator` for `user`.
    pub fn current(&self, operator: &Address, user: &Address) -> u64 {
        self.nonces.get(&(*operator, *user)).copied().unwrap_or(0)
    }

    /// Advance the nonce for the pair. Returns the consumed value.
    pub fn bump(&mut self, operator: &Address, user: &Address) -> Result<u64> {
        let entry = self.nonces.entry((*operator, *user)).or_insert(0);
        let consumed = *entry;
        *entry = consumed.checked_add(1).ok_or(StakingError::Overflow)?;
        Ok(consumed)
    }
}

/// Verifies exit requests against the operator set and the nonce book.
#[derive(Clone, Debug)]
pub struct AttestationVerifier {
    ledger: Address,
    operators: HashSet<Address>,
    nonces: NonceBook,
}

impl AttestationVerifier {
    /// Build a verifier for ledger `ledger`. Zero operator identities are rejected.
    pub fn new(ledger: Address, operators: impl IntoIterator<Item = Address>) -> Result<Self> {
        let mut set = HashSet::new();
        for op in operators {
            if address::is_zero(&op) {
                return Err(StakingError::NoZeroAddress);
            }
            set.insert(op);
        }
        Ok(Self {
            ledger,
            operators: set,
            nonces: NonceBook::new(),
        })
    }

    pub fn is_operator(&self, who: &Address) -> bool {
        self.operators.contains(who)
    }

    pub fn nonce(&self, operator: &Address, user: &Address) -> u64 {
        self.nonces.current(operator, user)
    }

    /// Digest for `payload` under `domain` on this ledger.
    pub fn digest(&self, domain: AttestationDomain, payload: &ExitPayload) -> Hash {
        payload.digest(domain, &self.ledger)
    }

    /// Check `request` without consuming its nonce.
    pub fn verify(
        &self,
        domain: AttestationDomain,
        request: &ExitRequest,
        now: Timestamp,
    ) -> Result<()> {
        let result = self.check(domain, request, now);
        if let Err(e) = &result {
            tracing::warn!(
                domain = %domain,
                operator = %address::short(&request.operator),
                user = %address::short(&request.payload.user),
                error = %e,
                "attestation rejected"
            );
        }
        result
    }

    fn check(&self, domain: AttestationDomain, request: &ExitRequest, now: Timestamp) -> Result<()> {
        let payload = &request.payload;

        if !self.is_operator(&request.operator) {
            return Err(StakingError::InvalidOperator);
        }
        if now > payload.deadline {
            return Err(StakingError::SignatureExpired);
        }
        let expected = self.nonce(&request.operator, &payload.user);
        if payload.nonce != expected {
            return Err(StakingError::MismatchingNonces {
                expected,
                actual: payload.nonce,
            });
        }
        let signer = recover_signer(&self.digest(domain, payload), &request.proof)?;
        if signer != request.operator {
            return Err(StakingError::InvalidSignature);
        }
        Ok(())
    }

    /// Consume the nonce of a verified request.
    pub fn consume(&mut self, request: &ExitRequest) -> Result<u64> {
        self.nonces.bump(&request.operator, &request.payload.user)
    }
}
