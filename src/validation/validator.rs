use crate::{
    error::{SignError, TypedDataError},
    validation::typed_data::{typed_data_digest, Domain, TypedStruct},
    ForwardRequest,
};
use ethers::signers::LocalWallet;
use ethers::types::{Address, Bytes, Signature, H256, U256};
use tracing::debug;

/// secp256k1 group order divided by two; larger `s` values are malleable twins.
const HALF_ORDER: [u8; 32] = [
    0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0x5d, 0x57, 0x6e, 0x73, 0x57, 0xa4, 0x50, 0x1d, 0xdf, 0xe9, 0x2f, 0x46, 0x68, 0x1b, 0x20, 0xa0,
];

/// Verifies typed-data signatures under one fixed domain.
///
/// The domain separator is computed once at construction. Verification never
/// touches sequence counters; it is a pure function of the value, the
/// signature and the domain.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    domain: Domain,
    separator: H256,
}

impl SignatureVerifier {
    pub fn new(domain: Domain) -> Result<Self, TypedDataError> {
        let separator = domain.separator()?;
        Ok(Self { domain, separator })
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Digest a signer has to sign for `value` under this domain
    pub fn digest<T: TypedStruct>(&self, value: &T) -> Result<H256, TypedDataError> {
        Ok(typed_data_digest(self.separator, value.struct_hash()?))
    }

    /// Check that `signature` over a forward request was produced by `request.from`.
    pub fn verify(&self, request: &ForwardRequest, signature: &[u8]) -> bool {
        self.verify_typed(request, signature, request.from)
    }

    /// Check that `signature` over any typed struct recovers to `expected`.
    pub fn verify_typed<T: TypedStruct>(&self, value: &T, signature: &[u8], expected: Address) -> bool {
        let Ok(digest) = self.digest(value) else {
            return false;
        };
        match recover_signer(digest, signature) {
            Some(signer) if signer == expected => true,
            Some(signer) => {
                debug!("Signature verification failed: recovered {:?}, expected {:?}", signer, expected);
                false
            }
            None => {
                debug!("Signature verification failed: malformed signature");
                false
            }
        }
    }

    /// Sign `value` under this domain, returning the 65-byte `r || s || v` encoding.
    pub fn sign<T: TypedStruct>(&self, wallet: &LocalWallet, value: &T) -> Result<Bytes, SignError> {
        let digest = self.digest(value)?;
        let signature = wallet.sign_hash(digest)?;
        Ok(Bytes::from(signature.to_vec()))
    }
}

/// One-shot form of [`SignatureVerifier::verify`].
pub fn verify(request: &ForwardRequest, signature: &[u8], domain: &Domain) -> bool {
    SignatureVerifier::new(domain.clone())
        .map(|verifier| verifier.verify(request, signature))
        .unwrap_or(false)
}

/// Recover the address that signed `digest`.
///
/// Mirrors on-chain `ECDSA.tryRecover`: the signature must be exactly 65
/// bytes, `v` must be 27 or 28, and `s` must lie in the lower half of the
/// curve order. Anything else yields `None`.
pub fn recover_signer(digest: H256, signature: &[u8]) -> Option<Address> {
    if signature.len() != 65 {
        return None;
    }
    let v = signature[64];
    if v != 27 && v != 28 {
        return None;
    }
    let r = U256::from_big_endian(&signature[..32]);
    let s = U256::from_big_endian(&signature[32..64]);
    if r.is_zero() || s.is_zero() || s > U256::from_big_endian(&HALF_ORDER) {
        return None;
    }

    Signature { r, s, v: v as u64 }.recover(digest).ok()
}
