//! Shared fixtures for unit tests: deterministic signers and sample requests.

use crate::{
    validation::{Domain, SignatureVerifier},
    ForwardRequest, SignedRequest,
};
use ethers::abi::{encode, Token};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, U256};
use ethers::utils::id;

pub const CHAIN_ID: u64 = 31337;

// hardhat development accounts #0..#2
const OPERATOR_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const ALICE_KEY: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
const BOB_KEY: &str = "5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a";

fn wallet(key: &str) -> LocalWallet {
    key.parse::<LocalWallet>().unwrap().with_chain_id(CHAIN_ID)
}

pub fn operator() -> LocalWallet {
    wallet(OPERATOR_KEY)
}

pub fn alice() -> LocalWallet {
    wallet(ALICE_KEY)
}

pub fn bob() -> LocalWallet {
    wallet(BOB_KEY)
}

pub fn hub_address() -> Address {
    Address::repeat_byte(0x5f)
}

pub fn hub_domain() -> Domain {
    Domain::new("RelayHub", CHAIN_ID, hub_address())
}

pub fn hub_verifier() -> SignatureVerifier {
    SignatureVerifier::new(hub_domain()).unwrap()
}

/// `transfer(address,uint256)` calldata
pub fn transfer_calldata(to: Address, amount: U256) -> Bytes {
    let mut data = id("transfer(address,uint256)").to_vec();
    data.extend(encode(&[Token::Address(to), Token::Uint(amount)]));
    data.into()
}

pub fn sample_request(from: Address, nonce: u64) -> ForwardRequest {
    ForwardRequest {
        from,
        to: Address::repeat_byte(0x70),
        value: U256::zero(),
        gas: U256::from(1_000_000),
        nonce: U256::from(nonce),
        data: transfer_calldata(Address::repeat_byte(0x0b), U256::from(100)),
    }
}

/// Sign `request` with `signer` under the hub domain.
pub fn sign_request(signer: &LocalWallet, request: ForwardRequest) -> SignedRequest {
    let signature = hub_verifier().sign(signer, &request).unwrap();
    SignedRequest { request, signature }
}
