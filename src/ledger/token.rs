//! ERC-20 token with EIP-2612 permits, as an in-memory call target.

use super::memory::{revert_payload, CallContext, CallTarget};
use crate::{
    validation::{Domain, SignatureVerifier},
    Permit,
};
use async_trait::async_trait;
use ethers::abi::{decode, encode, ParamType, Token};
use ethers::types::{Address, Bytes, U256};
use ethers::utils::id;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
struct TokenState {
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
    nonces: HashMap<Address, U256>,
}

/// Clones share balances, so a test can keep a handle after deploying the token.
#[derive(Clone)]
pub struct MemoryToken {
    name: String,
    state: Arc<Mutex<TokenState>>,
}

impl MemoryToken {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(TokenState::default())),
        }
    }

    /// Name used in the token's permit domain
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Credit `amount` new tokens to `to`
    ///
    /// # Returns
    /// The revert payload if the balance would exceed `U256::MAX`
    pub async fn mint(&self, to: Address, amount: U256) -> Result<(), Bytes> {
        let mut state = self.state.lock().await;
        let balance = state.balances.entry(to).or_default();
        *balance = balance.checked_add(amount).ok_or_else(balance_overflow)?;
        Ok(())
    }

    pub async fn balance_of(&self, owner: Address) -> U256 {
        self.state.lock().await.balances.get(&owner).copied().unwrap_or_default()
    }

    pub async fn allowance(&self, owner: Address, spender: Address) -> U256 {
        let state = self.state.lock().await;
        state.allowances.get(&(owner, spender)).copied().unwrap_or_default()
    }

    /// Permit nonce of `owner`
    pub async fn nonces(&self, owner: Address) -> U256 {
        self.state.lock().await.nonces.get(&owner).copied().unwrap_or_default()
    }

    async fn permit(&self, ctx: &CallContext, args: Vec<Token>) -> Result<Bytes, Bytes> {
        let [owner, spender, value, deadline, v, r, s] = <[Token; 7]>::try_from(args).map_err(|_| Bytes::default())?;
        let (owner, spender) = (address(owner)?, address(spender)?);
        let (value, deadline, v) = (uint(value)?, uint(deadline)?, uint(v)?);
        let (r, s) = (word(r)?, word(s)?);

        if ctx.timestamp > deadline {
            return Err(revert_payload("ERC20Permit: expired deadline"));
        }
        if v > U256::from(u8::MAX) {
            return Err(revert_payload("ERC20Permit: invalid signature"));
        }

        let mut state = self.state.lock().await;
        let nonce = state.nonces.get(&owner).copied().unwrap_or_default();
        let permit = Permit {
            owner,
            spender,
            value,
            nonce,
            deadline,
        };

        let verifier = SignatureVerifier::new(Domain::new(self.name.clone(), ctx.chain_id, ctx.this))
            .map_err(|_| Bytes::default())?;
        let mut signature = Vec::with_capacity(65);
        signature.extend_from_slice(&r);
        signature.extend_from_slice(&s);
        signature.push(v.low_u64() as u8);
        if !verifier.verify_typed(&permit, &signature, owner) {
            return Err(revert_payload("ERC20Permit: invalid signature"));
        }

        state.nonces.insert(owner, nonce + 1);
        state.allowances.insert((owner, spender), value);
        Ok(Bytes::default())
    }
}

fn transfer(state: &mut TokenState, from: Address, to: Address, amount: U256) -> Result<(), Bytes> {
    if to.is_zero() {
        return Err(revert_payload("ERC20: transfer to the zero address"));
    }
    let balance = state.balances.get(&from).copied().unwrap_or_default();
    if balance < amount {
        return Err(revert_payload("ERC20: transfer amount exceeds balance"));
    }
    state.balances.insert(from, balance - amount);
    let receiver = state.balances.get(&to).copied().unwrap_or_default();
    let Some(credited) = receiver.checked_add(amount) else {
        state.balances.insert(from, balance);
        return Err(balance_overflow());
    };
    state.balances.insert(to, credited);
    Ok(())
}

fn balance_overflow() -> Bytes {
    revert_payload("ERC20: balance overflow")
}

fn returns_true() -> Bytes {
    encode(&[Token::Bool(true)]).into()
}

fn address(token: Token) -> Result<Address, Bytes> {
    token.into_address().ok_or_default()
}

fn uint(token: Token) -> Result<U256, Bytes> {
    token.into_uint().ok_or_default()
}

fn word(token: Token) -> Result<Vec<u8>, Bytes> {
    token.into_fixed_bytes().ok_or_default()
}

trait OkOrDefault<T> {
    fn ok_or_default(self) -> Result<T, Bytes>;
}

impl<T> OkOrDefault<T> for Option<T> {
    fn ok_or_default(self) -> Result<T, Bytes> {
        self.ok_or_else(Bytes::default)
    }
}

#[async_trait]
impl CallTarget for MemoryToken {
    async fn call(&self, ctx: &CallContext, data: &[u8]) -> Result<Bytes, Bytes> {
        if data.len() < 4 {
            return Err(Bytes::default());
        }
        let (selector, body) = data.split_at(4);
        let args = |types: &[ParamType]| decode(types, body).map_err(|_| Bytes::default());

        if selector == id("transfer(address,uint256)") {
            let mut args = args(&[ParamType::Address, ParamType::Uint(256)])?.into_iter();
            let to = address(args.next().ok_or_default()?)?;
            let amount = uint(args.next().ok_or_default()?)?;
            transfer(&mut *self.state.lock().await, ctx.sender, to, amount)?;
            Ok(returns_true())
        } else if selector == id("approve(address,uint256)") {
            let mut args = args(&[ParamType::Address, ParamType::Uint(256)])?.into_iter();
            let spender = address(args.next().ok_or_default()?)?;
            let amount = uint(args.next().ok_or_default()?)?;
            self.state.lock().await.allowances.insert((ctx.sender, spender), amount);
            Ok(returns_true())
        } else if selector == id("transferFrom(address,address,uint256)") {
            let mut args = args(&[ParamType::Address, ParamType::Address, ParamType::Uint(256)])?.into_iter();
            let from = address(args.next().ok_or_default()?)?;
            let to = address(args.next().ok_or_default()?)?;
            let amount = uint(args.next().ok_or_default()?)?;

            let mut state = self.state.lock().await;
            let allowed = state.allowances.get(&(from, ctx.sender)).copied().unwrap_or_default();
            if allowed < amount {
                return Err(revert_payload("ERC20: insufficient allowance"));
            }
            transfer(&mut state, from, to, amount)?;
            if allowed != U256::MAX {
                state.allowances.insert((from, ctx.sender), allowed - amount);
            }
            Ok(returns_true())
        } else if selector == id("permit(address,address,uint256,uint256,uint8,bytes32,bytes32)") {
            let args = args(&[
                ParamType::Address,
                ParamType::Address,
                ParamType::Uint(256),
                ParamType::Uint(256),
                ParamType::Uint(8),
                ParamType::FixedBytes(32),
                ParamType::FixedBytes(32),
            ])?;
            self.permit(ctx, args).await
        } else {
            // no fallback function
            Err(Bytes::default())
        }
    }
}
