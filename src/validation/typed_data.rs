//! EIP-712 typed structured data hashing.
//!
//! Every struct the relayer signs or verifies is described once in the schema
//! table below. Signing and verification both go through [`TypedSchema::hash_struct`],
//! so a schema cannot drift between the two paths.

use ethers::abi::Token;
use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;

use crate::{error::TypedDataError, ForwardRequest, Permit};

/// Solidity types that appear in the relayer's schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Address,
    Uint256,
    Bytes,
    String,
}

impl FieldKind {
    fn type_name(self) -> &'static str {
        match self {
            FieldKind::Address => "address",
            FieldKind::Uint256 => "uint256",
            FieldKind::Bytes => "bytes",
            FieldKind::String => "string",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn field(name: &'static str, kind: FieldKind) -> Field {
    Field { name, kind }
}

/// A named struct type and its ordered members.
#[derive(Debug)]
pub struct TypedSchema {
    pub name: &'static str,
    pub fields: &'static [Field],
}

pub const EIP712_DOMAIN: TypedSchema = TypedSchema {
    name: "EIP712Domain",
    fields: &[
        field("name", FieldKind::String),
        field("version", FieldKind::String),
        field("chainId", FieldKind::Uint256),
        field("verifyingContract", FieldKind::Address),
    ],
};

pub const FORWARD_REQUEST: TypedSchema = TypedSchema {
    name: "ForwardRequest",
    fields: &[
        field("from", FieldKind::Address),
        field("to", FieldKind::Address),
        field("value", FieldKind::Uint256),
        field("gas", FieldKind::Uint256),
        field("nonce", FieldKind::Uint256),
        field("data", FieldKind::Bytes),
    ],
};

pub const PERMIT: TypedSchema = TypedSchema {
    name: "Permit",
    fields: &[
        field("owner", FieldKind::Address),
        field("spender", FieldKind::Address),
        field("value", FieldKind::Uint256),
        field("nonce", FieldKind::Uint256),
        field("deadline", FieldKind::Uint256),
    ],
};

/// Every schema the relayer knows, keyed by struct name.
pub const SCHEMAS: [&TypedSchema; 3] = [&EIP712_DOMAIN, &FORWARD_REQUEST, &PERMIT];

pub fn schema(name: &str) -> Option<&'static TypedSchema> {
    SCHEMAS.iter().copied().find(|schema| schema.name == name)
}

impl TypedSchema {
    /// `Name(type1 name1,type2 name2,...)`
    pub fn encode_type(&self) -> String {
        let members: Vec<String> = self
            .fields
            .iter()
            .map(|f| format!("{} {}", f.kind.type_name(), f.name))
            .collect();
        format!("{}({})", self.name, members.join(","))
    }

    pub fn type_hash(&self) -> H256 {
        H256(keccak256(self.encode_type()))
    }

    /// `keccak256(typeHash || encodeData(values))`
    pub fn hash_struct(&self, values: &[Token]) -> Result<H256, TypedDataError> {
        if values.len() != self.fields.len() {
            return Err(TypedDataError::Arity {
                schema: self.name,
                expected: self.fields.len(),
                got: values.len(),
            });
        }

        let mut encoded = Vec::with_capacity(32 * (values.len() + 1));
        encoded.extend_from_slice(self.type_hash().as_bytes());
        for (field, value) in self.fields.iter().zip(values) {
            encoded.extend_from_slice(&self.encode_value(field, value)?);
        }
        Ok(H256(keccak256(encoded)))
    }

    fn encode_value(&self, field: &Field, value: &Token) -> Result<[u8; 32], TypedDataError> {
        let word = match (field.kind, value) {
            (FieldKind::Address, Token::Address(address)) => H256::from(*address).0,
            (FieldKind::Uint256, Token::Uint(number)) => {
                let mut word = [0u8; 32];
                number.to_big_endian(&mut word);
                word
            }
            // dynamic members are hashed in place
            (FieldKind::Bytes, Token::Bytes(bytes)) => keccak256(bytes),
            (FieldKind::String, Token::String(text)) => keccak256(text.as_bytes()),
            _ => {
                return Err(TypedDataError::KindMismatch {
                    schema: self.name,
                    field: field.name,
                })
            }
        };
        Ok(word)
    }
}

/// A Rust value that can be hashed under one of the schemas above.
pub trait TypedStruct {
    const SCHEMA: &'static TypedSchema;

    /// Member values in schema order.
    fn field_values(&self) -> Vec<Token>;

    fn struct_hash(&self) -> Result<H256, TypedDataError> {
        Self::SCHEMA.hash_struct(&self.field_values())
    }
}

/// EIP-712 domain binding a signature to one contract on one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    pub name: String,
    pub version: String,
    pub chain_id: U256,
    pub verifying_contract: Address,
}

impl Domain {
    /// Domain with the version fixed to `"1"`, as both the hub and permit tokens use.
    pub fn new(name: impl Into<String>, chain_id: impl Into<U256>, verifying_contract: Address) -> Self {
        Self {
            name: name.into(),
            version: "1".to_string(),
            chain_id: chain_id.into(),
            verifying_contract,
        }
    }

    pub fn separator(&self) -> Result<H256, TypedDataError> {
        self.struct_hash()
    }
}

impl TypedStruct for Domain {
    const SCHEMA: &'static TypedSchema = &EIP712_DOMAIN;

    fn field_values(&self) -> Vec<Token> {
        vec![
            Token::String(self.name.clone()),
            Token::String(self.version.clone()),
            Token::Uint(self.chain_id),
            Token::Address(self.verifying_contract),
        ]
    }
}

impl TypedStruct for ForwardRequest {
    const SCHEMA: &'static TypedSchema = &FORWARD_REQUEST;

    fn field_values(&self) -> Vec<Token> {
        vec![
            Token::Address(self.from),
            Token::Address(self.to),
            Token::Uint(self.value),
            Token::Uint(self.gas),
            Token::Uint(self.nonce),
            Token::Bytes(self.data.to_vec()),
        ]
    }
}

impl TypedStruct for Permit {
    const SCHEMA: &'static TypedSchema = &PERMIT;

    fn field_values(&self) -> Vec<Token> {
        vec![
            Token::Address(self.owner),
            Token::Address(self.spender),
            Token::Uint(self.value),
            Token::Uint(self.nonce),
            Token::Uint(self.deadline),
        ]
    }
}

/// `keccak256(0x19 0x01 || domainSeparator || structHash)`
pub fn typed_data_digest(domain_separator: H256, struct_hash: H256) -> H256 {
    let mut preimage = [0u8; 66];
    preimage[0] = 0x19;
    preimage[1] = 0x01;
    preimage[2..34].copy_from_slice(domain_separator.as_bytes());
    preimage[34..].copy_from_slice(struct_hash.as_bytes());
    H256(keccak256(preimage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::Bytes;
    use std::str::FromStr;

    #[test]
    fn test_encode_type_strings() {
        assert_eq!(
            FORWARD_REQUEST.encode_type(),
            "ForwardRequest(address from,address to,uint256 value,uint256 gas,uint256 nonce,bytes data)"
        );
        assert_eq!(
            PERMIT.encode_type(),
            "Permit(address owner,address spender,uint256 value,uint256 nonce,uint256 deadline)"
        );
        assert_eq!(
            EIP712_DOMAIN.encode_type(),
            "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)"
        );
    }

    #[test]
    fn test_domain_separator_matches_reference_vector() {
        // "Ether Mail" domain from the EIP-712 reference example
        let domain = Domain::new(
            "Ether Mail",
            1u64,
            Address::from_str("0xCcCCccccCCCCcCCCCCCcCcCccCcCCCcCcccccccC").unwrap(),
        );
        let expected =
            H256::from_str("0xf2cee375fa42b42143804025fc449deafd50cc031ca257e0b194a650a912090f")
                .unwrap();
        assert_eq!(domain.separator().unwrap(), expected);
    }

    #[test]
    fn test_schema_lookup_by_name() {
        assert_eq!(schema("Permit").unwrap().fields.len(), 5);
        assert_eq!(schema("ForwardRequest").unwrap().fields[5].name, "data");
        assert!(schema("Mail").is_none());
    }

    #[test]
    fn test_hash_struct_rejects_mismatched_values() {
        let err = PERMIT.hash_struct(&[Token::Bool(true)]).unwrap_err();
        assert_eq!(
            err,
            TypedDataError::Arity {
                schema: "Permit",
                expected: 5,
                got: 1
            }
        );

        let mut values = ForwardRequest {
            from: Address::zero(),
            to: Address::zero(),
            value: U256::zero(),
            gas: U256::zero(),
            nonce: U256::zero(),
            data: Bytes::default(),
        }
        .field_values();
        values[2] = Token::String("1".to_string());
        let err = FORWARD_REQUEST.hash_struct(&values).unwrap_err();
        assert_eq!(
            err,
            TypedDataError::KindMismatch {
                schema: "ForwardRequest",
                field: "value"
            }
        );
    }

    #[test]
    fn test_struct_hash_depends_on_every_field() {
        let base = ForwardRequest {
            from: Address::repeat_byte(1),
            to: Address::repeat_byte(2),
            value: U256::from(3),
            gas: U256::from(4),
            nonce: U256::from(5),
            data: Bytes::from(vec![6]),
        };
        let hash = base.struct_hash().unwrap();

        let mut changed = base.clone();
        changed.data = Bytes::from(vec![7]);
        assert_ne!(changed.struct_hash().unwrap(), hash);

        let mut changed = base.clone();
        changed.gas = U256::from(5);
        assert_ne!(changed.struct_hash().unwrap(), hash);
    }
}
