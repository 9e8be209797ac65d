use crate::{error::DecodeError, ForwardRequest, SignedRequest};
use ethers::types::{Address, Bytes, U256};
use ethers::utils::{hex, to_checksum};
use serde_json::Value;

/// Decode a raw `POST /submit` body.
pub fn decode_submission(body: &[u8]) -> Result<SignedRequest, DecodeError> {
    let raw: Value = serde_json::from_slice(body).map_err(|e| DecodeError::Json(e.to_string()))?;
    decode(&raw)
}

/// Decode `{ "tx": { from, to, value, gas, nonce, data }, "signature": "0x…" }`.
///
/// Purely syntactic: nothing here looks at the chain or at signer state.
pub fn decode(raw: &Value) -> Result<SignedRequest, DecodeError> {
    let tx = raw.get("tx").filter(|tx| !tx.is_null()).ok_or(DecodeError::MissingField("tx"))?;
    let signature = require(raw, "signature")?;

    let request = ForwardRequest {
        from: parse_address(require(tx, "from")?, "from")?,
        to: parse_address(require(tx, "to")?, "to")?,
        value: parse_quantity(require(tx, "value")?, "value")?,
        gas: parse_quantity(require(tx, "gas")?, "gas")?,
        nonce: parse_quantity(require(tx, "nonce")?, "nonce")?,
        data: parse_bytes(require(tx, "data")?, "data")?,
    };

    let signature = parse_bytes(signature, "signature")?;
    if signature.len() != 65 {
        return Err(DecodeError::SignatureLength(signature.len()));
    }

    Ok(SignedRequest { request, signature })
}

fn require<'a>(object: &'a Value, field: &'static str) -> Result<&'a Value, DecodeError> {
    match object.get(field) {
        None | Some(Value::Null) => Err(DecodeError::MissingField(field)),
        Some(value) => Ok(value),
    }
}

/// Parse an address given outside a request body, such as a URL path segment
///
/// Same rules as the `from` and `to` fields of a submission.
pub fn decode_address(text: &str) -> Result<Address, DecodeError> {
    address_from_str(text, "address")
}

fn parse_address(value: &Value, field: &'static str) -> Result<Address, DecodeError> {
    let text = value.as_str().ok_or(DecodeError::InvalidAddress(field))?;
    address_from_str(text, field)
}

/// `0x` followed by 40 hex digits. Mixed-case input must carry a valid EIP-55 checksum.
fn address_from_str(text: &str, field: &'static str) -> Result<Address, DecodeError> {
    let invalid = || DecodeError::InvalidAddress(field);
    let digits = strip_hex_prefix(text).ok_or_else(invalid)?;
    if digits.len() != 40 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let bytes = hex::decode(digits).map_err(|_| invalid())?;
    let address = Address::from_slice(&bytes);

    let has_upper = digits.bytes().any(|b| b.is_ascii_uppercase());
    let has_lower = digits.bytes().any(|b| b.is_ascii_lowercase());
    if has_upper && has_lower && to_checksum(&address, None)[2..] != *digits {
        return Err(invalid());
    }
    Ok(address)
}

/// Non-negative integer in any spelling a JavaScript client may send: a JSON
/// number, a decimal or `0x` hex string, or a serialized ethers `BigNumber`.
fn parse_quantity(value: &Value, field: &'static str) -> Result<U256, DecodeError> {
    let invalid = || DecodeError::InvalidQuantity(field);
    match value {
        Value::Number(number) => number.as_u64().map(U256::from).ok_or_else(invalid),
        Value::String(text) => parse_quantity_str(text).ok_or_else(invalid),
        Value::Object(object) => {
            let hex = match (object.get("type"), object.get("hex")) {
                (Some(Value::String(kind)), Some(Value::String(hex))) if kind == "BigNumber" => hex,
                _ => match object.get("_hex") {
                    Some(Value::String(hex)) => hex,
                    _ => return Err(invalid()),
                },
            };
            strip_hex_prefix(hex)
                .and_then(parse_hex_quantity)
                .ok_or_else(invalid)
        }
        _ => Err(invalid()),
    }
}

fn parse_quantity_str(text: &str) -> Option<U256> {
    if let Some(digits) = strip_hex_prefix(text) {
        return parse_hex_quantity(digits);
    }
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    U256::from_dec_str(text).ok()
}

fn parse_hex_quantity(digits: &str) -> Option<U256> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    U256::from_str_radix(digits, 16).ok()
}

fn parse_bytes(value: &Value, field: &'static str) -> Result<Bytes, DecodeError> {
    let invalid = || DecodeError::InvalidBytes(field);
    let text = value.as_str().ok_or_else(invalid)?;
    let digits = strip_hex_prefix(text).ok_or_else(invalid)?;
    if digits.len() % 2 != 0 {
        return Err(invalid());
    }
    hex::decode(digits).map(Bytes::from).map_err(|_| invalid())
}

fn strip_hex_prefix(text: &str) -> Option<&str> {
    text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    const FROM: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
    const TO: &str = "0x3c44cdddb6a900fa2b585dd299e03d12fa4293bc";

    fn signature_hex() -> String {
        format!("0x{}", "ab".repeat(64) + "1b")
    }

    fn body(tx: Value) -> Value {
        json!({ "tx": tx, "signature": signature_hex() })
    }

    fn valid_tx() -> Value {
        json!({
            "from": FROM,
            "to": TO,
            "value": 0,
            "gas": 1000000,
            "nonce": "0x01",
            "data": "0xa9059cbb"
        })
    }

    fn with(field: &str, value: Value) -> Value {
        let mut tx = valid_tx();
        tx[field] = value;
        body(tx)
    }

    #[test]
    fn test_decode_valid_submission() {
        let signed = decode(&body(valid_tx())).unwrap();
        assert_eq!(signed.request.from, Address::from_str(FROM).unwrap());
        assert_eq!(signed.request.to, Address::from_str(TO).unwrap());
        assert_eq!(signed.request.value, U256::zero());
        assert_eq!(signed.request.gas, U256::from(1_000_000));
        assert_eq!(signed.request.nonce, U256::one());
        assert_eq!(signed.request.data.to_vec(), vec![0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(signed.signature.len(), 65);
        assert_eq!(signed.signature[64], 0x1b);
    }

    #[test]
    fn test_decode_from_raw_bytes() {
        let raw = serde_json::to_vec(&body(valid_tx())).unwrap();
        assert!(decode_submission(&raw).is_ok());
        assert!(matches!(decode_submission(b"not json"), Err(DecodeError::Json(_))));
    }

    #[test]
    fn test_quantity_spellings() {
        let cases = [
            (json!(42), 42u64),
            (json!("42"), 42),
            (json!("0x2a"), 42),
            (json!("0X2A"), 42),
            (json!({ "type": "BigNumber", "hex": "0x2a" }), 42),
            (json!({ "_hex": "0x2a", "_isBigNumber": true }), 42),
        ];
        for (raw, expected) in cases {
            let signed = decode(&with("value", raw.clone())).unwrap();
            assert_eq!(signed.request.value, U256::from(expected), "{raw}");
        }

        let max = format!("0x{}", "f".repeat(64));
        assert_eq!(decode(&with("gas", json!(max))).unwrap().request.gas, U256::MAX);
    }

    #[test]
    fn test_invalid_quantities_are_rejected() {
        let too_big = format!("0x1{}", "0".repeat(64));
        for raw in [
            json!(-1),
            json!(1.5),
            json!("-1"),
            json!("1.5"),
            json!(""),
            json!("0x"),
            json!("0xzz"),
            json!(too_big),
            json!(true),
            json!({ "type": "Other", "hex": "0x01" }),
        ] {
            assert_eq!(
                decode(&with("nonce", raw.clone())),
                Err(DecodeError::InvalidQuantity("nonce")),
                "{raw}"
            );
        }
    }

    #[test]
    fn test_invalid_addresses_are_rejected() {
        for raw in [
            json!("0x1234"),
            json!("70997970c51812dc3a010c7d01b50e0d17dc79c8"),
            json!("0x70997970c51812dc3a010c7d01b50e0d17dc79zz"),
            // checksum with one letter's case flipped
            json!("0x70997970c51812dc3A010C7d01b50e0d17dc79C8"),
            json!(12),
        ] {
            assert_eq!(
                decode(&with("from", raw.clone())),
                Err(DecodeError::InvalidAddress("from")),
                "{raw}"
            );
        }
        // all-uppercase digits carry no checksum and are accepted
        assert!(decode(&with("to", json!("0x3C44CDDDB6A900FA2B585DD299E03D12FA4293BC"))).is_ok());
    }

    #[test]
    fn test_decode_address_applies_body_rules() {
        let expected = Address::from_str(FROM).unwrap();
        assert_eq!(decode_address(FROM), Ok(expected));
        assert_eq!(decode_address(&FROM.to_lowercase()), Ok(expected));

        for raw in [
            "70997970C51812dc3A010C7d01b50e0d17dc79C8",
            "0x70997970c51812dc3A010C7d01b50e0d17dc79C8",
            "0x70997970C51812dc3A010C7d01b50e0d17dc79",
            "",
        ] {
            assert_eq!(decode_address(raw), Err(DecodeError::InvalidAddress("address")), "{raw}");
        }
    }

    #[test]
    fn test_invalid_data_is_rejected() {
        for raw in [json!("a9059cbb"), json!("0xa9059cb"), json!("0xgg"), json!(7)] {
            assert_eq!(
                decode(&with("data", raw.clone())),
                Err(DecodeError::InvalidBytes("data")),
                "{raw}"
            );
        }
        assert_eq!(decode(&with("data", json!("0x"))).unwrap().request.data.len(), 0);
    }

    #[test]
    fn test_missing_fields_are_rejected() {
        assert_eq!(
            decode(&json!({ "signature": signature_hex() })),
            Err(DecodeError::MissingField("tx"))
        );
        assert_eq!(
            decode(&json!({ "tx": valid_tx() })),
            Err(DecodeError::MissingField("signature"))
        );
        let mut tx = valid_tx();
        tx.as_object_mut().unwrap().remove("gas");
        assert_eq!(decode(&body(tx)), Err(DecodeError::MissingField("gas")));
        assert_eq!(decode(&with("data", Value::Null)), Err(DecodeError::MissingField("data")));
    }

    #[test]
    fn test_signature_must_be_65_bytes() {
        let mut raw = body(valid_tx());
        raw["signature"] = json!("0x0000");
        assert_eq!(decode(&raw), Err(DecodeError::SignatureLength(2)));

        raw["signature"] = json!("0xnothex");
        assert_eq!(decode(&raw), Err(DecodeError::InvalidBytes("signature")));
    }
}
