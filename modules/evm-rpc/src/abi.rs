//! The scan registry's contract interface and the slice of the Solidity ABI
//! it needs: static words plus dynamic strings.

use serde::Deserialize;
use sha3::{Digest, Keccak256};

use crate::signer::Address;

const BUNDLED_ABI: &str = include_str!("../abi/scan_registry.json");
const WORD: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum AbiError {
    #[error("invalid ABI document: {0}")]
    Document(#[from] serde_json::Error),
    #[error("function {0} is not part of the contract interface")]
    UnknownFunction(String),
    #[error("{function} takes {expected} arguments, got {got}")]
    Arity { function: String, expected: usize, got: usize },
    #[error("{function}: argument {index} does not fit {ty}")]
    TypeMismatch { function: String, index: usize, ty: String },
    #[error("unsupported ABI type {0}")]
    Unsupported(String),
    #[error("return data too short")]
    ShortData,
    #[error("value does not fit {0}")]
    Overflow(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    Uint(u128),
    Bool(bool),
    Bytes32([u8; 32]),
    String(String),
}

impl Token {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Token::Address(a) => a.to_checksum().into(),
            Token::Uint(v) => match u64::try_from(*v) {
                Ok(small) => small.into(),
                Err(_) => v.to_string().into(),
            },
            Token::Bool(b) => (*b).into(),
            Token::Bytes32(b) => format!("0x{}", hex::encode(b)).into(),
            Token::String(s) => s.clone().into(),
        }
    }
}

#[derive(Deserialize)]
struct RawEntry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    inputs: Vec<RawParam>,
    #[serde(default)]
    outputs: Vec<RawParam>,
    #[serde(default, rename = "stateMutability")]
    state_mutability: String,
}

#[derive(Deserialize)]
struct RawParam {
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Clone)]
pub struct AbiFunction {
    pub name: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub output_names: Vec<String>,
    pub read_only: bool,
}

impl AbiFunction {
    pub fn signature(&self) -> String {
        format!("{}({})", self.name, self.inputs.join(","))
    }

    pub fn selector(&self) -> [u8; 4] {
        selector(&self.signature())
    }

    pub fn encode_call(&self, args: &[Token]) -> Result<Vec<u8>, AbiError> {
        if args.len() != self.inputs.len() {
            return Err(AbiError::Arity { function: self.name.clone(), expected: self.inputs.len(), got: args.len() });
        }
        for (index, (ty, token)) in self.inputs.iter().zip(args).enumerate() {
            if !fits(ty, token)? {
                return Err(AbiError::TypeMismatch { function: self.name.clone(), index, ty: ty.clone() });
            }
        }
        let mut out = self.selector().to_vec();
        out.extend(encode_tokens(args));
        Ok(out)
    }

    pub fn decode_output(&self, data: &[u8]) -> Result<Vec<Token>, AbiError> {
        decode_tokens(&self.outputs, data)
    }
}

#[derive(Debug, Clone)]
pub struct ContractAbi {
    functions: Vec<AbiFunction>,
}

impl ContractAbi {
    /// The interface shipped with this crate.
    pub fn bundled() -> Result<Self, AbiError> {
        Self::parse(BUNDLED_ABI)
    }

    pub fn parse(doc: &str) -> Result<Self, AbiError> {
        let entries: Vec<RawEntry> = serde_json::from_str(doc)?;
        let functions = entries
            .into_iter()
            .filter(|e| e.kind == "function")
            .map(|e| AbiFunction {
                read_only: matches!(e.state_mutability.as_str(), "view" | "pure"),
                inputs: e.inputs.into_iter().map(|p| p.ty).collect(),
                output_names: e.outputs.iter().map(|p| p.name.clone()).collect(),
                outputs: e.outputs.into_iter().map(|p| p.ty).collect(),
                name: e.name,
            })
            .collect();
        Ok(ContractAbi { functions })
    }

    pub fn function(&self, name: &str) -> Result<&AbiFunction, AbiError> {
        self.functions
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| AbiError::UnknownFunction(name.to_string()))
    }

    pub fn function_names(&self) -> Vec<&str> {
        self.functions.iter().map(|f| f.name.as_str()).collect()
    }
}

pub fn selector(signature: &str) -> [u8; 4] {
    let digest = Keccak256::digest(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

pub fn uint_word(value: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Head/tail layout: dynamic values leave an offset in the head.
pub fn encode_tokens(tokens: &[Token]) -> Vec<u8> {
    let head_len = tokens.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();
    for token in tokens {
        match token {
            Token::String(s) => {
                head.extend(uint_word((head_len + tail.len()) as u128));
                tail.extend(uint_word(s.len() as u128));
                tail.extend(s.as_bytes());
                let pad = (WORD - s.len() % WORD) % WORD;
                tail.extend(std::iter::repeat(0u8).take(pad));
            }
            Token::Address(a) => {
                let mut word = [0u8; WORD];
                word[12..].copy_from_slice(&a.0);
                head.extend(word);
            }
            Token::Uint(v) => head.extend(uint_word(*v)),
            Token::Bool(b) => head.extend(uint_word(*b as u128)),
            Token::Bytes32(b) => head.extend(b),
        }
    }
    head.extend(tail);
    head
}

pub fn decode_tokens(types: &[String], data: &[u8]) -> Result<Vec<Token>, AbiError> {
    types
        .iter()
        .enumerate()
        .map(|(i, ty)| {
            let word = word_at(data, i * WORD)?;
            match ty.as_str() {
                "address" => {
                    let mut a = [0u8; 20];
                    a.copy_from_slice(&word[12..]);
                    Ok(Token::Address(Address(a)))
                }
                "bool" => Ok(Token::Bool(word[WORD - 1] != 0)),
                "bytes32" => {
                    let mut b = [0u8; 32];
                    b.copy_from_slice(word);
                    Ok(Token::Bytes32(b))
                }
                "string" => {
                    let offset = word_to_usize(word, ty)?;
                    let len = word_to_usize(word_at(data, offset)?, ty)?;
                    let start = offset.checked_add(WORD).ok_or(AbiError::ShortData)?;
                    let end = start.checked_add(len).ok_or(AbiError::ShortData)?;
                    let bytes = data.get(start..end).ok_or(AbiError::ShortData)?;
                    Ok(Token::String(String::from_utf8_lossy(bytes).into_owned()))
                }
                t if uint_bits(t).is_some() => Ok(Token::Uint(word_to_u128(word, ty)?)),
                other => Err(AbiError::Unsupported(other.to_string())),
            }
        })
        .collect()
}

fn word_at(data: &[u8], offset: usize) -> Result<&[u8], AbiError> {
    let end = offset.checked_add(WORD).ok_or(AbiError::ShortData)?;
    data.get(offset..end).ok_or(AbiError::ShortData)
}

fn word_to_u128(word: &[u8], ty: &str) -> Result<u128, AbiError> {
    if word[..16].iter().any(|b| *b != 0) {
        return Err(AbiError::Overflow(ty.to_string()));
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&word[16..]);
    Ok(u128::from_be_bytes(low))
}

fn word_to_usize(word: &[u8], ty: &str) -> Result<usize, AbiError> {
    usize::try_from(word_to_u128(word, ty)?).map_err(|_| AbiError::Overflow(ty.to_string()))
}

fn uint_bits(ty: &str) -> Option<u32> {
    let bits = ty.strip_prefix("uint")?;
    if bits.is_empty() {
        return Some(256);
    }
    bits.parse().ok().filter(|b| *b > 0 && *b <= 256 && b % 8 == 0)
}

fn fits(ty: &str, token: &Token) -> Result<bool, AbiError> {
    Ok(match (ty, token) {
        ("address", Token::Address(_)) | ("bool", Token::Bool(_)) | ("bytes32", Token::Bytes32(_)) => true,
        ("string", Token::String(_)) => true,
        (t, Token::Uint(v)) if uint_bits(t).is_some() => match uint_bits(t) {
            Some(bits) if bits < 128 => *v < (1u128 << bits),
            _ => true,
        },
        ("address" | "bool" | "bytes32" | "string", _) => false,
        (t, _) if uint_bits(t).is_some() => false,
        (other, _) => return Err(AbiError::Unsupported(other.to_string())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_interface_has_registry_functions() {
        let abi = ContractAbi::bundled().unwrap();
        for name in ["publishScanSummary", "owner", "authorizedPublishers", "getContractInfo", "VERSION"] {
            assert!(abi.function(name).is_ok(), "{name}");
        }
        let publish = abi.function("publishScanSummary").unwrap();
        assert_eq!(publish.signature(), "publishScanSummary(string,uint256,bytes32,uint16,string)");
        assert!(!publish.read_only);
        assert!(abi.function("owner").unwrap().read_only);
        assert!(matches!(abi.function("burn"), Err(AbiError::UnknownFunction(_))));
    }

    #[test]
    fn known_selectors() {
        assert_eq!(hex::encode(selector("owner()")), "8da5cb5b");
        assert_eq!(hex::encode(selector("transfer(address,uint256)")), "a9059cbb");
        let abi = ContractAbi::bundled().unwrap();
        assert_eq!(abi.function("owner").unwrap().selector(), selector("owner()"));
    }

    #[test]
    fn encodes_dynamic_strings_after_head() {
        let data = encode_tokens(&[Token::String("abc".into()), Token::Uint(7)]);
        assert_eq!(data.len(), 4 * WORD);
        assert_eq!(data[..WORD], uint_word(64));
        assert_eq!(data[WORD..2 * WORD], uint_word(7));
        assert_eq!(data[2 * WORD..3 * WORD], uint_word(3));
        assert_eq!(&data[3 * WORD..3 * WORD + 3], b"abc");
        assert!(data[3 * WORD + 3..].iter().all(|b| *b == 0));
    }

    #[test]
    fn publish_call_checks_arity_and_ranges() {
        let abi = ContractAbi::bundled().unwrap();
        let publish = abi.function("publishScanSummary").unwrap();
        let args = vec![
            Token::String("validator_123".into()),
            Token::Uint(1_700_000_000),
            Token::Bytes32([0xab; 32]),
            Token::Uint(85),
            Token::String("scan_42".into()),
        ];
        let call = publish.encode_call(&args).unwrap();
        assert_eq!(call[..4], publish.selector());
        assert_eq!((call.len() - 4) % WORD, 0);

        let mut too_big = args.clone();
        too_big[3] = Token::Uint(70_000);
        assert!(matches!(publish.encode_call(&too_big), Err(AbiError::TypeMismatch { index: 3, .. })));
        assert!(matches!(publish.encode_call(&args[..2]), Err(AbiError::Arity { .. })));
    }

    #[test]
    fn decodes_contract_info_tuple() {
        let abi = ContractAbi::bundled().unwrap();
        let info = abi.function("getContractInfo").unwrap();
        let encoded = encode_tokens(&[
            Token::String("1.2.0".into()),
            Token::Bool(false),
            Token::Uint(12),
            Token::Uint(3600),
            Token::Uint(50),
            Token::Uint(4),
        ]);
        let tokens = info.decode_output(&encoded).unwrap();
        assert_eq!(tokens[0], Token::String("1.2.0".into()));
        assert_eq!(tokens[1], Token::Bool(false));
        assert_eq!(tokens[5], Token::Uint(4));
        assert_eq!(info.output_names.len(), 6);
    }

    #[test]
    fn short_or_oversized_data_is_rejected() {
        let types = vec!["uint256".to_string()];
        assert!(matches!(decode_tokens(&types, &[0u8; 8]), Err(AbiError::ShortData)));
        let mut huge = [0u8; 32];
        huge[0] = 1;
        assert!(matches!(decode_tokens(&types, &huge), Err(AbiError::Overflow(_))));
        let strings = vec!["string".to_string()];
        assert!(matches!(decode_tokens(&strings, &uint_word(4096)), Err(AbiError::ShortData)));
    }
}
