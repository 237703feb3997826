//! Local secp256k1 account: key handling and address derivation.

use std::fmt;

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub fn parse(s: &str) -> Result<Self, String> {
        let digits = s.trim().strip_prefix("0x").or_else(|| s.trim().strip_prefix("0X")).unwrap_or(s.trim());
        if digits.len() != 40 {
            return Err(format!("address must be 20 bytes of hex, got {:?}", s));
        }
        let mut out = [0u8; 20];
        hex::decode_to_slice(digits, &mut out).map_err(|e| format!("invalid address {:?}: {}", s, e))?;
        Ok(Address(out))
    }

    /// EIP-55 mixed-case form.
    pub fn to_checksum(&self) -> String {
        let lower = hex::encode(self.0);
        let digest = Keccak256::digest(lower.as_bytes());
        let mut out = String::with_capacity(42);
        out.push_str("0x");
        for (i, c) in lower.chars().enumerate() {
            let nibble = (digest[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
            if c.is_ascii_alphabetic() && nibble >= 8 {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
        }
        out
    }

    pub fn to_lower_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_checksum())
    }
}

pub struct LocalSigner {
    key: SigningKey,
    address: Address,
}

impl LocalSigner {
    pub fn from_hex(key: &str) -> Result<Self, String> {
        let digits = key.trim().strip_prefix("0x").unwrap_or(key.trim());
        let bytes = hex::decode(digits).map_err(|_| "private key is not valid hex".to_string())?;
        if bytes.len() != 32 {
            return Err(format!("private key must be 32 bytes, got {}", bytes.len()));
        }
        let key = SigningKey::from_slice(&bytes).map_err(|_| "private key is not a valid secp256k1 scalar".to_string())?;
        let address = address_of(key.verifying_key());
        Ok(LocalSigner { key, address })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn sign_prehash(&self, hash: &[u8; 32]) -> Result<(Signature, RecoveryId), k256::ecdsa::Error> {
        self.key.sign_prehash_recoverable(hash)
    }
}

// Never print key material.
impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner").field("address", &self.address).finish_non_exhaustive()
    }
}

pub(crate) fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let digest = Keccak256::digest(&point.as_bytes()[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest[12..]);
    Address(out)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const TEST_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
    pub(crate) const TEST_ADDRESS: &str = "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23";

    #[test]
    fn derives_address_from_key() {
        let signer = LocalSigner::from_hex(TEST_KEY).unwrap();
        assert_eq!(signer.address().to_checksum(), TEST_ADDRESS);
    }

    #[test]
    fn checksums_addresses() {
        let a = Address::parse("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap();
        assert_eq!(a.to_checksum(), "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
        let b = Address::parse("fb6916095ca1df60bb79ce92ce3ea74c37c5d359").unwrap();
        assert_eq!(b.to_string(), "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359");
    }

    #[test]
    fn rejects_bad_keys_and_addresses() {
        assert!(LocalSigner::from_hex("0x1234").is_err());
        assert!(LocalSigner::from_hex(&"zz".repeat(32)).is_err());
        assert!(LocalSigner::from_hex(&"00".repeat(32)).is_err());
        assert!(Address::parse("0x1234").is_err());
    }

    #[test]
    fn debug_hides_key() {
        let signer = LocalSigner::from_hex(TEST_KEY).unwrap();
        let shown = format!("{:?}", signer);
        assert!(!shown.contains("4c0883a6"));
        assert!(shown.contains("2c7536E3"));
    }
}
