//! RLP and EIP-155 legacy transactions.

use sha3::{Digest, Keccak256};

use crate::signer::{Address, LocalSigner};

pub fn rlp_bytes(bytes: &[u8]) -> Vec<u8> {
    if bytes.len() == 1 && bytes[0] < 0x80 {
        return vec![bytes[0]];
    }
    let mut out = length_prefix(bytes.len(), 0x80);
    out.extend_from_slice(bytes);
    out
}

/// Integers are big-endian with no leading zeros; zero is the empty string.
pub fn rlp_uint(value: u128) -> Vec<u8> {
    rlp_bytes(trim_leading_zeros(&value.to_be_bytes()))
}

pub fn rlp_list(items: &[Vec<u8>]) -> Vec<u8> {
    let payload: Vec<u8> = items.concat();
    let mut out = length_prefix(payload.len(), 0xc0);
    out.extend(payload);
    out
}

fn length_prefix(len: usize, offset: u8) -> Vec<u8> {
    if len < 56 {
        return vec![offset + len as u8];
    }
    let len_bytes = (len as u64).to_be_bytes();
    let len_bytes = trim_leading_zeros(&len_bytes);
    let mut out = vec![offset + 55 + len_bytes.len() as u8];
    out.extend_from_slice(len_bytes);
    out
}

fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Address,
    pub value: u128,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

impl LegacyTransaction {
    fn fields(&self) -> Vec<Vec<u8>> {
        vec![
            rlp_uint(self.nonce as u128),
            rlp_uint(self.gas_price),
            rlp_uint(self.gas_limit as u128),
            rlp_bytes(&self.to.0),
            rlp_uint(self.value),
            rlp_bytes(&self.data),
        ]
    }

    pub fn signing_hash(&self) -> [u8; 32] {
        let mut fields = self.fields();
        fields.push(rlp_uint(self.chain_id as u128));
        fields.push(rlp_uint(0));
        fields.push(rlp_uint(0));
        Keccak256::digest(rlp_list(&fields)).into()
    }

    /// Raw signed transaction, ready for `eth_sendRawTransaction`.
    pub fn sign(&self, signer: &LocalSigner) -> Result<Vec<u8>, k256::ecdsa::Error> {
        let (signature, recid) = signer.sign_prehash(&self.signing_hash())?;
        let v = self.chain_id as u128 * 2 + 35 + recid.to_byte() as u128;
        let rs = signature.to_bytes();
        let mut fields = self.fields();
        fields.push(rlp_uint(v));
        fields.push(rlp_bytes(trim_leading_zeros(&rs[..32])));
        fields.push(rlp_bytes(trim_leading_zeros(&rs[32..])));
        Ok(rlp_list(&fields))
    }
}

pub fn transaction_hash(raw: &[u8]) -> [u8; 32] {
    Keccak256::digest(raw).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::address_of;
    use crate::signer::tests::TEST_KEY;
    use k256::ecdsa::VerifyingKey;

    #[test]
    fn rlp_vectors() {
        assert_eq!(hex::encode(rlp_bytes(b"dog")), "83646f67");
        assert_eq!(hex::encode(rlp_list(&[rlp_bytes(b"cat"), rlp_bytes(b"dog")])), "c88363617483646f67");
        assert_eq!(hex::encode(rlp_bytes(b"")), "80");
        assert_eq!(hex::encode(rlp_list(&[])), "c0");
        assert_eq!(hex::encode(rlp_uint(0)), "80");
        assert_eq!(hex::encode(rlp_uint(15)), "0f");
        assert_eq!(hex::encode(rlp_uint(1024)), "820400");
    }

    #[test]
    fn long_strings_get_length_of_length() {
        let text = b"Lorem ipsum dolor sit amet, consectetur adipisicing elit";
        let enc = rlp_bytes(text);
        assert_eq!(&enc[..2], &[0xb8, 0x38]);
        assert_eq!(&enc[2..], &text[..]);
    }

    fn eip155_example() -> LegacyTransaction {
        LegacyTransaction {
            nonce: 9,
            gas_price: 20_000_000_000,
            gas_limit: 21_000,
            to: Address([0x35; 20]),
            value: 1_000_000_000_000_000_000,
            data: Vec::new(),
            chain_id: 1,
        }
    }

    #[test]
    fn eip155_signing_hash() {
        assert_eq!(
            hex::encode(eip155_example().signing_hash()),
            "daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
    }

    #[test]
    fn signature_recovers_signer() {
        let signer = LocalSigner::from_hex(TEST_KEY).unwrap();
        let tx = LegacyTransaction { chain_id: 300, ..eip155_example() };
        let raw = tx.sign(&signer).unwrap();
        assert!(raw[0] >= 0xf8);

        let hash = tx.signing_hash();
        let (sig, recid) = signer.sign_prehash(&hash).unwrap();
        let recovered = VerifyingKey::recover_from_prehash(&hash, &sig, recid).unwrap();
        assert_eq!(address_of(&recovered), signer.address());

        // chain 300 puts v at 635 or 636
        let v = rlp_uint(635 + recid.to_byte() as u128);
        assert!(hex::encode(&raw).contains(&hex::encode(v)));
    }

    #[test]
    fn signing_is_deterministic() {
        let signer = LocalSigner::from_hex(TEST_KEY).unwrap();
        let tx = eip155_example();
        let a = tx.sign(&signer).unwrap();
        let b = tx.sign(&signer).unwrap();
        assert_eq!(a, b);
        assert_eq!(transaction_hash(&a), transaction_hash(&b));
    }
}
