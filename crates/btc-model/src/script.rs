//! Standard output-script recognition.
//!
//! Derives the owner addresses of an output from the common locking script
//! templates: pay-to-pubkey-hash, pay-to-pubkey, pay-to-script-hash and bare
//! multisig. Multisig scripts yield up to three owners; everything else
//! yields at most one. Non-standard scripts yield none.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUAL: u8 = 0x87;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
const OP_CHECKMULTISIG: u8 = 0xae;
const OP_1: u8 = 0x51;
const OP_16: u8 = 0x60;

/// Version byte for pay-to-pubkey-hash addresses.
pub const ADDRESS_VERSION: u8 = 0x00;
/// Version byte for pay-to-script-hash addresses.
pub const SCRIPT_ADDRESS_VERSION: u8 = 0x05;

/// SHA-256 followed by RIPEMD-160.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let ripe = Ripemd160::digest(sha);
    let mut arr = [0u8; 20];
    arr.copy_from_slice(&ripe);
    arr
}

/// Base58check address from a version byte and a 20-byte payload.
pub fn to_address(version: u8, payload: &[u8; 20]) -> String {
    let mut raw = Vec::with_capacity(25);
    raw.push(version);
    raw.extend_from_slice(payload);
    let checksum = Sha256::digest(Sha256::digest(&raw));
    raw.extend_from_slice(&checksum[..4]);
    bs58::encode(raw).into_string()
}

/// The canonical 25-byte pay-to-pubkey-hash locking script.
pub fn p2pkh_script(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.push(OP_DUP);
    script.push(OP_HASH160);
    script.push(20);
    script.extend_from_slice(pubkey_hash);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}

/// Extract up to three owner addresses from a locking script.
pub fn extract_owners(script: &[u8]) -> Vec<String> {
    // OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG
    if script.len() == 25
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == 20
        && script[23] == OP_EQUALVERIFY
        && script[24] == OP_CHECKSIG
    {
        let mut payload = [0u8; 20];
        payload.copy_from_slice(&script[3..23]);
        return vec![to_address(ADDRESS_VERSION, &payload)];
    }

    // OP_HASH160 <20> OP_EQUAL
    if script.len() == 23 && script[0] == OP_HASH160 && script[1] == 20 && script[22] == OP_EQUAL {
        let mut payload = [0u8; 20];
        payload.copy_from_slice(&script[2..22]);
        return vec![to_address(SCRIPT_ADDRESS_VERSION, &payload)];
    }

    // <pubkey> OP_CHECKSIG
    if let Some((&push, rest)) = script.split_first() {
        if (push == 33 || push == 65)
            && rest.len() == push as usize + 1
            && rest[push as usize] == OP_CHECKSIG
        {
            let payload = hash160(&rest[..push as usize]);
            return vec![to_address(ADDRESS_VERSION, &payload)];
        }
    }

    // OP_m <pubkey>... OP_n OP_CHECKMULTISIG
    if script.len() > 3
        && script[script.len() - 1] == OP_CHECKMULTISIG
        && (OP_1..=OP_16).contains(&script[script.len() - 2])
        && (OP_1..=OP_16).contains(&script[0])
    {
        let mut owners = Vec::new();
        let mut pos = 1;
        while pos < script.len() - 2 {
            let push = script[pos] as usize;
            if push != 33 && push != 65 {
                return Vec::new();
            }
            pos += 1;
            if pos + push > script.len() - 2 {
                return Vec::new();
            }
            if owners.len() < 3 {
                let payload = hash160(&script[pos..pos + push]);
                owners.push(to_address(ADDRESS_VERSION, &payload));
            }
            pos += push;
        }
        return owners;
    }

    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p2pkh_owner() {
        let pubkey_hash = [0u8; 20];
        let script = p2pkh_script(&pubkey_hash);
        let owners = extract_owners(&script);
        assert_eq!(owners.len(), 1);
        // All-zero payload with version 0x00 is the well-known burn address.
        assert_eq!(owners[0], "1111111111111111111114oLvT2");
    }

    #[test]
    fn p2sh_owner() {
        let mut script = vec![OP_HASH160, 20];
        script.extend_from_slice(&[7u8; 20]);
        script.push(OP_EQUAL);
        let owners = extract_owners(&script);
        assert_eq!(owners.len(), 1);
        assert!(owners[0].starts_with('3'));
    }

    #[test]
    fn p2pk_owner_matches_p2pkh_of_same_key() {
        let pubkey = [2u8; 33];
        let mut script = vec![33];
        script.extend_from_slice(&pubkey);
        script.push(OP_CHECKSIG);
        let owners = extract_owners(&script);
        assert_eq!(owners, vec![to_address(ADDRESS_VERSION, &hash160(&pubkey))]);
    }

    #[test]
    fn multisig_owners_capped_at_three() {
        let keys = [[2u8; 33], [3u8; 33], [4u8; 33]];
        let mut script = vec![OP_1 + 1]; // 2-of-3
        for key in &keys {
            script.push(33);
            script.extend_from_slice(key);
        }
        script.push(OP_1 + 2);
        script.push(OP_CHECKMULTISIG);

        let owners = extract_owners(&script);
        assert_eq!(owners.len(), 3);
        for (owner, key) in owners.iter().zip(keys.iter()) {
            assert_eq!(owner, &to_address(ADDRESS_VERSION, &hash160(key)));
        }
    }

    #[test]
    fn non_standard_script_has_no_owner() {
        assert!(extract_owners(&[]).is_empty());
        assert!(extract_owners(&[0x6a, 0x01, 0xff]).is_empty()); // OP_RETURN data
    }
}
