//! AES-CTR encryption and PBKDF2 key derivation, per-packet.
//!
//! Key size is either 128 or 256 bits; nonce is `peer_salt ‖ flow_id ‖
//! sequence`, which is unique per packet as long as a (peer_salt, flow_id)
//! pair is never reused across a key's lifetime.

use aes::{Aes128, Aes256};
use ctr::Ctr128BE;
use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::Hmac;
use pbkdf2::pbkdf2;
use sha2::Sha256;

use crate::Error;

const PBKDF2_ITERATIONS: u32 = 65_536;
pub const SALT_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySize {
    None,
    Aes128,
    Aes256,
}

impl KeySize {
    pub fn bytes(self) -> usize {
        match self {
            KeySize::None => 0,
            KeySize::Aes128 => 16,
            KeySize::Aes256 => 32,
        }
    }
}

/// Derives a symmetric key from a pre-shared secret via PBKDF2-HMAC-SHA256.
///
/// # Test
///
/// ```
/// use rist_codec::crypto::{derive_key, KeySize};
///
/// let key = derive_key(b"s3cr3t", &[0u8; 16], KeySize::Aes128);
/// assert_eq!(key.len(), 16);
/// ```
pub fn derive_key(secret: &[u8], salt: &[u8; SALT_LEN], size: KeySize) -> Vec<u8> {
    let mut out = vec![0u8; size.bytes()];
    if size != KeySize::None {
        let _ = pbkdf2::<Hmac<Sha256>>(secret, salt, PBKDF2_ITERATIONS, &mut out);
    }

    out
}

fn nonce(peer_salt: &[u8; SALT_LEN], flow_id: u32, sequence: u32) -> [u8; 16] {
    let mut buf = [0u8; 16];
    buf[..SALT_LEN].copy_from_slice(peer_salt);
    buf[8..12].copy_from_slice(&flow_id.to_be_bytes());
    buf[12..16].copy_from_slice(&sequence.to_be_bytes());
    buf
}

/// Encrypts `data` in place with AES-CTR keyed by `key`.
///
/// # Test
///
/// ```
/// use rist_codec::crypto::{apply_keystream, KeySize, derive_key};
///
/// let key = derive_key(b"s3cr3t", &[1u8; 16], KeySize::Aes128);
/// let mut data = b"hello rist".to_vec();
/// let original = data.clone();
///
/// apply_keystream(&key, &[1u8; 16], 7, 42, &mut data).unwrap();
/// assert_ne!(data, original);
///
/// apply_keystream(&key, &[1u8; 16], 7, 42, &mut data).unwrap();
/// assert_eq!(data, original);
/// ```
pub fn apply_keystream(
    key: &[u8],
    peer_salt: &[u8; SALT_LEN],
    flow_id: u32,
    sequence: u32,
    data: &mut [u8],
) -> Result<(), Error> {
    let iv = nonce(peer_salt, flow_id, sequence);

    match key.len() {
        16 => {
            let mut cipher = Ctr128BE::<Aes128>::new_from_slices(key, &iv)
                .map_err(|_| Error::DecryptFailed)?;
            cipher.apply_keystream(data);
        }
        32 => {
            let mut cipher = Ctr128BE::<Aes256>::new_from_slices(key, &iv)
                .map_err(|_| Error::DecryptFailed)?;
            cipher.apply_keystream(data);
        }
        _ => return Err(Error::DecryptFailed),
    }

    Ok(())
}
