// HLS Decryption: AES-128-CBC segment decryption with pass-through on failure.

use aes::Aes128;
use bytes::Bytes;
use cipher::{BlockDecryptMut, KeyIvInit, block_padding::Pkcs7};
use tracing::warn;

use crate::error::DecryptError;

type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// IV used when the playlist gives none: the big-endian index in the last four bytes.
pub fn iv_for_index(segment_index: u32) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[12..].copy_from_slice(&segment_index.to_be_bytes());
    iv
}

/// Decrypt `ciphertext` and strip its PKCS#7 padding.
pub fn try_decrypt(ciphertext: &[u8], key: &[u8], iv: &[u8; 16]) -> Result<Bytes, DecryptError> {
    let cipher = Aes128CbcDec::new_from_slices(key, iv).map_err(|_| {
        DecryptError::InvalidKeyOrIv {
            key_len: key.len(),
        }
    })?;

    let mut buffer = ciphertext.to_vec();
    let plaintext_len = cipher
        .decrypt_padded_mut::<Pkcs7>(&mut buffer)
        .map_err(|_| DecryptError::Padding)?
        .len();
    buffer.truncate(plaintext_len);

    Ok(Bytes::from(buffer))
}

/// Decrypt a segment using the index-derived IV.
///
/// Never fails: on any decryption error the ciphertext is returned unchanged.
pub fn decrypt_segment(ciphertext: Bytes, key: &[u8], segment_index: u32) -> Bytes {
    decrypt_segment_with_iv(ciphertext, key, &iv_for_index(segment_index))
}

/// Same as [`decrypt_segment`] with an explicit IV.
pub fn decrypt_segment_with_iv(ciphertext: Bytes, key: &[u8], iv: &[u8; 16]) -> Bytes {
    match try_decrypt(&ciphertext, key, iv) {
        Ok(plaintext) => plaintext,
        Err(e) => {
            warn!(
                error = %e,
                len = ciphertext.len(),
                "Segment decryption failed, keeping original data"
            );
            ciphertext
        }
    }
}
