//! The cryptographic engine behind key management and envelopes.
//!
//! [`CryptoProvider`] is injected into the key manager and crypto engine so
//! tests can swap in fakes. [`RustCryptoProvider`] is the production
//! implementation built on the RustCrypto crates and the OS RNG.

use std::{fmt, str::FromStr};

use aes_gcm::{
    aead::{generic_array::GenericArray, Aead},
    Aes128Gcm, Aes256Gcm, KeyInit,
};
use async_trait::async_trait;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256, Sha384, Sha512};
use thiserror::Error;
use zeroize::Zeroizing;

/// AES-GCM nonce length in bytes.
pub const IV_LEN: usize = 12;

/// Digest algorithms usable for hashing, HMAC and HKDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hashing {
    Sha256,
    Sha384,
    Sha512,
}

impl Hashing {
    pub fn name(&self) -> &'static str {
        match self {
            Hashing::Sha256 => "SHA-256",
            Hashing::Sha384 => "SHA-384",
            Hashing::Sha512 => "SHA-512",
        }
    }

    /// Digest size in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            Hashing::Sha256 => 32,
            Hashing::Sha384 => 48,
            Hashing::Sha512 => 64,
        }
    }
}

impl FromStr for Hashing {
    type Err = ProviderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize(value).as_str() {
            "SHA256" => Ok(Hashing::Sha256),
            "SHA384" => Ok(Hashing::Sha384),
            "SHA512" => Ok(Hashing::Sha512),
            _ => Err(ProviderError::Unsupported {
                algorithm: value.to_string(),
            }),
        }
    }
}

/// Symmetric ciphers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    AesGcm,
}

impl KeyType {
    pub fn name(&self) -> &'static str {
        match self {
            KeyType::AesGcm => "AES-GCM",
        }
    }
}

impl FromStr for KeyType {
    type Err = ProviderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match normalize(value).as_str() {
            "AESGCM" => Ok(KeyType::AesGcm),
            _ => Err(ProviderError::Unsupported {
                algorithm: value.to_string(),
            }),
        }
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// What a key is for. A key can only be used for its own operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUsage {
    EncryptDecrypt,
    SignVerify,
}

/// Algorithm parameters a key is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySpec {
    Cipher { keytype: KeyType, length_bits: u32 },
    Mac { hashing: Hashing },
}

impl KeySpec {
    pub fn usage(&self) -> KeyUsage {
        match self {
            KeySpec::Cipher { .. } => KeyUsage::EncryptDecrypt,
            KeySpec::Mac { .. } => KeyUsage::SignVerify,
        }
    }

    /// Key size in bytes. HMAC keys use the digest size.
    pub fn byte_len(&self) -> usize {
        match self {
            KeySpec::Cipher { length_bits, .. } => (*length_bits as usize) / 8,
            KeySpec::Mac { hashing } => hashing.output_len(),
        }
    }
}

/// Raw key bytes bound to a [`KeySpec`]. Wiped on drop, never printed.
pub struct SecretKey {
    spec: KeySpec,
    bytes: Zeroizing<Vec<u8>>,
}

impl SecretKey {
    pub fn new(spec: KeySpec, bytes: Vec<u8>) -> Self {
        Self {
            spec,
            bytes: Zeroizing::new(bytes),
        }
    }

    pub fn spec(&self) -> KeySpec {
        self.spec
    }

    pub fn usage(&self) -> KeyUsage {
        self.spec.usage()
    }

    /// Raw key bytes, for provider implementations only.
    pub fn expose_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("spec", &self.spec)
            .field("bytes", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("unsupported algorithm `{algorithm}`")]
    Unsupported { algorithm: String },
    #[error("unsupported key length {bits} bits for {algorithm}")]
    InvalidKeyLength { algorithm: String, bits: u32 },
    #[error("a {actual:?} key cannot be used to {operation}")]
    KeyUsage {
        operation: &'static str,
        actual: KeyUsage,
    },
    #[error("{reason}")]
    Operation { reason: String },
}

/// Asynchronous crypto primitives, modelled on a platform crypto engine.
#[async_trait]
pub trait CryptoProvider: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Fill `buf` from a cryptographically secure source.
    fn fill_random(&self, buf: &mut [u8]) -> Result<(), ProviderError>;

    async fn digest(&self, hashing: Hashing, data: &[u8]) -> Result<Vec<u8>, ProviderError>;

    /// Create a random key for `spec`.
    async fn generate_key(&self, spec: KeySpec) -> Result<SecretKey, ProviderError>;

    /// Derive a key for `spec` from input keying material.
    async fn derive_key(
        &self,
        spec: KeySpec,
        hashing: Hashing,
        ikm: &[u8],
        salt: &[u8],
        info: &[u8],
    ) -> Result<SecretKey, ProviderError>;

    async fn sign(&self, key: &SecretKey, data: &[u8]) -> Result<Vec<u8>, ProviderError>;

    /// Constant-time check of `signature` over `data`. A mismatch is `Ok(false)`.
    async fn verify(
        &self,
        key: &SecretKey,
        signature: &[u8],
        data: &[u8],
    ) -> Result<bool, ProviderError>;

    async fn encrypt(
        &self,
        key: &SecretKey,
        iv: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, ProviderError>;

    async fn decrypt(
        &self,
        key: &SecretKey,
        iv: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, ProviderError>;
}

/// Runs `$body` with `$digest` aliased to the concrete hash type.
macro_rules! with_digest {
    ($hashing:expr, |$digest:ident| $body:expr) => {
        match $hashing {
            Hashing::Sha256 => {
                type $digest = Sha256;
                $body
            }
            Hashing::Sha384 => {
                type $digest = Sha384;
                $body
            }
            Hashing::Sha512 => {
                type $digest = Sha512;
                $body
            }
        }
    };
}

/// AES-GCM + HMAC + HKDF over the RustCrypto crates, randomness from `OsRng`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustCryptoProvider;

impl RustCryptoProvider {
    fn check_spec(spec: KeySpec) -> Result<(), ProviderError> {
        match spec {
            KeySpec::Cipher {
                keytype: KeyType::AesGcm,
                length_bits: 128 | 256,
            }
            | KeySpec::Mac { .. } => Ok(()),
            KeySpec::Cipher {
                keytype,
                length_bits,
            } => Err(ProviderError::InvalidKeyLength {
                algorithm: keytype.name().to_string(),
                bits: length_bits,
            }),
        }
    }

    fn mac_hashing(key: &SecretKey, operation: &'static str) -> Result<Hashing, ProviderError> {
        match key.spec() {
            KeySpec::Mac { hashing } => Ok(hashing),
            KeySpec::Cipher { .. } => Err(ProviderError::KeyUsage {
                operation,
                actual: key.usage(),
            }),
        }
    }

    fn cipher_bits(
        key: &SecretKey,
        iv: &[u8],
        operation: &'static str,
    ) -> Result<u32, ProviderError> {
        let KeySpec::Cipher { length_bits, .. } = key.spec() else {
            return Err(ProviderError::KeyUsage {
                operation,
                actual: key.usage(),
            });
        };
        if iv.len() != IV_LEN {
            return Err(ProviderError::Operation {
                reason: format!("iv must be {IV_LEN} bytes, got {}", iv.len()),
            });
        }
        Ok(length_bits)
    }

    fn compute_mac(hashing: Hashing, key: &[u8], data: &[u8]) -> Result<Vec<u8>, ProviderError> {
        with_digest!(hashing, |D| {
            let mut mac = <Hmac<D> as Mac>::new_from_slice(key).map_err(mac_key_err)?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        })
    }

    fn check_mac(
        hashing: Hashing,
        key: &[u8],
        signature: &[u8],
        data: &[u8],
    ) -> Result<bool, ProviderError> {
        with_digest!(hashing, |D| {
            let mut mac = <Hmac<D> as Mac>::new_from_slice(key).map_err(mac_key_err)?;
            mac.update(data);
            Ok(mac.verify_slice(signature).is_ok())
        })
    }
}

fn mac_key_err<E: fmt::Display>(err: E) -> ProviderError {
    ProviderError::Operation {
        reason: format!("hmac init failed: {err}"),
    }
}

fn seal<C: Aead + KeyInit>(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, ProviderError> {
    let cipher = C::new_from_slice(key).map_err(|e| ProviderError::Operation {
        reason: format!("cipher init failed: {e}"),
    })?;
    cipher
        .encrypt(GenericArray::from_slice(iv), plaintext)
        .map_err(|_| ProviderError::Operation {
            reason: "aead encryption failed".to_string(),
        })
}

fn open<C: Aead + KeyInit>(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, ProviderError> {
    let cipher = C::new_from_slice(key).map_err(|e| ProviderError::Operation {
        reason: format!("cipher init failed: {e}"),
    })?;
    cipher
        .decrypt(GenericArray::from_slice(iv), ciphertext)
        .map_err(|_| ProviderError::Operation {
            reason: "aead authentication failed".to_string(),
        })
}

#[async_trait]
impl CryptoProvider for RustCryptoProvider {
    fn name(&self) -> &'static str {
        "rustcrypto"
    }

    fn fill_random(&self, buf: &mut [u8]) -> Result<(), ProviderError> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| ProviderError::Operation {
                reason: format!("random source unavailable: {e}"),
            })
    }

    async fn digest(&self, hashing: Hashing, data: &[u8]) -> Result<Vec<u8>, ProviderError> {
        Ok(with_digest!(hashing, |D| D::digest(data).to_vec()))
    }

    async fn generate_key(&self, spec: KeySpec) -> Result<SecretKey, ProviderError> {
        Self::check_spec(spec)?;
        let mut bytes = vec![0u8; spec.byte_len()];
        self.fill_random(&mut bytes)?;
        Ok(SecretKey::new(spec, bytes))
    }

    async fn derive_key(
        &self,
        spec: KeySpec,
        hashing: Hashing,
        ikm: &[u8],
        salt: &[u8],
        info: &[u8],
    ) -> Result<SecretKey, ProviderError> {
        Self::check_spec(spec)?;
        let mut okm = vec![0u8; spec.byte_len()];
        with_digest!(hashing, |D| Hkdf::<D>::new(Some(salt), ikm)
            .expand(info, &mut okm)
            .map_err(|e| ProviderError::Operation {
                reason: format!("hkdf expansion failed: {e}"),
            }))?;
        Ok(SecretKey::new(spec, okm))
    }

    async fn sign(&self, key: &SecretKey, data: &[u8]) -> Result<Vec<u8>, ProviderError> {
        let hashing = Self::mac_hashing(key, "sign")?;
        Self::compute_mac(hashing, key.expose_bytes(), data)
    }

    async fn verify(
        &self,
        key: &SecretKey,
        signature: &[u8],
        data: &[u8],
    ) -> Result<bool, ProviderError> {
        let hashing = Self::mac_hashing(key, "verify")?;
        Self::check_mac(hashing, key.expose_bytes(), signature, data)
    }

    async fn encrypt(
        &self,
        key: &SecretKey,
        iv: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, ProviderError> {
        match Self::cipher_bits(key, iv, "encrypt")? {
            128 => seal::<Aes128Gcm>(key.expose_bytes(), iv, plaintext),
            _ => seal::<Aes256Gcm>(key.expose_bytes(), iv, plaintext),
        }
    }

    async fn decrypt(
        &self,
        key: &SecretKey,
        iv: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, ProviderError> {
        match Self::cipher_bits(key, iv, "decrypt")? {
            128 => open::<Aes128Gcm>(key.expose_bytes(), iv, ciphertext),
            _ => open::<Aes256Gcm>(key.expose_bytes(), iv, ciphertext),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AES_256: KeySpec = KeySpec::Cipher {
        keytype: KeyType::AesGcm,
        length_bits: 256,
    };
    const HMAC_256: KeySpec = KeySpec::Mac {
        hashing: Hashing::Sha256,
    };

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn parses_algorithm_names_loosely() {
        assert_eq!("SHA-512".parse::<Hashing>().unwrap(), Hashing::Sha512);
        assert_eq!("sha256".parse::<Hashing>().unwrap(), Hashing::Sha256);
        assert_eq!("AES-GCM".parse::<KeyType>().unwrap(), KeyType::AesGcm);
        assert!(matches!(
            "MD5".parse::<Hashing>(),
            Err(ProviderError::Unsupported { .. })
        ));
        assert!(matches!(
            "AES-CBC".parse::<KeyType>(),
            Err(ProviderError::Unsupported { .. })
        ));
    }

    #[tokio::test]
    async fn digest_matches_known_vector() {
        let digest = RustCryptoProvider
            .digest(Hashing::Sha256, b"abc")
            .await
            .expect("digest");
        assert_eq!(
            hex(&digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn hmac_matches_rfc4231_case_two() {
        let key = SecretKey::new(HMAC_256, b"Jefe".to_vec());
        let provider = RustCryptoProvider;
        let mac = provider
            .sign(&key, b"what do ya want for nothing?")
            .await
            .expect("sign");
        assert_eq!(
            hex(&mac),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
        assert!(provider
            .verify(&key, &mac, b"what do ya want for nothing?")
            .await
            .expect("verify"));
        assert!(!provider
            .verify(&key, &mac, b"what do ya want for something?")
            .await
            .expect("verify"));
        assert!(!provider
            .verify(&key, &mac[..16], b"what do ya want for nothing?")
            .await
            .expect("verify truncated"));
    }

    #[tokio::test]
    async fn encrypt_and_decrypt_round_trip() {
        let provider = RustCryptoProvider;
        for bits in [128, 256] {
            let spec = KeySpec::Cipher {
                keytype: KeyType::AesGcm,
                length_bits: bits,
            };
            let key = provider.generate_key(spec).await.expect("generate");
            assert_eq!(key.expose_bytes().len(), (bits / 8) as usize);

            let iv = [7u8; IV_LEN];
            let ciphertext = provider.encrypt(&key, &iv, b"hello").await.expect("encrypt");
            assert_ne!(&ciphertext[..], b"hello");
            let plaintext = provider
                .decrypt(&key, &iv, &ciphertext)
                .await
                .expect("decrypt");
            assert_eq!(plaintext, b"hello");
        }
    }

    #[tokio::test]
    async fn decrypt_rejects_modified_ciphertext() {
        let provider = RustCryptoProvider;
        let key = provider.generate_key(AES_256).await.expect("generate");
        let iv = [1u8; IV_LEN];
        let mut ciphertext = provider.encrypt(&key, &iv, b"payload").await.expect("encrypt");
        ciphertext[0] ^= 0x01;

        let err = provider
            .decrypt(&key, &iv, &ciphertext)
            .await
            .expect_err("tag check should fail");
        assert!(matches!(err, ProviderError::Operation { .. }));
    }

    #[tokio::test]
    async fn rejects_unsupported_key_length() {
        let spec = KeySpec::Cipher {
            keytype: KeyType::AesGcm,
            length_bits: 192,
        };
        let err = RustCryptoProvider
            .generate_key(spec)
            .await
            .expect_err("192-bit keys are not offered");
        assert!(matches!(err, ProviderError::InvalidKeyLength { bits: 192, .. }));
    }

    #[tokio::test]
    async fn keys_are_restricted_to_their_usage() {
        let provider = RustCryptoProvider;
        let mac_key = provider.generate_key(HMAC_256).await.expect("generate");
        let cipher_key = provider.generate_key(AES_256).await.expect("generate");

        let err = provider
            .encrypt(&mac_key, &[0u8; IV_LEN], b"x")
            .await
            .expect_err("mac key must not encrypt");
        assert!(matches!(
            err,
            ProviderError::KeyUsage {
                actual: KeyUsage::SignVerify,
                ..
            }
        ));
        assert!(provider.sign(&cipher_key, b"x").await.is_err());
    }

    #[tokio::test]
    async fn rejects_wrong_iv_length() {
        let provider = RustCryptoProvider;
        let key = provider.generate_key(AES_256).await.expect("generate");
        let err = provider
            .encrypt(&key, &[0u8; 8], b"x")
            .await
            .expect_err("short iv");
        assert!(matches!(err, ProviderError::Operation { .. }));
    }

    #[tokio::test]
    async fn derivation_is_deterministic_and_label_separated() {
        let provider = RustCryptoProvider;
        let a = provider
            .derive_key(AES_256, Hashing::Sha512, b"p@ss", b"salt", b"enc")
            .await
            .expect("derive");
        let b = provider
            .derive_key(AES_256, Hashing::Sha512, b"p@ss", b"salt", b"enc")
            .await
            .expect("derive");
        let c = provider
            .derive_key(AES_256, Hashing::Sha512, b"p@ss", b"salt", b"mac")
            .await
            .expect("derive");

        assert_eq!(a.expose_bytes(), b.expose_bytes());
        assert_ne!(a.expose_bytes(), c.expose_bytes());
    }

    #[test]
    fn secret_key_debug_is_redacted() {
        let key = SecretKey::new(HMAC_256, vec![0xAB; 32]);
        let rendered = format!("{key:?}");
        assert!(rendered.contains("redacted"));
        assert!(!rendered.contains("171"));
    }
}
