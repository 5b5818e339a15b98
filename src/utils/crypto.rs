use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::Engine;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

use crate::error::{Error, Result};
use crate::provider::Platform;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const KEY_FILE: &str = "sealing.key";
const NONCE_SIZE: usize = 12;

/// Decoded OAuth `state` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateToken {
    pub issued_at: i64,
    pub platform: Platform,
}

/// Encrypts `"<unix seconds>:<platform>"` with AES-256-CBC under a shared
/// key and IV so the OAuth redirect can be checked without a session store.
#[derive(Clone)]
pub struct StateCodec {
    key: [u8; 32],
    iv: [u8; 16],
    ttl: Duration,
}

impl fmt::Debug for StateCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateCodec")
            .field("key", &"<redacted>")
            .field("iv", &"<redacted>")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl StateCodec {
    pub fn new(key: [u8; 32], iv: [u8; 16], ttl: Duration) -> Self {
        Self { key, iv, ttl }
    }

    pub fn from_hex(secret_key_hex: &str, iv_hex: &str, ttl: Duration) -> Result<Self> {
        let key = decode_hex::<32>(secret_key_hex, "secret key")?;
        let iv = decode_hex::<16>(iv_hex, "initialization vector")?;
        Ok(Self::new(key, iv, ttl))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn encode(&self, platform: Platform, issued_at: i64) -> String {
        let plaintext = format!("{issued_at}:{platform}");
        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &self.iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(ciphertext)
    }

    pub fn decode(&self, state: &str) -> Result<StateToken> {
        let ciphertext = base64::engine::general_purpose::STANDARD
            .decode(state.trim())
            .map_err(|e| Error::Decryption(format!("state is not valid base64: {e}")))?;

        let plaintext = Aes256CbcDec::new(&self.key.into(), &self.iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|e| Error::Decryption(format!("state could not be decrypted: {e}")))?;

        let plaintext = String::from_utf8(plaintext)
            .map_err(|_| Error::Decryption("state is not valid utf-8".to_string()))?;

        let (timestamp, platform) = plaintext
            .split_once(':')
            .ok_or_else(|| Error::InvalidState("state is malformed".to_string()))?;

        let issued_at = timestamp
            .parse::<i64>()
            .map_err(|_| Error::InvalidState("state timestamp is malformed".to_string()))?;
        let platform = platform
            .parse::<Platform>()
            .map_err(|_| Error::InvalidState(format!("state names unknown platform `{platform}`")))?;

        Ok(StateToken {
            issued_at,
            platform,
        })
    }

    /// Decode and check that the state was issued for `expected` less than
    /// one TTL before `now`.
    pub fn verify(&self, state: &str, expected: Platform, now: i64) -> Result<StateToken> {
        let token = self.decode(state)?;

        if token.platform != expected {
            return Err(Error::InvalidState(format!(
                "state was issued for {}, not {}",
                token.platform, expected
            )));
        }

        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        if now.saturating_sub(token.issued_at) >= ttl {
            return Err(Error::InvalidState("state has expired".to_string()));
        }

        Ok(token)
    }
}

fn decode_hex<const N: usize>(value: &str, what: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(value.trim())
        .map_err(|e| Error::InvalidInput(format!("{what} is not valid hex: {e}")))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        Error::InvalidInput(format!(
            "{what} must be {N} bytes, got {}",
            bytes.len()
        ))
    })
}

/// AES-256-GCM key used to seal credential records at rest. The key lives in
/// a file next to the records and is generated on first use.
pub struct SealingKey {
    cipher: Aes256Gcm,
}

impl SealingKey {
    pub fn load_or_create(dir: &Path) -> Result<Self> {
        let key_path = dir.join(KEY_FILE);

        let key = if key_path.exists() {
            let key = fs::read(&key_path).map_err(|e| Error::persistence("read sealing key", e))?;
            if key.len() != 32 {
                return Err(Error::Persistence("invalid sealing key size".to_string()));
            }
            key
        } else {
            let mut key = vec![0u8; 32];
            OsRng.fill_bytes(&mut key);

            fs::create_dir_all(dir).map_err(|e| Error::persistence("create data dir", e))?;
            fs::write(&key_path, &key).map_err(|e| Error::persistence("write sealing key", e))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&key_path, fs::Permissions::from_mode(0o600))
                    .map_err(|e| Error::persistence("restrict sealing key", e))?;
            }

            key
        };

        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| Error::persistence("create cipher", e))?;
        Ok(Self { cipher })
    }

    pub fn seal(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = vec![0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, data)
            .map_err(|e| Error::persistence("seal record", e))?;

        let mut sealed = nonce_bytes;
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_SIZE {
            return Err(Error::Persistence("sealed record too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| Error::persistence("open record", e))
    }
}
