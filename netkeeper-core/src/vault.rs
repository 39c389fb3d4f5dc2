//! 凭据加解密
//!
//! 设备密码与提权口令以 AES-256-GCM 加密后落盘，格式为
//! base64(nonce(12) + ciphertext)。密钥首次使用时随机生成并写入密钥文件。

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::Rng;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{KeeperError, Result};

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;

/// 解密后的明文口令
///
/// 不实现 Display，Debug 只输出掩码，离开作用域时清零内存。
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// 凭据保险库接口
pub trait CredentialVault: Send + Sync {
    /// 加密明文，空字符串加密结果仍为空字符串
    fn encrypt(&self, plaintext: &str) -> Result<String>;

    /// 解密密文，空字符串解密结果为空口令
    fn decrypt(&self, ciphertext: &str) -> Result<Secret>;
}

/// 基于本地密钥文件的保险库
pub struct FileKeyVault {
    cipher: Aes256Gcm,
    key_path: PathBuf,
}

impl fmt::Debug for FileKeyVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileKeyVault")
            .field("key_path", &self.key_path)
            .finish_non_exhaustive()
    }
}

impl FileKeyVault {
    /// 打开密钥文件，不存在时自动生成
    pub fn open<P: AsRef<Path>>(key_path: P) -> Result<Self> {
        let key_path = key_path.as_ref().to_path_buf();
        let mut key = if key_path.exists() {
            Self::read_key(&key_path)?
        } else {
            tracing::warn!("未找到密钥文件，生成新密钥: {}", key_path.display());
            let key = Self::generate_key();
            Self::write_key(&key_path, &key)?;
            key
        };

        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|e| KeeperError::crypto(e.to_string()));
        key.zeroize();

        Ok(Self {
            cipher: cipher?,
            key_path,
        })
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    fn generate_key() -> [u8; KEY_SIZE] {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill(&mut key);
        key
    }

    fn read_key(path: &Path) -> Result<[u8; KEY_SIZE]> {
        let content = fs::read_to_string(path)?;
        let mut decoded = STANDARD
            .decode(content.trim())
            .map_err(|e| KeeperError::crypto(format!("密钥文件格式错误: {e}")))?;
        if decoded.len() != KEY_SIZE {
            decoded.zeroize();
            return Err(KeeperError::crypto(format!(
                "密钥长度应为 {KEY_SIZE} 字节: {}",
                path.display()
            )));
        }

        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(key)
    }

    fn write_key(path: &Path, key: &[u8; KEY_SIZE]) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, STANDARD.encode(key))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}

impl CredentialVault for FileKeyVault {
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| KeeperError::crypto(e.to_string()))?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(STANDARD.encode(&combined))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<Secret> {
        if ciphertext.is_empty() {
            return Ok(Secret::new(""));
        }

        let combined = STANDARD
            .decode(ciphertext)
            .map_err(|e| KeeperError::crypto(e.to_string()))?;
        if combined.len() < NONCE_SIZE + 1 {
            return Err(KeeperError::crypto("密文长度不足"));
        }

        let (nonce_bytes, body) = combined.split_at(NONCE_SIZE);
        let mut plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), body)
            .map_err(|_| KeeperError::crypto("解密失败，密钥可能已变更"))?;

        let secret = String::from_utf8(plaintext.clone())
            .map(Secret)
            .map_err(|e| KeeperError::crypto(e.to_string()));
        plaintext.zeroize();
        secret
    }
}
