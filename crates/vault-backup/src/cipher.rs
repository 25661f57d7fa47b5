//! AES-CFB stream encryption keyed directly by a password.
//!
//! A payload is a random [`IV_SIZE`] byte initialization vector followed by the ciphertext. The
//! password bytes are the AES key, so a password must be 16, 24 or 32 bytes long. Nothing in the
//! payload authenticates it: decrypting with the wrong password yields garbage, not an error.
//!

use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom, Write},
};

use aes::{Aes128, Aes192, Aes256};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use cfb_mode::{BufDecryptor, BufEncryptor};
use cipher::KeyIvInit;
use rand_core::{OsRng, RngCore};
use thiserror::Error;
use zeroize::Zeroizing;

/// Size of the initialization vector prefix in bytes, one AES block.
pub const IV_SIZE: usize = 16;

const CHUNK_SIZE: usize = 64 * 1024;

/// Generate a random URL safe password of exactly `length` characters.
pub fn generate_password(length: usize) -> Result<Zeroizing<String>, CipherError> {
    if length == 0 {
        return Err(CipherError::EmptyPassword);
    }

    // Every 3 random bytes encode to 4 characters.
    let mut random = Zeroizing::new(vec![0u8; length.div_ceil(4) * 3]);
    OsRng
        .try_fill_bytes(random.as_mut_slice())
        .map_err(CipherError::Random)?;

    let mut password = Zeroizing::new(URL_SAFE_NO_PAD.encode(random.as_slice()));
    password.truncate(length);

    Ok(password)
}

enum Encryptor {
    Aes128(BufEncryptor<Aes128>),
    Aes192(BufEncryptor<Aes192>),
    Aes256(BufEncryptor<Aes256>),
}

impl Encryptor {
    fn new(key: &[u8], iv: &[u8; IV_SIZE]) -> Result<Self, CipherError> {
        let encryptor = match key.len() {
            16 => BufEncryptor::new_from_slices(key, iv).map(Self::Aes128),
            24 => BufEncryptor::new_from_slices(key, iv).map(Self::Aes192),
            32 => BufEncryptor::new_from_slices(key, iv).map(Self::Aes256),
            key_length => return Err(CipherError::CipherInit { key_length }),
        };

        encryptor.map_err(|_| CipherError::CipherInit {
            key_length: key.len(),
        })
    }

    fn apply(&mut self, data: &mut [u8]) {
        match self {
            Self::Aes128(inner) => inner.encrypt(data),
            Self::Aes192(inner) => inner.encrypt(data),
            Self::Aes256(inner) => inner.encrypt(data),
        }
    }
}

enum Decryptor {
    Aes128(BufDecryptor<Aes128>),
    Aes192(BufDecryptor<Aes192>),
    Aes256(BufDecryptor<Aes256>),
}

impl Decryptor {
    fn new(key: &[u8], iv: &[u8; IV_SIZE]) -> Result<Self, CipherError> {
        let decryptor = match key.len() {
            16 => BufDecryptor::new_from_slices(key, iv).map(Self::Aes128),
            24 => BufDecryptor::new_from_slices(key, iv).map(Self::Aes192),
            32 => BufDecryptor::new_from_slices(key, iv).map(Self::Aes256),
            key_length => return Err(CipherError::CipherInit { key_length }),
        };

        decryptor.map_err(|_| CipherError::CipherInit {
            key_length: key.len(),
        })
    }

    fn apply(&mut self, data: &mut [u8]) {
        match self {
            Self::Aes128(inner) => inner.decrypt(data),
            Self::Aes192(inner) => inner.decrypt(data),
            Self::Aes256(inner) => inner.decrypt(data),
        }
    }
}

/// Encrypt everything read from `plain` into `payload`, returning the number of bytes written.
///
/// A fresh initialization vector is drawn for every call.
pub fn encrypt_to<R: Read, W: Write>(
    mut plain: R,
    mut payload: W,
    password: &str,
) -> Result<u64, CipherError> {
    let mut iv = [0u8; IV_SIZE];
    OsRng.try_fill_bytes(&mut iv).map_err(CipherError::Random)?;

    let mut encryptor = Encryptor::new(password.as_bytes(), &iv)?;

    payload
        .write_all(&iv)
        .map_err(|e| CipherError::Io(e, "write initialization vector"))?;

    let mut buffer = Zeroizing::new(vec![0u8; CHUNK_SIZE]);
    let mut written = u64::try_from(IV_SIZE).unwrap_or(u64::MAX);
    loop {
        let read = match plain.read(buffer.as_mut_slice()) {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CipherError::Io(e, "read plaintext")),
        };

        let Some(chunk) = buffer.get_mut(..read) else {
            break;
        };
        encryptor.apply(chunk);
        payload
            .write_all(chunk)
            .map_err(|e| CipherError::Io(e, "write ciphertext"))?;

        written += u64::try_from(read).unwrap_or(u64::MAX);
    }

    payload
        .flush()
        .map_err(|e| CipherError::Io(e, "flush ciphertext"))?;

    Ok(written)
}

/// Decrypt a payload read from `payload` into `plain`, returning the number of bytes written.
pub fn decrypt_to<R: Read, W: Write>(
    mut payload: R,
    mut plain: W,
    password: &str,
) -> Result<u64, CipherError> {
    let mut iv = [0u8; IV_SIZE];
    payload.read_exact(&mut iv).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            CipherError::TruncatedPayload
        } else {
            CipherError::Io(e, "read initialization vector")
        }
    })?;

    let mut decryptor = Decryptor::new(password.as_bytes(), &iv)?;

    let mut buffer = Zeroizing::new(vec![0u8; CHUNK_SIZE]);
    let mut written: u64 = 0;
    loop {
        let read = match payload.read(buffer.as_mut_slice()) {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CipherError::Io(e, "read ciphertext")),
        };

        let Some(chunk) = buffer.get_mut(..read) else {
            break;
        };
        decryptor.apply(chunk);
        plain
            .write_all(chunk)
            .map_err(|e| CipherError::Io(e, "write plaintext"))?;

        written += u64::try_from(read).unwrap_or(u64::MAX);
    }

    plain
        .flush()
        .map_err(|e| CipherError::Io(e, "flush plaintext"))?;

    Ok(written)
}

/// Decrypt an in-memory payload.
pub fn decrypt(payload: &[u8], password: &str) -> Result<Vec<u8>, CipherError> {
    if payload.len() < IV_SIZE {
        return Err(CipherError::TruncatedPayload);
    }

    let mut plain = Vec::with_capacity(payload.len().saturating_sub(IV_SIZE));
    decrypt_to(payload, &mut plain, password)?;
    Ok(plain)
}

/// An encrypted payload spooled to an anonymous temporary file and rewound to its start.
#[derive(Debug)]
pub struct EncryptedPayload {
    spool: File,
    len: u64,
}

impl EncryptedPayload {
    /// Encrypt `plain` into a new spool.
    pub fn encrypt<R: Read>(plain: R, password: &str) -> Result<Self, CipherError> {
        let mut spool =
            tempfile::tempfile().map_err(|e| CipherError::Io(e, "create payload spool"))?;

        let len = encrypt_to(plain, &mut spool, password)?;
        spool
            .rewind()
            .map_err(|e| CipherError::Io(e, "rewind payload spool"))?;

        Ok(Self { spool, len })
    }

    /// The size of the payload in bytes, including the initialization vector.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// If the payload contains no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Read for EncryptedPayload {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.spool.read(buf)
    }
}

impl Seek for EncryptedPayload {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.spool.seek(pos)
    }
}

/// Decrypt `payload` into a new spool, rewound to its start.
pub fn decrypt_to_spool<R: Read>(payload: R, password: &str) -> Result<File, CipherError> {
    let mut spool = tempfile::tempfile().map_err(|e| CipherError::Io(e, "create plain spool"))?;

    decrypt_to(payload, &mut spool, password)?;
    spool
        .rewind()
        .map_err(|e| CipherError::Io(e, "rewind plain spool"))?;

    Ok(spool)
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum CipherError {
    #[error("A password of {key_length} bytes cannot initialize AES, expected 16, 24 or 32")]
    CipherInit { key_length: usize },

    #[error("The payload is shorter than the 16 byte initialization vector")]
    TruncatedPayload,

    #[error("Cannot generate an empty password")]
    EmptyPassword,

    #[error("The random source failed: {0}")]
    Random(#[source] rand_core::Error),

    #[error("Failed to {1}: {0}")]
    Io(#[source] io::Error, &'static str),
}
