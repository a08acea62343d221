//! Recipient encryption of archive bodies.
//!
//! Archives are sealed with age x25519 recipient encryption. The engine
//! treats the ciphertext as opaque: integrity hashing and storage operate on
//! the sealed bytes, and only download decrypts them again. Tampering with
//! the ciphertext, or decrypting with the wrong identity, fails.

use std::io::{Read, Write, copy};
use std::iter;

use age::x25519::{Identity, Recipient};

use crate::error::EngineError;

/// Seal `input` for `recipient`, writing the ciphertext to `output`.
///
/// The stream is finished before returning, so the authentication tags are
/// complete once this returns.
pub fn encrypt_stream<R, W>(
    input: &mut R,
    output: W,
    recipient: &Recipient,
) -> Result<(), EngineError>
where
    R: Read,
    W: Write,
{
    let encryptor = age::Encryptor::with_recipients(iter::once(recipient as &dyn age::Recipient))?;
    let mut writer = encryptor.wrap_output(output)?;
    copy(input, &mut writer)?;
    writer.finish()?;
    Ok(())
}

/// Open a sealed stream with `identity`, writing the plaintext to `output`.
pub fn decrypt_stream<R, W>(
    input: R,
    output: &mut W,
    identity: &Identity,
) -> Result<(), EngineError>
where
    R: Read,
    W: Write,
{
    let decryptor = age::Decryptor::new(input)?;
    let mut reader = decryptor.decrypt(iter::once(identity as &dyn age::Identity))?;
    copy(&mut reader, output)?;
    Ok(())
}
