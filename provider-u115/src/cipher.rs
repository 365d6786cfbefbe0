//! Payload encryption seam for the app download endpoints
//!
//! The app endpoints (`proapi.115.com`) take a form field `data` holding an
//! encrypted JSON document and answer with an encrypted `data` string. The
//! transform itself is a fixed scheme owned by the remote API and is injected
//! here as a pure data-transform collaborator.

use crate::error::Result;

/// Encrypts request payloads and decrypts response payloads
pub trait PayloadCipher: Send + Sync {
    /// Encrypt a JSON request body into the transport string sent as `data=`
    fn encrypt(&self, plaintext: &[u8]) -> Result<String>;

    /// Decrypt the `data` string of a response into raw JSON bytes
    fn decrypt(&self, ciphertext: &str) -> Result<Vec<u8>>;
}
