use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{AuthError, Result};

/// Algorithm used when the configuration does not name one
pub const DEFAULT_ALGORITHM: Algorithm = Algorithm::RS256;

/// Asymmetric key pair used to sign and verify tokens
#[derive(Clone)]
pub struct SigningKeys {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    /// Build a key pair from PEM encoded private and public keys
    pub fn from_pem(algorithm: Algorithm, private_pem: &[u8], public_pem: &[u8]) -> Result<Self> {
        let (encoding, decoding) = match algorithm {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => (
                EncodingKey::from_rsa_pem(private_pem).map_err(|e| key_error("private", e))?,
                DecodingKey::from_rsa_pem(public_pem).map_err(|e| key_error("public", e))?,
            ),
            Algorithm::ES256 | Algorithm::ES384 => (
                EncodingKey::from_ec_pem(private_pem).map_err(|e| key_error("private", e))?,
                DecodingKey::from_ec_pem(public_pem).map_err(|e| key_error("public", e))?,
            ),
            Algorithm::EdDSA => (
                EncodingKey::from_ed_pem(private_pem).map_err(|e| key_error("private", e))?,
                DecodingKey::from_ed_pem(public_pem).map_err(|e| key_error("public", e))?,
            ),
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                return Err(AuthError::Config(format!(
                    "HMAC algorithm {:?} is not supported for token signing, use an asymmetric key pair",
                    algorithm
                )))
            }
        };

        Ok(Self {
            algorithm,
            encoding,
            decoding,
        })
    }

    /// Read both PEM files and build the key pair
    pub fn from_files<P, Q>(algorithm: Algorithm, private_key: P, public_key: Q) -> Result<Self>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let private_pem = read_pem(private_key.as_ref())?;
        let public_pem = read_pem(public_key.as_ref())?;
        Self::from_pem(algorithm, &private_pem, &public_pem)
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }
}

impl fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeys")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Parse an algorithm name such as "RS256" or "ES384"
pub fn parse_algorithm(name: &str) -> Result<Algorithm> {
    Algorithm::from_str(name.trim())
        .map_err(|_| AuthError::Config(format!("Unknown JWT algorithm: {}", name)))
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| AuthError::Config(format!("Failed to read key file {}: {}", path.display(), e)))
}

fn key_error(kind: &str, err: jsonwebtoken::errors::Error) -> AuthError {
    AuthError::Config(format!("Invalid {} key: {}", kind, err))
}
