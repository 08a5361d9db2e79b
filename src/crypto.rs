//! Cryptographic primitives: random keys, hashing, base64url, and JWT signing.
//!
//! Grounded in the signing implementation this crate was built from: a
//! `Signer` trait over a PEM-loaded RSA key, with the modulus/exponent pulled
//! out of the ASN.1 by hand (rather than depending on the `rsa` crate) so the
//! same code path works whether or not an X.509 certificate accompanies the
//! key.

use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD as BASE64_STD, URL_SAFE_NO_PAD as BASE64_URL};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use pem as pem_crate;
use rand::RngCore;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use simple_asn1::{ASN1Block, from_der};
use std::sync::Arc;
use x509_parser::parse_x509_certificate;

/// The only signing algorithm this server issues tokens with (spec requires
/// RS256); kept as an explicit value rather than a bare constant so JWKS
/// serialization and the `alg` header stay in one place.
pub const SIGNING_ALGORITHM: jsonwebtoken::Algorithm = jsonwebtoken::Algorithm::RS256;

/// A single signing key, either wrapped in an X.509 certificate or a bare RSA
/// keypair. JWKS serialization differs by kind (spec.md §4.9).
enum KeyMaterial {
    /// Private key is accompanied by a certificate; JWKS exposes
    /// `x5t`/`x5c` instead of `n`/`e`.
    X509 { cert_der: Vec<u8> },
    /// Bare RSA keypair; JWKS exposes the raw modulus/exponent.
    RawRsa,
}

/// A loaded signing key plus the metadata needed to both sign with it and
/// publish it in a JWKS document.
pub struct SigningCredential {
    kid: String,
    encoding_key: EncodingKey,
    n_bytes: Vec<u8>,
    e_bytes: Vec<u8>,
    n_b64: String,
    e_b64: String,
    material: KeyMaterial,
}

impl std::fmt::Debug for SigningCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCredential")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

impl SigningCredential {
    /// Loads a signing key from a PEM-encoded private key and, optionally, a
    /// PEM-encoded certificate. When a certificate is provided its public key
    /// must match the private key's, or loading fails with a
    /// `KeyCertMismatch`-flavored error — a wrong file path should never
    /// silently produce a JWKS that doesn't match what's actually signing
    /// tokens.
    pub fn from_pem(key_pem: &[u8], cert_pem: Option<&[u8]>) -> Result<Self> {
        let encoding_key =
            EncodingKey::from_rsa_pem(key_pem).context("failed to create encoding key from pem")?;

        let pem = pem_crate::parse(std::str::from_utf8(key_pem).context("key pem to str")?)
            .map_err(|e| anyhow::anyhow!("failed to parse key pem: {}", e))?;
        let der = pem.contents;
        let asn1 = from_der(&der).context("failed to parse private key DER ASN.1")?;

        let (n_bytes, e_bytes) = extract_n_e(&asn1)
            .ok_or_else(|| anyhow::anyhow!("failed to extract n/e from private key ASN.1"))?;

        let n_b64 = BASE64_URL.encode(&n_bytes);
        let e_b64 = BASE64_URL.encode(&e_bytes);

        let mut hasher = Sha256::new();
        hasher.update(&n_bytes);
        hasher.update(&e_bytes);
        let kid = hex::encode(hasher.finalize());

        let material = match cert_pem {
            Some(cert_bytes) => {
                let pem =
                    pem_crate::parse(std::str::from_utf8(cert_bytes).context("cert pem to str")?)
                        .map_err(|e| anyhow::anyhow!("failed to parse cert pem: {}", e))?;
                let cert_der = pem.contents;

                let (_, cert) = parse_x509_certificate(&cert_der)
                    .map_err(|e| anyhow::anyhow!("failed to parse x509 certificate: {:?}", e))?;
                let subject_pki = &cert.tbs_certificate.subject_pki.subject_public_key.data;
                let subject_pki_asn = from_der(subject_pki)
                    .map_err(|_| anyhow::anyhow!("failed to parse subject_pki DER"))?;

                let mut pub_n = None;
                let mut pub_e = None;
                if subject_pki_asn.len() == 1
                    && let ASN1Block::Sequence(_, seq) = &subject_pki_asn[0]
                    && seq.len() >= 2
                    && let (ASN1Block::Integer(_, n), ASN1Block::Integer(_, e)) =
                        (&seq[0], &seq[1])
                {
                    pub_n = Some(n.to_signed_bytes_be());
                    pub_e = Some(e.to_signed_bytes_be());
                }

                let pub_n = pub_n.ok_or_else(|| {
                    anyhow::anyhow!("failed to extract public modulus from cert subject_pki")
                })?;
                let pub_e = pub_e.ok_or_else(|| {
                    anyhow::anyhow!("failed to extract public exponent from cert subject_pki")
                })?;

                if pub_n != n_bytes || pub_e != e_bytes {
                    return Err(anyhow::anyhow!(
                        "KeyCertMismatch: certificate public key does not match private key"
                    ));
                }

                KeyMaterial::X509 { cert_der }
            }
            None => KeyMaterial::RawRsa,
        };

        Ok(SigningCredential {
            kid,
            encoding_key,
            n_bytes,
            e_bytes,
            n_b64,
            e_b64,
            material,
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    fn sign(&self, claims: &serde_json::Value) -> Result<String> {
        let mut header = Header::new(SIGNING_ALGORITHM);
        header.kid = Some(self.kid.clone());
        jsonwebtoken::encode(&header, claims, &self.encoding_key).context("failed to encode jwt")
    }

    fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_rsa_raw_components(&self.n_bytes, &self.e_bytes)
    }

    /// Renders this key as a single JWKS entry per spec.md §4.9.
    fn jwk(&self) -> serde_json::Value {
        match &self.material {
            KeyMaterial::X509 { cert_der } => {
                let x5t = BASE64_URL.encode(digest(HashAlg::Sha1, cert_der));
                serde_json::json!({
                    "kty": "RSA",
                    "alg": "RS256",
                    "use": "sig",
                    "kid": self.kid,
                    "x5t": x5t,
                    "x5c": [BASE64_STD.encode(cert_der)],
                })
            }
            KeyMaterial::RawRsa => serde_json::json!({
                "kty": "RSA",
                "alg": "RS256",
                "use": "sig",
                "kid": self.kid,
                "e": self.e_b64,
                "n": self.n_b64,
            }),
        }
    }
}

fn extract_n_e(blocks: &[ASN1Block]) -> Option<(Vec<u8>, Vec<u8>)> {
    for b in blocks {
        if let ASN1Block::Sequence(_, inner) = b {
            if inner.len() >= 3
                && let (ASN1Block::Integer(_, n), ASN1Block::Integer(_, e)) = (&inner[1], &inner[2])
            {
                return Some((n.to_signed_bytes_be(), e.to_signed_bytes_be()));
            }
            for elem in inner.iter() {
                if let ASN1Block::OctetString(_, os) = elem
                    && let Ok(nested) = from_der(os)
                    && let Some((n, e)) = extract_n_e(&nested)
                {
                    return Some((n, e));
                }
            }
        }
    }
    None
}

/// Ordered list of signing keys (spec.md §3 "Signing Credentials"). The first
/// entry is used for issuance; every entry is exposed through the JWKS
/// endpoint for verification.
#[derive(Clone)]
pub struct SigningCredentials(Arc<Vec<SigningCredential>>);

impl SigningCredentials {
    pub fn new(keys: Vec<SigningCredential>) -> Self {
        Self(Arc::new(keys))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The key used to sign newly issued tokens, if any are configured.
    pub fn issuance_key(&self) -> Option<&SigningCredential> {
        self.0.first()
    }

    pub fn sign(&self, claims: &serde_json::Value) -> Result<String> {
        let key = self
            .issuance_key()
            .ok_or_else(|| anyhow::anyhow!("no signing credentials configured"))?;
        key.sign(claims)
    }

    /// Verifies a signed access/identity token against every configured key
    /// (spec.md §4.7 introspection: the default when no `Receive*` hook
    /// handles the token). Signature-only; expiry is the caller's concern.
    pub fn verify(&self, token: &str) -> Result<serde_json::Value> {
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.validate_exp = false;
        validation.validate_aud = false;
        for key in self.0.iter() {
            if let Ok(data) =
                jsonwebtoken::decode::<serde_json::Value>(token, &key.decoding_key(), &validation)
            {
                return Ok(data.claims);
            }
        }
        Err(anyhow::anyhow!("token signature does not verify against any configured key"))
    }

    /// Renders the full JWKS document (spec.md §4.9 cryptography endpoint).
    pub fn jwks(&self) -> serde_json::Value {
        let keys: Vec<_> = self.0.iter().map(SigningCredential::jwk).collect();
        serde_json::json!({ "keys": keys })
    }
}

pub fn load_signing_credentials_from_paths(
    key_path: &str,
    cert_path: Option<&str>,
) -> Result<SigningCredentials> {
    let key = std::fs::read(key_path).context("read private key")?;
    let cert = match cert_path {
        Some(p) => Some(std::fs::read(p).context("read cert")?),
        None => None,
    };
    let credential = SigningCredential::from_pem(&key, cert.as_deref())?;
    Ok(SigningCredentials::new(vec![credential]))
}

// ------------------------- Randomness -------------------------

/// Generates a cryptographically random, URL-safe, unpadded base64 string
/// from `bytes` random bytes — 256 bits (32 bytes) for codes/keys per
/// spec.md §3.
pub fn random_urlsafe(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rng().fill_bytes(&mut buf);
    BASE64_URL.encode(buf)
}

pub fn random_token_256() -> String {
    random_urlsafe(32)
}

// ------------------------- Generic hashing -------------------------

/// The hash algorithms spec.md §3 names as available to claim hashing.
/// `c_hash`/`at_hash` always use SHA-256 (spec.md §4.6); this enum exists so
/// other hash-bearing claims (e.g. certificate thumbprints) can reuse the
/// same primitive instead of reaching for a fresh crate per algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlg {
    Sha1,
    Sha256,
    Sha512,
}

pub fn digest(alg: HashAlg, data: &[u8]) -> Vec<u8> {
    match alg {
        HashAlg::Sha1 => {
            let mut h = Sha1::new();
            h.update(data);
            h.finalize().to_vec()
        }
        HashAlg::Sha256 => {
            let mut h = Sha256::new();
            h.update(data);
            h.finalize().to_vec()
        }
        HashAlg::Sha512 => {
            let mut h = sha2::Sha512::new();
            h.update(data);
            h.finalize().to_vec()
        }
    }
}

// ------------------------- Hash claims (c_hash / at_hash) -------------------------

/// Computes the `c_hash`/`at_hash` value for a token string: SHA-256 of the
/// ASCII token bytes, keep the left half of the digest, base64-encode with
/// the standard alphabet, then manually substitute to the URL-safe alphabet
/// and strip padding.
///
/// This intentionally does NOT use a URL-safe base64 engine directly: the
/// source computes standard base64 first and then substitutes `+`/`/` by
/// hand, which is behaviorally identical to URL-safe-no-pad encoding but is
/// preserved literally here because it is the documented wire-compatible
/// behavior (spec.md §9 Open Question).
pub fn half_hash_claim(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let digest = hasher.finalize();
    let half = &digest[..digest.len() / 2];
    let encoded = BASE64_STD.encode(half);
    encoded
        .replace('+', "-")
        .replace('/', "_")
        .trim_end_matches('=')
        .to_string()
}
