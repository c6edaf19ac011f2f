use crate::EngineError;
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use syncdock_schema::DeviceId;
use tracing::{info, warn};

pub const DEFAULT_COMMON_NAME: &str = "syncdock";
const VALIDITY_DAYS: i64 = 20 * 365;

/// Signed part of a certificate. The device identity is derived from its
/// serialized bytes, so field order is part of the format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CertificateBody {
    pub common_name: String,
    pub public_key: String,
    pub not_before: String,
    pub not_after: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct CertificateFile {
    body: CertificateBody,
    signature: String,
}

#[derive(Serialize, Deserialize)]
struct KeyFile {
    secret_key: String,
}

/// A self-signed Ed25519 certificate together with its private key.
#[derive(Clone)]
pub struct Certificate {
    body: CertificateBody,
    signature: Signature,
    signing_key: SigningKey,
    device_id: DeviceId,
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("common_name", &self.body.common_name)
            .field("device_id", &self.device_id.to_string())
            .field("not_after", &self.body.not_after)
            .finish_non_exhaustive()
    }
}

impl Certificate {
    pub fn generate(common_name: &str) -> Result<Self, EngineError> {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        let signing_key = SigningKey::from_bytes(&secret);

        let now = Utc::now();
        let body = CertificateBody {
            common_name: common_name.to_owned(),
            public_key: hex::encode(signing_key.verifying_key().as_bytes()),
            not_before: now.to_rfc3339(),
            not_after: (now + Duration::days(VALIDITY_DAYS)).to_rfc3339(),
        };
        let canonical = serde_json::to_vec(&body)?;
        let signature = signing_key.sign(&canonical);

        Ok(Self {
            device_id: DeviceId::from_certificate_body(&canonical),
            body,
            signature,
            signing_key,
        })
    }

    pub fn load(cert_file: &Path, key_file: &Path) -> Result<Self, EngineError> {
        let cert: CertificateFile = serde_json::from_str(&fs::read_to_string(cert_file)?)?;
        let key: KeyFile = serde_json::from_str(&fs::read_to_string(key_file)?)?;

        let secret = decode_fixed::<32>(&key.secret_key, "secret key")?;
        let signing_key = SigningKey::from_bytes(&secret);
        let public_bytes = decode_fixed::<32>(&cert.body.public_key, "public key")?;
        let public = VerifyingKey::from_bytes(&public_bytes)
            .map_err(|e| EngineError::Credential(format!("bad public key: {e}")))?;
        if public != signing_key.verifying_key() {
            return Err(EngineError::Credential(
                "key does not belong to certificate".to_owned(),
            ));
        }

        let signature = Signature::from_bytes(&decode_fixed::<64>(&cert.signature, "signature")?);
        let canonical = serde_json::to_vec(&cert.body)?;
        public
            .verify(&canonical, &signature)
            .map_err(|e| EngineError::Credential(format!("signature check failed: {e}")))?;

        Ok(Self {
            device_id: DeviceId::from_certificate_body(&canonical),
            body: cert.body,
            signature,
            signing_key,
        })
    }

    /// Persist both files atomically. The temp files are created owner-only,
    /// so the key never exists on disk with wider permissions.
    pub fn save(&self, cert_file: &Path, key_file: &Path) -> Result<(), EngineError> {
        let cert = CertificateFile {
            body: self.body.clone(),
            signature: hex::encode(self.signature.to_bytes()),
        };
        let key = KeyFile {
            secret_key: hex::encode(self.signing_key.to_bytes()),
        };
        write_atomic(key_file, &serde_json::to_vec_pretty(&key)?)?;
        write_atomic(cert_file, &serde_json::to_vec_pretty(&cert)?)?;
        Ok(())
    }

    #[inline]
    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    #[inline]
    pub fn common_name(&self) -> &str {
        &self.body.common_name
    }

    #[inline]
    pub fn body(&self) -> &CertificateBody {
        &self.body
    }

    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        match DateTime::parse_from_rfc3339(&self.body.not_after) {
            Ok(not_after) => not_after.with_timezone(&Utc) <= at,
            Err(_) => true,
        }
    }
}

/// Load the certificate and key at the given paths, or generate and persist
/// a new pair if they are missing, unreadable, inconsistent or expired.
pub fn load_or_generate_certificate(
    cert_file: &Path,
    key_file: &Path,
) -> Result<Certificate, EngineError> {
    match Certificate::load(cert_file, key_file) {
        Ok(cert) if !cert.is_expired_at(Utc::now()) => return Ok(cert),
        Ok(_) => info!("certificate at {} has expired", cert_file.display()),
        Err(EngineError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            "discarding unusable certificate at {}: {e}",
            cert_file.display()
        ),
    }

    info!("generating key and certificate for {DEFAULT_COMMON_NAME}");
    let cert = Certificate::generate(DEFAULT_COMMON_NAME)?;
    cert.save(cert_file, key_file)?;
    info!("device id {}", cert.device_id());
    Ok(cert)
}

fn decode_fixed<const N: usize>(hex_str: &str, what: &str) -> Result<[u8; N], EngineError> {
    let mut out = [0u8; N];
    hex::decode_to_slice(hex_str, &mut out)
        .map_err(|e| EngineError::Credential(format!("bad {what}: {e}")))?;
    Ok(out)
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<(), EngineError> {
    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| EngineError::Io(e.error))?;
    if let Ok(f) = fs::File::open(dir) {
        let _ = f.sync_all();
    }
    Ok(())
}
