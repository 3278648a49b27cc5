//! AWS Signature Version 4 request signing.
//!
//! Covers the subset the SQS/SNS and Secrets Manager adapters need: POST
//! requests with a body, host/x-amz-date/x-amz-target/content-type headers.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

#[derive(Debug, Clone)]
pub struct SigV4Signer {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub service: String,
}

/// Headers to attach to the signed request.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    pub authorization: String,
    pub amz_date: String,
}

impl SigV4Signer {
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        region: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region: region.into(),
            service: service.into(),
        }
    }

    /// Sign a POST request. `extra_headers` must be lowercase name/value
    /// pairs sorted by name, excluding `host` and `x-amz-date` which are
    /// added here.
    pub fn sign_post(
        &self,
        host: &str,
        path: &str,
        body: &[u8],
        content_type: &str,
        extra_headers: &[(String, String)],
        now: DateTime<Utc>,
    ) -> SignedHeaders {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();

        let mut headers: Vec<(String, String)> = vec![
            ("content-type".to_string(), content_type.to_string()),
            ("host".to_string(), host.to_string()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        headers.extend(extra_headers.iter().cloned());
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{k}:{}\n", v.trim()))
            .collect();
        let signed_header_names = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let payload_hash = hex::encode(Sha256::digest(body));
        let canonical_request = format!(
            "POST\n{path}\n\n{canonical_headers}\n{signed_header_names}\n{payload_hash}"
        );

        let credential_scope = format!(
            "{date_stamp}/{}/{}/aws4_request",
            self.region, self.service
        );
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{credential_scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signature = hex::encode(self.signature(&date_stamp, string_to_sign.as_bytes()));
        let authorization = format!(
            "{ALGORITHM} Credential={}/{credential_scope}, SignedHeaders={signed_header_names}, Signature={signature}",
            self.access_key
        );

        SignedHeaders {
            authorization,
            amz_date,
        }
    }

    fn signature(&self, date_stamp: &str, string_to_sign: &[u8]) -> Vec<u8> {
        let k_date = hmac(format!("AWS4{}", self.secret_key).as_bytes(), date_stamp.as_bytes());
        let k_region = hmac(&k_date, self.region.as_bytes());
        let k_service = hmac(&k_region, self.service.as_bytes());
        let k_signing = hmac(&k_service, b"aws4_request");
        hmac(&k_signing, string_to_sign)
    }
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC-SHA256 accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn signer() -> SigV4Signer {
        SigV4Signer::new("AKIDEXAMPLE", "secret", "us-east-1", "sqs")
    }

    #[test]
    fn authorization_carries_credential_scope() {
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let signed = signer().sign_post(
            "sqs.us-east-1.amazonaws.com",
            "/",
            b"Action=ListQueues",
            "application/x-www-form-urlencoded",
            &[],
            now,
        );
        assert_eq!(signed.amz_date, "20260102T030405Z");
        assert!(signed
            .authorization
            .contains("Credential=AKIDEXAMPLE/20260102/us-east-1/sqs/aws4_request"));
        assert!(signed.authorization.contains("SignedHeaders=content-type;host;x-amz-date"));
    }

    #[test]
    fn signing_is_deterministic() {
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let a = signer().sign_post("h", "/", b"x", "text/plain", &[], now);
        let b = signer().sign_post("h", "/", b"x", "text/plain", &[], now);
        assert_eq!(a.authorization, b.authorization);
    }

    #[test]
    fn extra_headers_join_the_signed_set() {
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let signed = signer().sign_post(
            "secretsmanager.us-east-1.amazonaws.com",
            "/",
            b"{}",
            "application/x-amz-json-1.1",
            &[("x-amz-target".to_string(), "secretsmanager.GetSecretValue".to_string())],
            now,
        );
        assert!(signed
            .authorization
            .contains("SignedHeaders=content-type;host;x-amz-date;x-amz-target"));
    }
}
