//! Czech VAT payer reliability checks against the Ministry of Finance
//! registry (the "nespolehlivý plátce" service).
//!
//! This is a small protocol state machine over an externally-owned SOAP
//! service:
//!
//! ```text
//! raw string ──▶ Normalize ──▶ Request ──▶ Classify transport
//!                   │                          │
//!                   ▼                          ▼
//!               Ineligible              Classify protocol ──▶ Classify records
//! ```
//!
//! Every path ends in exactly one [`VatVerdict`]; nothing here is an error
//! in the `Result` sense. A registry outage, a malformed envelope, and an
//! unknown flag value all *classify* — the caller degrades the output
//! field, it never fails the document.
//!
//! ## The flag vocabulary is a contract
//!
//! The `nespolehlivyPlatce` attribute is loosely specified by the service.
//! The interpretation below is binding for this crate:
//! `"ANO"` → unreliable, `"NE"` or empty → reliable, `"NENALEZEN"` → not
//! found, anything else → reliable (conservative default, logged at WARN).
//! Records are matched on the `dic` *attribute* of `statusPlatceDPH`
//! elements — the live service carries both fields as attributes, not as
//! child text nodes.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// Production endpoint of the registry's SOAP service.
pub const DEFAULT_VAT_ENDPOINT: &str =
    "https://adisrws.mfcr.cz/adistc/axis2/services/rozhraniCRPDPH.rozhraniCRPDPHSOAP";

/// Literal SOAPAction header the service requires.
const SOAP_ACTION: &str = "http://adis.mfcr.cz/rozhraniCRPDPH/getStatusNespolehlivyPlatce";

/// A VAT identifier as extracted from an invoice.
///
/// Normalization uppercases and removes whitespace; eligibility for
/// verification requires the `CZ` prefix and an 8–10 digit body. An
/// ineligible identifier is not an error — foreign VAT numbers are routine
/// and simply cannot be checked against this registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VatIdentifier {
    raw: String,
    normalized: String,
}

impl VatIdentifier {
    pub fn new(raw: &str) -> Self {
        let normalized: String = raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_uppercase();
        Self {
            raw: raw.to_string(),
            normalized,
        }
    }

    /// The identifier exactly as extracted.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Uppercase, whitespace-free form.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// The numeric body after the `CZ` prefix, if this identifier is
    /// eligible for registry verification (8–10 ASCII digits).
    pub fn numeric_body(&self) -> Option<&str> {
        let body = self.normalized.strip_prefix("CZ")?;
        if (8..=10).contains(&body.len()) && body.bytes().all(|b| b.is_ascii_digit()) {
            Some(body)
        } else {
            None
        }
    }
}

/// Terminal classification of one reliability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VatVerdict {
    /// Registry knows the payer and does not flag them.
    Reliable,
    /// Registry flags the payer as unreliable ("nespolehlivý plátce").
    Unreliable,
    /// Registry returned no record for this identifier.
    NotFound,
    /// Transport failure, non-200 status, or a protocol-level error code.
    ServiceUnavailable,
    /// Identifier is not a checkable Czech VAT number; no call was made.
    Ineligible,
    /// The record carried no VAT number at all.
    NoVatNumber,
}

impl VatVerdict {
    /// The value written into the record's `reliable_VAT_payer` field.
    pub fn to_field_value(self) -> Value {
        match self {
            VatVerdict::Reliable => json!(true),
            VatVerdict::Unreliable => json!(false),
            VatVerdict::NotFound => json!("Not found in registry"),
            VatVerdict::ServiceUnavailable | VatVerdict::Ineligible => json!("Unable to verify"),
            VatVerdict::NoVatNumber => json!("No VAT number found"),
        }
    }
}

impl fmt::Display for VatVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VatVerdict::Reliable => "reliable",
            VatVerdict::Unreliable => "unreliable",
            VatVerdict::NotFound => "not found",
            VatVerdict::ServiceUnavailable => "service unavailable",
            VatVerdict::Ineligible => "ineligible",
            VatVerdict::NoVatNumber => "no VAT number",
        };
        f.write_str(s)
    }
}

/// Client for the registry's SOAP endpoint.
pub struct VatChecker {
    http: reqwest::Client,
    endpoint: String,
}

impl VatChecker {
    /// Build a checker with the config's endpoint and timeout.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ExtractError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.vat_timeout_secs))
            .build()
            .map_err(|e| ExtractError::Internal(format!("HTTP client build failed: {e}")))?;
        Ok(Self {
            http,
            endpoint: config.vat_endpoint.clone(),
        })
    }

    /// Run the full state machine for one extracted VAT number.
    ///
    /// Never fails — every outcome is a [`VatVerdict`].
    pub async fn check(&self, raw_vat: &str) -> VatVerdict {
        let id = VatIdentifier::new(raw_vat);
        let Some(dic) = id.numeric_body() else {
            debug!("VAT '{}' is not a checkable CZ identifier", id.normalized());
            return VatVerdict::Ineligible;
        };

        let envelope = build_envelope(dic);

        let response = match self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", SOAP_ACTION)
            .body(envelope)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("VAT registry call failed for {}: {e}", id.normalized());
                return VatVerdict::ServiceUnavailable;
            }
        };

        if !response.status().is_success() {
            warn!(
                "VAT registry returned HTTP {} for {}",
                response.status(),
                id.normalized()
            );
            return VatVerdict::ServiceUnavailable;
        }

        let xml = match response.text().await {
            Ok(t) => t,
            Err(e) => {
                warn!("VAT registry response unreadable: {e}");
                return VatVerdict::ServiceUnavailable;
            }
        };

        let verdict = classify_response(&xml, dic);
        debug!("VAT {} → {verdict}", id.normalized());
        verdict
    }
}

/// Fixed SOAP 1.1 envelope with the numeric body as the sole payload field.
fn build_envelope(dic: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">
    <soapenv:Body>
        <StatusNespolehlivyPlatceRequest xmlns="http://adis.mfcr.cz/rozhraniCRPDPH/">
            <dic>{dic}</dic>
        </StatusNespolehlivyPlatceRequest>
    </soapenv:Body>
</soapenv:Envelope>"#
    )
}

/// Classify a registry response envelope for the given numeric body.
///
/// Element matching is namespace-prefix-agnostic (`local_name`) — the
/// service has been observed with both default and prefixed namespaces.
pub(crate) fn classify_response(xml: &str, dic: &str) -> VatVerdict {
    let mut reader = Reader::from_str(xml);

    let mut status_code: Option<String> = None;
    // (dic attribute, nespolehlivyPlatce attribute) per payer record.
    let mut records: Vec<(String, String)> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"status" => {
                    for attr in e.attributes().flatten() {
                        if attr.key.local_name().as_ref() == b"statusCode" {
                            if let Ok(v) = attr.unescape_value() {
                                status_code = Some(v.into_owned());
                            }
                        }
                    }
                }
                b"statusPlatceDPH" => {
                    let mut record_dic = String::new();
                    let mut flag = String::new();
                    for attr in e.attributes().flatten() {
                        match attr.key.local_name().as_ref() {
                            b"dic" => {
                                if let Ok(v) = attr.unescape_value() {
                                    record_dic = v.into_owned();
                                }
                            }
                            b"nespolehlivyPlatce" => {
                                if let Ok(v) = attr.unescape_value() {
                                    flag = v.into_owned();
                                }
                            }
                            _ => {}
                        }
                    }
                    records.push((record_dic, flag));
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!("VAT registry response XML malformed: {e}");
                return VatVerdict::ServiceUnavailable;
            }
            Ok(_) => {}
        }
    }

    match status_code.as_deref() {
        Some("0") => {}
        Some(code) => {
            warn!("VAT registry returned protocol status code {code}");
            return VatVerdict::ServiceUnavailable;
        }
        None => {
            warn!("VAT registry response carried no status element");
            return VatVerdict::ServiceUnavailable;
        }
    }

    if records.is_empty() {
        return VatVerdict::NotFound;
    }

    let Some((_, flag)) = records.iter().find(|(record_dic, _)| record_dic.as_str() == dic) else {
        return VatVerdict::NotFound;
    };

    match flag.as_str() {
        "ANO" => VatVerdict::Unreliable,
        "NE" | "" => VatVerdict::Reliable,
        "NENALEZEN" => VatVerdict::NotFound,
        other => {
            warn!("Unrecognised reliability flag '{other}' for {dic}, treating as reliable");
            VatVerdict::Reliable
        }
    }
}
