//! Decoding of the three response shapes the device uses
//!
//! - `param.cgi` plain text (`root.Group.Name=value` lines, `# Error` on failure)
//! - JSON-RPC envelopes (`{"data": ..., "error": {"code", "message"}}`)
//! - XML documents (disks, zipstream), where an element whose tag contains
//!   `Error` signals failure

use axis_core::{ProvisionError, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::transport::VapixResponse;

/// Turn "no response" and non-2xx statuses into errors.
///
/// HTTP 401 means the credentials no longer grant access and maps to `Auth`.
pub fn require(response: Option<VapixResponse>, what: &str) -> Result<VapixResponse> {
    let response =
        response.ok_or_else(|| ProvisionError::Transport(format!("no response when {}", what)))?;
    if response.status == 401 {
        return Err(ProvisionError::Auth(format!(
            "access denied when {}: {}",
            what,
            response.text().trim()
        )));
    }
    if !response.is_success() {
        return Err(ProvisionError::DeviceApi {
            code: Some(i64::from(response.status)),
            message: format!("HTTP {} when {}: {}", response.status, what, response.text().trim()),
        });
    }
    Ok(response)
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(bound = "T: DeserializeOwned")]
struct RpcEnvelope<T> {
    #[serde(default = "Option::default")]
    data: Option<T>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// Decode a JSON-RPC reply. `Ok(None)` means success without a `data` member.
pub fn decode_rpc<T: DeserializeOwned>(
    response: Option<VapixResponse>,
    what: &str,
) -> Result<Option<T>> {
    let response = require(response, what)?;
    let envelope: RpcEnvelope<T> = response.json().map_err(|e| {
        ProvisionError::device_api(format!("malformed reply when {}: {}", what, e))
    })?;
    if let Some(error) = envelope.error {
        return Err(ProvisionError::DeviceApi {
            code: error.code,
            message: format!(
                "{} when {}",
                error.message.unwrap_or_else(|| "unknown error".to_string()),
                what
            ),
        });
    }
    Ok(envelope.data)
}

/// Like [`decode_rpc`] but the `data` member must be present
pub fn decode_rpc_data<T: DeserializeOwned>(
    response: Option<VapixResponse>,
    what: &str,
) -> Result<T> {
    decode_rpc(response, what)?
        .ok_or_else(|| ProvisionError::device_api(format!("reply without data when {}", what)))
}

/// Parse `param.cgi?action=list` output into `Group.Name -> value`
pub fn parse_param_list(text: &str) -> Result<BTreeMap<String, String>> {
    if let Some(line) = text.lines().find(|l| l.trim_start().starts_with("# Error")) {
        return Err(ProvisionError::device_api(line.trim().to_string()));
    }
    Ok(text
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let key = key.trim();
            let key = key.strip_prefix("root.").unwrap_or(key);
            (key.to_string(), value.trim().to_string())
        })
        .collect())
}

/// `param.cgi?action=update` replies `OK` or an error line
pub fn check_param_update(text: &str, what: &str) -> Result<()> {
    if text.contains("Error") {
        return Err(ProvisionError::device_api(format!(
            "{} when {}",
            text.trim(),
            what
        )));
    }
    Ok(())
}

/// One XML element with its attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
}

/// Flatten an XML document into its elements, failing on any `*Error*` tag
pub fn scan_xml(body: &[u8], what: &str) -> Result<Vec<XmlElement>> {
    let malformed =
        |e: String| ProvisionError::device_api(format!("malformed XML when {}: {}", what, e));

    let mut reader = Reader::from_reader(body);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut elements = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let tag = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if tag.contains("Error") {
                    return Err(ProvisionError::device_api(format!(
                        "device replied {} when {}",
                        tag, what
                    )));
                }
                let mut attributes = BTreeMap::new();
                for attr in e.attributes() {
                    let attr = attr.map_err(|e| malformed(e.to_string()))?;
                    let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
                    let value = attr
                        .unescape_value()
                        .map_err(|e| malformed(e.to_string()))?
                        .into_owned();
                    attributes.insert(key, value);
                }
                elements.push(XmlElement { tag, attributes });
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(malformed(e.to_string())),
        }
        buf.clear();
    }

    Ok(elements)
}

/// First value of any of `keys` across the scanned elements
pub fn find_attribute<'a>(elements: &'a [XmlElement], keys: &[&str]) -> Option<&'a str> {
    elements.iter().find_map(|element| {
        keys.iter()
            .find_map(|key| element.attributes.get(*key).map(String::as_str))
    })
}

/// Deserialize an XML body with quick-xml's serde support
pub fn decode_xml<T: DeserializeOwned>(body: &[u8], what: &str) -> Result<T> {
    let text = std::str::from_utf8(body)
        .map_err(|e| ProvisionError::device_api(format!("non UTF-8 reply when {}: {}", what, e)))?;
    quick_xml::de::from_str(text)
        .map_err(|e| ProvisionError::device_api(format!("malformed XML when {}: {}", what, e)))
}
