/**
 * HILINK MODEM - Client HTTP pour dongle LTE Huawei (API HiLink)
 *
 * ROLE: signal, device information, operator, traffic counters and the SMS
 * inbox, plus the two SMS mutations the forwarder and the API need
 * (mark read, delete).
 *
 * FONCTIONNEMENT:
 * - every call fetches a fresh session/CSRF pair from /api/webserver/SesTokInfo
 *   (POSTs consume the token on most firmwares)
 * - responses are flat XML; `<error><code>N</code></error>` becomes an Http error
 */

use super::{ModemClient, ModemFields};
use crate::error::SourceError;
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// SMS inbox entry. `timestamp` is rendered in local time when parseable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsMessage {
    pub index: u32,
    pub timestamp: String,
    pub raw_timestamp: String,
    pub from: String,
    pub message: String,
    pub unread: bool,
}

const SMS_PAGE_SIZE: u32 = 50;
const BOX_LOCAL_INBOX: u32 = 1;

pub struct HilinkModem {
    base_url: String,
    http: reqwest::Client,
}

impl HilinkModem {
    /// `host` is an IP or hostname (`192.168.8.1`) or a full base URL.
    pub fn new(host: &str) -> Result<Self, SourceError> {
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", host.trim_end_matches('/'))
        };
        let http = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { base_url, http })
    }

    async fn session(&self) -> Result<(String, String), SourceError> {
        let body = self
            .http
            .get(format!("{}/api/webserver/SesTokInfo", self.base_url))
            .send()
            .await?
            .text()
            .await?;
        let fields = parse_response(&body)?;
        let ses = fields.get("SesInfo").cloned().unwrap_or_default();
        let tok = fields.get("TokInfo").cloned().unwrap_or_default();
        Ok((ses, tok))
    }

    async fn get(&self, path: &str) -> Result<String, SourceError> {
        let (ses, tok) = self.session().await?;
        debug!("HiLink GET {}", path);
        let body = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header("Cookie", ses)
            .header("__RequestVerificationToken", tok)
            .send()
            .await?
            .text()
            .await?;
        check_error(&body)?;
        Ok(body)
    }

    async fn post(&self, path: &str, request: String) -> Result<String, SourceError> {
        let (ses, tok) = self.session().await?;
        debug!("HiLink POST {}", path);
        let body = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header("Cookie", ses)
            .header("__RequestVerificationToken", tok)
            .header("Content-Type", "application/x-www-form-urlencoded; charset=UTF-8")
            .body(request)
            .send()
            .await?
            .text()
            .await?;
        check_error(&body)?;
        Ok(body)
    }

    async fn fields(&self, path: &str) -> Result<ModemFields, SourceError> {
        let body = self.get(path).await?;
        parse_response(&body)
    }
}

#[async_trait]
impl ModemClient for HilinkModem {
    async fn signal(&self) -> Result<ModemFields, SourceError> {
        self.fields("/api/device/signal").await
    }

    async fn device_information(&self) -> Result<ModemFields, SourceError> {
        self.fields("/api/device/information").await
    }

    async fn current_plmn(&self) -> Result<ModemFields, SourceError> {
        self.fields("/api/net/current-plmn").await
    }

    async fn traffic_statistics(&self) -> Result<ModemFields, SourceError> {
        self.fields("/api/monitoring/traffic-statistics").await
    }

    async fn sms_inbox(&self) -> Result<Vec<SmsMessage>, SourceError> {
        let request = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><request><PageIndex>1</PageIndex>\
             <ReadCount>{SMS_PAGE_SIZE}</ReadCount><BoxType>{BOX_LOCAL_INBOX}</BoxType><SortType>0</SortType>\
             <Ascending>0</Ascending><UnreadPreferred>0</UnreadPreferred></request>"
        );
        let body = self.post("/api/sms/sms-list", request).await?;
        parse_sms_list(&body)
    }

    async fn mark_read(&self, index: u32) -> Result<(), SourceError> {
        let request = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?><request><Index>{index}</Index></request>");
        self.post("/api/sms/set-read", request).await.map(|_| ())
    }

    async fn delete_sms(&self, index: u32) -> Result<(), SourceError> {
        let request = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?><request><Index>{index}</Index></request>");
        self.post("/api/sms/delete-sms", request).await.map(|_| ())
    }
}

/// Signal bars (0-5) from an RSRP reading such as `-95dBm`.
/// Positive readings are treated as their negative; unparsable gives 0.
pub fn signal_strength(rsrp: &str) -> u8 {
    let Ok(value) = rsrp.replace("dBm", "").trim().parse::<i32>() else {
        return 0;
    };
    let value = -value.abs();
    match value {
        v if v >= -80 => 5,
        v if v >= -90 => 4,
        v if v >= -100 => 3,
        v if v >= -110 => 2,
        _ => 1,
    }
}

pub fn signal_color(strength: u8) -> &'static str {
    match strength {
        s if s >= 4 => "green",
        3 => "yellow",
        _ => "red",
    }
}

/// Renders a modem timestamp in local time. Naive timestamps are taken as
/// UTC; anything unparsable is returned unchanged.
pub fn localize_timestamp(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%z", "%Y-%m-%dT%H:%M:%S%z"] {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return dt.with_timezone(&Local).to_rfc3339();
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return naive.and_utc().with_timezone(&Local).to_rfc3339();
        }
    }
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt.with_timezone(&Utc).with_timezone(&Local).to_rfc3339(),
        Err(_) => raw.to_string(),
    }
}

fn check_error(body: &str) -> Result<(), SourceError> {
    if let Some(inner) = xml_blocks(body, "error").first() {
        let fields = xml_fields(inner);
        let code = fields.get("code").map(String::as_str).unwrap_or("unknown");
        return Err(SourceError::Http(format!("modem returned error {code}")));
    }
    Ok(())
}

fn parse_response(body: &str) -> Result<ModemFields, SourceError> {
    check_error(body)?;
    let inner = xml_blocks(body, "response")
        .first()
        .copied()
        .ok_or_else(|| SourceError::Parse("missing <response> element".into()))?;
    Ok(xml_fields(inner))
}

fn parse_sms_list(body: &str) -> Result<Vec<SmsMessage>, SourceError> {
    check_error(body)?;
    let mut messages = Vec::new();
    for block in xml_blocks(body, "Message") {
        let fields = xml_fields(block);
        let get = |k: &str| fields.get(k).cloned().unwrap_or_default();
        let index = get("Index")
            .parse::<u32>()
            .map_err(|_| SourceError::Parse(format!("invalid SMS index `{}`", get("Index"))))?;
        let raw_timestamp = get("Date");
        let localized = localize_timestamp(&raw_timestamp);
        messages.push(SmsMessage {
            index,
            timestamp: if localized.is_empty() { raw_timestamp.clone() } else { localized },
            raw_timestamp,
            from: get("Phone"),
            message: get("Content"),
            unread: get("Smstat") == "0",
        });
    }
    Ok(messages)
}

/// Inner text of every `<tag>...</tag>` element, in document order.
fn xml_blocks<'a>(body: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut blocks = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        let Some(end) = after.find(&close) else { break };
        blocks.push(&after[..end]);
        rest = &after[end + close.len()..];
    }
    blocks
}

/// Leaf elements `<Tag>text</Tag>` of a document fragment. Nested elements
/// are descended into; their leaves are flattened into the same map.
fn xml_fields(body: &str) -> ModemFields {
    let mut fields = ModemFields::new();
    let mut rest = body;
    while let Some(lt) = rest.find('<') {
        rest = &rest[lt + 1..];
        let Some(gt) = rest.find('>') else { break };
        let name = &rest[..gt];
        rest = &rest[gt + 1..];
        if name.is_empty() || name.starts_with(['/', '?', '!']) || name.ends_with('/') || name.contains(' ') {
            continue;
        }
        let close = format!("</{name}>");
        if let Some(text_end) = rest.find('<') {
            if rest[text_end..].starts_with(&close) {
                fields.insert(name.to_string(), unescape(&rest[..text_end]));
                rest = &rest[text_end + close.len()..];
            }
        }
    }
    fields
}

/// Decodes the five named XML entities and `&#N;` / `&#xH;` references in one
/// pass. Unknown or malformed references are kept verbatim.
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest
            .find(';')
            .filter(|end| *end <= 10)
            .and_then(|end| decode_entity(&rest[1..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "amp" => Some('&'),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entities_decode_in_one_pass() {
        assert_eq!(unescape("it&#39;s &#x20AC;5 &amp; more"), "it's €5 & more");
        assert_eq!(unescape("&lt;b&gt; &quot;x&quot; &apos;"), "<b> \"x\" '");
        assert_eq!(unescape("&amp;lt;"), "&lt;");
        assert_eq!(unescape("AT&T; &#xZZ; &#55296; a & b"), "AT&T; &#xZZ; &#55296; a & b");
    }

    #[test]
    fn strength_buckets() {
        assert_eq!(signal_strength("-75dBm"), 5);
        assert_eq!(signal_strength("-80dBm"), 5);
        assert_eq!(signal_strength("-85dBm"), 4);
        assert_eq!(signal_strength("-100dBm"), 3);
        assert_eq!(signal_strength("-105dBm"), 2);
        assert_eq!(signal_strength("-120dBm"), 1);
        assert_eq!(signal_strength("95dBm"), 3);
        assert_eq!(signal_strength(""), 0);
        assert_eq!(signal_color(5), "green");
        assert_eq!(signal_color(3), "yellow");
        assert_eq!(signal_color(0), "red");
    }

    #[test]
    fn parses_flat_response() {
        let body = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<response>\n<rsrp>-97dBm</rsrp>\n<rsrq>-11dB</rsrq>\n<empty></empty>\n</response>";
        let fields = parse_response(body).unwrap();
        assert_eq!(fields["rsrp"], "-97dBm");
        assert_eq!(fields["rsrq"], "-11dB");
        assert_eq!(fields["empty"], "");
    }

    #[test]
    fn error_document_is_http_error() {
        let body = "<?xml version=\"1.0\"?><error><code>125002</code><message></message></error>";
        assert_eq!(
            parse_response(body),
            Err(SourceError::Http("modem returned error 125002".into()))
        );
    }

    #[test]
    fn parses_sms_inbox() {
        let body = "<response><Count>2</Count><Messages>\
            <Message><Smstat>0</Smstat><Index>40001</Index><Phone>+61400000000</Phone>\
            <Content>Code 1234 &amp; more</Content><Date>2024-05-01 10:00:00</Date></Message>\
            <Message><Smstat>1</Smstat><Index>40000</Index><Phone>Telstra</Phone>\
            <Content>Welcome</Content><Date>not a date</Date></Message>\
            </Messages></response>";
        let messages = parse_sms_list(body).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].index, 40001);
        assert!(messages[0].unread);
        assert_eq!(messages[0].message, "Code 1234 & more");
        assert_eq!(messages[0].raw_timestamp, "2024-05-01 10:00:00");
        assert!(!messages[1].unread);
        assert_eq!(messages[1].timestamp, "not a date");
    }

    #[test]
    fn naive_timestamps_are_utc() {
        let local = localize_timestamp("2024-05-01 10:00:00");
        let parsed = DateTime::parse_from_rfc3339(&local).unwrap();
        assert_eq!(parsed.with_timezone(&Utc).to_rfc3339(), "2024-05-01T10:00:00+00:00");
        assert_eq!(localize_timestamp(""), "");
    }
}
