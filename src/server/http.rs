//! Minimal HTTP/1.1 request reading and response writing.

use std::collections::HashMap;
use std::io::{BufRead, Read, Write};

use anyhow::{bail, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{SurveyError, SurveyResult};

/// Largest request body accepted (CSV uploads included).
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Default)]
pub struct Request {
    pub method: String,
    /// Path without the query string.
    pub path: String,
    /// Lowercased header names.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// One part of a multipart/form-data body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormPart {
    pub name: String,
    pub filename: Option<String>,
    pub data: Vec<u8>,
}

/// Read one request. Returns `None` if the peer closed without sending anything.
pub fn read_request<R: BufRead>(reader: &mut R) -> Result<Option<Request>> {
    let mut request_line = String::new();
    if reader.read_line(&mut request_line)? == 0 {
        return Ok(None);
    }

    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        bail!("Malformed request line: {:?}", request_line.trim());
    }

    let method = parts[0].to_uppercase();
    // No endpoint reads query parameters
    let path = match parts[1].split_once('?') {
        Some((path, _)) => path.to_string(),
        None => parts[1].to_string(),
    };

    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }

    let content_length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    if content_length > MAX_BODY_BYTES {
        bail!("Request body of {} bytes is too large", content_length);
    }

    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        reader.read_exact(&mut body)?;
    }

    Ok(Some(Request {
        method,
        path,
        headers,
        body,
    }))
}

fn parse_urlencoded(input: &[u8]) -> HashMap<String, String> {
    url::form_urlencoded::parse(input).into_owned().collect()
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Fields of an `application/x-www-form-urlencoded` body.
    pub fn form(&self) -> HashMap<String, String> {
        parse_urlencoded(&self.body)
    }

    /// Body parsed as JSON. An empty body reads as `{}`.
    pub fn json<T: DeserializeOwned>(&self) -> SurveyResult<T> {
        let body: &[u8] = if self.body.iter().all(u8::is_ascii_whitespace) {
            b"{}"
        } else {
            &self.body
        };
        serde_json::from_slice(body).map_err(|e| SurveyError::invalid(format!("Invalid JSON: {}", e)))
    }

    /// Parts of a `multipart/form-data` body.
    pub fn multipart(&self) -> SurveyResult<Vec<FormPart>> {
        let content_type = self.header("content-type").unwrap_or("");
        let boundary = multipart_boundary(content_type)
            .ok_or_else(|| SurveyError::invalid("Expected a multipart/form-data upload"))?;
        Ok(parse_multipart(&self.body, &boundary))
    }
}

fn multipart_boundary(content_type: &str) -> Option<String> {
    if !content_type
        .to_lowercase()
        .starts_with("multipart/form-data")
    {
        return None;
    }
    content_type.split(';').find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("boundary") {
            Some(value.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// `name="value"` parameter from a Content-Disposition header.
fn disposition_param(header: &str, param: &str) -> Option<String> {
    header.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        if key.trim().eq_ignore_ascii_case(param) {
            Some(value.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

fn parse_multipart(body: &[u8], boundary: &str) -> Vec<FormPart> {
    let delimiter = format!("--{}", boundary).into_bytes();
    let mut parts = Vec::new();

    let Some(start) = find_bytes(body, &delimiter) else {
        return parts;
    };
    let mut rest = &body[start + delimiter.len()..];

    loop {
        // Closing delimiter is followed by "--"
        if rest.starts_with(b"--") {
            break;
        }
        let rest_after_crlf = rest.strip_prefix(b"\r\n").unwrap_or(rest);

        let Some(next) = find_bytes(rest_after_crlf, &delimiter) else {
            break;
        };
        let section = &rest_after_crlf[..next];
        rest = &rest_after_crlf[next + delimiter.len()..];

        let Some(header_end) = find_bytes(section, b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&section[..header_end]);
        let data = &section[header_end + 4..];
        let data = data.strip_suffix(b"\r\n").unwrap_or(data);

        let disposition = head.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case("content-disposition")
                .then(|| value.to_string())
        });
        let Some(disposition) = disposition else {
            continue;
        };
        let Some(name) = disposition_param(&disposition, "name") else {
            continue;
        };

        parts.push(FormPart {
            name,
            filename: disposition_param(&disposition, "filename"),
            data: data.to_vec(),
        });
    }

    parts
}

// ==================== RESPONSES ====================

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub extra_headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn json<T: Serialize>(status: u16, body: &T) -> Self {
        let body = serde_json::to_vec(body).unwrap_or_else(|e| {
            format!(r#"{{"status":"error","message":"Could not encode response: {}"}}"#, e)
                .into_bytes()
        });
        Self {
            status,
            content_type: "application/json",
            extra_headers: Vec::new(),
            body,
        }
    }

    pub fn xml(body: &str) -> Self {
        Self {
            status: 200,
            content_type: "text/xml",
            extra_headers: Vec::new(),
            body: body.as_bytes().to_vec(),
        }
    }

    /// CSV download with an attachment filename.
    pub fn csv_attachment(body: Vec<u8>, filename: &str) -> Self {
        Self {
            status: 200,
            content_type: "text/csv",
            extra_headers: vec![(
                "Content-Disposition".to_string(),
                format!("attachment; filename={}", filename),
            )],
            body,
        }
    }

    pub fn write_to<W: Write>(&self, stream: &mut W) -> Result<()> {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n",
            self.status,
            status_text(self.status),
            self.content_type,
            self.body.len()
        );
        for (name, value) in &self.extra_headers {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        head.push_str("\r\n");

        stream.write_all(head.as_bytes())?;
        stream.write_all(&self.body)?;
        stream.flush()?;
        Ok(())
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    fn read(raw: &[u8]) -> Request {
        read_request(&mut BufReader::new(raw)).unwrap().unwrap()
    }

    #[test]
    fn test_read_form_request() {
        let raw = b"POST /webhook?x=1 HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 30\r\n\r\nFrom=%2B16475551212&Body=+yes+";
        let req = read(raw);

        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/webhook");
        assert_eq!(req.header("Content-Type"), Some("application/x-www-form-urlencoded"));

        let form = req.form();
        assert_eq!(form.get("From").map(String::as_str), Some("+16475551212"));
        assert_eq!(form.get("Body").map(String::as_str), Some(" yes "));
    }

    #[test]
    fn test_empty_connection() {
        let mut reader = BufReader::new(&b""[..]);
        assert!(read_request(&mut reader).unwrap().is_none());
    }

    #[test]
    fn test_malformed_request_line() {
        let mut reader = BufReader::new(&b"GARBAGE\r\n\r\n"[..]);
        assert!(read_request(&mut reader).is_err());
    }

    #[test]
    fn test_json_body() {
        #[derive(serde::Deserialize)]
        struct Payload {
            #[serde(default)]
            phone_numbers: Vec<String>,
        }

        let req = Request {
            body: br#"{"phone_numbers":["6475551212"]}"#.to_vec(),
            ..Default::default()
        };
        assert_eq!(req.json::<Payload>().unwrap().phone_numbers, vec!["6475551212"]);

        let empty = Request::default();
        assert!(empty.json::<Payload>().unwrap().phone_numbers.is_empty());

        let bad = Request {
            body: b"{nope".to_vec(),
            ..Default::default()
        };
        assert!(matches!(bad.json::<Payload>(), Err(SurveyError::InvalidInput(_))));
    }

    #[test]
    fn test_multipart() {
        let body = b"--XyZ\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"roster.csv\"\r\n\
Content-Type: text/csv\r\n\r\n\
phone_number\r\n6475551212\r\n\
\r\n--XyZ\r\n\
Content-Disposition: form-data; name=\"send_immediately\"\r\n\r\n\
true\r\n--XyZ--\r\n";
        let mut headers = HashMap::new();
        headers.insert(
            "content-type".to_string(),
            "multipart/form-data; boundary=\"XyZ\"".to_string(),
        );
        let req = Request {
            headers,
            body: body.to_vec(),
            ..Default::default()
        };

        let parts = req.multipart().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].name, "file");
        assert_eq!(parts[0].filename.as_deref(), Some("roster.csv"));
        assert_eq!(parts[0].data, b"phone_number\r\n6475551212\r\n");
        assert_eq!(parts[1].name, "send_immediately");
        assert_eq!(parts[1].filename, None);
        assert_eq!(parts[1].data, b"true");
    }

    #[test]
    fn test_multipart_requires_boundary() {
        let req = Request::default();
        assert!(matches!(req.multipart(), Err(SurveyError::InvalidInput(_))));
    }

    #[test]
    fn test_write_response() {
        let mut out = Vec::new();
        HttpResponse::csv_attachment(b"a,b\n".to_vec(), "x.csv")
            .write_to(&mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Type: text/csv\r\n"));
        assert!(text.contains("Content-Length: 4\r\n"));
        assert!(text.contains("Content-Disposition: attachment; filename=x.csv\r\n"));
        assert!(text.ends_with("\r\n\r\na,b\n"));
    }
}
