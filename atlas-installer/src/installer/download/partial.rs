//! Parsing of responses to range requests.

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::StatusCode;

/// Position in the resource at which the response body starts.
///
/// A server may ignore the `Range` header and answer `200 OK`, in which case
/// the body is the whole resource and the local file must be rewritten from
/// the beginning. It may also answer `206` with a different range than the
/// one requested, so the start is always taken from `Content-Range`.
pub fn response_range_start(
    status: StatusCode,
    headers: &HeaderMap,
) -> Result<u64, InvalidResponseError> {
    let start = match status {
        StatusCode::OK => 0,

        // Only a single open-ended range is ever requested, so
        // multipart/byteranges bodies do not need handling.
        StatusCode::PARTIAL_CONTENT => content_range(headers)?.start,

        status if status.is_success() => 0,

        status => return Err(InvalidResponseError::UnexpectedStatus(status)),
    };
    Ok(start)
}

/// Complete length of the resource from `Content-Range`, if present.
///
/// Works for both `bytes 0-99/1000` and the `bytes */1000` form sent with
/// `416 Range Not Satisfiable`.
pub fn content_range_total(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(header::CONTENT_RANGE)?.to_str().ok()?;
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}

/// Body length from `Content-Length`, if present.
pub fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// Parsed `Content-Range: bytes <start>-<end>/<total>` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub total: Option<u64>,
}

fn content_range(headers: &HeaderMap) -> Result<ContentRange, ContentRangeParseError> {
    let header_value = headers
        .get(header::CONTENT_RANGE)
        .ok_or_else(|| ContentRangeParseError {
            reason: "Partial Content response without a Content-Range header",
            value: HeaderValue::from_static(""),
        })?;

    let invalid = |reason: &'static str| ContentRangeParseError {
        reason,
        value: header_value.clone(),
    };

    let (unit, range) = header_value
        .to_str()
        .map_err(|_| invalid("not valid utf-8"))?
        .split_once(' ')
        .ok_or_else(|| invalid("missing unit"))?;
    if unit != "bytes" {
        return Err(invalid("unknown unit"));
    }

    let (span, total) = range.split_once('/').unwrap_or((range, "*"));
    let (start, _) = span.split_once('-').ok_or_else(|| invalid("invalid range"))?;
    let start = start
        .trim()
        .parse()
        .map_err(|_| invalid("range start is not a number"))?;

    Ok(ContentRange {
        start,
        total: total.trim().parse().ok(),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum InvalidResponseError {
    #[error("received unexpected status code: {0}")]
    UnexpectedStatus(StatusCode),
    #[error(transparent)]
    ContentRange(#[from] ContentRangeParseError),
}

#[derive(Debug, thiserror::Error)]
#[error("error parsing Content-Range header, reason: {reason}, got: {value:?}")]
pub struct ContentRangeParseError {
    reason: &'static str,
    value: HeaderValue,
}
