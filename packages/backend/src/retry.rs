//! Sending REST requests and turning responses into JSON or errors.
//!
//! Reads go through [`send_json`], which retries transient failures
//! (connect errors, timeouts, HTTP 429 and 5xx) with exponential backoff.
//! Writes and procedure calls go through [`send_json_once`]: a retried
//! write could create a second record.

use std::time::Duration;

use serde::Deserialize;

use crate::BackendError;

/// Maximum number of retries for a read.
const MAX_RETRIES: u32 = 3;

/// Delay before the first retry; doubles on each subsequent retry.
const BASE_DELAY: Duration = Duration::from_millis(250);

/// Maximum length of the response body included in error messages.
const BODY_PREVIEW_LEN: usize = 300;

/// Sends a read request, retrying transient failures, and parses the body
/// as JSON.
///
/// `build_request` is called once per attempt since request builders are
/// consumed by `send()`.
pub async fn send_json<F>(build_request: F) -> Result<serde_json::Value, BackendError>
where
    F: Fn() -> reqwest::RequestBuilder + Send + Sync,
{
    let mut attempt = 0;
    loop {
        match send_json_once(build_request()).await {
            Err(e) if attempt < MAX_RETRIES && is_retryable(&e) => {
                attempt += 1;
                let delay = backoff_delay(attempt);
                log::warn!("Transient backend error ({e}), retry {attempt}/{MAX_RETRIES} in {delay:?}");
                tokio::time::sleep(delay).await;
            }
            result => return result,
        }
    }
}

/// Sends a request exactly once and parses the body as JSON.
///
/// An empty success body yields `Value::Null`.
pub async fn send_json_once(
    request: reqwest::RequestBuilder,
) -> Result<serde_json::Value, BackendError> {
    let response = request.send().await?;
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        return Err(api_error(status.as_u16(), &text));
    }
    if text.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| BackendError::Decode {
        message: format!("{e} (body: {})", preview(&text)),
    })
}

/// Error body shapes returned by PostgREST (`code`/`message`/`details`/
/// `hint`) and GoTrue (`error`/`error_description`, `msg`).
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    code: Option<serde_json::Value>,
    error_code: Option<String>,
    message: Option<String>,
    msg: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

/// Builds a [`BackendError::Api`] from an error response.
pub fn api_error(status: u16, body: &str) -> BackendError {
    let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) else {
        return BackendError::Api {
            status,
            code: None,
            message: if body.trim().is_empty() {
                format!("HTTP {status}")
            } else {
                preview(body)
            },
        };
    };

    let code = parsed
        .error_code
        .or_else(|| match parsed.code {
            Some(serde_json::Value::String(code)) => Some(code),
            Some(serde_json::Value::Number(code)) => Some(code.to_string()),
            _ => None,
        })
        .or_else(|| parsed.error.clone());

    let mut message = parsed
        .message
        .or(parsed.msg)
        .or(parsed.error_description)
        .or(parsed.error)
        .unwrap_or_else(|| format!("HTTP {status}"));
    for extra in [parsed.details, parsed.hint].into_iter().flatten() {
        if !extra.trim().is_empty() {
            message.push_str(" (");
            message.push_str(extra.trim());
            message.push(')');
        }
    }

    BackendError::Api {
        status,
        code,
        message,
    }
}

fn is_retryable(e: &BackendError) -> bool {
    match e {
        BackendError::Http(e) => e.is_timeout() || e.is_connect() || e.is_body(),
        BackendError::Api { status, .. } => *status == 429 || *status >= 500,
        BackendError::Decode { .. } | BackendError::Rejected { .. } => false,
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    BASE_DELAY * 2u32.saturating_pow(attempt.saturating_sub(1))
}

fn preview(text: &str) -> String {
    if text.len() > BODY_PREVIEW_LEN {
        let mut end = BODY_PREVIEW_LEN;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postgrest_error_body() {
        let err = api_error(
            400,
            r#"{"code":"23514","details":"Failing row contains (...)","hint":null,"message":"new row violates check constraint \"reports_status_check\""}"#,
        );
        let BackendError::Api {
            status,
            code,
            message,
        } = err
        else {
            panic!("expected Api error");
        };
        assert_eq!(status, 400);
        assert_eq!(code.as_deref(), Some("23514"));
        assert!(message.starts_with("new row violates check constraint"));
        assert!(message.ends_with("(Failing row contains (...))"));
    }

    #[test]
    fn gotrue_error_bodies() {
        let err = api_error(
            400,
            r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
        );
        assert!(matches!(
            err,
            BackendError::Api { ref code, ref message, .. }
                if code.as_deref() == Some("invalid_grant") && message == "Invalid login credentials"
        ));

        let err = api_error(
            422,
            r#"{"code":422,"error_code":"user_already_exists","msg":"User already registered"}"#,
        );
        assert!(matches!(
            err,
            BackendError::Api { ref code, ref message, .. }
                if code.as_deref() == Some("user_already_exists") && message == "User already registered"
        ));
    }

    #[test]
    fn non_json_error_body() {
        let err = api_error(502, "<html>Bad Gateway</html>");
        assert_eq!(err.to_string(), "Backend error (HTTP 502): <html>Bad Gateway</html>");
        assert_eq!(api_error(503, "").to_string(), "Backend error (HTTP 503): HTTP 503");
    }

    #[test]
    fn only_transient_statuses_retry() {
        let api = |status| BackendError::Api {
            status,
            code: None,
            message: String::new(),
        };
        assert!(is_retryable(&api(429)));
        assert!(is_retryable(&api(503)));
        assert!(!is_retryable(&api(400)));
        assert!(!is_retryable(&api(404)));
    }

    #[test]
    fn backoff_doubles() {
        assert_eq!(backoff_delay(1), Duration::from_millis(250));
        assert_eq!(backoff_delay(2), Duration::from_millis(500));
        assert_eq!(backoff_delay(3), Duration::from_secs(1));
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let long = "é".repeat(BODY_PREVIEW_LEN);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert!(p.len() <= BODY_PREVIEW_LEN + 3);
    }
}
