//! Error Classifier (C8): maps raw transport/storage errors to a user-visible
//! category, a remediation hint and a retryable flag. Classification never
//! alters the original message; it only adds metadata.

use chrono::{DateTime, Utc};

/// A user-visible error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Auth,
    Network,
    Permission,
    NotFound,
    RateLimit,
    Validation,
    StorageApi,
    Filesystem,
    Configuration,
    Unknown,
}

impl ErrorCategory {
    pub fn title(self) -> &'static str {
        match self {
            ErrorCategory::Auth => "Authentication failed",
            ErrorCategory::Network => "Network error",
            ErrorCategory::Permission => "Permission denied",
            ErrorCategory::NotFound => "Not found",
            ErrorCategory::RateLimit => "Rate limited",
            ErrorCategory::Validation => "Invalid request",
            ErrorCategory::StorageApi => "Storage service error",
            ErrorCategory::Filesystem => "Filesystem error",
            ErrorCategory::Configuration => "Configuration error",
            ErrorCategory::Unknown => "Unexpected error",
        }
    }

    pub fn suggestion(self) -> &'static str {
        match self {
            ErrorCategory::Auth => {
                "Run credential setup or set the access-key/secret-key environment variables"
            }
            ErrorCategory::Network => "Check your connection and retry; this is usually transient",
            ErrorCategory::Permission => "Verify the credentials have access to this bucket/key",
            ErrorCategory::NotFound => "Check the bucket and key names and refresh the listing",
            ErrorCategory::RateLimit => "Retry shortly; consider lowering transfer concurrency",
            ErrorCategory::Validation => "Check the request parameters (e.g. bucket must be empty)",
            ErrorCategory::StorageApi => "The storage service reported an internal error; retry",
            ErrorCategory::Filesystem => "Check local disk permissions, free space and open files",
            ErrorCategory::Configuration => "Check the system clock and region configuration",
            ErrorCategory::Unknown => "Retry the operation; check the logs for details",
        }
    }

    pub fn retryable(self) -> bool {
        matches!(
            self,
            ErrorCategory::Network | ErrorCategory::RateLimit | ErrorCategory::StorageApi | ErrorCategory::Unknown
        )
    }
}

/// The fully classified record shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub category: ErrorCategory,
    pub title: &'static str,
    pub user_message: String,
    pub suggestion: &'static str,
    pub raw: String,
    pub retryable: bool,
    pub timestamp: DateTime<Utc>,
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_ascii_lowercase().contains(&needle.to_ascii_lowercase())
}

/// Classify a raw error message (and optional HTTP status) deterministically.
/// Rules are matched in the order given in the specification; the first match
/// wins.
pub fn classify(raw: &str, http_status: Option<u16>) -> ErrorRecord {
    let category = classify_category(raw, http_status);
    build_record(category, raw)
}

fn classify_category(raw: &str, http_status: Option<u16>) -> ErrorCategory {
    let signals: &[(&str, ErrorCategory)] = &[
        ("NoCredentials", ErrorCategory::Auth),
        ("no credentials", ErrorCategory::Auth),
        ("InvalidAccessKeyId", ErrorCategory::Auth),
        ("SignatureDoesNotMatch", ErrorCategory::Auth),
        ("TokenRefreshRequired", ErrorCategory::Auth),
        ("ExpiredToken", ErrorCategory::Auth),
        ("RequestTimeTooSkewed", ErrorCategory::Configuration),
        ("AccessDenied", ErrorCategory::Permission),
        ("Forbidden", ErrorCategory::Permission),
        ("NoSuchBucket", ErrorCategory::NotFound),
        ("NoSuchKey", ErrorCategory::NotFound),
        ("BucketNotEmpty", ErrorCategory::Validation),
        ("TooManyRequests", ErrorCategory::RateLimit),
        ("RequestLimitExceeded", ErrorCategory::RateLimit),
        ("timeout", ErrorCategory::Network),
        ("connection", ErrorCategory::Network),
        ("network", ErrorCategory::Network),
        ("EOF", ErrorCategory::Network),
    ];

    for (signal, category) in signals {
        if contains_ci(raw, signal) {
            return *category;
        }
    }

    match http_status {
        Some(403) => return ErrorCategory::Permission,
        Some(404) => return ErrorCategory::NotFound,
        Some(429) => return ErrorCategory::RateLimit,
        Some(s) if (500..600).contains(&s) => return ErrorCategory::StorageApi,
        _ => {}
    }

    ErrorCategory::Unknown
}

/// Classify a filesystem (`std::io`) error.
pub fn classify_io(err: &std::io::Error) -> ErrorRecord {
    use std::io::ErrorKind;
    let category = match err.kind() {
        ErrorKind::PermissionDenied => ErrorCategory::Filesystem,
        ErrorKind::NotFound => ErrorCategory::Filesystem,
        _ => {
            #[cfg(unix)]
            {
                if err.raw_os_error() == Some(libc_emfile()) {
                    ErrorCategory::Filesystem
                } else {
                    ErrorCategory::Unknown
                }
            }
            #[cfg(not(unix))]
            {
                ErrorCategory::Unknown
            }
        }
    };
    build_record(category, &err.to_string())
}

#[cfg(unix)]
fn libc_emfile() -> i32 {
    // EMFILE is 24 on Linux and most BSD-derived targets this crate ships for.
    24
}

fn build_record(category: ErrorCategory, raw: &str) -> ErrorRecord {
    ErrorRecord {
        category,
        title: category.title(),
        user_message: format!("{}: {}", category.title(), raw),
        suggestion: category.suggestion(),
        raw: raw.to_string(),
        retryable: category.retryable(),
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_deterministic() {
        let a = classify("AccessDenied: no", None);
        let b = classify("AccessDenied: no", None);
        assert_eq!(a.category, b.category);
        assert_eq!(a.retryable, b.retryable);
    }

    #[test]
    fn auth_signals_are_not_retryable() {
        assert_eq!(classify("NoCredentials found", None).category, ErrorCategory::Auth);
        assert!(!classify("NoCredentials found", None).retryable);
        assert_eq!(classify("InvalidAccessKeyId", None).category, ErrorCategory::Auth);
        assert_eq!(classify("ExpiredToken", None).category, ErrorCategory::Auth);
    }

    #[test]
    fn permission_matches_403_and_text() {
        assert_eq!(classify("boom", Some(403)).category, ErrorCategory::Permission);
        assert_eq!(classify("AccessDenied", None).category, ErrorCategory::Permission);
        assert!(!classify("AccessDenied", None).retryable);
    }

    #[test]
    fn not_found_matches_404_and_text() {
        assert_eq!(classify("boom", Some(404)).category, ErrorCategory::NotFound);
        assert_eq!(classify("NoSuchKey", None).category, ErrorCategory::NotFound);
    }

    #[test]
    fn rate_limit_is_retryable() {
        let rec = classify("boom", Some(429));
        assert_eq!(rec.category, ErrorCategory::RateLimit);
        assert!(rec.retryable);
        assert_eq!(classify("TooManyRequests", None).category, ErrorCategory::RateLimit);
    }

    #[test]
    fn network_signals_are_retryable() {
        for s in ["connection reset", "Timeout waiting", "network unreachable", "unexpected EOF"] {
            let rec = classify(s, None);
            assert_eq!(rec.category, ErrorCategory::Network, "{s}");
            assert!(rec.retryable);
        }
    }

    #[test]
    fn server_5xx_is_storage_api_and_retryable() {
        let rec = classify("internal error", Some(503));
        assert_eq!(rec.category, ErrorCategory::StorageApi);
        assert!(rec.retryable);
    }

    #[test]
    fn unknown_defaults_retryable() {
        let rec = classify("something weird", None);
        assert_eq!(rec.category, ErrorCategory::Unknown);
        assert!(rec.retryable);
    }

    #[test]
    fn skewed_clock_is_configuration_not_retryable() {
        let rec = classify("RequestTimeTooSkewed", None);
        assert_eq!(rec.category, ErrorCategory::Configuration);
        assert!(!rec.retryable);
    }

    #[test]
    fn bucket_not_empty_is_validation() {
        let rec = classify("BucketNotEmpty", None);
        assert_eq!(rec.category, ErrorCategory::Validation);
        assert!(!rec.retryable);
    }

    #[test]
    fn io_not_found_classifies_as_filesystem() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        assert_eq!(classify_io(&err).category, ErrorCategory::Filesystem);
    }
}
