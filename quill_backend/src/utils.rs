//! Small helpers shared by the server and the terminal client.

use chrono::{DateTime, Utc};

pub const APP_NAME: &str = "quill";

pub fn user_agent() -> String {
    format!("Quill/{}", env!("CARGO_PKG_VERSION"))
}

pub fn print_banner() {
    eprintln!("{APP_NAME} {}", env!("CARGO_PKG_VERSION"));
}

/// Renders an upstream timestamp as "3h ago". Unparseable input is returned
/// unchanged.
pub fn relative_time(raw: &str, now: DateTime<Utc>) -> String {
    let Ok(parsed) = DateTime::parse_from_rfc3339(raw) else {
        return raw.to_string();
    };
    let elapsed = now.signed_duration_since(parsed.with_timezone(&Utc));
    let secs = elapsed.num_seconds();
    if secs < 0 {
        return "just now".into();
    }
    match secs {
        0..=59 => "just now".into(),
        60..=3_599 => format!("{}m ago", secs / 60),
        3_600..=86_399 => format!("{}h ago", secs / 3_600),
        _ => format!("{}d ago", secs / 86_400),
    }
}

/// Identifiers are interpolated into upstream paths, so only plain tokens
/// are accepted.
pub fn is_path_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
