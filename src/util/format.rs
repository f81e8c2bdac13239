/// Format a Unix timestamp as a `YYYY-MM-DD HH:MM` string (UTC)
pub fn format_timestamp(timestamp: i64) -> String {
    use time::OffsetDateTime;
    use time::macros::format_description;

    if timestamp == 0 {
        return "unknown".to_string();
    }

    OffsetDateTime::from_unix_timestamp(timestamp)
        .ok()
        .and_then(|dt| {
            let format = format_description!("[year]-[month]-[day] [hour]:[minute]");
            dt.format(&format).ok()
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Short (abbreviated) form of a commit id for display
pub fn short_id(id: git2::Oid) -> String {
    let hex = id.to_string();
    hex[..hex.len().min(8)].to_string()
}
