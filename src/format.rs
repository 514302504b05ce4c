use chrono::Utc;

const MINUTE: f64 = 60.0;
const HOUR: f64 = 60.0 * MINUTE;
const DAY: f64 = 24.0 * HOUR;
const WEEK: f64 = 7.0 * DAY;

pub fn decode_html_entities(raw: &str) -> String {
    raw.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

/// Compact age of a post, e.g. `now`, `12m`, `3h`, `2d`, `5w`.
pub fn format_time_ago(created_utc: f64, now_utc: f64) -> String {
    let diff = now_utc - created_utc;
    if diff < MINUTE {
        return "now".to_string();
    }
    if diff < HOUR {
        return format!("{}m", (diff / MINUTE).floor() as i64);
    }
    if diff < DAY {
        return format!("{}h", (diff / HOUR).floor() as i64);
    }
    if diff < WEEK {
        return format!("{}d", (diff / DAY).floor() as i64);
    }
    format!("{}w", (diff / WEEK).floor() as i64)
}

pub fn time_ago(created_utc: f64) -> String {
    let now = Utc::now().timestamp_millis() as f64 / 1000.0;
    format_time_ago(created_utc, now)
}

pub fn format_score(score: i64) -> String {
    if score >= 1_000_000 {
        return format!("{:.1}M", score as f64 / 1_000_000.0);
    }
    if score >= 1_000 {
        return format!("{:.1}k", score as f64 / 1_000.0);
    }
    score.to_string()
}

/// Video clock, `m:ss`. Anything that is not a finite, non-negative number renders as `0:00`.
pub fn format_clock(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "0:00".to_string();
    }
    let total = seconds.floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}
