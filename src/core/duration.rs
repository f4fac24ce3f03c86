use anyhow::{bail, Context, Result};
use std::time::Duration;

/// Parse duration string like "30s", "5m", "2h30m" or "250ms"
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        bail!("Empty duration string");
    }

    let mut total = Duration::ZERO;
    let mut current_num = String::new();
    let mut chars = s.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch.is_ascii_digit() {
            current_num.push(ch);
            continue;
        }
        if ch.is_whitespace() {
            continue;
        }

        let unit = match ch.to_ascii_lowercase() {
            'h' => Duration::from_secs(3600),
            'm' if matches!(chars.peek(), Some('s' | 'S')) => {
                chars.next();
                Duration::from_millis(1)
            }
            'm' => Duration::from_secs(60),
            's' => Duration::from_secs(1),
            _ => bail!("Invalid character in duration: {}", ch),
        };

        let value: u32 = current_num
            .parse()
            .with_context(|| format!("Missing number before '{}' in duration: {}", ch, s))?;
        total += unit * value;
        current_num.clear();
    }

    if !current_num.is_empty() {
        bail!("Duration must end with unit (h, m, s or ms): {}", s);
    }

    if total.is_zero() {
        bail!("Duration must be greater than zero");
    }

    Ok(total)
}
