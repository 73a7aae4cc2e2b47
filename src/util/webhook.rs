use crate::alerts::Event;
use serde_json::json;

/// Slack/Discord-compatible payload for the events that passed the mail throttle.
pub fn payload(events: &[&Event]) -> Option<String> {
    let lines: Vec<String> = events
        .iter()
        .filter_map(|e| {
            let n = e.mail.as_ref()?;
            let mut line = e.line();
            if let Some(d) = n.next_days {
                line.push_str(&format!(" (reminder in {} day{})", d, if d == 1 { "" } else { "s" }));
            }
            Some(line)
        })
        .collect();
    if lines.is_empty() {
        return None;
    }
    Some(json!({ "text": lines.join("\n") }).to_string())
}

/// Fire an HTTP POST to `url` with the payload.
/// Runs in a detached background thread so it never blocks the monitor loop.
pub fn notify(events: &[&Event], url: &str) {
    if url.is_empty() { return; }
    let Some(body) = payload(events) else { return };
    let url = url.to_string();

    std::thread::spawn(move || {
        let out = std::process::Command::new("curl")
            .args([
                "-s", "--max-time", "10",
                "-X", "POST",
                "-H", "Content-Type: application/json",
                "-d", &body,
                &url,
            ])
            .output();
        if let Err(e) = out {
            tracing::warn!("webhook {}: {}", url, e);
        }
    });
}
