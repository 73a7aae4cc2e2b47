use std::fmt;

use chrono::TimeZone;

use crate::alerts::Event;
use crate::monitor::mail::MailNotice;
use crate::scheduler::format_time;

/// This machine's host name, or "unknown".
pub fn host_name() -> String {
    nix::unistd::gethostname()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".into())
}

fn full_message(host: &str, event: &Event, notice: &MailNotice, device_info: &str, first: &str) -> String {
    let mut text = format!(
        "This message was generated by the smartwatch daemon running on:\n\n   host name:  {}\n\n\
         The following warning/error was logged by the smartwatch daemon:\n\n{}\n\n\
         Device info:\n{}\n\nFor details see the event log.\n",
        host, event.message, device_info
    );
    if notice.prev_count > 0 {
        text.push_str(&format!(
            "\nThe original message about this issue was sent at {}\n",
            first
        ));
    }
    match notice.next_days {
        Some(d) => text.push_str(&format!(
            "Another message will be sent in {} day{} if the problem persists.\n",
            d,
            if d == 1 { "" } else { "s" }
        )),
        None => text.push_str("No additional messages about this problem will be sent.\n"),
    }
    text
}

/// Environment handed to the `exec` sink for one throttled warning.
pub fn mail_env<Tz: TimeZone>(
    event: &Event,
    notice: &MailNotice,
    device_info: &str,
    host: &str,
    tz: &Tz,
) -> Vec<(&'static str, String)>
where
    Tz::Offset: fmt::Display,
{
    let first = format_time(notice.first_sent, tz);
    vec![
        ("SMARTD_MAILER", "exec".into()),
        ("SMARTD_DEVICE", event.device.clone()),
        ("SMARTD_DEVICETYPE", "ata".into()),
        ("SMARTD_DEVICESTRING", event.device.clone()),
        ("SMARTD_DEVICEINFO", device_info.to_string()),
        ("SMARTD_FAILTYPE", notice.kind.name().to_string()),
        ("SMARTD_SUBJECT", format!("SMART error ({}) detected on host: {}", notice.kind.name(), host)),
        ("SMARTD_MESSAGE", event.message.clone()),
        ("SMARTD_FULLMESSAGE", full_message(host, event, notice, device_info, &first)),
        ("SMARTD_TFIRST", first),
        ("SMARTD_TFIRSTEPOCH", notice.first_sent.to_string()),
        ("SMARTD_PREVCNT", notice.prev_count.to_string()),
        ("SMARTD_NEXTDAYS", notice.next_days.map(|d| d.to_string()).unwrap_or_default()),
    ]
}

/// Run `command` through `sh -c` for every event that passed the mail
/// throttle. Children are reaped on a background thread.
pub fn exec(command: &str, events: &[&Event], device_info: &str) {
    if command.is_empty() { return; }
    let host = host_name();
    for ev in events {
        let Some(notice) = &ev.mail else { continue };
        let env = mail_env(ev, notice, device_info, &host, &chrono::Local);
        let command = command.to_string();
        std::thread::spawn(move || {
            let out = std::process::Command::new("sh")
                .arg("-c")
                .arg(&command)
                .envs(env)
                .output();
            match out {
                Ok(o) if !o.status.success() => {
                    tracing::warn!("'{}' exited with {}", command, o.status);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("'{}': {}", command, e),
            }
        });
    }
}
