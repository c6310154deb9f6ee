//! Operator-facing message text (Telegram HTML subset).

use crate::domain::ChatId;

/// Escape text for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Shorten long error text before it goes into a chat message.
pub fn truncate_text(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut out = s.chars().take(max_len).collect::<String>();
    out.push_str("...");
    out
}

const ERROR_PREVIEW_LEN: usize = 500;

fn error_text(err: &str) -> String {
    escape_html(&truncate_text(err, ERROR_PREVIEW_LEN))
}

pub fn blocked_alert(domain: &str) -> String {
    format!(
        "⚠️ <b>Domain blocked:</b> <code>{}</code>\nStatus: listed by the registry",
        escape_html(domain)
    )
}

pub fn replacement_missing(domain: &str) -> String {
    format!(
        "❌ No replacement registered for <code>{}</code> in the backup mapping.",
        escape_html(domain)
    )
}

pub fn shortlink_listing_failed(domain: &str, err: &str) -> String {
    format!(
        "❌ Shortlink API error while remediating <code>{}</code>:\n<code>{}</code>",
        escape_html(domain),
        error_text(err)
    )
}

pub fn shortlink_patched(domain: &str, new_target: &str) -> String {
    format!(
        "✅ Shortlink updated for <code>{}</code>.\nNew target: {}",
        escape_html(domain),
        escape_html(new_target)
    )
}

pub fn shortlink_patch_failed(domain: &str, link_id: &str, err: &str) -> String {
    format!(
        "❌ Failed to update shortlink <code>{}</code> for <code>{}</code>:\n<code>{}</code>",
        escape_html(link_id),
        escape_html(domain),
        error_text(err)
    )
}

pub fn domain_list_updated(old: &str, new: &str) -> String {
    format!(
        "🔄 Domain list updated: <code>{}</code> → <code>{}</code>",
        escape_html(old),
        escape_html(new)
    )
}

pub fn domain_list_write_failed(err: &str) -> String {
    format!(
        "❌ Failed to save the domain list:\n<code>{}</code>",
        error_text(err)
    )
}

pub fn batch_failed(batch: &[String], err: &str) -> String {
    format!(
        "❌ Blocklist check failed for: <code>{}</code>\n<code>{}</code>",
        escape_html(&batch.join(", ")),
        error_text(err)
    )
}

pub fn all_clear(checked: usize, at: &str) -> String {
    format!(
        "🕐 <b>Hourly update</b>\n👍 All {checked} domains are safe.\nChecked at {}",
        escape_html(at)
    )
}

pub fn destination_installed(chat_id: ChatId) -> String {
    format!(
        "✅ Chat ID saved: <code>{}</code>\nNawala guard is now reporting to this chat.",
        chat_id.0
    )
}

pub fn destination_save_failed(chat_id: ChatId, err: &str) -> String {
    format!(
        "❌ Failed to save chat ID <code>{}</code>; notifications are not routed here:\n<code>{}</code>",
        chat_id.0,
        error_text(err)
    )
}

pub fn replace_done(old: &str, new: &str) -> String {
    format!(
        "✅ Domain <code>{}</code> replaced with <code>{}</code> in the domain list.",
        escape_html(old),
        escape_html(new)
    )
}

pub fn replace_not_found(old: &str) -> String {
    format!(
        "❌ Domain <code>{}</code> was not found in the domain list.",
        escape_html(old)
    )
}

pub fn replace_usage() -> String {
    "❌ Wrong format. Usage: <code>/replace &lt;old_domain&gt; &lt;new_domain&gt;</code>"
        .to_string()
}

pub fn domain_list(domains: &[String]) -> String {
    if domains.is_empty() {
        return "📂 The domain list is empty.".to_string();
    }
    let body = domains
        .iter()
        .map(|d| escape_html(d))
        .collect::<Vec<_>>()
        .join("\n");
    format!("📄 <b>Monitored domains ({})</b>\n{body}", domains.len())
}

/// Split a message into chunks of at most `limit` characters, breaking on line ends.
///
/// Only valid for messages whose markup never spans a line break. A single line longer
/// than `limit` is cut at character boundaries.
pub fn split_lines_chunks(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let mut out: Vec<String> = Vec::new();
    let mut chunk = String::new();
    let mut chunk_len = 0usize;

    for line in text.split('\n') {
        let line_len = line.chars().count();
        let sep = usize::from(!chunk.is_empty());
        if chunk_len + sep + line_len <= limit {
            if sep == 1 {
                chunk.push('\n');
            }
            chunk.push_str(line);
            chunk_len += sep + line_len;
            continue;
        }

        if !chunk.is_empty() {
            out.push(std::mem::take(&mut chunk));
            chunk_len = 0;
        }

        let mut rest = line;
        while rest.chars().count() > limit {
            let cut = rest
                .char_indices()
                .nth(limit)
                .map_or(rest.len(), |(i, _)| i);
            out.push(rest[..cut].to_string());
            rest = &rest[cut..];
        }
        chunk.push_str(rest);
        chunk_len = rest.chars().count();
    }

    if !chunk.is_empty() {
        out.push(chunk);
    }
    out
}
