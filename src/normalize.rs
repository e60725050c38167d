//! Converts terminal payloads of non-streaming operations into one
//! canonical markup string. Pure functions; missing optional sections are
//! omitted rather than failing. How the markup is displayed is the
//! presentation layer's business.

use crate::api::backend::{DocAnswerPayload, SearchPayload, TextPayload};
use crate::error::ClientError;

/// Character budget for a crawled-content preview in a search entry.
pub const PREVIEW_BUDGET: usize = 300;

pub const NO_SOURCES_PLACEHOLDER: &str = "_No sources found._";

/// Render a search payload: warning banner, overview prose, then a
/// collapsed enumerated source list.
pub fn search_markup(payload: &SearchPayload) -> String {
    let mut out = String::new();

    if let Some(warning) = payload.warning.as_deref()
        && !warning.is_empty()
    {
        out.push_str("> ⚠️ ");
        out.push_str(warning);
        out.push_str("\n\n");
    }

    if let Some(overview) = payload.overview.as_deref()
        && !overview.is_empty()
    {
        out.push_str(overview.trim());
        out.push_str("\n\n");
    }

    if payload.items.is_empty() {
        out.push_str(NO_SOURCES_PLACEHOLDER);
        return out.trim_end().to_string();
    }

    let shown = payload.items.len();
    let total = payload.total.unwrap_or(shown as u64);
    out.push_str(&format!(
        "<details>\n<summary>Sources ({shown} of {total})</summary>\n\n"
    ));
    for (index, item) in payload.items.iter().enumerate() {
        let title = item
            .title
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(item.link.as_deref())
            .unwrap_or("Untitled source");
        match item.link.as_deref() {
            Some(link) if !link.is_empty() => {
                out.push_str(&format!("{}. [{}]({})", index + 1, title, link));
            }
            _ => out.push_str(&format!("{}. {}", index + 1, title)),
        }
        if item.success == Some(false) {
            match item.status {
                Some(status) => out.push_str(&format!(" — ⚠️ unreachable ({status})")),
                None => out.push_str(" — ⚠️ unreachable"),
            }
        }
        out.push('\n');
        if let Some(snippet) = item.snippet.as_deref()
            && !snippet.is_empty()
        {
            out.push_str(&format!("   {snippet}\n"));
        }
        if let Some(content) = item.markdown.as_deref()
            && !content.trim().is_empty()
        {
            let preview = truncate_chars(&collapse_whitespace(content), PREVIEW_BUDGET);
            out.push_str(&format!("   > {preview}\n"));
        }
    }
    out.push_str("</details>");
    out.trim_end().to_string()
}

/// Render a non-streaming document-QA payload: answer text plus a grid of
/// reference-page image links resolved against the service base URL.
pub fn doc_answer_markup(payload: &DocAnswerPayload, base_url: &str) -> String {
    let mut out = String::new();
    let answer = [
        payload.answer.as_deref(),
        payload.response.as_deref(),
        payload.text.as_deref(),
    ]
    .into_iter()
    .flatten()
    .find(|s| !s.trim().is_empty());
    if let Some(answer) = answer {
        out.push_str(answer.trim());
    }

    if !payload.pages.is_empty() {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        for (index, page) in payload.pages.iter().enumerate() {
            out.push_str(&format!(
                "![Page {}]({})\n",
                index + 1,
                resolve_url(base_url, page)
            ));
        }
    }
    out.trim_end().to_string()
}

/// Resolve the single text field of a plain-chat or markdown-conversion
/// payload, in fixed priority order. All candidates absent (or blank) is a
/// normalization failure.
pub fn text_markup(payload: &TextPayload) -> Result<String, ClientError> {
    [
        payload.response.as_deref(),
        payload.text.as_deref(),
        payload.content.as_deref(),
    ]
    .into_iter()
    .flatten()
    .find(|s| !s.trim().is_empty())
    .map(str::to_string)
    .ok_or(ClientError::MissingText)
}

fn resolve_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, budget: usize) -> String {
    if text.chars().count() <= budget {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(budget).collect();
    truncated.push('…');
    truncated
}
