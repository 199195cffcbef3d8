use crate::config::Config;
use crate::error::{JobError, JobResult};
use crate::imaging::EncodedImage;
use crate::script::{self, AdScript, Language, ScriptStyle};
use crate::{logi, logw};
use reqwest::Client;
use serde_json::{Value, json};

const MAX_DETAIL_BYTES: usize = 4_000;
const RAW_SNIPPET: usize = 800;

fn trim_copy_utf8_safe(input: &str, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return input.to_string();
    }

    let mut cut = max_bytes.min(input.len());
    while cut > 0 && !input.is_char_boundary(cut) {
        cut -= 1;
    }
    input[..cut].to_string()
}

/// Pull the completion text out of a chat-completions reply, logging any
/// vendor error object on the way.
fn openai_extract_message_text(resp_json: &str) -> Option<String> {
    let root: Value = serde_json::from_str(resp_json).ok()?;

    if let Some(err) = root.get("error") {
        if let Some(msg) = err.get("message").and_then(|v| v.as_str()) {
            logw(format!("OpenAI error message: {}", msg));
        }
        if let Some(typ) = err.get("type").and_then(|v| v.as_str()) {
            logw(format!("OpenAI error type: {}", typ));
        }
        if let Some(code) = err.get("code").and_then(|v| v.as_str()) {
            logw(format!("OpenAI error code: {}", code));
        }
        return None;
    }

    let content = root
        .get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?;

    match content {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Array(parts) => {
            let text: String = parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("");
            (!text.trim().is_empty()).then_some(text)
        }
        _ => None,
    }
}

/// Inputs for one scripting request.
#[derive(Debug, Clone)]
pub struct ScriptRequest<'a> {
    pub product: &'a str,
    pub style: ScriptStyle,
    pub language: Language,
    pub detail: &'a str,
    pub duration_secs: u32,
    pub image: Option<&'a EncodedImage>,
}

fn build_messages(req: &ScriptRequest<'_>) -> Value {
    let detail = trim_copy_utf8_safe(req.detail, MAX_DETAIL_BYTES);
    let text = script::script_request_text(
        req.product,
        req.style,
        req.language,
        &detail,
        req.duration_secs,
    );

    let user_content = match req.image {
        Some(image) => json!([
            {"type": "text", "text": text},
            {"type": "image_url", "image_url": {"url": image.as_str()}},
        ]),
        None => json!(text),
    };

    json!([
        {"role": "system", "content": "You are a senior short-video ad copywriter."},
        {"role": "user", "content": user_content},
    ])
}

/// Ask the LLM for a visual directive and narration separated by `|||`.
pub async fn openai_make_script(
    client: &Client,
    cfg: &Config,
    req: &ScriptRequest<'_>,
) -> JobResult<AdScript> {
    let body = json!({
        "model": cfg.script_model,
        "messages": build_messages(req),
    });

    let url = format!("{}/v1/chat/completions", cfg.openai_base.trim_end_matches('/'));
    let resp = client
        .post(url)
        .bearer_auth(&cfg.openai_key)
        .json(&body)
        .timeout(std::time::Duration::from_secs(120))
        .send()
        .await?;

    let status = resp.status();
    let raw = resp.text().await.unwrap_or_default();

    let out_text = openai_extract_message_text(&raw);
    if !status.is_success() || out_text.is_none() {
        logw(format!("OpenAI HTTP {}", status.as_u16()));
        if !raw.is_empty() {
            let snippet = raw.chars().take(RAW_SNIPPET).collect::<String>();
            logw(format!("OpenAI raw body: {}", snippet));
        }
        return Err(JobError::protocol(
            format!("no script in OpenAI reply (HTTP {})", status.as_u16()),
            raw,
        ));
    }

    let script = AdScript::parse(out_text.as_deref().unwrap_or_default());
    if script.narration.is_none() {
        logw("OpenAI reply had no narration part; using it as the visual directive only.");
    } else {
        logi(format!("OpenAI script received ({} chars)", script.directive.len()));
    }
    Ok(script)
}
