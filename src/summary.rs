use anyhow::{bail, Result};
use futures_util::TryStreamExt;
use tokio::sync::mpsc;

use crate::ollama::OllamaClient;
use crate::scrape::Website;
use crate::session::Message;
use crate::stream::{self, StreamUpdate};

pub const SUMMARY_SYSTEM_PROMPT: &str = "\
You are an assistant that analyzes the contents of a website \
and provides a short summary, ignoring text that might be navigation related. \
Respond in markdown.";

pub fn build_summary_prompt(site: &Website) -> String {
    let mut prompt = format!("You are looking at a website titled {}", site.title);
    prompt.push_str(
        "\nThe contents of this website is as follows; \
         please provide a short summary of this website in markdown. \
         If it includes news or announcements, then summarize these too.\n\n",
    );
    prompt.push_str(&site.text);
    prompt
}

async fn summarize_inner(
    ollama: &OllamaClient,
    http: &reqwest::Client,
    model: &str,
    url: &str,
    tx: &mpsc::Sender<StreamUpdate>,
) -> Result<String> {
    let site = Website::fetch(http, url).await;
    if site.text.is_empty() {
        bail!("Could not fetch website content.");
    }

    let messages = vec![
        Message::system(SUMMARY_SYSTEM_PROMPT),
        Message::user(build_summary_prompt(&site)),
    ];

    ollama.ensure_model(model).await;
    let response = ollama.chat_stream(model, &messages).await?;
    let chunks = response
        .bytes_stream()
        .map_ok(|bytes| bytes.to_vec())
        .map_err(anyhow::Error::from);

    stream::pump(chunks, |delta| delta.to_string(), tx).await
}

/// Worker entry point for the summary screen. Sends exactly one terminal
/// update on every exit path.
pub async fn summarize(
    ollama: OllamaClient,
    http: reqwest::Client,
    model: String,
    url: String,
    tx: mpsc::Sender<StreamUpdate>,
) {
    match summarize_inner(&ollama, &http, &model, &url, &tx).await {
        Ok(full) => {
            let _ = tx.send(StreamUpdate::Done(full)).await;
        }
        Err(e) => {
            let _ = tx.send(StreamUpdate::Failed(format!("Error: {}", e))).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_prompt_carries_title_and_text() {
        let site = Website {
            url: "https://acme.test".into(),
            title: "Acme Corp".into(),
            text: "We make anvils.".into(),
            links: Vec::new(),
        };

        let prompt = build_summary_prompt(&site);
        assert!(prompt.starts_with("You are looking at a website titled Acme Corp\n"));
        assert!(prompt.contains("short summary of this website in markdown"));
        assert!(prompt.ends_with("We make anvils."));
    }
}
