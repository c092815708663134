use anyhow::{bail, Result};
use futures_util::TryStreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::ollama::OllamaClient;
use crate::scrape::{self, Website};
use crate::session::Message;
use crate::stream::{self, StreamUpdate};

/// Keep assembled page content within model limits.
const MAX_CONTENT_CHARS: usize = 5000;

pub const LINK_SYSTEM_PROMPT: &str = "\
You are provided with a list of links found on a webpage.
Decide which links are most relevant for a company brochure:
- About page
- Company info
- Careers/Jobs
- Customers
- Blog/Team

Respond only in JSON format like:
{
\"links\": [
    {\"type\": \"about page\", \"url\": \"https://site.com/about\"},
    {\"type\": \"careers page\", \"url\": \"https://site.com/jobs\"}
]
}";

pub const BROCHURE_SYSTEM_PROMPT: &str = "\
You are an assistant that analyzes the contents of company webpages
and creates a short brochure for prospective customers, investors, and recruits.

You MUST use the exact company name provided.
Respond in markdown format.

Include:
- Company mission & culture
- Customers (if available)
- Careers/jobs info (if found)
- Services or products offered";

/// The link set the model judged relevant for a brochure.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LinkSelection {
    pub links: Vec<SelectedLink>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SelectedLink {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

pub fn build_link_prompt(site: &Website) -> String {
    let mut prompt = format!("Here is a list of links found on {}:\n", site.url);
    prompt.push_str(&site.links.join("\n"));
    prompt
}

/// Parses the model's free-text reply into a link selection. Absent or
/// malformed JSON yields "no relevant links", never an error.
pub fn parse_link_selection(reply: &str) -> Option<LinkSelection> {
    let json = scrape::extract_json_object(reply)?;
    match serde_json::from_str(json) {
        Ok(selection) => Some(selection),
        Err(e) => {
            tracing::warn!("link selection returned malformed JSON: {}", e);
            None
        }
    }
}

/// Asks the chat model which of the page's links matter for a brochure.
async fn select_links(
    ollama: &OllamaClient,
    model: &str,
    site: &Website,
) -> Option<LinkSelection> {
    let messages = vec![
        Message::system(LINK_SYSTEM_PROMPT),
        Message::user(build_link_prompt(site)),
    ];

    match ollama.chat(model, &messages).await {
        Ok(reply) => parse_link_selection(&reply),
        Err(e) => {
            tracing::warn!("link extraction failed: {}", e);
            None
        }
    }
}

fn title_case(kind: &str) -> String {
    kind.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Main page plus every reachable model-selected subpage, capped at
/// `MAX_CONTENT_CHARS`. Empty when the main page yielded no text.
async fn gather_site_content(
    ollama: &OllamaClient,
    http: &reqwest::Client,
    model: &str,
    url: &str,
) -> String {
    let site = Website::fetch(http, url).await;
    if site.text.is_empty() {
        return String::new();
    }

    let mut result = format!("Main Page:\n{}", site.contents());

    if let Some(selection) = select_links(ollama, model, &site).await {
        for link in selection.links {
            if scrape::is_reachable(http, &link.url).await {
                let subpage = Website::fetch(http, &link.url).await;
                result.push_str(&format!(
                    "\n\n---\n{}:\n{}",
                    title_case(&link.kind),
                    subpage.contents()
                ));
            }
        }
    }

    result.chars().take(MAX_CONTENT_CHARS).collect()
}

fn build_brochure_prompt(company_name: &str, content: &str) -> String {
    format!(
        "The company name is: {}\n\
         You MUST use this exact name in the brochure.\n\
         Below are webpages from their site. Use this content to create a professional brochure:\n\
         {}",
        company_name, content
    )
}

async fn generate_inner(
    ollama: &OllamaClient,
    http: &reqwest::Client,
    model: &str,
    company_name: &str,
    url: &str,
    tx: &mpsc::Sender<StreamUpdate>,
) -> Result<String> {
    if !scrape::is_reachable(http, url).await {
        bail!("Website is not reachable.");
    }

    let content = gather_site_content(ollama, http, model, url).await;
    if content.is_empty() {
        bail!("Could not scrape website content.");
    }

    let messages = vec![
        Message::system(BROCHURE_SYSTEM_PROMPT),
        Message::user(build_brochure_prompt(company_name, &content)),
    ];

    ollama.ensure_model(model).await;
    let response = ollama.chat_stream(model, &messages).await?;
    let chunks = response
        .bytes_stream()
        .map_ok(|bytes| bytes.to_vec())
        .map_err(anyhow::Error::from);

    // The brochure is rendered as markdown; drop stray code fences per delta
    stream::pump(chunks, |delta| delta.replace("```", ""), tx).await
}

/// Worker entry point for the brochure screen. Sends exactly one terminal
/// update on every exit path.
pub async fn generate(
    ollama: OllamaClient,
    http: reqwest::Client,
    model: String,
    company_name: String,
    url: String,
    tx: mpsc::Sender<StreamUpdate>,
) {
    match generate_inner(&ollama, &http, &model, &company_name, &url, &tx).await {
        Ok(full) => {
            let _ = tx.send(StreamUpdate::Done(full)).await;
        }
        Err(e) => {
            let _ = tx.send(StreamUpdate::Failed(format!("Error: {}", e))).await;
        }
    }
}
