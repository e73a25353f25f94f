use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::multipart::{Form, Part};
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::store::{encode_documents, DocumentRecord, CORPUS_BLOB_KEY};

use super::{AnswerEngine, SUMMARY_MAX_TOKENS};

const DEFAULT_TIMEOUT_SECS: u64 = 60;

const SUMMARY_TEMPERATURE: f32 = 0.50;
const ANSWER_TEMPERATURE: f32 = 0.45;
const ANSWER_MAX_TOKENS: u32 = 120;

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub summary_model: String,
    pub answer_model: String,
    pub timeout: Duration,
}

impl OpenAiConfig {
    /// All settings come from the startup [`AppConfig`]; nothing is read from
    /// the environment here.
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            api_key: config.openai_api_key.clone(),
            base_url: config.openai_base_url.clone(),
            summary_model: config.openai_summary_model.clone(),
            answer_model: config.openai_answer_model.clone(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Production Answer Engine backed by the OpenAI HTTP API.
#[derive(Clone)]
pub struct OpenAiEngine {
    http: HttpClient,
    cfg: OpenAiConfig,
}

impl OpenAiEngine {
    pub fn new(cfg: OpenAiConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(cfg.timeout)
            .build()
            .context("build http client")?;
        Ok(Self { http, cfg })
    }

    fn api_key(&self) -> Result<&str> {
        self.cfg
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("OPENAI_API_KEY is not set"))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.cfg.base_url.trim_end_matches('/'), path)
    }

    async fn chat(&self, request: &ChatRequest) -> Result<String> {
        let response = self
            .http
            .post(self.endpoint("chat/completions"))
            .bearer_auth(self.api_key()?)
            .json(request)
            .send()
            .await
            .context("send chat request")?;

        let status = response.status();
        let bytes = response.bytes().await.context("read chat response")?;
        if !status.is_success() {
            return Err(api_error(status, &bytes));
        }

        let parsed: ChatResponse =
            serde_json::from_slice(&bytes).context("decode chat response")?;
        let content = parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .unwrap_or_default();
        Ok(content)
    }

    async fn find_corpus_file_id(&self) -> Result<Option<String>> {
        let response = self
            .http
            .get(self.endpoint("files"))
            .bearer_auth(self.api_key()?)
            .send()
            .await
            .context("list files")?;

        let status = response.status();
        let bytes = response.bytes().await.context("read files response")?;
        if !status.is_success() {
            return Err(api_error(status, &bytes));
        }

        let parsed: FilesResponse =
            serde_json::from_slice(&bytes).context("decode files response")?;
        Ok(parsed
            .data
            .into_iter()
            .find(|file| file.filename == CORPUS_BLOB_KEY)
            .map(|file| file.id))
    }
}

#[async_trait]
impl AnswerEngine for OpenAiEngine {
    async fn summarize(&self, text: &str) -> Result<String, PipelineError> {
        let request = ChatRequest {
            model: self.cfg.summary_model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: Some(format!("{text}\n\ntl;dr:")),
            }],
            max_tokens: Some(SUMMARY_MAX_TOKENS as u32),
            temperature: SUMMARY_TEMPERATURE,
            top_p: 1.0,
            user: None,
        };
        let content = self.chat(&request).await.map_err(PipelineError::Summarize)?;
        Ok(format_sentence(&content))
    }

    async fn index_corpus(&self, documents: &[DocumentRecord]) -> Result<(), PipelineError> {
        let expanded = split_into_paragraph_documents(documents);
        let body = encode_documents(&expanded).map_err(|e| PipelineError::Index(e.into()))?;

        let form = Form::new().text("purpose", "answers").part(
            "file",
            Part::bytes(body.into_bytes()).file_name(CORPUS_BLOB_KEY),
        );

        let run = async {
            let response = self
                .http
                .post(self.endpoint("files"))
                .bearer_auth(self.api_key()?)
                .multipart(form)
                .send()
                .await
                .context("upload corpus file")?;
            let status = response.status();
            if !status.is_success() {
                let bytes = response.bytes().await.unwrap_or_default();
                return Err(api_error(status, &bytes));
            }
            Ok(())
        };
        run.await.map_err(PipelineError::Index)
    }

    async fn answer(
        &self,
        question: &str,
        user_id: Option<&str>,
    ) -> Result<String, PipelineError> {
        let file_id = self
            .find_corpus_file_id()
            .await
            .map_err(PipelineError::Answer)?
            .ok_or_else(|| {
                PipelineError::Answer(anyhow!("corpus file not indexed yet; run a sync first"))
            })?;

        let request = AnswerRequest {
            model: self.cfg.answer_model.clone(),
            question: question.to_string(),
            examples: vec![
                [
                    "What is the secret to a successful startup?".to_string(),
                    "What you need to succeed in a startup is not expertise in startups. \
                     What you need is expertise in your own users."
                        .to_string(),
                ],
                [
                    "What do I do to grow my company?".to_string(),
                    "The way to make your startup grow, is to make something users really love."
                        .to_string(),
                ],
            ],
            examples_context: "Users are the most important thing to a startup.".to_string(),
            file: file_id,
            max_tokens: ANSWER_MAX_TOKENS,
            temperature: ANSWER_TEMPERATURE,
            user: user_id.map(str::to_string),
        };

        let run = async {
            let response = self
                .http
                .post(self.endpoint("answers"))
                .bearer_auth(self.api_key()?)
                .json(&request)
                .send()
                .await
                .context("send answer request")?;
            let status = response.status();
            let bytes = response.bytes().await.context("read answer response")?;
            if !status.is_success() {
                return Err(api_error(status, &bytes));
            }
            let parsed: AnswerResponse =
                serde_json::from_slice(&bytes).context("decode answer response")?;
            Ok(parsed.answers.into_iter().next_back().unwrap_or_default())
        };
        let answer = run.await.map_err(PipelineError::Answer)?;
        Ok(format_sentence(&answer))
    }
}

fn api_error(status: reqwest::StatusCode, bytes: &[u8]) -> anyhow::Error {
    let message = serde_json::from_slice::<ApiErrorEnvelope>(bytes)
        .map(|env| env.error.message)
        .unwrap_or_else(|_| "unknown error".to_string());
    anyhow!("api error {status}: {message}")
}

/// The indexing endpoint scores short passages, so each document is split on
/// sentence boundaries into paragraph-sized entries sharing the document id.
fn split_into_paragraph_documents(documents: &[DocumentRecord]) -> Vec<DocumentRecord> {
    let boundary = Regex::new(r"\w\.\s*\w").expect("static regex");
    let mut out = Vec::new();
    for document in documents {
        let marked = boundary.replace_all(&document.text, |caps: &regex::Captures<'_>| {
            caps[0].replacen('.', ".\n", 1).replace(char::is_whitespace, "\n")
        });
        for paragraph in marked.split(".\n") {
            let paragraph = paragraph.trim().replace('\n', " ");
            if paragraph.is_empty() {
                continue;
            }
            out.push(DocumentRecord::new(document.id.clone(), paragraph));
        }
    }
    out
}

/// Trim, capitalize, and close the model output as a sentence.
fn format_sentence(input: &str) -> String {
    let trimmed = input.trim();
    let mut chars = trimmed.chars();
    let Some(first) = chars.next() else { return String::new() };
    let mut out: String = first.to_uppercase().collect();
    out.push_str(chars.as_str());
    if !out.ends_with('.') {
        out.push('.');
    }
    out
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Serialize)]
struct AnswerRequest {
    model: String,
    question: String,
    examples: Vec<[String; 2]>,
    examples_context: String,
    file: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnswerResponse {
    #[serde(default)]
    answers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FilesResponse {
    #[serde(default)]
    data: Vec<FileEntry>,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    id: String,
    filename: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}
