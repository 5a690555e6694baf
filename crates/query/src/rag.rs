use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use index::{Metadata, RetrievedResult};

use crate::llm::{ChatMessage, LlmError, Usage};
use crate::registry::ProviderRegistry;
use crate::retrieval::Retriever;
use crate::retry::RetryPolicy;

const ANSWER_SYSTEM_PROMPT: &str = "你是一个专业的知识问答助手。请根据提供的文档片段回答用户问题。

要求：
1. 只基于提供的文档片段回答，不要编造信息
2. 如果文档中没有相关信息，请明确说明
3. 引用具体片段时，标注片段编号
4. 回答要简洁、准确、有条理
5. 使用中文回答";

const SUMMARY_SYSTEM_PROMPT: &str = "你是一个专业的文档摘要助手。请用中文生成简洁、准确的摘要。";

const UNAVAILABLE_ANSWER: &str = "抱歉，AI问答功能当前不可用。您可以查看检索到的相关文档片段。";
const NO_CONTEXT: &str = "没有找到相关上下文。";

const ANSWER_TEMPERATURE: f32 = 0.3;
const ANSWER_MAX_TOKENS: u32 = 1000;
const SUMMARY_CHUNKS: usize = 10;

pub const SUMMARY_LENGTH_RANGE: std::ops::RangeInclusive<usize> = 100..=2000;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("max_length must be between 100 and 2000, got {0}")]
    InvalidLength(usize),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("retrieval failed: {0}")]
    Retrieval(#[source] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub chunk_id: String,
    pub text: String,
    pub score: f32,
    pub metadata: Metadata,
}

impl From<RetrievedResult> for Source {
    fn from(result: RetrievedResult) -> Self {
        Self {
            score: result.rank_score(),
            chunk_id: result.id,
            text: result.text,
            metadata: result.metadata,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question: String,
    pub answer: String,
    pub sources: Vec<Source>,
    pub confidence: f32,
    pub model: String,
    pub provider: String,
    pub usage: Usage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub summary: String,
    pub document_id: String,
    pub chunks_used: usize,
    pub model: String,
    pub provider: String,
}

/// Render retrieved chunks as numbered context blocks.
pub fn format_context(contexts: &[RetrievedResult]) -> String {
    if contexts.is_empty() {
        return NO_CONTEXT.to_string();
    }
    contexts
        .iter()
        .enumerate()
        .map(|(i, ctx)| format!("[片段 {}] (相关度: {:.2})\n{}", i + 1, ctx.rank_score(), ctx.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn answer_prompt(question: &str, context: &str) -> String {
    format!("参考文档：\n{context}\n\n问题：{question}\n\n请基于上述文档回答问题。")
}

/// Retrieval-augmented question answering over the vector index.
pub struct RagEngine {
    retriever: Retriever,
    registry: Arc<ProviderRegistry>,
    retry: RetryPolicy,
    semantic_weight: f32,
}

impl RagEngine {
    pub fn new(retriever: Retriever, registry: Arc<ProviderRegistry>) -> Self {
        Self {
            retriever,
            registry,
            retry: RetryPolicy::default(),
            semantic_weight: 0.7,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_semantic_weight(mut self, semantic_weight: f32) -> Self {
        self.semantic_weight = semantic_weight.clamp(0.0, 1.0);
        self
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Document-scoped search when `document_id` is set, otherwise hybrid
    /// or plain semantic search. Failures degrade to no context.
    pub async fn retrieve_context(
        &self,
        question: &str,
        top_k: usize,
        document_id: Option<&str>,
        use_hybrid: bool,
    ) -> Vec<RetrievedResult> {
        let retrieved = match document_id {
            Some(id) => self.retriever.search(question, top_k, Some(id)).await,
            None if use_hybrid => {
                self.retriever
                    .hybrid_search(question, top_k, self.semantic_weight)
                    .await
            }
            None => self.retriever.search(question, top_k, None).await,
        };

        match retrieved {
            Ok(contexts) => {
                info!(chunks = contexts.len(), "Retrieved context chunks");
                contexts
            }
            Err(e) => {
                error!(error = %e, "Context retrieval failed");
                Vec::new()
            }
        }
    }

    pub async fn ask(
        &self,
        question: &str,
        document_id: Option<&str>,
        top_k: usize,
        use_hybrid: bool,
    ) -> Answer {
        let contexts = self
            .retrieve_context(question, top_k, document_id, use_hybrid)
            .await;

        let mut answer = Answer {
            question: question.to_string(),
            answer: String::new(),
            sources: Vec::new(),
            confidence: 0.0,
            model: "none".to_string(),
            provider: "none".to_string(),
            usage: Usage::default(),
            error: None,
        };

        // Held for the whole request; a concurrent switch does not affect it.
        let Some(client) = self.registry.snapshot().await else {
            warn!("No LLM provider available, returning sources only");
            answer.answer = UNAVAILABLE_ANSWER.to_string();
            answer.error = Some(LlmError::NoProvider.to_string());
            answer.sources = contexts.into_iter().map(Source::from).collect();
            return answer;
        };
        answer.model = client.model().to_string();
        answer.provider = client.provider().to_string();

        let messages = [
            ChatMessage::system(ANSWER_SYSTEM_PROMPT),
            ChatMessage::user(answer_prompt(question, &format_context(&contexts))),
        ];
        let completion = self
            .retry
            .retry("chat_completion", || {
                client.chat_completion(&messages, ANSWER_TEMPERATURE, ANSWER_MAX_TOKENS)
            })
            .await;

        answer.sources = contexts.into_iter().map(Source::from).collect();
        match completion {
            Ok(completion) => {
                answer.answer = completion.content;
                answer.usage = completion.usage;
                answer.confidence = mean_score(&answer.sources);
            }
            Err(e) => {
                error!(provider = %answer.provider, error = %e, "Answer generation failed");
                answer.answer = format!("生成答案时出错: {e}");
                answer.error = Some(e.to_string());
            }
        }
        answer
    }

    /// Summarize a document from its first chunks.
    pub async fn summarize_document(
        &self,
        document_id: &str,
        max_length: usize,
    ) -> Result<Summary, RagError> {
        if !SUMMARY_LENGTH_RANGE.contains(&max_length) {
            return Err(RagError::InvalidLength(max_length));
        }
        let client = self.registry.snapshot().await.ok_or(LlmError::NoProvider)?;

        let chunks = self
            .retriever
            .index()
            .document_chunks(document_id)
            .await
            .map_err(RagError::Retrieval)?;
        if chunks.is_empty() {
            return Err(RagError::DocumentNotFound(document_id.to_string()));
        }

        let full_text = chunks
            .iter()
            .take(SUMMARY_CHUNKS)
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let messages = [
            ChatMessage::system(SUMMARY_SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "请为以下文档生成摘要（{max_length}字以内）：\n\n{full_text}"
            )),
        ];

        let completion = self
            .retry
            .retry("summarize", || {
                client.chat_completion(&messages, ANSWER_TEMPERATURE, max_length as u32)
            })
            .await?;

        info!(document_id, chunks = chunks.len(), "Generated summary");
        Ok(Summary {
            summary: completion.content,
            document_id: document_id.to_string(),
            chunks_used: chunks.len(),
            model: client.model().to_string(),
            provider: client.provider().to_string(),
        })
    }
}

fn mean_score(sources: &[Source]) -> f32 {
    if sources.is_empty() {
        return 0.0;
    }
    sources.iter().map(|s| s.score).sum::<f32>() / sources.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::scripted_registry;
    use index::{HashEmbedder, MemoryVectorStore, VectorIndex};
    use ingest::Chunk;

    async fn engine(registry: ProviderRegistry) -> RagEngine {
        let index = VectorIndex::new(
            Arc::new(MemoryVectorStore::new()),
            Arc::new(HashEmbedder::default()),
        );
        let texts = [
            "深度学习 是 机器学习 的 分支",
            "知识图谱 由 实体 和 关系 组成",
            "向量 检索 依赖 嵌入 模型",
        ];
        let chunks: Vec<Chunk> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| Chunk::new("doc1", i, t.to_string(), i * 20, i * 20 + t.chars().count()))
            .collect();
        index.add_chunks(&chunks, &Metadata::new()).await.unwrap();

        RagEngine::new(Retriever::new(index), Arc::new(registry)).with_retry(RetryPolicy::none())
    }

    #[test]
    fn test_format_context() {
        assert_eq!(format_context(&[]), "没有找到相关上下文。");

        let hit = RetrievedResult {
            id: "d_chunk0".to_string(),
            text: "知识图谱".to_string(),
            metadata: Metadata::new(),
            score: 0.5,
            keyword_score: Some(1.0),
            combined_score: Some(0.756),
        };
        assert_eq!(format_context(&[hit]), "[片段 1] (相关度: 0.76)\n知识图谱");
    }

    #[tokio::test]
    async fn test_ask_without_provider_keeps_sources() {
        let engine = engine(scripted_registry("unused")).await;
        let answer = engine.ask("知识图谱", None, 2, true).await;

        assert_eq!(answer.answer, UNAVAILABLE_ANSWER);
        assert!(answer.error.is_some());
        assert_eq!(answer.sources.len(), 2);
        assert_eq!(answer.model, "none");
        assert_eq!(answer.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_ask_with_provider() {
        let registry = scripted_registry("知识图谱由实体和关系组成 [片段 1]");
        registry.configure("qwen", "key", Some("qwen-plus")).await.unwrap();
        let engine = engine(registry).await;

        let answer = engine.ask("知识图谱", Some("doc1"), 3, true).await;
        assert_eq!(answer.answer, "知识图谱由实体和关系组成 [片段 1]");
        assert_eq!(answer.provider, "qwen");
        assert_eq!(answer.model, "qwen-plus");
        assert!(answer.error.is_none());
        assert_eq!(answer.sources.len(), 3);
        assert!(answer.usage.total_tokens > 0);

        let mean = answer.sources.iter().map(|s| s.score).sum::<f32>() / 3.0;
        assert!((answer.confidence - mean).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_generation_failure_is_reported() {
        let registry = scripted_registry("never");
        registry.configure("openai", "bad", None).await.unwrap();
        let engine = engine(registry).await;

        let answer = engine.ask("向量", None, 1, false).await;
        assert!(answer.answer.starts_with("生成答案时出错"));
        assert!(answer.error.is_some());
        assert_eq!(answer.sources.len(), 1);
    }

    #[tokio::test]
    async fn test_summarize() {
        let registry = scripted_registry("一篇关于知识图谱的文档。");
        let engine = engine(registry).await;

        assert!(matches!(
            engine.summarize_document("doc1", 500).await,
            Err(RagError::Llm(LlmError::NoProvider))
        ));

        engine.registry().configure("deepseek", "key", None).await.unwrap();
        let summary = engine.summarize_document("doc1", 500).await.unwrap();
        assert_eq!(summary.summary, "一篇关于知识图谱的文档。");
        assert_eq!(summary.chunks_used, 3);
        assert_eq!(summary.provider, "deepseek");

        assert!(matches!(
            engine.summarize_document("missing", 500).await,
            Err(RagError::DocumentNotFound(_))
        ));
        assert!(matches!(
            engine.summarize_document("doc1", 50).await,
            Err(RagError::InvalidLength(50))
        ));
    }
}
