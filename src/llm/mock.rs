use std::collections::hash_map::DefaultHasher;
use std::collections::{HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::provider::LlmProvider;
use super::types::ChatRequest;
use crate::errors::ProviderError;

pub const MOCK_EMBEDDING_DIMS: usize = 2048;

/// Deterministic offline provider for tests.
///
/// Embeddings are hashed character unigram/bigram counts, so identical text
/// maps to identical vectors and overlapping text scores high cosine
/// similarity. Chat replies come from a scripted queue (echoing the last
/// user message when the queue is empty), and individual embedding calls can
/// be made to fail to exercise partial-batch handling.
pub struct MockProvider {
    dims: usize,
    embed_calls: AtomicUsize,
    chat_calls: AtomicUsize,
    fail_embed_calls: Mutex<HashSet<usize>>,
    chat_script: Mutex<VecDeque<Result<String, ProviderError>>>,
    json_script: Mutex<VecDeque<Result<String, ProviderError>>>,
    captured_chats: Mutex<Vec<ChatRequest>>,
    captured_json: Mutex<Vec<ChatRequest>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            dims: MOCK_EMBEDDING_DIMS,
            embed_calls: AtomicUsize::new(0),
            chat_calls: AtomicUsize::new(0),
            fail_embed_calls: Mutex::new(HashSet::new()),
            chat_script: Mutex::new(VecDeque::new()),
            json_script: Mutex::new(VecDeque::new()),
            captured_chats: Mutex::new(Vec::new()),
            captured_json: Mutex::new(Vec::new()),
        }
    }

    pub fn push_chat_reply(&self, reply: &str) {
        lock(&self.chat_script).push_back(Ok(reply.to_string()));
    }

    pub fn push_chat_error(&self, error: ProviderError) {
        lock(&self.chat_script).push_back(Err(error));
    }

    pub fn push_json_reply(&self, reply: &str) {
        lock(&self.json_script).push_back(Ok(reply.to_string()));
    }

    pub fn push_json_error(&self, error: ProviderError) {
        lock(&self.json_script).push_back(Err(error));
    }

    /// Make the n-th `embed_batch` call (0-based) fail.
    pub fn fail_embed_call(&self, call_index: usize) {
        lock(&self.fail_embed_calls).insert(call_index);
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    pub fn last_chat_request(&self) -> Option<ChatRequest> {
        lock(&self.captured_chats).last().cloned()
    }

    pub fn last_json_request(&self) -> Option<ChatRequest> {
        lock(&self.captured_json).last().cloned()
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        let chars: Vec<char> = text.chars().collect();
        for ch in &chars {
            vector[hash_bucket(ch, self.dims)] += 1.0;
        }
        for pair in chars.windows(2) {
            vector[hash_bucket(pair, self.dims)] += 1.0;
        }
        vector
    }

    fn echo_reply(request: &ChatRequest) -> String {
        request
            .messages
            .iter()
            .rev()
            .find(|message| message.role == "user")
            .map(|message| format!("已收到：{}", message.content))
            .unwrap_or_else(|| "好的。".to_string())
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, ProviderError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.captured_chats).push(request.clone());
        match lock(&self.chat_script).pop_front() {
            Some(scripted) => scripted,
            None => Ok(Self::echo_reply(&request)),
        }
    }

    async fn chat_json(&self, request: ChatRequest) -> Result<String, ProviderError> {
        lock(&self.captured_json).push(request.clone());
        match lock(&self.json_script).pop_front() {
            Some(scripted) => scripted,
            None => Ok(r#"{"score": 4, "improvement": "无"}"#.to_string()),
        }
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<String, ProviderError>>, ProviderError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.captured_chats).push(request.clone());
        let reply = match lock(&self.chat_script).pop_front() {
            Some(scripted) => scripted?,
            None => Self::echo_reply(&request),
        };

        let (tx, rx) = mpsc::channel(32);
        let chunks: Vec<String> = reply
            .chars()
            .collect::<Vec<_>>()
            .chunks(4)
            .map(|chunk| chunk.iter().collect())
            .collect();

        tokio::spawn(async move {
            for chunk in chunks {
                if tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }
        });

        Ok(rx)
    }

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let call_index = self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if lock(&self.fail_embed_calls).contains(&call_index) {
            return Err(ProviderError::Unreachable(format!(
                "injected embedding failure for call {call_index}"
            )));
        }

        Ok(inputs.iter().map(|text| self.embed_text(text)).collect())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn hash_bucket<T: Hash + ?Sized>(unit: &T, dims: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    unit.hash(&mut hasher);
    (hasher.finish() % dims as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ChatMessage;

    #[test]
    fn the_mock_identifies_itself() {
        assert_eq!(MockProvider::new().name(), "mock");
    }

    #[tokio::test]
    async fn embeddings_are_deterministic() {
        let provider = MockProvider::new();
        let inputs = vec!["你好世界".to_string(), "再见".to_string()];

        let first = provider.embed_batch(&inputs).await.unwrap();
        let second = provider.embed_batch(&inputs).await.unwrap();

        assert_eq!(first, second);
        assert_ne!(first[0], first[1]);
    }

    #[tokio::test]
    async fn overlapping_text_scores_higher_than_disjoint() {
        let provider = MockProvider::new();
        let inputs = vec![
            "退货运费谁承担".to_string(),
            "运费由卖家承担。".to_string(),
            "今天天气很好。".to_string(),
        ];
        let vectors = provider.embed_batch(&inputs).await.unwrap();

        let related = crate::knowledge::similarity::cosine_similarity(&vectors[0], &vectors[1]);
        let unrelated = crate::knowledge::similarity::cosine_similarity(&vectors[0], &vectors[2]);
        assert!(related > unrelated);
    }

    #[tokio::test]
    async fn injected_failure_hits_only_the_named_call() {
        let provider = MockProvider::new();
        provider.fail_embed_call(1);
        let inputs = vec!["一段文本。".to_string()];

        assert!(provider.embed_batch(&inputs).await.is_ok());
        assert!(provider.embed_batch(&inputs).await.is_err());
        assert!(provider.embed_batch(&inputs).await.is_ok());
        assert_eq!(provider.embed_calls(), 3);
    }

    #[tokio::test]
    async fn scripted_replies_are_consumed_in_order() {
        let provider = MockProvider::new();
        provider.push_chat_reply("第一条");
        provider.push_chat_reply("第二条");

        let request = ChatRequest::new(vec![ChatMessage {
            role: "user".to_string(),
            content: "问题".to_string(),
        }]);

        assert_eq!(provider.chat(request.clone()).await.unwrap(), "第一条");
        assert_eq!(provider.chat(request.clone()).await.unwrap(), "第二条");
        // Queue drained, falls back to echoing the user message.
        assert_eq!(provider.chat(request).await.unwrap(), "已收到：问题");
    }
}
