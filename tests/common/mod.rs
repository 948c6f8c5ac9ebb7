//! Scripted browser and model fakes shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use pagehand::llm::{ChatCompletion, ChatOptions, ToolCall};
use pagehand::{
    Agent, AgentConfig, Backend, BrowserDriver, BrowserError, DomSnapshot, ElementHandle,
    ElementId, InferenceError, LanguageModelClient, Ledger, LlmProvider, LocatorMap,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Navigate(String),
    CurrentUrl,
    WaitUntilReady,
    FindElement(String),
    Click(String),
    Clear(String),
    Type(String, String),
    ScrollIntoView(String),
    ScrollToTop,
    SwitchWindow(String),
    CloseWindow,
    ProcessDom(Vec<usize>),
    ProcessAllDom,
    Screenshot { full_page: bool, quality: Option<u8> },
    Annotate(usize),
    ClearAnnotations,
    DebugDom(usize),
    CleanupDebug,
    SetDownloadDir(PathBuf),
}

/// Build one chunk from `(id, html, locator)` triples.
pub fn chunk(index: usize, total: usize, elements: &[(ElementId, &str, &str)]) -> DomSnapshot {
    let encoding = elements
        .iter()
        .map(|(id, html, _)| format!("{id}:{html}"))
        .collect::<Vec<_>>()
        .join("\n");
    let locator_map: LocatorMap = elements
        .iter()
        .map(|(id, _, locator)| (*id, locator.to_string()))
        .collect();
    DomSnapshot {
        encoding,
        locator_map,
        chunk: index,
        chunks: (0..total).collect(),
    }
}

struct Window {
    handle: String,
    url: String,
}

struct DriverState {
    windows: Vec<Window>,
    current: usize,
    calls: Vec<Call>,
    download_dir: Option<PathBuf>,
}

/// In-memory page. `process_dom` hands out the first chunk not yet seen.
pub struct FakeDriver {
    chunks: Vec<DomSnapshot>,
    full: DomSnapshot,
    missing: HashSet<String>,
    navigations: HashMap<String, String>,
    new_tabs: HashMap<String, String>,
    downloads: HashMap<String, String>,
    state: Mutex<DriverState>,
}

impl FakeDriver {
    pub fn new(url: &str) -> Self {
        Self {
            chunks: Vec::new(),
            full: DomSnapshot::default(),
            missing: HashSet::new(),
            navigations: HashMap::new(),
            new_tabs: HashMap::new(),
            downloads: HashMap::new(),
            state: Mutex::new(DriverState {
                windows: vec![Window {
                    handle: "main".into(),
                    url: url.into(),
                }],
                current: 0,
                calls: Vec::new(),
                download_dir: None,
            }),
        }
    }

    pub fn with_chunks(mut self, chunks: Vec<DomSnapshot>) -> Self {
        self.chunks = chunks;
        self
    }

    pub fn with_full_dom(mut self, full: DomSnapshot) -> Self {
        self.full = full;
        self
    }

    /// `locator` resolves in snapshots but not on the live page.
    pub fn missing(mut self, locator: &str) -> Self {
        self.missing.insert(locator.into());
        self
    }

    /// Clicking `locator` navigates the current window to `url`.
    pub fn navigates(mut self, locator: &str, url: &str) -> Self {
        self.navigations.insert(locator.into(), url.into());
        self
    }

    /// Clicking `locator` opens `url` in a new window.
    pub fn opens_tab(mut self, locator: &str, url: &str) -> Self {
        self.new_tabs.insert(locator.into(), url.into());
        self
    }

    /// Clicking `locator` saves `file_name` into the download directory.
    pub fn downloads(mut self, locator: &str, file_name: &str) -> Self {
        self.downloads.insert(locator.into(), file_name.into());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn dom_requests(&self) -> Vec<Vec<usize>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::ProcessDom(seen) => Some(seen),
                _ => None,
            })
            .collect()
    }

    pub fn window_count(&self) -> usize {
        self.state.lock().windows.len()
    }

    fn record(&self, call: Call) {
        self.state.lock().calls.push(call);
    }

    fn check(&self, element: &ElementHandle) -> Result<(), BrowserError> {
        if self.missing.contains(&element.locator) {
            return Err(BrowserError::ElementNotFound(element.locator.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.record(Call::Navigate(url.into()));
        let mut state = self.state.lock();
        let current = state.current;
        state.windows[current].url = url.into();
        Ok(())
    }

    async fn find_element(&self, locator: &str) -> Result<ElementHandle, BrowserError> {
        self.record(Call::FindElement(locator.into()));
        if self.missing.contains(locator) {
            return Err(BrowserError::ElementNotFound(locator.into()));
        }
        Ok(ElementHandle {
            locator: locator.into(),
        })
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), BrowserError> {
        self.check(element)?;
        self.record(Call::Click(element.locator.clone()));
        let mut state = self.state.lock();
        if let Some(url) = self.navigations.get(&element.locator) {
            let current = state.current;
            state.windows[current].url = url.clone();
        }
        if let (Some(name), Some(dir)) = (self.downloads.get(&element.locator), &state.download_dir) {
            std::fs::write(dir.join(name), b"%PDF-1.4").map_err(|e| BrowserError::Driver(e.to_string()))?;
        }
        if let Some(url) = self.new_tabs.get(&element.locator) {
            let handle = format!("tab-{}", state.windows.len());
            state.windows.push(Window {
                handle,
                url: url.clone(),
            });
        }
        Ok(())
    }

    async fn clear(&self, element: &ElementHandle) -> Result<(), BrowserError> {
        self.check(element)?;
        self.record(Call::Clear(element.locator.clone()));
        Ok(())
    }

    async fn type_text(&self, element: &ElementHandle, text: &str) -> Result<(), BrowserError> {
        self.check(element)?;
        self.record(Call::Type(element.locator.clone(), text.into()));
        Ok(())
    }

    async fn scroll_into_view(&self, element: &ElementHandle) -> Result<(), BrowserError> {
        self.record(Call::ScrollIntoView(element.locator.clone()));
        Ok(())
    }

    async fn scroll_to_top(&self) -> Result<(), BrowserError> {
        self.record(Call::ScrollToTop);
        Ok(())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        self.record(Call::CurrentUrl);
        let state = self.state.lock();
        Ok(state.windows[state.current].url.clone())
    }

    async fn window_handles(&self) -> Result<Vec<String>, BrowserError> {
        Ok(self
            .state
            .lock()
            .windows
            .iter()
            .map(|w| w.handle.clone())
            .collect())
    }

    async fn switch_window(&self, handle: &str) -> Result<(), BrowserError> {
        self.record(Call::SwitchWindow(handle.into()));
        let mut state = self.state.lock();
        let index = state
            .windows
            .iter()
            .position(|w| w.handle == handle)
            .ok_or_else(|| BrowserError::WindowNotFound(handle.into()))?;
        state.current = index;
        Ok(())
    }

    async fn close_window(&self) -> Result<(), BrowserError> {
        self.record(Call::CloseWindow);
        let mut state = self.state.lock();
        let current = state.current;
        state.windows.remove(current);
        state.current = 0;
        Ok(())
    }

    async fn wait_until_ready(&self, _timeout: Duration) -> Result<bool, BrowserError> {
        self.record(Call::WaitUntilReady);
        Ok(true)
    }

    async fn process_dom(&self, chunks_seen: &[usize]) -> Result<DomSnapshot, BrowserError> {
        self.record(Call::ProcessDom(chunks_seen.to_vec()));
        self.chunks
            .iter()
            .find(|c| !chunks_seen.contains(&c.chunk))
            .or(self.chunks.last())
            .cloned()
            .ok_or_else(|| BrowserError::Script("page has no chunks".into()))
    }

    async fn process_all_dom(&self) -> Result<DomSnapshot, BrowserError> {
        self.record(Call::ProcessAllDom);
        Ok(self.full.clone())
    }

    async fn screenshot(&self, full_page: bool, quality: Option<u8>) -> Result<Vec<u8>, BrowserError> {
        self.record(Call::Screenshot { full_page, quality });
        Ok(vec![0xFF, 0xD8, 0xFF])
    }

    async fn annotate_elements(&self, locators: &LocatorMap) -> Result<(), BrowserError> {
        self.record(Call::Annotate(locators.len()));
        Ok(())
    }

    async fn clear_annotations(&self) -> Result<(), BrowserError> {
        self.record(Call::ClearAnnotations);
        Ok(())
    }

    async fn start_dom_debug(&self, _locators: &LocatorMap, chunk: usize) -> Result<(), BrowserError> {
        self.record(Call::DebugDom(chunk));
        Ok(())
    }

    async fn cleanup_dom_debug(&self) -> Result<(), BrowserError> {
        self.record(Call::CleanupDebug);
        Ok(())
    }

    async fn set_download_dir(&self, dir: &Path) -> Result<(), BrowserError> {
        self.record(Call::SetDownloadDir(dir.to_path_buf()));
        self.state.lock().download_dir = Some(dir.to_path_buf());
        Ok(())
    }
}

/// Model that replays queued answers and records every request.
///
/// An exhausted chat queue answers with no tool calls; an exhausted
/// extraction queue answers with an empty response error.
#[derive(Default)]
pub struct ScriptedClient {
    chats: Mutex<VecDeque<Result<ChatCompletion, InferenceError>>>,
    extractions: Mutex<VecDeque<Result<Value, InferenceError>>>,
    chat_requests: Mutex<Vec<ChatOptions>>,
    extraction_requests: Mutex<Vec<ChatOptions>>,
}

impl ScriptedClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_chat(&self, completion: ChatCompletion) -> &Self {
        self.chats.lock().push_back(Ok(completion));
        self
    }

    pub fn push_chat_error(&self, error: InferenceError) -> &Self {
        self.chats.lock().push_back(Err(error));
        self
    }

    pub fn push_extraction(&self, value: Value) -> &Self {
        self.extractions.lock().push_back(Ok(value));
        self
    }

    pub fn push_extraction_error(&self, error: InferenceError) -> &Self {
        self.extractions.lock().push_back(Err(error));
        self
    }

    pub fn chat_requests(&self) -> Vec<ChatOptions> {
        self.chat_requests.lock().clone()
    }

    pub fn extraction_requests(&self) -> Vec<ChatOptions> {
        self.extraction_requests.lock().clone()
    }
}

#[async_trait]
impl LanguageModelClient for ScriptedClient {
    async fn chat_completion(&self, options: ChatOptions) -> Result<ChatCompletion, InferenceError> {
        self.chat_requests.lock().push(options);
        self.chats
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(ChatCompletion::default()))
    }

    async fn structured_extraction(
        &self,
        options: ChatOptions,
        _schema: &Value,
    ) -> Result<Value, InferenceError> {
        self.extraction_requests.lock().push(options);
        self.extractions
            .lock()
            .pop_front()
            .unwrap_or(Err(InferenceError::EmptyResponse))
    }
}

pub fn do_action(element: ElementId, method: &str, args: &[&str], completed: bool) -> ChatCompletion {
    ChatCompletion {
        tool_calls: vec![ToolCall {
            name: "doAction".into(),
            arguments: json!({
                "method": method,
                "element": element,
                "args": args,
                "step": format!("{method} element {element}"),
                "why": "it moves toward the goal",
                "completed": completed,
            }),
        }],
        ..Default::default()
    }
}

pub fn skip() -> ChatCompletion {
    ChatCompletion {
        tool_calls: vec![ToolCall {
            name: "skipSection".into(),
            arguments: json!({ "reason": "nothing relevant here" }),
        }],
        ..Default::default()
    }
}

pub fn text(content: &str) -> ChatCompletion {
    ChatCompletion {
        content: Some(content.into()),
        ..Default::default()
    }
}

pub fn test_config() -> AgentConfig {
    AgentConfig::default()
        .with_typing_delay_ms(0..0)
        .with_timeouts(Duration::ZERO, Duration::ZERO)
}

pub fn agent(driver: &Arc<FakeDriver>, client: &Arc<ScriptedClient>) -> Agent {
    agent_with_config(driver, client, test_config())
}

pub fn agent_with_config(
    driver: &Arc<FakeDriver>,
    client: &Arc<ScriptedClient>,
    config: AgentConfig,
) -> Agent {
    let provider = LlmProvider::new().with_client(Backend::OpenAI, client.clone());
    Agent::with_ledger(
        driver.clone(),
        provider,
        Arc::new(Ledger::in_memory()),
        config,
    )
}
