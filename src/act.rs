//! The act loop.
//!
//! Each iteration takes the current [`ActState`] by value and returns a
//! [`Transition`]: fetch the next chunk, ask the model for an action,
//! execute it, optionally verify completion, then continue or finish.

use tracing::{debug, info, warn};

use crate::browser::{BrowserDriver, ElementHandle};
use crate::config::AgentConfig;
use crate::error::{Error, Result};
use crate::inference::InferenceGateway;
use crate::ledger::Ledger;
use crate::types::{
    ActOptions, ActResult, ActionDecision, DomSnapshot, MAX_RETRIES, Method, SCROLLED_STEP,
    VisionMode,
};
use crate::vision::ScreenshotService;

const NOT_COMPLETED: &str = "Action was not able to be completed.";

#[derive(Debug)]
struct ActState {
    /// Narrative of the steps taken so far, fed back to the model.
    steps: String,
    chunks_seen: Vec<usize>,
    vision: VisionMode,
    verifier_vision: bool,
    /// Consecutive faults on the current decision.
    retries: u32,
    actions_taken: usize,
}

impl ActState {
    fn retry(self) -> Self {
        Self {
            steps: String::new(),
            retries: self.retries + 1,
            ..self
        }
    }
}

enum Transition {
    Continue(ActState),
    Finish(ActResult),
}

enum Execution {
    Done { url_change: Option<String> },
    InvalidMethod,
}

pub struct ActionController<'a> {
    driver: &'a dyn BrowserDriver,
    gateway: &'a InferenceGateway,
    ledger: &'a Ledger,
    config: &'a AgentConfig,
}

impl<'a> ActionController<'a> {
    pub fn new(
        driver: &'a dyn BrowserDriver,
        gateway: &'a InferenceGateway,
        ledger: &'a Ledger,
        config: &'a AgentConfig,
    ) -> Self {
        Self {
            driver,
            gateway,
            ledger,
            config,
        }
    }

    /// Drive the page toward `goal`.
    ///
    /// Expected negative outcomes come back as an unsuccessful [`ActResult`];
    /// only configuration and transport faults are errors.
    pub async fn act(&self, goal: &str, options: &ActOptions) -> Result<ActResult> {
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.config.default_model.clone());
        self.gateway.provider().client(&model)?;

        let mut vision = options.vision;
        let mut verifier_vision = vision == VisionMode::On;
        if vision != VisionMode::Off && !self.gateway.supports_vision(&model) {
            warn!(
                category = "action",
                "{model} does not support vision, but vision was set to {vision:?}. Defaulting to off."
            );
            vision = VisionMode::Off;
            verifier_vision = false;
        }

        let mut state = ActState {
            steps: String::new(),
            chunks_seen: Vec::new(),
            vision,
            verifier_vision,
            retries: 0,
            actions_taken: 0,
        };

        loop {
            if state.actions_taken >= self.config.max_steps_per_act {
                warn!(category = "action", "Step limit reached");
                return Ok(ActResult::failure(
                    goal,
                    format!(
                        "Reached maximum step limit ({})",
                        self.config.max_steps_per_act
                    ),
                ));
            }
            match self.advance(goal, &model, state).await? {
                Transition::Continue(next) => state = next,
                Transition::Finish(result) => return Ok(result),
            }
        }
    }

    async fn advance(&self, goal: &str, model: &str, state: ActState) -> Result<Transition> {
        let url = self.driver.current_url().await?;
        debug!(category = "action", "Running / Continuing action: {goal} on page: {url}");
        self.settle().await;

        let snapshot = self.driver.process_dom(&state.chunks_seen).await?;
        info!(
            category = "action",
            "Looking at chunk {}. Chunks left: {}",
            snapshot.chunk,
            snapshot.chunks_total().saturating_sub(state.chunks_seen.len())
        );

        if self.config.debug_dom {
            if let Err(e) = self
                .driver
                .start_dom_debug(&snapshot.locator_map, snapshot.chunk)
                .await
            {
                warn!(category = "action", "Failed to outline chunk: {e}");
            }
        }

        let screenshot = if state.vision == VisionMode::On {
            Some(
                ScreenshotService::new(self.driver)
                    .annotated_screenshot(&snapshot.locator_map)
                    .await?,
            )
        } else {
            None
        };

        let decision = self
            .gateway
            .decide_action(model, goal, &state.steps, &snapshot.encoding, screenshot)
            .await;
        if self.config.debug_dom {
            if let Err(e) = self.driver.cleanup_dom_debug().await {
                warn!(category = "action", "Failed to remove chunk outline: {e}");
            }
        }
        let decision = decision?;

        match decision {
            None => self.skip_chunk(goal, state, &snapshot).await,
            Some(decision) => self.perform(goal, model, state, &snapshot, decision).await,
        }
    }

    async fn skip_chunk(
        &self,
        goal: &str,
        mut state: ActState,
        snapshot: &DomSnapshot,
    ) -> Result<Transition> {
        if state.chunks_seen.len() + 1 < snapshot.chunks_total() {
            state.chunks_seen.push(snapshot.chunk);
            state.steps.push_str(SCROLLED_STEP);
            info!(
                category = "action",
                "No action found in current chunk. Chunks seen: {}.",
                state.chunks_seen.len()
            );
            return Ok(Transition::Continue(state));
        }

        if state.vision == VisionMode::Fallback {
            info!(category = "action", "Switching to vision-based processing");
            self.driver.scroll_to_top().await?;
            return Ok(Transition::Continue(ActState {
                steps: String::new(),
                chunks_seen: Vec::new(),
                vision: VisionMode::On,
                ..state
            }));
        }

        Ok(Transition::Finish(ActResult::failure(goal, NOT_COMPLETED)))
    }

    async fn perform(
        &self,
        goal: &str,
        model: &str,
        state: ActState,
        snapshot: &DomSnapshot,
        decision: ActionDecision,
    ) -> Result<Transition> {
        info!(
            category = "action",
            "Executing method: {} on element: {} with args: {:?}",
            decision.method,
            decision.element,
            decision.args
        );

        let url_change = match self.execute(&decision, snapshot).await {
            Ok(Execution::Done { url_change }) => url_change,
            Ok(Execution::InvalidMethod) => {
                warn!(category = "action", "Chosen method {} is invalid", decision.method);
                if state.retries < MAX_RETRIES {
                    return Ok(Transition::Continue(state.retry()));
                }
                return Ok(Transition::Finish(ActResult::failure(
                    goal,
                    format!("Internal error: Chosen method {} is invalid", decision.method),
                )));
            }
            Err(e) => {
                warn!(
                    category = "action",
                    "Error performing action (Retries: {}): {e}", state.retries
                );
                if state.retries < MAX_RETRIES {
                    return Ok(Transition::Continue(state.retry()));
                }
                self.remember(goal, "");
                return Ok(Transition::Finish(ActResult::failure(
                    goal,
                    format!("Error performing action: {e}"),
                )));
            }
        };

        let element_text = snapshot
            .element_text(decision.element)
            .unwrap_or("Element not found");
        let mut steps = state.steps;
        steps.push_str(&format!(
            "## Step: {}\n  Element: {}\n  Action: {}\n  Reasoning: {}\n",
            decision.step, element_text, decision.method, decision.why
        ));
        if let Some(url) = url_change {
            steps.push_str(&format!("  Result (Important): New page with URL: {url}\n\n"));
        }

        if decision.completed {
            info!(category = "action", "Action marked as completed, Verifying if this is true...");
            let completed = self
                .verify(goal, model, &steps, state.verifier_vision)
                .await?;
            info!(category = "action", "Action completion verification result: {completed}");
            if completed {
                info!(category = "action", "Action completed successfully");
                self.remember(goal, &decision.step);
                return Ok(Transition::Finish(ActResult {
                    success: true,
                    message: format!("Action completed successfully: {steps}"),
                    action: goal.to_string(),
                }));
            }
        }

        info!(category = "action", "Continuing to next action step");
        Ok(Transition::Continue(ActState {
            steps,
            retries: 0,
            actions_taken: state.actions_taken + 1,
            ..state
        }))
    }

    async fn execute(&self, decision: &ActionDecision, snapshot: &DomSnapshot) -> Result<Execution> {
        if let Method::Other(_) = decision.method {
            return Ok(Execution::InvalidMethod);
        }

        let locator = snapshot
            .locator_map
            .get(&decision.element)
            .ok_or(Error::UnknownElement(decision.element))?;
        debug!(category = "action", %locator, "Resolving element {}", decision.element);
        let element = self.driver.find_element(locator).await?;

        let url_change = match &decision.method {
            Method::ScrollIntoView => {
                debug!(category = "action", "Scrolling element into view");
                if let Err(e) = self.driver.scroll_into_view(&element).await {
                    warn!(category = "action", "Error scrolling element into view: {e}");
                }
                None
            }
            Method::Click => {
                debug!(category = "action", "Clicking element");
                self.click(&element).await?
            }
            Method::Fill | Method::Type => {
                let text = decision
                    .args
                    .first()
                    .ok_or_else(|| Error::MissingArgument(decision.method.to_string()))?;
                self.fill(&element, text).await?;
                None
            }
            Method::Other(_) => return Ok(Execution::InvalidMethod),
        };
        Ok(Execution::Done { url_change })
    }

    /// Click and follow any navigation. Returns the new URL if the page changed.
    async fn click(&self, element: &ElementHandle) -> Result<Option<String>> {
        let initial_url = self.driver.current_url().await?;
        self.driver.click(element).await?;

        let handles = self.driver.window_handles().await?;
        if let [original, .., newest] = handles.as_slice() {
            self.driver.switch_window(newest).await?;
            let new_url = self.driver.current_url().await?;
            info!(category = "action", "New page detected (new tab) with URL: {new_url}");
            self.driver.close_window().await?;
            self.driver.switch_window(original).await?;
            self.driver.navigate(&new_url).await?;
            self.settle().await;
        }

        match self
            .driver
            .wait_until_ready(self.config.navigation_timeout)
            .await
        {
            Ok(true) => {}
            Ok(false) => info!(category = "action", "Network idle timeout hit"),
            Err(e) => warn!(category = "action", "Waiting for page readiness failed: {e}"),
        }
        info!(category = "action", "Finished waiting for (possible) page navigation");

        let url = self.driver.current_url().await?;
        if url == initial_url {
            return Ok(None);
        }
        info!(category = "action", "New page detected with URL: {url}");
        Ok(Some(url))
    }

    /// Clear, focus, then type one character at a time with jitter.
    async fn fill(&self, element: &ElementHandle, text: &str) -> Result<()> {
        self.driver.clear(element).await?;
        self.driver.click(element).await?;
        let mut buf = [0u8; 4];
        for ch in text.chars() {
            self.driver
                .type_text(element, ch.encode_utf8(&mut buf))
                .await?;
            tokio::time::sleep(self.config.typing_jitter()).await;
        }
        Ok(())
    }

    async fn verify(&self, goal: &str, model: &str, steps: &str, use_vision: bool) -> Result<bool> {
        let (screenshot, dom) = if use_vision {
            let service = ScreenshotService::new(self.driver);
            let quality = Some(self.config.verify_screenshot_quality);
            let shot = match service.screenshot(true, quality).await {
                Ok(shot) => shot,
                Err(e) => {
                    warn!(category = "action", "Full page screenshot failed, retrying: {e}");
                    service.screenshot(true, quality).await?
                }
            };
            (Some(shot), None)
        } else {
            (None, Some(self.driver.process_all_dom().await?.encoding))
        };

        Ok(self
            .gateway
            .verify_completion(model, goal, steps, screenshot, dom.as_deref())
            .await?)
    }

    async fn settle(&self) {
        match self
            .driver
            .wait_until_ready(self.config.dom_settle_timeout)
            .await
        {
            Ok(true) => {}
            Ok(false) => debug!(category = "action", "DOM settle timeout hit"),
            Err(e) => warn!(category = "action", "Waiting for DOM to settle failed: {e}"),
        }
    }

    fn remember(&self, goal: &str, result: &str) {
        if let Err(e) = self.ledger.record_action(goal, result) {
            warn!(category = "action", "Failed to record action: {e}");
        }
    }
}
