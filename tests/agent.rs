mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use common::{
    Call, FakeDriver, ScriptedClient, agent, agent_with_config, chunk, do_action, test_config, text,
};
use pagehand::{
    ActOptions, Agent, Backend, Error, InferenceError, Ledger, LlmProvider, Schema, fingerprint,
};

#[tokio::test]
async fn goto_navigates_the_current_window() {
    let driver = Arc::new(FakeDriver::new("about:blank"));
    let client = ScriptedClient::new();
    let agent = agent(&driver, &client);

    agent.goto("https://en.wikipedia.org/wiki/Baseball").await.unwrap();

    assert_eq!(
        driver.calls(),
        vec![
            Call::Navigate("https://en.wikipedia.org/wiki/Baseball".into()),
            Call::WaitUntilReady,
        ]
    );
    assert_eq!(
        agent.driver().current_url().await.unwrap(),
        "https://en.wikipedia.org/wiki/Baseball"
    );
}

#[tokio::test]
async fn ask_returns_model_answer() {
    let driver = Arc::new(FakeDriver::new("about:blank"));
    let client = ScriptedClient::new();
    client.push_chat(text("Paris"));

    let answer = agent(&driver, &client)
        .ask("What is the capital of France?", Some("gpt-4o-mini"))
        .await
        .unwrap();

    assert_eq!(answer, "Paris");
    let request = &client.chat_requests()[0];
    assert_eq!(request.model, "gpt-4o-mini");
    assert!(request.messages[1].content.contains("What is the capital of France?"));
}

#[tokio::test]
async fn default_model_comes_from_config() {
    let driver = Arc::new(FakeDriver::new("about:blank"));
    let client = ScriptedClient::new();
    client.push_chat(text("4"));

    let config = test_config().with_default_model("gpt-4o-2024-08-06");
    agent_with_config(&driver, &client, config)
        .ask("2 + 2?", None)
        .await
        .unwrap();

    assert_eq!(client.chat_requests()[0].model, "gpt-4o-2024-08-06");
}

#[tokio::test]
async fn missing_backend_credentials_fail_fast() {
    let driver = Arc::new(FakeDriver::new("about:blank"));
    let provider = LlmProvider::new();
    let agent = Agent::with_ledger(
        driver.clone(),
        provider,
        Arc::new(Ledger::in_memory()),
        test_config(),
    );

    let err = agent
        .ask("hello", Some("claude-3-5-sonnet-20240620"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Inference(InferenceError::MissingCredentials(ref var)) if var == Backend::Anthropic.api_key_var()
    ));
}

#[tokio::test]
async fn file_backed_ledger_survives_agents() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(FakeDriver::new("about:blank"));
    let client = ScriptedClient::new();
    let provider = LlmProvider::new().with_client(Backend::OpenAI, client.clone());

    let config = test_config().with_ledger_dir(dir.path());
    let first = Agent::new(driver.clone(), provider.clone(), config.clone()).unwrap();
    first.ledger().record_action("close the popup", "clicked X").unwrap();
    drop(first);

    let second = Agent::new(driver.clone(), provider, config).unwrap();
    let entry = second
        .ledger()
        .action(&fingerprint("close the popup"))
        .unwrap();
    assert_eq!(entry.result, "clicked X");

    // Acting with a model the registry does not know never touches the page.
    let err = second
        .act("anything", ActOptions::default().with_model("not-a-model"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Inference(InferenceError::UnsupportedModel(_))));
    assert!(driver.calls().is_empty());
}

#[tokio::test]
async fn configuration_faults_never_touch_the_page() {
    let driver = Arc::new(
        FakeDriver::new("https://example.com/")
            .with_chunks(vec![chunk(0, 1, &[(0, "<p>x</p>", "/html[1]/body[1]/p[1]")])])
            .with_full_dom(chunk(0, 1, &[(0, "<p>x</p>", "/html[1]/body[1]/p[1]")])),
    );
    let client = ScriptedClient::new();
    let agent = agent(&driver, &client);

    let err = agent
        .extract("extract everything", &Schema::string(), Some("gpt-2"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Inference(InferenceError::UnsupportedModel(_))));

    let err = agent
        .observe("the paragraph", Some("claude-3-5-sonnet-latest"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Inference(InferenceError::MissingCredentials(_))));

    let err = agent
        .act(
            "click the paragraph",
            ActOptions::default().with_model("claude-3-5-sonnet-latest"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Inference(InferenceError::MissingCredentials(_))));

    assert!(driver.calls().is_empty());
    assert!(client.chat_requests().is_empty());
    assert!(client.extraction_requests().is_empty());
}

const REPORT: &str = "/html[1]/body[1]/a[1]";

fn report_page() -> FakeDriver {
    FakeDriver::new("https://example.com/investors").with_chunks(vec![chunk(
        0,
        1,
        &[(0, "<a href=\"/report.pdf\">Annual report</a>", REPORT)],
    )])
}

#[tokio::test]
async fn download_pdf_waits_for_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let downloads = dir.path().join("downloads");
    let driver = Arc::new(report_page().downloads(REPORT, "Annual report.pdf"));
    let client = ScriptedClient::new();
    client
        .push_chat(do_action(0, "click", &[], true))
        .push_extraction(json!({ "completed": true }));

    let config = test_config().with_downloads(&downloads, Duration::from_secs(5));
    let path = agent_with_config(&driver, &client, config)
        .download_pdf("https://example.com/report.pdf", "Annual report")
        .await
        .unwrap()
        .expect("pdf should be downloaded");

    let expected = downloads.canonicalize().unwrap().join("Annual report.pdf");
    assert_eq!(path, expected);
    assert!(path.exists());
    assert_eq!(
        driver.count(|c| *c == Call::SetDownloadDir(downloads.canonicalize().unwrap())),
        1
    );
    let goal = &client.chat_requests()[0].messages[1].content;
    assert!(goal.contains("click on https://example.com/report.pdf"), "{goal}");
}

#[tokio::test]
async fn download_pdf_gives_up_after_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(report_page());
    let client = ScriptedClient::new();
    client
        .push_chat(do_action(0, "click", &[], true))
        .push_extraction(json!({ "completed": true }));

    let config = test_config().with_downloads(dir.path(), Duration::ZERO);
    let path = agent_with_config(&driver, &client, config)
        .download_pdf("https://example.com/report.pdf", "Annual report")
        .await
        .unwrap();

    assert!(path.is_none());
    assert_eq!(driver.count(|c| *c == Call::Click(REPORT.into())), 1);
}
