use anyhow::{Result, bail};
use serde_json::Value;
use tracing::info;

use pagehand::{ActOptions, Agent, Field, Schema};

/// Named end-to-end scenarios against live sites.
pub const EVALS: &[&str] = &[
    "Google Jobs",
    "Wikipedia",
    "GitHub Commits",
    "Home Depot",
    "Partners",
];

pub fn find(name: &str) -> Option<&'static str> {
    EVALS.iter().copied().find(|e| e.eq_ignore_ascii_case(name))
}

pub async fn run(name: &str, agent: &Agent) -> Result<bool> {
    match name {
        "Google Jobs" => google_jobs(agent).await,
        "Wikipedia" => wikipedia(agent).await,
        "GitHub Commits" => github_commits(agent).await,
        "Home Depot" => home_depot(agent).await,
        "Partners" => partners(agent).await,
        other => bail!("Unknown eval '{other}'. Available evals: {EVALS:?}"),
    }
}

/// Run each goal in order, stopping at the first one that fails.
async fn act_all(agent: &Agent, goals: &[&str]) -> Result<()> {
    for goal in goals {
        let result = agent.act(goal, ActOptions::default()).await?;
        info!(category = "eval", success = result.success, "{}", result.message);
        if !result.success {
            bail!("act failed for {goal:?}: {}", result.message);
        }
    }
    Ok(())
}

async fn wikipedia(agent: &Agent) -> Result<bool> {
    agent.goto("https://en.wikipedia.org/wiki/Baseball").await?;
    act_all(agent, &["click the 'hit and run' link in this article"]).await?;

    let current = agent.driver().current_url().await?;
    let expected = "https://en.wikipedia.org/wiki/Hit_and_run_(baseball)";
    info!(category = "eval", "Current URL is: {current}");
    info!(category = "eval", "Expected URL is: {expected}");
    Ok(current == expected)
}

async fn github_commits(agent: &Agent) -> Result<bool> {
    agent.goto("https://github.com/facebook/react").await?;
    act_all(
        agent,
        &["find commit history, generally described by the number of commits"],
    )
    .await?;

    let schema = Schema::list_of(Schema::object([
        Field::new("message", Schema::string()),
        Field::new("author", Schema::string()),
        Field::new("date", Schema::string()),
        Field::new("hash", Schema::string()).optional(),
    ]));
    let commits = agent
        .extract(
            "Extract the last 20 commits with their messages, authors, and dates",
            &schema,
            None,
        )
        .await?;

    let list = commits.payload.as_array().cloned().unwrap_or_default();
    info!(category = "eval", "Successfully extracted {} commits", list.len());
    for commit in list.iter().take(5) {
        info!(
            category = "eval",
            "{}: {} by {}",
            commit["date"], commit["message"], commit["author"]
        );
    }
    Ok(!list.is_empty())
}

async fn google_jobs(agent: &Agent) -> Result<bool> {
    agent.goto("https://www.google.com").await?;
    act_all(
        agent,
        &[
            "click on the about page",
            "click on the careers page",
            "input data scientist into role",
            "input new york city into location",
            "click on the search button",
            "click on the first job link",
        ],
    )
    .await?;

    let qualifications = || {
        Schema::object([
            Field::new("degree", Schema::string()),
            Field::new("yearsOfExperience", Schema::integer()),
        ])
    };
    let schema = Schema::object([
        Field::new("applicationDeadline", Schema::string()).optional(),
        Field::new("minimumQualifications", qualifications()).optional(),
        Field::new("preferredQualifications", qualifications()).optional(),
    ]);
    let posting = agent
        .extract(
            "Extract the following details from the job posting: application deadline, minimum qualifications (degree and years of experience), and preferred qualifications (degree and years of experience)",
            &schema,
            None,
        )
        .await?;
    info!(category = "eval", "Job Details: {}", posting.payload);
    Ok(posting.payload.is_object())
}

async fn home_depot(agent: &Agent) -> Result<bool> {
    agent.goto("https://www.homedepot.com/").await?;
    act_all(
        agent,
        &[
            "search for gas grills",
            "click on the best selling gas grill",
            "click on the Product Details",
            "find the Primary Burner BTU",
        ],
    )
    .await?;

    let schema = Schema::object([Field::new("burnerBTU", Schema::string()).optional()]);
    let specs = agent
        .extract(
            "Extract the Primary exact Burner BTU of the product",
            &schema,
            None,
        )
        .await?;
    let btu = specs.payload.get("burnerBTU").cloned().unwrap_or(Value::Null);
    info!(category = "eval", "The gas grill primary burner BTU is {btu}");
    Ok(!btu.is_null())
}

async fn partners(agent: &Agent) -> Result<bool> {
    agent.goto("https://ramp.com").await?;
    act_all(
        agent,
        &[
            "Close the popup.",
            "Scroll down to the bottom of the page.",
            "Click on the link or button that leads to the partners page. If it's in a dropdown or hidden section, first interact with the element to reveal it, then click the link.",
        ],
    )
    .await?;

    let schema = Schema::list_of(Schema::object([
        Field::new("name", Schema::string()),
        Field::new("explanation", Schema::string()),
    ]));
    let partners = agent
        .extract(
            "Extract the names of all partner companies mentioned on this page. These could be inside text, links, or images representing partner companies. If no specific partner names are found, look for any sections or categories of partners mentioned. Also, check for any text that explains why partner names might not be listed, if applicable.",
            &schema,
            None,
        )
        .await?;

    let found: Vec<String> = partners
        .payload
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|p| p["name"].as_str())
        .map(str::to_lowercase)
        .collect();
    let expected = [
        "Accounting Partners",
        "Private Equity & Venture Capital Partners",
        "Services Partners",
        "Affiliates",
    ];
    let all_found = expected
        .iter()
        .all(|p| found.contains(&p.to_lowercase()));
    info!(category = "eval", "All expected partners found: {all_found}");
    info!(category = "eval", "Expected: {expected:?}");
    info!(category = "eval", "Found: {found:?}");
    Ok(all_found)
}
