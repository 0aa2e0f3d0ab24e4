mod common;

use std::sync::Arc;

use anyhow::Result;
use common::{
    FakePage, ScriptedDecisionService, capture_logger, context, failure, messages, reply,
    reply_after_crash, reply_and_go,
};
use search_pilot::agent::{AgentLoop, AgentSettings, AgentState};

const RESULTS_URL: &str = "https://www.bing.com/search?q=machine+learning";

fn settings(max_iterations: u32) -> AgentSettings {
    AgentSettings {
        model: "computer-use-preview".into(),
        query: "AI news".into(),
        max_iterations,
        cost_per_call: 0.05,
        display_width: 1024,
        display_height: 768,
    }
}

fn results_page() -> Arc<FakePage> {
    let page = Arc::new(FakePage::search_engine());
    page.set_url(RESULTS_URL);
    page
}

#[tokio::test]
async fn response_text_completes_only_from_the_second_iteration() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (logger, _records) = capture_logger();
    let page = results_page();
    let service = ScriptedDecisionService::new(vec![
        reply("Pressed Enter; the news results are loading"),
        reply("I clicked an article about AI chips"),
        reply("unused"),
    ]);

    let mut agent = AgentLoop::new(context(&page, logger, dir.path()), &service, settings(3));
    let summary = agent.run().await?;

    assert_eq!(summary.state, AgentState::Succeeded { iteration: 2 });
    assert_eq!(summary.iterations_run, 2);
    assert_eq!(summary.calls_dispatched, 2);
    assert!((summary.total_cost - 0.10).abs() < 1e-9);
    assert!(!summary.iterations[0].completion_detected);
    assert!(summary.iterations[1].completion_detected);
    assert_eq!(service.requests().len(), 2);
    Ok(())
}

#[tokio::test]
async fn article_url_completes_on_the_first_iteration() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (logger, _records) = capture_logger();
    let page = results_page();
    let service = ScriptedDecisionService::new(vec![reply_and_go(
        "Opened a result",
        "https://example.com/news/ai-regulation",
    )])
    .driving(Arc::clone(&page));

    let mut agent = AgentLoop::new(context(&page, logger, dir.path()), &service, settings(3));
    let summary = agent.run().await?;

    assert_eq!(summary.state, AgentState::Succeeded { iteration: 1 });
    assert_eq!(summary.calls_dispatched, 1);
    assert!(
        page.overlays()
            .contains(&"SUCCESS! News article page detected!".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn failed_calls_are_charged_and_the_loop_continues() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (logger, records) = capture_logger();
    let page = results_page();
    let service = ScriptedDecisionService::new(vec![failure(503), failure(429), failure(500)]);

    let mut agent = AgentLoop::new(context(&page, logger, dir.path()), &service, settings(3));
    let summary = agent.run().await?;

    assert_eq!(summary.state, AgentState::Exhausted { iterations: 3 });
    assert_eq!(summary.calls_dispatched, 3);
    assert!((summary.total_cost - 0.15).abs() < 1e-9);
    assert!(summary.iterations.iter().all(|record| record.error.is_some()));

    let shots = page.screenshots();
    for index in 1..=3 {
        assert!(
            shots
                .iter()
                .any(|name| name.ends_with(&format!("error_state_iteration_{index}.png")))
        );
    }
    assert!(
        page.overlays()
            .iter()
            .any(|overlay| overlay.starts_with("ERROR in iteration 1:"))
    );
    assert!(
        messages(&records)
            .iter()
            .any(|message| message.starts_with("An error occurred in iteration 2"))
    );
    Ok(())
}

#[tokio::test]
async fn loop_stops_at_the_iteration_budget() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (logger, _records) = capture_logger();
    let page = results_page();
    let service = ScriptedDecisionService::new(vec![
        reply("Still waiting for results"),
        reply("Still waiting for results"),
        reply("Still waiting for results"),
    ]);

    let mut agent = AgentLoop::new(context(&page, logger, dir.path()), &service, settings(2));
    let summary = agent.run().await?;

    assert_eq!(summary.state, AgentState::Exhausted { iterations: 2 });
    assert_eq!(service.requests().len(), 2);
    assert!(
        page.overlays()
            .contains(&"Maximum iterations reached. Task may not be complete.".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn three_unfinished_replies_exhaust_a_budget_of_three() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (logger, _records) = capture_logger();
    let page = results_page();
    let service = ScriptedDecisionService::new(vec![
        reply("Scrolling the results"),
        reply("Scrolling the results"),
        reply("Scrolling the results"),
    ]);

    let mut agent = AgentLoop::new(context(&page, logger, dir.path()), &service, settings(3));
    let summary = agent.run().await?;

    assert_eq!(summary.state, AgentState::Exhausted { iterations: 3 });
    assert_eq!(summary.iterations_run, 3);
    assert_eq!(summary.calls_dispatched, 3);
    assert!((summary.total_cost - 0.15).abs() < 1e-9);
    assert!(summary.iterations.iter().all(|record| !record.completion_detected));
    Ok(())
}

#[tokio::test]
async fn failed_first_call_then_completion_on_the_second() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (logger, _records) = capture_logger();
    let page = results_page();
    let service = ScriptedDecisionService::new(vec![
        failure(503),
        reply("I clicked an article about AI chips"),
        reply("unused"),
    ]);

    let mut agent = AgentLoop::new(context(&page, logger, dir.path()), &service, settings(3));
    let summary = agent.run().await?;

    assert_eq!(summary.state, AgentState::Succeeded { iteration: 2 });
    assert_eq!(summary.calls_dispatched, 2);
    assert!((summary.total_cost - 0.10).abs() < 1e-9);
    assert!(summary.iterations[0].error.is_some());
    assert!(summary.iterations[1].completion_detected);
    assert_eq!(service.requests().len(), 2);
    Ok(())
}

#[tokio::test]
async fn lost_page_stops_the_loop_before_another_call() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (logger, _records) = capture_logger();
    let page = results_page();
    let service = ScriptedDecisionService::new(vec![
        reply_after_crash("Still waiting"),
        reply("Still waiting"),
        reply("Still waiting"),
    ])
    .driving(Arc::clone(&page));

    let mut agent = AgentLoop::new(context(&page, logger, dir.path()), &service, settings(3));
    let err = agent.run().await.expect_err("page is gone");

    assert!(err.is_fatal());
    assert_eq!(service.requests().len(), 1);
    assert_eq!(agent.ledger().calls_attempted(), 1);
    assert_eq!(agent.state(), AgentState::Iterating { index: 1 });
    Ok(())
}

#[tokio::test]
async fn zero_budget_never_calls_the_service() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (logger, _records) = capture_logger();
    let page = results_page();
    let service = ScriptedDecisionService::new(Vec::new());

    let mut agent = AgentLoop::new(context(&page, logger, dir.path()), &service, settings(0));
    let summary = agent.run().await?;

    assert_eq!(summary.state, AgentState::Exhausted { iterations: 0 });
    assert_eq!(summary.calls_dispatched, 0);
    assert_eq!(summary.total_cost, 0.0);
    assert!(service.requests().is_empty());
    Ok(())
}

#[tokio::test]
async fn prompts_switch_after_the_first_iteration() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (logger, _records) = capture_logger();
    let page = results_page();
    let service = ScriptedDecisionService::new(vec![
        reply("Still waiting"),
        reply("Still waiting"),
    ]);

    let mut agent = AgentLoop::new(context(&page, logger, dir.path()), &service, settings(2));
    agent.run().await?;

    let requests = service.requests();
    assert!(requests[0].prompt().contains("already typed in"));
    assert!(requests[1].prompt().starts_with("Look at the search results for 'AI news'"));
    for request in &requests {
        assert_eq!(request.tools.len(), 1);
        assert_eq!(request.tools[0].display_width, 1024);
        assert_eq!(request.tools[0].display_height, 768);
    }
    Ok(())
}
