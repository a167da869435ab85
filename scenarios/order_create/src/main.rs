use std::time::Duration;

use gust_runner::prelude::*;
use serde_json::{json, Value};

// These must exist in the target's database before the run starts.
const TEST_MEMBER_ID: u64 = 1;
const TEST_TICKET_IDS: [u64; 2] = [101, 102];

const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Default, Debug)]
struct RunnerValues {}

impl UserValuesConstraint for RunnerValues {}

#[derive(Default, Debug)]
struct ClientValues {
    client: Option<reqwest::Client>,
    order_url: String,
}

impl UserValuesConstraint for ClientValues {}

fn client_setup(ctx: &mut ClientContext<RunnerValues, ClientValues>) -> HookResult {
    let base_url = ctx
        .runner_context()
        .get_connection_string()
        .unwrap_or(DEFAULT_BASE_URL)
        .trim_end_matches('/')
        .to_string();

    ctx.get_mut().order_url = format!("{base_url}/api/orders");
    ctx.get_mut().client = Some(reqwest::Client::new());

    Ok(())
}

fn client_behaviour(ctx: &mut ClientContext<RunnerValues, ClientValues>) -> HookResult {
    let client = ctx
        .get()
        .client
        .clone()
        .ok_or_else(|| anyhow::anyhow!("Client setup did not run"))?;
    let order_url = ctx.get().order_url.clone();
    let recorder = ctx.runner_context().recorder().clone();

    let payload = json!({
        "memberId": TEST_MEMBER_ID,
        "ticketIds": TEST_TICKET_IDS,
    });

    let timer = OperationTimer::new("http_req");
    let response = ctx.runner_context().executor().execute_in_place(async move {
        let response = client.post(&order_url).json(&payload).send().await?;
        let status = response.status();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        Ok((status, body))
    });

    match &response {
        // A cancelled request carries no information about the target.
        Err(e) if e.is::<ShutdownSignalError>() => {}
        _ => timer.finish(&recorder, &response),
    }

    let (status, body) = response?;

    ctx.record_check("is status 201", status == reqwest::StatusCode::CREATED);
    ctx.record_check(
        "response body has orderId",
        body.get("orderId")
            .and_then(Value::as_u64)
            .is_some_and(|order_id| order_id > 0),
    );

    Ok(())
}

fn main() -> GustResult<()> {
    let cli = init();

    let report = run(
        ScenarioDefinitionBuilder::<RunnerValues, ClientValues>::new(env!("CARGO_PKG_NAME"), cli)
            .with_default_stages(vec![
                Stage::new(Duration::from_secs(5), 50),
                Stage::new(Duration::from_secs(10), 50),
                Stage::new(Duration::from_secs(5), 100),
                Stage::new(Duration::from_secs(10), 100),
                Stage::new(Duration::from_secs(5), 0),
            ])
            .use_threshold("http_req_failed", "rate<0.01")
            .use_threshold("http_req_duration", "p(95)<700")
            .use_client_setup(client_setup)
            .use_client_behaviour(client_behaviour),
    )?;

    if !report.verdict {
        std::process::exit(1);
    }

    Ok(())
}
