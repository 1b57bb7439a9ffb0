//! The hello-cities sample: one orchestrator, two activities and the HTTP
//! starter, registered in a [`FunctionApp`].

use std::time::Duration;

use rand::Rng;

use crate::app::FunctionApp;
use crate::{ActivityContext, OrchestrationContext};

pub const HTTP_START: &str = "http_start";
pub const HELLO_ORCHESTRATOR: &str = "hello_orchestrator";
pub const HELLO: &str = "hello";
pub const PRINT_MESSAGE_AND_WAIT_RANDOM: &str = "print_message_and_wait_random";

pub const MOROCCO_CITIES: [&str; 3] = ["Casablanca", "Marrakesh", "Fes"];

/// Custom status set once the Morocco fan-out has finished.
pub const MOROCCO_STATUS: &str = "Completed Seattle, starting Morocco cities...";

#[derive(Debug, Clone)]
pub struct SampleOptions {
    /// Length of one waited "second" in `print_message_and_wait_random`.
    pub wait_unit: Duration,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            wait_unit: Duration::from_secs(1),
        }
    }
}

pub async fn hello(_ctx: ActivityContext, city: String) -> Result<String, String> {
    Ok(format!("Hello {city}"))
}

/// Sleep a random 1..=5 units and report how long it waited.
pub async fn print_message_and_wait_random(
    ctx: ActivityContext,
    message: String,
    wait_unit: Duration,
) -> Result<String, String> {
    ctx.trace_debug(message);
    let wait: u32 = rand::thread_rng().gen_range(1..=5);
    tokio::time::sleep(wait_unit * wait).await;
    Ok(format!("Waited for {wait} seconds after printing message."))
}

/// Greets Seattle, fans out over the Morocco cities, then greets Tokyo and
/// London. Returns `[seattle, [morocco...], tokyo, london]` as JSON.
pub async fn hello_orchestrator(ctx: OrchestrationContext, _input: String) -> Result<String, String> {
    let result1 = ctx.call_activity(HELLO, "Seattle").await?;

    let parallel_tasks = MOROCCO_CITIES
        .iter()
        .map(|city| ctx.schedule_activity(PRINT_MESSAGE_AND_WAIT_RANDOM, *city))
        .collect();
    let results_morocco = ctx
        .join(parallel_tasks)
        .await
        .into_iter()
        .map(|out| out.into_activity())
        .collect::<Result<Vec<String>, String>>()?;
    ctx.set_custom_status(MOROCCO_STATUS);
    ctx.trace_info(format!(
        "Completed greetings for Morocco cities: {}",
        results_morocco.join(",")
    ));

    let result2 = ctx.call_activity(HELLO, "Tokyo").await?;
    let result3 = ctx.call_activity(HELLO, "London").await?;

    serde_json::to_string(&serde_json::json!([result1, results_morocco, result2, result3]))
        .map_err(|e| format!("encode output: {e}"))
}

pub fn sample_app(options: SampleOptions) -> Result<FunctionApp, String> {
    let wait_unit = options.wait_unit;
    FunctionApp::builder()
        .http_trigger(HTTP_START, "orchestrators/{functionName}")
        .orchestration(HELLO_ORCHESTRATOR, hello_orchestrator)
        .activity(HELLO, hello)
        .activity(PRINT_MESSAGE_AND_WAIT_RANDOM, move |ctx, message| {
            print_message_and_wait_random(ctx, message, wait_unit)
        })
        .build()
}
