//! HTTP client side: control subcommands and the hook handler.

use std::io::Read;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

/// POST a JSON body to the daemon and pretty-print the reply.
pub async fn post(addr: &str, path: &str, body: serde_json::Value) -> anyhow::Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;
    let reply: serde_json::Value = client
        .post(format!("http://{addr}{path}"))
        .json(&body)
        .send()
        .await?
        .json()
        .await?;
    println!("{}", serde_json::to_string_pretty(&reply)?);
    Ok(())
}

pub async fn status(addr: &str) -> anyhow::Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;
    let reply: serde_json::Value = client
        .get(format!("http://{addr}/status"))
        .send()
        .await?
        .json()
        .await?;
    println!("{}", serde_json::to_string_pretty(&reply)?);
    Ok(())
}

/// The subset of the hook event payload we care about.
#[derive(Deserialize, Default)]
struct HookEvent {
    #[serde(default)]
    hook_event_name: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    notification_type: Option<String>,
}

/// Map a hook event to the daemon route it should hit.
///
/// Activity events are heartbeats. An idle prompt or a session end is
/// the wind-down signal.
fn route_for(event: &HookEvent) -> Option<&'static str> {
    match event.hook_event_name.as_str() {
        "SessionStart" | "PreToolUse" | "PostToolUse" | "Stop" => Some("/heartbeat"),
        "SessionEnd" => Some("/session/end"),
        "Notification" => match event.notification_type.as_deref() {
            Some("idle_prompt") => Some("/session/end"),
            _ => None,
        },
        _ => None,
    }
}

/// Read a hook event from stdin and forward it to the daemon.
///
/// Fire-and-forget: a missing daemon or a bad payload exits 0 so the
/// hook never slows down or fails the caller.
pub async fn run_hook(addr: &str) {
    let mut raw = String::new();
    if std::io::stdin().read_to_string(&mut raw).is_err() {
        return;
    }
    let event: HookEvent = serde_json::from_str(&raw).unwrap_or_default();

    let Some(path) = route_for(&event) else {
        return;
    };
    let session = event.session_id.unwrap_or_else(|| "default".into());

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
    {
        Ok(client) => client,
        Err(_) => return,
    };
    let _ = client
        .post(format!("http://{addr}{path}"))
        .json(&json!({ "session": session }))
        .send()
        .await;
}
