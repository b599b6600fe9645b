use anyhow::Result;

use nyx_client::NyxClient;
use nyx_types::TriggerId;

use super::read_spec;

pub async fn validate(client: &NyxClient, spec: &str) -> Result<()> {
    let specification = read_spec(spec)?;
    client.validate(&specification).await?;
    println!("Specification is valid.");
    Ok(())
}

pub async fn register(client: &NyxClient, spec: &str) -> Result<()> {
    let specification = read_spec(spec)?;
    let trigger_id = client.register(&specification).await?;
    println!("Registered trigger: {trigger_id}");
    Ok(())
}

pub async fn status(client: &NyxClient, id: i64) -> Result<()> {
    let trigger_id = TriggerId::new(id);
    let ready = client.is_ready(trigger_id).await?;
    let active = client.is_active(trigger_id).await?;
    println!("Trigger {trigger_id}:");
    println!("  ready:  {ready}");
    println!("  active: {active}");
    Ok(())
}

pub async fn detail(client: &NyxClient, id: i64) -> Result<()> {
    let detail = client.trigger_detail(TriggerId::new(id)).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::Value::Object(detail))?
    );
    Ok(())
}

pub async fn unregister(client: &NyxClient, id: i64) -> Result<()> {
    let trigger_id = TriggerId::new(id);
    client.unregister(trigger_id).await?;
    println!("Unregistered trigger: {trigger_id}");
    Ok(())
}
