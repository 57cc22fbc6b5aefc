//! A selector graph over a JSON state tree: filtered users, their count, and a dashboard summary.
//!
//! Run with `RUST_LOG=memoria=trace` to see cache hits and misses.
use memoria::{
    create_feature_selector, create_path_selector, create_selector, create_selector_with, CanonicalJson, MemoConfig,
    Selector,
};
use serde_json::{json, Value};
use tracing::info;

fn filter_users(users: &Value, filters: &Value) -> Vec<Value> {
    let min_age = filters["minAge"].as_u64().unwrap_or(0);
    let only_active = filters["onlyActive"].as_bool().unwrap_or(false);
    users
        .as_array()
        .into_iter()
        .flatten()
        .filter(|user| user["age"].as_u64().unwrap_or(0) >= min_age)
        .filter(|user| !only_active || user["active"].as_bool().unwrap_or(false))
        .cloned()
        .collect()
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .compact()
        .with_target(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut state = json!({
        "users": [
            {"id": 1, "name": "Alice", "age": 25, "active": true},
            {"id": 2, "name": "Bob", "age": 17, "active": true},
            {"id": 3, "name": "Carol", "age": 34, "active": false},
            {"id": 4, "name": "Dave", "age": 29, "active": true},
            {"id": 5, "name": "Eve", "age": 42, "active": true},
        ],
        "filters": {"minAge": 20, "onlyActive": true},
    });

    let select_filtered_users = create_selector_with(
        (create_feature_selector("users"), create_feature_selector("filters")),
        filter_users,
        CanonicalJson,
        MemoConfig::new().named("filtered_users").lru(4)?,
    );
    let select_active_user_count = create_selector_with(
        (select_filtered_users.clone(),),
        |users: &Vec<Value>| users.len(),
        CanonicalJson,
        MemoConfig::new().named("active_user_count"),
    );
    let select_dashboard = create_selector(
        (select_active_user_count.clone(), create_path_selector("/filters/minAge")),
        |count: &usize, min_age: &Value| format!("{count} active users aged {min_age} or more"),
    );

    info!("{}", select_dashboard.select(&state));
    info!("{}", select_dashboard.select(&state));

    state["otherData"] = json!({"theme": "dark"});
    info!("unrelated change: {}", select_dashboard.select(&state));

    state["filters"]["minAge"] = json!(30);
    info!("threshold change: {}", select_dashboard.select(&state));

    info!(stats = ?select_filtered_users.stats(), "filtered users");
    info!(stats = ?select_active_user_count.stats(), "active user count");
    info!(stats = ?select_dashboard.stats(), "dashboard");
    select_filtered_users.memoizer().dump();

    println!("{}", serde_json::to_string_pretty(&select_filtered_users.stats())?);
    Ok(())
}
