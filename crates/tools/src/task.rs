//! `create_task` (§4.11): the single tool available to the `task-creator`
//! role. Posts to the adjacent tasks CRUD surface, which this system
//! treats as an external collaborator, not a module of its own.

use serde::{Deserialize, Serialize};

const CREATE_TASK_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskArgs {
    pub title: String,
    pub description: String,
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
}

fn default_priority() -> u32 {
    50
}

pub async fn create_task(http: &reqwest::Client, api_base: &str, args: &CreateTaskArgs) -> String {
    let url = format!("{}/tasks", api_base.trim_end_matches('/'));

    let resp = match http
        .post(&url)
        .timeout(CREATE_TASK_TIMEOUT)
        .json(args)
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => return format!("Error: failed to reach task endpoint: {e}"),
    };

    let status = resp.status();
    if status.is_success() {
        format!("task '{}' created", args.title)
    } else {
        let body = resp.text().await.unwrap_or_default();
        format!("Error: task endpoint returned {} - {body}", status.as_u16())
    }
}
