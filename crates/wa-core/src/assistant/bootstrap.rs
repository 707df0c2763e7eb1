//! First-run assistant setup
//!
//! When no assistant id is configured, upload the reference document,
//! create an assistant that can search it, and remember the new id in the
//! env file so the next start reuses it.

use std::path::Path;

use tracing::{info, warn};

use super::OpenAiAssistantClient;
use crate::config::{AssistantConfig, OpenAiConfig};
use crate::{Error, Result};

/// Env key the assistant id is persisted under
pub const ASSISTANT_ID_KEY: &str = "ASSISTANT_ID";

/// Return the configured assistant id, creating one when absent
pub async fn ensure_assistant(
    client: &OpenAiAssistantClient,
    openai: &OpenAiConfig,
    assistant: &AssistantConfig,
) -> Result<String> {
    if let Some(id) = openai.assistant_id.as_deref().filter(|id| !id.is_empty()) {
        return Ok(id.to_string());
    }

    info!("No assistant configured, bootstrapping one");

    let file_id = client
        .upload_file(Path::new(&assistant.reference_file))
        .await?;
    if file_id.is_none() {
        warn!("Creating assistant without a reference document");
    }

    let id = client
        .create_assistant(
            &assistant.name,
            &assistant.instructions,
            &openai.model,
            file_id.as_deref(),
        )
        .await?;

    persist_env_key(Path::new(&assistant.env_file), ASSISTANT_ID_KEY, &id)?;
    info!("Saved {} to {}", ASSISTANT_ID_KEY, assistant.env_file);

    Ok(id)
}

/// Set `key=value` in an env file, replacing an existing assignment
pub fn persist_env_key(path: &Path, key: &str, value: &str) -> Result<()> {
    let existing = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(Error::Bootstrap(format!("cannot read {}: {}", path.display(), e))),
    };

    let assignment = format!("{}={}", key, quote_env_value(value));
    let mut replaced = false;
    let mut lines: Vec<String> = existing
        .lines()
        .map(|line| {
            let name = line.trim_start().trim_start_matches("export ").split('=').next();
            if !replaced && name.map(str::trim) == Some(key) {
                replaced = true;
                assignment.clone()
            } else {
                line.to_string()
            }
        })
        .collect();

    if !replaced {
        lines.push(assignment);
    }

    let mut content = lines.join("\n");
    content.push('\n');
    std::fs::write(path, content)
        .map_err(|e| Error::Bootstrap(format!("cannot write {}: {}", path.display(), e)))
}

/// Bare when safe, otherwise double-quoted with dotenv escapes
fn quote_env_value(value: &str) -> String {
    if value.chars().all(|c| c.is_ascii_alphanumeric() || "_-.:/".contains(c)) {
        return value.to_string();
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '$' => quoted.push_str("\\$"),
            '\n' => quoted.push_str("\\n"),
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_persist_appends_to_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let env = dir.path().join(".env");

        persist_env_key(&env, "ASSISTANT_ID", "asst_1").unwrap();
        assert_eq!(std::fs::read_to_string(&env).unwrap(), "ASSISTANT_ID=asst_1\n");
    }

    #[test]
    fn test_persist_replaces_existing_key() {
        let dir = tempfile::tempdir().unwrap();
        let env = dir.path().join(".env");
        std::fs::write(&env, "OPENAI_API_KEY=sk\nASSISTANT_ID=asst_old\nPORT=8000\n").unwrap();

        persist_env_key(&env, "ASSISTANT_ID", "asst_new").unwrap();
        assert_eq!(
            std::fs::read_to_string(&env).unwrap(),
            "OPENAI_API_KEY=sk\nASSISTANT_ID=asst_new\nPORT=8000\n"
        );
    }

    #[test]
    fn test_persist_quotes_unusual_values() {
        let dir = tempfile::tempdir().unwrap();
        let env = dir.path().join(".env");

        persist_env_key(&env, "NAME", "two words").unwrap();
        assert_eq!(std::fs::read_to_string(&env).unwrap(), "NAME=\"two words\"\n");
    }

    #[test]
    fn test_persisted_values_read_back_with_dotenv() {
        let dir = tempfile::tempdir().unwrap();
        let env = dir.path().join(".env");
        let tricky = r#"it's "quoted" \ costs $5"#;

        persist_env_key(&env, "NAME", tricky).unwrap();
        persist_env_key(&env, "ASSISTANT_ID", "asst_1").unwrap();

        let vars: Vec<(String, String)> = dotenvy::from_path_iter(&env)
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(
            vars,
            vec![
                ("NAME".to_string(), tricky.to_string()),
                ("ASSISTANT_ID".to_string(), "asst_1".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_configured_assistant_is_reused() {
        let server = MockServer::start().await;
        let openai = OpenAiConfig {
            api_key: "sk".to_string(),
            assistant_id: Some("asst_existing".to_string()),
            ..Default::default()
        };
        let client = OpenAiAssistantClient::with_base_url(&openai, server.uri()).unwrap();

        let id = ensure_assistant(&client, &openai, &AssistantConfig::default())
            .await
            .unwrap();
        assert_eq!(id, "asst_existing");
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bootstrap_uploads_creates_and_persists() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/files"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "file_1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/assistants"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "asst_boot"})))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("data.csv");
        std::fs::write(&reference, "listing,price\nloft,1200\n").unwrap();

        let openai = OpenAiConfig {
            api_key: "sk".to_string(),
            ..Default::default()
        };
        let assistant = AssistantConfig {
            reference_file: reference.to_string_lossy().to_string(),
            env_file: dir.path().join(".env").to_string_lossy().to_string(),
            ..Default::default()
        };
        let client = OpenAiAssistantClient::with_base_url(&openai, server.uri()).unwrap();

        let id = ensure_assistant(&client, &openai, &assistant).await.unwrap();
        assert_eq!(id, "asst_boot");

        let env = std::fs::read_to_string(dir.path().join(".env")).unwrap();
        assert_eq!(env, "ASSISTANT_ID=asst_boot\n");
    }

    #[tokio::test]
    async fn test_bootstrap_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/assistants"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let openai = OpenAiConfig {
            api_key: "sk".to_string(),
            ..Default::default()
        };
        let assistant = AssistantConfig {
            reference_file: dir.path().join("missing.csv").to_string_lossy().to_string(),
            env_file: dir.path().join(".env").to_string_lossy().to_string(),
            ..Default::default()
        };
        let client = OpenAiAssistantClient::with_base_url(&openai, server.uri()).unwrap();

        let err = ensure_assistant(&client, &openai, &assistant).await.unwrap_err();
        assert!(matches!(err, Error::Bootstrap(_)));
        assert!(!dir.path().join(".env").exists());
    }
}
