//! capl-repair: LLM-backed syntax repair for rough CAPL drafts.
//!
//! An optional pre-pass that rewrites imprecise, hand-written policy
//! text into well-formed CAPL before compilation: plain text in, plain
//! text out, with an explicit failure signal. The compiler itself
//! never depends on this crate; the CLI wires the two together.
//!
//! The [`RepairClient`] trait abstracts the LLM API so tests can run
//! against a mock. [`AzureOpenAiClient`] is the reference
//! implementation, using `ureq` and credentials from the environment.

use serde_json::json;

/// Error type for repair operations.
#[derive(Debug)]
pub enum RepairError {
    /// Network or HTTP transport error.
    Network(String),
    /// The API returned an error response.
    Api { status: u16, message: String },
    /// The response carried no usable text content.
    EmptyResponse,
    /// Required credentials are missing from the environment.
    MissingCredentials(String),
}

impl std::fmt::Display for RepairError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepairError::Network(msg) => write!(f, "repair network error: {}", msg),
            RepairError::Api { status, message } => {
                write!(f, "repair API error ({}): {}", status, message)
            }
            RepairError::EmptyResponse => write!(f, "repair response contained no text"),
            RepairError::MissingCredentials(var) => {
                write!(f, "missing environment variable: {}", var)
            }
        }
    }
}

impl std::error::Error for RepairError {}

/// Trait for calling an LLM to rewrite rough policy text.
///
/// Implementations handle the specifics of the LLM API; prompt
/// construction and output cleanup live in [`repair_source`].
pub trait RepairClient {
    /// Send the system prompt and rough source text, return the
    /// model's raw completion.
    fn complete(&self, system_prompt: &str, user_content: &str) -> Result<String, RepairError>;
}

/// System prompt teaching the model CAPL syntax. The model must
/// return only valid CAPL, ready to save to a `.capl` file.
pub const SYSTEM_PROMPT: &str = r#"You are a Conditional Access Policy Language (CAPL) expert. Your task is to take rough, imprecise policy descriptions and convert them into valid CAPL syntax.

## CAPL Syntax Rules

### Structure
```
IF condition1
    condition2
    STATE enabled|disabled|report-only
        action1
        action2
END
```

### Variables
```
VAR VariableName = "Display Name" [guid]
```

### Conditions
All conditions on separate lines (ANDed together). Available conditions:

**User:**
- `user is All`
- `user is Guest`
- `user in group "Name" [guid]`
- `user in role "Name" [guid]`
- `user NOT in group "Name" [guid]`

**App:**
- `app is All`
- `app is Office365`
- `app in "Name" [guid]`

**Platform:**
- `platform is Windows|macOS|Linux|iOS|Android|WindowsPhone`
- `platform is iOS OR platform is Android` (for multiple)

**Device:**
- `device is Compliant`
- `device is HybridJoined`
- `device NOT is Compliant`

**Location:**
- `location is Trusted`
- `location is All`
- `location in "Name" [guid]`
- `location NOT is Trusted`

**Client:**
- `client is Browser|MobileApp|DesktopApp|ExchangeActiveSync|Other`
- `client NOT is Browser`

**Risk:**
- `signin-risk is High|Medium|Low`
- `user-risk is High|Medium|Low`

### Actions
All actions indented under STATE:

**Grant Controls:**
- `REQUIRE MFA`
- `REQUIRE CompliantDevice`
- `REQUIRE HybridJoined`
- `REQUIRE ApprovedApp`
- `REQUIRE AppProtection`
- `REQUIRE PasswordChange`
- `BLOCK`
- `ALLOW`

**Multiple requirements (all must be satisfied):**
```
REQUIRE MFA
REQUIRE CompliantDevice
```

**Alternative requirements (any one):**
```
REQUIRE AppProtection OR CompliantDevice
```

**Session Controls:**
- `SESSION signin-frequency <number> hours|days`
- `SESSION persistent-browser always|never`
- `SESSION monitor with CloudAppSecurity`
- `SESSION block-downloads`

### Nested IF-ELSE
```
IF condition1
    STATE enabled
        action1
ELSE IF condition2
    STATE enabled
        action2
ELSE
    STATE enabled
        action3
END
```

**Important:** No THEN keyword after ELSE/ELSE IF - actions follow directly after STATE.

## Your Task

1. Read the rough/imprecise policy description
2. Identify the intent (what the user wants to achieve)
3. Convert it to valid CAPL syntax following ALL rules above
4. Use proper indentation (4 spaces per level)
5. Add comments to explain complex logic
6. If GUIDs are missing, use placeholder: [00000000-0000-0000-0000-000000000000]
7. If policy state is unclear, default to "report-only" for safety
8. Preserve the semantic meaning even if syntax is wrong

## Output Format

Return ONLY the valid CAPL code. Do not include explanations, markdown code fences, or any other text.
Just return the clean, valid CAPL syntax that can be directly saved to a .capl file.

If you need to add clarifying comments, use # at the start of the line.
"#;

/// Repair one rough source text: call the client and strip any
/// markdown code fences the model wrapped the output in.
pub fn repair_source(client: &dyn RepairClient, source: &str) -> Result<String, RepairError> {
    let raw = client.complete(SYSTEM_PROMPT, source)?;
    Ok(strip_code_fences(&raw).to_owned())
}

/// Remove a surrounding markdown code fence, if present.
pub fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the fence's language tag line.
    let body = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => return trimmed,
    };
    body.trim_end()
        .strip_suffix("```")
        .map(str::trim_end)
        .unwrap_or(trimmed)
}

/// Reference client for the Azure OpenAI chat completions API.
///
/// Reads `AZURE_ENDPOINT` and `AZURE_API_KEY` from the environment.
/// The endpoint is the full deployment URL including the api-version
/// query string.
#[derive(Debug)]
pub struct AzureOpenAiClient {
    pub endpoint: String,
    pub api_key: String,
    /// Completion token budget for the rewritten policy.
    pub max_completion_tokens: u32,
    /// Sampling temperature; kept low for precise syntax.
    pub temperature: f64,
}

impl AzureOpenAiClient {
    pub fn new(endpoint: String, api_key: String) -> Self {
        AzureOpenAiClient {
            endpoint,
            api_key,
            max_completion_tokens: 16000,
            temperature: 0.3,
        }
    }

    pub fn from_env() -> Result<Self, RepairError> {
        let endpoint = std::env::var("AZURE_ENDPOINT")
            .map_err(|_| RepairError::MissingCredentials("AZURE_ENDPOINT".to_owned()))?;
        let api_key = std::env::var("AZURE_API_KEY")
            .map_err(|_| RepairError::MissingCredentials("AZURE_API_KEY".to_owned()))?;
        Ok(AzureOpenAiClient::new(endpoint, api_key))
    }
}

impl RepairClient for AzureOpenAiClient {
    fn complete(&self, system_prompt: &str, user_content: &str) -> Result<String, RepairError> {
        let body = json!({
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_content },
            ],
            "max_completion_tokens": self.max_completion_tokens,
            "temperature": self.temperature,
        });

        let agent = ureq::Agent::new_with_defaults();
        let response = agent
            .post(&self.endpoint)
            .header("api-key", &self.api_key)
            .header("content-type", "application/json")
            .send_json(body);

        match response {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let value: serde_json::Value = resp
                    .into_body()
                    .read_json()
                    .map_err(|e| RepairError::Network(format!("invalid response body: {}", e)))?;
                if let Some(error) = value.get("error") {
                    return Err(RepairError::Api {
                        status,
                        message: error["message"].as_str().unwrap_or("unknown").to_owned(),
                    });
                }
                value["choices"]
                    .as_array()
                    .and_then(|choices| choices.first())
                    .and_then(|choice| choice["message"]["content"].as_str())
                    .map(str::to_owned)
                    .ok_or(RepairError::EmptyResponse)
            }
            Err(e) => Err(RepairError::Network(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mock client that pops responses from a queue.
    struct MockClient {
        responses: Mutex<Vec<Result<String, RepairError>>>,
        captured_user_content: Mutex<Vec<String>>,
    }

    impl MockClient {
        fn new(responses: Vec<Result<String, RepairError>>) -> Self {
            MockClient {
                responses: Mutex::new(responses),
                captured_user_content: Mutex::new(Vec::new()),
            }
        }
    }

    impl RepairClient for MockClient {
        fn complete(
            &self,
            _system_prompt: &str,
            user_content: &str,
        ) -> Result<String, RepairError> {
            self.captured_user_content
                .lock()
                .unwrap()
                .push(user_content.to_owned());
            let mut queue = self.responses.lock().unwrap();
            if queue.is_empty() {
                return Err(RepairError::Network("mock queue exhausted".to_owned()));
            }
            queue.remove(0)
        }
    }

    #[test]
    fn repair_passes_source_through_client() {
        let client = MockClient::new(vec![Ok(
            "IF user is All\n    STATE enabled\n        REQUIRE MFA\nEND".to_owned(),
        )]);
        let repaired = repair_source(&client, "everyone needs mfa").unwrap();
        assert!(repaired.starts_with("IF user is All"));
        assert_eq!(
            client.captured_user_content.lock().unwrap()[0],
            "everyone needs mfa"
        );
    }

    #[test]
    fn repair_strips_code_fences() {
        let client = MockClient::new(vec![Ok(
            "```capl\nIF user is All\n    STATE enabled\n        BLOCK\nEND\n```".to_owned(),
        )]);
        let repaired = repair_source(&client, "block everything").unwrap();
        assert_eq!(
            repaired,
            "IF user is All\n    STATE enabled\n        BLOCK\nEND"
        );
    }

    #[test]
    fn repair_propagates_network_error() {
        let client = MockClient::new(vec![Err(RepairError::Network(
            "connection refused".to_owned(),
        ))]);
        let err = repair_source(&client, "anything").unwrap_err();
        assert!(matches!(err, RepairError::Network(_)));
    }

    #[test]
    fn strip_code_fences_variants() {
        assert_eq!(strip_code_fences("plain text"), "plain text");
        assert_eq!(strip_code_fences("```\nbody\n```"), "body");
        assert_eq!(strip_code_fences("```capl\nbody\n```"), "body");
        // Unterminated fence is left as written.
        assert_eq!(strip_code_fences("```\nbody"), "```\nbody");
    }

    #[test]
    fn from_env_reports_missing_credentials() {
        // Credentials are read lazily, so a bare environment must
        // produce a MissingCredentials error, not a panic.
        std::env::remove_var("AZURE_ENDPOINT");
        std::env::remove_var("AZURE_API_KEY");
        let err = AzureOpenAiClient::from_env().unwrap_err();
        assert!(matches!(err, RepairError::MissingCredentials(_)));
    }

    #[test]
    fn system_prompt_covers_core_grammar() {
        assert!(SYSTEM_PROMPT.contains("STATE enabled|disabled|report-only"));
        assert!(SYSTEM_PROMPT.contains("REQUIRE MFA"));
        assert!(SYSTEM_PROMPT.contains("SESSION signin-frequency"));
    }
}
