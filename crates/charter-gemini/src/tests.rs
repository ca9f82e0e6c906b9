//! Snapshot tests for the Gemini clients

#[cfg(test)]
mod snapshot_tests {
    use crate::client::GenerateContentRequest;
    use crate::{GeminiClient, GeminiConfig, GenerationConfig};
    use insta::assert_yaml_snapshot;

    #[test]
    fn test_config_snapshot() {
        let config = GeminiConfig::new("test_api_key_redacted".to_string());

        // the key is never serialized
        assert_yaml_snapshot!(config, @r###"
        model: gemini-1.5-flash
        embedding_model: text-embedding-004
        api_url: "https://generativelanguage.googleapis.com/v1beta"
        timeout:
          secs: 60
          nanos: 0
        "###);
    }

    #[test]
    fn test_generate_request_snapshot() {
        let config = GenerationConfig {
            temperature: None,
            max_tokens: 512,
            stop_sequences: vec!["Question".to_string()],
            ..GenerationConfig::default()
        };
        let request = GenerateContentRequest::new("Summarize Part II", &config);

        assert_yaml_snapshot!(request, @r###"
        contents:
          - role: user
            parts:
              - text: Summarize Part II
        generationConfig:
          maxOutputTokens: 512
          stopSequences:
            - Question
        "###);
    }

    #[test]
    fn test_model_constants() {
        assert_yaml_snapshot!(GeminiClient::GEMINI_1_5_FLASH, @"gemini-1.5-flash");
        assert_yaml_snapshot!(GeminiClient::GEMINI_1_5_PRO, @"gemini-1.5-pro");
    }
}
